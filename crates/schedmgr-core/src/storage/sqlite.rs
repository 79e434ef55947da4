//! SQLite-backed event store.
//!
//! Each event is stored as one JSON document keyed by id. Writes made
//! through this handle are announced on its change feed.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use super::data_dir;
use super::migrations;
use super::store::{ChangeFeed, ChangeNotification, EventStore, FEED_CAPACITY};
use crate::error::StoreError;
use crate::event::Event;

/// Default database file name inside the data directory.
pub const DB_FILE_NAME: &str = "schedmgr.db";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    feed: broadcast::Sender<ChangeNotification>,
}

impl SqliteStore {
    /// Open the database at `<data dir>/schedmgr.db`.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable or the database
    /// cannot be opened or migrated.
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Self::open(dir.join(DB_FILE_NAME))
    }

    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if migration fails.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            feed,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Locked)
    }

    fn notify(&self, notification: ChangeNotification) {
        let _ = self.feed.send(notification);
    }
}

fn load(conn: &Connection, id: &str) -> Result<Option<Event>, StoreError> {
    let body: Option<String> = conn
        .query_row("SELECT body FROM events WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
        .transpose()
}

/// Decode `(id, body)` rows. A body that no longer parses is logged and
/// skipped so one bad record cannot hide the rest.
fn decode_rows(
    rows: impl Iterator<Item = rusqlite::Result<(String, String)>>,
) -> Result<Vec<Event>, StoreError> {
    let mut events = Vec::new();
    for row in rows {
        let (id, body) = row?;
        match serde_json::from_str(&body) {
            Ok(event) => events.push(event),
            Err(err) => warn!(%id, error = %err, "skipping undecodable event row"),
        }
    }
    Ok(events)
}

#[async_trait]
impl EventStore for SqliteStore {
    fn is_connected(&self) -> bool {
        true
    }

    async fn fetch_all(&self) -> Result<Vec<Event>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, body FROM events ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        decode_rows(rows)
    }

    async fn fetch_starting_by(&self, latest_start: &str) -> Result<Vec<Event>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, body FROM events
             WHERE start_time = '' OR start_time <= ?1
             ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![latest_start], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        decode_rows(rows)
    }

    async fn get(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let conn = self.conn()?;
        load(&conn, id)
    }

    async fn push(&self, mut event: Event) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        event.id = id.clone();
        let body = serde_json::to_string(&event)?;
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO events (id, body, start_time) VALUES (?1, ?2, ?3)",
                params![id, body, event.start_time],
            )?;
        }
        self.notify(ChangeNotification::added(event));
        Ok(id)
    }

    async fn set(&self, event: &Event) -> Result<(), StoreError> {
        if event.id.is_empty() {
            return Err(StoreError::Rejected("record has no id".into()));
        }
        let body = serde_json::to_string(event)?;
        let existed = {
            let conn = self.conn()?;
            let existed = load(&conn, &event.id)?.is_some();
            conn.execute(
                "INSERT INTO events (id, body, start_time) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET body = excluded.body, start_time = excluded.start_time",
                params![event.id, body, event.start_time],
            )?;
            existed
        };
        self.notify(if existed {
            ChangeNotification::changed(event.clone())
        } else {
            ChangeNotification::added(event.clone())
        });
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let removed = {
            let conn = self.conn()?;
            let prior = load(&conn, id)?;
            conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
            prior
        };
        if let Some(record) = removed {
            self.notify(ChangeNotification::removed(record));
        }
        Ok(())
    }

    fn subscribe(&self) -> ChangeFeed {
        ChangeFeed::new(self.feed.subscribe())
    }
}
