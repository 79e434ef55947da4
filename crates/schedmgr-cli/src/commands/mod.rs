pub mod config;
pub mod event;
pub mod sync;

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use schedmgr_core::{
    Config, EventCache, EventStore, ExternalCalendar, MirrorClient, SqliteStore, SyncEngine,
};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Failure already printed to the user; `main` only sets the exit code.
#[derive(Debug)]
pub struct Reported;

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("action failed")
    }
}

impl std::error::Error for Reported {}

/// Everything a command needs: loaded config, the local store, an engine
/// wired to the external calendar when one is configured, and the working
/// set the engine records its own writes in.
pub struct App {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub engine: Arc<SyncEngine>,
    pub cache: Arc<Mutex<EventCache>>,
}

impl App {
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let tz = config.timezone()?;
        let store_path = config.store_path()?;
        let store = Arc::new(SqliteStore::open(&store_path)?);

        let mirror = match config.endpoint() {
            Some(endpoint) => {
                let client = MirrorClient::new(endpoint, config.external.tag.clone(), tz)?;
                Some(Arc::new(client) as Arc<dyn ExternalCalendar>)
            }
            None => None,
        };
        let cache = Arc::new(Mutex::new(EventCache::new()));
        let engine = Arc::new(
            SyncEngine::new(Arc::clone(&store) as Arc<dyn EventStore>, mirror, tz)
                .with_cache(Arc::clone(&cache)),
        );
        debug!(
            store = %store_path.display(),
            configured = engine.is_configured(),
            "opened local store"
        );

        Ok(Self {
            config,
            store,
            engine,
            cache,
        })
    }
}
