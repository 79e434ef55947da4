mod config;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod store;

pub use config::{Config, ExternalConfig, StoreConfig, SyncConfig};
pub use memory::{MemoryStore, StoreOp};
pub use sqlite::SqliteStore;
pub use store::{ChangeFeed, ChangeKind, ChangeNotification, EventStore};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/schedmgr[-dev]/` based on SCHEDMGR_ENV.
///
/// Set SCHEDMGR_ENV=dev to use the development data directory.
/// SCHEDMGR_DATA_DIR overrides the location entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("SCHEDMGR_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("SCHEDMGR_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("schedmgr-dev")
            } else {
                base_dir.join("schedmgr")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
