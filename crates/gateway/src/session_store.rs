//! Route store selection from `[session]` config.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    rgbot_config::{SessionConfig, SessionStoreKind},
    rgbot_sessions::{JsonRouteStore, MemoryRouteStore, RouteStore, SqliteRouteStore},
    tracing::info,
};

use crate::error::{Error, Result};

const JSON_DIR: &str = "sessions";
const SQLITE_FILE: &str = "sessions.db";

fn resolve_path(config: &SessionConfig, data_dir: Option<&Path>, default_name: &str) -> Result<PathBuf> {
    if let Some(path) = &config.path {
        return Ok(path.clone());
    }
    data_dir.map(|dir| dir.join(default_name)).ok_or_else(|| {
        Error::Config(rgbot_config::Error::invalid(
            "session.path",
            "no data directory available; set session.path",
        ))
    })
}

/// Open the configured route store. Relative defaults live under `data_dir`.
pub async fn open_route_store(
    config: &SessionConfig,
    data_dir: Option<&Path>,
) -> Result<Arc<dyn RouteStore>> {
    let store: Arc<dyn RouteStore> = match config.store {
        SessionStoreKind::Memory => Arc::new(MemoryRouteStore::new()),
        SessionStoreKind::Json => {
            let dir = resolve_path(config, data_dir, JSON_DIR)?;
            info!(path = %dir.display(), "using JSON session store");
            Arc::new(JsonRouteStore::new(dir))
        },
        SessionStoreKind::Sqlite => {
            let file = resolve_path(config, data_dir, SQLITE_FILE)?;
            info!(path = %file.display(), "using SQLite session store");
            Arc::new(SqliteRouteStore::open(&file).await?)
        },
    };
    Ok(store)
}
