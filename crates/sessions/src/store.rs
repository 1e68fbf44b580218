//! Route stores. Every backend upserts last-write-wins by `updated_at` and
//! isolates keys from each other: no store-wide lock is held across I/O.

use std::{
    fs::{self, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
};

use {async_trait::async_trait, dashmap::DashMap, fd_lock::RwLock, tracing::warn};

use crate::{
    error::{Error, Result},
    route::{RouteKey, SessionRoute},
};

#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn load(&self, key: &RouteKey) -> Result<Option<SessionRoute>>;

    /// Write `route` unless the stored record is newer. Returns the record
    /// that is stored afterwards.
    async fn upsert(&self, route: &SessionRoute) -> Result<SessionRoute>;
}

/// Pick the record that wins last-write-wins; ties go to the incoming one.
fn newer(existing: Option<SessionRoute>, incoming: &SessionRoute) -> SessionRoute {
    match existing {
        Some(existing) if existing.updated_at > incoming.updated_at => existing,
        Some(existing) => SessionRoute {
            created_at: existing.created_at.min(incoming.created_at),
            ..incoming.clone()
        },
        None => incoming.clone(),
    }
}

// ── In-memory ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryRouteStore {
    routes: DashMap<RouteKey, SessionRoute>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl RouteStore for MemoryRouteStore {
    async fn load(&self, key: &RouteKey) -> Result<Option<SessionRoute>> {
        Ok(self.routes.get(key).map(|r| r.value().clone()))
    }

    async fn upsert(&self, route: &SessionRoute) -> Result<SessionRoute> {
        let mut entry = self.routes.entry(route.key()).or_insert_with(|| route.clone());
        let stored = newer(Some(entry.value().clone()), route);
        *entry.value_mut() = stored.clone();
        Ok(stored)
    }
}

// ── JSON files ──────────────────────────────────────────────────────────────

/// One JSON file per conversation, guarded by an advisory file lock so
/// several processes can share the directory.
#[derive(Debug, Clone)]
pub struct JsonRouteStore {
    pub base_dir: PathBuf,
}

impl JsonRouteStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn path_for(&self, key: &RouteKey) -> PathBuf {
        self.base_dir.join(format!("{}.json", key.file_stem()))
    }
}

/// Parse a stored record. A corrupt file is logged and treated as missing so
/// the next commit rewrites it.
fn parse_record(raw: &str, path: &std::path::Path) -> Option<SessionRoute> {
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(route) => Some(route),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed route file");
            None
        },
    }
}

#[async_trait]
impl RouteStore for JsonRouteStore {
    async fn load(&self, key: &RouteKey) -> Result<Option<SessionRoute>> {
        let path = self.path_for(key);

        tokio::task::spawn_blocking(move || -> Result<Option<SessionRoute>> {
            let file = match OpenOptions::new().read(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let lock = RwLock::new(file);
            let guard = lock
                .read()
                .map_err(|e| Error::lock_failed(e.to_string()))?;
            let mut reader: &fs::File = &guard;
            let mut raw = String::new();
            reader.read_to_string(&mut raw)?;
            Ok(parse_record(&raw, &path))
        })
        .await?
    }

    async fn upsert(&self, route: &SessionRoute) -> Result<SessionRoute> {
        let path = self.path_for(&route.key());
        let incoming = route.clone();

        tokio::task::spawn_blocking(move || -> Result<SessionRoute> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&path)?;
            let mut lock = RwLock::new(file);
            let mut guard = lock
                .write()
                .map_err(|e| Error::lock_failed(e.to_string()))?;

            let mut raw = String::new();
            guard.read_to_string(&mut raw)?;
            let existing = parse_record(&raw, &path);
            let stored = newer(existing.clone(), &incoming);
            if existing.as_ref() != Some(&stored) {
                let body = serde_json::to_string_pretty(&stored)?;
                guard.set_len(0)?;
                guard.seek(SeekFrom::Start(0))?;
                guard.write_all(body.as_bytes())?;
                guard.sync_data()?;
            }
            Ok(stored)
        })
        .await?
    }
}
