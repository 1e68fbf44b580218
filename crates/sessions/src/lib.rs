//! Session route storage.
//!
//! A route is the channel/account/thread target used to reach a conversation.
//! Routes are addressed by `(channel, account_id, conversation_key)` and kept
//! in memory, as one JSON file per conversation, or in SQLite.

pub mod error;
pub mod recorder;
pub mod route;
pub mod sqlite;
pub mod store;

pub use {
    error::{Error, Result},
    recorder::{Committed, SessionRecorder},
    route::{RouteKey, RouteTarget, SessionRoute},
    sqlite::SqliteRouteStore,
    store::{JsonRouteStore, MemoryRouteStore, RouteStore},
};

/// Run database migrations for the sessions crate.
///
/// Creates the `session_routes` table.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
