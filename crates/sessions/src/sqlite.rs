//! SQLite-backed route store.

use {async_trait::async_trait, rgbot_common::types::ChannelType};

use crate::{
    error::{Context, Result},
    route::{RouteKey, RouteTarget, SessionRoute},
    store::RouteStore,
};

#[derive(sqlx::FromRow)]
struct RouteRow {
    channel: String,
    account_id: String,
    conversation_key: String,
    last_route_target: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<RouteRow> for SessionRoute {
    type Error = crate::Error;

    fn try_from(r: RouteRow) -> Result<Self> {
        let channel: ChannelType = r
            .channel
            .parse()
            .with_context(|| format!("stored route for {}", r.conversation_key))?;
        let last_route_target: RouteTarget = serde_json::from_str(&r.last_route_target)?;
        Ok(Self {
            channel,
            account_id: r.account_id,
            conversation_key: r.conversation_key,
            last_route_target,
            created_at: r.created_at as u64,
            updated_at: r.updated_at as u64,
        })
    }
}

/// Route store on a shared SQLite pool. Each upsert is a single atomic
/// statement, so writers for different keys never wait on each other beyond
/// SQLite's own write serialization.
#[derive(Debug, Clone)]
pub struct SqliteRouteStore {
    pool: sqlx::SqlitePool,
}

impl SqliteRouteStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) a database file and apply migrations.
    pub async fn open(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(options).await?;
        crate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    /// All routes, most recently updated first.
    pub async fn list(&self) -> Result<Vec<SessionRoute>> {
        let rows = sqlx::query_as::<_, RouteRow>(
            "SELECT channel, account_id, conversation_key, last_route_target, created_at, \
             updated_at FROM session_routes ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SessionRoute::try_from).collect()
    }
}

#[async_trait]
impl RouteStore for SqliteRouteStore {
    async fn load(&self, key: &RouteKey) -> Result<Option<SessionRoute>> {
        let row = sqlx::query_as::<_, RouteRow>(
            "SELECT channel, account_id, conversation_key, last_route_target, created_at, \
             updated_at FROM session_routes \
             WHERE channel = ? AND account_id = ? AND conversation_key = ?",
        )
        .bind(key.channel.as_str())
        .bind(&key.account_id)
        .bind(&key.conversation_key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SessionRoute::try_from).transpose()
    }

    async fn upsert(&self, route: &SessionRoute) -> Result<SessionRoute> {
        let target = serde_json::to_string(&route.last_route_target)?;
        sqlx::query(
            r#"INSERT INTO session_routes
                 (channel, account_id, conversation_key, last_route_target, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(channel, account_id, conversation_key) DO UPDATE SET
                 last_route_target = excluded.last_route_target,
                 created_at = MIN(session_routes.created_at, excluded.created_at),
                 updated_at = excluded.updated_at
               WHERE excluded.updated_at >= session_routes.updated_at"#,
        )
        .bind(route.channel.as_str())
        .bind(&route.account_id)
        .bind(&route.conversation_key)
        .bind(target)
        .bind(route.created_at as i64)
        .bind(route.updated_at as i64)
        .execute(&self.pool)
        .await?;

        self.load(&route.key())
            .await?
            .context("route vanished after upsert")
    }
}
