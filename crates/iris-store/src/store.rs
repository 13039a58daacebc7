//! SqliteStore — SQLite persistence for message and analytics records.
//!
//! Tables: `outbound_messages`, `inbound_messages`, `template_analytics`,
//! `analytics_clicks`, `analytics_costs`.

use iris_core::{Error, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

/// SQLite-backed store for message records and template analytics.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
}

/// Map a sqlx error into the domain error space.
pub(crate) fn db_err(e: sqlx::Error) -> Error {
    Error::Store(e.to_string())
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub async fn from_path(db_path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Store(format!("mkdir: {e}")))?;
        }
        let url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(db_err)?;

        // Enable WAL for read/write concurrency
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("Message store initialized at {}", db_path.display());
        Ok(store)
    }

    /// In-memory store (for tests).
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;
        let store = Self { pool };
        store.run_migrations().await?;
        debug!("In-memory message store initialized");
        Ok(store)
    }

    // ── Migrations ──────────────────────────────────────────────

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS outbound_messages (
                id              TEXT PRIMARY KEY,
                wa_id           TEXT,
                to_number       TEXT NOT NULL,
                kind            TEXT NOT NULL,
                message_content TEXT NOT NULL,
                payload         TEXT NOT NULL,
                status          TEXT NOT NULL,
                error_details   TEXT,
                error_code      INTEGER,
                context_wa_id   TEXT,
                created_at      TEXT NOT NULL,
                sent_at         TEXT,
                delivered_at    TEXT,
                read_at         TEXT,
                failed_at       TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_outbound_wa_id
             ON outbound_messages(wa_id) WHERE wa_id IS NOT NULL",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS inbound_messages (
                id              TEXT PRIMARY KEY,
                wa_id           TEXT NOT NULL UNIQUE,
                from_number     TEXT NOT NULL,
                sender_name     TEXT,
                kind            TEXT NOT NULL,
                message_content TEXT NOT NULL,
                payload         TEXT NOT NULL,
                context_wa_id   TEXT,
                received_at     TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS template_analytics (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                template_id     TEXT NOT NULL,
                start_ts        INTEGER NOT NULL,
                end_ts          INTEGER NOT NULL,
                sent_count      INTEGER NOT NULL DEFAULT 0,
                delivered_count INTEGER NOT NULL DEFAULT 0,
                read_count      INTEGER NOT NULL DEFAULT 0,
                UNIQUE (template_id, start_ts, end_ts)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        // button_content uses '' for non-button clicks: SQLite treats NULLs
        // as distinct in unique indexes, which would break upsert idempotence.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS analytics_clicks (
                data_point_id  INTEGER NOT NULL REFERENCES template_analytics(id),
                click_type     TEXT NOT NULL,
                button_content TEXT NOT NULL DEFAULT '',
                count          INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (data_point_id, click_type, button_content)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS analytics_costs (
                data_point_id INTEGER NOT NULL REFERENCES template_analytics(id),
                cost_type     TEXT NOT NULL,
                value         REAL NOT NULL DEFAULT 0,
                currency      TEXT NOT NULL,
                PRIMARY KEY (data_point_id, cost_type)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
