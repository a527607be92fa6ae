//! SQLite database access.
//!
//! Owns the connection pool and the base console schema, and resolves the
//! accounts and apps that statistics requests are scoped to.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{Result, StatsError};
use crate::models::{Account, App, AppMode};

/// Status of apps that may be queried.
const APP_STATUS_NORMAL: &str = "normal";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) a database file and initialize the base schema.
    pub async fn new(path: &str, max_connections: u32) -> Result<Self> {
        let db_path = Path::new(path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StatsError::Database(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StatsError::Database(format!("Failed to connect to database: {}", e)))?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Create an in-memory database for testing.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        // A single connection, since every `:memory:` connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StatsError::Database(format!("Failed to create in-memory db: {}", e)))?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Initialize the base schema. Safe to run repeatedly.
    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StatsError::Database(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StatsError::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    /// Look up a console account by ID.
    pub async fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, name, timezone, current_tenant_id FROM accounts WHERE id = ?",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StatsError::Database(format!("Failed to get account: {}", e)))?;

        row.map(|row| {
            Ok(Account {
                id: try_column(&row, "id")?,
                name: try_column(&row, "name")?,
                timezone: try_column(&row, "timezone")?,
                current_tenant_id: try_column(&row, "current_tenant_id")?,
            })
        })
        .transpose()
    }

    /// Look up a usable app owned by `tenant_id`.
    ///
    /// Apps of other tenants, apps not in `normal` status and apps with an
    /// unrecognized mode are reported as absent.
    pub async fn get_tenant_app(&self, tenant_id: &str, app_id: &str) -> Result<Option<App>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, mode, status FROM apps
             WHERE id = ? AND tenant_id = ? AND status = ?",
        )
        .bind(app_id)
        .bind(tenant_id)
        .bind(APP_STATUS_NORMAL)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StatsError::Database(format!("Failed to get app: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mode: String = try_column(&row, "mode")?;
        let Some(mode) = AppMode::parse(&mode) else {
            tracing::warn!(app_id = %app_id, mode = %mode, "App has an unrecognized mode");
            return Ok(None);
        };

        Ok(Some(App {
            id: try_column(&row, "id")?,
            tenant_id: try_column(&row, "tenant_id")?,
            name: try_column(&row, "name")?,
            mode,
            status: try_column(&row, "status")?,
        }))
    }
}

/// Read a column, mapping decode failures to a database error.
pub(crate) fn try_column<'r, T>(row: &'r sqlx::sqlite::SqliteRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StatsError::Database(format!("Failed to read column {}: {}", column, e)))
}

/// Base console schema. Timestamps are UTC text (`YYYY-MM-DD HH:MM:SS`).
const SCHEMA: &str = r#"
-- Console accounts
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    timezone TEXT,
    current_tenant_id TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

-- Applications
CREATE TABLE IF NOT EXISTS apps (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    mode TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'normal',
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS installed_apps (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    app_id TEXT NOT NULL,
    app_owner_tenant_id TEXT NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS workflows (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    app_id TEXT NOT NULL,
    type TEXT NOT NULL,
    version TEXT NOT NULL,
    graph TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS app_model_configs (
    id TEXT PRIMARY KEY,
    app_id TEXT NOT NULL,
    provider TEXT,
    model_id TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS datasets (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    permission TEXT DEFAULT 'only_me',
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

-- Conversations and messages
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    app_id TEXT NOT NULL,
    from_end_user_id TEXT,
    invoke_from TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_conversations_app_created
    ON conversations(app_id, created_at);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    app_id TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    from_end_user_id TEXT,
    message_tokens INTEGER NOT NULL DEFAULT 0,
    answer_tokens INTEGER NOT NULL DEFAULT 0,
    total_price REAL DEFAULT 0,
    currency TEXT NOT NULL DEFAULT 'USD',
    provider_response_latency REAL NOT NULL DEFAULT 0,
    invoke_from TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_messages_app_created
    ON messages(app_id, created_at);

CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages(conversation_id);

CREATE TABLE IF NOT EXISTS message_feedbacks (
    id TEXT PRIMARY KEY,
    app_id TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    message_id TEXT NOT NULL,
    rating TEXT NOT NULL,
    from_source TEXT NOT NULL DEFAULT 'user',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_message_feedbacks_message
    ON message_feedbacks(message_id);

-- Workflow executions
CREATE TABLE IF NOT EXISTS workflow_runs (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    app_id TEXT NOT NULL,
    workflow_id TEXT NOT NULL,
    status TEXT NOT NULL,
    elapsed_time REAL NOT NULL DEFAULT 0,
    total_tokens INTEGER NOT NULL DEFAULT 0,
    total_steps INTEGER DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_workflow_runs_app_created
    ON workflow_runs(app_id, created_at);

CREATE TABLE IF NOT EXISTS workflow_node_executions (
    id TEXT PRIMARY KEY,
    app_id TEXT NOT NULL,
    workflow_run_id TEXT NOT NULL,
    node_id TEXT NOT NULL,
    "index" INTEGER NOT NULL DEFAULT 0,
    execution_metadata TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_node_executions_run
    ON workflow_node_executions(workflow_run_id);
"#;
