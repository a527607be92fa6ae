//! Schema evolution for the company/tenant custom columns.
//!
//! Columns are added or dropped one at a time after checking
//! `pragma_table_info`, so either direction can be re-run safely. The applied
//! revision lives in a one-row `schema_revision` table.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use sqlx::sqlite::SqliteConnection;

use crate::database::{try_column, Database};
use crate::error::{Result, StatsError};

/// Revision of the base console schema.
pub const BASE_REVISION: &str = "03ea244985ce";

/// A nullable column added by a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub table: &'static str,
    pub column: &'static str,
    pub sql_type: &'static str,
}

impl fmt::Display for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub revision: &'static str,
    pub down_revision: &'static str,
    pub columns: &'static [ColumnSpec],
}

const fn varchar_255(table: &'static str, column: &'static str) -> ColumnSpec {
    ColumnSpec {
        table,
        column,
        sql_type: "VARCHAR(255)",
    }
}

/// Company and access-scope columns used by the analytics integration.
pub const ASA_CUSTOM_COLUMNS: Migration = Migration {
    revision: "asa_custom_columns",
    down_revision: BASE_REVISION,
    columns: &[
        varchar_255("apps", "asa_company_id"),
        varchar_255("installed_apps", "asa_company_id"),
        varchar_255("workflows", "asa_company_id"),
        varchar_255("app_model_configs", "asa_company_id"),
        varchar_255("datasets", "asa_company_id"),
        varchar_255("datasets", "asa_uid"),
        varchar_255("datasets", "access_scope"),
    ],
};

/// Direction a migration was applied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upgrade,
    Downgrade,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upgrade => "upgrade",
            Self::Downgrade => "downgrade",
        }
    }
}

/// Outcome of one upgrade or downgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub direction: Direction,
    pub from_revision: String,
    pub to_revision: String,
    /// Columns actually added or dropped, as `table.column`.
    pub changed: Vec<String>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty() && self.from_revision == self.to_revision
    }
}

/// Applies [`ASA_CUSTOM_COLUMNS`] forwards or backwards.
pub struct MigrationRunner {
    db: Arc<Database>,
    migration: Migration,
}

impl MigrationRunner {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            migration: ASA_CUSTOM_COLUMNS,
        }
    }

    /// Revision currently recorded, or the base revision if none is.
    pub async fn current_revision(&self) -> Result<String> {
        let mut conn = self
            .db
            .pool()
            .acquire()
            .await
            .map_err(|e| StatsError::Migration(format!("Failed to acquire connection: {}", e)))?;
        ensure_revision_table(&mut conn).await?;
        read_revision(&mut conn).await
    }

    /// Add every missing column and record the new revision.
    pub async fn upgrade(&self) -> Result<MigrationReport> {
        self.apply(Direction::Upgrade).await
    }

    /// Drop every present column and record the base revision.
    pub async fn downgrade(&self) -> Result<MigrationReport> {
        self.apply(Direction::Downgrade).await
    }

    /// Column names of `table`, sorted.
    pub async fn table_columns(&self, table: &str) -> Result<BTreeSet<String>> {
        let mut conn = self
            .db
            .pool()
            .acquire()
            .await
            .map_err(|e| StatsError::Migration(format!("Failed to acquire connection: {}", e)))?;
        table_columns(&mut conn, table).await
    }

    async fn apply(&self, direction: Direction) -> Result<MigrationReport> {
        let migration = self.migration;
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StatsError::Migration(format!("Failed to begin transaction: {}", e)))?;

        ensure_revision_table(&mut tx).await?;
        let from_revision = read_revision(&mut tx).await?;
        if from_revision != migration.revision && from_revision != migration.down_revision {
            return Err(StatsError::Migration(format!(
                "Unknown schema revision '{}', expected '{}' or '{}'",
                from_revision, migration.down_revision, migration.revision
            )));
        }

        let mut changed = Vec::new();
        for spec in migration.columns {
            let columns = table_columns(&mut tx, spec.table).await?;
            if columns.is_empty() {
                return Err(StatsError::Migration(format!(
                    "Table '{}' does not exist",
                    spec.table
                )));
            }

            let present = columns.contains(spec.column);
            let statement = match direction {
                Direction::Upgrade if !present => format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    spec.table, spec.column, spec.sql_type
                ),
                Direction::Downgrade if present => {
                    format!("ALTER TABLE {} DROP COLUMN {}", spec.table, spec.column)
                }
                _ => continue,
            };

            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| StatsError::Migration(format!("Failed to alter {}: {}", spec, e)))?;

            tracing::info!(
                direction = direction.as_str(),
                column = %spec,
                "Applied column change"
            );
            changed.push(spec.to_string());
        }

        let to_revision = match direction {
            Direction::Upgrade => migration.revision,
            Direction::Downgrade => migration.down_revision,
        };
        write_revision(&mut tx, to_revision).await?;

        tx.commit()
            .await
            .map_err(|e| StatsError::Migration(format!("Failed to commit migration: {}", e)))?;

        Ok(MigrationReport {
            direction,
            from_revision,
            to_revision: to_revision.to_string(),
            changed,
        })
    }
}

async fn ensure_revision_table(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_revision (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            revision TEXT NOT NULL
        )",
    )
    .execute(&mut *conn)
    .await
    .map_err(|e| StatsError::Migration(format!("Failed to create revision table: {}", e)))?;

    Ok(())
}

async fn read_revision(conn: &mut SqliteConnection) -> Result<String> {
    let row = sqlx::query("SELECT revision FROM schema_revision WHERE id = 1")
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StatsError::Migration(format!("Failed to read revision: {}", e)))?;

    match row {
        Some(row) => try_column(&row, "revision"),
        None => Ok(BASE_REVISION.to_string()),
    }
}

async fn write_revision(conn: &mut SqliteConnection, revision: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO schema_revision (id, revision) VALUES (1, ?)
         ON CONFLICT(id) DO UPDATE SET revision = excluded.revision",
    )
    .bind(revision)
    .execute(&mut *conn)
    .await
    .map_err(|e| StatsError::Migration(format!("Failed to record revision: {}", e)))?;

    Ok(())
}

async fn table_columns(conn: &mut SqliteConnection, table: &str) -> Result<BTreeSet<String>> {
    let rows = sqlx::query("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| StatsError::Migration(format!("Failed to inspect {}: {}", table, e)))?;

    rows.iter().map(|row| try_column(row, "name")).collect()
}
