//! Health check HTTP endpoint for deployment platform monitoring.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::database::Database;

/// Health report with build metadata.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
}

impl HealthReport {
    fn new(database_ok: bool) -> Self {
        Self {
            status: if database_ok { "ok" } else { "degraded" },
            database: if database_ok { "ok" } else { "unavailable" },
            version: env!("CARGO_PKG_VERSION"),
            commit: env!("APPSTAT_GIT_COMMIT"),
            built_at: env!("APPSTAT_BUILT_AT"),
        }
    }
}

/// Router serving `/health`.
pub fn router(db: Arc<Database>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(db)
}

/// Returns 200 when the database answers, 503 otherwise.
async fn health_handler(State(db): State<Arc<Database>>) -> (StatusCode, Json<HealthReport>) {
    match db.health_check().await {
        Ok(()) => (StatusCode::OK, Json(HealthReport::new(true))),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthReport::new(false)),
            )
        }
    }
}
