//! Readiness endpoint: the webhook itself is up by construction once this
//! route answers, so the only live probe is the conversation store.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use orcabot_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub webhook: &'static str,
    pub conversation_store: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let checked_at = Utc::now().to_rfc3339();

    match store_probe(&state.db_pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthReport {
                status: "ready",
                webhook: "listening",
                conversation_store: "reachable",
                detail: None,
                checked_at,
            }),
        ),
        Err(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReport {
                status: "degraded",
                webhook: "listening",
                conversation_store: "unreachable",
                detail: Some(format!("conversation store probe failed: {error}")),
                checked_at,
            }),
        ),
    }
}

// Schema-agnostic so the probe also works on a pool that has not been
// migrated yet.
async fn store_probe(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sqlite_master").fetch_one(pool).await?;
    Ok(())
}
