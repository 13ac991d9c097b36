use axum::{extract::State, response::Json};
use chrono::Utc;
use mongodb::bson::doc;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "TutorConnected API is running",
    }))
}

/// Liveness plus a best-effort database ping. Always 200.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match state.db.run_command(doc! { "ping": 1 }).await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!("Health check ping failed: {}", e);
            "disconnected"
        }
    };

    Json(json!({
        "success": true,
        "status": "ok",
        "database": database,
        "gateway": state.gateway.is_some(),
        "timestamp": Utc::now(),
    }))
}
