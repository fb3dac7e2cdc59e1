use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
}

async fn index() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "agora community API",
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
