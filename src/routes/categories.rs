use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::db::categories;
use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/categories", get(list_categories))
}

/// Active categories in display order.
async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let categories = categories::list(&conn, true)?;
    Ok(Json(json!({ "categories": categories })))
}
