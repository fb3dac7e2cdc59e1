use axum::routing::{get, post};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/oauth/{provider}", get(handlers::oauth_start))
        .route("/api/auth/callback/{provider}", get(handlers::oauth_callback))
}
