pub mod auth;
pub mod health;
pub mod twitter;

use axum::Router;
use axum::routing::{get, post};

use crate::AppState;

/// Build the API router.
///
/// Route layout:
/// ```text
/// /health                              GET
/// /api/auth/x/oauth                    GET   302 to X consent screen
/// /api/auth/x/callback                 GET   302 to dashboard
/// /api/auth/x/refresh                  POST
/// /api/auth/x/status                   GET
/// /api/twitter/generate                POST
/// /api/twitter/reply                   POST
/// /api/twitter/search-with-replies     POST
/// ```
pub fn build_api_router() -> Router<AppState> {
    let auth_routes = Router::new()
        .route("/oauth", get(auth::start_oauth))
        .route("/callback", get(auth::oauth_callback))
        .route("/refresh", post(auth::refresh_token))
        .route("/status", get(auth::oauth_status));

    let twitter_routes = Router::new()
        .route("/generate", post(twitter::generate_reply))
        .route("/reply", post(twitter::post_reply))
        .route("/search-with-replies", post(twitter::search_with_replies));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/auth/x", auth_routes)
        .nest("/api/twitter", twitter_routes)
}
