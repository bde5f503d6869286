//! Account-linking endpoints.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::warn;

use crate::AppState;
use crate::error::AppError;
use crate::oauth::{CallbackParams, OAuthStatus, dashboard_redirect_url};

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub ok: bool,
}

/// 302 Found to `location`.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// GET /api/auth/x/oauth
///
/// Starts an authorization attempt and sends the browser to X's consent
/// screen.
pub async fn start_oauth(State(state): State<AppState>) -> Result<Response, AppError> {
    let url = state.oauth.start_configured_flow()?;
    Ok(found(&url))
}

/// GET /api/auth/x/callback
///
/// Always answers with a redirect to the dashboard; failures travel in the
/// `error` query parameter.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let outcome = state.oauth.handle_callback(&params).await.map(|_| ());
    if let Err(ref e) = outcome {
        warn!(error = %e, "OAuth callback failed");
    }
    found(&dashboard_redirect_url(state.oauth.app_base_url(), &outcome))
}

/// POST /api/auth/x/refresh
pub async fn refresh_token(State(state): State<AppState>) -> Result<Json<RefreshResponse>, AppError> {
    state.oauth.refresh().await?;
    Ok(Json(RefreshResponse { ok: true }))
}

/// GET /api/auth/x/status
pub async fn oauth_status(State(state): State<AppState>) -> Result<Json<OAuthStatus>, AppError> {
    Ok(Json(state.oauth.status()?))
}
