//! X (formerly Twitter) OAuth 2.0 authorization-code flow with PKCE.
//!
//! # Key Characteristics
//! - Token request format: form-encoded
//! - Client authentication: HTTP Basic `client_id:client_secret` (confidential client)
//! - Refresh tokens are only issued when `offline.access` is granted
//!
//! # Endpoints
//! - Authorization: `https://x.com/i/oauth2/authorize`
//! - Token: `https://api.x.com/2/oauth2/token`

use serde::Deserialize;
use tracing::{debug, warn};

use super::OAuthError;
use super::pkce::PKCE_METHOD;

/// Provider identifier used in logs and status reports.
pub const PROVIDER_ID: &str = "x";

/// Default authorization URL.
pub const DEFAULT_AUTH_URL: &str = "https://x.com/i/oauth2/authorize";

/// Default token URL.
pub const DEFAULT_TOKEN_URL: &str = "https://api.x.com/2/oauth2/token";

/// Default scopes: read/write posts, read the profile, and a refresh token.
pub const DEFAULT_SCOPES: &[&str] = &["tweet.read", "tweet.write", "users.read", "offline.access"];

/// Parameters that vary per authorization attempt.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// Confidential-client credentials for the token endpoint.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Build the X authorization URL.
///
/// Parameters are form-urlencoded (space as `+`), so the scope list arrives
/// as one space-separated value.
pub fn build_authorize_url(
    auth_url: &str,
    request: &AuthorizationRequest,
    code_challenge: &str,
    state: &str,
) -> String {
    let scopes = request.scopes.join(" ");
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("response_type", "code")
        .append_pair("client_id", &request.client_id)
        .append_pair("redirect_uri", &request.redirect_uri)
        .append_pair("scope", &scopes)
        .append_pair("state", state)
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", PKCE_METHOD)
        .finish();
    let separator = if auth_url.contains('?') { '&' } else { '?' };
    format!("{auth_url}{separator}{query}")
}

/// Successful token-endpoint response for either grant.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// POST a form to the token endpoint and return `(status, body)`.
async fn post_token_form(
    http_client: &reqwest::Client,
    token_url: &str,
    credentials: &ClientCredentials,
    form: &[(&str, &str)],
) -> Result<(reqwest::StatusCode, String), OAuthError> {
    let response = http_client
        .post(token_url)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(form)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}

/// Longest access-token lifetime accepted from the token endpoint (one year).
/// X issues two-hour tokens.
const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 60 * 60;

fn parse_token_response(status: reqwest::StatusCode, body: &str) -> Result<TokenResponse, OAuthError> {
    let tokens: TokenResponse =
        serde_json::from_str(body).map_err(|e| OAuthError::UpstreamExchangeFailed {
            status: Some(status.as_u16()),
            body: format!("Failed to parse token response: {}", e),
        })?;

    if !(0..=MAX_EXPIRES_IN_SECS).contains(&tokens.expires_in) {
        warn!(
            provider = PROVIDER_ID,
            expires_in = tokens.expires_in,
            "Token response carries an unusable lifetime"
        );
        return Err(OAuthError::UpstreamExchangeFailed {
            status: Some(status.as_u16()),
            body: format!("Invalid expires_in in token response: {}", tokens.expires_in),
        });
    }
    Ok(tokens)
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    http_client: &reqwest::Client,
    token_url: &str,
    credentials: &ClientCredentials,
    code: &str,
    redirect_uri: &str,
    code_verifier: &str,
) -> Result<TokenResponse, OAuthError> {
    debug!(provider = PROVIDER_ID, "Exchanging authorization code for tokens");

    let (status, body) = post_token_form(
        http_client,
        token_url,
        credentials,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &credentials.client_id),
            ("code_verifier", code_verifier),
        ],
    )
    .await?;

    if !status.is_success() {
        warn!(provider = PROVIDER_ID, status = status.as_u16(), "Token exchange failed");
        return Err(OAuthError::UpstreamExchangeFailed {
            status: Some(status.as_u16()),
            body,
        });
    }

    let tokens = parse_token_response(status, &body)?;
    debug!(
        provider = PROVIDER_ID,
        has_refresh_token = tokens.refresh_token.is_some(),
        expires_in = tokens.expires_in,
        "Token exchange successful"
    );
    Ok(tokens)
}

/// Redeem a refresh token for a new access token.
///
/// A response without `refresh_token` means the old one stays valid; the
/// caller keeps it.
pub async fn refresh_token(
    http_client: &reqwest::Client,
    token_url: &str,
    credentials: &ClientCredentials,
    refresh_token_value: &str,
) -> Result<TokenResponse, OAuthError> {
    debug!(provider = PROVIDER_ID, "Refreshing access token");

    let (status, body) = post_token_form(
        http_client,
        token_url,
        credentials,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token_value),
            ("client_id", &credentials.client_id),
        ],
    )
    .await?;

    if !status.is_success() {
        warn!(provider = PROVIDER_ID, status = status.as_u16(), "Token refresh failed");
        return Err(OAuthError::RefreshFailed {
            status: Some(status.as_u16()),
            message: format!("Token refresh failed: {} {}", status.as_u16(), body),
        });
    }

    let tokens = parse_token_response(status, &body)?;
    debug!(
        provider = PROVIDER_ID,
        rotated = tokens.refresh_token.is_some(),
        "Token refresh successful"
    );
    Ok(tokens)
}
