//! OAuth callback handling.
//!
//! X redirects the operator's browser back with `?code=...&state=...` (or
//! `?error=...`). The outcome is reported by redirecting once more, to the
//! dashboard, with `?success=1` or `?error=<message>`.

use serde::Deserialize;
use tracing::warn;

use super::OAuthError;

/// Query parameters from the OAuth callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Validate callback parameters and extract `(code, state)`.
///
/// A provider error wins over everything else. Empty values count as missing.
pub fn validate_callback_params(params: &CallbackParams) -> Result<(String, String), OAuthError> {
    if let Some(error) = params.error.as_deref().filter(|e| !e.is_empty()) {
        let desc = params
            .error_description
            .as_deref()
            .unwrap_or("Unknown error");
        warn!(error = %error, description = %desc, "OAuth error from provider");
        return Err(OAuthError::ProviderDenied(error.to_string()));
    }

    let code = params.code.as_deref().filter(|c| !c.is_empty());
    let state = params.state.as_deref().filter(|s| !s.is_empty());
    match (code, state) {
        (Some(code), Some(state)) => Ok((code.to_string(), state.to_string())),
        _ => Err(OAuthError::InvalidRequest(
            "Missing code or state".to_string(),
        )),
    }
}

/// Dashboard URL reporting the outcome of a callback.
pub fn dashboard_redirect_url(app_base_url: &str, outcome: &Result<(), OAuthError>) -> String {
    let base = app_base_url.trim_end_matches('/');
    match outcome {
        Ok(()) => format!("{base}/dashboard?success=1"),
        Err(e) => format!(
            "{base}/dashboard?error={}",
            urlencoding::encode(&e.to_string())
        ),
    }
}
