//! Bearer-authenticated calls with one reactive refresh.
//!
//! Every outbound X API call goes through [`AuthenticatedClient::call`]:
//! the token is refreshed proactively when it is about to expire, and a 401
//! triggers exactly one refresh followed by exactly one retry.

use std::sync::Arc;

use tracing::warn;

use crate::oauth::OAuthError;

/// Source of bearer tokens for the connected account.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// A token that is not about to expire, refreshing first if needed.
    async fn access_token(&self) -> Result<String, OAuthError>;

    /// Force a refresh and return the new token.
    async fn refresh_access_token(&self) -> Result<String, OAuthError>;
}

/// How many times a 401 may be answered with refresh-and-retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnauthorizedRetry {
    pub max_retries: u32,
}

impl Default for UnauthorizedRetry {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

/// Sends requests with the current bearer token.
#[derive(Clone)]
pub struct AuthenticatedClient {
    tokens: Arc<dyn TokenSource>,
    retry: UnauthorizedRetry,
}

impl AuthenticatedClient {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            tokens,
            retry: UnauthorizedRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: UnauthorizedRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Send the request produced by `build` for the current token.
    ///
    /// `build` receives the bearer token and may be invoked again after a
    /// refresh, so it must be repeatable. The final non-2xx status and body
    /// are returned verbatim as [`OAuthError::UpstreamCallFailed`].
    pub async fn call<F>(&self, build: F) -> Result<reqwest::Response, OAuthError>
    where
        F: Fn(&str) -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut token = self.tokens.access_token().await?;
        let mut retries = 0;

        loop {
            let response = build(&token).send().await?;
            let status = response.status();

            if status == reqwest::StatusCode::UNAUTHORIZED && retries < self.retry.max_retries {
                warn!(status = status.as_u16(), "X API rejected token, refreshing and retrying");
                token = self.tokens.refresh_access_token().await?;
                retries += 1;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(OAuthError::UpstreamCallFailed {
                    status: status.as_u16(),
                    body,
                });
            }

            return Ok(response);
        }
    }
}
