//! Outbound HTTP client.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Default user agent for the application.
pub const USER_AGENT: &str = concat!("xreply/", env!("CARGO_PKG_VERSION"));

/// Default connection timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request timeout. Text generation is the slowest caller.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Request timeout for the OAuth token endpoint.
pub const OAUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client wrapper.
///
/// Provides a standard configuration (User-Agent, timeouts) for the X API,
/// the token endpoint, and the text-generation service.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    /// Create a new HTTP client with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Client for token-endpoint calls: shorter timeout, redirects never followed.
    pub fn for_oauth() -> Self {
        Self::builder()
            .request_timeout(OAUTH_TIMEOUT)
            .no_redirects()
            .build()
    }

    /// Create a new builder.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Unwrap into the reqwest client.
    pub fn into_inner(self) -> Client {
        self.inner
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    builder: ClientBuilder,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            builder: Client::builder()
                .user_agent(USER_AGENT)
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT),
        }
    }
}

impl HttpClientBuilder {
    /// Set request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.timeout(timeout);
        self
    }

    /// Never follow redirects.
    pub fn no_redirects(mut self) -> Self {
        self.builder = self.builder.redirect(reqwest::redirect::Policy::none());
        self
    }

    /// Build the client.
    pub fn build(self) -> HttpClient {
        let inner = match self.builder.build() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to build HTTP client with custom config: {}; using defaults", e);
                Client::default()
            }
        };
        HttpClient { inner }
    }
}
