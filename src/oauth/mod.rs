//! OAuth 2.0 account linking for X.
//!
//! # Architecture
//!
//! - [`OAuthManager`] - Orchestrates the flow: init, callback, refresh, status
//! - [`PendingStore`] - Pluggable pending-authorization persistence (file, SQLite, memory)
//! - [`TokenStorage`] - Pluggable token persistence (file, keyring, memory)
//! - [`TokenRecord`] - The singleton token with expiry checking
//! - [`Pkce`] - PKCE S256 challenge/verifier generation
//! - [`x`] - X token endpoint calls
//! - [`callback`] - Callback parameter validation and dashboard redirects
//!
//! # Example
//!
//! ```rust,ignore
//! use xreply::oauth::OAuthManager;
//!
//! let manager = OAuthManager::from_config(config)?;
//! let auth_url = manager.start_configured_flow()?;
//! // ... operator approves on x.com, callback fires ...
//! manager.handle_callback(&params).await?;
//! let token = manager.valid_access_token().await?;
//! ```

pub mod callback;
pub mod pending;
pub mod pkce;
pub mod storage;
pub mod token;
pub mod x;

pub use callback::{CallbackParams, dashboard_redirect_url, validate_callback_params};
pub use pending::{
    FilePendingStore, MemoryPendingStore, PendingAuthorization, PendingStore, SqlitePendingStore,
};
pub use pkce::Pkce;
pub use storage::{FileTokenStorage, MemoryTokenStorage, TokenStorage};
pub use token::{TokenRecord, TokenUpdate};
pub use x::{AuthorizationRequest, ClientCredentials};

#[cfg(feature = "system-keyring")]
pub use storage::KeyringTokenStorage;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{Config, PendingBackend, StorageBackend};
use crate::db::Database;
use crate::net::HttpClient;

// =============================================================================
// OAuthError
// =============================================================================

/// Errors that can occur during OAuth operations.
///
/// The `Display` text is what the operator sees on the dashboard, so it is
/// kept human readable and never contains token values.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// The provider reported an error on the callback (e.g. `access_denied`).
    #[error("{0}")]
    ProviderDenied(String),

    /// The callback was missing required parameters.
    #[error("{0}")]
    InvalidRequest(String),

    /// Client id, secret, redirect URI, or base URL is not configured.
    #[error("{0}")]
    Misconfigured(String),

    /// Unknown, consumed, or expired state token (possible CSRF).
    #[error("Invalid or expired state")]
    InvalidOrExpiredState,

    /// The token endpoint rejected a grant or returned an unusable body.
    #[error("Token exchange failed: {body}")]
    UpstreamExchangeFailed { status: Option<u16>, body: String },

    /// No token record exists; the account was never connected.
    #[error("Not authenticated. Connect X account first.")]
    NotAuthenticated,

    /// A refresh could not produce a usable token.
    #[error("{message}")]
    RefreshFailed { status: Option<u16>, message: String },

    /// An authenticated platform call ended in a non-2xx response.
    #[error("X API error: {status} {body}")]
    UpstreamCallFailed { status: u16, body: String },

    /// Token or pending-authorization storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl OAuthError {
    fn refresh_failed(message: impl Into<String>) -> Self {
        Self::RefreshFailed {
            status: None,
            message: message.into(),
        }
    }
}

// =============================================================================
// OAuthStatus
// =============================================================================

/// Status of the X account connection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OAuthStatus {
    /// Provider identifier.
    pub provider: String,
    /// Whether a token record exists.
    pub authenticated: bool,
    /// Whether the token is expired.
    pub expired: bool,
    /// Whether the token is inside the proactive refresh window.
    pub needs_refresh: bool,
    /// Seconds until the token expires (None if not authenticated).
    pub expires_in_secs: Option<u64>,
    /// Whether a refresh token is on record.
    pub has_refresh_token: bool,
}

// =============================================================================
// OAuthManager
// =============================================================================

/// Central OAuth manager.
///
/// Owns the X client settings, the pending-authorization store, the token
/// store, and the HTTP client used for the token endpoint.
pub struct OAuthManager {
    config: Arc<Config>,
    pending: Arc<dyn PendingStore>,
    storage: Arc<dyn TokenStorage>,
    http_client: reqwest::Client,
}

impl OAuthManager {
    /// Create a new OAuthManager.
    pub fn new(
        config: Arc<Config>,
        pending: Arc<dyn PendingStore>,
        storage: Arc<dyn TokenStorage>,
    ) -> Self {
        Self {
            config,
            pending,
            storage,
            http_client: HttpClient::for_oauth().into_inner(),
        }
    }

    /// Create an OAuthManager using the storage backends from config.
    pub fn from_config(config: Arc<Config>) -> anyhow::Result<Self> {
        let data_dir = &config.storage.data_dir;

        let pending: Arc<dyn PendingStore> = match config.storage.pending_backend {
            PendingBackend::File => Arc::new(FilePendingStore::new(data_dir)),
            PendingBackend::Sqlite => {
                let db = Database::open(&config.storage.database_path())?;
                Arc::new(SqlitePendingStore::new(db))
            }
            PendingBackend::Memory => Arc::new(MemoryPendingStore::new()),
        };

        let storage: Arc<dyn TokenStorage> = match config.storage.token_backend {
            StorageBackend::File => Arc::new(FileTokenStorage::new(data_dir)),
            #[cfg(feature = "system-keyring")]
            StorageBackend::Keyring => Arc::new(KeyringTokenStorage::new()),
            #[cfg(not(feature = "system-keyring"))]
            StorageBackend::Keyring => {
                warn!(
                    "Keyring storage requested but system-keyring feature not enabled, falling back to file storage"
                );
                Arc::new(FileTokenStorage::new(data_dir))
            }
            StorageBackend::Memory => Arc::new(MemoryTokenStorage::new()),
        };

        info!(
            pending_backend = pending.name(),
            token_backend = storage.name(),
            "OAuth storage initialised"
        );

        Ok(Self::new(config, pending, storage))
    }

    /// Get a reference to the pending-authorization store.
    pub fn pending(&self) -> Arc<dyn PendingStore> {
        self.pending.clone()
    }

    /// Get a reference to the token storage.
    pub fn storage(&self) -> Arc<dyn TokenStorage> {
        self.storage.clone()
    }

    /// Base URL the dashboard redirects go to.
    pub fn app_base_url(&self) -> &str {
        self.config.app.base_url_or_default()
    }

    fn credentials(&self, missing_message: &str) -> Result<ClientCredentials, OAuthError> {
        let x = &self.config.x;
        match (
            x.client_id.as_deref().filter(|s| !s.is_empty()),
            x.client_secret.as_deref().filter(|s| !s.is_empty()),
        ) {
            (Some(id), Some(secret)) => Ok(ClientCredentials {
                client_id: id.to_string(),
                client_secret: secret.to_string(),
            }),
            _ => Err(OAuthError::Misconfigured(missing_message.to_string())),
        }
    }

    // =========================================================================
    // Flow: init
    // =========================================================================

    /// Start an authorization attempt.
    ///
    /// Generates state, verifier and challenge, persists the pending record,
    /// and returns the URL the operator's browser should be sent to.
    pub fn start_flow(&self, request: &AuthorizationRequest) -> Result<String, OAuthError> {
        let state = pkce::generate_state();
        let pkce = Pkce::generate();

        self.pending.put(&state, &pkce.verifier)?;

        let url = x::build_authorize_url(&self.config.x.auth_url, request, &pkce.challenge, &state);
        info!(provider = x::PROVIDER_ID, "Started OAuth flow");
        Ok(url)
    }

    /// Start an authorization attempt from the configured client settings.
    ///
    /// Requires the client id, the redirect URI and the application base URL
    /// to be set explicitly.
    pub fn start_configured_flow(&self) -> Result<String, OAuthError> {
        let x = &self.config.x;
        let client_id = x.client_id.as_deref().filter(|s| !s.is_empty());
        let redirect_uri = x.redirect_uri.as_deref().filter(|s| !s.is_empty());
        let base_url = self.config.app.base_url.as_deref().filter(|s| !s.is_empty());

        let (Some(client_id), Some(redirect_uri), Some(_)) = (client_id, redirect_uri, base_url)
        else {
            warn!(provider = x::PROVIDER_ID, "OAuth flow requested but client is not configured");
            return Err(OAuthError::Misconfigured(
                "Missing X_CLIENT_ID, X_REDIRECT_URI, or APP_BASE_URL".to_string(),
            ));
        };

        self.start_flow(&AuthorizationRequest {
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scopes: x.scope_list(),
        })
    }

    // =========================================================================
    // Flow: callback
    // =========================================================================

    /// Complete an authorization attempt.
    ///
    /// A provider error is reported without touching the pending store. The
    /// state is consumed before the exchange, so a failed exchange cannot be
    /// retried with the same state.
    pub async fn handle_callback(&self, params: &CallbackParams) -> Result<TokenRecord, OAuthError> {
        let (code, state) = validate_callback_params(params)?;
        let credentials = self.credentials("Server misconfiguration")?;

        let code_verifier = self
            .pending
            .consume(&state)?
            .ok_or(OAuthError::InvalidOrExpiredState)?;

        let redirect_uri = self.config.x.effective_redirect_uri(self.app_base_url());
        let tokens = x::exchange_code(
            &self.http_client,
            &self.config.x.token_url,
            &credentials,
            &code,
            &redirect_uri,
            &code_verifier,
        )
        .await?;

        let record = self.storage.save(
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
            tokens.expires_in,
        )?;
        info!(
            provider = x::PROVIDER_ID,
            has_refresh_token = record.refresh_token.is_some(),
            "OAuth flow completed, token stored"
        );
        Ok(record)
    }

    // =========================================================================
    // Token management
    // =========================================================================

    /// Redeem the stored refresh token and merge the result into the record.
    ///
    /// The stored refresh token is kept unless the response rotates it.
    pub async fn refresh(&self) -> Result<TokenRecord, OAuthError> {
        let current = self.storage.get()?.ok_or(OAuthError::NotAuthenticated)?;
        let refresh_token = current
            .refresh_token
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| OAuthError::refresh_failed("No refresh token available"))?;
        let credentials = self.credentials("Missing X client configuration")?;

        let tokens = x::refresh_token(
            &self.http_client,
            &self.config.x.token_url,
            &credentials,
            refresh_token,
        )
        .await?;

        let record = self.storage.update(TokenUpdate {
            access_token: Some(tokens.access_token),
            refresh_token: tokens.refresh_token,
            expires_in: Some(tokens.expires_in),
            expires_at: None,
        })?;
        debug!(provider = x::PROVIDER_ID, "Token refreshed successfully");
        Ok(record)
    }

    /// Get the current connection status. Never exposes token values.
    pub fn status(&self) -> Result<OAuthStatus, OAuthError> {
        let status = match self.storage.get()? {
            Some(t) => OAuthStatus {
                provider: x::PROVIDER_ID.to_string(),
                authenticated: true,
                expired: t.is_expired(),
                needs_refresh: t.needs_refresh(),
                expires_in_secs: Some(t.time_until_expiry().as_secs()),
                has_refresh_token: t.refresh_token.is_some(),
            },
            None => OAuthStatus {
                provider: x::PROVIDER_ID.to_string(),
                authenticated: false,
                expired: false,
                needs_refresh: false,
                expires_in_secs: None,
                has_refresh_token: false,
            },
        };
        Ok(status)
    }

    /// Get a usable access token, refreshing first when it expires within
    /// the proactive buffer.
    pub async fn valid_access_token(&self) -> Result<String, OAuthError> {
        let token = self.storage.get()?.ok_or(OAuthError::NotAuthenticated)?;

        if !token.needs_refresh() {
            return Ok(token.access_token);
        }

        debug!(provider = x::PROVIDER_ID, "Token needs refresh, refreshing...");
        self.refresh().await?;
        self.current_access_token()
    }

    /// Re-read the stored access token after a refresh.
    fn current_access_token(&self) -> Result<String, OAuthError> {
        self.storage
            .get()?
            .map(|t| t.access_token)
            .ok_or_else(|| OAuthError::refresh_failed("Token refresh failed"))
    }
}

#[async_trait::async_trait]
impl crate::platform::TokenSource for OAuthManager {
    async fn access_token(&self) -> Result<String, OAuthError> {
        self.valid_access_token().await
    }

    async fn refresh_access_token(&self) -> Result<String, OAuthError> {
        self.refresh().await?;
        self.current_access_token()
    }
}
