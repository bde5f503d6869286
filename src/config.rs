use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::oauth::x::{DEFAULT_AUTH_URL, DEFAULT_SCOPES, DEFAULT_TOKEN_URL};

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "server.host") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    /// Get all overrides as a map of setting key -> env var name.
    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub x: XConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Where the operator's browser lands after the OAuth round trip.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Public base URL of the application. Starting a flow requires it to be
    /// set explicitly; callback redirects fall back to
    /// `http://localhost:3000`.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl AppConfig {
    pub fn base_url_or_default(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_APP_BASE_URL)
    }
}

/// X OAuth client registration and API endpoints.
#[derive(Clone, Deserialize, Serialize)]
pub struct XConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Registered callback URL. Defaults to `{app.base_url}/api/auth/x/callback`
    /// for the token exchange.
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_x_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_x_token_url")]
    pub token_url: String,
    #[serde(default = "default_x_api_base")]
    pub api_base: String,
    /// Space-separated scope list.
    #[serde(default = "default_x_scopes")]
    pub scopes: String,
}

impl Default for XConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            auth_url: default_x_auth_url(),
            token_url: default_x_token_url(),
            api_base: default_x_api_base(),
            scopes: default_x_scopes(),
        }
    }
}

impl std::fmt::Debug for XConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("api_base", &self.api_base)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl XConfig {
    pub fn scope_list(&self) -> Vec<String> {
        self.scopes.split_whitespace().map(str::to_string).collect()
    }

    /// Redirect URI sent with the code exchange: the configured one, or the
    /// callback route under `app_base_url`.
    pub fn effective_redirect_uri(&self, app_base_url: &str) -> String {
        match self.redirect_uri.as_deref().filter(|s| !s.is_empty()) {
            Some(uri) => uri.to_string(),
            None => format!(
                "{}/api/auth/x/callback",
                app_base_url.trim_end_matches('/')
            ),
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_openai_model(),
            base_url: default_openai_base_url(),
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding `tokens.json`, `pkce-state.json` and `xreply.db`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub pending_backend: PendingBackend,
    #[serde(default)]
    pub token_backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pending_backend: PendingBackend::default(),
            token_backend: StorageBackend::default(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("xreply.db")
    }
}

/// Backend for the singleton token record.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Keyring => write!(f, "keyring"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown storage backend: {s}")),
        }
    }
}

/// Backend for pending authorizations.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PendingBackend {
    #[default]
    File,
    Sqlite,
    Memory,
}

impl std::fmt::Display for PendingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Sqlite => write!(f, "sqlite"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for PendingBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown pending backend: {s}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

pub const DEFAULT_APP_BASE_URL: &str = "http://localhost:3000";

const fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_x_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}
fn default_x_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}
fn default_x_api_base() -> String {
    "https://api.x.com/2".to_string()
}
fn default_x_scopes() -> String {
    DEFAULT_SCOPES.join(" ")
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("xreply")
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Config loading and env overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. A missing file means defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// The X and OpenAI credentials use their conventional unprefixed names;
    /// everything else is `XREPLY_*`.
    fn apply_env_overrides(&mut self) {
        let mut ov = EnvOverrides::default();

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    }
                }
            };
        }
        macro_rules! env_path {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = PathBuf::from(val);
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_opt_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = if val.is_empty() { None } else { Some(val) };
                    ov.record($key, $env);
                }
            };
        }

        // -- Server --
        env_str!("server.host", "XREPLY_SERVER_HOST", self.server.host);
        env_parse!("server.port", "XREPLY_SERVER_PORT", self.server.port);
        if let Ok(val) = std::env::var("XREPLY_SERVER_CORS_ORIGINS") {
            self.server.cors_origins = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            ov.record("server.cors_origins", "XREPLY_SERVER_CORS_ORIGINS");
        }

        // -- App --
        env_opt_str!("app.base_url", "APP_BASE_URL", self.app.base_url);

        // -- X --
        env_opt_str!("x.client_id", "X_CLIENT_ID", self.x.client_id);
        env_opt_str!("x.client_secret", "X_CLIENT_SECRET", self.x.client_secret);
        env_opt_str!("x.redirect_uri", "X_REDIRECT_URI", self.x.redirect_uri);

        // -- OpenAI --
        env_opt_str!("openai.api_key", "OPENAI_API_KEY", self.openai.api_key);
        env_str!("openai.model", "OPENAI_MODEL", self.openai.model);
        env_str!("openai.base_url", "OPENAI_BASE_URL", self.openai.base_url);

        // -- Storage --
        env_path!("storage.data_dir", "XREPLY_DATA_DIR", self.storage.data_dir);
        env_parse!(
            "storage.pending_backend",
            "XREPLY_PENDING_BACKEND",
            self.storage.pending_backend
        );
        env_parse!(
            "storage.token_backend",
            "XREPLY_TOKEN_BACKEND",
            self.storage.token_backend
        );

        // -- Logging --
        env_str!("logging.level", "XREPLY_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "XREPLY_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }
}

// Helper for the default data directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
