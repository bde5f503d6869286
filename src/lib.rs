pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod generate;
pub mod net;
pub mod oauth;
pub mod platform;

use crate::config::Config;
use crate::generate::{OpenAiGenerator, ReplyGenerator};
use crate::net::HttpClient;
use crate::oauth::OAuthManager;
use crate::platform::XClient;

use std::sync::Arc;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub oauth: Arc<OAuthManager>,
    pub x: XClient,
    pub generator: Arc<dyn ReplyGenerator>,
}

impl AppState {
    /// Wire the X client to `oauth` so every platform call shares its tokens.
    pub fn new(
        config: Arc<Config>,
        oauth: Arc<OAuthManager>,
        generator: Arc<dyn ReplyGenerator>,
    ) -> Self {
        let x = XClient::new(
            config.x.api_base.clone(),
            HttpClient::new().into_inner(),
            oauth.clone(),
        );
        Self {
            config,
            oauth,
            x,
            generator,
        }
    }

    /// Build the state from config: storage backends, OpenAI generator, X client.
    pub fn from_config(config: Arc<Config>) -> anyhow::Result<Self> {
        let oauth = Arc::new(OAuthManager::from_config(config.clone())?);
        let generator = Arc::new(OpenAiGenerator::from_config(
            &config.openai,
            HttpClient::new().into_inner(),
        ));
        Ok(Self::new(config, oauth, generator))
    }
}
