#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::MockServer;

use xreply::AppState;
use xreply::api;
use xreply::config::Config;
use xreply::generate::OpenAiGenerator;
use xreply::oauth::{MemoryPendingStore, MemoryTokenStorage, OAuthManager};

pub const CLIENT_ID: &str = "client-abc";
pub const CLIENT_SECRET: &str = "secret-xyz";
/// `Basic base64("client-abc:secret-xyz")`
pub const BASIC_AUTH: &str = "Basic Y2xpZW50LWFiYzpzZWNyZXQteHl6";
pub const APP_BASE_URL: &str = "http://localhost:3000";
pub const REDIRECT_URI: &str = "http://localhost:3000/api/auth/x/callback";

/// Config with every upstream pointed at `server`.
pub fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.app.base_url = Some(APP_BASE_URL.into());
    config.x.client_id = Some(CLIENT_ID.into());
    config.x.client_secret = Some(CLIENT_SECRET.into());
    config.x.redirect_uri = Some(REDIRECT_URI.into());
    config.x.auth_url = format!("{}/i/oauth2/authorize", server.uri());
    config.x.token_url = format!("{}/2/oauth2/token", server.uri());
    config.x.api_base = format!("{}/2", server.uri());
    config.openai.api_key = Some("sk-test".into());
    config.openai.base_url = format!("{}/v1", server.uri());
    config
}

pub struct Harness {
    pub state: AppState,
    pub pending: MemoryPendingStore,
    pub storage: MemoryTokenStorage,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let pending = MemoryPendingStore::new();
        let storage = MemoryTokenStorage::new();
        let oauth = Arc::new(OAuthManager::new(
            config.clone(),
            Arc::new(pending.clone()),
            Arc::new(storage.clone()),
        ));
        let generator = Arc::new(OpenAiGenerator::from_config(
            &config.openai,
            reqwest::Client::new(),
        ));
        Self {
            state: AppState::new(config, oauth, generator),
            pending,
            storage,
        }
    }

    pub fn router(&self) -> Router {
        api::build_api_router().with_state(self.state.clone())
    }

    /// Send `request` through the router. Empty bodies come back as `Null`.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, body)
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn location(headers: &HeaderMap) -> String {
    headers["location"].to_str().unwrap().to_string()
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
