//! X API v2 client for the calls the assistant makes on the operator's behalf.
//!
//! Both calls go through [`AuthenticatedClient`], so they share the proactive
//! and reactive refresh behaviour.

pub mod auth_call;

pub use auth_call::{AuthenticatedClient, TokenSource, UnauthorizedRetry};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::oauth::OAuthError;

/// Smallest and largest `max_results` the recent-search endpoint accepts.
const SEARCH_MIN_RESULTS: u32 = 10;
const SEARCH_MAX_RESULTS: u32 = 100;

/// Results returned when the caller does not ask for a specific count.
pub const DEFAULT_SEARCH_LIMIT: u32 = 5;

/// A post as returned by X.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct CreateTweetResponse {
    data: Tweet,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

/// X API client bound to the operator's account.
#[derive(Clone)]
pub struct XClient {
    api_base: String,
    http: reqwest::Client,
    auth: AuthenticatedClient,
}

impl XClient {
    pub fn new(api_base: impl Into<String>, http: reqwest::Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http,
            auth: AuthenticatedClient::new(tokens),
        }
    }

    /// Publish `text` as a reply to `tweet_id`. Returns the created post.
    pub async fn post_reply(&self, tweet_id: &str, text: &str) -> Result<Tweet, OAuthError> {
        let url = format!("{}/tweets", self.api_base);
        let body = serde_json::json!({
            "text": text,
            "reply": { "in_reply_to_tweet_id": tweet_id },
        });

        let response = self
            .auth
            .call(|token| self.http.post(&url).bearer_auth(token).json(&body))
            .await?;

        let created: CreateTweetResponse = response.json().await?;
        info!(in_reply_to = %tweet_id, reply_id = %created.data.id, "Reply posted");
        Ok(created.data)
    }

    /// Recent posts matching `query`, at most `limit` of them.
    ///
    /// X only accepts `max_results` in 10..=100, so the request asks for at
    /// least 10 and the result is cut down to `limit` locally.
    pub async fn search_recent(&self, query: &str, limit: u32) -> Result<Vec<Tweet>, OAuthError> {
        let limit = limit.clamp(1, SEARCH_MAX_RESULTS);
        let max_results = limit.clamp(SEARCH_MIN_RESULTS, SEARCH_MAX_RESULTS).to_string();
        let url = format!("{}/tweets/search/recent", self.api_base);

        let response = self
            .auth
            .call(|token| {
                self.http
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("query", query), ("max_results", max_results.as_str())])
            })
            .await?;

        let mut found: SearchResponse = response.json().await?;
        found.data.truncate(limit as usize);
        debug!(query = %query, count = found.data.len(), "Recent search complete");
        Ok(found.data)
    }
}
