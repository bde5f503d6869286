//! Reply drafting and posting endpoints.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::AppState;
use crate::error::AppError;
use crate::platform::{DEFAULT_SEARCH_LIMIT, Tweet};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Fields are loosely typed so a wrong type gets the same 400 as a missing
/// value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub tweet_text: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub reply: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    #[serde(default)]
    pub tweet_id: Option<Value>,
    #[serde(default)]
    pub text: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    pub success: bool,
    /// Id of the reply that was created.
    pub tweet_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<Value>,
    #[serde(default)]
    pub max_results: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct SearchItem {
    pub tweet: Tweet,
    pub humorous: String,
    pub insightful: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub items: Vec<SearchItem>,
}

/// Trimmed, non-empty string value of `field`, or a 400.
fn required_text<'a>(value: &'a Option<Value>, field: &str) -> Result<&'a str, AppError> {
    value
        .as_ref()
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest(format!("{field} is required and must be a non-empty string"))
        })
}

/// Any finite number is accepted; the client clamps it to what X allows.
fn search_limit(value: &Option<Value>) -> u32 {
    value
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .map(|n| n.clamp(0.0, u32::MAX as f64) as u32)
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/twitter/generate
pub async fn generate_reply(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let tweet_text = required_text(&body.tweet_text, "tweetText")?;
    let reply = state.generator.generate_reply(tweet_text).await?;
    Ok(Json(GenerateResponse { reply }))
}

/// POST /api/twitter/reply
pub async fn post_reply(
    State(state): State<AppState>,
    Json(body): Json<ReplyRequest>,
) -> Result<Json<ReplyResponse>, AppError> {
    let tweet_id = required_text(&body.tweet_id, "tweetId")?;
    let text = required_text(&body.text, "text")?;

    let created = state.x.post_reply(tweet_id, text).await?;
    Ok(Json(ReplyResponse {
        success: true,
        tweet_id: created.id,
    }))
}

/// POST /api/twitter/search-with-replies
///
/// Searches recent posts and drafts both reply variants for each, one post
/// at a time. Any generation failure fails the whole request.
pub async fn search_with_replies(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = required_text(&body.query, "query")?;
    let limit = search_limit(&body.max_results);

    let tweets = state.x.search_recent(query, limit).await?;

    let mut items = Vec::with_capacity(tweets.len());
    for tweet in tweets {
        let variants = state.generator.generate_variants(&tweet.text).await?;
        items.push(SearchItem {
            tweet,
            humorous: variants.humorous,
            insightful: variants.insightful,
        });
    }

    info!(query = %query, items = items.len(), "Drafted replies for search results");
    Ok(Json(SearchResponse { items }))
}
