//! OpenAI chat-completions client.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{GenerateError, ReplyGenerator, ReplyVariants};
use crate::config::OpenAiConfig;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

const REPLY_MAX_TOKENS: u32 = 280;
const VARIANTS_MAX_TOKENS: u32 = 400;

const REPLY_SYSTEM_PROMPT: &str =
    "You are a thoughtful developer engaging on X. Write concise, intelligent, non-spammy replies.";

const VARIANTS_SYSTEM_PROMPT: &str = concat!(
    "You are helping craft replies to X (Twitter) posts. ",
    "Given the original tweet text, return a JSON object with two keys: ",
    "\"humorous\" and \"insightful\". Each value must be a concise, natural-sounding reply. ",
    "The humorous reply should be light, witty, and non-offensive. ",
    "The insightful reply should add genuine perspective or value. ",
    "Do not include explanations, only the JSON object."
);

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Reply generator backed by OpenAI chat completions.
#[derive(Clone)]
pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiGenerator {
    /// Create a generator. A missing key is reported when a reply is requested.
    pub fn new(api_key: Option<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.is_empty()),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn from_config(config: &OpenAiConfig, http: reqwest::Client) -> Self {
        Self::new(config.api_key.clone(), http)
            .with_model(&config.model)
            .with_base_url(&config.base_url)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at another OpenAI-compatible endpoint (or a mock server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
        max_tokens: u32,
        json_object: bool,
    ) -> Result<Option<String>, GenerateError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            GenerateError::Misconfigured("OPENAI_API_KEY is missing".to_string())
        })?;

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_text,
                },
            ],
            max_tokens,
            response_format: json_object.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), model = %self.model, "Received OpenAI API response");

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerateError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            GenerateError::InvalidResponse(format!("Failed to parse OpenAI response: {}", e))
        })?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content))
    }
}

/// Render a JSON value the way a loosely typed caller would stringify it.
fn variant_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

fn parse_variants(raw: &str) -> Result<ReplyVariants, GenerateError> {
    let parsed: Value = serde_json::from_str(raw).map_err(|_| {
        GenerateError::InvalidResponse("Failed to parse OpenAI JSON for variants".to_string())
    })?;

    let humorous = variant_text(parsed.get("humorous"));
    let insightful = variant_text(parsed.get("insightful"));

    if humorous.is_empty() || insightful.is_empty() {
        return Err(GenerateError::InvalidResponse(
            "OpenAI variants missing humorous or insightful reply".to_string(),
        ));
    }

    Ok(ReplyVariants {
        humorous,
        insightful,
    })
}

#[async_trait::async_trait]
impl ReplyGenerator for OpenAiGenerator {
    async fn generate_reply(&self, post_text: &str) -> Result<String, GenerateError> {
        let content = self
            .complete(REPLY_SYSTEM_PROMPT, post_text, REPLY_MAX_TOKENS, false)
            .await?;

        let reply = content.map(|c| c.trim().to_string()).unwrap_or_default();
        if reply.is_empty() {
            return Err(GenerateError::InvalidResponse(
                "OpenAI returned no reply content".to_string(),
            ));
        }
        info!(chars = reply.len(), "Generated reply");
        Ok(reply)
    }

    async fn generate_variants(&self, post_text: &str) -> Result<ReplyVariants, GenerateError> {
        let content = self
            .complete(VARIANTS_SYSTEM_PROMPT, post_text, VARIANTS_MAX_TOKENS, true)
            .await?;

        let raw = content.filter(|c| !c.is_empty()).ok_or_else(|| {
            GenerateError::InvalidResponse("OpenAI returned no content for variants".to_string())
        })?;
        parse_variants(&raw)
    }
}
