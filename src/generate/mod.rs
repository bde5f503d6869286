//! Reply text generation.
//!
//! [`ReplyGenerator`] is the seam between the HTTP handlers and the language
//! model; [`OpenAiGenerator`] is the production implementation.

pub mod openai;

pub use openai::OpenAiGenerator;

use serde::{Deserialize, Serialize};

/// Errors from the text-generation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// No API key is configured.
    #[error("{0}")]
    Misconfigured(String),

    /// The completion endpoint returned a non-2xx status.
    #[error("OpenAI API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The model answered, but not with anything usable.
    #[error("{0}")]
    InvalidResponse(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Two alternative replies to the same post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyVariants {
    pub humorous: String,
    pub insightful: String,
}

/// Drafts reply text for a post.
#[async_trait::async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// One concise reply to `post_text`.
    async fn generate_reply(&self, post_text: &str) -> Result<String, GenerateError>;

    /// A humorous and an insightful reply to `post_text`. Both are non-empty.
    async fn generate_variants(&self, post_text: &str) -> Result<ReplyVariants, GenerateError>;
}
