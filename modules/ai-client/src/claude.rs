use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AiClientError, Result};
use crate::traits::{GenerateOptions, TextGenerator};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    User,
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: Role,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    content: Vec<ContentBlock>,
}

impl ChatResponse {
    fn text(&self) -> Option<String> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.clone()),
                ContentBlock::Other => None,
            })
            .next()
    }
}

/// Client for the Anthropic Messages API.
pub struct Claude {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl Claude {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: reqwest::Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| AiClientError::MissingApiKey("ANTHROPIC_API_KEY".to_string()))?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

#[async_trait]
impl TextGenerator for Claude {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<String> {
        let request = ChatRequest {
            model: opts.model.clone(),
            max_tokens: opts.max_tokens,
            messages: vec![WireMessage {
                role: Role::User,
                content: user_prompt.to_string(),
            }],
            system: Some(system_prompt.to_string()),
            temperature: opts.temperature,
        };

        debug!(model = %request.model, "Claude generate request");

        let url = format!("{}/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .headers(self.headers())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AiClientError::Api { status, message });
        }

        let chat: ChatResponse = response.json().await?;
        chat.text().ok_or(AiClientError::EmptyResponse)
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claude_new() {
        let claude = Claude::new("sk-ant-test");
        assert_eq!(claude.api_key, "sk-ant-test");
        assert_eq!(claude.base_url, ANTHROPIC_API_URL);
    }

    #[test]
    fn test_claude_with_base_url() {
        let claude = Claude::new("sk-ant-test").with_base_url("https://custom.api.com");
        assert_eq!(claude.base_url, "https://custom.api.com");
    }
}
