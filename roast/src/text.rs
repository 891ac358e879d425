//! Text generation over an OpenAI-compatible chat completions API.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::http::{check_status, transport_error};
use crate::prompt::GenerationRequest;

/// Perplexity chat completions root.
pub const DEFAULT_CHAT_URL: &str = "https://api.perplexity.ai";
pub const DEFAULT_CHAT_MODEL: &str = "r1-1776";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a roast master. Write a funny roast.";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Text produced by a [`TextGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText {
    pub text: String,
    /// Model that produced the text, as reported by the provider.
    pub model: String,
}

/// Produces a roast for a [`GenerationRequest`].
///
/// One call is one provider request; implementations never retry.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedText, ProviderError>;
}

/// [`ChatCompletionGenerator`] configuration.
#[derive(Debug, Clone)]
pub struct ChatCompletionConfig {
    pub api_key: String,
    /// API root; "/chat/completions" is appended.
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub timeout: Duration,
}

impl ChatCompletionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_CHAT_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// [`TextGenerator`] for OpenAI-compatible chat completion endpoints
/// (Perplexity by default).
pub struct ChatCompletionGenerator {
    client: Client,
    config: ChatCompletionConfig,
}

impl ChatCompletionGenerator {
    pub fn new(config: ChatCompletionConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Rejected {
                status: 0,
                message: "api_key must be non-empty".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| ProviderError::Rejected {
                status: 0,
                message: format!("invalid api key: {e}"),
            })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(crate::http::USER_AGENT));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(transport_error)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ChatCompletionConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl TextGenerator for ChatCompletionGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedText, ProviderError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let user = request.user_content();
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp).await?;

        let bytes = resp.bytes().await.map_err(transport_error)?;
        let data: ChatResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Malformed(format!("decode chat response: {e}")))?;

        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("response has no message content".into()))?;

        let text = strip_reasoning(&content);
        if text.is_empty() {
            return Err(ProviderError::Malformed("generated text is empty".into()));
        }

        debug!(chars = text.len(), "roast: text generated");
        Ok(GeneratedText {
            text,
            model: data.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }
}

/// Removes `<think>…</think>` blocks emitted by reasoning models and trims
/// the rest. An unterminated block swallows everything after it.
pub fn strip_reasoning(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        match rest[start..].find(CLOSE) {
            Some(end) => rest = &rest[start + end + CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}
