//! Streaming text-to-speech.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::debug;

use crate::error::ProviderError;
use crate::http::{check_status, transport_error};

pub const DEFAULT_ELEVENLABS_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";
pub const DEFAULT_TTS_MODEL: &str = "eleven_multilingual_v2";
pub const DEFAULT_OUTPUT_FORMAT: &str = "mp3_44100_128";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Lazily produced audio chunks. Chunks arrive in playback order; dropping
/// the stream cancels the upstream request.
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

/// Turns text into a stream of encoded audio.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Starts synthesis. Returns once the provider has accepted the request;
    /// errors after that point surface as stream items.
    async fn synthesize(&self, text: &str) -> Result<AudioStream, ProviderError>;

    /// MIME type of the produced audio.
    fn media_type(&self) -> &str {
        "audio/mpeg"
    }
}

/// [`ElevenLabsSynthesizer`] configuration.
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub output_format: String,
    /// Applies to connecting only; the body may stream for longer.
    pub connect_timeout: Duration,
}

impl ElevenLabsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_ELEVENLABS_URL.to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_TTS_MODEL.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// ElevenLabs streaming TTS client.
pub struct ElevenLabsSynthesizer {
    client: Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: ElevenLabsConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Rejected {
                status: 0,
                message: "api_key must be non-empty".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key).map_err(|e| ProviderError::Rejected {
            status: 0,
            message: format!("invalid api key: {e}"),
        })?;
        headers.insert("xi-api-key", key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("audio/mpeg"));
        headers.insert(USER_AGENT, HeaderValue::from_static(crate::http::USER_AGENT));

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(headers)
            .build()
            .map_err(transport_error)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ElevenLabsConfig {
        &self.config
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream",
            self.config.base_url.trim_end_matches('/'),
            self.config.voice_id
        )
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, ProviderError> {
        let body = SpeechRequest {
            text,
            model_id: &self.config.model_id,
        };

        let resp = self
            .client
            .post(self.stream_url())
            .query(&[("output_format", self.config.output_format.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp).await?;
        if let Some(ct) = resp.headers().get(CONTENT_TYPE) {
            let ct = ct.to_str().unwrap_or_default();
            if !ct.trim_start().to_ascii_lowercase().starts_with("audio/") {
                return Err(ProviderError::Malformed(format!(
                    "expected audio, got content-type {ct:?}"
                )));
            }
        }

        debug!(voice = %self.config.voice_id, chars = text.len(), "roast: speech stream opened");

        let stream = resp
            .bytes_stream()
            .map(|r| r.map_err(transport_error))
            .filter(|r| futures::future::ready(!matches!(r, Ok(b) if b.is_empty())));
        Ok(Box::pin(stream))
    }
}
