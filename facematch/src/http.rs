//! Remote face representation service.
//!
//! Speaks the `POST /represent` contract of DeepFace-style servers:
//!
//! ```text
//! → {"img": "data:image/jpeg;base64,...", "model_name": "VGG-Face",
//!    "detector_backend": "opencv", "enforce_detection": true}
//! ← {"results": [{"embedding": [f32...], "face_confidence": 0.93}, ...]}
//! ```
//!
//! A probe without a face comes back either as an empty `results` list or
//! as HTTP 400 whose message says the face could not be detected.

use std::time::Duration;

use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::embedder::FaceEmbedder;
use crate::error::EmbedError;

pub const DEFAULT_MODEL: &str = "VGG-Face";
pub const DEFAULT_DETECTOR: &str = "opencv";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings for [`HttpFaceEmbedder`].
#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    /// Service root, e.g. "http://127.0.0.1:5005".
    pub base_url: String,
    pub model: String,
    pub detector: String,
    pub timeout: Duration,
}

impl HttpEmbedderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
            detector: DEFAULT_DETECTOR.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_detector(mut self, detector: &str) -> Self {
        self.detector = detector.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct RepresentRequest<'a> {
    img: String,
    model_name: &'a str,
    detector_backend: &'a str,
    enforce_detection: bool,
}

#[derive(Deserialize)]
struct RepresentResponse {
    results: Vec<FaceResult>,
}

#[derive(Deserialize)]
struct FaceResult {
    embedding: Vec<f64>,
    #[serde(default)]
    face_confidence: f64,
}

/// [`FaceEmbedder`] backed by a remote representation service.
pub struct HttpFaceEmbedder {
    client: Client,
    config: HttpEmbedderConfig,
}

impl HttpFaceEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbedError::Model(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpEmbedderConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl FaceEmbedder for HttpFaceEmbedder {
    async fn embed(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/represent", self.config.base_url.trim_end_matches('/'));
        let body = RepresentRequest {
            img: format!(
                "data:image/jpeg;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(image)
            ),
            model_name: &self.config.model,
            detector_backend: &self.config.detector,
            enforce_detection: true,
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status, body));
        }

        let data: RepresentResponse = resp
            .json()
            .await
            .map_err(|e| EmbedError::Malformed(e.to_string()))?;
        primary_face(data.results)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

fn classify_failure(status: StatusCode, body: String) -> EmbedError {
    if status == StatusCode::BAD_REQUEST
        && body.to_ascii_lowercase().contains("face could not be detected")
    {
        return EmbedError::NoFace;
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return EmbedError::Unavailable(format!("HTTP {status}: {body}"));
    }
    EmbedError::Rejected {
        status: status.as_u16(),
        message: body,
    }
}

/// Picks the face with the highest detector confidence; the first wins ties.
fn primary_face(results: Vec<FaceResult>) -> Result<Vec<f32>, EmbedError> {
    let mut best: Option<FaceResult> = None;
    for face in results {
        if best
            .as_ref()
            .is_none_or(|b| face.face_confidence > b.face_confidence)
        {
            best = Some(face);
        }
    }
    let face = best.ok_or(EmbedError::NoFace)?;
    if face.embedding.is_empty() {
        return Err(EmbedError::Malformed("empty embedding".to_string()));
    }
    Ok(face.embedding.into_iter().map(|v| v as f32).collect())
}
