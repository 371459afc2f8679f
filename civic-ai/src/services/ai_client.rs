//! Generative AI backend client
//!
//! The pipeline talks to the model through [`CompletionBackend`]: one prompt,
//! optionally with inline page images, returns the model's text. The
//! production backend is the Gemini `generateContent` REST endpoint.

use async_trait::async_trait;
use base64::Engine;
use civic_common::config::AiConfig;
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::utils::{retry_transient, RetryPolicy, Transient};

/// AI backend errors
#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI backend is not configured (no API key)")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Could not read page image {path}: {reason}")]
    Image { path: PathBuf, reason: String },
}

impl Transient for AiError {
    fn is_transient(&self) -> bool {
        match self {
            AiError::Network(_) | AiError::Timeout => true,
            AiError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            _ => false,
        }
    }
}

/// One page image sent inline with a prompt
#[derive(Debug, Clone)]
pub struct PageImage {
    pub path: PathBuf,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl PageImage {
    /// Read a JPEG page from disk
    pub async fn load_jpeg(path: &Path) -> Result<Self, AiError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| AiError::Image {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            mime_type: "image/jpeg".to_string(),
            bytes,
        })
    }
}

/// Text completion with optional inline images
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str, images: &[PageImage]) -> Result<String, AiError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini `generateContent` client
///
/// Rate limited client-side (requests per minute) and retried on transient
/// failures. A missing API key does not prevent construction; every call then
/// fails with [`AiError::NotConfigured`].
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    retry_policy: RetryPolicy,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl GeminiClient {
    pub fn new(config: &AiConfig, api_key: Option<String>) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AiError::Network(e.to_string()))?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            retry_policy: RetryPolicy::default().with_max_attempts(config.max_attempts),
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn generate_once(&self, api_key: &str, body: &GenerateRequest<'_>) -> Result<String, AiError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout
                } else {
                    AiError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AiError::Network(format!("Invalid response body: {}", e)))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl CompletionBackend for GeminiClient {
    async fn complete(&self, prompt: &str, images: &[PageImage]) -> Result<String, AiError> {
        let api_key = self.api_key.as_deref().ok_or(AiError::NotConfigured)?;

        let mut parts = Vec::with_capacity(images.len() + 1);
        parts.push(Part::Text { text: prompt });
        for image in images {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&image.bytes),
                },
            });
        }
        let body = GenerateRequest {
            contents: vec![Content { role: "user", parts }],
        };

        tracing::debug!(
            model = %self.model,
            prompt_chars = prompt.len(),
            images = images.len(),
            "Calling generateContent"
        );

        retry_transient("generateContent", &self.retry_policy, || {
            self.generate_once(api_key, &body)
        })
        .await
    }
}
