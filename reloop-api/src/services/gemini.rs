//! Gemini `generateContent` transport
//!
//! Shared by the vision classifier and the pricing oracle. Both ask for a
//! JSON-only reply and receive the parsed object.

use base64::Engine;
use reloop_common::config::GeminiConfig;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("ReLoop/", env!("CARGO_PKG_VERSION"));

/// Errors reported by the AI collaborators
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("AI collaborator not configured (missing API key)")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl CollaboratorError {
    /// Rate-limit or quota signature (HTTP 429, RESOURCE_EXHAUSTED, "quota")
    pub fn is_quota(&self) -> bool {
        match self {
            CollaboratorError::Quota(_) => true,
            CollaboratorError::Api { status, message } => *status == 429 || mentions_quota(message),
            CollaboratorError::Network(message) => mentions_quota(message),
            _ => false,
        }
    }
}

fn mentions_quota(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("quota") || lower.contains("resource_exhausted") || lower.contains("429")
}

/// Detect an error object embedded in an otherwise successful reply
///
/// Accepts `{"error": "...quota..."}`, `{"error": {"code": 429, ...}}` and
/// `{"code": 429}`.
pub fn embedded_error(body: &Map<String, Value>) -> Option<CollaboratorError> {
    if body.get("code").and_then(Value::as_i64) == Some(429) {
        return Some(CollaboratorError::Quota("embedded code 429".to_string()));
    }

    match body.get("error")? {
        Value::String(message) if mentions_quota(message) => {
            Some(CollaboratorError::Quota(message.clone()))
        }
        Value::String(message) => Some(CollaboratorError::Api {
            status: 200,
            message: message.clone(),
        }),
        Value::Object(inner) => {
            let code = inner.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = inner
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let status = inner.get("status").and_then(Value::as_str).unwrap_or_default();
            if code == 429 || status == "RESOURCE_EXHAUSTED" || mentions_quota(&message) {
                Some(CollaboratorError::Quota(message))
            } else {
                Some(CollaboratorError::Api {
                    status: code.clamp(0, u16::MAX as i64) as u16,
                    message,
                })
            }
        }
        _ => None,
    }
}

/// Inline image part of a request
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub base64: String,
    pub mime_type: String,
}

impl InlineImage {
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Self {
        Self {
            base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.to_string(),
        }
    }
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
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Strip optional markdown fences and parse a JSON object
pub fn parse_json_object(text: &str) -> Result<Map<String, Value>, CollaboratorError> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CollaboratorError::Parse(format!(
            "expected JSON object, got {}",
            other
        ))),
        Err(e) => Err(CollaboratorError::Parse(e.to_string())),
    }
}

/// Thin client for one Gemini deployment
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, api_key: Option<String>) -> Result<Self, CollaboratorError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CollaboratorError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send `prompt` (plus an optional image) and parse the JSON reply
    pub async fn generate_json(
        &self,
        model: &str,
        prompt: &str,
        image: Option<&InlineImage>,
    ) -> Result<Map<String, Value>, CollaboratorError> {
        let api_key = self.api_key.as_deref().ok_or(CollaboratorError::NotConfigured)?;

        let mut parts = vec![json!({ "text": prompt })];
        if let Some(image) = image {
            parts.push(json!({
                "inline_data": {
                    "mime_type": image.mime_type,
                    "data": image.base64,
                }
            }));
        }

        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": { "responseMimeType": "application/json" },
        });

        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        tracing::debug!(model = %model, has_image = image.is_some(), "Calling Gemini");

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollaboratorError::Timeout
                } else {
                    CollaboratorError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || mentions_quota(&error_text) {
                return Err(CollaboratorError::Quota(error_text));
            }
            return Err(CollaboratorError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Parse(e.to_string()))?;

        let text = reply
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| CollaboratorError::Parse("empty candidate list".to_string()))?;

        let object = parse_json_object(&text)?;
        if let Some(error) = embedded_error(&object) {
            return Err(error);
        }
        Ok(object)
    }
}
