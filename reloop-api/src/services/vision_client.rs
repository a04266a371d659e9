//! Component photo classification

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::gemini::{CollaboratorError, GeminiClient, InlineImage};

/// Classifier verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationStatus {
    Verified,
    Mismatch,
}

/// Photo plus the names it is checked against
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub image: InlineImage,
    pub device_name: String,
    pub component_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub status: ClassificationStatus,
    pub condition: Option<String>,
    pub reasoning: Option<String>,
}

/// Vision collaborator seam
#[async_trait]
pub trait VisionClassifier: Send + Sync {
    /// Judge whether the photo shows the named component
    ///
    /// Transport failures, quota errors and unusable replies all come back
    /// as `Err`; a readable reply that disagrees is `Ok` with `Mismatch`.
    async fn classify(&self, request: ClassificationRequest) -> Result<Classification, CollaboratorError>;
}

fn classification_prompt(device_name: &str, component_name: &str) -> String {
    format!(
        r#"You are an electronics teardown inspector.
The user claims this photo shows the "{component_name}" harvested from a "{device_name}".
Decide whether the photo plausibly shows that component and describe its condition.
Return ONLY JSON in this format:
{{
  "status": "verified" or "mismatch",
  "condition": "Good" | "Fair" | "Damaged" | short description,
  "reasoning": "one or two sentences"
}}"#
    )
}

/// Interpret a classifier reply
///
/// Anything other than an explicit `"verified"` status counts as a mismatch.
pub fn classification_from_reply(reply: &serde_json::Map<String, Value>) -> Classification {
    let status = match reply.get("status").and_then(Value::as_str) {
        Some(s) if s.eq_ignore_ascii_case("verified") => ClassificationStatus::Verified,
        _ => ClassificationStatus::Mismatch,
    };
    let text = |key: &str| {
        reply
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Classification {
        status,
        condition: text("condition"),
        reasoning: text("reasoning"),
    }
}

/// Gemini-backed classifier
pub struct GeminiVision {
    client: GeminiClient,
    model: String,
}

impl GeminiVision {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl VisionClassifier for GeminiVision {
    async fn classify(&self, request: ClassificationRequest) -> Result<Classification, CollaboratorError> {
        let prompt = classification_prompt(&request.device_name, &request.component_name);
        let reply = self
            .client
            .generate_json(&self.model, &prompt, Some(&request.image))
            .await?;

        let classification = classification_from_reply(&reply);
        tracing::debug!(
            component = %request.component_name,
            status = ?classification.status,
            "Classification received"
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_interpretation() {
        let reply = json!({ "status": "Verified", "condition": "Good", "reasoning": "Clear shot" });
        let c = classification_from_reply(reply.as_object().unwrap());
        assert_eq!(c.status, ClassificationStatus::Verified);
        assert_eq!(c.condition.as_deref(), Some("Good"));

        let reply = json!({ "status": "unsure", "reasoning": "  " });
        let c = classification_from_reply(reply.as_object().unwrap());
        assert_eq!(c.status, ClassificationStatus::Mismatch);
        assert!(c.reasoning.is_none());
    }

    #[test]
    fn test_prompt_names_both_subjects() {
        let prompt = classification_prompt("iPhone 8", "Taptic Engine");
        assert!(prompt.contains("\"Taptic Engine\""));
        assert!(prompt.contains("\"iPhone 8\""));
    }
}
