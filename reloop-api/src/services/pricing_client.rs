//! Market pricing and waste estimates from the text model

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::gemini::{CollaboratorError, GeminiClient};
use crate::db::verifications::VerifiedPart;

/// Pricing collaborator seam
#[async_trait]
pub trait PricingOracle: Send + Sync {
    /// Raw reply to a valuation prompt: component name → price, plus a total
    async fn estimate_prices(&self, prompt: &str) -> Result<Map<String, Value>, CollaboratorError>;

    /// Kilograms of e-waste diverted by recovering `parts`
    async fn estimate_waste_kg(&self, parts: &[VerifiedPart]) -> Result<f64, CollaboratorError>;
}

pub(crate) fn waste_prompt(parts: &[VerifiedPart]) -> String {
    let list = parts
        .iter()
        .map(|p| format!("- {} ({}) from {}", p.name, p.kind, p.device_name))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an e-waste analyst.
Estimate the total mass in kilograms of electronic waste diverted from landfill by recovering these components:
{list}

Return ONLY JSON in this format:
{{ "total_kg": 1.25 }}"#
    )
}

/// Pull a positive kilogram figure out of a waste reply
pub(crate) fn waste_from_reply(reply: &Map<String, Value>) -> Result<f64, CollaboratorError> {
    reply
        .get("total_kg")
        .and_then(Value::as_f64)
        .filter(|kg| kg.is_finite() && *kg >= 0.0)
        .ok_or_else(|| CollaboratorError::Parse("missing numeric total_kg".to_string()))
}

pub struct GeminiPricing {
    client: GeminiClient,
    model: String,
}

impl GeminiPricing {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl PricingOracle for GeminiPricing {
    async fn estimate_prices(&self, prompt: &str) -> Result<Map<String, Value>, CollaboratorError> {
        self.client.generate_json(&self.model, prompt, None).await
    }

    async fn estimate_waste_kg(&self, parts: &[VerifiedPart]) -> Result<f64, CollaboratorError> {
        let reply = self
            .client
            .generate_json(&self.model, &waste_prompt(parts), None)
            .await?;
        waste_from_reply(&reply)
    }
}
