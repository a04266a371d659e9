//! Shared fixtures for reloop-api integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use reloop_api::db::verifications::VerifiedPart;
use reloop_api::services::{
    CatalogSeed, Classification, ClassificationRequest, ClassificationStatus, CollaboratorError,
    PricingOracle, VisionClassifier,
};
use reloop_api::AppState;
use reloop_common::config::TomlConfig;
use reloop_common::events::{EventBus, ReloopEvent};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const PIXEL_ID: &str = "0b6f3c1e-6a3d-4c55-9a0e-2f1d7f7e0a01";
pub const PIXEL_DISPLAY_ID: &str = "0b6f3c1e-6a3d-4c55-9a0e-2f1d7f7e0b01";
pub const PIXEL_BATTERY_ID: &str = "0b6f3c1e-6a3d-4c55-9a0e-2f1d7f7e0b02";
pub const PIXEL_CAMERA_ID: &str = "0b6f3c1e-6a3d-4c55-9a0e-2f1d7f7e0b03";

pub fn uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap()
}

/// Scripted vision collaborator; `Verified` once the script runs out
#[derive(Default)]
pub struct StubVision {
    script: Mutex<VecDeque<Result<Classification, CollaboratorError>>>,
    delay: Duration,
}

impl StubVision {
    pub fn scripted(outcomes: Vec<Result<Classification, CollaboratorError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            delay: Duration::ZERO,
        }
    }

    /// Answer only after `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub fn verified() -> Result<Classification, CollaboratorError> {
    Ok(Classification {
        status: ClassificationStatus::Verified,
        condition: Some("Excellent".to_string()),
        reasoning: Some("Matches the expected part".to_string()),
    })
}

pub fn mismatch() -> Result<Classification, CollaboratorError> {
    Ok(Classification {
        status: ClassificationStatus::Mismatch,
        condition: None,
        reasoning: Some("This is a charging cable".to_string()),
    })
}

pub fn quota() -> Result<Classification, CollaboratorError> {
    Err(CollaboratorError::Quota("RESOURCE_EXHAUSTED".to_string()))
}

#[async_trait]
impl VisionClassifier for StubVision {
    async fn classify(&self, _request: ClassificationRequest) -> Result<Classification, CollaboratorError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.script.lock().unwrap().pop_front().unwrap_or_else(verified)
    }
}

/// Pricing collaborator answering from a fixed JSON object
pub struct StubPricing {
    pub prices: Option<Value>,
    pub waste_kg: Option<f64>,
}

impl StubPricing {
    pub fn unreachable() -> Self {
        Self {
            prices: None,
            waste_kg: None,
        }
    }
}

#[async_trait]
impl PricingOracle for StubPricing {
    async fn estimate_prices(&self, _prompt: &str) -> Result<Map<String, Value>, CollaboratorError> {
        match &self.prices {
            Some(Value::Object(map)) => Ok(map.clone()),
            _ => Err(CollaboratorError::Network("connection refused".to_string())),
        }
    }

    async fn estimate_waste_kg(&self, _parts: &[VerifiedPart]) -> Result<f64, CollaboratorError> {
        self.waste_kg.ok_or(CollaboratorError::NotConfigured)
    }
}

pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.workflow.busy_delay_ms = 0;
    config.gemini.timeout_seconds = 2;
    config
}

/// App state over a seeded in-memory database
pub async fn seeded_state(vision: StubVision, pricing: StubPricing) -> AppState {
    seeded_state_with(vision, pricing, &test_config()).await
}

pub async fn seeded_state_with(vision: StubVision, pricing: StubPricing, config: &TomlConfig) -> AppState {
    let pool = reloop_common::db::init_memory_database().await.unwrap();
    CatalogSeed::from_toml_str(include_str!("../../catalog.toml"))
        .unwrap()
        .apply(&pool)
        .await
        .unwrap();

    AppState::new(
        pool,
        EventBus::new(64),
        Arc::new(vision),
        Arc::new(pricing),
        config,
    )
}

/// Sign a user up and return (user id, bearer token)
pub async fn sign_up(state: &AppState, email: &str, name: &str) -> (Uuid, String) {
    let session = state
        .session_store
        .sign_up(email, "hunter22", Some(name), Some("Delhi Public School"))
        .await
        .unwrap();
    (session.identity.user_id, session.token)
}

/// Small PNG accepted by the photo pipeline
pub fn png_photo() -> Vec<u8> {
    let img = RgbImage::from_fn(32, 24, |x, y| image::Rgb([(x * 8) as u8, (y * 10) as u8, 90]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Wait for the first event matching `predicate`
pub async fn wait_for_event<F>(
    rx: &mut tokio::sync::broadcast::Receiver<ReloopEvent>,
    mut predicate: F,
) -> ReloopEvent
where
    F: FnMut(&ReloopEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("Timed out waiting for event")
}

/// Wait until `component_id` leaves `Verifying`
pub async fn wait_for_verdict(
    rx: &mut tokio::sync::broadcast::Receiver<ReloopEvent>,
    component_id: Uuid,
) -> ReloopEvent {
    wait_for_event(rx, |event| {
        matches!(
            event,
            ReloopEvent::ComponentStatusChanged { component_id: c, old_status, .. }
                if *c == component_id
                    && *old_status == reloop_common::events::ComponentStatus::Verifying
        )
    })
    .await
}
