//! Catalog seeding from a TOML file
//!
//! Devices, components and steps are upserted by id, so loading the same
//! file on every start is harmless.

use reloop_common::db::{Component, Device, HazardLevel, TeardownStep};
use reloop_common::{Error, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::path::Path;
use uuid::Uuid;

use crate::db::catalog;

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub devices: Vec<SeedDevice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedDevice {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub image_url: Option<String>,
    /// Defaults to the sum of component values
    pub total_value: Option<f64>,
    #[serde(default)]
    pub components: Vec<SeedComponent>,
    #[serde(default)]
    pub steps: Vec<SeedStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedComponent {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedStep {
    pub id: Uuid,
    pub step_number: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub hazard_level: HazardLevel,
    #[serde(default)]
    pub has_safety_gate: bool,
    #[serde(default)]
    pub power_off_required: bool,
    #[serde(default)]
    pub ppe_required: Vec<String>,
    #[serde(default)]
    pub safety_warnings: Vec<String>,
    pub educational_context: Option<serde_json::Value>,
}

/// Rows written by one seeding pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub devices: usize,
    pub components: usize,
    pub steps: usize,
}

impl SeedDevice {
    fn to_device(&self) -> Device {
        let components: Vec<Component> = self
            .components
            .iter()
            .map(|c| Component {
                id: c.id,
                device_id: self.id,
                name: c.name.clone(),
                kind: c.kind.clone(),
                value: c.value,
            })
            .collect();
        let total_value = self
            .total_value
            .unwrap_or_else(|| components.iter().map(|c| c.value).sum());

        Device {
            id: self.id,
            name: self.name.clone(),
            category: self.category.clone(),
            image_url: self.image_url.clone(),
            total_value,
            components,
        }
    }

    fn to_steps(&self) -> Vec<TeardownStep> {
        self.steps
            .iter()
            .map(|s| TeardownStep {
                id: s.id,
                device_id: self.id,
                step_number: s.step_number,
                title: s.title.clone(),
                description: s.description.clone(),
                image_url: s.image_url.clone(),
                instructions: s.instructions.clone(),
                hazard_level: s.hazard_level,
                has_safety_gate: s.has_safety_gate,
                power_off_required: s.power_off_required,
                ppe_required: s.ppe_required.clone(),
                safety_warnings: s.safety_warnings.clone(),
                educational_context: s.educational_context.clone(),
            })
            .collect()
    }
}

impl CatalogSeed {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let seed: CatalogSeed =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid catalog seed: {}", e)))?;
        seed.validate()?;
        Ok(seed)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        for device in &self.devices {
            let mut numbers: Vec<i64> = device.steps.iter().map(|s| s.step_number).collect();
            numbers.sort_unstable();
            if numbers.windows(2).any(|w| w[0] == w[1]) {
                return Err(Error::Config(format!(
                    "Device '{}' has duplicate step numbers",
                    device.name
                )));
            }
        }
        Ok(())
    }

    pub async fn apply(&self, pool: &SqlitePool) -> Result<SeedSummary> {
        let mut summary = SeedSummary::default();

        for seed in &self.devices {
            let device = seed.to_device();
            catalog::upsert_device(pool, &device).await?;
            summary.devices += 1;
            summary.components += device.components.len();

            for step in seed.to_steps() {
                catalog::upsert_step(pool, &step).await?;
                summary.steps += 1;
            }
        }

        tracing::info!(
            devices = summary.devices,
            components = summary.components,
            steps = summary.steps,
            "Catalog seeded"
        );
        Ok(summary)
    }
}
