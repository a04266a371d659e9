//! Database models
//!
//! Rows are stored with TEXT identifiers and RFC 3339 timestamps; these
//! types are the decoded form handed to the rest of the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Device with its harvestable components
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub image_url: Option<String>,
    /// Aggregate catalog value (INR)
    pub total_value: f64,
    pub components: Vec<Component>,
}

impl Device {
    pub fn component(&self, component_id: Uuid) -> Option<&Component> {
        self.components.iter().find(|c| c.id == component_id)
    }
}

/// Harvestable part of a device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Component {
    pub id: Uuid,
    pub device_id: Uuid,
    pub name: String,
    /// Free-form type tag ("display", "battery", ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Stored estimate (INR)
    pub value: f64,
}

/// Hazard level of a teardown step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HazardLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl HazardLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardLevel::Low => "low",
            HazardLevel::Medium => "medium",
            HazardLevel::High => "high",
        }
    }
}

impl FromStr for HazardLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(HazardLevel::Low),
            "medium" => Ok(HazardLevel::Medium),
            "high" => Ok(HazardLevel::High),
            other => Err(Error::InvalidInput(format!("Unknown hazard level: {}", other))),
        }
    }
}

/// One step of a device's teardown sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeardownStep {
    pub id: Uuid,
    pub device_id: Uuid,
    /// Position within the device's sequence (ascending)
    pub step_number: i64,
    pub title: String,
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
    /// Free-form "science behind it" block
    #[serde(default)]
    pub educational_context: Option<serde_json::Value>,
}

/// Persisted teardown session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(Error::InvalidInput(format!("Unknown session status: {}", other))),
        }
    }
}

/// A user's pass through one device's teardown steps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeardownSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: Uuid,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Persisted verification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationRecordStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationRecordStatus::Pending => "pending",
            VerificationRecordStatus::Verified => "verified",
            VerificationRecordStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for VerificationRecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationRecordStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VerificationRecordStatus::Pending),
            "verified" => Ok(VerificationRecordStatus::Verified),
            "rejected" => Ok(VerificationRecordStatus::Rejected),
            other => Err(Error::InvalidInput(format!(
                "Unknown verification status: {}",
                other
            ))),
        }
    }
}

/// One row per (user, component)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentVerification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub component_id: Uuid,
    pub teardown_session_id: Option<Uuid>,
    pub status: VerificationRecordStatus,
    pub xp_awarded: i64,
    pub image_url: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub manual_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Public profile of a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: Option<String>,
    /// Affiliation label
    pub school: Option<String>,
    pub xp: i64,
}

/// Parse a TEXT identifier column
pub fn parse_uuid(column: &str, value: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Parse an RFC 3339 timestamp column
pub fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            VerificationRecordStatus::Pending,
            VerificationRecordStatus::Verified,
            VerificationRecordStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<VerificationRecordStatus>().unwrap(), status);
        }
        assert!("approved".parse::<VerificationRecordStatus>().is_err());
    }

    #[test]
    fn test_hazard_level_serializes_lowercase() {
        let json = serde_json::to_string(&HazardLevel::High).unwrap();
        assert_eq!(json, "\"high\"");
        assert_eq!(HazardLevel::default(), HazardLevel::Low);
    }

    #[test]
    fn test_component_type_field_name() {
        let component = Component {
            id: Uuid::new_v4(),
            device_id: Uuid::new_v4(),
            name: "OLED Panel".to_string(),
            kind: "display".to_string(),
            value: 1200.0,
        };
        let json = serde_json::to_value(&component).unwrap();
        assert_eq!(json["type"], "display");
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("completed_at", "yesterday").is_err());
        assert!(parse_timestamp("completed_at", "2026-01-01T00:00:00Z").is_ok());
    }
}
