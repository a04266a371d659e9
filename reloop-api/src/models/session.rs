//! Live teardown session
//!
//! Runner position, verification board and decisions exist only here.
//! The persisted `teardown_sessions` row records ownership and status.

use chrono::{DateTime, Utc};
use reloop_common::db::{Device, SessionStatus};
use serde::Serialize;
use uuid::Uuid;

use super::{Decision, TeardownRunner, VerificationBoard};

#[derive(Debug, Clone)]
pub struct LiveSession {
    pub id: Uuid,
    pub device: Device,
    /// Signed-in owner; anonymous sessions are never persisted
    pub owner: Option<Uuid>,
    pub status: SessionStatus,
    pub runner: TeardownRunner,
    pub board: VerificationBoard,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last time a caller touched the session
    pub last_active: DateTime<Utc>,
}

impl LiveSession {
    pub fn new(device: Device, owner: Option<Uuid>, runner: TeardownRunner) -> Self {
        let board = VerificationBoard::new(device.components.iter().map(|c| c.id));
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            device,
            owner,
            status: SessionStatus::InProgress,
            runner,
            board,
            started_at: now,
            completed_at: None,
            last_active: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Mark completed; returns false if it already was
    pub fn complete(&mut self) -> bool {
        if self.is_completed() {
            return false;
        }
        self.status = SessionStatus::Completed;
        self.completed_at = Some(Utc::now());
        true
    }
}

/// Part forwarded to the marketplace or donation flow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarvestItem {
    pub component_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub condition: String,
    pub suggested_price_inr: i64,
    pub image_url: Option<String>,
}

/// Parts handed off when a session is finished
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarvestHandoff {
    pub session_id: Uuid,
    pub device: String,
    pub decision: Decision,
    pub components: Vec<HarvestItem>,
    pub created_at: DateTime<Utc>,
}
