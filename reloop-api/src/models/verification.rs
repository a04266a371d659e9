//! Per-component verification state
//!
//! Each live session owns a board keyed by component id, so any number of
//! components can be mid-verification at the same time.

use reloop_common::events::ComponentStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Reasoning surfaced when the classifier could not be reached
pub const SERVICE_BUSY_REASONING: &str = "AI Service Busy (Quota Exceeded). Please verify manually.";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Illegal verification transition: {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: ComponentStatus,
    pub to: ComponentStatus,
}

/// What the user intends to do with a harvested part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Resell,
    Donate,
    Recycle,
}

/// Why a component ended up `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Classifier looked at the photo and disagreed
    Mismatch,
    /// Classifier unreachable or over quota; manual bypass offered
    ServiceBusy,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ComponentEntry {
    pub status: ComponentStatus,
    pub failure: Option<FailureKind>,
    pub reasoning: Option<String>,
    /// Condition reported by the classifier ("Good", "Cracked", ...)
    pub condition: Option<String>,
    /// Normalized photo as a data URL
    #[serde(skip_serializing)]
    pub captured_image: Option<String>,
    pub decision: Option<Decision>,
    /// Bumped on every submission; stale background results are discarded
    #[serde(skip)]
    pub attempt: u64,
}

impl ComponentEntry {
    /// Move to `next`, returning the previous status
    pub fn transition_to(&mut self, next: ComponentStatus) -> Result<ComponentStatus, TransitionError> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(TransitionError { from, to: next });
        }
        self.status = next;
        if next != ComponentStatus::Failed {
            self.failure = None;
        }
        Ok(from)
    }

    pub fn bypass_allowed(&self) -> bool {
        self.status == ComponentStatus::Failed
    }
}

/// Verification state for every component of one session
#[derive(Debug, Clone, Default)]
pub struct VerificationBoard {
    entries: HashMap<Uuid, ComponentEntry>,
}

impl VerificationBoard {
    pub fn new(component_ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            entries: component_ids
                .into_iter()
                .map(|id| (id, ComponentEntry::default()))
                .collect(),
        }
    }

    pub fn entry(&self, component_id: Uuid) -> Option<&ComponentEntry> {
        self.entries.get(&component_id)
    }

    pub fn entry_mut(&mut self, component_id: Uuid) -> Option<&mut ComponentEntry> {
        self.entries.get_mut(&component_id)
    }

    pub fn status(&self, component_id: Uuid) -> ComponentStatus {
        self.entries
            .get(&component_id)
            .map(|e| e.status)
            .unwrap_or_default()
    }

    pub fn verified_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.status == ComponentStatus::Verified)
            .count()
    }

    pub fn decisions(&self) -> impl Iterator<Item = (Uuid, Decision)> + '_ {
        self.entries
            .iter()
            .filter_map(|(id, e)| e.decision.map(|d| (*id, d)))
    }

    pub fn has_decision(&self, decision: Decision) -> bool {
        self.entries.values().any(|e| e.decision == Some(decision))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &ComponentEntry)> {
        self.entries.iter()
    }
}
