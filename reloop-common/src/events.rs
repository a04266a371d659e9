//! Event types and EventBus
//!
//! Verification work completes in background tasks. Events let a client that
//! has moved on to another view still learn the outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Per-component verification status
///
/// Legal moves: `Idle → Verifying`, `Verifying → Verified | Failed`,
/// `Failed → Verifying` (re-submission) and `Failed → Verified` (manual bypass).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    #[default]
    Idle,
    Verifying,
    Verified,
    Failed,
}

impl ComponentStatus {
    pub fn can_transition_to(self, next: ComponentStatus) -> bool {
        use ComponentStatus::*;
        matches!(
            (self, next),
            (Idle, Verifying) | (Verifying, Verified) | (Verifying, Failed) | (Failed, Verifying) | (Failed, Verified)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Idle => "idle",
            ComponentStatus::Verifying => "verifying",
            ComponentStatus::Verified => "verified",
            ComponentStatus::Failed => "failed",
        }
    }
}

/// ReLoop event types
///
/// Serialized with a `type` tag for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReloopEvent {
    /// A component moved through the verification state machine
    ComponentStatusChanged {
        session_id: Uuid,
        component_id: Uuid,
        old_status: ComponentStatus,
        new_status: ComponentStatus,
        /// Mismatch or busy explanation, when one exists
        reasoning: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Experience points were granted
    XpAwarded {
        user_id: Uuid,
        delta: i64,
        timestamp: DateTime<Utc>,
    },

    /// A teardown session was finished
    SessionCompleted {
        session_id: Uuid,
        device_id: Uuid,
        completed_at: DateTime<Utc>,
    },

    /// A richer valuation replaced the catalog baseline
    ValuationRefined {
        session_id: Uuid,
        total_inr: i64,
        timestamp: DateTime<Utc>,
    },
}

impl ReloopEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            ReloopEvent::ComponentStatusChanged { .. } => "ComponentStatusChanged",
            ReloopEvent::XpAwarded { .. } => "XpAwarded",
            ReloopEvent::SessionCompleted { .. } => "SessionCompleted",
            ReloopEvent::ValuationRefined { .. } => "ValuationRefined",
        }
    }

    /// Session the event belongs to, if any
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            ReloopEvent::ComponentStatusChanged { session_id, .. }
            | ReloopEvent::SessionCompleted { session_id, .. }
            | ReloopEvent::ValuationRefined { session_id, .. } => Some(*session_id),
            ReloopEvent::XpAwarded { .. } => None,
        }
    }
}

/// Broadcast bus for ReloopEvent
///
/// Thin wrapper over `tokio::sync::broadcast`; slow subscribers lose the
/// oldest events rather than blocking emitters.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ReloopEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    ///
    /// ```
    /// use reloop_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ReloopEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ReloopEvent,
    ) -> Result<usize, broadcast::error::SendError<ReloopEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ReloopEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
