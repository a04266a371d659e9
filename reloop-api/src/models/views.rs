//! JSON views of live session state

use chrono::{DateTime, Utc};
use reloop_common::db::{SessionStatus, TeardownStep};
use reloop_common::events::ComponentStatus;
use serde::Serialize;
use uuid::Uuid;

use super::{Decision, FailureKind, HarvestHandoff, LiveSession, RunnerMove, ValuationSnapshot};

/// XP shown per component before any verification
pub const BASE_XP_PER_COMPONENT: i64 = 50;

#[derive(Debug, Clone, Serialize)]
pub struct GateView {
    pub step_id: Uuid,
    pub title: String,
    pub warnings: Vec<String>,
    pub ppe_required: Vec<String>,
    pub power_off_required: bool,
}

impl From<&TeardownStep> for GateView {
    fn from(step: &TeardownStep) -> Self {
        Self {
            step_id: step.id,
            title: step.title.clone(),
            warnings: step.safety_warnings.clone(),
            ppe_required: step.ppe_required.clone(),
            power_off_required: step.power_off_required,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub device_id: Uuid,
    pub device_name: String,
    pub status: SessionStatus,
    /// False for anonymous sessions, which are never persisted
    pub persisted: bool,
    pub current_index: usize,
    pub total_steps: usize,
    pub progress_percent: f64,
    pub is_first: bool,
    pub is_last: bool,
    pub current_step: TeardownStep,
    pub pending_gate: Option<GateView>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionView {
    pub fn of(session: &LiveSession) -> Self {
        let runner = &session.runner;
        Self {
            session_id: session.id,
            device_id: session.device.id,
            device_name: session.device.name.clone(),
            status: session.status,
            persisted: session.owner.is_some(),
            current_index: runner.current_index(),
            total_steps: runner.len(),
            progress_percent: runner.progress_percent(),
            is_first: runner.is_first(),
            is_last: runner.is_last(),
            current_step: runner.current_step().clone(),
            pending_gate: runner.pending_gate().map(GateView::from),
            started_at: session.started_at,
            completed_at: session.completed_at,
        }
    }
}

/// Navigation outcome plus the resulting position
#[derive(Debug, Clone, Serialize)]
pub struct NavigationView {
    #[serde(flatten)]
    pub outcome: RunnerMove,
    /// Where to go once the final step is done
    pub route: Option<String>,
    pub session: SessionView,
}

impl NavigationView {
    pub fn new(outcome: RunnerMove, session: &LiveSession) -> Self {
        let route = matches!(outcome, RunnerMove::Finished)
            .then(|| format!("/api/sessions/{}/completion", session.id));
        Self {
            outcome,
            route,
            session: SessionView::of(session),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentView {
    pub component_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub catalog_value: f64,
    pub price_inr: i64,
    pub status: ComponentStatus,
    pub failure: Option<FailureKind>,
    pub reasoning: Option<String>,
    pub condition: Option<String>,
    pub decision: Option<Decision>,
    pub bypass_available: bool,
    pub has_photo: bool,
}

impl ComponentView {
    pub fn of(session: &LiveSession, component_id: Uuid, valuation: &ValuationSnapshot) -> Option<Self> {
        let component = session.device.component(component_id)?;
        let entry = session.board.entry(component_id)?;
        Some(Self {
            component_id,
            name: component.name.clone(),
            kind: component.kind.clone(),
            catalog_value: component.value,
            price_inr: valuation
                .price_of(component_id)
                .unwrap_or_else(|| component.value.ceil() as i64),
            status: entry.status,
            failure: entry.failure,
            reasoning: entry.reasoning.clone(),
            condition: entry.condition.clone(),
            decision: entry.decision,
            bypass_available: entry.bypass_allowed(),
            has_photo: entry.captured_image.is_some(),
        })
    }
}

/// Harvest dashboard for a session
#[derive(Debug, Clone, Serialize)]
pub struct CompletionView {
    pub session_id: Uuid,
    pub device_id: Uuid,
    pub device_name: String,
    pub status: SessionStatus,
    pub verified_count: usize,
    pub total_components: usize,
    pub base_xp: i64,
    pub bonus_xp: i64,
    pub total_xp: i64,
    pub valuation: ValuationSnapshot,
    pub components: Vec<ComponentView>,
}

impl CompletionView {
    pub fn of(session: &LiveSession, valuation: ValuationSnapshot, verification_xp: i64) -> Self {
        let components: Vec<ComponentView> = session
            .device
            .components
            .iter()
            .filter_map(|c| ComponentView::of(session, c.id, &valuation))
            .collect();
        let verified_count = session.board.verified_count();
        let base_xp = session.device.components.len() as i64 * BASE_XP_PER_COMPONENT;
        let bonus_xp = verified_count as i64 * verification_xp;

        Self {
            session_id: session.id,
            device_id: session.device.id,
            device_name: session.device.name.clone(),
            status: session.status,
            verified_count,
            total_components: session.device.components.len(),
            base_xp,
            bonus_xp,
            total_xp: base_xp + bonus_xp,
            valuation,
            components,
        }
    }
}

/// Result of "process & finish"
#[derive(Debug, Clone, Serialize)]
pub struct FinishOutcome {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub completed_at: DateTime<Utc>,
    pub bonus_xp_awarded: i64,
    /// `/marketplace` when anything is marked for resale, else `/leaderboard`
    pub route: String,
    pub resell: Option<HarvestHandoff>,
    pub donate: Option<HarvestHandoff>,
}
