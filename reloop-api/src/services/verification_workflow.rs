//! Verification workflow
//!
//! Owns every live teardown session: runner position, per-component
//! verification board and decisions. Photo classification runs in a
//! background task per submission, so a caller may keep navigating (or
//! submit other components) while a verdict is outstanding. Each session
//! sits behind its own mutex; the session map lock is only held to look a
//! session up.

use chrono::Utc;
use reloop_common::config::WorkflowConfig;
use reloop_common::db::{ComponentVerification, SessionStatus, VerificationRecordStatus};
use reloop_common::events::{ComponentStatus, EventBus, ReloopEvent};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::image_prep::{self, ImagePrepError, PreparedImage};
use super::reward_ledger::RewardLedger;
use super::valuation::ValuationService;
use super::vision_client::{ClassificationRequest, ClassificationStatus, VisionClassifier};
use crate::db::{catalog, sessions};
use crate::models::{
    ComponentView, CompletionView, Decision, FailureKind, FinishOutcome, HarvestHandoff,
    HarvestItem, LiveSession, NavigationView, RunnerError, SessionView, TeardownRunner,
    TransitionError, ValuationSnapshot, SERVICE_BUSY_REASONING,
};

const MISMATCH_REASONING: &str = "Image does not match component profile.";
const DEFAULT_CONDITION: &str = "Good";
pub const MARKETPLACE_ROUTE: &str = "/marketplace";
pub const LEADERBOARD_ROUTE: &str = "/leaderboard";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Device {0} not found")]
    DeviceNotFound(Uuid),

    #[error("Teardown not available for device {0}")]
    TeardownUnavailable(Uuid),

    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Component {component_id} is not part of session {session_id}")]
    ComponentNotFound { session_id: Uuid, component_id: Uuid },

    #[error("Session {0} is already completed")]
    AlreadyCompleted(Uuid),

    #[error("Component {0} must be verified before a decision is recorded")]
    NotVerified(Uuid),

    #[error("Manual bypass is only offered after a failed verification")]
    BypassUnavailable,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Image(#[from] ImagePrepError),

    #[error(transparent)]
    Common(#[from] reloop_common::Error),
}

/// Tunables taken from `[workflow]`
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub busy_delay: Duration,
    pub verification_xp: i64,
    pub completion_bonus_xp: i64,
    pub idle_timeout: Duration,
}

impl From<&WorkflowConfig> for WorkflowSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            busy_delay: Duration::from_millis(config.busy_delay_ms),
            verification_xp: config.verification_xp,
            completion_bonus_xp: config.completion_bonus_xp,
            idle_timeout: Duration::from_secs(config.session_idle_minutes.saturating_mul(60)),
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::from(&WorkflowConfig::default())
    }
}

/// Hand-offs waiting for a signed-in user
#[derive(Debug, Clone, Default)]
struct PendingHarvest {
    resell: Option<HarvestHandoff>,
    donate: Option<HarvestHandoff>,
}

/// Submission accepted for background classification
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubmissionAccepted {
    pub session_id: Uuid,
    pub component_id: Uuid,
    pub status: ComponentStatus,
    pub width: u32,
    pub height: u32,
}

enum Verdict {
    Verified { condition: Option<String>, reasoning: Option<String> },
    Mismatch { condition: Option<String>, reasoning: Option<String> },
    ServiceBusy,
}

type SharedSession = Arc<Mutex<LiveSession>>;

pub struct VerificationWorkflow {
    db: SqlitePool,
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
    handoffs: RwLock<HashMap<Uuid, PendingHarvest>>,
    vision: Arc<dyn VisionClassifier>,
    valuation: Arc<ValuationService>,
    ledger: Arc<RewardLedger>,
    event_bus: EventBus,
    settings: WorkflowSettings,
}

impl VerificationWorkflow {
    pub fn new(
        db: SqlitePool,
        vision: Arc<dyn VisionClassifier>,
        valuation: Arc<ValuationService>,
        ledger: Arc<RewardLedger>,
        event_bus: EventBus,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            db,
            sessions: RwLock::new(HashMap::new()),
            handoffs: RwLock::new(HashMap::new()),
            vision,
            valuation,
            ledger,
            event_bus,
            settings,
        }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub async fn live_session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Look a session up and check the caller may touch it
    ///
    /// Sessions owned by someone else are reported as missing.
    async fn session(&self, session_id: Uuid, caller: Option<Uuid>) -> Result<SharedSession, WorkflowError> {
        let shared = self
            .sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(WorkflowError::SessionNotFound(session_id))?;

        {
            let mut session = shared.lock().await;
            if session.owner.is_some() && session.owner != caller {
                return Err(WorkflowError::SessionNotFound(session_id));
            }
            session.last_active = Utc::now();
        }
        Ok(shared)
    }

    /// Drop live sessions idle for longer than the configured timeout
    ///
    /// Sessions whose lock is held are in use and skipped.
    pub async fn evict_idle(&self) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(self.settings.idle_timeout)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
        else {
            return 0;
        };

        let evicted: Vec<Uuid> = {
            let mut live = self.sessions.write().await;
            let stale: Vec<Uuid> = live
                .iter()
                .filter(|(_, shared)| {
                    shared
                        .try_lock()
                        .map(|session| session.last_active < cutoff)
                        .unwrap_or(false)
                })
                .map(|(id, _)| *id)
                .collect();
            for id in &stale {
                live.remove(id);
            }
            stale
        };

        for id in &evicted {
            self.valuation.forget(*id).await;
        }
        if !evicted.is_empty() {
            tracing::info!(evicted = evicted.len(), "Idle teardown sessions evicted");
        }
        evicted.len()
    }

    /// Begin a device's teardown
    ///
    /// Signed-in owners get a persisted `teardown_sessions` row; anonymous
    /// sessions live in memory only.
    pub async fn start_session(&self, device_id: Uuid, owner: Option<Uuid>) -> Result<SessionView, WorkflowError> {
        let device = catalog::get_device(&self.db, device_id)
            .await?
            .ok_or(WorkflowError::DeviceNotFound(device_id))?;
        let steps = catalog::list_steps(&self.db, device_id).await?;

        let runner = TeardownRunner::new(steps).map_err(|e| match e {
            RunnerError::NoSteps => WorkflowError::TeardownUnavailable(device_id),
            other => WorkflowError::Runner(other),
        })?;

        let session = LiveSession::new(device, owner, runner);
        let session_id = session.id;

        match owner {
            Some(user_id) => {
                self.ledger
                    .open_session(session_id, user_id, device_id, session.started_at)
                    .await;
            }
            None => {
                tracing::warn!(session_id = %session_id, "Anonymous teardown session will not be persisted");
            }
        }

        tracing::info!(
            session_id = %session_id,
            device_id = %device_id,
            steps = session.runner.len(),
            "Teardown session started"
        );

        self.evict_idle().await;

        let view = SessionView::of(&session);
        self.sessions
            .write()
            .await
            .insert(session_id, Arc::new(Mutex::new(session)));
        Ok(view)
    }

    pub async fn snapshot(&self, session_id: Uuid, caller: Option<Uuid>) -> Result<SessionView, WorkflowError> {
        let shared = self.session(session_id, caller).await?;
        let session = shared.lock().await;
        Ok(SessionView::of(&session))
    }

    pub async fn advance(&self, session_id: Uuid, caller: Option<Uuid>) -> Result<NavigationView, WorkflowError> {
        let shared = self.session(session_id, caller).await?;
        let mut session = shared.lock().await;
        let outcome = session.runner.advance();
        tracing::debug!(session_id = %session_id, ?outcome, "Advance");
        Ok(NavigationView::new(outcome, &session))
    }

    pub async fn retreat(&self, session_id: Uuid, caller: Option<Uuid>) -> Result<NavigationView, WorkflowError> {
        let shared = self.session(session_id, caller).await?;
        let mut session = shared.lock().await;
        let outcome = session.runner.retreat();
        Ok(NavigationView::new(outcome, &session))
    }

    pub async fn acknowledge_gate(&self, session_id: Uuid, caller: Option<Uuid>) -> Result<NavigationView, WorkflowError> {
        let shared = self.session(session_id, caller).await?;
        let mut session = shared.lock().await;
        let outcome = session.runner.acknowledge_gate()?;
        tracing::info!(
            session_id = %session_id,
            step = session.runner.current_step().step_number,
            "Safety gate acknowledged"
        );
        Ok(NavigationView::new(outcome, &session))
    }

    pub async fn cancel_gate(&self, session_id: Uuid, caller: Option<Uuid>) -> Result<SessionView, WorkflowError> {
        let shared = self.session(session_id, caller).await?;
        let mut session = shared.lock().await;
        session.runner.cancel_gate();
        Ok(SessionView::of(&session))
    }

    /// Drop a live session without finishing it
    pub async fn discard(&self, session_id: Uuid, caller: Option<Uuid>) -> Result<(), WorkflowError> {
        self.session(session_id, caller).await?;
        self.sessions.write().await.remove(&session_id);
        self.valuation.forget(session_id).await;
        tracing::info!(session_id = %session_id, "Teardown session discarded");
        Ok(())
    }

    /// Accept a component photo and classify it in the background
    ///
    /// The component moves to `Verifying` before this returns; the verdict
    /// arrives later as a `ComponentStatusChanged` event.
    pub async fn submit_photo(
        self: &Arc<Self>,
        session_id: Uuid,
        component_id: Uuid,
        caller: Option<Uuid>,
        photo: Vec<u8>,
    ) -> Result<SubmissionAccepted, WorkflowError> {
        let shared = self.session(session_id, caller).await?;

        let prepared = tokio::task::spawn_blocking(move || image_prep::normalize_photo(&photo))
            .await
            .map_err(|e| reloop_common::Error::Internal(format!("Image task failed: {}", e)))??;

        let (request, attempt, old_status) = {
            let mut session = shared.lock().await;
            if session.is_completed() {
                return Err(WorkflowError::AlreadyCompleted(session_id));
            }
            let device_name = session.device.name.clone();
            let component_name = session
                .device
                .component(component_id)
                .map(|c| c.name.clone())
                .ok_or(WorkflowError::ComponentNotFound { session_id, component_id })?;
            let entry = session
                .board
                .entry_mut(component_id)
                .ok_or(WorkflowError::ComponentNotFound { session_id, component_id })?;

            let old_status = entry.transition_to(ComponentStatus::Verifying)?;
            entry.attempt += 1;
            entry.reasoning = None;
            entry.condition = None;
            entry.captured_image = Some(prepared.data_url());

            let request = ClassificationRequest {
                image: prepared.inline(),
                device_name,
                component_name,
            };
            (request, entry.attempt, old_status)
        };

        self.emit_status(session_id, component_id, old_status, ComponentStatus::Verifying, None);
        tracing::info!(
            session_id = %session_id,
            component_id = %component_id,
            attempt,
            "Photo accepted for verification"
        );

        let workflow = Arc::clone(self);
        tokio::spawn(async move {
            workflow.classify_in_background(shared, session_id, component_id, attempt, request).await;
        });

        Ok(SubmissionAccepted {
            session_id,
            component_id,
            status: ComponentStatus::Verifying,
            width: prepared.width,
            height: prepared.height,
        })
    }

    async fn classify_in_background(
        &self,
        shared: SharedSession,
        session_id: Uuid,
        component_id: Uuid,
        attempt: u64,
        request: ClassificationRequest,
    ) {
        let verdict = match self.vision.classify(request).await {
            Ok(c) if c.status == ClassificationStatus::Verified => Verdict::Verified {
                condition: c.condition,
                reasoning: c.reasoning,
            },
            Ok(c) => Verdict::Mismatch {
                condition: c.condition,
                reasoning: c.reasoning,
            },
            Err(e) => {
                if e.is_quota() {
                    tracing::warn!(session_id = %session_id, component_id = %component_id, error = %e, "Vision quota exceeded");
                } else {
                    tracing::warn!(session_id = %session_id, component_id = %component_id, error = %e, "Vision collaborator unavailable");
                }
                tokio::time::sleep(self.settings.busy_delay).await;
                Verdict::ServiceBusy
            }
        };

        let mut session = shared.lock().await;
        let owner = session.owner;
        let still_current = session
            .board
            .entry(component_id)
            .is_some_and(|e| e.attempt == attempt && e.status == ComponentStatus::Verifying);
        if !still_current {
            tracing::debug!(session_id = %session_id, component_id = %component_id, attempt, "Discarding stale verdict");
            return;
        }
        let image = session
            .board
            .entry(component_id)
            .and_then(|e| e.captured_image.clone());

        let (next, failure, condition, reasoning) = match verdict {
            Verdict::Verified { condition, reasoning } => {
                if let Some(user_id) = owner {
                    self.ledger.award_xp(user_id, self.settings.verification_xp).await;
                }
                self.persist(owner, session_id, component_id, VerificationRecordStatus::Verified, image, false)
                    .await;
                (ComponentStatus::Verified, None, condition, reasoning)
            }
            Verdict::Mismatch { condition, reasoning } => {
                self.persist(owner, session_id, component_id, VerificationRecordStatus::Rejected, image, false)
                    .await;
                let reasoning = reasoning.or_else(|| Some(MISMATCH_REASONING.to_string()));
                (ComponentStatus::Failed, Some(FailureKind::Mismatch), condition, reasoning)
            }
            Verdict::ServiceBusy => {
                self.persist(owner, session_id, component_id, VerificationRecordStatus::Rejected, image, false)
                    .await;
                (
                    ComponentStatus::Failed,
                    Some(FailureKind::ServiceBusy),
                    None,
                    Some(SERVICE_BUSY_REASONING.to_string()),
                )
            }
        };

        let Some(entry) = session.board.entry_mut(component_id) else {
            return;
        };
        let old = match entry.transition_to(next) {
            Ok(old) => old,
            Err(e) => {
                tracing::error!(session_id = %session_id, component_id = %component_id, error = %e, "Verdict rejected");
                return;
            }
        };
        entry.failure = failure;
        entry.condition = condition;
        entry.reasoning = reasoning.clone();
        drop(session);

        tracing::info!(
            session_id = %session_id,
            component_id = %component_id,
            status = next.as_str(),
            "Verification resolved"
        );
        self.emit_status(session_id, component_id, old, next, reasoning);
    }

    /// Force a failed component to verified and award the fixed XP
    pub async fn bypass(
        &self,
        session_id: Uuid,
        component_id: Uuid,
        caller: Option<Uuid>,
    ) -> Result<ComponentView, WorkflowError> {
        let shared = self.session(session_id, caller).await?;
        let mut session = shared.lock().await;
        if session.is_completed() {
            return Err(WorkflowError::AlreadyCompleted(session_id));
        }

        let entry = session
            .board
            .entry(component_id)
            .ok_or(WorkflowError::ComponentNotFound { session_id, component_id })?;
        if !entry.bypass_allowed() {
            return Err(WorkflowError::BypassUnavailable);
        }
        let image = entry.captured_image.clone();
        let owner = session.owner;

        if let Some(user_id) = owner {
            self.ledger.award_xp(user_id, self.settings.verification_xp).await;
        }
        self.persist(owner, session_id, component_id, VerificationRecordStatus::Verified, image, true)
            .await;

        let old = match session.board.entry_mut(component_id) {
            Some(entry) => entry.transition_to(ComponentStatus::Verified)?,
            None => return Err(WorkflowError::ComponentNotFound { session_id, component_id }),
        };

        tracing::info!(session_id = %session_id, component_id = %component_id, "Manual verification bypass");
        let valuation = self.current_valuation(&session).await;
        let view = ComponentView::of(&session, component_id, &valuation)
            .ok_or(WorkflowError::ComponentNotFound { session_id, component_id })?;
        drop(session);

        self.emit_status(session_id, component_id, old, ComponentStatus::Verified, None);
        Ok(view)
    }

    /// Attach (or clear) the resell/donate/recycle choice for a verified part
    pub async fn decide(
        &self,
        session_id: Uuid,
        component_id: Uuid,
        caller: Option<Uuid>,
        decision: Option<Decision>,
    ) -> Result<ComponentView, WorkflowError> {
        let shared = self.session(session_id, caller).await?;
        let mut session = shared.lock().await;
        if session.is_completed() {
            return Err(WorkflowError::AlreadyCompleted(session_id));
        }

        let entry = session
            .board
            .entry_mut(component_id)
            .ok_or(WorkflowError::ComponentNotFound { session_id, component_id })?;
        if entry.status != ComponentStatus::Verified {
            return Err(WorkflowError::NotVerified(component_id));
        }
        entry.decision = decision;

        let valuation = self.current_valuation(&session).await;
        ComponentView::of(&session, component_id, &valuation)
            .ok_or(WorkflowError::ComponentNotFound { session_id, component_id })
    }

    /// Harvest dashboard; starts valuation on first request
    pub async fn completion_view(&self, session_id: Uuid, caller: Option<Uuid>) -> Result<CompletionView, WorkflowError> {
        let shared = self.session(session_id, caller).await?;
        let session = shared.lock().await;
        let valuation = self.current_valuation(&session).await;
        Ok(CompletionView::of(&session, valuation, self.settings.verification_xp))
    }

    pub async fn valuation(&self, session_id: Uuid, caller: Option<Uuid>) -> Result<ValuationSnapshot, WorkflowError> {
        let shared = self.session(session_id, caller).await?;
        let session = shared.lock().await;
        Ok(self.current_valuation(&session).await)
    }

    async fn current_valuation(&self, session: &LiveSession) -> ValuationSnapshot {
        self.valuation
            .appraise(session.id, &session.device)
            .await
            .current()
    }

    /// Process & finish
    ///
    /// Completes the session, awards the completion bonus once and hands
    /// resell/donate parts off to the marketplace flows.
    pub async fn finish(&self, session_id: Uuid, caller: Option<Uuid>) -> Result<FinishOutcome, WorkflowError> {
        let shared = match self.session(session_id, caller).await {
            Ok(shared) => shared,
            Err(WorkflowError::SessionNotFound(id)) => return Err(self.finished_or_missing(id, caller).await),
            Err(e) => return Err(e),
        };
        let mut session = shared.lock().await;
        if !session.complete() {
            return Err(WorkflowError::AlreadyCompleted(session_id));
        }
        let completed_at = session.completed_at.unwrap_or_else(Utc::now);

        let valuation = self.current_valuation(&session).await;
        let resell = self.build_handoff(&session, Decision::Resell, &valuation);
        let donate = self.build_handoff(&session, Decision::Donate, &valuation);
        let owner = session.owner;
        let device_id = session.device.id;
        drop(session);

        let mut bonus_xp_awarded = 0;
        match owner {
            Some(user_id) => {
                self.ledger.complete_session(session_id, completed_at).await;
                if self
                    .ledger
                    .award_xp(user_id, self.settings.completion_bonus_xp)
                    .await
                    .is_some()
                {
                    bonus_xp_awarded = self.settings.completion_bonus_xp;
                }

                let mut handoffs = self.handoffs.write().await;
                let pending = handoffs.entry(user_id).or_default();
                if resell.is_some() {
                    pending.resell = resell.clone();
                }
                if donate.is_some() {
                    pending.donate = donate.clone();
                }
            }
            None => {
                tracing::warn!(session_id = %session_id, "Finishing anonymous session; nothing persisted");
            }
        }

        let route = if resell.is_some() {
            MARKETPLACE_ROUTE
        } else {
            LEADERBOARD_ROUTE
        };

        self.sessions.write().await.remove(&session_id);
        self.valuation.forget(session_id).await;

        tracing::info!(session_id = %session_id, route, "Teardown session completed");
        self.event_bus.emit_lossy(ReloopEvent::SessionCompleted {
            session_id,
            device_id,
            completed_at,
        });

        Ok(FinishOutcome {
            session_id,
            status: SessionStatus::Completed,
            completed_at,
            bonus_xp_awarded,
            route: route.to_string(),
            resell,
            donate,
        })
    }

    /// Released sessions survive only as their persisted row
    async fn finished_or_missing(&self, session_id: Uuid, caller: Option<Uuid>) -> WorkflowError {
        match sessions::load_session(&self.db, session_id).await {
            Ok(Some(row)) if row.status == SessionStatus::Completed && Some(row.user_id) == caller => {
                WorkflowError::AlreadyCompleted(session_id)
            }
            Ok(_) => WorkflowError::SessionNotFound(session_id),
            Err(e) => WorkflowError::Common(e),
        }
    }

    fn build_handoff(
        &self,
        session: &LiveSession,
        decision: Decision,
        valuation: &ValuationSnapshot,
    ) -> Option<HarvestHandoff> {
        let components: Vec<HarvestItem> = session
            .device
            .components
            .iter()
            .filter_map(|c| {
                let entry = session.board.entry(c.id)?;
                (entry.decision == Some(decision)).then(|| HarvestItem {
                    component_id: c.id,
                    name: c.name.clone(),
                    kind: c.kind.clone(),
                    condition: entry
                        .condition
                        .clone()
                        .unwrap_or_else(|| DEFAULT_CONDITION.to_string()),
                    suggested_price_inr: valuation
                        .price_of(c.id)
                        .unwrap_or_else(|| c.value.ceil() as i64),
                    image_url: entry.captured_image.clone(),
                })
            })
            .collect();

        if components.is_empty() {
            return None;
        }

        Some(HarvestHandoff {
            session_id: session.id,
            device: session.device.name.clone(),
            decision,
            components,
            created_at: Utc::now(),
        })
    }

    pub async fn pending_resell(&self, user_id: Uuid) -> Option<HarvestHandoff> {
        self.handoffs
            .read()
            .await
            .get(&user_id)
            .and_then(|p| p.resell.clone())
    }

    pub async fn pending_donate(&self, user_id: Uuid) -> Option<HarvestHandoff> {
        self.handoffs
            .read()
            .await
            .get(&user_id)
            .and_then(|p| p.donate.clone())
    }

    /// Forget the resell hand-off once the marketplace has consumed it
    pub async fn clear_resell(&self, user_id: Uuid) -> bool {
        let mut handoffs = self.handoffs.write().await;
        match handoffs.get_mut(&user_id) {
            Some(pending) => pending.resell.take().is_some(),
            None => false,
        }
    }

    async fn persist(
        &self,
        owner: Option<Uuid>,
        session_id: Uuid,
        component_id: Uuid,
        status: VerificationRecordStatus,
        image_url: Option<String>,
        manual_verified: bool,
    ) {
        let Some(user_id) = owner else {
            tracing::warn!(
                session_id = %session_id,
                component_id = %component_id,
                "Cannot save verification: no signed-in user"
            );
            return;
        };

        let now = Utc::now();
        let verified = status == VerificationRecordStatus::Verified;
        let record = ComponentVerification {
            id: Uuid::new_v4(),
            user_id,
            component_id,
            teardown_session_id: Some(session_id),
            status,
            xp_awarded: if verified { self.settings.verification_xp } else { 0 },
            image_url,
            verified_at: verified.then_some(now),
            manual_verified,
            created_at: now,
        };
        self.ledger.record_verification(&record).await;
    }

    fn emit_status(
        &self,
        session_id: Uuid,
        component_id: Uuid,
        old_status: ComponentStatus,
        new_status: ComponentStatus,
        reasoning: Option<String>,
    ) {
        self.event_bus.emit_lossy(ReloopEvent::ComponentStatusChanged {
            session_id,
            component_id,
            old_status,
            new_status,
            reasoning,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::verifications::VerifiedPart;
    use crate::services::catalog_seed::CatalogSeed;
    use crate::services::gemini::{CollaboratorError, InlineImage};
    use crate::services::pricing_client::PricingOracle;
    use crate::services::vision_client::Classification;
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    const PIXEL: &str = "0b6f3c1e-6a3d-4c55-9a0e-2f1d7f7e0a01";
    const PIXEL_DISPLAY: &str = "0b6f3c1e-6a3d-4c55-9a0e-2f1d7f7e0b01";

    struct AlwaysVerified;

    #[async_trait]
    impl VisionClassifier for AlwaysVerified {
        async fn classify(&self, _request: ClassificationRequest) -> Result<Classification, CollaboratorError> {
            Ok(Classification {
                status: ClassificationStatus::Verified,
                condition: Some("Good".to_string()),
                reasoning: None,
            })
        }
    }

    struct NoPricing;

    #[async_trait]
    impl PricingOracle for NoPricing {
        async fn estimate_prices(&self, _prompt: &str) -> Result<Map<String, Value>, CollaboratorError> {
            Err(CollaboratorError::NotConfigured)
        }

        async fn estimate_waste_kg(&self, _parts: &[VerifiedPart]) -> Result<f64, CollaboratorError> {
            Err(CollaboratorError::NotConfigured)
        }
    }

    async fn workflow(settings: WorkflowSettings) -> Arc<VerificationWorkflow> {
        let pool = reloop_common::db::init_memory_database().await.unwrap();
        CatalogSeed::from_toml_str(include_str!("../../catalog.toml"))
            .unwrap()
            .apply(&pool)
            .await
            .unwrap();

        let pricing: Arc<dyn PricingOracle> = Arc::new(NoPricing);
        let bus = EventBus::new(16);
        let ledger = Arc::new(RewardLedger::new(pool.clone(), Arc::clone(&pricing), bus.clone(), 500));
        let valuation = Arc::new(ValuationService::new(pricing, bus.clone(), Duration::from_secs(1)));
        Arc::new(VerificationWorkflow::new(
            pool,
            Arc::new(AlwaysVerified),
            valuation,
            ledger,
            bus,
            settings,
        ))
    }

    fn request() -> ClassificationRequest {
        ClassificationRequest {
            image: InlineImage {
                base64: String::new(),
                mime_type: "image/jpeg".to_string(),
            },
            device_name: "Google Pixel 4a".to_string(),
            component_name: "OLED Display Assembly".to_string(),
        }
    }

    #[tokio::test]
    async fn test_verdict_for_superseded_attempt_is_discarded() {
        let workflow = workflow(WorkflowSettings::default()).await;
        let display = Uuid::parse_str(PIXEL_DISPLAY).unwrap();
        let view = workflow
            .start_session(Uuid::parse_str(PIXEL).unwrap(), None)
            .await
            .unwrap();
        let shared = workflow.session(view.session_id, None).await.unwrap();

        {
            let mut session = shared.lock().await;
            let entry = session.board.entry_mut(display).unwrap();
            entry.transition_to(ComponentStatus::Verifying).unwrap();
            entry.attempt = 2;
        }

        // A late answer for attempt 1 must not resolve attempt 2
        workflow
            .classify_in_background(Arc::clone(&shared), view.session_id, display, 1, request())
            .await;
        {
            let session = shared.lock().await;
            let entry = session.board.entry(display).unwrap();
            assert_eq!(entry.status, ComponentStatus::Verifying);
            assert!(entry.condition.is_none());
        }

        workflow
            .classify_in_background(Arc::clone(&shared), view.session_id, display, 2, request())
            .await;
        let session = shared.lock().await;
        let entry = session.board.entry(display).unwrap();
        assert_eq!(entry.status, ComponentStatus::Verified);
        assert_eq!(entry.condition.as_deref(), Some("Good"));
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let settings = WorkflowSettings {
            idle_timeout: Duration::from_secs(60),
            ..WorkflowSettings::default()
        };
        let workflow = workflow(settings).await;
        let pixel = Uuid::parse_str(PIXEL).unwrap();

        let stale = workflow.start_session(pixel, None).await.unwrap();
        workflow.valuation(stale.session_id, None).await.unwrap();
        {
            let shared = workflow.session(stale.session_id, None).await.unwrap();
            shared.lock().await.last_active = Utc::now() - chrono::Duration::minutes(5);
        }

        // Starting another session sweeps the idle one
        let fresh = workflow.start_session(pixel, None).await.unwrap();
        assert_eq!(workflow.live_session_count().await, 1);
        assert!(workflow.valuation.cell(stale.session_id).await.is_none());
        assert!(matches!(
            workflow.snapshot(stale.session_id, None).await,
            Err(WorkflowError::SessionNotFound(_))
        ));
        assert!(workflow.snapshot(fresh.session_id, None).await.is_ok());
        assert_eq!(workflow.evict_idle().await, 0);
    }

    #[test]
    fn test_settings_from_config_defaults() {
        let settings = WorkflowSettings::default();
        assert_eq!(settings.busy_delay, Duration::from_millis(1500));
        assert_eq!(settings.verification_xp, 250);
        assert_eq!(settings.completion_bonus_xp, 500);
        assert_eq!(settings.idle_timeout, Duration::from_secs(120 * 60));
    }
}
