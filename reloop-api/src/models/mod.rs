//! Data models for reloop-api
//!
//! - Teardown runner and verification state machines
//! - Two-phase valuation cell
//! - Activity feed and profile statistics
//! - Session, navigation and completion views

pub mod activity;
pub mod progress;
pub mod runner;
pub mod session;
pub mod valuation;
pub mod verification;
pub mod views;

pub use activity::{merge_activity, ActivityEntry};
pub use runner::{RunnerError, RunnerMove, TeardownRunner};
pub use session::{HarvestHandoff, HarvestItem, LiveSession};
pub use valuation::{ValuationCell, ValuationPhase, ValuationSnapshot, ValuationWriter};
pub use verification::{
    ComponentEntry, Decision, FailureKind, TransitionError, VerificationBoard,
    SERVICE_BUSY_REASONING,
};
pub use views::{
    ComponentView, CompletionView, FinishOutcome, GateView, NavigationView, SessionView,
};
