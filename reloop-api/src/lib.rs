//! reloop-api library interface
//!
//! Exposes the application state and router for the binary and for
//! integration testing.

pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use reloop_common::config::TomlConfig;
use reloop_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::SessionStore;
use crate::services::{
    PricingOracle, RewardLedger, ValuationService, VerificationWorkflow, VisionClassifier,
    WorkflowSettings,
};

/// Event bus capacity; slow SSE clients drop the oldest events
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Sign-in lifecycle and bearer token resolution
    pub session_store: Arc<SessionStore>,
    /// Live teardown sessions
    pub workflow: Arc<VerificationWorkflow>,
    /// XP, verification rows and profile statistics
    pub ledger: Arc<RewardLedger>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire every service around `db` using the collaborators given
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        vision: Arc<dyn VisionClassifier>,
        pricing: Arc<dyn PricingOracle>,
        config: &TomlConfig,
    ) -> Self {
        let settings = WorkflowSettings::from(&config.workflow);

        let ledger = Arc::new(RewardLedger::new(
            db.clone(),
            Arc::clone(&pricing),
            event_bus.clone(),
            settings.completion_bonus_xp,
        ));
        let valuation = Arc::new(ValuationService::new(
            pricing,
            event_bus.clone(),
            Duration::from_secs(config.gemini.timeout_seconds),
        ));
        let workflow = Arc::new(VerificationWorkflow::new(
            db.clone(),
            vision,
            valuation,
            Arc::clone(&ledger),
            event_bus.clone(),
            settings,
        ));
        let session_store = Arc::new(SessionStore::initialize(db.clone(), config.session_ttl_hours));

        Self {
            db,
            event_bus,
            session_store,
            workflow,
            ledger,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// Catalog, teardown, leaderboard and event routes are public; profile,
/// marketplace and donate routes require a bearer token.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    let protected = Router::new()
        .merge(api::profile_routes())
        .merge(api::marketplace_routes())
        .route("/api/auth/me", axum::routing::get(api::me))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .merge(protected)
        .merge(api::auth_routes())
        .merge(api::catalog_routes())
        .merge(api::teardown_routes())
        .merge(api::verification_routes())
        .merge(api::valuation_routes())
        .merge(api::leaderboard_routes())
        .route("/api/events", axum::routing::get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
