//! HTTP API handlers for reloop-api

pub mod auth;
pub mod catalog;
pub mod health;
pub mod leaderboard;
pub mod marketplace;
pub mod profile;
pub mod sse;
pub mod teardown;
pub mod valuation;
pub mod verification;

pub use auth::{auth_routes, me};
pub use catalog::catalog_routes;
pub use health::health_routes;
pub use leaderboard::leaderboard_routes;
pub use marketplace::marketplace_routes;
pub use profile::profile_routes;
pub use sse::event_stream;
pub use teardown::teardown_routes;
pub use valuation::valuation_routes;
pub use verification::verification_routes;
