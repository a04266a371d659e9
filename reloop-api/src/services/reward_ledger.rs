//! Reward ledger
//!
//! Write operations are best-effort: a failed write is logged and reported
//! as `false`/`None`, never as an error, so the live session keeps going.
//! Read operations (profile, leaderboard) surface errors normally.

use chrono::{DateTime, Utc};
use reloop_common::db::{ComponentVerification, UserProfile, VerificationRecordStatus};
use reloop_common::events::{EventBus, ReloopEvent};
use reloop_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use super::pricing_client::PricingOracle;
use crate::db::{sessions, users, verifications};
use crate::models::progress::{self, Achievement};
use crate::models::{merge_activity, ActivityEntry};

const ACTIVITY_PER_KIND: i64 = 5;
const ACTIVITY_LIMIT: usize = 5;
const LEADERBOARD_SIZE: i64 = 10;

/// Shell weight per completed session when no part has been verified
const SHELL_KG_PER_SESSION: f64 = 1.8;
const FALLBACK_KG_PER_SESSION: f64 = 2.5;
const FALLBACK_KG_PER_PART: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileStats {
    pub rank: i64,
    pub xp: i64,
    pub parts_saved: i64,
    pub waste_diverted_kg: f64,
    pub safety_rating: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub id: Uuid,
    pub name: String,
    pub school: String,
    pub stats: ProfileStats,
    pub level: i64,
    pub progress_to_next_level: f64,
    pub achievements: Vec<Achievement>,
    pub activity: Vec<ActivityEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: Uuid,
    pub name: String,
    pub school: String,
    pub xp: i64,
    pub parts_saved: i64,
}

/// Outcome of asking the pricing collaborator for a waste figure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WasteEstimate {
    Estimated(f64),
    /// Verified parts exist but the collaborator gave no usable answer
    Failed,
    /// Nothing verified yet; the collaborator is not asked
    NoParts,
}

/// Kilograms diverted, falling back to per-session and per-part constants
pub fn waste_diverted_kg(estimate: WasteEstimate, completed_sessions: i64, parts_saved: i64) -> f64 {
    match estimate {
        WasteEstimate::Estimated(kg) => kg,
        WasteEstimate::Failed => {
            completed_sessions as f64 * FALLBACK_KG_PER_SESSION + parts_saved as f64 * FALLBACK_KG_PER_PART
        }
        WasteEstimate::NoParts => completed_sessions as f64 * SHELL_KG_PER_SESSION,
    }
}

pub struct RewardLedger {
    db: SqlitePool,
    pricing: Arc<dyn PricingOracle>,
    event_bus: EventBus,
    completion_bonus_xp: i64,
}

impl RewardLedger {
    pub fn new(
        db: SqlitePool,
        pricing: Arc<dyn PricingOracle>,
        event_bus: EventBus,
        completion_bonus_xp: i64,
    ) -> Self {
        Self {
            db,
            pricing,
            event_bus,
            completion_bonus_xp,
        }
    }

    /// Add `delta` XP; returns the new total when the write landed
    pub async fn award_xp(&self, user_id: Uuid, delta: i64) -> Option<i64> {
        match users::add_xp(&self.db, user_id, delta).await {
            Ok(Some(total)) => {
                tracing::info!(user_id = %user_id, delta, total, "XP awarded");
                self.event_bus.emit_lossy(ReloopEvent::XpAwarded {
                    user_id,
                    delta,
                    timestamp: Utc::now(),
                });
                Some(total)
            }
            Ok(None) => {
                tracing::warn!(user_id = %user_id, delta, "XP award skipped: unknown user");
                None
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, delta, error = %e, "Failed to award XP");
                None
            }
        }
    }

    /// Upsert the (user, component) verification row
    pub async fn record_verification(&self, record: &ComponentVerification) -> bool {
        match verifications::upsert_verification(&self.db, record).await {
            Ok(()) => {
                tracing::debug!(
                    user_id = %record.user_id,
                    component_id = %record.component_id,
                    status = %record.status,
                    "Verification recorded"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    user_id = %record.user_id,
                    component_id = %record.component_id,
                    error = %e,
                    "Failed to record verification"
                );
                false
            }
        }
    }

    pub async fn open_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        device_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> bool {
        match sessions::insert_session(&self.db, session_id, user_id, device_id, started_at).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Failed to persist teardown session");
                false
            }
        }
    }

    pub async fn complete_session(&self, session_id: Uuid, completed_at: DateTime<Utc>) -> bool {
        match sessions::mark_completed(&self.db, session_id, completed_at).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(session_id = %session_id, "Session row missing or already completed");
                false
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Failed to complete session");
                false
            }
        }
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<ProfileView> {
        let UserProfile { id, name, school, xp } = users::get_profile(&self.db, user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("User {} not found", user_id)))?;

        let rank = users::count_users_above(&self.db, xp).await? + 1;
        let parts_saved = sessions::completed_parts_count(&self.db, user_id).await?;
        let completed_sessions = sessions::count_completed(&self.db, user_id).await?;
        let verified = verifications::count_by_status(&self.db, user_id, VerificationRecordStatus::Verified).await?;
        let rejected = verifications::count_by_status(&self.db, user_id, VerificationRecordStatus::Rejected).await?;

        let verified_parts = verifications::verified_parts_context(&self.db, user_id).await?;
        let estimate = if verified_parts.is_empty() {
            WasteEstimate::NoParts
        } else {
            match self.pricing.estimate_waste_kg(&verified_parts).await {
                Ok(kg) => WasteEstimate::Estimated(kg),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Waste estimate failed, using fallback");
                    WasteEstimate::Failed
                }
            }
        };
        let waste = waste_diverted_kg(estimate, completed_sessions, parts_saved);

        let activity = self.activity(user_id).await?;

        Ok(ProfileView {
            id,
            name: name.unwrap_or_else(|| "Anonymous Excavator".to_string()),
            school: school.unwrap_or_else(|| "Independent".to_string()),
            stats: ProfileStats {
                rank,
                xp,
                parts_saved,
                waste_diverted_kg: (waste * 10.0).round() / 10.0,
                safety_rating: progress::safety_rating(verified, rejected),
            },
            level: progress::level_for(xp),
            progress_to_next_level: progress::progress_to_next_level(xp),
            achievements: progress::achievements(xp),
            activity,
        })
    }

    async fn activity(&self, user_id: Uuid) -> Result<Vec<ActivityEntry>> {
        let verification_entries = verifications::recent_with_component(&self.db, user_id, ACTIVITY_PER_KIND)
            .await?
            .into_iter()
            .map(|(component_name, status, xp_awarded, at)| ActivityEntry::Verification {
                component_name,
                status,
                xp_awarded,
                at,
            })
            .collect();

        let session_entries = sessions::recent_completed(&self.db, user_id, ACTIVITY_PER_KIND)
            .await?
            .into_iter()
            .map(|(device_name, at)| ActivityEntry::Session {
                device_name,
                xp_awarded: self.completion_bonus_xp,
                at,
            })
            .collect();

        Ok(merge_activity(verification_entries, session_entries, ACTIVITY_LIMIT))
    }

    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        let top = users::top_users(&self.db, LEADERBOARD_SIZE).await?;

        Ok(top
            .into_iter()
            .enumerate()
            .map(|(i, user)| LeaderboardEntry {
                rank: i + 1,
                user_id: user.id,
                name: user.name.unwrap_or_else(|| "Anonymous".to_string()),
                school: user.school.unwrap_or_else(|| "Community Member".to_string()),
                xp: user.xp,
                parts_saved: user.parts_saved,
            })
            .collect())
    }
}
