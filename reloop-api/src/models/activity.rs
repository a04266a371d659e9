//! Profile activity feed
//!
//! Verifications and finished sessions share one feed. Each entry kind
//! carries only its own fields; entries are ordered by `at`.

use chrono::{DateTime, Utc};
use reloop_common::db::VerificationRecordStatus;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityEntry {
    Verification {
        component_name: String,
        status: VerificationRecordStatus,
        xp_awarded: i64,
        at: DateTime<Utc>,
    },
    Session {
        device_name: String,
        xp_awarded: i64,
        at: DateTime<Utc>,
    },
}

impl ActivityEntry {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            ActivityEntry::Verification { at, .. } | ActivityEntry::Session { at, .. } => *at,
        }
    }
}

/// Newest-first merge of both entry kinds, truncated to `limit`
pub fn merge_activity(
    verifications: Vec<ActivityEntry>,
    sessions: Vec<ActivityEntry>,
    limit: usize,
) -> Vec<ActivityEntry> {
    let mut feed: Vec<ActivityEntry> = verifications.into_iter().chain(sessions).collect();
    feed.sort_by(|a, b| b.at().cmp(&a.at()));
    feed.truncate(limit);
    feed
}
