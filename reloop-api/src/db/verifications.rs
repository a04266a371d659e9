//! Component verification rows
//!
//! At most one row per (user, component). Later attempts overwrite the
//! earlier row in place.

use chrono::{DateTime, Utc};
use reloop_common::db::{parse_timestamp, parse_uuid, ComponentVerification, VerificationRecordStatus};
use reloop_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Verified part as fed to the waste estimate
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPart {
    pub name: String,
    pub kind: String,
    pub device_name: String,
}

/// Insert or overwrite the (user, component) row
pub async fn upsert_verification(pool: &SqlitePool, record: &ComponentVerification) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO component_verifications (
            id, user_id, component_id, teardown_session_id, status, xp_awarded,
            image_url, verified_at, manual_verified, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, component_id) DO UPDATE SET
            teardown_session_id = excluded.teardown_session_id,
            status = excluded.status,
            xp_awarded = excluded.xp_awarded,
            image_url = excluded.image_url,
            verified_at = excluded.verified_at,
            manual_verified = excluded.manual_verified,
            created_at = excluded.created_at
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.user_id.to_string())
    .bind(record.component_id.to_string())
    .bind(record.teardown_session_id.map(|id| id.to_string()))
    .bind(record.status.as_str())
    .bind(record.xp_awarded)
    .bind(&record.image_url)
    .bind(record.verified_at.map(|t| t.to_rfc3339()))
    .bind(record.manual_verified as i64)
    .bind(record.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_verification(
    pool: &SqlitePool,
    user_id: Uuid,
    component_id: Uuid,
) -> Result<Option<ComponentVerification>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, component_id, teardown_session_id, status, xp_awarded,
               image_url, verified_at, manual_verified, created_at
        FROM component_verifications
        WHERE user_id = ? AND component_id = ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(component_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let id: String = row.get("id");
    let user: String = row.get("user_id");
    let component: String = row.get("component_id");
    let session: Option<String> = row.get("teardown_session_id");
    let status: String = row.get("status");
    let verified_at: Option<String> = row.get("verified_at");
    let created_at: String = row.get("created_at");

    Ok(Some(ComponentVerification {
        id: parse_uuid("id", &id)?,
        user_id: parse_uuid("user_id", &user)?,
        component_id: parse_uuid("component_id", &component)?,
        teardown_session_id: session
            .map(|s| parse_uuid("teardown_session_id", &s))
            .transpose()?,
        status: status.parse()?,
        xp_awarded: row.get("xp_awarded"),
        image_url: row.get("image_url"),
        verified_at: verified_at
            .map(|s| parse_timestamp("verified_at", &s))
            .transpose()?,
        manual_verified: row.get::<i64, _>("manual_verified") != 0,
        created_at: parse_timestamp("created_at", &created_at)?,
    }))
}

pub async fn count_by_status(
    pool: &SqlitePool,
    user_id: Uuid,
    status: VerificationRecordStatus,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM component_verifications WHERE user_id = ? AND status = ?",
    )
    .bind(user_id.to_string())
    .bind(status.as_str())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Latest rows joined with the component name: (name, status, xp, created_at)
pub async fn recent_with_component(
    pool: &SqlitePool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<(String, VerificationRecordStatus, i64, DateTime<Utc>)>> {
    let rows = sqlx::query(
        r#"
        SELECT c.name AS component_name, v.status, v.xp_awarded, v.created_at
        FROM component_verifications v
        JOIN device_components c ON c.id = v.component_id
        WHERE v.user_id = ?
        ORDER BY v.created_at DESC
        LIMIT ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let status: String = row.get("status");
            let created_at: String = row.get("created_at");
            Ok((
                row.get("component_name"),
                status.parse()?,
                row.get("xp_awarded"),
                parse_timestamp("created_at", &created_at)?,
            ))
        })
        .collect()
}

/// Verified parts with their device names
pub async fn verified_parts_context(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<VerifiedPart>> {
    let rows = sqlx::query(
        r#"
        SELECT c.name, c.type, d.name AS device_name
        FROM component_verifications v
        JOIN device_components c ON c.id = v.component_id
        JOIN devices d ON d.id = c.device_id
        WHERE v.user_id = ? AND v.status = 'verified'
        ORDER BY v.created_at ASC
        "#,
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| VerifiedPart {
            name: row.get("name"),
            kind: row.get("type"),
            device_name: row.get("device_name"),
        })
        .collect())
}
