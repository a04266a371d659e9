//! Teardown session rows

use chrono::{DateTime, Utc};
use reloop_common::db::{parse_timestamp, parse_uuid, SessionStatus, TeardownSession};
use reloop_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub async fn insert_session(
    pool: &SqlitePool,
    session_id: Uuid,
    user_id: Uuid,
    device_id: Uuid,
    started_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO teardown_sessions (id, user_id, device_id, status, started_at, completed_at)
        VALUES (?, ?, ?, ?, ?, NULL)
        "#,
    )
    .bind(session_id.to_string())
    .bind(user_id.to_string())
    .bind(device_id.to_string())
    .bind(SessionStatus::InProgress.as_str())
    .bind(started_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<TeardownSession>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, device_id, status, started_at, completed_at
        FROM teardown_sessions
        WHERE id = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    let device_id: String = row.get("device_id");
    let status: String = row.get("status");
    let started_at: String = row.get("started_at");
    let completed_at: Option<String> = row.get("completed_at");

    Ok(Some(TeardownSession {
        id: parse_uuid("id", &id)?,
        user_id: parse_uuid("user_id", &user_id)?,
        device_id: parse_uuid("device_id", &device_id)?,
        status: status.parse()?,
        started_at: parse_timestamp("started_at", &started_at)?,
        completed_at: completed_at
            .map(|s| parse_timestamp("completed_at", &s))
            .transpose()?,
    }))
}

/// Flip an in-progress session to completed
///
/// Returns false when the row was missing or already completed.
pub async fn mark_completed(
    pool: &SqlitePool,
    session_id: Uuid,
    completed_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE teardown_sessions
        SET status = ?, completed_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(SessionStatus::Completed.as_str())
    .bind(completed_at.to_rfc3339())
    .bind(session_id.to_string())
    .bind(SessionStatus::InProgress.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn count_completed(pool: &SqlitePool, user_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM teardown_sessions WHERE user_id = ? AND status = 'completed'",
    )
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Components belonging to devices of the user's completed sessions
///
/// Counted once per completed session, so two finished teardowns of the
/// same model count its parts twice.
pub async fn completed_parts_count(pool: &SqlitePool, user_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM teardown_sessions s
        JOIN device_components c ON c.device_id = s.device_id
        WHERE s.user_id = ? AND s.status = 'completed'
        "#,
    )
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// (device name, completed_at) of the most recent completed sessions
pub async fn recent_completed(
    pool: &SqlitePool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<(String, DateTime<Utc>)>> {
    let rows = sqlx::query(
        r#"
        SELECT d.name AS device_name, s.completed_at
        FROM teardown_sessions s
        JOIN devices d ON d.id = s.device_id
        WHERE s.user_id = ? AND s.status = 'completed' AND s.completed_at IS NOT NULL
        ORDER BY s.completed_at DESC
        LIMIT ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let completed_at: String = row.get("completed_at");
            Ok((
                row.get("device_name"),
                parse_timestamp("completed_at", &completed_at)?,
            ))
        })
        .collect()
}
