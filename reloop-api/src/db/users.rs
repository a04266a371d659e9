//! User rows: credentials, profile and experience points

use chrono::Utc;
use reloop_common::db::{parse_uuid, UserProfile};
use reloop_common::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Leaderboard row before rank assignment
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub school: Option<String>,
    pub xp: i64,
    pub parts_saved: i64,
}

pub async fn create_user(
    pool: &SqlitePool,
    email: &str,
    password_hash: &str,
    name: Option<&str>,
    school: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, name, school, xp, created_at)
        VALUES (?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(school)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn email_exists(pool: &SqlitePool, email: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// (user id, password hash) for an email address
pub async fn find_credentials(pool: &SqlitePool, email: &str) -> Result<Option<(Uuid, String)>> {
    let row = sqlx::query("SELECT id, password_hash FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let id: String = row.get("id");
            Ok(Some((parse_uuid("id", &id)?, row.get("password_hash"))))
        }
        None => Ok(None),
    }
}

pub async fn get_profile(pool: &SqlitePool, user_id: Uuid) -> Result<Option<UserProfile>> {
    let row = sqlx::query("SELECT id, name, school, xp FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let id: String = row.get("id");
            Ok(Some(UserProfile {
                id: parse_uuid("id", &id)?,
                name: row.get("name"),
                school: row.get("school"),
                xp: row.get("xp"),
            }))
        }
        None => Ok(None),
    }
}

/// Add `delta` to a user's XP; returns the new total, `None` for unknown users
pub async fn add_xp(pool: &SqlitePool, user_id: Uuid, delta: i64) -> Result<Option<i64>> {
    let xp: Option<i64> = sqlx::query_scalar("UPDATE users SET xp = xp + ? WHERE id = ? RETURNING xp")
        .bind(delta)
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;
    Ok(xp)
}

/// Users with strictly more XP than `xp`
pub async fn count_users_above(pool: &SqlitePool, xp: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE xp > ?")
        .bind(xp)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Highest-XP users with their verified part counts
pub async fn top_users(pool: &SqlitePool, limit: i64) -> Result<Vec<RankedUser>> {
    let rows = sqlx::query(
        r#"
        SELECT u.id, u.name, u.school, u.xp,
               (SELECT COUNT(*) FROM component_verifications v
                 WHERE v.user_id = u.id AND v.status = 'verified') AS parts_saved
        FROM users u
        ORDER BY u.xp DESC, u.created_at ASC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let id: String = row.get("id");
            Ok(RankedUser {
                id: parse_uuid("id", &id)?,
                name: row.get("name"),
                school: row.get("school"),
                xp: row.get("xp"),
                parts_saved: row.get("parts_saved"),
            })
        })
        .collect()
}
