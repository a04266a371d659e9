//! Database initialization
//!
//! Creates `reloop.db` on first run and ensures every table exists.
//! Table creation is idempotent, so this runs on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (or create) the database file and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows readers while a verification upsert is in flight
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Every pooled connection to `sqlite::memory:` would open its own empty
/// database, so the pool is pinned to one connection.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all ReLoop tables if they do not already exist
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_users_table(pool).await?;
    create_devices_table(pool).await?;
    create_device_components_table(pool).await?;
    create_teardown_steps_table(pool).await?;
    create_teardown_sessions_table(pool).await?;
    create_component_verifications_table(pool).await?;

    info!("Database schema ready");
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            name TEXT,
            school TEXT,
            xp INTEGER NOT NULL DEFAULT 0 CHECK (xp >= 0),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_xp ON users(xp DESC)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_devices_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT,
            image_url TEXT,
            total_value REAL NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_device_components_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_components (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            value REAL NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_device_components_device ON device_components(device_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_teardown_steps_table(pool: &SqlitePool) -> Result<()> {
    // instructions, ppe_required and safety_warnings hold JSON string arrays;
    // educational_context holds a JSON object
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teardown_steps (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
            step_number INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            image_url TEXT,
            instructions TEXT,
            hazard_level TEXT NOT NULL DEFAULT 'low',
            has_safety_gate INTEGER NOT NULL DEFAULT 0,
            power_off_required INTEGER NOT NULL DEFAULT 0,
            ppe_required TEXT,
            safety_warnings TEXT,
            educational_context TEXT,
            UNIQUE (device_id, step_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_teardown_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teardown_sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            device_id TEXT NOT NULL REFERENCES devices(id),
            status TEXT NOT NULL DEFAULT 'in_progress',
            started_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_teardown_sessions_user ON teardown_sessions(user_id, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_component_verifications_table(pool: &SqlitePool) -> Result<()> {
    // One row per (user, component): later attempts overwrite earlier ones
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS component_verifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            component_id TEXT NOT NULL REFERENCES device_components(id),
            teardown_session_id TEXT REFERENCES teardown_sessions(id),
            status TEXT NOT NULL DEFAULT 'pending',
            xp_awarded INTEGER NOT NULL DEFAULT 0,
            image_url TEXT,
            verified_at TEXT,
            manual_verified INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE (user_id, component_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
