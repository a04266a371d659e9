//! Session store
//!
//! Explicit context object for sign-up, sign-in and token resolution.
//! Created once at startup with [`SessionStore::initialize`] and torn down
//! with [`SessionStore::shutdown`]. Bearer tokens live in memory only; a
//! restart signs everyone out.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::users;

const TOKEN_BYTES: usize = 32;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Common(#[from] reloop_common::Error),
}

/// Signed-in actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

/// Issued bearer token with its identity
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub identity: Identity,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TokenEntry {
    identity: Identity,
    expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    db: SqlitePool,
    ttl: Duration,
    tokens: RwLock<HashMap<String, TokenEntry>>,
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_ascii_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(AuthError::InvalidInput("A valid email address is required".to_string()));
    }
    Ok(email)
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Stored password hash is unreadable");
            false
        }
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

impl SessionStore {
    pub fn initialize(db: SqlitePool, ttl_hours: u64) -> Self {
        let ttl_hours = ttl_hours.clamp(1, 24 * 365) as i64;
        tracing::info!(ttl_hours, "Session store initialized");
        Self {
            db,
            ttl: Duration::hours(ttl_hours),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Revoke every live token; returns how many were dropped
    pub async fn shutdown(&self) -> usize {
        let mut tokens = self.tokens.write().await;
        let revoked = tokens.len();
        tokens.clear();
        tracing::info!(revoked, "Session store shut down");
        revoked
    }

    async fn issue(&self, identity: Identity) -> AuthSession {
        let token = generate_token();
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, entry| entry.expires_at > now);
        tokens.insert(
            token.clone(),
            TokenEntry {
                identity: identity.clone(),
                expires_at,
            },
        );
        AuthSession {
            token,
            identity,
            expires_at,
        }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
        school: Option<&str>,
    ) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email)?;
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidInput(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if users::email_exists(&self.db, &email).await? {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(password)?;
        let name = name.map(str::trim).filter(|s| !s.is_empty());
        let school = school.map(str::trim).filter(|s| !s.is_empty());
        let user_id = match users::create_user(&self.db, &email, &password_hash, name, school).await {
            Ok(id) => id,
            // Lost a race with a concurrent sign-up for the same email
            Err(reloop_common::Error::Database(sqlx::Error::Database(e))) if e.is_unique_violation() => {
                return Err(AuthError::EmailTaken);
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = %user_id, "User signed up");
        Ok(self.issue(Identity { user_id, email }).await)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let (user_id, stored_hash) = users::find_credentials(&self.db, &email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &stored_hash) {
            tracing::warn!(user_id = %user_id, "Sign-in rejected");
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!(user_id = %user_id, "User signed in");
        Ok(self.issue(Identity { user_id, email }).await)
    }

    /// Revoke `token`; returns false if it was unknown
    pub async fn sign_out(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }

    /// Identity behind a live token; expired tokens are evicted
    pub async fn resolve(&self, token: &str) -> Option<Identity> {
        let entry = self.tokens.read().await.get(token).cloned()?;
        if entry.expires_at <= Utc::now() {
            self.tokens.write().await.remove(token);
            return None;
        }
        Some(entry.identity)
    }

    pub async fn active_sessions(&self) -> usize {
        self.tokens.read().await.len()
    }
}
