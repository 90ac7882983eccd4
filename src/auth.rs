//! Password hashing and pluggable credential verification.
//!
//! [`StoreVerifier`] checks argon2 hashes against the user store and is
//! what production runs. [`StubVerifier`] accepts exactly one hardcoded
//! credential pair and exists for development and tests only.

use std::sync::Arc;

use argon2::{
    Argon2, PasswordVerifier,
    password_hash::{PasswordHash, PasswordHasher, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    model::Grade,
    store::Store,
};

/// Session key the identity is stored under.
pub const SESSION_USER_KEY: &str = "user";

/// Identity carried by the session for the 30-day token lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub grade: Grade,
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Pluggable credential check. `Ok(None)` means invalid credentials,
/// with no distinction between unknown email and wrong password.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, email: &str, password: &str)
    -> anyhow::Result<Option<SessionUser>>;
}

/// Accepts the single fixture credential pair. Dev/test only.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubVerifier;

#[async_trait]
impl CredentialVerifier for StubVerifier {
    async fn verify(
        &self,
        email: &str,
        password: &str,
    ) -> anyhow::Result<Option<SessionUser>> {
        if email == "test@example.com" && password == "password123" {
            Ok(Some(SessionUser {
                id: "user-001".into(),
                email: "test@example.com".into(),
                name: "テストユーザー".into(),
                grade: Grade::try_from(5).expect("5 is a valid grade"),
            }))
        } else {
            Ok(None)
        }
    }
}

/// Verifies against registered users in the store.
#[derive(Clone)]
pub struct StoreVerifier {
    store: Arc<dyn Store>,
}

impl StoreVerifier {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CredentialVerifier for StoreVerifier {
    async fn verify(
        &self,
        email: &str,
        password: &str,
    ) -> anyhow::Result<Option<SessionUser>> {
        let Some(record) = self.store.user_by_email(email).await? else {
            return Ok(None);
        };
        if !verify_password(password, &record.password_hash) {
            return Ok(None);
        }
        Ok(Some(SessionUser {
            id: record.user.id,
            email: record.user.email,
            name: record.user.name,
            grade: record.user.grade,
        }))
    }
}

/// Session identity for a protected operation, 401 when absent.
pub async fn current_user(session: &Session) -> Result<SessionUser, ApiError> {
    session
        .get::<SessionUser>(SESSION_USER_KEY)
        .await?
        .ok_or_else(ApiError::unauthorized)
}
