//! Storage abstraction behind the route handlers.
//!
//! [`MemoryStore`](memory::MemoryStore) is the dev/test double,
//! [`SqliteStore`](sqlite::SqliteStore) the persistent backend. Both
//! uphold the same invariants: one progress row per (user, theme) and
//! globally unique user emails.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::model::{Grade, Progress, Quiz, Subject, Theme, User};

/// Equality filter for theme listing. Validation of raw query input
/// happens in the handler; by the time a filter exists it is valid.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThemeFilter {
    pub subject: Option<Subject>,
    pub grade: Option<Grade>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub grade: Grade,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewProgress {
    pub user_id: String,
    pub theme_id: String,
    pub completed: bool,
    pub quiz_score: Option<f64>,
}

/// Merge update for an existing progress row: `quiz_score` keeps the
/// prior value when `None`, `completed_at` is only set when `completed`
/// is true, `updated_at` is always refreshed.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub user_id: String,
    pub theme_id: String,
    pub completed: bool,
    pub quiz_score: Option<f64>,
}

/// User row including the password hash. Never serialized; the public
/// projection is [`User`].
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email is already registered")]
    DuplicateEmail,
    #[error("a progress record for this (user, theme) pair already exists")]
    DuplicateProgress,
    #[error("no progress record for this (user, theme) pair")]
    ProgressNotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Themes matching `filter`, ascending by `order` (ties keep
    /// insertion order).
    async fn themes(&self, filter: ThemeFilter) -> Result<Vec<Theme>, StoreError>;

    async fn theme(&self, id: &str) -> Result<Option<Theme>, StoreError>;

    /// All quizzes of one theme, ascending by `order`.
    async fn quizzes_by_theme(&self, theme_id: &str) -> Result<Vec<Quiz>, StoreError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn progress_for_user(&self, user_id: &str) -> Result<Vec<Progress>, StoreError>;

    async fn insert_progress(&self, new: NewProgress) -> Result<Progress, StoreError>;

    async fn update_progress(&self, update: ProgressUpdate) -> Result<Progress, StoreError>;

    /// Insert or replace a theme by id. Seeding path, not exposed over
    /// the API.
    async fn upsert_theme(&self, theme: Theme) -> Result<(), StoreError>;

    /// Insert or replace a quiz by id. Seeding path.
    async fn upsert_quiz(&self, quiz: Quiz) -> Result<(), StoreError>;
}
