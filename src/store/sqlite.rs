//! Persistent store on sqlite. Unique indexes carry the invariants:
//! `user.email` and `progress (user_id, theme_id)`, so concurrent
//! submissions cannot create a second row for the same pair.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use time::OffsetDateTime;

use crate::{
    model::{Grade, Progress, Quiz, Subject, Theme, User},
    utils::{fresh_id, now},
};

use super::{
    NewProgress, NewUser, ProgressUpdate, Store, StoreError, ThemeFilter, UserRecord,
};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Fresh in-memory database, for tests. A single connection keeps
    /// the database alive for the pool's lifetime.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(anyhow::Error::new(err))
}

#[derive(sqlx::FromRow)]
struct ThemeRow {
    id: String,
    subject: String,
    grade: i64,
    title: String,
    description: Option<String>,
    content: Option<String>,
    video_url: Option<String>,
    sort_order: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ThemeRow> for Theme {
    type Error = anyhow::Error;

    fn try_from(row: ThemeRow) -> anyhow::Result<Theme> {
        let subject = Subject::parse(&row.subject)
            .ok_or_else(|| anyhow::anyhow!("unknown subject in database: {}", row.subject))?;
        let grade = Grade::try_from(u8::try_from(row.grade)?).map_err(anyhow::Error::msg)?;
        Ok(Theme {
            id: row.id,
            subject,
            grade,
            title: row.title,
            description: row.description,
            content: row.content,
            video_url: row.video_url,
            order: row.sort_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct QuizRow {
    id: String,
    theme_id: String,
    question: String,
    options: String,
    correct_answer: i64,
    sort_order: i64,
    created_at: OffsetDateTime,
}

impl TryFrom<QuizRow> for Quiz {
    type Error = anyhow::Error;

    fn try_from(row: QuizRow) -> anyhow::Result<Quiz> {
        let options: Vec<String> = serde_json::from_str(&row.options)?;
        let correct_answer = usize::try_from(row.correct_answer)?;
        // rows edited outside the loader still have to index options
        anyhow::ensure!(
            correct_answer < options.len(),
            "quiz {} has correct_answer {} out of bounds for {} options",
            row.id,
            correct_answer,
            options.len()
        );
        Ok(Quiz {
            id: row.id,
            theme_id: row.theme_id,
            question: row.question,
            options,
            correct_answer,
            order: row.sort_order,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: String,
    grade: i64,
    password: String,
    created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> anyhow::Result<UserRecord> {
        let grade = Grade::try_from(u8::try_from(row.grade)?).map_err(anyhow::Error::msg)?;
        Ok(UserRecord {
            user: User {
                id: row.id,
                email: row.email,
                name: row.name,
                grade,
                created_at: row.created_at,
            },
            password_hash: row.password,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    id: String,
    user_id: String,
    theme_id: String,
    completed: bool,
    quiz_score: Option<f64>,
    completed_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ProgressRow> for Progress {
    fn from(row: ProgressRow) -> Progress {
        Progress {
            id: row.id,
            user_id: row.user_id,
            theme_id: row.theme_id,
            completed: row.completed,
            quiz_score: row.quiz_score,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const THEME_COLUMNS: &str = "id, subject, grade, title, description, content, video_url, \
     sort_order, created_at, updated_at";

#[async_trait]
impl Store for SqliteStore {
    async fn themes(&self, filter: ThemeFilter) -> Result<Vec<Theme>, StoreError> {
        // rowid breaks order ties by insertion order, matching the
        // stable sort of the in-memory store
        let sql = format!(
            "SELECT {THEME_COLUMNS} FROM theme \
             WHERE (?1 IS NULL OR subject = ?1) AND (?2 IS NULL OR grade = ?2) \
             ORDER BY sort_order ASC, rowid ASC"
        );
        let rows: Vec<ThemeRow> = sqlx::query_as(&sql)
            .bind(filter.subject.map(|s| s.as_str()))
            .bind(filter.grade.map(|g| i64::from(g.get())))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter()
            .map(|row| row.try_into().map_err(StoreError::Backend))
            .collect()
    }

    async fn theme(&self, id: &str) -> Result<Option<Theme>, StoreError> {
        let sql = format!("SELECT {THEME_COLUMNS} FROM theme WHERE id = ?");
        let row: Option<ThemeRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|row| row.try_into().map_err(StoreError::Backend))
            .transpose()
    }

    async fn quizzes_by_theme(&self, theme_id: &str) -> Result<Vec<Quiz>, StoreError> {
        let rows: Vec<QuizRow> = sqlx::query_as(
            "SELECT id, theme_id, question, options, correct_answer, sort_order, created_at \
             FROM quiz WHERE theme_id = ? ORDER BY sort_order ASC, rowid ASC",
        )
        .bind(theme_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter()
            .map(|row| row.try_into().map_err(StoreError::Backend))
            .collect()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, grade, password, created_at FROM user WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(|row| row.try_into().map_err(StoreError::Backend))
            .transpose()
    }

    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let user = User {
            id: fresh_id("user"),
            email: new.email,
            name: new.name,
            grade: new.grade,
            created_at: now(),
        };
        let result = sqlx::query(
            "INSERT INTO user (id, email, name, grade, password, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(i64::from(user.grade.get()))
        .bind(&new.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(user),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateEmail),
            Err(e) => Err(backend(e)),
        }
    }

    async fn progress_for_user(&self, user_id: &str) -> Result<Vec<Progress>, StoreError> {
        let rows: Vec<ProgressRow> = sqlx::query_as(
            "SELECT id, user_id, theme_id, completed, quiz_score, completed_at, \
             created_at, updated_at FROM progress WHERE user_id = ? ORDER BY rowid ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(Progress::from).collect())
    }

    async fn insert_progress(&self, new: NewProgress) -> Result<Progress, StoreError> {
        let created_at = now();
        let progress = Progress {
            id: fresh_id("progress"),
            user_id: new.user_id,
            theme_id: new.theme_id,
            completed: new.completed,
            quiz_score: new.quiz_score,
            completed_at: new.completed.then_some(created_at),
            created_at,
            updated_at: created_at,
        };
        let result = sqlx::query(
            "INSERT INTO progress (id, user_id, theme_id, completed, quiz_score, \
             completed_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&progress.id)
        .bind(&progress.user_id)
        .bind(&progress.theme_id)
        .bind(progress.completed)
        .bind(progress.quiz_score)
        .bind(progress.completed_at)
        .bind(progress.created_at)
        .bind(progress.updated_at)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(progress),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateProgress),
            Err(e) => Err(backend(e)),
        }
    }

    async fn update_progress(&self, update: ProgressUpdate) -> Result<Progress, StoreError> {
        let updated_at = now();
        let result = sqlx::query(
            "UPDATE progress SET completed = ?1, \
             quiz_score = COALESCE(?2, quiz_score), \
             completed_at = CASE WHEN ?1 THEN ?3 ELSE completed_at END, \
             updated_at = ?3 \
             WHERE user_id = ?4 AND theme_id = ?5",
        )
        .bind(update.completed)
        .bind(update.quiz_score)
        .bind(updated_at)
        .bind(&update.user_id)
        .bind(&update.theme_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ProgressNotFound);
        }
        let row: ProgressRow = sqlx::query_as(
            "SELECT id, user_id, theme_id, completed, quiz_score, completed_at, \
             created_at, updated_at FROM progress WHERE user_id = ? AND theme_id = ?",
        )
        .bind(&update.user_id)
        .bind(&update.theme_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.into())
    }

    async fn upsert_theme(&self, theme: Theme) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO theme (id, subject, grade, title, description, content, video_url, \
             sort_order, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET subject = excluded.subject, \
             grade = excluded.grade, title = excluded.title, \
             description = excluded.description, content = excluded.content, \
             video_url = excluded.video_url, sort_order = excluded.sort_order, \
             updated_at = excluded.updated_at",
        )
        .bind(&theme.id)
        .bind(theme.subject.as_str())
        .bind(i64::from(theme.grade.get()))
        .bind(&theme.title)
        .bind(&theme.description)
        .bind(&theme.content)
        .bind(&theme.video_url)
        .bind(theme.order)
        .bind(theme.created_at)
        .bind(theme.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn upsert_quiz(&self, quiz: Quiz) -> Result<(), StoreError> {
        let options = serde_json::to_string(&quiz.options)
            .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?;
        sqlx::query(
            "INSERT INTO quiz (id, theme_id, question, options, correct_answer, \
             sort_order, created_at) VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET theme_id = excluded.theme_id, \
             question = excluded.question, options = excluded.options, \
             correct_answer = excluded.correct_answer, sort_order = excluded.sort_order",
        )
        .bind(&quiz.id)
        .bind(&quiz.theme_id)
        .bind(&quiz.question)
        .bind(options)
        .bind(i64::try_from(quiz.correct_answer).map_err(|e| StoreError::Backend(e.into()))?)
        .bind(quiz.order)
        .bind(quiz.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}
