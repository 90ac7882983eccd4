//! In-memory store: the dev backend and the test double.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    auth,
    model::{Grade, Progress, Quiz, Theme, User},
    utils::{fresh_id, now},
};

use super::{
    NewProgress, NewUser, ProgressUpdate, Store, StoreError, ThemeFilter, UserRecord,
};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<UserRecord>,
    themes: Vec<Theme>,
    quizzes: Vec<Quiz>,
    progress: Vec<Progress>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with the development fixtures: the stub
    /// login identity and its initial (incomplete) progress row.
    /// Themes and quizzes come from the content directory.
    pub fn seeded() -> anyhow::Result<Self> {
        let store = Self::new();
        let created_at = now();
        {
            let mut tables = store.inner.write();
            tables.users.push(UserRecord {
                user: User {
                    id: "user-001".into(),
                    email: "test@example.com".into(),
                    name: "テストユーザー".into(),
                    grade: Grade::try_from(5).expect("5 is a valid grade"),
                    created_at,
                },
                password_hash: auth::hash_password("password123")?,
            });
            tables.progress.push(Progress {
                id: "progress-001".into(),
                user_id: "user-001".into(),
                theme_id: "theme-rika-002".into(),
                completed: false,
                quiz_score: None,
                completed_at: None,
                created_at,
                updated_at: created_at,
            });
        }
        Ok(store)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn themes(&self, filter: ThemeFilter) -> Result<Vec<Theme>, StoreError> {
        let tables = self.inner.read();
        let mut themes: Vec<Theme> = tables
            .themes
            .iter()
            .filter(|t| filter.subject.is_none_or(|s| t.subject == s))
            .filter(|t| filter.grade.is_none_or(|g| t.grade == g))
            .cloned()
            .collect();
        // stable: ties keep insertion order
        themes.sort_by_key(|t| t.order);
        Ok(themes)
    }

    async fn theme(&self, id: &str) -> Result<Option<Theme>, StoreError> {
        let tables = self.inner.read();
        Ok(tables.themes.iter().find(|t| t.id == id).cloned())
    }

    async fn quizzes_by_theme(&self, theme_id: &str) -> Result<Vec<Quiz>, StoreError> {
        let tables = self.inner.read();
        let mut quizzes: Vec<Quiz> = tables
            .quizzes
            .iter()
            .filter(|q| q.theme_id == theme_id)
            .cloned()
            .collect();
        quizzes.sort_by_key(|q| q.order);
        Ok(quizzes)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.inner.read();
        Ok(tables.users.iter().find(|u| u.user.email == email).cloned())
    }

    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut tables = self.inner.write();
        if tables.users.iter().any(|u| u.user.email == new.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: fresh_id("user"),
            email: new.email,
            name: new.name,
            grade: new.grade,
            created_at: now(),
        };
        tables.users.push(UserRecord {
            user: user.clone(),
            password_hash: new.password_hash,
        });
        Ok(user)
    }

    async fn progress_for_user(&self, user_id: &str) -> Result<Vec<Progress>, StoreError> {
        let tables = self.inner.read();
        Ok(tables
            .progress
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_progress(&self, new: NewProgress) -> Result<Progress, StoreError> {
        let mut tables = self.inner.write();
        if tables
            .progress
            .iter()
            .any(|p| p.user_id == new.user_id && p.theme_id == new.theme_id)
        {
            return Err(StoreError::DuplicateProgress);
        }
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
        tables.progress.push(progress.clone());
        Ok(progress)
    }

    async fn update_progress(&self, update: ProgressUpdate) -> Result<Progress, StoreError> {
        let mut tables = self.inner.write();
        let row = tables
            .progress
            .iter_mut()
            .find(|p| p.user_id == update.user_id && p.theme_id == update.theme_id)
            .ok_or(StoreError::ProgressNotFound)?;
        let updated_at = now();
        row.completed = update.completed;
        if let Some(score) = update.quiz_score {
            row.quiz_score = Some(score);
        }
        if update.completed {
            row.completed_at = Some(updated_at);
        }
        row.updated_at = updated_at;
        Ok(row.clone())
    }

    async fn upsert_theme(&self, theme: Theme) -> Result<(), StoreError> {
        let mut tables = self.inner.write();
        if let Some(existing) = tables.themes.iter_mut().find(|t| t.id == theme.id) {
            *existing = theme;
        } else {
            tables.themes.push(theme);
        }
        Ok(())
    }

    async fn upsert_quiz(&self, quiz: Quiz) -> Result<(), StoreError> {
        let mut tables = self.inner.write();
        if let Some(existing) = tables.quizzes.iter_mut().find(|q| q.id == quiz.id) {
            *existing = quiz;
        } else {
            tables.quizzes.push(quiz);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Subject;

    fn theme(id: &str, subject: Subject, grade: u8, order: i64) -> Theme {
        let at = now();
        Theme {
            id: id.into(),
            subject,
            grade: Grade::try_from(grade).unwrap(),
            title: format!("テーマ {id}"),
            description: None,
            content: None,
            video_url: None,
            order,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn themes_sorted_by_order_with_stable_ties() {
        let store = MemoryStore::new();
        store
            .upsert_theme(theme("a", Subject::Sansu, 4, 2))
            .await
            .unwrap();
        store
            .upsert_theme(theme("b", Subject::Sansu, 4, 1))
            .await
            .unwrap();
        store
            .upsert_theme(theme("c", Subject::Sansu, 4, 1))
            .await
            .unwrap();
        let themes = store.themes(ThemeFilter::default()).await.unwrap();
        let ids: Vec<&str> = themes.iter().map(|t| t.id.as_str()).collect();
        // b and c tie on order and keep insertion order
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[tokio::test]
    async fn theme_filter_is_equality() {
        let store = MemoryStore::new();
        store
            .upsert_theme(theme("a", Subject::Sansu, 4, 1))
            .await
            .unwrap();
        store
            .upsert_theme(theme("b", Subject::Rika, 4, 1))
            .await
            .unwrap();
        store
            .upsert_theme(theme("c", Subject::Sansu, 5, 1))
            .await
            .unwrap();
        let themes = store
            .themes(ThemeFilter {
                subject: Some(Subject::Sansu),
                grade: Some(Grade::try_from(4).unwrap()),
            })
            .await
            .unwrap();
        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0].id, "a");
    }

    #[tokio::test]
    async fn duplicate_progress_is_rejected() {
        let store = MemoryStore::new();
        let new = NewProgress {
            user_id: "u".into(),
            theme_id: "t".into(),
            completed: true,
            quiz_score: Some(80.0),
        };
        let first = store.insert_progress(new.clone()).await.unwrap();
        assert!(first.completed_at.is_some());
        let second = store.insert_progress(new).await;
        assert!(matches!(second, Err(StoreError::DuplicateProgress)));
    }

    #[tokio::test]
    async fn update_without_insert_is_missing() {
        let store = MemoryStore::new();
        let result = store
            .update_progress(ProgressUpdate {
                user_id: "u".into(),
                theme_id: "t".into(),
                completed: true,
                quiz_score: None,
            })
            .await;
        assert!(matches!(result, Err(StoreError::ProgressNotFound)));
    }

    #[tokio::test]
    async fn update_merges_prior_values() {
        let store = MemoryStore::new();
        store
            .insert_progress(NewProgress {
                user_id: "u".into(),
                theme_id: "t".into(),
                completed: false,
                quiz_score: Some(40.0),
            })
            .await
            .unwrap();
        // score omitted: prior value kept; not completed: completed_at stays unset
        let updated = store
            .update_progress(ProgressUpdate {
                user_id: "u".into(),
                theme_id: "t".into(),
                completed: false,
                quiz_score: None,
            })
            .await
            .unwrap();
        assert_eq!(updated.quiz_score, Some(40.0));
        assert!(updated.completed_at.is_none());
        let completed = store
            .update_progress(ProgressUpdate {
                user_id: "u".into(),
                theme_id: "t".into(),
                completed: true,
                quiz_score: Some(90.0),
            })
            .await
            .unwrap();
        assert_eq!(completed.quiz_score, Some(90.0));
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_without_mutation() {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                email: "a@example.com".into(),
                name: "A".into(),
                grade: Grade::try_from(4).unwrap(),
                password_hash: "hash-a".into(),
            })
            .await
            .unwrap();
        let result = store
            .create_user(NewUser {
                email: "a@example.com".into(),
                name: "B".into(),
                grade: Grade::try_from(5).unwrap(),
                password_hash: "hash-b".into(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail)));
        let record = store.user_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(record.user.id, user.id);
        assert_eq!(record.user.name, "A");
        assert_eq!(record.password_hash, "hash-a");
    }
}
