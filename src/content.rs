//! Content directory loader.
//!
//! Themes and quizzes ship as JSON documents under `content/themes/`
//! (one theme per file) and `content/quizzes/` (one quiz array per
//! theme). The documents carry no timestamps; those are stamped at load
//! time. Loaded records seed the store at startup.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::{
    model::{Grade, Quiz, Subject, Theme},
    store::Store,
    utils::now,
};

#[derive(Debug, Deserialize)]
struct ThemeDoc {
    id: String,
    subject: Subject,
    grade: Grade,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    order: i64,
}

#[derive(Debug, Deserialize)]
struct QuizDoc {
    id: String,
    theme_id: String,
    question: String,
    options: Vec<String>,
    correct_answer: usize,
    order: i64,
}

#[derive(Debug, Default)]
pub struct ContentLibrary {
    pub themes: Vec<Theme>,
    pub quizzes: Vec<Quiz>,
}

fn json_files(dir: &Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading content directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

impl ContentLibrary {
    pub fn load(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let loaded_at = now();

        let mut themes = Vec::new();
        for path in json_files(&dir.join("themes"))? {
            let raw = std::fs::read_to_string(&path)?;
            let doc: ThemeDoc = serde_json::from_str(&raw)
                .with_context(|| format!("parsing theme document {}", path.display()))?;
            themes.push(Theme {
                id: doc.id,
                subject: doc.subject,
                grade: doc.grade,
                title: doc.title,
                description: doc.description,
                content: doc.content,
                video_url: doc.video_url,
                order: doc.order,
                created_at: loaded_at,
                updated_at: loaded_at,
            });
        }

        let mut quizzes = Vec::new();
        for path in json_files(&dir.join("quizzes"))? {
            let raw = std::fs::read_to_string(&path)?;
            let docs: Vec<QuizDoc> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing quiz document {}", path.display()))?;
            for doc in docs {
                anyhow::ensure!(
                    !doc.options.is_empty(),
                    "quiz {} in {} has no options",
                    doc.id,
                    path.display()
                );
                anyhow::ensure!(
                    doc.correct_answer < doc.options.len(),
                    "quiz {} in {} has correct_answer {} out of bounds for {} options",
                    doc.id,
                    path.display(),
                    doc.correct_answer,
                    doc.options.len()
                );
                anyhow::ensure!(
                    themes.iter().any(|t| t.id == doc.theme_id),
                    "quiz {} in {} references unknown theme {}",
                    doc.id,
                    path.display(),
                    doc.theme_id
                );
                quizzes.push(Quiz {
                    id: doc.id,
                    theme_id: doc.theme_id,
                    question: doc.question,
                    options: doc.options,
                    correct_answer: doc.correct_answer,
                    order: doc.order,
                    created_at: loaded_at,
                });
            }
        }

        Ok(Self { themes, quizzes })
    }

    pub async fn seed(&self, store: &dyn Store) -> anyhow::Result<()> {
        for theme in &self.themes {
            store.upsert_theme(theme.clone()).await?;
        }
        for quiz in &self.quizzes {
            store.upsert_quiz(quiz.clone()).await?;
        }
        tracing::info!(
            themes = self.themes.len(),
            quizzes = self.quizzes.len(),
            "seeded store from content directory"
        );
        Ok(())
    }
}
