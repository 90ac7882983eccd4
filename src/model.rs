use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// The four fixed school subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Kokugo,
    Sansu,
    Rika,
    Shakai,
}

impl Subject {
    pub const ALL: [Subject; 4] = [
        Subject::Kokugo,
        Subject::Sansu,
        Subject::Rika,
        Subject::Shakai,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kokugo" => Some(Subject::Kokugo),
            "sansu" => Some(Subject::Sansu),
            "rika" => Some(Subject::Rika),
            "shakai" => Some(Subject::Shakai),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Kokugo => "kokugo",
            Subject::Sansu => "sansu",
            Subject::Rika => "rika",
            Subject::Shakai => "shakai",
        }
    }

    /// Display name used on the rendered pages.
    pub fn label(self) -> &'static str {
        match self {
            Subject::Kokugo => "国語",
            Subject::Sansu => "算数",
            Subject::Rika => "理科",
            Subject::Shakai => "社会",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// School grade, limited to 4-6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "u8", into = "u8")]
pub struct Grade(u8);

impl Grade {
    pub const ALL: [Grade; 3] = [Grade(4), Grade(5), Grade(6)];

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Grade {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4..=6 => Ok(Grade(value)),
            other => Err(format!("grade must be 4, 5 or 6, got {other}")),
        }
    }
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> u8 {
        grade.0
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public user projection. The password hash lives only in the store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub grade: Grade,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A topical learning unit. `content` is markdown, rendered on the
/// theme detail page.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Theme {
    pub id: String,
    pub subject: Subject,
    pub grade: Grade,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub order: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A single-choice question bound to one theme. `correct_answer`
/// indexes into `options`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Quiz {
    pub id: String,
    pub theme_id: String,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    pub order: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Completion/score record, unique per (user, theme). Created by the
/// first quiz submission and mutated in place afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Progress {
    pub id: String,
    pub user_id: String,
    pub theme_id: String,
    pub completed: bool,
    pub quiz_score: Option<f64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
