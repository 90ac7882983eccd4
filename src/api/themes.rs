use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::ApiError,
    model::{Grade, Subject, Theme},
    store::ThemeFilter,
};

use super::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ThemeQuery {
    /// Subject filter: kokugo | sansu | rika | shakai.
    pub subject: Option<String>,
    /// Grade filter: 4 | 5 | 6.
    pub grade: Option<String>,
}

pub fn parse_filter(query: &ThemeQuery) -> Result<ThemeFilter, ApiError> {
    let subject = query
        .subject
        .as_deref()
        .map(|raw| {
            Subject::parse(raw).ok_or_else(|| {
                ApiError::bad_request(
                    "無効な科目です",
                    "subjectは kokugo, sansu, rika, shakai のいずれかである必要があります",
                )
            })
        })
        .transpose()?;
    let grade = query
        .grade
        .as_deref()
        .map(|raw| {
            raw.parse::<u8>()
                .ok()
                .and_then(|n| Grade::try_from(n).ok())
                .ok_or_else(|| {
                    ApiError::bad_request(
                        "無効な学年です",
                        "gradeは 4, 5, 6 のいずれかである必要があります",
                    )
                })
        })
        .transpose()?;
    Ok(ThemeFilter { subject, grade })
}

/// List themes, optionally filtered by subject and grade, ascending by
/// `order`.
#[utoipa::path(
    get,
    path = "/themes",
    context_path = "/api",
    params(ThemeQuery),
    responses(
        (status = 200, body = [Theme]),
        (status = 400, body = crate::error::ErrorBody),
    )
)]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ThemeQuery>,
) -> Result<Json<Vec<Theme>>, ApiError> {
    let filter = parse_filter(&query)?;
    let themes = state.store.themes(filter).await?;
    Ok(Json(themes))
}

/// Theme detail by id.
#[utoipa::path(
    get,
    path = "/themes/{id}",
    context_path = "/api",
    responses(
        (status = 200, body = Theme),
        (status = 404, body = crate::error::ErrorBody),
    )
)]
pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Theme>, ApiError> {
    let theme = state.store.theme(&id).await?.ok_or_else(|| {
        ApiError::not_found(
            "テーマが見つかりません",
            format!("ID: {id} のテーマは存在しません"),
        )
    })?;
    Ok(Json(theme))
}
