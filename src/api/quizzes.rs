use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{error::ApiError, model::Quiz};

use super::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct QuizQuery {
    /// Theme the quizzes belong to. Required.
    #[serde(rename = "themeId")]
    pub theme_id: Option<String>,
}

/// All quizzes of one theme, ascending by `order`. An empty result is a
/// 404, not an empty list.
#[utoipa::path(
    get,
    path = "/quizzes",
    context_path = "/api",
    params(QuizQuery),
    responses(
        (status = 200, body = [Quiz]),
        (status = 400, body = crate::error::ErrorBody),
        (status = 404, body = crate::error::ErrorBody),
    )
)]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<QuizQuery>,
) -> Result<Json<Vec<Quiz>>, ApiError> {
    let Some(theme_id) = query.theme_id else {
        return Err(ApiError::bad_request(
            "無効なリクエストです",
            "themeIdクエリパラメータが必要です",
        ));
    };
    let quizzes = state.store.quizzes_by_theme(&theme_id).await?;
    if quizzes.is_empty() {
        return Err(ApiError::not_found(
            "クイズが見つかりません",
            format!("themeId: {theme_id} のクイズは存在しません"),
        ));
    }
    Ok(Json(quizzes))
}
