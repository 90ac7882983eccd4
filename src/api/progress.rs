use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::Value;
use tower_sessions::Session;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::current_user,
    error::ApiError,
    model::Progress,
    store::{NewProgress, ProgressUpdate},
};

use super::{AppState, JsonBody};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProgressQuery {
    /// Owner of the requested records. Defaults to the session's user;
    /// any other value is rejected.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Request body of both the create and the update call.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)] // schema documentation only; validation is manual
pub struct ProgressRequest {
    pub theme_id: String,
    pub completed: bool,
    pub quiz_score: Option<f64>,
}

struct ValidatedProgress {
    theme_id: String,
    completed: bool,
    quiz_score: Option<f64>,
}

/// Field-by-field validation so malformed input yields the documented
/// 400 messages instead of a generic deserialization error.
fn validate_body(body: &Value) -> Result<ValidatedProgress, ApiError> {
    let theme_id = match body.get("themeId").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_owned(),
        _ => {
            return Err(ApiError::bad_request(
                "無効なリクエストです",
                "themeIdが必要です",
            ));
        }
    };
    let completed = body.get("completed").and_then(Value::as_bool).ok_or_else(|| {
        ApiError::bad_request(
            "無効なリクエストです",
            "completedはbooleanである必要があります",
        )
    })?;
    let quiz_score = match body.get("quizScore") {
        None => None,
        Some(value) => {
            let score = value.as_f64().filter(|s| (0.0..=100.0).contains(s));
            Some(score.ok_or_else(|| {
                ApiError::bad_request(
                    "無効なリクエストです",
                    "quizScoreは0-100の数値である必要があります",
                )
            })?)
        }
    };
    Ok(ValidatedProgress {
        theme_id,
        completed,
        quiz_score,
    })
}

/// Progress records of the session's user. Reading another user's
/// records is forbidden whether or not that user exists.
#[utoipa::path(
    get,
    path = "/progress",
    context_path = "/api",
    params(ProgressQuery),
    responses(
        (status = 200, body = [Progress]),
        (status = 401, body = crate::error::ErrorBody),
        (status = 403, body = crate::error::ErrorBody),
    )
)]
pub async fn list(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ProgressQuery>,
) -> Result<Json<Vec<Progress>>, ApiError> {
    let user = current_user(&session).await?;
    // an empty userId counts as absent, like the omitted parameter
    if let Some(requested) = &query.user_id
        && !requested.is_empty()
        && requested != &user.id
    {
        return Err(ApiError::forbidden(
            "権限がありません",
            "自分の進捗のみ取得できます",
        ));
    }
    let progress = state.store.progress_for_user(&user.id).await?;
    Ok(Json(progress))
}

/// First submission for a theme. A second create on the same pair is a
/// conflict; callers must switch to the update call.
#[utoipa::path(
    post,
    path = "/progress",
    context_path = "/api",
    request_body = ProgressRequest,
    responses(
        (status = 201, body = Progress),
        (status = 400, body = crate::error::ErrorBody),
        (status = 401, body = crate::error::ErrorBody),
        (status = 409, body = crate::error::ErrorBody),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    JsonBody(body): JsonBody<Value>,
) -> Result<(StatusCode, Json<Progress>), ApiError> {
    let user = current_user(&session).await?;
    let valid = validate_body(&body)?;
    let progress = state
        .store
        .insert_progress(NewProgress {
            user_id: user.id,
            theme_id: valid.theme_id,
            completed: valid.completed,
            quiz_score: valid.quiz_score,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(progress)))
}

/// Re-submission: merges into the existing row. `quizScore` keeps the
/// prior value when omitted; `completed_at` is only stamped when
/// `completed` is true.
#[utoipa::path(
    put,
    path = "/progress",
    context_path = "/api",
    request_body = ProgressRequest,
    responses(
        (status = 200, body = Progress),
        (status = 400, body = crate::error::ErrorBody),
        (status = 401, body = crate::error::ErrorBody),
        (status = 404, body = crate::error::ErrorBody),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<Progress>, ApiError> {
    let user = current_user(&session).await?;
    let valid = validate_body(&body)?;
    let progress = state
        .store
        .update_progress(ProgressUpdate {
            user_id: user.id,
            theme_id: valid.theme_id,
            completed: valid.completed,
            quiz_score: valid.quiz_score,
        })
        .await?;
    Ok(Json(progress))
}
