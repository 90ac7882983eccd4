use std::sync::LazyLock;

use axum::{Json, extract::State, http::StatusCode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::{
    auth::{self, SESSION_USER_KEY, SessionUser, current_user},
    error::ApiError,
    model::{Grade, User},
    store::NewUser,
};

use super::{AppState, JsonBody};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

/// Request body of the register call.
#[derive(Debug, Deserialize, ToSchema)]
#[allow(dead_code)] // schema documentation only; validation is manual
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub grade: u8,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub user: User,
    pub message: String,
}

struct ValidatedRegistration {
    email: String,
    password: String,
    name: String,
    grade: Grade,
}

fn validate_registration(body: &Value) -> Result<ValidatedRegistration, ApiError> {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    let password = body
        .get("password")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let name = body.get("name").and_then(Value::as_str).unwrap_or_default();
    let grade = body.get("grade");
    if email.is_empty() || password.is_empty() || name.is_empty() || grade.is_none() {
        return Err(ApiError::bad_request(
            "無効なリクエストです",
            "email, password, name, gradeはすべて必須です",
        ));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(ApiError::bad_request(
            "無効なメールアドレスです",
            "正しいメールアドレスを入力してください",
        ));
    }
    if password.chars().count() < 8 {
        return Err(ApiError::bad_request(
            "パスワードが短すぎます",
            "パスワードは8文字以上である必要があります",
        ));
    }
    let grade = grade
        .and_then(Value::as_u64)
        .and_then(|n| u8::try_from(n).ok())
        .and_then(|n| Grade::try_from(n).ok())
        .ok_or_else(|| {
            ApiError::bad_request(
                "無効な学年です",
                "gradeは 4, 5, 6 のいずれかである必要があります",
            )
        })?;
    Ok(ValidatedRegistration {
        email: email.to_owned(),
        password: password.to_owned(),
        name: name.to_owned(),
        grade,
    })
}

/// Create a user. The password is argon2-hashed before storage and
/// never appears in the response.
#[utoipa::path(
    post,
    path = "/auth/register",
    context_path = "/api",
    request_body = RegisterRequest,
    responses(
        (status = 201, body = RegisterResponse),
        (status = 400, body = crate::error::ErrorBody),
        (status = 409, body = crate::error::ErrorBody),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let valid = validate_registration(&body)?;
    let password_hash = auth::hash_password(&valid.password)?;
    let user = state
        .store
        .create_user(NewUser {
            email: valid.email,
            name: valid.name,
            grade: valid.grade,
            password_hash,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user,
            message: "ユーザー登録が完了しました".into(),
        }),
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub user: SessionUser,
    pub message: String,
}

/// Start a session. Any failure is the same generic 401.
#[utoipa::path(
    post,
    path = "/auth/login",
    context_path = "/api",
    request_body = LoginRequest,
    responses(
        (status = 200, body = LoginResponse),
        (status = 401, body = crate::error::ErrorBody),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .verifier
        .verify(&request.email, &request.password)
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;
    session.insert(SESSION_USER_KEY, user.clone()).await?;
    Ok(Json(LoginResponse {
        user,
        message: "ログインしました".into(),
    }))
}

/// End the session.
#[utoipa::path(
    post,
    path = "/auth/logout",
    context_path = "/api",
    responses((status = 200))
)]
pub async fn logout(session: Session) -> Result<Json<Value>, ApiError> {
    session.flush().await?;
    Ok(Json(serde_json::json!({ "message": "ログアウトしました" })))
}

/// Identity of the current session.
#[utoipa::path(
    get,
    path = "/auth/me",
    context_path = "/api",
    responses(
        (status = 200, body = SessionUser),
        (status = 401, body = crate::error::ErrorBody),
    )
)]
pub async fn me(session: Session) -> Result<Json<SessionUser>, ApiError> {
    let user = current_user(&session).await?;
    Ok(Json(user))
}
