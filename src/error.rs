use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::store::StoreError;

/// Wire shape of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{error}: {message}")]
    BadRequest { error: String, message: String },
    #[error("{error}: {message}")]
    Unauthorized { error: String, message: String },
    #[error("{error}: {message}")]
    Forbidden { error: String, message: String },
    #[error("{error}: {message}")]
    NotFound { error: String, message: String },
    #[error("{error}: {message}")]
    Conflict { error: String, message: String },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            error: error.into(),
            message: message.into(),
        }
    }

    /// Missing session on a protected operation.
    pub fn unauthorized() -> Self {
        ApiError::Unauthorized {
            error: "認証されていません".into(),
            message: "ログインが必要です".into(),
        }
    }

    /// Deliberately vague login failure, to avoid user enumeration.
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized {
            error: "認証に失敗しました".into(),
            message: "メールアドレスまたはパスワードが正しくありません".into(),
        }
    }

    pub fn forbidden(error: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn not_found(error: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::NotFound {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn conflict(error: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Conflict {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest { error, message }
            | ApiError::Unauthorized { error, message }
            | ApiError::Forbidden { error, message }
            | ApiError::NotFound { error, message }
            | ApiError::Conflict { error, message } => ErrorBody { error, message },
            ApiError::Internal(source) => {
                // log the source, surface a generic message
                tracing::error!(error = ?source, "internal server error");
                ErrorBody {
                    error: "サーバーエラーが発生しました".into(),
                    message: "処理中にエラーが発生しました".into(),
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => ApiError::conflict(
                "メールアドレスは既に登録されています",
                "別のメールアドレスを使用してください",
            ),
            StoreError::DuplicateProgress => ApiError::conflict(
                "進捗が既に存在します",
                "PUTメソッドを使用して更新してください",
            ),
            StoreError::ProgressNotFound => ApiError::not_found(
                "進捗が見つかりません",
                "POSTメソッドを使用して新規作成してください",
            ),
            StoreError::Backend(source) => ApiError::Internal(source),
        }
    }
}

impl From<tower_sessions::session::Error> for ApiError {
    fn from(err: tower_sessions::session::Error) -> Self {
        ApiError::Internal(anyhow::Error::new(err))
    }
}
