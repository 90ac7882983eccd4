//! REST endpoints under `/api`.

pub mod auth;
pub mod progress;
pub mod quizzes;
pub mod themes;

use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRequest, Request, rejection::JsonRejection},
    routing::{get, post},
};

use crate::{auth::CredentialVerifier, error::ApiError, store::Store};

/// [`axum::Json`] with the rejection replaced: malformed JSON or a
/// missing content type answers with the same `{error, message}` body
/// as the field validations instead of axum's plain-text rejection.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) =
            axum::Json::<T>::from_request(req, state).await.map_err(|_| {
                ApiError::bad_request(
                    "無効なリクエストです",
                    "リクエストボディをJSONとして解釈できません",
                )
            })?;
        Ok(Self(value))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub verifier: Arc<dyn CredentialVerifier>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/themes", get(themes::list))
        .route("/themes/{id}", get(themes::detail))
        .route("/quizzes", get(quizzes::list))
        .route(
            "/progress",
            get(progress::list)
                .post(progress::create)
                .put(progress::update),
        )
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .with_state(state)
}
