pub mod api;
pub mod attempt;
pub mod auth;
pub mod content;
pub mod error;
pub mod model;
pub mod pages;
pub mod store;
pub mod utils;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::themes::list,
        api::themes::detail,
        api::quizzes::list,
        api::progress::list,
        api::progress::create,
        api::progress::update,
        api::auth::register,
        api::auth::login,
        api::auth::logout,
        api::auth::me,
    ),
    components(schemas(
        model::Theme,
        model::Quiz,
        model::Progress,
        model::User,
        auth::SessionUser,
        error::ErrorBody,
        api::progress::ProgressRequest,
        api::auth::RegisterRequest,
        api::auth::RegisterResponse,
        api::auth::LoginRequest,
        api::auth::LoginResponse,
    ))
)]
pub struct ApiDoc;

/// Full application router. The session layer is applied by the caller
/// so dev, prod and tests can pick their own session store.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api::router(state.clone()))
        .merge(pages::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
