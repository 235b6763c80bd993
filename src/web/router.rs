use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::web::{AppState, auth, principles, revisions, samples, users};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/login", post(auth::process_login))
        .route("/logout", post(auth::logout))
        .route("/healthz", get(healthz))
        .merge(users::router())
        .merge(principles::router())
        .merge(samples::router())
        .merge(revisions::router())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
