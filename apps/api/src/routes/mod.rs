pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::interview::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Interview API
        .route("/api/v1/interviews/:id", get(handlers::handle_get_state))
        .route("/api/v1/interviews/:id/start", post(handlers::handle_start))
        .route(
            "/api/v1/interviews/:id/answers",
            post(handlers::handle_submit_answer),
        )
        .route(
            "/api/v1/interviews/:id/resume",
            get(handlers::handle_get_resume),
        )
        .route(
            "/api/v1/interviews/:id/autosave",
            post(handlers::handle_auto_save),
        )
        .route("/api/v1/interviews/:id/intro", get(handlers::handle_get_intro))
        .route(
            "/api/v1/interviews/:id/restart",
            post(handlers::handle_restart),
        )
        .route(
            "/api/v1/interviews/:id/complete",
            post(handlers::handle_complete),
        )
        .with_state(state)
}
