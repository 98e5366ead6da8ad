use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::controller::{
    AnswerSubmission, IntroResponse, ProgressHint, SessionState, StartResponse, SubmitResponse,
};
use crate::interview::models::ResumeProgressState;
use crate::interview::progress::ResumeData;
use crate::state::AppState;

/// Success half of the `{data | error}` envelope; errors render through `AppError`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
}

fn wrap<T>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { data })
}

/// POST /api/v1/interviews/:id/start
pub async fn handle_start(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Envelope<StartResponse>>, AppError> {
    Ok(wrap(state.engine.start(session_id).await?))
}

/// POST /api/v1/interviews/:id/answers
pub async fn handle_submit_answer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<AnswerSubmission>,
) -> Result<Json<Envelope<SubmitResponse>>, AppError> {
    Ok(wrap(state.engine.submit_answer(session_id, req).await?))
}

/// GET /api/v1/interviews/:id
pub async fn handle_get_state(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Envelope<SessionState>>, AppError> {
    Ok(wrap(state.engine.get_state(session_id).await?))
}

/// GET /api/v1/interviews/:id/resume
pub async fn handle_get_resume(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Envelope<ResumeData>>, AppError> {
    Ok(wrap(state.engine.get_resume_data(session_id).await?))
}

/// POST /api/v1/interviews/:id/autosave
///
/// The body is optional; without one the pointers are derived from the turn list.
pub async fn handle_auto_save(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    hint: Option<Json<ProgressHint>>,
) -> Result<Json<Envelope<ResumeProgressState>>, AppError> {
    let snapshot = match hint {
        Some(Json(hint)) => state.engine.save_progress(session_id, hint).await?,
        None => state.engine.auto_save(session_id).await?,
    };
    Ok(wrap(snapshot))
}

/// GET /api/v1/interviews/:id/intro
pub async fn handle_get_intro(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Envelope<IntroResponse>>, AppError> {
    Ok(wrap(state.engine.get_intro(session_id).await?))
}

/// POST /api/v1/interviews/:id/restart
pub async fn handle_restart(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Envelope<SessionState>>, AppError> {
    Ok(wrap(state.engine.restart(session_id).await?))
}

/// POST /api/v1/interviews/:id/complete
pub async fn handle_complete(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Envelope<SessionState>>, AppError> {
    Ok(wrap(state.engine.mark_complete(session_id).await?))
}
