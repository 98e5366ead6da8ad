use std::sync::Arc;

use crate::config::Config;
use crate::interview::controller::InterviewEngine;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InterviewEngine>,
    #[allow(dead_code)]
    pub config: Config,
}
