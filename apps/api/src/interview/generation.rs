//! The two kinds of text-generation call.
//!
//! `must_generate` is for required artifacts (questions): any transport,
//! parse or validation failure becomes `AppError::GenerationFailure` and is
//! surfaced to the caller. `try_generate_*` is for best-effort artifacts
//! (bridge, intro, small talk, digests): failures come back as
//! `GenerationDegraded`, which call sites always resolve locally via
//! `recover`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

use crate::errors::AppError;
use crate::llm_client::{strip_json_fences, TextGenerator};

/// A best-effort artifact could not be produced.
#[derive(Debug, Error)]
#[error("{artifact} generation degraded: {reason}")]
pub struct GenerationDegraded {
    pub artifact: &'static str,
    pub reason: String,
}

#[derive(Clone)]
pub struct GenerationClient {
    generator: Arc<dyn TextGenerator>,
}

impl GenerationClient {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Required JSON artifact. Failures are fatal for the request.
    pub async fn must_generate<T: DeserializeOwned>(
        &self,
        artifact: &'static str,
        prompt: &str,
        system: &str,
    ) -> Result<T, AppError> {
        let text = self
            .generator
            .generate(prompt, system)
            .await
            .map_err(|e| AppError::GenerationFailure(format!("{artifact}: {e}")))?;

        serde_json::from_str(strip_json_fences(&text)).map_err(|e| {
            AppError::GenerationFailure(format!("{artifact}: malformed model output: {e}"))
        })
    }

    /// Best-effort free text. Empty replies count as failures.
    pub async fn try_generate_text(
        &self,
        artifact: &'static str,
        prompt: &str,
        system: &str,
    ) -> Result<String, GenerationDegraded> {
        let text = self
            .generator
            .generate(prompt, system)
            .await
            .map_err(|e| GenerationDegraded {
                artifact,
                reason: e.to_string(),
            })?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationDegraded {
                artifact,
                reason: "empty reply".to_string(),
            });
        }
        Ok(text.to_string())
    }

    /// Best-effort JSON.
    pub async fn try_generate_json<T: DeserializeOwned>(
        &self,
        artifact: &'static str,
        prompt: &str,
        system: &str,
    ) -> Result<T, GenerationDegraded> {
        let text = self.try_generate_text(artifact, prompt, system).await?;
        serde_json::from_str(strip_json_fences(&text)).map_err(|e| GenerationDegraded {
            artifact,
            reason: format!("malformed model output: {e}"),
        })
    }
}

/// Resolves a best-effort result to a value, logging the degradation.
pub fn recover<T>(result: Result<T, GenerationDegraded>, fallback: impl FnOnce() -> T) -> T {
    match result {
        Ok(value) => value,
        Err(degraded) => {
            warn!("{degraded}; using fallback");
            fallback()
        }
    }
}
