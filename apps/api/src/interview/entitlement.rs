//! Consumes one purchased credit when a paid session reaches `feedback`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Entitlement service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Entitlement {0} has no remaining credits")]
    Exhausted(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumeOutcome {
    pub success: bool,
    pub remaining_credits: i64,
}

#[async_trait]
pub trait EntitlementService: Send + Sync {
    async fn consume(
        &self,
        entitlement_id: Uuid,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<ConsumeOutcome, EntitlementError>;
}

#[derive(Debug, Serialize)]
struct ConsumeRequest {
    user_id: Uuid,
    session_id: Uuid,
}

/// HTTP client for the external entitlement service.
#[derive(Clone)]
pub struct HttpEntitlementService {
    client: Client,
    base_url: String,
}

impl HttpEntitlementService {
    pub fn new(base_url: &str) -> Result<Self, EntitlementError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(10)).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EntitlementService for HttpEntitlementService {
    async fn consume(
        &self,
        entitlement_id: Uuid,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<ConsumeOutcome, EntitlementError> {
        let url = format!("{}/entitlements/{}/consume", self.base_url, entitlement_id);
        let response = self
            .client
            .post(&url)
            .json(&ConsumeRequest {
                user_id,
                session_id,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EntitlementError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let outcome: ConsumeOutcome = response.json().await?;
        debug!(
            "Consumed entitlement {entitlement_id}: success={}, remaining={}",
            outcome.success, outcome.remaining_credits
        );
        if !outcome.success {
            return Err(EntitlementError::Exhausted(entitlement_id));
        }
        Ok(outcome)
    }
}
