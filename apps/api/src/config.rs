use std::time::Duration;

use anyhow::{ensure, Context, Result};

use crate::llm_client::max_call_duration;

/// Generation calls one submission can make in sequence: digest, question, bridge.
const GENERATION_CALLS_PER_SUBMISSION: u32 = 3;

/// Headroom on top of generation time for the store round trips.
const LOCK_TTL_MARGIN_SECS: i64 = 30;

/// Application configuration loaded from environment variables.
/// Startup aborts if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub entitlement_service_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Question cap for paid sessions whose stored limits do not carry one.
    pub paid_question_cap: u32,
    /// Per-request timeout on the text-generation service.
    pub llm_timeout_secs: u64,
    /// Age after which an in-flight submission claim is considered abandoned.
    /// Never shorter than the worst-case generation time of one submission.
    pub submission_lock_ttl_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let llm_timeout_secs = parse_env("LLM_TIMEOUT_SECS", 60)?;
        let min_lock_ttl = min_submission_lock_ttl_secs(llm_timeout_secs);
        let submission_lock_ttl_secs = parse_env(
            "SUBMISSION_LOCK_TTL_SECS",
            min_lock_ttl + LOCK_TTL_MARGIN_SECS,
        )?;
        check_submission_lock_ttl(submission_lock_ttl_secs, llm_timeout_secs)?;

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            entitlement_service_url: require_env("ENTITLEMENT_SERVICE_URL")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            paid_question_cap: parse_env("PAID_QUESTION_CAP", 10)?,
            llm_timeout_secs,
            submission_lock_ttl_secs,
        })
    }
}

/// Worst case for one submission: every generation call exhausts its retries.
fn min_submission_lock_ttl_secs(llm_timeout_secs: u64) -> i64 {
    let per_call = max_call_duration(Duration::from_secs(llm_timeout_secs));
    let total = per_call.as_secs() * u64::from(GENERATION_CALLS_PER_SUBMISSION);
    i64::try_from(total).unwrap_or(i64::MAX)
}

/// A claim that can expire mid-submission would let a retry run concurrently.
fn check_submission_lock_ttl(ttl_secs: i64, llm_timeout_secs: u64) -> Result<()> {
    let min = min_submission_lock_ttl_secs(llm_timeout_secs);
    ensure!(
        ttl_secs >= min,
        "SUBMISSION_LOCK_TTL_SECS ({ttl_secs}) must be at least {min}s for LLM_TIMEOUT_SECS={llm_timeout_secs}"
    );
    Ok(())
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
