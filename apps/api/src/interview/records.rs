//! Versioned JSON documents stored in session columns.
//!
//! Each column is tagged with a `version` field. Reads decode through these
//! enums and fail with `CorruptRecord` on any shape mismatch; fields are never
//! accessed optimistically on a raw `serde_json::Value`.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;
use crate::interview::models::{
    AnswerDigest, DifficultyAdjustment, ResearchSnapshot, ResumeProgressState, SessionLimits,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum ResearchRecord {
    #[serde(rename = "1")]
    V1(ResearchSnapshot),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum LimitsRecord {
    #[serde(rename = "1")]
    V1(SessionLimits),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum StageTargetsRecord {
    #[serde(rename = "1")]
    V1 { targets: Vec<u32> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum DifficultyCurveRecord {
    #[serde(rename = "1")]
    V1 { entries: Vec<DifficultyAdjustment> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum ProgressRecord {
    #[serde(rename = "1")]
    V1(ResumeProgressState),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum AnswerDigestRecord {
    #[serde(rename = "1")]
    V1(AnswerDigest),
}

/// Decodes a JSON column, naming the column in the error.
pub fn decode<T: DeserializeOwned>(column: &str, value: Value) -> Result<T, AppError> {
    serde_json::from_value(value)
        .map_err(|e| AppError::CorruptRecord(format!("column '{column}' failed validation: {e}")))
}

pub fn encode<T: Serialize>(column: &str, record: &T) -> Result<Value, AppError> {
    serde_json::to_value(record).map_err(|e| {
        AppError::Internal(anyhow::anyhow!("Failed to serialize column '{column}': {e}"))
    })
}

impl From<ResearchRecord> for ResearchSnapshot {
    fn from(record: ResearchRecord) -> Self {
        match record {
            ResearchRecord::V1(snapshot) => snapshot,
        }
    }
}

impl From<LimitsRecord> for SessionLimits {
    fn from(record: LimitsRecord) -> Self {
        match record {
            LimitsRecord::V1(limits) => limits,
        }
    }
}

impl From<StageTargetsRecord> for Vec<u32> {
    fn from(record: StageTargetsRecord) -> Self {
        match record {
            StageTargetsRecord::V1 { targets } => targets,
        }
    }
}

impl From<DifficultyCurveRecord> for Vec<DifficultyAdjustment> {
    fn from(record: DifficultyCurveRecord) -> Self {
        match record {
            DifficultyCurveRecord::V1 { entries } => entries,
        }
    }
}

impl From<ProgressRecord> for ResumeProgressState {
    fn from(record: ProgressRecord) -> Self {
        match record {
            ProgressRecord::V1(state) => state,
        }
    }
}

impl From<AnswerDigestRecord> for AnswerDigest {
    fn from(record: AnswerDigestRecord) -> Self {
        match record {
            AnswerDigestRecord::V1(digest) => digest,
        }
    }
}
