use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::models::{
    DeliveryMode, Difficulty, PlanTier, Question, QuestionCategory, Session, SessionLimits,
    SessionStatus, Turn, TurnTiming, TurnType,
};
use crate::interview::records::{
    decode, AnswerDigestRecord, DifficultyCurveRecord, LimitsRecord, ProgressRecord,
    ResearchRecord, StageTargetsRecord,
};

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub plan_tier: String,
    pub mode: String,
    pub stages_planned: i32,
    pub current_stage: i32,
    pub stage_targets: Option<Value>,
    pub limits: Option<Value>,
    pub research: Option<Value>,
    pub conversation_summary: String,
    pub difficulty_curve: Value,
    pub progress_state: Option<Value>,
    pub intro_text: Option<String>,
    pub entitlement_id: Option<Uuid>,
    pub entitlement_consumed_at: Option<DateTime<Utc>>,
    pub submitting_turn_id: Option<Uuid>,
    pub submission_claimed_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TurnRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub turn_index: i32,
    pub turn_type: String,
    pub stage: i32,
    pub question_text: String,
    pub category: String,
    pub difficulty: String,
    pub time_limit_secs: i32,
    pub follow_up: Option<String>,
    pub bridge_text: Option<String>,
    pub answer_text: Option<String>,
    pub answer_audio_key: Option<String>,
    pub answer_digest: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i32>,
    pub reveal_count: i32,
    pub created_at: DateTime<Utc>,
}

fn non_negative(column: &str, value: i32) -> Result<u32, AppError> {
    u32::try_from(value)
        .map_err(|_| AppError::CorruptRecord(format!("column '{column}' is negative: {value}")))
}

impl TryFrom<SessionRow> for Session {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self, AppError> {
        let stage_targets = row
            .stage_targets
            .map(|v| decode::<StageTargetsRecord>("stage_targets", v).map(Vec::from))
            .transpose()?;
        let limits = row
            .limits
            .map(|v| decode::<LimitsRecord>("limits", v).map(SessionLimits::from))
            .transpose()?
            .unwrap_or_default();
        let research = row
            .research
            .map(|v| decode::<ResearchRecord>("research", v).map(Into::into))
            .transpose()?;
        let progress_state = row
            .progress_state
            .map(|v| decode::<ProgressRecord>("progress_state", v).map(Into::into))
            .transpose()?;
        let difficulty_curve =
            decode::<DifficultyCurveRecord>("difficulty_curve", row.difficulty_curve)?.into();

        Ok(Session {
            id: row.id,
            user_id: row.user_id,
            status: SessionStatus::parse(&row.status)?,
            plan_tier: PlanTier::parse(&row.plan_tier)?,
            mode: DeliveryMode::parse(&row.mode)?,
            stages_planned: non_negative("stages_planned", row.stages_planned)?.max(1),
            current_stage: non_negative("current_stage", row.current_stage)?.max(1),
            stage_targets,
            limits,
            research,
            conversation_summary: row.conversation_summary,
            difficulty_curve,
            progress_state,
            intro_text: row.intro_text,
            entitlement_id: row.entitlement_id,
            entitlement_consumed_at: row.entitlement_consumed_at,
            last_activity_at: row.last_activity_at,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<TurnRow> for Turn {
    type Error = AppError;

    fn try_from(row: TurnRow) -> Result<Self, AppError> {
        let answer_digest = row
            .answer_digest
            .map(|v| decode::<AnswerDigestRecord>("answer_digest", v).map(Into::into))
            .transpose()?;

        Ok(Turn {
            id: row.id,
            session_id: row.session_id,
            turn_index: non_negative("turn_index", row.turn_index)?,
            turn_type: TurnType::parse(&row.turn_type)?,
            stage: non_negative("stage", row.stage)?,
            question: Question {
                text: row.question_text,
                category: QuestionCategory::parse(&row.category)?,
                difficulty: Difficulty::parse(&row.difficulty)?,
                time_limit_secs: non_negative("time_limit_secs", row.time_limit_secs)?,
                follow_up: row.follow_up,
            },
            bridge_text: row.bridge_text,
            answer_text: row.answer_text,
            answer_audio_key: row.answer_audio_key,
            answer_digest,
            timing: TurnTiming {
                started_at: row.started_at,
                completed_at: row.completed_at,
                duration_secs: row.duration_secs.map(i64::from),
                reveal_count: non_negative("reveal_count", row.reveal_count)?,
            },
        })
    }
}
