//! Domain types for interview sessions and turns.
//!
//! Enum-valued columns are stored as snake_case text; `as_str`/`parse` are the
//! only conversions between the two forms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// Every generated question carries this time limit.
pub const QUESTION_TIME_LIMIT_SECS: u32 = 90;

/// Hard cap on scored questions for free-tier sessions.
pub const FREE_TIER_QUESTION_CAP: u32 = 3;

fn unknown(kind: &str, value: &str) -> AppError {
    AppError::CorruptRecord(format!("unknown {kind} '{value}'"))
}

// ────────────────────────────────────────────────────────────────────────────
// Session-level enums
// ────────────────────────────────────────────────────────────────────────────

/// Session lifecycle. Transitions only move forward, except for an explicit
/// restart which returns a running session to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Intake,
    Research,
    Ready,
    Running,
    Feedback,
    Complete,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Intake => "intake",
            SessionStatus::Research => "research",
            SessionStatus::Ready => "ready",
            SessionStatus::Running => "running",
            SessionStatus::Feedback => "feedback",
            SessionStatus::Complete => "complete",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "intake" => Ok(SessionStatus::Intake),
            "research" => Ok(SessionStatus::Research),
            "ready" => Ok(SessionStatus::Ready),
            "running" => Ok(SessionStatus::Running),
            "feedback" => Ok(SessionStatus::Feedback),
            "complete" => Ok(SessionStatus::Complete),
            other => Err(unknown("session status", other)),
        }
    }

    /// `start` is legal only from these states.
    pub fn is_startable(&self) -> bool {
        matches!(self, SessionStatus::Ready | SessionStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Paid,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Paid => "paid",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "free" => Ok(PlanTier::Free),
            "paid" => Ok(PlanTier::Paid),
            other => Err(unknown("plan tier", other)),
        }
    }
}

/// How questions are delivered to the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Text,
    Voice,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Text => "text",
            DeliveryMode::Voice => "voice",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "text" => Ok(DeliveryMode::Text),
            "voice" => Ok(DeliveryMode::Voice),
            other => Err(unknown("delivery mode", other)),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Turn-level enums
// ────────────────────────────────────────────────────────────────────────────

/// Warm-up turns come first, then one confirmation, then scored questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnType {
    SmallTalk,
    Confirmation,
    Question,
}

impl TurnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnType::SmallTalk => "small_talk",
            TurnType::Confirmation => "confirmation",
            TurnType::Question => "question",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "small_talk" => Ok(TurnType::SmallTalk),
            "confirmation" => Ok(TurnType::Confirmation),
            "question" => Ok(TurnType::Question),
            other => Err(unknown("turn type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    Technical,
    Behavioral,
    Situational,
    /// Warm-up and confirmation turns.
    General,
}

impl QuestionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionCategory::Technical => "technical",
            QuestionCategory::Behavioral => "behavioral",
            QuestionCategory::Situational => "situational",
            QuestionCategory::General => "general",
        }
    }

    /// Lenient parse for model output: case-insensitive, accepts "behavioural".
    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "technical" => Some(QuestionCategory::Technical),
            "behavioral" | "behavioural" => Some(QuestionCategory::Behavioral),
            "situational" => Some(QuestionCategory::Situational),
            "general" => Some(QuestionCategory::General),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        Self::from_label(value).ok_or_else(|| unknown("question category", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        Self::from_label(value).ok_or_else(|| unknown("difficulty", value))
    }

    /// One level up, saturating at hard.
    pub fn harder(self) -> Self {
        match self {
            Difficulty::Easy => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Hard => Difficulty::Hard,
        }
    }

    /// One level down, saturating at easy.
    pub fn easier(self) -> Self {
        match self {
            Difficulty::Hard => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Easy => Difficulty::Easy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerQuality {
    Weak,
    Medium,
    Strong,
}

impl AnswerQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerQuality::Weak => "weak",
            AnswerQuality::Medium => "medium",
            AnswerQuality::Strong => "strong",
        }
    }
}

/// Coarse position in the interview, always derived from the first unanswered
/// turn (or `Complete` when none remain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewPhase {
    SmallTalk,
    Confirmation,
    Questions,
    Complete,
}

impl InterviewPhase {
    pub fn for_turn(turn: Option<&Turn>) -> Self {
        match turn.map(|t| t.turn_type) {
            Some(TurnType::SmallTalk) => InterviewPhase::SmallTalk,
            Some(TurnType::Confirmation) => InterviewPhase::Confirmation,
            Some(TurnType::Question) => InterviewPhase::Questions,
            None => InterviewPhase::Complete,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Research snapshot
// ────────────────────────────────────────────────────────────────────────────

/// Immutable candidate/role/company facts, written once before the session
/// reaches `ready` and read by every generation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSnapshot {
    pub role_title: String,
    pub company_name: String,
    pub cv_summary: String,
    pub job_summary: String,
    #[serde(default)]
    pub company_facts: Vec<String>,
    #[serde(default)]
    pub competencies: Vec<String>,
    #[serde(default)]
    pub interview_style: Option<InterviewStyle>,
}

/// Optional industry-specific interview configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterviewStyle {
    pub tone: Option<String>,
    #[serde(default)]
    pub stage_names: Vec<String>,
    #[serde(default)]
    pub question_style_hints: Vec<String>,
}

impl ResearchSnapshot {
    pub fn stage_names(&self) -> &[String] {
        self.interview_style
            .as_ref()
            .map(|s| s.stage_names.as_slice())
            .unwrap_or(&[])
    }
}

/// Per-session limits configured at intake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionLimits {
    pub question_cap: Option<u32>,
}

// ────────────────────────────────────────────────────────────────────────────
// Audit + resume records
// ────────────────────────────────────────────────────────────────────────────

/// One entry of the append-only difficulty curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyAdjustment {
    pub turn_index: u32,
    pub previous: Difficulty,
    pub new: Difficulty,
    pub quality: Option<AnswerQuality>,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// Advisory snapshot used to continue an interrupted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeProgressState {
    pub current_turn_id: Option<Uuid>,
    pub last_completed_turn_id: Option<Uuid>,
    pub turn_index: u32,
    pub answered_count: u32,
    pub total_expected: u32,
    pub interview_phase: InterviewPhase,
    pub saved_at: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Aggregates
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub category: QuestionCategory,
    pub difficulty: Difficulty,
    pub time_limit_secs: u32,
    pub follow_up: Option<String>,
}

impl Question {
    /// A warm-up or confirmation prompt: general, easy, unscored.
    pub fn conversational(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: QuestionCategory::General,
            difficulty: Difficulty::Easy,
            time_limit_secs: QUESTION_TIME_LIMIT_SECS,
            follow_up: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerDigest {
    pub summary: String,
    pub word_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnTiming {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub reveal_count: u32,
}

/// One question/answer exchange. Immutable once answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Creation order within the session; the prior turn is `turn_index - 1`.
    pub turn_index: u32,
    pub turn_type: TurnType,
    pub stage: u32,
    pub question: Question,
    pub bridge_text: Option<String>,
    pub answer_text: Option<String>,
    pub answer_audio_key: Option<String>,
    pub answer_digest: Option<AnswerDigest>,
    pub timing: TurnTiming,
}

impl Turn {
    pub fn new(
        session_id: Uuid,
        turn_index: u32,
        turn_type: TurnType,
        stage: u32,
        question: Question,
        bridge_text: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            turn_index,
            turn_type,
            stage,
            question,
            bridge_text,
            answer_text: None,
            answer_audio_key: None,
            answer_digest: None,
            timing: TurnTiming {
                started_at: Utc::now(),
                completed_at: None,
                duration_secs: None,
                reveal_count: 0,
            },
        }
    }

    pub fn is_answered(&self) -> bool {
        self.answer_text.is_some() || self.answer_audio_key.is_some()
    }
}

/// The single mutation applied to a turn when the candidate answers it.
#[derive(Debug, Clone)]
pub struct AnswerAttachment {
    pub answer_text: String,
    pub audio_key: Option<String>,
    pub digest: AnswerDigest,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub reveal_count: u32,
}

/// Aggregate root for one interview attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: SessionStatus,
    pub plan_tier: PlanTier,
    pub mode: DeliveryMode,
    pub stages_planned: u32,
    pub current_stage: u32,
    pub stage_targets: Option<Vec<u32>>,
    pub limits: SessionLimits,
    pub research: Option<ResearchSnapshot>,
    pub conversation_summary: String,
    pub difficulty_curve: Vec<DifficultyAdjustment>,
    pub progress_state: Option<ResumeProgressState>,
    pub intro_text: Option<String>,
    pub entitlement_id: Option<Uuid>,
    pub entitlement_consumed_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_paid(&self) -> bool {
        self.plan_tier == PlanTier::Paid
    }

    pub fn is_multi_stage(&self) -> bool {
        self.stages_planned > 1
    }

    /// Maximum number of scored questions. Free tier is hard-capped; paid
    /// sessions use their stored limit, falling back to `paid_default`.
    pub fn question_cap(&self, paid_default: u32) -> u32 {
        match self.plan_tier {
            PlanTier::Free => FREE_TIER_QUESTION_CAP,
            PlanTier::Paid => self.limits.question_cap.unwrap_or(paid_default).max(1),
        }
    }

    /// Difficulty of the most recent curve entry.
    pub fn current_difficulty(&self) -> Option<Difficulty> {
        self.difficulty_curve.last().map(|a| a.new)
    }

    /// Generation needs the research snapshot; sessions past intake always have one.
    pub fn research(&self) -> Result<&ResearchSnapshot, AppError> {
        self.research.as_ref().ok_or_else(|| {
            AppError::InvalidState(format!("session {} has no research snapshot", self.id))
        })
    }
}
