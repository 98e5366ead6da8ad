//! Resume snapshots that let a candidate continue an interrupted session.
//!
//! The snapshot is advisory: the turn list is authoritative, so counts and
//! phase are always recomputed from it, and last-writer-wins between an
//! auto-save and a submission is acceptable.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::interview::models::{
    InterviewPhase, ResumeProgressState, Session, SessionStatus, Turn, TurnType,
};

pub const RESUME_WINDOW_HOURS: i64 = 24;

/// What the client needs to offer "continue where you left off".
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResumeData {
    pub can_resume: bool,
    pub turn_id: Option<Uuid>,
    pub turn_index: Option<u32>,
    pub phase: Option<InterviewPhase>,
    pub answered_count: u32,
    pub total_expected: u32,
    pub message: String,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl ResumeData {
    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            can_resume: false,
            turn_id: None,
            turn_index: None,
            phase: None,
            answered_count: 0,
            total_expected: 0,
            message: message.into(),
            last_activity_at: None,
        }
    }
}

pub fn first_unanswered(turns: &[Turn]) -> Option<&Turn> {
    turns.iter().find(|t| !t.is_answered())
}

pub fn last_answered(turns: &[Turn]) -> Option<&Turn> {
    turns.iter().rev().find(|t| t.is_answered())
}

/// Non-question turns already created plus the scored-question cap.
pub fn total_expected(turns: &[Turn], question_cap: u32) -> u32 {
    let conversational = turns
        .iter()
        .filter(|t| t.turn_type != TurnType::Question)
        .count() as u32;
    conversational + question_cap
}

/// Builds the snapshot from the turn list. `current_turn_id` and
/// `last_completed_turn_id` are kept as given when they belong to the session;
/// counts and phase are always derived.
pub fn build_snapshot(
    turns: &[Turn],
    current_turn_id: Option<Uuid>,
    last_completed_turn_id: Option<Uuid>,
    question_cap: u32,
    now: DateTime<Utc>,
) -> ResumeProgressState {
    let belongs = |id: Uuid| turns.iter().any(|t| t.id == id);
    let current = current_turn_id
        .filter(|id| belongs(*id))
        .and_then(|id| turns.iter().find(|t| t.id == id && !t.is_answered()))
        .or_else(|| first_unanswered(turns));
    let last_completed = last_completed_turn_id
        .filter(|id| belongs(*id))
        .or_else(|| last_answered(turns).map(|t| t.id));

    ResumeProgressState {
        current_turn_id: current.map(|t| t.id),
        last_completed_turn_id: last_completed,
        turn_index: current
            .map(|t| t.turn_index)
            .unwrap_or(turns.len() as u32),
        answered_count: turns.iter().filter(|t| t.is_answered()).count() as u32,
        total_expected: total_expected(turns, question_cap),
        interview_phase: InterviewPhase::for_turn(current),
        saved_at: now,
    }
}

fn phase_message(phase: InterviewPhase, answered: u32, total: u32) -> String {
    match phase {
        InterviewPhase::SmallTalk => {
            "Welcome back! Let's pick up the warm-up conversation where we left off.".to_string()
        }
        InterviewPhase::Confirmation => {
            "Welcome back! You were about to begin the interview questions.".to_string()
        }
        InterviewPhase::Questions => format!(
            "Welcome back! You've answered {answered} of {total}. Let's continue with the next question."
        ),
        InterviewPhase::Complete => {
            "All questions are answered. Your feedback is being prepared.".to_string()
        }
    }
}

/// Decides whether and where a session can be resumed.
pub fn resume_data(session: &Session, turns: &[Turn], now: DateTime<Utc>) -> ResumeData {
    if session.status == SessionStatus::Complete {
        return ResumeData::unavailable("This interview is already complete.");
    }
    let Some(progress) = &session.progress_state else {
        return ResumeData::unavailable("No saved progress for this interview.");
    };
    if now - session.last_activity_at > Duration::hours(RESUME_WINDOW_HOURS) {
        return ResumeData::unavailable("Saved progress has expired. Please start a new interview.");
    }

    // Prefer the stored pointer while it still names an unanswered turn.
    let target = progress
        .current_turn_id
        .and_then(|id| turns.iter().find(|t| t.id == id && !t.is_answered()))
        .or_else(|| first_unanswered(turns));

    let Some(turn) = target else {
        return ResumeData::unavailable("There is no remaining question to resume.");
    };

    let phase = InterviewPhase::for_turn(Some(turn));
    let answered = turns
        .iter()
        .filter(|t| t.turn_type == TurnType::Question && t.is_answered())
        .count() as u32;
    let scored_total = progress
        .total_expected
        .saturating_sub(total_expected(turns, 0));

    ResumeData {
        can_resume: true,
        turn_id: Some(turn.id),
        turn_index: Some(turn.turn_index),
        phase: Some(phase),
        answered_count: progress.answered_count,
        total_expected: progress.total_expected,
        message: phase_message(phase, answered, scored_total),
        last_activity_at: Some(session.last_activity_at),
    }
}
