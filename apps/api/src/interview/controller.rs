//! Session Controller — the entry point that drives an interview.
//!
//! One submission flows: idempotency claim → answer attach + rolling summary →
//! turn-type dispatch → quality assessment → difficulty engine → stage planner
//! → question generator → bridge generator → persisted turn → resume snapshot.
//!
//! Submissions for a session are serialized by a claim row in the store, and
//! every turn insert is guarded by `(session_id, turn_index)` uniqueness, so a
//! double-clicked or retried submission can never create two "next" turns.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::interview::difficulty;
use crate::interview::entitlement::EntitlementService;
use crate::interview::generation::GenerationClient;
use crate::interview::models::{
    AnswerAttachment, DeliveryMode, Difficulty, DifficultyAdjustment, InterviewPhase, PlanTier,
    Question, ResumeProgressState, Session, SessionStatus, Turn, TurnType,
};
use crate::interview::narrative::{self, BridgeRequest};
use crate::interview::progress::{self, ResumeData};
use crate::interview::quality::assess_answer;
use crate::interview::question_gen::{generate_question, QuestionRequest, StageContext};
use crate::interview::stages;
use crate::interview::store::{SessionStore, SubmissionClaim, TurnCommit};
use crate::interview::summary::{append_entry, digest_answer};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub paid_question_cap: u32,
    pub submission_lock_ttl: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            paid_question_cap: config.paid_question_cap,
            submission_lock_ttl: Duration::seconds(config.submission_lock_ttl_secs),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request / response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerSubmission {
    pub turn_id: Uuid,
    #[serde(default)]
    pub answer_text: String,
    #[serde(default)]
    pub audio_key: Option<String>,
    #[serde(default)]
    pub reveal_count: Option<u32>,
}

/// Client hints for a resume snapshot. Pointers that do not belong to the
/// session are ignored; counts and phase are always derived server-side.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressHint {
    pub current_turn_id: Option<Uuid>,
    pub last_completed_turn_id: Option<Uuid>,
    pub turn_index: Option<u32>,
    pub phase: Option<InterviewPhase>,
}

/// A turn as the candidate sees it: no answer data.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TurnView {
    pub turn_id: Uuid,
    pub turn_index: u32,
    pub turn_type: TurnType,
    pub stage: u32,
    pub stage_name: String,
    pub question_text: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub time_limit_secs: u32,
    pub follow_up: Option<String>,
    pub bridge_text: Option<String>,
}

impl TurnView {
    fn new(turn: &Turn, stage_labels: &[String]) -> Self {
        Self {
            turn_id: turn.id,
            turn_index: turn.turn_index,
            turn_type: turn.turn_type,
            stage: turn.stage,
            stage_name: stages::stage_name(turn.stage, stage_labels),
            question_text: turn.question.text.clone(),
            category: turn.question.category.as_str().to_string(),
            difficulty: turn.question.difficulty,
            time_limit_secs: turn.question.time_limit_secs,
            follow_up: turn.question.follow_up.clone(),
            bridge_text: turn.bridge_text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub intro_text: Option<String>,
    /// Unanswered warm-up turns, asked before `current_turn`.
    pub warm_up: Vec<TurnView>,
    pub current_turn: Option<TurnView>,
    pub current_stage: u32,
    pub stage_name: String,
    pub stages_planned: u32,
    pub stage_targets: Option<Vec<u32>>,
    pub question_cap: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub done: bool,
    pub next_question: Option<TurnView>,
    pub turn_id: Option<Uuid>,
    pub bridge_text: Option<String>,
    pub current_stage: u32,
    pub stage_name: String,
    /// The submission was a replay of an answered or in-flight turn and
    /// changed nothing.
    pub duplicate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub status: SessionStatus,
    pub plan_tier: PlanTier,
    pub mode: DeliveryMode,
    pub stages_planned: u32,
    pub current_stage: u32,
    pub stage_name: String,
    pub stage_targets: Option<Vec<u32>>,
    pub question_cap: u32,
    pub conversation_summary: String,
    pub difficulty_curve: Vec<DifficultyAdjustment>,
    pub progress_state: Option<ResumeProgressState>,
    pub intro_text: Option<String>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub session: SessionView,
    pub turns: Vec<Turn>,
    pub current_turn: Option<TurnView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntroResponse {
    pub intro_text: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

pub struct InterviewEngine {
    store: Arc<dyn SessionStore>,
    generation: GenerationClient,
    entitlements: Arc<dyn EntitlementService>,
    settings: EngineSettings,
}

/// What the submitted answer moved the interview to.
enum Advance {
    Next { turn: Turn, duplicate: bool },
    Waiting,
    Done { duplicate: bool },
}

impl InterviewEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        generation: GenerationClient,
        entitlements: Arc<dyn EntitlementService>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            generation,
            entitlements,
            settings,
        }
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Session, AppError> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Interview session {session_id} not found")))
    }

    fn question_cap(&self, session: &Session) -> u32 {
        session.question_cap(self.settings.paid_question_cap)
    }

    /// Stored targets only drive paid multi-stage sessions.
    fn stage_targets<'a>(&self, session: &'a Session) -> Option<&'a [u32]> {
        if session.is_paid() && session.is_multi_stage() {
            session.stage_targets.as_deref()
        } else {
            None
        }
    }

    fn stage_labels(session: &Session) -> &[String] {
        session
            .research
            .as_ref()
            .map(|r| r.stage_names())
            .unwrap_or(&[])
    }

    // ── start ──────────────────────────────────────────────────────────────

    pub async fn start(&self, session_id: Uuid) -> Result<StartResponse, AppError> {
        let session = self.load_session(session_id).await?;
        if !session.status.is_startable() {
            return Err(AppError::InvalidState(format!(
                "Interview {session_id} cannot be started from status '{}'",
                session.status.as_str()
            )));
        }

        if session.status == SessionStatus::Ready {
            self.store
                .transition_status(session_id, &[SessionStatus::Ready], SessionStatus::Running)
                .await?;
        }

        if session.is_paid() && session.is_multi_stage() && session.stage_targets.is_none() {
            let targets = stages::generate_stage_targets(session.stages_planned);
            if self
                .store
                .set_stage_targets_if_absent(session_id, &targets)
                .await?
            {
                info!("Planned stage targets {targets:?} for session {session_id}");
            }
        }

        // Re-read so concurrent starts converge on the stored status and targets.
        let session = self.load_session(session_id).await?;
        let mut turns = self.store.list_turns(session_id).await?;

        if turns.is_empty() {
            self.open_interview(&session).await?;
            turns = self.store.list_turns(session_id).await?;
        } else if progress::first_unanswered(&turns).is_none()
            && !turns.iter().any(|t| t.turn_type == TurnType::Question)
        {
            // Warm-up finished but the opening question was never persisted.
            self.generate_opening_question(&session, &turns).await?;
            turns = self.store.list_turns(session_id).await?;
        }

        let intro_text = if session.is_paid() {
            Some(self.cached_intro(&session).await?)
        } else {
            None
        };

        let labels = Self::stage_labels(&session);
        let warm_up: Vec<TurnView> = turns
            .iter()
            .filter(|t| t.turn_type == TurnType::SmallTalk && !t.is_answered())
            .map(|t| TurnView::new(t, labels))
            .collect();
        let current = match progress::first_unanswered(&turns) {
            Some(t) if t.turn_type == TurnType::SmallTalk => turns
                .iter()
                .find(|c| c.turn_type == TurnType::Confirmation && !c.is_answered())
                .or(Some(t)),
            other => other,
        };

        info!(
            "Started session {session_id} ({} tier, {} turns)",
            session.plan_tier.as_str(),
            turns.len()
        );

        Ok(StartResponse {
            session_id,
            status: session.status,
            intro_text,
            warm_up,
            current_turn: current.map(|t| TurnView::new(t, labels)),
            current_stage: session.current_stage,
            stage_name: stages::stage_name(session.current_stage, labels),
            stages_planned: session.stages_planned,
            stage_targets: session.stage_targets.clone(),
            question_cap: self.question_cap(&session),
        })
    }

    /// Creates the first turns of an empty session: warm-up plus confirmation
    /// for paid sessions that have not progressed, otherwise the opening
    /// question.
    async fn open_interview(&self, session: &Session) -> Result<(), AppError> {
        let warm_up = session.is_paid() && session.difficulty_curve.is_empty();
        if !warm_up {
            return self.generate_opening_question(session, &[]).await;
        }

        let research = session.research()?;
        let small_talk =
            narrative::generate_small_talk(&self.generation, session.plan_tier, research).await;

        let mut turns: Vec<Turn> = small_talk
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                Turn::new(
                    session.id,
                    i as u32,
                    TurnType::SmallTalk,
                    1,
                    Question::conversational(text),
                    None,
                )
            })
            .collect();
        turns.push(Turn::new(
            session.id,
            turns.len() as u32,
            TurnType::Confirmation,
            1,
            Question::conversational(narrative::confirmation_text(research)),
            None,
        ));

        if !self.store.insert_turns(&turns).await? {
            debug!("Session {} was opened concurrently", session.id);
        }
        Ok(())
    }

    /// Generates and persists the first scored question. The curve gets its
    /// baseline entry plus one entry for the question.
    async fn generate_opening_question(
        &self,
        session: &Session,
        turns: &[Turn],
    ) -> Result<(), AppError> {
        let research = session.research()?;
        let cap = self.question_cap(session);
        let labels = research.stage_names();

        let request = QuestionRequest {
            research,
            conversation_summary: &session.conversation_summary,
            prior_turns: turns,
            question_index: 0,
            total_questions: cap,
            stage: StageContext {
                index: session.current_stage,
                name: stages::stage_name(session.current_stage, labels),
                position: 1,
                total_stages: session.stages_planned,
            },
            mode: session.mode,
            forced_difficulty: None,
        };
        let question = generate_question(&self.generation, &request).await?;

        let turn = Turn::new(
            session.id,
            next_turn_index(turns),
            TurnType::Question,
            session.current_stage,
            question,
            None,
        );
        let opening = difficulty::band_for_index(0, cap);
        let mut curve = Vec::with_capacity(2);
        if session.difficulty_curve.is_empty() {
            curve.push(difficulty::baseline(opening));
        }
        curve.push(DifficultyAdjustment {
            turn_index: turn.turn_index,
            previous: session.current_difficulty().unwrap_or(opening),
            new: turn.question.difficulty,
            quality: None,
            reason: format!("Opening question at {}", turn.question.difficulty.as_str()),
            recorded_at: Utc::now(),
        });

        let mut all = turns.to_vec();
        all.push(turn.clone());
        let commit = TurnCommit {
            turn,
            curve,
            advance_to: None,
            progress: self.snapshot(session, &all, None),
        };
        if !self.store.commit_turn(&commit).await? {
            debug!("Opening question for session {} already exists", session.id);
        }
        Ok(())
    }

    // ── submitAnswer ───────────────────────────────────────────────────────

    pub async fn submit_answer(
        &self,
        session_id: Uuid,
        submission: AnswerSubmission,
    ) -> Result<SubmitResponse, AppError> {
        if submission.answer_text.trim().is_empty() && submission.audio_key.is_none() {
            return Err(AppError::Validation(
                "An answer needs answer_text or audio_key".to_string(),
            ));
        }

        let session = self.load_session(session_id).await?;
        let turns = self.store.list_turns(session_id).await?;
        let turn = turns
            .iter()
            .find(|t| t.id == submission.turn_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Turn {} not found in session {session_id}",
                    submission.turn_id
                ))
            })?;

        if !matches!(session.status, SessionStatus::Running) {
            if turn.is_answered()
                && matches!(
                    session.status,
                    SessionStatus::Feedback | SessionStatus::Complete
                )
            {
                return Ok(self.respond(&session, Advance::Done { duplicate: true }));
            }
            return Err(AppError::InvalidState(format!(
                "Interview {session_id} is not running (status '{}')",
                session.status.as_str()
            )));
        }

        if turn.is_answered() {
            if let Some(next) = following_turn(&turns, turn) {
                debug!("Turn {} already answered; replaying", turn.id);
                return Ok(self.respond(
                    &session,
                    Advance::Next {
                        turn: next.clone(),
                        duplicate: true,
                    },
                ));
            }
        }

        let claim_id = match self
            .store
            .claim_submission(session_id, submission.turn_id, self.settings.submission_lock_ttl)
            .await?
        {
            SubmissionClaim::Acquired(claim_id) => claim_id,
            SubmissionClaim::Held { turn_id } if turn_id == Some(submission.turn_id) => {
                info!(
                    "Turn {} of session {session_id} is already being submitted",
                    submission.turn_id
                );
                return Ok(SubmitResponse {
                    done: false,
                    next_question: None,
                    turn_id: None,
                    bridge_text: None,
                    current_stage: session.current_stage,
                    stage_name: stages::stage_name(
                        session.current_stage,
                        Self::stage_labels(&session),
                    ),
                    duplicate: true,
                });
            }
            SubmissionClaim::Held { .. } => {
                return Err(AppError::InvalidState(format!(
                    "Another answer for interview {session_id} is being processed; resend turn {}",
                    submission.turn_id
                )));
            }
        };

        let outcome = self.submit_claimed(session_id, &submission).await;

        if let Err(e) = self.store.release_submission(session_id, claim_id).await {
            warn!("Failed to release submission claim for session {session_id}: {e}");
        }
        outcome
    }

    /// Runs with the session's submission claim held.
    async fn submit_claimed(
        &self,
        session_id: Uuid,
        submission: &AnswerSubmission,
    ) -> Result<SubmitResponse, AppError> {
        // State may have moved between the first read and the claim.
        let session = self.load_session(session_id).await?;
        let turns = self.store.list_turns(session_id).await?;
        let turn = turns
            .iter()
            .find(|t| t.id == submission.turn_id)
            .ok_or_else(|| AppError::NotFound(format!("Turn {} not found", submission.turn_id)))?;

        if turn.is_answered() {
            if let Some(next) = following_turn(&turns, turn) {
                return Ok(self.respond(
                    &session,
                    Advance::Next {
                        turn: next.clone(),
                        duplicate: true,
                    },
                ));
            }
            // Answered with nothing after it: an earlier attempt failed before
            // the next turn was persisted. Resume the advance.
            info!("Resuming advance after turn {} for session {session_id}", turn.id);
        } else {
            self.record_answer(&session, &turns, turn, submission).await?;
        }

        // Advance against the stored state, including the answer just written.
        let session = self.load_session(session_id).await?;
        let turns = self.store.list_turns(session_id).await?;
        let turn = turns
            .iter()
            .find(|t| t.id == submission.turn_id)
            .ok_or_else(|| AppError::NotFound(format!("Turn {} not found", submission.turn_id)))?;

        let advance = match turn.turn_type {
            TurnType::SmallTalk => match progress::first_unanswered(&turns) {
                Some(next) => Advance::Next {
                    turn: next.clone(),
                    duplicate: false,
                },
                None => self.after_confirmation(&session, &turns).await?,
            },
            TurnType::Confirmation => self.after_confirmation(&session, &turns).await?,
            TurnType::Question => self.after_question(&session, &turns, turn).await?,
        };

        let session = self.load_session(session_id).await?;
        Ok(self.respond(&session, advance))
    }

    /// Attaches the answer with timing and digest, then folds the digest into
    /// the rolling summary.
    async fn record_answer(
        &self,
        session: &Session,
        turns: &[Turn],
        turn: &Turn,
        submission: &AnswerSubmission,
    ) -> Result<(), AppError> {
        let answer_text = submission.answer_text.trim().to_string();
        let digest = digest_answer(&self.generation, &turn.question.text, &answer_text).await;
        let completed_at = Utc::now();
        let attachment = AnswerAttachment {
            answer_text,
            audio_key: submission.audio_key.clone(),
            digest: digest.clone(),
            completed_at,
            duration_secs: (completed_at - turn.timing.started_at).num_seconds().max(0),
            reveal_count: submission.reveal_count.unwrap_or(0),
        };

        let answered = turns.iter().filter(|t| t.is_answered()).count() as u32 + 1;
        let summary = append_entry(&session.conversation_summary, answered, &digest.summary);

        if !self
            .store
            .record_answer(session.id, turn.id, &attachment, &summary)
            .await?
        {
            debug!("Turn {} was answered concurrently", turn.id);
            return Ok(());
        }
        debug!(
            "Recorded answer to turn {} ({} words)",
            turn.turn_index, digest.word_count
        );
        Ok(())
    }

    /// After the confirmation: the existing opening question, or a new one.
    async fn after_confirmation(
        &self,
        session: &Session,
        turns: &[Turn],
    ) -> Result<Advance, AppError> {
        if let Some(existing) = turns.iter().find(|t| t.turn_type == TurnType::Question) {
            let next = progress::first_unanswered(turns).unwrap_or(existing);
            return Ok(Advance::Next {
                turn: next.clone(),
                duplicate: false,
            });
        }

        self.generate_opening_question(session, turns).await?;
        let turns = self.store.list_turns(session.id).await?;
        Ok(
            match turns.iter().find(|t| t.turn_type == TurnType::Question) {
                Some(turn) => Advance::Next {
                    turn: turn.clone(),
                    duplicate: false,
                },
                None => Advance::Waiting,
            },
        )
    }

    /// After a scored answer: finish at the cap, otherwise adapt difficulty,
    /// plan the stage, generate the next question and its bridge.
    async fn after_question(
        &self,
        session: &Session,
        turns: &[Turn],
        answered_turn: &Turn,
    ) -> Result<Advance, AppError> {
        let cap = self.question_cap(session);
        let answered = turns
            .iter()
            .filter(|t| t.turn_type == TurnType::Question && t.is_answered())
            .count() as u32;

        if answered >= cap {
            self.finish(session, turns, answered_turn).await?;
            return Ok(Advance::Done { duplicate: false });
        }

        let research = session.research()?;
        let answer_text = answered_turn.answer_text.as_deref().unwrap_or("");
        let assessment = assess_answer(answer_text, answered_turn.question.category);
        let current = session
            .current_difficulty()
            .unwrap_or(answered_turn.question.difficulty);
        let next_index = next_turn_index(turns);
        let adjustment = difficulty::adjust(
            current,
            assessment.quality,
            answered,
            cap,
            next_index,
        );
        debug!(
            "Answer to turn {} assessed {} (score {}); {}",
            answered_turn.turn_index,
            assessment.quality.as_str(),
            assessment.signals.score,
            adjustment.reason
        );

        let answered_in_stage = turns
            .iter()
            .filter(|t| {
                t.turn_type == TurnType::Question && t.is_answered() && t.stage == session.current_stage
            })
            .count() as u32;
        let per_stage = stages::planned_per_stage(cap, session.stages_planned);
        let advancing = stages::should_advance(
            session.current_stage,
            session.stages_planned,
            answered_in_stage,
            per_stage,
            self.stage_targets(session),
        );
        let stage = if advancing {
            session.current_stage + 1
        } else {
            session.current_stage
        };
        let labels = research.stage_names();
        let stage_name = stages::stage_name(stage, labels);

        let request = QuestionRequest {
            research,
            conversation_summary: &session.conversation_summary,
            prior_turns: turns,
            question_index: answered,
            total_questions: cap,
            stage: StageContext {
                index: stage,
                name: stage_name.clone(),
                position: if advancing { 1 } else { answered_in_stage + 1 },
                total_stages: session.stages_planned,
            },
            mode: session.mode,
            forced_difficulty: Some(adjustment.new),
        };
        let question = generate_question(&self.generation, &request).await?;

        let bridge = narrative::generate_bridge(
            &self.generation,
            session.plan_tier,
            &BridgeRequest {
                previous_question: &answered_turn.question.text,
                answer: answer_text,
                next_question: &question.text,
                entering_stage: advancing.then_some(stage_name.as_str()),
                mode: session.mode,
            },
        )
        .await;

        let turn = Turn::new(
            session.id,
            next_index,
            TurnType::Question,
            stage,
            question,
            (!bridge.is_empty()).then_some(bridge),
        );
        let mut all = turns.to_vec();
        all.push(turn.clone());
        let commit = TurnCommit {
            curve: vec![DifficultyAdjustment {
                new: turn.question.difficulty,
                ..adjustment
            }],
            advance_to: advancing.then_some(stage),
            progress: self.snapshot(session, &all, Some(answered_turn.id)),
            turn: turn.clone(),
        };
        if !self.store.commit_turn(&commit).await? {
            // Another request won the index; converge on its turn.
            let latest = self.store.list_turns(session.id).await?;
            return Ok(match latest.into_iter().find(|t| t.turn_index == next_index) {
                Some(existing) => Advance::Next {
                    turn: existing,
                    duplicate: true,
                },
                None => Advance::Waiting,
            });
        }

        if advancing {
            info!("Session {} advanced to stage {stage} ({stage_name})", session.id);
        }

        Ok(Advance::Next {
            turn,
            duplicate: false,
        })
    }

    /// Cap reached: move to feedback and, for paid sessions, consume one
    /// entitlement credit exactly once.
    async fn finish(
        &self,
        session: &Session,
        turns: &[Turn],
        answered_turn: &Turn,
    ) -> Result<(), AppError> {
        // Snapshot first: a failed write leaves the session running, so a retry
        // comes back through here.
        self.persist_progress(session, turns, Some(answered_turn.id))
            .await?;
        let moved = self
            .store
            .transition_status(session.id, &[SessionStatus::Running], SessionStatus::Feedback)
            .await?;
        if !moved {
            return Ok(());
        }
        info!(
            "Session {} reached its question cap; moving to feedback",
            session.id
        );

        if !session.is_paid() || session.entitlement_consumed_at.is_some() {
            return Ok(());
        }
        let Some(entitlement_id) = session.entitlement_id else {
            warn!("Paid session {} has no entitlement to consume", session.id);
            return Ok(());
        };

        match self
            .entitlements
            .consume(entitlement_id, session.user_id, session.id)
            .await
        {
            Ok(outcome) => {
                self.store
                    .mark_entitlement_consumed(session.id, Utc::now())
                    .await?;
                info!(
                    "Consumed entitlement {entitlement_id} for session {} ({} credits left)",
                    session.id, outcome.remaining_credits
                );
            }
            Err(e) => {
                error!(
                    session_id = %session.id,
                    user_id = %session.user_id,
                    entitlement_id = %entitlement_id,
                    "Entitlement consumption failed; needs reconciliation: {e}"
                );
            }
        }
        Ok(())
    }

    fn respond(&self, session: &Session, advance: Advance) -> SubmitResponse {
        let labels = Self::stage_labels(session);
        let stage_name = stages::stage_name(session.current_stage, labels);
        match advance {
            Advance::Next { turn, duplicate } => SubmitResponse {
                done: false,
                turn_id: Some(turn.id),
                bridge_text: turn.bridge_text.clone(),
                next_question: Some(TurnView::new(&turn, labels)),
                current_stage: session.current_stage,
                stage_name,
                duplicate,
            },
            Advance::Waiting => SubmitResponse {
                done: false,
                next_question: None,
                turn_id: None,
                bridge_text: None,
                current_stage: session.current_stage,
                stage_name,
                duplicate: false,
            },
            Advance::Done { duplicate } => SubmitResponse {
                done: true,
                next_question: None,
                turn_id: None,
                bridge_text: None,
                current_stage: session.current_stage,
                stage_name,
                duplicate,
            },
        }
    }

    // ── progress ───────────────────────────────────────────────────────────

    fn snapshot(
        &self,
        session: &Session,
        turns: &[Turn],
        last_completed: Option<Uuid>,
    ) -> ResumeProgressState {
        progress::build_snapshot(
            turns,
            None,
            last_completed,
            self.question_cap(session),
            Utc::now(),
        )
    }

    async fn persist_progress(
        &self,
        session: &Session,
        turns: &[Turn],
        last_completed: Option<Uuid>,
    ) -> Result<(), AppError> {
        let snapshot = self.snapshot(session, turns, last_completed);
        self.store.save_progress(session.id, &snapshot).await
    }

    /// Writes a resume snapshot. Counts and phase are recomputed from the turn
    /// list; a client-supplied phase that disagrees is logged and ignored.
    pub async fn save_progress(
        &self,
        session_id: Uuid,
        hint: ProgressHint,
    ) -> Result<ResumeProgressState, AppError> {
        let session = self.load_session(session_id).await?;
        if session.status == SessionStatus::Complete {
            return Err(AppError::InvalidState(format!(
                "Interview {session_id} is complete"
            )));
        }
        let turns = self.store.list_turns(session_id).await?;
        let snapshot = progress::build_snapshot(
            &turns,
            hint.current_turn_id,
            hint.last_completed_turn_id,
            self.question_cap(&session),
            Utc::now(),
        );

        if let Some(phase) = hint.phase.filter(|p| *p != snapshot.interview_phase) {
            warn!(
                "Session {session_id}: client phase {phase:?} disagrees with derived {:?}",
                snapshot.interview_phase
            );
        }
        if let Some(index) = hint.turn_index.filter(|i| *i != snapshot.turn_index) {
            debug!(
                "Session {session_id}: client turn index {index} replaced by {}",
                snapshot.turn_index
            );
        }

        self.store.save_progress(session_id, &snapshot).await?;
        Ok(snapshot)
    }

    /// Periodic idle snapshot with pointers derived from the turn list.
    pub async fn auto_save(&self, session_id: Uuid) -> Result<ResumeProgressState, AppError> {
        self.save_progress(session_id, ProgressHint::default()).await
    }

    pub async fn get_resume_data(&self, session_id: Uuid) -> Result<ResumeData, AppError> {
        let session = self.load_session(session_id).await?;
        let turns = self.store.list_turns(session_id).await?;
        Ok(progress::resume_data(&session, &turns, Utc::now()))
    }

    /// Terminal transition from `feedback`. Repeating it is a no-op.
    pub async fn mark_complete(&self, session_id: Uuid) -> Result<SessionState, AppError> {
        let moved = self
            .store
            .transition_status(session_id, &[SessionStatus::Feedback], SessionStatus::Complete)
            .await?;
        if !moved {
            let session = self.load_session(session_id).await?;
            if session.status != SessionStatus::Complete {
                return Err(AppError::InvalidState(format!(
                    "Interview {session_id} cannot complete from status '{}'",
                    session.status.as_str()
                )));
            }
        }
        self.store.clear_progress(session_id).await?;
        self.get_state(session_id).await
    }

    // ── read side ──────────────────────────────────────────────────────────

    pub async fn get_state(&self, session_id: Uuid) -> Result<SessionState, AppError> {
        let session = self.load_session(session_id).await?;
        let turns = self.store.list_turns(session_id).await?;
        let labels = Self::stage_labels(&session);
        let current_turn = progress::first_unanswered(&turns).map(|t| TurnView::new(t, labels));

        Ok(SessionState {
            session: SessionView {
                id: session.id,
                status: session.status,
                plan_tier: session.plan_tier,
                mode: session.mode,
                stages_planned: session.stages_planned,
                current_stage: session.current_stage,
                stage_name: stages::stage_name(session.current_stage, labels),
                stage_targets: session.stage_targets.clone(),
                question_cap: self.question_cap(&session),
                conversation_summary: session.conversation_summary.clone(),
                difficulty_curve: session.difficulty_curve.clone(),
                progress_state: session.progress_state.clone(),
                intro_text: session.intro_text.clone(),
                last_activity_at: session.last_activity_at,
            },
            turns,
            current_turn,
        })
    }

    /// Paid-tier opening narrative, generated on first access and cached.
    pub async fn get_intro(&self, session_id: Uuid) -> Result<IntroResponse, AppError> {
        let session = self.load_session(session_id).await?;
        Ok(IntroResponse {
            intro_text: self.cached_intro(&session).await?,
        })
    }

    async fn cached_intro(&self, session: &Session) -> Result<String, AppError> {
        if let Some(intro) = session.intro_text.as_deref().filter(|i| !i.is_empty()) {
            return Ok(intro.to_string());
        }
        if session.plan_tier == PlanTier::Free {
            return Ok(String::new());
        }

        let intro = narrative::generate_intro(
            &self.generation,
            session.plan_tier,
            session.research()?,
            session.mode,
        )
        .await;
        if intro.is_empty() {
            // Degraded: leave uncached so the next access retries.
            return Ok(intro);
        }
        self.store.set_intro_if_absent(session.id, &intro).await
    }

    /// "Start fresh": drops every turn and returns the session to `ready`.
    pub async fn restart(&self, session_id: Uuid) -> Result<SessionState, AppError> {
        let session = self.load_session(session_id).await?;
        if !session.status.is_startable() || !self.store.reset_session(session_id).await? {
            return Err(AppError::InvalidState(format!(
                "Interview {session_id} cannot restart from status '{}'",
                session.status.as_str()
            )));
        }
        info!("Session {session_id} restarted");
        self.get_state(session_id).await
    }
}

fn next_turn_index(turns: &[Turn]) -> u32 {
    turns.last().map(|t| t.turn_index + 1).unwrap_or(0)
}

fn following_turn<'a>(turns: &'a [Turn], turn: &Turn) -> Option<&'a Turn> {
    turns.iter().find(|t| t.turn_index == turn.turn_index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::models::{AnswerQuality, QuestionCategory, SessionLimits};
    use crate::interview::summary::MAX_SUMMARY_BYTES;
    use crate::interview::test_support::{
        question_json, session_fixture, InMemoryStore, RecordingEntitlements, ScriptedGenerator,
    };

    const STRONG_ANSWER: &str = "My approach would be to put a read-through cache in \
        front of the database and add an index on the hot query. For example, at my \
        current company we saw p99 latency of 800ms on the orders API. After profiling \
        the query plan we added a composite index and a Redis cache with a 30 second TTL, \
        which cut latency to 90ms and raised throughput roughly 4x. I learned that \
        measuring before changing the architecture saves a lot of wasted effort.";

    const WEAK_ANSWER: &str = "I am not really sure about that one.";

    struct Harness {
        engine: InterviewEngine,
        store: Arc<InMemoryStore>,
        generator: Arc<ScriptedGenerator>,
        entitlements: Arc<RecordingEntitlements>,
    }

    fn harness(generator: ScriptedGenerator) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let generator = Arc::new(generator);
        let entitlements = RecordingEntitlements::new();
        let engine = InterviewEngine::new(
            store.clone(),
            GenerationClient::new(generator.clone()),
            entitlements.clone(),
            EngineSettings {
                paid_question_cap: 10,
                submission_lock_ttl: Duration::seconds(120),
            },
        );
        Harness {
            engine,
            store,
            generator,
            entitlements,
        }
    }

    fn submission(turn_id: Uuid, answer: &str) -> AnswerSubmission {
        AnswerSubmission {
            turn_id,
            answer_text: answer.to_string(),
            audio_key: None,
            reveal_count: Some(1),
        }
    }

    impl Harness {
        fn add_session(&self, session: Session) -> Uuid {
            let id = session.id;
            self.store.insert_session(session);
            id
        }

        fn pending_turn(&self, session_id: Uuid) -> Turn {
            self.store
                .turns(session_id)
                .into_iter()
                .find(|t| !t.is_answered())
                .expect("an unanswered turn")
        }

        async fn answer_next(&self, session_id: Uuid, answer: &str) -> SubmitResponse {
            let turn = self.pending_turn(session_id);
            self.engine
                .submit_answer(session_id, submission(turn.id, answer))
                .await
                .unwrap()
        }

        fn question_turns(&self, session_id: Uuid) -> Vec<Turn> {
            self.store
                .turns(session_id)
                .into_iter()
                .filter(|t| t.turn_type == TurnType::Question)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_free_tier_caps_at_three_without_entitlement_call() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Free, 1));

        let start = h.engine.start(id).await.unwrap();
        assert_eq!(start.intro_text, None);
        assert!(start.warm_up.is_empty());
        assert_eq!(
            start.current_turn.as_ref().map(|t| t.turn_type),
            Some(TurnType::Question)
        );

        assert!(!h.answer_next(id, WEAK_ANSWER).await.done);
        assert!(!h.answer_next(id, WEAK_ANSWER).await.done);
        let last = h.answer_next(id, STRONG_ANSWER).await;
        assert!(last.done);

        let session = h.store.session(id);
        assert_eq!(session.status, SessionStatus::Feedback);
        assert_eq!(h.entitlements.call_count(), 0);
        assert_eq!(h.question_turns(id).len(), 3);
        assert!(h
            .store
            .turns(id)
            .iter()
            .all(|t| t.bridge_text.is_none() && t.turn_type == TurnType::Question));
        assert_eq!(h.generator.calls_matching("short transition"), 0);
        assert_eq!(h.generator.calls_matching("warm-up"), 0);
        assert_eq!(h.generator.calls_matching("professional opening"), 0);
    }

    #[tokio::test]
    async fn test_curve_has_one_entry_per_question_plus_baseline() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Free, 1));
        h.engine.start(id).await.unwrap();
        assert_eq!(h.store.session(id).difficulty_curve.len(), 2);

        let mut previous = h.store.session(id).difficulty_curve;
        for answer in [STRONG_ANSWER, WEAK_ANSWER, STRONG_ANSWER] {
            h.answer_next(id, answer).await;
            let curve = h.store.session(id).difficulty_curve;
            assert_eq!(&curve[..previous.len()], previous.as_slice());
            previous = curve;
        }

        let curve = h.store.session(id).difficulty_curve;
        assert_eq!(curve.len(), h.question_turns(id).len() + 1);
        assert_eq!(curve[0].quality, None);
        assert_eq!(curve[2].quality, Some(AnswerQuality::Strong));
        // The generated question carries the forced difficulty.
        let second = &h.question_turns(id)[1];
        assert_eq!(second.question.difficulty, curve[2].new);
    }

    #[tokio::test]
    async fn test_paid_start_creates_warm_up_and_confirmation() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Paid, 1));

        let start = h.engine.start(id).await.unwrap();
        assert_eq!(start.status, SessionStatus::Running);
        assert_eq!(start.warm_up.len(), 1);
        assert_eq!(start.warm_up[0].question_text, "How has your week been?");
        let current = start.current_turn.unwrap();
        assert_eq!(current.turn_type, TurnType::Confirmation);
        assert!(current.question_text.contains("Backend Engineer"));
        assert_eq!(start.intro_text.as_deref(), Some("Welcome to your mock interview."));

        // Small talk hands over to the confirmation without generating.
        let questions_before = h.generator.calls_matching("EXACT schema");
        let after_small_talk = h.answer_next(id, "Pretty good, busy week.").await;
        assert_eq!(
            after_small_talk.next_question.map(|t| t.turn_type),
            Some(TurnType::Confirmation)
        );
        assert_eq!(h.generator.calls_matching("EXACT schema"), questions_before);

        let after_confirmation = h.answer_next(id, "Yes, ready.").await;
        let first = after_confirmation.next_question.unwrap();
        assert_eq!(first.turn_type, TurnType::Question);
        assert_eq!(first.turn_index, 2);
        assert!(after_confirmation.bridge_text.is_none());
    }

    #[tokio::test]
    async fn test_repeated_start_keeps_stage_targets_and_turns() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Paid, 3));

        let first = h.engine.start(id).await.unwrap();
        let targets = first.stage_targets.clone().unwrap();
        assert_eq!(targets.len(), 3);
        assert!(targets.iter().all(|t| (5..=8).contains(t)));
        let turn_count = h.store.turns(id).len();

        for _ in 0..3 {
            let again = h.engine.start(id).await.unwrap();
            assert_eq!(again.stage_targets.as_ref(), Some(&targets));
        }
        assert_eq!(h.store.turns(id).len(), turn_count);
        assert_eq!(h.generator.calls_matching("warm-up"), 1);
        assert_eq!(h.generator.calls_matching("professional opening"), 1);
    }

    #[tokio::test]
    async fn test_free_multi_stage_session_gets_no_targets() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Free, 2));
        let start = h.engine.start(id).await.unwrap();
        assert_eq!(start.stage_targets, None);
    }

    #[tokio::test]
    async fn test_start_rejects_complete_session_and_missing_session() {
        let h = harness(ScriptedGenerator::interviewer());
        let mut session = session_fixture(PlanTier::Free, 1);
        session.status = SessionStatus::Complete;
        let id = h.add_session(session);

        assert!(matches!(
            h.engine.start(id).await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            h.engine.start(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sixth_question_enters_stage_two_with_coerced_category() {
        let generator = ScriptedGenerator::interviewer();
        generator.respond_with("EXACT schema", |n| {
            Ok(question_json(&format!("Situational question {n}?"), "situational", "medium"))
        });
        let h = harness(generator);

        let mut session = session_fixture(PlanTier::Paid, 2);
        session.stage_targets = Some(vec![5, 6]);
        session.limits = SessionLimits {
            question_cap: Some(11),
        };
        let id = h.add_session(session);

        h.engine.start(id).await.unwrap();
        h.answer_next(id, "Good thanks.").await;
        let first = h.answer_next(id, "Ready.").await.next_question.unwrap();
        assert_eq!(first.stage, 1);
        assert_eq!(first.category, QuestionCategory::Technical.as_str());

        let mut response = None;
        for _ in 0..5 {
            response = Some(h.answer_next(id, STRONG_ANSWER).await);
        }
        let response = response.unwrap();
        let sixth = response.next_question.unwrap();

        assert_eq!(h.question_turns(id).len(), 6);
        assert_eq!(sixth.stage, 2);
        assert_eq!(sixth.category, QuestionCategory::Behavioral.as_str());
        assert_eq!(response.current_stage, 2);
        assert_eq!(response.stage_name, "Behavioral");
        assert_eq!(h.store.session(id).current_stage, 2);

        let bridge_prompt = h.generator.prompts_matching("short transition");
        assert!(bridge_prompt
            .last()
            .unwrap()
            .contains("moving to a new stage: Behavioral"));
        assert!(!bridge_prompt[0].contains("moving to a new stage"));
    }

    #[tokio::test]
    async fn test_replayed_submission_creates_one_next_turn() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Free, 1));
        h.engine.start(id).await.unwrap();
        let turn = h.pending_turn(id);

        let (a, b) = tokio::join!(
            h.engine.submit_answer(id, submission(turn.id, STRONG_ANSWER)),
            h.engine.submit_answer(id, submission(turn.id, STRONG_ANSWER)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(h.question_turns(id).len(), 2);
        assert_eq!(a.turn_id, b.turn_id);
        assert!(a.duplicate != b.duplicate);
        assert_eq!(
            h.store
                .turns(id)
                .iter()
                .filter(|t| t.is_answered())
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_in_flight_claim_turns_submission_into_noop() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Free, 1));
        h.engine.start(id).await.unwrap();
        let turn = h.pending_turn(id);

        assert!(matches!(
            h.store
                .claim_submission(id, turn.id, Duration::seconds(120))
                .await
                .unwrap(),
            SubmissionClaim::Acquired(_)
        ));
        let response = h
            .engine
            .submit_answer(id, submission(turn.id, STRONG_ANSWER))
            .await
            .unwrap();

        assert!(response.duplicate);
        assert!(response.next_question.is_none());
        assert!(!h.store.turns(id)[0].is_answered());
        assert_eq!(h.question_turns(id).len(), 1);
    }

    #[tokio::test]
    async fn test_claim_for_another_turn_rejects_instead_of_dropping() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Paid, 1));
        h.engine.start(id).await.unwrap();
        let turns = h.store.turns(id);
        assert!(turns.len() >= 2);

        h.store
            .claim_submission(id, turns[0].id, Duration::seconds(120))
            .await
            .unwrap();
        let result = h
            .engine
            .submit_answer(id, submission(turns[1].id, "Yes, ready to start."))
            .await;

        assert!(matches!(result, Err(AppError::InvalidState(_))));
        assert!(!h.store.turns(id)[1].is_answered());
    }

    #[tokio::test]
    async fn test_release_only_clears_its_own_claim() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Free, 1));
        let turn_id = Uuid::new_v4();
        let ttl = Duration::seconds(120);

        let SubmissionClaim::Acquired(first) =
            h.store.claim_submission(id, turn_id, ttl).await.unwrap()
        else {
            panic!("first claim should be acquired");
        };
        // Negative staleness window: the first claim counts as abandoned.
        let SubmissionClaim::Acquired(second) = h
            .store
            .claim_submission(id, turn_id, Duration::seconds(-1))
            .await
            .unwrap()
        else {
            panic!("stale claim should be taken over");
        };

        h.store.release_submission(id, first).await.unwrap();
        assert_eq!(
            h.store.claim_submission(id, turn_id, ttl).await.unwrap(),
            SubmissionClaim::Held {
                turn_id: Some(turn_id)
            }
        );

        h.store.release_submission(id, second).await.unwrap();
        assert!(matches!(
            h.store.claim_submission(id, turn_id, ttl).await.unwrap(),
            SubmissionClaim::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_failed_advance_write_is_repaired_by_retry() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Free, 1));
        h.engine.start(id).await.unwrap();
        let turn = h.pending_turn(id);

        h.store.fail_next("commit_turn");
        let failed = h
            .engine
            .submit_answer(id, submission(turn.id, STRONG_ANSWER))
            .await;
        assert!(matches!(failed, Err(AppError::Internal(_))));
        assert_eq!(h.question_turns(id).len(), 1);
        assert_eq!(h.store.session(id).difficulty_curve.len(), 2);

        let retried = h
            .engine
            .submit_answer(id, submission(turn.id, STRONG_ANSWER))
            .await
            .unwrap();
        assert!(!retried.duplicate);
        assert!(retried.next_question.is_some());
        assert_eq!(h.question_turns(id).len(), 2);
        assert_eq!(h.store.session(id).difficulty_curve.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_opening_write_leaves_session_startable() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Free, 1));

        h.store.fail_next("commit_turn");
        assert!(h.engine.start(id).await.is_err());
        assert!(h.store.turns(id).is_empty());
        assert!(h.store.session(id).difficulty_curve.is_empty());

        h.engine.start(id).await.unwrap();
        assert_eq!(h.question_turns(id).len(), 1);
        assert_eq!(h.store.session(id).difficulty_curve.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_answer_write_keeps_summary_in_step() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Free, 1));
        h.engine.start(id).await.unwrap();
        let turn = h.pending_turn(id);

        h.store.fail_next("record_answer");
        assert!(h
            .engine
            .submit_answer(id, submission(turn.id, STRONG_ANSWER))
            .await
            .is_err());
        assert!(!h.store.turns(id)[0].is_answered());
        assert!(h.store.session(id).conversation_summary.is_empty());

        h.engine
            .submit_answer(id, submission(turn.id, STRONG_ANSWER))
            .await
            .unwrap();
        h.answer_next(id, STRONG_ANSWER).await;

        let answered = h
            .store
            .turns(id)
            .iter()
            .filter(|t| t.is_answered())
            .count();
        let summary = h.store.session(id).conversation_summary;
        assert_eq!(answered, 2);
        assert_eq!(summary.lines().count(), answered);
        assert!(summary.starts_with("1. "));
    }

    #[tokio::test]
    async fn test_failed_snapshot_at_cap_finishes_on_retry() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Free, 1));
        h.engine.start(id).await.unwrap();
        h.answer_next(id, STRONG_ANSWER).await;
        h.answer_next(id, STRONG_ANSWER).await;
        let last = h.pending_turn(id);

        h.store.fail_next("save_progress");
        assert!(h
            .engine
            .submit_answer(id, submission(last.id, STRONG_ANSWER))
            .await
            .is_err());
        assert_eq!(h.store.session(id).status, SessionStatus::Running);

        let retried = h
            .engine
            .submit_answer(id, submission(last.id, STRONG_ANSWER))
            .await
            .unwrap();
        assert!(retried.done);
        assert_eq!(h.store.session(id).status, SessionStatus::Feedback);
        assert_eq!(h.question_turns(id).len(), 3);
    }

    #[tokio::test]
    async fn test_question_failure_is_fatal_and_retry_recovers() {
        let generator = ScriptedGenerator::interviewer();
        generator.respond_with("EXACT schema", |n| {
            if n == 2 {
                Err(crate::llm_client::LlmError::EmptyContent)
            } else {
                Ok(question_json(&format!("Question {n}?"), "technical", "easy"))
            }
        });
        let h = harness(generator);
        let id = h.add_session(session_fixture(PlanTier::Free, 1));
        h.engine.start(id).await.unwrap();
        let turn = h.pending_turn(id);

        let failed = h
            .engine
            .submit_answer(id, submission(turn.id, STRONG_ANSWER))
            .await;
        assert!(matches!(failed, Err(AppError::GenerationFailure(_))));
        assert_eq!(h.question_turns(id).len(), 1);

        let retried = h
            .engine
            .submit_answer(id, submission(turn.id, STRONG_ANSWER))
            .await
            .unwrap();
        assert!(!retried.done);
        assert!(!retried.duplicate);
        assert_eq!(retried.next_question.unwrap().question_text, "Question 3?");
        assert_eq!(h.question_turns(id).len(), 2);
    }

    #[tokio::test]
    async fn test_bridge_failure_does_not_abort_submission() {
        let generator = ScriptedGenerator::interviewer();
        generator.fail_when("short transition");
        generator.fail_when("Summarize the candidate's answer");
        let h = harness(generator);
        let mut session = session_fixture(PlanTier::Paid, 1);
        session.difficulty_curve = vec![difficulty::baseline(Difficulty::Easy)];
        let id = h.add_session(session);

        h.engine.start(id).await.unwrap();
        let response = h.answer_next(id, STRONG_ANSWER).await;
        assert!(response.next_question.is_some());
        assert!(response.bridge_text.is_none());
        // Fallback digest is the answer's first sentence.
        assert!(h
            .store
            .session(id)
            .conversation_summary
            .starts_with("1. My approach would be"));
    }

    #[tokio::test]
    async fn test_summary_stays_under_cap_for_long_interview() {
        let generator = ScriptedGenerator::interviewer();
        generator.respond_when("Summarize the candidate's answer", &"long digest ".repeat(30));
        let h = harness(generator);
        let mut session = session_fixture(PlanTier::Free, 1);
        session.plan_tier = PlanTier::Paid;
        session.entitlement_id = Some(Uuid::new_v4());
        session.difficulty_curve = vec![difficulty::baseline(Difficulty::Easy)];
        session.limits = SessionLimits {
            question_cap: Some(14),
        };
        let id = h.add_session(session);
        h.engine.start(id).await.unwrap();

        loop {
            let response = h.answer_next(id, STRONG_ANSWER).await;
            assert!(h.store.session(id).conversation_summary.len() <= MAX_SUMMARY_BYTES);
            if response.done {
                break;
            }
        }
        assert_eq!(h.question_turns(id).len(), 14);
    }

    #[tokio::test]
    async fn test_paid_cap_consumes_entitlement_once() {
        let h = harness(ScriptedGenerator::interviewer());
        let mut session = session_fixture(PlanTier::Paid, 1);
        session.limits = SessionLimits {
            question_cap: Some(2),
        };
        let id = h.add_session(session);

        h.engine.start(id).await.unwrap();
        h.answer_next(id, "Fine.").await;
        h.answer_next(id, "Yes.").await;
        h.answer_next(id, STRONG_ANSWER).await;
        let last_turn = h.pending_turn(id);
        let done = h
            .engine
            .submit_answer(id, submission(last_turn.id, STRONG_ANSWER))
            .await
            .unwrap();
        assert!(done.done);

        let replay = h
            .engine
            .submit_answer(id, submission(last_turn.id, STRONG_ANSWER))
            .await
            .unwrap();
        assert!(replay.done && replay.duplicate);

        assert_eq!(h.entitlements.call_count(), 1);
        let session = h.store.session(id);
        assert_eq!(session.status, SessionStatus::Feedback);
        assert!(session.entitlement_consumed_at.is_some());
        // The final answer does not produce a curve entry.
        assert_eq!(session.difficulty_curve.len(), 3);
    }

    #[tokio::test]
    async fn test_entitlement_failure_still_finishes() {
        let h = harness(ScriptedGenerator::interviewer());
        h.entitlements.fail_all();
        let mut session = session_fixture(PlanTier::Paid, 1);
        session.difficulty_curve = vec![difficulty::baseline(Difficulty::Easy)];
        session.limits = SessionLimits {
            question_cap: Some(1),
        };
        let id = h.add_session(session);

        h.engine.start(id).await.unwrap();
        let response = h.answer_next(id, STRONG_ANSWER).await;
        assert!(response.done);
        let session = h.store.session(id);
        assert_eq!(session.status, SessionStatus::Feedback);
        assert!(session.entitlement_consumed_at.is_none());
        assert_eq!(h.entitlements.call_count(), 1);
    }

    #[tokio::test]
    async fn test_alternating_quality_never_escalates_three_times_running() {
        let h = harness(ScriptedGenerator::interviewer());
        let mut session = session_fixture(PlanTier::Paid, 1);
        session.difficulty_curve = vec![difficulty::baseline(Difficulty::Easy)];
        session.limits = SessionLimits {
            question_cap: Some(8),
        };
        let id = h.add_session(session);
        h.engine.start(id).await.unwrap();

        for i in 0..8 {
            let answer = if i % 2 == 0 { STRONG_ANSWER } else { WEAK_ANSWER };
            h.answer_next(id, answer).await;
        }

        let curve = h.store.session(id).difficulty_curve;
        let mut run = 0;
        for entry in &curve {
            if entry.new > entry.previous {
                run += 1;
                assert!(run <= 2, "three escalations in a row: {curve:?}");
            } else {
                run = 0;
            }
        }
    }

    #[tokio::test]
    async fn test_resume_data_tracks_first_unanswered_and_expires() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Free, 1));
        h.engine.start(id).await.unwrap();
        h.answer_next(id, STRONG_ANSWER).await;

        let resume = h.engine.get_resume_data(id).await.unwrap();
        assert!(resume.can_resume);
        assert_eq!(resume.turn_id, Some(h.pending_turn(id).id));
        assert_eq!(resume.phase, Some(InterviewPhase::Questions));

        h.store.update_session(id, |s| {
            s.last_activity_at = Utc::now() - Duration::hours(25);
        });
        let expired = h.engine.get_resume_data(id).await.unwrap();
        assert!(!expired.can_resume);

        // Auto-save refreshes the activity timestamp.
        let snapshot = h.engine.auto_save(id).await.unwrap();
        assert_eq!(snapshot.current_turn_id, Some(h.pending_turn(id).id));
        assert!(h.engine.get_resume_data(id).await.unwrap().can_resume);
    }

    #[tokio::test]
    async fn test_save_progress_ignores_wrong_phase_hint() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Paid, 1));
        h.engine.start(id).await.unwrap();

        let snapshot = h
            .engine
            .save_progress(
                id,
                ProgressHint {
                    phase: Some(InterviewPhase::Questions),
                    ..ProgressHint::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(snapshot.interview_phase, InterviewPhase::SmallTalk);
        assert_eq!(snapshot.total_expected, 2 + 10);
    }

    #[tokio::test]
    async fn test_mark_complete_only_from_feedback() {
        let h = harness(ScriptedGenerator::interviewer());
        let mut session = session_fixture(PlanTier::Free, 1);
        session.status = SessionStatus::Running;
        let id = h.add_session(session);

        assert!(matches!(
            h.engine.mark_complete(id).await,
            Err(AppError::InvalidState(_))
        ));

        h.store
            .update_session(id, |s| s.status = SessionStatus::Feedback);
        let state = h.engine.mark_complete(id).await.unwrap();
        assert_eq!(state.session.status, SessionStatus::Complete);
        assert!(state.session.progress_state.is_none());
        assert!(h.engine.mark_complete(id).await.is_ok());
        assert!(!h.engine.get_resume_data(id).await.unwrap().can_resume);
    }

    #[tokio::test]
    async fn test_restart_clears_turns_and_keeps_targets() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Paid, 2));
        let start = h.engine.start(id).await.unwrap();
        h.answer_next(id, "Fine.").await;

        let state = h.engine.restart(id).await.unwrap();
        assert_eq!(state.session.status, SessionStatus::Ready);
        assert!(state.turns.is_empty());
        assert!(state.session.difficulty_curve.is_empty());
        assert!(state.session.conversation_summary.is_empty());
        assert_eq!(state.session.stage_targets, start.stage_targets);

        let again = h.engine.start(id).await.unwrap();
        assert_eq!(again.stage_targets, start.stage_targets);
        assert_eq!(
            again.current_turn.map(|t| t.turn_type),
            Some(TurnType::Confirmation)
        );
    }

    #[tokio::test]
    async fn test_intro_is_generated_once() {
        let h = harness(ScriptedGenerator::interviewer());
        let paid = h.add_session(session_fixture(PlanTier::Paid, 1));
        let free = h.add_session(session_fixture(PlanTier::Free, 1));

        let first = h.engine.get_intro(paid).await.unwrap();
        let second = h.engine.get_intro(paid).await.unwrap();
        assert_eq!(first.intro_text, "Welcome to your mock interview.");
        assert_eq!(second.intro_text, first.intro_text);
        assert_eq!(h.generator.calls_matching("professional opening"), 1);

        assert!(h.engine.get_intro(free).await.unwrap().intro_text.is_empty());
    }

    #[tokio::test]
    async fn test_submit_validates_input() {
        let h = harness(ScriptedGenerator::interviewer());
        let id = h.add_session(session_fixture(PlanTier::Free, 1));
        h.engine.start(id).await.unwrap();

        let blank = h
            .engine
            .submit_answer(id, submission(h.pending_turn(id).id, "   "))
            .await;
        assert!(matches!(blank, Err(AppError::Validation(_))));

        let unknown = h
            .engine
            .submit_answer(id, submission(Uuid::new_v4(), STRONG_ANSWER))
            .await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));
    }
}
