//! In-memory fakes for the generation, storage and entitlement ports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::entitlement::{ConsumeOutcome, EntitlementError, EntitlementService};
use crate::interview::models::{
    AnswerAttachment, DeliveryMode, InterviewStyle, PlanTier, ResearchSnapshot,
    ResumeProgressState, Session, SessionLimits, SessionStatus, Turn,
};
use crate::interview::store::{SessionStore, SubmissionClaim, TurnCommit};
use crate::llm_client::{LlmError, TextGenerator};

// ────────────────────────────────────────────────────────────────────────────
// Text generation
// ────────────────────────────────────────────────────────────────────────────

type Responder = Box<dyn Fn(usize) -> Result<String, LlmError> + Send + Sync>;

struct Rule {
    needle: String,
    responder: Responder,
    calls: usize,
}

/// Answers prompts by substring match. The most recently registered matching
/// rule wins; an unmatched prompt fails with `EmptyContent`.
#[derive(Default)]
pub struct ScriptedGenerator {
    rules: Mutex<Vec<Rule>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Responds to every prompt an interview can issue with well-formed output.
    /// Questions come back as `technical`/`medium` with a unique text.
    pub fn interviewer() -> Self {
        let generator = Self::new();
        generator.respond_with("EXACT schema", |n| {
            Ok(question_json(&format!("Scripted question {n}?"), "technical", "medium"))
        });
        generator.respond_when("Summarize the candidate's answer", "Candidate gave an answer.");
        generator.respond_when("short transition", "Thanks, let's keep going.");
        generator.respond_when("warm-up", r#"["How has your week been?"]"#);
        generator.respond_when("professional opening", "Welcome to your mock interview.");
        generator
    }

    pub fn respond_when(&self, needle: &str, reply: &str) {
        let reply = reply.to_string();
        self.respond_with(needle, move |_| Ok(reply.clone()));
    }

    pub fn fail_when(&self, needle: &str) {
        self.respond_with(needle, |_| {
            Err(LlmError::Api {
                status: 503,
                message: "scripted outage".to_string(),
            })
        });
    }

    /// `responder` receives the 1-based count of prompts this rule has matched.
    pub fn respond_with(
        &self,
        needle: &str,
        responder: impl Fn(usize) -> Result<String, LlmError> + Send + Sync + 'static,
    ) {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            responder: Box::new(responder),
            calls: 0,
        });
    }

    pub fn total_calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn prompts_matching(&self, needle: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _system: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().rev().find(|r| prompt.contains(&r.needle)) {
            Some(rule) => {
                rule.calls += 1;
                (rule.responder)(rule.calls)
            }
            None => Err(LlmError::EmptyContent),
        }
    }
}

pub fn question_json(text: &str, category: &str, difficulty: &str) -> String {
    serde_json::json!({
        "text": text,
        "category": category,
        "difficulty": difficulty,
        "follow_up": null,
    })
    .to_string()
}

// ────────────────────────────────────────────────────────────────────────────
// Fixtures
// ────────────────────────────────────────────────────────────────────────────

pub fn research_snapshot(stage_names: &[&str]) -> ResearchSnapshot {
    ResearchSnapshot {
        role_title: "Backend Engineer".to_string(),
        company_name: "Acme Logistics".to_string(),
        cv_summary: "Six years building Rust and Go services for payments.".to_string(),
        job_summary: "Own the order routing platform.".to_string(),
        company_facts: vec!["Ships 2M parcels a day".to_string()],
        competencies: vec!["Distributed systems".to_string(), "Ownership".to_string()],
        interview_style: Some(InterviewStyle {
            tone: Some("friendly but rigorous".to_string()),
            stage_names: stage_names.iter().map(|s| s.to_string()).collect(),
            question_style_hints: vec!["Prefer concrete scenarios".to_string()],
        }),
    }
}

const DEFAULT_STAGE_NAMES: [&str; 3] = ["Technical", "Behavioral", "Situational"];

/// A `ready` session. Multi-stage fixtures get named stages whose names map
/// onto the three scored categories.
pub fn session_fixture(tier: PlanTier, stages: u32) -> Session {
    let names: Vec<&str> = if stages > 1 {
        DEFAULT_STAGE_NAMES
            .iter()
            .copied()
            .take(stages as usize)
            .collect()
    } else {
        Vec::new()
    };
    let now = Utc::now();
    Session {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        status: SessionStatus::Ready,
        plan_tier: tier,
        mode: DeliveryMode::Text,
        stages_planned: stages.max(1),
        current_stage: 1,
        stage_targets: None,
        limits: SessionLimits::default(),
        research: Some(research_snapshot(&names)),
        conversation_summary: String::new(),
        difficulty_curve: Vec::new(),
        progress_state: None,
        intro_text: None,
        entitlement_id: (tier == PlanTier::Paid).then(Uuid::new_v4),
        entitlement_consumed_at: None,
        last_activity_at: now,
        created_at: now,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Storage
// ────────────────────────────────────────────────────────────────────────────

struct Claim {
    turn_id: Uuid,
    claim_id: Uuid,
    claimed_at: DateTime<Utc>,
}

struct StoredSession {
    session: Session,
    claim: Option<Claim>,
}

#[derive(Default)]
struct StoreState {
    sessions: HashMap<Uuid, StoredSession>,
    turns: HashMap<Uuid, Vec<Turn>>,
}

/// Mirrors the conditional-write semantics of the PostgreSQL store.
/// Multi-write operations apply under one lock, so they land whole or not at all.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    failures: Mutex<Vec<&'static str>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&self, session: Session) {
        self.state.lock().unwrap().sessions.insert(
            session.id,
            StoredSession {
                session,
                claim: None,
            },
        );
    }

    pub fn session(&self, session_id: Uuid) -> Session {
        self.state.lock().unwrap().sessions[&session_id].session.clone()
    }

    pub fn turns(&self, session_id: Uuid) -> Vec<Turn> {
        self.state
            .lock()
            .unwrap()
            .turns
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes the next call to the named store operation fail before writing.
    pub fn fail_next(&self, operation: &'static str) {
        self.failures.lock().unwrap().push(operation);
    }

    fn injected_failure(&self, operation: &'static str) -> Result<(), AppError> {
        let mut failures = self.failures.lock().unwrap();
        match failures.iter().position(|op| *op == operation) {
            Some(i) => {
                failures.remove(i);
                Err(AppError::Internal(anyhow::anyhow!("{operation}: connection reset")))
            }
            None => Ok(()),
        }
    }

    /// Test hook for editing a stored session in place.
    pub fn update_session(&self, session_id: Uuid, edit: impl FnOnce(&mut Session)) {
        let mut state = self.state.lock().unwrap();
        if let Some(stored) = state.sessions.get_mut(&session_id) {
            edit(&mut stored.session);
        }
    }

    fn with_session<T>(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&mut StoredSession) -> T,
    ) -> Result<T, AppError> {
        let mut state = self.state.lock().unwrap();
        state
            .sessions
            .get_mut(&session_id)
            .map(f)
            .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .sessions
            .get(&session_id)
            .map(|s| s.session.clone()))
    }

    async fn list_turns(&self, session_id: Uuid) -> Result<Vec<Turn>, AppError> {
        let mut turns = self.turns(session_id);
        turns.sort_by_key(|t| t.turn_index);
        Ok(turns)
    }

    async fn insert_turns(&self, turns: &[Turn]) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        Ok(insert_locked(&mut state, turns))
    }

    async fn commit_turn(&self, commit: &TurnCommit) -> Result<bool, AppError> {
        self.injected_failure("commit_turn")?;
        let mut state = self.state.lock().unwrap();
        let session_id = commit.turn.session_id;
        if !state.sessions.contains_key(&session_id) {
            return Err(AppError::NotFound(format!("session {session_id}")));
        }
        if !insert_locked(&mut state, std::slice::from_ref(&commit.turn)) {
            return Ok(false);
        }
        if let Some(stored) = state.sessions.get_mut(&session_id) {
            let session = &mut stored.session;
            session.difficulty_curve.extend_from_slice(&commit.curve);
            if let Some(stage) = commit.advance_to {
                if session.current_stage < stage && stage <= session.stages_planned {
                    session.current_stage = stage;
                }
            }
            session.progress_state = Some(commit.progress.clone());
            session.last_activity_at = commit.progress.saved_at;
        }
        Ok(true)
    }

    async fn record_answer(
        &self,
        session_id: Uuid,
        turn_id: Uuid,
        answer: &AnswerAttachment,
        summary: &str,
    ) -> Result<bool, AppError> {
        self.injected_failure("record_answer")?;
        let mut state = self.state.lock().unwrap();
        let turn = state
            .turns
            .get_mut(&session_id)
            .and_then(|list| list.iter_mut().find(|t| t.id == turn_id));
        match turn {
            Some(turn) if !turn.is_answered() => {
                turn.answer_text = Some(answer.answer_text.clone());
                turn.answer_audio_key = answer.audio_key.clone();
                turn.answer_digest = Some(answer.digest.clone());
                turn.timing.completed_at = Some(answer.completed_at);
                turn.timing.duration_secs = Some(answer.duration_secs);
                turn.timing.reveal_count = answer.reveal_count;
            }
            _ => return Ok(false),
        }
        if let Some(stored) = state.sessions.get_mut(&session_id) {
            stored.session.conversation_summary = summary.to_string();
        }
        Ok(true)
    }

    async fn claim_submission(
        &self,
        session_id: Uuid,
        turn_id: Uuid,
        stale_after: Duration,
    ) -> Result<SubmissionClaim, AppError> {
        let now = Utc::now();
        self.with_session(session_id, |stored| match &stored.claim {
            Some(live) if live.claimed_at >= now - stale_after => SubmissionClaim::Held {
                turn_id: Some(live.turn_id),
            },
            _ => {
                let claim_id = Uuid::new_v4();
                stored.claim = Some(Claim {
                    turn_id,
                    claim_id,
                    claimed_at: now,
                });
                SubmissionClaim::Acquired(claim_id)
            }
        })
    }

    async fn release_submission(&self, session_id: Uuid, claim_id: Uuid) -> Result<(), AppError> {
        self.with_session(session_id, |stored| {
            if matches!(&stored.claim, Some(held) if held.claim_id == claim_id) {
                stored.claim = None;
            }
        })
    }

    async fn transition_status(
        &self,
        session_id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> Result<bool, AppError> {
        self.with_session(session_id, |stored| {
            if from.contains(&stored.session.status) {
                stored.session.status = to;
                true
            } else {
                false
            }
        })
    }

    async fn set_stage_targets_if_absent(
        &self,
        session_id: Uuid,
        targets: &[u32],
    ) -> Result<bool, AppError> {
        self.with_session(session_id, |stored| {
            if stored.session.stage_targets.is_some() {
                return false;
            }
            stored.session.stage_targets = Some(targets.to_vec());
            true
        })
    }

    async fn set_intro_if_absent(&self, session_id: Uuid, intro: &str) -> Result<String, AppError> {
        self.with_session(session_id, |stored| {
            let session = &mut stored.session;
            if session.intro_text.as_deref().unwrap_or("").is_empty() {
                session.intro_text = Some(intro.to_string());
            }
            session.intro_text.clone().unwrap_or_default()
        })
    }

    async fn save_progress(
        &self,
        session_id: Uuid,
        state: &ResumeProgressState,
    ) -> Result<(), AppError> {
        self.injected_failure("save_progress")?;
        self.with_session(session_id, |stored| {
            stored.session.progress_state = Some(state.clone());
            stored.session.last_activity_at = state.saved_at;
        })
    }

    async fn clear_progress(&self, session_id: Uuid) -> Result<(), AppError> {
        self.with_session(session_id, |stored| {
            stored.session.progress_state = None;
        })
    }

    async fn mark_entitlement_consumed(
        &self,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.with_session(session_id, |stored| {
            stored.session.entitlement_consumed_at.get_or_insert(at);
        })
    }

    async fn reset_session(&self, session_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        let Some(stored) = state.sessions.get_mut(&session_id) else {
            return Ok(false);
        };
        if !stored.session.status.is_startable() {
            return Ok(false);
        }
        let session = &mut stored.session;
        session.status = SessionStatus::Ready;
        session.current_stage = 1;
        session.conversation_summary.clear();
        session.difficulty_curve.clear();
        session.progress_state = None;
        session.last_activity_at = Utc::now();
        stored.claim = None;
        state.turns.remove(&session_id);
        Ok(true)
    }
}

/// All-or-nothing insert; false if any turn index is already taken.
fn insert_locked(state: &mut StoreState, turns: &[Turn]) -> bool {
    for turn in turns {
        let taken = state
            .turns
            .get(&turn.session_id)
            .map(|list| list.iter().any(|t| t.turn_index == turn.turn_index))
            .unwrap_or(false);
        let duplicated = turns
            .iter()
            .filter(|t| t.session_id == turn.session_id && t.turn_index == turn.turn_index)
            .count()
            > 1;
        if taken || duplicated {
            return false;
        }
    }
    for turn in turns {
        state
            .turns
            .entry(turn.session_id)
            .or_default()
            .push(turn.clone());
    }
    true
}

// ────────────────────────────────────────────────────────────────────────────
// Entitlements
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingEntitlements {
    calls: Mutex<Vec<(Uuid, Uuid, Uuid)>>,
    failing: AtomicBool,
}

impl RecordingEntitlements {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl EntitlementService for RecordingEntitlements {
    async fn consume(
        &self,
        entitlement_id: Uuid,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<ConsumeOutcome, EntitlementError> {
        self.calls
            .lock()
            .unwrap()
            .push((entitlement_id, user_id, session_id));
        if self.failing.load(Ordering::SeqCst) {
            return Err(EntitlementError::Api {
                status: 503,
                message: "entitlement service down".to_string(),
            });
        }
        Ok(ConsumeOutcome {
            success: true,
            remaining_credits: 2,
        })
    }
}
