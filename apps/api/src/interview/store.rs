//! Storage port for sessions and turns, plus the PostgreSQL implementation.
//!
//! Every mutation is a single statement (or a single transaction) scoped to
//! one session id. Lifecycle, stage, stage-target, intro, answer and
//! submission-claim writes are conditional so that concurrent requests for
//! the same session cannot move state backwards or apply twice. An answer and
//! its summary line, and a new turn with its curve, stage and progress writes,
//! each land together or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::models::{
    AnswerAttachment, DifficultyAdjustment, ResumeProgressState, Session, SessionStatus, Turn,
};
use crate::interview::records::{
    encode, AnswerDigestRecord, DifficultyCurveRecord, ProgressRecord, StageTargetsRecord,
};
use crate::models::interview::{SessionRow, TurnRow};

/// Result of asking for a session's submission slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionClaim {
    /// The slot is ours; release it with this token.
    Acquired(Uuid),
    /// A live claim exists, for `turn_id` if it was still readable.
    Held { turn_id: Option<Uuid> },
}

/// Everything one advance writes: the new turn, its difficulty-curve entries,
/// an optional stage move and the resume snapshot.
#[derive(Debug, Clone)]
pub struct TurnCommit {
    pub turn: Turn,
    pub curve: Vec<DifficultyAdjustment>,
    pub advance_to: Option<u32>,
    pub progress: ResumeProgressState,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, AppError>;

    /// All turns of a session in creation order.
    async fn list_turns(&self, session_id: Uuid) -> Result<Vec<Turn>, AppError>;

    /// Inserts turns atomically. Returns false (and inserts nothing) if any
    /// `turn_index` is already taken.
    async fn insert_turns(&self, turns: &[Turn]) -> Result<bool, AppError>;

    /// Inserts a turn together with its curve entries, stage move and resume
    /// snapshot. Returns false (and writes nothing) if the turn index is taken.
    async fn commit_turn(&self, commit: &TurnCommit) -> Result<bool, AppError>;

    /// Attaches an answer and stores the updated rolling summary, only if the
    /// turn is still unanswered.
    async fn record_answer(
        &self,
        session_id: Uuid,
        turn_id: Uuid,
        answer: &AnswerAttachment,
        summary: &str,
    ) -> Result<bool, AppError>;

    /// Claims the session's single submission slot for `turn_id`. A claim older
    /// than `stale_after` may be taken over.
    async fn claim_submission(
        &self,
        session_id: Uuid,
        turn_id: Uuid,
        stale_after: Duration,
    ) -> Result<SubmissionClaim, AppError>;

    /// Releases the slot only if it is still held under `claim_id`.
    async fn release_submission(&self, session_id: Uuid, claim_id: Uuid) -> Result<(), AppError>;

    /// Compare-and-swap on `status`.
    async fn transition_status(
        &self,
        session_id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> Result<bool, AppError>;

    /// Writes stage targets only if none are stored yet.
    async fn set_stage_targets_if_absent(
        &self,
        session_id: Uuid,
        targets: &[u32],
    ) -> Result<bool, AppError>;

    /// Caches the intro if none is stored; returns whichever intro is stored.
    async fn set_intro_if_absent(&self, session_id: Uuid, intro: &str) -> Result<String, AppError>;

    /// Writes the resume snapshot and bumps `last_activity_at`.
    async fn save_progress(
        &self,
        session_id: Uuid,
        state: &ResumeProgressState,
    ) -> Result<(), AppError>;

    async fn clear_progress(&self, session_id: Uuid) -> Result<(), AppError>;

    async fn mark_entitlement_consumed(
        &self,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// "Start fresh": drops all turns and resets summary, curve, stage and
    /// progress, returning the session to `ready`. Stage targets are kept.
    /// Only applies to `ready`/`running` sessions.
    async fn reset_session(&self, session_id: Uuid) -> Result<bool, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_list(statuses: &[SessionStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn to_i32(column: &str, value: u32) -> Result<i32, AppError> {
    i32::try_from(value)
        .map_err(|_| AppError::Validation(format!("{column} out of range: {value}")))
}

async fn insert_turn(conn: &mut PgConnection, turn: &Turn) -> Result<bool, AppError> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO interview_turns
            (id, session_id, turn_index, turn_type, stage, question_text, category,
             difficulty, time_limit_secs, follow_up, bridge_text, started_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (session_id, turn_index) DO NOTHING
        "#,
    )
    .bind(turn.id)
    .bind(turn.session_id)
    .bind(to_i32("turn_index", turn.turn_index)?)
    .bind(turn.turn_type.as_str())
    .bind(to_i32("stage", turn.stage)?)
    .bind(&turn.question.text)
    .bind(turn.question.category.as_str())
    .bind(turn.question.difficulty.as_str())
    .bind(to_i32("time_limit_secs", turn.question.time_limit_secs)?)
    .bind(&turn.question.follow_up)
    .bind(&turn.bridge_text)
    .bind(turn.timing.started_at)
    .execute(&mut *conn)
    .await?;
    Ok(inserted.rows_affected() == 1)
}

/// Appends to the difficulty curve. Existing entries are never rewritten.
async fn append_difficulty(
    conn: &mut PgConnection,
    session_id: Uuid,
    entries: &[DifficultyAdjustment],
) -> Result<(), AppError> {
    if entries.is_empty() {
        return Ok(());
    }
    // Encode through the record so the appended entries match the column schema.
    let record = encode(
        "difficulty_curve",
        &DifficultyCurveRecord::V1 {
            entries: entries.to_vec(),
        },
    )?;
    let new_entries = record
        .get("entries")
        .cloned()
        .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));

    sqlx::query(
        r#"
        UPDATE interview_sessions
        SET difficulty_curve = jsonb_set(
                difficulty_curve,
                '{entries}',
                COALESCE(difficulty_curve -> 'entries', '[]'::jsonb) || $2::jsonb
            ),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .bind(&new_entries)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Moves `current_stage` forward; never backwards.
async fn advance_stage(
    conn: &mut PgConnection,
    session_id: Uuid,
    to_stage: u32,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE interview_sessions
        SET current_stage = $2, updated_at = now()
        WHERE id = $1 AND current_stage < $2 AND $2 <= stages_planned
        "#,
    )
    .bind(session_id)
    .bind(to_i32("current_stage", to_stage)?)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

async fn write_progress(
    conn: &mut PgConnection,
    session_id: Uuid,
    state: &ResumeProgressState,
) -> Result<(), AppError> {
    let record = encode("progress_state", &ProgressRecord::V1(state.clone()))?;
    sqlx::query(
        r#"
        UPDATE interview_sessions
        SET progress_state = $2, last_activity_at = $3, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .bind(&record)
    .bind(state.saved_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM interview_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Session::try_from).transpose()
    }

    async fn list_turns(&self, session_id: Uuid) -> Result<Vec<Turn>, AppError> {
        let rows = sqlx::query_as::<_, TurnRow>(
            "SELECT * FROM interview_turns WHERE session_id = $1 ORDER BY turn_index ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Turn::try_from).collect()
    }

    async fn insert_turns(&self, turns: &[Turn]) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        for turn in turns {
            if !insert_turn(&mut tx, turn).await? {
                debug!(
                    "Turn index {} already taken for session {}; rolling back",
                    turn.turn_index, turn.session_id
                );
                tx.rollback().await?;
                return Ok(false);
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn commit_turn(&self, commit: &TurnCommit) -> Result<bool, AppError> {
        let session_id = commit.turn.session_id;
        let mut tx = self.pool.begin().await?;

        if !insert_turn(&mut tx, &commit.turn).await? {
            debug!(
                "Turn index {} already taken for session {session_id}; rolling back",
                commit.turn.turn_index
            );
            tx.rollback().await?;
            return Ok(false);
        }
        append_difficulty(&mut tx, session_id, &commit.curve).await?;
        if let Some(stage) = commit.advance_to {
            if !advance_stage(&mut tx, session_id, stage).await? {
                debug!("Session {session_id} already at or past stage {stage}");
            }
        }
        write_progress(&mut tx, session_id, &commit.progress).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn record_answer(
        &self,
        session_id: Uuid,
        turn_id: Uuid,
        answer: &AnswerAttachment,
        summary: &str,
    ) -> Result<bool, AppError> {
        let digest = encode(
            "answer_digest",
            &AnswerDigestRecord::V1(answer.digest.clone()),
        )?;
        let duration = i32::try_from(answer.duration_secs).unwrap_or(i32::MAX);
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE interview_turns
            SET answer_text = $3,
                answer_audio_key = $4,
                answer_digest = $5,
                completed_at = $6,
                duration_secs = $7,
                reveal_count = $8
            WHERE id = $1 AND session_id = $2
              AND answer_text IS NULL AND answer_audio_key IS NULL
            "#,
        )
        .bind(turn_id)
        .bind(session_id)
        .bind(&answer.answer_text)
        .bind(&answer.audio_key)
        .bind(&digest)
        .bind(answer.completed_at)
        .bind(duration)
        .bind(to_i32("reveal_count", answer.reveal_count)?)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE interview_sessions SET conversation_summary = $2, updated_at = now() WHERE id = $1",
        )
        .bind(session_id)
        .bind(summary)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn claim_submission(
        &self,
        session_id: Uuid,
        turn_id: Uuid,
        stale_after: Duration,
    ) -> Result<SubmissionClaim, AppError> {
        let claim_id = Uuid::new_v4();
        let stale_before = Utc::now() - stale_after;
        let result = sqlx::query(
            r#"
            UPDATE interview_sessions
            SET submitting_turn_id = $2,
                submission_claim_id = $3,
                submission_claimed_at = now(),
                updated_at = now()
            WHERE id = $1
              AND (submitting_turn_id IS NULL OR submission_claimed_at < $4)
            "#,
        )
        .bind(session_id)
        .bind(turn_id)
        .bind(claim_id)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(SubmissionClaim::Acquired(claim_id));
        }

        let holder = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT submitting_turn_id FROM interview_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten();
        Ok(SubmissionClaim::Held { turn_id: holder })
    }

    async fn release_submission(&self, session_id: Uuid, claim_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE interview_sessions
            SET submitting_turn_id = NULL,
                submission_claim_id = NULL,
                submission_claimed_at = NULL,
                updated_at = now()
            WHERE id = $1 AND submission_claim_id = $2
            "#,
        )
        .bind(session_id)
        .bind(claim_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn transition_status(
        &self,
        session_id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE interview_sessions
            SET status = $3, updated_at = now()
            WHERE id = $1 AND status = ANY($2)
            "#,
        )
        .bind(session_id)
        .bind(status_list(from))
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        if applied {
            info!("Session {session_id} moved to {}", to.as_str());
        }
        Ok(applied)
    }

    async fn set_stage_targets_if_absent(
        &self,
        session_id: Uuid,
        targets: &[u32],
    ) -> Result<bool, AppError> {
        let record = encode(
            "stage_targets",
            &StageTargetsRecord::V1 {
                targets: targets.to_vec(),
            },
        )?;
        let result = sqlx::query(
            r#"
            UPDATE interview_sessions
            SET stage_targets = $2, updated_at = now()
            WHERE id = $1 AND stage_targets IS NULL
            "#,
        )
        .bind(session_id)
        .bind(&record)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_intro_if_absent(&self, session_id: Uuid, intro: &str) -> Result<String, AppError> {
        sqlx::query(
            r#"
            UPDATE interview_sessions
            SET intro_text = $2, updated_at = now()
            WHERE id = $1 AND (intro_text IS NULL OR intro_text = '')
            "#,
        )
        .bind(session_id)
        .bind(intro)
        .execute(&self.pool)
        .await?;

        let stored = sqlx::query_scalar::<_, Option<String>>(
            "SELECT intro_text FROM interview_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten();
        Ok(stored.unwrap_or_default())
    }

    async fn save_progress(
        &self,
        session_id: Uuid,
        state: &ResumeProgressState,
    ) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        write_progress(&mut conn, session_id, state).await
    }

    async fn clear_progress(&self, session_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE interview_sessions SET progress_state = NULL, updated_at = now() WHERE id = $1",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_entitlement_consumed(
        &self,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE interview_sessions
            SET entitlement_consumed_at = $2, updated_at = now()
            WHERE id = $1 AND entitlement_consumed_at IS NULL
            "#,
        )
        .bind(session_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_session(&self, session_id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE interview_sessions
            SET status = 'ready',
                current_stage = 1,
                conversation_summary = '',
                difficulty_curve = '{"version": "1", "entries": []}'::jsonb,
                progress_state = NULL,
                submitting_turn_id = NULL,
                submission_claim_id = NULL,
                submission_claimed_at = NULL,
                last_activity_at = now(),
                updated_at = now()
            WHERE id = $1 AND status IN ('ready', 'running')
            "#,
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let deleted = sqlx::query("DELETE FROM interview_turns WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            "Reset session {session_id}: removed {} turns",
            deleted.rows_affected()
        );
        Ok(true)
    }
}
