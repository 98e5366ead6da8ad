//! Per-stage question targets, advancement and naming for multi-stage
//! interviews.
//!
//! Target source: paid multi-stage sessions use their stored `stage_targets`
//! (generated once on first start). Every other session, and any paid session
//! whose targets are somehow missing, uses the even split of the question cap.

use rand::Rng;

use crate::interview::models::QuestionCategory;

pub const MIN_STAGE_TARGET: u32 = 5;
pub const MAX_STAGE_TARGET: u32 = 8;

/// One random target in [5, 8] per stage.
pub fn generate_stage_targets(stages: u32) -> Vec<u32> {
    let mut rng = rand::thread_rng();
    (0..stages)
        .map(|_| rng.gen_range(MIN_STAGE_TARGET..=MAX_STAGE_TARGET))
        .collect()
}

/// Even split of the cap across stages, rounded up so the final stage is not
/// starved.
pub fn planned_per_stage(question_cap: u32, stages_planned: u32) -> u32 {
    let stages = stages_planned.max(1);
    ((question_cap + stages - 1) / stages).max(1)
}

/// Target for `stage` (1-based): the stored target if present, else the even split.
pub fn target_for_stage(stage: u32, planned_per_stage: u32, stage_targets: Option<&[u32]>) -> u32 {
    stage_targets
        .and_then(|targets| targets.get(stage.saturating_sub(1) as usize).copied())
        .unwrap_or(planned_per_stage)
}

/// True iff not on the final stage and the current stage's target is reached.
pub fn should_advance(
    current_stage: u32,
    stages_planned: u32,
    answered_in_stage: u32,
    planned_per_stage: u32,
    stage_targets: Option<&[u32]>,
) -> bool {
    if current_stage >= stages_planned {
        return false;
    }
    answered_in_stage >= target_for_stage(current_stage, planned_per_stage, stage_targets)
}

/// Configured label for a 1-based stage index, or "Stage N".
pub fn stage_name(stage: u32, labels: &[String]) -> String {
    labels
        .get(stage.saturating_sub(1) as usize)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Stage {stage}"))
}

const TECHNICAL_STAGE_KEYWORDS: &[&str] = &[
    "technical",
    "coding",
    "system design",
    "architecture",
    "engineering",
    "problem solving",
    "problem-solving",
];
const BEHAVIORAL_STAGE_KEYWORDS: &[&str] = &[
    "behavioral",
    "behavioural",
    "culture",
    "values",
    "leadership",
    "motivation",
    "teamwork",
];
const SITUATIONAL_STAGE_KEYWORDS: &[&str] = &[
    "situational",
    "scenario",
    "case",
    "hypothetical",
    "role-play",
    "roleplay",
];

/// Infers the category every question in a stage must carry. `None` means the
/// stage name carries no signal and questions keep their generated category.
pub fn infer_stage_category(stage_name: &str) -> Option<QuestionCategory> {
    let name = stage_name.to_lowercase();
    if TECHNICAL_STAGE_KEYWORDS.iter().any(|k| name.contains(k)) {
        Some(QuestionCategory::Technical)
    } else if BEHAVIORAL_STAGE_KEYWORDS.iter().any(|k| name.contains(k)) {
        Some(QuestionCategory::Behavioral)
    } else if SITUATIONAL_STAGE_KEYWORDS.iter().any(|k| name.contains(k)) {
        Some(QuestionCategory::Situational)
    } else {
        None
    }
}
