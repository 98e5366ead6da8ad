//! Question Generator — builds the structured prompt for the next scored
//! question and validates what comes back.
//!
//! Malformed or incomplete model output is a `GenerationFailure`; there is no
//! local retry. For multi-stage sessions the category is coerced to the
//! stage's inferred category when the model deviates.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::interview::difficulty::band_for_index;
use crate::interview::generation::GenerationClient;
use crate::interview::models::{
    DeliveryMode, Difficulty, Question, QuestionCategory, ResearchSnapshot, Turn,
    QUESTION_TIME_LIMIT_SECS,
};
use crate::interview::prompts::{
    DIFFICULTY_BANDS, DIFFICULTY_FORCED, FOLLOW_UP_BLOCK, QUESTION_PROMPT_TEMPLATE,
    QUESTION_SYSTEM, STAGE_BLOCK, STAGE_CATEGORY_RULE, TEXT_MODE, VOICE_MODE,
};
use crate::interview::stages::infer_stage_category;

/// Where the next question sits in a staged interview.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub index: u32,
    pub name: String,
    /// 1-based position of the next question within the stage.
    pub position: u32,
    pub total_stages: u32,
}

impl StageContext {
    /// Category every question in this stage must carry, for multi-stage sessions.
    pub fn expected_category(&self) -> Option<QuestionCategory> {
        if self.total_stages > 1 {
            infer_stage_category(&self.name)
        } else {
            None
        }
    }
}

pub struct QuestionRequest<'a> {
    pub research: &'a ResearchSnapshot,
    pub conversation_summary: &'a str,
    /// All prior turns in creation order.
    pub prior_turns: &'a [Turn],
    /// 0-based index of the question being generated.
    pub question_index: u32,
    pub total_questions: u32,
    pub stage: StageContext,
    pub mode: DeliveryMode,
    pub forced_difficulty: Option<Difficulty>,
}

/// Raw model output. All fields except `follow_up` are required.
#[derive(Debug, Deserialize)]
pub struct GeneratedQuestion {
    pub text: String,
    pub category: String,
    pub difficulty: String,
    #[serde(default)]
    pub follow_up: Option<String>,
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none provided)".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders prior exchanges: the most recent answer in full, older answers as
/// their digests.
fn render_history(turns: &[Turn]) -> String {
    let answered: Vec<&Turn> = turns.iter().filter(|t| t.is_answered()).collect();
    if answered.is_empty() {
        return "(no previous questions)".to_string();
    }
    let last = answered.len() - 1;
    answered
        .iter()
        .enumerate()
        .map(|(i, turn)| {
            let answer = if i == last {
                turn.answer_text.clone().unwrap_or_default()
            } else {
                turn.answer_digest
                    .as_ref()
                    .map(|d| d.summary.clone())
                    .unwrap_or_default()
            };
            format!(
                "Q{} [{}]: {}\nA: {}",
                i + 1,
                turn.turn_type.as_str(),
                turn.question.text,
                answer
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_question_prompt(request: &QuestionRequest<'_>) -> String {
    let research = request.research;
    let style_hints = research
        .interview_style
        .as_ref()
        .map(|s| {
            let mut hints = s.question_style_hints.clone();
            if let Some(tone) = &s.tone {
                hints.insert(0, format!("Tone: {tone}"));
            }
            hints
        })
        .unwrap_or_default();

    let difficulty_block = match request.forced_difficulty {
        Some(d) => DIFFICULTY_FORCED.replace("{difficulty}", d.as_str()),
        None => DIFFICULTY_BANDS.replace(
            "{difficulty}",
            band_for_index(request.question_index, request.total_questions).as_str(),
        ),
    };

    let mode_block = match request.mode {
        DeliveryMode::Voice => VOICE_MODE,
        DeliveryMode::Text => TEXT_MODE,
    };

    let category_rule = request
        .stage
        .expected_category()
        .map(|c| STAGE_CATEGORY_RULE.replace("{category}", c.as_str()))
        .unwrap_or_default();
    let stage_block = STAGE_BLOCK
        .replace("{stage_name}", &request.stage.name)
        .replace("{stage_index}", &request.stage.index.to_string())
        .replace("{total_stages}", &request.stage.total_stages.to_string())
        .replace("{stage_position}", &request.stage.position.to_string())
        .replace("{category_rule}", &category_rule);

    let follow_up_block = request
        .prior_turns
        .iter()
        .rev()
        .find(|t| t.is_answered())
        .and_then(|t| t.answer_text.as_deref())
        .filter(|a| !a.trim().is_empty())
        .map(|a| FOLLOW_UP_BLOCK.replace("{last_answer}", a.trim()))
        .unwrap_or_default();

    let summary = if request.conversation_summary.trim().is_empty() {
        "(nothing yet)"
    } else {
        request.conversation_summary
    };

    QUESTION_PROMPT_TEMPLATE
        .replace("{role_title}", &research.role_title)
        .replace("{company_name}", &research.company_name)
        .replace("{cv_summary}", &research.cv_summary)
        .replace("{job_summary}", &research.job_summary)
        .replace("{company_facts}", &bullet_list(&research.company_facts))
        .replace("{competencies}", &bullet_list(&research.competencies))
        .replace("{style_hints}", &bullet_list(&style_hints))
        .replace("{question_number}", &(request.question_index + 1).to_string())
        .replace("{total_questions}", &request.total_questions.to_string())
        .replace("{stage_block}", &stage_block)
        .replace("{difficulty_block}", &difficulty_block)
        .replace("{mode_block}", mode_block)
        .replace("{summary}", summary)
        .replace("{history}", &render_history(request.prior_turns))
        .replace("{follow_up_block}", &follow_up_block)
}

/// Validates model output into a `Question`.
///
/// - `text`, `category`, `difficulty` must be present and non-empty
/// - an unrecognised category is only tolerated when a stage category
///   overrides it
/// - a forced difficulty always wins over the model's choice
pub fn validate_generated(
    raw: GeneratedQuestion,
    expected_category: Option<QuestionCategory>,
    forced_difficulty: Option<Difficulty>,
) -> Result<Question, AppError> {
    let text = raw.text.trim();
    if text.is_empty() {
        return Err(AppError::GenerationFailure(
            "question: model returned empty text".to_string(),
        ));
    }

    let generated_category = QuestionCategory::from_label(&raw.category)
        .filter(|c| *c != QuestionCategory::General);
    let category = match (expected_category, generated_category) {
        (Some(expected), Some(generated)) if expected != generated => {
            warn!(
                "Generated category {} does not match stage category {}; coercing",
                generated.as_str(),
                expected.as_str()
            );
            expected
        }
        (Some(expected), _) => expected,
        (None, Some(generated)) => generated,
        (None, None) => {
            return Err(AppError::GenerationFailure(format!(
                "question: invalid category '{}'",
                raw.category
            )))
        }
    };

    let generated_difficulty = Difficulty::from_label(&raw.difficulty).ok_or_else(|| {
        AppError::GenerationFailure(format!("question: invalid difficulty '{}'", raw.difficulty))
    })?;
    let difficulty = forced_difficulty.unwrap_or(generated_difficulty);

    let follow_up = raw
        .follow_up
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty() && !f.eq_ignore_ascii_case("null"));

    Ok(Question {
        text: text.to_string(),
        category,
        difficulty,
        time_limit_secs: QUESTION_TIME_LIMIT_SECS,
        follow_up,
    })
}

/// Generates the next scored question. Any failure is fatal for the call.
pub async fn generate_question(
    client: &GenerationClient,
    request: &QuestionRequest<'_>,
) -> Result<Question, AppError> {
    let prompt = build_question_prompt(request);
    let raw: GeneratedQuestion = client
        .must_generate("question", &prompt, QUESTION_SYSTEM)
        .await?;

    let question = validate_generated(
        raw,
        request.stage.expected_category(),
        request.forced_difficulty,
    )?;
    debug!(
        "Generated question {} ({}, {})",
        request.question_index + 1,
        question.category.as_str(),
        question.difficulty.as_str()
    );
    Ok(question)
}
