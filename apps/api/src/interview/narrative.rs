//! Bridge / intro / small-talk generation for paid sessions.
//!
//! Every function here is best-effort and a no-op on the free tier: it never
//! returns an error, only an empty value or a canned fallback.

use crate::interview::generation::{recover, GenerationClient};
use crate::interview::models::{DeliveryMode, PlanTier, ResearchSnapshot};
use crate::interview::prompts::{
    BRIDGE_PROMPT_TEMPLATE, BRIDGE_STAGE_RULE, CONFIRMATION_TEMPLATE, FALLBACK_SMALL_TALK,
    INTRO_PROMPT_TEMPLATE, SMALL_TALK_PROMPT_TEMPLATE, TEXT_MODE, VOICE_MODE,
};
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, PLAIN_TEXT_SYSTEM};

const MAX_SMALL_TALK: usize = 2;

fn mode_block(mode: DeliveryMode) -> &'static str {
    match mode {
        DeliveryMode::Voice => VOICE_MODE,
        DeliveryMode::Text => TEXT_MODE,
    }
}

/// Opening narrative. Callers cache a non-empty result on the session.
pub async fn generate_intro(
    client: &GenerationClient,
    tier: PlanTier,
    research: &ResearchSnapshot,
    mode: DeliveryMode,
) -> String {
    if tier == PlanTier::Free {
        return String::new();
    }

    let tone = research
        .interview_style
        .as_ref()
        .and_then(|s| s.tone.as_deref())
        .unwrap_or("warm and professional");
    let prompt = INTRO_PROMPT_TEMPLATE
        .replace("{role_title}", &research.role_title)
        .replace("{company_name}", &research.company_name)
        .replace("{tone}", tone)
        .replace("{mode_block}", mode_block(mode));

    recover(
        client.try_generate_text("intro", &prompt, PLAIN_TEXT_SYSTEM).await,
        String::new,
    )
}

fn fallback_small_talk() -> Vec<String> {
    FALLBACK_SMALL_TALK.iter().map(|s| s.to_string()).collect()
}

/// One or two warm-up questions. Falls back to a canned pair on any failure,
/// including a well-formed but empty list.
pub async fn generate_small_talk(
    client: &GenerationClient,
    tier: PlanTier,
    research: &ResearchSnapshot,
) -> Vec<String> {
    if tier == PlanTier::Free {
        return Vec::new();
    }

    let prompt = SMALL_TALK_PROMPT_TEMPLATE
        .replace("{role_title}", &research.role_title)
        .replace("{company_name}", &research.company_name)
        .replace("{cv_summary}", &research.cv_summary);

    let generated: Vec<String> = recover(
        client
            .try_generate_json("small talk", &prompt, JSON_ONLY_SYSTEM)
            .await,
        fallback_small_talk,
    );

    let questions: Vec<String> = generated
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .take(MAX_SMALL_TALK)
        .collect();

    if questions.is_empty() {
        fallback_small_talk()
    } else {
        questions
    }
}

/// Confirmation prompt shown between warm-up and the first scored question.
pub fn confirmation_text(research: &ResearchSnapshot) -> String {
    CONFIRMATION_TEMPLATE.replace("{role_title}", &research.role_title)
}

pub struct BridgeRequest<'a> {
    pub previous_question: &'a str,
    pub answer: &'a str,
    pub next_question: &'a str,
    /// Name of the stage being entered, when this answer closed a stage.
    pub entering_stage: Option<&'a str>,
    pub mode: DeliveryMode,
}

/// Transition text between an answered question and the next one.
pub async fn generate_bridge(
    client: &GenerationClient,
    tier: PlanTier,
    request: &BridgeRequest<'_>,
) -> String {
    if tier == PlanTier::Free {
        return String::new();
    }

    let stage_rule = request
        .entering_stage
        .map(|name| BRIDGE_STAGE_RULE.replace("{stage_name}", name))
        .unwrap_or_default();
    let prompt = BRIDGE_PROMPT_TEMPLATE
        .replace("{previous_question}", request.previous_question)
        .replace("{answer}", request.answer)
        .replace("{next_question}", request.next_question)
        .replace("{stage_rule}", &stage_rule)
        .replace("{mode_block}", mode_block(request.mode));

    recover(
        client.try_generate_text("bridge", &prompt, PLAIN_TEXT_SYSTEM).await,
        String::new,
    )
}
