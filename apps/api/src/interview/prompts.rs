// All LLM prompt constants for the interview engine.
// Templates use `{placeholder}` markers filled with `str::replace`.

/// System prompt for question generation. Enforces JSON-only output.
pub const QUESTION_SYSTEM: &str = "You are an experienced hiring manager running a realistic \
    mock interview. You ask one question at a time, grounded in the candidate's CV and the \
    target role. You MUST respond with valid JSON only: a single JSON object. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Question generation prompt.
/// Replace: {role_title}, {company_name}, {cv_summary}, {job_summary}, {company_facts},
///          {competencies}, {style_hints}, {stage_block}, {difficulty_block},
///          {mode_block}, {summary}, {history}, {follow_up_block},
///          {question_number}, {total_questions}
pub const QUESTION_PROMPT_TEMPLATE: &str = r#"You are interviewing a candidate for the role of {role_title} at {company_name}.

CANDIDATE CV SUMMARY:
{cv_summary}

JOB SUMMARY:
{job_summary}

COMPANY FACTS:
{company_facts}

REQUIRED COMPETENCIES:
{competencies}

INTERVIEW STYLE HINTS:
{style_hints}

This is question {question_number} of {total_questions}.
{stage_block}

DIFFICULTY:
{difficulty_block}

DELIVERY:
{mode_block}

CONVERSATION SO FAR (rolling summary):
{summary}

PREVIOUS QUESTIONS AND ANSWERS:
{history}

{follow_up_block}

Return a JSON object with this EXACT schema:
{
  "text": "The question to ask the candidate",
  "category": "technical",
  "difficulty": "medium",
  "follow_up": "Optional probing follow-up the interviewer could use, or null"
}

HARD RULES:
1. "category" must be one of: "technical", "behavioral", "situational"
2. "difficulty" must be one of: "easy", "medium", "hard"
3. Never repeat a question that was already asked
4. Ask exactly one question"#;

pub const DIFFICULTY_FORCED: &str =
    "The adaptive engine requires this question at \"{difficulty}\" difficulty. Set \"difficulty\" to \"{difficulty}\".";

pub const DIFFICULTY_BANDS: &str = "Progress difficulty by position in the interview: \
    questions in the first third are \"easy\", the middle third \"medium\", the final third \"hard\". \
    For this question use \"{difficulty}\".";

pub const VOICE_MODE: &str = "The question will be read aloud by text-to-speech. \
    Use short, plain sentences (at most two). No lists, symbols, abbreviations or parentheses.";

pub const TEXT_MODE: &str = "The question will be shown as text. Phrase it naturally.";

pub const STAGE_BLOCK: &str = "CURRENT STAGE: {stage_name} (stage {stage_index} of {total_stages}, \
    question {stage_position} in this stage).{category_rule}";

pub const STAGE_CATEGORY_RULE: &str = " Every question in this stage MUST have category \"{category}\".";

pub const FOLLOW_UP_BLOCK: &str = "CONTEXT-AWARE FOLLOW-UP: The candidate just answered:\n\"{last_answer}\"\n\
    Reference a specific detail from that answer in your next question where it fits naturally.";

/// System prompt for one-sentence answer digests.
pub const DIGEST_SYSTEM: &str = "You summarize interview answers. \
    Reply with exactly one plain sentence of at most 25 words. No preamble.";

/// Replace: {question}, {answer}
pub const DIGEST_PROMPT_TEMPLATE: &str = r#"Summarize the candidate's answer in one sentence, keeping the most concrete detail.

QUESTION: {question}
ANSWER: {answer}"#;

/// Replace: {role_title}, {company_name}, {tone}, {mode_block}
pub const INTRO_PROMPT_TEMPLATE: &str = r#"Write a warm, professional opening for a mock interview for the role of {role_title} at {company_name}.
Introduce yourself as the interviewer, explain that a little light conversation comes first, followed by role-specific questions, and put the candidate at ease.
Tone: {tone}
{mode_block}
Keep it under 80 words."#;

/// Replace: {role_title}, {company_name}, {cv_summary}
pub const SMALL_TALK_PROMPT_TEMPLATE: &str = r#"Write 1 or 2 short, friendly warm-up questions to open a mock interview for the role of {role_title} at {company_name}.
They must be light conversation, not assessed, and may reference the candidate's background:
{cv_summary}

Return a JSON array of strings, e.g. ["How has your day been so far?"]"#;

/// Replace: {previous_question}, {answer}, {next_question}, {stage_rule}, {mode_block}
pub const BRIDGE_PROMPT_TEMPLATE: &str = r#"You are the interviewer. Write a short transition (one or two sentences) that acknowledges the candidate's previous answer and leads into the next question. Do not evaluate or score the answer. Do not repeat the next question.

PREVIOUS QUESTION: {previous_question}
CANDIDATE ANSWER: {answer}
NEXT QUESTION: {next_question}
{stage_rule}
{mode_block}"#;

/// Replace: {stage_name}
pub const BRIDGE_STAGE_RULE: &str =
    "The interview is now moving to a new stage: {stage_name}. You MUST announce this stage change.";

/// Used when small-talk generation fails.
pub const FALLBACK_SMALL_TALK: [&str; 2] = [
    "Before we dive in, how has your day been so far?",
    "What got you interested in this role?",
];

/// Replace: {role_title}
pub const CONFIRMATION_TEMPLATE: &str =
    "Thanks for chatting. Are you ready to begin the {role_title} interview?";
