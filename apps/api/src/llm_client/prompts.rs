// Shared prompt constants.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// System prompt fragment for short free-text replies.
pub const PLAIN_TEXT_SYSTEM: &str = "You are a concise assistant. \
    Respond with plain text only. \
    Do NOT use markdown, bullet points, headings or quotation marks around the reply.";
