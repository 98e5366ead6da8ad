//! Conversation Summarizer — a rolling, numbered digest of answered turns.
//!
//! The summary is append-then-truncate: a new numbered line is appended, and
//! if the result exceeds `MAX_SUMMARY_BYTES` only the most recent
//! `KEEP_RECENT_ENTRIES` lines plus the new one survive. Individual entries are
//! clipped so that the retained window always fits.

use crate::interview::generation::{recover, GenerationClient};
use crate::interview::models::AnswerDigest;
use crate::interview::prompts::{DIGEST_PROMPT_TEMPLATE, DIGEST_SYSTEM};
use crate::interview::quality::word_count;

pub const MAX_SUMMARY_BYTES: usize = 1024;
const KEEP_RECENT_ENTRIES: usize = 4;
/// 5 entries × (190 + "NNN. " + newline) stays under 1 KiB.
const MAX_ENTRY_BYTES: usize = 190;
const FALLBACK_DIGEST_CHARS: usize = 160;

/// Truncates to at most `max` bytes on a char boundary.
fn clip_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Appends entry `number` and enforces the size cap.
pub fn append_entry(summary: &str, number: u32, digest: &str) -> String {
    let digest = single_line(digest);
    let entry = format!("{number}. {}", clip_bytes(&digest, MAX_ENTRY_BYTES).trim_end());

    let mut lines: Vec<&str> = summary.lines().filter(|l| !l.trim().is_empty()).collect();
    lines.push(&entry);

    let mut joined = lines.join("\n");
    if joined.len() > MAX_SUMMARY_BYTES {
        let keep_from = lines.len().saturating_sub(KEEP_RECENT_ENTRIES + 1);
        lines.drain(..keep_from);
        joined = lines.join("\n");
    }
    while joined.len() > MAX_SUMMARY_BYTES && lines.len() > 1 {
        lines.remove(0);
        joined = lines.join("\n");
    }
    clip_bytes(&joined, MAX_SUMMARY_BYTES).to_string()
}

/// Local digest used when the model is unavailable: the answer's opening,
/// clipped to a sentence-sized fragment.
pub fn fallback_digest(answer: &str) -> String {
    let answer = single_line(answer);
    let first_sentence = answer
        .split_inclusive(['.', '!', '?'])
        .next()
        .unwrap_or(&answer)
        .trim();
    if first_sentence.chars().count() <= FALLBACK_DIGEST_CHARS {
        first_sentence.to_string()
    } else {
        let clipped: String = first_sentence.chars().take(FALLBACK_DIGEST_CHARS).collect();
        format!("{}…", clipped.trim_end())
    }
}

/// Asks the model for a one-sentence digest of the exchange. Best-effort.
pub async fn digest_answer(client: &GenerationClient, question: &str, answer: &str) -> AnswerDigest {
    let prompt = DIGEST_PROMPT_TEMPLATE
        .replace("{question}", question)
        .replace("{answer}", answer);

    let summary = recover(
        client.try_generate_text("answer digest", &prompt, DIGEST_SYSTEM).await,
        || fallback_digest(answer),
    );

    AnswerDigest {
        summary: single_line(&summary),
        word_count: word_count(answer) as u32,
    }
}
