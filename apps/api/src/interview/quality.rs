//! Answer Quality Assessor — deterministic heuristic classifier, no model call.
//!
//! Runs on every submission and gates the adaptive difficulty loop, so it must
//! stay pure and cheap: a handful of lowercase substring scans.
//!
//! Scoring:
//! - answers under 15 words or 80 characters are always `Weak`
//! - +1 each for concrete-example, numeric-evidence, methodology and
//!   reflective language
//! - technical questions: +1 for one technical term, +2 for three or more
//! - behavioral/situational questions: +1 for two STAR components, +2 for three+
//! - +1 for 60+ words, +2 for 120+ words
//! - total ≥ 5 is `Strong`, ≥ 2 is `Medium`, otherwise `Weak`

use serde::Serialize;

use crate::interview::models::{AnswerQuality, QuestionCategory};

const MIN_WORDS: usize = 15;
const MIN_CHARS: usize = 80;
const STRONG_THRESHOLD: u32 = 5;
const MEDIUM_THRESHOLD: u32 = 2;

const EXAMPLE_MARKERS: &[&str] = &[
    "for example",
    "for instance",
    "such as",
    "specifically",
    "in my previous",
    "in my last",
    "at my current",
    "one time",
    "on one project",
    "i remember when",
];

const METHODOLOGY_MARKERS: &[&str] = &[
    "approach",
    "process",
    "framework",
    "methodology",
    "strategy",
    "first,",
    "step",
    "prioritiz",
    "analy",
    "trade-off",
    "tradeoff",
];

const REFLECTIVE_MARKERS: &[&str] = &[
    "i learned",
    "learnt",
    "in hindsight",
    "looking back",
    "i realized",
    "i realised",
    "next time",
    "differently",
    "reflect",
    "taught me",
];

const NUMBER_WORDS: &[&str] = &["percent", "twice", "double", "half", "million", "thousand"];

const TECHNICAL_TERMS: &[&str] = &[
    "api",
    "database",
    "latency",
    "throughput",
    "algorithm",
    "architecture",
    "cache",
    "scalab",
    "deploy",
    "complexity",
    "query",
    "index",
    "microservice",
    "concurrency",
    "thread",
    "protocol",
    "kubernetes",
    "pipeline",
    "unit test",
    "integration test",
    "refactor",
    "schema",
    "memory",
];

const STAR_SITUATION: &[&str] = &["situation", "context", "background", "we were", "there was"];
const STAR_TASK: &[&str] = &["task", "goal", "responsible for", "needed to", "my role"];
const STAR_ACTION: &[&str] = &[
    "i decided",
    "i implemented",
    "i led",
    "i built",
    "i organized",
    "i proposed",
    "i worked",
    "i took",
    "action",
];
const STAR_RESULT: &[&str] = &[
    "result",
    "outcome",
    "as a result",
    "led to",
    "which meant",
    "reduced",
    "increased",
    "improved",
    "saved",
];

/// Signals found in one answer. Returned alongside the label so callers can
/// log why an answer was classified the way it was.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualitySignals {
    pub word_count: usize,
    pub char_count: usize,
    pub has_example: bool,
    pub has_numbers: bool,
    pub has_methodology: bool,
    pub has_reflection: bool,
    pub technical_terms: usize,
    pub star_components: usize,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityAssessment {
    pub quality: AnswerQuality,
    pub signals: QualitySignals,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text.contains(m))
}

fn count_distinct(text: &str, markers: &[&str]) -> usize {
    markers.iter().filter(|m| text.contains(*m)).count()
}

/// Classifies an answer into weak / medium / strong.
pub fn assess_answer(answer: &str, category: QuestionCategory) -> QualityAssessment {
    let trimmed = answer.trim();
    let text_lower = trimmed.to_lowercase();

    let mut signals = QualitySignals {
        word_count: word_count(trimmed),
        char_count: trimmed.chars().count(),
        ..QualitySignals::default()
    };

    if signals.word_count < MIN_WORDS || signals.char_count < MIN_CHARS {
        return QualityAssessment {
            quality: AnswerQuality::Weak,
            signals,
        };
    }

    signals.has_example = contains_any(&text_lower, EXAMPLE_MARKERS);
    signals.has_numbers = trimmed.chars().any(|c| c.is_ascii_digit())
        || trimmed.contains('%')
        || contains_any(&text_lower, NUMBER_WORDS);
    signals.has_methodology = contains_any(&text_lower, METHODOLOGY_MARKERS);
    signals.has_reflection = contains_any(&text_lower, REFLECTIVE_MARKERS);

    let mut score = [
        signals.has_example,
        signals.has_numbers,
        signals.has_methodology,
        signals.has_reflection,
    ]
    .iter()
    .filter(|s| **s)
    .count() as u32;

    match category {
        QuestionCategory::Technical => {
            signals.technical_terms = count_distinct(&text_lower, TECHNICAL_TERMS);
            score += match signals.technical_terms {
                0 => 0,
                1 | 2 => 1,
                _ => 2,
            };
        }
        QuestionCategory::Behavioral | QuestionCategory::Situational => {
            signals.star_components = [STAR_SITUATION, STAR_TASK, STAR_ACTION, STAR_RESULT]
                .iter()
                .filter(|markers| contains_any(&text_lower, markers))
                .count();
            score += match signals.star_components {
                0 | 1 => 0,
                2 => 1,
                _ => 2,
            };
        }
        QuestionCategory::General => {}
    }

    score += match signals.word_count {
        0..=59 => 0,
        60..=119 => 1,
        _ => 2,
    };
    signals.score = score;

    let quality = if score >= STRONG_THRESHOLD {
        AnswerQuality::Strong
    } else if score >= MEDIUM_THRESHOLD {
        AnswerQuality::Medium
    } else {
        AnswerQuality::Weak
    };

    QualityAssessment { quality, signals }
}
