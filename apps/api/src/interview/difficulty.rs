//! Adaptive Difficulty Engine — maps (current difficulty, answer quality,
//! interview progress) to the next difficulty plus an audit record.
//!
//! | bucket | strong                     | weak                        |
//! |--------|----------------------------|-----------------------------|
//! | early  | easy → medium, else keep   | easy                        |
//! | mid    | one level up               | one level down              |
//! | late   | hard                       | medium (easy stays easy)    |
//!
//! Medium-quality answers always keep the current difficulty.

use chrono::Utc;
use serde::Serialize;

use crate::interview::models::{AnswerQuality, Difficulty, DifficultyAdjustment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressBucket {
    Early,
    Mid,
    Late,
}

impl ProgressBucket {
    /// early < 30%, mid 30–70%, late > 70% of the question cap answered.
    pub fn from_progress(answered: u32, total: u32) -> Self {
        if total == 0 {
            return ProgressBucket::Early;
        }
        let ratio = answered as f64 / total as f64;
        if ratio < 0.3 {
            ProgressBucket::Early
        } else if ratio <= 0.7 {
            ProgressBucket::Mid
        } else {
            ProgressBucket::Late
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ProgressBucket::Early => "early",
            ProgressBucket::Mid => "mid",
            ProgressBucket::Late => "late",
        }
    }
}

/// Pure transition function.
pub fn next_difficulty(
    current: Difficulty,
    quality: AnswerQuality,
    bucket: ProgressBucket,
) -> (Difficulty, String) {
    use AnswerQuality::{Strong, Weak};
    use Difficulty::{Easy, Hard, Medium};

    let phase = bucket.label();
    match (bucket, quality) {
        (ProgressBucket::Early, Strong) if current == Easy => (
            Medium,
            format!("Strong answer in {phase} interview: escalating easy to medium"),
        ),
        (ProgressBucket::Early, Weak) => (
            Easy,
            format!("Weak answer in {phase} interview: keeping questions easy"),
        ),
        (ProgressBucket::Mid, Strong) if current != Hard => {
            let next = current.harder();
            (
                next,
                format!(
                    "Strong answer mid-interview: escalating {} to {}",
                    current.as_str(),
                    next.as_str()
                ),
            )
        }
        (ProgressBucket::Mid, Weak) if current != Easy => {
            let next = current.easier();
            (
                next,
                format!(
                    "Weak answer mid-interview: easing {} to {}",
                    current.as_str(),
                    next.as_str()
                ),
            )
        }
        (ProgressBucket::Late, Strong) if current != Hard => (
            Hard,
            "Strong answer late in interview: final challenge at hard".to_string(),
        ),
        (ProgressBucket::Late, Weak) if current == Hard => (
            Medium,
            "Weak answer late in interview: supporting at medium".to_string(),
        ),
        _ => (
            current,
            format!(
                "{} answer in {phase} interview: maintaining {}",
                capitalize(quality.as_str()),
                current.as_str()
            ),
        ),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + chars.as_str(),
    }
}

/// Runs the transition and produces the curve entry for the question at
/// `turn_index`.
pub fn adjust(
    current: Difficulty,
    quality: AnswerQuality,
    answered: u32,
    total: u32,
    turn_index: u32,
) -> DifficultyAdjustment {
    let bucket = ProgressBucket::from_progress(answered, total);
    let (new, reason) = next_difficulty(current, quality, bucket);
    DifficultyAdjustment {
        turn_index,
        previous: current,
        new,
        quality: Some(quality),
        reason,
        recorded_at: Utc::now(),
    }
}

/// First entry of every curve, written before the opening question.
pub fn baseline(difficulty: Difficulty) -> DifficultyAdjustment {
    DifficultyAdjustment {
        turn_index: 0,
        previous: difficulty,
        new: difficulty,
        quality: None,
        reason: format!("Baseline difficulty {}", difficulty.as_str()),
        recorded_at: Utc::now(),
    }
}

/// Difficulty band used when no difficulty is forced: thirds of the cap.
pub fn band_for_index(question_index: u32, total: u32) -> Difficulty {
    if total == 0 {
        return Difficulty::Easy;
    }
    let third = (total as f64 / 3.0).max(1.0);
    let position = question_index as f64;
    if position < third {
        Difficulty::Easy
    } else if position < third * 2.0 {
        Difficulty::Medium
    } else {
        Difficulty::Hard
    }
}
