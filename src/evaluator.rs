//! Answer evaluation: scores a learner's free-text response to an exercise.
//!
//! `LocalEvaluator` is a deterministic heuristic (target-item detection plus
//! a list of Italian L1 interference patterns). The OpenAI-backed evaluator
//! in `openai` falls back to it whenever the model call fails.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::{Exercise, ItemId, ResponseMode};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
  pub grammar: u8,
  pub vocabulary: u8,
  pub naturalness: u8,
  pub item_usage: u8,
}

impl Scores {
  /// Neutral scores used when a model answer is unusable.
  pub const NEUTRAL: Scores = Scores { grammar: 3, vocabulary: 3, naturalness: 3, item_usage: 3 };

  pub fn clamped(self) -> Self {
    let c = |v: u8| v.clamp(1, 5);
    Scores {
      grammar: c(self.grammar),
      vocabulary: c(self.vocabulary),
      naturalness: c(self.naturalness),
      item_usage: c(self.item_usage),
    }
  }

  pub fn average(&self) -> f64 {
    (self.grammar as f64 + self.vocabulary as f64 + self.naturalness as f64 + self.item_usage as f64) / 4.0
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
  pub original: String,
  pub corrected: String,
  pub explanation: String,
  #[serde(default)]
  pub is_l1_interference: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MissedOpportunity {
  pub item_id: ItemId,
  pub suggestion: String,
}

/// Outcome of evaluating one response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseResult {
  pub exercise_id: String,
  pub response: String,
  pub response_mode: ResponseMode,
  pub scores: Scores,
  pub feedback: String,
  pub corrections: Vec<Correction>,
  pub items_used_correctly: Vec<ItemId>,
  pub missed_opportunities: Vec<MissedOpportunity>,
  pub xp_earned: u32,
}

#[async_trait]
pub trait Evaluator: Send + Sync {
  /// Never fails: implementations degrade to a heuristic or neutral result.
  async fn evaluate(&self, exercise: &Exercise, response: &str, mode: ResponseMode) -> ExerciseResult;
}

/// XP for one exercise: base 10, ±5 per point of average score around 2.5,
/// +5 per item used, floored at 5, times difficulty.
pub fn xp_for(scores: &Scores, items_used: usize, difficulty: u8) -> u32 {
  let score_bonus = ((scores.average() - 2.5) * 5.0).round() as i64;
  let base = (10 + score_bonus + 5 * items_used as i64).max(5);
  (base as u32) * difficulty as u32
}

struct L1Pattern {
  pattern: Regex,
  fix: &'static str,
}

// Compiled once; all patterns are case-insensitive.
static ITALIAN_PATTERNS: Lazy<Vec<L1Pattern>> = Lazy::new(|| {
  [
    (r"(?i)\bha(?:s|ve)\s+\w+ed\b.*\byesterday\b", "Use Past Simple (not Present Perfect) with \"yesterday\""),
    (r"(?i)\bdiscuss\s+about\b", "\"discuss\" doesn't need \"about\""),
    (r"(?i)\bdepend\s+from\b", "Use \"depend on\" not \"depend from\""),
    (r"(?i)\bmarried\s+with\b", "Use \"married to\" not \"married with\""),
    (r"(?i)\bi\s+have\s+\d+\s+years\b", "Say \"I am X years old\" not \"I have X years\""),
    (r"(?i)\bgo\s+at\s+home\b", "No preposition with \"home\": \"go home\""),
    (r"(?i)\bthe\s+life\s+is\b", "Abstract nouns usually take no article: \"life is\""),
    (r"(?i)\binformations\b", "\"Information\" is uncountable"),
    (r"(?i)\badvices\b", "\"Advice\" is uncountable"),
    (r"(?i)\bi\s+am\s+agree\b", "\"Agree\" is a verb: \"I agree\""),
  ]
  .into_iter()
  .filter_map(|(src, fix)| Regex::new(src).ok().map(|pattern| L1Pattern { pattern, fix }))
  .collect()
});

/// L1 interference corrections found in `response`, one per matching pattern.
fn l1_corrections(response: &str) -> Vec<Correction> {
  ITALIAN_PATTERNS
    .iter()
    .filter_map(|p| p.pattern.find(response).map(|m| (p, m.as_str())))
    .map(|(p, found)| Correction {
      original: found.to_string(),
      corrected: p.fix.to_string(),
      explanation: format!("This is a common Italian interference pattern. In English: {}", p.fix),
      is_l1_interference: true,
    })
    .collect()
}

/// Heuristic evaluator; also the fallback of the model-backed one.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalEvaluator;

impl LocalEvaluator {
  pub fn score(&self, exercise: &Exercise, response: &str, mode: ResponseMode) -> ExerciseResult {
    let lower = response.to_lowercase();

    let mut used = Vec::new();
    let mut missed = Vec::new();
    for item in &exercise.items {
      let content = item.content.to_lowercase();
      let main_word = content.split_whitespace().next().unwrap_or_default();
      if (!main_word.is_empty() && lower.contains(main_word)) || lower.contains(&content) {
        used.push(item.id);
      } else {
        missed.push(MissedOpportunity {
          item_id: item.id,
          suggestion: format!("You could have used \"{}\" when describing the situation.", item.content),
        });
      }
    }

    let corrections = l1_corrections(response);

    let total = exercise.items.len().max(1);
    let item_usage = ((used.len() as f64 / total as f64) * 5.0).round().clamp(1.0, 5.0) as u8;
    let scores = Scores {
      grammar: 5u8.saturating_sub(corrections.len() as u8).max(1),
      vocabulary: item_usage,
      naturalness: if response.len() > 20 { 4 } else { 3 },
      item_usage,
    };

    let mut feedback = if used.len() == exercise.items.len() && !used.is_empty() {
      "Excellent! You used all the target items correctly!".to_string()
    } else if !used.is_empty() {
      format!("Good effort! You used {}/{} target items.", used.len(), exercise.items.len())
    } else {
      "Try to include the target expressions in your answer.".to_string()
    };
    if !corrections.is_empty() {
      feedback.push_str(" Watch out for some grammar patterns.");
    }

    debug!(target: "exercise", id = %exercise.id, used = used.len(), corrections = corrections.len(), "Local evaluation");
    ExerciseResult {
      exercise_id: exercise.id.clone(),
      response: response.to_string(),
      response_mode: mode,
      xp_earned: xp_for(&scores, used.len(), exercise.difficulty),
      scores,
      feedback,
      corrections,
      items_used_correctly: used,
      missed_opportunities: missed,
    }
  }
}

#[async_trait]
impl Evaluator for LocalEvaluator {
  #[instrument(level = "info", skip(self, exercise, response), fields(id = %exercise.id, response_len = response.len()))]
  async fn evaluate(&self, exercise: &Exercise, response: &str, mode: ResponseMode) -> ExerciseResult {
    self.score(exercise, response, mode)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{CefrLevel, ExerciseType, LexicalType};
  use crate::generator::build_exercise;
  use crate::store::testing::item;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn exercise() -> Exercise {
    let mut a = item(1, LexicalType::PhrasalVerb, CefrLevel::B1, 1);
    a.content = "put off".into();
    let mut b = item(2, LexicalType::Idiom, CefrLevel::B1, 1);
    b.content = "break the ice".into();
    let mut c = item(3, LexicalType::Collocation, CefrLevel::B1, 1);
    c.content = "make a decision".into();
    build_exercise(ExerciseType::MultiItemScenario, vec![a, b, c], &mut StdRng::seed_from_u64(5))
  }

  #[test]
  fn detects_used_and_missed_items() {
    let ex = exercise();
    let r = LocalEvaluator.score(&ex, "I had to put off the meeting, so I tried to break the ice later.", ResponseMode::Written);
    assert_eq!(r.items_used_correctly, vec![ItemId(1), ItemId(2)]);
    assert_eq!(r.missed_opportunities.len(), 1);
    assert_eq!(r.missed_opportunities[0].item_id, ItemId(3));
    assert_eq!(r.scores.item_usage, 3);
    assert_eq!(r.scores.grammar, 5);
    assert_eq!(r.scores.naturalness, 4);
  }

  #[test]
  fn flags_l1_interference() {
    let ex = exercise();
    let r = LocalEvaluator.score(&ex, "We discuss about it. I have 30 years and I am agree.", ResponseMode::Spoken);
    assert_eq!(r.corrections.len(), 3);
    assert!(r.corrections.iter().all(|c| c.is_l1_interference));
    assert_eq!(r.scores.grammar, 2);
    assert!(r.items_used_correctly.is_empty());
    assert_eq!(r.scores.item_usage, 1);
  }

  #[test]
  fn l1_patterns_tolerate_punctuation_and_spacing() {
    let ex = exercise();
    let r = LocalEvaluator.score(&ex, "He has finished. I saw him yesterday.", ResponseMode::Written);
    assert_eq!(r.corrections.len(), 1);
    assert_eq!(r.corrections[0].original, "has finished. I saw him yesterday");

    let r = LocalEvaluator.score(&ex, "We discuss  about it.", ResponseMode::Written);
    assert_eq!(r.corrections.len(), 1);
    assert_eq!(r.corrections[0].original, "discuss  about");

    let r = LocalEvaluator.score(&ex, "I have\t25 years, my friend.", ResponseMode::Spoken);
    assert_eq!(r.corrections.len(), 1);
  }

  #[test]
  fn perfect_after_yesterday_is_not_flagged() {
    let ex = exercise();
    let r = LocalEvaluator.score(&ex, "Yesterday I went home; later I have needed nothing", ResponseMode::Written);
    assert!(r.corrections.is_empty());
    assert_eq!(r.scores.grammar, 5);
  }

  #[test]
  fn every_pattern_compiles() {
    assert_eq!(ITALIAN_PATTERNS.len(), 10);
  }

  #[test]
  fn xp_formula() {
    let s = Scores { grammar: 5, vocabulary: 5, naturalness: 5, item_usage: 5 };
    // 10 + round(12.5) + 15 = 38 (round half away from zero) → ×3
    assert_eq!(xp_for(&s, 3, 3), 114);
    let low = Scores { grammar: 1, vocabulary: 1, naturalness: 1, item_usage: 1 };
    assert_eq!(xp_for(&low, 0, 2), 10);
  }

  #[test]
  fn clamps_model_scores() {
    let s = Scores { grammar: 0, vocabulary: 9, naturalness: 3, item_usage: 5 }.clamped();
    assert_eq!(s, Scores { grammar: 1, vocabulary: 5, naturalness: 3, item_usage: 5 });
  }
}
