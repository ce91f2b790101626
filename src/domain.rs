//! Domain models used by the backend: catalog items, per-learner review state,
//! the usage audit log, and the generated exercises.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Catalog identifier of a learnable item.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Identity of the learner, as supplied by the identity/session context.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct LearnerId(pub String);

impl fmt::Display for LearnerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Lexical category of an item.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LexicalType {
  Vocabulary,
  PhrasalVerb,
  Collocation,
  Idiom,
  Expression,
}

impl LexicalType {
  pub const ALL: [LexicalType; 5] = [
    LexicalType::PhrasalVerb,
    LexicalType::Vocabulary,
    LexicalType::Collocation,
    LexicalType::Idiom,
    LexicalType::Expression,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      LexicalType::Vocabulary => "vocabulary",
      LexicalType::PhrasalVerb => "phrasal_verb",
      LexicalType::Collocation => "collocation",
      LexicalType::Idiom => "idiom",
      LexicalType::Expression => "expression",
    }
  }
}

/// Common European Framework level.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CefrLevel { A1, A2, B1, B2, C1, C2 }

impl CefrLevel {
  /// Parse "b1" / "B1". Anything else is `None`.
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_uppercase().as_str() {
      "A1" => Some(CefrLevel::A1),
      "A2" => Some(CefrLevel::A2),
      "B1" => Some(CefrLevel::B1),
      "B2" => Some(CefrLevel::B2),
      "C1" => Some(CefrLevel::C1),
      "C2" => Some(CefrLevel::C2),
      _ => None,
    }
  }
}

/// A learnable unit from the content catalog. Immutable after seeding.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
  pub id: ItemId,
  pub content: String,
  #[serde(rename = "type")]
  pub lexical_type: LexicalType,
  pub cefr_level: CefrLevel,
  pub target_language: String,
  /// Catalog rank. New items are introduced lowest rank first; the
  /// exercise generator draws its pools highest rank first.
  pub priority: i64,
  #[serde(default)] pub definition: Option<String>,
  #[serde(default)] pub examples: Vec<String>,
}

pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Review record for one (learner, item) pair.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
  pub learner_id: LearnerId,
  pub item_id: ItemId,
  pub ease_factor: f64,
  pub interval_days: u32,
  pub repetitions: u32,
  pub next_review: NaiveDate,
  pub mastery: f64,
  pub times_correct: u32,
  pub times_incorrect: u32,
  pub times_used_spontaneously: u32,
  pub last_used: Option<NaiveDate>,
  pub last_reviewed: Option<DateTime<Utc>>,
  pub usage_contexts: Vec<String>,
  /// Optimistic-concurrency stamp; 0 means "never stored".
  pub version: u64,
}

impl ReviewState {
  /// Default state for a pair that has never been reviewed.
  pub fn fresh(learner_id: LearnerId, item_id: ItemId, today: NaiveDate) -> Self {
    Self {
      learner_id,
      item_id,
      ease_factor: DEFAULT_EASE_FACTOR,
      interval_days: 0,
      repetitions: 0,
      next_review: today,
      mastery: 0.0,
      times_correct: 0,
      times_incorrect: 0,
      times_used_spontaneously: 0,
      last_used: None,
      last_reviewed: None,
      usage_contexts: Vec::new(),
      version: 0,
    }
  }

  /// Reviewed at least once, never used outside of drills.
  pub fn has_usage_debt(&self) -> bool {
    self.times_used_spontaneously == 0 && self.repetitions > 0
  }
}

/// A review state joined with its catalog item.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledItem {
  pub item: Item,
  pub state: ReviewState,
}

/// Append-only audit record of a spontaneous (unprompted) use.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageLogEntry {
  pub learner_id: LearnerId,
  pub item_id: ItemId,
  pub context: String,
  pub quality: Quality,
  pub was_prompted: bool,
  pub logged_at: DateTime<Utc>,
}

/// Recall quality on the SM-2 0..=5 scale
/// (0-2 incorrect, 3 hard pass, 4 good, 5 easy).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub struct Quality(u8);

impl Quality {
  pub const MAX: u8 = 5;
  /// Score fed into SM-2 when an evaluated exercise used the item correctly.
  pub const USED_CORRECTLY: Quality = Quality(4);
  pub const NOT_USED: Quality = Quality(2);

  pub fn new(value: u8) -> Result<Self, CoreError> {
    if value > Self::MAX {
      return Err(CoreError::InvalidQuality(value as i64));
    }
    Ok(Self(value))
  }

  pub fn value(self) -> u8 { self.0 }

  pub fn is_pass(self) -> bool { self.0 >= 3 }
}

impl TryFrom<u8> for Quality {
  type Error = CoreError;
  fn try_from(value: u8) -> Result<Self, Self::Error> { Quality::new(value) }
}

impl From<Quality> for u8 {
  fn from(q: Quality) -> u8 { q.0 }
}

/// Broad skill an exercise trains.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseCategory {
  Speaking,
  Writing,
  Listening,
  Grammar,
  Integration,
}

/// How the learner is expected to answer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputMode { Write, Speak, Both }

/// How the learner actually answered.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
  #[default]
  Written,
  Spoken,
}

/// Closed set of exercise kinds. The per-kind attributes live in `templates`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
  // speaking
  SituationResponse,
  Roleplay,
  PictureDescription,
  OpinionExpress,
  StoryContinue,
  // writing
  ContextResponse,
  EmailDraft,
  Paraphrase,
  ErrorCorrection,
  // listening
  Dictation,
  Comprehension,
  // grammar
  TenseTransform,
  L1InterferenceFix,
  SentenceBuild,
  // integration
  MultiItemScenario,
}

impl ExerciseType {
  pub const ALL: [ExerciseType; 15] = [
    ExerciseType::SituationResponse,
    ExerciseType::Roleplay,
    ExerciseType::PictureDescription,
    ExerciseType::OpinionExpress,
    ExerciseType::StoryContinue,
    ExerciseType::ContextResponse,
    ExerciseType::EmailDraft,
    ExerciseType::Paraphrase,
    ExerciseType::ErrorCorrection,
    ExerciseType::Dictation,
    ExerciseType::Comprehension,
    ExerciseType::TenseTransform,
    ExerciseType::L1InterferenceFix,
    ExerciseType::SentenceBuild,
    ExerciseType::MultiItemScenario,
  ];

  /// Number of items one exercise of this kind consumes.
  pub fn items_per_exercise(&self) -> usize {
    match self {
      ExerciseType::MultiItemScenario => 3,
      _ => 1,
    }
  }
}

/// Ephemeral exercise descriptor; lives only for the duration of a session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
  pub id: String,
  #[serde(rename = "type")]
  pub exercise_type: ExerciseType,
  pub category: ExerciseCategory,
  pub items: Vec<Item>,
  pub prompt: String,
  pub expected_elements: Vec<String>,
  pub difficulty: u8,
  pub input_mode: InputMode,
  /// Seconds.
  pub time_estimate: u32,
}
