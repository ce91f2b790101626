//! Loading backend configuration (scheduler ratios, generator mix, evaluator
//! prompts) from TOML.
//!
//! Every field has a default, so an empty file or a missing LEXIS_CONFIG_PATH
//! yields the stock behavior. See `AppConfig` for the expected schema.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::ExerciseType;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub scheduler: SchedulerConfig,
  #[serde(default)]
  pub generator: GeneratorConfig,
  #[serde(default)]
  pub prompts: Prompts,
}

/// How per-bucket counts relate to the total item budget.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BucketRounding {
  /// Floor each bucket on its own; the sum may drift below the total.
  #[default]
  Independent,
  /// Largest-remainder apportionment; buckets sum to the total before the new-item cap.
  Reconciled,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
  pub items_per_minute: f64,
  pub overdue_share: f64,
  pub weakness_share: f64,
  pub new_share: f64,
  pub integration_share: f64,
  /// Absolute cap on new items per session.
  pub max_new_items: usize,
  /// Mastery below this counts as a weakness.
  pub weakness_threshold: f64,
  pub rounding: BucketRounding,
  /// Per-call timeout applied to every store access, in milliseconds.
  pub store_timeout_ms: u64,
  /// Read-compute-upsert attempts before a contended update gives up.
  pub max_upsert_attempts: u32,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      items_per_minute: 2.0,
      overdue_share: 0.4,
      weakness_share: 0.3,
      new_share: 0.2,
      integration_share: 0.1,
      max_new_items: 5,
      weakness_threshold: 0.5,
      rounding: BucketRounding::Independent,
      store_timeout_ms: 3_000,
      max_upsert_attempts: 3,
    }
  }
}

impl SchedulerConfig {
  pub fn store_timeout(&self) -> Duration { Duration::from_millis(self.store_timeout_ms) }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
  pub minutes_per_item: f64,
  pub phrasal_verb_weight: f64,
  pub vocabulary_weight: f64,
  pub collocation_weight: f64,
  pub idiom_weight: f64,
  pub expression_weight: f64,
  /// Exercise rotation used when the caller gives no focus types.
  pub rotation: Vec<ExerciseType>,
  /// Fixed seed for the shared RNG; unset = seeded from OS entropy.
  pub rng_seed: Option<u64>,
  /// Handed-out exercises kept for evaluation by id; oldest evicted first.
  pub max_pending_exercises: usize,
}

impl Default for GeneratorConfig {
  fn default() -> Self {
    Self {
      minutes_per_item: 1.5,
      phrasal_verb_weight: 0.35,
      vocabulary_weight: 0.25,
      collocation_weight: 0.25,
      idiom_weight: 0.10,
      expression_weight: 0.05,
      rotation: vec![
        ExerciseType::SituationResponse,
        ExerciseType::ContextResponse,
        ExerciseType::Paraphrase,
        ExerciseType::OpinionExpress,
        ExerciseType::SentenceBuild,
        ExerciseType::Roleplay,
        ExerciseType::MultiItemScenario,
      ],
      rng_seed: None,
      max_pending_exercises: 512,
    }
  }
}

/// Prompts used by the OpenAI evaluator. Override in TOML to tune tone or
/// the learner profile.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// Substituted for `{level}` in the system prompt.
  pub learner_level: String,
  pub evaluation_system: String,
  pub evaluation_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      learner_level: "B1/B2".into(),
      evaluation_system: "You are an English tutor for an Italian native speaker at {level} level. Be encouraging but honest. Flag Italian interference patterns (wrong prepositions, tense errors with \"yesterday\"/\"last week\"). If a target item was not used, suggest where it could have been. Respond ONLY with strict JSON.".into(),
      evaluation_user_template: "EXERCISE TYPE: {exercise_type}\nPROMPT: {prompt}\n\nTARGET ITEMS TO USE:\n{items}\n\nUSER'S RESPONSE:\n\"{response}\"\n\nReturn JSON: {\"scores\": {\"grammar\": 1-5, \"vocabulary\": 1-5, \"naturalness\": 1-5, \"itemUsage\": 1-5}, \"feedback\": string, \"corrections\": [{\"original\": string, \"corrected\": string, \"explanation\": string, \"isL1Interference\": boolean}], \"itemsUsedCorrectly\": [item ids], \"missedOpportunities\": [{\"itemId\": id, \"suggestion\": string}]}".into(),
    }
  }
}

/// Attempt to load `AppConfig` from LEXIS_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("LEXIS_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "lexis_backend", %path, "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "lexis_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "lexis_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg: AppConfig = toml::from_str(
      r#"
      [scheduler]
      rounding = "reconciled"
      max_new_items = 3

      [generator]
      rotation = ["dictation", "multi_item_scenario"]
      rng_seed = 42
      "#,
    )
    .unwrap();
    assert_eq!(cfg.scheduler.rounding, BucketRounding::Reconciled);
    assert_eq!(cfg.scheduler.max_new_items, 3);
    assert_eq!(cfg.scheduler.items_per_minute, 2.0);
    assert_eq!(cfg.generator.rotation, vec![ExerciseType::Dictation, ExerciseType::MultiItemScenario]);
    assert_eq!(cfg.generator.rng_seed, Some(42));
    assert_eq!(cfg.generator.minutes_per_item, 1.5);
    assert!(cfg.prompts.evaluation_system.contains("JSON"));
  }

  #[test]
  fn empty_toml_is_default() {
    let cfg: AppConfig = toml::from_str("").unwrap();
    assert_eq!(cfg.scheduler.max_new_items, 5);
    assert_eq!(cfg.generator.rotation.len(), 7);
    assert_eq!(cfg.generator.max_pending_exercises, 512);
  }
}
