//! Exercise generator: turns a pool of items into a time-boxed sequence of
//! varied exercises.
//!
//! All random choices (pool shuffle, template pick, filler words, exercise
//! ids) go through the caller's `Rng`, so a seeded RNG reproduces a session
//! exactly.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::config::GeneratorConfig;
use crate::domain::{CefrLevel, Exercise, ExerciseType, Item, LexicalType};
use crate::store::{ItemCatalog, ItemQuery, PriorityOrder};
use crate::templates::{template, ACTIONS, QUESTIONS, TOPICS};
use crate::util::fill_template;

/// Caller options for one generated session.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
  pub duration_minutes: f64,
  pub user_level: String,
  #[serde(default)]
  pub focus_types: Option<Vec<ExerciseType>>,
  #[serde(default)]
  pub target_language: Option<String>,
}

/// CEFR band drawn from for a learner level: one below for reinforcement,
/// one above for challenge. Unknown levels get B1/B2.
pub fn levels_for(level: &str) -> Vec<CefrLevel> {
  use CefrLevel::*;
  match CefrLevel::parse(level) {
    Some(A1) => vec![A1],
    Some(A2) => vec![A1, A2],
    Some(B1) => vec![A2, B1, B2],
    Some(B2) => vec![B1, B2, C1],
    Some(C1) => vec![B2, C1, C2],
    Some(C2) => vec![C1, C2],
    None => vec![B1, B2],
  }
}

pub struct ExerciseGenerator {
  catalog: Arc<dyn ItemCatalog>,
  cfg: GeneratorConfig,
  store_timeout: Duration,
}

impl ExerciseGenerator {
  pub fn new(catalog: Arc<dyn ItemCatalog>, cfg: GeneratorConfig, store_timeout: Duration) -> Self {
    Self { catalog, cfg, store_timeout }
  }

  /// Items wanted for a session of this length: `floor(minutes / minutes_per_item)`.
  pub fn item_count(&self, minutes: f64) -> usize {
    (minutes.max(0.0) / self.cfg.minutes_per_item).floor() as usize
  }

  /// Per-type fetch sizes, each `ceil`'d independently (the sum may exceed `item_count`).
  pub fn type_allocation(&self, item_count: usize) -> Vec<(LexicalType, usize)> {
    let n = item_count as f64;
    let weight = |ty: LexicalType| match ty {
      LexicalType::PhrasalVerb => self.cfg.phrasal_verb_weight,
      LexicalType::Vocabulary => self.cfg.vocabulary_weight,
      LexicalType::Collocation => self.cfg.collocation_weight,
      LexicalType::Idiom => self.cfg.idiom_weight,
      LexicalType::Expression => self.cfg.expression_weight,
    };
    LexicalType::ALL.iter().map(|&ty| (ty, (n * weight(ty)).ceil() as usize)).collect()
  }

  /// Fetch the unshuffled item pool for a session, highest priority first
  /// within each lexical type. A failing type query contributes nothing.
  #[instrument(level = "info", skip(self))]
  pub async fn fetch_pool(&self, user_level: &str, minutes: f64, target_language: Option<&str>) -> Vec<Item> {
    let levels = levels_for(user_level);
    let mut pool = Vec::new();
    for (ty, count) in self.type_allocation(self.item_count(minutes)) {
      if count == 0 {
        continue;
      }
      let query = ItemQuery {
        target_language: target_language.map(str::to_string),
        lexical_type: Some(ty),
        levels: levels.clone(),
        order: PriorityOrder::Descending,
        limit: count,
        ..Default::default()
      };
      match timeout(self.store_timeout, self.catalog.query_items(&query)).await {
        Ok(Ok(items)) => {
          debug!(target: "exercise", ty = ty.as_str(), requested = count, got = items.len(), "Fetched items");
          pool.extend(items);
        }
        Ok(Err(e)) => warn!(target: "exercise", ty = ty.as_str(), error = %e, "Item query failed; skipping type"),
        Err(_) => warn!(target: "exercise", ty = ty.as_str(), "Item query timed out; skipping type"),
      }
    }
    pool
  }

  /// Select, shuffle and sequence a whole session.
  pub async fn generate_session<R: Rng + ?Sized>(&self, req: &SessionRequest, rng: &mut R) -> Vec<Exercise> {
    let pool = self.fetch_pool(&req.user_level, req.duration_minutes, req.target_language.as_deref()).await;
    self.plan_session(pool, req, rng)
  }

  /// Shuffle a fetched pool and sequence it according to the request.
  pub fn plan_session<R: Rng + ?Sized>(&self, mut pool: Vec<Item>, req: &SessionRequest, rng: &mut R) -> Vec<Exercise> {
    pool.shuffle(rng);
    self.build_exercises(&pool, req.duration_minutes, req.focus_types.as_deref(), rng)
  }

  /// Cycle the rotation round-robin over `items` in order until the time
  /// budget is spent or the items run out. The last exercise may overshoot
  /// the budget by at most its own estimate.
  pub fn build_exercises<R: Rng + ?Sized>(
    &self,
    items: &[Item],
    minutes: f64,
    focus: Option<&[ExerciseType]>,
    rng: &mut R,
  ) -> Vec<Exercise> {
    let rotation = match focus {
      Some(f) if !f.is_empty() => f,
      _ => self.cfg.rotation.as_slice(),
    };
    if rotation.is_empty() {
      return Vec::new();
    }

    let target_secs = minutes.max(0.0) * 60.0;
    let mut exercises = Vec::new();
    let mut total_secs = 0u32;
    let mut next_item = 0usize;

    while (total_secs as f64) < target_secs && next_item < items.len() {
      let ty = rotation[exercises.len() % rotation.len()];
      let take = ty.items_per_exercise().min(items.len() - next_item);
      let exercise = build_exercise(ty, items[next_item..next_item + take].to_vec(), rng);
      total_secs += exercise.time_estimate;
      next_item += take;
      exercises.push(exercise);
    }

    info!(target: "exercise", count = exercises.len(), total_secs, target_secs, items_used = next_item, "Session sequenced");
    exercises
  }
}

/// Render one exercise of type `ty` over `items` (non-empty).
pub fn build_exercise<R: Rng + ?Sized>(ty: ExerciseType, items: Vec<Item>, rng: &mut R) -> Exercise {
  let tpl = template(ty);
  let raw = tpl.prompts.choose(rng).copied().unwrap_or_default();

  let main = items.first().map(|i| i.content.clone()).unwrap_or_default();
  let items_list = items.iter().map(|i| format!("\"{}\"", i.content)).collect::<Vec<_>>().join(", ");
  let mut pick = |pool: &[&'static str], key: &str| -> &'static str {
    if raw.contains(key) { pool.choose(rng).copied().unwrap_or_default() } else { "" }
  };
  let topic = pick(TOPICS, "{topic}");
  let action = pick(ACTIONS, "{action}");
  let question = pick(QUESTIONS, "{question}");

  let prompt = fill_template(
    raw,
    &[
      ("word", main.as_str()),
      ("phrasal_verb", main.as_str()),
      ("items_list", items_list.as_str()),
      ("topic", topic),
      ("action", action),
      ("question", question),
    ],
  );

  Exercise {
    id: uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string(),
    exercise_type: ty,
    category: tpl.category,
    expected_elements: items.iter().map(|i| i.content.clone()).collect(),
    items,
    prompt,
    difficulty: tpl.difficulty,
    input_mode: tpl.input_mode,
    time_estimate: tpl.time_estimate,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ItemId;
  use crate::store::testing::{item, BrokenStore};
  use crate::store::MemoryStore;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn catalog() -> Arc<MemoryStore> {
    let mut items = Vec::new();
    let mut id = 0;
    for ty in LexicalType::ALL {
      for level in [CefrLevel::A1, CefrLevel::B1, CefrLevel::B2, CefrLevel::C2] {
        for p in 0..4 {
          id += 1;
          items.push(item(id, ty, level, p * 10 + id));
        }
      }
    }
    Arc::new(MemoryStore::with_items(items))
  }

  fn generator(store: Arc<dyn ItemCatalog>) -> ExerciseGenerator {
    ExerciseGenerator::new(store, GeneratorConfig::default(), Duration::from_secs(1))
  }

  fn request(minutes: f64) -> SessionRequest {
    SessionRequest { duration_minutes: minutes, user_level: "B1".into(), focus_types: None, target_language: None }
  }

  #[test]
  fn ten_minute_allocation_covers_item_count() {
    let g = generator(catalog());
    assert_eq!(g.item_count(10.0), 6);
    let alloc = g.type_allocation(6);
    let get = |ty: LexicalType| alloc.iter().find(|(t, _)| *t == ty).unwrap().1;
    assert_eq!(get(LexicalType::PhrasalVerb), 3);
    assert_eq!(get(LexicalType::Vocabulary), 2);
    assert_eq!(get(LexicalType::Collocation), 2);
    assert_eq!(get(LexicalType::Idiom), 1);
    assert_eq!(get(LexicalType::Expression), 1);
    assert!(alloc.iter().map(|(_, n)| n).sum::<usize>() >= 6);
  }

  #[test]
  fn level_bands() {
    assert_eq!(levels_for("B1"), vec![CefrLevel::A2, CefrLevel::B1, CefrLevel::B2]);
    assert_eq!(levels_for("c2"), vec![CefrLevel::C1, CefrLevel::C2]);
    assert_eq!(levels_for("expert"), vec![CefrLevel::B1, CefrLevel::B2]);
  }

  #[tokio::test]
  async fn pool_respects_band_and_priority() {
    let g = generator(catalog());
    let pool = g.fetch_pool("B1", 10.0, None).await;
    assert_eq!(pool.len(), 9);
    assert!(pool.iter().all(|i| matches!(i.cefr_level, CefrLevel::A2 | CefrLevel::B1 | CefrLevel::B2)));
    let pv: Vec<i64> = pool.iter().filter(|i| i.lexical_type == LexicalType::PhrasalVerb).map(|i| i.priority).collect();
    assert!(pv.windows(2).all(|w| w[0] >= w[1]));
  }

  #[tokio::test]
  async fn seeded_rng_reproduces_session() {
    let g = generator(catalog());
    let a = g.generate_session(&request(10.0), &mut StdRng::seed_from_u64(7)).await;
    let b = g.generate_session(&request(10.0), &mut StdRng::seed_from_u64(7)).await;
    assert!(!a.is_empty());
    assert_eq!(a, b);
  }

  #[tokio::test]
  async fn time_budget_overshoots_by_at_most_one_exercise() {
    let g = generator(catalog());
    for seed in 0..20 {
      let out = g.generate_session(&request(10.0), &mut StdRng::seed_from_u64(seed)).await;
      let total: u32 = out.iter().map(|e| e.time_estimate).sum();
      let last = out.last().map_or(0, |e| e.time_estimate);
      assert!(total <= 600 + last);
      assert!(total - last < 600);
    }
  }

  #[test]
  fn rotation_is_round_robin_and_multi_item_takes_three() {
    let g = generator(catalog());
    let items: Vec<Item> = (1..=20).map(|i| item(i, LexicalType::Idiom, CefrLevel::B1, i)).collect();
    let focus = [ExerciseType::Dictation, ExerciseType::MultiItemScenario];
    let out = g.build_exercises(&items, 60.0, Some(&focus[..]), &mut StdRng::seed_from_u64(1));
    assert_eq!(out[0].exercise_type, ExerciseType::Dictation);
    assert_eq!(out[1].exercise_type, ExerciseType::MultiItemScenario);
    assert_eq!(out[1].items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![ItemId(2), ItemId(3), ItemId(4)]);
    assert_eq!(out[2].items[0].id, ItemId(5));
    assert!(out[1].prompt.contains("\"item-2\", \"item-3\", \"item-4\""));
  }

  #[test]
  fn exhausted_pool_ends_session_early() {
    let g = generator(catalog());
    let items: Vec<Item> = (1..=2).map(|i| item(i, LexicalType::Idiom, CefrLevel::B1, i)).collect();
    let out = g.build_exercises(&items, 30.0, Some(&[ExerciseType::Paraphrase][..]), &mut StdRng::seed_from_u64(3));
    assert_eq!(out.len(), 2);
  }

  #[test]
  fn placeholders_are_filled_or_left_literal() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..30 {
      let ex = build_exercise(ExerciseType::Paraphrase, vec![item(9, LexicalType::PhrasalVerb, CefrLevel::B1, 1)], &mut rng);
      assert!(ex.prompt.contains("item-9"));
      assert!(ex.prompt.contains("{original_sentence}"));
      assert_eq!(ex.expected_elements, vec!["item-9".to_string()]);

      let sit = build_exercise(ExerciseType::SituationResponse, vec![item(9, LexicalType::Idiom, CefrLevel::B1, 1)], &mut rng);
      assert!(!sit.prompt.contains("{topic}") && !sit.prompt.contains("{action}"));
    }
  }

  #[tokio::test]
  async fn failing_catalog_yields_empty_session() {
    let g = generator(Arc::new(BrokenStore));
    let out = g.generate_session(&request(10.0), &mut StdRng::seed_from_u64(0)).await;
    assert!(out.is_empty());
  }
}
