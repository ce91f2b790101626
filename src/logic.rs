//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Selecting a learner's session items (four buckets)
//!   - Generating an exercise session, from the schedule when there is one
//!   - Recording reviews and spontaneous usage
//!   - Evaluating a response and feeding the outcome back into SM-2

use tokio::time::timeout;
use tracing::{debug, info, instrument};

use crate::domain::{Exercise, ItemId, LearnerId, Quality, ResponseMode, ReviewState};
use crate::error::{CoreError, CoreResult, StoreError};
use crate::evaluator::ExerciseResult;
use crate::generator::SessionRequest;
use crate::protocol::SessionItemsOut;
use crate::state::AppState;
use crate::store::ItemCatalog;

/// Session length used when a caller gives none.
pub const DEFAULT_SESSION_MINUTES: f64 = 20.0;

/// Validate a wire quality value.
pub fn parse_quality(raw: i64) -> CoreResult<Quality> {
  u8::try_from(raw)
    .map_err(|_| CoreError::InvalidQuality(raw))
    .and_then(Quality::new)
}

#[instrument(level = "info", skip(state))]
pub async fn session_items(
  state: &AppState,
  learner: Option<&LearnerId>,
  language: &str,
  minutes: f64,
) -> SessionItemsOut {
  let plan = state.selector.plan(minutes);
  let items = state.selector.select_session_items(learner, language, minutes).await;
  SessionItemsOut { plan, items }
}

/// Build and remember an exercise session.
///
/// A known learner with scheduled items practices those, in bucket order.
/// Otherwise (anonymous, or nothing scheduled) the generator draws a fresh
/// pool from the catalog for the requested level.
#[instrument(level = "info", skip(state, req), fields(minutes = req.duration_minutes, level = %req.user_level))]
pub async fn generate_session(state: &AppState, learner: Option<&LearnerId>, req: &SessionRequest) -> Vec<Exercise> {
  let language = req.target_language.as_deref().unwrap_or("en");
  let scheduled = state
    .selector
    .select_session_items(learner, language, req.duration_minutes)
    .await
    .flatten();

  let exercises = if scheduled.is_empty() {
    let pool = state
      .generator
      .fetch_pool(&req.user_level, req.duration_minutes, req.target_language.as_deref())
      .await;
    let mut rng = state.rng.lock().await;
    state.generator.plan_session(pool, req, &mut *rng)
  } else {
    debug!(target: "exercise", items = scheduled.len(), "Sequencing scheduled items");
    let mut rng = state.rng.lock().await;
    state
      .generator
      .build_exercises(&scheduled, req.duration_minutes, req.focus_types.as_deref(), &mut *rng)
  };

  state.remember_exercises(&exercises).await;
  exercises
}

async fn ensure_item(state: &AppState, item: ItemId) -> CoreResult<()> {
  let limit = state.config.scheduler.store_timeout();
  let found = timeout(limit, state.store.get_item(item))
    .await
    .unwrap_or(Err(StoreError::Timeout(limit)))?;
  match found {
    Some(_) => Ok(()),
    None => Err(CoreError::UnknownItem(item)),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn record_review(
  state: &AppState,
  learner: Option<&LearnerId>,
  item: ItemId,
  quality: i64,
) -> CoreResult<Option<ReviewState>> {
  let quality = parse_quality(quality)?;
  ensure_item(state, item).await?;
  state.progress.apply_review(learner, item, quality).await
}

#[instrument(level = "info", skip(state, context), fields(context_len = context.len()))]
pub async fn record_usage(
  state: &AppState,
  learner: Option<&LearnerId>,
  item: ItemId,
  context: &str,
  quality: i64,
) -> CoreResult<Option<ReviewState>> {
  let quality = parse_quality(quality)?;
  ensure_item(state, item).await?;
  state.progress.log_spontaneous_usage(learner, item, context, quality).await
}

/// Evaluate a response to `exercise` and apply the outcome to each target item.
#[instrument(level = "info", skip(state, exercise, response), fields(id = %exercise.id, response_len = response.len()))]
pub async fn evaluate_exercise(
  state: &AppState,
  learner: Option<&LearnerId>,
  exercise: &Exercise,
  response: &str,
  mode: ResponseMode,
) -> CoreResult<(ExerciseResult, Vec<ReviewState>)> {
  let result = state.evaluator.evaluate(exercise, response, mode).await;
  let reviews = state.progress.apply_evaluation(learner, exercise, &result).await?;
  info!(
    target: "exercise",
    id = %exercise.id,
    used = result.items_used_correctly.len(),
    xp = result.xp_earned,
    reviews = reviews.len(),
    "Response evaluated"
  );
  Ok((result, reviews))
}

/// Same as `evaluate_exercise`, for an exercise handed out earlier by id.
/// Each handed-out exercise can be evaluated once.
pub async fn evaluate_by_id(
  state: &AppState,
  learner: Option<&LearnerId>,
  exercise_id: &str,
  response: &str,
  mode: ResponseMode,
) -> CoreResult<(ExerciseResult, Vec<ReviewState>)> {
  let exercise = state
    .get_exercise(exercise_id)
    .await
    .ok_or_else(|| CoreError::UnknownExercise(exercise_id.to_string()))?;
  let out = evaluate_exercise(state, learner, &exercise, response, mode).await?;
  // Answered; a failed evaluation above leaves it in place for a retry.
  state.forget_exercise(exercise_id).await;
  Ok(out)
}

/// Sum of exercise time estimates.
pub fn total_seconds(exercises: &[Exercise]) -> u32 {
  exercises.iter().map(|e| e.time_estimate).sum()
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::config::AppConfig;
  use crate::evaluator::LocalEvaluator;
  use crate::seeds::seed_items;
  use crate::sm2::FixedClock;
  use crate::store::testing::{day, learner};
  use crate::store::MemoryStore;

  fn state() -> AppState {
    let mut cfg = AppConfig::default();
    cfg.generator.rng_seed = Some(5);
    AppState::with_parts(cfg, MemoryStore::with_items(seed_items()), Arc::new(FixedClock::on(day(1))), Arc::new(LocalEvaluator))
  }

  fn request() -> SessionRequest {
    SessionRequest { duration_minutes: 10.0, user_level: "B1".into(), focus_types: None, target_language: None }
  }

  #[test]
  fn quality_bounds() {
    assert!(parse_quality(0).is_ok());
    assert!(parse_quality(5).is_ok());
    assert!(matches!(parse_quality(6), Err(CoreError::InvalidQuality(6))));
    assert!(matches!(parse_quality(-1), Err(CoreError::InvalidQuality(-1))));
  }

  #[tokio::test]
  async fn anonymous_generation_draws_from_catalog() {
    let st = state();
    let out = generate_session(&st, None, &request()).await;
    assert!(!out.is_empty());
    assert!(st.get_exercise(&out[0].id).await.is_some());
  }

  #[tokio::test]
  async fn scheduled_items_come_first_for_known_learner() {
    let st = state();
    record_review(&st, Some(&learner()), ItemId(61), 1).await.unwrap();
    let out = generate_session(&st, Some(&learner()), &request()).await;
    // item 61 is now weak, so it leads the scheduled list
    assert_eq!(out[0].items[0].id, ItemId(61));
  }

  #[tokio::test]
  async fn unknown_item_is_rejected() {
    let st = state();
    let err = record_review(&st, Some(&learner()), ItemId(9999), 4).await.unwrap_err();
    assert!(matches!(err, CoreError::UnknownItem(ItemId(9999))));
  }

  #[tokio::test]
  async fn evaluation_feeds_progress() {
    let st = state();
    let out = generate_session(&st, None, &request()).await;
    let ex = &out[0];
    let answer = ex.items.iter().map(|i| i.content.clone()).collect::<Vec<_>>().join(" and ");
    let (result, reviews) = evaluate_by_id(&st, Some(&learner()), &ex.id, &answer, ResponseMode::Written).await.unwrap();
    assert_eq!(result.items_used_correctly.len(), ex.items.len());
    assert_eq!(reviews.len(), ex.items.len());
    assert!(reviews.iter().all(|r| r.times_correct == 1));

    let missing = evaluate_by_id(&st, None, "nope", "x", ResponseMode::Written).await.unwrap_err();
    assert!(matches!(missing, CoreError::UnknownExercise(_)));

    // answered exercises are dropped from the pending set
    let again = evaluate_by_id(&st, Some(&learner()), &ex.id, &answer, ResponseMode::Written).await.unwrap_err();
    assert!(matches!(again, CoreError::UnknownExercise(_)));
  }

  #[tokio::test]
  async fn pending_exercises_stay_bounded() {
    let mut cfg = AppConfig::default();
    cfg.generator.rng_seed = Some(9);
    cfg.generator.max_pending_exercises = 20;
    let st = AppState::with_parts(cfg, MemoryStore::with_items(seed_items()), Arc::new(FixedClock::on(day(1))), Arc::new(LocalEvaluator));

    for _ in 0..50 {
      generate_session(&st, None, &request()).await;
    }
    let last = generate_session(&st, None, &request()).await;
    assert_eq!(st.exercises.read().await.len(), 20);
    // the latest session is still answerable
    assert!(st.get_exercise(&last[last.len() - 1].id).await.is_some());
  }
}
