//! Progress updater: writes review outcomes and spontaneous-usage events back
//! into the review store.
//!
//! Every update is read → compute → version-checked upsert. A concurrent
//! writer on the same (learner, item) makes the upsert fail with a conflict,
//! in which case the state is re-read and the update recomputed. A usage
//! event commits its state change and audit entry in one store call, so a
//! failed write changes nothing and is safe to retry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::domain::{Exercise, ItemId, LearnerId, Quality, ReviewState, UsageLogEntry};
use crate::error::{CoreError, CoreResult, StoreError};
use crate::evaluator::ExerciseResult;
use crate::sm2::{next_state, Clock};
use crate::store::ReviewStore;

const MASTERY_STEP: f64 = 0.1;

pub struct ProgressUpdater {
  reviews: Arc<dyn ReviewStore>,
  clock: Arc<dyn Clock>,
  store_timeout: Duration,
  max_attempts: u32,
}

impl ProgressUpdater {
  pub fn new(reviews: Arc<dyn ReviewStore>, clock: Arc<dyn Clock>, cfg: &SchedulerConfig) -> Self {
    Self {
      reviews,
      clock,
      store_timeout: cfg.store_timeout(),
      max_attempts: cfg.max_upsert_attempts.max(1),
    }
  }

  /// Apply one graded review. `None` learner is a no-op.
  #[instrument(level = "info", skip(self), fields(quality = quality.value()))]
  pub async fn apply_review(
    &self,
    learner: Option<&LearnerId>,
    item: ItemId,
    quality: Quality,
  ) -> CoreResult<Option<ReviewState>> {
    let Some(learner) = learner else { return Ok(None) };
    let today = self.clock.today();
    let now = self.clock.now();

    let stored = self
      .update(learner, item, None, |mut state| {
        let sm2 = next_state(quality, state.ease_factor, state.interval_days, state.repetitions, today);
        state.ease_factor = sm2.ease_factor;
        state.interval_days = sm2.interval_days;
        state.repetitions = sm2.repetitions;
        state.next_review = sm2.next_review;
        state.last_reviewed = Some(now);
        if quality.is_pass() {
          state.mastery = (state.mastery + MASTERY_STEP).clamp(0.0, 1.0);
          state.times_correct += 1;
        } else {
          state.mastery = (state.mastery - MASTERY_STEP).clamp(0.0, 1.0);
          state.times_incorrect += 1;
        }
        state
      })
      .await?;

    info!(
      target: "progress",
      %learner, %item,
      ef = stored.ease_factor,
      interval = stored.interval_days,
      reps = stored.repetitions,
      next = %stored.next_review,
      mastery = stored.mastery,
      "Review applied"
    );
    Ok(Some(stored))
  }

  /// Record an unprompted real-world use of an item and append the audit entry.
  #[instrument(level = "info", skip(self, context), fields(context_len = context.len(), quality = quality.value()))]
  pub async fn log_spontaneous_usage(
    &self,
    learner: Option<&LearnerId>,
    item: ItemId,
    context: &str,
    quality: Quality,
  ) -> CoreResult<Option<ReviewState>> {
    let Some(learner) = learner else { return Ok(None) };
    let today = self.clock.today();
    let entry = UsageLogEntry {
      learner_id: learner.clone(),
      item_id: item,
      context: context.to_string(),
      quality,
      was_prompted: false,
      logged_at: self.clock.now(),
    };

    let stored = self
      .update(learner, item, Some(&entry), |mut state| {
        state.times_used_spontaneously += 1;
        state.last_used = Some(today);
        if !state.usage_contexts.iter().any(|c| c == context) {
          state.usage_contexts.push(context.to_string());
        }
        state
      })
      .await?;

    info!(target: "progress", %learner, %item, uses = stored.times_used_spontaneously, "Spontaneous usage logged");
    Ok(Some(stored))
  }

  /// Feed an evaluated exercise back: quality 4 for each target item the
  /// learner used correctly, 2 for the rest.
  pub async fn apply_evaluation(
    &self,
    learner: Option<&LearnerId>,
    exercise: &Exercise,
    result: &ExerciseResult,
  ) -> CoreResult<Vec<ReviewState>> {
    let mut out = Vec::new();
    for item in &exercise.items {
      let quality = if result.items_used_correctly.contains(&item.id) {
        Quality::USED_CORRECTLY
      } else {
        Quality::NOT_USED
      };
      if let Some(state) = self.apply_review(learner, item.id, quality).await? {
        out.push(state);
      }
    }
    Ok(out)
  }

  /// Read-modify-write loop with optimistic concurrency. With `audit`, the
  /// entry is committed atomically alongside the new state.
  async fn update<F>(
    &self,
    learner: &LearnerId,
    item: ItemId,
    audit: Option<&UsageLogEntry>,
    apply: F,
  ) -> CoreResult<ReviewState>
  where
    F: Fn(ReviewState) -> ReviewState,
  {
    for attempt in 1..=self.max_attempts {
      let current = self
        .with_timeout(self.reviews.get_review(learner, item))
        .await?
        .unwrap_or_else(|| ReviewState::fresh(learner.clone(), item, self.clock.today()));
      let expected = current.version;
      let next = apply(current);

      let write = match audit {
        Some(entry) => self.with_timeout(self.reviews.upsert_usage(next, expected, entry.clone())).await,
        None => self.with_timeout(self.reviews.upsert_review(next, expected)).await,
      };
      match write {
        Ok(stored) => return Ok(stored),
        Err(StoreError::Conflict { expected, found }) => {
          warn!(target: "progress", %learner, %item, attempt, expected, found, "Concurrent update; retrying");
        }
        Err(e) => return Err(e.into()),
      }
    }
    Err(CoreError::ContendedUpdate { item, attempts: self.max_attempts })
  }

  async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
    timeout(self.store_timeout, fut).await.unwrap_or(Err(StoreError::Timeout(self.store_timeout)))
  }
}
