//! Session item selector.
//!
//! Splits a session's item budget across four priority buckets (overdue
//! reviews, weak items, new items, usage debt) and fills each from the store.
//! Buckets are isolated: a failing or slow query empties its own bucket only.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::config::{BucketRounding, SchedulerConfig};
use crate::domain::{Item, ItemId, LearnerId, ScheduledItem};
use crate::sm2::Clock;
use crate::store::{ItemCatalog, ItemQuery, PriorityOrder, ReviewStore, StoreResult};

/// Target size of each bucket for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPlan {
  pub total: usize,
  pub overdue: usize,
  pub weakness: usize,
  pub new: usize,
  pub integration: usize,
}

impl BucketPlan {
  pub fn for_minutes(minutes: f64, cfg: &SchedulerConfig) -> Self {
    let total = (minutes.max(0.0) * cfg.items_per_minute).floor() as usize;
    let shares = [cfg.overdue_share, cfg.weakness_share, cfg.new_share, cfg.integration_share];
    let counts = match cfg.rounding {
      BucketRounding::Independent => shares.map(|s| (total as f64 * s).floor() as usize),
      BucketRounding::Reconciled => apportion(total, shares),
    };
    Self {
      total,
      overdue: counts[0],
      weakness: counts[1],
      new: counts[2].min(cfg.max_new_items),
      integration: counts[3],
    }
  }
}

/// Largest-remainder apportionment of `total` over normalized `shares`.
fn apportion(total: usize, shares: [f64; 4]) -> [usize; 4] {
  let sum: f64 = shares.iter().sum();
  if sum <= 0.0 {
    return [0; 4];
  }
  let exact = shares.map(|s| total as f64 * s / sum);
  let mut counts = exact.map(|e| e.floor() as usize);
  let assigned: usize = counts.iter().sum();

  let mut order: Vec<usize> = (0..4).collect();
  // Stable sort keeps bucket priority order among equal remainders.
  order.sort_by(|&a, &b| (exact[b] - exact[b].floor()).total_cmp(&(exact[a] - exact[a].floor())));
  for &i in order.iter().take(total.saturating_sub(assigned)) {
    counts[i] += 1;
  }
  counts
}

/// The four buckets of one session.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionItems {
  pub overdue: Vec<ScheduledItem>,
  pub weakness: Vec<ScheduledItem>,
  pub new: Vec<Item>,
  pub integration: Vec<ScheduledItem>,
}

impl SessionItems {
  pub fn is_empty(&self) -> bool {
    self.overdue.is_empty() && self.weakness.is_empty() && self.new.is_empty() && self.integration.is_empty()
  }

  /// Flat item list in bucket priority order; an item in several buckets
  /// appears once, at its first position.
  pub fn flatten(&self) -> Vec<Item> {
    let mut seen = HashSet::<ItemId>::new();
    let reviewed = self.overdue.iter().chain(&self.weakness).map(|s| &s.item);
    let debt = self.integration.iter().map(|s| &s.item);
    reviewed
      .chain(self.new.iter())
      .chain(debt)
      .filter(|i| seen.insert(i.id))
      .cloned()
      .collect()
  }
}

pub struct SessionItemSelector {
  catalog: Arc<dyn ItemCatalog>,
  reviews: Arc<dyn ReviewStore>,
  clock: Arc<dyn Clock>,
  cfg: SchedulerConfig,
}

impl SessionItemSelector {
  pub fn new(
    catalog: Arc<dyn ItemCatalog>,
    reviews: Arc<dyn ReviewStore>,
    clock: Arc<dyn Clock>,
    cfg: SchedulerConfig,
  ) -> Self {
    Self { catalog, reviews, clock, cfg }
  }

  pub fn plan(&self, session_minutes: f64) -> BucketPlan {
    BucketPlan::for_minutes(session_minutes, &self.cfg)
  }

  #[instrument(level = "info", skip(self))]
  pub async fn select_session_items(
    &self,
    learner: Option<&LearnerId>,
    target_language: &str,
    session_minutes: f64,
  ) -> SessionItems {
    let Some(learner) = learner else {
      info!(target: "scheduler", "No learner in context; returning empty buckets");
      return SessionItems::default();
    };

    let plan = self.plan(session_minutes);
    let today = self.clock.today();

    let overdue = self
      .bucket("overdue", plan.overdue, self.reviews.due_reviews(learner, target_language, today, plan.overdue))
      .await;
    let weakness = self
      .bucket(
        "weakness",
        plan.weakness,
        self.reviews.weak_reviews(learner, target_language, self.cfg.weakness_threshold, plan.weakness),
      )
      .await;
    let new = self.bucket("new", plan.new, self.new_items(learner, target_language, plan.new)).await;
    let integration = self
      .bucket(
        "integration",
        plan.integration,
        self.reviews.usage_debt_reviews(learner, target_language, plan.integration),
      )
      .await;

    info!(
      target: "scheduler",
      total = plan.total,
      overdue = overdue.len(),
      weakness = weakness.len(),
      new = new.len(),
      integration = integration.len(),
      "Session items selected"
    );
    SessionItems { overdue, weakness, new, integration }
  }

  /// Catalog items the learner has no review state for, lowest rank first.
  async fn new_items(&self, learner: &LearnerId, language: &str, limit: usize) -> StoreResult<Vec<Item>> {
    let seen = self.reviews.seen_item_ids(learner).await?;
    let query = ItemQuery {
      target_language: Some(language.to_string()),
      exclude: seen,
      order: PriorityOrder::Ascending,
      limit,
      ..Default::default()
    };
    self.catalog.query_items(&query).await
  }

  /// Run one bucket query under the store timeout; any failure empties the bucket.
  async fn bucket<T, F>(&self, name: &'static str, limit: usize, fut: F) -> Vec<T>
  where
    F: Future<Output = StoreResult<Vec<T>>>,
  {
    if limit == 0 {
      return Vec::new();
    }
    match timeout(self.cfg.store_timeout(), fut).await {
      Ok(Ok(mut rows)) => {
        rows.truncate(limit);
        rows
      }
      Ok(Err(e)) => {
        warn!(target: "scheduler", bucket = name, error = %e, "Bucket query failed; bucket left empty");
        Vec::new()
      }
      Err(_) => {
        warn!(target: "scheduler", bucket = name, timeout_ms = self.cfg.store_timeout_ms, "Bucket query timed out; bucket left empty");
        Vec::new()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{CefrLevel, LexicalType, ReviewState};
  use crate::sm2::FixedClock;
  use crate::store::testing::*;
  use crate::store::MemoryStore;

  fn selector(store: Arc<MemoryStore>) -> SessionItemSelector {
    SessionItemSelector::new(store.clone(), store, Arc::new(FixedClock::on(day(15))), SchedulerConfig::default())
  }

  async fn put(store: &MemoryStore, id: i64, edit: impl FnOnce(&mut ReviewState)) {
    let mut s = ReviewState::fresh(learner(), ItemId(id), day(15));
    s.mastery = 0.8;
    s.next_review = day(30);
    edit(&mut s);
    store.upsert_review(s, 0).await.unwrap();
  }

  #[test]
  fn twenty_minute_plan() {
    let plan = BucketPlan::for_minutes(20.0, &SchedulerConfig::default());
    assert_eq!(plan, BucketPlan { total: 40, overdue: 16, weakness: 12, new: 5, integration: 4 });
  }

  #[test]
  fn independent_rounding_drifts_reconciled_does_not() {
    let mut cfg = SchedulerConfig { max_new_items: 100, ..Default::default() };
    // 7 items: floors are 2/2/1/0 = 5
    let drift = BucketPlan::for_minutes(3.5, &cfg);
    assert_eq!(drift.total, 7);
    assert_eq!(drift.overdue + drift.weakness + drift.new + drift.integration, 5);

    cfg.rounding = BucketRounding::Reconciled;
    let exact = BucketPlan::for_minutes(3.5, &cfg);
    assert_eq!(exact.overdue + exact.weakness + exact.new + exact.integration, 7);
    assert_eq!((exact.overdue, exact.weakness, exact.new, exact.integration), (3, 2, 1, 1));
  }

  #[tokio::test]
  async fn unknown_learner_gets_nothing() {
    let store = Arc::new(MemoryStore::with_items([item(1, LexicalType::Idiom, CefrLevel::B1, 1)]));
    let out = selector(store).select_session_items(None, "en", 20.0).await;
    assert!(out.is_empty());
  }

  #[tokio::test]
  async fn first_session_only_has_new_items() {
    let store = Arc::new(MemoryStore::with_items((1..=12).map(|i| item(i, LexicalType::Vocabulary, CefrLevel::B1, 100 - i))));
    let out = selector(store).select_session_items(Some(&learner()), "en", 20.0).await;
    assert!(out.overdue.is_empty() && out.weakness.is_empty() && out.integration.is_empty());
    assert_eq!(out.new.len(), 5);
    // lowest rank first
    let ranks: Vec<i64> = out.new.iter().map(|i| i.priority).collect();
    assert_eq!(ranks, vec![88, 89, 90, 91, 92]);
  }

  #[tokio::test]
  async fn buckets_follow_their_filters_and_orders() {
    let store = Arc::new(MemoryStore::with_items((1..=10).map(|i| item(i, LexicalType::Idiom, CefrLevel::B2, i))));
    put(&store, 1, |s| s.next_review = day(14)).await;
    put(&store, 2, |s| s.next_review = day(3)).await;
    put(&store, 3, |s| s.mastery = 0.4).await;
    put(&store, 4, |s| s.mastery = 0.1).await;
    put(&store, 5, |s| {
      s.repetitions = 2;
      s.last_reviewed = Some(day(10).and_hms_opt(8, 0, 0).unwrap().and_utc());
    })
    .await;
    put(&store, 6, |s| {
      s.repetitions = 1;
      s.last_reviewed = Some(day(2).and_hms_opt(8, 0, 0).unwrap().and_utc());
    })
    .await;
    put(&store, 7, |s| {
      s.repetitions = 4;
      s.times_used_spontaneously = 1;
    })
    .await;

    let out = selector(store).select_session_items(Some(&learner()), "en", 20.0).await;
    let ids = |v: &[ScheduledItem]| v.iter().map(|s| s.item.id.0).collect::<Vec<_>>();
    assert_eq!(ids(&out.overdue), vec![2, 1]);
    assert_eq!(ids(&out.weakness), vec![4, 3]);
    assert_eq!(ids(&out.integration), vec![6, 5]);
    let new: Vec<i64> = out.new.iter().map(|i| i.id.0).collect();
    assert_eq!(new, vec![8, 9, 10]);
    assert!(out.integration.iter().all(|s| s.state.has_usage_debt()));
  }

  #[tokio::test]
  async fn broken_store_degrades_to_empty_buckets() {
    let broken = Arc::new(BrokenStore);
    let sel = SessionItemSelector::new(broken.clone(), broken, Arc::new(FixedClock::on(day(1))), SchedulerConfig::default());
    let out = sel.select_session_items(Some(&learner()), "en", 20.0).await;
    assert!(out.is_empty());
  }

  /// Review store that fails `weak_reviews` and stalls `due_reviews`.
  struct PartialOutage {
    inner: Arc<MemoryStore>,
  }

  #[async_trait::async_trait]
  impl ReviewStore for PartialOutage {
    async fn get_review(&self, l: &LearnerId, i: ItemId) -> StoreResult<Option<ReviewState>> {
      self.inner.get_review(l, i).await
    }
    async fn upsert_review(&self, s: ReviewState, v: u64) -> StoreResult<ReviewState> {
      self.inner.upsert_review(s, v).await
    }
    async fn due_reviews(&self, l: &LearnerId, g: &str, t: chrono::NaiveDate, n: usize) -> StoreResult<Vec<ScheduledItem>> {
      tokio::time::sleep(std::time::Duration::from_millis(500)).await;
      self.inner.due_reviews(l, g, t, n).await
    }
    async fn weak_reviews(&self, _: &LearnerId, _: &str, _: f64, _: usize) -> StoreResult<Vec<ScheduledItem>> {
      Err(crate::error::StoreError::Unavailable("replica down".into()))
    }
    async fn usage_debt_reviews(&self, l: &LearnerId, g: &str, n: usize) -> StoreResult<Vec<ScheduledItem>> {
      self.inner.usage_debt_reviews(l, g, n).await
    }
    async fn seen_item_ids(&self, l: &LearnerId) -> StoreResult<HashSet<ItemId>> {
      self.inner.seen_item_ids(l).await
    }
    async fn upsert_usage(&self, s: ReviewState, v: u64, e: crate::domain::UsageLogEntry) -> StoreResult<ReviewState> {
      self.inner.upsert_usage(s, v, e).await
    }
  }

  #[tokio::test]
  async fn slow_or_failing_bucket_leaves_the_others_intact() {
    let store = Arc::new(MemoryStore::with_items((1..=10).map(|i| item(i, LexicalType::Idiom, CefrLevel::B2, i))));
    put(&store, 1, |s| s.next_review = day(14)).await;
    put(&store, 3, |s| s.mastery = 0.4).await;
    put(&store, 6, |s| s.repetitions = 1).await;

    // the same data through a healthy store fills every bucket
    let healthy = selector(store.clone()).select_session_items(Some(&learner()), "en", 20.0).await;
    assert!(!healthy.overdue.is_empty() && !healthy.weakness.is_empty());

    let cfg = SchedulerConfig { store_timeout_ms: 20, ..Default::default() };
    let reviews = Arc::new(PartialOutage { inner: store.clone() });
    let sel = SessionItemSelector::new(store, reviews, Arc::new(FixedClock::on(day(15))), cfg);
    let out = sel.select_session_items(Some(&learner()), "en", 20.0).await;

    assert!(out.overdue.is_empty(), "timed-out bucket degrades to empty");
    assert!(out.weakness.is_empty(), "failing bucket degrades to empty");
    let debt: Vec<i64> = out.integration.iter().map(|s| s.item.id.0).collect();
    assert_eq!(debt, vec![6]);
    let new: Vec<i64> = out.new.iter().map(|i| i.id.0).collect();
    assert_eq!(new, vec![2, 4, 5, 7, 8]);
  }

  #[test]
  fn flatten_dedupes_across_buckets() {
    let it = item(1, LexicalType::Idiom, CefrLevel::B1, 1);
    let state = ReviewState::fresh(learner(), it.id, day(1));
    let row = ScheduledItem { item: it.clone(), state };
    let items = SessionItems {
      overdue: vec![row.clone()],
      weakness: vec![row],
      new: vec![item(2, LexicalType::Idiom, CefrLevel::B1, 1)],
      integration: vec![],
    };
    let ids: Vec<i64> = items.flatten().iter().map(|i| i.id.0).collect();
    assert_eq!(ids, vec![1, 2]);
  }
}
