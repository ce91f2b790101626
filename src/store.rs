//! Storage seams: the item catalog and the per-learner review store.
//!
//! The scheduler core only talks to these traits. `MemoryStore` backs both
//! with `RwLock`-guarded maps and is what the server binary and tests use.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::{
  CefrLevel, Item, ItemId, LearnerId, LexicalType, ReviewState, ScheduledItem, UsageLogEntry,
};
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Ordering of catalog results by priority rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PriorityOrder {
  /// Lowest rank first.
  #[default]
  Ascending,
  /// Highest rank first.
  Descending,
}

/// Catalog query. Empty `levels` means "any level".
#[derive(Clone, Debug, Default)]
pub struct ItemQuery {
  pub target_language: Option<String>,
  pub lexical_type: Option<LexicalType>,
  pub levels: Vec<CefrLevel>,
  pub exclude: HashSet<ItemId>,
  pub order: PriorityOrder,
  pub offset: usize,
  pub limit: usize,
}

#[async_trait]
pub trait ItemCatalog: Send + Sync {
  async fn query_items(&self, query: &ItemQuery) -> StoreResult<Vec<Item>>;
  async fn get_item(&self, id: ItemId) -> StoreResult<Option<Item>>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
  async fn get_review(&self, learner: &LearnerId, item: ItemId) -> StoreResult<Option<ReviewState>>;

  /// Atomic upsert keyed by (learner, item). Succeeds only when the stored
  /// version equals `expected_version` (0 = absent). Returns the stored state
  /// with its new version.
  async fn upsert_review(&self, state: ReviewState, expected_version: u64) -> StoreResult<ReviewState>;

  /// `next_review <= today`, most overdue first.
  async fn due_reviews(
    &self,
    learner: &LearnerId,
    language: &str,
    today: NaiveDate,
    limit: usize,
  ) -> StoreResult<Vec<ScheduledItem>>;

  /// `mastery < threshold`, weakest first.
  async fn weak_reviews(
    &self,
    learner: &LearnerId,
    language: &str,
    threshold: f64,
    limit: usize,
  ) -> StoreResult<Vec<ScheduledItem>>;

  /// Reviewed but never used spontaneously, least recently reviewed first.
  async fn usage_debt_reviews(
    &self,
    learner: &LearnerId,
    language: &str,
    limit: usize,
  ) -> StoreResult<Vec<ScheduledItem>>;

  async fn seen_item_ids(&self, learner: &LearnerId) -> StoreResult<HashSet<ItemId>>;

  /// `upsert_review` plus the audit entry, committed together: on any error
  /// neither the state nor the log entry is written.
  async fn upsert_usage(&self, state: ReviewState, expected_version: u64, entry: UsageLogEntry) -> StoreResult<ReviewState>;
}

/// In-memory catalog + review store.
#[derive(Clone, Default)]
pub struct MemoryStore {
  items: Arc<RwLock<HashMap<ItemId, Item>>>,
  reviews: Arc<RwLock<HashMap<(LearnerId, ItemId), ReviewState>>>,
  usage_log: Arc<RwLock<Vec<UsageLogEntry>>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
    let map = items.into_iter().map(|i| (i.id, i)).collect();
    Self { items: Arc::new(RwLock::new(map)), ..Self::default() }
  }

  /// Snapshot of the catalog, unordered.
  pub async fn items(&self) -> Vec<Item> { self.items.read().await.values().cloned().collect() }

  /// Snapshot of the usage audit log.
  pub async fn usage_log(&self) -> Vec<UsageLogEntry> { self.usage_log.read().await.clone() }

  /// Join the learner's review states with their items, filtered by language.
  async fn joined<F>(&self, learner: &LearnerId, language: &str, keep: F) -> Vec<ScheduledItem>
  where
    F: Fn(&ReviewState) -> bool,
  {
    let items = self.items.read().await;
    let reviews = self.reviews.read().await;
    let mut out = Vec::new();
    for ((owner, id), state) in reviews.iter() {
      if owner != learner || !keep(state) {
        continue;
      }
      if let Some(item) = items.get(id).filter(|i| i.target_language == language) {
        out.push(ScheduledItem { item: item.clone(), state: state.clone() });
      }
    }
    out
  }
}

#[async_trait]
impl ItemCatalog for MemoryStore {
  #[instrument(level = "debug", skip(self, query), fields(ty = ?query.lexical_type, limit = query.limit))]
  async fn query_items(&self, query: &ItemQuery) -> StoreResult<Vec<Item>> {
    let items = self.items.read().await;
    let mut hits: Vec<Item> = items
      .values()
      .filter(|i| query.target_language.as_deref().map_or(true, |l| i.target_language == l))
      .filter(|i| query.lexical_type.map_or(true, |t| i.lexical_type == t))
      .filter(|i| query.levels.is_empty() || query.levels.contains(&i.cefr_level))
      .filter(|i| !query.exclude.contains(&i.id))
      .cloned()
      .collect();

    // Ties broken by id so results are stable.
    match query.order {
      PriorityOrder::Ascending => hits.sort_by_key(|i| (i.priority, i.id)),
      PriorityOrder::Descending => hits.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id))),
    }
    let out: Vec<Item> = hits.into_iter().skip(query.offset).take(query.limit).collect();
    debug!(returned = out.len(), "catalog query");
    Ok(out)
  }

  async fn get_item(&self, id: ItemId) -> StoreResult<Option<Item>> {
    Ok(self.items.read().await.get(&id).cloned())
  }
}

#[async_trait]
impl ReviewStore for MemoryStore {
  async fn get_review(&self, learner: &LearnerId, item: ItemId) -> StoreResult<Option<ReviewState>> {
    Ok(self.reviews.read().await.get(&(learner.clone(), item)).cloned())
  }

  #[instrument(level = "debug", skip(self, state), fields(learner = %state.learner_id, item = %state.item_id))]
  async fn upsert_review(&self, state: ReviewState, expected_version: u64) -> StoreResult<ReviewState> {
    let mut reviews = self.reviews.write().await;
    put_versioned(&mut reviews, state, expected_version)
  }

  async fn due_reviews(
    &self,
    learner: &LearnerId,
    language: &str,
    today: NaiveDate,
    limit: usize,
  ) -> StoreResult<Vec<ScheduledItem>> {
    let mut rows = self.joined(learner, language, |s| s.next_review <= today).await;
    rows.sort_by_key(|r| (r.state.next_review, r.item.id));
    rows.truncate(limit);
    Ok(rows)
  }

  async fn weak_reviews(
    &self,
    learner: &LearnerId,
    language: &str,
    threshold: f64,
    limit: usize,
  ) -> StoreResult<Vec<ScheduledItem>> {
    let mut rows = self.joined(learner, language, |s| s.mastery < threshold).await;
    rows.sort_by(|a, b| a.state.mastery.total_cmp(&b.state.mastery).then(a.item.id.cmp(&b.item.id)));
    rows.truncate(limit);
    Ok(rows)
  }

  async fn usage_debt_reviews(
    &self,
    learner: &LearnerId,
    language: &str,
    limit: usize,
  ) -> StoreResult<Vec<ScheduledItem>> {
    let mut rows = self.joined(learner, language, ReviewState::has_usage_debt).await;
    // `None` sorts first: never-timestamped rows count as least recent.
    rows.sort_by_key(|r| (r.state.last_reviewed, r.item.id));
    rows.truncate(limit);
    Ok(rows)
  }

  async fn seen_item_ids(&self, learner: &LearnerId) -> StoreResult<HashSet<ItemId>> {
    let reviews = self.reviews.read().await;
    Ok(reviews.keys().filter(|(l, _)| l == learner).map(|(_, id)| *id).collect())
  }

  #[instrument(level = "debug", skip(self, state, entry), fields(learner = %state.learner_id, item = %state.item_id))]
  async fn upsert_usage(&self, state: ReviewState, expected_version: u64, entry: UsageLogEntry) -> StoreResult<ReviewState> {
    // Same lock order as `upsert_review`: reviews, then the log.
    let mut reviews = self.reviews.write().await;
    let mut log = self.usage_log.write().await;
    let stored = put_versioned(&mut reviews, state, expected_version)?;
    log.push(entry);
    Ok(stored)
  }
}

/// Version-checked insert into the review map.
fn put_versioned(
  reviews: &mut HashMap<(LearnerId, ItemId), ReviewState>,
  mut state: ReviewState,
  expected_version: u64,
) -> StoreResult<ReviewState> {
  let key = (state.learner_id.clone(), state.item_id);
  let found = reviews.get(&key).map_or(0, |s| s.version);
  if found != expected_version {
    return Err(StoreError::Conflict { expected: expected_version, found });
  }
  state.version = found + 1;
  reviews.insert(key, state.clone());
  Ok(state)
}
