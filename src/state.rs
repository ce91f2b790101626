//! Application state: config, the in-memory store, and the four core services.
//!
//! This module owns:
//!   - the item catalog + review store (one `MemoryStore` behind both traits)
//!   - selector, generator, progress updater and evaluator
//!   - the shared RNG used to plan sessions (seedable from config)
//!   - exercises handed out but not yet evaluated, so `/evaluate` can look
//!     them up by id (bounded, oldest evicted first)
//!
//! If OpenAI is unavailable, evaluation uses the local heuristics.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use crate::config::{load_config_from_env, AppConfig};
use crate::domain::{Exercise, LexicalType};
use crate::evaluator::{Evaluator, LocalEvaluator};
use crate::generator::ExerciseGenerator;
use crate::openai::{OpenAI, OpenAiEvaluator};
use crate::progress::ProgressUpdater;
use crate::seeds::seed_items;
use crate::selector::SessionItemSelector;
use crate::sm2::{Clock, SystemClock};
use crate::store::MemoryStore;

pub struct AppState {
    pub config: AppConfig,
    pub store: MemoryStore,
    pub clock: Arc<dyn Clock>,
    pub selector: SessionItemSelector,
    pub generator: ExerciseGenerator,
    pub progress: ProgressUpdater,
    pub evaluator: Arc<dyn Evaluator>,
    pub rng: Mutex<StdRng>,
    pub exercises: RwLock<PendingExercises>,
}

/// Exercises awaiting an answer, capped at `capacity` in insertion order.
pub struct PendingExercises {
    by_id: HashMap<String, Exercise>,
    order: VecDeque<String>,
    capacity: usize,
}

impl PendingExercises {
    pub fn new(capacity: usize) -> Self {
        Self { by_id: HashMap::new(), order: VecDeque::new(), capacity: capacity.max(1) }
    }

    pub fn len(&self) -> usize { self.by_id.len() }

    pub fn is_empty(&self) -> bool { self.by_id.is_empty() }

    pub fn get(&self, id: &str) -> Option<&Exercise> { self.by_id.get(id) }

    /// Insert, evicting the oldest entries past capacity. Returns how many were evicted.
    pub fn insert(&mut self, exercise: Exercise) -> usize {
        if self.by_id.insert(exercise.id.clone(), exercise.clone()).is_none() {
            self.order.push_back(exercise.id);
        }
        let mut evicted = 0;
        while self.by_id.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            if self.by_id.remove(&oldest).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    pub fn remove(&mut self, id: &str) -> Option<Exercise> {
        let out = self.by_id.remove(id)?;
        self.order.retain(|e| e != id);
        Some(out)
    }
}

impl AppState {
    /// Build state from env: load config, seed the catalog, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_config_from_env().unwrap_or_default();
        let store = MemoryStore::with_items(seed_items());

        let evaluator: Arc<dyn Evaluator> = match OpenAI::from_env() {
            Some(oa) => {
                info!(target: "lexis_backend", base_url = %oa.base_url, model = %oa.model, "OpenAI enabled.");
                Arc::new(OpenAiEvaluator::new(oa, config.prompts.clone()))
            }
            None => {
                info!(target: "lexis_backend", "OpenAI disabled (no OPENAI_API_KEY). Using local evaluation.");
                Arc::new(LocalEvaluator)
            }
        };

        Self::with_parts(config, store, Arc::new(SystemClock), evaluator)
    }

    /// Assemble state from explicit parts (tests, embedding).
    pub fn with_parts(
        config: AppConfig,
        store: MemoryStore,
        clock: Arc<dyn Clock>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        let shared = Arc::new(store.clone());
        let selector = SessionItemSelector::new(shared.clone(), shared.clone(), clock.clone(), config.scheduler.clone());
        let generator = ExerciseGenerator::new(shared.clone(), config.generator.clone(), config.scheduler.store_timeout());
        let progress = ProgressUpdater::new(shared, clock.clone(), &config.scheduler);

        let rng = match config.generator.rng_seed {
            Some(seed) => {
                info!(target: "lexis_backend", seed, "Exercise RNG seeded from config");
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_entropy(),
        };
        let pending = PendingExercises::new(config.generator.max_pending_exercises);

        Self {
            config,
            store,
            clock,
            selector,
            generator,
            progress,
            evaluator,
            rng: Mutex::new(rng),
            exercises: RwLock::new(pending),
        }
    }

    /// Log catalog size per lexical type.
    pub async fn log_inventory(&self) {
        let items = self.store.items().await;
        for ty in LexicalType::ALL {
            let n = items.iter().filter(|i| i.lexical_type == ty).count();
            info!(target: "lexis_backend", ty = ty.as_str(), items = n, "Startup catalog inventory");
        }
    }

    /// Remember exercises handed out so answers can be evaluated by id.
    #[instrument(level = "debug", skip(self, exercises), fields(count = exercises.len()))]
    pub async fn remember_exercises(&self, exercises: &[Exercise]) {
        let mut pending = self.exercises.write().await;
        let evicted: usize = exercises.iter().map(|e| pending.insert(e.clone())).sum();
        if evicted > 0 {
            debug!(target: "lexis_backend", evicted, pending = pending.len(), "Evicted unanswered exercises");
        }
    }

    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_exercise(&self, id: &str) -> Option<Exercise> {
        self.exercises.read().await.get(id).cloned()
    }

    /// Drop an exercise once its answer has been evaluated.
    pub async fn forget_exercise(&self, id: &str) {
        self.exercises.write().await.remove(id);
    }
}
