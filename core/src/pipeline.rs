//! The risk pipeline — wires store, queue, worker pool, scorer and
//! read cache into one evaluation service.
//!
//! Build is fail-closed: a missing or corrupt model artifact is a
//! build error, never a degraded mode. Once built, the pool is live
//! and `submit` is the ingestion boundary's entry point.

use crate::cache::ReadCache;
use crate::config::PipelineConfig;
use crate::error::RiskResult;
use crate::queue::JobQueue;
use crate::rules::RuleEngine;
use crate::scorer::{FraudScorer, LogisticModel};
use crate::store::RiskStore;
use crate::transaction::{Alert, NewTransaction, ScoreAudit, TransactionView};
use crate::types::TransactionId;
use crate::worker::EvaluationWorker;
use anyhow::anyhow;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub struct RiskPipeline {
    config: Arc<PipelineConfig>,
    store: Mutex<RiskStore>,
    queue: Arc<JobQueue>,
    cache: Arc<ReadCache>,
    scorer: Arc<dyn FraudScorer>,
    workers: Vec<JoinHandle<()>>,
}

impl RiskPipeline {
    /// Build a fully wired pipeline and start its worker pool, loading
    /// the model artifact from `config.model_path`.
    pub fn build(config: PipelineConfig, store: RiskStore) -> RiskResult<Self> {
        let scorer = LogisticModel::load(&config.model_path)?;
        Self::with_scorer(config, store, Arc::new(scorer))
    }

    /// Build with an explicit scorer implementation. Tests inject
    /// deterministic or failing scorers here.
    pub fn with_scorer(
        config: PipelineConfig,
        store: RiskStore,
        scorer: Arc<dyn FraudScorer>,
    ) -> RiskResult<Self> {
        store.migrate()?;
        let config = Arc::new(config);
        let queue = JobQueue::new();
        let cache = Arc::new(ReadCache::new(Duration::from_secs(
            config.runtime.cache_ttl_secs,
        )));
        let rules = Arc::new(RuleEngine::from_config(&config.rules));

        let mut workers = Vec::new();
        for i in 0..config.runtime.worker_count.max(1) {
            let worker = EvaluationWorker::new(
                store.reopen()?,
                Arc::clone(&queue),
                Arc::clone(&cache),
                Arc::clone(&rules),
                Arc::clone(&scorer),
                Arc::clone(&config),
            );
            let handle = std::thread::Builder::new()
                .name(format!("risk-worker-{i}"))
                .spawn(move || worker.run())
                .map_err(|e| anyhow!("cannot spawn worker thread: {e}"))?;
            workers.push(handle);
        }
        log::info!(
            "pipeline started: {} worker(s), model version {}",
            workers.len(),
            scorer.version()
        );

        Ok(Self {
            config,
            store: Mutex::new(store),
            queue,
            cache,
            scorer,
            workers,
        })
    }

    /// Build against a throwaway file-backed store with the test
    /// config. Used by integration tests; each test passes a unique tag.
    pub fn build_test(tag: &str, scorer: Arc<dyn FraudScorer>) -> RiskResult<Self> {
        Self::with_scorer(PipelineConfig::default_test(), RiskStore::temp(tag)?, scorer)
    }

    // ── Ingestion boundary ─────────────────────────────────────

    /// Persist a transaction in `pending` state and enqueue its
    /// evaluation job.
    pub fn submit(&self, new: NewTransaction) -> RiskResult<TransactionId> {
        new.validate()?;
        let txn = self.lock_store().insert_transaction(&new)?;
        log::info!(
            "txn={} submitted amount={:.2} {} user={}",
            txn.id,
            txn.amount,
            txn.currency,
            txn.user_id
        );
        self.queue.enqueue(txn.id.clone());
        Ok(txn.id)
    }

    /// Raw queue interface. At-least-once: callers may enqueue the same
    /// id more than once; duplicates are discarded at the claim.
    pub fn enqueue_evaluation(&self, id: &str) {
        self.queue.enqueue(id.to_string());
    }

    // ── Read side ──────────────────────────────────────────────

    /// Current view of a transaction: cache first for terminal views,
    /// store fallback with cache repopulation. Non-terminal views are
    /// always read fresh from the store.
    pub fn transaction_view(&self, id: &str) -> RiskResult<Option<TransactionView>> {
        if let Some(view) = self.cache.get(id) {
            log::debug!("txn={id} cache hit");
            return Ok(Some(view));
        }
        let txn = self.lock_store().get_transaction(id)?;
        Ok(txn.map(|t| {
            let view = t.view();
            if view.status.is_terminal() {
                self.cache.put(view.clone());
            }
            view
        }))
    }

    pub fn unresolved_alerts(&self) -> RiskResult<Vec<Alert>> {
        self.lock_store().unresolved_alerts()
    }

    pub fn alerts_for(&self, transaction_id: &str) -> RiskResult<Vec<Alert>> {
        self.lock_store().alerts_for_transaction(transaction_id)
    }

    /// Mark an alert resolved. Mutates only the alert, never the
    /// referenced transaction.
    pub fn resolve_alert(&self, alert_id: &str) -> RiskResult<bool> {
        self.lock_store().resolve_alert(alert_id)
    }

    pub fn score_audits(&self, transaction_id: &str) -> RiskResult<Vec<ScoreAudit>> {
        self.lock_store().score_audits(transaction_id)
    }

    pub fn model_version(&self) -> &str {
        self.scorer.version()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Wait until the queue has fully drained: no queued jobs and no
    /// delivery being handled. Returns false on timeout.
    pub fn run_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.queue.is_idle() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.queue.is_idle()
    }

    /// Stop the worker pool and join every worker thread.
    pub fn shutdown(self) {
        drop(self);
    }

    fn lock_store(&self) -> MutexGuard<'_, RiskStore> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for RiskPipeline {
    fn drop(&mut self) {
        self.queue.shut_down();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
