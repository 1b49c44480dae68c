//! Evaluation worker — claims a job, orchestrates
//! extractor → rule engine + statistical scorer (concurrently) →
//! combiner, and hands the result to the outcome writer.
//!
//! RULES:
//!   - A worker never mutates a transaction it has not claimed.
//!   - Every delivery is resolved: processed, no-opped, redelivered
//!     with backoff, or finalized as evaluation_failed. A job is never
//!     silently dropped while its transaction is stuck mid-lifecycle.

use crate::cache::ReadCache;
use crate::combiner::{self, EvaluationOutcome};
use crate::config::PipelineConfig;
use crate::error::{RiskError, RiskResult};
use crate::features::{self, FeatureVector};
use crate::queue::{Delivery, EvaluationJob, JobQueue};
use crate::rules::RuleEngine;
use crate::scorer::FraudScorer;
use crate::store::{ClaimOutcome, RiskStore};
use crate::transaction::Transaction;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

pub struct EvaluationWorker {
    store: RiskStore,
    queue: Arc<JobQueue>,
    cache: Arc<ReadCache>,
    rules: Arc<RuleEngine>,
    scorer: Arc<dyn FraudScorer>,
    config: Arc<PipelineConfig>,
}

impl EvaluationWorker {
    pub fn new(
        store: RiskStore,
        queue: Arc<JobQueue>,
        cache: Arc<ReadCache>,
        rules: Arc<RuleEngine>,
        scorer: Arc<dyn FraudScorer>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            store,
            queue,
            cache,
            rules,
            scorer,
            config,
        }
    }

    /// Worker main loop: pull deliveries until shutdown.
    pub fn run(&self) {
        let poll_timeout = Duration::from_millis(self.config.runtime.poll_timeout_ms);
        loop {
            match self.queue.pop(poll_timeout) {
                Delivery::Shutdown => break,
                Delivery::TimedOut => continue,
                Delivery::Job(job) => {
                    self.handle_delivery(&job);
                    self.queue.ack();
                }
            }
        }
    }

    /// Handle one delivery end to end.
    pub fn handle_delivery(&self, job: &EvaluationJob) {
        let id = &job.transaction_id;
        match self.store.claim_transaction(id, job.attempt) {
            Ok(ClaimOutcome::Claimed(txn)) => self.process_claimed(job, &txn),
            Ok(ClaimOutcome::InFlight) => {
                log::debug!("txn={id} duplicate delivery while in flight, dropping");
            }
            Ok(ClaimOutcome::AlreadyFinal(status)) => {
                log::debug!(
                    "txn={id} already {}, redelivery is a no-op",
                    status.as_str()
                );
            }
            Ok(ClaimOutcome::NotFound) => {
                log::error!("txn={id} job references an unknown transaction, discarding");
            }
            Err(err) => self.resolve_failure(job, err),
        }
    }

    fn process_claimed(&self, job: &EvaluationJob, txn: &Transaction) {
        match self.evaluate(txn) {
            Ok(outcome) => match self.store.finalize_outcome(&txn.id, &outcome) {
                Ok(true) => {
                    log::info!(
                        "txn={} {} final_score={:.4} risk={} (attempt {})",
                        txn.id,
                        outcome.status.as_str(),
                        outcome.final_score,
                        outcome.risk_level.as_str(),
                        job.attempt
                    );
                    self.refresh_cache(&txn.id);
                }
                Ok(false) => {
                    log::debug!("txn={} outcome commit lost the guard, no-op", txn.id);
                }
                Err(err) => self.resolve_failure(job, err),
            },
            Err(err) => self.resolve_failure(job, err),
        }
    }

    /// Run the scoring stages for one claimed transaction. The rule
    /// engine and the statistical scorer have no data dependency, so
    /// they run concurrently and are joined before the combiner.
    fn evaluate(&self, txn: &Transaction) -> RiskResult<EvaluationOutcome> {
        let history = self
            .store
            .history_stats(txn, self.config.rules.velocity_window_minutes)?;
        let ctx = features::build_context(txn, &history, &self.config.rules)?;
        let feature_vector = FeatureVector::from_context(&ctx);

        let scorer = Arc::clone(&self.scorer);
        let (ml_result, rule_outcome) = std::thread::scope(|scope| {
            let ml_handle = scope.spawn(move || scorer.score(&feature_vector));
            let rule_outcome = self.rules.evaluate(&ctx);
            let ml_result = ml_handle
                .join()
                .unwrap_or_else(|_| Err(RiskError::Scoring("inference thread panicked".into())));
            (ml_result, rule_outcome)
        });
        let ml_score = ml_result?;

        if !rule_outcome.triggered.is_empty() {
            log::debug!("txn={} rules triggered: {:?}", txn.id, rule_outcome.triggered);
        }
        Ok(combiner::combine(
            &self.config.combiner,
            &self.config.thresholds,
            ml_score,
            rule_outcome.score,
            self.scorer.version(),
        ))
    }

    /// Transient failures are redelivered with bounded exponential
    /// backoff; anything else, or an exhausted attempt count, is
    /// finalized as evaluation_failed with an operational alert.
    fn resolve_failure(&self, job: &EvaluationJob, err: RiskError) {
        let id = &job.transaction_id;
        if err.is_retryable() && job.attempt < self.config.runtime.max_attempts {
            let delay = self.backoff_delay(job.attempt);
            log::warn!(
                "txn={id} attempt {} failed ({err}), redelivering in {delay:?}",
                job.attempt
            );
            self.queue.redeliver(job, delay);
            return;
        }
        log::error!(
            "txn={id} evaluation failed permanently after {} attempt(s): {err}",
            job.attempt
        );
        match self.store.finalize_failure(id, &err.to_string()) {
            Ok(true) => self.refresh_cache(id),
            Ok(false) => {
                log::debug!("txn={id} failure finalization lost the guard, no-op");
            }
            Err(store_err) => {
                log::error!("txn={id} could not record permanent failure: {store_err}");
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.runtime.retry_base_delay_ms.max(1);
        let cap = self.config.runtime.retry_max_delay_ms.max(base);
        let exp = base.saturating_mul(1u64 << (attempt.min(16) - 1));
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(exp.min(cap) + jitter)
    }

    /// Refresh the read cache with the committed terminal view.
    fn refresh_cache(&self, id: &str) {
        match self.store.get_transaction(id) {
            Ok(Some(txn)) => {
                self.cache.put(txn.view());
            }
            Ok(None) => self.cache.invalidate(id),
            Err(err) => {
                log::warn!("txn={id} cache refresh failed: {err}");
                self.cache.invalidate(id);
            }
        }
    }
}
