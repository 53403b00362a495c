//! The match → trip-lease-agreement lifecycle.
//!
//! Each engine owns one state machine and receives its collaborators
//! (store, clock, notifier, metrics) through an [`EngineContext`].

pub mod expiry;
pub mod negotiation;
pub mod rating;
pub mod signing;
pub mod tla_generator;
pub mod trip;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::error::EngineError;
use crate::models::match_record::{MatchRecord, MatchStatus};
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;
use crate::store::{LeaseStore, StoreError};

use self::expiry::ExpiryPolicy;

/// How many times a compare-and-set is retried when the conflicting write
/// may have left our precondition intact.
pub(crate) const MAX_CAS_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn LeaseStore>,
    pub clock: SharedClock,
    pub notifier: Notifier,
    pub metrics: Metrics,
    pub expiry: ExpiryPolicy,
    pub op_timeout: Duration,
}

impl EngineContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    /// Runs one engine operation under the operation timeout and records
    /// its latency and failure code. Only the work up to and including the
    /// commit belongs in `fut`; follow-up side effects run after it returns
    /// so a slow side effect can never turn a committed write into `Timeout`.
    pub(crate) async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(format!(
                "{operation} did not finish within {}ms",
                self.op_timeout.as_millis()
            ))),
        };

        self.metrics
            .operation_latency_seconds
            .with_label_values(&[operation])
            .observe(start.elapsed().as_secs_f64());

        if let Err(err) = &result {
            self.record_failure(operation, err);
        }

        result
    }

    pub(crate) fn record_failure(&self, operation: &'static str, err: &EngineError) {
        self.metrics
            .engine_errors_total
            .with_label_values(&[operation, err.code()])
            .inc();
        debug!(operation, error = %err, "engine operation rejected");
    }

    /// Move a match along the agreement chain. Used for the cross-entity
    /// side effects of signing and trip tracking, which callers treat as
    /// best-effort.
    pub(crate) async fn advance_match(
        &self,
        match_id: Uuid,
        to: MatchStatus,
    ) -> Result<MatchRecord, EngineError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.store.get_match(match_id).await?;
            let mut record = current.record;
            if record.status == to {
                return Ok(record);
            }

            let from = record.status;
            if !from.can_transition_to(to) {
                return Err(EngineError::InvalidTransition(format!(
                    "match {match_id} cannot move from {from} to {to}"
                )));
            }
            record.status = to;
            record.updated_at = self.now();

            match self.store.update_match(current.revision, record).await {
                Ok(updated) => {
                    self.metrics.record_transition("match", to.as_str());
                    info!(match_id = %match_id, from = %from, to = %to, "match advanced");
                    return Ok(updated.record);
                }
                Err(StoreError::RevisionConflict { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(EngineError::Conflict(format!(
            "match {match_id} kept changing while moving to {to}"
        )))
    }
}
