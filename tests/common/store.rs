use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Barrier;
use uuid::Uuid;

use trip_lease::error::EngineError;
use trip_lease::models::driver::{DriverAvailability, DriverKey, DriverRecord};
use trip_lease::models::fleet::FleetProfile;
use trip_lease::models::load::Load;
use trip_lease::models::match_record::{MatchRecord, MatchStatus};
use trip_lease::models::rating::RatingEntry;
use trip_lease::models::tla::TripLeaseAgreement;
use trip_lease::store::{
    LeaseStore, MemoryStore, RatingCommit, RatingMutation, StoreError, Versioned,
};

struct Gate {
    barrier: Arc<Barrier>,
    remaining: usize,
}

/// Wraps [`MemoryStore`] so tests can force interleavings.
///
/// A gate on a read holds every caller after the read until all expected
/// callers have read, so they all act on the same revision. A gate on a
/// write or transaction lines callers up before it. Delays slow a single
/// method down. Ungated reads yield so spawned tasks interleave.
pub struct GatedStore {
    inner: Arc<MemoryStore>,
    gates: Mutex<HashMap<&'static str, Gate>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            gates: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
        }
    }

    /// The next `parties` calls to `method` wait for each other once.
    pub fn gate(&self, method: &'static str, parties: usize) {
        self.gates.lock().unwrap().insert(
            method,
            Gate {
                barrier: Arc::new(Barrier::new(parties)),
                remaining: parties,
            },
        );
    }

    pub fn delay(&self, method: &'static str, by: Duration) {
        self.delays.lock().unwrap().insert(method, by);
    }

    async fn checkpoint(&self, method: &'static str) {
        let delay = self.delays.lock().unwrap().get(method).copied();
        if let Some(by) = delay {
            tokio::time::sleep(by).await;
        }

        let barrier = {
            let mut gates = self.gates.lock().unwrap();
            match gates.get_mut(method) {
                Some(gate) => {
                    gate.remaining -= 1;
                    let barrier = gate.barrier.clone();
                    if gate.remaining == 0 {
                        gates.remove(method);
                    }
                    Some(barrier)
                }
                None => None,
            }
        };

        match barrier {
            Some(barrier) => {
                barrier.wait().await;
            }
            None => tokio::task::yield_now().await,
        }
    }
}

#[async_trait]
impl LeaseStore for GatedStore {
    async fn get_fleet(&self, id: Uuid) -> Result<FleetProfile, StoreError> {
        self.inner.get_fleet(id).await
    }

    async fn get_driver(&self, key: DriverKey) -> Result<DriverRecord, StoreError> {
        self.inner.get_driver(key).await
    }

    async fn set_driver_availability(
        &self,
        key: DriverKey,
        availability: DriverAvailability,
        at: DateTime<Utc>,
    ) -> Result<DriverRecord, StoreError> {
        self.checkpoint("set_driver_availability").await;
        self.inner.set_driver_availability(key, availability, at).await
    }

    async fn get_load(&self, id: Uuid) -> Result<Load, StoreError> {
        self.inner.get_load(id).await
    }

    async fn mark_load_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<Load, StoreError> {
        self.checkpoint("mark_load_delivered").await;
        self.inner.mark_load_delivered(id, at).await
    }

    async fn insert_match(&self, record: MatchRecord) -> Result<Versioned<MatchRecord>, StoreError> {
        self.checkpoint("insert_match").await;
        self.inner.insert_match(record).await
    }

    async fn get_match(&self, id: Uuid) -> Result<Versioned<MatchRecord>, StoreError> {
        let read = self.inner.get_match(id).await;
        self.checkpoint("get_match").await;
        read
    }

    async fn update_match(
        &self,
        expected_revision: u64,
        record: MatchRecord,
    ) -> Result<Versioned<MatchRecord>, StoreError> {
        self.checkpoint("update_match").await;
        self.inner.update_match(expected_revision, record).await
    }

    async fn find_open_match(
        &self,
        driver_id: Uuid,
        load_id: Uuid,
    ) -> Result<Option<Versioned<MatchRecord>>, StoreError> {
        let read = self.inner.find_open_match(driver_id, load_id).await;
        self.checkpoint("find_open_match").await;
        read
    }

    async fn list_matches(
        &self,
        statuses: &[MatchStatus],
    ) -> Result<Vec<Versioned<MatchRecord>>, StoreError> {
        self.inner.list_matches(statuses).await
    }

    async fn insert_tla(
        &self,
        record: TripLeaseAgreement,
    ) -> Result<Versioned<TripLeaseAgreement>, StoreError> {
        self.checkpoint("insert_tla").await;
        self.inner.insert_tla(record).await
    }

    async fn get_tla(&self, id: Uuid) -> Result<Versioned<TripLeaseAgreement>, StoreError> {
        let read = self.inner.get_tla(id).await;
        self.checkpoint("get_tla").await;
        read
    }

    async fn update_tla(
        &self,
        expected_revision: u64,
        record: TripLeaseAgreement,
    ) -> Result<Versioned<TripLeaseAgreement>, StoreError> {
        self.checkpoint("update_tla").await;
        self.inner.update_tla(expected_revision, record).await
    }

    async fn delete_tla(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_tla(id).await
    }

    async fn rating_transaction(
        &self,
        tla_id: Uuid,
        mutation: RatingMutation<'_>,
    ) -> Result<RatingCommit, EngineError> {
        self.checkpoint("rating_transaction").await;
        self.inner.rating_transaction(tla_id, mutation).await
    }

    async fn append_rating(&self, entry: RatingEntry) -> Result<(), StoreError> {
        self.inner.append_rating(entry).await
    }

    async fn list_ratings(&self, key: DriverKey) -> Result<Vec<RatingEntry>, StoreError> {
        self.inner.list_ratings(key).await
    }
}
