//! Persistence port for the lease lifecycle.
//!
//! Collections are id-keyed: `fleets`, `drivers` (keyed by owning fleet),
//! `loads`, `matches`, `tlas` and the append-only `ratings` log.
//!
//! ## Optimistic concurrency
//!
//! Matches and agreements are returned wrapped in [`Versioned`]. Updates are
//! compare-and-set on the revision that was read: if another writer got
//! there first the update fails with [`StoreError::RevisionConflict`] and
//! nothing is written.
//!
//! ## Rating transaction
//!
//! [`LeaseStore::rating_transaction`] is the one place where two records
//! change as a unit. The adapter must hold both the agreement and the
//! driver record exclusively while the mutation runs and write both or
//! neither.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::driver::{DriverAvailability, DriverKey, DriverRecord};
use crate::models::fleet::FleetProfile;
use crate::models::load::Load;
use crate::models::match_record::{MatchRecord, MatchStatus};
use crate::models::rating::RatingEntry;
use crate::models::tla::TripLeaseAgreement;

pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("{collection}/{id} was modified concurrently (expected revision {expected})")]
    RevisionConflict {
        collection: &'static str,
        id: String,
        expected: u64,
    },

    #[error("{collection}/{id} already exists")]
    AlreadyExists { collection: &'static str, id: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// A record together with the revision it was read at.
#[derive(Debug, Clone, Serialize)]
pub struct Versioned<T> {
    pub revision: u64,
    #[serde(flatten)]
    pub record: T,
}

/// Applied to the agreement and its driver inside the rating transaction.
/// Returning an error aborts the transaction without writing anything.
pub type RatingMutation<'a> =
    &'a (dyn Fn(&mut TripLeaseAgreement, &mut DriverRecord) -> Result<(), EngineError> + Send + Sync);

#[derive(Debug, Clone)]
pub struct RatingCommit {
    pub tla: Versioned<TripLeaseAgreement>,
    pub driver: DriverRecord,
}

#[async_trait]
pub trait LeaseStore: Send + Sync + 'static {
    async fn get_fleet(&self, id: Uuid) -> Result<FleetProfile, StoreError>;

    async fn get_driver(&self, key: DriverKey) -> Result<DriverRecord, StoreError>;

    async fn set_driver_availability(
        &self,
        key: DriverKey,
        availability: DriverAvailability,
        at: DateTime<Utc>,
    ) -> Result<DriverRecord, StoreError>;

    async fn get_load(&self, id: Uuid) -> Result<Load, StoreError>;

    async fn mark_load_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<Load, StoreError>;

    /// Insert a new match. Fails with `AlreadyExists` while another
    /// non-terminal match holds the same (driver, load) pair.
    async fn insert_match(&self, record: MatchRecord) -> Result<Versioned<MatchRecord>, StoreError>;

    async fn get_match(&self, id: Uuid) -> Result<Versioned<MatchRecord>, StoreError>;

    /// Compare-and-set on `expected_revision`.
    async fn update_match(
        &self,
        expected_revision: u64,
        record: MatchRecord,
    ) -> Result<Versioned<MatchRecord>, StoreError>;

    async fn find_open_match(
        &self,
        driver_id: Uuid,
        load_id: Uuid,
    ) -> Result<Option<Versioned<MatchRecord>>, StoreError>;

    async fn list_matches(
        &self,
        statuses: &[MatchStatus],
    ) -> Result<Vec<Versioned<MatchRecord>>, StoreError>;

    async fn insert_tla(
        &self,
        record: TripLeaseAgreement,
    ) -> Result<Versioned<TripLeaseAgreement>, StoreError>;

    async fn get_tla(&self, id: Uuid) -> Result<Versioned<TripLeaseAgreement>, StoreError>;

    /// Compare-and-set on `expected_revision`.
    async fn update_tla(
        &self,
        expected_revision: u64,
        record: TripLeaseAgreement,
    ) -> Result<Versioned<TripLeaseAgreement>, StoreError>;

    async fn delete_tla(&self, id: Uuid) -> Result<(), StoreError>;

    /// Run `mutation` over the agreement and the driver it leases as one
    /// atomic unit. Errors from the mutation are returned unchanged.
    async fn rating_transaction(
        &self,
        tla_id: Uuid,
        mutation: RatingMutation<'_>,
    ) -> Result<RatingCommit, EngineError>;

    async fn append_rating(&self, entry: RatingEntry) -> Result<(), StoreError>;

    async fn list_ratings(&self, key: DriverKey) -> Result<Vec<RatingEntry>, StoreError>;
}
