use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::driver::{DriverAvailability, DriverKey, DriverRecord};
use crate::models::fleet::FleetProfile;
use crate::models::load::{Load, LoadStatus};
use crate::models::match_record::{MatchRecord, MatchStatus};
use crate::models::rating::RatingEntry;
use crate::models::tla::TripLeaseAgreement;
use crate::store::{LeaseStore, RatingCommit, RatingMutation, StoreError, Versioned};

/// Sharded in-memory store.
///
/// Lock order, when two maps are held at once: `tlas` before `drivers`,
/// `matches` before `open_pairs`.
#[derive(Default)]
pub struct MemoryStore {
    fleets: DashMap<Uuid, FleetProfile>,
    drivers: DashMap<DriverKey, DriverRecord>,
    loads: DashMap<Uuid, Load>,
    matches: DashMap<Uuid, Versioned<MatchRecord>>,
    open_pairs: DashMap<(Uuid, Uuid), Uuid>,
    tlas: DashMap<Uuid, Versioned<TripLeaseAgreement>>,
    ratings: DashMap<Uuid, RatingEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_fleet(&self, fleet: FleetProfile) {
        self.fleets.insert(fleet.id, fleet);
    }

    pub fn put_driver(&self, driver: DriverRecord) {
        self.drivers.insert(driver.key(), driver);
    }

    pub fn put_load(&self, load: Load) {
        self.loads.insert(load.id, load);
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn tla_count(&self) -> usize {
        self.tlas.len()
    }
}

fn not_found(collection: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        collection,
        id: id.to_string(),
    }
}

fn driver_id(key: &DriverKey) -> String {
    format!("{}/{}", key.fleet_id, key.driver_id)
}

#[async_trait]
impl LeaseStore for MemoryStore {
    async fn get_fleet(&self, id: Uuid) -> Result<FleetProfile, StoreError> {
        self.fleets
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("fleets", id))
    }

    async fn get_driver(&self, key: DriverKey) -> Result<DriverRecord, StoreError> {
        self.drivers
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("drivers", driver_id(&key)))
    }

    async fn set_driver_availability(
        &self,
        key: DriverKey,
        availability: DriverAvailability,
        at: DateTime<Utc>,
    ) -> Result<DriverRecord, StoreError> {
        let mut driver = self
            .drivers
            .get_mut(&key)
            .ok_or_else(|| not_found("drivers", driver_id(&key)))?;

        driver.availability = availability;
        driver.updated_at = at;
        Ok(driver.clone())
    }

    async fn get_load(&self, id: Uuid) -> Result<Load, StoreError> {
        self.loads
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("loads", id))
    }

    async fn mark_load_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<Load, StoreError> {
        let mut load = self.loads.get_mut(&id).ok_or_else(|| not_found("loads", id))?;

        if load.status != LoadStatus::Delivered {
            load.status = LoadStatus::Delivered;
            load.delivered_at = Some(at);
        }
        Ok(load.clone())
    }

    async fn insert_match(&self, record: MatchRecord) -> Result<Versioned<MatchRecord>, StoreError> {
        if self.matches.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists {
                collection: "matches",
                id: record.id.to_string(),
            });
        }

        let pair = (record.driver_id, record.load_id);
        if !record.status.is_terminal() {
            match self.open_pairs.entry(pair) {
                Entry::Occupied(existing) => {
                    return Err(StoreError::AlreadyExists {
                        collection: "matches",
                        id: format!("driver {} / load {} (match {})", pair.0, pair.1, existing.get()),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(record.id);
                }
            }
        }

        let versioned = Versioned {
            revision: 1,
            record,
        };
        self.matches.insert(versioned.record.id, versioned.clone());
        Ok(versioned)
    }

    async fn get_match(&self, id: Uuid) -> Result<Versioned<MatchRecord>, StoreError> {
        self.matches
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("matches", id))
    }

    async fn update_match(
        &self,
        expected_revision: u64,
        record: MatchRecord,
    ) -> Result<Versioned<MatchRecord>, StoreError> {
        let id = record.id;
        let mut entry = self.matches.get_mut(&id).ok_or_else(|| not_found("matches", id))?;

        if entry.revision != expected_revision {
            return Err(StoreError::RevisionConflict {
                collection: "matches",
                id: id.to_string(),
                expected: expected_revision,
            });
        }

        if record.status.is_terminal() && !entry.record.status.is_terminal() {
            self.open_pairs
                .remove_if(&(record.driver_id, record.load_id), |_, holder| *holder == id);
        }

        entry.revision += 1;
        entry.record = record;
        Ok(entry.clone())
    }

    async fn find_open_match(
        &self,
        driver_id: Uuid,
        load_id: Uuid,
    ) -> Result<Option<Versioned<MatchRecord>>, StoreError> {
        let holder = self.open_pairs.get(&(driver_id, load_id)).map(|entry| *entry.value());

        Ok(holder.and_then(|id| self.matches.get(&id).map(|entry| entry.value().clone())))
    }

    async fn list_matches(
        &self,
        statuses: &[MatchStatus],
    ) -> Result<Vec<Versioned<MatchRecord>>, StoreError> {
        Ok(self
            .matches
            .iter()
            .filter(|entry| statuses.contains(&entry.record.status))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn insert_tla(
        &self,
        record: TripLeaseAgreement,
    ) -> Result<Versioned<TripLeaseAgreement>, StoreError> {
        match self.tlas.entry(record.id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                collection: "tlas",
                id: record.id.to_string(),
            }),
            Entry::Vacant(slot) => {
                let versioned = Versioned {
                    revision: 1,
                    record,
                };
                slot.insert(versioned.clone());
                Ok(versioned)
            }
        }
    }

    async fn get_tla(&self, id: Uuid) -> Result<Versioned<TripLeaseAgreement>, StoreError> {
        self.tlas
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("tlas", id))
    }

    async fn update_tla(
        &self,
        expected_revision: u64,
        record: TripLeaseAgreement,
    ) -> Result<Versioned<TripLeaseAgreement>, StoreError> {
        let id = record.id;
        let mut entry = self.tlas.get_mut(&id).ok_or_else(|| not_found("tlas", id))?;

        if entry.revision != expected_revision {
            return Err(StoreError::RevisionConflict {
                collection: "tlas",
                id: id.to_string(),
                expected: expected_revision,
            });
        }

        entry.revision += 1;
        entry.record = record;
        Ok(entry.clone())
    }

    async fn delete_tla(&self, id: Uuid) -> Result<(), StoreError> {
        self.tlas
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("tlas", id))
    }

    async fn rating_transaction(
        &self,
        tla_id: Uuid,
        mutation: RatingMutation<'_>,
    ) -> Result<RatingCommit, EngineError> {
        let mut tla_entry = self
            .tlas
            .get_mut(&tla_id)
            .ok_or_else(|| not_found("tlas", tla_id))?;

        let key = DriverKey {
            fleet_id: tla_entry.record.lessor.fleet_id,
            driver_id: tla_entry.record.driver.id,
        };
        let mut driver_entry = self
            .drivers
            .get_mut(&key)
            .ok_or_else(|| not_found("drivers", driver_id(&key)))?;

        let mut tla = tla_entry.record.clone();
        let mut driver = driver_entry.clone();
        mutation(&mut tla, &mut driver)?;

        tla_entry.revision += 1;
        tla_entry.record = tla;
        *driver_entry = driver.clone();

        Ok(RatingCommit {
            tla: tla_entry.clone(),
            driver,
        })
    }

    async fn append_rating(&self, entry: RatingEntry) -> Result<(), StoreError> {
        match self.ratings.entry(entry.id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                collection: "ratings",
                id: entry.id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    async fn list_ratings(&self, key: DriverKey) -> Result<Vec<RatingEntry>, StoreError> {
        let mut entries: Vec<RatingEntry> = self
            .ratings
            .iter()
            .filter(|entry| entry.driver_fleet_id == key.fleet_id && entry.driver_id == key.driver_id)
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|entry| entry.created_at);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::models::fleet::PartyContact;
    use crate::models::match_record::{
        DriverCard, Initiator, LoadSnapshot, MatchRecord, MatchStatus, MatchTerms,
    };
    use crate::store::{LeaseStore, StoreError};

    fn pending(driver_id: Uuid, load_id: Uuid) -> MatchRecord {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let contact = |owner_id| PartyContact {
            owner_id,
            name: "Dispatch".to_string(),
            email: "dispatch@example.com".to_string(),
        };
        let (load_owner, driver_owner) = (Uuid::new_v4(), Uuid::new_v4());

        MatchRecord {
            id: Uuid::new_v4(),
            load_id,
            driver_id,
            load_owner_id: load_owner,
            driver_owner_id: driver_owner,
            initiated_by: Initiator::LoadOwner,
            recipient_owner_id: driver_owner,
            original_terms: MatchTerms {
                rate: 1800.0,
                pickup_date: None,
                notes: None,
            },
            counter_terms: None,
            counter_count: 0,
            status: MatchStatus::Pending,
            created_at: now,
            expires_at: now,
            updated_at: now,
            decline_reason: None,
            tla_id: None,
            load: LoadSnapshot {
                origin: "Reno, NV".to_string(),
                destination: "Boise, ID".to_string(),
                cargo: None,
                weight_lbs: None,
                pickup_date: None,
                delivery_date: None,
            },
            driver: DriverCard {
                name: "Kai Lee".to_string(),
                rating: 0.0,
                rating_count: 0,
            },
            load_owner: contact(load_owner),
            driver_owner: contact(driver_owner),
        }
    }

    #[tokio::test]
    async fn stale_revision_is_rejected() {
        let store = MemoryStore::new();
        let inserted = store
            .insert_match(pending(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(inserted.revision, 1);

        let mut first = inserted.record.clone();
        first.status = MatchStatus::Accepted;
        let updated = store.update_match(1, first).await.unwrap();
        assert_eq!(updated.revision, 2);

        let mut second = inserted.record.clone();
        second.status = MatchStatus::Declined;
        let err = store.update_match(1, second).await.unwrap_err();
        assert!(matches!(err, StoreError::RevisionConflict { expected: 1, .. }));

        let stored = store.get_match(inserted.record.id).await.unwrap();
        assert_eq!(stored.record.status, MatchStatus::Accepted);
    }

    #[tokio::test]
    async fn open_pair_is_reserved_until_terminal() {
        let store = MemoryStore::new();
        let (driver_id, load_id) = (Uuid::new_v4(), Uuid::new_v4());

        let first = store.insert_match(pending(driver_id, load_id)).await.unwrap();
        let err = store
            .insert_match(pending(driver_id, load_id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(
            store
                .find_open_match(driver_id, load_id)
                .await
                .unwrap()
                .map(|found| found.record.id),
            Some(first.record.id)
        );

        let mut expired = first.record.clone();
        expired.status = MatchStatus::Expired;
        store.update_match(first.revision, expired).await.unwrap();

        assert!(store.find_open_match(driver_id, load_id).await.unwrap().is_none());
        store.insert_match(pending(driver_id, load_id)).await.unwrap();
        assert_eq!(store.match_count(), 2);
    }
}
