#![allow(dead_code)]

pub mod store;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use trip_lease::clock::ManualClock;
use trip_lease::config::Config;
use trip_lease::engine::negotiation::{MatchResponse, NewMatch};
use trip_lease::engine::signing::{AuditContext, SignRequest};
use trip_lease::models::driver::{DriverAvailability, DriverRecord};
use trip_lease::models::fleet::FleetProfile;
use trip_lease::models::load::{Load, LoadStatus};
use trip_lease::models::match_record::{Initiator, MatchRecord, MatchTerms};
use trip_lease::models::tla::{InsuranceOption, SignatureRole, TripLeaseAgreement};
use trip_lease::notify::NotificationEvent;
use trip_lease::state::AppState;
use trip_lease::store::{LeaseStore, MemoryStore};

pub use store::GatedStore;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 7, 8, 0, 0).unwrap()
}

pub fn fleet(name: &str) -> FleetProfile {
    FleetProfile {
        id: Uuid::new_v4(),
        legal_name: format!("{name} Transport LLC"),
        contact_name: format!("{name} Dispatch"),
        email: format!("dispatch@{}.example.com", name.to_lowercase()),
        phone: Some("555-0100".to_string()),
        address: None,
        dot_number: Some("3141592".to_string()),
        mc_number: Some("MC-271828".to_string()),
    }
}

pub fn driver(fleet_id: Uuid, rating: f64, rating_count: u32) -> DriverRecord {
    DriverRecord {
        id: Uuid::new_v4(),
        fleet_id,
        name: "Jordan Reyes".to_string(),
        cdl_number: Some("TX-99812".to_string()),
        cdl_state: Some("TX".to_string()),
        medical_card_expiry: NaiveDate::from_ymd_opt(2026, 9, 30),
        availability: DriverAvailability::Available,
        rating,
        rating_count,
        last_rated_at: None,
        updated_at: start_time(),
    }
}

pub fn load(owner_id: Uuid) -> Load {
    Load {
        id: Uuid::new_v4(),
        owner_id,
        origin: "Fort Worth, TX".to_string(),
        destination: "Little Rock, AR".to_string(),
        cargo: Some("Palletized paper goods".to_string()),
        weight_lbs: Some(38_500),
        pickup_date: NaiveDate::from_ymd_opt(2025, 4, 9),
        delivery_date: NaiveDate::from_ymd_opt(2025, 4, 10),
        posted_rate: Some(2800.0),
        status: LoadStatus::Open,
        delivered_at: None,
    }
}

pub fn terms(rate: f64) -> MatchTerms {
    MatchTerms {
        rate,
        pickup_date: None,
        notes: None,
    }
}

/// Fleet A supplies the driver (lessor); fleet B owns the load (lessee).
/// Engines see `gated`; `store` is the same data without the gates.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub gated: Arc<GatedStore>,
    pub clock: Arc<ManualClock>,
    pub state: Arc<AppState>,
    pub notifications: mpsc::Receiver<NotificationEvent>,
    pub fleet_a: FleetProfile,
    pub fleet_b: FleetProfile,
    pub driver: DriverRecord,
    pub load: Load,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));

        let fleet_a = fleet("Alpha");
        let fleet_b = fleet("Bravo");
        let driver = driver(fleet_a.id, 4.0, 2);
        let load = load(fleet_b.id);

        store.put_fleet(fleet_a.clone());
        store.put_fleet(fleet_b.clone());
        store.put_driver(driver.clone());
        store.put_load(load.clone());

        let gated = Arc::new(GatedStore::new(store.clone()));
        let (state, notifications) = AppState::new(gated.clone(), clock.clone(), &config);

        Self {
            store,
            gated,
            clock,
            state: Arc::new(state),
            notifications,
            fleet_a,
            fleet_b,
            driver,
            load,
        }
    }

    pub fn new_match(&self, initiated_by: Initiator, rate: f64) -> NewMatch {
        let actor_id = match initiated_by {
            Initiator::LoadOwner => self.fleet_b.id,
            Initiator::DriverOwner => self.fleet_a.id,
        };
        NewMatch {
            load_id: self.load.id,
            driver_fleet_id: self.fleet_a.id,
            driver_id: self.driver.id,
            initiated_by,
            actor_id,
            terms: terms(rate),
            expiry_hours: None,
        }
    }

    /// A second open load owned by fleet B, for tests that need several agreements.
    pub fn add_load(&self) -> Load {
        let load = load(self.fleet_b.id);
        self.store.put_load(load.clone());
        load
    }

    pub fn sign_request(&self, role: SignatureRole) -> SignRequest {
        let (actor_id, name, insurance_option) = match role {
            SignatureRole::Lessor => (self.fleet_a.id, "Avery Alpha", None),
            SignatureRole::Lessee => (
                self.fleet_b.id,
                "Blake Bravo",
                Some(InsuranceOption::ExistingPolicy),
            ),
        };
        SignRequest {
            role,
            actor_id,
            signature_name: name.to_string(),
            audit: AuditContext {
                ip_address: "203.0.113.7".to_string(),
                user_agent: "fleet-portal/1.0".to_string(),
            },
            insurance_option,
            locations: None,
        }
    }

    pub async fn accepted_match_for(&self, load_id: Uuid) -> MatchRecord {
        let mut request = self.new_match(Initiator::LoadOwner, 2800.0);
        request.load_id = load_id;
        let created = self.state.negotiation.create(request).await.unwrap();
        self.state
            .negotiation
            .respond(created.id, self.fleet_a.id, MatchResponse::Accept)
            .await
            .unwrap()
    }

    pub async fn pending_tla_for(&self, load_id: Uuid) -> TripLeaseAgreement {
        let accepted = self.accepted_match_for(load_id).await;
        self.state.signing.create_from_match(accepted.id).await.unwrap()
    }

    pub async fn signed_tla_for(&self, load_id: Uuid) -> TripLeaseAgreement {
        let tla = self.pending_tla_for(load_id).await;
        self.state
            .signing
            .sign(tla.id, self.sign_request(SignatureRole::Lessor))
            .await
            .unwrap();
        self.state
            .signing
            .sign(tla.id, self.sign_request(SignatureRole::Lessee))
            .await
            .unwrap()
    }

    pub async fn completed_tla_for(&self, load_id: Uuid) -> TripLeaseAgreement {
        let tla = self.signed_tla_for(load_id).await;
        self.state
            .trips
            .start(tla.id, self.fleet_a.id, "Avery Alpha".to_string())
            .await
            .unwrap();
        self.clock.advance(chrono::Duration::hours(5));
        self.state
            .trips
            .end(tla.id, self.fleet_a.id, "Avery Alpha".to_string())
            .await
            .unwrap()
            .agreement
    }

    pub async fn driver_record(&self) -> DriverRecord {
        self.store.get_driver(self.driver.key()).await.unwrap()
    }

    pub fn drain_notifications(&mut self) -> Vec<NotificationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.notifications.try_recv() {
            events.push(event);
        }
        events
    }
}
