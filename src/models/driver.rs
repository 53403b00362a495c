use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverAvailability {
    Available,
    OnTrip,
    OffDuty,
}

/// Drivers live under their owning fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverKey {
    pub fleet_id: Uuid,
    pub driver_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRecord {
    pub id: Uuid,
    pub fleet_id: Uuid,
    pub name: String,
    pub cdl_number: Option<String>,
    pub cdl_state: Option<String>,
    pub medical_card_expiry: Option<NaiveDate>,
    pub availability: DriverAvailability,
    pub rating: f64,
    pub rating_count: u32,
    pub last_rated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DriverRecord {
    pub fn key(&self) -> DriverKey {
        DriverKey {
            fleet_id: self.fleet_id,
            driver_id: self.id,
        }
    }
}
