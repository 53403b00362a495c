use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of the append-only ratings log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingEntry {
    pub id: Uuid,
    pub tla_id: Uuid,
    pub driver_id: Uuid,
    pub driver_fleet_id: Uuid,
    pub rater_id: Uuid,
    pub score: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
