use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Open,
    Delivered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Load {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub cargo: Option<String>,
    pub weight_lbs: Option<u32>,
    pub pickup_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub posted_rate: Option<f64>,
    pub status: LoadStatus,
    pub delivered_at: Option<DateTime<Utc>>,
}
