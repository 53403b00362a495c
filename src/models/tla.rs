use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::fleet::PartySnapshot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TlaStatus {
    PendingLessor,
    PendingLessee,
    Signed,
    InProgress,
    Completed,
    Voided,
}

impl TlaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TlaStatus::PendingLessor => "pending_lessor",
            TlaStatus::PendingLessee => "pending_lessee",
            TlaStatus::Signed => "signed",
            TlaStatus::InProgress => "in_progress",
            TlaStatus::Completed => "completed",
            TlaStatus::Voided => "voided",
        }
    }

    pub fn awaiting_signatures(self) -> bool {
        matches!(self, TlaStatus::PendingLessor | TlaStatus::PendingLessee)
    }

    pub fn can_transition_to(self, next: TlaStatus) -> bool {
        use TlaStatus::*;

        match (self, next) {
            (PendingLessor, PendingLessee) | (PendingLessee, PendingLessor) => true,
            (PendingLessor | PendingLessee, Signed) => true,
            (Signed, InProgress) => true,
            (InProgress, Completed) => true,
            (PendingLessor | PendingLessee | Signed | InProgress, Voided) => true,
            _ => false,
        }
    }

    pub fn pending_for(role: SignatureRole) -> Self {
        match role {
            SignatureRole::Lessor => TlaStatus::PendingLessor,
            SignatureRole::Lessee => TlaStatus::PendingLessee,
        }
    }
}

impl fmt::Display for TlaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignatureRole {
    Lessor,
    Lessee,
}

impl SignatureRole {
    pub fn other(self) -> Self {
        match self {
            SignatureRole::Lessor => SignatureRole::Lessee,
            SignatureRole::Lessee => SignatureRole::Lessor,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignatureRole::Lessor => "lessor",
            SignatureRole::Lessee => "lessee",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsuranceOption {
    ExistingPolicy,
    TripCoverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub signed_by: Uuid,
    pub signed_by_name: String,
    pub signed_by_role: SignatureRole,
    pub signed_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    pub consent_to_esign: bool,
}

/// Driver block of the agreement. Frozen at generation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeasedDriver {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdl_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdl_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_card_expiry: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripTerms {
    pub load_id: Uuid,
    pub origin: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cargo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_lbs: Option<u32>,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTerms {
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsuranceElection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<InsuranceOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripLocations {
    pub pickup_address: String,
    pub delivery_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripTracking {
    pub started_at: DateTime<Utc>,
    pub started_by: Uuid,
    pub started_by_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_by_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidRecord {
    pub voided_by: Uuid,
    pub voided_at: DateTime<Utc>,
    pub reason: String,
    pub previous_status: TlaStatus,
}

/// Trip lease agreement. Party, driver, trip and payment blocks never change
/// after generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripLeaseAgreement {
    pub id: Uuid,
    pub match_id: Uuid,
    pub lessor: PartySnapshot,
    pub lessee: PartySnapshot,
    pub driver: LeasedDriver,
    pub trip: TripTerms,
    pub payment: PaymentTerms,
    #[serde(default)]
    pub insurance: InsuranceElection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<TripLocations>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lessor_signature: Option<Signature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lessee_signature: Option<Signature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_tracking: Option<TripTracking>,
    pub status: TlaStatus,
    #[serde(default)]
    pub rated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_given: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voided: Option<VoidRecord>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TripLeaseAgreement {
    pub fn signature(&self, role: SignatureRole) -> Option<&Signature> {
        match role {
            SignatureRole::Lessor => self.lessor_signature.as_ref(),
            SignatureRole::Lessee => self.lessee_signature.as_ref(),
        }
    }

    pub fn party(&self, role: SignatureRole) -> &PartySnapshot {
        match role {
            SignatureRole::Lessor => &self.lessor,
            SignatureRole::Lessee => &self.lessee,
        }
    }

    pub fn is_party(&self, actor_id: Uuid) -> bool {
        actor_id == self.lessor.fleet_id || actor_id == self.lessee.fleet_id
    }

    pub fn fully_signed(&self) -> bool {
        self.lessor_signature.is_some() && self.lessee_signature.is_some()
    }
}
