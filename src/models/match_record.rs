use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::fleet::PartyContact;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Initiator {
    LoadOwner,
    DriverOwner,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Countered,
    Accepted,
    Declined,
    Expired,
    Cancelled,
    TlaPending,
    TlaSigned,
    InProgress,
    Completed,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Countered => "countered",
            MatchStatus::Accepted => "accepted",
            MatchStatus::Declined => "declined",
            MatchStatus::Expired => "expired",
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::TlaPending => "tla_pending",
            MatchStatus::TlaSigned => "tla_signed",
            MatchStatus::InProgress => "in_progress",
            MatchStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MatchStatus::Declined
                | MatchStatus::Expired
                | MatchStatus::Cancelled
                | MatchStatus::Completed
        )
    }

    /// Still waiting on a reply from `recipient_owner_id`.
    pub fn is_open_offer(self) -> bool {
        matches!(self, MatchStatus::Pending | MatchStatus::Countered)
    }

    /// The single source of truth for legal match transitions.
    pub fn can_transition_to(self, next: MatchStatus) -> bool {
        use MatchStatus::*;

        match (self, next) {
            (Pending | Countered, Accepted | Declined | Countered | Expired | Cancelled) => true,
            (Accepted, TlaPending | Cancelled) => true,
            (TlaPending, TlaSigned) => true,
            (TlaSigned, InProgress) => true,
            // Voiding the agreement releases the match.
            (TlaPending | TlaSigned | InProgress, Cancelled) => true,
            (InProgress, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchTerms {
    pub rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Load fields as they looked when the match was proposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    pub origin: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cargo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_lbs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<NaiveDate>,
}

/// Driver fields as they looked when the match was proposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverCard {
    pub name: String,
    pub rating: f64,
    pub rating_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: Uuid,
    pub load_id: Uuid,
    pub driver_id: Uuid,
    pub load_owner_id: Uuid,
    pub driver_owner_id: Uuid,
    pub initiated_by: Initiator,
    pub recipient_owner_id: Uuid,
    pub original_terms: MatchTerms,
    pub counter_terms: Option<MatchTerms>,
    pub counter_count: u32,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decline_reason: Option<String>,
    pub tla_id: Option<Uuid>,
    pub load: LoadSnapshot,
    pub driver: DriverCard,
    pub load_owner: PartyContact,
    pub driver_owner: PartyContact,
}

impl MatchRecord {
    /// Counter terms, once present, supersede the original offer.
    pub fn effective_terms(&self) -> &MatchTerms {
        self.counter_terms.as_ref().unwrap_or(&self.original_terms)
    }

    pub fn initiator_id(&self) -> Uuid {
        match self.initiated_by {
            Initiator::LoadOwner => self.load_owner_id,
            Initiator::DriverOwner => self.driver_owner_id,
        }
    }

    pub fn is_party(&self, actor_id: Uuid) -> bool {
        actor_id == self.load_owner_id || actor_id == self.driver_owner_id
    }

    /// The party on the other side of `owner_id`.
    pub fn counterparty_of(&self, owner_id: Uuid) -> Uuid {
        if owner_id == self.load_owner_id {
            self.driver_owner_id
        } else {
            self.load_owner_id
        }
    }

    pub fn contact_for(&self, owner_id: Uuid) -> &PartyContact {
        if owner_id == self.load_owner_id {
            &self.load_owner
        } else {
            &self.driver_owner
        }
    }
}
