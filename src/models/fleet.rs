use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Live fleet profile as kept by the surrounding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetProfile {
    pub id: Uuid,
    pub legal_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub dot_number: Option<String>,
    pub mc_number: Option<String>,
}

/// Who to notify about a negotiation, captured when the match is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyContact {
    pub owner_id: Uuid,
    pub name: String,
    pub email: String,
}

impl PartyContact {
    pub fn capture(fleet: &FleetProfile) -> Self {
        Self {
            owner_id: fleet.id,
            name: fleet.contact_name.clone(),
            email: fleet.email.clone(),
        }
    }
}

/// Legal party block of a trip lease agreement. Frozen at generation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartySnapshot {
    pub fleet_id: Uuid,
    pub legal_name: String,
    pub contact_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dot_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mc_number: Option<String>,
}

impl PartySnapshot {
    pub fn capture(fleet: &FleetProfile) -> Self {
        Self {
            fleet_id: fleet.id,
            legal_name: fleet.legal_name.clone(),
            contact_name: fleet.contact_name.clone(),
            email: fleet.email.clone(),
            phone: non_blank(&fleet.phone),
            address: non_blank(&fleet.address),
            dot_number: non_blank(&fleet.dot_number),
            mc_number: non_blank(&fleet.mc_number),
        }
    }

    pub fn contact(&self) -> PartyContact {
        PartyContact {
            owner_id: self.fleet_id,
            name: self.contact_name.clone(),
            email: self.email.clone(),
        }
    }
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
