//! Builds the initial trip lease agreement from an accepted match.
//!
//! Pure: every input is passed in and nothing is read or written here.
//! Party and driver blocks are copied into snapshot types so later edits to
//! a fleet or driver never alter an issued agreement. Absent source values
//! stay absent instead of becoming empty placeholders.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::driver::DriverRecord;
use crate::models::fleet::{non_blank, FleetProfile, PartySnapshot};
use crate::models::match_record::{MatchRecord, MatchStatus};
use crate::models::tla::{
    InsuranceElection, LeasedDriver, PaymentTerms, TlaStatus, TripLeaseAgreement, TripTerms,
};

pub const DOCUMENT_VERSION: u32 = 1;

pub struct GenerationInput<'a> {
    pub agreement_id: Uuid,
    pub match_record: &'a MatchRecord,
    pub lessor: &'a FleetProfile,
    pub lessee: &'a FleetProfile,
    pub driver: &'a DriverRecord,
    pub now: DateTime<Utc>,
}

pub fn generate_tla(input: GenerationInput<'_>) -> Result<TripLeaseAgreement, EngineError> {
    let GenerationInput {
        agreement_id,
        match_record,
        lessor,
        lessee,
        driver,
        now,
    } = input;

    if match_record.status != MatchStatus::Accepted {
        return Err(EngineError::InvalidTransition(format!(
            "match {} is {}; agreements are generated from accepted matches",
            match_record.id, match_record.status
        )));
    }
    if lessor.id != match_record.driver_owner_id {
        return Err(EngineError::Precondition(format!(
            "fleet {} does not supply the driver on match {}",
            lessor.id, match_record.id
        )));
    }
    if lessee.id != match_record.load_owner_id {
        return Err(EngineError::Precondition(format!(
            "fleet {} does not own the load on match {}",
            lessee.id, match_record.id
        )));
    }
    if driver.id != match_record.driver_id || driver.fleet_id != lessor.id {
        return Err(EngineError::Precondition(format!(
            "driver {} is not the driver on match {}",
            driver.id, match_record.id
        )));
    }

    let terms = match_record.effective_terms();
    let load = &match_record.load;

    let start_date = terms
        .pickup_date
        .or(load.pickup_date)
        .unwrap_or_else(|| now.date_naive());

    Ok(TripLeaseAgreement {
        id: agreement_id,
        match_id: match_record.id,
        lessor: PartySnapshot::capture(lessor),
        lessee: PartySnapshot::capture(lessee),
        driver: LeasedDriver {
            id: driver.id,
            name: driver.name.clone(),
            cdl_number: non_blank(&driver.cdl_number),
            cdl_state: non_blank(&driver.cdl_state),
            medical_card_expiry: driver.medical_card_expiry,
        },
        trip: TripTerms {
            load_id: match_record.load_id,
            origin: load.origin.clone(),
            destination: load.destination.clone(),
            cargo: load.cargo.clone(),
            weight_lbs: load.weight_lbs,
            start_date,
            end_date: load.delivery_date,
        },
        payment: PaymentTerms {
            amount: terms.rate,
            due_date: load.delivery_date,
        },
        insurance: InsuranceElection::default(),
        locations: None,
        lessor_signature: None,
        lessee_signature: None,
        trip_tracking: None,
        status: TlaStatus::PendingLessor,
        rated: false,
        rating_given: None,
        rating_comment: None,
        rated_at: None,
        voided: None,
        version: DOCUMENT_VERSION,
        created_at: now,
        updated_at: now,
    })
}
