use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::expiry::ExpiryPolicy;
use crate::engine::EngineContext;
use crate::error::EngineError;
use crate::models::driver::DriverKey;
use crate::models::fleet::PartyContact;
use crate::models::load::LoadStatus;
use crate::models::match_record::{
    DriverCard, Initiator, LoadSnapshot, MatchRecord, MatchStatus, MatchTerms,
};
use crate::notify::{EntityKind, EventKind, TransitionPayload};
use crate::store::{StoreError, Versioned};

#[derive(Debug, Clone, Deserialize)]
pub struct NewMatch {
    pub load_id: Uuid,
    pub driver_fleet_id: Uuid,
    pub driver_id: Uuid,
    pub initiated_by: Initiator,
    pub actor_id: Uuid,
    pub terms: MatchTerms,
    /// Overrides the configured offer window for this match only.
    #[serde(default)]
    pub expiry_hours: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MatchResponse {
    Accept,
    Decline {
        #[serde(default)]
        reason: Option<String>,
    },
    Counter {
        terms: MatchTerms,
    },
}

pub struct MatchNegotiationEngine {
    ctx: EngineContext,
}

impl MatchNegotiationEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub async fn create(&self, request: NewMatch) -> Result<MatchRecord, EngineError> {
        self.ctx.run("match_create", self.create_inner(request)).await
    }

    /// Reads a match, expiring it first if its window has passed.
    pub async fn get(&self, match_id: Uuid) -> Result<MatchRecord, EngineError> {
        self.ctx.run("match_get", self.get_inner(match_id)).await
    }

    pub async fn respond(
        &self,
        match_id: Uuid,
        actor_id: Uuid,
        response: MatchResponse,
    ) -> Result<MatchRecord, EngineError> {
        self.ctx
            .run("match_respond", self.respond_inner(match_id, actor_id, response))
            .await
    }

    pub async fn cancel(&self, match_id: Uuid, actor_id: Uuid) -> Result<MatchRecord, EngineError> {
        self.ctx
            .run("match_cancel", self.cancel_inner(match_id, actor_id))
            .await
    }

    /// Expires every open offer whose window closed before `now`. Safe to
    /// run repeatedly and alongside `respond`; returns how many matches this
    /// call expired.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        self.ctx.run("match_sweep", self.sweep_inner(now)).await
    }

    async fn create_inner(&self, request: NewMatch) -> Result<MatchRecord, EngineError> {
        validate_terms(&request.terms)?;

        let policy = match request.expiry_hours {
            Some(hours) if hours <= 0 => {
                return Err(EngineError::Precondition(
                    "offer window must be at least one hour".to_string(),
                ));
            }
            Some(hours) => ExpiryPolicy::from_hours(hours),
            None => self.ctx.expiry,
        };

        let store = &self.ctx.store;
        let load = store.get_load(request.load_id).await?;
        let driver = store
            .get_driver(DriverKey {
                fleet_id: request.driver_fleet_id,
                driver_id: request.driver_id,
            })
            .await?;

        let expected_actor = match request.initiated_by {
            Initiator::LoadOwner => load.owner_id,
            Initiator::DriverOwner => driver.fleet_id,
        };
        if request.actor_id != expected_actor {
            return Err(EngineError::Forbidden(format!(
                "actor {} does not own the initiating side",
                request.actor_id
            )));
        }
        if load.owner_id == driver.fleet_id {
            return Err(EngineError::Precondition(
                "a fleet cannot lease its own driver".to_string(),
            ));
        }
        if load.status != LoadStatus::Open {
            return Err(EngineError::Precondition(format!(
                "load {} is no longer open",
                load.id
            )));
        }

        if let Some(existing) = store.find_open_match(driver.id, load.id).await? {
            return Err(EngineError::Conflict(format!(
                "match {} is already open for this driver and load",
                existing.record.id
            )));
        }

        let load_owner = PartyContact::capture(&store.get_fleet(load.owner_id).await?);
        let driver_owner = PartyContact::capture(&store.get_fleet(driver.fleet_id).await?);

        let now = self.ctx.now();
        let recipient_owner_id = match request.initiated_by {
            Initiator::LoadOwner => driver.fleet_id,
            Initiator::DriverOwner => load.owner_id,
        };

        let record = MatchRecord {
            id: Uuid::new_v4(),
            load_id: load.id,
            driver_id: driver.id,
            load_owner_id: load.owner_id,
            driver_owner_id: driver.fleet_id,
            initiated_by: request.initiated_by,
            recipient_owner_id,
            original_terms: request.terms,
            counter_terms: None,
            counter_count: 0,
            status: MatchStatus::Pending,
            created_at: now,
            expires_at: policy.expires_at(now),
            updated_at: now,
            decline_reason: None,
            tla_id: None,
            load: LoadSnapshot {
                origin: load.origin.clone(),
                destination: load.destination.clone(),
                cargo: load.cargo.clone(),
                weight_lbs: load.weight_lbs,
                pickup_date: load.pickup_date,
                delivery_date: load.delivery_date,
            },
            driver: DriverCard {
                name: driver.name.clone(),
                rating: driver.rating,
                rating_count: driver.rating_count,
            },
            load_owner,
            driver_owner,
        };

        let created = store.insert_match(record).await?.record;

        self.ctx.metrics.record_transition("match", created.status.as_str());
        info!(
            match_id = %created.id,
            load_id = %created.load_id,
            driver_id = %created.driver_id,
            expires_at = %created.expires_at,
            "match proposed"
        );

        let recipient = created.contact_for(created.recipient_owner_id).clone();
        self.ctx.notifier.emit_all(
            &[&recipient],
            EventKind::MatchProposed,
            payload(&created, None, Some(request.actor_id), json!({
                "rate": created.original_terms.rate,
                "expires_at": created.expires_at,
                "expires_in_minutes": policy.remaining(created.expires_at, now).num_minutes(),
            })),
        );

        Ok(created)
    }

    async fn get_inner(&self, match_id: Uuid) -> Result<MatchRecord, EngineError> {
        let current = self.ctx.store.get_match(match_id).await?;
        let now = self.ctx.now();

        if current.record.status.is_open_offer()
            && self.ctx.expiry.is_expired(current.record.expires_at, now)
        {
            if let Some(expired) = self.try_expire(current, now).await {
                return Ok(expired);
            }
            return Ok(self.ctx.store.get_match(match_id).await?.record);
        }
        Ok(current.record)
    }

    async fn sweep_inner(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let open = self
            .ctx
            .store
            .list_matches(&[MatchStatus::Pending, MatchStatus::Countered])
            .await?;

        let mut expired = 0;
        for current in open {
            if !self.ctx.expiry.is_expired(current.record.expires_at, now) {
                continue;
            }
            if self.try_expire(current, now).await.is_some() {
                expired += 1;
            }
        }

        if expired > 0 {
            info!(expired, "expired stale match offers");
        }
        Ok(expired)
    }

    async fn respond_inner(
        &self,
        match_id: Uuid,
        actor_id: Uuid,
        response: MatchResponse,
    ) -> Result<MatchRecord, EngineError> {
        let current = self.ctx.store.get_match(match_id).await?;
        let now = self.ctx.now();
        let status = current.record.status;

        // Expiry wins over every other outcome, whoever is asking.
        if status == MatchStatus::Expired {
            return Err(EngineError::Expired(format!("match {match_id} has expired")));
        }
        if status.is_open_offer() && self.ctx.expiry.is_expired(current.record.expires_at, now) {
            self.try_expire(current, now).await;
            return Err(EngineError::Expired(format!(
                "match {match_id} expired before the response arrived"
            )));
        }
        if !current.record.is_party(actor_id) {
            return Err(EngineError::Forbidden(format!(
                "actor {actor_id} is not a party to match {match_id}"
            )));
        }
        if !status.is_open_offer() {
            return Err(EngineError::InvalidTransition(format!(
                "match {match_id} is {status} and no longer takes responses"
            )));
        }
        if actor_id != current.record.recipient_owner_id {
            return Err(EngineError::Forbidden(format!(
                "match {match_id} is waiting on the other party"
            )));
        }

        let mut record = current.record.clone();
        let (next, kind, details) = match response {
            MatchResponse::Accept => {
                let rate = record.effective_terms().rate;
                (MatchStatus::Accepted, EventKind::MatchAccepted, json!({ "rate": rate }))
            }
            MatchResponse::Decline { reason } => {
                record.decline_reason = reason
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty());
                let details = json!({ "reason": record.decline_reason });
                (MatchStatus::Declined, EventKind::MatchDeclined, details)
            }
            MatchResponse::Counter { terms } => {
                validate_terms(&terms)?;
                let details = json!({ "rate": terms.rate, "round": record.counter_count + 1 });
                record.counter_terms = Some(terms);
                record.counter_count += 1;
                record.recipient_owner_id = record.counterparty_of(actor_id);
                (MatchStatus::Countered, EventKind::MatchCountered, details)
            }
        };

        let from = transition(&mut record, next, now)?;
        let updated = self.write(current.revision, record).await?;

        self.ctx.metrics.record_transition("match", next.as_str());
        info!(
            match_id = %match_id,
            actor_id = %actor_id,
            from = %from,
            to = %next,
            "match response recorded"
        );

        let counterparty = updated.contact_for(updated.counterparty_of(actor_id)).clone();
        let event = payload(&updated, Some(from), Some(actor_id), details);
        match next {
            MatchStatus::Accepted => {
                let actor = updated.contact_for(actor_id).clone();
                self.ctx
                    .notifier
                    .emit_all(&[&counterparty, &actor], kind, event);
            }
            _ => self.ctx.notifier.emit_all(&[&counterparty], kind, event),
        }

        Ok(updated)
    }

    async fn cancel_inner(&self, match_id: Uuid, actor_id: Uuid) -> Result<MatchRecord, EngineError> {
        let current = self.ctx.store.get_match(match_id).await?;

        if actor_id != current.record.initiator_id() {
            return Err(EngineError::Forbidden(format!(
                "only the fleet that proposed match {match_id} can cancel it"
            )));
        }
        let status = current.record.status;
        let now = self.ctx.now();
        if status.is_open_offer() && self.ctx.expiry.is_expired(current.record.expires_at, now) {
            self.try_expire(current, now).await;
            return Err(EngineError::Expired(format!(
                "match {match_id} expired before it was cancelled"
            )));
        }
        if !matches!(
            status,
            MatchStatus::Pending | MatchStatus::Countered | MatchStatus::Accepted
        ) {
            return Err(EngineError::InvalidTransition(format!(
                "match {match_id} is {status} and can no longer be cancelled"
            )));
        }

        let mut record = current.record.clone();
        let from = transition(&mut record, MatchStatus::Cancelled, now)?;
        let updated = self.write(current.revision, record).await?;

        self.ctx.metrics.record_transition("match", MatchStatus::Cancelled.as_str());
        info!(match_id = %match_id, actor_id = %actor_id, from = %from, "match cancelled");

        let counterparty = updated.contact_for(updated.counterparty_of(actor_id)).clone();
        self.ctx.notifier.emit_all(
            &[&counterparty],
            EventKind::MatchCancelled,
            payload(&updated, Some(from), Some(actor_id), serde_json::Value::Null),
        );

        Ok(updated)
    }

    /// Best-effort move to `expired`. Returns the expired record, or `None`
    /// if a concurrent writer changed the match first.
    async fn try_expire(
        &self,
        current: Versioned<MatchRecord>,
        now: DateTime<Utc>,
    ) -> Option<MatchRecord> {
        let match_id = current.record.id;
        let mut record = current.record;
        let from = transition(&mut record, MatchStatus::Expired, now).ok()?;

        match self.ctx.store.update_match(current.revision, record).await {
            Ok(updated) => {
                let expired = updated.record;
                self.ctx.metrics.record_transition("match", MatchStatus::Expired.as_str());
                info!(match_id = %match_id, from = %from, "match expired");

                self.ctx.notifier.emit_all(
                    &[&expired.load_owner, &expired.driver_owner],
                    EventKind::MatchExpired,
                    payload(&expired, Some(from), None, json!({ "expired_at": expired.expires_at })),
                );
                Some(expired)
            }
            Err(StoreError::RevisionConflict { .. }) => {
                debug!(match_id = %match_id, "match changed while expiring; skipped");
                None
            }
            Err(err) => {
                warn!(match_id = %match_id, error = %err, "failed to persist match expiry");
                None
            }
        }
    }

    async fn write(&self, revision: u64, record: MatchRecord) -> Result<MatchRecord, EngineError> {
        let match_id = record.id;
        match self.ctx.store.update_match(revision, record).await {
            Ok(updated) => Ok(updated.record),
            Err(StoreError::RevisionConflict { .. }) => Err(EngineError::Conflict(format!(
                "match {match_id} was changed by another request"
            ))),
            Err(err) => Err(err.into()),
        }
    }
}

fn transition(
    record: &mut MatchRecord,
    next: MatchStatus,
    now: DateTime<Utc>,
) -> Result<MatchStatus, EngineError> {
    let from = record.status;
    if !from.can_transition_to(next) {
        return Err(EngineError::InvalidTransition(format!(
            "match {} cannot move from {from} to {next}",
            record.id
        )));
    }
    record.status = next;
    record.updated_at = now;
    Ok(from)
}

fn validate_terms(terms: &MatchTerms) -> Result<(), EngineError> {
    if !terms.rate.is_finite() || terms.rate <= 0.0 {
        return Err(EngineError::Precondition(
            "rate must be a positive amount".to_string(),
        ));
    }
    Ok(())
}

fn payload(
    record: &MatchRecord,
    from: Option<MatchStatus>,
    actor_id: Option<Uuid>,
    details: serde_json::Value,
) -> TransitionPayload {
    TransitionPayload {
        entity: EntityKind::Match,
        entity_id: record.id,
        from: from.map(|s| s.as_str().to_string()),
        to: record.status.as_str().to_string(),
        actor_id,
        details,
    }
}
