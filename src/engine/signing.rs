use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::tla_generator::{generate_tla, GenerationInput};
use crate::engine::{EngineContext, MAX_CAS_ATTEMPTS};
use crate::error::EngineError;
use crate::models::driver::DriverKey;
use crate::models::match_record::{MatchRecord, MatchStatus};
use crate::models::tla::{
    InsuranceElection, InsuranceOption, Signature, SignatureRole, TlaStatus, TripLeaseAgreement,
    TripLocations, VoidRecord,
};
use crate::notify::{EntityKind, EventKind, TransitionPayload};
use crate::store::{StoreError, Versioned};

/// Where a signature came from, as seen by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditContext {
    pub ip_address: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignRequest {
    pub role: SignatureRole,
    pub actor_id: Uuid,
    pub signature_name: String,
    pub audit: AuditContext,
    #[serde(default)]
    pub insurance_option: Option<InsuranceOption>,
    #[serde(default)]
    pub locations: Option<TripLocations>,
}

pub struct TlaSigningEngine {
    ctx: EngineContext,
}

impl TlaSigningEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Generates the agreement for an accepted match and links it. This is
    /// the explicit follow-up to accepting a match; calling it twice for the
    /// same match fails with `Conflict`.
    pub async fn create_from_match(&self, match_id: Uuid) -> Result<TripLeaseAgreement, EngineError> {
        let (current, draft) = self
            .ctx
            .run("tla_generate", self.draft_from_match(match_id))
            .await?;

        // Insert, link and discard-on-failure run to completion together so
        // no deadline can leave an unlinked agreement behind.
        let tla = match self.link_agreement(current, draft).await {
            Ok(tla) => tla,
            Err(err) => {
                self.ctx.record_failure("tla_generate", &err);
                return Err(err);
            }
        };

        self.ctx.notifier.emit_all(
            &[&tla.lessor.contact(), &tla.lessee.contact()],
            EventKind::TlaGenerated,
            payload(&tla, None, None, json!({ "awaiting": SignatureRole::Lessor })),
        );
        Ok(tla)
    }

    pub async fn get(&self, tla_id: Uuid) -> Result<TripLeaseAgreement, EngineError> {
        self.ctx
            .run("tla_get", async move {
                self.ctx
                    .store
                    .get_tla(tla_id)
                    .await
                    .map(|current| current.record)
                    .map_err(EngineError::from)
            })
            .await
    }

    pub async fn sign(
        &self,
        tla_id: Uuid,
        request: SignRequest,
    ) -> Result<TripLeaseAgreement, EngineError> {
        let actor_id = request.actor_id;
        let (signed, from, role) = self
            .ctx
            .run("tla_sign", self.sign_inner(tla_id, request))
            .await?;
        self.after_signature(&signed, from, role, actor_id).await;
        Ok(signed)
    }

    /// Administrative void. Signatures stay on the record but lose legal
    /// force; nothing is deleted.
    pub async fn void(
        &self,
        tla_id: Uuid,
        actor_id: Uuid,
        reason: String,
    ) -> Result<TripLeaseAgreement, EngineError> {
        let (voided, from, reason) = self
            .ctx
            .run("tla_void", self.void_inner(tla_id, actor_id, reason))
            .await?;
        self.after_void(&voided, from, actor_id, reason).await;
        Ok(voided)
    }

    async fn draft_from_match(
        &self,
        match_id: Uuid,
    ) -> Result<(Versioned<MatchRecord>, TripLeaseAgreement), EngineError> {
        let store = &self.ctx.store;
        let current = store.get_match(match_id).await?;

        if let Some(existing) = current.record.tla_id {
            return Err(EngineError::Conflict(format!(
                "agreement {existing} was already generated for match {match_id}"
            )));
        }

        let lessor = store.get_fleet(current.record.driver_owner_id).await?;
        let lessee = store.get_fleet(current.record.load_owner_id).await?;
        let driver = store
            .get_driver(DriverKey {
                fleet_id: current.record.driver_owner_id,
                driver_id: current.record.driver_id,
            })
            .await?;

        let draft = generate_tla(GenerationInput {
            agreement_id: Uuid::new_v4(),
            match_record: &current.record,
            lessor: &lessor,
            lessee: &lessee,
            driver: &driver,
            now: self.ctx.now(),
        })?;
        Ok((current, draft))
    }

    async fn link_agreement(
        &self,
        current: Versioned<MatchRecord>,
        draft: TripLeaseAgreement,
    ) -> Result<TripLeaseAgreement, EngineError> {
        let store = &self.ctx.store;
        let match_id = current.record.id;
        let tla = store.insert_tla(draft).await?.record;

        let mut linked = current.record;
        linked.tla_id = Some(tla.id);
        linked.status = MatchStatus::TlaPending;
        linked.updated_at = tla.created_at;

        if let Err(err) = store.update_match(current.revision, linked).await {
            if let Err(cleanup) = store.delete_tla(tla.id).await {
                warn!(tla_id = %tla.id, error = %cleanup, "failed to discard unlinked agreement");
            }
            return Err(match err {
                StoreError::RevisionConflict { .. } => EngineError::Conflict(format!(
                    "match {match_id} changed while its agreement was being generated"
                )),
                other => other.into(),
            });
        }

        self.ctx.metrics.record_transition("match", MatchStatus::TlaPending.as_str());
        self.ctx.metrics.record_transition("tla", tla.status.as_str());
        info!(match_id = %match_id, tla_id = %tla.id, "trip lease agreement generated");

        Ok(tla)
    }

    async fn sign_inner(
        &self,
        tla_id: Uuid,
        request: SignRequest,
    ) -> Result<(TripLeaseAgreement, TlaStatus, SignatureRole), EngineError> {
        let role = request.role;
        let signature_name = request.signature_name.trim().to_string();
        if signature_name.is_empty() {
            return Err(EngineError::Precondition(
                "a typed signature name is required".to_string(),
            ));
        }
        if role == SignatureRole::Lessor
            && (request.insurance_option.is_some() || request.locations.is_some())
        {
            return Err(EngineError::Precondition(
                "insurance and locations are elected by the lessee".to_string(),
            ));
        }

        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.ctx.store.get_tla(tla_id).await?;
            let mut tla = current.record;

            if request.actor_id != tla.party(role).fleet_id {
                return Err(EngineError::Forbidden(format!(
                    "actor {} cannot sign agreement {tla_id} as {}",
                    request.actor_id,
                    role.as_str()
                )));
            }
            if tla.signature(role).is_some() {
                return Err(EngineError::AlreadySigned(format!(
                    "the {} signature on agreement {tla_id} is already recorded",
                    role.as_str()
                )));
            }
            if !tla.status.awaiting_signatures() {
                return Err(EngineError::InvalidTransition(format!(
                    "agreement {tla_id} is {} and no longer takes signatures",
                    tla.status
                )));
            }

            let now = self.ctx.now();
            let signature = Signature {
                signed_by: request.actor_id,
                signed_by_name: signature_name.clone(),
                signed_by_role: role,
                signed_at: now,
                ip_address: request.audit.ip_address.clone(),
                user_agent: request.audit.user_agent.clone(),
                consent_to_esign: true,
            };
            match role {
                SignatureRole::Lessor => tla.lessor_signature = Some(signature),
                SignatureRole::Lessee => {
                    tla.lessee_signature = Some(signature);
                    if let Some(option) = request.insurance_option {
                        tla.insurance = InsuranceElection {
                            option: Some(option),
                            confirmed_at: Some(now),
                            confirmed_by: Some(request.actor_id),
                        };
                    }
                    if let Some(locations) = &request.locations {
                        tla.locations = Some(locations.clone());
                    }
                }
            }

            let from = tla.status;
            let next = if tla.fully_signed() {
                TlaStatus::Signed
            } else {
                TlaStatus::pending_for(role.other())
            };
            tla.status = next;
            tla.updated_at = now;

            let updated = match self.ctx.store.update_tla(current.revision, tla).await {
                Ok(updated) => updated.record,
                // Re-read: a same-role race surfaces as AlreadySigned above.
                Err(StoreError::RevisionConflict { .. }) => continue,
                Err(err) => return Err(err.into()),
            };

            self.ctx.metrics.record_transition("tla", next.as_str());
            info!(
                tla_id = %tla_id,
                role = role.as_str(),
                actor_id = %request.actor_id,
                from = %from,
                to = %next,
                "agreement signed"
            );

            return Ok((updated, from, role));
        }

        Err(EngineError::Conflict(format!(
            "agreement {tla_id} kept changing while it was being signed"
        )))
    }

    async fn after_signature(
        &self,
        tla: &TripLeaseAgreement,
        from: TlaStatus,
        role: SignatureRole,
        actor_id: Uuid,
    ) {
        if tla.status == TlaStatus::Signed {
            self.ctx.notifier.emit_all(
                &[&tla.lessor.contact(), &tla.lessee.contact()],
                EventKind::TlaSigned,
                payload(tla, Some(from), Some(actor_id), json!({ "signed_by_role": role })),
            );

            if let Err(err) = self.ctx.advance_match(tla.match_id, MatchStatus::TlaSigned).await {
                warn!(
                    tla_id = %tla.id,
                    match_id = %tla.match_id,
                    error = %err,
                    "agreement signed but match status was not updated"
                );
            }
        } else {
            let waiting_on = role.other();
            self.ctx.notifier.emit_all(
                &[&tla.party(waiting_on).contact()],
                EventKind::TlaSignatureRequested,
                payload(tla, Some(from), Some(actor_id), json!({ "awaiting": waiting_on })),
            );
        }
    }

    async fn void_inner(
        &self,
        tla_id: Uuid,
        actor_id: Uuid,
        reason: String,
    ) -> Result<(TripLeaseAgreement, TlaStatus, String), EngineError> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(EngineError::Precondition(
                "a reason is required to void an agreement".to_string(),
            ));
        }

        let current = self.ctx.store.get_tla(tla_id).await?;
        let mut tla = current.record;
        let from = tla.status;
        if !from.can_transition_to(TlaStatus::Voided) {
            return Err(EngineError::InvalidTransition(format!(
                "agreement {tla_id} is {from} and cannot be voided"
            )));
        }

        let now = self.ctx.now();
        tla.voided = Some(VoidRecord {
            voided_by: actor_id,
            voided_at: now,
            reason: reason.clone(),
            previous_status: from,
        });
        tla.status = TlaStatus::Voided;
        tla.updated_at = now;

        let updated = match self.ctx.store.update_tla(current.revision, tla).await {
            Ok(updated) => updated.record,
            Err(StoreError::RevisionConflict { .. }) => {
                return Err(EngineError::Conflict(format!(
                    "agreement {tla_id} was changed by another request"
                )));
            }
            Err(err) => return Err(err.into()),
        };

        self.ctx.metrics.record_transition("tla", TlaStatus::Voided.as_str());
        warn!(tla_id = %tla_id, actor_id = %actor_id, from = %from, reason = %reason, "agreement voided");

        Ok((updated, from, reason))
    }

    /// Releases the originating match so the driver/load pair can be
    /// proposed again.
    async fn after_void(
        &self,
        tla: &TripLeaseAgreement,
        from: TlaStatus,
        actor_id: Uuid,
        reason: String,
    ) {
        self.ctx.notifier.emit_all(
            &[&tla.lessor.contact(), &tla.lessee.contact()],
            EventKind::TlaVoided,
            payload(tla, Some(from), Some(actor_id), json!({ "reason": reason })),
        );

        if let Err(err) = self.ctx.advance_match(tla.match_id, MatchStatus::Cancelled).await {
            warn!(
                tla_id = %tla.id,
                match_id = %tla.match_id,
                error = %err,
                "agreement voided but match was not released"
            );
        }
    }
}

pub(crate) fn payload(
    tla: &TripLeaseAgreement,
    from: Option<TlaStatus>,
    actor_id: Option<Uuid>,
    details: serde_json::Value,
) -> TransitionPayload {
    TransitionPayload {
        entity: EntityKind::Tla,
        entity_id: tla.id,
        from: from.map(|s| s.as_str().to_string()),
        to: tla.status.as_str().to_string(),
        actor_id,
        details,
    }
}
