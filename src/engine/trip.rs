use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::signing::payload;
use crate::engine::EngineContext;
use crate::error::EngineError;
use crate::models::driver::{DriverAvailability, DriverKey, DriverRecord};
use crate::models::match_record::MatchStatus;
use crate::models::tla::{TlaStatus, TripLeaseAgreement, TripTracking};
use crate::notify::EventKind;
use crate::store::{StoreError, Versioned};

#[derive(Debug, Clone, Serialize)]
pub struct TripCompletion {
    pub agreement: TripLeaseAgreement,
    pub duration_minutes: i64,
    pub duration_label: String,
}

pub struct TripTracker {
    ctx: EngineContext,
}

impl TripTracker {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub async fn start(
        &self,
        tla_id: Uuid,
        actor_id: Uuid,
        actor_name: String,
    ) -> Result<TripLeaseAgreement, EngineError> {
        let started = self
            .ctx
            .run("trip_start", self.start_inner(tla_id, actor_id, actor_name))
            .await?;
        self.after_start(&started, actor_id).await;
        Ok(started)
    }

    pub async fn end(
        &self,
        tla_id: Uuid,
        actor_id: Uuid,
        actor_name: String,
    ) -> Result<TripCompletion, EngineError> {
        let completion = self
            .ctx
            .run("trip_end", self.end_inner(tla_id, actor_id, actor_name))
            .await?;
        self.after_end(&completion, actor_id).await;
        Ok(completion)
    }

    /// Releases the driver after a completed trip: back to available, or off
    /// duty. Kept apart from `end` so the choice can wait for a person.
    pub async fn set_post_trip_availability(
        &self,
        tla_id: Uuid,
        mark_available: bool,
    ) -> Result<DriverRecord, EngineError> {
        self.ctx
            .run("trip_availability", self.availability_inner(tla_id, mark_available))
            .await
    }

    async fn start_inner(
        &self,
        tla_id: Uuid,
        actor_id: Uuid,
        actor_name: String,
    ) -> Result<TripLeaseAgreement, EngineError> {
        let current = self.ctx.store.get_tla(tla_id).await?;
        let mut tla = current.record.clone();

        ensure_party(&tla, actor_id)?;
        if tla.status != TlaStatus::Signed {
            return Err(EngineError::InvalidTransition(format!(
                "agreement {tla_id} is {}; trips start from a signed agreement",
                tla.status
            )));
        }

        let now = self.ctx.now();
        tla.trip_tracking = Some(TripTracking {
            started_at: now,
            started_by: actor_id,
            started_by_name: actor_name,
            ended_at: None,
            ended_by: None,
            ended_by_name: None,
            duration_minutes: None,
        });
        tla.status = TlaStatus::InProgress;
        tla.updated_at = now;

        let updated = self.write(&current, tla).await?;

        self.ctx.metrics.record_transition("tla", TlaStatus::InProgress.as_str());
        info!(tla_id = %tla_id, actor_id = %actor_id, started_at = %now, "trip started");

        Ok(updated)
    }

    /// Best-effort follow-ups once the start is committed.
    async fn after_start(&self, tla: &TripLeaseAgreement, actor_id: Uuid) {
        let started_at = tla
            .trip_tracking
            .as_ref()
            .map_or(tla.updated_at, |tracking| tracking.started_at);

        self.ctx.notifier.emit_all(
            &[&tla.lessor.contact(), &tla.lessee.contact()],
            EventKind::TripStarted,
            payload(tla, Some(TlaStatus::Signed), Some(actor_id), json!({ "started_at": started_at })),
        );

        let key = driver_key(tla);
        if let Err(err) = self
            .ctx
            .store
            .set_driver_availability(key, DriverAvailability::OnTrip, started_at)
            .await
        {
            warn!(tla_id = %tla.id, driver_id = %key.driver_id, error = %err, "failed to mark driver on trip");
        }
        if let Err(err) = self.ctx.advance_match(tla.match_id, MatchStatus::InProgress).await {
            warn!(tla_id = %tla.id, match_id = %tla.match_id, error = %err, "trip started but match status was not updated");
        }
    }

    async fn end_inner(
        &self,
        tla_id: Uuid,
        actor_id: Uuid,
        actor_name: String,
    ) -> Result<TripCompletion, EngineError> {
        let current = self.ctx.store.get_tla(tla_id).await?;
        let mut tla = current.record.clone();

        ensure_party(&tla, actor_id)?;
        let Some(mut tracking) = tla.trip_tracking.clone() else {
            return Err(EngineError::Precondition(format!(
                "no trip start was recorded on agreement {tla_id}"
            )));
        };
        if tla.status != TlaStatus::InProgress {
            return Err(EngineError::InvalidTransition(format!(
                "agreement {tla_id} is {}; only trips in progress can end",
                tla.status
            )));
        }

        let now = self.ctx.now();
        let minutes = duration_minutes(tracking.started_at, now);
        tracking.ended_at = Some(now);
        tracking.ended_by = Some(actor_id);
        tracking.ended_by_name = Some(actor_name);
        tracking.duration_minutes = Some(minutes);
        tla.trip_tracking = Some(tracking);
        tla.status = TlaStatus::Completed;
        tla.updated_at = now;

        let updated = self.write(&current, tla).await?;
        let label = format_duration(minutes);

        self.ctx.metrics.record_transition("tla", TlaStatus::Completed.as_str());
        info!(tla_id = %tla_id, actor_id = %actor_id, duration_minutes = minutes, "trip completed");

        Ok(TripCompletion {
            agreement: updated,
            duration_minutes: minutes,
            duration_label: label,
        })
    }

    /// Best-effort follow-ups once completion is committed. A failure here is
    /// logged and never reported as a failed trip end.
    async fn after_end(&self, completion: &TripCompletion, actor_id: Uuid) {
        let tla = &completion.agreement;
        let ended_at = tla
            .trip_tracking
            .as_ref()
            .and_then(|tracking| tracking.ended_at)
            .unwrap_or(tla.updated_at);

        self.ctx.notifier.emit_all(
            &[&tla.lessor.contact(), &tla.lessee.contact()],
            EventKind::TripCompleted,
            payload(
                tla,
                Some(TlaStatus::InProgress),
                Some(actor_id),
                json!({
                    "duration_minutes": completion.duration_minutes,
                    "duration": completion.duration_label,
                }),
            ),
        );

        if let Err(err) = self.ctx.advance_match(tla.match_id, MatchStatus::Completed).await {
            warn!(tla_id = %tla.id, match_id = %tla.match_id, error = %err, "trip completed but match status was not updated");
        }
        if let Err(err) = self.ctx.store.mark_load_delivered(tla.trip.load_id, ended_at).await {
            warn!(tla_id = %tla.id, load_id = %tla.trip.load_id, error = %err, "trip completed but load was not marked delivered");
        }
    }

    async fn availability_inner(
        &self,
        tla_id: Uuid,
        mark_available: bool,
    ) -> Result<DriverRecord, EngineError> {
        let tla = self.ctx.store.get_tla(tla_id).await?.record;
        if tla.status != TlaStatus::Completed {
            return Err(EngineError::InvalidTransition(format!(
                "agreement {tla_id} is {}; drivers are released after the trip completes",
                tla.status
            )));
        }

        let availability = if mark_available {
            DriverAvailability::Available
        } else {
            DriverAvailability::OffDuty
        };
        let driver = self
            .ctx
            .store
            .set_driver_availability(driver_key(&tla), availability, self.ctx.now())
            .await?;

        info!(tla_id = %tla_id, driver_id = %driver.id, availability = ?availability, "driver released after trip");
        Ok(driver)
    }

    async fn write(
        &self,
        current: &Versioned<TripLeaseAgreement>,
        tla: TripLeaseAgreement,
    ) -> Result<TripLeaseAgreement, EngineError> {
        match self.ctx.store.update_tla(current.revision, tla).await {
            Ok(updated) => Ok(updated.record),
            Err(StoreError::RevisionConflict { .. }) => Err(EngineError::Conflict(format!(
                "agreement {} was changed by another request",
                current.record.id
            ))),
            Err(err) => Err(err.into()),
        }
    }
}

fn ensure_party(tla: &TripLeaseAgreement, actor_id: Uuid) -> Result<(), EngineError> {
    if tla.is_party(actor_id) {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "actor {actor_id} is not a party to agreement {}",
            tla.id
        )))
    }
}

fn driver_key(tla: &TripLeaseAgreement) -> DriverKey {
    DriverKey {
        fleet_id: tla.lessor.fleet_id,
        driver_id: tla.driver.id,
    }
}

/// Whole minutes between two server timestamps, rounded to nearest.
pub fn duration_minutes(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> i64 {
    let millis = (ended_at - started_at).num_milliseconds().max(0);
    (millis as f64 / 60_000.0).round() as i64
}

/// "2 hours 5 min", "3 hours", "45 minutes".
pub fn format_duration(total_minutes: i64) -> String {
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    let hour_unit = if hours == 1 { "hour" } else { "hours" };

    match (hours, minutes) {
        (0, m) => format!("{m} {}", if m == 1 { "minute" } else { "minutes" }),
        (h, 0) => format!("{h} {hour_unit}"),
        (h, m) => format!("{h} {hour_unit} {m} min"),
    }
}
