use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::signing::payload;
use crate::engine::EngineContext;
use crate::error::EngineError;
use crate::models::driver::DriverRecord;
use crate::models::rating::RatingEntry;
use crate::models::tla::{TlaStatus, TripLeaseAgreement};
use crate::notify::EventKind;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct RatingOutcome {
    pub driver_id: Uuid,
    pub rating: f64,
    pub rating_count: u32,
    pub agreement: TripLeaseAgreement,
}

pub struct RatingAggregator {
    ctx: EngineContext,
}

impl RatingAggregator {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Rate the leased driver once per completed agreement. The driver's
    /// running average and the agreement's `rated` flag change together in
    /// one store transaction.
    pub async fn rate_driver(
        &self,
        tla_id: Uuid,
        rater_id: Uuid,
        score: u8,
        comment: Option<String>,
    ) -> Result<RatingOutcome, EngineError> {
        let outcome = self
            .ctx
            .run("rate_driver", self.rate_inner(tla_id, rater_id, score, comment))
            .await?;
        self.after_rating(&outcome, rater_id, score).await;
        Ok(outcome)
    }

    async fn rate_inner(
        &self,
        tla_id: Uuid,
        rater_id: Uuid,
        score: u8,
        comment: Option<String>,
    ) -> Result<RatingOutcome, EngineError> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(EngineError::Precondition(format!(
                "rating must be between {MIN_SCORE} and {MAX_SCORE}"
            )));
        }
        let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        let now = self.ctx.now();

        let apply = |tla: &mut TripLeaseAgreement, driver: &mut DriverRecord| {
            if rater_id != tla.lessee.fleet_id {
                return Err(EngineError::Forbidden(format!(
                    "only the lessee on agreement {tla_id} can rate its driver"
                )));
            }
            if tla.rated {
                return Err(EngineError::AlreadyRated(format!(
                    "agreement {tla_id} already has a rating"
                )));
            }
            if tla.status != TlaStatus::Completed {
                return Err(EngineError::InvalidTransition(format!(
                    "agreement {tla_id} is {}; drivers are rated after the trip completes",
                    tla.status
                )));
            }

            let (rating, count) = next_average(driver.rating, driver.rating_count, score);
            driver.rating = rating;
            driver.rating_count = count;
            driver.last_rated_at = Some(now);
            driver.updated_at = now;

            tla.rated = true;
            tla.rating_given = Some(score);
            tla.rating_comment = comment.clone();
            tla.rated_at = Some(now);
            tla.updated_at = now;
            Ok(())
        };

        let commit = self.ctx.store.rating_transaction(tla_id, &apply).await?;
        let tla = commit.tla.record;
        let driver = commit.driver;

        self.ctx.metrics.record_transition("driver_rating", "rated");
        info!(
            tla_id = %tla_id,
            driver_id = %driver.id,
            score,
            rating = driver.rating,
            rating_count = driver.rating_count,
            "driver rated"
        );

        Ok(RatingOutcome {
            driver_id: driver.id,
            rating: driver.rating,
            rating_count: driver.rating_count,
            agreement: tla,
        })
    }

    /// History append and notification, after the aggregate has committed.
    async fn after_rating(&self, outcome: &RatingOutcome, rater_id: Uuid, score: u8) {
        let tla = &outcome.agreement;
        let entry = RatingEntry {
            id: Uuid::new_v4(),
            tla_id: tla.id,
            driver_id: outcome.driver_id,
            driver_fleet_id: tla.lessor.fleet_id,
            rater_id,
            score,
            comment: tla.rating_comment.clone(),
            created_at: tla.rated_at.unwrap_or(tla.updated_at),
        };
        if let Err(err) = self.ctx.store.append_rating(entry).await {
            warn!(tla_id = %tla.id, error = %err, "rating committed but history append failed");
        }

        self.ctx.notifier.emit_all(
            &[&tla.lessor.contact()],
            EventKind::DriverRated,
            payload(tla, Some(tla.status), Some(rater_id), json!({
                "score": score,
                "driver_rating": outcome.rating,
            })),
        );
    }
}

/// Folds one more score into a running mean, rounded to one decimal.
pub fn next_average(rating: f64, count: u32, score: u8) -> (f64, u32) {
    let new_count = count + 1;
    let total = rating * f64::from(count) + f64::from(score);
    (round1(total / f64::from(new_count)), new_count)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::next_average;

    #[test]
    fn folds_a_new_score_into_the_mean() {
        assert_eq!(next_average(4.0, 2, 5), (4.3, 3));
    }

    #[test]
    fn first_rating_is_the_score() {
        assert_eq!(next_average(0.0, 0, 3), (3.0, 1));
    }

    #[test]
    fn repeated_top_scores_stay_at_five() {
        let (mut rating, mut count) = (0.0, 0);
        for _ in 0..10 {
            (rating, count) = next_average(rating, count, 5);
        }
        assert_eq!((rating, count), (5.0, 10));
    }
}
