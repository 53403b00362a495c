use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::rating::RatingOutcome;
use crate::engine::signing::{AuditContext, SignRequest};
use crate::engine::trip::TripCompletion;
use crate::error::EngineError;
use crate::models::driver::DriverRecord;
use crate::models::tla::{InsuranceOption, SignatureRole, TripLeaseAgreement, TripLocations};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tlas/:id", get(get_tla))
        .route("/tlas/:id/sign", post(sign))
        .route("/tlas/:id/void", post(void))
        .route("/tlas/:id/trip/start", post(start_trip))
        .route("/tlas/:id/trip/end", post(end_trip))
        .route("/tlas/:id/trip/availability", post(post_trip_availability))
        .route("/tlas/:id/rating", post(rate_driver))
}

#[derive(Deserialize)]
pub struct SignBody {
    pub role: SignatureRole,
    pub actor_id: Uuid,
    pub signature_name: String,
    #[serde(default)]
    pub insurance_option: Option<InsuranceOption>,
    #[serde(default)]
    pub locations: Option<TripLocations>,
}

#[derive(Deserialize)]
pub struct VoidBody {
    pub actor_id: Uuid,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct TripActorBody {
    pub actor_id: Uuid,
    pub actor_name: String,
}

#[derive(Deserialize)]
pub struct AvailabilityBody {
    pub mark_available: bool,
}

#[derive(Deserialize)]
pub struct RatingBody {
    pub rater_id: Uuid,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

fn audit_context(headers: &HeaderMap) -> AuditContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let ip_address = header("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(|ip| ip.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = header("user-agent")
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string());

    AuditContext {
        ip_address,
        user_agent,
    }
}

async fn get_tla(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TripLeaseAgreement>, EngineError> {
    Ok(Json(state.signing.get(id).await?))
}

async fn sign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<SignBody>,
) -> Result<Json<TripLeaseAgreement>, EngineError> {
    let request = SignRequest {
        role: payload.role,
        actor_id: payload.actor_id,
        signature_name: payload.signature_name,
        audit: audit_context(&headers),
        insurance_option: payload.insurance_option,
        locations: payload.locations,
    };
    Ok(Json(state.signing.sign(id, request).await?))
}

async fn void(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VoidBody>,
) -> Result<Json<TripLeaseAgreement>, EngineError> {
    Ok(Json(
        state.signing.void(id, payload.actor_id, payload.reason).await?,
    ))
}

async fn start_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TripActorBody>,
) -> Result<Json<TripLeaseAgreement>, EngineError> {
    Ok(Json(
        state
            .trips
            .start(id, payload.actor_id, payload.actor_name)
            .await?,
    ))
}

async fn end_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TripActorBody>,
) -> Result<Json<TripCompletion>, EngineError> {
    Ok(Json(
        state.trips.end(id, payload.actor_id, payload.actor_name).await?,
    ))
}

async fn post_trip_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AvailabilityBody>,
) -> Result<Json<DriverRecord>, EngineError> {
    Ok(Json(
        state
            .trips
            .set_post_trip_availability(id, payload.mark_available)
            .await?,
    ))
}

async fn rate_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RatingBody>,
) -> Result<Json<RatingOutcome>, EngineError> {
    Ok(Json(
        state
            .ratings
            .rate_driver(id, payload.rater_id, payload.rating, payload.comment)
            .await?,
    ))
}
