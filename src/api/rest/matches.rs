use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::negotiation::{MatchResponse, NewMatch};
use crate::error::EngineError;
use crate::models::match_record::MatchRecord;
use crate::models::tla::TripLeaseAgreement;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/matches", post(create_match))
        .route("/matches/sweep", post(sweep_expired))
        .route("/matches/:id", get(get_match))
        .route("/matches/:id/respond", post(respond))
        .route("/matches/:id/cancel", post(cancel))
        .route("/matches/:id/tla", post(generate_tla))
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub actor_id: Uuid,
    #[serde(flatten)]
    pub response: MatchResponse,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub actor_id: Uuid,
}

#[derive(Serialize)]
pub struct SweepResponse {
    pub expired: usize,
}

async fn create_match(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewMatch>,
) -> Result<Json<MatchRecord>, EngineError> {
    Ok(Json(state.negotiation.create(payload).await?))
}

async fn get_match(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchRecord>, EngineError> {
    Ok(Json(state.negotiation.get(id).await?))
}

async fn respond(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<MatchRecord>, EngineError> {
    let record = state
        .negotiation
        .respond(id, payload.actor_id, payload.response)
        .await?;
    Ok(Json(record))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<MatchRecord>, EngineError> {
    Ok(Json(state.negotiation.cancel(id, payload.actor_id).await?))
}

async fn sweep_expired(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepResponse>, EngineError> {
    let expired = state.negotiation.sweep_expired(state.clock.utc()).await?;
    Ok(Json(SweepResponse { expired }))
}

async fn generate_tla(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TripLeaseAgreement>, EngineError> {
    Ok(Json(state.signing.create_from_match(id).await?))
}
