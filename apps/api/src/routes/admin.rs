//! Admin-only operations. Authentication sits in front of the service, not here.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::challenges::service::{self, DayCompletion};
use crate::errors::AppError;
use crate::models::challenge::{Challenge, SystemStats};
use crate::progression::activity::{
    log_activity, log_weight, ActivityOutcome, ActivityRequest, WeightOutcome, WeightRequest,
};
use crate::progression::leveling::{backfill_skills, BackfillReport};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub failed: usize,
}

/// POST /api/v1/admin/challenges/:id/toggle
pub async fn handle_toggle_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
) -> Result<Json<Challenge>, AppError> {
    Ok(Json(
        service::toggle_challenge(state.store.as_ref(), challenge_id).await?,
    ))
}

/// POST /api/v1/admin/sweep
pub async fn handle_sweep(State(state): State<AppState>) -> Result<Json<SweepResponse>, AppError> {
    let failed = service::sweep_all(state.store.as_ref(), state.clock.as_ref()).await?;
    Ok(Json(SweepResponse { failed }))
}

/// POST /api/v1/admin/users/:user_id/complete-day
pub async fn handle_complete_day_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<DayCompletion>, AppError> {
    let completion = service::mark_day_complete(
        state.store.as_ref(),
        state.clock.as_ref(),
        user_id,
        Some(serde_json::json!({ "logged_by_admin": true })),
    )
    .await?;
    info!("Admin completed today's challenge day for user {user_id}");
    Ok(Json(completion))
}

/// POST /api/v1/admin/users/:user_id/activities
///
/// Same body as the user route, but any past date is accepted and the row is
/// flagged `logged_by_admin`.
pub async fn handle_log_activity_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<ActivityRequest>,
) -> Result<(StatusCode, Json<ActivityOutcome>), AppError> {
    let outcome = log_activity(
        state.store.as_ref(),
        state.clock.as_ref(),
        &state.config.rules,
        user_id,
        request,
        true,
    )
    .await?;
    info!(
        "Admin logged {} for user {user_id} on {}",
        outcome.activity.activity_type, outcome.activity.date
    );
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /api/v1/admin/users/:user_id/weight
pub async fn handle_log_weight_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<WeightRequest>,
) -> Result<(StatusCode, Json<WeightOutcome>), AppError> {
    let outcome = log_weight(
        state.store.as_ref(),
        state.clock.as_ref(),
        &state.config.rules,
        user_id,
        request,
        true,
    )
    .await?;
    info!("Admin logged weight for user {user_id} on {}", outcome.entry.date);
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/v1/admin/stats
pub async fn handle_stats(State(state): State<AppState>) -> Result<Json<SystemStats>, AppError> {
    Ok(Json(service::system_stats(state.store.as_ref()).await?))
}

/// POST /api/v1/admin/skills/backfill
pub async fn handle_backfill_skills(
    State(state): State<AppState>,
) -> Result<Json<BackfillReport>, AppError> {
    Ok(Json(
        backfill_skills(state.store.as_ref(), state.clock.as_ref()).await?,
    ))
}
