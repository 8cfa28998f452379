//! Axum route handlers for challenge enrollment and the challenge library.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::challenges::service::{
    self, ActiveChallengeView, DayCompletion, EarnedBadge, HistoryEntry,
};
use crate::errors::AppError;
use crate::models::challenge::{Challenge, UserChallenge};
use crate::state::AppState;

const MAX_HISTORY_PAGE: i64 = 100;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub challenge_id: Uuid,
}

/// Optional body of the complete and restore calls.
#[derive(Debug, Default, Deserialize)]
pub struct CompleteDayRequest {
    #[serde(default)]
    pub activity_data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ActiveChallengeResponse {
    pub active_challenge: Option<ActiveChallengeView>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub enrollments: Vec<HistoryEntry>,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct ChallengesResponse {
    pub challenges: Vec<Challenge>,
}

#[derive(Debug, Serialize)]
pub struct BadgesResponse {
    pub badges: Vec<EarnedBadge>,
}

fn activity_data(body: Option<Json<CompleteDayRequest>>) -> Option<serde_json::Value> {
    body.and_then(|Json(request)| request.activity_data)
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/users/:user_id/challenges/active
pub async fn handle_get_active(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ActiveChallengeResponse>, AppError> {
    let active_challenge =
        service::get_active_challenge(state.store.as_ref(), state.clock.as_ref(), user_id).await?;
    Ok(Json(ActiveChallengeResponse { active_challenge }))
}

/// POST /api/v1/users/:user_id/challenges/join
pub async fn handle_join(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<JoinRequest>,
) -> Result<(StatusCode, Json<UserChallenge>), AppError> {
    let enrollment = service::join_challenge(
        state.store.as_ref(),
        state.clock.as_ref(),
        user_id,
        request.challenge_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// POST /api/v1/users/:user_id/challenges/complete
///
/// Body is optional; `activity_data` is stored verbatim on the progress row.
pub async fn handle_complete_day(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    body: Option<Json<CompleteDayRequest>>,
) -> Result<Json<DayCompletion>, AppError> {
    let completion = service::mark_day_complete(
        state.store.as_ref(),
        state.clock.as_ref(),
        user_id,
        activity_data(body),
    )
    .await?;
    Ok(Json(completion))
}

/// POST /api/v1/users/:user_id/challenges/quit
pub async fn handle_quit(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserChallenge>, AppError> {
    let enrollment =
        service::quit_challenge(state.store.as_ref(), state.clock.as_ref(), user_id).await?;
    Ok(Json(enrollment))
}

/// POST /api/v1/users/:user_id/challenges/restore
pub async fn handle_restore(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    body: Option<Json<CompleteDayRequest>>,
) -> Result<Json<DayCompletion>, AppError> {
    let completion = service::restore_challenge(
        state.store.as_ref(),
        state.clock.as_ref(),
        &state.config.rules,
        user_id,
        activity_data(body),
    )
    .await?;
    Ok(Json(completion))
}

/// GET /api/v1/users/:user_id/challenges/history?offset=&limit=
pub async fn handle_history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(20);
    if offset < 0 || !(1..=MAX_HISTORY_PAGE).contains(&limit) {
        return Err(AppError::Validation(format!(
            "offset must be >= 0 and limit between 1 and {MAX_HISTORY_PAGE}"
        )));
    }
    let enrollments = service::challenge_history(
        state.store.as_ref(),
        state.clock.as_ref(),
        user_id,
        offset,
        limit,
    )
    .await?;
    Ok(Json(HistoryResponse {
        enrollments,
        offset,
        limit,
    }))
}

/// GET /api/v1/users/:user_id/badges
pub async fn handle_badges(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<BadgesResponse>, AppError> {
    let badges = service::user_badges(state.store.as_ref(), user_id).await?;
    Ok(Json(BadgesResponse { badges }))
}

/// GET /api/v1/challenges
pub async fn handle_list_challenges(
    State(state): State<AppState>,
) -> Result<Json<ChallengesResponse>, AppError> {
    let challenges = service::available_challenges(state.store.as_ref()).await?;
    Ok(Json(ChallengesResponse { challenges }))
}

/// GET /api/v1/challenges/:id
pub async fn handle_get_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
) -> Result<Json<Challenge>, AppError> {
    Ok(Json(
        service::challenge_by_id(state.store.as_ref(), challenge_id).await?,
    ))
}
