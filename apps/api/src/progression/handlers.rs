//! Axum route handlers for skills, streaks and activity logging.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::activity::ActivityStreak;
use crate::models::skill::Skill;
use crate::progression::activity::{
    log_activity, log_weight, ActivityOutcome, ActivityRequest, WeightOutcome, WeightRequest,
};
use crate::progression::leveling::{required_xp, user_skills};
use crate::progression::streaks::user_streaks;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SkillView {
    #[serde(flatten)]
    pub skill: Skill,
    /// XP needed to leave the current level.
    pub xp_to_next_level: i32,
}

#[derive(Debug, Serialize)]
pub struct SkillsResponse {
    pub skills: Vec<SkillView>,
}

#[derive(Debug, Serialize)]
pub struct StreaksResponse {
    pub streaks: Vec<ActivityStreak>,
}

/// GET /api/v1/users/:user_id/skills
pub async fn handle_get_skills(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<SkillsResponse>, AppError> {
    let skills = user_skills(state.store.as_ref(), state.clock.as_ref(), user_id)
        .await?
        .into_iter()
        .map(|skill| SkillView {
            xp_to_next_level: required_xp(skill.level),
            skill,
        })
        .collect();
    Ok(Json(SkillsResponse { skills }))
}

/// GET /api/v1/users/:user_id/streaks
pub async fn handle_get_streaks(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<StreaksResponse>, AppError> {
    let streaks = user_streaks(state.store.as_ref(), user_id).await?;
    Ok(Json(StreaksResponse { streaks }))
}

/// POST /api/v1/users/:user_id/activities
pub async fn handle_log_activity(
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
        false,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /api/v1/users/:user_id/weight
pub async fn handle_log_weight(
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
        false,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
