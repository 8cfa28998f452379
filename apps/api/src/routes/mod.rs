pub mod admin;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::challenges::handlers as challenges;
use crate::progression::handlers as progression;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Progression API
        .route(
            "/api/v1/users/:user_id/skills",
            get(progression::handle_get_skills),
        )
        .route(
            "/api/v1/users/:user_id/streaks",
            get(progression::handle_get_streaks),
        )
        .route(
            "/api/v1/users/:user_id/activities",
            post(progression::handle_log_activity),
        )
        .route(
            "/api/v1/users/:user_id/weight",
            post(progression::handle_log_weight),
        )
        // Challenge API
        .route(
            "/api/v1/users/:user_id/challenges/active",
            get(challenges::handle_get_active),
        )
        .route(
            "/api/v1/users/:user_id/challenges/join",
            post(challenges::handle_join),
        )
        .route(
            "/api/v1/users/:user_id/challenges/complete",
            post(challenges::handle_complete_day),
        )
        .route(
            "/api/v1/users/:user_id/challenges/quit",
            post(challenges::handle_quit),
        )
        .route(
            "/api/v1/users/:user_id/challenges/restore",
            post(challenges::handle_restore),
        )
        .route(
            "/api/v1/users/:user_id/challenges/history",
            get(challenges::handle_history),
        )
        .route(
            "/api/v1/users/:user_id/badges",
            get(challenges::handle_badges),
        )
        .route("/api/v1/challenges", get(challenges::handle_list_challenges))
        .route(
            "/api/v1/challenges/:id",
            get(challenges::handle_get_challenge),
        )
        // Admin API
        .route(
            "/api/v1/admin/challenges/:id/toggle",
            post(admin::handle_toggle_challenge),
        )
        .route("/api/v1/admin/sweep", post(admin::handle_sweep))
        .route(
            "/api/v1/admin/users/:user_id/complete-day",
            post(admin::handle_complete_day_for_user),
        )
        .route(
            "/api/v1/admin/users/:user_id/activities",
            post(admin::handle_log_activity_for_user),
        )
        .route(
            "/api/v1/admin/users/:user_id/weight",
            post(admin::handle_log_weight_for_user),
        )
        .route("/api/v1/admin/stats", get(admin::handle_stats))
        .route(
            "/api/v1/admin/skills/backfill",
            post(admin::handle_backfill_skills),
        )
        .with_state(state)
}
