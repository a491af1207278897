use axum::routing::{get, post};
use axum::Router;

use crate::api;
use crate::state::AppState;

pub fn build_http_app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(api::health))
        // GET is accepted alongside POST so a crontab line can stay a
        // bare curl invocation.
        .route("/api/v1/ping/{id}", get(api::ping_success).post(api::ping_success))
        .route("/api/v1/ping/{id}/start", get(api::ping_start).post(api::ping_start))
        .route("/api/v1/ping/{id}/fail", get(api::ping_fail).post(api::ping_fail))
        .route("/api/v1/units", get(api::list_units).post(api::create_unit))
        .route("/api/v1/units/{id}", get(api::get_unit).delete(api::delete_unit))
        .route("/api/v1/units/{id}/pause", post(api::pause_unit))
        .route("/api/v1/units/{id}/resume", post(api::resume_unit))
        .route("/api/v1/units/{id}/stats", get(api::unit_stats))
        .with_state(state)
}
