use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/visit", post(handlers::record_visit))
        .route("/api/heartbeat", post(handlers::heartbeat))
        .route("/api/cv-download", post(handlers::record_cv_download))
        .route("/api/cv-downloads", get(handlers::get_cv_downloads))
        .route("/api/sync-cv-downloads", post(handlers::sync_cv_downloads))
        .route("/api/reconcile", post(handlers::reconcile_history))
        .route("/api/visit-history", get(handlers::get_visit_history))
        .route("/api/analytics", get(handlers::get_analytics))
        .route("/api/admin/reset-stats", post(handlers::reset_stats))
        .route(
            "/api/admin/set-visitor-count",
            post(handlers::set_visitor_count_manually),
        )
        .route("/api/admin/clear-connected", post(handlers::clear_connected))
        .route("/api/admin/clean-history", post(handlers::clean_history))
        .with_state(state)
}
