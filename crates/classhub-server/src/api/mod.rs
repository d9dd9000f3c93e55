mod communities;
mod live_classes;
mod notifications;

use crate::state::AppState;
use crate::ws;
use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Community routes
        .route(
            "/api/communities",
            get(communities::list_communities).post(communities::create_community),
        )
        .route("/api/community/{slug}", get(communities::get_community))
        .route("/api/community/{slug}/join", post(communities::join_community))
        .route("/api/community/{slug}/exit", post(communities::exit_community))
        .route(
            "/api/community/{slug}/join-requests",
            get(communities::list_join_requests),
        )
        .route(
            "/api/community/{slug}/join-requests/{id}/approve",
            post(communities::resolve_join_request),
        )
        .route(
            "/api/community/{slug}/remove-participant",
            post(communities::remove_participant),
        )
        .route(
            "/api/community/{slug}/participants",
            get(communities::list_participants),
        )
        // Notification routes
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/{id}", patch(notifications::mark_read))
        // Live class routes
        .route(
            "/api/live-classes",
            get(live_classes::list_live_classes).post(live_classes::create_live_class),
        )
        .route(
            "/api/live-classes/{id}",
            get(live_classes::get_live_class).delete(live_classes::close_live_class),
        )
        // WebSocket endpoints
        .route("/ws/community/{slug}", get(ws::handler::community_ws))
        .route("/ws/notifications/{user_id}", get(ws::handler::notifications_ws))
        .route("/ws/live-class/{class_id}", get(ws::handler::live_class_ws))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
