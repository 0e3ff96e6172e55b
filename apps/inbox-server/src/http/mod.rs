pub mod admin;
pub mod auth_extract;
pub mod conversations;
pub mod messages;
pub mod webhooks;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::socket::websocket_handler;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/:channel_id", get(webhooks::verify).post(webhooks::receive))
        .route("/conversations", get(conversations::list))
        .route("/conversations/:id", get(conversations::get))
        .route("/conversations/:id/accept", post(conversations::accept))
        .route("/conversations/:id/release", post(conversations::release))
        .route("/conversations/:id/complete", post(conversations::complete))
        .route(
            "/conversations/:id/messages",
            get(messages::list).post(messages::send),
        )
        .route("/ws", get(websocket_handler))
        .route("/admin/failed-jobs", get(admin::list_failed_jobs))
        .route("/admin/failed-jobs/:id/requeue", post(admin::requeue_failed_job))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
