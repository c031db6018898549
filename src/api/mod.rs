use crate::layout::FeatureLayout;
use crate::message::Inbound;
use crate::status::SharedStatus;
use crate::store::DeviceId;
use axum::Router;
use axum::routing::{get, post};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

pub mod handlers;
pub mod responses;

/// Handles shared by every handler. Handlers never touch the device store:
/// they read the status board and enqueue messages for the receiver loop.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub status: SharedStatus,
    pub intake: mpsc::Sender<Inbound>,
    pub layout: FeatureLayout,
    pub local_device: Option<DeviceId>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/get_crowd_status", get(handlers::get_crowd_status))
        .route("/api/update_crowd_status", post(handlers::update_crowd_status))
        .route("/api/device_message", post(handlers::post_device_message))
        .route("/api/raw_scan", post(handlers::post_raw_scan))
        .route("/api/health", get(handlers::get_health))
        .route("/api/devices", get(handlers::get_devices))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
