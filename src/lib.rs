pub mod api;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod http;
pub mod layout;
pub mod message;
pub mod predictor;
pub mod publisher;
pub mod status;
pub mod store;
pub mod telemetry;
