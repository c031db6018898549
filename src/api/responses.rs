use crate::store::{DeviceId, DeviceReading};
use serde::Serialize;

/// Status query response. `one_sigma_conf_interval` is absent, not null, when
/// the predictor gave no uncertainty.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CrowdStatusResponse {
    pub status: u64,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_sigma_conf_interval: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AcceptedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    pub queued: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Ko,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub reported_devices: usize,
    pub total_devices: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DevicesResponse {
    pub devices: Vec<DeviceReading>,
    pub features: Vec<f64>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ApiErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    InvalidMessage,
    InvalidStatusUpdate,
    IntakeUnavailable,
    InternalError,
}
