use crate::api::ApiState;
use crate::api::responses::{
    AcceptedResponse, ApiErrorCode, CrowdStatusResponse, DevicesResponse, ErrorResponse,
    HealthStatus, HealthSuccessResponse,
};
use crate::error::AppError;
use crate::message::{DeviceMessage, Inbound, RawScanMessage};
use crate::publisher::{StatusUpdateRequest, TimestampSource, format_timestamp};
use crate::status::{CrowdStatus, PredictionOutcome, SharedStatus, StatusBoard};
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::RwLockReadGuard;
use std::time::SystemTime;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, info, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

pub enum ApiResponse<T> {
    Success { status: StatusCode, body: T },
    Error { status: StatusCode, body: ErrorResponse },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_crowd_status(State(state): State<ApiState>) -> impl IntoResponse {
    build_crowd_status_response(&state.status)
}

pub async fn update_crowd_status(
    State(state): State<ApiState>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = payload.map(|Json(request)| request).map_err(|rej| rej.body_text());
    build_update_response(&state.status, request, SystemTime::now())
}

pub async fn post_device_message(
    State(state): State<ApiState>,
    payload: Result<Json<DeviceMessage>, JsonRejection>,
) -> impl IntoResponse {
    match payload {
        Ok(Json(message)) => build_enqueue_response(&state, Inbound::Reading(message), SystemTime::now()),
        Err(rejection) => invalid_message(rejection.body_text(), SystemTime::now()),
    }
}

pub async fn post_raw_scan(
    State(state): State<ApiState>,
    payload: Result<Json<RawScanMessage>, JsonRejection>,
) -> impl IntoResponse {
    match payload {
        Ok(Json(message)) => build_enqueue_response(&state, Inbound::RawScan(message), SystemTime::now()),
        Err(rejection) => invalid_message(rejection.body_text(), SystemTime::now()),
    }
}

pub async fn get_health(State(state): State<ApiState>) -> impl IntoResponse {
    build_health_response(&state.status, SystemTime::now())
}

pub async fn get_devices(State(state): State<ApiState>) -> impl IntoResponse {
    build_devices_response(&state.status, SystemTime::now())
}

/// Reads never fail on a poisoned lock: every write replaces the board
/// wholesale, so the last completed update is still consistent.
fn read_board(status: &SharedStatus) -> RwLockReadGuard<'_, StatusBoard> {
    status.read().unwrap_or_else(|poisoned| {
        error!("Status lock poisoned, serving last written status");
        poisoned.into_inner()
    })
}

fn build_crowd_status_response(status: &SharedStatus) -> ApiResponse<CrowdStatusResponse> {
    let crowd = read_board(status).crowd().clone();
    crowd_status_body(crowd, StatusCode::OK)
}

fn crowd_status_body(crowd: CrowdStatus, code: StatusCode) -> ApiResponse<CrowdStatusResponse> {
    match format_timestamp(crowd.timestamp) {
        Ok(timestamp) => ApiResponse::Success {
            status: code,
            body: CrowdStatusResponse {
                status: crowd.estimate,
                timestamp,
                one_sigma_conf_interval: crowd.uncertainty,
            },
        },
        Err(err) => internal_error(&format!("timestamp formatting failure: {err}")),
    }
}

fn build_update_response(
    status: &SharedStatus,
    request: Result<StatusUpdateRequest, String>,
    now: SystemTime,
) -> ApiResponse<CrowdStatusResponse> {
    let request = match request {
        Ok(request) => request,
        Err(message) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                ApiErrorCode::InvalidStatusUpdate,
                message,
                now,
            );
        }
    };

    let crowd = match request.into_status(now) {
        Ok((crowd, TimestampSource::Parsed)) => crowd,
        Ok((crowd, TimestampSource::Substituted { reason })) => {
            warn!(reason = %reason, "Status update timestamp replaced with current time");
            crowd
        }
        Err(message) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                ApiErrorCode::InvalidStatusUpdate,
                message,
                now,
            );
        }
    };

    match status.write() {
        Ok(mut board) => board.accept_external(crowd.clone()),
        Err(_) => return internal_error("status lock poisoned while applying update"),
    }
    info!(
        estimate = crowd.estimate,
        uncertainty = ?crowd.uncertainty,
        "Crowd status set by update call"
    );
    crowd_status_body(crowd, StatusCode::OK)
}

/// Validate at the boundary, then hand off to the receiver loop without
/// waiting for the prediction.
fn build_enqueue_response(
    state: &ApiState,
    message: Inbound,
    now: SystemTime,
) -> ApiResponse<AcceptedResponse> {
    if let Err(err) = message.validate(&state.layout, state.local_device) {
        warn!(device_id = ?message.device_id(), error = %err, "Rejected device message");
        return invalid_message(err.to_string(), now);
    }

    let device_id = match &message {
        Inbound::Reading(reading) => Some(reading.device_id),
        Inbound::RawScan(scan) => scan.device_id.or(state.local_device),
    };

    match state.intake.try_send(message) {
        Ok(()) => match format_timestamp(now) {
            Ok(timestamp) => ApiResponse::Success {
                status: StatusCode::ACCEPTED,
                body: AcceptedResponse {
                    device_id,
                    queued: true,
                    timestamp,
                },
            },
            Err(err) => internal_error(&format!("timestamp formatting failure: {err}")),
        },
        Err(TrySendError::Full(_)) => {
            warn!(device_id = ?device_id, "Intake queue full, dropping device message");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorCode::IntakeUnavailable,
                "intake queue full".to_string(),
                now,
            )
        }
        Err(TrySendError::Closed(_)) => {
            error!(device_id = ?device_id, "Receiver loop is not running");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorCode::IntakeUnavailable,
                AppError::IntakeClosed.to_string(),
                now,
            )
        }
    }
}

fn build_health_response(status: &SharedStatus, now: SystemTime) -> ApiResponse<HealthSuccessResponse> {
    let board = read_board(status);
    let reported_devices = board.devices().len();
    let total_devices = board.total_devices();
    let last_error = match board.last_outcome() {
        PredictionOutcome::Failed { reason } => Some(reason.clone()),
        PredictionOutcome::Pending | PredictionOutcome::Ok => None,
    };
    drop(board);

    let health = derive_health_status(reported_devices, total_devices, last_error.is_some());
    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(err) => return internal_error(&format!("timestamp formatting failure: {err}")),
    };

    let code = match health {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    ApiResponse::Success {
        status: code,
        body: HealthSuccessResponse {
            status: health,
            reported_devices,
            total_devices,
            last_error,
            timestamp,
        },
    }
}

fn derive_health_status(reported: usize, total: usize, last_failed: bool) -> HealthStatus {
    if reported == 0 {
        return HealthStatus::Ko;
    }
    if reported < total || last_failed {
        return HealthStatus::Degraded;
    }
    HealthStatus::Ok
}

fn build_devices_response(status: &SharedStatus, now: SystemTime) -> ApiResponse<DevicesResponse> {
    let board = read_board(status);
    let devices = board.devices().to_vec();
    let features = board.features().to_vec();
    drop(board);

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::OK,
            body: DevicesResponse {
                devices,
                features,
                timestamp,
            },
        },
        Err(err) => internal_error(&format!("timestamp formatting failure: {err}")),
    }
}

fn invalid_message<T>(message: String, now: SystemTime) -> ApiResponse<T> {
    error_response(StatusCode::BAD_REQUEST, ApiErrorCode::InvalidMessage, message, now)
}

fn error_response<T>(
    status: StatusCode,
    error_code: ApiErrorCode,
    error_message: String,
    now: SystemTime,
) -> ApiResponse<T> {
    let timestamp = format_timestamp(now).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format error timestamp");
        FALLBACK_TIMESTAMP.to_string()
    });
    ApiResponse::Error {
        status,
        body: ErrorResponse {
            error_code,
            error_message,
            timestamp,
        },
    }
}

fn internal_error<T>(message: &str) -> ApiResponse<T> {
    error!(message = message, "Internal error while handling API request");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ApiErrorCode::InternalError,
        INTERNAL_ERROR_MESSAGE.to_string(),
        SystemTime::now(),
    )
}
