use crate::store::DeviceId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("device {device_id} outside fleet of {total_devices} devices")]
    UnknownDevice { device_id: DeviceId, total_devices: usize },
    #[error("expected {expected} wifi signals, got {actual}")]
    SignalCount { expected: usize, actual: usize },
    #[error("feature layout width {layout} does not match predictor width {predictor}")]
    LayoutMismatch { layout: usize, predictor: usize },
    #[error("invalid feature layout: {0}")]
    InvalidLayout(String),
    #[error("intake channel closed")]
    IntakeClosed,
    #[error("state lock poisoned")]
    StateLock,
}
