//! Predictor invocation for each accepted device update.
//!
//! Every update triggers exactly one prediction, even when only part of the
//! fleet has reported; missing devices contribute zero columns. The call runs
//! on a blocking worker under a timeout so a stuck predictor cannot stall the
//! receiver loop indefinitely. A timed-out worker cannot be cancelled; until it
//! returns, further updates are refused as busy instead of piling up more
//! blocking threads behind it.

use crate::error::AppError;
use crate::layout::FeatureLayout;
use crate::predictor::{Prediction, Predictor, PredictorError};
use crate::status::CrowdStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Predictor(#[from] PredictorError),
    #[error("predictor did not answer within {0:?}")]
    TimedOut(Duration),
    #[error("predictor worker failed: {0}")]
    Worker(String),
    #[error("previous prediction still running")]
    Busy,
}

#[derive(Debug, Clone)]
pub struct InferenceDispatcher {
    predictor: Arc<dyn Predictor>,
    timeout: Duration,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the worker finishes, panics, or is never run.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl InferenceDispatcher {
    pub fn new(predictor: Arc<dyn Predictor>, timeout: Duration) -> Self {
        Self {
            predictor,
            timeout,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a predictor call, possibly one that already timed out, is
    /// still occupying a worker.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Refuse a predictor fitted on a different column layout. A predictor that
    /// cannot report its width is accepted with a warning.
    pub fn check_layout(&self, layout: &FeatureLayout) -> Result<(), AppError> {
        match self.predictor.input_width() {
            Some(width) if width != layout.width() => Err(AppError::LayoutMismatch {
                layout: layout.width(),
                predictor: width,
            }),
            Some(_) => Ok(()),
            None => {
                warn!(
                    layout_width = layout.width(),
                    "Predictor does not report its input width; layout cannot be verified"
                );
                Ok(())
            }
        }
    }

    /// Predict from a snapshot of the feature vector.
    pub async fn dispatch(&self, features: Vec<f64>) -> Result<CrowdStatus, DispatchError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(DispatchError::Busy);
        }
        let in_flight = InFlight(Arc::clone(&self.in_flight));
        let predictor = Arc::clone(&self.predictor);
        let task = tokio::task::spawn_blocking(move || {
            let _in_flight = in_flight;
            predictor.predict(&features)
        });

        let prediction = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => return Err(DispatchError::TimedOut(self.timeout)),
            Ok(Err(join_err)) => return Err(DispatchError::Worker(join_err.to_string())),
            Ok(Ok(result)) => result?,
        };

        Ok(interpret(prediction, SystemTime::now())?)
    }
}

/// Turn a raw prediction into a status. The estimate is a head count, so it is
/// rounded up and floored at zero; a bare estimate clears any previous bound.
pub fn interpret(prediction: Prediction, timestamp: SystemTime) -> Result<CrowdStatus, PredictorError> {
    let estimate = ceil_count(prediction.estimate)?;
    let uncertainty = match prediction.uncertainty {
        Some(value) if !value.is_finite() => return Err(PredictorError::NonFinite(value)),
        other => other,
    };
    Ok(CrowdStatus {
        estimate,
        uncertainty,
        timestamp,
    })
}

pub fn ceil_count(value: f64) -> Result<u64, PredictorError> {
    if !value.is_finite() {
        return Err(PredictorError::NonFinite(value));
    }
    // `as` saturates for values beyond u64::MAX.
    Ok(value.ceil().max(0.0) as u64)
}
