//! The fog's receiver loop.
//!
//! One task owns the [`DeviceStateStore`] and consumes inbound messages in
//! arrival order, so the feature vector has exactly one writer. Each message
//! is validated, applied, snapshotted and handed to the predictor; the
//! outcome is published to the shared [`StatusBoard`](crate::status::StatusBoard)
//! in a single write.

use crate::dispatch::{DispatchError, InferenceDispatcher};
use crate::error::AppError;
use crate::message::detector::PeopleDetector;
use crate::message::{Inbound, MessageError};
use crate::status::{CrowdStatus, SharedStatus};
use crate::store::{DeviceId, DeviceReading, DeviceStateStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum HandleError {
    #[error("message rejected: {0}")]
    Rejected(#[from] MessageError),
    #[error("prediction failed: {0}")]
    Prediction(#[from] DispatchError),
    #[error(transparent)]
    State(#[from] AppError),
    #[error("message worker failed: {0}")]
    Worker(String),
}

pub struct FogEngine {
    store: DeviceStateStore,
    dispatcher: InferenceDispatcher,
    detector: Arc<dyn PeopleDetector>,
    local_device: Option<DeviceId>,
    status: SharedStatus,
}

impl FogEngine {
    pub fn new(
        store: DeviceStateStore,
        dispatcher: InferenceDispatcher,
        detector: Arc<dyn PeopleDetector>,
        status: SharedStatus,
    ) -> Self {
        Self {
            store,
            dispatcher,
            detector,
            local_device: None,
            status,
        }
    }

    /// Identity used for raw scans that arrive without a `device_id`.
    pub fn with_local_device(mut self, local_device: Option<DeviceId>) -> Self {
        self.local_device = local_device;
        self
    }

    pub fn store(&self) -> &DeviceStateStore {
        &self.store
    }

    pub async fn handle(&mut self, message: Inbound) -> Result<CrowdStatus, HandleError> {
        let layout = *self.store.layout();
        let detector = Arc::clone(&self.detector);
        let local_device = self.local_device;
        // Raw images may go through a remote detector; keep that off the runtime threads.
        let reading = tokio::task::spawn_blocking(move || {
            message.into_reading(&layout, detector.as_ref(), local_device)
        })
        .await
        .map_err(|err| HandleError::Worker(err.to_string()))??;

        let device_id = reading.device_id;
        let features = self
            .store
            .apply(reading)
            .map_err(MessageError::from)?
            .to_vec();
        let devices: Vec<DeviceReading> = self.store.readings().values().cloned().collect();

        let outcome = self.dispatcher.dispatch(features.clone()).await;

        let mut board = self.status.write().map_err(|_| AppError::StateLock)?;
        match outcome {
            Ok(crowd) => {
                board.record_update(crowd.clone(), devices, features);
                info!(
                    device_id = device_id,
                    estimate = crowd.estimate,
                    uncertainty = ?crowd.uncertainty,
                    reported_devices = self.store.reported_devices(),
                    "Crowd status updated"
                );
                Ok(crowd)
            }
            Err(err) => {
                board.record_failure(err.to_string(), devices, features);
                Err(err.into())
            }
        }
    }

    /// Consume messages until every sender is dropped.
    pub async fn run(mut self, mut intake: mpsc::Receiver<Inbound>) {
        info!(
            total_devices = self.store.layout().total_devices(),
            top_n = self.store.layout().top_n(),
            "Receiver loop started"
        );
        while let Some(message) = intake.recv().await {
            let device_id = message.device_id();
            match self.handle(message).await {
                Ok(_) => {}
                Err(HandleError::Rejected(err)) => {
                    warn!(device_id = ?device_id, error = %err, "Rejected device message");
                }
                Err(HandleError::Prediction(err)) => {
                    warn!(
                        device_id = ?device_id,
                        error = %err,
                        "Prediction failed, keeping previous crowd status"
                    );
                }
                Err(err @ (HandleError::State(_) | HandleError::Worker(_))) => {
                    error!(device_id = ?device_id, error = %err, "Failed to process device message");
                }
            }
        }
        info!("Intake closed, receiver loop stopping");
    }
}
