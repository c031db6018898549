use crate::store::DeviceReading;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

/// Current crowd estimate as exposed to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct CrowdStatus {
    pub estimate: u64,
    /// One-sigma bound; `None` means the predictor gave no bound, which is
    /// not the same as a bound of zero.
    pub uncertainty: Option<f64>,
    pub timestamp: SystemTime,
}

impl CrowdStatus {
    pub fn initial() -> Self {
        Self {
            estimate: 0,
            uncertainty: None,
            timestamp: UNIX_EPOCH,
        }
    }
}

impl Default for CrowdStatus {
    fn default() -> Self {
        Self::initial()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionOutcome {
    Pending,
    Ok,
    Failed { reason: String },
}

/// Everything the HTTP surface reads. Writers replace a whole update under a
/// single write guard so readers never observe a half-applied one.
#[derive(Debug)]
pub struct StatusBoard {
    crowd: CrowdStatus,
    crowd_tx: watch::Sender<CrowdStatus>,
    devices: Vec<DeviceReading>,
    features: Vec<f64>,
    total_devices: usize,
    last_outcome: PredictionOutcome,
}

pub type SharedStatus = Arc<RwLock<StatusBoard>>;

impl StatusBoard {
    pub fn new(total_devices: usize) -> Self {
        let (crowd_tx, _crowd_rx) = watch::channel(CrowdStatus::initial());
        Self {
            crowd: CrowdStatus::initial(),
            crowd_tx,
            devices: Vec::new(),
            features: Vec::new(),
            total_devices,
            last_outcome: PredictionOutcome::Pending,
        }
    }

    pub fn shared(total_devices: usize) -> SharedStatus {
        Arc::new(RwLock::new(Self::new(total_devices)))
    }

    pub fn crowd(&self) -> &CrowdStatus {
        &self.crowd
    }

    pub fn subscribe_crowd(&self) -> watch::Receiver<CrowdStatus> {
        self.crowd_tx.subscribe()
    }

    pub fn set_crowd(&mut self, crowd: CrowdStatus) {
        self.crowd = crowd.clone();
        self.crowd_tx.send_replace(crowd);
    }

    /// Status pushed in through the update call. Subscribers are not woken:
    /// forwarding it would send it straight back when the forward URL is this
    /// node's own update endpoint.
    pub fn accept_external(&mut self, crowd: CrowdStatus) {
        self.crowd = crowd.clone();
        self.crowd_tx.send_if_modified(|current| {
            *current = crowd;
            false
        });
    }

    pub fn devices(&self) -> &[DeviceReading] {
        &self.devices
    }

    pub fn features(&self) -> &[f64] {
        &self.features
    }

    pub fn total_devices(&self) -> usize {
        self.total_devices
    }

    pub fn last_outcome(&self) -> &PredictionOutcome {
        &self.last_outcome
    }

    /// A reading was applied and the predictor answered.
    pub fn record_update(
        &mut self,
        crowd: CrowdStatus,
        devices: Vec<DeviceReading>,
        features: Vec<f64>,
    ) {
        self.devices = devices;
        self.features = features;
        self.last_outcome = PredictionOutcome::Ok;
        self.set_crowd(crowd);
    }

    /// A reading was applied but the predictor failed; the previous estimate
    /// stays in effect.
    pub fn record_failure(&mut self, reason: String, devices: Vec<DeviceReading>, features: Vec<f64>) {
        self.devices = devices;
        self.features = features;
        self.last_outcome = PredictionOutcome::Failed { reason };
    }
}
