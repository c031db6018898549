use crowd_fog::dispatch::InferenceDispatcher;
use crowd_fog::engine::FogEngine;
use crowd_fog::layout::FeatureLayout;
use crowd_fog::message::detector::UnavailableDetector;
use crowd_fog::message::{DeviceMessage, ImagePayload, Inbound, RawScanMessage};
use crowd_fog::predictor::{self, Prediction, Predictor, PredictorError};
use crowd_fog::status::{PredictionOutcome, SharedStatus, StatusBoard};
use crowd_fog::store::DeviceStateStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct StubPredictor {
    seen: Mutex<Vec<Vec<f64>>>,
}

impl Predictor for StubPredictor {
    fn predict(&self, features: &[f64]) -> Result<Prediction, PredictorError> {
        self.seen
            .lock()
            .expect("seen lock")
            .push(features.to_vec());
        Ok(Prediction::with_uncertainty(12.2, 1.5))
    }

    fn input_width(&self) -> Option<usize> {
        Some(28)
    }
}

fn fog(predictor: Arc<dyn Predictor>) -> (FogEngine, SharedStatus) {
    let layout = FeatureLayout::new(5, 4).expect("valid layout");
    let status = StatusBoard::shared(layout.total_devices());
    let dispatcher = InferenceDispatcher::new(predictor, Duration::from_secs(2));
    dispatcher.check_layout(&layout).expect("predictor fits layout");
    let engine = FogEngine::new(
        DeviceStateStore::new(layout),
        dispatcher,
        Arc::new(UnavailableDetector),
        Arc::clone(&status),
    );
    (engine, status)
}

fn scenario_message() -> Inbound {
    Inbound::Reading(DeviceMessage {
        device_id: 2,
        return_image: false,
        image: ImagePayload::Count(2),
        wifi_data: vec![97, 89, 80, 80, 55],
        bt_data: 3,
    })
}

#[tokio::test]
async fn device_update_fills_columns_and_publishes_estimate() {
    let stub = Arc::new(StubPredictor::default());
    let (mut engine, status) = fog(Arc::clone(&stub) as Arc<dyn Predictor>);

    let crowd = engine
        .handle(scenario_message())
        .await
        .expect("update accepted");

    let seen = stub.seen.lock().expect("seen lock");
    assert_eq!(seen.len(), 1);
    let features = &seen[0];
    assert_eq!(features.len(), 28);
    assert_eq!(&features[10..15], &[97.0, 89.0, 80.0, 80.0, 55.0]);
    assert_eq!(features[22], 3.0);
    assert_eq!(features[26], 2.0);
    let untouched = features
        .iter()
        .enumerate()
        .filter(|(column, _)| !(10..15).contains(column) && *column != 22 && *column != 26)
        .all(|(_, value)| *value == 0.0);
    assert!(untouched);

    assert_eq!(crowd.estimate, 13);
    assert_eq!(crowd.uncertainty, Some(1.5));
    let board = status.read().expect("status lock");
    assert_eq!(board.crowd(), &crowd);
    assert_eq!(board.features(), features.as_slice());
    assert_eq!(board.last_outcome(), &PredictionOutcome::Ok);
}

#[tokio::test]
async fn shipped_linear_artifact_predicts_scenario() {
    let model = predictor::load_artifact_from_path(predictor::artifact_path("models", "linear"))
        .expect("shipped artifact loads");
    let (mut engine, _status) = fog(Arc::from(model));

    let crowd = engine
        .handle(scenario_message())
        .await
        .expect("update accepted");

    // 3.0 + 0.05 * 401 + 1.5 * 3 + 2.0 * 2 = 31.55
    assert_eq!(crowd.estimate, 32);
    assert_eq!(crowd.uncertainty, None);
}

#[tokio::test]
async fn receiver_loop_processes_raw_scans_and_notifies_subscribers() {
    let stub = Arc::new(StubPredictor::default());
    let (engine, status) = fog(Arc::clone(&stub) as Arc<dyn Predictor>);
    let mut updates = status.read().expect("status lock").subscribe_crowd();
    let engine = engine.with_local_device(Some(0));
    let (intake, receiver) = mpsc::channel(4);
    let receiver_loop = tokio::spawn(engine.run(receiver));

    intake
        .send(Inbound::RawScan(RawScanMessage {
            device_id: None,
            wifi_lines: vec![
                "*:88\\:9C\\:AD\\:E1\\:22\\:6D:SIT-POLY:80".to_string(),
                ":88\\:9C\\:AD\\:E1\\:22\\:6E:SIT-POLY:97".to_string(),
                "garbage".to_string(),
            ],
            bt_lines: vec![
                "[NEW] Device AA".to_string(),
                "[NEW] Device AA".to_string(),
                "[NEW] Device BB".to_string(),
            ],
            people_count: 1,
        }))
        .await
        .expect("intake open");

    tokio::time::timeout(Duration::from_secs(2), updates.changed())
        .await
        .expect("status published in time")
        .expect("status channel open");
    assert_eq!(updates.borrow().estimate, 13);

    drop(intake);
    receiver_loop.await.expect("receiver loop exits");

    let board = status.read().expect("status lock");
    let device = &board.devices()[0];
    assert_eq!(device.device_id, 0);
    assert_eq!(device.wifi_signals, vec![97, 80, 0, 0, 0]);
    assert_eq!(device.bt_count, 2);
    assert_eq!(&board.features()[0..5], &[97.0, 80.0, 0.0, 0.0, 0.0]);
    assert_eq!(board.features()[20], 2.0);
    assert_eq!(board.features()[24], 1.0);
}
