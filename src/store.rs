use crate::error::AppError;
use crate::layout::FeatureLayout;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

pub type DeviceId = u32;

/// One device's contribution for a single scan cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReading {
    pub device_id: DeviceId,
    /// Exactly `top_n` strengths, strongest first, zero padded.
    pub wifi_signals: Vec<i32>,
    pub bt_count: u32,
    pub people_count: u32,
    /// Whether the count came from a raw image decoded on the fog.
    pub reported_raw_image: bool,
}

/// Latest reading per device plus the fixed-width feature vector built from
/// them. Columns of devices that never reported stay at zero.
#[derive(Debug, Clone)]
pub struct DeviceStateStore {
    layout: FeatureLayout,
    features: Vec<f64>,
    readings: BTreeMap<DeviceId, DeviceReading>,
}

impl DeviceStateStore {
    pub fn new(layout: FeatureLayout) -> Self {
        Self {
            layout,
            features: vec![0.0; layout.feature_columns().end],
            readings: BTreeMap::new(),
        }
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn features(&self) -> &[f64] {
        &self.features
    }

    pub fn readings(&self) -> &BTreeMap<DeviceId, DeviceReading> {
        &self.readings
    }

    pub fn reading(&self, device_id: DeviceId) -> Option<&DeviceReading> {
        self.readings.get(&device_id)
    }

    pub fn reported_devices(&self) -> usize {
        self.readings.len()
    }

    pub fn has_full_coverage(&self) -> bool {
        self.readings.len() == self.layout.total_devices()
    }

    /// Check a reading against the layout without touching any state.
    pub fn validate(&self, reading: &DeviceReading) -> Result<(), AppError> {
        validate_reading(&self.layout, reading)
    }

    /// Replace the device's previous reading and rewrite its columns.
    ///
    /// Last write wins: there is no ordering check against earlier updates. A
    /// reading that does not fit the layout is rejected before any column is
    /// written.
    pub fn apply(&mut self, reading: DeviceReading) -> Result<&[f64], AppError> {
        self.validate(&reading)?;
        let device_idx = reading.device_id as usize;

        let wifi_columns = self.layout.wifi_columns(device_idx);
        for (slot, signal) in self.features[wifi_columns]
            .iter_mut()
            .zip(&reading.wifi_signals)
        {
            *slot = f64::from(*signal);
        }
        self.features[self.layout.bt_column(device_idx)] = f64::from(reading.bt_count);
        self.features[self.layout.bbox_column(device_idx)] = f64::from(reading.people_count);

        debug!(
            device_id = reading.device_id,
            bt_count = reading.bt_count,
            people_count = reading.people_count,
            "Applied device reading"
        );
        self.readings.insert(reading.device_id, reading);

        Ok(&self.features)
    }
}

pub fn validate_reading(layout: &FeatureLayout, reading: &DeviceReading) -> Result<(), AppError> {
    let device_idx = reading.device_id as usize;
    if !layout.contains_device(device_idx) {
        return Err(AppError::UnknownDevice {
            device_id: reading.device_id,
            total_devices: layout.total_devices(),
        });
    }
    if reading.wifi_signals.len() != layout.top_n() {
        return Err(AppError::SignalCount {
            expected: layout.top_n(),
            actual: reading.wifi_signals.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(device_id: DeviceId, wifi: [i32; 5], bt_count: u32, people_count: u32) -> DeviceReading {
        DeviceReading {
            device_id,
            wifi_signals: wifi.to_vec(),
            bt_count,
            people_count,
            reported_raw_image: false,
        }
    }

    fn store() -> DeviceStateStore {
        DeviceStateStore::new(FeatureLayout::new(5, 4).expect("valid layout"))
    }

    #[test]
    fn apply_writes_device_columns() {
        let mut store = store();
        let layout = *store.layout();

        let features = store
            .apply(reading(2, [97, 89, 80, 80, 55], 3, 2))
            .expect("apply reading")
            .to_vec();

        assert_eq!(features.len(), 28);
        assert_eq!(&features[layout.wifi_columns(2)], &[97.0, 89.0, 80.0, 80.0, 55.0]);
        assert_eq!(features[layout.bt_column(2)], 3.0);
        assert_eq!(features[layout.bbox_column(2)], 2.0);
    }

    #[test]
    fn partial_coverage_leaves_other_devices_at_zero() {
        let mut store = store();
        let layout = *store.layout();

        store
            .apply(reading(1, [70, 60, 50, 40, 30], 9, 4))
            .expect("apply reading");

        let features = store.features();
        assert_eq!(features.len(), 5 * 4 + 2 * 4);
        for device_idx in [0, 2, 3] {
            assert!(features[layout.wifi_columns(device_idx)].iter().all(|v| *v == 0.0));
            assert_eq!(features[layout.bt_column(device_idx)], 0.0);
            assert_eq!(features[layout.bbox_column(device_idx)], 0.0);
        }
        assert!(!store.has_full_coverage());
    }

    #[test]
    fn applying_same_reading_twice_is_idempotent() {
        let mut store = store();
        let update = reading(0, [88, 77, 66, 0, 0], 5, 1);

        let first = store.apply(update.clone()).expect("first apply").to_vec();
        let second = store.apply(update).expect("second apply").to_vec();

        assert_eq!(first, second);
        assert_eq!(store.reported_devices(), 1);
    }

    #[test]
    fn later_update_replaces_earlier_one() {
        let mut store = store();
        let layout = *store.layout();

        store
            .apply(reading(3, [90, 80, 70, 60, 50], 10, 7))
            .expect("first apply");
        store
            .apply(reading(3, [40, 0, 0, 0, 0], 1, 0))
            .expect("second apply");

        assert_eq!(&store.features()[layout.wifi_columns(3)], &[40.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(store.features()[layout.bt_column(3)], 1.0);
        assert_eq!(store.reading(3).map(|r| r.people_count), Some(0));
    }

    #[test]
    fn out_of_fleet_device_is_rejected_without_mutation() {
        let mut store = store();

        let result = store.apply(reading(4, [1, 2, 3, 4, 5], 1, 1));

        assert!(matches!(
            result,
            Err(AppError::UnknownDevice {
                device_id: 4,
                total_devices: 4
            })
        ));
        assert!(store.features().iter().all(|v| *v == 0.0));
        assert_eq!(store.reported_devices(), 0);
    }

    #[test]
    fn wrong_signal_count_is_rejected_without_mutation() {
        let mut store = store();
        let mut short = reading(0, [1, 2, 3, 4, 5], 1, 1);
        short.wifi_signals.truncate(3);

        let result = store.apply(short);

        assert!(matches!(
            result,
            Err(AppError::SignalCount {
                expected: 5,
                actual: 3
            })
        ));
        assert!(store.features().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn full_coverage_after_every_device_reports() {
        let mut store = store();
        for device_id in 0..4 {
            store
                .apply(reading(device_id, [50, 40, 30, 20, 10], 2, 1))
                .expect("apply reading");
        }
        assert!(store.has_full_coverage());
    }
}
