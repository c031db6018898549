//! Inbound device messages and their validation at the transport boundary.
//!
//! A message is either rejected whole or converted into a [`DeviceReading`];
//! nothing partially valid reaches the store.

use crate::error::AppError;
use crate::layout::FeatureLayout;
use crate::store::{DeviceId, DeviceReading, validate_reading};
use crate::telemetry::process_signals;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod detector;

use detector::{DetectionError, PeopleDetector};

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid reading: {0}")]
    Reading(#[from] AppError),
    #[error("image blob sent with return_image=false")]
    UnexpectedImageBlob,
    #[error("invalid base64 image: {0}")]
    ImageDecode(#[from] base64::DecodeError),
    #[error("people detection failed: {0}")]
    Detection(#[from] DetectionError),
    #[error("raw scan has no device_id and this node has no device_idx")]
    MissingDeviceId,
}

/// People count as sent by an edge device: either already reduced to a
/// count, or a base64-encoded image for the fog to run detection on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImagePayload {
    Count(u32),
    Encoded(String),
}

/// Pre-processed reading published by an edge device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMessage {
    pub device_id: DeviceId,
    pub return_image: bool,
    pub image: ImagePayload,
    pub wifi_data: Vec<i32>,
    pub bt_data: u32,
}

impl DeviceMessage {
    /// Shape checks that need neither the detector nor the store.
    pub fn validate(&self, layout: &FeatureLayout) -> Result<(), MessageError> {
        if matches!(self.image, ImagePayload::Encoded(_)) && !self.return_image {
            return Err(MessageError::UnexpectedImageBlob);
        }
        validate_reading(layout, &self.skeleton(0, false))?;
        Ok(())
    }

    pub fn into_reading(
        self,
        layout: &FeatureLayout,
        detector: &dyn PeopleDetector,
    ) -> Result<DeviceReading, MessageError> {
        self.validate(layout)?;

        let (people_count, reported_raw_image) = match &self.image {
            ImagePayload::Count(count) => (*count, false),
            ImagePayload::Encoded(encoded) => {
                let bytes = STANDARD.decode(encoded.trim())?;
                (detector.count_people(&bytes)?, true)
            }
        };

        Ok(self.skeleton(people_count, reported_raw_image))
    }

    fn skeleton(&self, people_count: u32, reported_raw_image: bool) -> DeviceReading {
        DeviceReading {
            device_id: self.device_id,
            wifi_signals: self.wifi_data.clone(),
            bt_count: self.bt_data,
            people_count,
            reported_raw_image,
        }
    }
}

/// Unprocessed scan output forwarded for parsing on the fog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawScanMessage {
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    #[serde(default)]
    pub wifi_lines: Vec<String>,
    #[serde(default)]
    pub bt_lines: Vec<String>,
    pub people_count: u32,
}

impl RawScanMessage {
    /// Scans without an explicit sender belong to this node's own sensor.
    pub fn resolve_device_id(&self, local_device: Option<DeviceId>) -> Result<DeviceId, MessageError> {
        self.device_id
            .or(local_device)
            .ok_or(MessageError::MissingDeviceId)
    }

    pub fn validate(
        &self,
        layout: &FeatureLayout,
        local_device: Option<DeviceId>,
    ) -> Result<(), MessageError> {
        let device_id = self.resolve_device_id(local_device)?;
        if !layout.contains_device(device_id as usize) {
            return Err(AppError::UnknownDevice {
                device_id,
                total_devices: layout.total_devices(),
            }
            .into());
        }
        Ok(())
    }

    pub fn into_reading(
        self,
        layout: &FeatureLayout,
        local_device: Option<DeviceId>,
    ) -> Result<DeviceReading, MessageError> {
        self.validate(layout, local_device)?;
        let device_id = self.resolve_device_id(local_device)?;
        let (wifi_signals, bt_count) = process_signals(&self.wifi_lines, &self.bt_lines, layout.top_n());
        Ok(DeviceReading {
            device_id,
            wifi_signals,
            bt_count,
            people_count: self.people_count,
            reported_raw_image: false,
        })
    }
}

/// Everything the receiver loop accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Reading(DeviceMessage),
    RawScan(RawScanMessage),
}

impl Inbound {
    pub fn device_id(&self) -> Option<DeviceId> {
        match self {
            Inbound::Reading(message) => Some(message.device_id),
            Inbound::RawScan(message) => message.device_id,
        }
    }

    pub fn validate(
        &self,
        layout: &FeatureLayout,
        local_device: Option<DeviceId>,
    ) -> Result<(), MessageError> {
        match self {
            Inbound::Reading(message) => message.validate(layout),
            Inbound::RawScan(message) => message.validate(layout, local_device),
        }
    }

    pub fn into_reading(
        self,
        layout: &FeatureLayout,
        detector: &dyn PeopleDetector,
        local_device: Option<DeviceId>,
    ) -> Result<DeviceReading, MessageError> {
        match self {
            Inbound::Reading(message) => message.into_reading(layout, detector),
            Inbound::RawScan(message) => message.into_reading(layout, local_device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::detector::UnavailableDetector;
    use serde_json::json;

    #[derive(Debug)]
    struct FixedDetector(u32);

    impl PeopleDetector for FixedDetector {
        fn count_people(&self, image: &[u8]) -> Result<u32, DetectionError> {
            assert_eq!(image, b"jpeg-bytes");
            Ok(self.0)
        }
    }

    fn layout() -> FeatureLayout {
        FeatureLayout::new(5, 4).expect("valid layout")
    }

    #[test]
    fn structured_message_deserializes_with_count_image() {
        let message: DeviceMessage = serde_json::from_value(json!({
            "device_id": 2,
            "return_image": false,
            "image": 2,
            "wifi_data": [97, 89, 80, 80, 55],
            "bt_data": 3
        }))
        .expect("valid message");

        let reading = message
            .into_reading(&layout(), &UnavailableDetector)
            .expect("valid reading");

        assert_eq!(
            reading,
            DeviceReading {
                device_id: 2,
                wifi_signals: vec![97, 89, 80, 80, 55],
                bt_count: 3,
                people_count: 2,
                reported_raw_image: false,
            }
        );
    }

    #[test]
    fn missing_fields_fail_deserialization() {
        let result: Result<DeviceMessage, _> = serde_json::from_value(json!({
            "device_id": 1,
            "return_image": false,
            "image": 0
        }));
        assert!(result.is_err());
    }

    #[test]
    fn encoded_image_is_counted_by_detector() {
        let message = DeviceMessage {
            device_id: 0,
            return_image: true,
            image: ImagePayload::Encoded(STANDARD.encode(b"jpeg-bytes")),
            wifi_data: vec![1, 2, 3, 4, 5],
            bt_data: 0,
        };

        let reading = message
            .into_reading(&layout(), &FixedDetector(11))
            .expect("valid reading");

        assert_eq!(reading.people_count, 11);
        assert!(reading.reported_raw_image);
    }

    #[test]
    fn encoded_image_without_detector_is_rejected() {
        let message = DeviceMessage {
            device_id: 0,
            return_image: true,
            image: ImagePayload::Encoded(STANDARD.encode(b"jpeg-bytes")),
            wifi_data: vec![1, 2, 3, 4, 5],
            bt_data: 0,
        };

        let result = message.into_reading(&layout(), &UnavailableDetector);

        assert!(matches!(
            result,
            Err(MessageError::Detection(DetectionError::Unavailable))
        ));
    }

    #[test]
    fn encoded_image_requires_return_image_flag() {
        let message = DeviceMessage {
            device_id: 0,
            return_image: false,
            image: ImagePayload::Encoded("aGk=".to_string()),
            wifi_data: vec![1, 2, 3, 4, 5],
            bt_data: 0,
        };

        assert!(matches!(
            message.validate(&layout()),
            Err(MessageError::UnexpectedImageBlob)
        ));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let message = DeviceMessage {
            device_id: 0,
            return_image: true,
            image: ImagePayload::Encoded("not base64!".to_string()),
            wifi_data: vec![1, 2, 3, 4, 5],
            bt_data: 0,
        };

        assert!(matches!(
            message.into_reading(&layout(), &FixedDetector(1)),
            Err(MessageError::ImageDecode(_))
        ));
    }

    #[test]
    fn wrong_wifi_length_is_rejected() {
        let message = DeviceMessage {
            device_id: 0,
            return_image: false,
            image: ImagePayload::Count(0),
            wifi_data: vec![1, 2, 3],
            bt_data: 0,
        };

        assert!(matches!(
            message.validate(&layout()),
            Err(MessageError::Reading(AppError::SignalCount { .. }))
        ));
    }

    #[test]
    fn raw_scan_is_parsed_into_reading() {
        let message = RawScanMessage {
            device_id: Some(1),
            wifi_lines: vec![
                ":88\\:9C\\:AD\\:E1\\:22\\:6D:SIT-POLY:61".to_string(),
                "*:88\\:9C\\:AD\\:E1\\:22\\:6E:SIT-POLY:84".to_string(),
            ],
            bt_lines: vec!["[NEW] Device AA".to_string(), "[NEW] Device AA".to_string()],
            people_count: 6,
        };

        let reading = message.into_reading(&layout(), None).expect("valid reading");

        assert_eq!(reading.device_id, 1);
        assert_eq!(reading.wifi_signals, vec![84, 61, 0, 0, 0]);
        assert_eq!(reading.bt_count, 1);
        assert_eq!(reading.people_count, 6);
    }

    #[test]
    fn raw_scan_falls_back_to_local_device() {
        let message = RawScanMessage {
            device_id: None,
            wifi_lines: Vec::new(),
            bt_lines: Vec::new(),
            people_count: 0,
        };

        assert_eq!(message.resolve_device_id(Some(3)).expect("local id"), 3);
        assert!(matches!(
            message.resolve_device_id(None),
            Err(MessageError::MissingDeviceId)
        ));
        assert!(matches!(
            message.validate(&layout(), Some(9)),
            Err(MessageError::Reading(AppError::UnknownDevice { .. }))
        ));
    }
}
