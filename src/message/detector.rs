//! People-detection collaborator for raw image payloads.

use crate::http::{HttpError, post_json};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("no people detector configured")]
    Unavailable,
    #[error("remote detector failed: {0}")]
    Remote(#[from] HttpError),
}

/// Counts people in an encoded image (JPEG/PNG bytes as captured on the edge).
pub trait PeopleDetector: Send + Sync + fmt::Debug {
    fn count_people(&self, image: &[u8]) -> Result<u32, DetectionError>;
}

/// Default detector for fogs without a detection model: raw images are
/// rejected so they never reach the feature vector.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDetector;

impl PeopleDetector for UnavailableDetector {
    fn count_people(&self, _image: &[u8]) -> Result<u32, DetectionError> {
        Err(DetectionError::Unavailable)
    }
}

/// Delegates detection to an HTTP service.
#[derive(Debug, Clone)]
pub struct RemoteDetector {
    endpoint: String,
    timeout: Duration,
}

impl RemoteDetector {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }
}

#[derive(Debug, Serialize)]
struct DetectRequest {
    image: String,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    people_count: u32,
}

impl PeopleDetector for RemoteDetector {
    fn count_people(&self, image: &[u8]) -> Result<u32, DetectionError> {
        let request = DetectRequest {
            image: STANDARD.encode(image),
        };
        let response: DetectResponse = post_json(&self.endpoint, &request, self.timeout)?;
        Ok(response.people_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_detector_rejects() {
        let err = UnavailableDetector.count_people(b"\xff\xd8").unwrap_err();
        assert_eq!(err.to_string(), "no people detector configured");
    }

    #[test]
    fn remote_detector_surfaces_transport_errors() {
        let detector = RemoteDetector::new("ftp://nowhere".to_string(), Duration::from_millis(10));
        let err = detector.count_people(b"img").unwrap_err();
        assert!(matches!(err, DetectionError::Remote(HttpError::InvalidUrl(_))));
    }
}
