use crate::http::post_json;
use crate::predictor::{Prediction, Predictor, PredictorError, check_width};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

const API_VERSION: &str = "1.0";

/// Predictor served over HTTP, optionally backed by a local model used when
/// the remote call fails.
pub struct RemoteModel {
    endpoint: String,
    timeout: Duration,
    model_name: String,
    input_width: Option<usize>,
    fallback_model: Option<Box<dyn Predictor>>,
}

impl RemoteModel {
    pub fn new(
        endpoint: String,
        timeout: Duration,
        model_name: String,
        input_width: Option<usize>,
        fallback_model: Option<Box<dyn Predictor>>,
    ) -> Self {
        Self {
            endpoint,
            timeout,
            model_name,
            input_width,
            fallback_model,
        }
    }

    fn call_remote(&self, features: &[f64]) -> Result<Prediction, PredictorError> {
        let request = PredictRequest {
            api_version: API_VERSION,
            model_name: &self.model_name,
            features,
            timestamp: format_timestamp(SystemTime::now()),
        };
        let response: PredictResponse = post_json(&self.endpoint, &request, self.timeout)?;
        Ok(Prediction {
            estimate: response.estimate,
            uncertainty: response.uncertainty,
        })
    }
}

impl fmt::Debug for RemoteModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteModel")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("model_name", &self.model_name)
            .field("input_width", &self.input_width())
            .field("has_fallback", &self.fallback_model.is_some())
            .finish()
    }
}

impl Predictor for RemoteModel {
    fn predict(&self, features: &[f64]) -> Result<Prediction, PredictorError> {
        if let Some(width) = self.input_width() {
            check_width(width, features)?;
        }
        match self.call_remote(features) {
            Ok(prediction) => Ok(prediction),
            Err(err) => {
                warn!(error = %err, endpoint = %self.endpoint, "Remote predictor call failed");
                match self.fallback_model.as_ref() {
                    Some(fallback) => {
                        warn!("Falling back to local predictor");
                        fallback.predict(features)
                    }
                    None => Err(err),
                }
            }
        }
    }

    fn input_width(&self) -> Option<usize> {
        self.input_width
            .or_else(|| self.fallback_model.as_ref().and_then(|m| m.input_width()))
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    api_version: &'static str,
    model_name: &'a str,
    features: &'a [f64],
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    estimate: f64,
    #[serde(default)]
    uncertainty: Option<f64>,
}

fn format_timestamp(timestamp: SystemTime) -> String {
    OffsetDateTime::from(timestamp)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
