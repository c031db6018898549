//! Crowd-size predictors.
//!
//! A predictor maps the fog's feature vector to a point estimate and, for
//! models that can provide one, a one-sigma uncertainty. Local models are
//! loaded from `<models_dir>/<name>.json`:
//!
//! ```json
//! { "model": "linear", "params": { "coefficients": [..], "intercept": 0.0 } }
//! ```

use crate::http::HttpError;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod gpr;
pub mod linear;
pub mod remote;

use gpr::{GprModel, GprParams};
use linear::{LinearModel, LinearParams};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub estimate: f64,
    pub uncertainty: Option<f64>,
}

impl Prediction {
    pub fn point(estimate: f64) -> Self {
        Self {
            estimate,
            uncertainty: None,
        }
    }

    pub fn with_uncertainty(estimate: f64, uncertainty: f64) -> Self {
        Self {
            estimate,
            uncertainty: Some(uncertainty),
        }
    }
}

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("expected {expected} features, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },
    #[error("predictor returned a non-finite value: {0}")]
    NonFinite(f64),
    #[error("remote predictor failed: {0}")]
    Remote(#[from] HttpError),
}

pub trait Predictor: Send + Sync + fmt::Debug {
    fn predict(&self, features: &[f64]) -> Result<Prediction, PredictorError>;

    /// Number of features the model was fitted on, when known.
    fn input_width(&self) -> Option<usize>;
}

pub(crate) fn check_width(expected: usize, features: &[f64]) -> Result<(), PredictorError> {
    if features.len() != expected {
        return Err(PredictorError::WidthMismatch {
            expected,
            actual: features.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ArtifactFile {
    pub model: String,
    pub params: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read predictor artifact: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse predictor artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid predictor artifact: {0}")]
    Invalid(String),
}

pub fn artifact_path(models_dir: impl AsRef<Path>, name: &str) -> PathBuf {
    models_dir.as_ref().join(format!("{name}.json"))
}

pub fn create_predictor(artifact: &ArtifactFile) -> Result<Box<dyn Predictor>, ArtifactError> {
    match artifact.model.as_str() {
        "linear" => {
            let params: LinearParams = serde_json::from_value(artifact.params.clone())?;
            Ok(Box::new(LinearModel::new(params)?))
        }
        "gpr" => {
            let params: GprParams = serde_json::from_value(artifact.params.clone())?;
            Ok(Box::new(GprModel::new(params)?))
        }
        other => Err(ArtifactError::Invalid(format!("unknown model: {other}"))),
    }
}

pub fn load_artifact_from_path(path: impl AsRef<Path>) -> Result<Box<dyn Predictor>, ArtifactError> {
    let contents = std::fs::read_to_string(path)?;
    let artifact: ArtifactFile = serde_json::from_str(&contents)?;
    create_predictor(&artifact)
}
