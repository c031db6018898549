//! Gaussian-process regressor exported from a fitted model.
//!
//! Kernel: `signal_variance * RBF(length_scale) + White(noise_level)`.
//! The artifact carries the training inputs, the dual coefficients
//! `alpha = K⁻¹ y` and the inverse training covariance `K⁻¹`, so prediction is
//! a pair of dot products:
//!
//! ```text
//! mean = k*ᵀ alpha
//! var  = k(x, x) - k*ᵀ K⁻¹ k*
//! ```
//!
//! Targets may have been normalised during fitting; `y_train_mean` and
//! `y_train_std` undo that.

use crate::predictor::{ArtifactError, Prediction, Predictor, PredictorError, check_width};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LengthScale {
    Isotropic(f64),
    PerFeature(Vec<f64>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GprParams {
    pub train_inputs: Vec<Vec<f64>>,
    pub alpha: Vec<f64>,
    pub k_inv: Vec<Vec<f64>>,
    pub length_scale: LengthScale,
    #[serde(default = "one")]
    pub signal_variance: f64,
    #[serde(default)]
    pub noise_level: f64,
    #[serde(default)]
    pub y_train_mean: f64,
    #[serde(default = "one")]
    pub y_train_std: f64,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug)]
pub struct GprModel {
    params: GprParams,
    inverse_length_scales: Vec<f64>,
    width: usize,
}

impl GprModel {
    pub fn new(params: GprParams) -> Result<Self, ArtifactError> {
        let samples = params.train_inputs.len();
        let width = params
            .train_inputs
            .first()
            .map(Vec::len)
            .filter(|w| *w > 0)
            .ok_or_else(|| invalid("gpr model has no training inputs"))?;

        if params.train_inputs.iter().any(|row| row.len() != width) {
            return Err(invalid("gpr training inputs have inconsistent widths"));
        }
        if params.alpha.len() != samples {
            return Err(invalid("gpr alpha length does not match training inputs"));
        }
        if params.k_inv.len() != samples || params.k_inv.iter().any(|row| row.len() != samples) {
            return Err(invalid("gpr k_inv is not square over the training inputs"));
        }
        if params.signal_variance <= 0.0 || params.noise_level < 0.0 || params.y_train_std <= 0.0 {
            return Err(invalid("gpr kernel or target scale out of range"));
        }

        let scales = match &params.length_scale {
            LengthScale::Isotropic(scale) => vec![*scale; width],
            LengthScale::PerFeature(scales) if scales.len() == width => scales.clone(),
            LengthScale::PerFeature(_) => {
                return Err(invalid("gpr length_scale does not match feature width"));
            }
        };
        if scales.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(invalid("gpr length_scale must be positive"));
        }
        let inverse_length_scales = scales.iter().map(|s| 1.0 / s).collect();

        Ok(Self {
            params,
            inverse_length_scales,
            width,
        })
    }

    fn rbf(&self, a: &[f64], b: &[f64]) -> f64 {
        let squared: f64 = a
            .iter()
            .zip(b)
            .zip(&self.inverse_length_scales)
            .map(|((x, y), inv)| {
                let d = (x - y) * inv;
                d * d
            })
            .sum();
        self.params.signal_variance * (-0.5 * squared).exp()
    }
}

fn invalid(message: &str) -> ArtifactError {
    ArtifactError::Invalid(message.to_string())
}

impl Predictor for GprModel {
    fn predict(&self, features: &[f64]) -> Result<Prediction, PredictorError> {
        check_width(self.width, features)?;

        let k_star: Vec<f64> = self
            .params
            .train_inputs
            .iter()
            .map(|row| self.rbf(features, row))
            .collect();

        let mean: f64 = k_star.iter().zip(&self.params.alpha).map(|(k, a)| k * a).sum();

        let explained: f64 = self
            .params
            .k_inv
            .iter()
            .zip(&k_star)
            .map(|(row, ki)| ki * row.iter().zip(&k_star).map(|(v, kj)| v * kj).sum::<f64>())
            .sum();
        let prior = self.params.signal_variance + self.params.noise_level;
        // Round-off can push the variance slightly negative near training points.
        let variance = (prior - explained).max(0.0);

        let estimate = mean * self.params.y_train_std + self.params.y_train_mean;
        let std = variance.sqrt() * self.params.y_train_std;
        if !estimate.is_finite() {
            return Err(PredictorError::NonFinite(estimate));
        }
        if !std.is_finite() {
            return Err(PredictorError::NonFinite(std));
        }

        Ok(Prediction::with_uncertainty(estimate, std))
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.width)
    }
}
