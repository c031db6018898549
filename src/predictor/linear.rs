//! Linear regression: `estimate = intercept + coefficients · features`.

use crate::predictor::{ArtifactError, Prediction, Predictor, PredictorError, check_width};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct LinearParams {
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

/// Produces a bare point estimate; there is no uncertainty for this model.
#[derive(Debug)]
pub struct LinearModel {
    params: LinearParams,
}

impl LinearModel {
    pub fn new(params: LinearParams) -> Result<Self, ArtifactError> {
        if params.coefficients.is_empty() {
            return Err(ArtifactError::Invalid(
                "linear model has no coefficients".to_string(),
            ));
        }
        if !params.intercept.is_finite() || params.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ArtifactError::Invalid(
                "linear model has non-finite parameters".to_string(),
            ));
        }
        Ok(Self { params })
    }
}

impl Predictor for LinearModel {
    fn predict(&self, features: &[f64]) -> Result<Prediction, PredictorError> {
        check_width(self.params.coefficients.len(), features)?;
        let estimate = self.params.intercept
            + self
                .params
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, x)| c * x)
                .sum::<f64>();
        Ok(Prediction::point(estimate))
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.params.coefficients.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_weighted_sum_plus_intercept() {
        let model = LinearModel::new(LinearParams {
            coefficients: vec![0.5, -1.0, 2.0],
            intercept: 10.0,
        })
        .expect("valid params");

        let prediction = model.predict(&[4.0, 3.0, 1.5]).expect("prediction");

        // 10 + 2 - 3 + 3
        assert_eq!(prediction, Prediction::point(12.0));
    }

    #[test]
    fn wrong_width_is_an_error() {
        let model = LinearModel::new(LinearParams {
            coefficients: vec![1.0; 28],
            intercept: 0.0,
        })
        .expect("valid params");

        let err = model.predict(&[0.0; 27]).unwrap_err();
        assert!(matches!(
            err,
            PredictorError::WidthMismatch {
                expected: 28,
                actual: 27
            }
        ));
    }

    #[test]
    fn empty_or_non_finite_params_are_rejected() {
        assert!(LinearModel::new(LinearParams {
            coefficients: Vec::new(),
            intercept: 0.0,
        })
        .is_err());
        assert!(LinearModel::new(LinearParams {
            coefficients: vec![f64::NAN],
            intercept: 0.0,
        })
        .is_err());
    }
}
