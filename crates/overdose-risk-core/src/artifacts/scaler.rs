//! Pre-fitted columnwise feature scaling.

use serde::{Deserialize, Serialize};

use super::{ArtifactError, ArtifactResult};

/// A fitted linear rescaling, applied column by column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    /// `(x - mean) / scale`
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// `(x - data_min) / (data_max - data_min)`
    MinMax {
        data_min: Vec<f64>,
        data_max: Vec<f64>,
    },
}

impl Scaler {
    /// Number of columns the scaler was fitted on.
    pub fn n_features(&self) -> usize {
        match self {
            Scaler::Standard { mean, .. } => mean.len(),
            Scaler::MinMax { data_min, .. } => data_min.len(),
        }
    }

    /// Check that the fitted parameters are consistent.
    pub fn validate(&self) -> ArtifactResult<()> {
        let (a, b, names) = match self {
            Scaler::Standard { mean, scale } => (mean, scale, ("mean", "scale")),
            Scaler::MinMax { data_min, data_max } => (data_min, data_max, ("data_min", "data_max")),
        };
        if a.len() != b.len() {
            return Err(ArtifactError::Invalid(format!(
                "scaler {} has {} values but {} has {}",
                names.0,
                a.len(),
                names.1,
                b.len()
            )));
        }
        if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
            return Err(ArtifactError::Invalid(
                "scaler parameters must be finite".into(),
            ));
        }
        Ok(())
    }

    /// Apply the transform. The input must have exactly `n_features` columns.
    pub fn transform(&self, features: &[f64]) -> ArtifactResult<Vec<f64>> {
        let expected = self.n_features();
        if features.len() != expected {
            return Err(ArtifactError::ShapeMismatch {
                stage: "scaler",
                expected,
                actual: features.len(),
            });
        }

        let scaled = match self {
            Scaler::Standard { mean, scale } => features
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(x, (m, s))| (x - m) / nonzero(*s))
                .collect(),
            Scaler::MinMax { data_min, data_max } => features
                .iter()
                .zip(data_min.iter().zip(data_max))
                .map(|(x, (lo, hi))| (x - lo) / nonzero(hi - lo))
                .collect(),
        };
        Ok(scaled)
    }
}

/// Constant columns were fitted with zero spread; leave them unscaled.
fn nonzero(spread: f64) -> f64 {
    if spread == 0.0 {
        1.0
    } else {
        spread
    }
}
