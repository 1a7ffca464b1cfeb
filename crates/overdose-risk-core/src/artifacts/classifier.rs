//! Pre-trained binary classifiers.
//!
//! Supported model files:
//! - `logistic_regression`: `p = sigmoid(w·x + b)`
//! - `decision_forest`: mean leaf probability over a set of flat-array trees

use serde::{Deserialize, Serialize};

use crate::models::ClassifierOutput;

use super::{ArtifactError, ArtifactResult};

/// A fitted binary classifier, treated as a pure function of the scaled vector.
pub trait Classifier: Send + Sync + std::fmt::Debug {
    /// Number of input columns.
    fn n_features(&self) -> usize;

    /// Label and positive-class probability for one scaled vector.
    fn predict(&self, scaled: &[f64]) -> ArtifactResult<ClassifierOutput>;

    /// Short identifier of the model family.
    fn kind(&self) -> &'static str;

    /// Check the fitted parameters. Called before the model is used.
    fn validate(&self) -> ArtifactResult<()>;
}

fn default_threshold() -> f64 {
    0.5
}

/// Serialized model file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelFile {
    LogisticRegression(LogisticRegression),
    DecisionForest(DecisionForest),
}

impl ModelFile {
    /// Feature names recorded at training time, if any.
    pub fn feature_names(&self) -> Option<&[String]> {
        match self {
            ModelFile::LogisticRegression(m) => m.feature_names.as_deref(),
            ModelFile::DecisionForest(m) => m.feature_names.as_deref(),
        }
    }

    /// Validate and box the model.
    pub fn into_classifier(self) -> ArtifactResult<Box<dyn Classifier>> {
        match self {
            ModelFile::LogisticRegression(m) => {
                m.validate()?;
                Ok(Box::new(m))
            }
            ModelFile::DecisionForest(m) => {
                m.validate()?;
                Ok(Box::new(m))
            }
        }
    }
}

/// Logistic regression over the scaled features.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
}

impl Classifier for LogisticRegression {
    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict(&self, scaled: &[f64]) -> ArtifactResult<ClassifierOutput> {
        check_shape(self.n_features(), scaled)?;
        let z: f64 = self
            .coefficients
            .iter()
            .zip(scaled)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;
        to_output(sigmoid(z), self.threshold)
    }

    fn kind(&self) -> &'static str {
        "logistic_regression"
    }

    fn validate(&self) -> ArtifactResult<()> {
        if self.coefficients.is_empty() {
            return Err(ArtifactError::Invalid(
                "logistic regression has no coefficients".into(),
            ));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ArtifactError::Invalid(
                "logistic regression parameters must be finite".into(),
            ));
        }
        validate_threshold(self.threshold)
    }
}

/// Node of a flat-array decision tree. Children always follow their parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// `x[feature] <= threshold` goes left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf { probability: f64 },
}

/// A single decision tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn validate(&self, n_features: usize) -> ArtifactResult<()> {
        if self.nodes.is_empty() {
            return Err(ArtifactError::Invalid("decision tree has no nodes".into()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(ArtifactError::Invalid(format!(
                            "node {} splits on feature {} of {}",
                            i, feature, n_features
                        )));
                    }
                    if threshold.is_nan() {
                        return Err(ArtifactError::Invalid(format!(
                            "node {} has NaN threshold",
                            i
                        )));
                    }
                    // Children after the parent rules out cycles.
                    for child in [left, right] {
                        if *child <= i || *child >= self.nodes.len() {
                            return Err(ArtifactError::Invalid(format!(
                                "node {} has invalid child index {}",
                                i, child
                            )));
                        }
                    }
                }
                TreeNode::Leaf { probability } => {
                    if !(0.0..=1.0).contains(probability) {
                        return Err(ArtifactError::Invalid(format!(
                            "leaf {} probability {} outside [0, 1]",
                            i, probability
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn leaf_probability(&self, x: &[f64]) -> ArtifactResult<f64> {
        let mut index = 0;
        // Each step moves to a later node, so at most `nodes.len()` steps.
        for _ in 0..self.nodes.len() {
            let node = self.nodes.get(index).ok_or_else(|| {
                ArtifactError::Invalid(format!("decision tree has no node {}", index))
            })?;
            match node {
                TreeNode::Leaf { probability } => return Ok(*probability),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = x.get(*feature).ok_or_else(|| {
                        ArtifactError::Invalid(format!("split on missing feature {}", feature))
                    })?;
                    if *left <= index || *right <= index {
                        return Err(ArtifactError::Invalid(format!(
                            "node {} has a backward child",
                            index
                        )));
                    }
                    index = if *value <= *threshold { *left } else { *right };
                }
            }
        }
        Err(ArtifactError::Invalid("decision tree has no reachable leaf".into()))
    }
}

/// Ensemble of decision trees averaging leaf probabilities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionForest {
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
}

impl Classifier for DecisionForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, scaled: &[f64]) -> ArtifactResult<ClassifierOutput> {
        check_shape(self.n_features, scaled)?;
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.leaf_probability(scaled)?;
        }
        to_output(total / self.trees.len() as f64, self.threshold)
    }

    fn kind(&self) -> &'static str {
        "decision_forest"
    }

    fn validate(&self) -> ArtifactResult<()> {
        if self.trees.is_empty() {
            return Err(ArtifactError::Invalid("decision forest has no trees".into()));
        }
        for tree in &self.trees {
            tree.validate(self.n_features)?;
        }
        validate_threshold(self.threshold)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn to_output(probability: f64, threshold: f64) -> ArtifactResult<ClassifierOutput> {
    if probability.is_nan() {
        return Err(ArtifactError::Invalid(
            "classifier produced a NaN probability".into(),
        ));
    }
    let probability = probability.clamp(0.0, 1.0);
    Ok(ClassifierOutput {
        label: u8::from(probability >= threshold),
        probability,
    })
}

fn check_shape(expected: usize, scaled: &[f64]) -> ArtifactResult<()> {
    if scaled.len() != expected {
        return Err(ArtifactError::ShapeMismatch {
            stage: "classifier",
            expected,
            actual: scaled.len(),
        });
    }
    Ok(())
}

fn validate_threshold(threshold: f64) -> ArtifactResult<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ArtifactError::Invalid(format!(
            "decision threshold {} outside [0, 1]",
            threshold
        )));
    }
    Ok(())
}
