//! Pre-trained artifacts: scaler, classifier and categorical vocabularies.
//!
//! Artifacts are produced offline and loaded once through an
//! [`ArtifactSource`]. Loading is all-or-nothing: any missing or corrupt
//! file fails the whole set.

mod classifier;
mod scaler;

pub use classifier::*;
pub use scaler::*;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::models::ClassifierOutput;
use crate::pipeline::FEATURE_NAMES;
use crate::vocabulary::{VocabularyError, VocabularyJournal, VocabularyStore};

/// File names inside an artifact directory.
pub const MODEL_FILE: &str = "model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const VOCABULARY_FILE: &str = "label_encoders.json";

/// Artifact errors.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to read artifact '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt artifact '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid artifact: {0}")]
    Invalid(String),

    #[error("Vocabulary error: {0}")]
    Vocabulary(#[from] VocabularyError),

    #[error("{stage} expects {expected} features, got {actual}")]
    ShapeMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// Anything that can produce a loaded artifact set.
pub trait ArtifactSource {
    fn load(&self) -> ArtifactResult<Artifacts>;
}

/// Loaded, validated artifacts shared across requests.
#[derive(Debug)]
pub struct Artifacts {
    scaler: Scaler,
    classifier: Box<dyn Classifier>,
    vocabularies: VocabularyStore,
    fingerprint: String,
}

impl Artifacts {
    /// Assemble an artifact set, checking that the shapes agree with the feature schema.
    pub fn new(
        scaler: Scaler,
        classifier: Box<dyn Classifier>,
        vocabularies: VocabularyStore,
        fingerprint: String,
    ) -> ArtifactResult<Self> {
        scaler.validate()?;
        classifier.validate()?;

        let expected = FEATURE_NAMES.len();
        if scaler.n_features() != expected {
            return Err(ArtifactError::Invalid(format!(
                "scaler was fitted on {} features, pipeline produces {}",
                scaler.n_features(),
                expected
            )));
        }
        if classifier.n_features() != expected {
            return Err(ArtifactError::Invalid(format!(
                "classifier was trained on {} features, pipeline produces {}",
                classifier.n_features(),
                expected
            )));
        }

        Ok(Self {
            scaler,
            classifier,
            vocabularies,
            fingerprint,
        })
    }

    /// Attach a vocabulary journal (replays existing extensions).
    pub fn with_journal(mut self, journal: Box<dyn VocabularyJournal>) -> ArtifactResult<Self> {
        self.vocabularies = self.vocabularies.with_journal(journal)?;
        Ok(self)
    }

    /// Scale a raw feature vector and classify it.
    pub fn score(&self, features: &[f64]) -> ArtifactResult<ClassifierOutput> {
        let scaled = self.scaler.transform(features)?;
        self.classifier.predict(&scaled)
    }

    pub fn scaler(&self) -> &Scaler {
        &self.scaler
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn vocabularies(&self) -> &VocabularyStore {
        &self.vocabularies
    }

    /// SHA-256 (hex) identifying this artifact set.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Loads `model.json`, `scaler.json` and `label_encoders.json` from a directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read(&self, name: &str) -> ArtifactResult<(PathBuf, Vec<u8>)> {
        let path = self.dir.join(name);
        let bytes = fs::read(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        Ok((path, bytes))
    }

    /// Fingerprint of the artifact files without parsing them.
    pub fn fingerprint(&self) -> ArtifactResult<String> {
        let model = self.read(MODEL_FILE)?.1;
        let scaler = self.read(SCALER_FILE)?.1;
        let vocab = self.read(VOCABULARY_FILE)?.1;
        Ok(fingerprint(&[
            (MODEL_FILE, model.as_slice()),
            (SCALER_FILE, scaler.as_slice()),
            (VOCABULARY_FILE, vocab.as_slice()),
        ]))
    }
}

impl ArtifactSource for DirectorySource {
    fn load(&self) -> ArtifactResult<Artifacts> {
        let (model_path, model_bytes) = self.read(MODEL_FILE)?;
        let (scaler_path, scaler_bytes) = self.read(SCALER_FILE)?;
        let (vocab_path, vocab_bytes) = self.read(VOCABULARY_FILE)?;

        let model: ModelFile = parse(&model_path, &model_bytes)?;
        let scaler: Scaler = parse(&scaler_path, &scaler_bytes)?;
        let classes: HashMap<String, Vec<String>> = parse(&vocab_path, &vocab_bytes)?;

        if let Some(names) = model.feature_names() {
            check_feature_names(names)?;
        }

        let fingerprint = fingerprint(&[
            (MODEL_FILE, model_bytes.as_slice()),
            (SCALER_FILE, scaler_bytes.as_slice()),
            (VOCABULARY_FILE, vocab_bytes.as_slice()),
        ]);
        let classifier = model.into_classifier()?;
        let vocabularies = VocabularyStore::new(&classes)?;

        info!(
            dir = %self.dir.display(),
            model = classifier.kind(),
            fingerprint = %fingerprint,
            "Loaded risk model artifacts"
        );

        Artifacts::new(scaler, classifier, vocabularies, fingerprint)
    }
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path, bytes: &[u8]) -> ArtifactResult<T> {
    serde_json::from_slice(bytes).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// The model must list features in exactly the pipeline's order.
fn check_feature_names(names: &[String]) -> ArtifactResult<()> {
    let same_order = names.len() == FEATURE_NAMES.len()
        && names.iter().zip(FEATURE_NAMES).all(|(a, b)| a.as_str() == b);
    if !same_order {
        return Err(ArtifactError::Invalid(format!(
            "model feature order {:?} does not match pipeline order {:?}",
            names, FEATURE_NAMES
        )));
    }
    Ok(())
}

/// SHA-256 over named byte blobs, in the order given.
pub fn fingerprint(parts: &[(&str, &[u8])]) -> String {
    let mut hasher = Sha256::new();
    for (name, bytes) in parts {
        hasher.update(name.as_bytes());
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hex::encode(hasher.finalize())
}
