//! Statistical scorer — pretrained classifier inference.
//!
//! The model artifact is a versioned, immutable JSON blob loaded once
//! at pipeline build time and shared read-only across all workers.
//! A missing or corrupt artifact prevents the pipeline from starting
//! (fail-closed): silently skipping the model would change the
//! business risk tolerance, so degraded scoring is never an option.

use crate::error::{RiskError, RiskResult};
use crate::features::{FeatureVector, FEATURE_NAMES};
use serde::Deserialize;

/// The inference contract every scorer fulfills. Implementations must
/// be deterministic: the same feature vector and the same version
/// always yield the same score.
pub trait FraudScorer: Send + Sync {
    /// Model version identifier, recorded with every score produced.
    fn version(&self) -> &str;

    /// Fraud probability in [0, 1] for one feature vector.
    fn score(&self, features: &FeatureVector) -> RiskResult<f64>;
}

/// On-disk shape of the trained model artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub feature_names: Vec<String>,
    /// Standardization parameters from the training set.
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

/// Logistic-regression classifier over standardized features.
#[derive(Debug)]
pub struct LogisticModel {
    artifact: ModelArtifact,
}

impl LogisticModel {
    /// Load and validate the artifact. Every failure here is fatal;
    /// the caller must refuse to serve jobs.
    pub fn load(path: &str) -> RiskResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RiskError::ModelLoad(format!("cannot read {path}: {e}")))?;
        let artifact: ModelArtifact = serde_json::from_str(&content)
            .map_err(|e| RiskError::ModelLoad(format!("corrupt artifact {path}: {e}")))?;
        let model = Self::from_artifact(artifact)?;
        log::info!(
            "model loaded: version={} features={}",
            model.version(),
            model.artifact.feature_names.len()
        );
        Ok(model)
    }

    pub fn from_artifact(artifact: ModelArtifact) -> RiskResult<Self> {
        let n = FEATURE_NAMES.len();
        let names_match = artifact.feature_names.len() == n
            && artifact
                .feature_names
                .iter()
                .zip(FEATURE_NAMES.iter())
                .all(|(a, b)| a.as_str() == *b);
        if !names_match {
            return Err(RiskError::ModelLoad(format!(
                "artifact feature names {:?} do not match the extractor's {:?}",
                artifact.feature_names, FEATURE_NAMES
            )));
        }
        if artifact.means.len() != n || artifact.stds.len() != n || artifact.coefficients.len() != n
        {
            return Err(RiskError::ModelLoad(
                "artifact parameter shapes disagree with the feature set".into(),
            ));
        }
        if artifact.stds.iter().any(|s| *s <= 0.0 || !s.is_finite()) {
            return Err(RiskError::ModelLoad(
                "artifact standardization stds must be positive".into(),
            ));
        }
        Ok(Self { artifact })
    }
}

impl FraudScorer for LogisticModel {
    fn version(&self) -> &str {
        &self.artifact.version
    }

    fn score(&self, features: &FeatureVector) -> RiskResult<f64> {
        let values = features.values();
        if values.len() != self.artifact.coefficients.len() {
            return Err(RiskError::Scoring(format!(
                "feature shape mismatch: got {} values, model expects {}",
                values.len(),
                self.artifact.coefficients.len()
            )));
        }
        let mut z = self.artifact.intercept;
        for (i, x) in values.iter().enumerate() {
            let scaled = (x - self.artifact.means[i]) / self.artifact.stds[i];
            z += self.artifact.coefficients[i] * scaled;
        }
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}
