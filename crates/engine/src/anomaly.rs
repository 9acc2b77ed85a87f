//! Consumes a serialized scaler + isolation-forest-shaped model as a
//! black box: feature row in, `{normal, anomaly}` label out. Training is
//! out of scope; this module only knows the artifact's JSON shape and how
//! to run inference over it.

use crate::features::{FeatureKey, FeatureRow};
use sentinel_core::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyLabel {
    Normal,
    Anomaly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: [f64; 5],
    pub std: [f64; 5],
}

impl Scaler {
    fn transform(&self, row: &FeatureRow) -> [f64; 5] {
        let mut values = row.as_vector();
        for i in 0..values.len() {
            let std = if self.std[i].abs() < f64::EPSILON { 1.0 } else { self.std[i] };
            values[i] = (values[i] - self.mean[i]) / std;
        }
        values
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum IsolationNode {
    Leaf { size: u32 },
    Split { feature: usize, split_value: f64, left: Box<IsolationNode>, right: Box<IsolationNode> },
}

impl IsolationNode {
    fn path_length(&self, values: &[f64; 5], depth: u32) -> f64 {
        match self {
            IsolationNode::Leaf { size } => depth as f64 + average_path_adjustment(*size),
            IsolationNode::Split { feature, split_value, left, right } => {
                if values[*feature] < *split_value {
                    left.path_length(values, depth + 1)
                } else {
                    right.path_length(values, depth + 1)
                }
            }
        }
    }
}

/// Harmonic-number approximation of the average unsuccessful search
/// path length in a binary search tree of `n` nodes, used to normalize
/// isolation-forest path lengths for leaves that still contain more
/// than one sample.
fn average_path_adjustment(n: u32) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + 0.5772156649) - 2.0 * (n - 1.0) / n
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    pub root: IsolationNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub trees: Vec<IsolationTree>,
    pub sample_size: u32,
    /// Anomaly score threshold above which a row is labeled anomalous.
    pub threshold: f64,
}

impl Model {
    fn score(&self, values: &[f64; 5]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let avg_path: f64 = self
            .trees
            .iter()
            .map(|t| t.root.path_length(values, 0))
            .sum::<f64>()
            / self.trees.len() as f64;

        let c = average_path_adjustment(self.sample_size);
        if c <= 0.0 {
            return 0.0;
        }
        2f64.powf(-avg_path / c)
    }

    fn predict(&self, values: &[f64; 5]) -> AnomalyLabel {
        if self.score(values) > self.threshold {
            AnomalyLabel::Anomaly
        } else {
            AnomalyLabel::Normal
        }
    }
}

/// Wraps the loaded scaler+model pair. Construction never fails: missing
/// or unreadable artifacts degrade to a scorer that always returns
/// `Ok(None)` (no signal) rather than blocking the pipeline.
pub struct AnomalyScorer {
    artifacts: Option<(Scaler, Model)>,
}

impl AnomalyScorer {
    pub fn load(scaler_path: Option<&str>, model_path: Option<&str>) -> Self {
        let artifacts = (|| {
            let scaler_path = scaler_path?;
            let model_path = model_path?;

            let scaler = read_json::<Scaler>(scaler_path).map_err(|e| {
                warn!("anomaly scaler not loaded from {}: {}", scaler_path, e);
            }).ok()?;
            let model = read_json::<Model>(model_path).map_err(|e| {
                warn!("anomaly model not loaded from {}: {}", model_path, e);
            }).ok()?;

            Some((scaler, model))
        })();

        Self { artifacts }
    }

    pub fn is_loaded(&self) -> bool {
        self.artifacts.is_some()
    }

    /// Scores one `(entity_id, hour_window)` row; `Ok(None)` means no
    /// signal (artifacts absent, row missing from the feature table, or
    /// inference failed) and must never block alert emission.
    pub fn score(&self, key: &FeatureKey, features: &HashMap<FeatureKey, FeatureRow>) -> Result<Option<AnomalyLabel>> {
        let Some((scaler, model)) = &self.artifacts else {
            return Ok(None);
        };
        let Some(row) = features.get(key) else {
            return Ok(None);
        };

        let scaled = scaler.transform(row);
        Ok(Some(model.predict(&scaled)))
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &str) -> Result<T> {
    let bytes = std::fs::read(Path::new(path))
        .map_err(|e| Error::missing_artifact(format!("could not read {path}: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::inference(format!("could not parse {path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifacts_degrade_to_no_signal() {
        let scorer = AnomalyScorer::load(None, None);
        assert!(!scorer.is_loaded());
        let features = HashMap::new();
        let key = ("alice".to_string(), chrono::Utc::now());
        assert_eq!(scorer.score(&key, &features).unwrap(), None);
    }

    #[test]
    fn score_above_threshold_is_anomalous() {
        let model = Model {
            trees: vec![IsolationTree { root: IsolationNode::Leaf { size: 1 } }],
            sample_size: 1,
            threshold: -1.0,
        };
        let values = [0.0; 5];
        assert_eq!(model.predict(&values), AnomalyLabel::Anomaly);
    }
}
