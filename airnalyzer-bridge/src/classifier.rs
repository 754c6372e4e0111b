//! Client side of the external diagnosis model.
//!
//! The bridge never runs the network itself: it posts the assembled vector to
//! an inference endpoint and maps the reply onto a label.

use crate::predict::{FeatureVector, FEATURE_NAMES};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output classes in label-encoder order (alphabetical), i.e. the order of the
/// model's softmax outputs.
pub const CLASS_LABELS: [&str; 7] = [
    "Asthma",
    "COPD",
    "Diabetes",
    "Liver Dysfunction",
    "Lung Infection",
    "Normal",
    "Unclear",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub diagnosis: String,
    pub confidence: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("inference request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected inference reply: {0}")]
    BadReply(String),
}

pub trait Classifier: Send + Sync {
    fn classify<'a>(
        &'a self,
        features: &'a FeatureVector,
    ) -> BoxFuture<'a, Result<Prediction, ClassifierError>>;
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    features: &'a [f64],
    feature_names: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceReply {
    Probabilities { probabilities: Vec<f32> },
    Label { label: String, confidence: f32 },
}

/// Index and score of the most likely class.
pub fn pick_class(probabilities: &[f32]) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, p)| p.is_finite())
        .fold(None, |best, (i, p)| match best {
            Some((_, bp)) if bp >= p => best,
            _ => Some((i, p)),
        })
}

fn interpret(reply: InferenceReply) -> Result<Prediction, ClassifierError> {
    match reply {
        InferenceReply::Label { label, confidence } => Ok(Prediction {
            diagnosis: label,
            confidence,
        }),
        InferenceReply::Probabilities { probabilities } => {
            if probabilities.len() != CLASS_LABELS.len() {
                return Err(ClassifierError::BadReply(format!(
                    "expected {} probabilities, got {}",
                    CLASS_LABELS.len(),
                    probabilities.len()
                )));
            }
            let (index, confidence) = pick_class(&probabilities)
                .ok_or_else(|| ClassifierError::BadReply("no finite probability".into()))?;
            Ok(Prediction {
                diagnosis: CLASS_LABELS[index].to_string(),
                confidence,
            })
        }
    }
}

pub struct RemoteClassifier {
    client: reqwest::Client,
    url: String,
}

impl RemoteClassifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Classifier for RemoteClassifier {
    fn classify<'a>(
        &'a self,
        features: &'a FeatureVector,
    ) -> BoxFuture<'a, Result<Prediction, ClassifierError>> {
        Box::pin(async move {
            let body = InferenceRequest {
                features: features.values(),
                feature_names: &FEATURE_NAMES,
            };
            let reply: InferenceReply = self
                .client
                .post(&self.url)
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            interpret(reply)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pick_class() {
        assert_eq!(pick_class(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(pick_class(&[0.5, 0.5]), Some((0, 0.5)));
        assert_eq!(pick_class(&[f32::NAN, 0.3]), Some((1, 0.3)));
        assert_eq!(pick_class(&[]), None);
    }

    #[test]
    fn test_probabilities_reply() {
        let reply: InferenceReply = serde_json::from_value(json!({
            "probabilities": [0.01, 0.02, 0.05, 0.02, 0.05, 0.8, 0.05]
        }))
        .unwrap();
        let p = interpret(reply).unwrap();
        assert_eq!(p.diagnosis, "Normal");
        assert!((p.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_label_reply() {
        let reply: InferenceReply =
            serde_json::from_value(json!({"label": "Asthma", "confidence": 0.66})).unwrap();
        assert_eq!(interpret(reply).unwrap().diagnosis, "Asthma");
    }

    #[test]
    fn test_wrong_class_count() {
        let reply: InferenceReply =
            serde_json::from_value(json!({"probabilities": [0.5, 0.5]})).unwrap();
        assert!(matches!(interpret(reply), Err(ClassifierError::BadReply(_))));
    }
}
