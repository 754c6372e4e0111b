//! Classifier input assembly.
//!
//! The vector layout below is the input layout the model was trained on.
//! Reordering it does not fail loudly, it just produces wrong diagnoses.

use crate::models::{MetricSnapshot, SensorKey};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use time::OffsetDateTime;

/// Added to every ratio denominator.
pub const EPSILON: f64 = 1e-6;

pub const FEATURE_COUNT: usize = 21;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "Age",
    "Sex",
    "Smoker",
    "Cough",
    "Fatigue",
    "Fever",
    "Shortness_of_breath",
    "Hour_Of_Day",
    "Temperature",
    "Humidity",
    "Acetone",
    "Ammonia",
    "CO",
    "CO2",
    "H2S",
    "Acetone_Ammonia_Ratio",
    "CO_CO2_Ratio",
    "H2S_Ammonia_Ratio",
    "Total_VOC",
    "Mean_Gases",
    "Std_Gases",
];

/// Body of `POST /predict`. Every field is optional; numbers, numeric strings
/// and booleans are all accepted. `null` or `""` count as absent, anything else
/// that is not a number is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PredictRequest {
    #[serde(rename = "Age", alias = "age", deserialize_with = "number")]
    pub age: Option<f64>,
    #[serde(rename = "Sex", alias = "sex", deserialize_with = "number")]
    pub sex: Option<f64>,
    #[serde(rename = "Smoker", alias = "smoker", deserialize_with = "number")]
    pub smoker: Option<f64>,
    #[serde(rename = "Cough", alias = "cough", deserialize_with = "number")]
    pub cough: Option<f64>,
    #[serde(rename = "Fatigue", alias = "fatigue", deserialize_with = "number")]
    pub fatigue: Option<f64>,
    #[serde(rename = "Fever", alias = "fever", deserialize_with = "number")]
    pub fever: Option<f64>,
    #[serde(
        rename = "Shortness_of_breath",
        alias = "shortness_of_breath",
        deserialize_with = "number"
    )]
    pub shortness_of_breath: Option<f64>,
    #[serde(
        rename = "Hour_Of_Day",
        alias = "hour_of_day",
        alias = "hour",
        deserialize_with = "number"
    )]
    pub hour_of_day: Option<f64>,
}

fn number<'de, D>(de: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(de)?;
    match &value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::Bool(b) => Ok(Some(if *b { 1.0 } else { 0.0 })),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "true" | "yes" | "on" => Ok(Some(1.0)),
            "false" | "no" | "off" => Ok(Some(0.0)),
            other => other
                .parse::<f64>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("expected a number, got {value}"))),
        },
        Value::Array(_) | Value::Object(_) => {
            Err(D::Error::custom(format!("expected a number, got {value}")))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("missing sensor value: {key}")]
    Missing { key: SensorKey, snapshot: MetricSnapshot },
    #[error("sensor value for {key} is not a finite number")]
    NotFinite { key: SensorKey, snapshot: MetricSnapshot },
}

impl ValidationError {
    pub fn key(&self) -> SensorKey {
        match self {
            ValidationError::Missing { key, .. } | ValidationError::NotFinite { key, .. } => *key,
        }
    }

    pub fn snapshot(&self) -> &MetricSnapshot {
        match self {
            ValidationError::Missing { snapshot, .. }
            | ValidationError::NotFinite { snapshot, .. } => snapshot,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

}

/// Sensor values in `SensorKey::ALL` order, or the first missing/non-finite key.
fn sensor_values(snapshot: &MetricSnapshot) -> Result<[f64; 7], ValidationError> {
    let mut out = [0.0; 7];
    for (slot, key) in out.iter_mut().zip(SensorKey::ALL) {
        let value = snapshot.get(key).ok_or_else(|| ValidationError::Missing {
            key,
            snapshot: snapshot.clone(),
        })?;
        if !value.is_finite() {
            return Err(ValidationError::NotFinite {
                key,
                snapshot: snapshot.clone(),
            });
        }
        *slot = value;
    }
    Ok(out)
}

pub fn assemble(
    request: &PredictRequest,
    snapshot: &MetricSnapshot,
) -> Result<FeatureVector, ValidationError> {
    let [temperature, humidity, acetone, ammonia, co, co2, h2s] = sensor_values(snapshot)?;

    let gases = [acetone, ammonia, co, co2, h2s];
    let mean = gases.iter().sum::<f64>() / gases.len() as f64;
    let variance = gases.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gases.len() as f64;

    let hour = request
        .hour_of_day
        .unwrap_or_else(|| f64::from(OffsetDateTime::now_utc().hour()));

    Ok(FeatureVector {
        values: [
            request.age.unwrap_or(0.0),
            request.sex.unwrap_or(0.0),
            request.smoker.unwrap_or(0.0),
            request.cough.unwrap_or(0.0),
            request.fatigue.unwrap_or(0.0),
            request.fever.unwrap_or(0.0),
            request.shortness_of_breath.unwrap_or(0.0),
            hour,
            temperature,
            humidity,
            acetone,
            ammonia,
            co,
            co2,
            h2s,
            acetone / (ammonia + EPSILON),
            co / (co2 + EPSILON),
            h2s / (ammonia + EPSILON),
            acetone + ammonia + co + h2s,
            mean,
            variance.sqrt(),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_snapshot() -> MetricSnapshot {
        let mut snap = MetricSnapshot::default();
        for (key, value) in [
            (SensorKey::Temperature, 36.9),
            (SensorKey::Humidity, 31.2),
            (SensorKey::Acetone, 0.31),
            (SensorKey::Ammonia, 0.021),
            (SensorKey::Co, 0.52),
            (SensorKey::Co2, 405.0),
            (SensorKey::H2s, 0.0041),
        ] {
            snap.set(key, value);
        }
        snap
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_full_vector_layout() {
        let req: PredictRequest =
            serde_json::from_value(json!({"Age": 40, "Sex": 1, "Smoker": 0, "Hour_Of_Day": 14})).unwrap();
        let fv = assemble(&req, &sample_snapshot()).unwrap();

        assert_eq!(fv.values().len(), FEATURE_COUNT);
        assert_eq!(&fv.values()[..8], &[40.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 14.0]);
        assert_eq!(&fv.values()[8..15], &[36.9, 31.2, 0.31, 0.021, 0.52, 405.0, 0.0041]);

        assert!(close(fv.get("Acetone_Ammonia_Ratio").unwrap(), 0.31 / (0.021 + EPSILON)));
        assert!(close(fv.get("CO_CO2_Ratio").unwrap(), 0.52 / (405.0 + EPSILON)));
        assert!(close(fv.get("H2S_Ammonia_Ratio").unwrap(), 0.0041 / (0.021 + EPSILON)));
        assert!(close(fv.get("Total_VOC").unwrap(), 0.31 + 0.021 + 0.52 + 0.0041));

        let gases = [0.31, 0.021, 0.52, 405.0, 0.0041];
        let mean = gases.iter().sum::<f64>() / 5.0;
        let std = (gases.iter().map(|g| (g - mean) * (g - mean)).sum::<f64>() / 5.0).sqrt();
        assert!(close(fv.get("Mean_Gases").unwrap(), mean));
        assert!(close(fv.get("Std_Gases").unwrap(), std));
    }

    #[test]
    fn test_missing_key_is_named() {
        let mut snap = sample_snapshot();
        snap.remove(SensorKey::Co2);
        let err = assemble(&PredictRequest::default(), &snap).unwrap_err();
        assert_eq!(err.key(), SensorKey::Co2);
        assert_eq!(err.to_string(), "missing sensor value: CO2");
        assert_eq!(err.snapshot().len(), 6);
    }

    #[test]
    fn test_first_invalid_key_wins() {
        let mut snap = sample_snapshot();
        snap.set(SensorKey::H2s, f64::INFINITY);
        snap.set(SensorKey::Humidity, f64::NAN);
        let err = assemble(&PredictRequest::default(), &snap).unwrap_err();
        assert!(matches!(err, ValidationError::NotFinite { key: SensorKey::Humidity, .. }));
    }

    #[test]
    fn test_defaults_when_fields_absent() {
        let fv = assemble(&PredictRequest::default(), &sample_snapshot()).unwrap();
        assert_eq!(&fv.values()[..7], &[0.0; 7]);
        let hour = fv.get("Hour_Of_Day").unwrap();
        assert!((0.0..24.0).contains(&hour));
    }

    #[test]
    fn test_request_accepts_form_style_values() {
        let req: PredictRequest = serde_json::from_value(json!({
            "age": "52",
            "sex": "0",
            "smoker": "1",
            "cough": true,
            "fatigue": false,
            "shortness_of_breath": "yes",
            "fever": null,
        }))
        .unwrap();
        assert_eq!(req.age, Some(52.0));
        assert_eq!(req.smoker, Some(1.0));
        assert_eq!(req.cough, Some(1.0));
        assert_eq!(req.fatigue, Some(0.0));
        assert_eq!(req.shortness_of_breath, Some(1.0));
        assert_eq!(req.fever, None);
        assert_eq!(req.hour_of_day, None);
    }

    #[test]
    fn test_invalid_request_values_are_rejected() {
        for body in [
            json!({"Age": "forty"}),
            json!({"Sex": [1]}),
            json!({"Smoker": {"x": 1}}),
            json!({"Age": 40, "Hour_Of_Day": "noon"}),
        ] {
            let parsed = serde_json::from_value::<PredictRequest>(body.clone());
            assert!(parsed.is_err(), "accepted {body}");
        }

        let err = serde_json::from_value::<PredictRequest>(json!({"Age": "forty"})).unwrap_err();
        assert!(err.to_string().contains("expected a number"));
    }

    #[test]
    fn test_empty_values_count_as_absent() {
        let req: PredictRequest =
            serde_json::from_value(json!({"Age": "", "Sex": null, "Smoker": " 1 "})).unwrap();
        assert_eq!(req.age, None);
        assert_eq!(req.sex, None);
        assert_eq!(req.smoker, Some(1.0));
    }

    #[test]
    fn test_zero_ammonia_does_not_divide_by_zero() {
        let mut snap = sample_snapshot();
        snap.set(SensorKey::Ammonia, 0.0);
        let fv = assemble(&PredictRequest::default(), &snap).unwrap();
        assert!(fv.values().iter().all(|v| v.is_finite()));
    }
}
