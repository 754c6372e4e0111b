use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Metrics reported by the analyzer board, in the order the classifier expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensorKey {
    Temperature,
    Humidity,
    Acetone,
    Ammonia,
    #[serde(rename = "CO")]
    Co,
    #[serde(rename = "CO2")]
    Co2,
    #[serde(rename = "H2S")]
    H2s,
}

impl SensorKey {
    pub const ALL: [SensorKey; 7] = [
        SensorKey::Temperature,
        SensorKey::Humidity,
        SensorKey::Acetone,
        SensorKey::Ammonia,
        SensorKey::Co,
        SensorKey::Co2,
        SensorKey::H2s,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKey::Temperature => "Temperature",
            SensorKey::Humidity => "Humidity",
            SensorKey::Acetone => "Acetone",
            SensorKey::Ammonia => "Ammonia",
            SensorKey::Co => "CO",
            SensorKey::Co2 => "CO2",
            SensorKey::H2s => "H2S",
        }
    }

    /// Exact, case-sensitive match on the wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known value per metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSnapshot {
    values: BTreeMap<SensorKey, f64>,
}

impl MetricSnapshot {
    /// Startup state: every metric present at 0.0.
    pub fn zeroed() -> Self {
        Self {
            values: SensorKey::ALL.into_iter().map(|k| (k, 0.0)).collect(),
        }
    }

    pub fn get(&self, key: SensorKey) -> Option<f64> {
        self.values.get(&key).copied()
    }

    pub fn set(&mut self, key: SensorKey, value: f64) {
        self.values.insert(key, value);
    }

    pub fn remove(&mut self, key: SensorKey) -> Option<f64> {
        self.values.remove(&key)
    }

    /// Last-write-wins merge; keys absent from `updates` keep their value.
    pub fn merge(&mut self, updates: &[(SensorKey, f64)]) {
        for (key, value) in updates {
            self.values.insert(*key, *value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SensorKey, f64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of parsing one line from the board.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParsedEvent {
    /// Decoded JSON object, kept whole for observers.
    Metrics { data: Map<String, Value> },
    /// Anything that is not a JSON object (boot logs, warm-up chatter...).
    Raw { text: String },
}

impl ParsedEvent {
    pub fn is_metrics(&self) -> bool {
        matches!(self, ParsedEvent::Metrics { .. })
    }

    /// Recognized sensor keys carrying a numeric value, in `SensorKey::ALL` order.
    pub fn metric_updates(&self) -> Vec<(SensorKey, f64)> {
        let ParsedEvent::Metrics { data } = self else {
            return Vec::new();
        };
        SensorKey::ALL
            .into_iter()
            .filter_map(|key| data.get(key.as_str()).and_then(numeric_value).map(|v| (key, v)))
            .collect()
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEventKind {
    Connected,
    Line,
}

impl StreamEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEventKind::Connected => "connected",
            StreamEventKind::Line => "line",
        }
    }
}

/// Unit pushed to every `/stream` subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct StreamMessage {
    pub event: StreamEventKind,
    pub ts: String,
    pub line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParsedEvent>,
    pub snapshot: MetricSnapshot,
}

impl StreamMessage {
    pub fn line(line: String, parsed: ParsedEvent, snapshot: MetricSnapshot) -> Self {
        Self {
            event: StreamEventKind::Line,
            ts: now_rfc3339(),
            line,
            parsed: Some(parsed),
            snapshot,
        }
    }

    pub fn connected(snapshot: MetricSnapshot) -> Self {
        Self {
            event: StreamEventKind::Connected,
            ts: now_rfc3339(),
            line: String::new(),
            parsed: None,
            snapshot,
        }
    }
}

/// A serial device seen during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportCandidate {
    pub device: String,
    pub description: String,
    pub hwid: String,
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensor_key_names_roundtrip() {
        for key in SensorKey::ALL {
            assert_eq!(SensorKey::from_name(key.as_str()), Some(key));
        }
        assert_eq!(SensorKey::from_name("co2"), None);
        assert_eq!(SensorKey::from_name("Pressure"), None);
    }

    #[test]
    fn test_zeroed_snapshot_has_every_key() {
        let snap = MetricSnapshot::zeroed();
        assert_eq!(snap.len(), 7);
        assert!(snap.iter().all(|(_, v)| v == 0.0));
    }

    #[test]
    fn test_snapshot_serializes_with_wire_names() {
        let mut snap = MetricSnapshot::default();
        snap.set(SensorKey::Co2, 405.0);
        snap.set(SensorKey::H2s, 0.004);
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v, json!({"CO2": 405.0, "H2S": 0.004}));
    }

    #[test]
    fn test_metric_updates_filters_unknown_and_non_numeric() {
        let Value::Object(data) = json!({
            "Temperature": 37.1,
            "CO": "0.52",
            "Humidity": null,
            "Battery": 88,
        }) else {
            unreachable!()
        };
        let event = ParsedEvent::Metrics { data };
        assert_eq!(
            event.metric_updates(),
            vec![(SensorKey::Temperature, 37.1), (SensorKey::Co, 0.52)]
        );
    }

    #[test]
    fn test_parsed_event_tagging() {
        let raw = ParsedEvent::Raw { text: "boot".into() };
        assert_eq!(serde_json::to_value(&raw).unwrap(), json!({"kind": "raw", "text": "boot"}));
        assert!(raw.metric_updates().is_empty());
    }

    #[test]
    fn test_connected_message_omits_parsed() {
        let msg = StreamMessage::connected(MetricSnapshot::zeroed());
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["event"], "connected");
        assert!(v.get("parsed").is_none());
        assert_eq!(v["snapshot"]["Temperature"], 0.0);
        assert!(v["ts"].as_str().unwrap().ends_with('Z'));
    }
}
