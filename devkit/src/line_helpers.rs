/*!
Helpers pour fabriquer des lignes telles que la carte capteurs les émet

La carte envoie une ligne JSON par lecture, entrecoupée de texte libre
(boot ROM, messages de chauffe des capteurs).
*/

use airnalyzer_bridge::models::{MetricSnapshot, SensorKey};
use serde_json::{Map, Value};

/// A plausible full reading, one value per sensor.
pub const REFERENCE_READING: [(SensorKey, f64); 7] = [
    (SensorKey::Temperature, 36.9),
    (SensorKey::Humidity, 31.2),
    (SensorKey::Acetone, 0.31),
    (SensorKey::Ammonia, 0.021),
    (SensorKey::Co, 0.52),
    (SensorKey::Co2, 405.0),
    (SensorKey::H2s, 0.0041),
];

/// Builds one JSON sensor line.
#[derive(Debug, Clone, Default)]
pub struct SensorLineBuilder {
    fields: Map<String, Value>,
}

impl SensorLineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sensor at its `REFERENCE_READING` value.
    pub fn reference() -> Self {
        REFERENCE_READING
            .iter()
            .fold(Self::new(), |builder, (key, value)| builder.metric(*key, *value))
    }

    pub fn metric(self, key: SensorKey, value: f64) -> Self {
        self.field(key.as_str(), Value::from(value))
    }

    /// Any field, including keys the bridge does not know.
    pub fn field<S: Into<String>>(mut self, name: S, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn build(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

pub fn reference_snapshot() -> MetricSnapshot {
    let mut snapshot = MetricSnapshot::default();
    snapshot.merge(&REFERENCE_READING);
    snapshot
}

/// Free text an ESP32 board prints before its first reading.
pub fn boot_banner() -> Vec<String> {
    [
        "ets Jun  8 2016 00:22:57",
        "rst:0x1 (POWERON_RESET),boot:0x13 (SPI_FAST_FLASH_BOOT)",
        "Sensors warming up...",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use airnalyzer_bridge::models::ParsedEvent;
    use airnalyzer_bridge::parser::parse_line;

    #[test]
    fn test_reference_line_parses_to_full_update() {
        let line = SensorLineBuilder::reference().build();
        let parsed = parse_line(&line);
        assert!(parsed.is_metrics());
        assert_eq!(parsed.metric_updates().len(), 7);
    }

    #[test]
    fn test_extra_fields_are_kept_in_line() {
        let line = SensorLineBuilder::new()
            .metric(SensorKey::Co2, 412.0)
            .field("uptime_ms", Value::from(1234))
            .build();
        let parsed = parse_line(&line);
        assert_eq!(parsed.metric_updates(), vec![(SensorKey::Co2, 412.0)]);
        assert!(line.contains("uptime_ms"));
    }

    #[test]
    fn test_banner_is_raw_text() {
        for line in boot_banner() {
            assert!(matches!(parse_line(&line), ParsedEvent::Raw { .. }));
        }
    }

    #[test]
    fn test_reference_snapshot_matches_reading() {
        let snapshot = reference_snapshot();
        assert_eq!(snapshot.len(), 7);
        assert_eq!(snapshot.get(SensorKey::H2s), Some(0.0041));
    }
}
