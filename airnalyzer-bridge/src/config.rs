use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BridgeConfig {
    pub serial: SerialConf,
    pub http: HttpConf,
    pub classifier: ClassifierConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SerialConf {
    pub baud: u32,
    /// Forced device (ex: "/dev/ttyUSB0", "COM3"). Disables auto-scan.
    pub port: Option<String>,
    /// Case-insensitive substrings that rank a device first during auto-scan.
    pub hints: Vec<String>,
    pub probe_window_ms: u64,
    pub read_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ClassifierConf {
    /// Inference endpoint; `/predict` answers 503 when unset.
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for SerialConf {
    fn default() -> Self {
        Self {
            baud: 115_200,
            port: None,
            hints: [
                "usb", "uart", "acm", "cp210", "ch340", "ch910", "ftdi", "arduino", "esp32",
                "silicon labs", "wch",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            probe_window_ms: 3_500,
            read_timeout_ms: 1_000,
            retry_delay_ms: 3_000,
            reconnect_delay_ms: 1_000,
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:5000".into() }
    }
}

impl Default for ClassifierConf {
    fn default() -> Self {
        Self { url: None, timeout_ms: 5_000 }
    }
}

impl SerialConf {
    pub fn probe_window(&self) -> Duration {
        Duration::from_millis(self.probe_window_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl BridgeConfig {
    /// AIRNALYZER_BAUD, AIRNALYZER_PORT, AIRNALYZER_BIND, AIRNALYZER_CLASSIFIER_URL
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(baud) = lookup("AIRNALYZER_BAUD") {
            match baud.trim().parse::<u32>() {
                Ok(b) => self.serial.baud = b,
                Err(_) => warn!("ignoring invalid AIRNALYZER_BAUD={baud}"),
            }
        }
        if let Some(port) = lookup("AIRNALYZER_PORT") {
            let port = port.trim();
            self.serial.port = (!port.is_empty()).then(|| port.to_string());
        }
        if let Some(bind) = lookup("AIRNALYZER_BIND") {
            self.http.bind = bind;
        }
        if let Some(url) = lookup("AIRNALYZER_CLASSIFIER_URL") {
            let url = url.trim();
            self.classifier.url = (!url.is_empty()).then(|| url.to_string());
        }
    }
}

pub async fn load_config_from(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    if txt.trim().is_empty() {
        return Ok(BridgeConfig::default());
    }
    Ok(serde_yaml::from_str(&txt)?)
}

/// File (AIRNALYZER_CONFIG, default `bridge.yaml`) then environment.
/// Never fails: a missing or broken file falls back to defaults.
pub async fn load_config() -> BridgeConfig {
    let path = std::env::var("AIRNALYZER_CONFIG").unwrap_or_else(|_| "bridge.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        load_config_from(Path::new(&path)).await.unwrap_or_else(|e| {
            warn!("{e}, using defaults");
            BridgeConfig::default()
        })
    } else {
        info!("no {path}, using default config");
        BridgeConfig::default()
    };
    cfg.apply_env_overrides(|key| std::env::var(key).ok());
    cfg
}
