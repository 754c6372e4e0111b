//! Serial device discovery.
//!
//! - Forced device (config/env): probe only that one, forever.
//! - Otherwise enumerate, rank devices matching a hint first, probe in order.
//! - A probe succeeds when the device produces any byte within the peek window.

use crate::config::SerialConf;
use crate::models::TransportCandidate;
use crate::transport::TransportBackend;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Detected,
    NotDetected,
}

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub forced_device: Option<String>,
    pub hints: Vec<String>,
    pub probe_window: Duration,
    pub retry_delay: Duration,
}

impl From<&SerialConf> for DiscoverySettings {
    fn from(conf: &SerialConf) -> Self {
        Self {
            forced_device: conf.port.clone(),
            hints: conf.hints.clone(),
            probe_window: conf.probe_window(),
            retry_delay: conf.retry_delay(),
        }
    }
}

pub struct TransportDiscovery {
    backend: Arc<dyn TransportBackend>,
    settings: DiscoverySettings,
}

impl TransportDiscovery {
    pub fn new(backend: Arc<dyn TransportBackend>, settings: DiscoverySettings) -> Self {
        Self { backend, settings }
    }

    /// Blocks until a device produces data and returns its identifier.
    pub fn find_transport(&self) -> String {
        if let Some(device) = &self.settings.forced_device {
            info!("forced serial device {device}, auto-scan disabled");
            loop {
                if self.probe(device) == ProbeOutcome::Detected {
                    return device.clone();
                }
                debug!("forced device {device} silent, retrying");
                thread::sleep(self.settings.retry_delay);
            }
        }

        loop {
            if let Some(device) = self.scan_once() {
                return device;
            }
            debug!("no serial device is talking, next scan in {:?}", self.settings.retry_delay);
            thread::sleep(self.settings.retry_delay);
        }
    }

    /// One enumerate-rank-probe pass.
    pub fn scan_once(&self) -> Option<String> {
        let candidates = match self.backend.enumerate() {
            Ok(list) => list,
            Err(e) => {
                warn!("{e}");
                Vec::new()
            }
        };
        rank_candidates(candidates, &self.settings.hints)
            .into_iter()
            .find(|c| self.probe(&c.device) == ProbeOutcome::Detected)
            .map(|c| {
                info!("serial device {} ({}) is sending data", c.device, c.description);
                c.device
            })
    }

    /// Open, peek, close. Any transport error counts as `NotDetected`.
    pub fn probe(&self, device: &str) -> ProbeOutcome {
        let mut link = match self.backend.open(device) {
            Ok(link) => link,
            Err(e) => {
                debug!("probe {device}: {e}");
                return ProbeOutcome::NotDetected;
            }
        };
        match link.has_data_within(self.settings.probe_window) {
            Ok(true) => ProbeOutcome::Detected,
            Ok(false) => ProbeOutcome::NotDetected,
            Err(e) => {
                debug!("probe {device}: {e}");
                ProbeOutcome::NotDetected
            }
        }
    }
}

/// Hinted devices first, then the rest; enumeration order kept inside each group.
pub fn rank_candidates(
    candidates: Vec<TransportCandidate>,
    hints: &[String],
) -> Vec<TransportCandidate> {
    let (mut hinted, rest): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|c| matches_hint(c, hints));
    hinted.extend(rest);
    hinted
}

fn matches_hint(candidate: &TransportCandidate, hints: &[String]) -> bool {
    let text = format!("{} {}", candidate.description, candidate.hwid).to_lowercase();
    hints
        .iter()
        .any(|h| !h.is_empty() && text.contains(&h.to_lowercase()))
}
