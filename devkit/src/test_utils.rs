/*!
Test Harness pour le bridge Airnalyzer

Facilite l'écriture de tests de bout en bout avec :
- un BridgeContext aux délais raccourcis
- le backend série simulé branché derrière la découverte et l'ingestion
- des attentes bornées dans le temps sur les compteurs et les abonnements
*/

use crate::serial_stub::MockSerialBackend;
use airnalyzer_bridge::config::BridgeConfig;
use airnalyzer_bridge::discovery::{DiscoverySettings, TransportDiscovery};
use airnalyzer_bridge::health::BridgeHealth;
use airnalyzer_bridge::hub::Subscription;
use airnalyzer_bridge::ingest::{ingest_line, IngestionLoop};
use airnalyzer_bridge::models::StreamMessage;
use airnalyzer_bridge::transport::TransportBackend;
use airnalyzer_bridge::BridgeContext;
use anyhow::Result;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Harness de test complet pour le bridge
pub struct TestHarness {
    pub ctx: BridgeContext,
    pub backend: MockSerialBackend,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Self::fast_config())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        env_logger::try_init().ok();

        Self {
            ctx: BridgeContext::new(Arc::new(config)),
            backend: MockSerialBackend::new(),
        }
    }

    /// Default config with every serial delay cut to a few milliseconds.
    pub fn fast_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.serial.probe_window_ms = 10;
        config.serial.read_timeout_ms = 5;
        config.serial.retry_delay_ms = 5;
        config.serial.reconnect_delay_ms = 5;
        config
    }

    pub fn backend_handle(&self) -> Arc<dyn TransportBackend> {
        Arc::new(self.backend.clone())
    }

    pub fn discovery(&self) -> TransportDiscovery {
        TransportDiscovery::new(
            self.backend_handle(),
            DiscoverySettings::from(&self.ctx.config.serial),
        )
    }

    /// Starts the real ingestion thread against the mock backend. It never
    /// returns; script the devices to end on `Silent` or `Unplugged`.
    pub fn start_ingestion(&self) -> Result<thread::JoinHandle<()>> {
        let handle = IngestionLoop::new(self.ctx.clone(), self.backend_handle()).spawn()?;
        log::info!("🚀 ingestion thread started");
        Ok(handle)
    }

    pub fn ingest(&self, line: &str) -> Option<Arc<StreamMessage>> {
        ingest_line(&self.ctx, line.as_bytes())
    }

    /// Returns how many lines were published (blank ones are not).
    pub fn ingest_all<I, S>(&self, lines: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .filter_map(|line| self.ingest(line.as_ref()))
            .count()
    }

    pub fn health(&self) -> BridgeHealth {
        self.ctx.health.get_health(self.ctx.hub.subscriber_count())
    }

    /// Polls `condition` until it holds or `timeout_ms` elapses.
    pub async fn wait_until<F>(&self, what: &str, timeout_ms: u64, condition: F) -> Result<()>
    where
        F: Fn(&TestHarness) -> bool,
    {
        let start = Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if condition(self) {
                log::info!("✅ {}", what);
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        log::warn!("⏰ Timeout waiting for {}", what);
        anyhow::bail!("timeout after {}ms waiting for {}", timeout_ms, what);
    }

    pub async fn wait_for_lines(&self, count: u64, timeout_ms: u64) -> Result<()> {
        self.wait_until(&format!("{count} ingested lines"), timeout_ms, |h| {
            h.ctx.health.lines_ingested() >= count
        })
        .await
    }

    pub async fn next_message(
        subscription: &mut Subscription,
        timeout_ms: u64,
    ) -> Result<Arc<StreamMessage>> {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), subscription.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => anyhow::bail!("subscription closed by the hub"),
            Err(_) => anyhow::bail!("no message within {}ms", timeout_ms),
        }
    }

    /// Everything already sitting in the mailbox.
    pub fn drain(subscription: &mut Subscription) -> Vec<Arc<StreamMessage>> {
        std::iter::from_fn(|| subscription.try_recv()).collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
