/**
 * INGESTION LOOP - Thread dédié à la lecture série
 *
 * CYCLE : Discovering → Connected → (ReadError | StreamClosed) → Discovering,
 * avec une pause fixe (reconnect_delay) après chaque perte de lien.
 *
 * Pour chaque ligne non vide, dans l'ordre :
 *   1. RawLineBuffer  2. parse  3. merge SnapshotStore  4. publish BroadcastHub
 * Le même ParsedEvent alimente le merge et la diffusion.
 *
 * Aucun verrou n'est tenu pendant une lecture série.
 */

use crate::discovery::{DiscoverySettings, TransportDiscovery};
use crate::models::StreamMessage;
use crate::parser::{decode_line, parse_line};
use crate::state::BridgeContext;
use crate::transport::{TransportBackend, TransportError, TransportLink};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug)]
pub enum SessionEnd {
    Closed,
    Failed(TransportError),
}

pub struct IngestionLoop {
    ctx: BridgeContext,
    backend: Arc<dyn TransportBackend>,
    discovery: TransportDiscovery,
    reconnect_delay: Duration,
}

impl IngestionLoop {
    pub fn new(ctx: BridgeContext, backend: Arc<dyn TransportBackend>) -> Self {
        let settings = DiscoverySettings::from(&ctx.config.serial);
        let reconnect_delay = ctx.config.serial.reconnect_delay();
        Self {
            discovery: TransportDiscovery::new(backend.clone(), settings),
            ctx,
            backend,
            reconnect_delay,
        }
    }

    /// Runs the loop on its own OS thread for the rest of the process.
    pub fn spawn(self) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("serial-ingest".into())
            .spawn(move || self.run())
    }

    pub fn run(self) {
        loop {
            let device = self.discovery.find_transport();
            match self.backend.open(&device) {
                Ok(mut link) => {
                    info!("connected to {device}");
                    self.ctx.health.mark_connected(&device);
                    match self.run_session(link.as_mut()) {
                        SessionEnd::Closed => warn!("{device} closed the stream"),
                        SessionEnd::Failed(e) => warn!("{device}: {e}"),
                    }
                }
                Err(e) => warn!("{e}"),
            }
            self.ctx.health.mark_link_lost();
            thread::sleep(self.reconnect_delay);
        }
    }

    /// Reads until the link fails or closes.
    pub fn run_session(&self, link: &mut dyn TransportLink) -> SessionEnd {
        loop {
            match link.read_line() {
                Ok(Some(bytes)) => {
                    ingest_line(&self.ctx, &bytes);
                }
                Ok(None) => continue,
                Err(TransportError::Closed) => return SessionEnd::Closed,
                Err(e) => return SessionEnd::Failed(e),
            }
        }
    }
}

/// Records, parses, merges and publishes one line. Blank lines are dropped
/// and yield `None`.
pub fn ingest_line(ctx: &BridgeContext, bytes: &[u8]) -> Option<Arc<StreamMessage>> {
    let line = decode_line(bytes);
    if line.is_empty() {
        return None;
    }

    ctx.raw_lines.push(line.clone());
    let parsed = parse_line(&line);
    let snapshot = ctx.snapshot.merge(&parsed.metric_updates());
    let message = Arc::new(StreamMessage::line(line, parsed, snapshot));
    ctx.hub.publish(Arc::clone(&message));
    ctx.health.record_line();
    Some(message)
}
