/**
 * AIRNALYZER BRIDGE - Point d'entrée du serveur
 *
 * RÔLE : bootstrap config → contexte partagé → thread d'ingestion série →
 * classifieur externe (optionnel) → API HTTP/SSE.
 */

use airnalyzer_bridge::classifier::{Classifier, RemoteClassifier};
use airnalyzer_bridge::config::load_config;
use airnalyzer_bridge::http::{build_router, AppState};
use airnalyzer_bridge::ingest::IngestionLoop;
use airnalyzer_bridge::transport::{SerialBackend, TransportBackend};
use airnalyzer_bridge::BridgeContext;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("airnalyzer_bridge=info")),
        )
        .init();

    // lue une seule fois, figée pour toute la durée du process
    let cfg = Arc::new(load_config().await);
    match &cfg.serial.port {
        Some(port) => info!("serial: {port} @ {} baud (forced)", cfg.serial.baud),
        None => info!("serial: auto-scan @ {} baud", cfg.serial.baud),
    }

    let ctx = BridgeContext::new(cfg.clone());
    let backend: Arc<dyn TransportBackend> = Arc::new(SerialBackend::new(
        cfg.serial.baud,
        cfg.serial.read_timeout(),
    ));

    IngestionLoop::new(ctx.clone(), backend.clone())
        .spawn()
        .context("failed to start the serial ingestion thread")?;

    let classifier: Option<Arc<dyn Classifier>> = match &cfg.classifier.url {
        Some(url) => {
            let remote = RemoteClassifier::new(
                url.clone(),
                Duration::from_millis(cfg.classifier.timeout_ms),
            )
            .context("failed to build the classifier client")?;
            info!("classifier: {url}");
            Some(Arc::new(remote) as Arc<dyn Classifier>)
        }
        None => {
            warn!("no classifier configured, /predict will answer 503");
            None
        }
    };

    let app = build_router(AppState {
        ctx,
        backend,
        classifier,
    });

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("cannot bind {}", cfg.http.bind))?;
    info!("listening on http://{}", cfg.http.bind);
    axum::serve(listener, app).await.context("http server stopped")?;
    Ok(())
}
