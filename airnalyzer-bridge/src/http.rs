/**
 * API HTTP AIRNALYZER - Surface REST + flux temps réel du bridge
 *
 * ROUTES :
 * - GET  /health          → "ok"
 * - GET  /system/health   → état du lien série, reconnexions, abonnés
 * - GET  /stream          → Server-Sent Events, un événement par ligne ingérée
 * - GET  /api/latest      → snapshot + 100 dernières lignes + horodatage
 * - GET  /api/ports       → ports série visibles
 * - POST /predict         → assemblage des features + appel du classifieur externe
 *
 * Les handlers ne touchent jamais le port série directement : ils lisent le
 * BridgeContext alimenté par le thread d'ingestion.
 */

use crate::classifier::Classifier;
use crate::predict::{assemble, PredictRequest};
use crate::models::{now_rfc3339, TransportCandidate};
use crate::state::BridgeContext;
use crate::transport::TransportBackend;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, warn};

pub const LATEST_LINES: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub ctx: BridgeContext,
    pub backend: Arc<dyn TransportBackend>,
    pub classifier: Option<Arc<dyn Classifier>>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/stream", get(stream_events))
        .route("/api/latest", get(get_latest))
        .route("/api/ports", get(list_ports))
        .route("/predict", post(predict))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<crate::health::BridgeHealth> {
    Json(app.ctx.health.get_health(app.ctx.hub.subscriber_count()))
}

// GET /stream
async fn stream_events(
    State(app): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = app.ctx.subscribe();
    // the subscription lives inside the stream: client gone → stream dropped → unsubscribed
    let events = stream::unfold(subscription, |mut sub| async move {
        let msg = sub.recv().await?;
        let event = Event::default()
            .event(msg.event.as_str())
            .json_data(&*msg)
            .unwrap_or_else(|e| Event::default().comment(format!("unserializable message: {e}")));
        Some((Ok(event), sub))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

// GET /api/latest
async fn get_latest(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "snapshot": app.ctx.snapshot.current(),
        "lines": app.ctx.raw_lines.recent(LATEST_LINES),
        "ts": now_rfc3339(),
    }))
}

// GET /api/ports
async fn list_ports(
    State(app): State<AppState>,
) -> Result<Json<Vec<TransportCandidate>>, (StatusCode, Json<serde_json::Value>)> {
    let backend = app.backend.clone();
    let listed = tokio::task::spawn_blocking(move || backend.enumerate()).await;
    match listed {
        Ok(Ok(ports)) => Ok(Json(ports)),
        Ok(Err(e)) => {
            warn!("port listing failed: {e}");
            Err((StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": e.to_string()}))))
        }
        Err(e) => {
            error!("port listing task crashed: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "port listing failed"})),
            ))
        }
    }
}

// POST /predict
async fn predict(State(app): State<AppState>, Json(req): Json<PredictRequest>) -> Response {
    let snapshot = app.ctx.snapshot.current();
    let features = match assemble(&req, &snapshot) {
        Ok(features) => features,
        Err(e) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": e.to_string(),
                    "key": e.key(),
                    "snapshot": e.snapshot(),
                })),
            )
                .into_response();
        }
    };

    let Some(classifier) = app.classifier.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "classifier not configured"})),
        )
            .into_response();
    };

    match classifier.classify(&features).await {
        Ok(prediction) => Json(prediction).into_response(),
        Err(e) => {
            // detail stays in the operator log
            error!("prediction failed: {e:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "prediction failed"})),
            )
                .into_response()
        }
    }
}
