//! # HTTP surface
//!
//! | Path         | Description                                      |
//! |--------------|--------------------------------------------------|
//! | `/audio.mp3` | Live MP3 stream, one distributor session per request |
//! | `/status`    | JSON [`BridgeStatus`]                            |
//! | `/health`    | `200` when every component is healthy, else `503` |
//! | `/`          | Landing page with a player                       |
//!
//! Each stream request gets its own session thread in the distributor. That
//! thread hands chunks to the response body through a bounded channel, so a
//! slow client only ever backs up its own session.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

use audio_bridge_core::{AudioBridge, BridgeStatus, ClientSink, Delivery};

/// Chunks buffered between a session thread and its response body.
const CHANNEL_DEPTH: usize = 32;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Bluetooth Audio Bridge</title></head>
<body>
<h1>Bluetooth Audio Bridge</h1>
<audio controls preload="none" src="/audio.mp3"></audio>
<ul>
<li><a href="/audio.mp3">/audio.mp3</a> live stream</li>
<li><a href="/status">/status</a> bridge status</li>
<li><a href="/health">/health</a> health check</li>
</ul>
</body>
</html>
"#;

/// Shared state passed to all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Mutex<AudioBridge>>,
}

pub fn router(bridge: Arc<Mutex<AudioBridge>>) -> Router {
    Router::new()
        .route("/audio.mp3", get(stream_audio))
        .route("/status", get(status))
        .route("/health", get(health))
        .route("/", get(index))
        .with_state(AppState { bridge })
}

/// [`ClientSink`] feeding one HTTP response body.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

impl ClientSink for ChannelSink {
    fn try_deliver(&mut self, chunk: Vec<u8>) -> Delivery {
        match self.tx.try_send(Bytes::from(chunk)) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(bytes)) => Delivery::Busy(Vec::from(bytes)),
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

async fn stream_audio(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>) -> Response {
    let distributor = Arc::clone(state.bridge.lock().distributor());
    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_DEPTH);

    if let Err(e) = distributor.open_session(&addr.ip().to_string(), Box::new(ChannelSink::new(tx))) {
        log::warn!("[HTTP] Rejected stream request from {}: {}", addr, e);
        return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
    }
    log::info!("[HTTP] Streaming to {}", addr);

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "close"),
        ],
        body,
    )
        .into_response()
}

async fn status(State(state): State<AppState>) -> Json<BridgeStatus> {
    Json(state.bridge.lock().status())
}

async fn health(State(state): State<AppState>) -> Response {
    let status = state.bridge.lock().status();
    health_response(&status).into_response()
}

fn health_response(status: &BridgeStatus) -> (StatusCode, Json<serde_json::Value>) {
    if status.is_healthy() {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "active_clients": status.active_clients,
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "serving_fallback": status.serving_fallback,
                "components": status.components,
            })),
        )
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[cfg(test)]
mod tests {
    use audio_bridge_core::{
        BitrateStatus, BufferStatus, ComponentHealth, ComponentKind, ComponentStatus, QualityMetrics,
    };

    use super::*;

    fn status_with(health: ComponentHealth) -> BridgeStatus {
        BridgeStatus {
            state: "running".into(),
            buffer: BufferStatus::default(),
            quality: QualityMetrics {
                sample_rate: 44_100,
                channels: 2,
                bitrate_kbps: 128,
                estimated_latency_ms: 80.0,
                buffer_level_percent: 0.0,
            },
            bitrate: BitrateStatus {
                current_kbps: 128,
                target_kbps: 128,
                min_kbps: 64,
                max_kbps: 320,
            },
            components: vec![ComponentStatus {
                component: ComponentKind::Encode,
                health,
                last_error: None,
            }],
            active_clients: 0,
            clients: Vec::new(),
            serving_fallback: !health.is_healthy(),
            uptime_secs: 1.0,
        }
    }

    #[test]
    fn sink_reports_busy_then_closed() {
        let (tx, mut rx) = mpsc::channel::<Bytes>(1);
        let mut sink = ChannelSink::new(tx);

        assert_eq!(sink.try_deliver(vec![1, 2]), Delivery::Delivered);
        assert_eq!(sink.try_deliver(vec![3]), Delivery::Busy(vec![3]));
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(&[1, 2]));
        assert_eq!(sink.try_deliver(vec![3]), Delivery::Delivered);

        drop(rx);
        assert_eq!(sink.try_deliver(vec![4]), Delivery::Closed);
    }

    #[test]
    fn health_is_ok_only_when_all_components_healthy() {
        let (code, Json(body)) = health_response(&status_with(ComponentHealth::Healthy));
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (code, Json(body)) = health_response(&status_with(ComponentHealth::Failed));
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["components"][0]["component"], "encode");
        assert_eq!(body["components"][0]["health"]["state"], "failed");
    }

    #[test]
    fn status_serializes_required_fields() {
        let json = serde_json::to_value(status_with(ComponentHealth::Healthy)).unwrap();
        assert_eq!(json["bitrate"]["current_kbps"], 128);
        assert_eq!(json["quality"]["estimated_latency_ms"], 80.0);
        assert_eq!(json["buffer"]["level_percent"], 0.0);
        assert_eq!(json["active_clients"], 0);
        assert!(json["clients"].is_array());
    }
}
