//! `audio-bridge`: relays the audio a phone plays over Bluetooth A2DP to any
//! number of HTTP clients as a live MP3 stream.

mod config;
mod http;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use audio_bridge_core::{
    AudioBridge, BridgeDelegate, BridgeError, BridgeState, ComponentHealth, ComponentKind, StreamDistributor,
};
use audio_bridge_linux::{GstEncoder, ParecCapture};

#[derive(Debug, Error)]
enum ServerError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("invalid listen address {0}")]
    Address(String),

    #[error("http server: {0}")]
    Io(#[from] std::io::Error),
}

/// Forwards bridge events to the log.
struct LogDelegate;

impl BridgeDelegate for LogDelegate {
    fn on_state_changed(&self, state: &BridgeState) {
        match state {
            BridgeState::Failed(e) => log::error!("[BRIDGE] State: failed ({})", e),
            other => log::info!("[BRIDGE] State: {}", other.name()),
        }
    }

    fn on_health_changed(&self, component: ComponentKind, health: ComponentHealth) {
        if health.is_healthy() {
            log::info!("[HEALTH] {} is healthy", component.name());
        } else if health.is_failed() {
            log::error!("[HEALTH] {} failed, recovery budget spent", component.name());
        } else {
            log::warn!("[HEALTH] {} is {:?}", component.name(), health);
        }
    }

    fn on_bitrate_changed(&self, kbps: u32) {
        log::info!("[QUALITY] Encoder bitrate now {} kbps", kbps);
    }

    fn on_error(&self, error: &BridgeError) {
        log::warn!("[BRIDGE] {}", error);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    config::init_logging();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("[BRIDGE] {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ServerError> {
    let config = config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.http_host, config.http_port)
        .parse()
        .map_err(|_| ServerError::Address(format!("{}:{}", config.http_host, config.http_port)))?;

    let capture = ParecCapture::new(config.sample_rate, config.channels);
    let encoder = GstEncoder::new(config.sample_rate, config.channels, config.target_bitrate_kbps);
    let mut bridge = AudioBridge::new(config, Box::new(capture), Box::new(encoder))?;
    bridge.set_delegate(Arc::new(LogDelegate));
    bridge.start()?;

    let distributor = Arc::clone(bridge.distributor());
    let bridge = Arc::new(Mutex::new(bridge));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("[HTTP] Streaming at http://{}/audio.mp3", addr);

    let app = http::router(Arc::clone(&bridge));
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(distributor))
        .await?;

    log::info!("[BRIDGE] Shutting down...");
    tokio::task::block_in_place(|| bridge.lock().stop())?;
    log::info!("[BRIDGE] Stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM, after closing every client stream so the
/// server's open connections can drain.
async fn shutdown_signal(distributor: Arc<StreamDistributor>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[HTTP] Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("[HTTP] Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("[HTTP] Shutdown requested, closing client streams");
    if let Err(e) = tokio::task::spawn_blocking(move || distributor.shutdown()).await {
        log::error!("[HTTP] Closing client streams failed: {}", e);
    }
}
