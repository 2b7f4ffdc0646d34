use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

use crate::health::component::ManagedComponent;
use crate::health::supervisor::HealthSupervisor;
use crate::models::config::BridgeConfig;
use crate::models::error::BridgeError;
use crate::models::state::{BridgeState, ComponentHealth, ComponentKind};
use crate::models::status::BridgeStatus;
use crate::processing::quality::QualityMonitor;
use crate::processing::ring_buffer::CircularAudioBuffer;
use crate::session::stop_signal::StopSignal;
use crate::streaming::distributor::StreamDistributor;
use crate::traits::bridge_delegate::{BridgeDelegate, HealthObserver};
use crate::traits::capture_source::{CaptureSource, SharedCapture};
use crate::traits::encoder::{AudioEncoder, SharedEncoder};

/// Forwards supervisor transitions to the bridge delegate.
struct DelegateObserver(Arc<dyn BridgeDelegate>);

impl HealthObserver for DelegateObserver {
    fn on_health_changed(&self, component: ComponentKind, health: ComponentHealth) {
        self.0.on_health_changed(component, health);
    }
}

/// Pipeline orchestrator.
///
/// Owns the capture ring buffer and wires the background loops together:
/// ```text
/// [CaptureSource] → capture-pump → [CircularAudioBuffer] → encode-pump → [AudioEncoder]
///                                        ↑                                    ↓
///                               quality-monitor (bitrate)           [StreamDistributor] → clients
///                     health-supervisor watches Capture / Encode / Distributor
/// ```
/// Every loop waits on one [`StopSignal`] and is joined by [`stop`](Self::stop).
pub struct AudioBridge {
    config: Arc<BridgeConfig>,
    buffer: Arc<CircularAudioBuffer>,
    capture: SharedCapture,
    encoder: SharedEncoder,
    distributor: Arc<StreamDistributor>,
    monitor: Arc<QualityMonitor>,
    supervisor: Arc<HealthSupervisor>,
    state: Arc<Mutex<BridgeState>>,
    delegate: Option<Arc<dyn BridgeDelegate>>,
    stop: StopSignal,
    handles: Vec<thread::JoinHandle<()>>,
    started_at: Option<Instant>,
}

impl AudioBridge {
    /// Validate the configuration and assemble the pipeline. Nothing runs
    /// until [`start`](Self::start).
    pub fn new(
        config: BridgeConfig,
        capture: Box<dyn CaptureSource>,
        encoder: Box<dyn AudioEncoder>,
    ) -> Result<Self, BridgeError> {
        config.validate().map_err(BridgeError::InvalidConfiguration)?;
        let config = Arc::new(config);

        let buffer = Arc::new(CircularAudioBuffer::new(config.buffer_capacity_bytes)?);
        let capture: SharedCapture = Arc::new(Mutex::new(capture));
        let encoder: SharedEncoder = Arc::new(Mutex::new(encoder));
        let distributor = Arc::new(StreamDistributor::new(Arc::clone(&config))?);
        let monitor = Arc::new(QualityMonitor::new(
            Arc::clone(&config),
            Arc::clone(&buffer),
            Arc::clone(&encoder),
        ));

        let supervisor = Arc::new(HealthSupervisor::new(Arc::clone(&config)));
        supervisor.add_component(ManagedComponent::Capture(Arc::clone(&capture)));
        supervisor.add_component(ManagedComponent::Encode(Arc::clone(&encoder)));
        supervisor.add_component(ManagedComponent::Distributor(Arc::clone(&distributor)));
        supervisor.add_observer(distributor.clone());

        Ok(Self {
            config,
            buffer,
            capture,
            encoder,
            distributor,
            monitor,
            supervisor,
            state: Arc::new(Mutex::new(BridgeState::Idle)),
            delegate: None,
            stop: StopSignal::new(),
            handles: Vec::new(),
            started_at: None,
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn BridgeDelegate>) {
        self.monitor.set_delegate(Arc::clone(&delegate));
        self.distributor.set_delegate(Arc::clone(&delegate));
        self.supervisor
            .add_observer(Arc::new(DelegateObserver(Arc::clone(&delegate))));
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> BridgeState {
        self.state.lock().clone()
    }

    pub fn config(&self) -> &Arc<BridgeConfig> {
        &self.config
    }

    pub fn buffer(&self) -> &Arc<CircularAudioBuffer> {
        &self.buffer
    }

    pub fn distributor(&self) -> &Arc<StreamDistributor> {
        &self.distributor
    }

    pub fn monitor(&self) -> &Arc<QualityMonitor> {
        &self.monitor
    }

    pub fn supervisor(&self) -> &Arc<HealthSupervisor> {
        &self.supervisor
    }

    /// Start capture and every background loop. Transitions: idle → running.
    ///
    /// Failing to start the capture source or encoder is fatal: the bridge
    /// moves to `failed` and the error is returned to the caller.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        if !matches!(*self.state.lock(), BridgeState::Idle) {
            return Err(BridgeError::InvalidState("can only start from idle state".into()));
        }

        log::info!("[BRIDGE] Initializing audio pipeline...");
        self.buffer.initialize();

        if let Err(e) = self.start_sources() {
            log::error!("[BRIDGE] Pipeline initialization failed: {}", e);
            let e = match e {
                BridgeError::InitializationFailed(_) => e,
                other => BridgeError::InitializationFailed(other.to_string()),
            };
            self.set_state(BridgeState::Failed(e.clone()));
            return Err(e);
        }

        if let Err(e) = self.spawn_loops() {
            self.stop.stop();
            self.join_loops();
            let _ = self.capture.lock().stop();
            self.set_state(BridgeState::Failed(e.clone()));
            return Err(e);
        }

        self.started_at = Some(Instant::now());
        self.set_state(BridgeState::Running);
        log::info!(
            "[BRIDGE] Audio flow started ({} Hz, {} ch, {} kbps)",
            self.config.sample_rate,
            self.config.channels,
            self.config.target_bitrate_kbps
        );
        Ok(())
    }

    fn start_sources(&self) -> Result<(), BridgeError> {
        self.encoder.lock().set_bitrate(self.config.target_bitrate_kbps)?;
        let mut capture = self.capture.lock();
        capture.start()?;
        log::info!("[BRIDGE] Capturing from {}", capture.describe());
        Ok(())
    }

    fn spawn_loops(&mut self) -> Result<(), BridgeError> {
        let capture_pump = {
            let capture = Arc::clone(&self.capture);
            let buffer = Arc::clone(&self.buffer);
            let stop = self.stop.clone();
            let delegate = self.delegate.clone();
            let poll = self.config.capture_poll_interval;
            let retry = self.config.empty_read_backoff;
            spawn_named("capture-pump", move || {
                let mut failing = false;
                loop {
                    if stop.is_stopped() {
                        break;
                    }
                    let pulled = capture.lock().pull_available_bytes();
                    let pause = match pulled {
                        Ok(data) if !data.is_empty() => {
                            failing = false;
                            buffer.write(&data);
                            continue;
                        }
                        Ok(_) => poll,
                        Err(e) => {
                            if !failing {
                                log::error!("[BRIDGE] Capture error: {}", e);
                                if let Some(ref d) = delegate {
                                    d.on_error(&e);
                                }
                            }
                            failing = true;
                            retry
                        }
                    };
                    if stop.wait(pause) {
                        break;
                    }
                }
            })?
        };
        self.handles.push(capture_pump);

        let encode_pump = {
            let encoder = Arc::clone(&self.encoder);
            let buffer = Arc::clone(&self.buffer);
            let distributor = Arc::clone(&self.distributor);
            let stop = self.stop.clone();
            let delegate = self.delegate.clone();
            let chunk_size = self.config.chunk_size_bytes;
            let poll = self.config.capture_poll_interval;
            let retry = self.config.empty_read_backoff;
            spawn_named("encode-pump", move || {
                let mut failing = false;
                loop {
                    if stop.is_stopped() {
                        break;
                    }
                    let pcm = buffer.read(chunk_size);
                    if pcm.is_empty() {
                        if stop.wait(poll) {
                            break;
                        }
                        continue;
                    }
                    let encoded = encoder.lock().encode_chunk(&pcm);
                    match encoded {
                        Ok(bytes) => {
                            failing = false;
                            distributor.publish(&bytes);
                        }
                        Err(e) => {
                            if !failing {
                                log::error!("[BRIDGE] Encoding error: {}", e);
                                if let Some(ref d) = delegate {
                                    d.on_error(&e);
                                }
                            }
                            failing = true;
                            if stop.wait(retry) {
                                break;
                            }
                        }
                    }
                }
            })?
        };
        self.handles.push(encode_pump);

        self.handles
            .push(Arc::clone(&self.monitor).spawn(self.stop.clone())?);
        self.handles
            .push(Arc::clone(&self.supervisor).spawn(self.stop.clone())?);
        Ok(())
    }

    fn join_loops(&mut self) {
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                log::error!("[BRIDGE] {} thread panicked", name);
            }
        }
    }

    /// Stop every loop, close all client sessions and release the sources.
    /// Transitions: running → stopping → stopped.
    pub fn stop(&mut self) -> Result<(), BridgeError> {
        if !self.state.lock().is_running() {
            return Err(BridgeError::InvalidState("can only stop a running bridge".into()));
        }
        self.set_state(BridgeState::Stopping);
        log::info!("[BRIDGE] Cleaning up audio pipeline...");

        self.stop.stop();
        self.join_loops();
        self.distributor.shutdown();

        if let Err(e) = self.capture.lock().stop() {
            log::warn!("[BRIDGE] Capture stop failed: {}", e);
        }
        self.encoder.lock().shutdown();

        self.set_state(BridgeState::Stopped);
        Ok(())
    }

    /// Typed snapshot of the whole pipeline.
    pub fn status(&self) -> BridgeStatus {
        let clients = self.distributor.sessions();
        BridgeStatus {
            state: self.state.lock().name().to_string(),
            buffer: self.buffer.stats(),
            quality: self.monitor.metrics(),
            bitrate: self.monitor.bitrate_status(),
            components: self.supervisor.statuses(),
            active_clients: clients.len(),
            clients,
            serving_fallback: self.distributor.is_serving_fallback(),
            uptime_secs: self
                .started_at
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
        }
    }

    fn set_state(&self, new_state: BridgeState) {
        {
            let mut s = self.state.lock();
            *s = new_state.clone();
        }
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(&new_state);
        }
    }
}

impl Drop for AudioBridge {
    fn drop(&mut self) {
        if self.state.lock().is_running() {
            let _ = self.stop();
        }
    }
}

fn spawn_named<F>(name: &str, f: F) -> Result<thread::JoinHandle<()>, BridgeError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map_err(|e| BridgeError::InitializationFailed(format!("failed to spawn {}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::traits::client_sink::{ClientSink, Delivery};

    /// Hands out queued PCM blocks one per pull.
    struct QueueCapture {
        blocks: Arc<Mutex<VecDeque<Vec<u8>>>>,
        fail_start: bool,
        started: Arc<AtomicBool>,
    }

    impl CaptureSource for QueueCapture {
        fn start(&mut self) -> Result<(), BridgeError> {
            if self.fail_start {
                return Err(BridgeError::CaptureFailed("no such device".into()));
            }
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn pull_available_bytes(&mut self) -> Result<Vec<u8>, BridgeError> {
            Ok(self.blocks.lock().pop_front().unwrap_or_default())
        }

        fn stop(&mut self) -> Result<(), BridgeError> {
            self.started.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_healthy(&self) -> bool {
            true
        }

        fn last_error(&self) -> Option<String> {
            None
        }

        fn attempt_recovery(&mut self) -> Result<(), BridgeError> {
            Ok(())
        }

        fn describe(&self) -> String {
            "queue".into()
        }
    }

    /// "Encodes" by passing PCM through unchanged.
    struct PassthroughEncoder {
        kbps: u32,
    }

    impl AudioEncoder for PassthroughEncoder {
        fn set_bitrate(&mut self, kbps: u32) -> Result<(), BridgeError> {
            self.kbps = kbps;
            Ok(())
        }

        fn bitrate(&self) -> u32 {
            self.kbps
        }

        fn encode_chunk(&mut self, pcm: &[u8]) -> Result<Vec<u8>, BridgeError> {
            Ok(pcm.to_vec())
        }

        fn is_healthy(&self) -> bool {
            true
        }

        fn last_error(&self) -> Option<String> {
            None
        }

        fn attempt_recovery(&mut self) -> Result<(), BridgeError> {
            Ok(())
        }
    }

    struct CollectSink(Arc<Mutex<Vec<u8>>>);

    impl ClientSink for CollectSink {
        fn try_deliver(&mut self, chunk: Vec<u8>) -> Delivery {
            self.0.lock().extend_from_slice(&chunk);
            Delivery::Delivered
        }
    }

    #[derive(Default)]
    struct StateLog(Mutex<Vec<String>>);

    impl BridgeDelegate for StateLog {
        fn on_state_changed(&self, state: &BridgeState) {
            self.0.lock().push(state.name().to_string());
        }

        fn on_health_changed(&self, _component: ComponentKind, _health: ComponentHealth) {}

        fn on_bitrate_changed(&self, _kbps: u32) {}

        fn on_error(&self, _error: &BridgeError) {}
    }

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            buffer_capacity_bytes: 4096,
            chunk_size_bytes: 256,
            client_buffer_bytes: 8192,
            capture_poll_interval: Duration::from_millis(1),
            empty_read_backoff: Duration::from_millis(2),
            max_empty_reads: 5_000,
            monitor_interval: Duration::from_millis(10),
            supervisor_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn queue_capture(blocks: Vec<Vec<u8>>, fail_start: bool) -> (Box<dyn CaptureSource>, Arc<Mutex<VecDeque<Vec<u8>>>>, Arc<AtomicBool>) {
        let queue = Arc::new(Mutex::new(blocks.into_iter().collect()));
        let started = Arc::new(AtomicBool::new(false));
        let capture = QueueCapture {
            blocks: Arc::clone(&queue),
            fail_start,
            started: Arc::clone(&started),
        };
        (Box::new(capture), queue, started)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let (capture, _, _) = queue_capture(Vec::new(), false);
        let config = BridgeConfig {
            buffer_capacity_bytes: 0,
            ..test_config()
        };
        let result = AudioBridge::new(config, capture, Box::new(PassthroughEncoder { kbps: 0 }));
        assert!(matches!(result, Err(BridgeError::InvalidConfiguration(_))));
    }

    #[test]
    fn capture_start_failure_is_fatal() {
        let (capture, _, _) = queue_capture(Vec::new(), true);
        let mut bridge =
            AudioBridge::new(test_config(), capture, Box::new(PassthroughEncoder { kbps: 0 })).unwrap();

        let err = bridge.start().unwrap_err();
        assert!(matches!(err, BridgeError::InitializationFailed(_)));
        assert!(matches!(bridge.state(), BridgeState::Failed(_)));
    }

    #[test]
    fn captured_audio_reaches_client_in_order() {
        let (capture, queue, started) = queue_capture(Vec::new(), false);
        let mut bridge =
            AudioBridge::new(test_config(), capture, Box::new(PassthroughEncoder { kbps: 0 })).unwrap();
        let log = Arc::new(StateLog::default());
        bridge.set_delegate(log.clone());
        bridge.start().unwrap();
        assert!(started.load(Ordering::SeqCst));

        let received = Arc::new(Mutex::new(Vec::new()));
        let id = bridge
            .distributor()
            .open_session("192.168.4.20", Box::new(CollectSink(Arc::clone(&received))))
            .unwrap();

        let expected: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        queue.lock().extend(expected.chunks(100).map(|c| c.to_vec()));

        let deadline = Instant::now() + Duration::from_secs(5);
        while received.lock().len() < expected.len() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*received.lock(), expected);

        let status = bridge.status();
        assert_eq!(status.state, "running");
        assert_eq!(status.active_clients, 1);
        assert_eq!(status.clients[0].client_id, id);
        assert_eq!(status.bitrate.current_kbps, 128);
        assert_eq!(status.components.len(), 3);

        bridge.stop().unwrap();
        assert!(!started.load(Ordering::SeqCst));
        assert_eq!(bridge.distributor().active_count(), 0);
        assert_eq!(*log.0.lock(), vec!["running", "stopping", "stopped"]);
    }

    /// Capture source that always has more PCM ready.
    struct EndlessCapture;

    impl CaptureSource for EndlessCapture {
        fn start(&mut self) -> Result<(), BridgeError> {
            Ok(())
        }

        fn pull_available_bytes(&mut self) -> Result<Vec<u8>, BridgeError> {
            Ok(vec![0; 64])
        }

        fn stop(&mut self) -> Result<(), BridgeError> {
            Ok(())
        }

        fn is_healthy(&self) -> bool {
            true
        }

        fn last_error(&self) -> Option<String> {
            None
        }

        fn attempt_recovery(&mut self) -> Result<(), BridgeError> {
            Ok(())
        }

        fn describe(&self) -> String {
            "endless".into()
        }
    }

    #[test]
    fn stop_returns_while_capture_always_has_data() {
        let mut bridge = AudioBridge::new(
            test_config(),
            Box::new(EndlessCapture),
            Box::new(PassthroughEncoder { kbps: 0 }),
        )
        .unwrap();
        bridge.start().unwrap();
        thread::sleep(Duration::from_millis(50));

        let (tx, rx) = std::sync::mpsc::channel();
        let stopper = thread::spawn(move || {
            let result = bridge.stop();
            let _ = tx.send(result.is_ok());
            bridge
        });

        let stopped = rx.recv_timeout(Duration::from_secs(5));
        assert_eq!(stopped, Ok(true), "stop did not return while capture kept producing");
        let bridge = stopper.join().unwrap();
        assert!(bridge.state().is_terminal());
    }

    #[test]
    fn stop_requires_running_bridge() {
        let (capture, _, _) = queue_capture(Vec::new(), false);
        let mut bridge =
            AudioBridge::new(test_config(), capture, Box::new(PassthroughEncoder { kbps: 0 })).unwrap();
        assert!(bridge.stop().is_err());

        bridge.start().unwrap();
        assert!(bridge.start().is_err());
        bridge.stop().unwrap();
        assert!(bridge.state().is_terminal());
    }
}
