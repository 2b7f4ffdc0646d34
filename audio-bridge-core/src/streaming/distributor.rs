use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::config::BridgeConfig;
use crate::models::error::BridgeError;
use crate::models::state::{ComponentHealth, ComponentKind};
use crate::models::status::SessionSnapshot;
use crate::processing::ring_buffer::CircularAudioBuffer;
use crate::processing::silence;
use crate::session::stop_signal::StopSignal;
use crate::streaming::tee::StreamTee;
use crate::traits::bridge_delegate::{BridgeDelegate, HealthObserver};
use crate::traits::client_sink::{ClientSink, Delivery};

/// Why a client session's streaming loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Transport reported the client gone.
    ClientClosed,
    /// Too many consecutive empty reads with no fallback active.
    SourceFailed,
    /// The session was deregistered from outside its loop.
    Deregistered,
    Shutdown,
}

impl SessionEnd {
    /// The error behind this ending, if it was not a deliberate stop.
    pub fn error(self, client_id: &str) -> Option<BridgeError> {
        match self {
            SessionEnd::ClientClosed => Some(BridgeError::TransportClosed),
            SessionEnd::SourceFailed => Some(BridgeError::SourceFailed(format!(
                "no audio for session {}",
                client_id
            ))),
            SessionEnd::Deregistered | SessionEnd::Shutdown => None,
        }
    }
}

/// Registry entry for one client. Counters are atomics so the streaming
/// thread never needs the registry lock.
#[derive(Debug)]
struct SessionEntry {
    client_id: String,
    remote_address: String,
    start_time: DateTime<Utc>,
    cursor: Arc<CircularAudioBuffer>,
    bytes_sent: AtomicU64,
    fallback_bytes: AtomicU64,
    active: AtomicBool,
}

impl SessionEntry {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            client_id: self.client_id.clone(),
            remote_address: self.remote_address.clone(),
            start_time: self.start_time.to_rfc3339(),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            fallback_bytes: self.fallback_bytes.load(Ordering::Relaxed),
            active: self.active.load(Ordering::SeqCst),
        }
    }
}

/// Manages concurrent streaming clients of the encoded MP3 stream.
///
/// Every session has its own tee cursor and its own OS thread, so one slow or
/// disconnected client never stalls another:
/// ```text
/// [Encode pump] → StreamTee ─┬→ cursor A → session thread A → ClientSink A
///                            ├→ cursor B → session thread B → ClientSink B
///                            └→ cursor C → session thread C → ClientSink C
/// ```
/// While Capture or Encode is unhealthy, sessions that run dry are fed paced
/// MP3 silence instead of being closed.
pub struct StreamDistributor {
    config: Arc<BridgeConfig>,
    tee: Arc<StreamTee>,
    sessions: Mutex<HashMap<String, Arc<SessionEntry>>>,
    workers: Mutex<HashMap<String, thread::JoinHandle<()>>>,
    fallback: AtomicBool,
    unhealthy_sources: Mutex<HashSet<ComponentKind>>,
    accepting: AtomicBool,
    stop: StopSignal,
    delegate: Mutex<Option<Arc<dyn BridgeDelegate>>>,
}

impl StreamDistributor {
    pub fn new(config: Arc<BridgeConfig>) -> Result<Self, BridgeError> {
        let tee = Arc::new(StreamTee::new(config.client_buffer_bytes)?);
        Ok(Self {
            config,
            tee,
            sessions: Mutex::new(HashMap::new()),
            workers: Mutex::new(HashMap::new()),
            fallback: AtomicBool::new(false),
            unhealthy_sources: Mutex::new(HashSet::new()),
            accepting: AtomicBool::new(true),
            stop: StopSignal::new(),
            delegate: Mutex::new(None),
        })
    }

    /// Receives `SourceFailed` when a session is closed for lack of audio.
    pub fn set_delegate(&self, delegate: Arc<dyn BridgeDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }

    /// The fan-out the encode pump publishes into.
    pub fn tee(&self) -> Arc<StreamTee> {
        Arc::clone(&self.tee)
    }

    /// Publish encoded bytes to every registered session.
    pub fn publish(&self, encoded: &[u8]) {
        self.tee.publish(encoded);
    }

    /// Register a client and give it a private cursor into the encoded stream.
    pub fn register_client(&self, remote_address: &str) -> Result<String, BridgeError> {
        if !self.accepting.load(Ordering::SeqCst) || self.stop.is_stopped() {
            return Err(BridgeError::InvalidState("distributor is not accepting clients".into()));
        }

        let start_time = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let client_id = format!("{}_{}_{}", remote_address, start_time.timestamp(), &suffix[..8]);

        let cursor = self.tee.subscribe(&client_id)?;
        let entry = Arc::new(SessionEntry {
            client_id: client_id.clone(),
            remote_address: remote_address.to_string(),
            start_time,
            cursor,
            bytes_sent: AtomicU64::new(0),
            fallback_bytes: AtomicU64::new(0),
            active: AtomicBool::new(true),
        });
        self.sessions.lock().insert(client_id.clone(), entry);

        log::info!("[STREAM] Client registered: {}", client_id);
        Ok(client_id)
    }

    /// Start the streaming thread for an already registered client.
    pub fn start_streaming(self: &Arc<Self>, client_id: &str, sink: Box<dyn ClientSink>) -> Result<(), BridgeError> {
        let entry = self
            .sessions
            .lock()
            .get(client_id)
            .cloned()
            .ok_or_else(|| BridgeError::InvalidState(format!("unknown session {}", client_id)))?;

        let distributor = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("stream-session".into())
            .spawn(move || {
                let end = distributor.run_session(&entry, sink);
                let sent = entry.bytes_sent.load(Ordering::Relaxed);
                match end.error(&entry.client_id) {
                    Some(e @ BridgeError::SourceFailed(_)) => {
                        log::warn!("[STREAM] {} after {} bytes", e, sent);
                        let delegate = distributor.delegate.lock().clone();
                        if let Some(delegate) = delegate {
                            delegate.on_error(&e);
                        }
                    }
                    Some(e) => log::info!(
                        "[STREAM] Session {} ended ({}) after {} bytes",
                        entry.client_id,
                        e,
                        sent
                    ),
                    None => log::info!(
                        "[STREAM] Session {} ended ({:?}) after {} bytes",
                        entry.client_id,
                        end,
                        sent
                    ),
                }
                distributor.deregister(&entry.client_id);
            })
            .map_err(|e| {
                self.deregister(client_id);
                BridgeError::InitializationFailed(format!("failed to spawn session thread: {}", e))
            })?;

        let mut workers = self.workers.lock();
        workers.retain(|_, h| !h.is_finished());
        workers.insert(client_id.to_string(), handle);
        Ok(())
    }

    /// Register a client and start streaming to `sink` in one step.
    pub fn open_session(self: &Arc<Self>, remote_address: &str, sink: Box<dyn ClientSink>) -> Result<String, BridgeError> {
        let client_id = self.register_client(remote_address)?;
        self.start_streaming(&client_id, sink)?;
        Ok(client_id)
    }

    /// Remove a session. Safe to call any number of times; only the first
    /// call for an id returns `true`.
    pub fn deregister(&self, client_id: &str) -> bool {
        let Some(entry) = self.sessions.lock().remove(client_id) else {
            return false;
        };
        entry.active.store(false, Ordering::SeqCst);
        self.tee.unsubscribe(client_id);
        log::info!("[STREAM] Client deregistered: {}", client_id);
        true
    }

    fn run_session(&self, entry: &SessionEntry, mut sink: Box<dyn ClientSink>) -> SessionEnd {
        let chunk_size = self.config.chunk_size_bytes;
        let backoff = self.config.empty_read_backoff;
        let mut empty_reads = 0u32;
        let mut frames = silence::FrameTracker::new();

        loop {
            if self.stop.is_stopped() {
                return SessionEnd::Shutdown;
            }
            if !entry.active.load(Ordering::SeqCst) {
                return SessionEnd::Deregistered;
            }

            let data = entry.cursor.read(chunk_size);
            let (chunk, pace) = if !data.is_empty() {
                (data, None)
            } else if self.fallback.load(Ordering::SeqCst) {
                if frames.unfinished() > 0 {
                    log::debug!(
                        "[STREAM] Closing partial frame for {} ({} bytes)",
                        entry.client_id,
                        frames.unfinished()
                    );
                }
                let (chunk, duration) = frames.aligned_silence(chunk_size);
                (chunk, Some(duration))
            } else {
                empty_reads += 1;
                if empty_reads > self.config.max_empty_reads {
                    return SessionEnd::SourceFailed;
                }
                if empty_reads == 1 {
                    log::debug!("[STREAM] No audio data available for {}", entry.client_id);
                }
                if self.stop.wait(backoff) {
                    return SessionEnd::Shutdown;
                }
                continue;
            };
            empty_reads = 0;
            frames.observe(&chunk);

            let len = match self.deliver(entry, sink.as_mut(), chunk) {
                Ok(len) => len as u64,
                Err(end) => return end,
            };
            if pace.is_some() {
                entry.fallback_bytes.fetch_add(len, Ordering::Relaxed);
            }
            entry.bytes_sent.fetch_add(len, Ordering::Relaxed);

            if let Some(duration) = pace {
                if self.stop.wait(duration) {
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Hand one chunk to the sink, backing off while it is busy.
    fn deliver(&self, entry: &SessionEntry, sink: &mut dyn ClientSink, chunk: Vec<u8>) -> Result<usize, SessionEnd> {
        let len = chunk.len();
        let mut chunk = chunk;
        loop {
            match sink.try_deliver(chunk) {
                Delivery::Delivered => return Ok(len),
                Delivery::Closed => return Err(SessionEnd::ClientClosed),
                Delivery::Busy(returned) => {
                    chunk = returned;
                    if self.stop.wait(self.config.empty_read_backoff) {
                        return Err(SessionEnd::Shutdown);
                    }
                    if !entry.active.load(Ordering::SeqCst) {
                        return Err(SessionEnd::Deregistered);
                    }
                }
            }
        }
    }

    /// Switch fallback silence on or off for sessions that run dry.
    pub fn set_fallback(&self, enabled: bool) {
        let was = self.fallback.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            if enabled {
                log::warn!("[STREAM] Serving fallback silence to {} clients", self.active_count());
            } else {
                log::info!("[STREAM] Live audio restored");
            }
        }
    }

    pub fn is_serving_fallback(&self) -> bool {
        self.fallback.load(Ordering::SeqCst)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn session(&self, client_id: &str) -> Option<SessionSnapshot> {
        self.sessions.lock().get(client_id).map(|e| e.snapshot())
    }

    /// Snapshots of all registered sessions, oldest first.
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        let entries: Vec<Arc<SessionEntry>> = self.sessions.lock().values().cloned().collect();
        let mut snapshots: Vec<SessionSnapshot> = entries.iter().map(|e| e.snapshot()).collect();
        snapshots.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.client_id.cmp(&b.client_id))
        });
        snapshots
    }

    /// Sessions whose thread has exited without deregistering (i.e. panicked).
    fn zombie_sessions(&self) -> Vec<String> {
        let workers = self.workers.lock();
        let sessions = self.sessions.lock();
        workers
            .iter()
            .filter(|(id, handle)| handle.is_finished() && sessions.contains_key(*id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn is_healthy(&self) -> bool {
        self.accepting.load(Ordering::SeqCst) && !self.stop.is_stopped() && self.zombie_sessions().is_empty()
    }

    pub fn last_error(&self) -> Option<String> {
        if self.stop.is_stopped() {
            return Some("distributor shut down".into());
        }
        let zombies = self.zombie_sessions();
        if zombies.is_empty() {
            None
        } else {
            Some(format!("{} session threads exited without cleanup", zombies.len()))
        }
    }

    /// Clear sessions whose threads died and resume accepting clients.
    pub fn attempt_recovery(&self) -> Result<(), BridgeError> {
        if self.stop.is_stopped() {
            return Err(BridgeError::InvalidState("distributor shut down".into()));
        }
        for id in self.zombie_sessions() {
            log::warn!("[STREAM] Reaping dead session {}", id);
            self.deregister(&id);
            self.workers.lock().remove(&id);
        }
        self.accepting.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop every session loop, join their threads and clear the registry.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.stop.stop();

        let handles: Vec<(String, thread::JoinHandle<()>)> = self.workers.lock().drain().collect();
        for (id, handle) in handles {
            if handle.join().is_err() {
                log::error!("[STREAM] Session thread {} panicked", id);
            }
        }

        let remaining: Vec<String> = self.sessions.lock().keys().cloned().collect();
        for id in remaining {
            self.deregister(&id);
        }
    }
}

impl HealthObserver for StreamDistributor {
    /// Fallback follows the health of the audio sources (Capture and Encode).
    fn on_health_changed(&self, component: ComponentKind, health: ComponentHealth) {
        if component == ComponentKind::Distributor {
            return;
        }
        let any_unhealthy = {
            let mut unhealthy = self.unhealthy_sources.lock();
            if health.is_healthy() {
                unhealthy.remove(&component);
            } else {
                unhealthy.insert(component);
            }
            !unhealthy.is_empty()
        };
        self.set_fallback(any_unhealthy);
    }
}
