use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::config::BridgeConfig;
use crate::models::error::BridgeError;
use crate::models::status::{BitrateStatus, BufferStatus, QualityMetrics};
use crate::processing::ring_buffer::CircularAudioBuffer;
use crate::session::stop_signal::StopSignal;
use crate::traits::bridge_delegate::BridgeDelegate;
use crate::traits::encoder::SharedEncoder;

/// Additive latency model: buffered audio plus fixed processing and network
/// allowances. An approximation, not a measured round trip.
pub fn estimate_latency_ms(used_bytes: usize, config: &BridgeConfig) -> f64 {
    let buffered_ms = used_bytes as f64 / config.bytes_per_ms();
    buffered_ms + config.processing_latency_ms + config.network_latency_ms
}

/// Current/target bitrate pair.
///
/// `current` only ever moves toward `target`, by at most one step per
/// adjustment, and both stay within `[min, max]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitrateController {
    current: u32,
    target: u32,
    preferred: u32,
    min: u32,
    max: u32,
    step_down: u32,
    step_up: u32,
}

impl BitrateController {
    pub fn new(config: &BridgeConfig) -> Self {
        let preferred = config
            .target_bitrate_kbps
            .clamp(config.min_bitrate_kbps, config.max_bitrate_kbps);
        Self {
            current: preferred,
            target: preferred,
            preferred,
            min: config.min_bitrate_kbps,
            max: config.max_bitrate_kbps,
            step_down: config.bitrate_step_down_kbps,
            step_up: config.bitrate_step_up_kbps,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn set_target(&mut self, kbps: u32) {
        self.target = kbps.clamp(self.min, self.max);
    }

    /// Lower the target one step below the current rate and follow it.
    pub fn on_congestion(&mut self) {
        self.set_target(self.current.saturating_sub(self.step_down));
        self.step_toward_target();
    }

    /// Restore the configured target and climb toward it by one small step.
    pub fn on_relief(&mut self) {
        self.target = self.preferred;
        self.step_toward_target();
    }

    fn step_toward_target(&mut self) {
        if self.current > self.target {
            self.current = self.current.saturating_sub(self.step_down).max(self.target);
        } else if self.current < self.target {
            self.current = (self.current + self.step_up).min(self.target);
        }
    }

    pub fn status(&self) -> BitrateStatus {
        BitrateStatus {
            current_kbps: self.current,
            target_kbps: self.target,
            min_kbps: self.min,
            max_kbps: self.max,
        }
    }
}

/// How loaded the pipeline looked on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCondition {
    /// Latency over the limit with the buffer nearly full.
    Congested,
    /// Latency over the limit, buffer not full enough to blame the encoder.
    Elevated,
    Normal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub metrics: QualityMetrics,
    pub condition: LoadCondition,
    pub bitrate: BitrateStatus,
    /// Whether this tick pushed a new bitrate to the encoder.
    pub applied: bool,
}

/// Periodic sampler of buffer fill and latency that steers the encoder bitrate.
pub struct QualityMonitor {
    config: Arc<BridgeConfig>,
    buffer: Arc<CircularAudioBuffer>,
    encoder: SharedEncoder,
    controller: Mutex<BitrateController>,
    delegate: Mutex<Option<Arc<dyn BridgeDelegate>>>,
}

impl QualityMonitor {
    pub fn new(
        config: Arc<BridgeConfig>,
        buffer: Arc<CircularAudioBuffer>,
        encoder: SharedEncoder,
    ) -> Self {
        let controller = Mutex::new(BitrateController::new(&config));
        Self {
            config,
            buffer,
            encoder,
            controller,
            delegate: Mutex::new(None),
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn BridgeDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }

    fn delegate(&self) -> Option<Arc<dyn BridgeDelegate>> {
        self.delegate.lock().clone()
    }

    pub fn metrics(&self) -> QualityMetrics {
        self.metrics_for(&self.buffer.stats())
    }

    fn metrics_for(&self, status: &BufferStatus) -> QualityMetrics {
        QualityMetrics {
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            bitrate_kbps: self.controller.lock().current(),
            estimated_latency_ms: estimate_latency_ms(status.used, &self.config),
            buffer_level_percent: status.level_percent,
        }
    }

    pub fn bitrate_status(&self) -> BitrateStatus {
        self.controller.lock().status()
    }

    /// Sample once, adjust the controller, and push the result to the encoder.
    pub fn tick(&self) -> Result<QualityReport, BridgeError> {
        let status = self.buffer.stats();
        let latency = estimate_latency_ms(status.used, &self.config);
        let over_latency = latency > self.config.max_latency_ms;

        let condition = if over_latency && status.level_percent > self.config.congestion_fill_percent {
            LoadCondition::Congested
        } else if over_latency {
            LoadCondition::Elevated
        } else {
            LoadCondition::Normal
        };

        let (current, bitrate) = {
            let mut controller = self.controller.lock();
            match condition {
                LoadCondition::Congested => {
                    log::warn!(
                        "[QUALITY] High latency {:.0}ms at {:.0}% fill",
                        latency,
                        status.level_percent
                    );
                    controller.on_congestion();
                }
                LoadCondition::Elevated => {
                    log::warn!("[QUALITY] High latency detected: {:.0}ms", latency);
                }
                LoadCondition::Normal => controller.on_relief(),
            }
            (controller.current(), controller.status())
        };

        // A failed set_bitrate leaves a mismatch that the next tick retries.
        let applied = {
            let mut encoder = self.encoder.lock();
            if encoder.bitrate() != current {
                encoder.set_bitrate(current)?;
                true
            } else {
                false
            }
        };

        if applied {
            log::info!("[QUALITY] Bitrate now {} kbps (target {})", current, bitrate.target_kbps);
            if let Some(delegate) = self.delegate() {
                delegate.on_bitrate_changed(current);
            }
        }

        Ok(QualityReport {
            metrics: self.metrics_for(&status),
            condition,
            bitrate,
            applied,
        })
    }

    /// Run [`tick`](Self::tick) every `monitor_interval` until `stop` fires.
    ///
    /// Errors are logged and followed by a longer backoff; they never end the loop.
    pub fn spawn(self: Arc<Self>, stop: StopSignal) -> Result<thread::JoinHandle<()>, BridgeError> {
        thread::Builder::new()
            .name("quality-monitor".into())
            .spawn(move || {
                while !stop.is_stopped() {
                    let pause = match self.tick() {
                        Ok(_) => self.config.monitor_interval,
                        Err(e) => {
                            log::error!("[QUALITY] Monitoring error: {}", e);
                            if let Some(delegate) = self.delegate() {
                                delegate.on_error(&e);
                            }
                            self.config.monitor_error_backoff
                        }
                    };
                    if stop.wait(pause) {
                        break;
                    }
                }
                log::debug!("[QUALITY] Monitor stopped");
            })
            .map_err(|e| BridgeError::InitializationFailed(format!("failed to spawn quality monitor: {}", e)))
    }
}
