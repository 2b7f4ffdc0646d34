use std::time::Duration;

/// Bridge configuration.
///
/// Built once at startup and shared read-only (`Arc<BridgeConfig>`) with every
/// component constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// PCM sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Interleaved PCM channels (default: 2).
    pub channels: u16,

    /// Bits per PCM sample. Only 16 is supported.
    pub bits_per_sample: u16,

    /// Capacity of the capture ring buffer in bytes (default: 64 KiB).
    pub buffer_capacity_bytes: usize,

    /// Size of the chunks pulled by the encoder and delivered to clients (default: 4 KiB).
    pub chunk_size_bytes: usize,

    /// Per-client backlog of encoded bytes before the oldest are dropped.
    pub client_buffer_bytes: usize,

    pub target_bitrate_kbps: u32,
    pub min_bitrate_kbps: u32,
    pub max_bitrate_kbps: u32,
    pub bitrate_step_down_kbps: u32,
    pub bitrate_step_up_kbps: u32,

    /// Buffer fill (percent) above which high latency is treated as congestion.
    pub congestion_fill_percent: f64,

    pub max_latency_ms: f64,
    pub processing_latency_ms: f64,
    pub network_latency_ms: f64,

    pub monitor_interval: Duration,
    pub monitor_error_backoff: Duration,
    pub capture_poll_interval: Duration,
    pub empty_read_backoff: Duration,

    /// Consecutive empty reads a client session tolerates before the source is
    /// considered failed.
    pub max_empty_reads: u32,

    pub supervisor_interval: Duration,
    pub recovery_budget: u32,
    pub recovery_backoff: Duration,
    pub failed_cooldown: Duration,

    pub http_host: String,
    pub http_port: u16,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.bits_per_sample != 16 {
            return Err(format!("unsupported bit depth: {}", self.bits_per_sample));
        }
        if self.buffer_capacity_bytes == 0 {
            return Err("buffer capacity must be positive".into());
        }
        if self.chunk_size_bytes == 0 {
            return Err("chunk size must be positive".into());
        }
        if self.chunk_size_bytes > self.buffer_capacity_bytes {
            return Err(format!(
                "chunk size {} exceeds buffer capacity {}",
                self.chunk_size_bytes, self.buffer_capacity_bytes
            ));
        }
        if self.client_buffer_bytes < self.chunk_size_bytes {
            return Err("client buffer must hold at least one chunk".into());
        }
        if self.min_bitrate_kbps > self.max_bitrate_kbps {
            return Err(format!(
                "min bitrate {} exceeds max bitrate {}",
                self.min_bitrate_kbps, self.max_bitrate_kbps
            ));
        }
        if !(self.min_bitrate_kbps..=self.max_bitrate_kbps).contains(&self.target_bitrate_kbps) {
            return Err(format!(
                "target bitrate {} outside [{}, {}]",
                self.target_bitrate_kbps, self.min_bitrate_kbps, self.max_bitrate_kbps
            ));
        }
        if self.bitrate_step_down_kbps == 0 || self.bitrate_step_up_kbps == 0 {
            return Err("bitrate steps must be positive".into());
        }
        if !(self.congestion_fill_percent > 0.0 && self.congestion_fill_percent <= 100.0) {
            return Err(format!(
                "congestion fill threshold out of range: {}",
                self.congestion_fill_percent
            ));
        }
        if self.max_latency_ms <= 0.0 {
            return Err("max latency must be positive".into());
        }
        if self.recovery_budget == 0 {
            return Err("recovery budget must be at least one attempt".into());
        }
        Ok(())
    }

    /// Raw PCM bytes produced per millisecond of audio.
    pub fn bytes_per_ms(&self) -> f64 {
        let bytes_per_frame = self.channels as f64 * (self.bits_per_sample as f64 / 8.0);
        self.sample_rate as f64 * bytes_per_frame / 1000.0
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
            buffer_capacity_bytes: 64 * 1024,
            chunk_size_bytes: 4096,
            client_buffer_bytes: 256 * 1024,
            target_bitrate_kbps: 128,
            min_bitrate_kbps: 64,
            max_bitrate_kbps: 320,
            bitrate_step_down_kbps: 32,
            bitrate_step_up_kbps: 16,
            congestion_fill_percent: 80.0,
            max_latency_ms: 400.0,
            processing_latency_ms: 50.0,
            network_latency_ms: 30.0,
            monitor_interval: Duration::from_secs(5),
            monitor_error_backoff: Duration::from_secs(10),
            capture_poll_interval: Duration::from_millis(10),
            empty_read_backoff: Duration::from_millis(100),
            max_empty_reads: 50,
            supervisor_interval: Duration::from_secs(5),
            recovery_budget: 3,
            recovery_backoff: Duration::from_secs(1),
            failed_cooldown: Duration::from_secs(30),
            http_host: "0.0.0.0".into(),
            http_port: 8080,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(BridgeConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = BridgeConfig {
            buffer_capacity_bytes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_chunk_larger_than_capacity() {
        let config = BridgeConfig {
            buffer_capacity_bytes: 1024,
            chunk_size_bytes: 2048,
            client_buffer_bytes: 4096,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("exceeds buffer capacity"));
    }

    #[test]
    fn rejects_target_outside_range() {
        let config = BridgeConfig {
            target_bitrate_kbps: 32,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bytes_per_ms_for_cd_audio() {
        // 44100 Hz * 2 ch * 2 bytes = 176400 B/s
        let config = BridgeConfig::default();
        assert!((config.bytes_per_ms() - 176.4).abs() < 1e-9);
    }
}
