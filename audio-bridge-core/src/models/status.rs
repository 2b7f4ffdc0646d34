use serde::Serialize;

use super::state::{ComponentHealth, ComponentKind};

/// Point-in-time snapshot of a [`CircularAudioBuffer`](crate::CircularAudioBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BufferStatus {
    pub capacity: usize,
    pub used: usize,
    pub free: usize,
    pub level_percent: f64,
    pub total_written: u64,
    pub total_read: u64,
    /// Bytes evicted (or truncated from oversized writes) to make room for newer data.
    pub overflow_bytes: u64,
    /// Reads that found the buffer empty.
    pub underruns: u64,
}

/// Derived quality figures, recomputed on every monitor tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate_kbps: u32,
    /// Additive estimate (buffered audio + fixed processing + fixed network), not a measurement.
    pub estimated_latency_ms: f64,
    pub buffer_level_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BitrateStatus {
    pub current_kbps: u32,
    pub target_kbps: u32,
    pub min_kbps: u32,
    pub max_kbps: u32,
}

/// Public view of one streaming client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub client_id: String,
    pub remote_address: String,
    /// RFC 3339 start time.
    pub start_time: String,
    pub bytes_sent: u64,
    /// Portion of `bytes_sent` that was fallback silence.
    pub fallback_bytes: u64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentStatus {
    pub component: ComponentKind,
    pub health: ComponentHealth,
    pub last_error: Option<String>,
}

/// Full status report served at `/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeStatus {
    pub state: String,
    pub buffer: BufferStatus,
    pub quality: QualityMetrics,
    pub bitrate: BitrateStatus,
    pub components: Vec<ComponentStatus>,
    pub active_clients: usize,
    pub clients: Vec<SessionSnapshot>,
    pub serving_fallback: bool,
    pub uptime_secs: f64,
}

impl BridgeStatus {
    pub fn is_healthy(&self) -> bool {
        self.components.iter().all(|c| c.health.is_healthy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(kind: ComponentKind, health: ComponentHealth) -> ComponentStatus {
        ComponentStatus {
            component: kind,
            health,
            last_error: None,
        }
    }

    fn status(components: Vec<ComponentStatus>) -> BridgeStatus {
        BridgeStatus {
            state: "running".into(),
            buffer: BufferStatus::default(),
            quality: QualityMetrics {
                sample_rate: 44_100,
                channels: 2,
                bitrate_kbps: 96,
                estimated_latency_ms: 92.5,
                buffer_level_percent: 12.5,
            },
            bitrate: BitrateStatus {
                current_kbps: 96,
                target_kbps: 128,
                min_kbps: 64,
                max_kbps: 320,
            },
            components,
            active_clients: 1,
            clients: vec![SessionSnapshot {
                client_id: "10.0.0.7_1700000000_ab12cd34".into(),
                remote_address: "10.0.0.7".into(),
                start_time: "2023-11-14T22:13:20+00:00".into(),
                bytes_sent: 8192,
                fallback_bytes: 0,
                active: true,
            }],
            serving_fallback: false,
            uptime_secs: 3.5,
        }
    }

    #[test]
    fn healthy_only_when_every_component_is() {
        let all_good = status(vec![
            component(ComponentKind::Capture, ComponentHealth::Healthy),
            component(ComponentKind::Encode, ComponentHealth::Healthy),
        ]);
        assert!(all_good.is_healthy());

        let recovering = status(vec![
            component(ComponentKind::Capture, ComponentHealth::Healthy),
            component(ComponentKind::Encode, ComponentHealth::Recovering { attempts: 2 }),
        ]);
        assert!(!recovering.is_healthy());
    }

    #[test]
    fn serializes_for_status_endpoint() {
        let json = serde_json::to_value(status(vec![component(
            ComponentKind::Capture,
            ComponentHealth::Recovering { attempts: 1 },
        )]))
        .unwrap();

        assert_eq!(json["quality"]["buffer_level_percent"], 12.5);
        assert_eq!(json["bitrate"]["current_kbps"], 96);
        assert_eq!(json["clients"][0]["bytes_sent"], 8192);
        assert_eq!(json["components"][0]["component"], "capture");
        assert_eq!(json["components"][0]["health"]["state"], "recovering");
        assert_eq!(json["components"][0]["health"]["attempts"], 1);
    }
}
