use serde::Serialize;

use super::error::BridgeError;

/// Bridge lifecycle state machine.
///
/// State transitions:
/// ```text
/// idle → running → stopping → stopped
///   ↓
/// failed
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeState {
    Idle,
    Running,
    Stopping,
    Stopped,
    Failed(BridgeError),
}

impl BridgeState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed(_) => "failed",
        }
    }
}

/// Supervised components of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Capture,
    Encode,
    Distributor,
}

impl ComponentKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Encode => "encode",
            Self::Distributor => "distributor",
        }
    }
}

/// Per-component health state machine.
///
/// ```text
/// healthy → degraded → recovering → healthy
///                          ↓
///                        failed ──(cool-down, fresh trigger)──→ degraded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ComponentHealth {
    Healthy,
    Degraded,
    Recovering { attempts: u32 },
    Failed,
}

impl ComponentHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stopped_and_failed_are_terminal() {
        assert!(!BridgeState::Running.is_terminal());
        assert!(BridgeState::Stopped.is_terminal());
        assert!(BridgeState::Failed(BridgeError::TransportClosed).is_terminal());
    }

    #[test]
    fn recovering_is_neither_healthy_nor_failed() {
        let recovering = ComponentHealth::Recovering { attempts: 2 };
        assert!(!recovering.is_healthy());
        assert!(!recovering.is_failed());
        assert!(ComponentHealth::Failed.is_failed());
        assert!(ComponentHealth::Healthy.is_healthy());
    }
}
