use crate::models::error::BridgeError;
use crate::models::state::{BridgeState, ComponentHealth, ComponentKind};

/// Observer of component health transitions.
///
/// The supervisor calls this from its own thread, outside of any lock.
pub trait HealthObserver: Send + Sync {
    fn on_health_changed(&self, component: ComponentKind, health: ComponentHealth);
}

/// Event delegate for bridge notifications.
///
/// All methods are called from background threads. Implementations should be
/// quick and must not call back into the bridge's `stop()`.
pub trait BridgeDelegate: Send + Sync {
    /// Called when the bridge lifecycle state changes.
    fn on_state_changed(&self, state: &BridgeState);

    /// Called when a supervised component changes health.
    fn on_health_changed(&self, component: ComponentKind, health: ComponentHealth);

    /// Called when the adaptive controller applies a new encoder bitrate.
    fn on_bitrate_changed(&self, kbps: u32);

    /// Called when a background loop hits an error it will retry.
    fn on_error(&self, error: &BridgeError);
}
