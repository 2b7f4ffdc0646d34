use std::sync::Arc;

use crate::models::error::BridgeError;
use crate::models::state::ComponentKind;
use crate::streaming::distributor::StreamDistributor;
use crate::traits::capture_source::SharedCapture;
use crate::traits::encoder::SharedEncoder;

/// The closed set of components the supervisor watches.
#[derive(Clone)]
pub enum ManagedComponent {
    Capture(SharedCapture),
    Encode(SharedEncoder),
    Distributor(Arc<StreamDistributor>),
}

impl ManagedComponent {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Capture(_) => ComponentKind::Capture,
            Self::Encode(_) => ComponentKind::Encode,
            Self::Distributor(_) => ComponentKind::Distributor,
        }
    }

    pub fn check_health(&self) -> bool {
        match self {
            Self::Capture(capture) => capture.lock().is_healthy(),
            Self::Encode(encoder) => encoder.lock().is_healthy(),
            Self::Distributor(distributor) => distributor.is_healthy(),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        match self {
            Self::Capture(capture) => capture.lock().last_error(),
            Self::Encode(encoder) => encoder.lock().last_error(),
            Self::Distributor(distributor) => distributor.last_error(),
        }
    }

    pub fn attempt_recovery(&self) -> Result<(), BridgeError> {
        match self {
            Self::Capture(capture) => capture.lock().attempt_recovery(),
            Self::Encode(encoder) => encoder.lock().attempt_recovery(),
            Self::Distributor(distributor) => distributor.attempt_recovery(),
        }
    }
}

impl std::fmt::Debug for ManagedComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ManagedComponent").field(&self.kind()).finish()
    }
}
