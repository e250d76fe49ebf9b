//! Outcome of a stop request.

use serde::{Deserialize, Serialize};
use servitor_core::StartId;

/// Result of a stop request.
///
/// Refusals are expected outcomes the caller branches on, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StopOutcome {
    /// The tenant has no record for the component.
    NoOp,
    /// The requested start id is not the component's current one.
    RefusedStale {
        /// Id the caller asked to stop.
        requested: StartId,
        /// The component's current start id.
        current: StartId,
    },
    /// Clients are still bound.
    RefusedBound {
        /// The component's current start id.
        current: StartId,
        /// Number of bound clients.
        client_count: u32,
    },
    /// The component was stopped; carries the start id that matched.
    Stopped(StartId),
}

impl StopOutcome {
    /// Whether the stop went through.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    /// Whether the stop was refused.
    #[must_use]
    pub fn is_refused(&self) -> bool {
        matches!(self, Self::RefusedStale { .. } | Self::RefusedBound { .. })
    }
}
