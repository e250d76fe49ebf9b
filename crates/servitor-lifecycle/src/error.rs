//! Lifecycle error types.

use servitor_core::{ComponentName, TenantId};
use thiserror::Error;

/// Errors returned by the lifecycle coordinator.
///
/// Expected outcomes such as a refused stop are not errors; see
/// [`StopOutcome`](crate::StopOutcome). Everything except
/// [`UnknownComponent`](Self::UnknownComponent) indicates broken
/// bookkeeping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// The tenant has no record for the component.
    #[error("unknown component {component} in {tenant}")]
    UnknownComponent {
        /// Tenant that was searched.
        tenant: TenantId,
        /// Component that was not found.
        component: ComponentName,
    },

    /// A release would have driven a client count below zero.
    #[error("client count underflow for {component} in {tenant}")]
    ClientCountUnderflow {
        /// Owning tenant.
        tenant: TenantId,
        /// Affected component.
        component: ComponentName,
    },

    /// A client count exceeded `u32::MAX`.
    #[error("client count overflow for {component} in {tenant}")]
    ClientCountOverflow {
        /// Owning tenant.
        tenant: TenantId,
        /// Affected component.
        component: ComponentName,
    },

    /// The start-id counter of a component is exhausted.
    #[error("start id overflow for {component} in {tenant}")]
    StartIdOverflow {
        /// Owning tenant.
        tenant: TenantId,
        /// Affected component.
        component: ComponentName,
    },
}

impl LifecycleError {
    /// Whether this error means the coordinator's counters are inconsistent.
    #[must_use]
    pub fn is_consistency_violation(&self) -> bool {
        !matches!(self, Self::UnknownComponent { .. })
    }

    /// Tenant the error concerns.
    #[must_use]
    pub fn tenant(&self) -> TenantId {
        match self {
            Self::UnknownComponent { tenant, .. }
            | Self::ClientCountUnderflow { tenant, .. }
            | Self::ClientCountOverflow { tenant, .. }
            | Self::StartIdOverflow { tenant, .. } => *tenant,
        }
    }

    /// Component the error concerns.
    #[must_use]
    pub fn component(&self) -> &ComponentName {
        match self {
            Self::UnknownComponent { component, .. }
            | Self::ClientCountUnderflow { component, .. }
            | Self::ClientCountOverflow { component, .. }
            | Self::StartIdOverflow { component, .. } => component,
        }
    }
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
