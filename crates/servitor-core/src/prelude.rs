//! Prelude module - commonly used types for convenient import.
//!
//! Use `use servitor_core::prelude::*;` to import all essential types.

// Identifiers
pub use crate::{
    BindFlags, ComponentName, ConnectionId, SENTINEL_LAST, StartId, StopTarget, TenantId,
};

// Service model
pub use crate::{ProcessHandle, ProxyRequest, ServiceDescriptor, ServiceRequest, ServiceSnapshot};

// Collaborators
pub use crate::{
    Connection, DeathLink, DeathRecipient, Dispatcher, ProcessLauncher, ProcessRegistry,
    ServiceResolver,
};

// Errors
pub use crate::{CoreError, CoreResult, LaunchError, LinkError};
