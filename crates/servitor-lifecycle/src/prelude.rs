//! Prelude module - commonly used types for convenient import.
//!
//! Use `use servitor_lifecycle::prelude::*;` to import the coordinator and
//! the core types its operations take.

// Coordinator
pub use crate::{Collaborators, CoordinatorConfig, LifecycleCoordinator};

// Outcomes and errors
pub use crate::{LifecycleError, LifecycleResult, StopOutcome};

// Partitions
pub use crate::{PartitionStore, TenantPartition};

// Delivery
pub use crate::ChannelDispatcher;

// Core types
pub use servitor_core::{
    BindFlags, ComponentName, Connection, ConnectionId, ProxyRequest, SENTINEL_LAST,
    ServiceDescriptor, ServiceRequest, ServiceSnapshot, StartId, StopTarget, TenantId,
};

// Events
pub use servitor_events::{EventBus, EventReceiver, LifecycleEvent};
