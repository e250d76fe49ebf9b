//! Servitor Core - Shared types for the Servitor service-lifecycle coordinator.
//!
//! This crate provides:
//! - Identifiers for tenants, components, connections and start ids
//! - Service descriptors, requests and the typed proxy payload handed to
//!   dispatchers
//! - Read-only snapshots used for status reporting
//! - The collaborator traits the coordinator consumes (resolver, process
//!   launcher, process registry, dispatcher, client connections)
//!
//! # Example
//!
//! ```rust
//! use servitor_core::{ComponentName, StopTarget, TenantId, SENTINEL_LAST};
//!
//! let component = ComponentName::new("com.example.app", "com.example.app.SyncService").unwrap();
//! assert_eq!(component.package(), "com.example.app");
//!
//! let tenant = TenantId::new(10);
//! assert_eq!(tenant.uid_for(10_042), Some(1_010_042));
//!
//! assert_eq!(SENTINEL_LAST, StopTarget::Latest);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod connection;
pub mod error;
pub mod ids;
pub mod service;
pub mod traits;

pub use connection::{Connection, DeathLink, DeathRecipient};
pub use error::{CoreError, CoreResult, LaunchError, LinkError};
pub use ids::{
    BindFlags, ComponentName, ConnectionId, PER_TENANT_UID_RANGE, SENTINEL_LAST, StartId,
    StopTarget, TenantId,
};
pub use service::{ProcessHandle, ProxyRequest, ServiceDescriptor, ServiceRequest, ServiceSnapshot};
pub use traits::{Dispatcher, ProcessLauncher, ProcessRegistry, ServiceResolver};
