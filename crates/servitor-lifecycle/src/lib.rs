//! Servitor Lifecycle - Tenant-partitioned service lifecycle coordinator.
//!
//! The [`LifecycleCoordinator`] decides when hosted services start, bind,
//! unbind and stop. Every tenant owns an isolated [`TenantPartition`] with
//! its own service records and client bindings, so work for one tenant
//! never waits on another.
//!
//! Process launching, component resolution and payload delivery are left to
//! the [`Collaborators`] the coordinator is built with.
//!
//! # Example
//!
//! ```rust,ignore
//! use servitor_lifecycle::prelude::*;
//!
//! let coordinator = LifecycleCoordinator::new(collaborators, CoordinatorConfig::default(), EventBus::new());
//!
//! let started = coordinator.start_service(tenant, request, caller_uid).await?;
//! let outcome = coordinator.stop_service(tenant, &component, SENTINEL_LAST);
//! assert!(outcome.is_stopped());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod binding;
mod config;
mod coordinator;
mod dispatch;
mod error;
mod outcome;
mod partition;
mod record;

pub use config::CoordinatorConfig;
pub use coordinator::{Collaborators, LifecycleCoordinator};
pub use dispatch::ChannelDispatcher;
pub use error::{LifecycleError, LifecycleResult};
pub use outcome::StopOutcome;
pub use partition::{PartitionStore, TenantPartition};
