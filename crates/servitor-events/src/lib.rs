//! Servitor Events - Lifecycle event bus for the Servitor coordinator.
//!
//! The coordinator publishes a [`LifecycleEvent`] for every externally
//! visible state transition: starts, binds, unbinds, client deaths, stop
//! decisions, destroys, process terminations and bookkeeping violations.
//! Subscribers receive them through a tokio broadcast channel.
//!
//! # Example
//!
//! ```rust
//! use servitor_core::TenantId;
//! use servitor_events::{EventBus, EventMetadata, LifecycleEvent};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! let mut receiver = bus.subscribe();
//!
//! bus.publish(LifecycleEvent::ServiceDestroyed {
//!     metadata: EventMetadata::new("lifecycle"),
//!     tenant: TenantId::OWNER,
//!     component: "com.example/.Sync".parse().unwrap(),
//! });
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.event_type(), "service_destroyed");
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bus;
mod event;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{EventMetadata, LifecycleEvent};
