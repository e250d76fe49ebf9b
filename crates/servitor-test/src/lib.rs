//! Servitor Test - Shared test utilities for the Servitor coordinator.
//!
//! This crate provides in-memory implementations of every collaborator the
//! lifecycle coordinator consumes, plus fixtures. Use it as a
//! dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! servitor-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use servitor_test::{MockConnection, MockLauncher, test_descriptor};
//!
//! let launcher = MockLauncher::new().failing("com.example.app:remote");
//! let connection = MockConnection::new();
//! // ... bind through the coordinator, then simulate the client dying:
//! connection.kill();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
