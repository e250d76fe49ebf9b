//! Servitor Telemetry - Logging for the Servitor service-lifecycle coordinator.
//!
//! The coordinator crates only emit `tracing` events. This crate installs the
//! subscriber that renders them: an env filter plus one fmt layer writing to
//! stdout, stderr, a rolling file or the libtest capture. With the `config`
//! feature a [`LogConfig`] can be built from the `[logging]` section of a
//! loaded `servitor-config` file.
//!
//! # Example
//!
//! ```rust,no_run
//! use servitor_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), servitor_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("servitor_lifecycle=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("coordinator ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_logging};
