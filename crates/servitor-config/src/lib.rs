#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Configuration for the Servitor coordinator.
//!
//! # Usage
//!
//! ```rust,no_run
//! use servitor_config::Config;
//!
//! // defaults → /etc/servitor/config.toml → explicit file → env fallback
//! let resolved = Config::load(Some(std::path::Path::new("servitor.toml"))).unwrap();
//! println!(
//!     "rollback on launch failure: {}",
//!     resolved.config.coordinator.rollback_bind_on_launch_failure
//! );
//! ```
//!
//! # Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Explicit file** passed to [`Config::load`]
//! 2. **System** (`/etc/servitor/config.toml`)
//! 3. **Environment variables** (`SERVITOR_*`), applied only to fields no
//!    file set
//! 4. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate has no dependencies on other servitor crates. Conversion into
//! domain types happens where the coordinator is built.

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layered merging and per-field source tracking.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::ResolvedConfig;
pub use merge::{ConfigLayer, FieldSources};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load(explicit: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(explicit, &env::collect_env_vars())
    }

    /// Load configuration from a single file (no layering, no env).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
