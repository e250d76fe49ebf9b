//! Prelude module - commonly used test utilities.
//!
//! Use `use servitor_test::prelude::*;` to import all mocks and fixtures.

pub use crate::fixtures::*;
pub use crate::mocks::{
    LaunchCall, MockConnection, MockLauncher, MockProcessRegistry, MockResolver,
    RecordingDispatcher,
};
