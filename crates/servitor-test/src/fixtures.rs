//! Test fixtures for common types.

use serde_json::json;
use servitor_core::{ComponentName, ProcessHandle, ServiceDescriptor, ServiceRequest, TenantId};

/// Package every fixture component belongs to.
pub const TEST_PACKAGE: &str = "com.example.app";

/// Default host process of fixture components.
pub const TEST_PROCESS: &str = "com.example.app";

/// App uid of the fixture package.
pub const TEST_APP_UID: u32 = 10_042;

/// Component `com.example.app/.{suffix}`.
///
/// # Panics
///
/// Panics if `suffix` is not a valid class-name suffix.
#[must_use]
pub fn test_component(suffix: &str) -> ComponentName {
    ComponentName::new(TEST_PACKAGE, format!("{TEST_PACKAGE}.{suffix}"))
        .expect("fixture component name must be valid")
}

/// Descriptor of `test_component(suffix)` hosted in [`TEST_PROCESS`].
#[must_use]
pub fn test_descriptor(suffix: &str) -> ServiceDescriptor {
    test_descriptor_in(suffix, TEST_PROCESS)
}

/// Descriptor of `test_component(suffix)` hosted in `process_name`.
#[must_use]
pub fn test_descriptor_in(suffix: &str, process_name: &str) -> ServiceDescriptor {
    ServiceDescriptor::new(test_component(suffix), process_name, TEST_APP_UID)
}

/// Request explicitly targeting `test_component(suffix)`.
#[must_use]
pub fn test_request(suffix: &str) -> ServiceRequest {
    ServiceRequest::for_component(test_component(suffix)).with_data(json!({ "target": suffix }))
}

/// Running process `process_name` for the fixture package in `tenant`.
///
/// # Panics
///
/// Panics if the tenant's uid range overflows.
#[must_use]
pub fn test_process(process_name: &str, tenant: TenantId, pid: u32) -> ProcessHandle {
    ProcessHandle {
        process_name: process_name.to_owned(),
        pid,
        vpid: 0,
        uid: tenant
            .uid_for(TEST_APP_UID)
            .expect("fixture tenant must have a valid uid range"),
        is_64bit: true,
    }
}

/// Install the telemetry subscriber in test mode: `warn` into the libtest
/// capture unless `RUST_LOG` says otherwise.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_logging() {
    let _ = servitor_telemetry::setup_logging(&servitor_telemetry::LogConfig::for_tests("warn"));
}
