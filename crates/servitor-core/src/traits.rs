//! Collaborator traits consumed by the coordinator.
//!
//! The coordinator never performs I/O itself. Everything that touches a real
//! process, package database or IPC transport sits behind one of these
//! traits so it can be replaced by an in-memory fake in tests.

use async_trait::async_trait;

use crate::error::LaunchError;
use crate::ids::TenantId;
use crate::service::{ProcessHandle, ProxyRequest, ServiceDescriptor, ServiceRequest};

/// Resolves a client request to a concrete service component.
#[async_trait]
pub trait ServiceResolver: Send + Sync {
    /// Resolve `request` within `tenant`. `None` means no matching service.
    async fn resolve(&self, request: &ServiceRequest, tenant: TenantId)
    -> Option<ServiceDescriptor>;
}

/// Starts (or finds) the process that hosts a service.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Ensure `process_name` is running for `tenant`.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError`] if the process cannot be provided.
    async fn ensure_process(
        &self,
        process_name: &str,
        tenant: TenantId,
        package: &str,
        caller_uid: u32,
    ) -> Result<ProcessHandle, LaunchError>;
}

/// Looks up running processes.
#[async_trait]
pub trait ProcessRegistry: Send + Sync {
    /// Find the process named `process_name` running as `uid`.
    async fn find(&self, process_name: &str, uid: u32) -> Option<ProcessHandle>;
}

/// Delivers proxy requests into hosted processes.
///
/// Delivery is fire-and-forget from the coordinator's point of view, so
/// implementations must not block.
pub trait Dispatcher: Send + Sync {
    /// Queue `request` for delivery.
    fn dispatch(&self, request: ProxyRequest);
}
