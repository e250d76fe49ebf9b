//! Service descriptors, requests, proxy payloads and status snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ComponentName, StartId, TenantId};

/// A client's request to start or bind a service.
///
/// The coordinator never interprets `data`; it is stored as the sticky
/// payload and handed back to the dispatcher unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Requested action, if any.
    #[serde(default)]
    pub action: Option<String>,
    /// Explicit target component, if the caller named one.
    #[serde(default)]
    pub component: Option<ComponentName>,
    /// Package the request is restricted to, if any.
    #[serde(default)]
    pub package: Option<String>,
    /// Opaque caller data.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ServiceRequest {
    /// Create an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a request explicitly targeting `component`.
    #[must_use]
    pub fn for_component(component: ComponentName) -> Self {
        Self {
            package: Some(component.package().to_owned()),
            component: Some(component),
            ..Self::default()
        }
    }

    /// Set the action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Attach opaque caller data.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Resolved description of a service component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Component identity.
    pub component: ComponentName,
    /// Name of the process that hosts the component.
    pub process_name: String,
    /// Uid of the owning application.
    pub uid: u32,
}

impl ServiceDescriptor {
    /// Describe `component` hosted in `process_name`.
    #[must_use]
    pub fn new(component: ComponentName, process_name: impl Into<String>, uid: u32) -> Self {
        Self {
            component,
            process_name: process_name.into(),
            uid,
        }
    }

    /// Package that owns the component.
    #[must_use]
    pub fn package(&self) -> &str {
        self.component.package()
    }
}

/// A live host process as reported by the launcher or registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    /// Process name.
    pub process_name: String,
    /// OS process id.
    pub pid: u32,
    /// Virtual process slot used to pick the stub that hosts the service.
    pub vpid: u32,
    /// Effective uid of the process.
    pub uid: u32,
    /// Whether the process runs a 64-bit runtime.
    pub is_64bit: bool,
}

/// Typed payload describing how to deliver a start or bind into a host
/// process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    /// Tenant the request belongs to.
    pub tenant: TenantId,
    /// Process that must receive the request.
    pub process: ProcessHandle,
    /// Target component.
    pub descriptor: ServiceDescriptor,
    /// Start id allocated for this delivery.
    pub start_id: StartId,
    /// The original client request.
    pub request: ServiceRequest,
    /// When the coordinator issued this payload.
    pub issued_at: DateTime<Utc>,
}

/// Point-in-time view of one running service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    /// Host process name.
    pub process: String,
    /// Host process id.
    pub pid: u32,
    /// Effective uid inside the tenant.
    pub uid: u32,
    /// Number of bound clients.
    pub client_count: u32,
    /// Package that owns the service.
    pub client_package: String,
    /// Component identity.
    pub component: ComponentName,
    /// Always `true` for reported services.
    pub started: bool,
    /// How many times the component was brought back after being destroyed.
    pub restart_count: u32,
    /// When the record was created.
    pub active_since: DateTime<Utc>,
    /// Last start or access.
    pub last_activity_time: DateTime<Utc>,
}
