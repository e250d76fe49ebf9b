//! Lifecycle event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use servitor_core::{ComponentName, ConnectionId, StartId, TenantId};
use uuid::Uuid;

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Component that generated the event.
    pub source: String,
}

impl EventMetadata {
    /// Create new event metadata.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// State transitions observed by the lifecycle coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A start request was accepted and handed to the dispatcher.
    ServiceStarted {
        /// Event metadata.
        metadata: EventMetadata,
        /// Owning tenant.
        tenant: TenantId,
        /// Started component.
        component: ComponentName,
        /// Start id allocated for the request.
        start_id: StartId,
        /// Host process name.
        process_name: String,
    },

    /// A client connection was bound to a component.
    ServiceBound {
        /// Event metadata.
        metadata: EventMetadata,
        /// Owning tenant.
        tenant: TenantId,
        /// Bound component.
        component: ComponentName,
        /// Client connection.
        connection: ConnectionId,
        /// Whether the connection was new to the tenant.
        first_binding: bool,
        /// Client count after the bind.
        client_count: u32,
    },

    /// A client connection was explicitly unbound.
    ServiceUnbound {
        /// Event metadata.
        metadata: EventMetadata,
        /// Owning tenant.
        tenant: TenantId,
        /// Component the connection was bound to.
        component: ComponentName,
        /// Client connection.
        connection: ConnectionId,
        /// Client count after the unbind, if the record still exists.
        client_count: Option<u32>,
    },

    /// A bound client died and its binding was cleaned up.
    BindingDied {
        /// Event metadata.
        metadata: EventMetadata,
        /// Owning tenant.
        tenant: TenantId,
        /// Component the connection was bound to.
        component: ComponentName,
        /// Dead client connection.
        connection: ConnectionId,
    },

    /// A stop request was refused.
    StopRefused {
        /// Event metadata.
        metadata: EventMetadata,
        /// Owning tenant.
        tenant: TenantId,
        /// Target component.
        component: ComponentName,
        /// Start id the caller asked to stop.
        requested: StartId,
        /// The component's current start id.
        current: StartId,
        /// Bound clients at the time of the request.
        client_count: u32,
    },

    /// A component was stopped.
    ServiceStopped {
        /// Event metadata.
        metadata: EventMetadata,
        /// Owning tenant.
        tenant: TenantId,
        /// Stopped component.
        component: ComponentName,
        /// Start id the stop matched.
        start_id: StartId,
    },

    /// The hosted instance of a component was destroyed.
    ServiceDestroyed {
        /// Event metadata.
        metadata: EventMetadata,
        /// Owning tenant.
        tenant: TenantId,
        /// Destroyed component.
        component: ComponentName,
    },

    /// A host process terminated and its records were removed.
    ProcessTerminated {
        /// Event metadata.
        metadata: EventMetadata,
        /// Owning tenant.
        tenant: TenantId,
        /// Terminated process.
        process_name: String,
        /// Components whose records were removed.
        removed: Vec<ComponentName>,
    },

    /// Bookkeeping was found inconsistent.
    ConsistencyViolation {
        /// Event metadata.
        metadata: EventMetadata,
        /// Owning tenant.
        tenant: TenantId,
        /// Affected component.
        component: ComponentName,
        /// What went wrong.
        detail: String,
    },
}

impl LifecycleEvent {
    /// Stable snake-case name of the event type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceBound { .. } => "service_bound",
            Self::ServiceUnbound { .. } => "service_unbound",
            Self::BindingDied { .. } => "binding_died",
            Self::StopRefused { .. } => "stop_refused",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::ServiceDestroyed { .. } => "service_destroyed",
            Self::ProcessTerminated { .. } => "process_terminated",
            Self::ConsistencyViolation { .. } => "consistency_violation",
        }
    }

    /// Event metadata.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::ServiceStarted { metadata, .. }
            | Self::ServiceBound { metadata, .. }
            | Self::ServiceUnbound { metadata, .. }
            | Self::BindingDied { metadata, .. }
            | Self::StopRefused { metadata, .. }
            | Self::ServiceStopped { metadata, .. }
            | Self::ServiceDestroyed { metadata, .. }
            | Self::ProcessTerminated { metadata, .. }
            | Self::ConsistencyViolation { metadata, .. } => metadata,
        }
    }

    /// Tenant the event belongs to.
    #[must_use]
    pub fn tenant(&self) -> TenantId {
        match self {
            Self::ServiceStarted { tenant, .. }
            | Self::ServiceBound { tenant, .. }
            | Self::ServiceUnbound { tenant, .. }
            | Self::BindingDied { tenant, .. }
            | Self::StopRefused { tenant, .. }
            | Self::ServiceStopped { tenant, .. }
            | Self::ServiceDestroyed { tenant, .. }
            | Self::ProcessTerminated { tenant, .. }
            | Self::ConsistencyViolation { tenant, .. } => *tenant,
        }
    }

    /// Component the event is about, if it concerns a single component.
    #[must_use]
    pub fn component(&self) -> Option<&ComponentName> {
        match self {
            Self::ServiceStarted { component, .. }
            | Self::ServiceBound { component, .. }
            | Self::ServiceUnbound { component, .. }
            | Self::BindingDied { component, .. }
            | Self::StopRefused { component, .. }
            | Self::ServiceStopped { component, .. }
            | Self::ServiceDestroyed { component, .. }
            | Self::ConsistencyViolation { component, .. } => Some(component),
            Self::ProcessTerminated { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component() -> ComponentName {
        "com.example/.Sync".parse().unwrap()
    }

    #[test]
    fn test_event_type_names() {
        let event = LifecycleEvent::ServiceStopped {
            metadata: EventMetadata::new("test"),
            tenant: TenantId::new(3),
            component: component(),
            start_id: StartId::new(2),
        };
        assert_eq!(event.event_type(), "service_stopped");
        assert_eq!(event.tenant(), TenantId::new(3));
        assert_eq!(event.component(), Some(&component()));
        assert_eq!(event.metadata().source, "test");
    }

    #[test]
    fn test_process_terminated_has_no_single_component() {
        let event = LifecycleEvent::ProcessTerminated {
            metadata: EventMetadata::default(),
            tenant: TenantId::OWNER,
            process_name: "com.example:remote".to_owned(),
            removed: vec![component()],
        };
        assert!(event.component().is_none());
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let event = LifecycleEvent::ServiceDestroyed {
            metadata: EventMetadata::new("test"),
            tenant: TenantId::new(1),
            component: component(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "service_destroyed");
        assert_eq!(json["component"], "com.example/com.example.Sync");
    }
}
