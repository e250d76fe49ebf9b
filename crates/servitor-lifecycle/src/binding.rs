//! Per-tenant client bindings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use servitor_core::{BindFlags, ComponentName, ConnectionId, DeathLink, TenantId};
use uuid::Uuid;

/// One client connection bound to a component.
#[derive(Debug)]
pub(crate) struct Binding {
    pub(crate) tenant: TenantId,
    pub(crate) connection: ConnectionId,
    pub(crate) component: ComponentName,
    pub(crate) flags: BindFlags,
    /// Record incarnation this binding's client count was taken against.
    pub(crate) incarnation: Uuid,
    /// Identifies the death watch guarding this entry.
    pub(crate) watch_seq: u64,
    pub(crate) bound_at: DateTime<Utc>,
    link: Option<DeathLink>,
}

impl Binding {
    pub(crate) fn new(
        tenant: TenantId,
        connection: ConnectionId,
        component: ComponentName,
        flags: BindFlags,
        incarnation: Uuid,
        watch_seq: u64,
    ) -> Self {
        Self {
            tenant,
            connection,
            component,
            flags,
            incarnation,
            watch_seq,
            bound_at: Utc::now(),
            link: None,
        }
    }

    pub(crate) fn is_watched(&self) -> bool {
        self.link.is_some()
    }
}

/// Connection → binding map of one tenant.
///
/// Dropping a [`Binding`] cancels its death watch, so removed entries must be
/// dropped after the table lock is released.
#[derive(Debug, Default)]
pub(crate) struct BindingTable {
    bindings: HashMap<ConnectionId, Binding>,
}

impl BindingTable {
    pub(crate) fn get(&self, connection: &ConnectionId) -> Option<&Binding> {
        self.bindings.get(connection)
    }

    /// Whether `connection` is bound and still guarded by `watch_seq`.
    pub(crate) fn is_guarded_by(&self, connection: &ConnectionId, watch_seq: u64) -> bool {
        self.bindings
            .get(connection)
            .is_some_and(|binding| binding.watch_seq == watch_seq)
    }

    /// Insert `binding`, returning the entry it replaced.
    pub(crate) fn insert(&mut self, binding: Binding) -> Option<Binding> {
        self.bindings.insert(binding.connection, binding)
    }

    pub(crate) fn remove(&mut self, connection: &ConnectionId) -> Option<Binding> {
        self.bindings.remove(connection)
    }

    /// Attach `link` to the binding guarded by `watch_seq`.
    ///
    /// Hands the link back if that binding is gone.
    pub(crate) fn arm(
        &mut self,
        connection: &ConnectionId,
        watch_seq: u64,
        link: DeathLink,
    ) -> Option<DeathLink> {
        match self.bindings.get_mut(connection) {
            Some(binding) if binding.watch_seq == watch_seq => {
                binding.link = Some(link);
                None
            },
            _ => Some(link),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bindings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn binding(connection: ConnectionId, watch_seq: u64) -> Binding {
        Binding::new(
            TenantId::OWNER,
            connection,
            "com.example/.Sync".parse().unwrap(),
            BindFlags::AUTO_CREATE,
            Uuid::new_v4(),
            watch_seq,
        )
    }

    #[test]
    fn test_insert_replaces() {
        let mut table = BindingTable::default();
        let connection = ConnectionId::new();

        assert!(table.insert(binding(connection, 1)).is_none());
        let replaced = table.insert(binding(connection, 2)).unwrap();

        assert_eq!(replaced.watch_seq, 1);
        assert!(table.is_guarded_by(&connection, 2));
        assert!(!table.is_guarded_by(&connection, 1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_arm_only_matching_watch() {
        let mut table = BindingTable::default();
        let connection = ConnectionId::new();
        table.insert(binding(connection, 7));

        assert!(table.arm(&connection, 6, DeathLink::detached()).is_some());
        assert!(!table.get(&connection).unwrap().is_watched());

        assert!(table.arm(&connection, 7, DeathLink::detached()).is_none());
        assert!(table.get(&connection).unwrap().is_watched());
    }

    #[test]
    fn test_dropping_removed_binding_cancels_watch() {
        let mut table = BindingTable::default();
        let connection = ConnectionId::new();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        table.insert(binding(connection, 1));
        table.arm(
            &connection,
            1,
            DeathLink::new(move || flag.store(true, Ordering::SeqCst)),
        );

        let removed = table.remove(&connection).unwrap();
        assert!(!cancelled.load(Ordering::SeqCst));
        drop(removed);
        assert!(cancelled.load(Ordering::SeqCst));
    }
}
