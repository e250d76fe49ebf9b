//! Tenant partitions and the store that owns them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use servitor_core::{
    BindFlags, ComponentName, ConnectionId, DeathLink, ServiceDescriptor, ServiceRequest, StartId,
    TenantId,
};
use tracing::error;
use uuid::Uuid;

use crate::binding::{Binding, BindingTable};
use crate::error::{LifecycleError, LifecycleResult};
use crate::record::RecordTable;

/// Isolated lifecycle state of one tenant.
///
/// Holds two independently locked tables. Operations that need both take
/// the binding lock before the record lock.
#[derive(Debug)]
pub struct TenantPartition {
    tenant: TenantId,
    records: Mutex<RecordTable>,
    bindings: Mutex<BindingTable>,
    next_watch_seq: AtomicU64,
}

/// Client-count changes made while attaching a binding.
#[derive(Debug, Default)]
pub(crate) struct CountChange {
    /// Component and incarnation a client was counted against.
    acquired: Option<(ComponentName, Uuid)>,
    /// Component and incarnation a replaced binding was released from.
    released: Option<(ComponentName, Uuid)>,
    /// Record the binding was attached to.
    target: Option<(ComponentName, Uuid)>,
    /// The attach created the target record.
    created: bool,
    /// The attach revived a destroyed target record.
    revived: bool,
}

/// Result of attaching a binding.
#[derive(Debug)]
pub(crate) struct Attached {
    pub(crate) first_binding: bool,
    pub(crate) client_count: u32,
    pub(crate) change: CountChange,
    /// The binding this one replaced. Its watch stays armed until dropped,
    /// but it no longer guards the table entry.
    pub(crate) replaced: Option<Binding>,
}

/// A binding removed by unbind or death.
#[derive(Debug)]
pub(crate) struct Released {
    pub(crate) binding: Binding,
    /// Count after the release, `None` if the binding's record is gone.
    pub(crate) client_count: Option<u32>,
}

impl TenantPartition {
    fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            records: Mutex::new(RecordTable::new(tenant)),
            bindings: Mutex::new(BindingTable::default()),
            next_watch_seq: AtomicU64::new(1),
        }
    }

    /// Tenant this partition belongs to.
    #[must_use]
    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// Number of service records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records().len()
    }

    /// Number of bound connections.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings().len()
    }

    pub(crate) fn records(&self) -> MutexGuard<'_, RecordTable> {
        lock_recovering(&self.records, "records", self.tenant)
    }

    pub(crate) fn bindings(&self) -> MutexGuard<'_, BindingTable> {
        lock_recovering(&self.bindings, "bindings", self.tenant)
    }

    pub(crate) fn next_watch_seq(&self) -> u64 {
        self.next_watch_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate a start id for `descriptor` and store `request` under it.
    pub(crate) fn stash_start(
        &self,
        descriptor: &ServiceDescriptor,
        request: &ServiceRequest,
    ) -> LifecycleResult<StartId> {
        let mut records = self.records();
        let record = records.get_or_create(descriptor);
        record.revive();
        let start_id = record
            .allocate_start_id()
            .ok_or_else(|| LifecycleError::StartIdOverflow {
                tenant: self.tenant,
                component: descriptor.component.clone(),
            })?;
        record.stash(start_id, request.clone());
        Ok(start_id)
    }

    /// Upsert the binding for `connection` and account for it.
    ///
    /// A connection already counted against the same record incarnation is
    /// not counted again. Moving a connection to another component (or to a
    /// newer incarnation) releases the old count and takes a new one.
    pub(crate) fn attach_binding(
        &self,
        descriptor: &ServiceDescriptor,
        connection: ConnectionId,
        flags: BindFlags,
        watch_seq: u64,
    ) -> LifecycleResult<Attached> {
        let component = &descriptor.component;
        let mut bindings = self.bindings();
        let mut records = self.records();

        let created = records.get(component).is_none();
        let record = records.get_or_create(descriptor);
        let revived = record.revive();
        let incarnation = record.incarnation;

        let previous = bindings
            .get(&connection)
            .map(|binding| (binding.component.clone(), binding.incarnation));
        let first_binding = previous.is_none();

        let mut change = CountChange {
            target: Some((component.clone(), incarnation)),
            created,
            revived,
            ..CountChange::default()
        };
        let already_counted = previous
            .as_ref()
            .is_some_and(|(c, i)| c == component && *i == incarnation);
        if !already_counted {
            records.acquire(component, incarnation)?;
            change.acquired = Some((component.clone(), incarnation));
            if let Some((old_component, old_incarnation)) = previous
                && records.release(&old_component, old_incarnation)?.is_some()
            {
                change.released = Some((old_component, old_incarnation));
            }
        }

        let client_count = records.get(component).map_or(0, |r| r.client_count);
        let replaced = bindings.insert(Binding::new(
            self.tenant,
            connection,
            component.clone(),
            flags,
            incarnation,
            watch_seq,
        ));

        Ok(Attached {
            first_binding,
            client_count,
            change,
            replaced,
        })
    }

    /// Attach a death link to the binding guarded by `watch_seq`.
    ///
    /// Returns the link if the binding was already released.
    pub(crate) fn arm_watch(
        &self,
        connection: ConnectionId,
        watch_seq: u64,
        link: DeathLink,
    ) -> Option<DeathLink> {
        self.bindings().arm(&connection, watch_seq, link)
    }

    /// Undo [`attach_binding`](Self::attach_binding).
    ///
    /// Bindings and counts are only restored if the binding guarded by
    /// `watch_seq` is still installed; otherwise an unbind or death already
    /// cleaned up the connection and `replaced` is discarded. In both cases
    /// a record the attach created or revived is put back the way it was,
    /// unless something else has used it since. Returns the removed
    /// bindings so the caller drops them (cancelling their watches) outside
    /// the locks.
    pub(crate) fn rollback_binding(
        &self,
        connection: ConnectionId,
        watch_seq: u64,
        change: &CountChange,
        replaced: Option<Binding>,
    ) -> LifecycleResult<Vec<Binding>> {
        // Declared before the guards so it drops after them on every path.
        let mut discarded: Vec<Binding> = Vec::new();
        let mut bindings = self.bindings();
        let mut records = self.records();

        if bindings.is_guarded_by(&connection, watch_seq) {
            discarded.extend(bindings.remove(&connection));
            if let Some((component, incarnation)) = &change.acquired {
                records.release(component, *incarnation)?;
            }
            if let Some((component, incarnation)) = &change.released {
                records.acquire(component, *incarnation)?;
            }
            if let Some(previous) = replaced {
                discarded.extend(bindings.insert(previous));
            }
        } else {
            discarded.extend(replaced);
        }

        if let Some((component, incarnation)) = &change.target {
            records.forget_attach(component, *incarnation, change.created, change.revived);
        }

        Ok(discarded)
    }

    /// Remove the binding of `connection` and release its client count.
    ///
    /// With `watch_seq` set, the binding is only removed while that watch
    /// still guards it, so a death notification racing an explicit unbind
    /// releases at most once.
    pub(crate) fn release_binding(
        &self,
        connection: ConnectionId,
        watch_seq: Option<u64>,
    ) -> LifecycleResult<Option<Released>> {
        let mut bindings = self.bindings();
        let guarded = watch_seq.is_none_or(|seq| bindings.is_guarded_by(&connection, seq));
        if !guarded {
            return Ok(None);
        }
        let Some(binding) = bindings.remove(&connection) else {
            return Ok(None);
        };

        let mut records = self.records();
        let released = records.release(&binding.component, binding.incarnation);
        drop(records);
        drop(bindings);

        Ok(Some(Released {
            client_count: released?,
            binding,
        }))
    }

    pub(crate) fn is_bound(&self, connection: &ConnectionId) -> bool {
        self.bindings().get(connection).is_some()
    }
}

fn lock_recovering<'a, T>(
    mutex: &'a Mutex<T>,
    table: &'static str,
    tenant: TenantId,
) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        error!(%tenant, table, "Recovering poisoned lifecycle table lock");
        poisoned.into_inner()
    })
}

/// Tenant id → partition map with atomic lazy creation.
#[derive(Debug, Default)]
pub struct PartitionStore {
    partitions: DashMap<TenantId, Arc<TenantPartition>>,
}

impl PartitionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Partition of `tenant`, created on first access.
    #[must_use]
    pub fn get_or_create(&self, tenant: TenantId) -> Arc<TenantPartition> {
        let entry = self
            .partitions
            .entry(tenant)
            .or_insert_with(|| Arc::new(TenantPartition::new(tenant)));
        Arc::clone(entry.value())
    }

    /// Partition of `tenant`, if one exists.
    #[must_use]
    pub fn get(&self, tenant: TenantId) -> Option<Arc<TenantPartition>> {
        self.partitions
            .get(&tenant)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// All tenants with a partition, in ascending order.
    #[must_use]
    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self.partitions.iter().map(|entry| *entry.key()).collect();
        tenants.sort_unstable();
        tenants
    }

    /// Number of partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Whether no partition exists yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}
