//! Per-tenant service records.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use servitor_core::{ComponentName, ServiceDescriptor, ServiceRequest, StartId, StopTarget, TenantId};
use uuid::Uuid;

use crate::error::{LifecycleError, LifecycleResult};
use crate::outcome::StopOutcome;

/// Lifecycle state of one component within a tenant.
#[derive(Debug)]
pub(crate) struct ServiceRecord {
    pub(crate) descriptor: ServiceDescriptor,
    /// Regenerated whenever a record is created. Bindings remember the
    /// incarnation they were counted against.
    pub(crate) incarnation: Uuid,
    pub(crate) client_count: u32,
    /// Most recently allocated start id; `ZERO` after a reset.
    pub(crate) last_start_id: StartId,
    sticky: BTreeMap<StartId, ServiceRequest>,
    pub(crate) active_since: DateTime<Utc>,
    pub(crate) last_activity_time: DateTime<Utc>,
    pub(crate) restart_count: u32,
    destroyed: bool,
}

impl ServiceRecord {
    fn new(descriptor: ServiceDescriptor) -> Self {
        let now = Utc::now();
        Self {
            descriptor,
            incarnation: Uuid::new_v4(),
            client_count: 0,
            last_start_id: StartId::ZERO,
            sticky: BTreeMap::new(),
            active_since: now,
            last_activity_time: now,
            restart_count: 0,
            destroyed: false,
        }
    }

    fn touch(&mut self) {
        self.last_activity_time = Utc::now();
    }

    /// Clear the destroyed flag, counting a restart if it was set.
    pub(crate) fn revive(&mut self) -> bool {
        if !self.destroyed {
            return false;
        }
        self.destroyed = false;
        self.restart_count = self.restart_count.saturating_add(1);
        true
    }

    /// Undo [`revive`](Self::revive).
    fn unrevive(&mut self) {
        self.destroyed = true;
        self.restart_count = self.restart_count.saturating_sub(1);
    }

    /// No client, start id or payload refers to this record.
    fn is_idle(&self) -> bool {
        self.client_count == 0 && self.last_start_id == StartId::ZERO && self.sticky.is_empty()
    }

    /// Advance the start counter and return the new id.
    pub(crate) fn allocate_start_id(&mut self) -> Option<StartId> {
        let next = self.last_start_id.next()?;
        self.last_start_id = next;
        Some(next)
    }

    pub(crate) fn stash(&mut self, start_id: StartId, request: ServiceRequest) {
        self.sticky.insert(start_id, request);
    }

    pub(crate) fn sticky_payloads(&self) -> Vec<(StartId, ServiceRequest)> {
        self.sticky
            .iter()
            .map(|(id, request)| (*id, request.clone()))
            .collect()
    }

    /// Evaluate a stop request against the current counter.
    ///
    /// The payload stored under the requested id is dropped even when the
    /// stop is refused.
    pub(crate) fn stop(&mut self, target: StopTarget) -> StopOutcome {
        let current = self.last_start_id;
        let requested = match target {
            StopTarget::Latest => current,
            StopTarget::Id(id) => id,
        };
        self.sticky.remove(&requested);

        if requested != current {
            StopOutcome::RefusedStale { requested, current }
        } else if self.client_count > 0 {
            StopOutcome::RefusedBound {
                current,
                client_count: self.client_count,
            }
        } else {
            self.last_start_id = StartId::ZERO;
            StopOutcome::Stopped(current)
        }
    }

    pub(crate) fn destroy(&mut self) {
        self.sticky.clear();
        self.last_start_id = StartId::ZERO;
        self.destroyed = true;
    }
}

/// All records of one tenant, keyed by component.
#[derive(Debug)]
pub(crate) struct RecordTable {
    tenant: TenantId,
    records: HashMap<ComponentName, ServiceRecord>,
}

impl RecordTable {
    pub(crate) fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            records: HashMap::new(),
        }
    }

    /// Fetch the record for `descriptor`, creating it on first use.
    /// Every call counts as activity.
    pub(crate) fn get_or_create(&mut self, descriptor: &ServiceDescriptor) -> &mut ServiceRecord {
        let record = self
            .records
            .entry(descriptor.component.clone())
            .or_insert_with(|| ServiceRecord::new(descriptor.clone()));
        record.touch();
        record
    }

    pub(crate) fn get(&self, component: &ComponentName) -> Option<&ServiceRecord> {
        self.records.get(component)
    }

    pub(crate) fn get_mut(&mut self, component: &ComponentName) -> Option<&mut ServiceRecord> {
        self.records.get_mut(component)
    }

    /// Record in its current incarnation, if it still exists.
    fn attributed(&mut self, component: &ComponentName, incarnation: Uuid) -> Option<&mut ServiceRecord> {
        self.records
            .get_mut(component)
            .filter(|record| record.incarnation == incarnation)
    }

    /// Count one client against `component` if it is still in `incarnation`.
    ///
    /// Returns the new count, or `None` when the record is gone or replaced.
    pub(crate) fn acquire(
        &mut self,
        component: &ComponentName,
        incarnation: Uuid,
    ) -> LifecycleResult<Option<u32>> {
        let tenant = self.tenant;
        let Some(record) = self.attributed(component, incarnation) else {
            return Ok(None);
        };
        record.client_count =
            record
                .client_count
                .checked_add(1)
                .ok_or_else(|| LifecycleError::ClientCountOverflow {
                    tenant,
                    component: component.clone(),
                })?;
        Ok(Some(record.client_count))
    }

    /// Release one client from `component` if it is still in `incarnation`.
    ///
    /// Returns the new count, or `None` when the record is gone or replaced.
    pub(crate) fn release(
        &mut self,
        component: &ComponentName,
        incarnation: Uuid,
    ) -> LifecycleResult<Option<u32>> {
        let tenant = self.tenant;
        let Some(record) = self.attributed(component, incarnation) else {
            return Ok(None);
        };
        record.client_count =
            record
                .client_count
                .checked_sub(1)
                .ok_or_else(|| LifecycleError::ClientCountUnderflow {
                    tenant,
                    component: component.clone(),
                })?;
        Ok(Some(record.client_count))
    }

    /// Revert a bind that never took effect on `component`.
    ///
    /// Removes the record if the bind created it, or marks it destroyed
    /// again if the bind revived it. Records in another incarnation, or
    /// used by anything else in the meantime, are left alone.
    pub(crate) fn forget_attach(
        &mut self,
        component: &ComponentName,
        incarnation: Uuid,
        created: bool,
        revived: bool,
    ) {
        let idle = self
            .records
            .get(component)
            .is_some_and(|record| record.incarnation == incarnation && record.is_idle());
        if !idle {
            return;
        }
        if created {
            self.records.remove(component);
        } else if revived && let Some(record) = self.records.get_mut(component) {
            record.unrevive();
        }
    }

    /// Remove every record hosted by `process_name`, returning their
    /// components in sorted order.
    pub(crate) fn remove_process(&mut self, process_name: &str) -> Vec<ComponentName> {
        let mut removed: Vec<ComponentName> = self
            .records
            .iter()
            .filter(|(_, record)| record.descriptor.process_name == process_name)
            .map(|(component, _)| component.clone())
            .collect();
        for component in &removed {
            self.records.remove(component);
        }
        removed.sort();
        removed
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.records.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(class: &str, process: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(
            ComponentName::new("com.example", class).unwrap(),
            process,
            10_042,
        )
    }

    #[test]
    fn test_get_or_create_is_unique() {
        let mut table = RecordTable::new(TenantId::OWNER);
        let d = descriptor("com.example.Sync", "com.example");

        let first = table.get_or_create(&d).incarnation;
        let second = table.get_or_create(&d).incarnation;

        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_get_or_create_refreshes_activity() {
        let mut table = RecordTable::new(TenantId::OWNER);
        let d = descriptor("com.example.Sync", "com.example");

        let before = table.get_or_create(&d).last_activity_time;
        let after = table.get_or_create(&d).last_activity_time;

        assert!(after >= before);
        assert!(table.get(&d.component).unwrap().active_since <= after);
    }

    #[test]
    fn test_start_ids_increase_until_stop() {
        let mut table = RecordTable::new(TenantId::OWNER);
        let record = table.get_or_create(&descriptor("com.example.Sync", "com.example"));

        assert_eq!(record.allocate_start_id(), Some(StartId::new(1)));
        assert_eq!(record.allocate_start_id(), Some(StartId::new(2)));
        assert_eq!(record.stop(StopTarget::Latest), StopOutcome::Stopped(StartId::new(2)));
        assert_eq!(record.allocate_start_id(), Some(StartId::new(1)));
    }

    #[test]
    fn test_start_id_overflow() {
        let mut table = RecordTable::new(TenantId::OWNER);
        let record = table.get_or_create(&descriptor("com.example.Sync", "com.example"));
        record.last_start_id = StartId::new(u32::MAX);

        assert_eq!(record.allocate_start_id(), None);
        assert_eq!(record.last_start_id, StartId::new(u32::MAX));
    }

    #[test]
    fn test_stop_refuses_stale_and_drops_payload() {
        let mut table = RecordTable::new(TenantId::OWNER);
        let record = table.get_or_create(&descriptor("com.example.Sync", "com.example"));
        let first = record.allocate_start_id().unwrap();
        record.stash(first, ServiceRequest::new());
        let second = record.allocate_start_id().unwrap();
        record.stash(second, ServiceRequest::new());

        assert_eq!(
            record.stop(StopTarget::Id(first)),
            StopOutcome::RefusedStale {
                requested: first,
                current: second
            }
        );
        assert_eq!(record.sticky_payloads().len(), 1);
        assert_eq!(record.last_start_id, second);
    }

    #[test]
    fn test_stop_refuses_while_bound() {
        let mut table = RecordTable::new(TenantId::OWNER);
        let d = descriptor("com.example.Sync", "com.example");
        let incarnation = table.get_or_create(&d).incarnation;
        table.acquire(&d.component, incarnation).unwrap();

        let record = table.get_mut(&d.component).unwrap();
        assert_eq!(
            record.stop(StopTarget::Latest),
            StopOutcome::RefusedBound {
                current: StartId::ZERO,
                client_count: 1,
            }
        );
    }

    #[test]
    fn test_release_underflow_is_an_error() {
        let mut table = RecordTable::new(TenantId::new(4));
        let d = descriptor("com.example.Sync", "com.example");
        let incarnation = table.get_or_create(&d).incarnation;

        let err = table.release(&d.component, incarnation).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::ClientCountUnderflow {
                tenant: TenantId::new(4),
                component: d.component.clone(),
            }
        );
        assert_eq!(table.get(&d.component).unwrap().client_count, 0);
    }

    #[test]
    fn test_stale_incarnation_is_not_counted() {
        let mut table = RecordTable::new(TenantId::OWNER);
        let d = descriptor("com.example.Sync", "com.example");
        let old = table.get_or_create(&d).incarnation;
        table.acquire(&d.component, old).unwrap();

        table.remove_process("com.example");
        table.get_or_create(&d);

        assert_eq!(table.release(&d.component, old).unwrap(), None);
        assert_eq!(table.acquire(&d.component, old).unwrap(), None);
        assert_eq!(table.get(&d.component).unwrap().client_count, 0);
    }

    #[test]
    fn test_destroy_and_revive() {
        let mut table = RecordTable::new(TenantId::OWNER);
        let record = table.get_or_create(&descriptor("com.example.Sync", "com.example"));
        let id = record.allocate_start_id().unwrap();
        record.stash(id, ServiceRequest::new());

        record.destroy();
        assert!(record.sticky_payloads().is_empty());
        assert_eq!(record.last_start_id, StartId::ZERO);

        assert!(record.revive());
        assert!(!record.revive());
        assert_eq!(record.restart_count, 1);
    }

    #[test]
    fn test_remove_process_only_matches_name() {
        let mut table = RecordTable::new(TenantId::OWNER);
        table.get_or_create(&descriptor("com.example.A", "proc.A"));
        table.get_or_create(&descriptor("com.example.B", "proc.B"));
        table.get_or_create(&descriptor("com.example.C", "proc.A"));

        let removed = table.remove_process("proc.A");

        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].class(), "com.example.A");
        assert_eq!(removed[1].class(), "com.example.C");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_stop_with_zero_after_first_start_is_stale() {
        let mut table = RecordTable::new(TenantId::OWNER);
        let record = table.get_or_create(&descriptor("com.example.Sync", "com.example"));
        assert_eq!(record.allocate_start_id(), Some(StartId::new(1)));

        assert_eq!(
            record.stop(StopTarget::Id(StartId::ZERO)),
            StopOutcome::RefusedStale {
                requested: StartId::ZERO,
                current: StartId::new(1),
            }
        );
        assert_eq!(record.last_start_id, StartId::new(1));
    }

    #[test]
    fn test_forget_attach_removes_created_record() {
        let mut table = RecordTable::new(TenantId::OWNER);
        let d = descriptor("com.example.Sync", "com.example");
        let incarnation = table.get_or_create(&d).incarnation;

        table.forget_attach(&d.component, incarnation, true, false);

        assert!(table.get(&d.component).is_none());
    }

    #[test]
    fn test_forget_attach_restores_destroyed_record() {
        let mut table = RecordTable::new(TenantId::OWNER);
        let d = descriptor("com.example.Sync", "com.example");
        let record = table.get_or_create(&d);
        record.destroy();
        assert!(record.revive());
        let incarnation = record.incarnation;

        table.forget_attach(&d.component, incarnation, false, true);

        let record = table.get_mut(&d.component).unwrap();
        assert_eq!(record.restart_count, 0);
        assert!(record.revive());
        assert_eq!(record.restart_count, 1);
    }

    #[test]
    fn test_forget_attach_keeps_used_record() {
        let mut table = RecordTable::new(TenantId::OWNER);
        let d = descriptor("com.example.Sync", "com.example");
        let record = table.get_or_create(&d);
        let incarnation = record.incarnation;
        record.allocate_start_id().unwrap();

        table.forget_attach(&d.component, incarnation, true, false);
        table.forget_attach(&d.component, Uuid::new_v4(), true, false);

        assert!(table.get(&d.component).is_some());
    }
}
