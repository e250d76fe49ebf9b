//! The lifecycle coordinator.
//!
//! Every public operation follows the same shape: call collaborators with no
//! table lock held, mutate the tenant's tables inside a short critical
//! section, then log and publish events after the locks are released.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use servitor_core::{
    BindFlags, ComponentName, Connection, ConnectionId, DeathRecipient, Dispatcher, LinkError,
    ProcessLauncher, ProcessRegistry, ProxyRequest, ServiceDescriptor, ServiceRequest,
    ServiceResolver, ServiceSnapshot, StartId, StopTarget, TenantId,
};
use servitor_events::{EventBus, EventMetadata, EventReceiver, LifecycleEvent};
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{LifecycleError, LifecycleResult};
use crate::outcome::StopOutcome;
use crate::partition::{PartitionStore, TenantPartition};

/// Source name stamped on published events.
const EVENT_SOURCE: &str = "servitor-lifecycle";

/// External services the coordinator delegates to.
#[derive(Clone)]
pub struct Collaborators {
    /// Resolves start requests to components.
    pub resolver: Arc<dyn ServiceResolver>,
    /// Starts host processes.
    pub launcher: Arc<dyn ProcessLauncher>,
    /// Finds running host processes.
    pub registry: Arc<dyn ProcessRegistry>,
    /// Delivers start requests into host processes.
    pub dispatcher: Arc<dyn Dispatcher>,
}

impl Collaborators {
    /// Bundle the four collaborators.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn ServiceResolver>,
        launcher: Arc<dyn ProcessLauncher>,
        registry: Arc<dyn ProcessRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            resolver,
            launcher,
            registry,
            dispatcher,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Tracks started and bound services per tenant.
///
/// The coordinator owns all service records. Callers only ever see
/// snapshots and the decisions it returns; the process and IPC work those
/// decisions imply is left to the caller and the [`Dispatcher`].
#[derive(Debug)]
pub struct LifecycleCoordinator {
    partitions: PartitionStore,
    collaborators: Collaborators,
    config: CoordinatorConfig,
    events: EventBus,
}

/// Query row gathered under the record lock, completed after it.
struct PendingSnapshot {
    descriptor: ServiceDescriptor,
    client_count: u32,
    restart_count: u32,
    active_since: chrono::DateTime<Utc>,
    last_activity_time: chrono::DateTime<Utc>,
}

impl LifecycleCoordinator {
    /// Create a coordinator publishing to `events`.
    #[must_use]
    pub fn new(collaborators: Collaborators, config: CoordinatorConfig, events: EventBus) -> Self {
        Self {
            partitions: PartitionStore::new(),
            collaborators,
            config,
            events,
        }
    }

    /// Create a coordinator from loaded configuration.
    #[must_use]
    pub fn from_config(collaborators: Collaborators, config: &servitor_config::Config) -> Self {
        Self::new(
            collaborators,
            CoordinatorConfig::from(config),
            EventBus::with_capacity(config.events.channel_capacity),
        )
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The tenant partitions.
    #[must_use]
    pub fn partitions(&self) -> &PartitionStore {
        &self.partitions
    }

    /// The bus lifecycle events are published on.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Start the service `request` resolves to.
    ///
    /// Returns the started component, or `None` when the request does not
    /// resolve or its host process cannot be launched. Neither case changes
    /// any state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::StartIdOverflow`] if the component's start
    /// counter is exhausted.
    pub async fn start_service(
        &self,
        tenant: TenantId,
        request: ServiceRequest,
        caller_uid: u32,
    ) -> LifecycleResult<Option<ComponentName>> {
        let Some(descriptor) = self.collaborators.resolver.resolve(&request, tenant).await else {
            debug!(%tenant, action = ?request.action, "Start request did not resolve");
            return Ok(None);
        };
        let component = descriptor.component.clone();

        let process = match self
            .collaborators
            .launcher
            .ensure_process(&descriptor.process_name, tenant, descriptor.package(), caller_uid)
            .await
        {
            Ok(process) => process,
            Err(e) => {
                warn!(%tenant, %component, error = %e, "Host process unavailable, start dropped");
                return Ok(None);
            },
        };

        let partition = self.partitions.get_or_create(tenant);
        let start_id = partition
            .stash_start(&descriptor, &request)
            .inspect_err(|e| self.report_violation(e))?;

        info!(
            %tenant,
            %component,
            %start_id,
            process = %process.process_name,
            "Service started"
        );

        let process_name = process.process_name.clone();
        self.collaborators.dispatcher.dispatch(ProxyRequest {
            tenant,
            process,
            descriptor,
            start_id,
            request,
            issued_at: Utc::now(),
        });

        self.publish(LifecycleEvent::ServiceStarted {
            metadata: EventMetadata::new(EVENT_SOURCE),
            tenant,
            component: component.clone(),
            start_id,
            process_name,
        });

        Ok(Some(component))
    }

    /// Bind `connection` to the component described by `descriptor`.
    ///
    /// A connection is counted once per tenant no matter how often it
    /// re-binds. The binding is released by [`unbind_service`] or, exactly
    /// once, by the death of the connection.
    ///
    /// Returns the payload to deliver to the host process, or `None` if the
    /// host process cannot be launched. With
    /// [`CoordinatorConfig::rollback_bind_on_launch_failure`] set, a failed
    /// launch leaves the tenant's bindings and counts as they were.
    ///
    /// # Errors
    ///
    /// Returns a consistency error if a client count or the start counter
    /// cannot be updated.
    ///
    /// [`unbind_service`]: Self::unbind_service
    pub async fn bind_service(
        &self,
        tenant: TenantId,
        request: ServiceRequest,
        descriptor: ServiceDescriptor,
        connection: &dyn Connection,
        flags: BindFlags,
        caller_uid: u32,
    ) -> LifecycleResult<Option<ProxyRequest>> {
        let partition = self.partitions.get_or_create(tenant);
        let connection_id = connection.id();
        let component = descriptor.component.clone();
        let watch_seq = partition.next_watch_seq();

        let attached = partition
            .attach_binding(&descriptor, connection_id, flags, watch_seq)
            .inspect_err(|e| self.report_violation(e))?;

        let recipient = self.death_recipient(&partition, connection_id, watch_seq);
        match connection.link_to_death(recipient) {
            Ok(link) => {
                if partition.arm_watch(connection_id, watch_seq, link).is_some() {
                    debug!(%tenant, connection = %connection_id, "Binding released before its watch was armed");
                }
            },
            Err(LinkError::ConnectionDead) => {
                warn!(%tenant, %component, connection = %connection_id, "Client died while binding");
                handle_binding_death(&partition, &self.events, connection_id, watch_seq);
            },
            Err(e) => {
                warn!(%tenant, %component, error = %e, "Binding without a death watch");
            },
        }

        let launched = self
            .collaborators
            .launcher
            .ensure_process(&descriptor.process_name, tenant, descriptor.package(), caller_uid)
            .await;
        let process = match launched {
            Ok(process) => process,
            Err(e) => {
                warn!(
                    %tenant,
                    %component,
                    error = %e,
                    rollback = self.config.rollback_bind_on_launch_failure,
                    "Host process unavailable, bind failed"
                );
                if self.config.rollback_bind_on_launch_failure {
                    let discarded = partition
                        .rollback_binding(connection_id, watch_seq, &attached.change, attached.replaced)
                        .inspect_err(|e| self.report_violation(e))?;
                    drop(discarded);
                }
                return Ok(None);
            },
        };
        drop(attached.replaced);

        let start_id = partition
            .stash_start(&descriptor, &request)
            .inspect_err(|e| self.report_violation(e))?;

        debug!(
            %tenant,
            %component,
            connection = %connection_id,
            first_binding = attached.first_binding,
            client_count = attached.client_count,
            %start_id,
            "Service bound"
        );

        self.publish(LifecycleEvent::ServiceBound {
            metadata: EventMetadata::new(EVENT_SOURCE),
            tenant,
            component,
            connection: connection_id,
            first_binding: attached.first_binding,
            client_count: attached.client_count,
        });

        Ok(Some(ProxyRequest {
            tenant,
            process,
            descriptor,
            start_id,
            request,
            issued_at: Utc::now(),
        }))
    }

    /// Release the binding of `connection` and cancel its death watch.
    ///
    /// Returns whether a binding was released. A binding whose record was
    /// removed by process death is released without touching any count.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ClientCountUnderflow`] if the release would
    /// drive the client count negative. The binding is removed regardless.
    pub fn unbind_service(&self, tenant: TenantId, connection: ConnectionId) -> LifecycleResult<bool> {
        let Some(partition) = self.partitions.get(tenant) else {
            return Ok(false);
        };
        let Some(released) = partition
            .release_binding(connection, None)
            .inspect_err(|e| self.report_violation(e))?
        else {
            debug!(%tenant, %connection, "Unbind for unknown connection");
            return Ok(false);
        };

        let binding = released.binding;
        debug!(
            %tenant,
            component = %binding.component,
            %connection,
            flags = binding.flags.bits(),
            watched = binding.is_watched(),
            client_count = ?released.client_count,
            "Service unbound"
        );
        self.publish(LifecycleEvent::ServiceUnbound {
            metadata: EventMetadata::new(EVENT_SOURCE),
            tenant,
            component: binding.component.clone(),
            connection,
            client_count: released.client_count,
        });
        Ok(true)
    }

    /// Decide whether the component may stop.
    ///
    /// [`StopTarget::Latest`] (see [`SENTINEL_LAST`](servitor_core::SENTINEL_LAST))
    /// targets the current start id. The payload stored under the target is
    /// discarded whatever the outcome.
    pub fn stop_service(
        &self,
        tenant: TenantId,
        component: &ComponentName,
        target: impl Into<StopTarget>,
    ) -> StopOutcome {
        let Some(partition) = self.partitions.get(tenant) else {
            return StopOutcome::NoOp;
        };
        let outcome = {
            let mut records = partition.records();
            match records.get_mut(component) {
                Some(record) => record.stop(target.into()),
                None => StopOutcome::NoOp,
            }
        };

        match outcome {
            StopOutcome::NoOp => {
                debug!(%tenant, %component, "Stop for unknown component");
            },
            StopOutcome::Stopped(start_id) => {
                info!(%tenant, %component, %start_id, "Service stopped");
                self.publish(LifecycleEvent::ServiceStopped {
                    metadata: EventMetadata::new(EVENT_SOURCE),
                    tenant,
                    component: component.clone(),
                    start_id,
                });
            },
            StopOutcome::RefusedStale { requested, current } => {
                warn!(%tenant, %component, %requested, %current, "Stop refused, stale start id");
                self.publish_refusal(tenant, component, requested, current, 0);
            },
            StopOutcome::RefusedBound {
                current,
                client_count,
            } => {
                warn!(%tenant, %component, %current, client_count, "Stop refused, clients still bound");
                self.publish_refusal(tenant, component, current, current, client_count);
            },
        }
        outcome
    }

    /// Record the payload a host process received under `start_id`.
    ///
    /// Overwrites any payload already stored for that id.
    pub fn on_start_command(
        &self,
        tenant: TenantId,
        start_id: StartId,
        descriptor: &ServiceDescriptor,
        request: ServiceRequest,
    ) {
        let partition = self.partitions.get_or_create(tenant);
        partition.records().get_or_create(descriptor).stash(start_id, request);
        debug!(%tenant, component = %descriptor.component, %start_id, "Start command recorded");
    }

    /// The hosted instance of `component` was destroyed.
    ///
    /// Clears its sticky payloads and resets its start counter; the record
    /// itself is kept. Returns whether the component was known.
    pub fn on_destroyed(&self, tenant: TenantId, component: &ComponentName) -> bool {
        let Some(partition) = self.partitions.get(tenant) else {
            return false;
        };
        let known = match partition.records().get_mut(component) {
            Some(record) => {
                record.destroy();
                true
            },
            None => false,
        };

        if known {
            debug!(%tenant, %component, "Service destroyed");
            self.publish(LifecycleEvent::ServiceDestroyed {
                metadata: EventMetadata::new(EVENT_SOURCE),
                tenant,
                component: component.clone(),
            });
        }
        known
    }

    /// Current start id of `component`, reported when its last client unbinds.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownComponent`] if the tenant has no
    /// record for the component.
    pub fn on_unbind(&self, tenant: TenantId, component: &ComponentName) -> LifecycleResult<StartId> {
        self.partitions
            .get(tenant)
            .and_then(|partition| {
                partition
                    .records()
                    .get(component)
                    .map(|record| record.last_start_id)
            })
            .ok_or_else(|| LifecycleError::UnknownComponent {
                tenant,
                component: component.clone(),
            })
    }

    /// Drop every record of `tenant` hosted by `process_name`.
    ///
    /// Bindings are left in place; releasing them later no longer affects
    /// any count. Returns the removed components.
    pub fn process_terminated(&self, tenant: TenantId, process_name: &str) -> Vec<ComponentName> {
        let Some(partition) = self.partitions.get(tenant) else {
            return Vec::new();
        };
        let removed = partition.records().remove_process(process_name);

        info!(%tenant, process = process_name, removed = removed.len(), "Host process terminated");
        if !removed.is_empty() {
            self.publish(LifecycleEvent::ProcessTerminated {
                metadata: EventMetadata::new(EVENT_SOURCE),
                tenant,
                process_name: process_name.to_owned(),
                removed: removed.clone(),
            });
        }
        removed
    }

    /// Snapshot every service of `tenant` whose host process is running.
    ///
    /// Services whose process the registry cannot find are skipped.
    pub async fn query_running(&self, tenant: TenantId) -> Vec<ServiceSnapshot> {
        let Some(partition) = self.partitions.get(tenant) else {
            return Vec::new();
        };
        let pending: Vec<PendingSnapshot> = partition
            .records()
            .iter()
            .map(|record| PendingSnapshot {
                descriptor: record.descriptor.clone(),
                client_count: record.client_count,
                restart_count: record.restart_count,
                active_since: record.active_since,
                last_activity_time: record.last_activity_time,
            })
            .collect();

        let mut snapshots = Vec::with_capacity(pending.len());
        for row in pending {
            let component = &row.descriptor.component;
            let Some(uid) = tenant.uid_for(row.descriptor.uid) else {
                warn!(%tenant, %component, app_uid = row.descriptor.uid, "Uid out of range, skipping service");
                continue;
            };
            let Some(process) = self
                .collaborators
                .registry
                .find(&row.descriptor.process_name, uid)
                .await
            else {
                warn!(
                    %tenant,
                    %component,
                    process = %row.descriptor.process_name,
                    uid,
                    "Host process not found, skipping service"
                );
                continue;
            };

            snapshots.push(ServiceSnapshot {
                process: process.process_name,
                pid: process.pid,
                uid,
                client_count: row.client_count,
                client_package: row.descriptor.package().to_owned(),
                component: row.descriptor.component.clone(),
                started: true,
                restart_count: row.restart_count,
                active_since: row.active_since,
                last_activity_time: row.last_activity_time,
            });
        }
        snapshots.sort_by(|a, b| a.component.cmp(&b.component));
        snapshots
    }

    /// Payloads that would be redelivered to `component`, by start id.
    #[must_use]
    pub fn sticky_payloads(
        &self,
        tenant: TenantId,
        component: &ComponentName,
    ) -> Vec<(StartId, ServiceRequest)> {
        self.partitions
            .get(tenant)
            .and_then(|partition| partition.records().get(component).map(|r| r.sticky_payloads()))
            .unwrap_or_default()
    }

    /// Bound clients of `component`, or `None` if it has no record.
    #[must_use]
    pub fn client_count(&self, tenant: TenantId, component: &ComponentName) -> Option<u32> {
        self.partitions
            .get(tenant)
            .and_then(|partition| partition.records().get(component).map(|r| r.client_count))
    }

    /// Whether `connection` currently holds a binding in `tenant`.
    #[must_use]
    pub fn is_bound(&self, tenant: TenantId, connection: &ConnectionId) -> bool {
        self.partitions
            .get(tenant)
            .is_some_and(|partition| partition.is_bound(connection))
    }

    /// Components with a record in `tenant`, sorted.
    #[must_use]
    pub fn components(&self, tenant: TenantId) -> Vec<ComponentName> {
        let mut components: Vec<ComponentName> = self
            .partitions
            .get(tenant)
            .map(|partition| {
                partition
                    .records()
                    .iter()
                    .map(|record| record.descriptor.component.clone())
                    .collect()
            })
            .unwrap_or_default();
        components.sort();
        components
    }

    fn death_recipient(
        &self,
        partition: &Arc<TenantPartition>,
        connection: ConnectionId,
        watch_seq: u64,
    ) -> DeathRecipient {
        let partition = Arc::downgrade(partition);
        let events = self.events.clone();
        Box::new(move || {
            if let Some(partition) = partition.upgrade() {
                handle_binding_death(&partition, &events, connection, watch_seq);
            }
        })
    }

    fn publish_refusal(
        &self,
        tenant: TenantId,
        component: &ComponentName,
        requested: StartId,
        current: StartId,
        client_count: u32,
    ) {
        self.publish(LifecycleEvent::StopRefused {
            metadata: EventMetadata::new(EVENT_SOURCE),
            tenant,
            component: component.clone(),
            requested,
            current,
            client_count,
        });
    }

    fn report_violation(&self, err: &LifecycleError) {
        report_violation(&self.events, err);
    }

    fn publish(&self, event: LifecycleEvent) {
        self.events.publish(event);
    }
}

/// Death-watch callback body: release the binding if `watch_seq` still
/// guards it.
fn handle_binding_death(
    partition: &TenantPartition,
    events: &EventBus,
    connection: ConnectionId,
    watch_seq: u64,
) {
    let tenant = partition.tenant();
    match partition.release_binding(connection, Some(watch_seq)) {
        Ok(Some(released)) => {
            let binding = released.binding;
            let bound_for = Utc::now().signed_duration_since(binding.bound_at);
            info!(
                tenant = %binding.tenant,
                component = %binding.component,
                %connection,
                bound_for_ms = bound_for.num_milliseconds(),
                client_count = ?released.client_count,
                "Bound client died, binding released"
            );
            events.publish(LifecycleEvent::BindingDied {
                metadata: EventMetadata::new(EVENT_SOURCE),
                tenant,
                component: binding.component.clone(),
                connection,
            });
        },
        Ok(None) => {
            debug!(%tenant, %connection, watch_seq, "Death notification for released binding");
        },
        Err(e) => report_violation(events, &e),
    }
}

fn report_violation(events: &EventBus, err: &LifecycleError) {
    if !err.is_consistency_violation() {
        return;
    }
    error!(
        tenant = %err.tenant(),
        component = %err.component(),
        error = %err,
        "Lifecycle bookkeeping violation"
    );
    events.publish(LifecycleEvent::ConsistencyViolation {
        metadata: EventMetadata::new(EVENT_SOURCE),
        tenant: err.tenant(),
        component: err.component().clone(),
        detail: err.to_string(),
    });
}
