//! Mock implementations of the coordinator's collaborators.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use servitor_core::{
    ComponentName, Connection, ConnectionId, DeathLink, DeathRecipient, Dispatcher, LaunchError,
    LinkError, ProcessHandle, ProcessLauncher, ProcessRegistry, ProxyRequest, ServiceDescriptor,
    ServiceRequest, ServiceResolver, TenantId,
};

/// Mock resolver backed by in-memory tables.
///
/// Requests naming a component resolve by component; otherwise by action.
/// A request restricted to a package only resolves inside that package.
#[derive(Debug, Clone, Default)]
pub struct MockResolver {
    by_component: Arc<Mutex<HashMap<ComponentName, ServiceDescriptor>>>,
    by_action: Arc<Mutex<HashMap<String, ServiceDescriptor>>>,
    calls: Arc<AtomicUsize>,
}

impl MockResolver {
    /// Create a resolver that knows no services.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service resolvable by its component name.
    #[must_use]
    pub fn with_service(self, descriptor: ServiceDescriptor) -> Self {
        self.add_service(descriptor);
        self
    }

    /// Register a service resolvable by `action`.
    #[must_use]
    pub fn with_action(self, action: impl Into<String>, descriptor: ServiceDescriptor) -> Self {
        if let Ok(mut guard) = self.by_action.lock() {
            guard.insert(action.into(), descriptor);
        }
        self
    }

    /// Register a service resolvable by its component name.
    pub fn add_service(&self, descriptor: ServiceDescriptor) {
        if let Ok(mut guard) = self.by_component.lock() {
            guard.insert(descriptor.component.clone(), descriptor);
        }
    }

    /// Forget a service.
    pub fn remove_service(&self, component: &ComponentName) {
        if let Ok(mut guard) = self.by_component.lock() {
            guard.remove(component);
        }
    }

    /// Number of resolve calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceResolver for MockResolver {
    async fn resolve(
        &self,
        request: &ServiceRequest,
        _tenant: TenantId,
    ) -> Option<ServiceDescriptor> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let found = if let Some(component) = &request.component {
            self.by_component.lock().ok()?.get(component).cloned()
        } else if let Some(action) = &request.action {
            self.by_action.lock().ok()?.get(action).cloned()
        } else {
            None
        }?;

        match &request.package {
            Some(package) if package != found.package() => None,
            _ => Some(found),
        }
    }
}

/// A recorded call to [`MockLauncher::ensure_process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCall {
    /// Requested process.
    pub process_name: String,
    /// Requesting tenant.
    pub tenant: TenantId,
    /// Package the process belongs to.
    pub package: String,
    /// Uid of the caller.
    pub caller_uid: u32,
}

/// Mock launcher that "starts" processes by handing out handles.
///
/// Each (process, tenant) pair keeps the handle it got first. Processes
/// marked as failing return [`LaunchError::ProcessUnavailable`].
#[derive(Debug, Clone)]
pub struct MockLauncher {
    failing: Arc<Mutex<HashSet<String>>>,
    running: Arc<Mutex<HashMap<(String, TenantId), ProcessHandle>>>,
    calls: Arc<Mutex<Vec<LaunchCall>>>,
    next_pid: Arc<AtomicU32>,
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self {
            failing: Arc::new(Mutex::new(HashSet::new())),
            running: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            next_pid: Arc::new(AtomicU32::new(1_000)),
        }
    }
}

impl MockLauncher {
    /// Create a launcher that starts every process.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make launches of `process_name` fail.
    #[must_use]
    pub fn failing(self, process_name: impl Into<String>) -> Self {
        self.set_failing(process_name, true);
        self
    }

    /// Toggle failure for `process_name`.
    pub fn set_failing(&self, process_name: impl Into<String>, fail: bool) {
        if let Ok(mut guard) = self.failing.lock() {
            let process_name = process_name.into();
            if fail {
                guard.insert(process_name);
            } else {
                guard.remove(&process_name);
            }
        }
    }

    /// Every launch request so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<LaunchCall> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of launch requests so far.
    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.calls.lock().map(|g| g.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ProcessLauncher for MockLauncher {
    async fn ensure_process(
        &self,
        process_name: &str,
        tenant: TenantId,
        package: &str,
        caller_uid: u32,
    ) -> Result<ProcessHandle, LaunchError> {
        if let Ok(mut guard) = self.calls.lock() {
            guard.push(LaunchCall {
                process_name: process_name.to_owned(),
                tenant,
                package: package.to_owned(),
                caller_uid,
            });
        }

        let fails = self
            .failing
            .lock()
            .map(|g| g.contains(process_name))
            .unwrap_or_default();
        if fails {
            return Err(LaunchError::ProcessUnavailable {
                process_name: process_name.to_owned(),
                reason: "launch disabled by test".to_owned(),
            });
        }

        let mut running = self.running.lock().map_err(|_| LaunchError::ProcessUnavailable {
            process_name: process_name.to_owned(),
            reason: "launcher state poisoned".to_owned(),
        })?;
        let handle = running
            .entry((process_name.to_owned(), tenant))
            .or_insert_with(|| ProcessHandle {
                process_name: process_name.to_owned(),
                pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
                vpid: 0,
                uid: tenant.uid_for(caller_uid).unwrap_or(caller_uid),
                is_64bit: true,
            });
        Ok(handle.clone())
    }
}

/// Mock process registry with an explicit process list.
#[derive(Debug, Clone, Default)]
pub struct MockProcessRegistry {
    processes: Arc<Mutex<Vec<ProcessHandle>>>,
}

impl MockProcessRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a running process.
    #[must_use]
    pub fn with_process(self, process: ProcessHandle) -> Self {
        self.add(process);
        self
    }

    /// Add a running process.
    pub fn add(&self, process: ProcessHandle) {
        if let Ok(mut guard) = self.processes.lock() {
            guard.push(process);
        }
    }

    /// Remove every process named `process_name`.
    pub fn remove(&self, process_name: &str) {
        if let Ok(mut guard) = self.processes.lock() {
            guard.retain(|p| p.process_name != process_name);
        }
    }
}

#[async_trait]
impl ProcessRegistry for MockProcessRegistry {
    async fn find(&self, process_name: &str, uid: u32) -> Option<ProcessHandle> {
        self.processes
            .lock()
            .ok()?
            .iter()
            .find(|p| p.process_name == process_name && p.uid == uid)
            .cloned()
    }
}

/// Dispatcher that records every proxy request.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    requests: Arc<Mutex<Vec<ProxyRequest>>>,
}

impl RecordingDispatcher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All dispatched requests, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ProxyRequest> {
        self.requests.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// The most recent request.
    #[must_use]
    pub fn last(&self) -> Option<ProxyRequest> {
        self.requests.lock().ok()?.last().cloned()
    }

    /// Number of dispatched requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.lock().map(|g| g.len()).unwrap_or_default()
    }

    /// Whether nothing was dispatched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, request: ProxyRequest) {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request);
        }
    }
}

#[derive(Default)]
struct ConnectionState {
    dead: bool,
    next_token: u64,
    recipients: Vec<(u64, DeathRecipient)>,
    link_error: Option<LinkError>,
}

/// Mock client connection whose death is triggered by [`kill`](Self::kill).
#[derive(Clone)]
pub struct MockConnection {
    id: ConnectionId,
    state: Arc<Mutex<ConnectionState>>,
}

impl MockConnection {
    /// Create a live connection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ConnectionId::new(),
            state: Arc::new(Mutex::new(ConnectionState::default())),
        }
    }

    /// Make every future `link_to_death` fail with `error`.
    #[must_use]
    pub fn with_link_error(self, error: LinkError) -> Self {
        if let Ok(mut guard) = self.state.lock() {
            guard.link_error = Some(error);
        }
        self
    }

    /// Mark the connection dead and notify every linked recipient.
    ///
    /// Recipients run on the calling thread after the internal lock is
    /// released. Returns how many were notified.
    pub fn kill(&self) -> usize {
        let recipients = match self.state.lock() {
            Ok(mut guard) => {
                guard.dead = true;
                std::mem::take(&mut guard.recipients)
            },
            Err(_) => return 0,
        };
        let notified = recipients.len();
        for (_, recipient) in recipients {
            recipient();
        }
        notified
    }

    /// Whether [`kill`](Self::kill) was called.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.state.lock().map(|g| g.dead).unwrap_or_default()
    }

    /// Number of linked, uncancelled recipients.
    #[must_use]
    pub fn active_links(&self) -> usize {
        self.state
            .lock()
            .map(|g| g.recipients.len())
            .unwrap_or_default()
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("id", &self.id)
            .field("dead", &self.is_dead())
            .field("active_links", &self.active_links())
            .finish()
    }
}

impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn link_to_death(&self, recipient: DeathRecipient) -> Result<DeathLink, LinkError> {
        let mut guard = self.state.lock().map_err(|_| LinkError::ConnectionDead)?;
        if guard.dead {
            return Err(LinkError::ConnectionDead);
        }
        if let Some(error) = &guard.link_error {
            return Err(error.clone());
        }

        let token = guard.next_token;
        guard.next_token = token.wrapping_add(1);
        guard.recipients.push((token, recipient));
        drop(guard);

        let state = Arc::clone(&self.state);
        Ok(DeathLink::new(move || {
            if let Ok(mut guard) = state.lock() {
                guard.recipients.retain(|(t, _)| *t != token);
            }
        }))
    }
}
