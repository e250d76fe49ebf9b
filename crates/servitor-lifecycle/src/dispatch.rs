//! Channel-backed dispatcher.

use servitor_core::{Dispatcher, ProxyRequest};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// A [`Dispatcher`] that forwards proxy requests into an unbounded channel.
///
/// The receiving half is typically drained by the task that talks to host
/// processes. Sending never blocks; requests are dropped with a warning once
/// the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<ProxyRequest>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiver it feeds.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProxyRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Whether the receiving half has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, request: ProxyRequest) {
        let component = request.descriptor.component.clone();
        let start_id = request.start_id;
        if self.sender.send(request).is_err() {
            warn!(%component, %start_id, "Dispatch receiver closed, dropping proxy request");
        } else {
            trace!(%component, %start_id, "Proxy request queued");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use servitor_core::{ProcessHandle, ServiceDescriptor, ServiceRequest, StartId, TenantId};

    fn proxy_request() -> ProxyRequest {
        ProxyRequest {
            tenant: TenantId::OWNER,
            process: ProcessHandle {
                process_name: "com.example".to_owned(),
                pid: 1_234,
                vpid: 0,
                uid: 10_042,
                is_64bit: true,
            },
            descriptor: ServiceDescriptor::new(
                "com.example/.Sync".parse().unwrap(),
                "com.example",
                10_042,
            ),
            start_id: StartId::new(1),
            request: ServiceRequest::new(),
            issued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_forwards() {
        let (dispatcher, mut receiver) = ChannelDispatcher::channel();
        dispatcher.dispatch(proxy_request());

        let delivered = receiver.recv().await.unwrap();
        assert_eq!(delivered.start_id, StartId::new(1));
    }

    #[tokio::test]
    async fn test_dispatch_after_close_does_not_panic() {
        let (dispatcher, receiver) = ChannelDispatcher::channel();
        drop(receiver);

        assert!(dispatcher.is_closed());
        dispatcher.dispatch(proxy_request());
    }
}
