//! Client connections and death-notification subscriptions.

use std::fmt;

use crate::error::LinkError;
use crate::ids::ConnectionId;

/// Callback invoked at most once when a connection's remote end dies.
pub type DeathRecipient = Box<dyn FnOnce() + Send + 'static>;

/// A client connection handle that can report the death of its owner.
pub trait Connection: Send + Sync {
    /// Stable identity of this connection.
    fn id(&self) -> ConnectionId;

    /// Subscribe `recipient` to the death of the remote end.
    ///
    /// The returned [`DeathLink`] unsubscribes when cancelled or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectionDead`] if the remote end is already
    /// gone, in which case `recipient` is dropped without being called.
    fn link_to_death(&self, recipient: DeathRecipient) -> Result<DeathLink, LinkError>;
}

/// A cancellable death-notification subscription.
///
/// Cancelling (explicitly or by dropping) guarantees the recipient is not
/// invoked afterwards unless it was already running.
pub struct DeathLink {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl DeathLink {
    /// Create a link that runs `cancel` to unsubscribe.
    #[must_use]
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A link with nothing to unsubscribe.
    #[must_use]
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for DeathLink {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for DeathLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeathLink")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}
