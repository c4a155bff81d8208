//! Identity provider interface.
//!
//! The hosted provider owns credential verification and token issuance;
//! this module specifies only the surface the controller consumes: a
//! session check, password sign-in/sign-out, and a change stream that
//! is the canonical path for *all* identity transitions.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::state::Session;

/// External identity/session provider.
///
/// Implementations emit every session change (sign-in completion,
/// token refresh, externally triggered sign-out) on the change stream
/// returned by [`subscribe`](Self::subscribe); the direct call results
/// are informational only and never a state-setting source.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The session currently held by the provider, if any.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Connection` if the provider is
    /// unreachable.
    async fn current_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Verify credentials and establish a session.
    ///
    /// A successful call is expected to emit the new session on the
    /// change stream as a consequence.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::InvalidCredentials` if the pair is
    /// rejected, `ProviderError::Connection` if the provider is
    /// unreachable.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError>;

    /// Invalidate the current session at the provider.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Connection` if the provider is
    /// unreachable.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Subscribe to session changes.
    ///
    /// Each item is the session now in effect (`None` = signed out).
    /// The returned handle is a scoped resource: dropping it releases
    /// the subscription exactly once.
    fn subscribe(&self) -> SessionEvents;
}

/// Receiving half of a change-stream subscription.
///
/// Dropping the handle unsubscribes.
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<Option<Session>>,
}

impl SessionEvents {
    /// Next change event; `None` when the provider side has shut down.
    pub async fn next(&mut self) -> Option<Option<Session>> {
        self.rx.recv().await
    }

    /// Explicitly release the subscription (equivalent to dropping).
    pub fn unsubscribe(self) {
        drop(self);
    }
}

/// Fan-out helper for provider implementations.
///
/// Keeps the set of live subscribers and drops the ones whose
/// [`SessionEvents`] handle has gone away.
#[derive(Default)]
pub struct SessionEventHub {
    senders: std::sync::Mutex<Vec<mpsc::UnboundedSender<Option<Session>>>>,
}

impl SessionEventHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> SessionEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        SessionEvents { rx }
    }

    /// Emit a change event to every live subscriber, pruning closed
    /// ones.
    pub fn emit(&self, session: Option<Session>) {
        self.lock().retain(|tx| tx.send(session.clone()).is_ok());
    }

    /// Number of subscribers whose handle was live at the last
    /// [`emit`](Self::emit).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<Option<Session>>>> {
        self.senders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
