//! The auth controller: sole writer of the session store.
//!
//! Orchestrates bootstrap, pumps the provider's change stream, drives
//! role resolution, and resolves races between concurrent sign-in/
//! sign-out/refresh events and the slower role lookup via generation
//! tagging.
//!
//! # Single update path
//!
//! Every identity change flows through the change stream, regardless
//! of what triggered it. `sign_in` never applies the session it gets
//! back from the provider; it waits for the corresponding change-stream
//! transition to land instead. Two independent write paths racing and
//! diverging is exactly the failure mode this rules out.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use taproom_core::UserId;

use crate::config::AuthConfig;
use crate::error::{AuthError, ProfileError};
use crate::profile::ProfileResolver;
use crate::provider::{IdentityProvider, SessionEvents};
use crate::state::{AuthState, Session};
use crate::store::SessionStore;

/// Tracks the current session and role against the identity provider.
///
/// Owns the store and the change-stream pump task. One instance per
/// process, constructed explicitly and injected into consumers; reads
/// go through [`store`](Self::store), never through a global.
///
/// Dropping the controller (or calling [`shutdown`](Self::shutdown))
/// releases the change-stream subscription exactly once and stops the
/// pump.
pub struct AuthController {
    store: SessionStore,
    provider: Arc<dyn IdentityProvider>,
    resolver: Arc<dyn ProfileResolver>,
    config: AuthConfig,
    shutdown: watch::Sender<bool>,
}

impl AuthController {
    /// Create the controller and start its background work: subscribe
    /// to the provider's change stream, then bootstrap from any
    /// existing session.
    ///
    /// Subscribing happens before the session check so that no event
    /// emitted during bootstrap is missed.
    #[must_use]
    pub fn start(
        provider: Arc<dyn IdentityProvider>,
        resolver: Arc<dyn ProfileResolver>,
        config: AuthConfig,
    ) -> Self {
        let store = SessionStore::new();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let events = provider.subscribe();
        let pump = Pump {
            store: store.clone(),
            provider: Arc::clone(&provider),
            resolver: Arc::clone(&resolver),
            config: config.clone(),
        };
        tokio::spawn(pump.run(events, shutdown_rx));

        Self {
            store,
            provider,
            resolver,
            config,
            shutdown,
        }
    }

    /// The store holding the current snapshot. Subscribe or read from
    /// it on every render of a protected view.
    #[must_use]
    pub const fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Convenience for `store().read()`.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.store.read()
    }

    /// Verify credentials with the provider and wait for the resulting
    /// session transition to be applied.
    ///
    /// On success the store is guaranteed to hold the new identity
    /// when this returns (its role may still be resolving). On failure
    /// no state is mutated.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the pair is
    /// rejected, `AuthError::Connection` if the provider is
    /// unreachable or the transition does not land within the
    /// configured timeout.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let mut changes = self.store.watch();

        let attempt = async {
            let session = self.provider.sign_in_with_password(email, password).await?;
            // The canonical transition arrives via the change stream;
            // observe the store rather than applying the result here.
            changes
                .wait_for(|state| {
                    state
                        .session
                        .as_ref()
                        .is_some_and(|held| held.same_identity(&session))
                })
                .await
                .map_err(|_| AuthError::Connection("session store closed".to_owned()))?;
            Ok::<(), AuthError>(())
        };

        time::timeout(self.config.call_timeout, attempt)
            .await
            .map_err(|_| AuthError::Connection("timed out waiting for sign-in".to_owned()))?
    }

    /// Sign out at the provider and clear the local state.
    ///
    /// The local clear does not wait for the provider's own sign-out
    /// event: clearing is idempotent, and waiting would leave a window
    /// where a stale role is still readable. The clear is applied even
    /// if the provider call fails, so the user is never stuck signed
    /// in locally; the error is still surfaced.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Connection` if the provider is unreachable.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = time::timeout(self.config.call_timeout, self.provider.sign_out())
            .await
            .map_err(|_| AuthError::Connection("timed out signing out".to_owned()))
            .and_then(|inner| inner.map_err(AuthError::from));

        if self.store.clear_identity() {
            info!("signed out, session cleared");
        }

        result
    }

    /// Re-resolve the current session's role at the current
    /// generation. No-op when signed out.
    ///
    /// Useful after a role change in the profile store, or to retry
    /// once a profile-store outage (which downgrades to no role) has
    /// passed.
    pub fn refresh_role(&self) {
        let state = self.store.read();
        let Some(session) = state.session else {
            debug!("refresh_role with no session, ignoring");
            return;
        };
        spawn_role_resolution(
            self.store.clone(),
            Arc::clone(&self.resolver),
            self.config.resolve_timeout,
            session.user_id,
            state.generation,
        );
    }

    /// Stop the change-stream pump and release the provider
    /// subscription. Idempotent; also performed on drop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for AuthController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The change-stream pump: bootstraps, then applies provider events
/// until shutdown.
struct Pump {
    store: SessionStore,
    provider: Arc<dyn IdentityProvider>,
    resolver: Arc<dyn ProfileResolver>,
    config: AuthConfig,
}

impl Pump {
    async fn run(self, mut events: SessionEvents, mut shutdown: watch::Receiver<bool>) {
        self.bootstrap().await;

        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => {
                    debug!("auth controller shut down, releasing change-stream subscription");
                    break;
                }
                event = events.next() => match event {
                    Some(event) => self.apply_session_event(event),
                    None => {
                        debug!("provider closed the change stream");
                        break;
                    }
                },
            }
        }

        events.unsubscribe();
    }

    /// Query the provider for an existing session, bounded by the
    /// bootstrap timeout. Bootstrapping ends regardless of the
    /// outcome; an unreachable provider resolves to unauthenticated.
    async fn bootstrap(&self) {
        let session = match time::timeout(
            self.config.bootstrap_timeout,
            self.provider.current_session(),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(err)) => {
                warn!(error = %err, "session check failed, starting unauthenticated");
                None
            }
            Err(_) => {
                warn!("session check timed out, starting unauthenticated");
                None
            }
        };

        self.store.finish_bootstrap();
        if let Some(session) = session {
            // An existing session is handled exactly like one arriving
            // on the change stream.
            self.apply_session_event(Some(session));
        }
        info!(phase = ?self.store.read().phase(), "bootstrap complete");
    }

    /// Apply one change-stream event.
    ///
    /// A session for a new identity is committed immediately and its
    /// role resolution spawned; the role arrives later (or never, if a
    /// further event supersedes this generation first).
    fn apply_session_event(&self, event: Option<Session>) {
        match event {
            Some(session) => {
                let held = self.store.read().session;
                if held.is_some_and(|held| held.same_identity(&session)) {
                    // Token refresh for the identity we already hold.
                    self.store.mirror_session(session);
                    return;
                }

                let user_id = session.user_id;
                let generation = self.store.begin_identity(session);
                info!(%user_id, generation, "session established, resolving role");
                spawn_role_resolution(
                    self.store.clone(),
                    Arc::clone(&self.resolver),
                    self.config.resolve_timeout,
                    user_id,
                    generation,
                );
            }
            None => {
                if self.store.clear_identity() {
                    info!("provider reported sign-out, session cleared");
                }
            }
        }
    }
}

/// Resolve the role for `user_id` and apply it under
/// last-generation-wins semantics.
///
/// Runs as its own task so further change-stream events are never
/// blocked behind a slow lookup. A connection error or timeout
/// downgrades to no elevated role for this generation (fail-closed for
/// elevated access, fail-open for basic authenticated access).
fn spawn_role_resolution(
    store: SessionStore,
    resolver: Arc<dyn ProfileResolver>,
    timeout: std::time::Duration,
    user_id: UserId,
    generation: u64,
) {
    tokio::spawn(async move {
        let role = match time::timeout(timeout, resolver.resolve_role(user_id)).await {
            Ok(Ok(role)) => role,
            Ok(Err(ProfileError::Connection(msg))) => {
                warn!(%user_id, error = %msg, "role lookup failed, treating as no elevated role");
                None
            }
            Err(_) => {
                warn!(%user_id, "role lookup timed out, treating as no elevated role");
                None
            }
        };

        if store.apply_role(generation, role) {
            info!(%user_id, generation, ?role, "role resolved");
        } else {
            debug!(%user_id, generation, "discarding role for superseded identity");
        }
    });
}
