//! Integration test support for Taproom.
//!
//! Provides in-process fakes for the two external collaborators (the
//! identity provider and the profile store) with the control knobs the
//! scenario suites need: seeding accounts and roles, injecting
//! external change events, simulating outages, and holding role
//! lookups open so sign-out can race them.
//!
//! # Test Categories
//!
//! - `bootstrap` - Startup session checks and their failure modes
//! - `auth_races` - Interleavings of sign-in/sign-out/refresh against
//!   the role lookup
//! - `navigation_guard` - End-to-end view gating

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use taproom_auth::config::AuthConfig;
use taproom_auth::controller::AuthController;
use taproom_auth::error::{ProfileError, ProviderError};
use taproom_auth::profile::ProfileResolver;
use taproom_auth::provider::{IdentityProvider, SessionEventHub, SessionEvents};
use taproom_auth::state::{AuthState, Session};
use taproom_auth::store::SessionStore;
use taproom_core::{Email, Role, UserId};

/// Timeouts short enough to keep failure-path tests fast.
#[must_use]
pub fn fast_config() -> AuthConfig {
    AuthConfig {
        bootstrap_timeout: Duration::from_millis(500),
        resolve_timeout: Duration::from_secs(2),
        call_timeout: Duration::from_secs(2),
    }
}

/// Start a controller over the given fakes with [`fast_config`].
#[must_use]
pub fn start_controller(
    provider: &Arc<MockProvider>,
    resolver: &Arc<MockResolver>,
) -> AuthController {
    AuthController::start(
        Arc::clone(provider) as Arc<dyn IdentityProvider>,
        Arc::clone(resolver) as Arc<dyn ProfileResolver>,
        fast_config(),
    )
}

/// Wait (bounded) until the store satisfies `predicate`, returning the
/// matching snapshot.
///
/// # Panics
///
/// Panics if the predicate does not hold within two seconds.
pub async fn wait_for_state(
    store: &SessionStore,
    predicate: impl FnMut(&AuthState) -> bool,
) -> AuthState {
    let mut changes = store.watch();
    let state = tokio::time::timeout(Duration::from_secs(2), changes.wait_for(predicate))
        .await
        .expect("timed out waiting for auth state")
        .expect("session store closed");
    state.clone()
}

/// Let spawned reconciliation tasks run to completion.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Build a session for a fresh random identity.
#[must_use]
pub fn session_for(email: &str) -> Session {
    Session {
        user_id: UserId::random(),
        email: Email::parse(email).expect("valid email"),
    }
}

// =============================================================================
// MockProvider
// =============================================================================

struct ProviderState {
    /// email -> (password, session)
    accounts: HashMap<String, (String, Session)>,
    current: Option<Session>,
}

/// In-process identity provider fake.
///
/// Behaves like the hosted provider at the interface: sign-in verifies
/// a seeded password and emits the new session on the change stream;
/// sign-out clears and emits `None`; arbitrary external events can be
/// pushed with [`push_event`](Self::push_event).
pub struct MockProvider {
    state: Mutex<ProviderState>,
    hub: SessionEventHub,
    reachable: AtomicBool,
    hang_session_check: AtomicBool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProviderState {
                accounts: HashMap::new(),
                current: None,
            }),
            hub: SessionEventHub::new(),
            reachable: AtomicBool::new(true),
            hang_session_check: AtomicBool::new(false),
        }
    }

    /// Seed an account, returning the session sign-in will issue.
    pub fn add_account(&self, email: &str, password: &str) -> Session {
        let session = session_for(email);
        self.lock().accounts.insert(
            email.to_owned(),
            (password.to_owned(), session.clone()),
        );
        session
    }

    /// Seed a pre-existing session for the bootstrap check.
    pub fn seed_session(&self, session: Session) {
        self.lock().current = Some(session);
    }

    /// Inject an externally triggered change event (refresh, remote
    /// sign-out, session switch).
    pub fn push_event(&self, session: Option<Session>) {
        self.lock().current.clone_from(&session);
        self.hub.emit(session);
    }

    /// Toggle reachability; unreachable calls fail with `Connection`.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make the next session checks hang past any timeout.
    pub fn set_hang_session_check(&self, hang: bool) {
        self.hang_session_check.store(hang, Ordering::SeqCst);
    }

    /// Number of change-stream subscribers live as of the last emitted
    /// event.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_reachable(&self) -> Result<(), ProviderError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Connection("provider offline".to_owned()))
        }
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        if self.hang_session_check.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.check_reachable()?;
        Ok(self.lock().current.clone())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        self.check_reachable()?;
        let session = {
            let mut state = self.lock();
            let (expected, session) = state
                .accounts
                .get(email)
                .ok_or(ProviderError::InvalidCredentials)?
                .clone();
            if expected != password {
                return Err(ProviderError::InvalidCredentials);
            }
            state.current = Some(session.clone());
            session
        };
        self.hub.emit(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.check_reachable()?;
        let had_session = self.lock().current.take().is_some();
        if had_session {
            self.hub.emit(None);
        }
        Ok(())
    }

    fn subscribe(&self) -> SessionEvents {
        self.hub.subscribe()
    }
}

// =============================================================================
// MockResolver
// =============================================================================

/// In-process profile store fake.
///
/// Roles are seeded per user ID; [`hold`](Self::hold) keeps every
/// in-flight lookup open until [`release`](Self::release), which is
/// how the race scenarios order a sign-out ahead of a slow resolution.
pub struct MockResolver {
    roles: Mutex<HashMap<UserId, Role>>,
    reachable: AtomicBool,
    block: watch::Sender<bool>,
    completions: AtomicUsize,
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockResolver {
    #[must_use]
    pub fn new() -> Self {
        let (block, _) = watch::channel(false);
        Self {
            roles: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            block,
            completions: AtomicUsize::new(0),
        }
    }

    /// Seed the role row for a user.
    pub fn set_role(&self, user_id: UserId, role: Role) {
        self.lock().insert(user_id, role);
    }

    /// Remove the role row for a user (revocation).
    pub fn remove_role(&self, user_id: UserId) {
        self.lock().remove(&user_id);
    }

    /// Toggle reachability; unreachable lookups fail with `Connection`.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Keep every in-flight and future lookup open.
    pub fn hold(&self) {
        // `send` fails without storing the value when no receiver
        // exists, and lookups only subscribe once in flight.
        self.block.send_replace(true);
    }

    /// Let held lookups complete.
    pub fn release(&self) {
        self.block.send_replace(false);
    }

    /// Number of lookups that have run to completion.
    #[must_use]
    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    /// Wait (bounded) until at least `count` lookups have completed.
    ///
    /// # Panics
    ///
    /// Panics if the count is not reached within two seconds.
    pub async fn wait_for_completions(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.completions() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} resolver completions"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, Role>> {
        self.roles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProfileResolver for MockResolver {
    async fn resolve_role(&self, user_id: UserId) -> Result<Option<Role>, ProfileError> {
        let mut gate = self.block.subscribe();
        let _ = gate.wait_for(|blocked| !*blocked).await;

        let result = if self.reachable.load(Ordering::SeqCst) {
            Ok(self.lock().get(&user_id).copied())
        } else {
            Err(ProfileError::Connection("profile store offline".to_owned()))
        };
        self.completions.fetch_add(1, Ordering::SeqCst);
        result
    }
}
