//! The session store: single source of truth for auth state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;

use taproom_core::Role;

use crate::state::{AuthState, Session};

/// Callback invoked with a snapshot after each committed mutation.
type Listener = Arc<dyn Fn(&AuthState) + Send + Sync>;

/// Holds the current [`AuthState`] snapshot and fans out change
/// notifications.
///
/// Consumers get read and subscribe access only; every mutating method
/// is `pub(crate)` so the [`AuthController`](crate::AuthController) in
/// this crate is the sole possible writer. That single-writer
/// discipline, not locking, is what makes concurrent readers sound.
///
/// Cheaply cloneable; clones share the same underlying state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<AuthState>,
    /// Serializes mutation + listener delivery so listeners observe
    /// snapshots in commit order even with writer tasks on different
    /// runtime threads.
    commit: Mutex<()>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
}

impl SessionStore {
    /// Create a store in the initial bootstrapping state.
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(AuthState::initial());
        Self {
            inner: Arc::new(Inner {
                state,
                commit: Mutex::new(()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    /// Current snapshot, non-blocking.
    #[must_use]
    pub fn read(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Async change channel.
    ///
    /// Unlike [`subscribe`](Self::subscribe), the receiver may observe
    /// only the latest of a burst of mutations; use it to *wait for* a
    /// condition, not to count transitions.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Register a listener invoked with a snapshot after every
    /// committed mutation, in commit order.
    ///
    /// The returned guard is the disposer: dropping it unsubscribes
    /// exactly once. Listeners run on the committing task, under the
    /// commit lock, so a snapshot is fully delivered before the next
    /// mutation (from any task) commits; they must not call back into
    /// the store's mutating API.
    #[must_use]
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionGuard
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.lock_listeners().push((id, Arc::new(listener)));
        SubscriptionGuard {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    // =========================================================================
    // Mutations (controller only)
    // =========================================================================

    /// Mark the first session check as complete.
    ///
    /// Idempotent; `bootstrapping` never becomes true again.
    pub(crate) fn finish_bootstrap(&self) {
        let _commit = self.lock_commit();
        let changed = self.inner.state.send_if_modified(|state| {
            if state.bootstrapping {
                state.bootstrapping = false;
                true
            } else {
                false
            }
        });
        if changed {
            self.notify();
        }
    }

    /// Commit a new identity: bump the generation, set the session,
    /// and clear any role belonging to the previous identity.
    ///
    /// Returns the new generation, used to tag the role resolution
    /// issued for this identity.
    pub(crate) fn begin_identity(&self, session: Session) -> u64 {
        let _commit = self.lock_commit();
        let mut generation = 0;
        self.inner.state.send_modify(|state| {
            state.generation += 1;
            state.session = Some(session);
            state.role = None;
            generation = state.generation;
        });
        self.notify();
        generation
    }

    /// Mirror a refreshed session record for the *same* identity.
    ///
    /// No generation bump: the identity did not change, so in-flight
    /// role resolutions stay valid.
    pub(crate) fn mirror_session(&self, session: Session) {
        let _commit = self.lock_commit();
        let changed = self.inner.state.send_if_modified(|state| match &state.session {
            Some(current) if current.same_identity(&session) && *current != session => {
                state.session = Some(session);
                true
            }
            _ => false,
        });
        if changed {
            self.notify();
        }
    }

    /// Clear session and role, invalidating in-flight resolutions via
    /// a generation bump.
    ///
    /// Idempotent: clearing an already-signed-out store is a no-op and
    /// does not bump the generation, so the provider's sign-out echo
    /// event after a local clear changes nothing.
    pub(crate) fn clear_identity(&self) -> bool {
        let _commit = self.lock_commit();
        let changed = self.inner.state.send_if_modified(|state| {
            if state.session.is_none() && state.role.is_none() {
                return false;
            }
            state.session = None;
            state.role = None;
            state.generation += 1;
            true
        });
        if changed {
            self.notify();
        }
        changed
    }

    /// Apply a role resolution tagged with `generation`.
    ///
    /// Last generation wins: the result is applied only if the store's
    /// generation still equals the tag. Returns whether the tag was
    /// current; a stale result leaves the store untouched.
    pub(crate) fn apply_role(&self, generation: u64, role: Option<Role>) -> bool {
        let _commit = self.lock_commit();
        let mut current = false;
        let changed = self.inner.state.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            current = true;
            if state.role == role {
                return false;
            }
            state.role = role;
            true
        });
        if changed {
            self.notify();
        }
        current
    }

    /// Snapshot the committed state and invoke listeners in
    /// registration order, outside the listener lock.
    ///
    /// Callers hold the commit lock, so the snapshot delivered here is
    /// exactly the state this mutation committed and no interleaved
    /// mutation can deliver out of commit order.
    fn notify(&self) {
        let snapshot = self.inner.state.borrow().clone();
        let listeners: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    fn lock_commit(&self) -> std::sync::MutexGuard<'_, ()> {
        self.inner
            .commit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Listener)>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Disposer for a [`SessionStore::subscribe`] registration.
///
/// Dropping the guard releases the registration exactly once.
pub struct SubscriptionGuard {
    inner: Weak<Inner>,
    id: u64,
}

impl SubscriptionGuard {
    /// Explicitly release the registration (equivalent to dropping).
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use taproom_core::{Email, UserId};

    use super::*;
    use crate::state::AuthPhase;

    fn session_for(user_id: UserId) -> Session {
        Session {
            user_id,
            email: Email::parse("staff@example.com").expect("valid email"),
        }
    }

    #[test]
    fn test_begin_identity_bumps_generation_and_clears_role() {
        let store = SessionStore::new();
        let first = store.begin_identity(session_for(UserId::random()));
        assert_eq!(first, 1);
        assert!(store.apply_role(first, Some(Role::Manager)));
        assert_eq!(store.read().role, Some(Role::Manager));

        let second = store.begin_identity(session_for(UserId::random()));
        assert_eq!(second, 2);
        let state = store.read();
        assert_eq!(state.role, None, "previous user's role must not leak");
        assert!(state.session.is_some());
    }

    #[test]
    fn test_stale_role_is_discarded() {
        let store = SessionStore::new();
        let stale = store.begin_identity(session_for(UserId::random()));
        store.clear_identity();

        assert!(!store.apply_role(stale, Some(Role::Manager)));
        let state = store.read();
        assert_eq!(state.session, None);
        assert_eq!(state.role, None);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = SessionStore::new();
        store.begin_identity(session_for(UserId::random()));
        let generation = store.read().generation;

        assert!(store.clear_identity());
        assert_eq!(store.read().generation, generation + 1);

        // Second clear (e.g. the provider's sign-out echo) is a no-op.
        assert!(!store.clear_identity());
        assert_eq!(store.read().generation, generation + 1);
    }

    #[test]
    fn test_mirror_session_keeps_generation() {
        let store = SessionStore::new();
        let user_id = UserId::random();
        let generation = store.begin_identity(session_for(user_id));
        assert!(store.apply_role(generation, Some(Role::Bartender)));

        let refreshed = Session {
            user_id,
            email: Email::parse("renamed@example.com").expect("valid email"),
        };
        store.mirror_session(refreshed.clone());

        let state = store.read();
        assert_eq!(state.generation, generation);
        assert_eq!(state.session, Some(refreshed));
        assert_eq!(state.role, Some(Role::Bartender));
    }

    #[test]
    fn test_finish_bootstrap_is_one_way() {
        let store = SessionStore::new();
        assert_eq!(store.read().phase(), AuthPhase::Bootstrapping);
        store.finish_bootstrap();
        assert!(!store.read().bootstrapping);
        store.finish_bootstrap();
        assert!(!store.read().bootstrapping);
    }

    #[test]
    fn test_listeners_see_every_commit_in_order() {
        let store = SessionStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let guard = store.subscribe(move |state| {
            sink.lock().expect("listener lock").push(state.generation);
        });

        store.finish_bootstrap();
        store.begin_identity(session_for(UserId::random()));
        store.clear_identity();

        assert_eq!(*seen.lock().expect("lock"), vec![0, 1, 2]);
        drop(guard);
    }

    #[test]
    fn test_dropped_guard_unsubscribes() {
        let store = SessionStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let guard = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.finish_bootstrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        guard.unsubscribe();
        store.begin_identity(session_for(UserId::random()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_racing_committers_deliver_in_commit_order() {
        // A role resolution and a sign-out committing from different
        // threads: listeners must never see the signed-in snapshot
        // after the signed-out one.
        for _ in 0..2_000 {
            let store = SessionStore::new();
            let generation = store.begin_identity(session_for(UserId::random()));

            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let _guard = store.subscribe(move |state| {
                sink.lock()
                    .expect("listener lock")
                    .push((state.generation, state.role));
            });

            let resolver = store.clone();
            let resolve = std::thread::spawn(move || {
                resolver.apply_role(generation, Some(Role::Manager));
            });
            let clearer = store.clone();
            let clear = std::thread::spawn(move || {
                clearer.clear_identity();
            });
            resolve.join().expect("resolve thread");
            clear.join().expect("clear thread");

            let seen = seen.lock().expect("lock");
            for pair in seen.windows(2) {
                assert!(
                    pair[0].0 <= pair[1].0,
                    "stale snapshot delivered after a later commit: {seen:?}"
                );
            }
            let state = store.read();
            assert_eq!(state.session, None);
            assert_eq!(state.role, None);
        }
    }

    #[test]
    fn test_no_op_mutations_do_not_notify() {
        let store = SessionStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _guard = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!store.clear_identity());
        store.mirror_session(session_for(UserId::random()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
