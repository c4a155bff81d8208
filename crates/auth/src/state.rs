//! Authentication/authorization snapshot types.

use serde::{Deserialize, Serialize};

use taproom_core::{Email, Role, UserId};

/// Identity record issued by the external provider.
///
/// Opaque beyond carrying the user's identity: the provider owns it,
/// the controller only mirrors the most recently confirmed copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Provider-issued user ID.
    pub user_id: UserId,
    /// Email the user signed in with.
    pub email: Email,
}

impl Session {
    /// Whether `other` refers to the same user identity.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.user_id == other.user_id
    }
}

/// Derived lifecycle phase of the auth state.
///
/// Not stored separately; a projection of [`AuthState`] for logging
/// and for UI code that wants a single value to match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthPhase {
    /// The initial session check has not completed yet.
    Bootstrapping,
    /// No session.
    Unauthenticated,
    /// Session present, no elevated role row found (or still resolving).
    AuthenticatedNoRole,
    /// Session present and a role has been resolved for it.
    AuthenticatedWithRole,
}

/// The authentication/authorization snapshot.
///
/// Created once at process start (generation 0, bootstrapping), mutated
/// exclusively by the controller, and read by everything else through
/// [`SessionStore`](crate::store::SessionStore).
///
/// # Invariants
///
/// - `role.is_some()` implies `session.is_some()`.
/// - `bootstrapping` is true only until the first session check
///   completes and never becomes true again.
/// - `generation` strictly increases on every identity-changing event
///   and is the sole tie-breaker for out-of-order role resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    /// The most recently confirmed session, if any.
    pub session: Option<Session>,
    /// Resolved role for the current session's user.
    pub role: Option<Role>,
    /// True until the first session check completes.
    pub bootstrapping: bool,
    /// Identity-transition counter tagging role resolutions.
    pub generation: u64,
}

impl AuthState {
    /// The state a process starts in.
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            session: None,
            role: None,
            bootstrapping: true,
            generation: 0,
        }
    }

    /// Whether a session is present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the current role meets `minimum`.
    #[must_use]
    pub fn has_role_at_least(&self, minimum: Role) -> bool {
        self.role.is_some_and(|role| role >= minimum)
    }

    /// Derived lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> AuthPhase {
        if self.bootstrapping {
            AuthPhase::Bootstrapping
        } else if self.session.is_none() {
            AuthPhase::Unauthenticated
        } else if self.role.is_none() {
            AuthPhase::AuthenticatedNoRole
        } else {
            AuthPhase::AuthenticatedWithRole
        }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            user_id: UserId::random(),
            email: Email::parse("staff@example.com").expect("valid email"),
        }
    }

    #[test]
    fn test_initial_state() {
        let state = AuthState::initial();
        assert_eq!(state.phase(), AuthPhase::Bootstrapping);
        assert_eq!(state.generation, 0);
        assert!(!state.is_authenticated());
    }

    #[test]
    fn test_phase_projection() {
        let mut state = AuthState::initial();
        state.bootstrapping = false;
        assert_eq!(state.phase(), AuthPhase::Unauthenticated);

        state.session = Some(session());
        assert_eq!(state.phase(), AuthPhase::AuthenticatedNoRole);

        state.role = Some(Role::Bartender);
        assert_eq!(state.phase(), AuthPhase::AuthenticatedWithRole);
    }

    #[test]
    fn test_role_threshold() {
        let mut state = AuthState::initial();
        state.session = Some(session());
        state.role = Some(Role::ShiftManager);

        assert!(state.has_role_at_least(Role::Bartender));
        assert!(state.has_role_at_least(Role::ShiftManager));
        assert!(!state.has_role_at_least(Role::Manager));

        state.role = None;
        assert!(!state.has_role_at_least(Role::Bartender));
    }

    #[test]
    fn test_same_identity_ignores_email() {
        let a = session();
        let b = Session {
            user_id: a.user_id,
            email: Email::parse("renamed@example.com").expect("valid email"),
        };
        assert!(a.same_identity(&b));
    }
}
