//! Navigation guard: pure view-access policy.
//!
//! Maps (requested view, current auth state) to the view actually
//! rendered. No side effects, no caching: callers must re-evaluate at
//! the moment a view is rendered or committed, because the auth state
//! can change asynchronously (role revoked, session expired) between
//! a navigation intent and the render.

use taproom_core::{AccessLevel, View};

use crate::state::AuthState;

/// Where disallowed (and unknown) navigation lands.
pub const DEFAULT_VIEW: View = View::Menu;

/// Resolve the view to render for a navigation request.
///
/// Policy, in order: public views are always allowed;
/// authenticated-only views require a session; role-gated views
/// require a role at or above the annotated minimum. Anything not
/// allowed redirects to [`DEFAULT_VIEW`].
#[must_use]
pub fn resolve(requested: View, state: &AuthState) -> View {
    match requested.required_access() {
        AccessLevel::Public => requested,
        AccessLevel::AuthenticatedOnly => {
            if state.is_authenticated() {
                requested
            } else {
                DEFAULT_VIEW
            }
        }
        AccessLevel::RoleAtLeast(minimum) => {
            if state.is_authenticated() && state.has_role_at_least(minimum) {
                requested
            } else {
                DEFAULT_VIEW
            }
        }
    }
}

/// Resolve a navigation request given as a slug.
///
/// An unrecognized slug resolves to [`DEFAULT_VIEW`].
#[must_use]
pub fn resolve_slug(slug: &str, state: &AuthState) -> View {
    slug.parse::<View>()
        .map_or(DEFAULT_VIEW, |view| resolve(view, state))
}
