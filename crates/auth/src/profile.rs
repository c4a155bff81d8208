//! Profile/role store interface.

use async_trait::async_trait;

use taproom_core::{Role, UserId};

use crate::error::ProfileError;

/// Resolves the authorization role for a user identity.
///
/// Pure request/response with no state of its own. Idempotent and
/// side-effect-free on shared state, so the controller is free to call
/// it concurrently and discard late results.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// Look up the stored role for `user_id`.
    ///
    /// `Ok(None)` means no elevated-role row exists for the user; that
    /// is a valid outcome, not an error. Implementations never retry
    /// internally; the caller owns retry/timeout policy.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Connection` if the backing store is
    /// unreachable.
    async fn resolve_role(&self, user_id: UserId) -> Result<Option<Role>, ProfileError>;
}
