//! Error taxonomy for the auth subsystem.
//!
//! Only two things can go wrong at the interface to the outside world:
//! credentials can be wrong, or a backing service can be unreachable.
//! Everything else (stale role resolutions, provider echo events after
//! a local sign-out) is ordinary behavior that is absorbed by the
//! controller rather than surfaced as an error.

use thiserror::Error;

/// Errors from the identity provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The email/password pair was rejected.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The provider could not be reached or answered unusably.
    #[error("identity provider unreachable: {0}")]
    Connection(String),
}

/// Errors from the profile/role store.
///
/// An absent profile row is *not* an error; resolvers report it as
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The profile store could not be reached or answered unusably.
    #[error("profile store unreachable: {0}")]
    Connection(String),
}

/// Errors surfaced to callers of [`AuthController`] operations.
///
/// Identity-provider errors reach the UI only through the explicit
/// `sign_in`/`sign_out` results carrying this type; background
/// reconciliation never throws into unrelated call stacks.
///
/// [`AuthController`]: crate::controller::AuthController
#[derive(Debug, Error)]
pub enum AuthError {
    /// The email/password pair was rejected. Shown inline on the
    /// sign-in form; causes no state change.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// A backing service could not be reached, or an operation timed
    /// out waiting for it.
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidCredentials => Self::InvalidCredentials,
            ProviderError::Connection(msg) => Self::Connection(msg),
        }
    }
}

impl From<ProfileError> for AuthError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::Connection(msg) => Self::Connection(msg),
        }
    }
}
