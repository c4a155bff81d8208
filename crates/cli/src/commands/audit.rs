//! Access audit command.
//!
//! Signs in against the live hosted provider, waits for the role to
//! settle, and reports which views the account can reach.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use taproom_auth::config::{AuthConfig, ConfigError};
use taproom_auth::controller::AuthController;
use taproom_auth::error::{AuthError, ProfileError, ProviderError};
use taproom_auth::guard;
use taproom_auth::profile::ProfileResolver;
use taproom_auth::provider::IdentityProvider;
use taproom_auth::supabase::{SupabaseClient, SupabaseConfig, SupabaseProfiles};
use taproom_core::View;

/// How long to wait for the role lookup to settle before reporting.
const ROLE_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur during an access audit.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The provider client could not be built.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The resolver client could not be built.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// Sign-in or sign-out failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Sign in as `email` and report the reachable views.
///
/// # Errors
///
/// Returns `AuditError` if configuration is missing, the provider is
/// unreachable, or the credentials are rejected.
pub async fn run(email: &str, password: &str) -> Result<(), AuditError> {
    dotenvy::dotenv().ok();

    let config = SupabaseConfig::from_env()?;
    let provider: Arc<dyn IdentityProvider> = Arc::new(SupabaseClient::new(&config)?);
    let resolver: Arc<dyn ProfileResolver> = Arc::new(SupabaseProfiles::new(&config)?);
    let controller = AuthController::start(provider, resolver, AuthConfig::from_env()?);

    controller.sign_in(email, password).await?;

    // The session lands before the role; give the lookup a moment to
    // settle. An account with no profile row legitimately never gets
    // one, hence the bounded wait instead of a hard condition.
    let mut changes = controller.store().watch();
    let _ = tokio::time::timeout(
        ROLE_SETTLE_TIMEOUT,
        changes.wait_for(|state| state.role.is_some()),
    )
    .await;

    let state = controller.state();
    tracing::info!(
        email,
        role = state.role.map_or("none", |role| role.as_str()),
        phase = ?state.phase(),
        "signed in"
    );

    for view in View::ALL {
        let reachable = guard::resolve(view, &state) == view;
        tracing::info!(view = view.slug(), reachable);
    }

    controller.sign_out().await?;
    tracing::info!("signed out");

    Ok(())
}
