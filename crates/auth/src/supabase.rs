//! Hosted auth/database service adapter.
//!
//! Implements [`IdentityProvider`] over the GoTrue REST API and
//! [`ProfileResolver`] over PostgREST, the two surfaces the hosted
//! service exposes. The adapter owns the token set (access/refresh/
//! expiry) and emits change-stream events as a consequence of its own
//! calls, so the controller observes sign-ins, refreshes, and
//! sign-outs through the one canonical path.
//!
//! # Environment Variables
//!
//! - `SUPABASE_URL` - Project base URL (e.g. `https://xyz.supabase.co`)
//! - `SUPABASE_ANON_KEY` - Public anon API key

use std::fmt::Display;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use taproom_core::{Email, Role, UserId};

use crate::config::ConfigError;
use crate::error::{ProfileError, ProviderError};
use crate::profile::ProfileResolver;
use crate::provider::{IdentityProvider, SessionEventHub, SessionEvents};
use crate::state::Session;

/// Tokens within this many seconds of expiry are refreshed eagerly.
const EXPIRY_LEEWAY_SECS: i64 = 30;

/// Connection settings for the hosted service.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project base URL, without a trailing slash.
    pub url: String,
    /// Public anon API key.
    pub anon_key: SecretString,
}

impl SupabaseConfig {
    /// Load the configuration from `SUPABASE_URL` and
    /// `SUPABASE_ANON_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if either variable is
    /// unset, `ConfigError::InvalidEnvVar` if the URL does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("SUPABASE_URL".to_owned()))?;
        url::Url::parse(&url)
            .map_err(|e| ConfigError::InvalidEnvVar("SUPABASE_URL".to_owned(), e.to_string()))?;

        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("SUPABASE_ANON_KEY".to_owned()))?;

        Ok(Self {
            url: url.trim_end_matches('/').to_owned(),
            anon_key: anon_key.into(),
        })
    }
}

/// The token set held after a successful sign-in or refresh.
struct TokenSet {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    session: Session,
}

impl TokenSet {
    fn is_near_expiry(&self) -> bool {
        self.expires_at - Utc::now() < Duration::seconds(EXPIRY_LEEWAY_SECS)
    }
}

/// GoTrue-backed identity provider.
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Mutex<Option<TokenSet>>,
    hub: SessionEventHub,
}

impl SupabaseClient {
    /// Create a client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Connection` if the HTTP client cannot
    /// be built (e.g. the anon key is not a valid header value).
    pub fn new(config: &SupabaseConfig) -> Result<Self, ProviderError> {
        let http = build_http(&config.anon_key).map_err(connection)?;
        Ok(Self {
            http,
            base_url: config.url.clone(),
            tokens: Mutex::new(None),
            hub: SessionEventHub::new(),
        })
    }

    /// Exchange the refresh token for a new token set and emit the
    /// refreshed session on the change stream.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::InvalidCredentials` if the refresh
    /// token was rejected (the session is gone; local tokens are
    /// cleared and a sign-out event is emitted),
    /// `ProviderError::Connection` otherwise.
    pub async fn refresh_session(&self) -> Result<Session, ProviderError> {
        let refresh_token = self
            .lock_tokens()
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .ok_or_else(|| connection("no session to refresh"))?;

        let response = self
            .http
            .post(format!(
                "{}/auth/v1/token?grant_type=refresh_token",
                self.base_url
            ))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(connection)?;

        if credentials_rejected(response.status()) {
            // The provider no longer recognizes this session.
            debug!("refresh token rejected, clearing session");
            *self.lock_tokens() = None;
            self.hub.emit(None);
            return Err(ProviderError::InvalidCredentials);
        }
        let response = response.error_for_status().map_err(connection)?;

        let payload: TokenResponse = response.json().await.map_err(connection)?;
        let session = self.store_tokens(payload)?;
        self.hub.emit(Some(session.clone()));
        Ok(session)
    }

    /// Parse a token grant response and install it as the held
    /// token set.
    fn store_tokens(&self, payload: TokenResponse) -> Result<Session, ProviderError> {
        let session = payload.user.into_session()?;
        *self.lock_tokens() = Some(TokenSet {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            expires_at: Utc::now() + Duration::seconds(payload.expires_in),
            session: session.clone(),
        });
        Ok(session)
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, Option<TokenSet>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        let access_token = match self.lock_tokens().as_ref() {
            None => return Ok(None),
            Some(tokens) if tokens.is_near_expiry() => None,
            Some(tokens) => Some(tokens.access_token.clone()),
        };

        let Some(access_token) = access_token else {
            // Expired or about to: try the refresh grant. A rejected
            // refresh token means there is no session any more.
            return match self.refresh_session().await {
                Ok(session) => Ok(Some(session)),
                Err(ProviderError::InvalidCredentials) => Ok(None),
                Err(err) => Err(err),
            };
        };

        // Confirm with the provider rather than trusting the mirror.
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(connection)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return match self.refresh_session().await {
                Ok(session) => Ok(Some(session)),
                Err(ProviderError::InvalidCredentials) => Ok(None),
                Err(err) => Err(err),
            };
        }
        let response = response.error_for_status().map_err(connection)?;

        let user: UserPayload = response.json().await.map_err(connection)?;
        let session = user.into_session()?;
        if let Some(tokens) = self.lock_tokens().as_mut() {
            tokens.session = session.clone();
        }
        Ok(Some(session))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let response = self
            .http
            .post(format!(
                "{}/auth/v1/token?grant_type=password",
                self.base_url
            ))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(connection)?;

        if credentials_rejected(response.status()) {
            return Err(ProviderError::InvalidCredentials);
        }
        let response = response.error_for_status().map_err(connection)?;

        let payload: TokenResponse = response.json().await.map_err(connection)?;
        let session = self.store_tokens(payload)?;
        self.hub.emit(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let access_token = self.lock_tokens().as_ref().map(|t| t.access_token.clone());

        // Local tokens go away regardless of what the provider says;
        // the change stream reports the sign-out once.
        let result = match access_token {
            None => Ok(()),
            Some(token) => {
                let response = self
                    .http
                    .post(format!("{}/auth/v1/logout", self.base_url))
                    .bearer_auth(&token)
                    .send()
                    .await
                    .map_err(connection)?;
                // 401 means the token was already invalid; that is a
                // successful sign-out from our point of view.
                if response.status() == StatusCode::UNAUTHORIZED || response.status().is_success() {
                    Ok(())
                } else {
                    Err(connection(format!(
                        "logout failed with status {}",
                        response.status()
                    )))
                }
            }
        };

        let had_session = self.lock_tokens().take().is_some();
        if had_session {
            self.hub.emit(None);
        }
        result
    }

    fn subscribe(&self) -> SessionEvents {
        self.hub.subscribe()
    }
}

/// PostgREST-backed role resolver.
///
/// Reads the `profiles` table: one optional row per user keyed by the
/// provider's user ID, carrying the kebab-case role string.
pub struct SupabaseProfiles {
    http: reqwest::Client,
    base_url: String,
}

impl SupabaseProfiles {
    /// Create a resolver for the configured project.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Connection` if the HTTP client cannot be
    /// built.
    pub fn new(config: &SupabaseConfig) -> Result<Self, ProfileError> {
        let http =
            build_http(&config.anon_key).map_err(|e| ProfileError::Connection(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.url.clone(),
        })
    }
}

#[async_trait]
impl ProfileResolver for SupabaseProfiles {
    async fn resolve_role(&self, user_id: UserId) -> Result<Option<Role>, ProfileError> {
        let response = self
            .http
            .get(format!("{}/rest/v1/profiles", self.base_url))
            .query(&[("id", format!("eq.{user_id}")), ("select", "role".to_owned())])
            .send()
            .await
            .map_err(|e| ProfileError::Connection(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProfileError::Connection(e.to_string()))?;

        // A row with an unknown role string fails deserialization into
        // the closed Role enum and is reported as a store problem, so
        // it downgrades to "no elevated role" instead of guessing.
        let rows: Vec<ProfileRow> = response
            .json()
            .await
            .map_err(|e| ProfileError::Connection(format!("malformed profile row: {e}")))?;

        Ok(rows.into_iter().next().map(|row| row.role))
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: UserPayload,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: UserId,
    email: String,
}

impl UserPayload {
    fn into_session(self) -> Result<Session, ProviderError> {
        let email = Email::parse(&self.email)
            .map_err(|e| connection(format!("malformed user record: {e}")))?;
        Ok(Session {
            user_id: self.id,
            email,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    role: Role,
}

// =============================================================================
// Helpers
// =============================================================================

/// Build an HTTP client with the project's `apikey` and default
/// bearer headers installed. Requests carrying a user access token
/// override the Authorization header per call.
fn build_http(anon_key: &SecretString) -> Result<reqwest::Client, String> {
    let mut headers = HeaderMap::new();
    let key = HeaderValue::from_str(anon_key.expose_secret())
        .map_err(|e| format!("invalid anon key: {e}"))?;
    headers.insert("apikey", key);
    headers.insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {}", anon_key.expose_secret()))
            .map_err(|e| format!("invalid anon key: {e}"))?,
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| e.to_string())
}

/// Statuses GoTrue uses to reject credentials or refresh tokens.
fn credentials_rejected(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::UNPROCESSABLE_ENTITY
    )
}

fn connection(err: impl Display) -> ProviderError {
    ProviderError::Connection(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_row_parses_kebab_case_role() {
        let rows: Vec<ProfileRow> =
            serde_json::from_str(r#"[{"role": "shift-manager"}]"#).expect("valid row");
        assert_eq!(rows.first().map(|r| r.role), Some(Role::ShiftManager));
    }

    #[test]
    fn test_unknown_role_fails_closed() {
        let rows: Result<Vec<ProfileRow>, _> = serde_json::from_str(r#"[{"role": "admin"}]"#);
        assert!(rows.is_err());
    }

    #[test]
    fn test_user_payload_rejects_malformed_email() {
        let payload = UserPayload {
            id: UserId::random(),
            email: "not-an-email".to_owned(),
        };
        assert!(matches!(
            payload.into_session(),
            Err(ProviderError::Connection(_))
        ));
    }

    #[test]
    fn test_token_near_expiry() {
        let fresh = TokenSet {
            access_token: String::new(),
            refresh_token: String::new(),
            expires_at: Utc::now() + Duration::seconds(3600),
            session: Session {
                user_id: UserId::random(),
                email: Email::parse("staff@example.com").expect("valid email"),
            },
        };
        assert!(!fresh.is_near_expiry());

        let stale = TokenSet {
            expires_at: Utc::now() + Duration::seconds(5),
            ..fresh
        };
        assert!(stale.is_near_expiry());
    }
}
