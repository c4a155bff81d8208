//! Auth controller configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional; durations are in whole seconds.
//!
//! - `TAPROOM_BOOTSTRAP_TIMEOUT_SECS` - Bound on the startup session
//!   check (default: 10)
//! - `TAPROOM_RESOLVE_TIMEOUT_SECS` - Bound on each role lookup
//!   (default: 10)
//! - `TAPROOM_CALL_TIMEOUT_SECS` - Bound on a caller-initiated
//!   provider call: sign-in (including waiting for its state
//!   transition to land) or sign-out (default: 15)

use std::time::Duration;

use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Timeouts bounding the controller's external calls.
///
/// Every asynchronous call to the identity provider or profile store
/// is bounded so the controller can never sit in `Bootstrapping`
/// indefinitely; expiry is treated as a connection error.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Bound on the startup session check.
    pub bootstrap_timeout: Duration,
    /// Bound on each role lookup.
    pub resolve_timeout: Duration,
    /// Bound on a caller-initiated provider call: sign-in (the
    /// provider call plus waiting for the resulting change-stream
    /// transition to be applied) or sign-out.
    pub call_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bootstrap_timeout: Duration::from_secs(10),
            resolve_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(15),
        }
    }
}

impl AuthConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a set variable is not a
    /// positive integer number of seconds.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            bootstrap_timeout: env_duration(
                "TAPROOM_BOOTSTRAP_TIMEOUT_SECS",
                defaults.bootstrap_timeout,
            )?,
            resolve_timeout: env_duration(
                "TAPROOM_RESOLVE_TIMEOUT_SECS",
                defaults.resolve_timeout,
            )?,
            call_timeout: env_duration(
                "TAPROOM_CALL_TIMEOUT_SECS",
                defaults.call_timeout,
            )?,
        })
    }
}

/// Read an optional duration (whole seconds) from the environment.
fn env_duration(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => parse_secs(name, &raw),
        Err(_) => Ok(default),
    }
}

/// Parse a whole positive number of seconds.
fn parse_secs(name: &str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = raw.parse().map_err(|_| {
        ConfigError::InvalidEnvVar(name.to_owned(), format!("not a whole number: {raw}"))
    })?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            name.to_owned(),
            "must be positive".to_owned(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.bootstrap_timeout, Duration::from_secs(10));
        assert_eq!(config.resolve_timeout, Duration::from_secs(10));
        assert_eq!(config.call_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_parse_secs_accepts_whole_seconds() {
        let d = parse_secs("TAPROOM_BOOTSTRAP_TIMEOUT_SECS", "30").expect("valid");
        assert_eq!(d, Duration::from_secs(30));
    }

    #[test]
    fn test_parse_secs_rejects_zero_and_garbage() {
        assert!(parse_secs("TAPROOM_BOOTSTRAP_TIMEOUT_SECS", "0").is_err());
        assert!(parse_secs("TAPROOM_BOOTSTRAP_TIMEOUT_SECS", "ten").is_err());
        assert!(parse_secs("TAPROOM_BOOTSTRAP_TIMEOUT_SECS", "-5").is_err());
    }

    #[test]
    fn test_env_duration_falls_back_when_unset() {
        let d = env_duration("TAPROOM_TEST_UNSET_SECS", Duration::from_secs(7))
            .expect("unset is not an error");
        assert_eq!(d, Duration::from_secs(7));
    }
}
