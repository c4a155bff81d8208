//! Taproom Auth - session tracking and role-gated navigation.
//!
//! This crate owns the one piece of the front end with real design
//! pressure: knowing who is currently signed in and with what
//! authorization role while sign-in, sign-out, and session-refresh
//! events from the hosted identity provider race against a slower,
//! independent role lookup.
//!
//! # Architecture
//!
//! - [`store::SessionStore`] holds the [`state::AuthState`] snapshot
//!   and is the single source of truth every protected view consults.
//! - [`controller::AuthController`] is the sole writer of the store.
//!   It bootstraps from the provider's existing session, pumps the
//!   provider's change stream, and reconciles role lookups using
//!   generation tags so that late results for a superseded identity
//!   are discarded rather than applied.
//! - [`guard`] is the pure policy mapping a requested [`View`] and the
//!   current snapshot to the view actually rendered.
//! - [`provider`] and [`profile`] define the external collaborators as
//!   traits; [`supabase`] implements them against the hosted service.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use taproom_auth::config::AuthConfig;
//! use taproom_auth::controller::AuthController;
//! use taproom_auth::guard;
//! use taproom_core::View;
//!
//! let controller = AuthController::start(provider, resolver, AuthConfig::default());
//! controller.sign_in("bartender@example.com", "secret").await?;
//!
//! let state = controller.store().read();
//! let shown = guard::resolve(View::Reports, &state);
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod controller;
pub mod error;
pub mod guard;
pub mod profile;
pub mod provider;
pub mod state;
pub mod store;
pub mod supabase;

pub use config::AuthConfig;
pub use controller::AuthController;
pub use error::{AuthError, ProfileError, ProviderError};
pub use state::{AuthPhase, AuthState, Session};
pub use store::SessionStore;
