//! Taproom Core - Shared types library.
//!
//! This crate provides common types used across all Taproom components:
//! - `auth` - Session tracking and role-gated navigation
//! - `cli` - Command-line tools for access auditing
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no
//! async code. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers and closed enums for user identity,
//!   authorization roles, and navigation targets

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
