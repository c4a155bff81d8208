//! View listing command.

use taproom_core::{AccessLevel, View};

/// Log every view with its required access level.
pub fn list() {
    for view in View::ALL {
        let access = match view.required_access() {
            AccessLevel::Public => "public".to_owned(),
            AccessLevel::AuthenticatedOnly => "any signed-in user".to_owned(),
            AccessLevel::RoleAtLeast(role) => format!("role at least {role}"),
        };
        tracing::info!(view = view.slug(), %access);
    }
}
