//! Navigation targets and their access requirements.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::role::Role;

/// Error returned when parsing an unknown view slug.
#[derive(thiserror::Error, Debug, Clone)]
#[error("unknown view: {0}")]
pub struct ViewParseError(pub String);

/// Access level required to reach a view.
///
/// Annotated statically on each [`View`]; the navigation guard compares
/// it against the current auth state at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessLevel {
    /// Reachable by anyone, signed in or not.
    Public,
    /// Requires a session; any role (including none) is sufficient.
    AuthenticatedOnly,
    /// Requires a session and a role of at least the given privilege.
    RoleAtLeast(Role),
}

/// A navigation target in the front end.
///
/// The set is closed: every view the application can render is listed
/// here and carries its required [`AccessLevel`]. Slugs are the
/// kebab-case identifiers used in navigation intents
/// (`reports-management`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    /// Public menu display; also the default redirect target.
    Menu,
    /// Sign-in form.
    Login,
    /// Shift signup board for staff.
    Shifts,
    /// House recipes for staff.
    Recipes,
    /// Shift reports, for shift managers and up.
    Reports,
    /// Stock management, managers only.
    Stock,
    /// Shift administration, managers only.
    ShiftManagement,
    /// Report administration, managers only.
    ReportsManagement,
}

impl View {
    /// Every defined view.
    pub const ALL: [Self; 8] = [
        Self::Menu,
        Self::Login,
        Self::Shifts,
        Self::Recipes,
        Self::Reports,
        Self::Stock,
        Self::ShiftManagement,
        Self::ReportsManagement,
    ];

    /// The access level required to render this view.
    #[must_use]
    pub const fn required_access(&self) -> AccessLevel {
        match self {
            Self::Menu | Self::Login => AccessLevel::Public,
            Self::Shifts | Self::Recipes => AccessLevel::AuthenticatedOnly,
            Self::Reports => AccessLevel::RoleAtLeast(Role::ShiftManager),
            Self::Stock | Self::ShiftManagement | Self::ReportsManagement => {
                AccessLevel::RoleAtLeast(Role::Manager)
            }
        }
    }

    /// Stable kebab-case slug for this view.
    #[must_use]
    pub const fn slug(&self) -> &'static str {
        match self {
            Self::Menu => "menu",
            Self::Login => "login",
            Self::Shifts => "shifts",
            Self::Recipes => "recipes",
            Self::Reports => "reports",
            Self::Stock => "stock",
            Self::ShiftManagement => "shift-management",
            Self::ReportsManagement => "reports-management",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for View {
    type Err = ViewParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "menu" => Ok(Self::Menu),
            "login" => Ok(Self::Login),
            "shifts" => Ok(Self::Shifts),
            "recipes" => Ok(Self::Recipes),
            "reports" => Ok(Self::Reports),
            "stock" => Ok(Self::Stock),
            "shift-management" => Ok(Self::ShiftManagement),
            "reports-management" => Ok(Self::ReportsManagement),
            _ => Err(ViewParseError(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_round_trip() {
        for view in View::ALL {
            let parsed: View = view.slug().parse().expect("valid slug");
            assert_eq!(view, parsed);
        }
    }

    #[test]
    fn test_unknown_slug_is_rejected() {
        assert!("dashboard".parse::<View>().is_err());
    }

    #[test]
    fn test_access_levels_match_policy() {
        assert_eq!(View::Menu.required_access(), AccessLevel::Public);
        assert_eq!(View::Shifts.required_access(), AccessLevel::AuthenticatedOnly);
        assert_eq!(
            View::Reports.required_access(),
            AccessLevel::RoleAtLeast(Role::ShiftManager)
        );
        assert_eq!(
            View::ReportsManagement.required_access(),
            AccessLevel::RoleAtLeast(Role::Manager)
        );
    }
}
