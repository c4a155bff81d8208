//! Authorization roles.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when parsing an unknown role string.
#[derive(thiserror::Error, Debug, Clone)]
#[error("invalid role: {0}. Valid roles: bartender, shift-manager, manager")]
pub struct RoleParseError(pub String);

/// Authorization role assigned to an authenticated user.
///
/// Roles are resolved from the profile store independently of the
/// session. The variants are totally ordered by privilege, so "at
/// least shift manager" is simply `role >= Role::ShiftManager`.
///
/// Absence of a role (`Option::<Role>::None`) is a valid state for an
/// authenticated user: it means no elevated-role row exists for them,
/// which is distinct from being unauthenticated.
///
/// The wire form is the kebab-case string stored in the profile row
/// (`bartender`, `shift-manager`, `manager`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Staff access: shifts and recipes.
    Bartender,
    /// Bartender access plus shift reports.
    ShiftManager,
    /// Full access including stock and management views.
    Manager,
}

impl Role {
    /// All roles, in ascending privilege order.
    pub const ALL: [Self; 3] = [Self::Bartender, Self::ShiftManager, Self::Manager];

    /// Stable kebab-case identifier used in the profile store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bartender => "bartender",
            Self::ShiftManager => "shift-manager",
            Self::Manager => "manager",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bartender" => Ok(Self::Bartender),
            "shift-manager" => Ok(Self::ShiftManager),
            "manager" => Ok(Self::Manager),
            _ => Err(RoleParseError(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_ordering() {
        assert!(Role::Bartender < Role::ShiftManager);
        assert!(Role::ShiftManager < Role::Manager);
        assert!(Role::Manager >= Role::ShiftManager);
    }

    #[test]
    fn test_wire_round_trip() {
        for role in Role::ALL {
            let parsed: Role = role.as_str().parse().expect("valid role string");
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        // The profile store is loosely typed; anything unexpected must
        // fail parsing rather than silently mapping to a role.
        assert!("admin".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn test_serde_kebab_case() {
        let json = serde_json::to_string(&Role::ShiftManager).expect("serializes");
        assert_eq!(json, "\"shift-manager\"");
        let back: Role = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, Role::ShiftManager);
    }
}
