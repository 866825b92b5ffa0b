// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Principal roles and their default grants.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Permission;

/// Principal roles.
///
/// ## Default Grants
///
/// - `Child` - own data, may request payouts
/// - `Parent` - own and child data, approves payouts, manages consent
/// - `Moderator` - read-only oversight of logs and payout history
/// - `Admin` - every permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Child,
    Parent,
    Admin,
    Moderator,
}

impl Role {
    /// Permissions a freshly created principal of this role starts with.
    pub fn default_permissions(&self) -> BTreeSet<Permission> {
        use Permission::*;
        let grants: &[Permission] = match self {
            Role::Child => &[ReadOwnData, WriteOwnData, CreateTransaction],
            Role::Parent => &[
                ReadOwnData,
                WriteOwnData,
                ReadChildData,
                WriteChildData,
                CreateTransaction,
                ApproveTransaction,
                ViewTransactionHistory,
                ManageConsent,
            ],
            Role::Moderator => &[ReadOwnData, ViewLogs, ViewTransactionHistory],
            Role::Admin => &Permission::ALL,
        };
        grants.iter().copied().collect()
    }

    /// Roles that act as guardians and may hold a second factor.
    pub fn is_guardian(&self) -> bool {
        matches!(self, Role::Parent | Role::Admin)
    }

    /// Roles with oversight across families.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Moderator)
    }

    /// Parse role from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Role> {
        match s.to_lowercase().as_str() {
            "child" => Some(Role::Child),
            "parent" => Some(Role::Parent),
            "admin" => Some(Role::Admin),
            "moderator" => Some(Role::Moderator),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Child => write!(f, "child"),
            Role::Parent => write!(f, "parent"),
            Role::Admin => write!(f, "admin"),
            Role::Moderator => write!(f, "moderator"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_has_every_permission() {
        assert_eq!(Role::Admin.default_permissions().len(), Permission::ALL.len());
    }

    #[test]
    fn child_cannot_approve_or_manage() {
        let grants = Role::Child.default_permissions();
        assert!(grants.contains(&Permission::CreateTransaction));
        assert!(!grants.contains(&Permission::ApproveTransaction));
        assert!(!grants.contains(&Permission::ManageUsers));
        assert!(!grants.contains(&Permission::ReadChildData));
    }

    #[test]
    fn parent_approves_but_does_not_administer() {
        let grants = Role::Parent.default_permissions();
        assert!(grants.contains(&Permission::ApproveTransaction));
        assert!(grants.contains(&Permission::ManageConsent));
        assert!(!grants.contains(&Permission::ManageUsers));
        assert!(!grants.contains(&Permission::ManageSystem));
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Role::parse("PARENT"), Some(Role::Parent));
        assert_eq!(Role::parse("Moderator"), Some(Role::Moderator));
        assert_eq!(Role::parse("guardian"), None);
    }

    #[test]
    fn guardian_roles() {
        assert!(Role::Parent.is_guardian());
        assert!(Role::Admin.is_guardian());
        assert!(!Role::Child.is_guardian());
        assert!(!Role::Moderator.is_guardian());
    }
}
