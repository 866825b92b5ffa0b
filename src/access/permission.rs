// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Enumerated capabilities. Absence of a permission means denial.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadOwnData,
    WriteOwnData,
    ReadChildData,
    WriteChildData,
    CreateTransaction,
    ApproveTransaction,
    ViewTransactionHistory,
    ManageConsent,
    ManageUsers,
    ViewLogs,
    ManageSystem,
}

impl Permission {
    pub const ALL: [Permission; 11] = [
        Permission::ReadOwnData,
        Permission::WriteOwnData,
        Permission::ReadChildData,
        Permission::WriteChildData,
        Permission::CreateTransaction,
        Permission::ApproveTransaction,
        Permission::ViewTransactionHistory,
        Permission::ManageConsent,
        Permission::ManageUsers,
        Permission::ViewLogs,
        Permission::ManageSystem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadOwnData => "read_own_data",
            Permission::WriteOwnData => "write_own_data",
            Permission::ReadChildData => "read_child_data",
            Permission::WriteChildData => "write_child_data",
            Permission::CreateTransaction => "create_transaction",
            Permission::ApproveTransaction => "approve_transaction",
            Permission::ViewTransactionHistory => "view_transaction_history",
            Permission::ManageConsent => "manage_consent",
            Permission::ManageUsers => "manage_users",
            Permission::ViewLogs => "view_logs",
            Permission::ManageSystem => "manage_system",
        }
    }

    /// Parse the snake_case wire name.
    pub fn parse(s: &str) -> Option<Permission> {
        Permission::ALL.into_iter().find(|p| p.as_str() == s)
    }

    /// Own-data permissions only apply to the principal's own resources.
    pub fn is_self_scoped(&self) -> bool {
        matches!(self, Permission::ReadOwnData | Permission::WriteOwnData)
    }

    /// Child-data permissions only apply to the principal's linked children.
    pub fn is_child_scoped(&self) -> bool {
        matches!(self, Permission::ReadChildData | Permission::WriteChildData)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_matches_serde_names() {
        for permission in Permission::ALL {
            let json = serde_json::to_string(&permission).unwrap();
            assert_eq!(json, format!("\"{}\"", permission.as_str()));
            assert_eq!(Permission::parse(permission.as_str()), Some(permission));
        }
        assert_eq!(Permission::parse("root"), None);
    }

    #[test]
    fn scoping_flags() {
        assert!(Permission::ReadOwnData.is_self_scoped());
        assert!(Permission::WriteChildData.is_child_scoped());
        assert!(!Permission::ApproveTransaction.is_self_scoped());
        assert!(!Permission::ApproveTransaction.is_child_scoped());
    }
}
