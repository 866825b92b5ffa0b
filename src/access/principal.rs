// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Permission, Role};

/// An identity subject to permission checks.
///
/// Links between parents and children are plain ids looked up through the
/// authority; a principal never owns another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Principal {
    pub id: String,
    pub role: Role,
    /// Set for children: the guardian they belong to.
    pub parent_id: Option<String>,
    /// Optional primary child of a parent.
    pub child_id: Option<String>,
    pub permissions: BTreeSet<Permission>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn new(
        id: impl Into<String>,
        role: Role,
        parent_id: Option<String>,
        child_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            parent_id,
            child_id,
            permissions: role.default_permissions(),
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    /// Effective grant: inactive principals hold nothing.
    pub fn holds(&self, permission: Permission) -> bool {
        self.is_active && self.permissions.contains(&permission)
    }

    pub fn is_child_of(&self, parent_id: &str) -> bool {
        self.role == Role::Child && self.parent_id.as_deref() == Some(parent_id)
    }
}
