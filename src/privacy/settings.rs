// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::access::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationPreferences {
    pub email: bool,
    pub push: bool,
    pub weekly_report: bool,
    /// Security alerts cannot be turned off for guardians.
    pub security_alerts: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SharingPreferences {
    pub share_progress_with_parents: bool,
    pub share_achievements: bool,
    pub public_profile: bool,
}

/// Per-principal privacy preferences. Never deleted by the manager, only
/// overwritten; erasure of the principal removes it with everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PrivacySettings {
    pub data_collection: bool,
    pub analytics: bool,
    pub third_party_sharing: bool,
    /// The principal may export their own data.
    pub allow_data_export: bool,
    /// The principal may erase their own data.
    pub allow_data_deletion: bool,
    pub notifications: NotificationPreferences,
    pub sharing: SharingPreferences,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PrivacySettings {
    /// Safe defaults. Children start with analytics, third-party sharing
    /// and public visibility off.
    pub fn defaults_for(role: Role) -> Self {
        let child = role == Role::Child;
        Self {
            data_collection: true,
            analytics: !child,
            third_party_sharing: false,
            allow_data_export: true,
            allow_data_deletion: true,
            notifications: NotificationPreferences {
                email: !child,
                push: true,
                weekly_report: !child,
                security_alerts: true,
            },
            sharing: SharingPreferences {
                share_progress_with_parents: true,
                share_achievements: !child,
                public_profile: false,
            },
            updated_at: None,
        }
    }

    /// Reject combinations that are never allowed for `role`.
    pub fn validate_for(&self, role: Role) -> Result<(), String> {
        if role == Role::Child && (self.third_party_sharing || self.sharing.public_profile) {
            return Err("children cannot share data with third parties or be public".into());
        }
        if role.is_guardian() && !self.notifications.security_alerts {
            return Err("security alerts cannot be disabled for guardians".into());
        }
        Ok(())
    }
}
