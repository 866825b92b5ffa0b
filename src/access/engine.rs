// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization decisions and principal lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use super::{
    AccessAction, AccessLog, AccessLogEntry, Permission, Principal, PrincipalCache, Role,
};
use crate::authority::AuthorityBackend;
use crate::error::{TrustError, TrustResult};
use crate::locks::KeyedLocks;

const CACHE_CAPACITY: usize = 1024;
const CACHE_TTL: Duration = Duration::from_secs(60);
const MAX_ID_LEN: usize = 128;

/// Principal ids: 1-128 ASCII alphanumerics, `-`, `_`, `.` or `@`.
pub fn validate_principal_id(id: &str) -> TrustResult<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if valid {
        Ok(())
    } else {
        Err(TrustError::invalid_input(format!("invalid principal id `{id}`")))
    }
}

pub struct AccessControlEngine {
    authority: Arc<dyn AuthorityBackend>,
    cache: PrincipalCache,
    log: AccessLog,
    locks: KeyedLocks,
}

impl AccessControlEngine {
    pub fn new(authority: Arc<dyn AuthorityBackend>, log: AccessLog) -> Self {
        Self {
            authority,
            cache: PrincipalCache::new(CACHE_CAPACITY, CACHE_TTL),
            log,
            locks: KeyedLocks::new(),
        }
    }

    pub fn authority(&self) -> &Arc<dyn AuthorityBackend> {
        &self.authority
    }

    pub fn access_log(&self) -> &AccessLog {
        &self.log
    }

    // =========================================================================
    // Principal lifecycle
    // =========================================================================

    /// Create a principal at the authority, then cache the confirmed record.
    ///
    /// A child must name an existing, active parent.
    pub async fn create_principal(
        &self,
        id: &str,
        role: Role,
        parent_id: Option<&str>,
        child_id: Option<&str>,
    ) -> TrustResult<Principal> {
        validate_principal_id(id)?;
        if let Some(child_id) = child_id {
            validate_principal_id(child_id)?;
        }

        match (role, parent_id) {
            (Role::Child, Some(parent_id)) => {
                let parent = self.authority.get_principal(parent_id).await?;
                match parent {
                    Some(p) if p.role == Role::Parent && p.is_active => {}
                    _ => {
                        return Err(TrustError::invalid_input(format!(
                            "parent {parent_id} does not exist or is not an active parent"
                        )))
                    }
                }
            }
            (Role::Child, None) => {
                return Err(TrustError::invalid_input("a child requires a parent_id"))
            }
            (_, Some(_)) => {
                return Err(TrustError::invalid_input("only children have a parent_id"))
            }
            (_, None) => {}
        }

        let _guard = self.locks.lock(id).await;
        let principal = Principal::new(
            id,
            role,
            parent_id.map(str::to_string),
            child_id.map(str::to_string),
        );
        let created = self.authority.create_principal(principal).await?;
        self.cache.put(created.clone());

        info!(principal_id = %id, role = %role, "principal created");
        self.record_access(AccessLogEntry::action(
            id,
            AccessAction::CreatePrincipal,
            format!("principal:{id}"),
        ));
        Ok(created)
    }

    /// Creation on behalf of `actor_id`.
    ///
    /// - anyone authenticated may register themselves as a parent
    /// - a parent holding `WriteChildData` may create their own children
    /// - anything else needs `ManageUsers`
    pub async fn create_principal_as(
        &self,
        actor_id: &str,
        id: &str,
        role: Role,
        parent_id: Option<&str>,
        child_id: Option<&str>,
    ) -> TrustResult<Principal> {
        let self_registration = role == Role::Parent && id == actor_id;
        let own_child = role == Role::Child
            && parent_id == Some(actor_id)
            && self
                .check_permission(actor_id, Permission::WriteChildData, None)
                .await;

        if !self_registration && !own_child {
            self.require(
                actor_id,
                Permission::ManageUsers,
                None,
                AccessAction::CreatePrincipal,
                &format!("principal:{id}"),
            )
            .await?;
        }

        self.create_principal(id, role, parent_id, child_id).await
    }

    /// Ensure an active admin with this id exists. Used once at start-up.
    pub async fn bootstrap_admin(&self, id: &str) -> TrustResult<Principal> {
        match self.authority.get_principal(id).await? {
            Some(existing) if existing.role == Role::Admin => Ok(existing),
            Some(_) => Err(TrustError::invalid_input(format!(
                "bootstrap principal {id} exists with a non-admin role"
            ))),
            None => self.create_principal(id, Role::Admin, None, None).await,
        }
    }

    /// Authoritative principal record.
    pub async fn principal(&self, principal_id: &str) -> TrustResult<Principal> {
        self.authority
            .get_principal(principal_id)
            .await?
            .ok_or_else(|| TrustError::NotFound(format!("principal {principal_id}")))
    }

    /// Read-through snapshot for display. Never use it to authorize.
    pub async fn cached_principal(&self, principal_id: &str) -> TrustResult<Option<Principal>> {
        if let Some(principal) = self.cache.get(principal_id) {
            return Ok(Some(principal));
        }
        let fetched = self.authority.get_principal(principal_id).await?;
        if let Some(principal) = &fetched {
            self.cache.put(principal.clone());
        }
        Ok(fetched)
    }

    pub async fn touch_login(&self, principal_id: &str) -> TrustResult<Principal> {
        let _guard = self.locks.lock(principal_id).await;
        let principal = self.authority.touch_login(principal_id, Utc::now()).await?;
        self.cache.put(principal.clone());
        self.record_access(AccessLogEntry::action(
            principal_id,
            AccessAction::Login,
            "session",
        ));
        Ok(principal)
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    /// Whether `principal_id` may exercise `permission` on `resource_id`.
    ///
    /// Always evaluated against the authority. Any failure is `false`.
    pub async fn check_permission(
        &self,
        principal_id: &str,
        permission: Permission,
        resource_id: Option<&str>,
    ) -> bool {
        match self.evaluate(principal_id, permission, resource_id).await {
            Ok(decision) => decision.is_some(),
            Err(e) => {
                warn!(
                    principal_id = %principal_id,
                    permission = %permission,
                    error = %e,
                    "permission check failed closed"
                );
                false
            }
        }
    }

    /// `Some(principal)` when allowed, `None` when denied.
    async fn evaluate(
        &self,
        principal_id: &str,
        permission: Permission,
        resource_id: Option<&str>,
    ) -> TrustResult<Option<Principal>> {
        let Some(principal) = self.authority.get_principal(principal_id).await? else {
            return Ok(None);
        };
        if !principal.holds(permission) {
            return Ok(None);
        }
        if principal.role == Role::Admin {
            return Ok(Some(principal));
        }

        let in_scope = match resource_id {
            None => true,
            Some(resource) if permission.is_self_scoped() => resource == principal.id,
            Some(resource) if permission.is_child_scoped() => self
                .authority
                .get_principal(resource)
                .await?
                .is_some_and(|child| child.is_child_of(&principal.id)),
            Some(_) => true,
        };
        Ok(in_scope.then_some(principal))
    }

    /// Authorize or fail with `Unauthorized`, auditing the denial as `action`
    /// on `resource`. Authority failures propagate unchanged.
    pub async fn require(
        &self,
        principal_id: &str,
        permission: Permission,
        resource_id: Option<&str>,
        action: AccessAction,
        resource: &str,
    ) -> TrustResult<Principal> {
        let decision = self.evaluate(principal_id, permission, resource_id).await;
        match decision {
            Ok(Some(principal)) => Ok(principal),
            Ok(None) => {
                warn!(
                    principal_id = %principal_id,
                    permission = %permission,
                    resource = %resource,
                    "permission denied"
                );
                self.record_access(
                    AccessLogEntry::action(principal_id, action, resource)
                        .failed(format!("missing permission {permission}")),
                );
                Err(TrustError::unauthorized(format!(
                    "{permission} required for {resource}"
                )))
            }
            Err(e) => {
                self.record_access(
                    AccessLogEntry::action(principal_id, action, resource)
                        .failed(e.error_code()),
                );
                Err(e)
            }
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Idempotent: granting a held permission succeeds without change.
    pub async fn grant_permission(
        &self,
        actor_id: &str,
        principal_id: &str,
        permission: Permission,
    ) -> TrustResult<Principal> {
        self.set_permission(actor_id, principal_id, permission, true)
            .await
    }

    /// Idempotent: revoking an absent permission succeeds without change.
    pub async fn revoke_permission(
        &self,
        actor_id: &str,
        principal_id: &str,
        permission: Permission,
    ) -> TrustResult<Principal> {
        self.set_permission(actor_id, principal_id, permission, false)
            .await
    }

    async fn set_permission(
        &self,
        actor_id: &str,
        principal_id: &str,
        permission: Permission,
        granted: bool,
    ) -> TrustResult<Principal> {
        let action = if granted {
            AccessAction::GrantPermission
        } else {
            AccessAction::RevokePermission
        };
        let resource = format!("principal:{principal_id}");
        self.require(actor_id, Permission::ManageUsers, None, action, &resource)
            .await?;

        let _guard = self.locks.lock(principal_id).await;
        let updated = match self
            .authority
            .set_permission(principal_id, permission, granted)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                let e = TrustError::from(e);
                self.record_access(
                    AccessLogEntry::action(actor_id, action, &resource).failed(e.error_code()),
                );
                return Err(e);
            }
        };
        self.cache.put(updated.clone());

        info!(
            actor_id = %actor_id,
            principal_id = %principal_id,
            permission = %permission,
            granted,
            "permission updated"
        );
        self.record_access(
            AccessLogEntry::action(actor_id, action, resource).with_details(permission.as_str()),
        );
        Ok(updated)
    }

    /// `Active -> Inactive`, one-way. Every later check for this principal
    /// is `false`.
    pub async fn deactivate(&self, actor_id: &str, principal_id: &str) -> TrustResult<Principal> {
        let resource = format!("principal:{principal_id}");
        self.require(
            actor_id,
            Permission::ManageUsers,
            None,
            AccessAction::Deactivate,
            &resource,
        )
        .await?;

        let _guard = self.locks.lock(principal_id).await;
        let updated = self.authority.deactivate_principal(principal_id).await?;
        self.cache.put(updated.clone());

        info!(actor_id = %actor_id, principal_id = %principal_id, "principal deactivated");
        self.record_access(AccessLogEntry::action(
            actor_id,
            AccessAction::Deactivate,
            resource,
        ));
        Ok(updated)
    }

    // =========================================================================
    // Access log
    // =========================================================================

    /// Append to the access log. A persistence failure is logged, not raised.
    pub fn record_access(&self, entry: AccessLogEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.log.append(entry) {
            warn!(action = %action, error = %e, "failed to persist access log entry");
        }
    }

    /// Append to the access log, failing the caller if it cannot be persisted.
    pub fn try_record_access(&self, entry: AccessLogEntry) -> TrustResult<()> {
        self.log.append(entry).map_err(TrustError::from)
    }

    /// Entries about `principal_id`: visible to the principal itself or to
    /// holders of `ViewLogs`.
    pub async fn entries_for(
        &self,
        actor_id: &str,
        principal_id: &str,
    ) -> TrustResult<Vec<AccessLogEntry>> {
        if actor_id != principal_id {
            self.require(
                actor_id,
                Permission::ViewLogs,
                None,
                AccessAction::ViewLogs,
                &format!("accessLog:{principal_id}"),
            )
            .await?;
        } else if !self
            .check_permission(actor_id, Permission::ReadOwnData, Some(actor_id))
            .await
        {
            return Err(TrustError::unauthorized("inactive principal"));
        }
        Ok(self.log.entries_for(principal_id))
    }

    /// Newest-first log view for holders of `ViewLogs`.
    pub async fn query_log(
        &self,
        actor_id: &str,
        principal_id: Option<&str>,
        limit: usize,
    ) -> TrustResult<Vec<AccessLogEntry>> {
        self.require(
            actor_id,
            Permission::ViewLogs,
            None,
            AccessAction::ViewLogs,
            "accessLog",
        )
        .await?;
        self.record_access(AccessLogEntry::action(
            actor_id,
            AccessAction::ViewLogs,
            "accessLog",
        ));
        Ok(self.log.query(principal_id, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::EmbeddedAuthority;
    use crate::vault::{SealedStore, SecureVault};
    use tempfile::TempDir;

    async fn setup() -> (TempDir, AccessControlEngine) {
        let temp = TempDir::new().unwrap();
        let vault = Arc::new(SecureVault::ephemeral(temp.path()).unwrap());
        let log = AccessLog::load(SealedStore::new(vault)).unwrap();
        let authority =
            Arc::new(EmbeddedAuthority::open(&temp.path().join("authority.redb")).unwrap());
        let engine = AccessControlEngine::new(authority, log);
        engine.bootstrap_admin("admin").await.unwrap();
        (temp, engine)
    }

    #[tokio::test]
    async fn child_requires_active_parent() {
        let (_temp, engine) = setup().await;
        let orphan = engine
            .create_principal("c1", Role::Child, Some("nobody"), None)
            .await;
        assert!(matches!(orphan, Err(TrustError::InvalidInput(_))));

        engine
            .create_principal("p1", Role::Parent, None, None)
            .await
            .unwrap();
        let child = engine
            .create_principal("c1", Role::Child, Some("p1"), None)
            .await
            .unwrap();
        assert_eq!(child.parent_id.as_deref(), Some("p1"));

        let dup = engine.create_principal("p1", Role::Parent, None, None).await;
        assert!(matches!(dup, Err(TrustError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn default_deny_for_unknown_principal() {
        let (_temp, engine) = setup().await;
        assert!(
            !engine
                .check_permission("ghost", Permission::ReadOwnData, None)
                .await
        );
    }

    #[tokio::test]
    async fn scoping_of_own_and_child_data() {
        let (_temp, engine) = setup().await;
        engine.create_principal("p1", Role::Parent, None, None).await.unwrap();
        engine.create_principal("p2", Role::Parent, None, None).await.unwrap();
        engine
            .create_principal("c1", Role::Child, Some("p1"), None)
            .await
            .unwrap();

        assert!(engine.check_permission("p1", Permission::ReadOwnData, Some("p1")).await);
        assert!(!engine.check_permission("p1", Permission::ReadOwnData, Some("p2")).await);
        assert!(engine.check_permission("p1", Permission::ReadChildData, Some("c1")).await);
        assert!(!engine.check_permission("p2", Permission::ReadChildData, Some("c1")).await);
        assert!(!engine.check_permission("c1", Permission::ReadChildData, Some("c1")).await);
        assert!(engine.check_permission("admin", Permission::ReadChildData, Some("c1")).await);
    }

    #[tokio::test]
    async fn grant_and_revoke_are_idempotent() {
        let (_temp, engine) = setup().await;
        engine
            .create_principal("m1", Role::Moderator, None, None)
            .await
            .unwrap();

        engine
            .grant_permission("admin", "m1", Permission::ManageConsent)
            .await
            .unwrap();
        engine
            .grant_permission("admin", "m1", Permission::ManageConsent)
            .await
            .unwrap();
        assert!(engine.check_permission("m1", Permission::ManageConsent, None).await);

        engine
            .revoke_permission("admin", "m1", Permission::ManageConsent)
            .await
            .unwrap();
        engine
            .revoke_permission("admin", "m1", Permission::ManageConsent)
            .await
            .unwrap();
        assert!(!engine.check_permission("m1", Permission::ManageConsent, None).await);
    }

    #[tokio::test]
    async fn mutations_need_manage_users() {
        let (_temp, engine) = setup().await;
        engine.create_principal("p1", Role::Parent, None, None).await.unwrap();
        engine.create_principal("p2", Role::Parent, None, None).await.unwrap();

        let result = engine
            .grant_permission("p1", "p2", Permission::ManageSystem)
            .await;
        assert!(matches!(result, Err(TrustError::Unauthorized(_))));
        assert!(!engine.check_permission("p2", Permission::ManageSystem, None).await);

        let denied = engine.access_log().entries_for("p1");
        assert!(denied
            .iter()
            .any(|e| e.action == "GRANT_PERMISSION" && !e.success));
    }

    #[tokio::test]
    async fn deactivation_is_final_for_checks() {
        let (_temp, engine) = setup().await;
        engine.create_principal("p1", Role::Parent, None, None).await.unwrap();
        assert!(engine.check_permission("p1", Permission::ApproveTransaction, None).await);

        engine.deactivate("admin", "p1").await.unwrap();
        assert!(!engine.check_permission("p1", Permission::ApproveTransaction, None).await);

        engine
            .grant_permission("admin", "p1", Permission::ApproveTransaction)
            .await
            .unwrap();
        assert!(!engine.check_permission("p1", Permission::ApproveTransaction, None).await);
        assert!(!engine.check_permission("p1", Permission::ReadOwnData, Some("p1")).await);
    }

    #[tokio::test]
    async fn creation_rules_for_actors() {
        let (_temp, engine) = setup().await;
        engine
            .create_principal_as("p1", "p1", Role::Parent, None, None)
            .await
            .unwrap();
        engine
            .create_principal_as("p1", "c1", Role::Child, Some("p1"), None)
            .await
            .unwrap();

        let escalate = engine
            .create_principal_as("p1", "a2", Role::Admin, None, None)
            .await;
        assert!(matches!(escalate, Err(TrustError::Unauthorized(_))));

        let foreign = engine
            .create_principal_as("c1", "c2", Role::Child, Some("p1"), None)
            .await;
        assert!(matches!(foreign, Err(TrustError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn cached_snapshot_is_advisory() {
        let (_temp, engine) = setup().await;
        engine.create_principal("p1", Role::Parent, None, None).await.unwrap();
        engine.deactivate("admin", "p1").await.unwrap();

        // Snapshot was refreshed by the mutation, but checks never use it.
        let snapshot = engine.cached_principal("p1").await.unwrap().unwrap();
        assert!(!snapshot.is_active);
        assert!(!engine.check_permission("p1", Permission::ReadOwnData, None).await);
    }

    #[tokio::test]
    async fn log_visibility() {
        let (_temp, engine) = setup().await;
        engine.create_principal("p1", Role::Parent, None, None).await.unwrap();
        engine.create_principal("p2", Role::Parent, None, None).await.unwrap();
        engine.touch_login("p1").await.unwrap();

        let own = engine.entries_for("p1", "p1").await.unwrap();
        assert!(own.iter().any(|e| e.action == "LOGIN"));

        let foreign = engine.entries_for("p2", "p1").await;
        assert!(matches!(foreign, Err(TrustError::Unauthorized(_))));

        let admin_view = engine.query_log("admin", Some("p1"), 10).await.unwrap();
        assert!(!admin_view.is_empty());
    }

    #[test]
    fn principal_id_validation() {
        assert!(validate_principal_id("parent-1@family.example").is_ok());
        assert!(validate_principal_id("").is_err());
        assert!(validate_principal_id("a|b").is_err());
        assert!(validate_principal_id(&"x".repeat(129)).is_err());
    }
}
