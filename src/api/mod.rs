// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    access::{AccessAction, AccessLogEntry, Permission, Principal, Role},
    finance::{
        CreateTransaction, FinancialLimits, RiskLevel, TransactionStatus, TransactionView,
        UsageCounter,
    },
    privacy::{
        CleanupReport, DataAccessLog, ErasureReport, ExportReceipt, LogCategory,
        NotificationPreferences, PrivacySettings, RetentionPolicy, SharingPreferences,
        UserDataExport,
    },
    state::AppState,
    two_factor::{Enrollment, TwoFactorStatus},
};

pub mod health;
pub mod principals;
pub mod privacy;
pub mod transactions;
pub mod two_factor;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        // Principals and audit
        .route("/principals", post(principals::create_principal))
        .route("/principals/me/login", post(principals::login))
        .route("/principals/{principal_id}", get(principals::get_principal))
        .route(
            "/principals/{principal_id}/permissions",
            post(principals::change_permission),
        )
        .route(
            "/principals/{principal_id}/deactivate",
            post(principals::deactivate_principal),
        )
        .route(
            "/principals/{principal_id}/audit",
            get(principals::principal_audit_log),
        )
        .route("/permissions/check", post(principals::check_permission))
        .route("/audit", get(principals::query_audit_log))
        // Privacy
        .route(
            "/privacy/retention",
            get(privacy::get_retention_policy).put(privacy::put_retention_policy),
        )
        .route("/privacy/retention/cleanup", post(privacy::run_cleanup))
        .route("/privacy/exports/{handle}", get(privacy::read_export))
        .route(
            "/privacy/{principal_id}/settings",
            get(privacy::get_settings).put(privacy::put_settings),
        )
        .route("/privacy/{principal_id}/logs", get(privacy::data_logs))
        .route("/privacy/{principal_id}/export", post(privacy::export_data))
        .route("/privacy/{principal_id}/data", delete(privacy::erase_data))
        // Second factor
        .route("/2fa/enroll", post(two_factor::enroll))
        .route("/2fa/verify", post(two_factor::verify))
        .route("/2fa/verify-backup", post(two_factor::verify_backup))
        .route("/2fa/status", get(two_factor::status))
        .route("/2fa/disable", post(two_factor::disable))
        .route("/2fa/backup-codes", post(two_factor::regenerate_backup_codes))
        .route("/2fa/session", delete(two_factor::end_session))
        // Transactions and limits
        .route("/transactions", post(transactions::create_transaction))
        .route(
            "/transactions/{transaction_id}",
            get(transactions::get_transaction),
        )
        .route(
            "/transactions/{transaction_id}/approve",
            post(transactions::approve_transaction),
        )
        .route(
            "/transactions/{transaction_id}/reject",
            post(transactions::reject_transaction),
        )
        .route(
            "/transactions/{transaction_id}/cancel",
            post(transactions::cancel_transaction),
        )
        .route(
            "/transactions/{transaction_id}/payout-key",
            get(transactions::reveal_payout_key),
        )
        .route(
            "/families/{parent_id}/transactions",
            get(transactions::transaction_history),
        )
        .route(
            "/families/{parent_id}/limits",
            get(transactions::get_limits).put(transactions::put_limits),
        )
        .route("/families/{parent_id}/usage", get(transactions::get_usage))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

/// Registers the `bearer_auth` scheme referenced by every `/v1` path.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        principals::create_principal,
        principals::login,
        principals::get_principal,
        principals::change_permission,
        principals::deactivate_principal,
        principals::check_permission,
        principals::query_audit_log,
        principals::principal_audit_log,
        privacy::get_settings,
        privacy::put_settings,
        privacy::data_logs,
        privacy::export_data,
        privacy::read_export,
        privacy::erase_data,
        privacy::get_retention_policy,
        privacy::put_retention_policy,
        privacy::run_cleanup,
        two_factor::enroll,
        two_factor::verify,
        two_factor::verify_backup,
        two_factor::status,
        two_factor::disable,
        two_factor::regenerate_backup_codes,
        two_factor::end_session,
        transactions::create_transaction,
        transactions::get_transaction,
        transactions::approve_transaction,
        transactions::reject_transaction,
        transactions::cancel_transaction,
        transactions::reveal_payout_key,
        transactions::transaction_history,
        transactions::get_limits,
        transactions::put_limits,
        transactions::get_usage
    ),
    components(
        schemas(
            Principal,
            Role,
            Permission,
            AccessAction,
            AccessLogEntry,
            principals::CreatePrincipalRequest,
            principals::PermissionChangeRequest,
            principals::PermissionCheckRequest,
            principals::PermissionCheckResponse,
            principals::AuditLogResponse,
            PrivacySettings,
            NotificationPreferences,
            SharingPreferences,
            DataAccessLog,
            LogCategory,
            RetentionPolicy,
            ExportReceipt,
            UserDataExport,
            ErasureReport,
            CleanupReport,
            privacy::DataLogResponse,
            Enrollment,
            TwoFactorStatus,
            two_factor::EnrollRequest,
            two_factor::VerifyCodeRequest,
            two_factor::BackupCodesResponse,
            CreateTransaction,
            TransactionView,
            TransactionStatus,
            RiskLevel,
            FinancialLimits,
            UsageCounter,
            transactions::RejectTransactionRequest,
            transactions::TransactionListResponse,
            transactions::PayoutKeyResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Principals", description = "Principals, permissions and the access log"),
        (name = "Privacy", description = "Privacy settings, subject rights and retention"),
        (name = "TwoFactor", description = "Guardian second factor"),
        (name = "Transactions", description = "Payout requests and approval"),
        (name = "Limits", description = "Family spending limits")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::auth::extractor::tests::{token_for, TEST_SECRET};
    use crate::authority::EmbeddedAuthority;
    use crate::config::TrustConfig;
    use crate::state::AuthConfig;
    use crate::trust::TrustCore;
    use crate::vault::SecureVault;

    async fn test_state(temp: &TempDir) -> AppState {
        let vault = Arc::new(SecureVault::load(temp.path()).unwrap());
        let authority = Arc::new(EmbeddedAuthority::open(&vault.paths().authority_db()).unwrap());
        let config = TrustConfig {
            bootstrap_admin_id: Some("admin".into()),
            ..TrustConfig::default()
        }
        .with_data_dir(temp.path());
        let core = TrustCore::assemble(vault, authority, &config).await.unwrap();
        AppState::new(core).with_auth_config(AuthConfig::hs256(TEST_SECRET))
    }

    fn request(method: &str, uri: &str, caller: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(caller)));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let temp = TempDir::new().unwrap();
        let app = router(test_state(&temp).await);
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[test]
    fn openapi_declares_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(doc.paths.paths.contains_key("/v1/transactions"));
    }

    #[tokio::test]
    async fn liveness_needs_no_token() {
        let temp = TempDir::new().unwrap();
        let app = router(test_state(&temp).await);
        let (status, body) = send(&app, request("GET", "/health/live", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_reports_components() {
        let temp = TempDir::new().unwrap();
        let app = router(test_state(&temp).await);
        let (status, body) = send(&app, request("GET", "/health/ready", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["authority"], "ok");
        assert_eq!(body["checks"]["auth"], "configured");
    }

    #[tokio::test]
    async fn v1_requires_bearer_token() {
        let temp = TempDir::new().unwrap();
        let app = router(test_state(&temp).await);
        let (status, body) = send(&app, request("GET", "/v1/2fa/status", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn parent_registers_family_and_requests_payout() {
        let temp = TempDir::new().unwrap();
        let app = router(test_state(&temp).await);

        let (status, _) = send(
            &app,
            request(
                "POST",
                "/v1/principals",
                Some("mom"),
                Some(json!({ "principal_id": "mom", "role": "parent" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, child) = send(
            &app,
            request(
                "POST",
                "/v1/principals",
                Some("mom"),
                Some(json!({ "principal_id": "kid", "role": "child", "parent_id": "mom" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(child["parent_id"], "mom");

        let (status, tx) = send(
            &app,
            request(
                "POST",
                "/v1/transactions",
                Some("kid"),
                Some(json!({
                    "parent_id": "mom",
                    "child_id": "kid",
                    "amount": 900,
                    "payout_key": "kid@example.com",
                    "description": "chores"
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(tx["status"], "pending");
        assert_eq!(tx["risk_level"], "medium");
        assert!(tx.get("payout_key").is_none());

        // Approval without a verified second factor is refused.
        let uri = format!("/v1/transactions/{}/approve", tx["id"].as_str().unwrap());
        let (status, _) = send(&app, request("POST", &uri, Some("mom"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, usage) =
            send(&app, request("GET", "/v1/families/mom/usage", Some("mom"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(usage["daily_total"], 900);
    }

    #[tokio::test]
    async fn strangers_cannot_read_other_families() {
        let temp = TempDir::new().unwrap();
        let app = router(test_state(&temp).await);
        for id in ["mom", "dad"] {
            let (status, _) = send(
                &app,
                request(
                    "POST",
                    "/v1/principals",
                    Some(id),
                    Some(json!({ "principal_id": id, "role": "parent" })),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) =
            send(&app, request("GET", "/v1/families/mom/limits", Some("dad"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error_code"], "unauthorized");

        let (status, _) =
            send(&app, request("GET", "/v1/privacy/mom/settings", Some("dad"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_reads_audit_log() {
        let temp = TempDir::new().unwrap();
        let app = router(test_state(&temp).await);
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/v1/principals",
                Some("admin"),
                Some(json!({ "principal_id": "mod", "role": "moderator" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) =
            send(&app, request("GET", "/v1/audit?limit=10", Some("admin"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["entries"].as_array().is_some());
    }
}
