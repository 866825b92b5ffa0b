// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Remote authority over HTTP.
//!
//! Every call is one `POST {base}/v1/authority` carrying an
//! [`AuthorityRequest`]. Transport failures, timeouts and non-2xx statuses
//! all surface as [`AuthorityError::Network`]; nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;

use super::wire::{AuthorityRequest, AuthorityResponse};
use super::{AuthorityBackend, AuthorityError, AuthorityResult};
use crate::access::{Permission, Principal};
use crate::finance::{Transaction, TransactionStatus, TransactionUpdate};
use crate::privacy::RetentionPolicy;

pub const AUTHORITY_PATH: &str = "/v1/authority";

pub struct HttpAuthority {
    endpoint: String,
    bearer_token: Option<String>,
    http: Client,
}

impl HttpAuthority {
    pub fn new(base_url: &str, timeout: Duration) -> AuthorityResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthorityError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: format!("{}{AUTHORITY_PATH}", base_url.trim_end_matches('/')),
            bearer_token: None,
            http,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    async fn call(&self, request: AuthorityRequest) -> AuthorityResult<AuthorityResponse> {
        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(error = %e, "authority request failed");
            AuthorityError::Network(format!("authority request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AuthorityError::Network(format!(
                "authority returned {status}"
            )));
        }

        response
            .json::<AuthorityResponse>()
            .await
            .map_err(|e| AuthorityError::Network(format!("invalid authority response: {e}")))
    }
}

#[async_trait]
impl AuthorityBackend for HttpAuthority {
    async fn create_principal(&self, principal: Principal) -> AuthorityResult<Principal> {
        self.call(AuthorityRequest::CreatePrincipal { principal })
            .await?
            .into_principal()
    }

    async fn get_principal(&self, principal_id: &str) -> AuthorityResult<Option<Principal>> {
        self.call(AuthorityRequest::GetPrincipal {
            principal_id: principal_id.to_string(),
        })
        .await?
        .into_optional_principal()
    }

    async fn set_permission(
        &self,
        principal_id: &str,
        permission: Permission,
        granted: bool,
    ) -> AuthorityResult<Principal> {
        self.call(AuthorityRequest::SetPermission {
            principal_id: principal_id.to_string(),
            permission,
            granted,
        })
        .await?
        .into_principal()
    }

    async fn deactivate_principal(&self, principal_id: &str) -> AuthorityResult<Principal> {
        self.call(AuthorityRequest::DeactivatePrincipal {
            principal_id: principal_id.to_string(),
        })
        .await?
        .into_principal()
    }

    async fn touch_login(
        &self,
        principal_id: &str,
        at: DateTime<Utc>,
    ) -> AuthorityResult<Principal> {
        self.call(AuthorityRequest::TouchLogin {
            principal_id: principal_id.to_string(),
            at,
        })
        .await?
        .into_principal()
    }

    async fn submit_transaction(&self, transaction: Transaction) -> AuthorityResult<Transaction> {
        self.call(AuthorityRequest::SubmitTransaction { transaction })
            .await?
            .into_transaction()
    }

    async fn get_transaction(&self, transaction_id: &str) -> AuthorityResult<Option<Transaction>> {
        self.call(AuthorityRequest::GetTransaction {
            transaction_id: transaction_id.to_string(),
        })
        .await?
        .into_optional_transaction()
    }

    async fn transition_transaction(
        &self,
        transaction_id: &str,
        expected: TransactionStatus,
        update: TransactionUpdate,
    ) -> AuthorityResult<Transaction> {
        self.call(AuthorityRequest::TransitionTransaction {
            transaction_id: transaction_id.to_string(),
            expected,
            update,
        })
        .await?
        .into_transaction()
    }

    async fn list_transactions(
        &self,
        parent_id: &str,
        since: DateTime<Utc>,
    ) -> AuthorityResult<Vec<Transaction>> {
        self.call(AuthorityRequest::ListTransactions {
            parent_id: parent_id.to_string(),
            since,
        })
        .await?
        .into_transactions()
    }

    async fn retention_policy(&self) -> AuthorityResult<RetentionPolicy> {
        self.call(AuthorityRequest::GetRetentionPolicy)
            .await?
            .into_retention_policy()
    }

    async fn put_retention_policy(
        &self,
        policy: RetentionPolicy,
    ) -> AuthorityResult<RetentionPolicy> {
        self.call(AuthorityRequest::PutRetentionPolicy { policy })
            .await?
            .into_retention_policy()
    }
}
