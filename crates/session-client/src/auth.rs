//  Copyright (c) 2026 Metaform Systems, Inc
//
//  This program and the accompanying materials are made available under the
//  terms of the Apache License, Version 2.0 which is available at
//  https://www.apache.org/licenses/LICENSE-2.0
//
//  SPDX-License-Identifier: Apache-2.0
//
//  Contributors:
//       Metaform Systems, Inc. - initial API and implementation
//

use crate::config::SessionClientConfig;
use crate::error::{AuthApiError, SessionError};
use async_trait::async_trait;
use bon::Builder;
use portal_session_core::UserRecord;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const LOGIN_PATH: &str = "auth/login";
const TOKEN_PATH: &str = "oauth/token";
const REVOKE_PATH: &str = "oauth/revoke";

/// Credentials entered on the login form.
#[derive(Clone, Serialize)]
pub struct LoginCredentials {
    /// Account name; the login endpoint expects it in the `email` field
    #[serde(rename = "email")]
    pub username: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Successful login response.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginGrant {
    #[serde(alias = "access_token")]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: UserRecord,
}

/// Successful refresh response.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<UserRecord>,
    #[serde(default)]
    pub person: Option<Value>,
    #[serde(default)]
    pub work_schedule: Option<Value>,
}

/// Authentication endpoints of the portal back end.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchanges credentials for an access token and user record.
    async fn login(&self, credentials: &LoginCredentials) -> Result<LoginGrant, AuthApiError>;

    /// Obtains a new access token using a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, AuthApiError>;

    /// Revokes an access token on the server.
    async fn revoke(&self, access_token: &str) -> Result<(), AuthApiError>;
}

/// [`AuthApi`] over HTTP.
#[derive(Clone, Builder)]
pub struct HttpAuthApi {
    #[builder(default = Client::new())]
    http_client: Client,
    #[builder(into)]
    api_url: String,
    #[builder(into)]
    client_id: String,
}

impl HttpAuthApi {
    pub fn from_config(config: &SessionClientConfig) -> Result<Self, SessionError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SessionError::configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::builder()
            .http_client(http_client)
            .api_url(config.api_url.clone())
            .client_id(config.client_id.clone())
            .build())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &LoginCredentials) -> Result<LoginGrant, AuthApiError> {
        let response = self
            .http_client
            .post(self.url(LOGIN_PATH))
            .json(credentials)
            .send()
            .await
            .map_err(|e| AuthApiError::network_error(format!("Failed to send login request: {}", e)))?;

        if !response.status().is_success() {
            return Err(handle_error_response(response, "Login failed").await);
        }

        response
            .json()
            .await
            .map_err(|e| AuthApiError::invalid_response(format!("Failed to parse login response: {}", e)))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, AuthApiError> {
        let response = self
            .http_client
            .post(self.url(TOKEN_PATH))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthApiError::network_error(format!("Failed to send refresh request: {}", e)))?;

        if !response.status().is_success() {
            return Err(handle_error_response(response, "Token refresh failed").await);
        }

        let grant: RefreshGrant = response
            .json()
            .await
            .map_err(|e| AuthApiError::invalid_response(format!("Failed to parse token response: {}", e)))?;

        if grant.access_token.is_empty() {
            return Err(AuthApiError::invalid_response("Access token not found in response"));
        }
        Ok(grant)
    }

    async fn revoke(&self, access_token: &str) -> Result<(), AuthApiError> {
        let response = self
            .http_client
            .post(self.url(REVOKE_PATH))
            .bearer_auth(access_token)
            .form(&[("token", access_token), ("client_id", self.client_id.as_str())])
            .send()
            .await
            .map_err(|e| AuthApiError::network_error(format!("Failed to send revoke request: {}", e)))?;

        if !response.status().is_success() {
            return Err(handle_error_response(response, "Token revocation failed").await);
        }
        Ok(())
    }
}

/// Helper to extract error details from an HTTP response.
async fn handle_error_response(response: reqwest::Response, context: &str) -> AuthApiError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
    AuthApiError::Rejected {
        status: status.as_u16(),
        message: format!("{} with status {}: {}", context, status, body),
    }
}
