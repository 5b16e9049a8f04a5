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

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors surfaced by the session client.
///
/// Storage and token-decoding problems never appear here; they degrade to "no session" or
/// "needs refresh" inside the store and evaluator.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No access token available")]
    NoAccessToken,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("{0}")]
    Request(#[from] RequestError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SessionError {
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        SessionError::RefreshFailed(message.into())
    }

    pub fn session_expired() -> Self {
        SessionError::SessionExpired("please sign in again".to_string())
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        SessionError::Network(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        SessionError::InvalidRequest(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        SessionError::InvalidResponse(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        SessionError::Configuration(message.into())
    }

    /// Whether the caller should send the user back to the login entry point.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            SessionError::NoAccessToken
                | SessionError::NoRefreshToken
                | SessionError::RefreshFailed(_)
                | SessionError::SessionExpired(_)
        )
    }
}

/// Normalized description of a failed HTTP call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestError {
    pub message: String,
    pub status: u16,
    pub status_text: String,
    /// Raw error payload returned by the server (JSON, or the body text as a string)
    pub details: Value,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

impl RequestError {
    /// Builds the error from a response status and body, preferring a server-provided message.
    pub fn from_response(status: reqwest::StatusCode, body: &str, url: &str, timestamp: DateTime<Utc>) -> Self {
        let details = serde_json::from_str::<Value>(body).unwrap_or_else(|_| Value::String(body.to_string()));
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let message = ["message", "error_description", "error"]
            .iter()
            .find_map(|field| details.get(field).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));

        Self {
            message,
            status: status.as_u16(),
            status_text,
            details,
            url: url.to_string(),
            timestamp,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {}) at {}", self.message, self.status, self.status_text, self.url)
    }
}

impl std::error::Error for RequestError {}

/// Errors returned by the authentication endpoints.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AuthApiError {
    pub fn network_error(message: impl Into<String>) -> Self {
        AuthApiError::Network(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        AuthApiError::InvalidResponse(message.into())
    }
}
