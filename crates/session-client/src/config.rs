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

use crate::error::SessionError;
use bon::Builder;
use std::time::Duration;

pub const DEFAULT_NEAR_EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_RENEWAL_LEAD: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_AUTH_RETRIES: u32 = 1;
pub const DEFAULT_REQUEST_LOADING_KEY: &str = "auth-request";
pub const DEFAULT_LOGIN_LOADING_KEY: &str = "login";

pub const ENV_API_URL: &str = "PORTAL_API_URL";
pub const ENV_CLIENT_ID: &str = "PORTAL_CLIENT_ID";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "PORTAL_REQUEST_TIMEOUT_SECS";
pub const ENV_NEAR_EXPIRY_BUFFER_SECS: &str = "PORTAL_NEAR_EXPIRY_BUFFER_SECS";
pub const ENV_RENEWAL_LEAD_SECS: &str = "PORTAL_RENEWAL_LEAD_SECS";

/// Configuration of the session client.
#[derive(Builder, Clone)]
pub struct SessionClientConfig {
    /// Base URL of the portal API (e.g., "https://api.example.gob.mx/v1")
    #[builder(into)]
    pub api_url: String,
    /// OAuth client identifier sent with refresh requests
    #[builder(into)]
    pub client_id: String,
    /// Tokens with less validity left than this are renewed before a request (defaults to 5 minutes)
    #[builder(default = DEFAULT_NEAR_EXPIRY_BUFFER)]
    pub near_expiry_buffer: Duration,
    /// How long before expiry the background renewal fires (defaults to 10 minutes)
    #[builder(default = DEFAULT_RENEWAL_LEAD)]
    pub renewal_lead: Duration,
    /// HTTP request timeout (defaults to 30 seconds)
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub request_timeout: Duration,
    /// Base delay between transport-level retries, doubled per attempt (defaults to 200ms)
    #[builder(default = DEFAULT_RETRY_BASE_DELAY)]
    pub retry_base_delay: Duration,
    /// Refresh-and-retry cycles allowed per request after a 401 (defaults to 1)
    #[builder(default = DEFAULT_MAX_AUTH_RETRIES)]
    pub max_auth_retries: u32,
    /// Loading key registered while an authenticated request is in flight
    #[builder(into, default = DEFAULT_REQUEST_LOADING_KEY.to_string())]
    pub request_loading_key: String,
    /// Loading key registered while a login is in flight
    #[builder(into, default = DEFAULT_LOGIN_LOADING_KEY.to_string())]
    pub login_loading_key: String,
}

impl SessionClientConfig {
    /// Reads the configuration from `PORTAL_*` environment variables.
    ///
    /// `PORTAL_API_URL` and `PORTAL_CLIENT_ID` are required. `PORTAL_REQUEST_TIMEOUT_SECS`,
    /// `PORTAL_NEAR_EXPIRY_BUFFER_SECS` and `PORTAL_RENEWAL_LEAD_SECS` override the defaults.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SessionError> {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| SessionError::configuration(format!("{} is not set", name)))
        };
        let seconds = |name: &str, default: Duration| -> Result<Duration, SessionError> {
            match lookup(name) {
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| SessionError::configuration(format!("Invalid {}: {}", name, e))),
                None => Ok(default),
            }
        };

        Ok(Self::builder()
            .api_url(required(ENV_API_URL)?)
            .client_id(required(ENV_CLIENT_ID)?)
            .request_timeout(seconds(ENV_REQUEST_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT)?)
            .near_expiry_buffer(seconds(ENV_NEAR_EXPIRY_BUFFER_SECS, DEFAULT_NEAR_EXPIRY_BUFFER)?)
            .renewal_lead(seconds(ENV_RENEWAL_LEAD_SECS, DEFAULT_RENEWAL_LEAD)?)
            .build())
    }

    /// Resolves `path` against the API base URL; absolute URLs are returned unchanged.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for SessionClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClientConfig")
            .field("api_url", &self.api_url)
            .field("client_id", &"***")
            .field("near_expiry_buffer", &self.near_expiry_buffer)
            .field("renewal_lead", &self.renewal_lead)
            .field("request_timeout", &self.request_timeout)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("max_auth_retries", &self.max_auth_retries)
            .field("request_loading_key", &self.request_loading_key)
            .field("login_loading_key", &self.login_loading_key)
            .finish()
    }
}
