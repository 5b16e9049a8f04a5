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
use crate::error::{RequestError, SessionError};
use crate::refresh::RefreshCoordinator;
use bon::Builder;
use chrono::TimeDelta;
use log::{debug, warn};
use portal_session_core::util::{calculate_backoff_interval, BackoffConfig};
use portal_session_core::{ExpiryEvaluator, LoadingRegistry, TokenStore};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// HTTP methods supported by authenticated calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Patch => Self::PATCH,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

/// Query parameter value. Lists are sent as one repeated parameter per element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Single(String),
    Many(Vec<String>),
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Single(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl<S: Into<String>> From<Vec<S>> for QueryValue {
    fn from(values: Vec<S>) -> Self {
        QueryValue::Many(values.into_iter().map(Into::into).collect())
    }
}

/// Per-call options of an authenticated request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub body: Option<Value>,
    pub params: BTreeMap<String, QueryValue>,
    pub headers: BTreeMap<String, String>,
    /// Extra attempts after a transport-level failure (HTTP error statuses are not retried)
    pub retries: u32,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Flattens the parameters into name/value pairs, repeating list parameters.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (name, value) in &self.params {
            match value {
                QueryValue::Single(value) => pairs.push((name.clone(), value.clone())),
                QueryValue::Many(values) => pairs.extend(values.iter().map(|value| (name.clone(), value.clone()))),
            }
        }
        pairs
    }
}

/// Executes calls against the portal API with a valid bearer token.
///
/// Before each call a token close to expiry is renewed through the [`RefreshCoordinator`]. A 401
/// triggers a refresh and a retry, at most `max_auth_retries` times per call; once that budget is
/// spent, or when the refresh fails, the session is cleared and the call ends with
/// [`SessionError::SessionExpired`]. A loading marker is held for the whole call.
#[derive(Builder)]
pub struct AuthenticatedClient {
    config: SessionClientConfig,
    store: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    loading: Arc<LoadingRegistry>,
    #[builder(default = Client::new())]
    http_client: Client,
    #[builder(default)]
    evaluator: ExpiryEvaluator,
    #[builder(default)]
    backoff: BackoffConfig,
}

impl AuthenticatedClient {
    pub async fn request_with_auth<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, SessionError> {
        let _loading = self.loading.start(&self.config.request_loading_key, None);
        let url = self.config.resolve_url(path);
        let generation = self.store.generation();
        let mut auth_retries_left = self.config.max_auth_retries;
        let mut token = self.valid_token().await?;

        loop {
            let response = self.send_with_retries(method, &url, &token, &options).await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if auth_retries_left == 0 {
                    warn!("{} still unauthorized after token refresh. Clearing session.", url);
                    self.store.clear_generation(generation);
                    return Err(SessionError::session_expired());
                }
                auth_retries_left -= 1;
                debug!("{} returned 401, refreshing token and retrying", url);
                token = match self.coordinator.refresh().await {
                    Ok(token) => token,
                    Err(e) => {
                        warn!("Token refresh after 401 failed: {}", e);
                        self.store.clear_generation(generation);
                        return Err(SessionError::session_expired());
                    }
                };
                continue;
            }

            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
                return Err(RequestError::from_response(status, &body, &url, self.evaluator.now()).into());
            }

            return decode_body(response).await;
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T, SessionError> {
        self.request_with_auth(HttpMethod::Get, path, options).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, SessionError> {
        self.request_with_auth(HttpMethod::Post, path, options.body(to_json(body)?))
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, SessionError> {
        self.request_with_auth(HttpMethod::Put, path, options.body(to_json(body)?))
            .await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, SessionError> {
        self.request_with_auth(HttpMethod::Patch, path, options.body(to_json(body)?))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T, SessionError> {
        self.request_with_auth(HttpMethod::Delete, path, options).await
    }

    /// Returns the current access token, renewing it first when it is close to expiry.
    async fn valid_token(&self) -> Result<String, SessionError> {
        let token = self.store.access_token().ok_or(SessionError::NoAccessToken)?;
        if self
            .evaluator
            .is_near_expiry(&token, to_time_delta(self.config.near_expiry_buffer))
        {
            debug!("Access token is close to expiry, refreshing before request");
            return self.coordinator.refresh().await;
        }
        Ok(token)
    }

    async fn send_with_retries(
        &self,
        method: HttpMethod,
        url: &str,
        token: &str,
        options: &RequestOptions,
    ) -> Result<Response, SessionError> {
        let mut failures = 0;
        loop {
            let request = self.build_request(method, url, token, options)?;
            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) if failures < options.retries => {
                    let delay = calculate_backoff_interval(self.config.retry_base_delay, failures, &self.backoff);
                    warn!(
                        "Request to {} failed ({}), retrying in {:?} ({}/{})",
                        url,
                        e,
                        delay,
                        failures + 1,
                        options.retries
                    );
                    failures += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(SessionError::network_error(format!("Request to {} failed: {}", url, e)));
                }
            }
        }
    }

    pub(crate) fn build_request(
        &self,
        method: HttpMethod,
        url: &str,
        token: &str,
        options: &RequestOptions,
    ) -> Result<RequestBuilder, SessionError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| SessionError::invalid_request(format!("Access token is not a valid header value: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SessionError::invalid_request(format!("Invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SessionError::invalid_request(format!("Invalid value for header {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let mut request = self
            .http_client
            .request(method.into(), url)
            .headers(headers)
            .timeout(self.config.request_timeout);

        let pairs = options.query_pairs();
        if !pairs.is_empty() {
            request = request.query(&pairs);
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }
        Ok(request)
    }
}

async fn decode_body<T: DeserializeOwned>(response: Response) -> Result<T, SessionError> {
    let url = response.url().to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| SessionError::network_error(format!("Failed to read response from {}: {}", url, e)))?;

    let parsed = if bytes.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_value(Value::Null)
    } else {
        serde_json::from_slice(&bytes)
    };
    parsed.map_err(|e| SessionError::invalid_response(format!("Failed to parse response from {}: {}", url, e)))
}

fn to_json<B: Serialize>(body: &B) -> Result<Value, SessionError> {
    serde_json::to_value(body).map_err(|e| SessionError::invalid_request(format!("Failed to serialize body: {}", e)))
}

pub(crate) fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
