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

use crate::auth::{AuthApi, HttpAuthApi, LoginCredentials};
use crate::config::SessionClientConfig;
use crate::error::SessionError;
use crate::refresh::RefreshCoordinator;
use crate::renewal::RenewalScheduler;
use crate::request::{AuthenticatedClient, HttpMethod, RequestOptions};
use bon::bon;
use log::{info, warn};
use portal_session_core::util::{default_clock, Clock};
use portal_session_core::{ExpiryEvaluator, LoadingRegistry, Session, SessionStorage, TokenStore, UserProfile};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Entry point of the session subsystem.
///
/// Owns the token store and wires it to the refresh coordinator, the authenticated client and the
/// background renewal. One instance is meant to be shared (behind an `Arc`) by every part of the
/// application that needs the session.
pub struct SessionManager {
    config: SessionClientConfig,
    store: Arc<TokenStore>,
    auth_api: Arc<dyn AuthApi>,
    coordinator: Arc<RefreshCoordinator>,
    client: AuthenticatedClient,
    renewal: Arc<RenewalScheduler>,
    loading: Arc<LoadingRegistry>,
    evaluator: ExpiryEvaluator,
}

#[bon]
impl SessionManager {
    /// Creates a manager over `storage`.
    ///
    /// Without an explicit `auth_api` the HTTP implementation is built from the configuration.
    #[builder]
    pub fn new(
        config: SessionClientConfig,
        storage: Arc<dyn SessionStorage>,
        auth_api: Option<Arc<dyn AuthApi>>,
        http_client: Option<Client>,
        clock: Option<Arc<dyn Clock>>,
    ) -> Result<Self, SessionError> {
        let http_client = match http_client {
            Some(client) => client,
            None => Client::builder()
                .timeout(config.request_timeout)
                .build()
                .map_err(|e| SessionError::configuration(format!("Failed to build HTTP client: {}", e)))?,
        };
        let auth_api: Arc<dyn AuthApi> = match auth_api {
            Some(api) => api,
            None => Arc::new(
                HttpAuthApi::builder()
                    .http_client(http_client.clone())
                    .api_url(config.api_url.clone())
                    .client_id(config.client_id.clone())
                    .build(),
            ),
        };
        let evaluator = ExpiryEvaluator::builder()
            .clock(clock.unwrap_or_else(default_clock))
            .build();

        let store = Arc::new(TokenStore::new(storage));
        let loading = LoadingRegistry::new();
        let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), auth_api.clone()));
        let client = AuthenticatedClient::builder()
            .config(config.clone())
            .store(store.clone())
            .coordinator(coordinator.clone())
            .loading(loading.clone())
            .http_client(http_client)
            .evaluator(evaluator.clone())
            .build();
        let renewal = Arc::new(
            RenewalScheduler::builder()
                .store(store.clone())
                .coordinator(coordinator.clone())
                .lead(config.renewal_lead)
                .evaluator(evaluator.clone())
                .build(),
        );

        Ok(Self {
            config,
            store,
            auth_api,
            coordinator,
            client,
            renewal,
            loading,
            evaluator,
        })
    }
}

impl SessionManager {
    /// Creates a manager configured from `PORTAL_*` environment variables.
    pub fn from_env(storage: Arc<dyn SessionStorage>) -> Result<Self, SessionError> {
        Self::builder()
            .config(SessionClientConfig::from_env()?)
            .storage(storage)
            .build()
    }

    /// Restores a persisted session and schedules its background renewal.
    ///
    /// Returns true when a complete session was found. Scheduling the renewal needs a tokio
    /// runtime; outside one this fails with [`SessionError::Configuration`] after the session has
    /// been restored.
    pub fn init(&self) -> Result<bool, SessionError> {
        let restored = self.store.hydrate();
        if restored {
            self.renewal.start()?;
            info!("Restored persisted session");
        }
        Ok(restored)
    }

    /// Signs in and stores the resulting session.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<Session, SessionError> {
        let _loading = self.loading.start(&self.config.login_loading_key, None);

        let grant = self
            .auth_api
            .login(credentials)
            .await
            .map_err(|e| SessionError::Login(e.to_string()))?;

        // Leftovers of a previous session (e.g., its refresh token) must not leak into this one
        self.store.clear();
        self.store.set_access_token(&grant.token);
        if let Some(refresh_token) = &grant.refresh_token {
            self.store.set_refresh_token(refresh_token);
        }
        let user = UserProfile::from(grant.user);
        info!("User {} signed in with role {}", user.id, user.role);
        self.store.set_user(user);
        self.renewal.start()?;

        self.store
            .session()
            .ok_or_else(|| SessionError::Login("Session could not be stored".to_string()))
    }

    /// Revokes the access token and clears the session.
    ///
    /// Revocation failures are logged and ignored; the local session is always cleared.
    pub async fn logout(&self) {
        if let Some(token) = self.store.access_token() {
            if let Err(e) = self.auth_api.revoke(&token).await {
                warn!("Token revocation failed, clearing local session anyway: {}", e);
            }
        }
        self.store.clear();
        info!("Signed out");
    }

    /// Synchronous authentication check.
    ///
    /// Requires an access token and a user. A token that is expired, or whose expiry cannot be
    /// decoded, ends the session immediately. This is stricter than the pre-request check, which
    /// would try a refresh first.
    pub fn is_authenticated(&self) -> bool {
        let Some(token) = self.store.access_token() else {
            return false;
        };
        if self.store.current_user().is_none() {
            return false;
        }
        if self.evaluator.is_expired(&token) {
            warn!("Access token expired or unreadable. Clearing session.");
            self.store.clear();
            return false;
        }
        true
    }

    /// Renews the access token through the shared coordinator.
    pub async fn refresh(&self) -> Result<String, SessionError> {
        self.coordinator.refresh().await
    }

    pub async fn request_with_auth<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, SessionError> {
        self.client.request_with_auth(method, path, options).await
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn loading(&self) -> &Arc<LoadingRegistry> {
        &self.loading
    }

    pub fn session(&self) -> Option<Session> {
        self.store.session()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.store.current_user()
    }

    pub fn config(&self) -> &SessionClientConfig {
        &self.config
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.store.cancel_renewal();
    }
}
