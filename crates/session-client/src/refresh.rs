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

use crate::auth::{AuthApi, RefreshGrant};
use crate::error::SessionError;
use log::{debug, info, warn};
use portal_session_core::{TokenStore, UserProfile};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

/// Outcome shared between the caller that performed a refresh and the callers that waited on it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RefreshFailure {
    NoRefreshToken,
    Failed(String),
}

impl From<RefreshFailure> for SessionError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::NoRefreshToken => SessionError::NoRefreshToken,
            RefreshFailure::Failed(message) => SessionError::RefreshFailed(message),
        }
    }
}

type RefreshOutcome = Result<String, RefreshFailure>;

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<oneshot::Sender<RefreshOutcome>> },
}

/// Serializes token renewal so that at most one refresh call is in flight.
///
/// The first caller performs the refresh. Callers arriving while it runs register a one-shot
/// waiter and receive the same token or the same failure once it settles; nobody polls.
///
/// A failed refresh, or an attempt without a refresh token, clears the whole session. An outcome
/// arriving after the session was cleared or replaced is discarded.
pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    auth_api: Arc<dyn AuthApi>,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<TokenStore>, auth_api: Arc<dyn AuthApi>) -> Self {
        Self {
            store,
            auth_api,
            state: Mutex::new(RefreshState::Idle),
        }
    }

    /// Renews the access token, joining the in-flight refresh if there is one.
    pub async fn refresh(&self) -> Result<String, SessionError> {
        let waiter = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: Vec::new() };
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            debug!("Joining in-flight token refresh");
            return match rx.await {
                Ok(outcome) => outcome.map_err(SessionError::from),
                Err(_) => Err(SessionError::refresh_failed("In-flight refresh was cancelled")),
            };
        }

        let in_flight = InFlight {
            coordinator: self,
            settled: false,
        };
        let outcome = self.perform_refresh().await;
        in_flight.settle(outcome.clone());
        outcome.map_err(SessionError::from)
    }

    /// Whether a refresh call is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            RefreshState::Refreshing { .. }
        )
    }

    async fn perform_refresh(&self) -> RefreshOutcome {
        let Some(refresh_token) = self.store.refresh_token() else {
            warn!("Token refresh requested without a refresh token. Clearing session.");
            self.store.clear();
            return Err(RefreshFailure::NoRefreshToken);
        };

        let generation = self.store.generation();
        let result = self.auth_api.refresh(&refresh_token).await;

        if self.store.generation() != generation {
            warn!("Session was replaced while refreshing, discarding refresh outcome");
            return Err(RefreshFailure::Failed("Session was replaced during token refresh".to_string()));
        }

        match result {
            Ok(grant) => {
                let access_token = grant.access_token.clone();
                self.apply_grant(grant);
                info!("Access token refreshed successfully");
                Ok(access_token)
            }
            Err(e) => {
                warn!("Token refresh failed: {}. Clearing session.", e);
                self.store.clear();
                Err(RefreshFailure::Failed(e.to_string()))
            }
        }
    }

    fn apply_grant(&self, grant: RefreshGrant) {
        self.store.set_access_token(&grant.access_token);
        if let Some(refresh_token) = &grant.refresh_token {
            self.store.set_refresh_token(refresh_token);
        }

        let profile = match grant.user {
            Some(record) => Some(UserProfile::from(record)),
            None if grant.person.is_some() || grant.work_schedule.is_some() => self.store.current_user(),
            None => None,
        };
        if let Some(profile) = profile {
            self.store
                .set_user(profile.with_person(grant.person).with_work_schedule(grant.work_schedule));
        }
    }

    fn finish(&self, outcome: Option<RefreshOutcome>) {
        let previous = std::mem::replace(
            &mut *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            RefreshState::Idle,
        );
        let RefreshState::Refreshing { waiters } = previous else {
            return;
        };
        if !waiters.is_empty() {
            debug!("Releasing {} caller(s) waiting on token refresh", waiters.len());
        }
        for waiter in waiters {
            if let Some(outcome) = &outcome {
                let _ = waiter.send(outcome.clone());
            }
        }
    }
}

/// Returns the coordinator to idle even if the refreshing caller is dropped mid-flight.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, outcome: RefreshOutcome) {
        self.settled = true;
        self.coordinator.finish(Some(outcome));
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            // Dropping the senders fails the waiters
            self.coordinator.finish(None);
        }
    }
}
