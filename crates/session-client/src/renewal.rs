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
use crate::refresh::RefreshCoordinator;
use crate::request::to_time_delta;
use bon::Builder;
use chrono::TimeDelta;
use log::{debug, info, warn};
use portal_session_core::{renewal_delay, ExpiryEvaluator, RenewalHandle, TokenStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Renews the access token in the background shortly before it expires.
///
/// The loop sleeps until `lead` before the token's `exp`, refreshes through the shared
/// [`RefreshCoordinator`] and starts over with the new token. Any change of the access token
/// (login, reactive refresh) reschedules the wait. A token that lives no longer than `lead` is
/// renewed at half its lifetime after a background renewal, so short-lived grants do not turn the
/// loop into back-to-back refreshes. The loop ends when the session is cleared or a
/// background refresh fails; the next authenticated request then refreshes reactively.
#[derive(Builder)]
pub struct RenewalScheduler {
    store: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    lead: Duration,
    #[builder(default)]
    evaluator: ExpiryEvaluator,
}

impl RenewalScheduler {
    /// Spawns the renewal loop and hands its handle to the store, replacing any previous loop.
    ///
    /// Returns `Ok(false)`, without spawning, when there is no access token, and an error when
    /// called outside a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<bool, SessionError> {
        if self.store.access_token().is_none() {
            debug!("No access token, background renewal not scheduled");
            return Ok(false);
        }
        let runtime = Handle::try_current()
            .map_err(|e| SessionError::configuration(format!("Background renewal needs a tokio runtime: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let token_rx = self.store.subscribe_access_token();
        let task_handle = runtime.spawn(Arc::clone(self).renewal_loop(shutdown_rx, token_rx));
        self.store.install_renewal(RenewalHandle::new(shutdown_tx, task_handle));
        Ok(true)
    }

    /// Delay before the next renewal of `token`, `None` when its expiry cannot be decoded.
    pub fn next_delay(&self, token: &str) -> Option<Duration> {
        self.evaluator
            .time_until_expiry(token)
            .map(|remaining| renewal_delay(remaining, to_time_delta(self.lead)))
    }

    /// Delay before renewing a token this loop has just obtained.
    ///
    /// Tokens living no longer than the lead are renewed at half their remaining lifetime. Zero
    /// means the fresh token is already expired.
    pub fn delay_after_renewal(&self, token: &str) -> Option<Duration> {
        let remaining = self.evaluator.time_until_expiry(token)?;
        match renewal_delay(remaining, to_time_delta(self.lead)) {
            delay if delay.is_zero() => Some(renewal_delay(remaining / 2, TimeDelta::zero())),
            delay => Some(delay),
        }
    }

    async fn renewal_loop(
        self: Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
        mut token_rx: watch::Receiver<Option<String>>,
    ) {
        let mut renewed = false;
        loop {
            let Some(token) = token_rx.borrow_and_update().clone() else {
                debug!("Access token removed, stopping background renewal");
                break;
            };

            let delay = if renewed {
                self.delay_after_renewal(&token)
            } else {
                self.next_delay(&token)
            };
            match delay {
                Some(delay) if renewed && delay.is_zero() => {
                    warn!("Renewed access token is already expired, leaving renewal to the next request");
                    break;
                }
                Some(delay) => debug!("Next background token renewal in {:?}", delay),
                None => warn!("Unable to decode access token expiry, waiting for a new token"),
            }

            tokio::select! {
                _ = sleep_or_wait(delay) => {
                    match self.coordinator.refresh().await {
                        Ok(_) => {
                            info!("Background token renewal succeeded");
                            renewed = true;
                        }
                        Err(e) => {
                            warn!("Background token renewal failed: {}. Renewal will happen on the next request.", e);
                            break;
                        }
                    }
                }
                changed = token_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!("Access token changed, rescheduling background renewal");
                    renewed = false;
                }
                shutdown = shutdown_rx.changed() => {
                    if shutdown.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

async fn sleep_or_wait(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}
