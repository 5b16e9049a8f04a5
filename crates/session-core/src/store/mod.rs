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

#[cfg(test)]
mod tests;

use crate::expiry::decode_expiry;
use crate::renewal::RenewalHandle;
use crate::session::{Session, UserProfile};
use crate::storage::{SessionStorage, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_PROFILE_KEY};
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Single source of truth for the persisted session and its in-memory reactive state.
///
/// Every read and write of session data goes through this type. Values are mirrored in `watch`
/// channels so collaborators can follow the access token, the user and the authenticated flag.
/// Reads fall back to the backing storage when the in-memory value is empty (lazy hydration).
///
/// Persistence failures are logged and treated as absent data; no storage error reaches callers.
pub struct TokenStore {
    storage: Arc<dyn SessionStorage>,
    access_token: watch::Sender<Option<String>>,
    refresh_token: watch::Sender<Option<String>>,
    user: watch::Sender<Option<UserProfile>>,
    authenticated: watch::Sender<bool>,
    renewal: Mutex<Option<RenewalHandle>>,
    generation: AtomicU64,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            storage,
            access_token: watch::channel(None).0,
            refresh_token: watch::channel(None).0,
            user: watch::channel(None).0,
            authenticated: watch::channel(false).0,
            renewal: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Loads tokens and user from storage into memory, typically once at application start.
    ///
    /// Returns true when a complete session (access token and user) was found.
    pub fn hydrate(&self) -> bool {
        let access_token = self.access_token();
        let refresh_token = self.refresh_token();
        let user = self.current_user();
        let complete = access_token.is_some() && user.is_some();
        debug!(
            "Hydrated session store (complete session: {}, refresh token: {})",
            complete,
            refresh_token.is_some()
        );
        complete
    }

    pub fn set_access_token(&self, token: &str) {
        self.write(ACCESS_TOKEN_KEY, token);
        self.access_token.send_replace(Some(token.to_string()));
        self.publish_authenticated();
    }

    pub fn set_refresh_token(&self, token: &str) {
        self.write(REFRESH_TOKEN_KEY, token);
        self.refresh_token.send_replace(Some(token.to_string()));
    }

    pub fn set_user(&self, user: UserProfile) {
        match serde_json::to_string(&user) {
            Ok(serialized) => self.write(USER_PROFILE_KEY, &serialized),
            Err(e) => warn!("Unable to serialize user profile {}: {}", user.id, e),
        }
        self.user.send_replace(Some(user));
        self.publish_authenticated();
    }

    /// Current access token, hydrated from storage when not yet in memory.
    pub fn access_token(&self) -> Option<String> {
        if let Some(token) = self.access_token.borrow().clone() {
            return Some(token);
        }
        let token = self.read(ACCESS_TOKEN_KEY)?;
        self.access_token.send_replace(Some(token.clone()));
        self.publish_authenticated();
        Some(token)
    }

    /// Current refresh token, hydrated from storage when not yet in memory.
    pub fn refresh_token(&self) -> Option<String> {
        if let Some(token) = self.refresh_token.borrow().clone() {
            return Some(token);
        }
        let token = self.read(REFRESH_TOKEN_KEY)?;
        self.refresh_token.send_replace(Some(token.clone()));
        Some(token)
    }

    /// Current user, hydrated from storage when not yet in memory.
    ///
    /// A stored profile that no longer deserializes is removed (tokens are left alone) and reported
    /// as absent.
    pub fn current_user(&self) -> Option<UserProfile> {
        if let Some(user) = self.user.borrow().clone() {
            return Some(user);
        }
        let serialized = self.read(USER_PROFILE_KEY)?;
        match serde_json::from_str::<UserProfile>(&serialized) {
            Ok(user) => {
                self.user.send_replace(Some(user.clone()));
                self.publish_authenticated();
                Some(user)
            }
            Err(e) => {
                warn!("Discarding unreadable stored user profile: {}", e);
                self.delete(USER_PROFILE_KEY);
                None
            }
        }
    }

    /// Snapshot of the complete session, if there is one.
    pub fn session(&self) -> Option<Session> {
        let access_token = self.access_token()?;
        let user = self.current_user()?;
        let expires_at = decode_expiry(&access_token).ok();
        Some(Session {
            access_token,
            refresh_token: self.refresh_token(),
            user,
            expires_at,
        })
    }

    /// Whether both an access token and a user are currently held in memory.
    pub fn has_session(&self) -> bool {
        *self.authenticated.borrow()
    }

    /// Removes all persisted session data, resets the in-memory state and cancels pending renewal.
    ///
    /// Calling it on an already empty store is a no-op.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_PROFILE_KEY] {
            self.delete(key);
        }
        self.access_token.send_if_modified(|token| token.take().is_some());
        self.refresh_token.send_if_modified(|token| token.take().is_some());
        self.user.send_if_modified(|user| user.take().is_some());
        self.publish_authenticated();
        self.cancel_renewal();
        debug!("Session cleared");
    }

    /// Counter bumped by every [`TokenStore::clear`]. Work started under one generation must not
    /// write into a later session.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Clears the session only if it is still the one observed as `generation`.
    ///
    /// Returns false, leaving the store untouched, when the session was cleared or replaced since.
    pub fn clear_generation(&self, generation: u64) -> bool {
        if self.generation() != generation {
            debug!("Session replaced since generation {}, not clearing", generation);
            return false;
        }
        self.clear();
        true
    }

    /// Installs the handle of the background renewal task, cancelling the previous one.
    pub fn install_renewal(&self, handle: RenewalHandle) {
        let previous = self
            .renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        drop(previous);
    }

    /// Cancels the pending background renewal, if any.
    pub fn cancel_renewal(&self) {
        let pending = self.renewal.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = pending {
            debug!("Cancelling scheduled token renewal");
            handle.shutdown();
        }
    }

    pub fn has_pending_renewal(&self) -> bool {
        self.renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn subscribe_access_token(&self) -> watch::Receiver<Option<String>> {
        self.access_token.subscribe()
    }

    pub fn subscribe_user(&self) -> watch::Receiver<Option<UserProfile>> {
        self.user.subscribe()
    }

    pub fn subscribe_authenticated(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    fn publish_authenticated(&self) {
        let authenticated = self.access_token.borrow().is_some() && self.user.borrow().is_some();
        self.authenticated
            .send_if_modified(|current| std::mem::replace(current, authenticated) != authenticated);
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Unable to read {} from session storage: {}", key, e);
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            warn!("Unable to persist {} to session storage: {}", key, e);
        }
    }

    fn delete(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            warn!("Unable to remove {} from session storage: {}", key, e);
        }
    }
}
