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

use crate::renewal::RenewalHandle;
use crate::session::{Role, UserProfile};
use crate::storage::{
    MemorySessionStorage, SessionStorage, StorageError, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_PROFILE_KEY,
};
use crate::store::TokenStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn profile() -> UserProfile {
    UserProfile {
        id: 7,
        username: Some("admin".to_string()),
        name: None,
        email: None,
        role: Role::Admin,
        role_id: 2,
        person: None,
        work_schedule: None,
    }
}

fn store_with_storage() -> (TokenStore, Arc<MemorySessionStorage>) {
    let storage = Arc::new(MemorySessionStorage::new());
    (TokenStore::new(storage.clone()), storage)
}

/// Storage whose every operation fails.
struct BrokenStorage;

impl SessionStorage for BrokenStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::backend("disk unavailable"))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::backend("disk unavailable"))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::backend("disk unavailable"))
    }
}

#[test]
fn test_setters_persist_values() {
    let (store, storage) = store_with_storage();

    store.set_access_token("a1");
    store.set_refresh_token("r1");
    store.set_user(profile());

    assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a1"));
    assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r1"));
    let stored: UserProfile = serde_json::from_str(&storage.get(USER_PROFILE_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(stored, profile());
}

#[test]
fn test_authenticated_requires_token_and_user() {
    let (store, _) = store_with_storage();
    assert!(!store.has_session());

    store.set_access_token("a1");
    assert!(!store.has_session(), "Token alone is not a session");

    store.set_user(profile());
    assert!(store.has_session());
}

#[test]
fn test_lazy_hydration_from_storage() {
    let storage = Arc::new(MemorySessionStorage::new());
    storage.set(ACCESS_TOKEN_KEY, "persisted").unwrap();
    storage.set(USER_PROFILE_KEY, &serde_json::to_string(&profile()).unwrap()).unwrap();

    let store = TokenStore::new(storage);
    assert!(!store.has_session());

    assert_eq!(store.access_token().as_deref(), Some("persisted"));
    assert_eq!(store.current_user(), Some(profile()));
    assert!(store.has_session());
}

#[test]
fn test_hydrate_reports_complete_session() {
    let storage = Arc::new(MemorySessionStorage::new());
    storage.set(ACCESS_TOKEN_KEY, "persisted").unwrap();
    let store = TokenStore::new(storage.clone());
    assert!(!store.hydrate());

    storage.set(USER_PROFILE_KEY, &serde_json::to_string(&profile()).unwrap()).unwrap();
    assert!(store.hydrate());
    assert!(store.session().is_some());
}

#[test]
fn test_corrupt_user_clears_only_user_record() {
    let storage = Arc::new(MemorySessionStorage::new());
    storage.set(ACCESS_TOKEN_KEY, "a1").unwrap();
    storage.set(REFRESH_TOKEN_KEY, "r1").unwrap();
    storage.set(USER_PROFILE_KEY, "{not json").unwrap();

    let store = TokenStore::new(storage.clone());
    assert_eq!(store.current_user(), None);

    assert_eq!(storage.get(USER_PROFILE_KEY).unwrap(), None);
    assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a1"));
    assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r1"));
}

#[test]
fn test_clear_removes_everything() {
    let (store, storage) = store_with_storage();
    store.set_access_token("a1");
    store.set_refresh_token("r1");
    store.set_user(profile());

    store.clear();

    assert!(storage.is_empty());
    assert_eq!(store.access_token(), None);
    assert_eq!(store.refresh_token(), None);
    assert_eq!(store.current_user(), None);
    assert!(!store.has_session());
}

#[test]
fn test_clear_is_idempotent() {
    let (store, storage) = store_with_storage();
    store.set_access_token("a1");
    store.set_user(profile());

    store.clear();
    store.clear();

    assert!(storage.is_empty());
    assert!(!store.has_session());
    assert!(store.session().is_none());
}

#[test]
fn test_storage_failures_are_swallowed() {
    let store = TokenStore::new(Arc::new(BrokenStorage));

    store.set_access_token("a1");
    store.set_user(profile());

    // In-memory state still works even though nothing was persisted
    assert_eq!(store.access_token().as_deref(), Some("a1"));
    assert!(store.has_session());

    store.clear();
    assert_eq!(store.access_token(), None);
    assert_eq!(store.refresh_token(), None);
}

#[test]
fn test_session_snapshot_decodes_expiry() {
    let (store, _) = store_with_storage();
    // {"exp":1750000000}
    store.set_access_token("eyJhbGciOiJIUzI1NiJ9.eyJleHAiOjE3NTAwMDAwMDB9.sig");
    store.set_refresh_token("r1");
    store.set_user(profile());

    let session = store.session().expect("Session should be complete");
    assert_eq!(session.refresh_token.as_deref(), Some("r1"));
    assert_eq!(session.expires_at.map(|at| at.timestamp()), Some(1_750_000_000));
}

#[tokio::test]
async fn test_authenticated_stream_publishes_changes() {
    let (store, _) = store_with_storage();
    let mut rx = store.subscribe_authenticated();

    store.set_access_token("a1");
    store.set_user(profile());
    rx.changed().await.expect("Sender dropped");
    assert!(*rx.borrow_and_update());

    store.clear();
    rx.changed().await.expect("Sender dropped");
    assert!(!*rx.borrow_and_update());
}

#[tokio::test]
async fn test_access_token_stream_follows_setter() {
    let (store, _) = store_with_storage();
    let mut rx = store.subscribe_access_token();

    store.set_access_token("a2");
    rx.changed().await.expect("Sender dropped");
    assert_eq!(rx.borrow_and_update().as_deref(), Some("a2"));
}

#[tokio::test]
async fn test_clear_cancels_pending_renewal() {
    let (store, _) = store_with_storage();
    let (shutdown_tx, _) = watch::channel(false);
    let task = tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });
    let abort_handle = task.abort_handle();

    store.install_renewal(RenewalHandle::new(shutdown_tx, task));
    assert!(store.has_pending_renewal());

    store.clear();
    assert!(!store.has_pending_renewal());

    tokio::time::timeout(Duration::from_secs(1), async {
        while !abort_handle.is_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("Renewal task should be aborted");
}

#[tokio::test]
async fn test_install_renewal_replaces_previous() {
    let (store, _) = store_with_storage();

    let first = tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });
    let first_abort = first.abort_handle();
    store.install_renewal(RenewalHandle::new(watch::channel(false).0, first));

    let second = tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });
    store.install_renewal(RenewalHandle::new(watch::channel(false).0, second));

    tokio::time::timeout(Duration::from_secs(1), async {
        while !first_abort.is_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("Replaced renewal task should be aborted");
    assert!(store.has_pending_renewal());
}

#[test]
fn test_hydrate_loads_refresh_token_into_memory() {
    let (store, storage) = store_with_storage();
    storage.set(ACCESS_TOKEN_KEY, "a1").unwrap();
    storage.set(REFRESH_TOKEN_KEY, "r1").unwrap();

    assert!(!store.hydrate(), "No user stored, session incomplete");
    storage.remove(REFRESH_TOKEN_KEY).unwrap();

    assert_eq!(store.refresh_token().as_deref(), Some("r1"));
}

#[test]
fn test_clear_bumps_generation() {
    let (store, _) = store_with_storage();
    let initial = store.generation();

    store.clear();
    store.clear();

    assert_eq!(store.generation(), initial + 2);
}

#[test]
fn test_clear_generation_ignores_replaced_session() {
    let (store, _) = store_with_storage();
    store.set_access_token("old");
    let stale = store.generation();

    store.clear();
    store.set_access_token("new");
    store.set_user(profile());

    assert!(!store.clear_generation(stale));
    assert_eq!(store.access_token().as_deref(), Some("new"));

    assert!(store.clear_generation(store.generation()));
    assert!(store.access_token().is_none());
}
