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

use crate::loading::{LoadingRegistry, LoadingState};

#[test]
fn test_guard_marks_and_releases() {
    let registry = LoadingRegistry::new();
    assert!(!registry.is_loading());

    let guard = registry.start("auth-request", Some("Cargando..."));
    assert!(registry.is_loading());
    assert_eq!(
        registry.states(),
        vec![LoadingState {
            key: "auth-request".to_string(),
            message: Some("Cargando...".to_string()),
        }]
    );

    drop(guard);
    assert!(!registry.is_loading());
    assert!(registry.states().is_empty());
}

#[test]
fn test_overlapping_operations_same_key() {
    let registry = LoadingRegistry::new();
    let first = registry.start("auth-request", None);
    let second = registry.start("auth-request", None);

    drop(first);
    assert!(registry.is_active("auth-request"), "Marker must survive while an operation is pending");
    assert!(registry.is_loading());

    drop(second);
    assert!(!registry.is_active("auth-request"));
    assert!(!registry.is_loading());
}

#[test]
fn test_loading_signal_tracks_any_key() {
    let registry = LoadingRegistry::new();
    let login = registry.start("login", None);
    let request = registry.start("auth-request", None);

    drop(login);
    assert!(registry.is_loading());
    drop(request);
    assert!(!registry.is_loading());
}

#[tokio::test]
async fn test_subscribers_observe_transitions() {
    let registry = LoadingRegistry::new();
    let mut rx = registry.subscribe();

    let guard = registry.start("login", None);
    rx.changed().await.expect("Sender dropped");
    assert!(*rx.borrow_and_update());

    drop(guard);
    rx.changed().await.expect("Sender dropped");
    assert!(!*rx.borrow_and_update());
}
