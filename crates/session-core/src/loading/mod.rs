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

use log::warn;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// A pending operation shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadingState {
    pub key: String,
    pub message: Option<String>,
}

struct LoadingEntry {
    message: Option<String>,
    active: usize,
}

/// Registry of in-progress operations keyed by operation id.
///
/// A single `is_loading` signal is published whenever the registry goes from empty to non-empty or
/// back. Entries are counted per key, so overlapping operations under the same key keep the marker
/// until the last one settles.
pub struct LoadingRegistry {
    entries: Mutex<BTreeMap<String, LoadingEntry>>,
    loading: watch::Sender<bool>,
}

impl LoadingRegistry {
    pub fn new() -> Arc<Self> {
        let (loading, _) = watch::channel(false);
        Arc::new(Self {
            entries: Mutex::new(BTreeMap::new()),
            loading,
        })
    }

    /// Marks `key` as loading until the returned guard is dropped.
    pub fn start(self: &Arc<Self>, key: &str, message: Option<&str>) -> LoadingGuard {
        let registered = match self.entries.lock() {
            Ok(mut entries) => {
                let entry = entries.entry(key.to_string()).or_insert(LoadingEntry {
                    message: None,
                    active: 0,
                });
                entry.active += 1;
                if message.is_some() {
                    entry.message = message.map(str::to_string);
                }
                self.loading.send_if_modified(|loading| !std::mem::replace(loading, true));
                true
            }
            Err(e) => {
                warn!("Unable to register loading state {}: {}", key, e);
                false
            }
        };

        LoadingGuard {
            registry: Arc::clone(self),
            key: key.to_string(),
            registered,
        }
    }

    fn finish(&self, key: &str) {
        let Ok(mut entries) = self.entries.lock() else {
            warn!("Unable to release loading state {}", key);
            return;
        };
        if let Some(entry) = entries.get_mut(key) {
            entry.active = entry.active.saturating_sub(1);
            if entry.active == 0 {
                entries.remove(key);
            }
        }
        let empty = entries.is_empty();
        self.loading.send_if_modified(|loading| {
            let changed = *loading == empty;
            *loading = !empty;
            changed
        });
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Whether an operation is registered under `key`.
    pub fn is_active(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    /// Snapshot of the current markers, ordered by key.
    pub fn states(&self) -> Vec<LoadingState> {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .map(|(key, entry)| LoadingState {
                        key: key.clone(),
                        message: entry.message.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }
}

/// Releases its loading marker when dropped, whatever way the operation ended.
#[must_use = "the loading marker is released as soon as the guard is dropped"]
pub struct LoadingGuard {
    registry: Arc<LoadingRegistry>,
    key: String,
    registered: bool,
}

impl LoadingGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if self.registered {
            self.registry.finish(&self.key);
        }
    }
}
