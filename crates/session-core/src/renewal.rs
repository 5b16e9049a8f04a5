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

use chrono::TimeDelta;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle for the background renewal task.
///
/// Dropping the handle signals the task to stop and aborts it, so replacing or clearing the handle
/// held by the [`crate::TokenStore`] is enough to cancel a pending renewal.
pub struct RenewalHandle {
    shutdown_tx: watch::Sender<bool>,
    task_handle: JoinHandle<()>,
}

impl RenewalHandle {
    pub fn new(shutdown_tx: watch::Sender<bool>, task_handle: JoinHandle<()>) -> Self {
        Self {
            shutdown_tx,
            task_handle,
        }
    }

    /// Signals the renewal task to stop and aborts it.
    pub fn shutdown(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.task_handle.is_finished()
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.task_handle.abort();
    }
}

/// Delay before a proactive renewal: the time left on the token minus `lead`, never negative.
pub fn renewal_delay(time_until_expiry: TimeDelta, lead: TimeDelta) -> Duration {
    (time_until_expiry - lead).to_std().unwrap_or(Duration::ZERO)
}
