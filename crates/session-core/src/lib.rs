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

//! Session state for the licensing portal back office.
//!
//! Holds the pieces of the token lifecycle that do not talk to the network: the persisted
//! session and its reactive state, JWT expiry evaluation, the loading-state registry and the
//! handle used to cancel background renewal.

pub mod expiry;
pub mod loading;
pub mod renewal;
pub mod session;
pub mod storage;
pub mod store;
pub mod util;

pub use expiry::{ExpiryError, ExpiryEvaluator};
pub use loading::{LoadingGuard, LoadingRegistry, LoadingState};
pub use renewal::{renewal_delay, RenewalHandle};
pub use session::{Role, Session, UserProfile, UserRecord};
pub use storage::{FileSessionStorage, MemorySessionStorage, SessionStorage, StorageError};
pub use store::TokenStore;
