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

//! Authenticated access to the licensing portal API.
//!
//! [`SessionManager`] signs users in and out and exposes [`AuthenticatedClient`], which attaches a
//! valid bearer token to every call. Token renewal is single-flight: however many callers need a
//! new token at once, one refresh request reaches the server.

pub mod auth;
pub mod config;
pub mod error;
pub mod refresh;
pub mod renewal;
pub mod request;
pub mod session;

#[cfg(test)]
mod tests;

pub use auth::{AuthApi, HttpAuthApi, LoginCredentials, LoginGrant, RefreshGrant};
pub use config::SessionClientConfig;
pub use error::{AuthApiError, RequestError, SessionError};
pub use refresh::RefreshCoordinator;
pub use renewal::RenewalScheduler;
pub use request::{AuthenticatedClient, HttpMethod, QueryValue, RequestOptions};
pub use session::SessionManager;
