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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Back-office role derived from the numeric `rol` field of a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Capturista,
    Supervisor,
    Consulta,
}

impl Role {
    /// Maps a server role id onto a role.
    ///
    /// Ids 1 and 2 are both administrators. Unknown ids fall back to read-only access.
    pub fn from_id(id: i64) -> Self {
        match id {
            1 | 2 => Role::Admin,
            3 => Role::Capturista,
            4 => Role::Supervisor,
            _ => Role::Consulta,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Capturista => "capturista",
            Role::Supervisor => "supervisor",
            Role::Consulta => "consulta",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User record as returned by the login and refresh endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub usuario_id: i64,
    pub rol: i64,
    #[serde(default, alias = "username")]
    pub usuario: Option<String>,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default, alias = "correo")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Identity and role information attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub role_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_schedule: Option<Value>,
}

impl UserProfile {
    pub fn with_person(mut self, person: Option<Value>) -> Self {
        if person.is_some() {
            self.person = person;
        }
        self
    }

    pub fn with_work_schedule(mut self, work_schedule: Option<Value>) -> Self {
        if work_schedule.is_some() {
            self.work_schedule = work_schedule;
        }
        self
    }
}

impl From<UserRecord> for UserProfile {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.usuario_id,
            username: record.usuario,
            name: record.nombre,
            email: record.email,
            role: Role::from_id(record.rol),
            role_id: record.rol,
            person: None,
            work_schedule: None,
        }
    }
}

/// Read-only snapshot of the authenticated session held by the [`crate::TokenStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: UserProfile,
    /// Expiry decoded from the access token, `None` when the token cannot be decoded
    pub expires_at: Option<DateTime<Utc>>,
}
