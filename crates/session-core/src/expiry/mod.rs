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

use crate::util::{default_clock, Clock};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use bon::Builder;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Decides whether an access token should be treated as expired or close to it.
///
/// Only the payload segment is decoded; the signature is never checked because trust is left to
/// the server. Any token that cannot be decoded is treated as stale. The two checks differ in
/// what callers do with that answer: a near-expiry token is renewed, an expired one ends the
/// session.
#[derive(Clone, Builder)]
pub struct ExpiryEvaluator {
    #[builder(default = default_clock())]
    clock: Arc<dyn Clock>,
}

impl Default for ExpiryEvaluator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ExpiryEvaluator {
    /// Returns true when fewer than `buffer` remain before `exp`, or when the token is undecodable.
    pub fn is_near_expiry(&self, token: &str, buffer: TimeDelta) -> bool {
        match self.time_until_expiry(token) {
            Some(remaining) => remaining < buffer,
            None => true,
        }
    }

    /// Returns true when `exp` lies in the past, or when the token is undecodable.
    pub fn is_expired(&self, token: &str) -> bool {
        match self.expires_at(token) {
            Ok(expires_at) => self.clock.until(expires_at) < TimeDelta::zero(),
            Err(_) => true,
        }
    }

    /// Time left before the token expires; negative once expired, `None` if undecodable.
    pub fn time_until_expiry(&self, token: &str) -> Option<TimeDelta> {
        self.expires_at(token).ok().map(|expires_at| self.clock.until(expires_at))
    }

    /// Decodes the `exp` claim of a token.
    pub fn expires_at(&self, token: &str) -> Result<DateTime<Utc>, ExpiryError> {
        decode_expiry(token)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[derive(Deserialize)]
struct ExpiryClaims {
    exp: Option<f64>,
}

/// Extracts the `exp` claim from the payload segment of a dot-delimited token.
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, ExpiryError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
        _ => return Err(ExpiryError::Malformed),
    };

    let bytes = decode_segment(payload)?;
    let claims: ExpiryClaims =
        serde_json::from_slice(&bytes).map_err(|e| ExpiryError::Payload(e.to_string()))?;
    let exp = claims.exp.ok_or(ExpiryError::MissingExpiry)?;

    DateTime::from_timestamp(exp.trunc() as i64, 0).ok_or(ExpiryError::MissingExpiry)
}

// Tokens normally use base64url without padding; standard alphabet and padding are tolerated.
fn decode_segment(segment: &str) -> Result<Vec<u8>, ExpiryError> {
    let trimmed = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| {
            let mut padded = trimmed.to_string();
            while padded.len() % 4 != 0 {
                padded.push('=');
            }
            STANDARD.decode(padded)
        })
        .map_err(|e| ExpiryError::Encoding(e.to_string()))
}

/// Reasons a token's expiry could not be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpiryError {
    #[error("Token is not a three-segment JWT")]
    Malformed,

    #[error("Token payload is not valid base64: {0}")]
    Encoding(String),

    #[error("Token payload is not valid JSON: {0}")]
    Payload(String),

    #[error("Token payload has no usable exp claim")]
    MissingExpiry,
}
