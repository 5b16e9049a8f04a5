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

use crate::expiry::{decode_expiry, ExpiryError, ExpiryEvaluator};
use crate::util::MockClock;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use std::sync::Arc;

const NOW: i64 = 1_750_000_000;

fn evaluator() -> ExpiryEvaluator {
    let now = DateTime::from_timestamp(NOW, 0).unwrap();
    ExpiryEvaluator::builder()
        .clock(Arc::new(MockClock::new(now)))
        .build()
}

fn token_expiring_at(exp: i64) -> String {
    encode(
        &Header::default(),
        &json!({ "sub": "7", "exp": exp }),
        &EncodingKey::from_secret(b"test-secret"),
    )
    .expect("Failed to encode token")
}

#[test]
fn test_decode_expiry_reads_exp_claim() {
    let expires_at = decode_expiry(&token_expiring_at(NOW + 60)).unwrap();
    assert_eq!(expires_at.timestamp(), NOW + 60);
}

#[test]
fn test_near_expiry_within_buffer() {
    let evaluator = evaluator();
    let token = token_expiring_at(NOW + 120);
    assert!(evaluator.is_near_expiry(&token, TimeDelta::seconds(300)));
}

#[test]
fn test_fresh_token_not_near_expiry() {
    let evaluator = evaluator();
    let token = token_expiring_at(NOW + 3600);
    assert!(!evaluator.is_near_expiry(&token, TimeDelta::seconds(300)));
    assert!(!evaluator.is_expired(&token));
}

#[test]
fn test_expired_token() {
    let evaluator = evaluator();
    let token = token_expiring_at(NOW - 10);
    assert!(evaluator.is_expired(&token));
    assert_eq!(evaluator.time_until_expiry(&token), Some(TimeDelta::seconds(-10)));
}

#[test]
fn test_malformed_payload_is_near_expiry() {
    let evaluator = evaluator();
    let token = "header.%%%not-base64%%%.signature";

    assert!(evaluator.is_near_expiry(token, TimeDelta::seconds(300)));
    assert!(evaluator.is_expired(token));
    assert_eq!(evaluator.time_until_expiry(token), None);
}

#[test]
fn test_payload_that_is_not_json() {
    let payload = URL_SAFE_NO_PAD.encode("plain text");
    let token = format!("h.{}.s", payload);
    assert!(matches!(decode_expiry(&token), Err(ExpiryError::Payload(_))));
    assert!(evaluator().is_near_expiry(&token, TimeDelta::seconds(1)));
}

#[test]
fn test_wrong_segment_count_is_malformed() {
    assert_eq!(decode_expiry("opaque-token"), Err(ExpiryError::Malformed));
    assert_eq!(decode_expiry("a.b.c.d"), Err(ExpiryError::Malformed));
    assert_eq!(decode_expiry("a..c"), Err(ExpiryError::Malformed));
}

#[test]
fn test_missing_exp_claim() {
    let payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"7"}"#);
    let token = format!("h.{}.s", payload);
    assert_eq!(decode_expiry(&token), Err(ExpiryError::MissingExpiry));
}

#[test]
fn test_padded_standard_alphabet_payload() {
    let payload = STANDARD.encode(format!(r#"{{"exp":{}}}"#, NOW + 5));
    let token = format!("h.{}.s", payload);
    assert_eq!(decode_expiry(&token).unwrap().timestamp(), NOW + 5);
}

#[test]
fn test_evaluator_follows_clock() {
    let clock = Arc::new(MockClock::new(DateTime::from_timestamp(NOW, 0).unwrap()));
    let evaluator = ExpiryEvaluator::builder().clock(clock.clone()).build();
    let token = token_expiring_at(NOW + 600);

    assert!(!evaluator.is_near_expiry(&token, TimeDelta::seconds(300)));
    clock.advance(TimeDelta::seconds(400));
    assert!(evaluator.is_near_expiry(&token, TimeDelta::seconds(300)));
    assert!(!evaluator.is_expired(&token));
    clock.set(Utc::now() + TimeDelta::days(365 * 100));
    assert!(evaluator.is_expired(&token));
}
