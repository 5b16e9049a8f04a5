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

use log::debug;
use std::time::Duration;

/// Exponential backoff applied between transport-level retries of a request.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// Growth factor per failed attempt
    pub multiplier: u32,
    /// Highest exponent applied, so the delay stops growing after this many failures
    pub max_exponent: u32,
    /// Hard ceiling on any single delay
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            multiplier: 2,
            max_exponent: 4,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffConfig {
    pub fn new(multiplier: u32, max_exponent: u32, max_delay: Duration) -> Self {
        Self {
            multiplier,
            max_exponent,
            max_delay,
        }
    }
}

/// Returns the delay to wait before retry number `failure_count + 1`.
///
/// Computed as `base * multiplier ^ min(failure_count, max_exponent)`, capped at `max_delay`.
/// A zero base yields a zero delay, which retries immediately.
pub fn calculate_backoff_interval(base: Duration, failure_count: u32, config: &BackoffConfig) -> Duration {
    let exponent = failure_count.min(config.max_exponent);
    let factor = config.multiplier.max(1).saturating_pow(exponent);
    let interval = base.saturating_mul(factor).min(config.max_delay);

    if exponent > 0 {
        debug!("Backing off {:?} after {} failed attempt(s)", interval, failure_count);
    }

    interval
}
