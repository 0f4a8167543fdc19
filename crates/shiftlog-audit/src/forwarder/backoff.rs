// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reconnect backoff: `base_delay_ms * 2^attempts`, bounded by `max_attempts`.

use std::time::Duration;

use shiftlog_config::RetryPolicy;

/// Delay before reconnect attempt number `attempts` (zero-based), or `None`
/// when the policy allows no further attempts.
pub fn delay_for(policy: &RetryPolicy, attempts: u32) -> Option<Duration> {
	if !policy.enabled || attempts >= policy.max_attempts {
		return None;
	}

	let factor = 2u64.saturating_pow(attempts);
	let mut delay_ms = policy.base_delay_ms.saturating_mul(factor);

	if policy.jitter {
		let jitter_factor = 0.5 + fastrand::f64();
		delay_ms = (delay_ms as f64 * jitter_factor) as u64;
	}

	Some(Duration::from_millis(delay_ms))
}

/// Attempt counter for one connection target.
#[derive(Debug, Clone)]
pub struct Backoff {
	policy: RetryPolicy,
	attempts: u32,
}

impl Backoff {
	pub fn new(policy: RetryPolicy) -> Self {
		Self {
			policy,
			attempts: 0,
		}
	}

	/// Record a failed connect and return the delay before the next one.
	/// `None` means retries are exhausted or disabled.
	pub fn next_delay(&mut self) -> Option<Duration> {
		let delay = delay_for(&self.policy, self.attempts)?;
		self.attempts += 1;
		Some(delay)
	}

	pub fn reset(&mut self) {
		self.attempts = 0;
	}

	pub fn attempts(&self) -> u32 {
		self.attempts
	}

	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}
}
