// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod audit;
mod forwarding;
mod logging;

pub use audit::{
	AuditConfig, AuditConfigLayer, DEFAULT_PURGE_INTERVAL_SECS, DEFAULT_RETENTION_DAYS,
	MAX_RETENTION_DAYS,
};
pub use forwarding::{
	Destination, ForwardLevel, ForwardingConfig, ForwardingConfigLayer, RetryPolicy, TestResult,
	TlsOptions, TransportMode, MAX_BASE_DELAY_MS, MAX_RETRY_ATTEMPTS, MIN_BASE_DELAY_MS,
};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
