// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Immutable audit trail for the shiftlog server.
//!
//! [`AuditRecorder`] sanitizes and stores every record, mirrors it to the
//! application log and hands it to the [`LogForwarder`], which streams it to
//! an external collector as NDJSON over TCP or TLS on a best-effort basis.

pub mod admin;
pub mod error;
pub mod forwarder;
pub mod record;
pub mod recorder;
pub mod sanitize;
pub mod store;

pub use admin::ForwardingAdmin;
pub use error::{AuditError, AuditResult, ForwarderError, StoreError, StoreResult, TransportError};
pub use forwarder::{
	log_config_loaded, ConnectionPhase, ForwarderStatus, LogForwarder, ShutdownReport,
	DEFAULT_SHUTDOWN_DEADLINE, FORWARD_QUEUE_CAPACITY, MAILBOX_CAPACITY,
};
pub use record::{
	Actor, AuditLevel, AuditOutcome, AuditRecord, AuditRecordBuilder, RequestContext,
	DEFAULT_AUDIT_RETENTION_DAYS,
};
pub use recorder::{AuditForwarder, AuditRecorder, AUDIT_LOG_TARGET, MAX_METADATA_BYTES};
pub use sanitize::{sanitize, REDACTED};
pub use store::{AuditQuery, AuditStore, EventCount, LevelCount, MemoryAuditStore, StatsWindow};

#[cfg(feature = "store-sqlite")]
pub use store::SqliteAuditStore;

pub use shiftlog_config::{
	Destination, ForwardLevel, ForwardingConfig, ForwardingConfigStore, RetryPolicy, TestResult,
	TlsOptions, TransportMode,
};
