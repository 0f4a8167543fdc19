// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;
use uuid::Uuid;

pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Error, Debug)]
pub enum AuditError {
	#[error("invalid audit input: {0}")]
	InvalidInput(String),

	#[error("audit store write failed: {0}")]
	StoreWrite(#[source] StoreError),
}

#[derive(Error, Debug)]
pub enum StoreError {
	#[error("audit record {id} is immutable")]
	Immutable { id: Uuid },

	#[error("audit record {0} not found")]
	NotFound(Uuid),

	#[error("storage backend error: {0}")]
	Backend(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "store-sqlite")]
impl From<sqlx::Error> for StoreError {
	fn from(e: sqlx::Error) -> Self {
		StoreError::Backend(e.to_string())
	}
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures talking to the collector. These never leave the forwarder task;
/// they drive reconnects and show up in logs and status.
#[derive(Error, Debug)]
pub enum TransportError {
	#[error("connect to {address} failed: {source}")]
	Connect {
		address: String,
		#[source]
		source: std::io::Error,
	},

	#[error("write failed: {0}")]
	Write(#[source] std::io::Error),

	#[error("{0} timed out")]
	Timeout(&'static str),

	#[error("connection closed by peer")]
	Closed,

	#[error("TLS error: {0}")]
	Tls(String),

	#[error("certificate error: {0}")]
	Certificate(String),

	#[error("forwarding destination is not configured")]
	NoDestination,
}

#[derive(Error, Debug)]
pub enum ForwarderError {
	#[error("log forwarder has stopped")]
	Stopped,

	#[error("forwarding configuration error: {0}")]
	Config(#[from] shiftlog_config::ConfigError),
}
