// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One-off connection test, independent of the forwarder's live connection
//! and queue.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use shiftlog_config::{ForwardingConfig, TestResult};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{info, warn};

use super::transport;
use crate::error::TransportError;
use crate::record::{AuditOutcome, AuditRecord};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub const TEST_EVENT: &str = "forwarding.test";

fn test_payload() -> Result<String, TransportError> {
	AuditRecord::builder(TEST_EVENT)
		.result(AuditOutcome::success())
		.metadata(json!({ "message": "shiftlog collector connection test" }))
		.build()
		.map_err(|e| TransportError::Write(std::io::Error::other(e)))?
		.to_ndjson_line()
		.map_err(|e| TransportError::Write(std::io::Error::other(e)))
}

async fn probe(config: &ForwardingConfig) -> Result<String, TransportError> {
	let payload = test_payload()?;
	let mut conn = transport::connect(config).await?;
	transport::write_line(&mut conn.writer, &payload).await?;
	let _ = conn.writer.shutdown().await;
	Ok(conn.peer)
}

/// Connect with `config`, send one synthetic record and report the outcome.
/// Never takes longer than [`TEST_TIMEOUT`].
pub async fn test_connection(config: &ForwardingConfig) -> TestResult {
	let (success, message) = match timeout(TEST_TIMEOUT, probe(config)).await {
		Ok(Ok(peer)) => (true, format!("test payload delivered to {peer}")),
		Ok(Err(e)) => (false, e.to_string()),
		Err(_) => (
			false,
			format!("timed out after {}s", TEST_TIMEOUT.as_secs()),
		),
	};

	if success {
		info!(message = %message, "collector connection test succeeded");
	} else {
		warn!(message = %message, "collector connection test failed");
	}

	TestResult {
		success,
		message,
		timestamp: Utc::now(),
	}
}
