// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared helpers: a line-reading collector on loopback and a few fixtures.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use shiftlog_audit::{
	AuditLevel, AuditOutcome, AuditRecord, ForwarderStatus, LogForwarder,
};
use shiftlog_config::{
	Destination, ForwardingConfig, ForwardingConfigStore, MemoryForwardingConfigStore,
	RetryPolicy,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Instant};

pub const READ_TIMEOUT: Duration = Duration::from_secs(15);

pub type CollectorLines = Lines<BufReader<TcpStream>>;

/// A port with nothing listening on it.
pub async fn reserve_port() -> u16 {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	listener.local_addr().unwrap().port()
}

pub async fn collector_on(port: u16) -> TcpListener {
	TcpListener::bind(("127.0.0.1", port)).await.unwrap()
}

pub async fn accept(listener: &TcpListener) -> CollectorLines {
	let (socket, _) = timeout(READ_TIMEOUT, listener.accept())
		.await
		.expect("collector accept timed out")
		.unwrap();
	BufReader::new(socket).lines()
}

pub async fn next_json(lines: &mut CollectorLines) -> Value {
	let line = timeout(READ_TIMEOUT, lines.next_line())
		.await
		.expect("collector read timed out")
		.unwrap()
		.expect("collector connection closed");
	serde_json::from_str(&line).unwrap()
}

pub fn retry(enabled: bool, max_attempts: u32) -> RetryPolicy {
	RetryPolicy {
		enabled,
		max_attempts,
		base_delay_ms: 100,
		jitter: false,
	}
}

pub fn forwarding_to(port: u16, retry: RetryPolicy) -> ForwardingConfig {
	ForwardingConfig {
		enabled: true,
		destination: Some(Destination {
			host: "127.0.0.1".to_string(),
			port,
		}),
		retry,
		..Default::default()
	}
}

pub fn record(seq: usize, level: AuditLevel) -> Arc<AuditRecord> {
	Arc::new(
		AuditRecord::builder("shift.handover")
			.level(level)
			.result(AuditOutcome::success())
			.metadata(json!({ "seq": seq }))
			.build()
			.unwrap(),
	)
}

pub async fn start(
	config: ForwardingConfig,
) -> (LogForwarder, Arc<MemoryForwardingConfigStore>) {
	let store = Arc::new(MemoryForwardingConfigStore::new(config));
	let dyn_store: Arc<dyn ForwardingConfigStore> = store.clone();
	let forwarder = LogForwarder::start(dyn_store).await.unwrap();
	(forwarder, store)
}

/// Poll status until `done` holds, or panic after a few seconds.
pub async fn wait_for(
	forwarder: &LogForwarder,
	done: impl Fn(&ForwarderStatus) -> bool,
) -> ForwarderStatus {
	let deadline = Instant::now() + Duration::from_secs(10);
	loop {
		let status = forwarder.status().await.unwrap();
		if done(&status) {
			return status;
		}
		assert!(Instant::now() < deadline, "condition not reached: {status:?}");
		sleep(Duration::from_millis(20)).await;
	}
}
