// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Recorder to collector, end to end.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use serde_json::json;
use shiftlog_audit::{
	Actor, AuditError, AuditLevel, AuditOutcome, AuditQuery, AuditRecord, AuditRecorder,
	AuditStore, EventCount, LevelCount, MemoryAuditStore, StatsWindow, StoreError, StoreResult,
	REDACTED,
};
use uuid::Uuid;

struct BrokenStore;

#[async_trait]
impl AuditStore for BrokenStore {
	async fn insert(&self, _record: &AuditRecord) -> StoreResult<()> {
		Err(StoreError::Backend("disk full".to_string()))
	}

	async fn get(&self, _id: Uuid) -> StoreResult<Option<AuditRecord>> {
		Ok(None)
	}

	async fn query(&self, _query: &AuditQuery) -> StoreResult<(Vec<AuditRecord>, i64)> {
		Ok((Vec::new(), 0))
	}

	async fn count_by_level(&self, _window: StatsWindow) -> StoreResult<Vec<LevelCount>> {
		Ok(Vec::new())
	}

	async fn count_by_event(&self, _window: StatsWindow) -> StoreResult<Vec<EventCount>> {
		Ok(Vec::new())
	}

	async fn purge_expired(&self, _retention_days: i64) -> StoreResult<u64> {
		Ok(0)
	}
}

#[tokio::test]
async fn test_recorded_entries_reach_collector_sanitized() {
	let listener = collector_on(0).await;
	let port = listener.local_addr().unwrap().port();
	let (forwarder, _config) = start(forwarding_to(port, retry(true, 5))).await;
	let mut lines = accept(&listener).await;

	let store = Arc::new(MemoryAuditStore::new());
	let recorder = AuditRecorder::new(store.clone()).with_forwarder(Arc::new(forwarder));

	let stored = recorder
		.record(
			AuditRecord::builder("auth.login")
				.level(AuditLevel::Warn)
				.actor(Actor::new("u-17", "nightshift"))
				.result(AuditOutcome::failure("bad password"))
				.metadata(json!({
					"password": "hunter2",
					"attempt": { "apiKey": "abc", "count": 3 },
				})),
		)
		.await
		.unwrap();

	let value = next_json(&mut lines).await;
	assert_eq!(value["id"], stored.id.to_string());
	assert_eq!(value["event"], "auth.login");
	assert_eq!(value["level"], "warn");
	assert_eq!(value["metadata"]["password"], REDACTED);
	assert_eq!(value["metadata"]["attempt"]["apiKey"], REDACTED);
	assert_eq!(value["metadata"]["attempt"]["count"], 3);
	assert_eq!(value["result"]["success"], false);

	assert_eq!(store.get(stored.id).await.unwrap(), Some(stored));
}

#[tokio::test]
async fn test_failed_store_write_is_not_forwarded() {
	let port = reserve_port().await;
	let (forwarder, _config) = start(forwarding_to(port, retry(true, 10))).await;
	let recorder = AuditRecorder::new(Arc::new(BrokenStore)).with_forwarder(Arc::new(forwarder.clone()));

	let err = recorder
		.record(AuditRecord::builder("entry.create").result(AuditOutcome::success()))
		.await
		.unwrap_err();
	assert!(matches!(err, AuditError::StoreWrite(StoreError::Backend(_))));

	let status = forwarder.status().await.unwrap();
	assert_eq!(status.queue_len, 0);
	assert_eq!(status.dropped_filtered, 0);
}

#[tokio::test]
async fn test_invalid_input_writes_nothing() {
	let store = Arc::new(MemoryAuditStore::new());
	let recorder = AuditRecorder::new(store.clone());

	let err = recorder
		.record(AuditRecord::builder("entry.create"))
		.await
		.unwrap_err();
	assert!(matches!(err, AuditError::InvalidInput(_)));
	assert!(store.is_empty());
}
