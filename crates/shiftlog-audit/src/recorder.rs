// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::error::{AuditError, AuditResult};
use crate::record::{AuditLevel, AuditRecord, AuditRecordBuilder};
use crate::sanitize::sanitize;
use crate::store::AuditStore;

/// Serialized metadata above this many bytes is replaced by a marker.
pub const MAX_METADATA_BYTES: usize = 10 * 1024;

/// Target of the application-log mirror of every audit record.
pub const AUDIT_LOG_TARGET: &str = "shiftlog_audit";

/// Receives records after they are durably stored. Implementations must
/// return without waiting on the network.
pub trait AuditForwarder: Send + Sync {
	fn enqueue(&self, record: Arc<AuditRecord>);
}

/// Replace oversized metadata with `{"truncated": true, "originalSize": N}`.
pub fn cap_metadata(metadata: serde_json::Value) -> serde_json::Value {
	let size = metadata.to_string().len();
	if size > MAX_METADATA_BYTES {
		warn!(
			original_size = size,
			limit = MAX_METADATA_BYTES,
			"audit metadata too large, truncating"
		);
		json!({ "truncated": true, "originalSize": size })
	} else {
		metadata
	}
}

pub struct AuditRecorder {
	store: Arc<dyn AuditStore>,
	forwarder: Option<Arc<dyn AuditForwarder>>,
}

impl AuditRecorder {
	pub fn new(store: Arc<dyn AuditStore>) -> Self {
		Self {
			store,
			forwarder: None,
		}
	}

	pub fn with_forwarder(mut self, forwarder: Arc<dyn AuditForwarder>) -> Self {
		self.forwarder = Some(forwarder);
		self
	}

	pub fn store(&self) -> &Arc<dyn AuditStore> {
		&self.store
	}

	/// Build, sanitize, persist and forward one audit record.
	///
	/// Failures come back as values so callers can ignore them without
	/// affecting the business operation: invalid input writes nothing, and a
	/// failed store write is logged and not forwarded.
	#[instrument(skip(self, input), fields(event = %input.event()))]
	pub async fn record(&self, input: AuditRecordBuilder) -> AuditResult<AuditRecord> {
		let mut record = match input.build() {
			Ok(record) => record,
			Err(e) => {
				warn!(error = %e, "rejected audit record");
				return Err(e);
			}
		};

		record.metadata = cap_metadata(sanitize(&record.metadata));

		if let Err(e) = self.store.insert(&record).await {
			error!(
				id = %record.id,
				event = %record.event,
				error = %e,
				"failed to persist audit record"
			);
			return Err(AuditError::StoreWrite(e));
		}

		mirror_to_log(&record);

		if let Some(forwarder) = &self.forwarder {
			forwarder.enqueue(Arc::new(record.clone()));
		}

		Ok(record)
	}
}

fn mirror_to_log(record: &AuditRecord) {
	let actor = record
		.actor
		.as_ref()
		.map(|a| a.username.as_str())
		.unwrap_or("system");
	let reason = record.result.reason.as_deref().unwrap_or("");

	match record.level {
		AuditLevel::Info => info!(
			target: AUDIT_LOG_TARGET,
			id = %record.id,
			event = %record.event,
			actor,
			success = record.result.success,
			reason,
			"audit"
		),
		AuditLevel::Warn => warn!(
			target: AUDIT_LOG_TARGET,
			id = %record.id,
			event = %record.event,
			actor,
			success = record.result.success,
			reason,
			"audit"
		),
		AuditLevel::Error => error!(
			target: AUDIT_LOG_TARGET,
			id = %record.id,
			event = %record.event,
			actor,
			success = record.result.success,
			reason,
			"audit"
		),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::{StoreError, StoreResult};
	use crate::record::{AuditOutcome, RequestContext};
	use crate::sanitize::REDACTED;
	use crate::store::{AuditQuery, EventCount, LevelCount, MemoryAuditStore, StatsWindow};
	use async_trait::async_trait;
	use parking_lot::Mutex;
	use uuid::Uuid;

	#[derive(Default)]
	struct CapturingForwarder {
		records: Mutex<Vec<Arc<AuditRecord>>>,
	}

	impl AuditForwarder for CapturingForwarder {
		fn enqueue(&self, record: Arc<AuditRecord>) {
			self.records.lock().push(record);
		}
	}

	struct FailingStore;

	#[async_trait]
	impl AuditStore for FailingStore {
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

	fn recorder() -> (AuditRecorder, Arc<MemoryAuditStore>, Arc<CapturingForwarder>) {
		let store = Arc::new(MemoryAuditStore::new());
		let forwarder = Arc::new(CapturingForwarder::default());
		let recorder = AuditRecorder::new(store.clone()).with_forwarder(forwarder.clone());
		(recorder, store, forwarder)
	}

	#[tokio::test]
	async fn stores_then_forwards() {
		let (recorder, store, forwarder) = recorder();
		let record = recorder
			.record(
				AuditRecord::builder("entry.create")
					.request(RequestContext {
						method: Some("POST".to_string()),
						path: Some("/entries".to_string()),
						..Default::default()
					})
					.result(AuditOutcome::success().status_code(201)),
			)
			.await
			.unwrap();

		assert_eq!(store.get(record.id).await.unwrap(), Some(record.clone()));
		let forwarded = forwarder.records.lock();
		assert_eq!(forwarded.len(), 1);
		assert_eq!(forwarded[0].id, record.id);
	}

	#[tokio::test]
	async fn invalid_input_writes_nothing() {
		let (recorder, store, forwarder) = recorder();

		let missing_result = recorder.record(AuditRecord::builder("entry.create")).await;
		assert!(matches!(missing_result, Err(AuditError::InvalidInput(_))));

		let bad_event = recorder
			.record(AuditRecord::builder("").result(AuditOutcome::success()))
			.await;
		assert!(matches!(bad_event, Err(AuditError::InvalidInput(_))));

		assert!(store.is_empty());
		assert!(forwarder.records.lock().is_empty());
	}

	#[tokio::test]
	async fn store_failure_is_returned_and_not_forwarded() {
		let forwarder = Arc::new(CapturingForwarder::default());
		let recorder = AuditRecorder::new(Arc::new(FailingStore)).with_forwarder(forwarder.clone());

		let result = recorder
			.record(AuditRecord::builder("auth.login").result(AuditOutcome::success()))
			.await;
		assert!(matches!(result, Err(AuditError::StoreWrite(_))));
		assert!(forwarder.records.lock().is_empty());
	}

	#[tokio::test]
	async fn metadata_is_sanitized_before_storage() {
		let (recorder, store, forwarder) = recorder();
		let record = recorder
			.record(
				AuditRecord::builder("user.password_reset")
					.result(AuditOutcome::success())
					.metadata(json!({"user": "bob", "newPassword": "hunter2"})),
			)
			.await
			.unwrap();

		let stored = store.get(record.id).await.unwrap().unwrap();
		assert_eq!(stored.metadata["newPassword"], REDACTED);
		assert_eq!(stored.metadata["user"], "bob");
		assert_eq!(forwarder.records.lock()[0].metadata["newPassword"], REDACTED);
	}

	#[tokio::test]
	async fn oversized_metadata_is_replaced_with_marker() {
		let (recorder, store, _) = recorder();
		// {"notes":"<20468 x>"} serializes to exactly 20480 bytes.
		let metadata = json!({ "notes": "x".repeat(20_468) });
		assert_eq!(metadata.to_string().len(), 20_480);

		let record = recorder
			.record(
				AuditRecord::builder("entry.update")
					.result(AuditOutcome::success())
					.metadata(metadata),
			)
			.await
			.unwrap();

		let stored = store.get(record.id).await.unwrap().unwrap();
		assert_eq!(stored.metadata, json!({"truncated": true, "originalSize": 20480}));
	}

	#[test]
	fn metadata_at_limit_is_kept() {
		// {"n":"..."} has 8 bytes of framing.
		let metadata = json!({ "n": "y".repeat(MAX_METADATA_BYTES - 8) });
		assert_eq!(metadata.to_string().len(), MAX_METADATA_BYTES);
		assert_eq!(cap_metadata(metadata.clone()), metadata);
	}

	#[tokio::test]
	async fn works_without_forwarder() {
		let store = Arc::new(MemoryAuditStore::new());
		let recorder = AuditRecorder::new(store.clone());
		recorder
			.record(AuditRecord::builder("system.startup").result(AuditOutcome::success()))
			.await
			.unwrap();
		assert_eq!(store.len(), 1);
	}
}
