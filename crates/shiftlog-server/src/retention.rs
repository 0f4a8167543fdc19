// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic purge of audit records past their retention window.

use std::sync::Arc;
use std::time::Duration;

use shiftlog_audit::AuditStore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

pub struct PurgeJob {
	shutdown_tx: broadcast::Sender<()>,
	handle: JoinHandle<()>,
}

/// Run one purge pass. Failures are logged and reported as zero.
#[instrument(skip(store))]
pub async fn purge_once(store: &dyn AuditStore, retention_days: i64) -> u64 {
	match store.purge_expired(retention_days).await {
		Ok(purged) => {
			debug!(purged, retention_days, "audit retention pass finished");
			purged
		}
		Err(e) => {
			error!(error = %e, "audit retention purge failed");
			0
		}
	}
}

impl PurgeJob {
	/// Purge every `interval`, starting one interval from now.
	pub fn spawn(store: Arc<dyn AuditStore>, retention_days: i64, interval: Duration) -> Self {
		let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

		let handle = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = tokio::time::sleep(interval) => {
						purge_once(store.as_ref(), retention_days).await;
					}
					_ = shutdown_rx.recv() => {
						info!("stopping audit retention job");
						break;
					}
				}
			}
		});

		info!(
			retention_days,
			interval_secs = interval.as_secs(),
			"audit retention job started"
		);
		Self {
			shutdown_tx,
			handle,
		}
	}

	pub async fn shutdown(self) {
		let _ = self.shutdown_tx.send(());
		let _ = self.handle.await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration as ChronoDuration, Utc};
	use shiftlog_audit::{AuditOutcome, AuditRecord, MemoryAuditStore};

	fn record_aged(days: i64) -> AuditRecord {
		let mut record = AuditRecord::builder("entry.create")
			.result(AuditOutcome::success())
			.build()
			.unwrap();
		record.timestamp = Utc::now() - ChronoDuration::days(days);
		record
	}

	#[tokio::test]
	async fn periodic_job_purges_and_stops() {
		let store = Arc::new(MemoryAuditStore::new());
		store.insert(&record_aged(120)).await.unwrap();
		store.insert(&record_aged(1)).await.unwrap();

		let job = PurgeJob::spawn(store.clone(), 90, Duration::from_millis(20));
		tokio::time::sleep(Duration::from_millis(200)).await;
		job.shutdown().await;

		assert_eq!(store.len(), 1);
	}

	#[tokio::test]
	async fn purge_once_reports_count() {
		let store = MemoryAuditStore::new();
		store.insert(&record_aged(100)).await.unwrap();
		assert_eq!(purge_once(&store, 90).await, 1);
		assert_eq!(purge_once(&store, 90).await, 0);
	}
}
