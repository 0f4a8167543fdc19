// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wiring of store, recorder, forwarder and retention job.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use shiftlog_audit::{
	AuditLevel, AuditOutcome, AuditRecord, AuditRecorder, AuditStore, ForwardingAdmin,
	LogForwarder, MemoryAuditStore, ShutdownReport,
};
use shiftlog_config::{AuditConfig, ForwardingConfigStore, ShiftlogConfig};
use tracing::{info, warn};

use crate::retention::PurgeJob;
use crate::version::VERSION;

/// Open the configured audit store. Without a database URL records are
/// kept in memory and lost on exit.
pub async fn open_audit_store(audit: &AuditConfig) -> anyhow::Result<Arc<dyn AuditStore>> {
	match &audit.database_url {
		#[cfg(feature = "store-sqlite")]
		Some(url) => {
			let store = shiftlog_audit::SqliteAuditStore::connect(url, audit.retention_days)
				.await
				.with_context(|| format!("failed to open audit store at {url}"))?;
			Ok(Arc::new(store))
		}
		#[cfg(not(feature = "store-sqlite"))]
		Some(_) => anyhow::bail!("audit.database_url is set but SQLite support is not compiled in"),
		None => {
			warn!("no audit database configured, audit records are kept in memory only");
			Ok(Arc::new(MemoryAuditStore::new()))
		}
	}
}

pub struct Pipeline {
	pub recorder: Arc<AuditRecorder>,
	pub forwarder: LogForwarder,
	pub admin: ForwardingAdmin,
	purge: PurgeJob,
}

impl Pipeline {
	pub async fn start(
		config: &ShiftlogConfig,
		store: Arc<dyn AuditStore>,
		forwarding: Arc<dyn ForwardingConfigStore>,
	) -> anyhow::Result<Self> {
		let forwarder = LogForwarder::start(forwarding)
			.await
			.context("failed to start log forwarder")?;
		let recorder = Arc::new(
			AuditRecorder::new(Arc::clone(&store)).with_forwarder(Arc::new(forwarder.clone())),
		);
		let purge = PurgeJob::spawn(
			store,
			config.audit.retention_days,
			Duration::from_secs(config.audit.purge_interval_secs),
		);

		let pipeline = Self {
			recorder,
			admin: ForwardingAdmin::new(forwarder.clone()),
			forwarder,
			purge,
		};
		pipeline
			.record_system("system.startup", json!({ "version": VERSION }))
			.await;
		Ok(pipeline)
	}

	async fn record_system(&self, event: &str, metadata: serde_json::Value) {
		let input = AuditRecord::builder(event)
			.level(AuditLevel::Info)
			.result(AuditOutcome::success())
			.metadata(metadata);
		if let Err(e) = self.recorder.record(input).await {
			warn!(event, error = %e, "failed to record lifecycle audit entry");
		}
	}

	/// Re-read forwarding settings. A failed reload keeps the previous
	/// settings running.
	pub async fn reload(&self) {
		match self.admin.reload().await {
			Ok(version) => info!(version, "forwarding configuration reloaded"),
			Err(e) => warn!(error = %e, "forwarding configuration reload failed"),
		}
	}

	pub async fn shutdown(self, deadline: Duration) -> anyhow::Result<ShutdownReport> {
		self.record_system("system.shutdown", json!({ "version": VERSION }))
			.await;
		self.purge.shutdown().await;

		let report = self
			.forwarder
			.shutdown(deadline)
			.await
			.context("log forwarder stopped before shutdown")?;
		info!(
			flushed = report.flushed,
			discarded = report.discarded,
			"audit pipeline stopped"
		);
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use shiftlog_audit::{AuditQuery, StatsWindow};
	use shiftlog_config::{ForwardingConfig, MemoryForwardingConfigStore};

	#[tokio::test]
	async fn memory_store_when_no_url() {
		let store = open_audit_store(&AuditConfig::default()).await.unwrap();
		let (records, total) = store.query(&AuditQuery::default()).await.unwrap();
		assert!(records.is_empty());
		assert_eq!(total, 0);
	}

	#[tokio::test]
	async fn lifecycle_is_audited() {
		let store: Arc<dyn AuditStore> = Arc::new(MemoryAuditStore::new());
		let forwarding: Arc<dyn ForwardingConfigStore> =
			Arc::new(MemoryForwardingConfigStore::new(ForwardingConfig::default()));

		let pipeline = Pipeline::start(&ShiftlogConfig::default(), Arc::clone(&store), forwarding)
			.await
			.unwrap();
		pipeline.reload().await;
		let report = pipeline.shutdown(Duration::from_millis(100)).await.unwrap();
		assert_eq!(report, ShutdownReport { flushed: 0, discarded: 0 });

		let counts = store.count_by_event(StatsWindow::Last24Hours).await.unwrap();
		let mut events: Vec<_> = counts.into_iter().map(|c| c.event).collect();
		events.sort();
		assert_eq!(events, vec!["system.shutdown", "system.startup"]);
	}
}
