// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{retention_cutoff, AuditQuery, AuditStore, EventCount, LevelCount, StatsWindow};
use crate::error::{StoreError, StoreResult};
use crate::record::{AuditLevel, AuditRecord};

/// Process-local store, used when no database is configured.
#[derive(Default)]
pub struct MemoryAuditStore {
	records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.records.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.read().is_empty()
	}
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
	async fn insert(&self, record: &AuditRecord) -> StoreResult<()> {
		let mut records = self.records.write();
		if records.iter().any(|r| r.id == record.id) {
			return Err(StoreError::Immutable { id: record.id });
		}
		records.push(record.clone());
		Ok(())
	}

	async fn get(&self, id: Uuid) -> StoreResult<Option<AuditRecord>> {
		Ok(self.records.read().iter().find(|r| r.id == id).cloned())
	}

	async fn query(&self, query: &AuditQuery) -> StoreResult<(Vec<AuditRecord>, i64)> {
		let records = self.records.read();
		let mut matched: Vec<&AuditRecord> = records.iter().filter(|r| query.matches(r)).collect();
		matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

		let total = matched.len() as i64;
		let page = matched
			.into_iter()
			.skip(query.effective_offset() as usize)
			.take(query.effective_limit() as usize)
			.cloned()
			.collect();
		Ok((page, total))
	}

	async fn count_by_level(&self, window: StatsWindow) -> StoreResult<Vec<LevelCount>> {
		let since = window.since(Utc::now());
		let mut counts: BTreeMap<AuditLevel, i64> = BTreeMap::new();
		for record in self.records.read().iter().filter(|r| r.timestamp >= since) {
			*counts.entry(record.level).or_default() += 1;
		}
		Ok(counts
			.into_iter()
			.map(|(level, count)| LevelCount { level, count })
			.collect())
	}

	async fn count_by_event(&self, window: StatsWindow) -> StoreResult<Vec<EventCount>> {
		let since = window.since(Utc::now());
		let mut counts: HashMap<String, i64> = HashMap::new();
		for record in self.records.read().iter().filter(|r| r.timestamp >= since) {
			*counts.entry(record.event.clone()).or_default() += 1;
		}
		let mut counts: Vec<EventCount> = counts
			.into_iter()
			.map(|(event, count)| EventCount { event, count })
			.collect();
		counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.event.cmp(&b.event)));
		Ok(counts)
	}

	async fn purge_expired(&self, retention_days: i64) -> StoreResult<u64> {
		let cutoff = retention_cutoff(Utc::now(), retention_days)?;
		let mut records = self.records.write();
		let before = records.len();
		records.retain(|r| r.timestamp >= cutoff);
		Ok((before - records.len()) as u64)
	}
}
