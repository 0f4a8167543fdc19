// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Insert-only persistence for audit records.
//!
//! Implementations must reject every update and delete with
//! [`StoreError::Immutable`]. The only removal path is
//! [`AuditStore::purge_expired`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::record::{AuditLevel, AuditRecord};

pub mod memory;
#[cfg(feature = "store-sqlite")]
pub mod sqlite;

pub use memory::MemoryAuditStore;
#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteAuditStore;

pub const DEFAULT_QUERY_LIMIT: i64 = 50;
pub const MAX_QUERY_LIMIT: i64 = 1000;

/// Filter for listing records. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
	/// Matches the actor's user id or username exactly.
	pub actor: Option<String>,
	/// Substring of the event name.
	pub event: Option<String>,
	pub level: Option<AuditLevel>,
	pub from: Option<DateTime<Utc>>,
	pub to: Option<DateTime<Utc>>,
	/// Substring of event, username, result reason or serialized metadata.
	/// Case folding is ASCII only so every store matches the same rows.
	pub text: Option<String>,
	pub limit: Option<i64>,
	pub offset: Option<i64>,
}

impl AuditQuery {
	pub fn effective_limit(&self) -> i64 {
		self.limit
			.unwrap_or(DEFAULT_QUERY_LIMIT)
			.clamp(1, MAX_QUERY_LIMIT)
	}

	pub fn effective_offset(&self) -> i64 {
		self.offset.unwrap_or(0).max(0)
	}

	/// In-process evaluation of the filter against one record.
	pub fn matches(&self, record: &AuditRecord) -> bool {
		if let Some(actor) = &self.actor {
			let hit = record
				.actor
				.as_ref()
				.is_some_and(|a| &a.user_id == actor || &a.username == actor);
			if !hit {
				return false;
			}
		}
		if let Some(event) = &self.event {
			if !record.event.contains(event.as_str()) {
				return false;
			}
		}
		if let Some(level) = self.level {
			if record.level != level {
				return false;
			}
		}
		if let Some(from) = self.from {
			if record.timestamp < from {
				return false;
			}
		}
		if let Some(to) = self.to {
			if record.timestamp > to {
				return false;
			}
		}
		if let Some(text) = &self.text {
			let needle = text.to_ascii_lowercase();
			let haystacks = [
				Some(record.event.clone()),
				record.actor.as_ref().map(|a| a.username.clone()),
				record.result.reason.clone(),
				Some(record.metadata.to_string()),
			];
			if !haystacks
				.iter()
				.flatten()
				.any(|h| h.to_ascii_lowercase().contains(&needle))
			{
				return false;
			}
		}
		true
	}
}

/// Rolling window for aggregate counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsWindow {
	Last24Hours,
	Last7Days,
}

impl StatsWindow {
	pub fn duration(&self) -> Duration {
		match self {
			StatsWindow::Last24Hours => Duration::hours(24),
			StatsWindow::Last7Days => Duration::days(7),
		}
	}

	pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
		now - self.duration()
	}
}

fn retention_delta(retention_days: i64) -> StoreResult<Duration> {
	Duration::try_days(retention_days).ok_or_else(|| {
		StoreError::Backend(format!("retention of {retention_days} days is out of range"))
	})
}

/// Instant before which records fall outside `retention_days`.
pub(crate) fn retention_cutoff(
	now: DateTime<Utc>,
	retention_days: i64,
) -> StoreResult<DateTime<Utc>> {
	now.checked_sub_signed(retention_delta(retention_days)?)
		.ok_or_else(|| {
			StoreError::Backend(format!("retention of {retention_days} days is out of range"))
		})
}

/// Instant at which a record written at `timestamp` may be purged.
pub(crate) fn expiry_for(
	timestamp: DateTime<Utc>,
	retention_days: i64,
) -> StoreResult<DateTime<Utc>> {
	timestamp
		.checked_add_signed(retention_delta(retention_days)?)
		.ok_or_else(|| {
			StoreError::Backend(format!("retention of {retention_days} days is out of range"))
		})
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCount {
	pub level: AuditLevel,
	pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCount {
	pub event: String,
	pub count: i64,
}

#[async_trait]
pub trait AuditStore: Send + Sync {
	async fn insert(&self, record: &AuditRecord) -> StoreResult<()>;

	async fn get(&self, id: Uuid) -> StoreResult<Option<AuditRecord>>;

	/// Newest first. Returns the page and the total number of matches.
	async fn query(&self, query: &AuditQuery) -> StoreResult<(Vec<AuditRecord>, i64)>;

	/// Counts per level inside the window; levels with no records are omitted.
	async fn count_by_level(&self, window: StatsWindow) -> StoreResult<Vec<LevelCount>>;

	/// Counts per event inside the window, most frequent first.
	async fn count_by_event(&self, window: StatsWindow) -> StoreResult<Vec<EventCount>>;

	/// Remove records older than `retention_days`. Returns the number removed.
	async fn purge_expired(&self, retention_days: i64) -> StoreResult<u64>;

	/// Always fails: records are immutable once written.
	async fn update(&self, record: &AuditRecord) -> StoreResult<()> {
		Err(StoreError::Immutable { id: record.id })
	}

	/// Always fails: records are immutable once written.
	async fn delete(&self, id: Uuid) -> StoreResult<()> {
		Err(StoreError::Immutable { id })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::{Actor, AuditOutcome};
	use serde_json::json;

	fn record(event: &str, level: AuditLevel) -> AuditRecord {
		AuditRecord::builder(event)
			.level(level)
			.actor(Actor::new("u-7", "carol"))
			.result(AuditOutcome::failure("locked out"))
			.metadata(json!({"checklist": "Night Shift"}))
			.build()
			.unwrap()
	}

	#[test]
	fn limit_is_clamped() {
		assert_eq!(AuditQuery::default().effective_limit(), 50);
		let big = AuditQuery {
			limit: Some(5000),
			..Default::default()
		};
		assert_eq!(big.effective_limit(), 1000);
		let negative = AuditQuery {
			limit: Some(-3),
			offset: Some(-1),
			..Default::default()
		};
		assert_eq!(negative.effective_limit(), 1);
		assert_eq!(negative.effective_offset(), 0);
	}

	#[test]
	fn matches_actor_by_id_or_username() {
		let r = record("auth.login", AuditLevel::Info);
		for actor in ["u-7", "carol"] {
			let q = AuditQuery {
				actor: Some(actor.to_string()),
				..Default::default()
			};
			assert!(q.matches(&r));
		}
		let q = AuditQuery {
			actor: Some("dave".to_string()),
			..Default::default()
		};
		assert!(!q.matches(&r));
	}

	#[test]
	fn matches_event_substring_and_level() {
		let r = record("checklist.complete", AuditLevel::Warn);
		let q = AuditQuery {
			event: Some("checklist".to_string()),
			level: Some(AuditLevel::Warn),
			..Default::default()
		};
		assert!(q.matches(&r));
		let q = AuditQuery {
			level: Some(AuditLevel::Error),
			..Default::default()
		};
		assert!(!q.matches(&r));
	}

	#[test]
	fn retention_arithmetic_reports_overflow() {
		let now = Utc::now();
		assert_eq!(retention_cutoff(now, 90).unwrap(), now - Duration::days(90));
		assert_eq!(expiry_for(now, 90).unwrap(), now + Duration::days(90));
		assert!(matches!(
			retention_cutoff(now, 100_000_000),
			Err(StoreError::Backend(_))
		));
		assert!(matches!(expiry_for(now, i64::MAX), Err(StoreError::Backend(_))));
	}

	#[test]
	fn free_text_folds_ascii_case_only() {
		let mut r = record("auth.login", AuditLevel::Info);
		r.metadata = json!({"site": "Österreich"});
		let q = |text: &str| AuditQuery {
			text: Some(text.to_string()),
			..Default::default()
		};
		assert!(q("ÖSTERREICH").matches(&r));
		assert!(!q("öSTERREICH").matches(&r));
	}

	#[test]
	fn free_text_searches_reason_and_metadata() {
		let r = record("auth.login", AuditLevel::Info);
		for text in ["LOCKED", "night shift", "CAROL", "auth"] {
			let q = AuditQuery {
				text: Some(text.to_string()),
				..Default::default()
			};
			assert!(q.matches(&r), "{text} should match");
		}
	}

	#[test]
	fn time_range_is_inclusive() {
		let r = record("auth.login", AuditLevel::Info);
		let q = AuditQuery {
			from: Some(r.timestamp),
			to: Some(r.timestamp),
			..Default::default()
		};
		assert!(q.matches(&r));
	}
}
