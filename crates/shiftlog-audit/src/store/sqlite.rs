// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed audit store.
//!
//! Immutability is enforced twice: the [`AuditStore`] API refuses updates and
//! deletes, and the schema carries triggers that abort any `UPDATE` and any
//! `DELETE` of a row that has not yet expired.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{query::Query, Row, Sqlite, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
	expiry_for, retention_cutoff, AuditQuery, AuditStore, EventCount, LevelCount, StatsWindow,
};
use crate::error::{StoreError, StoreResult};
use crate::record::{AuditLevel, AuditRecord, DEFAULT_AUDIT_RETENTION_DAYS};

const SCHEMA: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS audit_records (
		id TEXT PRIMARY KEY NOT NULL,
		ts_ms INTEGER NOT NULL,
		expires_at INTEGER NOT NULL,
		event TEXT NOT NULL,
		level TEXT NOT NULL,
		actor_user_id TEXT,
		actor_username TEXT,
		reason TEXT,
		metadata_json TEXT NOT NULL,
		record_json TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_audit_records_ts ON audit_records (ts_ms)",
	"CREATE INDEX IF NOT EXISTS idx_audit_records_event ON audit_records (event)",
	"CREATE INDEX IF NOT EXISTS idx_audit_records_actor ON audit_records (actor_user_id)",
	r#"
	CREATE TRIGGER IF NOT EXISTS audit_records_no_update
	BEFORE UPDATE ON audit_records
	BEGIN
		SELECT RAISE(ABORT, 'audit records are immutable');
	END
	"#,
	r#"
	CREATE TRIGGER IF NOT EXISTS audit_records_no_early_delete
	BEFORE DELETE ON audit_records
	WHEN OLD.expires_at > CAST(strftime('%s', 'now') AS INTEGER)
	BEGIN
		SELECT RAISE(ABORT, 'audit records are immutable until expired');
	END
	"#,
];

enum Bind {
	Text(String),
	Int(i64),
}

fn bind_all<'q>(
	mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
	binds: &'q [Bind],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
	for bind in binds {
		query = match bind {
			Bind::Text(s) => query.bind(s.as_str()),
			Bind::Int(i) => query.bind(*i),
		};
	}
	query
}

pub struct SqliteAuditStore {
	pool: SqlitePool,
	retention_days: i64,
}

impl SqliteAuditStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self::with_retention_days(pool, DEFAULT_AUDIT_RETENTION_DAYS)
	}

	/// `retention_days` fixes each row's expiry at insert time; the delete
	/// trigger refuses to remove a row before then.
	pub fn with_retention_days(pool: SqlitePool, retention_days: i64) -> Self {
		Self {
			pool,
			retention_days,
		}
	}

	/// Open (creating if needed) the database at `url` and apply the schema.
	pub async fn connect(url: &str, retention_days: i64) -> StoreResult<Self> {
		let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
		let pool = SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(options)
			.await?;

		let store = Self::with_retention_days(pool, retention_days);
		store.migrate().await?;
		info!(url = %url, retention_days, "audit store opened");
		Ok(store)
	}

	pub async fn migrate(&self) -> StoreResult<()> {
		for statement in SCHEMA {
			sqlx::query(statement).execute(&self.pool).await?;
		}
		debug!("audit store schema applied");
		Ok(())
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	fn where_clause(query: &AuditQuery) -> (String, Vec<Bind>) {
		let mut conditions = vec!["1=1".to_string()];
		let mut binds = Vec::new();

		if let Some(actor) = &query.actor {
			conditions.push("(actor_user_id = ? OR actor_username = ?)".to_string());
			binds.push(Bind::Text(actor.clone()));
			binds.push(Bind::Text(actor.clone()));
		}
		if let Some(event) = &query.event {
			conditions.push("instr(event, ?) > 0".to_string());
			binds.push(Bind::Text(event.clone()));
		}
		if let Some(level) = query.level {
			conditions.push("level = ?".to_string());
			binds.push(Bind::Text(level.to_string()));
		}
		if let Some(from) = query.from {
			conditions.push("ts_ms >= ?".to_string());
			binds.push(Bind::Int(from.timestamp_millis()));
		}
		if let Some(to) = query.to {
			conditions.push("ts_ms <= ?".to_string());
			binds.push(Bind::Int(to.timestamp_millis()));
		}
		if let Some(text) = &query.text {
			conditions.push(
				"(instr(lower(event), ?) > 0 \
				 OR instr(lower(COALESCE(actor_username, '')), ?) > 0 \
				 OR instr(lower(COALESCE(reason, '')), ?) > 0 \
				 OR instr(lower(metadata_json), ?) > 0)"
					.to_string(),
			);
			// SQLite's lower() folds ASCII only.
			let needle = text.to_ascii_lowercase();
			for _ in 0..4 {
				binds.push(Bind::Text(needle.clone()));
			}
		}

		(conditions.join(" AND "), binds)
	}
}

fn map_insert_error(e: sqlx::Error, id: Uuid) -> StoreError {
	match &e {
		sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Immutable { id },
		_ => StoreError::from(e),
	}
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
	async fn insert(&self, record: &AuditRecord) -> StoreResult<()> {
		let record_json = serde_json::to_string(record)?;
		let metadata_json = serde_json::to_string(&record.metadata)?;
		let expires_at = expiry_for(record.timestamp, self.retention_days)?.timestamp();

		sqlx::query(
			r#"
			INSERT INTO audit_records (
				id, ts_ms, expires_at, event, level, actor_user_id, actor_username,
				reason, metadata_json, record_json
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(record.id.to_string())
		.bind(record.timestamp.timestamp_millis())
		.bind(expires_at)
		.bind(&record.event)
		.bind(record.level.as_str())
		.bind(record.actor.as_ref().map(|a| a.user_id.clone()))
		.bind(record.actor.as_ref().map(|a| a.username.clone()))
		.bind(&record.result.reason)
		.bind(&metadata_json)
		.bind(&record_json)
		.execute(&self.pool)
		.await
		.map_err(|e| map_insert_error(e, record.id))?;

		Ok(())
	}

	async fn get(&self, id: Uuid) -> StoreResult<Option<AuditRecord>> {
		let row = sqlx::query("SELECT record_json FROM audit_records WHERE id = ?")
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;

		match row {
			Some(row) => {
				let json: String = row.try_get("record_json")?;
				Ok(Some(serde_json::from_str(&json)?))
			}
			None => Ok(None),
		}
	}

	#[tracing::instrument(skip(self))]
	async fn query(&self, query: &AuditQuery) -> StoreResult<(Vec<AuditRecord>, i64)> {
		let (where_clause, binds) = Self::where_clause(query);

		let count_sql = format!("SELECT COUNT(*) as cnt FROM audit_records WHERE {where_clause}");
		let count_row = bind_all(sqlx::query(&count_sql), &binds)
			.fetch_one(&self.pool)
			.await?;
		let total: i64 = count_row.try_get("cnt")?;

		let data_sql = format!(
			"SELECT record_json FROM audit_records WHERE {where_clause} \
			 ORDER BY ts_ms DESC, rowid DESC LIMIT ? OFFSET ?"
		);
		let rows = bind_all(sqlx::query(&data_sql), &binds)
			.bind(query.effective_limit())
			.bind(query.effective_offset())
			.fetch_all(&self.pool)
			.await?;

		let mut records = Vec::with_capacity(rows.len());
		for row in rows {
			let json: String = row.try_get("record_json")?;
			records.push(serde_json::from_str(&json)?);
		}
		Ok((records, total))
	}

	async fn count_by_level(&self, window: StatsWindow) -> StoreResult<Vec<LevelCount>> {
		let since = window.since(Utc::now()).timestamp_millis();
		let rows = sqlx::query(
			"SELECT level, COUNT(*) as cnt FROM audit_records WHERE ts_ms >= ? GROUP BY level",
		)
		.bind(since)
		.fetch_all(&self.pool)
		.await?;

		let mut counts = Vec::with_capacity(rows.len());
		for row in rows {
			let level: String = row.try_get("level")?;
			let level = AuditLevel::from_str(&level)
				.map_err(|e| StoreError::Backend(e.to_string()))?;
			counts.push(LevelCount {
				level,
				count: row.try_get("cnt")?,
			});
		}
		counts.sort_by_key(|c| c.level);
		Ok(counts)
	}

	async fn count_by_event(&self, window: StatsWindow) -> StoreResult<Vec<EventCount>> {
		let since = window.since(Utc::now()).timestamp_millis();
		let rows = sqlx::query(
			"SELECT event, COUNT(*) as cnt FROM audit_records WHERE ts_ms >= ? \
			 GROUP BY event ORDER BY cnt DESC, event ASC",
		)
		.bind(since)
		.fetch_all(&self.pool)
		.await?;

		let mut counts = Vec::with_capacity(rows.len());
		for row in rows {
			counts.push(EventCount {
				event: row.try_get("event")?,
				count: row.try_get("cnt")?,
			});
		}
		Ok(counts)
	}

	async fn purge_expired(&self, retention_days: i64) -> StoreResult<u64> {
		let now = Utc::now();
		let cutoff = retention_cutoff(now, retention_days)?.timestamp_millis();
		let result =
			sqlx::query("DELETE FROM audit_records WHERE ts_ms < ? AND expires_at <= ?")
				.bind(cutoff)
				.bind(now.timestamp())
				.execute(&self.pool)
				.await?;

		let removed = result.rows_affected();
		if removed > 0 {
			info!(removed, retention_days, "purged expired audit records");
		}
		Ok(removed)
	}
}
