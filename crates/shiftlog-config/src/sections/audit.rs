// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit storage configuration section.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_RETENTION_DAYS: i64 = 90;
/// One hundred years.
pub const MAX_RETENTION_DAYS: i64 = 36_500;
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
	/// SQLite URL for the durable store. `None` keeps records in memory.
	pub database_url: Option<String>,
	/// Records older than this are eligible for purge.
	pub retention_days: i64,
	pub purge_interval_secs: u64,
}

impl Default for AuditConfig {
	fn default() -> Self {
		Self {
			database_url: None,
			retention_days: DEFAULT_RETENTION_DAYS,
			purge_interval_secs: DEFAULT_PURGE_INTERVAL_SECS,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuditConfigLayer {
	pub database_url: Option<String>,
	pub retention_days: Option<i64>,
	pub purge_interval_secs: Option<u64>,
}

impl AuditConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.database_url.is_some() {
			self.database_url = other.database_url;
		}
		if other.retention_days.is_some() {
			self.retention_days = other.retention_days;
		}
		if other.purge_interval_secs.is_some() {
			self.purge_interval_secs = other.purge_interval_secs;
		}
	}

	pub fn finalize(self) -> Result<AuditConfig, ConfigError> {
		let retention_days = self.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS);
		if !(1..=MAX_RETENTION_DAYS).contains(&retention_days) {
			return Err(ConfigError::Validation(format!(
				"audit retention_days must be between 1 and {MAX_RETENTION_DAYS}, got {retention_days}"
			)));
		}

		let purge_interval_secs = self
			.purge_interval_secs
			.unwrap_or(DEFAULT_PURGE_INTERVAL_SECS);
		if purge_interval_secs == 0 {
			return Err(ConfigError::Validation(
				"audit purge_interval_secs must be greater than 0".to_string(),
			));
		}

		Ok(AuditConfig {
			database_url: self.database_url.filter(|s| !s.trim().is_empty()),
			retention_days,
			purge_interval_secs,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults() {
		let config = AuditConfigLayer::default().finalize().unwrap();
		assert_eq!(config, AuditConfig::default());
		assert_eq!(config.retention_days, 90);
	}

	#[test]
	fn rejects_non_positive_retention() {
		let layer = AuditConfigLayer {
			retention_days: Some(0),
			..Default::default()
		};
		assert!(layer.finalize().is_err());
	}

	#[test]
	fn retention_is_capped() {
		let at_cap = AuditConfigLayer {
			retention_days: Some(MAX_RETENTION_DAYS),
			..Default::default()
		};
		assert_eq!(at_cap.finalize().unwrap().retention_days, MAX_RETENTION_DAYS);

		let huge = AuditConfigLayer {
			retention_days: Some(100_000_000),
			..Default::default()
		};
		assert!(matches!(huge.finalize(), Err(ConfigError::Validation(_))));
	}

	#[test]
	fn rejects_zero_purge_interval() {
		let layer = AuditConfigLayer {
			purge_interval_secs: Some(0),
			..Default::default()
		};
		assert!(layer.finalize().is_err());
	}

	#[test]
	fn blank_database_url_means_memory() {
		let layer = AuditConfigLayer {
			database_url: Some("  ".to_string()),
			..Default::default()
		};
		assert!(layer.finalize().unwrap().database_url.is_none());
	}
}
