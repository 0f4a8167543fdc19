// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Administrative surface for log forwarding settings.

use std::sync::Arc;

use shiftlog_config::{ForwardingConfig, ForwardingConfigStore, TestResult};
use tracing::debug;

use crate::error::ForwarderError;
use crate::forwarder::{ForwarderStatus, LogForwarder};

/// Ties the administered settings store to the running forwarder.
#[derive(Clone)]
pub struct ForwardingAdmin {
	store: Arc<dyn ForwardingConfigStore>,
	forwarder: LogForwarder,
}

impl ForwardingAdmin {
	pub fn new(forwarder: LogForwarder) -> Self {
		Self {
			store: Arc::clone(forwarder.store()),
			forwarder,
		}
	}

	/// Settings as persisted in the store, which may be newer than what the
	/// forwarder is running with until the next reload.
	pub fn current_config(&self) -> Result<ForwardingConfig, ForwarderError> {
		Ok(self.store.load()?)
	}

	/// Validate and persist `config`, then reload the forwarder with it.
	/// Returns the stored snapshot with its new version.
	pub async fn update_config(
		&self,
		config: ForwardingConfig,
	) -> Result<ForwardingConfig, ForwarderError> {
		config.validate()?;

		let store = Arc::clone(&self.store);
		let saved = tokio::task::spawn_blocking(move || store.save(config))
			.await
			.map_err(|_| ForwarderError::Stopped)??;
		debug!(version = saved.version, "reloading forwarder with updated settings");

		self.forwarder.reload_config().await?;
		Ok(saved)
	}

	pub async fn test_connection(&self) -> TestResult {
		self.forwarder.test_connection().await
	}

	pub async fn reload(&self) -> Result<u64, ForwarderError> {
		self.forwarder.reload_config().await
	}

	pub async fn status(&self) -> Result<ForwarderStatus, ForwarderError> {
		self.forwarder.status().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use shiftlog_config::{ConfigError, Destination, MemoryForwardingConfigStore};

	async fn admin() -> ForwardingAdmin {
		let store: Arc<dyn ForwardingConfigStore> =
			Arc::new(MemoryForwardingConfigStore::new(ForwardingConfig::default()));
		ForwardingAdmin::new(LogForwarder::start(store).await.unwrap())
	}

	#[tokio::test]
	async fn update_bumps_version_and_reloads() {
		let admin = admin().await;
		let before = admin.current_config().unwrap().version;

		let saved = admin
			.update_config(ForwardingConfig {
				enabled: false,
				destination: Some(Destination {
					host: "collector.internal".to_string(),
					port: 5170,
				}),
				..Default::default()
			})
			.await
			.unwrap();

		assert!(saved.version > before);
		let status = admin.status().await.unwrap();
		assert_eq!(status.config_version, saved.version);
	}

	#[tokio::test]
	async fn invalid_update_is_rejected_and_not_stored() {
		let admin = admin().await;
		let before = admin.current_config().unwrap();

		let err = admin
			.update_config(ForwardingConfig {
				enabled: true,
				destination: None,
				..Default::default()
			})
			.await
			.unwrap_err();

		assert!(matches!(err, ForwarderError::Config(ConfigError::Validation(_))));
		assert_eq!(admin.current_config().unwrap().version, before.version);
	}
}
