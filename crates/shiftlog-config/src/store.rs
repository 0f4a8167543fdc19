// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The administered store behind forwarding settings.
//!
//! The forwarder never reads configuration sources directly. It asks a
//! [`ForwardingConfigStore`] for the current snapshot at start and on every
//! reload, so the backing store can be swapped (in-memory for tests and
//! embedded use, file + environment for the server binary).

use std::path::PathBuf;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::layer::ShiftlogConfigLayer;
use crate::sections::{ForwardingConfig, TestResult};
use crate::sources::{ConfigSource, EnvSource, TomlSource};

pub trait ForwardingConfigStore: Send + Sync {
	/// Current snapshot. The returned `version` identifies it.
	fn load(&self) -> Result<ForwardingConfig, ConfigError>;

	/// Validate and persist `config`, returning the stored snapshot with its
	/// newly assigned version.
	fn save(&self, config: ForwardingConfig) -> Result<ForwardingConfig, ConfigError>;

	/// Attach the outcome of a manual connection test. Does not change the
	/// version; the result is informational.
	fn record_test_result(&self, result: TestResult) -> Result<(), ConfigError>;
}

/// Process-local store.
pub struct MemoryForwardingConfigStore {
	inner: RwLock<ForwardingConfig>,
}

impl MemoryForwardingConfigStore {
	pub fn new(mut initial: ForwardingConfig) -> Self {
		if initial.version == 0 {
			initial.version = 1;
		}
		Self {
			inner: RwLock::new(initial),
		}
	}
}

impl Default for MemoryForwardingConfigStore {
	fn default() -> Self {
		Self::new(ForwardingConfig::default())
	}
}

impl ForwardingConfigStore for MemoryForwardingConfigStore {
	fn load(&self) -> Result<ForwardingConfig, ConfigError> {
		Ok(self.inner.read().clone())
	}

	fn save(&self, mut config: ForwardingConfig) -> Result<ForwardingConfig, ConfigError> {
		config.validate()?;

		let mut guard = self.inner.write();
		config.version = guard.version + 1;
		if config.last_test_result.is_none() {
			config.last_test_result = guard.last_test_result.clone();
		}
		*guard = config.clone();

		info!(
			version = config.version,
			enabled = config.enabled,
			"forwarding configuration updated"
		);
		Ok(config)
	}

	fn record_test_result(&self, result: TestResult) -> Result<(), ConfigError> {
		self.inner.write().last_test_result = Some(result);
		Ok(())
	}
}

#[derive(Default)]
struct FileStoreState {
	version: u64,
	last: Option<ForwardingConfig>,
	last_test_result: Option<TestResult>,
}

/// Store backed by the TOML file and `SHIFTLOG_*` environment.
///
/// Every `load` re-reads both sources, so editing the file and sending a
/// reload picks up the change. The version only moves when the resolved
/// settings differ from the previous load. Writes are not supported; the
/// file is owned by the operator.
pub struct FileForwardingConfigStore {
	path: PathBuf,
	env: EnvSource,
	state: Mutex<FileStoreState>,
}

impl FileForwardingConfigStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self::with_env(path, EnvSource::default())
	}

	pub fn with_env(path: impl Into<PathBuf>, env: EnvSource) -> Self {
		Self {
			path: path.into(),
			env,
			state: Mutex::new(FileStoreState::default()),
		}
	}

	fn resolve(&self) -> Result<ForwardingConfig, ConfigError> {
		let mut merged = ShiftlogConfigLayer::default();
		merged.merge(TomlSource::new(self.path.clone()).load()?);
		merged.merge(self.env.load()?);
		merged.forwarding.unwrap_or_default().finalize()
	}
}

impl ForwardingConfigStore for FileForwardingConfigStore {
	fn load(&self) -> Result<ForwardingConfig, ConfigError> {
		let mut resolved = self.resolve()?;

		let mut state = self.state.lock();
		if state.last.as_ref() != Some(&resolved) {
			state.version += 1;
			state.last = Some(resolved.clone());
			debug!(version = state.version, path = %self.path.display(), "forwarding settings changed on disk");
		}

		resolved.version = state.version;
		resolved.last_test_result = state.last_test_result.clone();
		Ok(resolved)
	}

	fn save(&self, _config: ForwardingConfig) -> Result<ForwardingConfig, ConfigError> {
		Err(ConfigError::ReadOnly(format!(
			"edit {} and reload instead",
			self.path.display()
		)))
	}

	fn record_test_result(&self, result: TestResult) -> Result<(), ConfigError> {
		self.state.lock().last_test_result = Some(result);
		Ok(())
	}
}
