// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for the shiftlog server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`SHIFTLOG_*`)
//! - The administered [`ForwardingConfigStore`] read on every forwarder reload
//!
//! # Usage
//!
//! ```ignore
//! use shiftlog_config::load_config;
//!
//! let config = load_config()?;
//! println!("forwarding to {:?}", config.forwarding.address());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;
pub mod store;

pub use error::ConfigError;
pub use layer::ShiftlogConfigLayer;
pub use sections::*;
pub use sources::{
	ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource, DEFAULT_CONFIG_PATH,
};
pub use store::{FileForwardingConfigStore, ForwardingConfigStore, MemoryForwardingConfigStore};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ShiftlogConfig {
	pub forwarding: ForwardingConfig,
	pub audit: AuditConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`SHIFTLOG_*`)
/// 2. Config file (`/etc/shiftlog/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ShiftlogConfig, ConfigError> {
	load_config_with_file(DEFAULT_CONFIG_PATH)
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<ShiftlogConfig, ConfigError> {
	let mut merged = ShiftlogConfigLayer::default();
	merged.merge(EnvSource::default().load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ShiftlogConfig, ConfigError> {
	load_config_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource::default()),
	])
}

pub fn load_config_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<ShiftlogConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ShiftlogConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: ShiftlogConfigLayer) -> Result<ShiftlogConfig, ConfigError> {
	let forwarding = layer.forwarding.unwrap_or_default().finalize()?;
	let audit = layer.audit.unwrap_or_default().finalize()?;
	let logging = layer.logging.unwrap_or_default().finalize();
	let destination = forwarding.address().unwrap_or_else(|| "-".to_string());
	let audit_store = if audit.database_url.is_some() {
		"sqlite"
	} else {
		"memory"
	};

	info!(
		forwarding_enabled = forwarding.enabled,
		forwarding_destination = %destination,
		transport = %forwarding.transport_mode,
		minimum_level = %forwarding.minimum_level,
		audit_store,
		retention_days = audit.retention_days,
		"Server configuration loaded"
	);

	Ok(ShiftlogConfig {
		forwarding,
		audit,
		logging,
	})
}
