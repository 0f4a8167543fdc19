// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Log forwarding configuration section.
//!
//! [`ForwardingConfig`] is the resolved snapshot consumed by the forwarder.
//! Snapshots are immutable; a configuration change produces a new snapshot
//! with a higher `version`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const MAX_RETRY_ATTEMPTS: u32 = 10;
pub const MIN_BASE_DELAY_MS: u64 = 100;
pub const MAX_BASE_DELAY_MS: u64 = 60_000;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
	#[default]
	Plain,
	Tls,
}

impl FromStr for TransportMode {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"plain" | "tcp" => Ok(TransportMode::Plain),
			"tls" => Ok(TransportMode::Tls),
			other => Err(ConfigError::InvalidValue {
				key: "transport_mode".to_string(),
				message: format!("expected 'plain' or 'tls', got '{other}'"),
			}),
		}
	}
}

impl fmt::Display for TransportMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransportMode::Plain => f.write_str("plain"),
			TransportMode::Tls => f.write_str("tls"),
		}
	}
}

/// Lowest record level the forwarder transmits.
///
/// `AuditOnly` forwards every record. The remaining variants are a numeric
/// floor over record levels (info=0 < warn=1 < error=2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ForwardLevel {
	#[default]
	AuditOnly,
	Info,
	Warn,
	Error,
}

impl ForwardLevel {
	/// Numeric floor, or `None` when every record passes.
	pub fn floor(&self) -> Option<u8> {
		match self {
			ForwardLevel::AuditOnly => None,
			ForwardLevel::Info => Some(0),
			ForwardLevel::Warn => Some(1),
			ForwardLevel::Error => Some(2),
		}
	}

	pub fn admits(&self, rank: u8) -> bool {
		self.floor().map_or(true, |floor| rank >= floor)
	}
}

impl FromStr for ForwardLevel {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"audit-only" | "audit_only" => Ok(ForwardLevel::AuditOnly),
			"info" => Ok(ForwardLevel::Info),
			"warn" | "warning" => Ok(ForwardLevel::Warn),
			"error" => Ok(ForwardLevel::Error),
			other => Err(ConfigError::InvalidValue {
				key: "minimum_level".to_string(),
				message: format!("expected one of audit-only, info, warn, error; got '{other}'"),
			}),
		}
	}
}

impl fmt::Display for ForwardLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ForwardLevel::AuditOnly => "audit-only",
			ForwardLevel::Info => "info",
			ForwardLevel::Warn => "warn",
			ForwardLevel::Error => "error",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
	pub host: String,
	pub port: u16,
}

impl Destination {
	pub fn address(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

/// TLS settings for the collector connection.
///
/// Certificate fields hold either inline PEM text or a filesystem path. The
/// client private key is never part of this struct; it is read from the
/// process environment at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOptions {
	pub verify_peer: bool,
	pub ca_certificate: Option<String>,
	pub client_certificate: Option<String>,
}

impl Default for TlsOptions {
	fn default() -> Self {
		Self {
			verify_peer: true,
			ca_certificate: None,
			client_certificate: None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
	pub enabled: bool,
	pub max_attempts: u32,
	pub base_delay_ms: u64,
	/// Scale each delay by a random factor in [0.5, 1.5).
	#[serde(default)]
	pub jitter: bool,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			enabled: true,
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			base_delay_ms: DEFAULT_BASE_DELAY_MS,
			jitter: false,
		}
	}
}

/// Outcome of the most recent manual connection test. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
	pub success: bool,
	pub message: String,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ForwardingConfig {
	/// Assigned by the config store; increases on every change.
	pub version: u64,
	pub enabled: bool,
	pub destination: Option<Destination>,
	pub transport_mode: TransportMode,
	pub tls: TlsOptions,
	pub retry: RetryPolicy,
	pub minimum_level: ForwardLevel,
	pub last_test_result: Option<TestResult>,
}

impl ForwardingConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.enabled {
			let destination = self.destination.as_ref().ok_or_else(|| {
				ConfigError::Validation("forwarding is enabled but no destination is set".to_string())
			})?;
			if destination.host.trim().is_empty() {
				return Err(ConfigError::Validation(
					"forwarding host must not be empty".to_string(),
				));
			}
		}

		if let Some(destination) = &self.destination {
			validate_port(u32::from(destination.port))?;
		}

		if self.retry.max_attempts > MAX_RETRY_ATTEMPTS {
			return Err(ConfigError::Validation(format!(
				"retry max_attempts must be between 0 and {MAX_RETRY_ATTEMPTS}, got {}",
				self.retry.max_attempts
			)));
		}

		if !(MIN_BASE_DELAY_MS..=MAX_BASE_DELAY_MS).contains(&self.retry.base_delay_ms) {
			return Err(ConfigError::Validation(format!(
				"retry base_delay_ms must be between {MIN_BASE_DELAY_MS} and {MAX_BASE_DELAY_MS}, got {}",
				self.retry.base_delay_ms
			)));
		}

		Ok(())
	}

	/// TLS transport with peer verification turned off.
	pub fn is_insecure_tls(&self) -> bool {
		self.transport_mode == TransportMode::Tls && !self.tls.verify_peer
	}

	pub fn address(&self) -> Option<String> {
		self.destination.as_ref().map(Destination::address)
	}
}

fn validate_port(port: u32) -> Result<u16, ConfigError> {
	match u16::try_from(port) {
		Ok(p) if p >= 1 => Ok(p),
		_ => Err(ConfigError::Validation(format!(
			"port must be between 1 and 65535, got {port}"
		))),
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ForwardingConfigLayer {
	pub enabled: Option<bool>,
	pub host: Option<String>,
	pub port: Option<u32>,
	pub transport_mode: Option<TransportMode>,
	pub tls_verify_peer: Option<bool>,
	pub tls_ca_certificate: Option<String>,
	pub tls_client_certificate: Option<String>,
	pub retry_enabled: Option<bool>,
	pub retry_max_attempts: Option<u32>,
	pub retry_base_delay_ms: Option<u64>,
	pub retry_jitter: Option<bool>,
	pub minimum_level: Option<ForwardLevel>,
}

impl ForwardingConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.transport_mode.is_some() {
			self.transport_mode = other.transport_mode;
		}
		if other.tls_verify_peer.is_some() {
			self.tls_verify_peer = other.tls_verify_peer;
		}
		if other.tls_ca_certificate.is_some() {
			self.tls_ca_certificate = other.tls_ca_certificate;
		}
		if other.tls_client_certificate.is_some() {
			self.tls_client_certificate = other.tls_client_certificate;
		}
		if other.retry_enabled.is_some() {
			self.retry_enabled = other.retry_enabled;
		}
		if other.retry_max_attempts.is_some() {
			self.retry_max_attempts = other.retry_max_attempts;
		}
		if other.retry_base_delay_ms.is_some() {
			self.retry_base_delay_ms = other.retry_base_delay_ms;
		}
		if other.retry_jitter.is_some() {
			self.retry_jitter = other.retry_jitter;
		}
		if other.minimum_level.is_some() {
			self.minimum_level = other.minimum_level;
		}
	}

	/// Resolve into a validated snapshot. `version` is left at zero for the
	/// store to assign.
	pub fn finalize(self) -> Result<ForwardingConfig, ConfigError> {
		let destination = match self.host {
			Some(host) => {
				let port = self.port.ok_or_else(|| {
					ConfigError::Validation("forwarding host is set but port is missing".to_string())
				})?;
				Some(Destination {
					host,
					port: validate_port(port)?,
				})
			}
			None => {
				if let Some(port) = self.port {
					validate_port(port)?;
				}
				None
			}
		};

		let defaults = RetryPolicy::default();
		let config = ForwardingConfig {
			version: 0,
			enabled: self.enabled.unwrap_or(false),
			destination,
			transport_mode: self.transport_mode.unwrap_or_default(),
			tls: TlsOptions {
				verify_peer: self.tls_verify_peer.unwrap_or(true),
				ca_certificate: self.tls_ca_certificate.filter(|s| !s.trim().is_empty()),
				client_certificate: self.tls_client_certificate.filter(|s| !s.trim().is_empty()),
			},
			retry: RetryPolicy {
				enabled: self.retry_enabled.unwrap_or(defaults.enabled),
				max_attempts: self.retry_max_attempts.unwrap_or(defaults.max_attempts),
				base_delay_ms: self.retry_base_delay_ms.unwrap_or(defaults.base_delay_ms),
				jitter: self.retry_jitter.unwrap_or(defaults.jitter),
			},
			minimum_level: self.minimum_level.unwrap_or_default(),
			last_test_result: None,
		};

		config.validate()?;
		Ok(config)
	}
}
