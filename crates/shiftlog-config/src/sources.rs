// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ShiftlogConfigLayer;
use crate::sections::{AuditConfigLayer, ForwardingConfigLayer, LoggingConfigLayer};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/shiftlog/server.toml";
pub const DEFAULT_ENV_PREFIX: &str = "SHIFTLOG";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ShiftlogConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ShiftlogConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ShiftlogConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file yields an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(DEFAULT_CONFIG_PATH)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ShiftlogConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ShiftlogConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ShiftlogConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `<PREFIX>_<SECTION>_<FIELD>`, prefix `SHIFTLOG` by default.
pub struct EnvSource {
	prefix: String,
}

impl Default for EnvSource {
	fn default() -> Self {
		Self::with_prefix(DEFAULT_ENV_PREFIX)
	}
}

impl EnvSource {
	pub fn with_prefix(prefix: impl Into<String>) -> Self {
		Self {
			prefix: prefix.into(),
		}
	}

	fn key(&self, suffix: &str) -> String {
		format!("{}_{suffix}", self.prefix)
	}

	fn load_forwarding(&self) -> Result<ForwardingConfigLayer, ConfigError> {
		Ok(ForwardingConfigLayer {
			enabled: env_bool(&self.key("FORWARDING_ENABLED")),
			host: env_var(&self.key("FORWARDING_HOST")),
			port: env_parse(&self.key("FORWARDING_PORT"))?,
			transport_mode: env_parse(&self.key("FORWARDING_TRANSPORT"))?,
			tls_verify_peer: env_bool(&self.key("FORWARDING_TLS_VERIFY_PEER")),
			tls_ca_certificate: env_var(&self.key("FORWARDING_TLS_CA_CERT")),
			tls_client_certificate: env_var(&self.key("FORWARDING_TLS_CLIENT_CERT")),
			retry_enabled: env_bool(&self.key("FORWARDING_RETRY_ENABLED")),
			retry_max_attempts: env_parse(&self.key("FORWARDING_RETRY_MAX_ATTEMPTS"))?,
			retry_base_delay_ms: env_parse(&self.key("FORWARDING_RETRY_BASE_DELAY_MS"))?,
			retry_jitter: env_bool(&self.key("FORWARDING_RETRY_JITTER")),
			minimum_level: env_parse(&self.key("FORWARDING_MIN_LEVEL"))?,
		})
	}

	fn load_audit(&self) -> Result<AuditConfigLayer, ConfigError> {
		Ok(AuditConfigLayer {
			database_url: env_var(&self.key("AUDIT_DATABASE_URL")),
			retention_days: env_parse(&self.key("AUDIT_RETENTION_DAYS"))?,
			purge_interval_secs: env_parse(&self.key("AUDIT_PURGE_INTERVAL_SECS"))?,
		})
	}

	fn load_logging(&self) -> Result<LoggingConfigLayer, ConfigError> {
		Ok(LoggingConfigLayer {
			level: env_var(&self.key("LOG_LEVEL")),
			format: env_parse(&self.key("LOG_FORMAT"))?,
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ShiftlogConfigLayer, ConfigError> {
		debug!(prefix = %self.prefix, "loading environment variables");
		Ok(ShiftlogConfigLayer {
			forwarding: Some(self.load_forwarding()?),
			audit: Some(self.load_audit()?),
			logging: Some(self.load_logging()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

/// Parse an env var with `FromStr`. Unparseable values are an error rather
/// than silently ignored.
fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
	T: FromStr,
	T::Err: std::fmt::Display,
{
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid value '{v}': {e}"),
		}),
		None => Ok(None),
	}
}
