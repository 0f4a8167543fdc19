// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit record types.
//!
//! - [`AuditLevel`]: info < warn < error
//! - [`AuditRecord`]: one immutable security-relevant action
//! - [`AuditRecordBuilder`]: fluent construction of recorder input

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};

/// Default retention period for audit records in days.
pub const DEFAULT_AUDIT_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
	#[default]
	Info,
	Warn,
	Error,
}

impl AuditLevel {
	/// Numeric rank used by forwarding level floors.
	pub fn rank(&self) -> u8 {
		match self {
			AuditLevel::Info => 0,
			AuditLevel::Warn => 1,
			AuditLevel::Error => 2,
		}
	}

	pub fn all() -> &'static [AuditLevel] {
		&[AuditLevel::Info, AuditLevel::Warn, AuditLevel::Error]
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			AuditLevel::Info => "info",
			AuditLevel::Warn => "warn",
			AuditLevel::Error => "error",
		}
	}
}

impl PartialOrd for AuditLevel {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for AuditLevel {
	fn cmp(&self, other: &Self) -> Ordering {
		self.rank().cmp(&other.rank())
	}
}

impl fmt::Display for AuditLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for AuditLevel {
	type Err = AuditError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"info" => Ok(AuditLevel::Info),
			"warn" => Ok(AuditLevel::Warn),
			"error" => Ok(AuditLevel::Error),
			other => Err(AuditError::InvalidInput(format!("unknown audit level '{other}'"))),
		}
	}
}

/// The authenticated principal behind an action. Absent for system events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
	pub user_id: String,
	pub username: String,
	pub role: Option<String>,
	pub is_guest: bool,
}

impl Actor {
	pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
		Self {
			user_id: user_id.into(),
			username: username.into(),
			role: None,
			is_guest: false,
		}
	}

	pub fn role(mut self, role: impl Into<String>) -> Self {
		self.role = Some(role.into());
		self
	}

	pub fn guest(mut self) -> Self {
		self.is_guest = true;
		self
	}
}

/// Ambient call context of the request that triggered the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
	pub request_id: Option<String>,
	pub source_ip: Option<String>,
	pub user_agent: Option<String>,
	pub method: Option<String>,
	pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditOutcome {
	pub success: bool,
	pub reason: Option<String>,
	pub status_code: Option<u16>,
}

impl AuditOutcome {
	pub fn success() -> Self {
		Self {
			success: true,
			reason: None,
			status_code: None,
		}
	}

	pub fn failure(reason: impl Into<String>) -> Self {
		Self {
			success: false,
			reason: Some(reason.into()),
			status_code: None,
		}
	}

	pub fn status_code(mut self, code: u16) -> Self {
		self.status_code = Some(code);
		self
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
	pub id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub event: String,
	pub level: AuditLevel,
	pub actor: Option<Actor>,
	pub request: RequestContext,
	pub result: AuditOutcome,
	pub metadata: serde_json::Value,
}

impl AuditRecord {
	pub fn builder(event: impl Into<String>) -> AuditRecordBuilder {
		AuditRecordBuilder::new(event)
	}

	/// One newline-terminated JSON object, as written to the collector.
	pub fn to_ndjson_line(&self) -> Result<String, serde_json::Error> {
		let mut line = serde_json::to_string(self)?;
		line.push('\n');
		Ok(line)
	}
}

/// Recorder input. `build` validates and stamps id and timestamp; metadata
/// is taken as given (the recorder sanitizes it).
#[derive(Debug, Clone)]
pub struct AuditRecordBuilder {
	event: String,
	level: AuditLevel,
	actor: Option<Actor>,
	request: RequestContext,
	result: Option<AuditOutcome>,
	metadata: serde_json::Value,
}

impl AuditRecordBuilder {
	pub fn new(event: impl Into<String>) -> Self {
		Self {
			event: event.into(),
			level: AuditLevel::Info,
			actor: None,
			request: RequestContext::default(),
			result: None,
			metadata: serde_json::Value::Object(Default::default()),
		}
	}

	pub fn level(mut self, level: AuditLevel) -> Self {
		self.level = level;
		self
	}

	pub fn actor(mut self, actor: Actor) -> Self {
		self.actor = Some(actor);
		self
	}

	pub fn request(mut self, request: RequestContext) -> Self {
		self.request = request;
		self
	}

	pub fn result(mut self, result: AuditOutcome) -> Self {
		self.result = Some(result);
		self
	}

	pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
		self.metadata = metadata;
		self
	}

	pub fn event(&self) -> &str {
		&self.event
	}

	pub fn build(self) -> AuditResult<AuditRecord> {
		validate_event(&self.event)?;
		let result = self
			.result
			.ok_or_else(|| AuditError::InvalidInput(format!("event '{}' has no result", self.event)))?;

		Ok(AuditRecord {
			id: Uuid::new_v4(),
			timestamp: Utc::now(),
			event: self.event,
			level: self.level,
			actor: self.actor,
			request: self.request,
			result,
			metadata: self.metadata,
		})
	}
}

/// `<namespace>.<action>`, both parts non-empty, no whitespace.
pub fn validate_event(event: &str) -> AuditResult<()> {
	if event.is_empty() {
		return Err(AuditError::InvalidInput("event is required".to_string()));
	}
	if event.chars().any(char::is_whitespace) {
		return Err(AuditError::InvalidInput(format!(
			"event '{event}' must not contain whitespace"
		)));
	}
	match event.split_once('.') {
		Some((namespace, action)) if !namespace.is_empty() && !action.is_empty() => Ok(()),
		_ => Err(AuditError::InvalidInput(format!(
			"event '{event}' must be of the form <namespace>.<action>"
		))),
	}
}
