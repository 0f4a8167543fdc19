// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redaction of sensitive fields before audit metadata is stored or sent.

use serde_json::{Map, Value};
use tracing::warn;

pub const REDACTED: &str = "[REDACTED]";

/// Key fragments whose values are never persisted. Matched as
/// case-insensitive substrings of the key name.
const SENSITIVE_KEYS: &[&str] = &[
	"password",
	"pass",
	"token",
	"secret",
	"key",
	"authorization",
	"jwt",
];

const MAX_DEPTH: usize = 128;

pub fn is_sensitive_key(key: &str) -> bool {
	let key_lower = key.to_lowercase();
	SENSITIVE_KEYS.iter().any(|&s| key_lower.contains(s))
}

/// Return a copy of `value` with every sensitive key's value replaced by
/// [`REDACTED`], at any nesting depth.
///
/// Input nested deeper than the walker allows is returned unchanged.
pub fn sanitize(value: &Value) -> Value {
	match sanitize_with_depth(value, 0) {
		Some(sanitized) => sanitized,
		None => {
			warn!(
				max_depth = MAX_DEPTH,
				"audit metadata nested too deeply to sanitize, passing through unchanged"
			);
			value.clone()
		}
	}
}

fn sanitize_with_depth(value: &Value, depth: usize) -> Option<Value> {
	if depth > MAX_DEPTH {
		return None;
	}

	match value {
		Value::Object(map) => {
			let mut sanitized = Map::with_capacity(map.len());
			for (key, val) in map {
				if is_sensitive_key(key) {
					sanitized.insert(key.clone(), Value::String(REDACTED.to_string()));
				} else {
					sanitized.insert(key.clone(), sanitize_with_depth(val, depth + 1)?);
				}
			}
			Some(Value::Object(sanitized))
		}
		Value::Array(items) => items
			.iter()
			.map(|v| sanitize_with_depth(v, depth + 1))
			.collect::<Option<Vec<_>>>()
			.map(Value::Array),
		_ => Some(value.clone()),
	}
}
