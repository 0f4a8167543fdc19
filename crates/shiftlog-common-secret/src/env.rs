// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Loading secrets from the process environment.
//!
//! Supports the `VAR` / `VAR_FILE` convention: when `VAR_FILE` is set the
//! secret is read from that path (one trailing newline stripped), otherwise
//! `VAR` is used verbatim.

use std::path::PathBuf;
use std::{env, fs};

use thiserror::Error;

use crate::Secret;

#[derive(Debug, Error)]
pub enum SecretEnvError {
	#[error("failed to read secret file at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("secret file path in {var} is empty")]
	EmptyPath { var: String },
}

/// Load `var` (or the file named by `{var}_FILE`) as a secret.
///
/// Returns `Ok(None)` when neither variable is set. `{var}_FILE` wins when
/// both are present.
pub fn load_secret_env(var: &str) -> Result<Option<Secret<String>>, SecretEnvError> {
	let file_var = format!("{var}_FILE");

	if let Ok(path_str) = env::var(&file_var) {
		if path_str.is_empty() {
			return Err(SecretEnvError::EmptyPath { var: file_var });
		}

		let path = PathBuf::from(&path_str);
		let content = fs::read_to_string(&path).map_err(|source| SecretEnvError::Io {
			path: path.clone(),
			source,
		})?;

		let value = content.strip_suffix('\n').unwrap_or(&content).to_string();
		return Ok(Some(Secret::new(value)));
	}

	match env::var(var) {
		Ok(value) if !value.is_empty() => Ok(Some(Secret::new(value))),
		_ => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	#[test]
	fn returns_none_when_not_set() {
		let var = "SHIFTLOG_TEST_SECRET_UNSET";
		env::remove_var(var);
		env::remove_var(format!("{var}_FILE"));

		assert!(load_secret_env(var).unwrap().is_none());
	}

	#[test]
	fn reads_direct_value() {
		let var = "SHIFTLOG_TEST_SECRET_DIRECT";
		env::set_var(var, "inline-key");
		env::remove_var(format!("{var}_FILE"));

		assert_eq!(load_secret_env(var).unwrap().unwrap().expose(), "inline-key");
		env::remove_var(var);
	}

	#[test]
	fn file_var_takes_precedence_and_strips_newline() {
		let var = "SHIFTLOG_TEST_SECRET_FILE";
		let mut file = NamedTempFile::new().unwrap();
		writeln!(file, "file-key").unwrap();

		env::set_var(var, "inline-key");
		env::set_var(format!("{var}_FILE"), file.path().to_str().unwrap());

		assert_eq!(load_secret_env(var).unwrap().unwrap().expose(), "file-key");

		env::remove_var(var);
		env::remove_var(format!("{var}_FILE"));
	}

	#[test]
	fn missing_file_is_an_error() {
		let var = "SHIFTLOG_TEST_SECRET_MISSING";
		env::set_var(format!("{var}_FILE"), "/nonexistent/shiftlog/key.pem");

		let err = load_secret_env(var).unwrap_err();
		assert!(matches!(err, SecretEnvError::Io { .. }));

		env::remove_var(format!("{var}_FILE"));
	}

	#[test]
	fn empty_file_path_is_an_error() {
		let var = "SHIFTLOG_TEST_SECRET_EMPTY_PATH";
		env::set_var(format!("{var}_FILE"), "");

		let err = load_secret_env(var).unwrap_err();
		assert!(matches!(err, SecretEnvError::EmptyPath { .. }));

		env::remove_var(format!("{var}_FILE"));
	}
}
