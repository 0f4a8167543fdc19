// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Build information for `shiftlog-server version`.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Format version info for display.
pub fn format_version_info() -> String {
	format!(
		"shiftlog-server version: {VERSION}\n\
		 Platform:                {}-{}\n\
		 Queue capacity:          {}",
		std::env::consts::OS,
		std::env::consts::ARCH,
		shiftlog_audit::FORWARD_QUEUE_CAPACITY,
	)
}
