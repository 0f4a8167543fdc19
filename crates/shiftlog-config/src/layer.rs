// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::sections::{AuditConfigLayer, ForwardingConfigLayer, LoggingConfigLayer};

/// One partially-specified configuration, as produced by a single source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ShiftlogConfigLayer {
	pub forwarding: Option<ForwardingConfigLayer>,
	pub audit: Option<AuditConfigLayer>,
	pub logging: Option<LoggingConfigLayer>,
}

impl ShiftlogConfigLayer {
	/// Overlay `other` on top of `self`; fields set in `other` win.
	pub fn merge(&mut self, other: Self) {
		merge_section(&mut self.forwarding, other.forwarding, ForwardingConfigLayer::merge);
		merge_section(&mut self.audit, other.audit, AuditConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(existing), Some(incoming)) => merge(existing, incoming),
		(None, Some(incoming)) => *base = Some(incoming),
		(_, None) => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn merge_overlays_only_set_fields() {
		let mut base = ShiftlogConfigLayer {
			forwarding: Some(ForwardingConfigLayer {
				host: Some("siem.internal".to_string()),
				port: Some(6514),
				..Default::default()
			}),
			..Default::default()
		};

		base.merge(ShiftlogConfigLayer {
			forwarding: Some(ForwardingConfigLayer {
				port: Some(5140),
				..Default::default()
			}),
			..Default::default()
		});

		let forwarding = base.forwarding.unwrap();
		assert_eq!(forwarding.host.as_deref(), Some("siem.internal"));
		assert_eq!(forwarding.port, Some(5140));
	}

	#[test]
	fn merge_fills_missing_sections() {
		let mut base = ShiftlogConfigLayer::default();
		base.merge(ShiftlogConfigLayer {
			logging: Some(LoggingConfigLayer {
				level: Some("debug".to_string()),
				format: None,
			}),
			..Default::default()
		});
		assert_eq!(
			base.logging.unwrap().level.as_deref(),
			Some("debug")
		);
	}
}
