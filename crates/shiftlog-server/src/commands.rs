// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One-shot CLI subcommands that work on the forwarding settings.

use shiftlog_audit::log_config_loaded;
use shiftlog_config::{ForwardingConfig, ForwardingConfigStore, TestResult};

/// Load and validate the forwarding settings, logging them the same way the
/// running forwarder does.
pub fn load_forwarding(store: &dyn ForwardingConfigStore) -> anyhow::Result<ForwardingConfig> {
	let config = store.load()?;
	config.validate()?;
	log_config_loaded(&config);
	Ok(config)
}

pub fn check_config(store: &dyn ForwardingConfigStore) -> anyhow::Result<ForwardingConfig> {
	load_forwarding(store)
}

/// Send one synthetic record to the configured collector.
pub async fn test_connection(store: &dyn ForwardingConfigStore) -> anyhow::Result<TestResult> {
	let config = load_forwarding(store)?;
	if config.destination.is_none() {
		anyhow::bail!("no forwarding destination configured");
	}
	Ok(shiftlog_audit::forwarder::test_connection(&config).await)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};

	use shiftlog_config::{Destination, MemoryForwardingConfigStore, TlsOptions, TransportMode};
	use tokio::net::TcpListener;
	use tracing::{Event, Level, Subscriber};
	use tracing_subscriber::layer::{Context, Layer};
	use tracing_subscriber::prelude::*;

	#[derive(Clone, Default)]
	struct WarnCount(Arc<Mutex<usize>>);

	impl<S: Subscriber> Layer<S> for WarnCount {
		fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
			if *event.metadata().level() == Level::WARN {
				*self.0.lock().unwrap() += 1;
			}
		}
	}

	impl WarnCount {
		fn get(&self) -> usize {
			*self.0.lock().unwrap()
		}
	}

	fn insecure_tls(port: u16) -> MemoryForwardingConfigStore {
		MemoryForwardingConfigStore::new(ForwardingConfig {
			enabled: true,
			destination: Some(Destination {
				host: "127.0.0.1".to_string(),
				port,
			}),
			transport_mode: TransportMode::Tls,
			tls: TlsOptions {
				verify_peer: false,
				..Default::default()
			},
			..Default::default()
		})
	}

	async fn unused_port() -> u16 {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		listener.local_addr().unwrap().port()
	}

	#[test]
	fn check_config_warns_on_insecure_tls() {
		let warnings = WarnCount::default();
		let _guard =
			tracing::subscriber::set_default(tracing_subscriber::registry().with(warnings.clone()));

		let config = check_config(&insecure_tls(6514)).unwrap();
		assert!(config.is_insecure_tls());
		assert_eq!(warnings.get(), 1);
	}

	#[tokio::test]
	async fn test_connection_warns_on_insecure_tls() {
		let warnings = WarnCount::default();
		let _guard =
			tracing::subscriber::set_default(tracing_subscriber::registry().with(warnings.clone()));

		let result = test_connection(&insecure_tls(unused_port().await)).await.unwrap();
		assert!(!result.success);
		assert!(warnings.get() >= 1);
	}

	#[tokio::test]
	async fn test_connection_requires_destination() {
		let store = MemoryForwardingConfigStore::new(ForwardingConfig::default());
		assert!(test_connection(&store).await.is_err());
	}
}
