// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! TLS without peer verification must be called out on every load.

mod common;

use std::sync::{Arc, Mutex};

use common::*;
use shiftlog_config::{ForwardingConfig, ForwardingConfigStore, TlsOptions, TransportMode};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

#[derive(Clone, Default)]
struct WarnCapture {
	messages: Arc<Mutex<Vec<String>>>,
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
	fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
		if field.name() == "message" {
			self.0 = format!("{value:?}");
		}
	}
}

impl<S: Subscriber> Layer<S> for WarnCapture {
	fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
		if *event.metadata().level() == Level::WARN {
			let mut visitor = MessageVisitor(String::new());
			event.record(&mut visitor);
			self.messages.lock().unwrap().push(visitor.0);
		}
	}
}

impl WarnCapture {
	fn insecure_warnings(&self) -> usize {
		self.messages
			.lock()
			.unwrap()
			.iter()
			.filter(|m| m.contains("TLS peer verification is disabled"))
			.count()
	}
}

fn tls_config(port: u16, verify_peer: bool) -> ForwardingConfig {
	ForwardingConfig {
		enabled: false,
		transport_mode: TransportMode::Tls,
		tls: TlsOptions {
			verify_peer,
			..Default::default()
		},
		..forwarding_to(port, retry(true, 5))
	}
}

#[tokio::test]
async fn test_insecure_tls_warns_on_start_and_each_reload() {
	let capture = WarnCapture::default();
	let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

	let (forwarder, store) = start(tls_config(6514, false)).await;
	assert_eq!(capture.insecure_warnings(), 1);

	forwarder.reload_config().await.unwrap();
	assert_eq!(capture.insecure_warnings(), 2);

	store.save(tls_config(6514, true)).unwrap();
	forwarder.reload_config().await.unwrap();
	assert_eq!(capture.insecure_warnings(), 2);
}

#[tokio::test]
async fn test_verified_tls_does_not_warn() {
	let capture = WarnCapture::default();
	let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

	let (forwarder, _store) = start(tls_config(6514, true)).await;
	forwarder.reload_config().await.unwrap();
	assert_eq!(capture.insecure_warnings(), 0);
}
