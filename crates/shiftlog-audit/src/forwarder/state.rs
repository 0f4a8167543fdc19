// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Connection state owned by the forwarder task, and the status snapshot it
//! reports.

use serde::Serialize;
use shiftlog_config::TestResult;
use tokio::task::JoinHandle;

use super::transport::BoxedWriter;

/// What a disconnected forwarder is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryState {
	/// Nothing pending: forwarding disabled, or about to connect.
	Idle,
	/// A reconnect timer tagged with `generation` is running.
	Scheduled { generation: u64 },
	/// Retries used up or disabled. The next enqueue or reload re-arms.
	Exhausted,
}

/// A live collector connection.
pub(crate) struct Link {
	pub writer: BoxedWriter,
	pub conn_id: u64,
	pub peer: String,
	pub watcher: JoinHandle<()>,
}

impl Drop for Link {
	fn drop(&mut self) {
		self.watcher.abort();
	}
}

pub(crate) enum ConnectionState {
	Disconnected { retry: RetryState },
	/// A connect task tagged with `generation` is in flight. Results carrying
	/// any other generation are stale and discarded.
	Connecting { generation: u64 },
	Connected { link: Link },
	ShuttingDown,
}

impl ConnectionState {
	pub fn idle() -> Self {
		ConnectionState::Disconnected {
			retry: RetryState::Idle,
		}
	}

	pub fn phase(&self) -> ConnectionPhase {
		match self {
			ConnectionState::Disconnected { .. } => ConnectionPhase::Disconnected,
			ConnectionState::Connecting { .. } => ConnectionPhase::Connecting,
			ConnectionState::Connected { .. } => ConnectionPhase::Connected,
			ConnectionState::ShuttingDown => ConnectionPhase::ShuttingDown,
		}
	}

	pub fn is_dormant(&self) -> bool {
		matches!(
			self,
			ConnectionState::Disconnected {
				retry: RetryState::Exhausted
			}
		)
	}

	pub fn peer(&self) -> Option<&str> {
		match self {
			ConnectionState::Connected { link } => Some(link.peer.as_str()),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
	Disconnected,
	Connecting,
	Connected,
	ShuttingDown,
}

/// Point-in-time view of the forwarder for admin and status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ForwarderStatus {
	pub state: ConnectionPhase,
	/// Retries exhausted; nothing happens until the next enqueue or reload.
	pub dormant: bool,
	pub peer: Option<String>,
	pub queue_len: usize,
	pub queue_capacity: usize,
	/// Consecutive failed connects since the last success.
	pub attempts: u32,
	pub sent: u64,
	pub requeued: u64,
	pub dropped_overflow: u64,
	pub dropped_filtered: u64,
	pub dropped_mailbox: u64,
	pub config_version: u64,
	pub last_test_result: Option<TestResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
	pub flushed: usize,
	pub discarded: usize,
}
