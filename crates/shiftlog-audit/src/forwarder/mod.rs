// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Best-effort streaming of audit records to an external collector.
//!
//! A single task owns the connection, the [`ForwardQueue`] and the reconnect
//! state. Every interaction goes through its bounded mailbox, so queue
//! mutations never interleave. [`LogForwarder`] is the cloneable handle.
//!
//! ```text
//! Disconnected ──arm──▶ Connecting ──ok──▶ Connected
//!      ▲                    │                  │
//!      └──── backoff ◀──fail┘◀── write error ──┘
//! ```

pub mod backoff;
pub mod probe;
pub mod queue;
pub mod state;
#[cfg(feature = "tls")]
pub mod tls;
pub mod transport;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use shiftlog_config::{ForwardingConfig, ForwardingConfigStore, TestResult};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::error::{ForwarderError, TransportError};
use crate::record::AuditRecord;
use crate::recorder::AuditForwarder;

pub use backoff::{delay_for, Backoff};
pub use probe::{test_connection, TEST_TIMEOUT};
pub use queue::{ForwardQueue, FORWARD_QUEUE_CAPACITY};
pub use state::{ConnectionPhase, ForwarderStatus, ShutdownReport};

use state::{ConnectionState, Link, RetryState};
use transport::Connection;

/// Capacity of the forwarder task's mailbox.
pub const MAILBOX_CAPACITY: usize = 4096;

/// Default time allowed for the final flush on shutdown.
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(3);

const MAILBOX_DROP_LOG_EVERY: u64 = 100;

enum Command {
	Enqueue(Arc<AuditRecord>),
	ConnectFinished {
		generation: u64,
		result: Result<Connection, TransportError>,
	},
	RetryTimer {
		generation: u64,
	},
	ConnectionLost {
		conn_id: u64,
		error: TransportError,
	},
	Status {
		reply: oneshot::Sender<ForwarderStatus>,
	},
	Reload {
		reply: oneshot::Sender<Result<u64, ForwarderError>>,
	},
	Shutdown {
		deadline: Duration,
		reply: oneshot::Sender<ShutdownReport>,
	},
}

type SharedConfig = Arc<RwLock<Arc<ForwardingConfig>>>;

/// Handle to the forwarder task.
#[derive(Clone)]
pub struct LogForwarder {
	tx: mpsc::Sender<Command>,
	store: Arc<dyn ForwardingConfigStore>,
	config: SharedConfig,
	dropped_mailbox: Arc<AtomicU64>,
	last_test: Arc<Mutex<Option<TestResult>>>,
}

async fn load_from_store(
	store: &Arc<dyn ForwardingConfigStore>,
) -> Result<ForwardingConfig, ForwarderError> {
	let store = Arc::clone(store);
	tokio::task::spawn_blocking(move || store.load())
		.await
		.map_err(|_| ForwarderError::Stopped)?
		.map_err(ForwarderError::Config)
}

/// Log a loaded forwarding configuration, warning when TLS peer
/// verification is off. Call on every load, not just at startup.
pub fn log_config_loaded(config: &ForwardingConfig) {
	let destination = config.address().unwrap_or_else(|| "-".to_string());
	info!(
		version = config.version,
		enabled = config.enabled,
		destination = %destination,
		transport = %config.transport_mode,
		minimum_level = %config.minimum_level,
		retry_enabled = config.retry.enabled,
		max_attempts = config.retry.max_attempts,
		base_delay_ms = config.retry.base_delay_ms,
		"forwarding configuration loaded"
	);

	if config.is_insecure_tls() {
		warn!(
			destination = %destination,
			"TLS peer verification is disabled for log forwarding; the collector is not authenticated. Do not use outside non-production environments"
		);
	}
}

impl LogForwarder {
	/// Load the current settings from `store` and spawn the forwarder task.
	/// Connects immediately when forwarding is enabled.
	pub async fn start(store: Arc<dyn ForwardingConfigStore>) -> Result<Self, ForwarderError> {
		let config = load_from_store(&store).await?;
		log_config_loaded(&config);

		let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
		let config: SharedConfig = Arc::new(RwLock::new(Arc::new(config)));
		let dropped_mailbox = Arc::new(AtomicU64::new(0));
		let last_test = Arc::new(Mutex::new(None));

		let actor = Actor {
			rx,
			self_tx: tx.downgrade(),
			store: Arc::clone(&store),
			config: Arc::clone(&config),
			dropped_mailbox: Arc::clone(&dropped_mailbox),
			state: ConnectionState::idle(),
			queue: ForwardQueue::default(),
			backoff: Backoff::new(config.read().retry),
			generation: 0,
			conn_seq: 0,
			sent: 0,
			requeued: 0,
			dropped_filtered: 0,
		};
		tokio::spawn(actor.run());

		Ok(Self {
			tx,
			store,
			config,
			dropped_mailbox,
			last_test,
		})
	}

	/// Hand a stored record to the forwarder. Never waits: if the mailbox is
	/// full the record is dropped and counted.
	pub fn enqueue(&self, record: Arc<AuditRecord>) {
		match self.tx.try_send(Command::Enqueue(record)) {
			Ok(()) => {}
			Err(TrySendError::Full(_)) => {
				let dropped = self.dropped_mailbox.fetch_add(1, Ordering::Relaxed) + 1;
				if dropped == 1 || dropped % MAILBOX_DROP_LOG_EVERY == 0 {
					warn!(
						dropped_total = dropped,
						capacity = MAILBOX_CAPACITY,
						"forwarder mailbox full, dropping audit record"
					);
				}
			}
			Err(TrySendError::Closed(_)) => {
				trace!("forwarder stopped, audit record not forwarded");
			}
		}
	}

	/// The snapshot currently driving forwarding decisions.
	pub fn current_config(&self) -> Arc<ForwardingConfig> {
		Arc::clone(&self.config.read())
	}

	pub async fn status(&self) -> Result<ForwarderStatus, ForwarderError> {
		let (reply, rx) = oneshot::channel();
		self.tx
			.send(Command::Status { reply })
			.await
			.map_err(|_| ForwarderError::Stopped)?;
		let mut status = rx.await.map_err(|_| ForwarderError::Stopped)?;
		if let Some(result) = self.last_test.lock().clone() {
			status.last_test_result = Some(result);
		}
		Ok(status)
	}

	/// Tear down any live connection, reload settings from the store and
	/// re-arm. Queued payloads are kept. Returns the loaded config version.
	pub async fn reload_config(&self) -> Result<u64, ForwarderError> {
		let (reply, rx) = oneshot::channel();
		self.tx
			.send(Command::Reload { reply })
			.await
			.map_err(|_| ForwarderError::Stopped)?;
		rx.await.map_err(|_| ForwarderError::Stopped)?
	}

	/// Run a connection test against the current settings without touching
	/// the live connection or queue. The result is recorded in the store.
	pub async fn test_connection(&self) -> TestResult {
		let config = self.current_config();
		let result = probe::test_connection(&config).await;

		*self.last_test.lock() = Some(result.clone());
		if let Err(e) = self.store.record_test_result(result.clone()) {
			warn!(error = %e, "failed to record connection test result");
		}
		result
	}

	/// Try to flush the queue within `deadline`, then discard what is left
	/// and stop the task.
	pub async fn shutdown(&self, deadline: Duration) -> Result<ShutdownReport, ForwarderError> {
		let (reply, rx) = oneshot::channel();
		self.tx
			.send(Command::Shutdown { deadline, reply })
			.await
			.map_err(|_| ForwarderError::Stopped)?;
		rx.await.map_err(|_| ForwarderError::Stopped)
	}

	pub fn store(&self) -> &Arc<dyn ForwardingConfigStore> {
		&self.store
	}
}

impl AuditForwarder for LogForwarder {
	fn enqueue(&self, record: Arc<AuditRecord>) {
		LogForwarder::enqueue(self, record);
	}
}

struct Actor {
	rx: mpsc::Receiver<Command>,
	self_tx: mpsc::WeakSender<Command>,
	store: Arc<dyn ForwardingConfigStore>,
	config: SharedConfig,
	dropped_mailbox: Arc<AtomicU64>,
	state: ConnectionState,
	queue: ForwardQueue,
	backoff: Backoff,
	/// Bumped whenever pending connects and timers must be invalidated.
	generation: u64,
	conn_seq: u64,
	sent: u64,
	requeued: u64,
	dropped_filtered: u64,
}

impl Actor {
	async fn run(mut self) {
		self.arm_if_enabled();

		while let Some(command) = self.rx.recv().await {
			match command {
				Command::Enqueue(record) => self.handle_enqueue(&record).await,
				Command::ConnectFinished { generation, result } => {
					self.handle_connect_finished(generation, result).await
				}
				Command::RetryTimer { generation } => self.handle_retry_timer(generation),
				Command::ConnectionLost { conn_id, error } => {
					self.handle_connection_lost(conn_id, error)
				}
				Command::Status { reply } => {
					let _ = reply.send(self.status());
				}
				Command::Reload { reply } => {
					let result = self.handle_reload().await;
					let _ = reply.send(result);
				}
				Command::Shutdown { deadline, reply } => {
					let report = self.handle_shutdown(deadline).await;
					let _ = reply.send(report);
					break;
				}
			}
		}

		debug!("log forwarder task stopped");
	}

	fn current(&self) -> Arc<ForwardingConfig> {
		Arc::clone(&self.config.read())
	}

	fn status(&self) -> ForwarderStatus {
		let config = self.current();
		ForwarderStatus {
			state: self.state.phase(),
			dormant: self.state.is_dormant(),
			peer: self.state.peer().map(str::to_string),
			queue_len: self.queue.len(),
			queue_capacity: self.queue.capacity(),
			attempts: self.backoff.attempts(),
			sent: self.sent,
			requeued: self.requeued,
			dropped_overflow: self.queue.dropped_overflow(),
			dropped_filtered: self.dropped_filtered,
			dropped_mailbox: self.dropped_mailbox.load(Ordering::Relaxed),
			config_version: config.version,
			last_test_result: config.last_test_result.clone(),
		}
	}

	async fn handle_enqueue(&mut self, record: &AuditRecord) {
		let config = self.current();
		if !config.enabled || !config.minimum_level.admits(record.level.rank()) {
			self.dropped_filtered += 1;
			trace!(event = %record.event, level = %record.level, "audit record not forwarded");
			return;
		}

		let line = match record.to_ndjson_line() {
			Ok(line) => line,
			Err(e) => {
				warn!(id = %record.id, error = %e, "failed to serialize audit record for forwarding");
				return;
			}
		};
		self.queue.push_back(line);

		let needs_arm = matches!(
			self.state,
			ConnectionState::Disconnected {
				retry: RetryState::Exhausted | RetryState::Idle,
			}
		);
		if matches!(self.state, ConnectionState::Connected { .. }) {
			self.flush().await;
		} else if needs_arm {
			if self.state.is_dormant() {
				info!(queued = self.queue.len(), "new audit record, re-arming log forwarder");
			}
			self.backoff.reset();
			self.arm_connect();
		}
	}

	fn arm_if_enabled(&mut self) {
		let config = self.current();
		if config.enabled && config.destination.is_some() {
			self.arm_connect();
		} else {
			self.state = ConnectionState::idle();
		}
	}

	fn arm_connect(&mut self) {
		let config = self.current();
		self.generation += 1;
		let generation = self.generation;
		self.state = ConnectionState::Connecting { generation };

		let destination = config.address().unwrap_or_default();
		debug!(generation, destination = %destination, "connecting to log collector");

		let tx = self.self_tx.clone();
		tokio::spawn(async move {
			let result = transport::connect(&config).await;
			if let Some(tx) = tx.upgrade() {
				let _ = tx.send(Command::ConnectFinished { generation, result }).await;
			}
		});
	}

	async fn handle_connect_finished(
		&mut self,
		generation: u64,
		result: Result<Connection, TransportError>,
	) {
		let current = matches!(
			self.state,
			ConnectionState::Connecting { generation: g } if g == generation
		);
		if !current {
			debug!(generation, "discarding stale connection attempt");
			return;
		}

		match result {
			Ok(conn) => {
				self.backoff.reset();
				info!(peer = %conn.peer, queued = self.queue.len(), "connected to log collector");
				self.install_link(conn);
				self.flush().await;
			}
			Err(e) => {
				warn!(
					error = %e,
					attempt = self.backoff.attempts() + 1,
					"log collector connection failed"
				);
				self.state = ConnectionState::idle();
				self.schedule_retry();
			}
		}
	}

	fn install_link(&mut self, conn: Connection) {
		self.conn_seq += 1;
		let conn_id = self.conn_seq;

		let tx = self.self_tx.clone();
		let watcher = tokio::spawn(async move {
			let error = transport::watch_for_close(conn.reader).await;
			if let Some(tx) = tx.upgrade() {
				let _ = tx.send(Command::ConnectionLost { conn_id, error }).await;
			}
		});

		self.state = ConnectionState::Connected {
			link: Link {
				writer: conn.writer,
				conn_id,
				peer: conn.peer,
				watcher,
			},
		};
	}

	fn schedule_retry(&mut self) {
		match self.backoff.next_delay() {
			Some(delay) => {
				self.generation += 1;
				let generation = self.generation;
				self.state = ConnectionState::Disconnected {
					retry: RetryState::Scheduled { generation },
				};
				info!(
					attempt = self.backoff.attempts(),
					delay_ms = delay.as_millis() as u64,
					queued = self.queue.len(),
					"scheduling log collector reconnect"
				);

				let tx = self.self_tx.clone();
				tokio::spawn(async move {
					sleep(delay).await;
					if let Some(tx) = tx.upgrade() {
						let _ = tx.send(Command::RetryTimer { generation }).await;
					}
				});
			}
			None => {
				self.state = ConnectionState::Disconnected {
					retry: RetryState::Exhausted,
				};
				if self.backoff.policy().enabled {
					error!(
						attempts = self.backoff.attempts(),
						queued = self.queue.len(),
						"log collector retries exhausted; forwarding dormant until the next record or reload"
					);
				} else {
					warn!(
						queued = self.queue.len(),
						"log collector unreachable and retry is disabled; forwarding dormant until the next record or reload"
					);
				}
			}
		}
	}

	fn handle_retry_timer(&mut self, generation: u64) {
		let due = matches!(
			self.state,
			ConnectionState::Disconnected {
				retry: RetryState::Scheduled { generation: g }
			} if g == generation
		);
		if due {
			self.arm_connect();
		}
	}

	fn handle_connection_lost(&mut self, conn_id: u64, error: TransportError) {
		let current = matches!(
			&self.state,
			ConnectionState::Connected { link } if link.conn_id == conn_id
		);
		if !current {
			return;
		}

		warn!(error = %error, queued = self.queue.len(), "log collector connection lost");
		self.state = ConnectionState::idle();
		self.schedule_retry();
	}

	/// Write queued payloads in order while connected. A failed write puts
	/// its payload back at the head and drops the connection.
	async fn flush(&mut self) {
		while let ConnectionState::Connected { link } = &mut self.state {
			let Some(line) = self.queue.pop_front() else {
				break;
			};

			match transport::write_line(&mut link.writer, &line).await {
				Ok(()) => self.sent += 1,
				Err(e) => {
					self.queue.push_front(line);
					self.requeued += 1;
					warn!(
						error = %e,
						queued = self.queue.len(),
						"write to log collector failed, payload requeued"
					);
					self.state = ConnectionState::idle();
					self.schedule_retry();
					break;
				}
			}
		}
	}

	fn teardown(&mut self) {
		self.generation += 1;
		let previous = std::mem::replace(&mut self.state, ConnectionState::idle());
		if let ConnectionState::Connected { link } = previous {
			info!(peer = %link.peer, "closing log collector connection");
		}
	}

	async fn handle_reload(&mut self) -> Result<u64, ForwarderError> {
		self.teardown();

		let result = match load_from_store(&self.store).await {
			Ok(config) => {
				log_config_loaded(&config);
				let version = config.version;
				self.backoff = Backoff::new(config.retry);

				if !config.enabled {
					let discarded = self.queue.clear();
					if discarded > 0 {
						info!(discarded, "forwarding disabled, queued payloads discarded");
					}
				}

				*self.config.write() = Arc::new(config);
				Ok(version)
			}
			Err(e) => {
				error!(error = %e, "forwarding configuration reload failed, keeping previous settings");
				self.backoff.reset();
				Err(e)
			}
		};

		self.arm_if_enabled();
		result
	}

	async fn handle_shutdown(&mut self, deadline: Duration) -> ShutdownReport {
		let deadline_at = Instant::now() + deadline;
		self.generation += 1;

		let queued = self.queue.len();
		let config = self.current();
		let sent_before = self.sent;

		if queued > 0 && config.enabled {
			if !matches!(self.state, ConnectionState::Connected { .. }) {
				match timeout_at(deadline_at, transport::connect(&config)).await {
					Ok(Ok(conn)) => self.install_link(conn),
					Ok(Err(e)) => debug!(error = %e, "final flush connect failed"),
					Err(_) => debug!("final flush connect timed out"),
				}
			}

			if timeout_at(deadline_at, self.drain_for_shutdown()).await.is_err() {
				debug!("final flush hit the shutdown deadline");
			}
		}

		if let ConnectionState::Connected { link } = &mut self.state {
			let _ = timeout(Duration::from_millis(250), link.writer.shutdown()).await;
		}

		let flushed = (self.sent - sent_before) as usize;
		let discarded = queued.saturating_sub(flushed);
		self.queue.clear();
		self.state = ConnectionState::ShuttingDown;

		info!(flushed, discarded, "log forwarder shut down");
		ShutdownReport { flushed, discarded }
	}

	async fn drain_for_shutdown(&mut self) {
		let ConnectionState::Connected { link } = &mut self.state else {
			return;
		};
		while let Some(line) = self.queue.pop_front() {
			if let Err(e) = transport::write_line(&mut link.writer, &line).await {
				warn!(error = %e, "final flush write failed");
				return;
			}
			self.sent += 1;
		}
	}
}
