// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::VecDeque;

use tracing::warn;

/// Maximum payloads held while the collector is unreachable.
pub const FORWARD_QUEUE_CAPACITY: usize = 1000;

/// Drops are logged on the first one and then once per this many.
const OVERFLOW_LOG_EVERY: u64 = 100;

/// Bounded FIFO of serialized NDJSON lines. When full, the oldest line is
/// evicted to admit a new one.
#[derive(Debug)]
pub struct ForwardQueue {
	lines: VecDeque<String>,
	capacity: usize,
	dropped_overflow: u64,
}

impl Default for ForwardQueue {
	fn default() -> Self {
		Self::with_capacity(FORWARD_QUEUE_CAPACITY)
	}
}

impl ForwardQueue {
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			lines: VecDeque::with_capacity(capacity.min(FORWARD_QUEUE_CAPACITY)),
			capacity: capacity.max(1),
			dropped_overflow: 0,
		}
	}

	pub fn push_back(&mut self, line: String) {
		if self.lines.len() >= self.capacity {
			self.lines.pop_front();
			self.dropped_overflow += 1;
			if self.dropped_overflow == 1 || self.dropped_overflow % OVERFLOW_LOG_EVERY == 0 {
				warn!(
					capacity = self.capacity,
					dropped_total = self.dropped_overflow,
					"forward queue full, dropping oldest payload"
				);
			}
		}
		self.lines.push_back(line);
	}

	/// Return a payload whose write failed to the head of the queue. If the
	/// queue filled up meanwhile, the newest payload gives way.
	pub fn push_front(&mut self, line: String) {
		if self.lines.len() >= self.capacity {
			self.lines.pop_back();
			self.dropped_overflow += 1;
		}
		self.lines.push_front(line);
	}

	pub fn pop_front(&mut self) -> Option<String> {
		self.lines.pop_front()
	}

	/// Remove everything, returning how many payloads were discarded.
	pub fn clear(&mut self) -> usize {
		let n = self.lines.len();
		self.lines.clear();
		n
	}

	pub fn len(&self) -> usize {
		self.lines.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lines.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn dropped_overflow(&self) -> u64 {
		self.dropped_overflow
	}

	pub fn iter(&self) -> impl Iterator<Item = &String> {
		self.lines.iter()
	}
}
