// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hosting for the shiftlog audit pipeline.

pub mod commands;
pub mod pipeline;
pub mod retention;
pub mod telemetry;
pub mod version;

pub use pipeline::{open_audit_store, Pipeline};
pub use retention::PurgeJob;
pub use telemetry::init_tracing;
