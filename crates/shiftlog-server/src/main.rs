// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! shiftlog-server: hosts the audit pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use shiftlog_config::{
	FileForwardingConfigStore, ForwardingConfigStore, ShiftlogConfig, DEFAULT_CONFIG_PATH,
};
use shiftlog_server::{commands, init_tracing, open_audit_store, version, Pipeline};

/// Shiftlog server - immutable audit trail with log forwarding.
#[derive(Parser, Debug)]
#[command(name = "shiftlog-server", about = "Shiftlog audit pipeline server", version)]
struct Args {
	/// Path to the TOML configuration file
	#[arg(long, short, env = "SHIFTLOG_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
	config: PathBuf,

	/// Seconds allowed for the final forwarder flush on shutdown
	#[arg(long, default_value_t = 3)]
	shutdown_deadline_secs: u64,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the audit pipeline (default)
	Run,
	/// Send one test record to the configured collector and exit
	TestConnection,
	/// Load and validate configuration, then print the forwarding settings
	CheckConfig,
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = shiftlog_config::load_config_with_file(&args.config)
		.with_context(|| format!("failed to load configuration from {}", args.config.display()))?;
	init_tracing(&config.logging);

	let forwarding: Arc<dyn ForwardingConfigStore> =
		Arc::new(FileForwardingConfigStore::new(&args.config));

	match args.command.unwrap_or(Command::Run) {
		Command::Run => run(config, forwarding, Duration::from_secs(args.shutdown_deadline_secs)).await,
		Command::TestConnection => test_connection(forwarding.as_ref()).await,
		Command::CheckConfig => check_config(forwarding.as_ref()),
		Command::Version => Ok(()),
	}
}

async fn run(
	config: ShiftlogConfig,
	forwarding: Arc<dyn ForwardingConfigStore>,
	deadline: Duration,
) -> anyhow::Result<()> {
	tracing::info!(version = version::VERSION, "starting shiftlog-server");

	let store = open_audit_store(&config.audit).await?;
	let pipeline = Pipeline::start(&config, store, forwarding).await?;

	wait_for_shutdown(&pipeline).await?;

	tracing::info!("received shutdown signal");
	pipeline.shutdown(deadline).await?;
	tracing::info!("server shutdown complete");
	Ok(())
}

/// Block until Ctrl-C or SIGTERM, reloading forwarding settings on SIGHUP.
#[cfg(unix)]
async fn wait_for_shutdown(pipeline: &Pipeline) -> anyhow::Result<()> {
	use tokio::signal::unix::{signal, SignalKind};

	let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
	let mut terminate =
		signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

	loop {
		tokio::select! {
			_ = hangup.recv() => {
				tracing::info!("SIGHUP received, reloading forwarding configuration");
				pipeline.reload().await;
			}
			_ = terminate.recv() => return Ok(()),
			result = tokio::signal::ctrl_c() => {
				return result.context("failed to listen for Ctrl-C");
			}
		}
	}
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_pipeline: &Pipeline) -> anyhow::Result<()> {
	tokio::signal::ctrl_c()
		.await
		.context("failed to listen for Ctrl-C")
}

async fn test_connection(forwarding: &dyn ForwardingConfigStore) -> anyhow::Result<()> {
	let result = commands::test_connection(forwarding).await?;
	println!("{}", serde_json::to_string_pretty(&result)?);

	if result.success {
		Ok(())
	} else {
		anyhow::bail!("connection test failed: {}", result.message)
	}
}

fn check_config(forwarding: &dyn ForwardingConfigStore) -> anyhow::Result<()> {
	let config = commands::check_config(forwarding)?;
	println!("{}", serde_json::to_string_pretty(&config)?);
	Ok(())
}
