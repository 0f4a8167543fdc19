// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Plain TCP and TLS connections to the collector.

use std::time::Duration;

use shiftlog_config::{ForwardingConfig, TransportMode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::TransportError;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A live collector connection, split so a watcher can notice the peer
/// closing while the owner writes.
pub struct Connection {
	pub reader: BoxedReader,
	pub writer: BoxedWriter,
	pub peer: String,
}

pub async fn connect(config: &ForwardingConfig) -> Result<Connection, TransportError> {
	let destination = config
		.destination
		.as_ref()
		.ok_or(TransportError::NoDestination)?;
	let address = destination.address();

	let tcp = timeout(CONNECT_TIMEOUT, TcpStream::connect(&address))
		.await
		.map_err(|_| TransportError::Timeout("connect"))?
		.map_err(|source| TransportError::Connect {
			address: address.clone(),
			source,
		})?;
	let _ = tcp.set_nodelay(true);
	debug!(peer = %address, mode = %config.transport_mode, "tcp connection established");

	match config.transport_mode {
		TransportMode::Plain => {
			let (reader, writer) = tcp.into_split();
			Ok(Connection {
				reader: Box::new(reader),
				writer: Box::new(writer),
				peer: address,
			})
		}
		TransportMode::Tls => connect_tls(config, tcp, address).await,
	}
}

#[cfg(feature = "tls")]
async fn connect_tls(
	config: &ForwardingConfig,
	tcp: TcpStream,
	address: String,
) -> Result<Connection, TransportError> {
	use crate::forwarder::tls::{build_connector, server_name};

	let destination = config
		.destination
		.as_ref()
		.ok_or(TransportError::NoDestination)?;
	let connector = build_connector(&config.tls)?;
	let name = server_name(&destination.host)?;

	let stream = timeout(CONNECT_TIMEOUT, connector.connect(name, tcp))
		.await
		.map_err(|_| TransportError::Timeout("TLS handshake"))?
		.map_err(|e| TransportError::Tls(format!("TLS handshake failed: {e}")))?;

	let (reader, writer) = tokio::io::split(stream);
	Ok(Connection {
		reader: Box::new(reader),
		writer: Box::new(writer),
		peer: address,
	})
}

#[cfg(not(feature = "tls"))]
async fn connect_tls(
	_config: &ForwardingConfig,
	_tcp: TcpStream,
	_address: String,
) -> Result<Connection, TransportError> {
	Err(TransportError::Tls(
		"TLS transport requires the tls feature".to_string(),
	))
}

/// Write one NDJSON line, bounded by [`WRITE_TIMEOUT`].
pub async fn write_line(writer: &mut BoxedWriter, line: &str) -> Result<(), TransportError> {
	timeout(WRITE_TIMEOUT, async {
		writer.write_all(line.as_bytes()).await?;
		writer.flush().await
	})
	.await
	.map_err(|_| TransportError::Timeout("write"))?
	.map_err(TransportError::Write)
}

/// Resolve when the peer closes the connection or it errors. Collectors do
/// not send anything back, so any inbound bytes are discarded.
pub async fn watch_for_close(mut reader: BoxedReader) -> TransportError {
	let mut buf = [0u8; 512];
	loop {
		match reader.read(&mut buf).await {
			Ok(0) => return TransportError::Closed,
			Ok(_) => continue,
			Err(e) => return TransportError::Write(e),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use shiftlog_config::Destination;
	use tokio::io::AsyncBufReadExt;
	use tokio::net::TcpListener;

	fn config_for(port: u16) -> ForwardingConfig {
		ForwardingConfig {
			enabled: true,
			destination: Some(Destination {
				host: "127.0.0.1".to_string(),
				port,
			}),
			..Default::default()
		}
	}

	#[tokio::test]
	async fn writes_lines_to_plain_tcp() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();

		let server = tokio::spawn(async move {
			let (socket, _) = listener.accept().await.unwrap();
			let mut lines = tokio::io::BufReader::new(socket).lines();
			lines.next_line().await.unwrap()
		});

		let mut conn = connect(&config_for(port)).await.unwrap();
		write_line(&mut conn.writer, "{\"event\":\"a.b\"}\n").await.unwrap();

		assert_eq!(server.await.unwrap().as_deref(), Some("{\"event\":\"a.b\"}"));
	}

	#[tokio::test]
	async fn refused_connection_is_connect_error() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		drop(listener);

		let err = connect(&config_for(port)).await.err().unwrap();
		assert!(matches!(err, TransportError::Connect { .. }));
	}

	#[tokio::test]
	async fn missing_destination_is_rejected() {
		let err = connect(&ForwardingConfig::default()).await.err().unwrap();
		assert!(matches!(err, TransportError::NoDestination));
	}

	#[tokio::test]
	async fn watcher_reports_peer_close() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();

		let conn = connect(&config_for(port)).await.unwrap();
		let (socket, _) = listener.accept().await.unwrap();
		drop(socket);

		assert!(matches!(watch_for_close(conn.reader).await, TransportError::Closed));
	}
}
