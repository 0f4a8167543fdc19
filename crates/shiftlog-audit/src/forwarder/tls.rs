// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! rustls client setup for the collector connection.
//!
//! Certificate and key material is accepted either as inline PEM text or as
//! a path to a PEM file; inline text is recognised by its `-----BEGIN`
//! header.

use std::io::BufReader;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use shiftlog_common_secret::load_secret_env;
use shiftlog_config::TlsOptions;
use tokio_rustls::TlsConnector;

use crate::error::TransportError;

/// Environment variable carrying the mTLS client private key (or `_FILE`).
pub const CLIENT_KEY_ENV: &str = "SHIFTLOG_FORWARDING_TLS_CLIENT_KEY";

const PEM_HEADER: &str = "-----BEGIN";

/// Inline PEM text is returned as-is; anything else is read as a file path.
pub fn read_pem_material(material: &str, what: &str) -> Result<String, TransportError> {
	if material.trim_start().starts_with(PEM_HEADER) {
		return Ok(material.to_string());
	}
	std::fs::read_to_string(material.trim()).map_err(|e| {
		TransportError::Certificate(format!("cannot read {what} from '{}': {e}", material.trim()))
	})
}

pub fn parse_certificates(
	material: &str,
	what: &str,
) -> Result<Vec<CertificateDer<'static>>, TransportError> {
	let pem = read_pem_material(material, what)?;
	let mut reader = BufReader::new(pem.as_bytes());
	let certs = rustls_pemfile::certs(&mut reader)
		.collect::<Result<Vec<_>, _>>()
		.map_err(|e| TransportError::Certificate(format!("malformed {what}: {e}")))?;

	if certs.is_empty() {
		return Err(TransportError::Certificate(format!(
			"no certificates found in {what}"
		)));
	}
	Ok(certs)
}

pub fn parse_private_key(material: &str) -> Result<PrivateKeyDer<'static>, TransportError> {
	let pem = read_pem_material(material, "client key")?;
	let mut reader = BufReader::new(pem.as_bytes());
	rustls_pemfile::private_key(&mut reader)
		.map_err(|e| TransportError::Certificate(format!("malformed client key: {e}")))?
		.ok_or_else(|| TransportError::Certificate("no private key found in client key".to_string()))
}

fn provider() -> Arc<CryptoProvider> {
	Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

fn root_store(options: &TlsOptions) -> Result<RootCertStore, TransportError> {
	match &options.ca_certificate {
		Some(ca) => {
			let mut roots = RootCertStore::empty();
			for cert in parse_certificates(ca, "CA certificate")? {
				roots
					.add(cert)
					.map_err(|e| TransportError::Certificate(format!("invalid CA certificate: {e}")))?;
			}
			Ok(roots)
		}
		None => Ok(RootCertStore::from_iter(
			webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
		)),
	}
}

/// Build a connector for `options`. Reads certificate files and the client
/// key from the environment on every call, so rotated material is picked up
/// on the next connect.
pub fn build_connector(options: &TlsOptions) -> Result<TlsConnector, TransportError> {
	let provider = provider();
	let builder = ClientConfig::builder_with_provider(provider.clone())
		.with_safe_default_protocol_versions()
		.map_err(|e| TransportError::Tls(e.to_string()))?;

	let builder = if options.verify_peer {
		builder.with_root_certificates(root_store(options)?)
	} else {
		builder
			.dangerous()
			.with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
	};

	let config = match &options.client_certificate {
		Some(cert) => {
			let chain = parse_certificates(cert, "client certificate")?;
			let key_material = load_secret_env(CLIENT_KEY_ENV)
				.map_err(|e| TransportError::Certificate(e.to_string()))?
				.ok_or_else(|| {
					TransportError::Certificate(format!(
						"client certificate configured but {CLIENT_KEY_ENV} is not set"
					))
				})?;
			let key = parse_private_key(key_material.expose())?;
			builder
				.with_client_auth_cert(chain, key)
				.map_err(|e| TransportError::Certificate(format!("client certificate rejected: {e}")))?
		}
		None => builder.with_no_client_auth(),
	};

	Ok(TlsConnector::from(Arc::new(config)))
}

pub fn server_name(host: &str) -> Result<ServerName<'static>, TransportError> {
	ServerName::try_from(host.to_string())
		.map_err(|e| TransportError::Tls(format!("invalid server name '{host}': {e}")))
}

/// Verifier used when `verify_peer` is off. Signatures are still checked so
/// the handshake is well formed; the certificate chain is not.
#[derive(Debug)]
struct AcceptAnyServerCert {
	provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
	fn verify_server_cert(
		&self,
		_end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_server_name: &ServerName<'_>,
		_ocsp_response: &[u8],
		_now: UnixTime,
	) -> Result<ServerCertVerified, rustls::Error> {
		Ok(ServerCertVerified::assertion())
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, rustls::Error> {
		verify_tls12_signature(
			message,
			cert,
			dss,
			&self.provider.signature_verification_algorithms,
		)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, rustls::Error> {
		verify_tls13_signature(
			message,
			cert,
			dss,
			&self.provider.signature_verification_algorithms,
		)
	}

	fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
		self.provider
			.signature_verification_algorithms
			.supported_schemes()
	}
}
