//! TLS connector construction for the realtime gateway.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_tungstenite::Connector;

use super::config::TlsMode;

/// Build the connector matching the configured TLS posture.
///
/// `None` lets tokio-tungstenite use its default rustls connector with the
/// platform trust roots. The relaxed mode is opt-in and announced loudly.
pub(crate) fn connector_for(mode: TlsMode) -> Option<Connector> {
    match mode {
        TlsMode::Strict => None,
        TlsMode::AcceptInvalidCerts => {
            tracing::warn!(
                "TLS certificate validation is DISABLED for the realtime connection; \
                 only use this against gateways on trusted networks"
            );
            let config = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification::new()))
                .with_no_client_auth();
            Some(Connector::Rustls(Arc::new(config)))
        }
    }
}

/// Certificate verifier that accepts any server certificate.
///
/// Signature verification is still delegated to the crypto provider so the
/// handshake remains well-formed; only the trust decision is skipped.
#[derive(Debug)]
struct NoVerification {
    provider: Arc<CryptoProvider>,
}

impl NoVerification {
    fn new() -> Self {
        let provider = CryptoProvider::get_default().cloned().unwrap_or_else(|| {
            Arc::new(rustls::crypto::aws_lc_rs::default_provider())
        });
        Self { provider }
    }
}

impl ServerCertVerifier for NoVerification {
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
        rustls::crypto::verify_tls12_signature(
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
        rustls::crypto::verify_tls13_signature(
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_mode_uses_default_connector() {
        assert!(connector_for(TlsMode::Strict).is_none());
    }

    #[test]
    fn relaxed_mode_builds_rustls_connector() {
        let connector = connector_for(TlsMode::AcceptInvalidCerts);
        assert!(
            matches!(connector, Some(Connector::Rustls(_))),
            "relaxed mode should install the no-verification rustls config"
        );
    }
}
