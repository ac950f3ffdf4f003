//! Channel construction with the fixed tuning used for columnar payloads.

use std::sync::Arc;
use std::time::Duration;

use arrow_flight::flight_service_client::FlightServiceClient;
use flightline_common::{Error, Result, Settings, TransportSecurity};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint, Uri};
use tower::{service_fn, Service};
use tracing::debug;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
pub const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(5);
/// Minimum spacing servers accept between pings on a connection with no open calls.
pub const IDLE_PING_FLOOR: Duration = Duration::from_secs(5 * 60);
/// Keep-alive pings are only sent while a call is open. The 30 s interval is below
/// the idle floor, so pinging an idle channel would get it closed with GOAWAY.
pub const KEEP_ALIVE_WHILE_IDLE: bool = false;

pub type FlightClient = FlightServiceClient<Channel>;

/// Builds the endpoint for `settings` without connecting.
///
/// With certificate checks disabled the endpoint keeps an `http` scheme: the TLS
/// session is set up by the connector, not by the channel.
pub fn endpoint(settings: &Settings) -> Result<Endpoint> {
    let uri = match settings.transport_security() {
        TransportSecurity::TlsSkipVerify => format!("http://{}:{}", settings.host, settings.port),
        TransportSecurity::Plaintext | TransportSecurity::Tls => settings.endpoint_uri(),
    };
    let endpoint = Endpoint::from_shared(uri.clone())
        .map_err(|e| Error::connection(format!("invalid endpoint {uri}"), e))?
        .http2_keep_alive_interval(KEEP_ALIVE_INTERVAL)
        .keep_alive_timeout(KEEP_ALIVE_TIMEOUT)
        .keep_alive_while_idle(KEEP_ALIVE_WHILE_IDLE);
    Ok(endpoint)
}

/// Connects to the server described by `settings`.
pub async fn connect(settings: &Settings) -> Result<FlightClient> {
    let endpoint = endpoint(settings)?;
    let security = settings.transport_security();
    debug!(uri = %settings.endpoint_uri(), ?security, "connecting flight channel");

    let channel = match security {
        TransportSecurity::Plaintext => endpoint.connect().await?,
        TransportSecurity::Tls => {
            let tls = ClientTlsConfig::new()
                .with_native_roots()
                .domain_name(settings.host.clone());
            endpoint.tls_config(tls)?.connect().await?
        }
        TransportSecurity::TlsSkipVerify => {
            let https = insecure_connector()?;
            let connector = service_fn(move |uri: Uri| {
                let mut https = https.clone();
                async move { https.call(with_https_scheme(uri)?).await }
            });
            endpoint.connect_with_connector(connector).await?
        }
    };

    Ok(FlightServiceClient::new(channel)
        .max_decoding_message_size(MAX_MESSAGE_SIZE)
        .max_encoding_message_size(MAX_MESSAGE_SIZE))
}

/// HTTPS connector that accepts any server certificate.
fn insecure_connector() -> Result<HttpsConnector<HttpConnector>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let tls = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::connection("unsupported TLS protocol versions", e))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    Ok(HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_only()
        .enable_http2()
        .wrap_connector(http))
}

fn with_https_scheme(uri: Uri) -> std::result::Result<Uri, BoxError> {
    let mut parts = uri.into_parts();
    parts.scheme = Some("https".parse()?);
    Ok(Uri::from_parts(parts)?)
}

/// Skips certificate and hostname checks but still verifies handshake signatures.
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
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
