//! TLS transport over `rustls`/`tokio-rustls` (§4.5).
//!
//! The original library drove the handshake itself, pumping ciphertext
//! between OpenSSL's memory BIOs and the underlying socket on every
//! `SSL_ERROR_WANT_READ`/`WANT_WRITE`. `tokio_rustls::{TlsConnector,
//! TlsAcceptor}` already perform exactly that pump - reading and writing
//! the underlying `AsyncRead + AsyncWrite` stream as the handshake state
//! machine demands - so [`SslConn::connect`]/[`SslConn::accept`] just race
//! those futures against this crate's own timeout instead of re-deriving
//! the pump loop by hand. "Never block the reactor" holds either way: the
//! underlying stream is the same suspendable `TcpStream` every other
//! transport in this crate uses.
//!
//! Certificate validation is out of scope (non-goal, see `SPEC_FULL.md`
//! §1): [`SslConn::connect`] uses a verifier that accepts any certificate,
//! matching the original's permissive handshake. [`SslConn::connect_verified`]
//! is offered alongside it for callers who want the ecosystem-standard
//! `webpki-roots` trust anchors instead.
use crate::{
    errors::ErrorKind,
    limits::{ConnLimits, TlsLimits},
    net::socket::{ByteStream, Socket},
};
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
    version::TLS12,
    ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme,
};
use std::{fs, io, path::Path, sync::Arc};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{client, server, TlsAcceptor, TlsConnector};

/// Either half of a TLS session, unified so the rest of the crate can hold
/// one `SslConn<T>` type regardless of which side dialed.
enum SslStream<T> {
    Client(client::TlsStream<T>),
    Server(server::TlsStream<T>),
}

impl<T: AsyncRead + AsyncWrite + Unpin> AsyncRead for SslStream<T> {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            SslStream::Client(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            SslStream::Server(s) => std::pin::Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> AsyncWrite for SslStream<T> {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        match self.get_mut() {
            SslStream::Client(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            SslStream::Server(s) => std::pin::Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            SslStream::Client(s) => std::pin::Pin::new(s).poll_flush(cx),
            SslStream::Server(s) => std::pin::Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            SslStream::Client(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            SslStream::Server(s) => std::pin::Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A TLS-wrapped connection (§4.5). Takes ownership of the underlying
/// stream's descriptor at construction time; the plain connection that was
/// dialed/accepted has nothing usable left once it has been handed here.
pub struct SslConn<T> {
    socket: Socket<SslStream<T>>,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> SslConn<T> {
    /// Runs the client-side handshake over `stream`, permissive (no
    /// certificate validation - see the module doc).
    pub(crate) async fn connect(
        stream: T,
        server_name: &str,
        conn_limits: &ConnLimits,
        tls_limits: &TlsLimits,
    ) -> Result<Self, ErrorKind> {
        Self::connect_with(stream, server_name, client_config(), conn_limits, tls_limits).await
    }

    /// Runs the client-side handshake, validating the peer certificate
    /// against the `webpki-roots` trust anchors.
    #[allow(dead_code)]
    pub(crate) async fn connect_verified(
        stream: T,
        server_name: &str,
        conn_limits: &ConnLimits,
        tls_limits: &TlsLimits,
    ) -> Result<Self, ErrorKind> {
        Self::connect_with(stream, server_name, client_config_verified(), conn_limits, tls_limits)
            .await
    }

    async fn connect_with(
        stream: T,
        server_name: &str,
        config: Arc<ClientConfig>,
        conn_limits: &ConnLimits,
        tls_limits: &TlsLimits,
    ) -> Result<Self, ErrorKind> {
        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|_| ErrorKind::HttpsHandshake)?;
        let connector = TlsConnector::from(config);

        let tls_stream = tokio::select! {
            biased;

            result = connector.connect(name, stream) => {
                result.map_err(|_| ErrorKind::HttpsHandshake)?
            }
            () = tokio::time::sleep(tls_limits.handshake_timeout) => {
                return Err(ErrorKind::HttpsHandshake);
            }
        };

        Ok(Self {
            socket: Socket::new(
                SslStream::Client(tls_stream),
                conn_limits.socket_read_timeout,
                conn_limits.socket_write_timeout,
            ),
        })
    }

    /// Runs the server-side handshake over `stream` using `config`.
    pub(crate) async fn accept(
        stream: T,
        config: Arc<ServerConfig>,
        conn_limits: &ConnLimits,
        tls_limits: &TlsLimits,
    ) -> Result<Self, ErrorKind> {
        let acceptor = TlsAcceptor::from(config);

        let tls_stream = tokio::select! {
            biased;

            result = acceptor.accept(stream) => result.map_err(|_| ErrorKind::HttpsHandshake)?,
            () = tokio::time::sleep(tls_limits.handshake_timeout) => {
                return Err(ErrorKind::HttpsHandshake);
            }
        };

        Ok(Self {
            socket: Socket::new(
                SslStream::Server(tls_stream),
                conn_limits.socket_read_timeout,
                conn_limits.socket_write_timeout,
            ),
        })
    }

    #[inline]
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        self.socket.read(buf).await.map_err(remap_read)
    }

    #[inline]
    pub async fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        self.socket.read_fully(buf).await.map_err(remap_read)
    }

    #[inline]
    pub async fn write(&mut self, buf: &[u8]) -> Result<(), ErrorKind> {
        self.socket.write(buf).await.map_err(remap_write)
    }

    #[inline]
    pub async fn writev(&mut self, bufs: &[&[u8]]) -> Result<(), ErrorKind> {
        self.socket.writev(bufs).await.map_err(remap_write)
    }

    #[inline]
    pub async fn flush(&mut self) -> Result<(), ErrorKind> {
        self.socket.flush().await.map_err(remap_write)
    }

    /// Releases the underlying stream, consuming this TLS session - the
    /// session itself retains nothing usable after this call (§4.5).
    #[allow(dead_code)]
    pub(crate) fn release(self) -> T {
        match self.socket.into_inner() {
            SslStream::Client(s) => s.into_inner().0,
            SslStream::Server(s) => s.into_inner().0,
        }
    }
}

/// Timeouts map to `HttpsRead`/`HttpsWrite` rather than the plain socket
/// kinds once a stream is TLS-wrapped (§4.5) - a stalled handshake read
/// still counts as a TLS-layer failure, not a bare socket one.
fn remap_read(err: ErrorKind) -> ErrorKind {
    match err {
        ErrorKind::SocketTimeout(_) | ErrorKind::SocketRead | ErrorKind::SocketReadFully => {
            ErrorKind::HttpsRead
        }
        other => other,
    }
}

fn remap_write(err: ErrorKind) -> ErrorKind {
    match err {
        ErrorKind::SocketTimeout(_) | ErrorKind::SocketWrite => ErrorKind::HttpsWrite,
        other => other,
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for SslConn<T> {
    #[inline]
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        SslConn::read(self, buf).await
    }

    #[inline]
    async fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        SslConn::read_fully(self, buf).await
    }

    #[inline]
    async fn write(&mut self, buf: &[u8]) -> Result<(), ErrorKind> {
        SslConn::write(self, buf).await
    }

    #[inline]
    async fn writev(&mut self, bufs: &[&[u8]]) -> Result<(), ErrorKind> {
        SslConn::writev(self, bufs).await
    }
}

/// No certificate/hostname verification at all - matches the original
/// handshake's permissive posture and this crate's explicit non-goal on
/// TLS certificate validation.
#[derive(Debug)]
struct NoServerVerification;

impl ServerCertVerifier for NoServerVerification {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

fn client_config() -> Arc<ClientConfig> {
    Arc::new(
        ClientConfig::builder_with_protocol_versions(&[&TLS12])
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoServerVerification))
            .with_no_client_auth(),
    )
}

fn client_config_verified() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Arc::new(
        ClientConfig::builder_with_protocol_versions(&[&TLS12])
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

/// Loads a PEM key/cert pair into a server-side TLS config (§4.5, TLS 1.2
/// only per the handshake description).
pub(crate) fn load_server_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<Arc<ServerConfig>, ErrorKind> {
    let cert_bytes = fs::read(cert_path).map_err(|_| ErrorKind::HttpsHandshake)?;
    let key_bytes = fs::read(key_path).map_err(|_| ErrorKind::HttpsHandshake)?;

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_bytes.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|_| ErrorKind::HttpsHandshake)?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_bytes.as_slice())
        .map_err(|_| ErrorKind::HttpsHandshake)?
        .ok_or(ErrorKind::HttpsHandshake)?;

    let config = ServerConfig::builder_with_protocol_versions(&[&TLS12])
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|_| ErrorKind::HttpsHandshake)?;

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    fn test_cert_key() -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        // A throwaway self-signed cert/key pair checked in under
        // `tests/fixtures/`, used only by this handshake test.
        const CERT_PEM: &[u8] = include_bytes!("../../tests/fixtures/test_cert.pem");
        const KEY_PEM: &[u8] = include_bytes!("../../tests/fixtures/test_key.pem");

        let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &CERT_PEM[..])
            .collect::<Result<_, _>>()
            .unwrap();
        let key = rustls_pemfile::private_key(&mut &KEY_PEM[..])
            .unwrap()
            .unwrap();
        (certs, key)
    }

    #[tokio::test]
    async fn client_rejects_when_peer_never_answers() {
        let (client, _server) = duplex(64);
        let conn_limits = ConnLimits::default();
        let tls_limits = TlsLimits {
            handshake_timeout: Duration::from_millis(20),
            ..TlsLimits::default()
        };

        let err = SslConn::connect(client, "localhost", &conn_limits, &tls_limits)
            .await
            .unwrap_err();
        assert_eq!(err, ErrorKind::HttpsHandshake);
    }

    #[tokio::test]
    async fn handshake_roundtrips_plaintext() {
        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        let (certs, key) = test_cert_key();

        let server_config = Arc::new(
            ServerConfig::builder_with_protocol_versions(&[&TLS12])
                .with_no_client_auth()
                .with_single_cert(certs, key)
                .unwrap(),
        );

        let conn_limits = ConnLimits::default();
        let tls_limits = TlsLimits::default();

        let server_fut = SslConn::accept(server_io, server_config, &conn_limits, &tls_limits);
        let client_fut = SslConn::connect(client_io, "localhost", &conn_limits, &tls_limits);

        let (server_conn, client_conn) = tokio::join!(server_fut, client_fut);
        let mut server_conn = server_conn.unwrap();
        let mut client_conn = client_conn.unwrap();

        client_conn.write(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server_conn.read_fully(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }
}
