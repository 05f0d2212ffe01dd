//! A synchronous-looking HTTP/1.1 client (§4.11), grounded on
//! `original_source`'s `coco_http.cpp` `HttpClient` (connect-on-demand,
//! one `FastBuffer`-backed response parser reused across requests) and
//! shaped like `cpkb-bluezoo-tagliacarte/core/src/protocol/http/client.rs`.
use crate::{
    errors::ErrorKind,
    http::{
        fastbuffer::FastBuffer,
        message::{self, BodyReader, ParsedResponse},
        types::to_lower_case,
    },
    limits::{ClientLimits, ConnLimits, TlsLimits},
    net::{
        socket::{ByteStream, Socket},
        tcp,
        tls::SslConn,
    },
    Method, Version,
};
use std::{error, fmt, net::ToSocketAddrs, time::Duration};
use tokio::net::TcpStream;

const USER_AGENT: &[u8] = b"coronet/0.1";

/// Either half of the connection an [`HttpClient`] may end up holding -
/// plain or TLS. Generic code above this layer (response parsing, and
/// the WebSocket client after a successful Upgrade) only ever sees the
/// [`ByteStream`] surface, never which variant it is.
pub(crate) enum Transport {
    Plain(Socket<TcpStream>),
    Tls(SslConn<TcpStream>),
}

impl Transport {
    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        match self {
            Transport::Plain(s) => s.read(buf).await,
            Transport::Tls(s) => s.read(buf).await,
        }
    }

    pub(crate) async fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        match self {
            Transport::Plain(s) => s.read_fully(buf).await,
            Transport::Tls(s) => s.read_fully(buf).await,
        }
    }

    pub(crate) async fn write(&mut self, buf: &[u8]) -> Result<(), ErrorKind> {
        match self {
            Transport::Plain(s) => s.write(buf).await,
            Transport::Tls(s) => s.write(buf).await,
        }
    }

    pub(crate) async fn writev(&mut self, bufs: &[&[u8]]) -> Result<(), ErrorKind> {
        match self {
            Transport::Plain(s) => s.writev(bufs).await,
            Transport::Tls(s) => s.writev(bufs).await,
        }
    }
}

impl ByteStream for Transport {
    #[inline]
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        Transport::read(self, buf).await
    }

    #[inline]
    async fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        Transport::read_fully(self, buf).await
    }

    #[inline]
    async fn write(&mut self, buf: &[u8]) -> Result<(), ErrorKind> {
        Transport::write(self, buf).await
    }

    #[inline]
    async fn writev(&mut self, bufs: &[&[u8]]) -> Result<(), ErrorKind> {
        Transport::writev(self, bufs).await
    }
}

/// Wraps the [`ErrorKind`] taxonomy for client call sites - a request
/// never renders an HTTP error response the way a server-side failure
/// does, it simply fails.
#[derive(Debug)]
pub struct HttpClientError(pub(crate) ErrorKind);

impl fmt::Display for HttpClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
impl error::Error for HttpClientError {}
impl From<ErrorKind> for HttpClientError {
    fn from(err: ErrorKind) -> Self {
        HttpClientError(err)
    }
}

/// The response this client hands back: the parsed head plus the body
/// already read into memory (§4.11 - this client targets small
/// request/reply payloads, not streaming transfers).
pub struct HttpResponse {
    head: ParsedResponse,
    body: Vec<u8>,
}

impl HttpResponse {
    #[inline]
    pub fn status(&self) -> u16 {
        self.head.status
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.head.version
    }

    #[inline]
    pub fn header(&self, name: &[u8]) -> Option<&[u8]> {
        self.head.header(name)
    }

    #[inline]
    pub fn keep_alive(&self) -> bool {
        self.head.keep_alive
    }

    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[inline]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// A connect-on-demand HTTP/1.1 client (§4.11).
///
/// One connection is kept alive across calls as long as both sides keep
/// sending `Connection: keep-alive`; a disconnect (timeout, parse
/// failure, or an explicit `Connection: close`) drops the transport and
/// the next call reconnects.
pub struct HttpClient {
    host: Box<str>,
    port: u16,
    https: bool,
    timeout: Duration,
    conn_limits: ConnLimits,
    tls_limits: TlsLimits,
    transport: Option<Transport>,
    recv_buf: FastBuffer,
}

impl HttpClient {
    /// Creates a client targeting `host:port`. When `port == 80` and
    /// `https` is true, the port is switched to `443` - the "both are
    /// default" case the original implementation special-cased so
    /// `HttpClient::initialize(true, host, 80, ..)` still does the
    /// right thing.
    pub fn initialize(
        https: bool,
        host: impl Into<String>,
        port: u16,
        timeout: Option<Duration>,
        client_limits: &ClientLimits,
    ) -> Self {
        let port = if https && port == 80 { 443 } else { port };

        Self {
            host: host.into().into_boxed_str(),
            port,
            https,
            timeout: timeout.unwrap_or(client_limits.default_timeout),
            conn_limits: ConnLimits::default(),
            tls_limits: TlsLimits::default(),
            transport: None,
            recv_buf: FastBuffer::new(client_limits.recv_buffer_size.min(64 * 1024)),
        }
    }

    fn apply_timeout(&mut self) {
        self.conn_limits.socket_read_timeout = self.timeout;
        self.conn_limits.socket_write_timeout = self.timeout;
    }

    async fn connect(&mut self) -> Result<(), HttpClientError> {
        if self.transport.is_some() {
            return Ok(());
        }

        self.apply_timeout();
        let addr = (self.host.as_ref(), self.port)
            .to_socket_addrs()
            .map_err(|_| ErrorKind::SocketConnect)?
            .next()
            .ok_or(ErrorKind::SocketConnect)?;

        let conn = tcp::dial_tcp(addr, &self.conn_limits).await?;
        let stream = conn.into_stream();

        self.transport = Some(if self.https {
            Transport::Tls(
                SslConn::connect(stream, &self.host, &self.conn_limits, &self.tls_limits).await?,
            )
        } else {
            Transport::Plain(Socket::new(
                stream,
                self.conn_limits.socket_read_timeout,
                self.conn_limits.socket_write_timeout,
            ))
        });

        Ok(())
    }

    fn disconnect(&mut self) {
        self.transport = None;
    }

    /// Sends one request and returns the parsed response, reconnecting
    /// first if necessary (§4.11 `send_request`).
    ///
    /// Any I/O or parse failure drops the connection so the next call
    /// starts clean rather than replaying a request on a stream left in
    /// an unknown state.
    pub async fn send_request(
        &mut self,
        method: Method,
        path: &str,
        extra_headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, HttpClientError> {
        self.connect().await?;

        let mut head = Vec::with_capacity(256);
        head.extend_from_slice(method.as_bytes());
        head.push(b' ');
        head.extend_from_slice(path.as_bytes());
        head.extend_from_slice(b" HTTP/1.1\r\n");

        for (name, value) in extra_headers {
            head.extend_from_slice(name.as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(b"\r\n");

        let result = async {
            let transport = self.transport.as_mut().expect("connected above");
            if body.is_empty() {
                transport.write(&head).await?;
            } else {
                transport.writev(&[&head, body]).await?;
            }

            let parsed = message::parse_response(transport, &mut self.recv_buf).await?;
            let body = if response_has_body(parsed.status) {
                BodyReader::for_response(&parsed)
                    .read_to_end(transport, &mut self.recv_buf)
                    .await?
            } else {
                Vec::new()
            };

            Ok(HttpResponse { head: parsed, body })
        }
        .await;

        match &result {
            Err(_) => self.disconnect(),
            Ok(resp) if !resp.keep_alive() => self.disconnect(),
            Ok(_) => {}
        }

        result
    }

    /// `GET` with the default header set (§4.11): `Host`, `Request-Id`,
    /// `Connection: keep-alive`, `User-Agent`.
    pub async fn get(&mut self, path: &str) -> Result<HttpResponse, HttpClientError> {
        let host = self.host.clone();
        let request_id = random_request_id();
        let headers = [
            ("host", host.as_ref()),
            ("request-id", request_id.as_str()),
            ("connection", "keep-alive"),
            ("user-agent", std::str::from_utf8(USER_AGENT).unwrap()),
        ];
        self.send_request(Method::Get, path, &headers, b"").await
    }

    /// `POST` with a JSON-shaped body and the default header set
    /// (§4.11): `Host`, `Request-Id`, `Connection: keep-alive`,
    /// `Content-Length`, `User-Agent`, `Content-Type: application/json`.
    pub async fn post(&mut self, path: &str, body: &[u8]) -> Result<HttpResponse, HttpClientError> {
        let host = self.host.clone();
        let request_id = random_request_id();
        let content_length = body.len().to_string();
        let headers = [
            ("host", host.as_ref()),
            ("request-id", request_id.as_str()),
            ("connection", "keep-alive"),
            ("content-length", content_length.as_str()),
            ("user-agent", std::str::from_utf8(USER_AGENT).unwrap()),
            ("content-type", "application/json"),
        ];
        self.send_request(Method::Post, path, &headers, body).await
    }

    /// Hands the live transport to a caller that wants to keep driving
    /// the same TCP/TLS connection directly - used by
    /// [`WsClient`](crate::ws::client::WsClient) once a 101 Upgrade
    /// response has been accepted.
    pub(crate) fn take_transport(&mut self) -> Option<Transport> {
        self.transport.take()
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }
}

fn response_has_body(status: u16) -> bool {
    !(100..200).contains(&status) && status != 204 && status != 304
}

fn random_request_id() -> String {
    let id: u64 = rand::random();
    let mut hex = format!("{id:016x}").into_bytes();
    to_lower_case(&mut hex);
    String::from_utf8(hex).expect("hex digits are valid utf8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_permitting_statuses() {
        assert!(!response_has_body(100));
        assert!(!response_has_body(204));
        assert!(!response_has_body(304));
        assert!(response_has_body(200));
        assert!(response_has_body(404));
    }

    #[test]
    fn https_on_default_port_switches_to_443() {
        let client_limits = ClientLimits::default();
        let client = HttpClient::initialize(true, "example.com", 80, None, &client_limits);
        assert_eq!(client.port, 443);

        let client = HttpClient::initialize(false, "example.com", 80, None, &client_limits);
        assert_eq!(client.port, 80);
    }
}
