use crate::{query, Version};
use std::{error, fmt, io, time::Duration};

/// Crate-wide error taxonomy.
///
/// Request-parsing variants (`InvalidMethod` .. `Io`) came from the HTTP
/// request/response layer and carry a pre-rendered HTTP error response via
/// [`ErrorKind::as_http`]. Everything below `Io` is the taxonomy this crate
/// adds for the coroutine runtime, socket layer, TLS transport, mux, and
/// WebSocket client — those never get rendered as an HTTP response, they
/// just close or fail the connection they apply to.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    InvalidMethod,

    InvalidUrl,
    #[allow(dead_code)]
    Query(query::Error),

    InvalidVersion,
    UnsupportedVersion,

    InvalidHeader,
    TooManyHeaders,
    InvalidContentLength,
    InvalidConnection,

    BodyTooLarge,
    #[allow(dead_code)]
    BodyMismatch {
        expected: usize,
        available: usize,
    },
    #[allow(dead_code)]
    UnexpectedBody(usize),
    /// A chunked request body's chunk-size line was empty/CRLF-led,
    /// non-hex, or its payload ran past the already-filled request
    /// buffer (§4.8 `ReadChunked`, testable property 16).
    HttpInvalidChunkHeader,

    ServiceUnavailable,
    Io(IoError),

    // --- socket layer (§4.2, §6) ---
    SocketRead,
    SocketReadFully,
    SocketWrite,
    SocketTimeout(Duration),
    SocketCreate,
    SocketBind,
    SocketListen,
    SocketConnect,
    SocketClosed,

    // --- fast buffer / HTTP parser façade (§4.6, §3) ---
    ReaderBufferOverflow,
    SystemIpInvalid,

    // --- HTTP message / response reader / writer / mux (§4.7-4.10) ---
    // (response-reader-only errors: these arise while the client parses a
    // server's response, never while this crate is still framing one of
    // its own HTTP responses)
    HttpContentLength,
    HttpResponseEof,
    HttpParseUri,
    HttpUrlNotClean,
    HttpPatternEmpty,
    HttpPatternDuplicated,

    // --- TLS transport (§4.5) ---
    HttpsHandshake,
    HttpsRead,
    HttpsWrite,

    // --- coroutine runtime (§4.1) ---
    ThreadStarted,
    ThreadDisposed,
    ThreadInterrupted,
    ThreadTerminated,
    CreateCycleThread,
    SetEpoll,
    Initialize,

    // --- WebSocket client (§4.12) ---
    WsUpgradeRejected,
    WsInvalidFrame,
    WsPacketTooLarge,
}

impl ErrorKind {
    /// True for the "gracefully closed" equivalence class a [`ConnRoutine`]
    /// remaps to [`ErrorKind::SocketClosed`] (§4.3, §6).
    ///
    /// [`ConnRoutine`]: crate::net::manager::ConnRoutine
    pub fn is_graceful_close(&self) -> bool {
        matches!(
            self,
            ErrorKind::SocketRead
                | ErrorKind::SocketReadFully
                | ErrorKind::SocketWrite
                | ErrorKind::SocketTimeout(_)
        )
    }
}

macro_rules! http_errors {
    ($($name:ident: $status_code:expr, $len:literal => $json:literal; )*) => {
        pub(crate) fn as_http(
            &self,
            version: Version,
            json: bool,
        ) -> &'static [u8] {
            match (json, self, version) {
                $(
                (true, Self::$name { .. }, Version::Http11) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ).as_bytes(),
                (false, Self::$name { .. }, Version::Http11) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ).as_bytes(),
                (true, Self::$name { .. }, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ).as_bytes(),
                (false, Self::$name { .. }, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ).as_bytes(),
                (_, Self::$name { .. }, Version::Http09) => concat!(
                    "ERROR: ", stringify!($status_code)
                ).as_bytes(),
                )*
                // Everything outside the request-parsing taxonomy (socket,
                // TLS, coroutine, mux, websocket errors) never reaches a
                // point where an HTTP response can still be framed; fall
                // back to a generic 500 so this match stays exhaustive as
                // the taxonomy grows.
                (_, _, Version::Http11) => b"HTTP/1.1 500 Internal Server Error\r\nconnection: close\r\ncontent-length: 0\r\n\r\n",
                (_, _, Version::Http10) => b"HTTP/1.0 500 Internal Server Error\r\nconnection: close\r\ncontent-length: 0\r\n\r\n",
                (_, _, Version::Http09) => b"ERROR: 500",
            }
        }
    };
}

impl ErrorKind {
    http_errors! {
        InvalidMethod: "400 Bad Request", "55"
            => r#"{"error":"Invalid HTTP method","code":"INVALID_METHOD"}"#;

        InvalidUrl: "400 Bad Request", "51"
            => r#"{"error":"Invalid URL format","code":"INVALID_URL"}"#;
        Query: "400 Bad Request", "55"
            => r#"{"error":"Invalid query string","code":"INVALID_QUERY"}"#;

        InvalidVersion: "400 Bad Request", "57"
            => r#"{"error":"Invalid HTTP version","code":"INVALID_VERSION"}"#;
        UnsupportedVersion: "505 HTTP Version Not Supported", "67"
            => r#"{"error":"HTTP version not supported","code":"UNSUPPORTED_VERSION"}"#;

        InvalidHeader: "400 Bad Request", "57"
            => r#"{"error":"Invalid header format","code":"INVALID_HEADER"}"#;
        TooManyHeaders: "431 Request Header Fields Too Large", "54"
            => r#"{"error":"Too many headers","code":"TOO_MANY_HEADERS"}"#;
        InvalidContentLength: "400 Bad Request", "66"
            => r#"{"error":"Invalid Content-Length","code":"INVALID_CONTENT_LENGTH"}"#;
        InvalidConnection: "400 Bad Request", "65"
            => r#"{"error":"Invalid Connection header","code":"INVALID_CONNECTION"}"#;

        BodyTooLarge: "413 Payload Too Large", "58"
            => r#"{"error":"Request body too large","code":"BODY_TOO_LARGE"}"#;
        BodyMismatch: "400 Bad Request", "55"
            => r#"{"error":"Body length mismatch","code":"BODY_MISMATCH"}"#;
        UnexpectedBody: "400 Bad Request", "60"
            => r#"{"error":"Unexpected request body","code":"UNEXPECTED_BODY"}"#;
        HttpInvalidChunkHeader: "400 Bad Request", "62"
            => r#"{"error":"Invalid chunk header","code":"INVALID_CHUNK_HEADER"}"#;

        ServiceUnavailable: "503 Service Unavailable", "72"
            => r#"{"error":"Service temporarily unavailable","code":"SERVICE_UNAVAILABLE"}"#;
        Io: "503 Service Unavailable", "48"
            => r#"{"error":"I/O error occurred","code":"IO_ERROR"}"#;
    }
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<query::Error> for ErrorKind {
    fn from(err: query::Error) -> Self {
        ErrorKind::Query(err)
    }
}
impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

#[derive(Debug)]
pub struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graceful_close_classification() {
        assert!(ErrorKind::SocketRead.is_graceful_close());
        assert!(ErrorKind::SocketReadFully.is_graceful_close());
        assert!(ErrorKind::SocketWrite.is_graceful_close());
        assert!(ErrorKind::SocketTimeout(Duration::from_secs(1)).is_graceful_close());
        assert!(!ErrorKind::SocketClosed.is_graceful_close());
        assert!(!ErrorKind::HttpsHandshake.is_graceful_close());
    }

    #[test]
    fn unmapped_kind_falls_back_to_500() {
        let body = ErrorKind::ThreadInterrupted.as_http(Version::Http11, false);
        assert!(body.starts_with(b"HTTP/1.1 500"));
    }

    #[test]
    fn invalid_chunk_header_maps_to_400() {
        let body = ErrorKind::HttpInvalidChunkHeader.as_http(Version::Http11, true);
        assert!(body.starts_with(b"HTTP/1.1 400 Bad Request"));
        assert!(std::str::from_utf8(body)
            .unwrap()
            .ends_with(r#"{"error":"Invalid chunk header","code":"INVALID_CHUNK_HEADER"}"#));
    }
}
