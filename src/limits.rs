//! Connection, request, response, TLS, and WebSocket configuration knobs.
//!
//! # Security-First Defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Resource exhaustion attacks
//! - Memory overflows
//! - Slowloris attacks
//! - Header flooding
//!
//! # Examples
//!
//! ```no_run
//! # coronet::impt_default_handler!{MyHandler}
//! use coronet::{Server, limits::{ConnLimits, ReqLimits, ServerLimits}};
//! use tokio::net::TcpListener;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .handler(MyHandler)
//!         .server_limits(ServerLimits {
//!             max_connections: 5000, // Higher concurrency
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             socket_read_timeout: Duration::from_secs(5),
//!             max_requests_per_connection: 10_000,
//!             ..ConnLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             header_count: 18,      // More headers for complex APIs
//!             body_size: 16 * 1024,  // 16KB for larger payloads
//!             ..ReqLimits::default()
//!         })
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```

use std::time::Duration;

/// Controls server-level concurrency and overload protection.
///
/// One [`ConnRoutine`](crate::net::manager::ConnRoutine) coroutine is
/// spawned per accepted connection (§4.3, §4.11); `max_connections` bounds
/// how many may run at once via a counting semaphore. A connection that
/// would exceed the bound is answered with an immediate `503` instead of
/// being admitted.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Maximum number of concurrent connections being served (default: `1000`).
    ///
    /// Connections beyond this bound receive an immediate HTTP `503`
    /// response and are closed rather than being queued.
    pub max_connections: usize,

    /// TCP `listen` backlog (default: `512`, §6).
    pub listen_backlog: u32,

    /// Format for error responses (default: `true`)
    ///
    /// # Examples
    /// If `true`, then on error the server will return:
    /// ```text
    /// HTTP/1.1 400 Bad Request\r
    /// connection: close\r
    /// content-length: 55\r
    /// content-type: application/json\r
    /// \r
    /// {"error":"Invalid HTTP method","code":"INVALID_METHOD"}
    /// ```
    /// If `false`, then on error the server will return:
    /// ```text
    /// HTTP/1.1 400 Bad Request\r
    /// connection: close\r
    /// content-length: 0\r
    /// \r
    /// ```
    pub json_errors: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            listen_backlog: 512,
            json_errors: true,

            _priv: (),
        }
    }
}

/// Connection-level limits and timeouts
///
/// Controls individual TCP connection behavior including timeouts,
/// lifetime, and request limits.
///
/// Default values balance performance, resource usage, and security.
/// Only change if you understand the consequences.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum duration to wait for reading data from socket (default: `2 seconds`)
    ///
    /// If no data is received within this time, connection is closed.
    /// This is the primary mechanism for cleaning up stalled connections.
    /// Prevents `slowloris attacks` and frees resources from inactive clients.
    pub socket_read_timeout: Duration,

    /// Maximum duration to wait for writing data to socket (default: `3 seconds`)
    ///
    /// If data can't be written in time, connection is terminated.
    /// Applies to individual write operations.
    pub socket_write_timeout: Duration,

    /// Maximum number of requests allowed per connection (default: `100`)
    ///
    /// Connection closes after processing this many requests.
    /// Helps prevent potential memory accumulation and maintains connection health.
    /// Combined with `connection_lifetime`, ensures connections don't live indefinitely.
    pub max_requests_per_connection: usize,

    /// Maximum lifetime of connection from establishment to closure (default: `2 minutes`)
    ///
    /// Final safety net that guarantees no connection lives longer than this duration.
    /// In practice, connections are typically cleaned up by `socket_read_timeout`
    /// or `max_requests_per_connection` long before this limit is reached.
    pub connection_lifetime: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(2),
            socket_write_timeout: Duration::from_secs(3),
            connection_lifetime: Duration::from_secs(120),
            max_requests_per_connection: 100,

            _priv: (),
        }
    }
}

/// HTTP request parsing limits and buffer pre-allocation strategy
///
/// **SECURITY-FIRST DEFAULTS**
///
/// These limits are intentionally conservative to prevent resource exhaustion
/// and various parsing attacks. They work well for:
/// - Simple REST APIs
/// - Microservices
/// - Internal tools
/// - Low-memory environments
///
/// You MAY need to increase these if you see:
/// - `413 Payload Too Large` for legitimate requests
/// - `414 URI Too Long` for normal API calls
/// - `431 Request Header Fields Too Large`
///
/// # Memory Allocation Strategy
///
/// Each TCP connection pre-allocates a fixed-size buffer based on these limits:
///
/// ```text
/// Total Buffer = First Line + (Headers x Header Line) + Body + Overhead
/// ```
///
/// # Example
/// ```
/// use coronet::limits::ReqLimits;
///
/// let mut limits = ReqLimits::default();
/// let buffer_size = limits.estimated_buffer_size();
/// println!("Each connection needs {} bytes for data buffer", buffer_size);
/// ```
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum URL length in bytes including path and query string (default: `256 B`)
    pub url_size: usize,
    /// Maximum number of path segments in URL (default: `8 segments`)
    pub url_parts: usize,
    /// Maximum query string length (default: `128`)
    pub url_query_size: usize,
    /// Maximum number of query parameters (default: `8`)
    pub url_query_parts: usize,

    /// Maximum number of headers per request (default: `16 headers`)
    pub header_count: usize,
    /// Maximum header name length in bytes (default: `64 B`)
    pub header_name_size: usize,
    /// Maximum header value length in bytes (default: `512 B`)
    pub header_value_size: usize,

    /// Maximum request body size in bytes (default: `4 KB`)
    pub body_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub precalc: ReqLimitsPrecalc,
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            url_size: 256,
            url_parts: 8,
            url_query_size: 128,
            url_query_parts: 8,

            header_count: 16,
            header_name_size: 64,
            header_value_size: 512,

            body_size: 4 * 1024,

            precalc: ReqLimitsPrecalc::default(),
        }
    }
}

impl ReqLimits {
    /// Returns the estimated memory buffer size required per connection.
    #[inline(always)]
    pub fn estimated_buffer_size(self) -> usize {
        self.precalculate().precalc.buffer
    }

    #[inline(always)]
    pub(crate) fn precalculate(mut self) -> Self {
        self.precalc.first_line = self.first_line();
        self.precalc.h_line = self.h_line();
        self.precalc.buffer = self.buffer();
        self.precalc.req_without_body = self.precalc.buffer - self.body_size;

        self
    }

    #[inline(always)]
    // First line + Header * N + "\r\n" + Body
    fn buffer(&self) -> usize {
        self.precalc.first_line + self.header_count * self.precalc.h_line + 2 + self.body_size
    }

    #[inline(always)]
    // First line HTTP request:
    // GET /url/test HTTP/1.1\r\n
    // Formula: Method(7) + " " + URl + " " + Version(8) + "\r\n"
    fn first_line(&self) -> usize {
        19 + self.url_size
    }

    #[inline(always)]
    // Header:
    // Authorization: Sample%20Data\r\n
    // Formula: Name + ": " + Value +  "\r\n"
    fn h_line(&self) -> usize {
        self.header_name_size + self.header_value_size + 4
    }
}

#[doc(hidden)]
#[derive(Debug, Clone, Default)]
pub struct ReqLimitsPrecalc {
    pub(crate) buffer: usize,
    pub(crate) first_line: usize,
    #[allow(dead_code)]
    pub(crate) req_without_body: usize,
    pub(crate) h_line: usize,
}

/// Configuration for response processing and memory allocation limits.
///
/// Controls how response buffers are allocated and managed to balance
/// memory usage and performance.
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Initial buffer capacity allocated for responses (default: `1024 B`)
    pub default_capacity: usize,
    /// Maximum allowed buffer capacity for responses (default: `8192 B`)
    pub max_capacity: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            default_capacity: 1024,
            max_capacity: 8 * 1024,

            _priv: (),
        }
    }
}

/// TLS transport limits and handshake configuration (§4.5, §6).
///
/// The handshake is driven over `rustls`; these knobs mirror the original
/// per-socket handshake behaviour (timeout on the underlying reads/writes
/// the handshake performs) rather than exposing `rustls`'s own config
/// surface directly.
#[derive(Debug, Clone)]
pub struct TlsLimits {
    /// Maximum duration the handshake loop may spend suspended on the
    /// underlying socket before failing with `HttpsHandshake` (default:
    /// `10 seconds`).
    pub handshake_timeout: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for TlsLimits {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),

            _priv: (),
        }
    }
}

/// `HttpClient` limits (§4.11).
#[derive(Debug, Clone)]
pub struct ClientLimits {
    /// Default request timeout when none is given to
    /// [`HttpClient::initialize`](crate::http::client::HttpClient::initialize)
    /// (default: `1 second`, `HTTP_CLIENT_TIMEOUT_US` in §6).
    pub default_timeout: Duration,

    /// Fast-buffer soft initial size for the response parser (default:
    /// `128 KiB`, `DEFAULT_RECV_BUFFER_SIZE` in §6).
    pub recv_buffer_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ClientLimits {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(1),
            recv_buffer_size: 128 * 1024,

            _priv: (),
        }
    }
}

/// WebSocket client limits (§4.12, §6).
#[derive(Debug, Clone)]
pub struct WsLimits {
    /// Maximum reassembled payload size across fragments before the
    /// message is dropped (default: `4 MiB`, `MAX_WS_PACKET` in §6).
    pub max_packet_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for WsLimits {
    fn default() -> Self {
        Self {
            max_packet_size: 4 * 1024 * 1024,

            _priv: (),
        }
    }
}
