//! coronet - cooperative-coroutine networking core
//!
//! Sync-looking TCP/UDP/TLS/HTTP/WebSocket programming over a single
//! async reactor. One [`Coroutine`](runtime::Coroutine) per connection,
//! scheduled cooperatively on tokio's own I/O driver instead of a
//! hand-rolled epoll/kqueue loop; a [`ConnManager`](net::manager::ConnManager)
//! tracks live connections and reaps the ones that asked to die at the
//! next safe point instead of deleting them from inside their own cycle.
//!
//! # Protocol support
//!
//! - **TCP/UDP** sockets with uniform read/write/timeout semantics
//!   ([`net::socket::Socket`]).
//! - **TLS** server and client transport over the same socket
//!   abstraction ([`net::tls::SslConn`]).
//! - **HTTP/1.1 and HTTP/1.0** server with chunked transfer-encoding,
//!   persistent connections, and a path+vhost [`HttpMux`](http::mux::HttpMux).
//! - **HTTP client** ([`http::client::HttpClient`]) for issuing requests
//!   over the same transport stack the server uses.
//! - **WebSocket client** ([`ws::client::WsClient`]) with RFC 6455
//!   framing, fragmentation reassembly, and control-frame handling.
//!
//! # Features
//!
//! ## 🔒 Security & Protection
//! - **Built-in DoS/DDoS protection** - enabled by default, with no performance penalty.
//! - **Fully configurable limits and timeouts** for requests, responses, connections,
//!   TLS handshakes, and WebSocket packets.
//! - **Custom connection filtering** - implement the [`ConnectionFilter`] trait to
//!   reject unwanted connections at the TCP level.
//!
//! ## 🚀 Performance & Memory
//! - **Growable, capped receive buffers** - [`http::fastbuffer::FastBuffer`] compacts
//!   before it grows and refuses to grow past a hard ceiling.
//! - **Pre-allocated memory for each connection** - linear and transparent scaling.
//!
//! ## 🏭 Production Ready
//! - **Graceful performance degradation** - automatic 503 responses when overloaded.
//! - [**Custom error format**
//!   ](limits::ServerLimits#structfield.json_errors) -
//!   structured JSON (with codes/descriptions) or a plain HTTP response.
//! - **Resource protection** - automatic closure of connections exceeding set limits.
//! - **Structured logging** via [`tracing`](https://docs.rs/tracing), not `println!`.
//!
//! # Quick Start
//!
//! ```no_run
//! use coronet::{Server, Handler, Request, Response, Handled, StatusCode};
//! use tokio::net::TcpListener;
//!
//! struct MyHandler;
//!
//! impl Handler for MyHandler {
//!     async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
//!         resp.status(StatusCode::Ok).body("Hello World!")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .handler(MyHandler)
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```
pub mod runtime;

pub(crate) mod net {
    pub mod descriptor;
    pub mod manager;
    pub mod socket;
    pub mod tcp;
    pub mod tls;
    pub mod udp;
}
pub(crate) mod http {
    pub mod client;
    pub mod fastbuffer;
    pub mod message;
    pub mod mux;
    pub mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod ws {
    pub mod client;
    pub mod frame;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod server_impl;
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    http::{
        client::{HttpClient, HttpClientError, HttpResponse},
        mux::HttpMux,
        query,
        request::Request,
        response::{
            write::{BodyWriter, WriteBuffer},
            Handled, Response,
        },
        types::{Method, StatusCode, Url, Version},
    },
    net::{
        manager::ConnManager,
        tcp::{TcpConn, TcpListener as CoronetTcpListener},
        tls::SslConn,
        udp::{UdpConn, UdpListener},
    },
    runtime::Coroutine,
    server::{
        connection::{ConnectionData, ConnectionFilter},
        server_impl::{Handler, Server, ServerBuilder},
    },
    ws::{
        client::{WsClient, WsClientError},
        frame::WsEvent,
    },
};

#[doc(hidden)]
pub fn run_test<F: FnOnce(&Request, &mut Response) -> Handled>(f: F) {
    f(
        &Request::new(&crate::limits::ReqLimits::default()),
        &mut Response::new(&crate::limits::RespLimits::default()),
    );
}

#[doc(hidden)]
#[macro_export]
macro_rules! impt_default_handler {
    ($name:ident) => {
        use coronet::{Handled, Handler, Request, Response, StatusCode};
        struct $name;

        // `<()>` to check functionality
        impl Handler<()> for $name {
            async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
                resp.status(StatusCode::Ok).body("Hello world!")
            }
        }
    };
}

#[doc(hidden)]
#[cfg(test)]
pub(crate) mod tools {
    use std::str::from_utf8;

    #[inline]
    pub(crate) fn str(value: Option<&[u8]>) -> Option<&str> {
        Some(from_utf8(value?).unwrap())
    }

    #[inline]
    pub(crate) fn str_op(value: &[u8]) -> &str {
        from_utf8(value).unwrap()
    }

    #[inline]
    pub(crate) fn str_2<'a>(value: (&'a [u8], &'a [u8])) -> (&'a str, &'a str) {
        (from_utf8(value.0).unwrap(), from_utf8(value.1).unwrap())
    }
}
