//! TCP transport: `listen_tcp`/`dial_tcp` (§4.2, grounded on
//! `original_source/src/net/layer4/coco_tcp.cpp`'s `ListenTcp`/`DialTcp`).
use crate::{
    errors::ErrorKind,
    limits::ConnLimits,
    net::socket::Socket,
};
use socket2::{Domain, Socket as Socket2, TcpKeepalive, Type};
use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    time::Duration,
};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};

/// A connected TCP socket.
pub struct TcpConn {
    socket: Socket<TcpStream>,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl TcpConn {
    fn new(stream: TcpStream, limits: &ConnLimits) -> Result<Self, ErrorKind> {
        let peer_addr = stream.peer_addr().map_err(|_| ErrorKind::SocketConnect)?;
        let local_addr = stream.local_addr().map_err(|_| ErrorKind::SocketConnect)?;
        stream.set_nodelay(true).map_err(|_| ErrorKind::SocketCreate)?;

        Ok(Self {
            socket: Socket::new(stream, limits.socket_read_timeout, limits.socket_write_timeout),
            peer_addr,
            local_addr,
        })
    }

    #[inline(always)]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    #[inline(always)]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[inline(always)]
    pub fn socket(&mut self) -> &mut Socket<TcpStream> {
        &mut self.socket
    }

    pub(crate) fn into_stream(self) -> TcpStream {
        self.socket.into_inner()
    }
}

/// A bound TCP listener with an explicit backlog, built via `socket2` so
/// `SO_REUSEADDR` and the backlog size are both under caller control
/// (`tokio::net::TcpListener::bind` alone doesn't expose either).
pub struct TcpListener {
    inner: TokioTcpListener,
    local_addr: SocketAddr,
}

/// Binds and listens on `addr` with the given backlog (§6, default `512`).
pub fn listen_tcp(addr: SocketAddr, backlog: u32) -> Result<TcpListener, ErrorKind> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };

    let socket = Socket2::new(domain, Type::STREAM, None).map_err(|_| ErrorKind::SocketCreate)?;
    socket.set_reuse_address(true).map_err(|_| ErrorKind::SocketBind)?;
    socket.set_nonblocking(true).map_err(|_| ErrorKind::SocketBind)?;
    socket.bind(&addr.into()).map_err(|_| ErrorKind::SocketBind)?;
    socket
        .listen(backlog as i32)
        .map_err(|_| ErrorKind::SocketListen)?;

    let std_listener: StdTcpListener = socket.into();
    let inner = TokioTcpListener::from_std(std_listener).map_err(|_| ErrorKind::SocketListen)?;
    let local_addr = inner.local_addr().map_err(|_| ErrorKind::SocketListen)?;

    Ok(TcpListener { inner, local_addr })
}

impl TcpListener {
    #[inline(always)]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts one connection, applying `limits` to the resulting socket.
    pub async fn accept(&self, limits: &ConnLimits) -> Result<TcpConn, ErrorKind> {
        let (stream, _) = self.inner.accept().await.map_err(|_| ErrorKind::SocketListen)?;
        TcpConn::new(stream, limits)
    }
}

/// Connects to `addr`, applying `limits` to the resulting socket
/// (§4.11, used by [`HttpClient`](crate::http::client::HttpClient)).
pub async fn dial_tcp(addr: SocketAddr, limits: &ConnLimits) -> Result<TcpConn, ErrorKind> {
    let stream = tokio::select! {
        biased;

        result = TcpStream::connect(addr) => result.map_err(|_| ErrorKind::SocketConnect)?,
        () = tokio::time::sleep(limits.socket_write_timeout) => {
            return Err(ErrorKind::SocketTimeout(limits.socket_write_timeout));
        }
    };

    TcpConn::new(stream, limits)
}

/// Applies a keepalive policy to a raw std TCP socket before it is handed
/// to tokio - useful for long-lived client connections that otherwise
/// look idle to intermediate NAT/firewalls.
pub fn set_keepalive(socket: &TcpStream, idle: Duration) -> Result<(), ErrorKind> {
    let socket2 = socket2::SockRef::from(socket);
    let keepalive = TcpKeepalive::new().with_time(idle);
    socket2.set_tcp_keepalive(&keepalive).map_err(|_| ErrorKind::SocketCreate)
}
