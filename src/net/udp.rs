//! UDP transport: `listen_udp`/`dial_udp` (§4.4, grounded on
//! `original_source/src/net/layer4/coco_udp.cpp`'s `ListenUdp`/`DialUdp`).
//!
//! Unlike TCP, a UDP "connection" is a convention this crate imposes on
//! top of a connectionless socket: [`UdpConn`] remembers the peer address
//! it dialed and reduces `read`/`write` to `recvfrom`/`sendto` against
//! that address, while [`UdpListener`] exposes `recvfrom`/`sendto`
//! directly since "accept" has no UDP analogue.
use crate::{errors::ErrorKind, limits::ConnLimits, net::descriptor::Descriptor};
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::{net::UdpSocket, time::sleep};

/// A UDP socket bound to a single remote peer by convention.
pub struct UdpConn {
    inner: UdpSocket,
    descriptor: Descriptor,
    peer_addr: SocketAddr,
    read_timeout: Duration,
    write_timeout: Duration,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl UdpConn {
    fn new(inner: UdpSocket, peer_addr: SocketAddr, limits: &ConnLimits) -> Self {
        Self {
            inner,
            descriptor: Descriptor::next(),
            peer_addr,
            read_timeout: limits.socket_read_timeout,
            write_timeout: limits.socket_write_timeout,
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    #[inline(always)]
    pub fn descriptor(&self) -> Descriptor {
        self.descriptor
    }

    #[inline(always)]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    #[inline(always)]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Receives a datagram from the dialed peer into `buf` (§4.2 `recvfrom`).
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        tokio::select! {
            biased;

            result = self.inner.recv(buf) => {
                let n = result.map_err(|_| ErrorKind::SocketRead)?;
                self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            () = sleep(self.read_timeout) => Err(ErrorKind::SocketTimeout(self.read_timeout)),
        }
    }

    /// Sends `buf` as a single datagram to the dialed peer (§4.2 `sendto`).
    pub async fn write(&mut self, buf: &[u8]) -> Result<(), ErrorKind> {
        tokio::select! {
            biased;

            result = self.inner.send(buf) => {
                result.map_err(|_| ErrorKind::SocketWrite)?;
                self.bytes_written.fetch_add(buf.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            () = sleep(self.write_timeout) => Err(ErrorKind::SocketTimeout(self.write_timeout)),
        }
    }
}

/// A bound, unconnected UDP socket serving arbitrary peers (§4.4).
pub struct UdpListener {
    inner: UdpSocket,
    descriptor: Descriptor,
    local_addr: SocketAddr,
}

impl UdpListener {
    #[inline(always)]
    pub fn descriptor(&self) -> Descriptor {
        self.descriptor
    }

    #[inline(always)]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receives one datagram, returning its payload length and sender
    /// address (§4.4 `recvfrom`).
    pub async fn recvfrom(
        &self,
        buf: &mut [u8],
        limits: &ConnLimits,
    ) -> Result<(usize, SocketAddr), ErrorKind> {
        tokio::select! {
            biased;

            result = self.inner.recv_from(buf) => result.map_err(|_| ErrorKind::SocketRead),
            () = sleep(limits.socket_read_timeout) => {
                Err(ErrorKind::SocketTimeout(limits.socket_read_timeout))
            }
        }
    }

    /// Sends one datagram to `addr` (§4.4 `sendto`).
    pub async fn sendto(
        &self,
        buf: &[u8],
        addr: SocketAddr,
        limits: &ConnLimits,
    ) -> Result<(), ErrorKind> {
        tokio::select! {
            biased;

            result = self.inner.send_to(buf, addr) => {
                result.map(|_| ()).map_err(|_| ErrorKind::SocketWrite)
            }
            () = sleep(limits.socket_write_timeout) => {
                Err(ErrorKind::SocketTimeout(limits.socket_write_timeout))
            }
        }
    }
}

/// Binds a UDP socket for arbitrary-peer traffic (§4.4).
pub async fn listen_udp(addr: SocketAddr) -> Result<UdpListener, ErrorKind> {
    let inner = UdpSocket::bind(addr).await.map_err(|_| ErrorKind::SocketBind)?;
    let local_addr = inner.local_addr().map_err(|_| ErrorKind::SocketBind)?;

    Ok(UdpListener {
        inner,
        descriptor: Descriptor::next(),
        local_addr,
    })
}

/// Binds an ephemeral local UDP socket and "dials" `addr` - UDP has no
/// handshake, so dialing just records the peer for [`UdpConn::read`]/
/// [`UdpConn::write`] to target implicitly (§4.4).
pub async fn dial_udp(addr: SocketAddr, limits: &ConnLimits) -> Result<UdpConn, ErrorKind> {
    let bind_addr: SocketAddr = if addr.is_ipv6() {
        "[::]:0".parse().unwrap()
    } else {
        "0.0.0.0:0".parse().unwrap()
    };

    let inner = UdpSocket::bind(bind_addr)
        .await
        .map_err(|_| ErrorKind::SocketCreate)?;
    inner.connect(addr).await.map_err(|_| ErrorKind::SocketConnect)?;

    Ok(UdpConn::new(inner, addr, limits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dial_and_listen_roundtrip() {
        let listener = listen_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let limits = ConnLimits::default();

        let mut client = dial_udp(listener.local_addr(), &limits).await.unwrap();
        client.write(b"ping").await.unwrap();

        let mut buf = [0u8; 16];
        let (n, peer) = listener.recvfrom(&mut buf, &limits).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        listener.sendto(b"pong", peer, &limits).await.unwrap();

        let mut reply = [0u8; 16];
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"pong");

        assert_eq!(client.bytes_written(), 4);
        assert_eq!(client.bytes_read(), 4);
    }

    #[tokio::test]
    async fn read_times_out_on_silent_peer() {
        let limits = ConnLimits {
            socket_read_timeout: Duration::from_millis(20),
            ..ConnLimits::default()
        };
        let mut client = dial_udp("127.0.0.1:9".parse().unwrap(), &limits)
            .await
            .unwrap();

        let mut buf = [0u8; 4];
        let err = client.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, ErrorKind::SocketTimeout(_)));
    }
}
