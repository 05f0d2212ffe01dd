//! Uniform, timeout-bounded read/write surface over a byte stream (§4.2).
//!
//! Every transport this crate offers - plain TCP, UDP framed as a
//! connection, and TLS - ends up behind the same four operations:
//! `read`, `read_fully`, `write`, `writev`. [`Socket`] is that common
//! surface, generic over anything implementing [`AsyncRead`] +
//! [`AsyncWrite`], so the HTTP and WebSocket layers above it never need
//! to know whether they are talking to a [`TcpStream`](tokio::net::TcpStream)
//! or a [`tokio_rustls`] session.
//!
//! The timeout pattern (`tokio::select! { biased; ... }` racing the I/O
//! future against a [`sleep`]) is lifted directly from the teacher's
//! connection-handling code, generalized from "one read, one write" to
//! the full surface a client and a server both need.
use crate::{errors::ErrorKind, net::descriptor::Descriptor};
use std::{
    future::Future,
    io,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::sleep,
};

/// A byte stream wrapped with read/write timeouts and byte counters.
///
/// `Socket` owns the underlying stream outright; callers that need to
/// split read and write halves should do so on the inner type before
/// wrapping it (TLS sessions in particular are not splittable the same
/// way a [`TcpStream`](tokio::net::TcpStream) is).
pub struct Socket<T> {
    inner: T,
    descriptor: Descriptor,
    read_timeout: Duration,
    write_timeout: Duration,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Socket<T> {
    pub(crate) fn new(inner: T, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            inner,
            descriptor: Descriptor::next(),
            read_timeout,
            write_timeout,
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    /// This socket's stable identity, for logging.
    #[inline(always)]
    pub fn descriptor(&self) -> Descriptor {
        self.descriptor
    }

    /// Total bytes read since construction.
    #[inline(always)]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Total bytes written since construction.
    #[inline(always)]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    #[inline]
    pub(crate) fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Changes the read timeout; takes effect at the next suspension (§4.2).
    #[inline]
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    /// Changes the write timeout; takes effect at the next suspension (§4.2).
    #[inline]
    pub fn set_write_timeout(&mut self, timeout: Duration) {
        self.write_timeout = timeout;
    }

    #[inline]
    pub(crate) fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwraps the socket, discarding its descriptor and byte counters -
    /// used when a transport hands its underlying stream to a layer above
    /// it (e.g. a TLS session taking ownership of a plain `TcpStream`).
    #[inline]
    pub(crate) fn into_inner(self) -> T {
        self.inner
    }

    /// Reads into `buf` once, returning the number of bytes read (`0`
    /// means the peer closed the connection). Fails with
    /// [`ErrorKind::SocketTimeout`] if nothing arrives within the
    /// configured read timeout.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        tokio::select! {
            biased;

            result = self.inner.read(buf) => {
                let n = result.map_err(|_| ErrorKind::SocketRead)?;
                self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            () = sleep(self.read_timeout) => Err(ErrorKind::SocketTimeout(self.read_timeout)),
        }
    }

    /// Reads exactly `buf.len()` bytes, or fails with
    /// [`ErrorKind::SocketReadFully`] on early EOF.
    ///
    /// The timeout applies to the whole fill, not to each underlying
    /// read - a peer trickling one byte at a time cannot keep the
    /// connection open indefinitely by staying just under a per-read
    /// timeout.
    pub async fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        tokio::select! {
            biased;

            result = self.inner.read_exact(buf) => {
                result.map_err(|_| ErrorKind::SocketReadFully)?;
                self.bytes_read.fetch_add(buf.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            () = sleep(self.read_timeout) => Err(ErrorKind::SocketTimeout(self.read_timeout)),
        }
    }

    /// Writes the whole of `buf`, or fails with [`ErrorKind::SocketTimeout`]
    /// once the write timeout elapses.
    pub async fn write(&mut self, buf: &[u8]) -> Result<(), ErrorKind> {
        tokio::select! {
            biased;

            result = self.inner.write_all(buf) => {
                result.map_err(|_| ErrorKind::SocketWrite)?;
                self.bytes_written.fetch_add(buf.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            () = sleep(self.write_timeout) => Err(ErrorKind::SocketTimeout(self.write_timeout)),
        }
    }

    /// Writes each buffer in `bufs` in order as a single logical write,
    /// under one shared timeout budget.
    pub async fn writev(&mut self, bufs: &[&[u8]]) -> Result<(), ErrorKind> {
        tokio::select! {
            biased;

            result = async {
                for buf in bufs {
                    self.inner.write_all(buf).await?;
                    self.bytes_written.fetch_add(buf.len() as u64, Ordering::Relaxed);
                }
                Ok::<(), io::Error>(())
            } => result.map_err(|_| ErrorKind::SocketWrite),
            () = sleep(self.write_timeout) => Err(ErrorKind::SocketTimeout(self.write_timeout)),
        }
    }

    /// Flushes any internally buffered bytes (relevant mainly to TLS
    /// sessions, which buffer plaintext until a record boundary).
    pub async fn flush(&mut self) -> Result<(), ErrorKind> {
        self.inner.flush().await.map_err(|_| ErrorKind::SocketWrite)
    }
}

/// The read/write/timeout surface [`Socket`] exposes, lifted to a trait so
/// the HTTP message layer and the WebSocket framer can suspend on either a
/// plain [`Socket<T>`] or a [`Transport`](crate::http::client::Transport)
/// (TCP-or-TLS) without knowing which one they were handed.
pub(crate) trait ByteStream: Send {
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, ErrorKind>> + Send;
    fn read_fully(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<(), ErrorKind>> + Send;
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = Result<(), ErrorKind>> + Send;
    fn writev(&mut self, bufs: &[&[u8]]) -> impl Future<Output = Result<(), ErrorKind>> + Send;
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for Socket<T> {
    #[inline]
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        Socket::read(self, buf).await
    }

    #[inline]
    async fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        Socket::read_fully(self, buf).await
    }

    #[inline]
    async fn write(&mut self, buf: &[u8]) -> Result<(), ErrorKind> {
        Socket::write(self, buf).await
    }

    #[inline]
    async fn writev(&mut self, bufs: &[&[u8]]) -> Result<(), ErrorKind> {
        Socket::writev(self, bufs).await
    }
}
