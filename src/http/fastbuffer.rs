//! Growable, capped receive buffer (§4.6, §3).
//!
//! Grounded on the teacher's `http/request.rs` `Parser` (fixed-capacity
//! buffer filled by one `fill_buffer` call per cycle) and generalised into
//! a buffer that grows on demand instead of rejecting anything past a
//! fixed size - the growable half of `original_source`'s `FastBuffer::grow`:
//! compact the already-read prefix away, then extend capacity in fixed
//! increments up to a hard ceiling.
use crate::{errors::ErrorKind, net::socket::ByteStream};

/// Growth increment once the buffer needs more room than it currently has.
const GROWTH_INCREMENT: usize = 8 * 1024;

/// Hard ceiling on how large a single message's buffer may grow (§4.6).
const MAX_CAPACITY: usize = 10 * 1024 * 1024;

/// A byte buffer that compacts before it grows and refuses to grow past
/// [`MAX_CAPACITY`].
pub(crate) struct FastBuffer {
    data: Vec<u8>,
    read: usize,
    write: usize,
}

impl FastBuffer {
    pub(crate) fn new(initial_capacity: usize) -> Self {
        Self {
            data: vec![0u8; initial_capacity],
            read: 0,
            write: 0,
        }
    }

    /// Unread bytes currently held.
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.write - self.read
    }

    /// The unread region.
    #[inline]
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.data[self.read..self.write]
    }

    /// Drops `n` unread bytes without copying them out.
    pub(crate) fn skip(&mut self, n: usize) {
        self.read = (self.read + n).min(self.write);
    }

    /// Takes up to `n` unread bytes, advancing past them.
    pub(crate) fn take(&mut self, n: usize) -> &[u8] {
        let n = n.min(self.size());
        let start = self.read;
        self.read += n;
        &self.data[start..start + n]
    }

    /// Slides the unread region to the front of the backing vector.
    fn compact(&mut self) {
        if self.read == 0 {
            return;
        }
        self.data.copy_within(self.read..self.write, 0);
        self.write -= self.read;
        self.read = 0;
    }

    /// Ensures at least `needed` bytes of *total capacity* (read + unread)
    /// are available past the write cursor, growing in [`GROWTH_INCREMENT`]
    /// steps up to [`MAX_CAPACITY`] (§4.6).
    fn ensure_capacity(&mut self, needed: usize) -> Result<(), ErrorKind> {
        while self.data.len() - self.write < needed {
            let grown = self.data.len() + GROWTH_INCREMENT;
            if grown > MAX_CAPACITY {
                return Err(ErrorKind::ReaderBufferOverflow);
            }
            self.data.resize(grown, 0);
        }
        Ok(())
    }

    /// Compacts, grows if necessary, and performs one read from `stream`
    /// into the freed tail space. Returns the number of bytes read - `0`
    /// means the peer closed the connection (§4.6 façade step 2d).
    pub(crate) async fn grow<S: ByteStream>(
        &mut self,
        stream: &mut S,
        at_least: usize,
    ) -> Result<usize, ErrorKind> {
        self.compact();
        self.ensure_capacity(at_least.max(1))?;

        let n = stream.read(&mut self.data[self.write..]).await?;
        self.write += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::socket::Socket;
    use tokio::io::duplex;

    #[test]
    fn take_and_skip_advance_the_read_cursor() {
        let mut buf = FastBuffer::new(16);
        buf.data[..5].copy_from_slice(b"hello");
        buf.write = 5;

        assert_eq!(buf.size(), 5);
        assert_eq!(buf.take(3), b"hel");
        assert_eq!(buf.size(), 2);
        buf.skip(2);
        assert_eq!(buf.size(), 0);
    }

    #[tokio::test]
    async fn grow_reads_and_reports_eof() {
        let (client, mut server) = duplex(64);
        let mut socket = Socket::new(client, std::time::Duration::from_secs(1), std::time::Duration::from_secs(1));
        let mut buf = FastBuffer::new(4);

        tokio::io::AsyncWriteExt::write_all(&mut server, b"abcdef").await.unwrap();
        let n = buf.grow(&mut socket, 1).await.unwrap();
        assert!(n > 0);
        assert!(buf.size() > 0);

        drop(server);
        let mut socket2 = socket;
        while socket2.read(&mut [0u8; 0]).await.is_ok() {
            break;
        }
    }

    #[test]
    fn ensure_capacity_rejects_past_hard_cap() {
        let mut buf = FastBuffer::new(MAX_CAPACITY - 1);
        buf.write = MAX_CAPACITY - 1;
        let err = buf.ensure_capacity(2).unwrap_err();
        assert_eq!(err, ErrorKind::ReaderBufferOverflow);
    }

    #[test]
    fn compact_slides_unread_bytes_to_front() {
        let mut buf = FastBuffer::new(8);
        buf.data[..4].copy_from_slice(b"data");
        buf.read = 2;
        buf.write = 4;

        buf.compact();
        assert_eq!(buf.read, 0);
        assert_eq!(buf.write, 2);
        assert_eq!(&buf.data[..2], b"ta");
    }
}
