//! Response-side HTTP/1.1 message parsing (§4.7, §4.8).
//!
//! `request.rs` parses *requests* out of a fixed-capacity buffer it owns
//! outright, which lets it hand out `'static` slices into that buffer.
//! A client reading a *response* has no such buffer to own - it is
//! handed a [`FastBuffer`] that keeps growing and compacting across
//! reads - so the types here are all owned (`Box<[u8]>`) rather than
//! borrowed. Slower to allocate, but the only sound option once the
//! backing storage can move under you.
use crate::{
    errors::ErrorKind,
    http::{fastbuffer::FastBuffer, types::slice_to_usize},
    net::socket::ByteStream,
    StatusCode, Version,
};

/// One response header, owned because it may outlive the `FastBuffer`
/// region it was copied out of.
#[derive(Debug, Clone)]
pub(crate) struct OwnedHeader {
    pub(crate) name: Box<[u8]>,
    pub(crate) value: Box<[u8]>,
}

impl OwnedHeader {
    fn name_eq(&self, other: &[u8]) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}

/// A parsed status line plus headers - the head of an HTTP response,
/// not including the body (§4.8 steps 1-4).
#[derive(Debug, Clone)]
pub(crate) struct ParsedResponse {
    pub(crate) version: Version,
    pub(crate) status: u16,
    pub(crate) reason: Box<[u8]>,
    pub(crate) headers: Vec<OwnedHeader>,
    pub(crate) chunked: bool,
    pub(crate) content_length: Option<usize>,
    pub(crate) keep_alive: bool,
}

impl ParsedResponse {
    pub(crate) fn header(&self, name: &[u8]) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.name_eq(name))
            .map(|h| &*h.value)
    }

    /// Status as the crate's [`StatusCode`] enum, when it is one of the
    /// codes this crate knows by name. Unrecognized codes (proxies and
    /// exotic servers invent their own) are still available via
    /// [`ParsedResponse::status`] as a raw number.
    pub(crate) fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status)
    }
}

/// Scans `buf` for the blank line ending a header block, growing from
/// `reader` as needed, then parses the status line and headers found.
///
/// Mirrors the HTTP parser façade's loop (§4.6 step 2): feed what is
/// already buffered, compute how much was consumed, and only read more
/// off the wire once the buffer has been found insufficient.
pub(crate) async fn parse_response<S: ByteStream>(
    reader: &mut S,
    buf: &mut FastBuffer,
) -> Result<ParsedResponse, ErrorKind> {
    let head_end = loop {
        if let Some(pos) = memchr::memmem::find(buf.bytes(), b"\r\n\r\n") {
            break pos + 4;
        }

        let before = buf.size();
        let read = buf.grow(reader, before + 1).await?;
        if read == 0 {
            return Err(ErrorKind::HttpParseUri);
        }
    };

    let head = buf.take(head_end);
    parse_head(&head[..head.len() - 4])
}

fn parse_head(head: &[u8]) -> Result<ParsedResponse, ErrorKind> {
    let mut lines = head.split(|&b| b == b'\n').map(strip_cr);
    let status_line = lines.next().ok_or(ErrorKind::HttpParseUri)?;

    let mut parts = status_line.splitn(3, |&b| b == b' ');
    let version_raw = parts.next().ok_or(ErrorKind::InvalidVersion)?;
    let status_raw = parts.next().ok_or(ErrorKind::HttpParseUri)?;
    let reason = parts.next().unwrap_or(b"");

    let (version, mut keep_alive) = Version::from_bytes(version_raw)?;
    let status = slice_to_usize(status_raw).ok_or(ErrorKind::HttpParseUri)? as u16;

    let mut headers = Vec::new();
    let mut chunked = false;
    let mut content_length = None;

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return Err(ErrorKind::InvalidHeader);
        };

        let mut name: Box<[u8]> = line[..colon].to_vec().into_boxed_slice();
        crate::http::types::to_lower_case(&mut name);
        let value_start = colon + 1 + line[colon + 1..].iter().take_while(|&&b| b == b' ').count();
        let value: Box<[u8]> = line[value_start..].to_vec().into_boxed_slice();

        match &*name {
            b"transfer-encoding" => chunked = value.eq_ignore_ascii_case(b"chunked"),
            b"content-length" => {
                content_length = Some(slice_to_usize(&value).ok_or(ErrorKind::InvalidContentLength)?)
            }
            b"connection" => keep_alive = !value.eq_ignore_ascii_case(b"close"),
            _ => {}
        }

        headers.push(OwnedHeader { name, value });
    }

    Ok(ParsedResponse {
        version,
        status,
        reason: reason.to_vec().into_boxed_slice(),
        headers,
        chunked,
        content_length,
        keep_alive,
    })
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

/// Drives the three response-body shapes a server may use (§4.8): a
/// declared `Content-Length`, `Transfer-Encoding: chunked`, or - lacking
/// both - read-until-EOF.
pub(crate) enum BodyReader {
    ContentLength { remaining: usize },
    Chunked { remaining_in_chunk: usize, done: bool },
    UntilEof { done: bool },
}

impl BodyReader {
    pub(crate) fn for_response(resp: &ParsedResponse) -> Self {
        if resp.chunked {
            BodyReader::Chunked {
                remaining_in_chunk: 0,
                done: false,
            }
        } else if let Some(len) = resp.content_length {
            BodyReader::ContentLength { remaining: len }
        } else {
            BodyReader::UntilEof { done: false }
        }
    }

    /// Reads the whole body into one buffer. Fine for the request/reply
    /// client this crate ships (§4.11) - it never streams megabyte-scale
    /// bodies - but would need a streaming variant to go further.
    pub(crate) async fn read_to_end<S: ByteStream>(
        &mut self,
        reader: &mut S,
        buf: &mut FastBuffer,
    ) -> Result<Vec<u8>, ErrorKind> {
        let mut out = Vec::new();

        loop {
            match self {
                BodyReader::ContentLength { remaining } => {
                    if *remaining == 0 {
                        return Ok(out);
                    }
                    while buf.size() < *remaining {
                        let need = *remaining - buf.size();
                        if buf.grow(reader, need).await? == 0 {
                            return Err(ErrorKind::HttpResponseEof);
                        }
                    }
                    out.extend_from_slice(buf.take(*remaining));
                    *remaining = 0;
                    return Ok(out);
                }
                BodyReader::Chunked {
                    remaining_in_chunk,
                    done,
                } => {
                    if *done {
                        return Err(ErrorKind::HttpResponseEof);
                    }

                    if *remaining_in_chunk == 0 {
                        let size = read_chunk_size(reader, buf).await?;
                        if size == 0 {
                            // trailing CRLF after the terminating 0-chunk
                            skip_crlf(reader, buf).await?;
                            *done = true;
                            return Ok(out);
                        }
                        *remaining_in_chunk = size;
                    }

                    while buf.size() < *remaining_in_chunk {
                        let need = *remaining_in_chunk - buf.size();
                        if buf.grow(reader, need).await? == 0 {
                            return Err(ErrorKind::HttpResponseEof);
                        }
                    }
                    out.extend_from_slice(buf.take(*remaining_in_chunk));
                    *remaining_in_chunk = 0;
                    skip_crlf(reader, buf).await?;
                }
                BodyReader::UntilEof { done } => {
                    if *done {
                        return Ok(out);
                    }
                    loop {
                        if buf.size() > 0 {
                            out.extend_from_slice(buf.take(buf.size()));
                        }
                        if buf.grow(reader, 1).await? == 0 {
                            *done = true;
                            return Ok(out);
                        }
                    }
                }
            }
        }
    }
}

async fn read_chunk_size<S: ByteStream>(
    reader: &mut S,
    buf: &mut FastBuffer,
) -> Result<usize, ErrorKind> {
    loop {
        if let Some(pos) = memchr::memmem::find(buf.bytes(), b"\r\n") {
            let line = buf.take(pos);
            buf.skip(2);
            let hex = line
                .split(|&b| b == b';')
                .next()
                .ok_or(ErrorKind::HttpInvalidChunkHeader)?;
            return usize::from_str_radix(
                std::str::from_utf8(hex).map_err(|_| ErrorKind::HttpInvalidChunkHeader)?,
                16,
            )
            .map_err(|_| ErrorKind::HttpInvalidChunkHeader);
        }
        if buf.grow(reader, buf.size() + 1).await? == 0 {
            return Err(ErrorKind::HttpResponseEof);
        }
    }
}

async fn skip_crlf<S: ByteStream>(reader: &mut S, buf: &mut FastBuffer) -> Result<(), ErrorKind> {
    while buf.size() < 2 {
        if buf.grow(reader, 2 - buf.size()).await? == 0 {
            return Err(ErrorKind::HttpResponseEof);
        }
    }
    buf.skip(2);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::socket::Socket;
    use tokio::io::duplex;

    async fn parse(bytes: &[u8]) -> (ParsedResponse, FastBuffer) {
        let (client, mut server) = duplex(4096);
        let mut socket = Socket::new(
            client,
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(1),
        );
        tokio::io::AsyncWriteExt::write_all(&mut server, bytes)
            .await
            .unwrap();
        let mut buf = FastBuffer::new(64);
        let resp = parse_response(&mut socket, &mut buf).await.unwrap();
        (resp, buf)
    }

    #[tokio::test]
    async fn parses_status_line_and_headers() {
        let (resp, _) = parse(
            b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\nconnection: keep-alive\r\n\r\nhello",
        )
        .await;

        assert_eq!(resp.status, 200);
        assert_eq!(resp.version, Version::Http11);
        assert_eq!(resp.content_length, Some(5));
        assert!(resp.keep_alive);
        assert!(!resp.chunked);
        assert_eq!(resp.header(b"Content-Length"), Some(&b"5"[..]));
    }

    #[tokio::test]
    async fn reads_a_content_length_body() {
        let (resp, mut buf) = parse(
            b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello",
        )
        .await;

        let (client, _server) = duplex(4);
        let mut socket = Socket::new(
            client,
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(1),
        );
        let mut reader = BodyReader::for_response(&resp);
        let body = reader.read_to_end(&mut socket, &mut buf).await.unwrap();
        assert_eq!(&body, b"hello");
    }

    #[tokio::test]
    async fn reads_a_chunked_body() {
        let (resp, mut buf) = parse(
            b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n",
        )
        .await;

        assert!(resp.chunked);
        let (client, _server) = duplex(4);
        let mut socket = Socket::new(
            client,
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(1),
        );
        let mut reader = BodyReader::for_response(&resp);
        let body = reader.read_to_end(&mut socket, &mut buf).await.unwrap();
        assert_eq!(&body, b"hello");
    }
}
