//! RFC 6455 frame codec (§4.12).
//!
//! Grounded on `cpkb-bluezoo-tagliacarte/core/src/protocol/websocket/frame.rs`'s
//! header layout and `original_source/src/net/layer7/coco_ws.{cpp,hpp}`'s
//! dispatch rules (control-frame auto-reply, fragment reassembly with a
//! drop-on-overflow cap).
//!
//! REDESIGN: the original decoder stages a partially-read header byte by
//! byte in a `cache` field (`mask_offset` tracking how far into the mask
//! key it got) so a non-blocking epoll loop can resume a frame across
//! however many `WOULD_BLOCK`s it takes. This crate suspends transparently
//! at every `.await`, so [`read_frame`] just issues sequential
//! [`ByteStream::read_fully`] calls - there is nothing to stage, the
//! coroutine scheduler already does that job.
use crate::{errors::ErrorKind, limits::WsLimits, net::socket::ByteStream};
use rand::RngCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_raw(raw: u8) -> Result<Self, ErrorKind> {
        match raw {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            _ => Err(ErrorKind::WsInvalidFrame),
        }
    }

    fn as_raw(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    fin: bool,
    opcode: Opcode,
    masked: bool,
    payload_len: u64,
}

/// One fully reassembled message delivered to the caller of
/// [`recv_event`], or the fact that the peer closed the socket.
#[derive(Debug)]
pub enum WsEvent {
    Text(String),
    Binary(Vec<u8>),
    Closed,
}

/// Reads one frame header plus its (unmasked) payload in full.
async fn read_frame<S: ByteStream>(
    stream: &mut S,
    limits: &WsLimits,
) -> Result<(FrameHeader, Vec<u8>), ErrorKind> {
    let mut first = [0u8; 2];
    stream.read_fully(&mut first).await?;

    let fin = first[0] & 0x80 != 0;
    let opcode = Opcode::from_raw(first[0] & 0x0F)?;
    let masked = first[1] & 0x80 != 0;
    let len7 = first[1] & 0x7F;

    let payload_len = match len7 {
        126 => {
            let mut ext = [0u8; 2];
            stream.read_fully(&mut ext).await?;
            u16::from_be_bytes(ext) as u64
        }
        127 => {
            let mut ext = [0u8; 8];
            stream.read_fully(&mut ext).await?;
            u64::from_be_bytes(ext)
        }
        n => n as u64,
    };

    if payload_len as usize > limits.max_packet_size {
        return Err(ErrorKind::WsPacketTooLarge);
    }

    let mask = if masked {
        let mut key = [0u8; 4];
        stream.read_fully(&mut key).await?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; payload_len as usize];
    stream.read_fully(&mut payload).await?;
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok((
        FrameHeader {
            fin,
            opcode,
            masked,
            payload_len,
        },
        payload,
    ))
}

fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Encodes one frame. Client-to-server frames are always masked (§4.12);
/// the mask key comes from a process-local RNG, not a cryptographic one -
/// framing only needs unpredictability against naive proxies, not an
/// adversary.
fn encode_frame(opcode: Opcode, payload: &[u8], masked: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    out.push(0x80 | opcode.as_raw());

    let mask_bit = if masked { 0x80 } else { 0x00 };
    match payload.len() {
        n if n < 126 => out.push(mask_bit | n as u8),
        n if n <= u16::MAX as usize => {
            out.push(mask_bit | 126);
            out.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            out.push(mask_bit | 127);
            out.extend_from_slice(&(n as u64).to_be_bytes());
        }
    }

    if masked {
        let mut key = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut key);
        out.extend_from_slice(&key);

        let start = out.len();
        out.extend_from_slice(payload);
        apply_mask(&mut out[start..], key);
    } else {
        out.extend_from_slice(payload);
    }

    out
}

/// Writes one complete (`fin=true`), always-masked message frame (§4.12
/// `send`).
pub(crate) async fn send<S: ByteStream>(
    stream: &mut S,
    opcode: TextOrBinary,
    payload: &[u8],
) -> Result<(), ErrorKind> {
    let frame = encode_frame(opcode.into(), payload, true);
    stream.write(&frame).await
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TextOrBinary {
    Text,
    Binary,
}

impl From<TextOrBinary> for Opcode {
    fn from(value: TextOrBinary) -> Self {
        match value {
            TextOrBinary::Text => Opcode::Text,
            TextOrBinary::Binary => Opcode::Binary,
        }
    }
}

/// Drives frame reads until one full message is ready to deliver, a
/// close is observed, or an error occurs (§4.12 dispatch rules).
///
/// Control frames never reach the caller: `CLOSE` is echoed back and
/// reported as [`WsEvent::Closed`], `PING` gets an automatic `PONG`,
/// `PONG` is silently discarded. Fragmented data frames are reassembled
/// in-line; if the running total would exceed
/// [`WsLimits::max_packet_size`] the partial message is dropped (not an
/// error) and reassembly restarts on the next initial fragment, matching
/// the original decoder's drop-on-overflow behavior.
pub(crate) async fn recv_event<S: ByteStream>(
    stream: &mut S,
    limits: &WsLimits,
) -> Result<WsEvent, ErrorKind> {
    let mut acc: Option<(Opcode, Vec<u8>)> = None;

    loop {
        let (header, payload) = read_frame(stream, limits).await?;

        if header.opcode.is_control() {
            match header.opcode {
                Opcode::Close => {
                    let echo = encode_frame(Opcode::Close, &payload, true);
                    let _ = stream.write(&echo).await;
                    return Ok(WsEvent::Closed);
                }
                Opcode::Ping => {
                    let pong = encode_frame(Opcode::Pong, &payload, true);
                    stream.write(&pong).await?;
                }
                Opcode::Pong => {}
                _ => unreachable!("is_control only matches Close/Ping/Pong"),
            }
            continue;
        }

        let message_opcode = match (header.opcode, &acc) {
            (Opcode::Continuation, Some((opcode, _))) => *opcode,
            (Opcode::Continuation, None) => return Err(ErrorKind::WsInvalidFrame),
            (opcode, None) => opcode,
            (_, Some(_)) => return Err(ErrorKind::WsInvalidFrame),
        };

        let buf = match acc.take() {
            Some((_, mut buf)) => {
                buf.extend_from_slice(&payload);
                buf
            }
            None => payload,
        };

        if buf.len() > limits.max_packet_size {
            acc = None;
            continue;
        }

        if !header.fin {
            acc = Some((message_opcode, buf));
            continue;
        }

        return match message_opcode {
            Opcode::Text => String::from_utf8(buf)
                .map(WsEvent::Text)
                .map_err(|_| ErrorKind::WsInvalidFrame),
            Opcode::Binary => Ok(WsEvent::Binary(buf)),
            _ => Err(ErrorKind::WsInvalidFrame),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::socket::Socket;
    use tokio::io::duplex;

    fn socket(buf_size: usize) -> (Socket<tokio::io::DuplexStream>, tokio::io::DuplexStream) {
        let (client, server) = duplex(buf_size);
        (
            Socket::new(
                client,
                std::time::Duration::from_secs(1),
                std::time::Duration::from_secs(1),
            ),
            server,
        )
    }

    #[test]
    fn mask_is_involutive() {
        let key = [1, 2, 3, 4];
        let mut data = b"hello world".to_vec();
        let original = data.clone();
        apply_mask(&mut data, key);
        assert_ne!(data, original);
        apply_mask(&mut data, key);
        assert_eq!(data, original);
    }

    #[test]
    fn encode_unmasked_small_frame_header() {
        let frame = encode_frame(Opcode::Text, b"hi", false);
        assert_eq!(frame[0], 0x81); // fin + text
        assert_eq!(frame[1], 2); // unmasked len
        assert_eq!(&frame[2..], b"hi");
    }

    #[tokio::test]
    async fn recv_event_reads_a_single_text_frame() {
        let (mut sock, mut server) = socket(256);
        let limits = WsLimits::default();

        let frame = encode_frame(Opcode::Text, b"hello", false);
        tokio::io::AsyncWriteExt::write_all(&mut server, &frame)
            .await
            .unwrap();

        let event = recv_event(&mut sock, &limits).await.unwrap();
        assert!(matches!(event, WsEvent::Text(s) if s == "hello"));
    }

    #[tokio::test]
    async fn recv_event_reassembles_fragments() {
        let (mut sock, mut server) = socket(256);
        let limits = WsLimits::default();

        let mut first = encode_frame(Opcode::Text, b"hel", false);
        first[0] &= !0x80; // clear fin
        let second = encode_frame(Opcode::Continuation, b"lo", false);

        tokio::io::AsyncWriteExt::write_all(&mut server, &first)
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &second)
            .await
            .unwrap();

        let event = recv_event(&mut sock, &limits).await.unwrap();
        assert!(matches!(event, WsEvent::Text(s) if s == "hello"));
    }

    #[tokio::test]
    async fn recv_event_auto_replies_to_ping_then_delivers_text() {
        let (mut sock, mut server) = socket(256);
        let limits = WsLimits::default();

        let ping = encode_frame(Opcode::Ping, b"p", false);
        let text = encode_frame(Opcode::Text, b"hi", false);
        tokio::io::AsyncWriteExt::write_all(&mut server, &ping)
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &text)
            .await
            .unwrap();

        let event = recv_event(&mut sock, &limits).await.unwrap();
        assert!(matches!(event, WsEvent::Text(s) if s == "hi"));

        let mut pong_header = [0u8; 2];
        server.read_exact(&mut pong_header).await.unwrap();
        assert_eq!(pong_header[0] & 0x0F, Opcode::Pong.as_raw());
    }

    #[tokio::test]
    async fn recv_event_reports_close() {
        let (mut sock, mut server) = socket(256);
        let limits = WsLimits::default();

        let close = encode_frame(Opcode::Close, b"", false);
        tokio::io::AsyncWriteExt::write_all(&mut server, &close)
            .await
            .unwrap();

        let event = recv_event(&mut sock, &limits).await.unwrap();
        assert!(matches!(event, WsEvent::Closed));
    }

    use tokio::io::AsyncReadExt;
}
