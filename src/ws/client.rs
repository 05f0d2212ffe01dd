//! WebSocket client (§4.12), grounded on `original_source`'s
//! `coco_ws.cpp` Upgrade handshake (generate key, verify accept hash,
//! hand the raw socket to the framing layer) and shaped like
//! [`HttpClient`](crate::HttpClient), whose connect-on-demand transport
//! this type borrows wholesale via
//! [`HttpClient::take_transport`](crate::http::client::HttpClient::take_transport).
use crate::{
    errors::ErrorKind,
    http::client::{HttpClient, Transport},
    limits::{ClientLimits, WsLimits},
    ws::frame::{self, TextOrBinary, WsEvent},
};
use base64::Engine;
use rand::RngCore;
use sha1::{Digest, Sha1};

const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Wraps the [`ErrorKind`] taxonomy for client call sites, same shape as
/// [`HttpClientError`](crate::HttpClientError) - a WebSocket failure
/// never renders a response, it just fails or closes the connection.
#[derive(Debug)]
pub struct WsClientError(pub(crate) ErrorKind);

impl std::fmt::Display for WsClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
impl std::error::Error for WsClientError {}
impl From<ErrorKind> for WsClientError {
    fn from(err: ErrorKind) -> Self {
        WsClientError(err)
    }
}
impl From<crate::HttpClientError> for WsClientError {
    fn from(err: crate::HttpClientError) -> Self {
        WsClientError(err.0)
    }
}

/// A connected WebSocket session: an Upgrade handshake followed by
/// framed sends/receives over the raw transport (§4.12).
///
/// Everything below the handshake reuses [`HttpClient`] for the initial
/// GET/101 exchange, then takes the transport out of it - once the
/// handshake completes the connection speaks frames, not HTTP, so
/// nothing below this type knows HTTP exists.
pub struct WsClient {
    transport: Transport,
    limits: WsLimits,
}

impl WsClient {
    /// Performs the Upgrade handshake against `path` on `client` and
    /// returns a connected [`WsClient`] (§4.12 Upgrade).
    ///
    /// Fails with [`ErrorKind::WsUpgradeRejected`] if the server answers
    /// with anything but 101, or if `Sec-WebSocket-Accept` does not match
    /// the key this call generated.
    pub async fn connect(
        client: &mut HttpClient,
        path: &str,
        ws_limits: &WsLimits,
    ) -> Result<Self, WsClientError> {
        let mut key_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut key_bytes);
        let key = base64::engine::general_purpose::STANDARD.encode(key_bytes);

        let host = client.host().to_string();
        let headers = [
            ("host", host.as_str()),
            ("user-agent", "coronet/0.1"),
            ("upgrade", "websocket"),
            ("connection", "Upgrade"),
            ("sec-websocket-version", "13"),
            ("sec-websocket-key", key.as_str()),
        ];

        let response = client
            .send_request(crate::Method::Get, path, &headers, b"")
            .await?;

        if response.status() != 101 {
            return Err(WsClientError(ErrorKind::WsUpgradeRejected));
        }

        let expected = accept_hash(&key);
        let accept = response
            .header(b"sec-websocket-accept")
            .ok_or(ErrorKind::WsUpgradeRejected)?;
        if accept != expected.as_bytes() {
            return Err(WsClientError(ErrorKind::WsUpgradeRejected));
        }

        let transport = client
            .take_transport()
            .ok_or(ErrorKind::WsUpgradeRejected)?;

        Ok(Self {
            transport,
            limits: ws_limits.clone(),
        })
    }

    /// Convenience constructor using [`ClientLimits`]/[`WsLimits`]
    /// defaults, dialing `host:port` before the handshake.
    pub async fn dial(
        https: bool,
        host: impl Into<String>,
        port: u16,
        path: &str,
    ) -> Result<Self, WsClientError> {
        let client_limits = ClientLimits::default();
        let ws_limits = WsLimits::default();
        let mut client = HttpClient::initialize(https, host, port, None, &client_limits);
        Self::connect(&mut client, path, &ws_limits).await
    }

    /// Sends one complete text message, masked (§4.12 `send`).
    pub async fn send_text(&mut self, text: &str) -> Result<(), WsClientError> {
        frame::send(&mut self.transport, TextOrBinary::Text, text.as_bytes())
            .await
            .map_err(WsClientError)
    }

    /// Sends one complete binary message, masked (§4.12 `send`).
    pub async fn send_binary(&mut self, payload: &[u8]) -> Result<(), WsClientError> {
        frame::send(&mut self.transport, TextOrBinary::Binary, payload)
            .await
            .map_err(WsClientError)
    }

    /// Waits for the next application message, transparently answering
    /// pings and reassembling fragments along the way (§4.12 dispatch).
    pub async fn recv(&mut self) -> Result<WsEvent, WsClientError> {
        frame::recv_event(&mut self.transport, &self.limits)
            .await
            .map_err(WsClientError)
    }
}

fn accept_hash(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(ACCEPT_GUID.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}
