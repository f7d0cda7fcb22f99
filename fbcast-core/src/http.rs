//! The plain-HTTP surface a new connection talks to before it becomes
//! a session.
//!
//! Exactly one request is read per connection. It is routed to one of:
//!
//! ```text
//! GET /             (no Upgrade header)   viewer page, then close
//! GET /             Upgrade: websocket    session registration
//! GET /favicon.ico                        icon, then close
//! anything else                           close
//! ```

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::error::BridgeError;
use crate::session::write_parts;
use crate::ws;

/// Longest request head read from a new connection.
pub const MAX_REQUEST_LEN: usize = 4096;

const HEAD_END: &[u8] = b"\r\n\r\n";

// ── Request ──────────────────────────────────────────────────────

/// Route chosen for a connection's first request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Page,
    Icon,
    Upgrade { key: String },
    Unknown,
}

/// Route a request head.
///
/// Only `GET` is served. A request for `/` carrying an
/// `Upgrade: websocket` header is an upgrade even when its key is
/// missing; the handshake rejects it later.
pub fn classify(head: &str) -> Request {
    let mut lines = head.lines();
    let Some(request_line) = lines.next() else {
        return Request::Unknown;
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Request::Unknown;
    };
    if method != "GET" {
        return Request::Unknown;
    }
    let path = target.split('?').next().unwrap_or(target);

    let mut upgrade = false;
    let mut key = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("upgrade") {
            upgrade = value.eq_ignore_ascii_case("websocket");
        } else if name.eq_ignore_ascii_case("sec-websocket-key") {
            key = Some(value.to_string());
        }
    }

    match path {
        "/" if upgrade => Request::Upgrade {
            key: key.unwrap_or_default(),
        },
        "/" => Request::Page,
        "/favicon.ico" => Request::Icon,
        _ => Request::Unknown,
    }
}

/// Read a request head, giving up after `limit`.
///
/// Reading stops at the blank line ending the head, at
/// [`MAX_REQUEST_LEN`] bytes, or when the peer stops sending.
pub async fn read_request<S>(stream: &mut S, limit: Duration) -> Result<String, BridgeError>
where
    S: AsyncRead + Unpin,
{
    let head = tokio::time::timeout(limit, read_head(stream))
        .await
        .map_err(|_| BridgeError::Timeout(limit))??;
    if head.is_empty() {
        return Err(BridgeError::MalformedRequest("empty request"));
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

async fn read_head<S>(stream: &mut S) -> Result<BytesMut, BridgeError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(MAX_REQUEST_LEN);
    let mut chunk = [0u8; 512];
    loop {
        let take = (MAX_REQUEST_LEN - buf.len()).min(chunk.len());
        let n = stream.read(&mut chunk[..take]).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() >= MAX_REQUEST_LEN || buf.windows(HEAD_END.len()).any(|w| w == HEAD_END) {
            break;
        }
    }
    Ok(buf)
}

// ── Responses ────────────────────────────────────────────────────

/// `101 Switching Protocols` answer to an upgrade request.
pub fn switching_protocols(client_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        ws::accept_key(client_key)
    )
}

/// Canned bodies served to plain requests.
#[derive(Debug, Clone)]
pub struct Assets {
    page: Bytes,
    icon: Bytes,
}

impl Assets {
    pub fn new(page: impl Into<Bytes>, icon: impl Into<Bytes>) -> Self {
        Self {
            page: page.into(),
            icon: icon.into(),
        }
    }

    pub fn page(&self) -> &Bytes {
        &self.page
    }

    pub fn icon(&self) -> &Bytes {
        &self.icon
    }
}

/// Write a `200 OK` response carrying `body` and ask the peer to close.
pub async fn respond<S>(
    stream: &mut S,
    content_type: &str,
    body: &[u8],
    limit: Duration,
) -> Result<(), BridgeError>
where
    S: AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n",
        body.len()
    );
    write_parts(stream, &[head.as_bytes(), body], limit).await
}

// ── Tests ────────────────────────────────────────────────────────
