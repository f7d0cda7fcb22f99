//! Accept pipeline: listener → pending-connection queue → handler workers.
//!
//! ```text
//!  listener ──accept──► [ bounded queue ] ──pop──► worker 0 ─┐
//!                                         └──pop──► worker n ─┴─► route
//! ```
//!
//! The accept loop only accepts and enqueues. A full queue blocks it,
//! which holds new connections in the kernel backlog instead of
//! dropping them. Workers read the first request under a deadline and
//! route it; upgrade requests are handed to the session table. A
//! listener error ends the pipeline with [`BridgeError::ListenerFailed`].

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::http::{self, Assets, Request};
use crate::session::{SessionId, SessionTable};

// ── Listener ─────────────────────────────────────────────────────

/// Source of raw connections for the pipeline.
pub trait Listener: Send {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Wait for the next connection and its peer description.
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, String)>> + Send;
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, String)> {
        let (stream, peer) = TcpListener::accept(self).await?;
        Ok((stream, peer.to_string()))
    }
}

/// How a connection's first request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Page,
    Icon,
    Session(SessionId),
    Rejected,
}

// ── AcceptPipeline ───────────────────────────────────────────────

pub struct AcceptPipeline {
    router: Arc<Router>,
    queue_capacity: usize,
    workers: usize,
}

impl AcceptPipeline {
    pub fn new(config: &BridgeConfig, sessions: Arc<SessionTable>, assets: Assets) -> Self {
        Self {
            router: Arc::new(Router {
                sessions,
                assets,
                handshake_timeout: config.handshake_timeout,
                write_timeout: config.write_timeout,
            }),
            queue_capacity: config.queue_capacity,
            workers: config.handler_workers,
        }
    }

    /// Serve connections until the listener fails.
    ///
    /// Only returns on a listener error, which the caller must treat
    /// as fatal.
    pub async fn run<L: Listener>(self, mut listener: L) -> Result<(), BridgeError> {
        let (tx, rx) = mpsc::channel::<(L::Stream, String)>(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for index in 0..self.workers {
            workers.spawn(worker(index, Arc::clone(&rx), Arc::clone(&self.router)));
        }
        info!(
            workers = self.workers,
            queue = self.queue_capacity,
            "accept pipeline running"
        );

        let failure = loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => break e,
            };
            debug!(%peer, "connection accepted");

            if let Err(mpsc::error::SendError((_, peer))) = tx.send((stream, peer)).await {
                warn!(%peer, "pending queue closed; dropping connection");
            }
        };

        error!("listener failed: {failure}");
        workers.abort_all();
        Err(BridgeError::ListenerFailed(failure))
    }
}

type Queue<S> = Arc<Mutex<mpsc::Receiver<(S, String)>>>;

async fn worker<S>(index: usize, queue: Queue<S>, router: Arc<Router>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    loop {
        let next = queue.lock().await.recv().await;
        let Some((stream, peer)) = next else {
            break;
        };
        match router.handle(stream, peer.clone()).await {
            Ok(handled) => debug!(worker = index, %peer, ?handled, "request served"),
            Err(e) => debug!(worker = index, %peer, "connection dropped: {e}"),
        }
    }
}

// ── Router ───────────────────────────────────────────────────────

struct Router {
    sessions: Arc<SessionTable>,
    assets: Assets,
    handshake_timeout: Duration,
    write_timeout: Duration,
}

impl Router {
    async fn handle<S>(&self, mut stream: S, peer: String) -> Result<Handled, BridgeError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let head = http::read_request(&mut stream, self.handshake_timeout).await?;

        match http::classify(&head) {
            Request::Page => {
                debug!(%peer, "serving page");
                self.serve(stream, "text/html", self.assets.page()).await?;
                Ok(Handled::Page)
            }
            Request::Icon => {
                debug!(%peer, "serving icon");
                self.serve(stream, "image/x-icon", self.assets.icon()).await?;
                Ok(Handled::Icon)
            }
            Request::Upgrade { key } => {
                let id = self.sessions.register(stream, &key, Some(peer)).await?;
                Ok(Handled::Session(id))
            }
            Request::Unknown => {
                debug!(%peer, "unknown request; closing");
                Ok(Handled::Rejected)
            }
        }
    }

    async fn serve<S>(&self, mut stream: S, content_type: &str, body: &[u8]) -> Result<(), BridgeError>
    where
        S: AsyncWrite + Unpin,
    {
        http::respond(&mut stream, content_type, body, self.write_timeout).await?;
        // The peer may already be gone; the response is out either way.
        let _ = stream.shutdown().await;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::pointer::PointerState;
    use crate::redraw::RedrawSignal;
    use crate::session::SlotState;

    const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn router(capacity: usize) -> (Router, Arc<RedrawSignal>) {
        let config = BridgeConfig {
            max_sessions: capacity,
            handshake_timeout: Duration::from_millis(50),
            ..BridgeConfig::default()
        };
        let redraw = Arc::new(RedrawSignal::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let sessions = Arc::new(SessionTable::new(
            &config,
            Arc::new(PointerState::new(320, 240)),
            Arc::clone(&redraw),
            tx,
        ));
        let router = Router {
            sessions,
            assets: Assets::new(&b"<html></html>"[..], &b"ICON"[..]),
            handshake_timeout: config.handshake_timeout,
            write_timeout: config.write_timeout,
        };
        (router, redraw)
    }

    /// Send `head` and collect the reply. The client half is returned
    /// so a registered session stays open.
    async fn request(
        router: &Router,
        head: &str,
    ) -> (Result<Handled, BridgeError>, Vec<u8>, DuplexStream) {
        let (mut client, server) = tokio::io::duplex(1 << 14);
        client.write_all(head.as_bytes()).await.unwrap();
        let handled = router.handle(server, "test".into()).await;
        let mut reply = Vec::new();
        if !matches!(handled, Ok(Handled::Session(_))) {
            client.read_to_end(&mut reply).await.unwrap();
        }
        (handled, reply, client)
    }

    #[tokio::test]
    async fn serves_page_then_closes() {
        let (router, _) = router(1);
        let (handled, reply, _client) = request(&router, "GET / HTTP/1.1\r\n\r\n").await;
        assert_eq!(handled.unwrap(), Handled::Page);
        let reply = String::from_utf8(reply).unwrap();
        assert!(reply.contains("Content-Type: text/html\r\n"));
        assert!(reply.ends_with("<html></html>"));
    }

    #[tokio::test]
    async fn serves_icon() {
        let (router, _) = router(1);
        let (handled, reply, _client) = request(&router, "GET /favicon.ico HTTP/1.1\r\n\r\n").await;
        assert_eq!(handled.unwrap(), Handled::Icon);
        let reply = String::from_utf8(reply).unwrap();
        assert!(reply.contains("Content-Type: image/x-icon\r\n"));
        assert!(reply.ends_with("ICON"));
    }

    #[tokio::test]
    async fn unknown_request_is_closed_without_reply() {
        let (router, _) = router(1);
        let (handled, reply, _client) = request(&router, "GET /secret HTTP/1.1\r\n\r\n").await;
        assert_eq!(handled.unwrap(), Handled::Rejected);
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn upgrade_registers_session() {
        let (router, redraw) = router(1);
        let head = format!("GET / HTTP/1.1\r\nUpgrade: websocket\r\nSec-WebSocket-Key: {KEY}\r\n\r\n");
        let (handled, _, _client) = request(&router, &head).await;
        assert!(matches!(handled, Ok(Handled::Session(_))));
        assert_eq!(router.sessions.states().await, vec![SlotState::Connected]);
        assert_eq!(redraw.total_requests(), 1);
    }

    #[tokio::test]
    async fn upgrade_without_key_consumes_no_slot() {
        let (router, redraw) = router(1);
        let (handled, reply, _client) =
            request(&router, "GET / HTTP/1.1\r\nUpgrade: websocket\r\n\r\n").await;
        assert!(matches!(handled, Err(BridgeError::HandshakeFailed(_))));
        assert!(reply.is_empty());
        assert_eq!(router.sessions.states().await, vec![SlotState::Empty]);
        assert_eq!(redraw.total_requests(), 0);
    }

    #[tokio::test]
    async fn idle_connection_times_out() {
        let (router, _) = router(1);
        let (_client, server) = tokio::io::duplex(64);
        let err = router.handle(server, "idle".into()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout(_)));
    }

    /// Hands out scripted connections, then fails.
    struct ScriptedListener {
        pending: VecDeque<DuplexStream>,
    }

    impl Listener for ScriptedListener {
        type Stream = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, String)> {
            match self.pending.pop_front() {
                Some(stream) => Ok((stream, "scripted".into())),
                None => Err(io::Error::other("listener closed")),
            }
        }
    }

    /// Hands out scripted connections, then waits forever.
    struct ParkedListener {
        pending: VecDeque<DuplexStream>,
    }

    impl Listener for ParkedListener {
        type Stream = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, String)> {
            match self.pending.pop_front() {
                Some(stream) => Ok((stream, "parked".into())),
                None => std::future::pending().await,
            }
        }
    }

    /// Accepts silent connections as fast as it is asked, counting them.
    struct SilentListener {
        accepted: Arc<AtomicUsize>,
        clients: Vec<DuplexStream>,
    }

    impl Listener for SilentListener {
        type Stream = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, String)> {
            let (client, server) = tokio::io::duplex(64);
            self.clients.push(client);
            self.accepted.fetch_add(1, Ordering::SeqCst);
            Ok((server, "silent".into()))
        }
    }

    fn pipeline(config: &BridgeConfig) -> AcceptPipeline {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sessions = Arc::new(SessionTable::new(
            config,
            Arc::new(PointerState::new(320, 240)),
            Arc::new(RedrawSignal::new()),
            tx,
        ));
        AcceptPipeline::new(config, sessions, Assets::new(&b"<html></html>"[..], &b""[..]))
    }

    #[tokio::test]
    async fn full_queue_blocks_accept_loop() {
        let config = BridgeConfig {
            queue_capacity: 2,
            handler_workers: 1,
            handshake_timeout: Duration::from_secs(30),
            ..BridgeConfig::default()
        };
        let accepted = Arc::new(AtomicUsize::new(0));
        let listener = SilentListener {
            accepted: Arc::clone(&accepted),
            clients: Vec::new(),
        };
        let task = tokio::spawn(pipeline(&config).run(listener));

        tokio::time::sleep(Duration::from_millis(200)).await;
        // One held by the worker, two queued, one waiting for a slot.
        assert_eq!(accepted.load(Ordering::SeqCst), 4);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 4);
        task.abort();
    }

    #[tokio::test]
    async fn stalled_connection_does_not_block_other_workers() {
        let config = BridgeConfig {
            handler_workers: 2,
            handshake_timeout: Duration::from_secs(30),
            ..BridgeConfig::default()
        };
        let (_stalled, stalled_server) = tokio::io::duplex(64);
        let (mut client, server) = tokio::io::duplex(1 << 14);
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let listener = ParkedListener {
            pending: VecDeque::from([stalled_server, server]),
        };
        let task = tokio::spawn(pipeline(&config).run(listener));

        let mut reply = String::new();
        tokio::time::timeout(Duration::from_secs(2), client.read_to_string(&mut reply))
            .await
            .unwrap()
            .unwrap();
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.ends_with("<html></html>"));
        task.abort();
    }

    #[tokio::test]
    async fn listener_error_is_fatal() {
        let pipeline = pipeline(&BridgeConfig::default());

        let (_client, server) = tokio::io::duplex(64);
        let listener = ScriptedListener {
            pending: VecDeque::from([server]),
        };

        let err = pipeline.run(listener).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, BridgeError::ListenerFailed(_)));
    }
}
