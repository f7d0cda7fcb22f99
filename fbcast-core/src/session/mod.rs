//! Fixed-capacity registry of viewer sessions.
//!
//! ```text
//!            reserve              upgrade ok
//!  Empty ───────────► Connecting ───────────► Connected
//!    ▲                    │                       │
//!    │   handshake failed │   close / error /     │
//!    └────────────────────┴── write failure ◄─────┘
//! ```
//!
//! One `tokio::sync::Mutex` guards every slot. The broadcast scan
//! holds it across the writes so no registration or disconnect can
//! observe a half-updated slot; each write is bounded by the
//! configured write timeout. The pointer lock is never taken while
//! the table lock is held.
//!
//! Lifecycle changes are reported on a single typed channel of
//! [`SessionEvent`]s.

mod reader;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::http;
use crate::pointer::PointerState;
use crate::redraw::RedrawSignal;
use crate::ws::{self, Opcode};

/// Write half of a registered connection.
pub type SessionWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ── SlotState ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Connecting,
    Connected,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

// ── SessionId ────────────────────────────────────────────────────

/// Slot index plus the generation it was reserved under.
///
/// The generation keeps a stale handle from touching a slot that has
/// since been reused by another viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId {
    pub slot: usize,
    pub generation: u64,
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.slot, self.generation)
    }
}

// ── Events ───────────────────────────────────────────────────────

/// Why a session left the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The viewer sent a close frame.
    External,
    /// The server closed the session.
    Internal,
    /// A read or write on the connection failed.
    Error,
}

/// Session lifecycle notifications for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected {
        id: SessionId,
        peer: Option<String>,
    },
    Disconnected {
        id: SessionId,
        reason: DisconnectReason,
    },
    /// A data frame the bridge has no use for (text, fragments).
    Unhandled { id: SessionId, opcode: Opcode },
}

// ── Slot ─────────────────────────────────────────────────────────

struct Slot {
    state: SlotState,
    generation: u64,
    writer: Option<SessionWriter>,
    reader: Option<JoinHandle<()>>,
    peer: Option<String>,
    since: Option<Instant>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            state: SlotState::Empty,
            generation: 0,
            writer: None,
            reader: None,
            peer: None,
            since: None,
        }
    }

    fn holds(&self, id: SessionId) -> bool {
        self.state != SlotState::Empty && self.generation == id.generation
    }
}

// ── SessionTable ─────────────────────────────────────────────────

pub struct SessionTable {
    slots: Mutex<Vec<Slot>>,
    capacity: usize,
    connected: AtomicUsize,
    generations: AtomicU64,
    pointer: Arc<PointerState>,
    redraw: Arc<RedrawSignal>,
    events: mpsc::UnboundedSender<SessionEvent>,
    write_timeout: Duration,
    max_inbound_frame: usize,
}

impl SessionTable {
    pub fn new(
        config: &BridgeConfig,
        pointer: Arc<PointerState>,
        redraw: Arc<RedrawSignal>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            slots: Mutex::new((0..config.max_sessions).map(|_| Slot::empty()).collect()),
            capacity: config.max_sessions,
            connected: AtomicUsize::new(0),
            generations: AtomicU64::new(0),
            pointer,
            redraw,
            events,
            write_timeout: config.write_timeout,
            max_inbound_frame: config.max_inbound_frame,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of sessions in the `Connected` state.
    pub fn connected_count(&self) -> usize {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether at least one viewer is attached.
    pub fn is_available(&self) -> bool {
        self.connected_count() > 0
    }

    /// Snapshot of every slot's state.
    pub async fn states(&self) -> Vec<SlotState> {
        self.slots.lock().await.iter().map(|s| s.state).collect()
    }

    pub(crate) fn pointer(&self) -> &PointerState {
        &self.pointer
    }

    pub(crate) fn max_inbound_frame(&self) -> usize {
        self.max_inbound_frame
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine; events are advisory.
        let _ = self.events.send(event);
    }

    // ── Registration ─────────────────────────────────────────────

    /// Take ownership of an upgrade-requesting connection.
    ///
    /// Reserves a slot, answers the upgrade handshake, and on success
    /// starts the session's reader task, marks the slot `Connected`
    /// and requests a full redraw. A full table or a failed handshake
    /// closes the connection and leaves every slot as it was.
    pub async fn register<S>(
        self: &Arc<Self>,
        mut stream: S,
        client_key: &str,
        peer: Option<String>,
    ) -> Result<SessionId, BridgeError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let id = self.reserve(peer.clone()).await?;

        if let Err(e) = self.upgrade(&mut stream, client_key).await {
            self.abandon(id).await;
            return Err(e);
        }

        let (read_half, write_half) = tokio::io::split(stream);
        {
            let mut slots = self.slots.lock().await;
            let slot = &mut slots[id.slot];
            slot.state = SlotState::Connected;
            slot.writer = Some(Box::new(write_half));
            slot.since = Some(Instant::now());
            slot.reader = Some(tokio::spawn(reader::run(Arc::clone(self), id, read_half)));
            self.connected.fetch_add(1, Ordering::AcqRel);

            info!(session = %id, peer = peer.as_deref().unwrap_or("-"), "viewer connected");
            self.redraw.request();
            // Under the lock, so the reader's release cannot report first.
            self.emit(SessionEvent::Connected { id, peer });
        }
        Ok(id)
    }

    /// Empty → Connecting.
    async fn reserve(&self, peer: Option<String>) -> Result<SessionId, BridgeError> {
        let mut slots = self.slots.lock().await;
        let Some(index) = slots.iter().position(|s| s.state == SlotState::Empty) else {
            warn!(capacity = self.capacity, "session table full; rejecting viewer");
            return Err(BridgeError::SessionTableFull {
                capacity: self.capacity,
            });
        };

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = &mut slots[index];
        slot.state = SlotState::Connecting;
        slot.generation = generation;
        slot.peer = peer;

        Ok(SessionId {
            slot: index,
            generation,
        })
    }

    /// Connecting → Empty after a failed handshake.
    async fn abandon(&self, id: SessionId) {
        let mut slots = self.slots.lock().await;
        let slot = &mut slots[id.slot];
        if slot.holds(id) && slot.state == SlotState::Connecting {
            self.clear(slot, true);
        }
    }

    async fn upgrade<S>(&self, stream: &mut S, client_key: &str) -> Result<(), BridgeError>
    where
        S: AsyncWrite + Unpin,
    {
        if client_key.trim().is_empty() {
            return Err(BridgeError::HandshakeFailed("missing Sec-WebSocket-Key"));
        }
        let response = http::switching_protocols(client_key);
        write_parts(stream, &[response.as_bytes()], self.write_timeout)
            .await
            .map_err(|e| {
                debug!("upgrade response not delivered: {e}");
                BridgeError::HandshakeFailed("could not send upgrade response")
            })
    }

    // ── Broadcast ────────────────────────────────────────────────

    /// Write one framed message to every connected session.
    ///
    /// Sessions whose write fails are dropped and reported with
    /// [`DisconnectReason::Error`]. Returns the number of sessions
    /// that received the message.
    pub async fn broadcast(&self, wire: &[u8]) -> usize {
        let mut slots = self.slots.lock().await;
        let mut delivered = 0;

        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.state != SlotState::Connected {
                continue;
            }
            let Some(writer) = slot.writer.as_mut() else {
                continue;
            };

            match write_parts(writer, &[wire], self.write_timeout).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    let id = SessionId {
                        slot: index,
                        generation: slot.generation,
                    };
                    warn!(session = %id, "dropping viewer after failed write: {e}");
                    self.clear(slot, true);
                    self.emit(SessionEvent::Disconnected {
                        id,
                        reason: DisconnectReason::Error,
                    });
                }
            }
        }

        delivered
    }

    // ── Disconnects ──────────────────────────────────────────────

    /// Close one session from the server side.
    ///
    /// Returns `false` if the session is already gone.
    pub async fn disconnect(&self, id: SessionId) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get_mut(id.slot) else {
            return false;
        };
        if !slot.holds(id) {
            return false;
        }
        self.close_slot(slot, id, DisconnectReason::Internal, true).await;
        true
    }

    /// Close every session from the server side. Returns how many
    /// sessions were closed.
    pub async fn disconnect_all(&self) -> usize {
        let mut slots = self.slots.lock().await;
        let mut closed = 0;
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.state == SlotState::Empty {
                continue;
            }
            let id = SessionId {
                slot: index,
                generation: slot.generation,
            };
            self.close_slot(slot, id, DisconnectReason::Internal, true).await;
            closed += 1;
        }
        closed
    }

    /// Called by a session's own reader task when it stops.
    pub(crate) async fn release(&self, id: SessionId, reason: DisconnectReason) {
        let mut slots = self.slots.lock().await;
        let slot = &mut slots[id.slot];
        if slot.holds(id) {
            self.close_slot(slot, id, reason, false).await;
        }
    }

    /// Answer a ping from the viewer.
    pub(crate) async fn send_pong(&self, id: SessionId, payload: &[u8]) -> Result<(), BridgeError> {
        let mut header = [0u8; ws::MAX_HEADER_LEN];
        let n = ws::write_header(Opcode::Pong, payload.len(), &mut header);

        let mut slots = self.slots.lock().await;
        let slot = &mut slots[id.slot];
        if !slot.holds(id) {
            return Ok(());
        }
        match slot.writer.as_mut() {
            Some(writer) => write_parts(writer, &[&header[..n], payload], self.write_timeout).await,
            None => Ok(()),
        }
    }

    /// Send a close frame where it makes sense, empty the slot and
    /// report the disconnect.
    async fn close_slot(
        &self,
        slot: &mut Slot,
        id: SessionId,
        reason: DisconnectReason,
        abort_reader: bool,
    ) {
        if reason != DisconnectReason::Error {
            if let Some(writer) = slot.writer.as_mut() {
                let frame = ws::close_frame(ws::CLOSE_NORMAL);
                if let Err(e) = write_parts(writer, &[&frame], self.write_timeout).await {
                    debug!(session = %id, "close frame not delivered: {e}");
                }
            }
        }

        let connected_for = slot.since.map(|t| t.elapsed());
        self.clear(slot, abort_reader);
        info!(session = %id, ?reason, ?connected_for, "viewer disconnected");
        self.emit(SessionEvent::Disconnected { id, reason });
    }

    /// Any state → Empty, releasing the connection.
    fn clear(&self, slot: &mut Slot, abort_reader: bool) {
        if slot.state == SlotState::Connected {
            self.connected.fetch_sub(1, Ordering::AcqRel);
        }
        slot.state = SlotState::Empty;
        slot.writer = None;
        slot.peer = None;
        slot.since = None;
        if let Some(handle) = slot.reader.take() {
            if abort_reader {
                handle.abort();
            }
        }
    }
}

/// Write `parts` back to back and flush, bounded by `limit`.
pub(crate) async fn write_parts<W>(writer: &mut W, parts: &[&[u8]], limit: Duration) -> Result<(), BridgeError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let write = async {
        for part in parts {
            writer.write_all(part).await?;
        }
        writer.flush().await
    };
    tokio::time::timeout(limit, write)
        .await
        .map_err(|_| BridgeError::Timeout(limit))??;
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
