//! Runtime context shared by the UI engine and the accept pipeline.
//!
//! [`Bridge`] owns the session table, the pointer state and the
//! redraw signal and hands out shared handles to them. The UI engine
//! gets a [`DisplayDriver`] for flushing and reads input through the
//! [`PointerState`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::frame::{Area, FrameEncoder, PixelBuffer};
use crate::http::Assets;
use crate::pointer::PointerState;
use crate::redraw::RedrawSignal;
use crate::server::AcceptPipeline;
use crate::session::{SessionEvent, SessionTable};

// ── Bridge ───────────────────────────────────────────────────────

pub struct Bridge {
    config: BridgeConfig,
    sessions: Arc<SessionTable>,
    pointer: Arc<PointerState>,
    redraw: Arc<RedrawSignal>,
}

impl Bridge {
    /// Validate `config` and build the shared state.
    ///
    /// Also returns the receiving end of the session event channel.
    pub fn new(
        config: BridgeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), BridgeError> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pointer = Arc::new(PointerState::new(config.canvas_width, config.canvas_height));
        let redraw = Arc::new(RedrawSignal::new());
        let sessions = Arc::new(SessionTable::new(
            &config,
            Arc::clone(&pointer),
            Arc::clone(&redraw),
            events_tx,
        ));

        let bridge = Self {
            config,
            sessions,
            pointer,
            redraw,
        };
        Ok((bridge, events_rx))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Flush entry point for the UI engine.
    ///
    /// Each driver owns its own scratch buffer; create one per
    /// rendering task.
    pub fn display(&self) -> DisplayDriver {
        DisplayDriver {
            encoder: FrameEncoder::new(
                self.config.pixel_depth,
                self.config.canvas_width,
                self.config.canvas_height,
                self.config.max_region_pixels,
            ),
            sessions: Arc::clone(&self.sessions),
        }
    }

    pub fn pointer(&self) -> Arc<PointerState> {
        Arc::clone(&self.pointer)
    }

    pub fn redraw(&self) -> Arc<RedrawSignal> {
        Arc::clone(&self.redraw)
    }

    pub fn sessions(&self) -> Arc<SessionTable> {
        Arc::clone(&self.sessions)
    }

    /// Whether any viewer is attached.
    pub fn is_available(&self) -> bool {
        self.sessions.is_available()
    }

    pub fn accept_pipeline(&self, assets: Assets) -> AcceptPipeline {
        AcceptPipeline::new(&self.config, Arc::clone(&self.sessions), assets)
    }

    /// Close every session. Returns how many were open.
    pub async fn shutdown(&self) -> usize {
        self.sessions.disconnect_all().await
    }
}

// ── DisplayDriver ────────────────────────────────────────────────

/// Result of one flush. Every outcome counts as acknowledged.
#[derive(Debug)]
pub enum FlushOutcome {
    /// The frame went out to `delivered` viewers.
    Sent { delivered: usize },
    /// Nobody is watching; nothing was encoded.
    NoViewers,
    /// The frame could not be encoded and was dropped.
    Rejected(BridgeError),
}

impl FlushOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

pub struct DisplayDriver {
    encoder: FrameEncoder,
    sessions: Arc<SessionTable>,
}

impl DisplayDriver {
    /// Encode one region and broadcast it to every viewer.
    ///
    /// Transport and encoding failures never reach the caller as
    /// errors; the engine may treat the flush as complete whatever the
    /// outcome.
    pub async fn flush(&mut self, area: Area, pixels: PixelBuffer<'_>) -> FlushOutcome {
        if !self.sessions.is_available() {
            return FlushOutcome::NoViewers;
        }

        let frame = match self.encoder.encode(area, pixels) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(?area, "flush dropped: {e}");
                return FlushOutcome::Rejected(e);
            }
        };

        let delivered = self.sessions.broadcast(frame.wire).await;
        debug!(?area, bytes = frame.wire.len(), delivered, "flushed");
        FlushOutcome::Sent { delivered }
    }

    pub fn frames_encoded(&self) -> u64 {
        self.encoder.frames_encoded()
    }
}

// ── Tests ────────────────────────────────────────────────────────
