//! # fbcast-core
//!
//! Bridges a frame-buffer UI engine to browser viewers over WebSocket
//! and routes their pointer input back into the engine.
//!
//! This crate contains:
//! - **Frame**: `FrameEncoder` packing a dirty region at 8, 16 or 32 bpp
//!   into one pre-sized `ScratchBuffer`, plus `DecodedFrame` for viewers
//! - **WS**: outbound frame headers in three size classes and the
//!   inbound `WsFrameCodec` for `tokio_util`
//! - **Session**: `SessionTable`, a fixed set of viewer slots with
//!   broadcast and lifecycle events
//! - **Pointer**: `PointerState`, the level-sensed shared input record
//! - **Server**: `AcceptPipeline` feeding handler workers through a
//!   bounded queue
//! - **Bridge**: `Bridge` runtime context and the `DisplayDriver` flush
//!   entry point
//! - **Error**: `BridgeError`, typed with `thiserror`

pub mod bridge;
pub mod config;
pub mod error;
pub mod frame;
pub mod http;
pub mod pointer;
pub mod redraw;
pub mod server;
pub mod session;
pub mod ws;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bridge::{Bridge, DisplayDriver, FlushOutcome};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use frame::{
    Area, DecodedFrame, DecodedPixels, EncodedFrame, FrameEncoder, FrameHeader, PixelBuffer,
    PixelDepth, Rgba, ScratchBuffer,
};
pub use http::{Assets, Request};
pub use pointer::{POINTER_MESSAGE_LEN, PointerReading, PointerState};
pub use redraw::RedrawSignal;
pub use server::{AcceptPipeline, Handled, Listener};
pub use session::{DisconnectReason, SessionEvent, SessionId, SessionTable, SlotState};
pub use ws::{Opcode, WsFrame, WsFrameCodec};
