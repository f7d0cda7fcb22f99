//! Per-session inbound task.
//!
//! Decodes viewer frames until the connection ends, feeding pointer
//! messages into the shared pointer state, then releases the slot.

use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace, warn};

use super::{DisconnectReason, SessionEvent, SessionId, SessionTable};
use crate::ws::{Opcode, WsFrameCodec};

pub(super) async fn run<R>(table: Arc<SessionTable>, id: SessionId, read_half: R)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut frames = FramedRead::new(read_half, WsFrameCodec::new(table.max_inbound_frame()));

    let reason = loop {
        let frame = match frames.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!(session = %id, "viewer stream error: {e}");
                break DisconnectReason::Error;
            }
            None => {
                debug!(session = %id, "viewer vanished without a close frame");
                break DisconnectReason::Error;
            }
        };

        match frame.opcode {
            Opcode::Binary if frame.fin => {
                if !table.pointer().apply_message(&frame.payload) {
                    trace!(session = %id, len = frame.payload.len(), "ignoring non-pointer message");
                }
            }
            Opcode::Close => break DisconnectReason::External,
            Opcode::Ping => {
                if let Err(e) = table.send_pong(id, &frame.payload).await {
                    warn!(session = %id, "pong failed: {e}");
                    break DisconnectReason::Error;
                }
            }
            Opcode::Pong => {}
            other => {
                debug!(session = %id, opcode = ?other, "unhandled viewer frame");
                table.emit(SessionEvent::Unhandled { id, opcode: other });
            }
        }
    };

    table.release(id, reason).await;
}

// ── Tests ────────────────────────────────────────────────────────
