//! Full-redraw requests from the bridge to the UI engine.
//!
//! Raised whenever a viewer finishes its handshake so the new viewer
//! starts from a complete image. The UI engine polls
//! [`RedrawSignal::take`] once per cycle; several requests raised
//! between two polls collapse into one redraw.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RedrawSignal {
    pending: AtomicBool,
    requested: AtomicU64,
}

impl RedrawSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the UI engine to invalidate the whole screen.
    pub fn request(&self) {
        self.requested.fetch_add(1, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }

    /// Consume a pending request.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Requests raised since startup.
    pub fn total_requests(&self) -> u64 {
        self.requested.load(Ordering::Relaxed)
    }
}
