//! Runtime parameters consumed by the bridge.
//!
//! The bridge does not own a configuration file; the service binary
//! builds a [`BridgeConfig`] from its own settings and the bridge
//! validates it once at startup.

use std::time::Duration;

use crate::error::BridgeError;
use crate::frame::PixelDepth;

// ── BridgeConfig ─────────────────────────────────────────────────

/// Configuration for [`Bridge`](crate::bridge::Bridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Canvas width in pixels.
    pub canvas_width: u16,
    /// Canvas height in pixels.
    pub canvas_height: u16,
    /// Pixel depth the UI engine renders in.
    pub pixel_depth: PixelDepth,
    /// Largest region (in pixels) a single flush may carry. Sizes the
    /// scratch buffer.
    pub max_region_pixels: usize,
    /// Session table capacity.
    pub max_sessions: usize,
    /// Pending-connection queue depth.
    pub queue_capacity: usize,
    /// Number of handshake handler workers.
    pub handler_workers: usize,
    /// Receive deadline for the first request on a new connection.
    pub handshake_timeout: Duration,
    /// Deadline for a single write to one viewer.
    pub write_timeout: Duration,
    /// Largest inbound transport frame accepted from a viewer.
    pub max_inbound_frame: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            canvas_width: 320,
            canvas_height: 240,
            pixel_depth: PixelDepth::Rgb565,
            max_region_pixels: 320 * 30,
            max_sessions: 4,
            queue_capacity: 10,
            handler_workers: 1,
            handshake_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(2),
            max_inbound_frame: 4096,
        }
    }
}

impl BridgeConfig {
    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(BridgeError::InvalidConfig(format!(
                "canvas must be non-empty, got {}x{}",
                self.canvas_width, self.canvas_height
            )));
        }
        if self.max_region_pixels == 0 {
            return Err(BridgeError::InvalidConfig(
                "max_region_pixels must be at least 1".into(),
            ));
        }
        let canvas_pixels = self.canvas_width as usize * self.canvas_height as usize;
        if self.max_region_pixels > canvas_pixels {
            return Err(BridgeError::InvalidConfig(format!(
                "max_region_pixels {} exceeds the canvas ({canvas_pixels} pixels)",
                self.max_region_pixels
            )));
        }
        if self.max_sessions == 0 {
            return Err(BridgeError::InvalidConfig(
                "max_sessions must be at least 1".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if self.handler_workers == 0 {
            return Err(BridgeError::InvalidConfig(
                "handler_workers must be at least 1".into(),
            ));
        }
        if self.handshake_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(BridgeError::InvalidConfig("timeouts must be non-zero".into()));
        }
        if self.max_inbound_frame < 5 {
            return Err(BridgeError::InvalidConfig(
                "max_inbound_frame must fit a pointer message".into(),
            ));
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(BridgeConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_empty_canvas() {
        let cfg = BridgeConfig {
            canvas_width: 0,
            ..BridgeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(BridgeError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_region_larger_than_canvas() {
        let cfg = BridgeConfig {
            canvas_width: 10,
            canvas_height: 10,
            max_region_pixels: 101,
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_sessions_and_workers() {
        let cfg = BridgeConfig {
            max_sessions: 0,
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = BridgeConfig {
            handler_workers: 0,
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let cfg = BridgeConfig {
            handshake_timeout: Duration::ZERO,
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
