//! Shared pointer state fed by every viewer and read by the UI engine.
//!
//! The input model is level-sensed: the state holds the last reported
//! touch flag and position, and every poll returns it as is. A press
//! held across several polls reads as pressed until a release arrives.
//! Viewers driving input at the same time overwrite each other
//! (last writer wins).
//!
//! ## Wire format (viewer → server, exactly 5 bytes)
//!
//! ```text
//! flag: u8   (0 = release, anything else = touch)
//! x:    u16  big-endian
//! y:    u16  big-endian
//! ```

use std::sync::Mutex;

/// Length of a pointer message.
pub const POINTER_MESSAGE_LEN: usize = 5;

/// One pointer reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerReading {
    pub pressed: bool,
    pub x: u16,
    pub y: u16,
}

impl PointerReading {
    /// Parse a pointer message. Returns `None` for any other length.
    pub fn parse(msg: &[u8]) -> Option<Self> {
        let [flag, x_hi, x_lo, y_hi, y_lo] = msg else {
            return None;
        };
        Some(Self {
            pressed: *flag != 0,
            x: u16::from_be_bytes([*x_hi, *x_lo]),
            y: u16::from_be_bytes([*y_hi, *y_lo]),
        })
    }
}

/// The single pointer record, guarded by its own lock.
#[derive(Debug)]
pub struct PointerState {
    reading: Mutex<PointerReading>,
    max_x: u16,
    max_y: u16,
}

impl PointerState {
    /// Create a released pointer at the origin of a `width × height` canvas.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            reading: Mutex::new(PointerReading::default()),
            max_x: width.saturating_sub(1),
            max_y: height.saturating_sub(1),
        }
    }

    /// Apply an inbound message. Anything that is not exactly
    /// [`POINTER_MESSAGE_LEN`] bytes is ignored.
    ///
    /// Returns whether the state was updated.
    pub fn apply_message(&self, msg: &[u8]) -> bool {
        match PointerReading::parse(msg) {
            Some(reading) => {
                self.set(reading);
                true
            }
            None => false,
        }
    }

    /// Overwrite the state, clamping the position to the canvas.
    ///
    /// The stored position is therefore not always the raw value the
    /// viewer sent: coordinates past the last column or row read back as
    /// that column or row.
    pub fn set(&self, reading: PointerReading) {
        let clamped = PointerReading {
            pressed: reading.pressed,
            x: reading.x.min(self.max_x),
            y: reading.y.min(self.max_y),
        };
        *self.reading.lock().unwrap_or_else(|e| e.into_inner()) = clamped;
    }

    /// Input-poll entry point.
    ///
    /// Returns the current reading and whether more input is pending,
    /// which is always `false`: the state is not a queue.
    pub fn read(&self) -> (PointerReading, bool) {
        let reading = *self.reading.lock().unwrap_or_else(|e| e.into_inner());
        (reading, false)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_touch_message() {
        let state = PointerState::new(320, 240);
        assert!(state.apply_message(&[1, 0x01, 0x2C, 0x00, 0x96]));
        let (reading, more) = state.read();
        assert_eq!(
            reading,
            PointerReading {
                pressed: true,
                x: 300,
                y: 150
            }
        );
        assert!(!more);
    }

    #[test]
    fn wrong_length_leaves_state_unchanged() {
        let state = PointerState::new(320, 240);
        state.apply_message(&[1, 0x00, 0x0A, 0x00, 0x14]);
        let before = state.read().0;

        assert!(!state.apply_message(&[0, 0x01, 0x2C, 0x00]));
        assert!(!state.apply_message(&[0, 0x01, 0x2C, 0x00, 0x96, 0x00]));
        assert!(!state.apply_message(&[]));
        assert_eq!(state.read().0, before);
    }

    #[test]
    fn press_is_level_sensed() {
        let state = PointerState::new(100, 100);
        state.apply_message(&[1, 0, 5, 0, 6]);
        for _ in 0..3 {
            assert!(state.read().0.pressed);
        }
        state.apply_message(&[0, 0, 5, 0, 6]);
        assert!(!state.read().0.pressed);
    }

    #[test]
    fn any_nonzero_flag_is_a_touch() {
        let state = PointerState::new(100, 100);
        state.apply_message(&[0x7F, 0, 1, 0, 1]);
        assert!(state.read().0.pressed);
    }

    #[test]
    fn position_is_clamped_to_canvas() {
        let state = PointerState::new(320, 240);
        state.apply_message(&[1, 0xFF, 0xFF, 0xFF, 0xFF]);
        let (reading, _) = state.read();
        assert_eq!((reading.x, reading.y), (319, 239));
    }

    #[test]
    fn last_writer_wins() {
        let state = PointerState::new(320, 240);
        state.apply_message(&[1, 0, 10, 0, 10]);
        state.apply_message(&[0, 0, 20, 0, 30]);
        let (reading, _) = state.read();
        assert_eq!((reading.pressed, reading.x, reading.y), (false, 20, 30));
    }
}
