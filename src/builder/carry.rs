//! Per-tick accumulators that outlive a single command.
//!
//! Mouse deltas arrive as fractions; whatever does not fit in the integer
//! command is kept and added to the next tick. Double clicks are timed in
//! ticks. All of this is cleared on level load.

use serde::{Deserialize, Serialize};

/// Ticks after which a half-finished double click is forgotten.
pub const DOUBLE_CLICK_TICS: u32 = 20;

/// Adds `value` to `carry` and returns the integer part, keeping the rest.
///
/// The integer part is truncated toward zero.
pub fn carry_double(carry: &mut f64, value: f64) -> i32 {
    let true_value = *carry + value;
    let whole = true_value as i32;
    *carry = true_value - f64::from(whole);
    whole
}

/// Fractional mouse remainders.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MouseCarry {
    /// Horizontal motion remainder.
    pub x: f64,
    /// Vertical motion remainder.
    pub y: f64,
    /// Mouse strafe remainder after the strafe divisor.
    pub strafe: f64,
    /// Angle remainder when angles are rounded to 8 bits.
    pub angle: i16,
}

impl MouseCarry {
    /// Mouse strafe: divides the motion, keeps the remainder and only returns
    /// even values.
    pub fn strafe_delta(&mut self, mouse_x: i32, divisor: f64) -> i32 {
        let true_delta = self.strafe + f64::from(mouse_x) / divisor;
        let delta = (true_delta as i32 / 2) * 2;
        self.strafe = true_delta - f64::from(delta);
        delta
    }

    /// Rounds `angle_turn` to an 8-bit angle, carrying what is lost into the
    /// next tick.
    pub fn round_angle(&mut self, angle_turn: i16) -> i16 {
        let desired = angle_turn.wrapping_add(self.angle);
        let rounded = ((i32::from(desired) + 128) & 0xff00) as i16;
        self.angle = desired.wrapping_sub(rounded);
        rounded
    }
}

/// One double-click detector (a mouse button bound to forward or strafe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DoubleClick {
    state: bool,
    clicks: u32,
    time: u32,
}

impl DoubleClick {
    /// Feeds this tick's button state. Returns `true` when a double click completes.
    pub fn update(&mut self, button: bool) -> bool {
        if button != self.state && self.time > 1 {
            self.state = button;
            if self.state {
                self.clicks += 1;
            }
            if self.clicks == 2 {
                self.clicks = 0;
                return true;
            }
            self.time = 0;
        } else {
            self.time = self.time.saturating_add(1);
            if self.time > DOUBLE_CLICK_TICS {
                self.clicks = 0;
                self.state = false;
            }
        }
        false
    }

    /// Forgets clicks so far; the use key was pressed.
    pub fn clear_clicks(&mut self) {
        self.clicks = 0;
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn fractions_are_carried_not_dropped() {
        let mut carry = 0.0;
        let total: i32 = (0..10).map(|_| carry_double(&mut carry, 0.25)).sum();
        assert_eq!(total, 2);
        assert!((carry - 0.5).abs() < 1e-9);
    }

    #[test]
    fn negative_fractions_truncate_toward_zero() {
        let mut carry = 0.0;
        assert_eq!(carry_double(&mut carry, -1.5), -1);
        assert_eq!(carry_double(&mut carry, -0.5), -1);
        assert!(carry.abs() < 1e-9);
    }

    #[test]
    fn strafe_is_even() {
        let mut carry = MouseCarry::default();
        assert_eq!(carry.strafe_delta(3, 1.0), 2);
        assert_eq!(carry.strafe_delta(1, 1.0), 2);
        assert_eq!(carry.strafe_delta(5, 2.0), 2);
    }

    #[test]
    fn angle_rounding_keeps_the_remainder() {
        let mut carry = MouseCarry::default();
        assert_eq!(carry.round_angle(100), 0);
        assert_eq!(carry.angle, 100);
        assert_eq!(carry.round_angle(100), 256);
        assert_eq!(carry.angle, -56);
    }

    #[test]
    fn double_click_needs_two_presses() {
        let mut dc = DoubleClick::default();
        // settle past the minimum gap
        assert!(!dc.update(false));
        assert!(!dc.update(false));
        assert!(!dc.update(true)); // first press
        assert!(!dc.update(true));
        assert!(!dc.update(true));
        assert!(!dc.update(false)); // release
        assert!(!dc.update(false));
        assert!(!dc.update(false));
        assert!(dc.update(true)); // second press
    }

    #[test]
    fn slow_double_click_is_forgotten() {
        let mut dc = DoubleClick::default();
        dc.update(false);
        dc.update(false);
        dc.update(true);
        for _ in 0..=DOUBLE_CLICK_TICS {
            dc.update(true);
        }
        for _ in 0..3 {
            dc.update(false);
        }
        assert!(!dc.update(true));
    }
}
