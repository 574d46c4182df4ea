//! Build mode: a persistent command edited one keypress at a time.
//!
//! Toggled movement snaps between zero and the run speed; fine movement
//! steps by one. Turns step by one 8-bit angle unit up to half a turn.
//! Turning and use only last one tick; everything else persists until
//! changed.

use serde::{Deserialize, Serialize};

use super::input::MovementSpeeds;
use crate::ticcmd::buttons::{BT_ATTACK, BT_CHANGE, BT_USE, BT_WEAPONMASK, BT_WEAPONSHIFT};
use crate::ticcmd::TickCommand;

const SHORT_TIC: i16 = 1 << 8;
const MAX_ANGLE: i16 = i16::MIN; // 128 << 8

/// The build-mode command and its switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMode {
    enabled: bool,
    replace_source: bool,
    advance_frame: bool,
    cmd: TickCommand,
    speeds: MovementSpeeds,
}

impl Default for BuildMode {
    fn default() -> Self {
        Self::new(MovementSpeeds::DOOM)
    }
}

impl BuildMode {
    /// Build mode off, replacing the recorded source once enabled.
    #[must_use]
    pub const fn new(speeds: MovementSpeeds) -> Self {
        Self {
            enabled: false,
            replace_source: true,
            advance_frame: false,
            cmd: TickCommand::EMPTY,
            speeds,
        }
    }

    /// Returns `true` while build mode is on.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the built command replaces the recorded source. When off,
    /// build mode steps through what was already recorded.
    #[must_use]
    pub const fn replaces_source(&self) -> bool {
        self.replace_source
    }

    /// The command as currently built.
    #[must_use]
    pub const fn command(&self) -> &TickCommand {
        &self.cmd
    }

    /// Turns build mode on or off. Returns the new state.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// Turns build mode on.
    pub fn enter(&mut self) {
        self.enabled = true;
    }

    /// Switches between replacing and stepping through the recorded source.
    pub fn toggle_source(&mut self) {
        self.replace_source = !self.replace_source;
    }

    /// Requests a single-tick advance.
    pub fn request_advance_frame(&mut self) {
        self.advance_frame = true;
    }

    /// Consumes a pending advance request. Skip mode always advances.
    pub fn take_advance_frame(&mut self, skip_mode: bool) -> bool {
        let advance = self.advance_frame || skip_mode;
        self.advance_frame = false;
        advance
    }

    fn forward50(&self) -> i8 {
        self.speeds.forward[1] as i8
    }

    /// Toggles full forward movement.
    pub fn forward(&mut self) {
        let f = self.forward50();
        self.cmd.forward = if self.cmd.forward == f { 0 } else { f };
    }

    /// Toggles full backward movement.
    pub fn backward(&mut self) {
        let f = self.forward50();
        self.cmd.forward = if self.cmd.forward == -f { 0 } else { -f };
    }

    /// One unit more forward, up to the run speed.
    pub fn fine_forward(&mut self) {
        if self.cmd.forward < self.forward50() {
            self.cmd.forward += 1;
        }
    }

    /// One unit more backward, up to the run speed.
    pub fn fine_backward(&mut self) {
        if self.cmd.forward > -self.forward50() {
            self.cmd.forward -= 1;
        }
    }

    /// Toggles full (strafe-50) right strafe.
    pub fn strafe_right(&mut self) {
        let s = self.forward50();
        self.cmd.side = if self.cmd.side == s { 0 } else { s };
    }

    /// Toggles full (strafe-50) left strafe.
    pub fn strafe_left(&mut self) {
        let s = self.forward50();
        self.cmd.side = if self.cmd.side == -s { 0 } else { -s };
    }

    /// One unit more right strafe.
    pub fn fine_strafe_right(&mut self) {
        if self.cmd.side < self.forward50() {
            self.cmd.side += 1;
        }
    }

    /// One unit more left strafe.
    pub fn fine_strafe_left(&mut self) {
        if self.cmd.side > -self.forward50() {
            self.cmd.side -= 1;
        }
    }

    /// Turns one more unit right; resets at half a turn.
    pub fn turn_right(&mut self) {
        self.cmd.angle_turn = if self.cmd.angle_turn == MAX_ANGLE {
            0
        } else {
            self.cmd.angle_turn.wrapping_add(SHORT_TIC)
        };
    }

    /// Turns one more unit left; resets at half a turn.
    pub fn turn_left(&mut self) {
        self.cmd.angle_turn = if self.cmd.angle_turn == MAX_ANGLE {
            0
        } else {
            self.cmd.angle_turn.wrapping_sub(SHORT_TIC)
        };
    }

    /// Toggles use for the next tick.
    pub fn toggle_use(&mut self) {
        self.cmd.buttons ^= BT_USE;
    }

    /// Toggles fire.
    pub fn toggle_fire(&mut self) {
        self.cmd.buttons ^= BT_ATTACK;
    }

    /// Toggles a weapon change to `weapon` (0-based slot).
    pub fn toggle_weapon(&mut self, weapon: u8) {
        let bits = (weapon << BT_WEAPONSHIFT) & BT_WEAPONMASK;
        if self.cmd.buttons & BT_CHANGE != 0 && self.cmd.buttons & BT_WEAPONMASK == bits {
            self.cmd.buttons &= !BT_CHANGE;
        } else {
            self.cmd.buttons |= BT_CHANGE;
        }
        self.cmd.buttons &= !BT_WEAPONMASK;
        if self.cmd.buttons & BT_CHANGE != 0 {
            self.cmd.buttons |= bits;
        }
    }

    /// Clears the built command.
    pub fn reset(&mut self) {
        self.cmd = TickCommand::EMPTY;
    }

    /// Hands out the command for this tick. Turning and use do not persist.
    pub fn read(&mut self) -> TickCommand {
        let cmd = self.cmd;
        self.cmd.angle_turn = 0;
        self.cmd.buttons &= !BT_USE;
        cmd
    }

    /// Angle preview for the view while building, in 32-bit angle units.
    #[must_use]
    pub const fn view_angle_offset(&self) -> u32 {
        if !self.enabled {
            return 0;
        }
        ((self.cmd.angle_turn as i32) << 16) as u32
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
    fn movement_toggles() {
        let mut build = BuildMode::default();
        build.forward();
        assert_eq!(build.command().forward, 0x32);
        build.forward();
        assert_eq!(build.command().forward, 0);
        build.backward();
        build.fine_forward();
        assert_eq!(build.command().forward, -0x31);
        build.strafe_left();
        assert_eq!(build.command().side, -0x32);
    }

    #[test]
    fn fine_steps_stop_at_run_speed() {
        let mut build = BuildMode::default();
        for _ in 0..100 {
            build.fine_strafe_right();
        }
        assert_eq!(build.command().side, 0x32);
    }

    #[test]
    fn turn_wraps_at_half_turn() {
        let mut build = BuildMode::default();
        for _ in 0..128 {
            build.turn_left();
        }
        assert_eq!(build.command().angle_turn, i16::MIN);
        build.turn_left();
        assert_eq!(build.command().angle_turn, 0);
        build.turn_right();
        assert_eq!(build.command().angle_turn, 256);
    }

    #[test]
    fn weapon_toggle() {
        let mut build = BuildMode::default();
        build.toggle_weapon(2);
        assert_eq!(build.command().buttons, BT_CHANGE | (2 << BT_WEAPONSHIFT));
        build.toggle_weapon(3);
        assert_eq!(build.command().buttons, BT_CHANGE | (3 << BT_WEAPONSHIFT));
        build.toggle_weapon(3);
        assert_eq!(build.command().buttons, 0);
    }

    #[test]
    fn read_clears_turn_and_use() {
        let mut build = BuildMode::default();
        build.forward();
        build.turn_right();
        build.toggle_use();
        build.toggle_fire();
        let cmd = build.read();
        assert_eq!(cmd.angle_turn, 256);
        assert_eq!(cmd.buttons, BT_USE | BT_ATTACK);
        let next = build.read();
        assert_eq!(next.forward, 0x32);
        assert_eq!(next.angle_turn, 0);
        assert_eq!(next.buttons, BT_ATTACK);
    }

    #[test]
    fn advance_frame_is_one_shot() {
        let mut build = BuildMode::default();
        build.request_advance_frame();
        assert!(build.take_advance_frame(false));
        assert!(!build.take_advance_frame(false));
        assert!(build.take_advance_frame(true));
    }
}
