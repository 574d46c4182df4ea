//! Pause reasons.

use std::fmt;

/// Why the game is paused, as a set of reasons.
///
/// - [`COMMAND`](Self::COMMAND) comes from a recorded pause button and is
///   part of the demo; commands are still read while it is set.
/// - [`BUILD_MODE`](Self::BUILD_MODE) is held by build mode between frame
///   advances. Nothing is recorded, only the base tic moves on.
/// - [`PLAYBACK`](Self::PLAYBACK) freezes a demo being watched; the ticker
///   does nothing at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PauseMode(u8);

impl PauseMode {
    /// Not paused.
    pub const NONE: PauseMode = PauseMode(0);
    /// Paused by a pause command.
    pub const COMMAND: PauseMode = PauseMode(1);
    /// Paused while watching a demo.
    pub const PLAYBACK: PauseMode = PauseMode(2);
    /// Paused by build mode.
    pub const BUILD_MODE: PauseMode = PauseMode(4);

    /// The raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every reason in `other` is set.
    #[must_use]
    pub const fn contains(self, other: PauseMode) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Adds the reasons in `other`.
    pub fn insert(&mut self, other: PauseMode) {
        self.0 |= other.0;
    }

    /// Clears the reasons in `other`.
    pub fn remove(&mut self, other: PauseMode) {
        self.0 &= !other.0;
    }

    /// Flips the reasons in `other`.
    pub fn toggle(&mut self, other: PauseMode) {
        self.0 ^= other.0;
    }

    /// Returns `true` for any reason.
    #[must_use]
    pub const fn is_paused(self) -> bool {
        self.0 != 0
    }

    /// Paused in a way that keeps commands out of the demo.
    #[must_use]
    pub const fn outside_demo(self) -> bool {
        self.contains(Self::BUILD_MODE)
    }

    /// Paused in a way that stops ticking altogether.
    #[must_use]
    pub const fn halts(self) -> bool {
        self.contains(Self::PLAYBACK)
    }
}

impl fmt::Display for PauseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_paused() {
            return write!(f, "running");
        }
        let mut first = true;
        for (flag, name) in [
            (Self::COMMAND, "command"),
            (Self::PLAYBACK, "playback"),
            (Self::BUILD_MODE, "build mode"),
        ] {
            if self.contains(flag) {
                if !first {
                    write!(f, "+")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
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
    fn reasons_combine() {
        let mut pause = PauseMode::NONE;
        assert!(!pause.is_paused());
        pause.insert(PauseMode::COMMAND);
        pause.insert(PauseMode::BUILD_MODE);
        assert!(pause.outside_demo());
        assert!(!pause.halts());
        assert_eq!(pause.to_string(), "command+build mode");
        pause.remove(PauseMode::BUILD_MODE);
        assert!(!pause.outside_demo());
        assert_eq!(pause.bits(), 1);
    }

    #[test]
    fn toggle_flips_one_reason() {
        let mut pause = PauseMode::PLAYBACK;
        pause.toggle(PauseMode::COMMAND);
        assert!(pause.contains(PauseMode::COMMAND));
        pause.toggle(PauseMode::COMMAND);
        assert_eq!(pause, PauseMode::PLAYBACK);
        assert!(pause.halts());
    }

    #[test]
    fn empty_set_is_never_contained() {
        assert!(!PauseMode::COMMAND.contains(PauseMode::NONE));
        assert_eq!(PauseMode::NONE.to_string(), "running");
    }
}
