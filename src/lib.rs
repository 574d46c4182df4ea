//! # tick-demo
//!
//! Deterministic tick command building, demo recording and demo playback for
//! Doom-engine source ports.
//!
//! Every simulation tick each in-game player contributes exactly one
//! [`TickCommand`]. The command either comes from live input (sampled by the
//! [`TickCommandBuilder`]) or from a recorded demo stream, and is written back
//! to a [`DemoByteStream`] while recording. The binary layout of those commands
//! and of the demo header depends on the [`CompatibilityLevel`] the demo was
//! recorded with; [`DemoHeader`] parsing auto-detects every historical format.
//!
//! The [`GameTicker`] drives one tick at a time: it drains pending
//! [`GameAction`]s, fetches each player's command in player order, applies
//! extended-command side effects and asks the [`Simulation`] to advance.

#![forbid(unsafe_code)] // let us try
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use builder::{
    BuildMode, BuilderSettings, BruteForceQueue, InputState, PlayerView, ScriptedQueue,
    TickCommandBuilder, TickSource,
};
pub use codec::{Era, TicFormat, TickCodec};
pub use compat::{CompToggle, CompatibilityLevel, ToggleVector};
pub use demo::header::{
    parse_header, write_header, DemoHeader, HeaderContext, ParseOutcome, ParsedHeader,
    PlayerSlot, Strictness,
};
pub use demo::options::GameOptions;
pub use demo::playback::PlaybackStream;
pub use demo::stream::DemoByteStream;
pub use error::{DemoError, DemoResult, ErrorClass};
pub use key_frame::{KeyFrame, KeyFrames};
pub use scheduler::{GameAction, GameState, GameTicker, PauseMode, Simulation};
pub use sessions::builder::SessionBuilder;
pub use sessions::config::{DemoOverrides, EngineConfig, FirstInput, Game, GameMission, GameMode};
pub use sessions::{DemoSession, PlaybackSession, RecordingSession};
pub use ticcmd::{ExtendedCommand, TickCommand, Weapon};

pub mod builder;
pub mod codec;
pub mod compat;
pub mod demo;
#[doc(hidden)]
pub mod error;
pub mod key_frame;
pub mod prelude;
pub mod savegame;
pub mod scheduler;
pub mod sessions;
pub mod telemetry;
#[doc(hidden)]
pub mod test_config;
pub mod ticcmd;

/// Internal module exposing implementation details for testing and fuzzing.
///
/// # ⚠️ WARNING: No Stability Guarantees
///
/// **This module is NOT part of the public API.** Everything here is subject
/// to change without notice and intended only for fuzzing, property-based
/// testing and integration tests in the same workspace.
#[doc(hidden)]
pub mod __internal {
    pub use crate::codec::bytes::{ByteReader, ByteWriter};
    pub use crate::codec::extended::{DsdaExtendedCodec, ExtendedCommandCodec};
    pub use crate::codec::snapshot::{decode as snapshot_decode, encode as snapshot_encode};
    pub use crate::demo::extended::{strip_version_255, ExtendedHeader};
    pub use crate::demo::scan::{demo_marker_position, demo_tics_count};
}

// #############
// # CONSTANTS #
// #############

/// Internally, -1 represents no tic / invalid tic.
pub const NULL_TIC: i32 = -1;

/// Simulation tics per second.
pub const TICRATE: i32 = 35;

/// Number of player slots in a Doom or Heretic game.
pub const MAXPLAYERS: usize = 4;

/// Number of player slots in a Hexen game.
pub const HEXEN_MAXPLAYERS: usize = 8;

/// Boom-lineage demos always reserve this many player presence bytes.
pub const FUTURE_MAXPLAYERS: usize = 32;

/// Byte terminating the tick data region of a demo.
pub const DEMOMARKER: u8 = 0x80;

/// A tic is a single step of game simulation.
///
/// `Tic` wraps an `i32` the same way every tic counter in the engine does
/// (`gametic`, `leveltime`, `basetic`). The special value [`Tic::NULL`]
/// represents "no tic".
///
/// # Examples
///
/// ```
/// use tick_demo::Tic;
///
/// let tic = Tic::new(0);
/// assert!(tic.is_valid());
/// assert!(Tic::NULL.is_null());
///
/// let next = tic + 1;
/// assert_eq!(next.as_i32(), 1);
/// assert!(next > tic);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Tic(i32);

impl Tic {
    /// The null tic constant, representing "no tic".
    pub const NULL: Tic = Tic(NULL_TIC);

    /// The first tic of a session.
    pub const ZERO: Tic = Tic(0);

    /// Creates a new `Tic` from an `i32` value.
    #[inline]
    #[must_use]
    pub const fn new(tic: i32) -> Self {
        Tic(tic)
    }

    /// Returns the underlying `i32` value.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Returns `true` if this is [`Tic::NULL`].
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == NULL_TIC
    }

    /// Returns `true` if this tic is non-negative.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Returns `Some(self)` if the tic is valid, or `None` otherwise.
    #[inline]
    #[must_use]
    pub const fn to_option(self) -> Option<Tic> {
        if self.is_valid() {
            Some(self)
        } else {
            None
        }
    }

    /// Whole seconds of game time represented by this tic count.
    #[inline]
    #[must_use]
    pub const fn seconds(self) -> i32 {
        self.0 / TICRATE
    }
}

impl std::fmt::Display for Tic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "NULL_TIC")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl std::ops::Add<i32> for Tic {
    type Output = Tic;

    #[inline]
    fn add(self, rhs: i32) -> Self::Output {
        Tic(self.0 + rhs)
    }
}

impl std::ops::AddAssign<i32> for Tic {
    #[inline]
    fn add_assign(&mut self, rhs: i32) {
        self.0 += rhs;
    }
}

impl std::ops::Sub<i32> for Tic {
    type Output = Tic;

    #[inline]
    fn sub(self, rhs: i32) -> Self::Output {
        Tic(self.0 - rhs)
    }
}

impl std::ops::Sub<Tic> for Tic {
    type Output = i32;

    #[inline]
    fn sub(self, rhs: Tic) -> Self::Output {
        self.0 - rhs.0
    }
}

impl std::ops::Rem<i32> for Tic {
    type Output = i32;

    #[inline]
    fn rem(self, rhs: i32) -> Self::Output {
        self.0 % rhs
    }
}

impl From<i32> for Tic {
    #[inline]
    fn from(value: i32) -> Self {
        Tic(value)
    }
}

impl From<Tic> for i32 {
    #[inline]
    fn from(tic: Tic) -> Self {
        tic.0
    }
}

impl PartialEq<i32> for Tic {
    #[inline]
    fn eq(&self, other: &i32) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<i32> for Tic {
    #[inline]
    fn partial_cmp(&self, other: &i32) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

/// Index of a player slot (0-based, `consoleplayer`-style).
///
/// # Examples
///
/// ```
/// use tick_demo::PlayerIndex;
///
/// let player = PlayerIndex::new(1);
/// assert!(player.is_valid_for(4));
/// assert!(!player.is_valid_for(1));
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PlayerIndex(usize);

impl PlayerIndex {
    /// Creates a new `PlayerIndex`.
    #[inline]
    #[must_use]
    pub const fn new(index: usize) -> Self {
        PlayerIndex(index)
    }

    /// Returns the underlying `usize` value.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns `true` if the index addresses a slot in a game with `num_slots` slots.
    #[inline]
    #[must_use]
    pub const fn is_valid_for(self, num_slots: usize) -> bool {
        self.0 < num_slots
    }
}

impl std::fmt::Display for PlayerIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for PlayerIndex {
    #[inline]
    fn from(value: usize) -> Self {
        PlayerIndex(value)
    }
}

impl From<PlayerIndex> for usize {
    #[inline]
    fn from(index: PlayerIndex) -> Self {
        index.0
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

    // ==========================================
    // Tic Tests
    // ==========================================

    #[test]
    fn tic_null_is_not_valid() {
        assert!(Tic::NULL.is_null());
        assert!(!Tic::NULL.is_valid());
        assert_eq!(Tic::NULL.to_option(), None);
    }

    #[test]
    fn tic_arithmetic() {
        let tic = Tic::new(10);
        assert_eq!((tic + 5).as_i32(), 15);
        assert_eq!((tic - 3).as_i32(), 7);
        assert_eq!(Tic::new(20) - tic, 10);
        assert_eq!(Tic::new(37) % TICRATE, 2);

        let mut counter = Tic::ZERO;
        counter += 1;
        assert_eq!(counter, 1);
    }

    #[test]
    fn tic_seconds() {
        assert_eq!(Tic::new(0).seconds(), 0);
        assert_eq!(Tic::new(34).seconds(), 0);
        assert_eq!(Tic::new(35).seconds(), 1);
        assert_eq!(Tic::new(35 * 60).seconds(), 60);
    }

    #[test]
    fn tic_display() {
        assert_eq!(Tic::new(42).to_string(), "42");
        assert_eq!(Tic::NULL.to_string(), "NULL_TIC");
    }

    // ==========================================
    // PlayerIndex Tests
    // ==========================================

    #[test]
    fn player_index_bounds() {
        assert!(PlayerIndex::new(0).is_valid_for(1));
        assert!(PlayerIndex::new(3).is_valid_for(MAXPLAYERS));
        assert!(!PlayerIndex::new(4).is_valid_for(MAXPLAYERS));
        assert!(PlayerIndex::new(7).is_valid_for(HEXEN_MAXPLAYERS));
    }

    #[test]
    fn player_index_conversions() {
        let index = PlayerIndex::from(2usize);
        assert_eq!(usize::from(index), 2);
        assert_eq!(index.to_string(), "2");
    }
}
