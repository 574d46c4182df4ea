//! Configuration types for demo sessions.
//!
//! | Config Type | Purpose |
//! |-------------|---------|
//! | [`EngineConfig`] | Which game is running and engine-wide rules |
//! | [`DemoOverrides`] | Command-line style overrides for recording and playback |
//! | [`FirstInput`] | Forced command for the first recorded tick |
//!
//! # Example
//!
//! ```
//! use tick_demo::{CompatibilityLevel, DemoOverrides, EngineConfig, Game};
//!
//! let config = EngineConfig {
//!     game: Game::Heretic,
//!     ..EngineConfig::default()
//! };
//! let overrides = DemoOverrides {
//!     complevel: Some(CompatibilityLevel::Mbf21),
//!     ..DemoOverrides::default()
//! };
//! assert!(config.validate().is_ok());
//! assert!(overrides.validate(&config).is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::compat::CompatibilityLevel;
use crate::error::DemoError;
use crate::{HEXEN_MAXPLAYERS, MAXPLAYERS};

/// Engine family. Heretic and Hexen use the Raven demo layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Game {
    /// Doom, Doom II and Final Doom.
    #[default]
    Doom,
    /// Heretic.
    Heretic,
    /// Hexen.
    Hexen,
}

impl Game {
    /// Heretic or Hexen.
    #[inline]
    #[must_use]
    pub const fn is_raven(self) -> bool {
        matches!(self, Game::Heretic | Game::Hexen)
    }

    /// Hexen only: player classes and eight player slots.
    #[inline]
    #[must_use]
    pub const fn is_hexen(self) -> bool {
        matches!(self, Game::Hexen)
    }

    /// Player slots the game supports.
    #[inline]
    #[must_use]
    pub const fn max_players(self) -> usize {
        if self.is_hexen() {
            HEXEN_MAXPLAYERS
        } else {
            MAXPLAYERS
        }
    }
}

/// The IWAD's release, used to pick a level for old demos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GameMode {
    /// Doom shareware.
    Shareware,
    /// Doom registered.
    Registered,
    /// Doom II and Final Doom.
    #[default]
    Commercial,
    /// The Ultimate Doom.
    Retail,
}

/// The IWAD's mission pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GameMission {
    /// Doom 1 missions.
    Doom,
    /// Doom II.
    #[default]
    Doom2,
    /// TNT: Evilution.
    Tnt,
    /// The Plutonia Experiment.
    Plutonia,
}

/// Engine-wide settings that outlive any one demo.
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Use the
/// `..EngineConfig::default()` pattern when constructing instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[must_use = "EngineConfig has no effect unless passed to SessionBuilder::with_engine_config()"]
pub struct EngineConfig {
    /// Engine family.
    pub game: Game,
    /// IWAD release.
    pub mode: GameMode,
    /// IWAD mission pack.
    pub mission: GameMission,
    /// Disallows tool-assisted input features (build mode, brute force).
    ///
    /// Default: `false`
    pub strict_mode: bool,
    /// Lets direct super shotgun selection through at demo-compatible levels.
    ///
    /// Default: `false`
    pub allow_ssg_direct: bool,
}

impl EngineConfig {
    /// Creates a new `EngineConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Player slots for the configured game.
    #[must_use]
    pub const fn max_players(&self) -> usize {
        self.game.max_players()
    }

    /// The level old Doom demos fall back to when no override is given.
    #[must_use]
    pub const fn vanilla_level(&self) -> CompatibilityLevel {
        match (self.mode, self.mission) {
            (GameMode::Retail, _) => CompatibilityLevel::UltDoom,
            (_, GameMission::Tnt | GameMission::Plutonia) => CompatibilityLevel::FinalDoom,
            _ => CompatibilityLevel::Doom2_19,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DemoError::InvalidRequest`] if a Raven game is paired with a
    /// Doom II mission pack.
    pub fn validate(&self) -> Result<(), DemoError> {
        if self.game.is_raven() && matches!(self.mission, GameMission::Tnt | GameMission::Plutonia)
        {
            return Err(DemoError::InvalidRequest {
                info: format!("{:?} has no {:?} mission pack", self.game, self.mission),
            });
        }
        Ok(())
    }
}

/// Forced command for the first tick of a recording (`forward side angle`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FirstInput {
    /// Forward movement.
    pub forward: i8,
    /// Side movement.
    pub side: i8,
    /// Angle delta in 8-bit angle units; stored in the high byte of the
    /// recorded angle.
    pub angle: i16,
}

/// Overrides for demo recording and playback. Every field defaults to "not given".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[must_use = "DemoOverrides has no effect unless passed to SessionBuilder::with_overrides()"]
pub struct DemoOverrides {
    /// Compatibility level to record at, or to assume for old demos.
    pub complevel: Option<CompatibilityLevel>,
    /// Record 16-bit angles.
    pub longtics: bool,
    /// Record 8-bit angles even where the format defaults to 16.
    pub shorttics: bool,
    /// Forced command for the first recorded tick.
    pub first_input: Option<FirstInput>,
    /// Player slot to view during playback.
    pub console_player: Option<u8>,
    /// Allows experimental demo formats.
    pub bad_demo: bool,
    /// Forces the DSDA extended header and its extended commands.
    pub dsda_demo: bool,
    /// Monsters respawn (synthesized for pre-1.4 demos).
    pub respawn: bool,
    /// Fast monsters (synthesized for pre-1.4 demos).
    pub fast: bool,
    /// No monsters (synthesized for pre-1.4 demos).
    pub nomonsters: bool,
    /// Doom-in-Hexen map format; experimental.
    pub zdoom_map_format: bool,
}

impl DemoOverrides {
    /// Validates the overrides against `config`.
    ///
    /// # Errors
    ///
    /// - [`DemoError::InvalidRequest`] if `longtics` and `shorttics` are both set
    ///   or the console player is out of range.
    /// - [`DemoError::ExperimentalFormat`] if the experimental map format is
    ///   requested without `bad_demo` and mbf21.
    pub fn validate(&self, config: &EngineConfig) -> Result<(), DemoError> {
        if self.longtics && self.shorttics {
            return Err(DemoError::InvalidRequest {
                info: "longtics and shorttics are mutually exclusive".to_owned(),
            });
        }
        if let Some(player) = self.console_player {
            if usize::from(player) >= config.max_players() {
                return Err(DemoError::InvalidRequest {
                    info: format!(
                        "console player {} out of range for {} players",
                        player,
                        config.max_players()
                    ),
                });
            }
        }
        self.check_map_format()
    }

    /// Experimental map formats need `bad_demo` and mbf21.
    ///
    /// # Errors
    ///
    /// [`DemoError::ExperimentalFormat`] when the gate is not satisfied.
    pub fn check_map_format(&self) -> Result<(), DemoError> {
        if !self.zdoom_map_format {
            return Ok(());
        }
        if !self.bad_demo {
            return Err(DemoError::ExperimentalFormat {
                info: "the zdoom map format is experimental; enable bad_demo to record it"
                    .to_owned(),
            });
        }
        if self.complevel != Some(CompatibilityLevel::Mbf21) {
            return Err(DemoError::ExperimentalFormat {
                info: "the zdoom map format requires complevel 21".to_owned(),
            });
        }
        Ok(())
    }

    /// Whether the extended (DSDA) header is written: forced by `dsda_demo`
    /// or by the experimental map format.
    #[must_use]
    pub const fn wants_extended_header(&self) -> bool {
        self.dsda_demo || self.zdoom_map_format
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

    // ========================================================================
    // Game Tests
    // ========================================================================

    #[test]
    fn raven_games() {
        assert!(!Game::Doom.is_raven());
        assert!(Game::Heretic.is_raven());
        assert!(Game::Hexen.is_raven());
        assert!(Game::Hexen.is_hexen());
        assert_eq!(Game::Heretic.max_players(), MAXPLAYERS);
        assert_eq!(Game::Hexen.max_players(), HEXEN_MAXPLAYERS);
    }

    #[test]
    fn vanilla_level_follows_iwad() {
        let mut config = EngineConfig::default();
        assert_eq!(config.vanilla_level(), CompatibilityLevel::Doom2_19);
        config.mode = GameMode::Retail;
        config.mission = GameMission::Doom;
        assert_eq!(config.vanilla_level(), CompatibilityLevel::UltDoom);
        config.mode = GameMode::Commercial;
        config.mission = GameMission::Plutonia;
        assert_eq!(config.vanilla_level(), CompatibilityLevel::FinalDoom);
    }

    // ========================================================================
    // Validation Tests
    // ========================================================================

    #[test]
    fn raven_with_final_doom_mission_is_invalid() {
        let config = EngineConfig {
            game: Game::Hexen,
            mission: GameMission::Tnt,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DemoError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn tics_overrides_are_exclusive() {
        let overrides = DemoOverrides {
            longtics: true,
            shorttics: true,
            ..DemoOverrides::default()
        };
        assert!(overrides.validate(&EngineConfig::default()).is_err());
    }

    #[test]
    fn console_player_range_depends_on_game() {
        let overrides = DemoOverrides {
            console_player: Some(5),
            ..DemoOverrides::default()
        };
        assert!(overrides.validate(&EngineConfig::default()).is_err());
        let hexen = EngineConfig {
            game: Game::Hexen,
            ..EngineConfig::default()
        };
        assert!(overrides.validate(&hexen).is_ok());
    }

    #[test]
    fn zdoom_map_format_gate() {
        let mut overrides = DemoOverrides {
            zdoom_map_format: true,
            ..DemoOverrides::default()
        };
        assert!(matches!(
            overrides.check_map_format(),
            Err(DemoError::ExperimentalFormat { .. })
        ));
        overrides.bad_demo = true;
        assert!(overrides.check_map_format().is_err());
        overrides.complevel = Some(CompatibilityLevel::Mbf21);
        assert!(overrides.check_map_format().is_ok());
        assert!(overrides.wants_extended_header());
    }

    #[test]
    fn defaults_override_nothing() {
        let overrides = DemoOverrides::default();
        assert_eq!(overrides.complevel, None);
        assert!(!overrides.wants_extended_header());
        assert!(overrides.validate(&EngineConfig::default()).is_ok());
    }
}
