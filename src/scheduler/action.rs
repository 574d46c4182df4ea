use std::fmt;

use super::GameState;

/// A pending change to the game, performed at the start of the next tick.
///
/// Performing an action can request another one (a finished intermission
/// asks for the next level to load), so actions form a chain that is drained
/// completely before any player command is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameAction {
    /// Nothing pending.
    #[default]
    Nothing,
    /// (Re)load the current map.
    LoadLevel,
    /// Start a new game from the chosen skill, episode and map.
    NewGame,
    /// Load a save game.
    LoadGame {
        /// Save slot.
        slot: u8,
        /// Skip the version and signature checks.
        forced: bool,
    },
    /// Write a save game.
    SaveGame {
        /// Save slot.
        slot: u8,
    },
    /// Start playing the demo installed in the session.
    PlayDemo,
    /// The level was exited.
    Completed,
    /// The episode was won.
    Victory,
    /// The intermission is over.
    WorldDone,
    /// Take a screenshot.
    Screenshot,
    /// Teleport to another map of the hub.
    LeaveMap,
}

impl GameAction {
    /// Returns `true` for [`GameAction::Nothing`].
    #[must_use]
    pub const fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    /// The state the game is in once this action has been performed, if the
    /// action decides it.
    #[must_use]
    pub const fn resulting_state(&self) -> Option<GameState> {
        match self {
            Self::LoadLevel
            | Self::NewGame
            | Self::LoadGame { .. }
            | Self::PlayDemo
            | Self::LeaveMap => Some(GameState::Level),
            Self::Completed => Some(GameState::Intermission),
            Self::Victory => Some(GameState::Finale),
            Self::Nothing | Self::SaveGame { .. } | Self::WorldDone | Self::Screenshot => None,
        }
    }

    /// Starts a fresh level, so held-key state from the previous one is dropped.
    #[must_use]
    pub const fn starts_level(&self) -> bool {
        matches!(
            self,
            Self::LoadLevel | Self::NewGame | Self::LoadGame { .. } | Self::PlayDemo | Self::LeaveMap
        )
    }
}

impl fmt::Display for GameAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => write!(f, "nothing"),
            Self::LoadLevel => write!(f, "load level"),
            Self::NewGame => write!(f, "new game"),
            Self::LoadGame { slot, forced } => {
                write!(f, "load game {}", slot)?;
                if *forced {
                    write!(f, " (forced)")?;
                }
                Ok(())
            }
            Self::SaveGame { slot } => write!(f, "save game {}", slot),
            Self::PlayDemo => write!(f, "play demo"),
            Self::Completed => write!(f, "completed"),
            Self::Victory => write!(f, "victory"),
            Self::WorldDone => write!(f, "world done"),
            Self::Screenshot => write!(f, "screenshot"),
            Self::LeaveMap => write!(f, "leave map"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_changes_decide_the_state() {
        assert_eq!(GameAction::NewGame.resulting_state(), Some(GameState::Level));
        assert_eq!(
            GameAction::Completed.resulting_state(),
            Some(GameState::Intermission)
        );
        assert_eq!(GameAction::Victory.resulting_state(), Some(GameState::Finale));
        assert_eq!(GameAction::WorldDone.resulting_state(), None);
        assert_eq!(GameAction::SaveGame { slot: 0 }.resulting_state(), None);
    }

    #[test]
    fn display_names() {
        let load = GameAction::LoadGame {
            slot: 3,
            forced: true,
        };
        assert_eq!(load.to_string(), "load game 3 (forced)");
        assert!(GameAction::default().is_nothing());
        assert!(load.starts_level());
        assert!(!GameAction::Screenshot.starts_level());
    }
}
