//! Common test infrastructure shared across integration tests.
//!
//! - [`StubGame`]: a tiny deterministic [`Simulation`] that folds every
//!   command it is given into a running digest.
//! - Demo fixtures: recorded demos and hand-built legacy headers.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    dead_code
)]

use std::collections::BTreeMap;

use tick_demo::savegame::{LoadCheck, SaveGame, SavedDemo, SAVE_VERSION};
use tick_demo::scheduler::{ExtendedRequest, TickFrame};
use tick_demo::{
    CompatibilityLevel, DemoError, DemoOverrides, DemoResult, DemoSession, GameAction,
    GameOptions, GameState, RecordingSession, SessionBuilder, Simulation, TickCommand,
};

/// Signature the stub's content hashes to.
pub const STUB_SIGNATURE: u64 = 0x1993_1210;

/// Installs a test-friendly tracing subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A deterministic simulation stand-in.
#[derive(Debug, Default)]
pub struct StubGame {
    pub players: usize,
    pub level_time: i32,
    pub total_level_times: i32,
    pub digest: u64,
    pub ticks: Vec<(GameState, Vec<TickCommand>)>,
    pub actions: Vec<GameAction>,
    pub requests: Vec<(usize, ExtendedRequest)>,
    pub saves: BTreeMap<u8, Vec<u8>>,
    pub god: bool,
    /// What every player other than the console player sends.
    pub remote: TickCommand,
}

impl StubGame {
    #[must_use]
    pub fn new(players: usize) -> Self {
        Self {
            players,
            ..Self::default()
        }
    }

    /// Commands each tick handed to `player`.
    #[must_use]
    pub fn commands_of(&self, player: usize) -> Vec<TickCommand> {
        self.ticks.iter().map(|(_, cmds)| cmds[player]).collect()
    }

    fn fold(&mut self, cmd: &TickCommand) {
        let bytes = [
            cmd.forward as u8,
            cmd.side as u8,
            (cmd.angle_turn >> 8) as u8,
            cmd.angle_turn as u8,
            cmd.buttons,
        ];
        for b in bytes {
            self.digest = self.digest.wrapping_mul(0x100_0000_01b3) ^ u64::from(b);
        }
    }

    fn state_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&self.digest.to_le_bytes());
        out.extend_from_slice(&self.level_time.to_le_bytes());
        out.extend_from_slice(&self.total_level_times.to_le_bytes());
        out
    }

    fn restore_bytes(&mut self, bytes: &[u8]) -> DemoResult<()> {
        if bytes.len() != 16 {
            return Err(DemoError::InvalidRequest {
                info: format!("stub state has {} bytes", bytes.len()),
            });
        }
        self.digest = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        self.level_time = i32::from_le_bytes(bytes[8..12].try_into().unwrap());
        self.total_level_times = i32::from_le_bytes(bytes[12..].try_into().unwrap());
        Ok(())
    }

    fn save(&mut self, slot: u8, session: &DemoSession) -> DemoResult<()> {
        let save = SaveGame {
            description: format!("slot {}", slot),
            version: SAVE_VERSION.to_owned(),
            signature: STUB_SIGNATURE,
            wads: vec!["doom2.wad".to_owned()],
            package_version: 1,
            level: session
                .recording()
                .map_or(CompatibilityLevel::Mbf21, RecordingSession::level),
            skill: 2,
            episode: 1,
            map: 1,
            players: (0..4).map(|p| p < self.players).collect(),
            music: Some(1),
            options: GameOptions::default(),
            level_time: self.level_time,
            total_level_times: self.total_level_times,
            basetic_offset: 0,
            archive: self.state_bytes(),
            demo: session
                .recording()
                .map(|recording| SavedDemo::capture(recording.stream(), false)),
        };
        self.saves.insert(slot, save.to_bytes()?);
        Ok(())
    }

    fn load(&mut self, slot: u8, forced: bool, session: &mut DemoSession) -> DemoResult<()> {
        let bytes = self.saves.get(&slot).cloned().ok_or_else(|| DemoError::InvalidRequest {
            info: format!("slot {} is empty", slot),
        })?;
        let check = LoadCheck {
            signature: STUB_SIGNATURE,
            forced,
            ..LoadCheck::default()
        };
        let save = SaveGame::from_bytes(&bytes, &check, &None)?;
        self.restore_bytes(&save.archive)?;
        if let (Some(demo), Some(recording)) = (&save.demo, session.recording_mut()) {
            demo.apply(recording.stream_mut())?;
        }
        Ok(())
    }
}

impl Simulation for StubGame {
    fn player_in_game(&self, player: usize) -> bool {
        player < self.players
    }

    fn level_time(&self) -> i32 {
        self.level_time
    }

    fn total_level_times(&self) -> i32 {
        self.total_level_times
    }

    fn perform(&mut self, action: &GameAction, session: &mut DemoSession) -> DemoResult<GameAction> {
        self.actions.push(*action);
        Ok(match *action {
            GameAction::NewGame | GameAction::PlayDemo => {
                if let Some(playback) = session.playback() {
                    self.players = playback.header().player_count();
                }
                self.level_time = 0;
                self.total_level_times = 0;
                self.digest = 0;
                GameAction::Nothing
            }
            GameAction::LoadLevel => {
                self.level_time = 0;
                GameAction::Nothing
            }
            GameAction::Completed => {
                self.total_level_times += self.level_time;
                GameAction::Nothing
            }
            GameAction::WorldDone => GameAction::LoadLevel,
            GameAction::SaveGame { slot } => {
                self.save(slot, session)?;
                GameAction::Nothing
            }
            GameAction::LoadGame { slot, forced } => {
                self.load(slot, forced, session)?;
                GameAction::Nothing
            }
            _ => GameAction::Nothing,
        })
    }

    fn remote_command(&mut self, _player: usize) -> TickCommand {
        self.remote
    }

    fn extended_request(&mut self, player: usize, request: ExtendedRequest) -> DemoResult<()> {
        self.requests.push((player, request));
        if request == ExtendedRequest::God {
            self.god = !self.god;
        }
        Ok(())
    }

    fn run_tick(&mut self, frame: &TickFrame<'_>) -> DemoResult<()> {
        if frame.state == GameState::Level && !frame.paused {
            for cmd in frame.commands.iter().take(self.players) {
                self.fold(cmd);
            }
            self.level_time += 1;
        }
        self.ticks.push((frame.state, frame.commands.to_vec()));
        Ok(())
    }

    fn save_state(&self) -> DemoResult<Vec<u8>> {
        Ok(self.state_bytes())
    }

    fn load_state(&mut self, state: &[u8]) -> DemoResult<()> {
        self.restore_bytes(state)
    }
}

/// Overrides that record at `level`.
#[must_use]
pub fn overrides_for(level: CompatibilityLevel) -> DemoOverrides {
    DemoOverrides {
        complevel: Some(level),
        ..DemoOverrides::default()
    }
}

/// A fresh single-player recording at `level`.
#[must_use]
pub fn recording(level: CompatibilityLevel) -> RecordingSession {
    SessionBuilder::new()
        .with_overrides(overrides_for(level))
        .start_recording()
        .unwrap()
}

/// The synthetic forward-only command for tick `n`.
#[must_use]
pub fn forward_command(n: usize) -> TickCommand {
    TickCommand {
        forward: 25 + (n % 25) as i8,
        ..TickCommand::EMPTY
    }
}

/// A finished demo of `ticks` forward-only commands at `level`.
#[must_use]
pub fn forward_demo(level: CompatibilityLevel, ticks: usize) -> Vec<u8> {
    let mut session = recording(level);
    for n in 0..ticks {
        session.record(&forward_command(n)).unwrap();
    }
    session.finalize()
}

/// A version 104-111 header: version, skill, episode, map, deathmatch,
/// respawn, fast, nomonsters, console player and four presence bytes.
#[must_use]
pub fn legacy_header(version: u8, skill: u8, episode: u8, map: u8, deathmatch: u8) -> Vec<u8> {
    vec![version, skill, episode, map, deathmatch, 0, 0, 0, 0, 1, 0, 0, 0]
}
