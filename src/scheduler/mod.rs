//! The game tick scheduler.
//!
//! [`GameTicker::tick`] is called once per simulation tick. It
//!
//! 1. drains the pending [`GameAction`] chain,
//! 2. fetches one [`TickCommand`] per in-game player, in player order, from
//!    the demo being played, the console player's builder or the
//!    [`Simulation`] for remote players,
//! 3. records those commands when a demo is being recorded,
//! 4. applies pause buttons and extended-command requests,
//! 5. lets the [`Simulation`] advance.
//!
//! The ticker owns the [`DemoSession`]; a simulation only sees it while
//! performing an action.

mod action;
pub mod demo_cycle;
mod pause;

pub use action::GameAction;
pub use demo_cycle::{CycleEntry, DemoCycle, DemoCycleStep, DemoStatus, TimeDemo, TimeDemoReport};
pub use pause::PauseMode;

use std::sync::Arc;

use smallvec::{smallvec, SmallVec};

use crate::builder::{BuildContext, BuilderSettings, InputState, PlayerView, TickCommandBuilder};
use crate::error::{DemoError, DemoResult};
use crate::key_frame::{KeyFrame, KeyFrames};
use crate::sessions::config::EngineConfig;
use crate::sessions::{DemoSession, PlaybackSession, RecordingSession, TickTiming};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::ticcmd::{actions, buttons, TickCommand};
use crate::{report_violation_to, Tic, MAXPLAYERS};

/// Longest action chain drained in one tick before the chain is declared stuck.
pub const MAX_ACTION_CHAIN: usize = 32;

/// What the game is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameState {
    /// Playing a level.
    Level,
    /// Between levels.
    Intermission,
    /// End of episode text or art.
    Finale,
    /// Title pages and attract demos.
    #[default]
    DemoScreen,
}

/// A side effect requested through an extended command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtendedRequest {
    /// Save to this slot right away.
    SaveGame {
        /// Save slot.
        slot: u8,
    },
    /// Toggle invulnerability.
    God,
    /// Toggle clipping.
    NoClip,
}

/// Everything the simulation needs to advance one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickFrame<'a> {
    /// The state being ticked.
    pub state: GameState,
    /// The tick being run.
    pub gametic: Tic,
    /// The game is paused; a level should not move.
    pub paused: bool,
    /// This tick's commands indexed by player; empty for absent players.
    pub commands: &'a [TickCommand],
}

/// The game side of the scheduler.
///
/// The ticker decides *which* command each player gets and *when* things
/// happen; the simulation owns the world those commands act on.
pub trait Simulation {
    /// Returns `true` if player slot `player` takes part.
    fn player_in_game(&self, player: usize) -> bool;

    /// What the console player's builder may know about `player`.
    fn player_view(&self, _player: usize) -> PlayerView {
        PlayerView::default()
    }

    /// Tics into the current level.
    fn level_time(&self) -> i32;

    /// Tics spent in previous levels.
    fn total_level_times(&self) -> i32;

    /// Performs `action` and returns the action it leads to, or
    /// [`GameAction::Nothing`].
    ///
    /// # Errors
    ///
    /// Errors abort the tick and leave no action pending.
    fn perform(&mut self, action: &GameAction, session: &mut DemoSession)
        -> DemoResult<GameAction>;

    /// The command a player not sampled here sent for this tick.
    fn remote_command(&mut self, _player: usize) -> TickCommand {
        TickCommand::EMPTY
    }

    /// Applies a request embedded in `player`'s command.
    ///
    /// # Errors
    ///
    /// Errors abort the tick.
    fn extended_request(&mut self, _player: usize, _request: ExtendedRequest) -> DemoResult<()> {
        Ok(())
    }

    /// Advances the world by one tick.
    ///
    /// # Errors
    ///
    /// Errors abort the tick.
    fn run_tick(&mut self, frame: &TickFrame<'_>) -> DemoResult<()>;

    /// Snapshot for a key frame.
    ///
    /// # Errors
    ///
    /// A snapshot that cannot be taken.
    fn save_state(&self) -> DemoResult<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Restores a snapshot taken by [`save_state`](Self::save_state).
    ///
    /// # Errors
    ///
    /// A snapshot that cannot be restored.
    fn load_state(&mut self, _state: &[u8]) -> DemoResult<()> {
        Ok(())
    }
}

/// What one call to [`GameTicker::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    /// Player commands were fetched (and recorded, when recording).
    pub commands: bool,
    /// The simulation was asked to advance.
    pub advanced: bool,
    /// The demo being played ran out; call
    /// [`GameTicker::check_demo_status`].
    pub demo_finished: bool,
    /// The scripted queue ran dry and skip mode ended.
    pub skip_exhausted: bool,
}

/// Drives the game one tick at a time.
pub struct GameTicker {
    config: EngineConfig,
    session: DemoSession,
    builder: TickCommandBuilder,
    console_player: usize,
    action: GameAction,
    state: GameState,
    pause: PauseMode,
    advance_frame: bool,
    skip_mode: bool,
    gametic: Tic,
    basetic: Tic,
    key_frames: KeyFrames,
    timedemo: Option<TimeDemo>,
    commands: SmallVec<[TickCommand; MAXPLAYERS]>,
    observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for GameTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameTicker")
            .field("session", &self.session)
            .field("console_player", &self.console_player)
            .field("action", &self.action)
            .field("state", &self.state)
            .field("pause", &self.pause)
            .field("skip_mode", &self.skip_mode)
            .field("gametic", &self.gametic)
            .field("basetic", &self.basetic)
            .field("key_frames", &self.key_frames.len())
            .field("has_violation_observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl GameTicker {
    /// Creates an idle ticker showing the title screen.
    ///
    /// # Errors
    ///
    /// [`DemoError::InvalidRequest`] for invalid `config` or `settings`.
    pub fn new(config: EngineConfig, settings: BuilderSettings) -> DemoResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            session: DemoSession::Idle,
            builder: TickCommandBuilder::new(config, settings)?,
            console_player: 0,
            action: GameAction::Nothing,
            state: GameState::DemoScreen,
            pause: PauseMode::NONE,
            advance_frame: false,
            skip_mode: false,
            gametic: Tic::ZERO,
            basetic: Tic::ZERO,
            key_frames: KeyFrames::default(),
            timedemo: None,
            commands: smallvec![TickCommand::EMPTY; config.max_players()],
            observer: None,
        })
    }

    /// Replaces the key frame ring.
    pub fn set_key_frames(&mut self, key_frames: KeyFrames) {
        self.key_frames = key_frames;
    }

    /// Sets the observer scheduler violations are reported to.
    pub fn set_observer(&mut self, observer: Option<Arc<dyn ViolationObserver>>) {
        self.observer = observer;
    }

    /// Chooses the player sampled from local input when no demo is played.
    ///
    /// # Errors
    ///
    /// [`DemoError::InvalidRequest`] for a slot the game does not have.
    pub fn set_console_player(&mut self, player: usize) -> DemoResult<()> {
        if player >= self.config.max_players() {
            return Err(DemoError::InvalidRequest {
                info: format!(
                    "console player {} out of range for {} players",
                    player,
                    self.config.max_players()
                ),
            });
        }
        self.console_player = player;
        Ok(())
    }

    /// The player whose commands come from local input or whose view is shown.
    #[must_use]
    pub fn console_player(&self) -> usize {
        self.session
            .playback()
            .map_or(self.console_player, PlaybackSession::console_player)
    }

    /// The live demo session.
    #[must_use]
    pub const fn session(&self) -> &DemoSession {
        &self.session
    }

    /// The live demo session.
    pub fn session_mut(&mut self) -> &mut DemoSession {
        &mut self.session
    }

    /// The action that will be performed next tick.
    #[must_use]
    pub const fn pending_action(&self) -> GameAction {
        self.action
    }

    /// Requests `action` for the next tick, replacing any pending one.
    pub fn set_action(&mut self, action: GameAction) {
        self.action = action;
    }

    /// What the game is showing.
    #[must_use]
    pub const fn state(&self) -> GameState {
        self.state
    }

    /// Pause reasons in effect.
    #[must_use]
    pub const fn pause(&self) -> PauseMode {
        self.pause
    }

    /// Adds or clears a pause reason.
    pub fn set_paused(&mut self, reason: PauseMode, paused: bool) {
        if paused {
            self.pause.insert(reason);
        } else {
            self.pause.remove(reason);
        }
    }

    /// Lets exactly one tick through the current pause.
    pub fn advance_frame(&mut self) {
        self.advance_frame = true;
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn gametic(&self) -> Tic {
        self.gametic
    }

    /// Ticks spent paused outside a demo; keeps the random state in step.
    #[must_use]
    pub const fn basetic(&self) -> Tic {
        self.basetic
    }

    /// Returns `true` while skip mode fast-forwards through scripted commands.
    #[must_use]
    pub const fn skip_mode(&self) -> bool {
        self.skip_mode
    }

    /// Enters or leaves skip mode.
    pub fn set_skip_mode(&mut self, skip: bool) {
        self.skip_mode = skip;
    }

    /// Stored key frames.
    #[must_use]
    pub const fn key_frames(&self) -> &KeyFrames {
        &self.key_frames
    }

    /// The builder sampling the console player: the recording's while one is
    /// live, the ticker's own otherwise.
    pub fn console_builder_mut(&mut self) -> &mut TickCommandBuilder {
        match self.session {
            DemoSession::Recording(ref mut recording) => recording.builder_mut(),
            _ => &mut self.builder,
        }
    }

    /// Toggles build mode and its pause.
    ///
    /// # Errors
    ///
    /// [`DemoError::InvalidRequest`] in strict mode.
    pub fn toggle_build_mode(&mut self) -> DemoResult<bool> {
        let enabled = self.console_builder_mut().toggle_build_mode()?;
        self.set_paused(PauseMode::BUILD_MODE, enabled);
        Ok(enabled)
    }

    /// Starts recording: installs `recording` and schedules a new game.
    ///
    /// # Errors
    ///
    /// [`DemoError::InvalidRequest`] if a session is live.
    pub fn start_recording(&mut self, recording: RecordingSession) -> DemoResult<()> {
        self.session.begin(DemoSession::Recording(recording))?;
        self.action = GameAction::NewGame;
        tracing::info!(tic = self.gametic.as_i32(), "recording scheduled");
        Ok(())
    }

    /// Starts playing `playback` back.
    ///
    /// # Errors
    ///
    /// [`DemoError::InvalidRequest`] if a session is live.
    pub fn start_playback(&mut self, playback: PlaybackSession) -> DemoResult<()> {
        tracing::info!(name = playback.name(), "playback scheduled");
        self.session.begin(DemoSession::Playback(playback))?;
        self.action = GameAction::PlayDemo;
        self.pause.remove(PauseMode::PLAYBACK);
        Ok(())
    }

    /// Plays `playback` back as fast as possible and reports the frame rate
    /// once it ends.
    ///
    /// # Errors
    ///
    /// [`DemoError::InvalidRequest`] if a session is live.
    pub fn start_timedemo(&mut self, playback: PlaybackSession) -> DemoResult<()> {
        self.start_playback(playback)?;
        self.timedemo = Some(TimeDemo::start(self.gametic));
        Ok(())
    }

    /// Takes over the demo being played: recording continues from here.
    ///
    /// # Errors
    ///
    /// See [`DemoSession::join`].
    pub fn join_playback(&mut self, settings: BuilderSettings) -> DemoResult<()> {
        self.timedemo = None;
        self.pause.remove(PauseMode::PLAYBACK);
        self.session.join(settings)?;
        tracing::info!(tic = self.gametic.as_i32(), "joined demo playback");
        Ok(())
    }

    /// Stores a key frame for the current tick.
    ///
    /// # Errors
    ///
    /// Whatever [`Simulation::save_state`] reports.
    pub fn capture_key_frame<S: Simulation + ?Sized>(&mut self, sim: &S) -> DemoResult<()> {
        let state = sim.save_state()?;
        let stream = self.session.recording().map(RecordingSession::stream);
        self.key_frames
            .push(KeyFrame::capture(self.gametic, stream, state));
        Ok(())
    }

    /// Restores the key frame `back` steps before the newest, forgetting the
    /// newer ones. A recording is rewound and its next command marked as a
    /// takeover.
    ///
    /// # Errors
    ///
    /// - [`DemoError::InvalidRequest`] if there is no such frame.
    /// - [`DemoError::CursorForward`] if the frame lies ahead of the recording.
    /// - Whatever [`Simulation::load_state`] reports.
    pub fn restore_key_frame<S: Simulation + ?Sized>(
        &mut self,
        sim: &mut S,
        back: usize,
    ) -> DemoResult<Tic> {
        let frame = self
            .key_frames
            .rewind_to(back)
            .cloned()
            .ok_or_else(|| DemoError::InvalidRequest {
                info: format!("no key frame {} steps back", back),
            })?;
        if let Some(recording) = self.session.recording_mut() {
            frame.rewind(recording.stream_mut())?;
            recording.builder_mut().arm_join();
        }
        sim.load_state(&frame.state)?;
        self.gametic = frame.tic;
        self.action = GameAction::Nothing;
        tracing::info!(tic = frame.tic.as_i32(), "key frame restored");
        Ok(frame.tic)
    }

    /// Runs one tick.
    ///
    /// # Errors
    ///
    /// - [`DemoError::InternalError`] if the action chain does not settle.
    /// - Stream errors while reading or recording commands.
    /// - Whatever the [`Simulation`] reports.
    pub fn tick<S: Simulation + ?Sized>(
        &mut self,
        sim: &mut S,
        input: &InputState,
    ) -> DemoResult<TickOutcome> {
        let mut outcome = TickOutcome::default();
        self.drain_actions(sim)?;

        if self.pause.halts() && !self.advance_frame {
            return Ok(outcome);
        }

        let masked = self.advance_frame.then(|| {
            self.advance_frame = false;
            std::mem::take(&mut self.pause)
        });
        let result = self.tick_unmasked(sim, input, &mut outcome);
        if let Some(mask) = masked {
            self.pause = mask;
        }
        result?;

        self.gametic = self.gametic + 1;
        Ok(outcome)
    }

    fn tick_unmasked<S: Simulation + ?Sized>(
        &mut self,
        sim: &mut S,
        input: &InputState,
        outcome: &mut TickOutcome,
    ) -> DemoResult<()> {
        if self.console_builder_mut().brute_force_active() {
            self.pause.remove(PauseMode::BUILD_MODE);
        }

        if self.pause.outside_demo() {
            self.basetic = self.basetic + 1;
        } else {
            if self.state == GameState::Level && self.key_frames.is_due(self.gametic) {
                self.capture_key_frame(&*sim)?;
            }
            self.read_commands(sim, input, outcome)?;
            self.apply_special_buttons(sim)?;
            outcome.commands = true;
        }

        if self.pause.outside_demo() && self.state != GameState::Level {
            return Ok(());
        }

        let frame = TickFrame {
            state: self.state,
            gametic: self.gametic,
            paused: self.pause.is_paused(),
            commands: &self.commands,
        };
        sim.run_tick(&frame)?;
        outcome.advanced = true;
        Ok(())
    }

    fn drain_actions<S: Simulation + ?Sized>(&mut self, sim: &mut S) -> DemoResult<()> {
        let mut performed = 0;
        while !self.action.is_nothing() {
            if performed == MAX_ACTION_CHAIN {
                let stuck = std::mem::take(&mut self.action);
                report_violation_to!(
                    &self.observer,
                    ViolationSeverity::Critical,
                    ViolationKind::Scheduler,
                    "game action chain did not settle after {} actions, last {}",
                    MAX_ACTION_CHAIN,
                    stuck
                );
                return Err(DemoError::InternalError {
                    context: format!("game action chain stuck at {}", stuck),
                });
            }
            let action = std::mem::take(&mut self.action);
            tracing::debug!(tic = self.gametic.as_i32(), %action, "performing game action");
            let next = sim.perform(&action, &mut self.session)?;
            if let Some(state) = action.resulting_state() {
                self.state = state;
            }
            if action.starts_level() {
                self.pause.remove(PauseMode::COMMAND);
                self.console_builder_mut().reset_level_state();
            }
            self.action = next;
            performed += 1;
        }
        Ok(())
    }

    fn read_commands<S: Simulation + ?Sized>(
        &mut self,
        sim: &mut S,
        input: &InputState,
        outcome: &mut TickOutcome,
    ) -> DemoResult<()> {
        let console = self.console_player();
        let timing = TickTiming {
            level_time: sim.level_time(),
            total_level_times: sim.total_level_times(),
            skip_mode: self.skip_mode,
        };
        let mut playback_ended = false;

        for player in 0..self.commands.len() {
            if !sim.player_in_game(player) {
                self.set_command(player, TickCommand::EMPTY);
                continue;
            }
            let cmd = match &mut self.session {
                DemoSession::Playback(playback) => {
                    if playback_ended {
                        TickCommand::EMPTY
                    } else if let Some(cmd) = playback.read_tick()? {
                        cmd
                    } else {
                        playback_ended = true;
                        TickCommand::EMPTY
                    }
                }
                DemoSession::Recording(recording) => {
                    let cmd = if player == console {
                        let view = sim.player_view(player);
                        let built = recording.build_tick(input, &view, timing)?;
                        outcome.skip_exhausted |= built.skip_exhausted;
                        built.cmd
                    } else {
                        sim.remote_command(player)
                    };
                    recording.record(&cmd)?
                }
                DemoSession::Idle => {
                    if player == console {
                        let view = sim.player_view(player);
                        let ctx = BuildContext {
                            longtics: true,
                            level_time: timing.level_time,
                            total_level_times: timing.total_level_times,
                            skip_mode: timing.skip_mode,
                            ..BuildContext::default()
                        };
                        let built = self.builder.build(input, &view, &ctx)?;
                        outcome.skip_exhausted |= built.skip_exhausted;
                        built.cmd
                    } else {
                        sim.remote_command(player)
                    }
                }
            };
            self.set_command(player, cmd);
        }

        if playback_ended {
            outcome.demo_finished = true;
            tracing::info!(tic = self.gametic.as_i32(), "demo playback reached its end");
        }
        if outcome.skip_exhausted {
            self.skip_mode = false;
        }
        Ok(())
    }

    fn set_command(&mut self, player: usize, cmd: TickCommand) {
        if let Some(slot) = self.commands.get_mut(player) {
            *slot = cmd;
        }
    }

    fn extended_allowed(&self) -> bool {
        match &self.session {
            DemoSession::Recording(recording) => recording.allows_extended(),
            DemoSession::Playback(playback) => playback.stream().codec().format().extended,
            DemoSession::Idle => false,
        }
    }

    fn apply_special_buttons<S: Simulation + ?Sized>(&mut self, sim: &mut S) -> DemoResult<()> {
        let raven = self.config.game.is_raven();
        let extended = self.extended_allowed();

        for player in 0..self.commands.len() {
            if !sim.player_in_game(player) {
                continue;
            }
            let Some(cmd) = self.commands.get_mut(player) else {
                continue;
            };
            if cmd.is_special() {
                match cmd.buttons & buttons::BT_SPECIALMASK {
                    buttons::BT_PAUSE => {
                        self.pause.toggle(PauseMode::COMMAND);
                        tracing::debug!(player, pause = %self.pause, "pause toggled");
                    }
                    buttons::BTS_SAVEGAME => {
                        let slot = (cmd.buttons & buttons::BTS_SAVEMASK) >> buttons::BTS_SAVESHIFT;
                        self.action = GameAction::SaveGame { slot };
                    }
                    _ => {}
                }
                if !raven {
                    cmd.buttons = 0;
                }
            }

            if !extended {
                continue;
            }
            let ext = cmd.ext;
            if ext.has(actions::XC_SAVE) {
                sim.extended_request(player, ExtendedRequest::SaveGame { slot: ext.save_slot })?;
            }
            if ext.has(actions::XC_LOAD) {
                self.action = GameAction::LoadGame {
                    slot: ext.load_slot,
                    forced: true,
                };
            }
            if ext.has(actions::XC_GOD) {
                sim.extended_request(player, ExtendedRequest::God)?;
            }
            if ext.has(actions::XC_NOCLIP) {
                sim.extended_request(player, ExtendedRequest::NoClip)?;
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
    use crate::compat::CompatibilityLevel;
    use crate::demo::header::Strictness;
    use crate::sessions::builder::SessionBuilder;
    use crate::sessions::config::DemoOverrides;
    use crate::telemetry::CollectingObserver;
    use crate::ticcmd::ExtendedCommand;

    #[derive(Default)]
    struct Recorder {
        players: usize,
        performed: Vec<GameAction>,
        frames: Vec<(GameState, i32, bool, Vec<TickCommand>)>,
        requests: Vec<(usize, ExtendedRequest)>,
        remote: TickCommand,
        chain: Vec<GameAction>,
        state: u8,
    }

    impl Recorder {
        fn with_players(players: usize) -> Self {
            Self {
                players,
                ..Self::default()
            }
        }
    }

    impl Simulation for Recorder {
        fn player_in_game(&self, player: usize) -> bool {
            player < self.players
        }

        fn level_time(&self) -> i32 {
            self.frames.len() as i32
        }

        fn total_level_times(&self) -> i32 {
            0
        }

        fn perform(
            &mut self,
            action: &GameAction,
            _session: &mut DemoSession,
        ) -> DemoResult<GameAction> {
            self.performed.push(*action);
            Ok(self.chain.pop().unwrap_or_default())
        }

        fn remote_command(&mut self, _player: usize) -> TickCommand {
            self.remote
        }

        fn extended_request(&mut self, player: usize, request: ExtendedRequest) -> DemoResult<()> {
            self.requests.push((player, request));
            Ok(())
        }

        fn run_tick(&mut self, frame: &TickFrame<'_>) -> DemoResult<()> {
            self.frames.push((
                frame.state,
                frame.gametic.as_i32(),
                frame.paused,
                frame.commands.to_vec(),
            ));
            self.state = self.state.wrapping_add(1);
            Ok(())
        }

        fn save_state(&self) -> DemoResult<Vec<u8>> {
            Ok(vec![self.state])
        }

        fn load_state(&mut self, state: &[u8]) -> DemoResult<()> {
            self.state = state[0];
            Ok(())
        }
    }

    fn ticker() -> GameTicker {
        GameTicker::new(EngineConfig::default(), BuilderSettings::default()).unwrap()
    }

    fn forward() -> InputState {
        InputState {
            forward: true,
            ..InputState::idle()
        }
    }

    fn recording(level: CompatibilityLevel, players: usize) -> RecordingSession {
        recording_with(level, players, false)
    }

    fn recording_with(level: CompatibilityLevel, players: usize, dsda: bool) -> RecordingSession {
        SessionBuilder::new()
            .with_overrides(DemoOverrides {
                complevel: Some(level),
                dsda_demo: dsda,
                ..DemoOverrides::default()
            })
            .with_num_players(players)
            .unwrap()
            .start_recording()
            .unwrap()
    }

    // ===== Actions =====

    #[test]
    fn action_chain_is_drained_before_commands() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(1);
        sim.chain = vec![GameAction::LoadLevel];
        ticker.set_action(GameAction::WorldDone);
        let outcome = ticker.tick(&mut sim, &InputState::idle()).unwrap();
        assert_eq!(sim.performed, vec![GameAction::WorldDone, GameAction::LoadLevel]);
        assert_eq!(ticker.state(), GameState::Level);
        assert!(outcome.advanced);
        assert_eq!(sim.frames[0].0, GameState::Level);
    }

    #[test]
    fn endless_chain_is_an_internal_error() {
        struct Loop;
        impl Simulation for Loop {
            fn player_in_game(&self, _: usize) -> bool {
                false
            }
            fn level_time(&self) -> i32 {
                0
            }
            fn total_level_times(&self) -> i32 {
                0
            }
            fn perform(&mut self, _: &GameAction, _: &mut DemoSession) -> DemoResult<GameAction> {
                Ok(GameAction::LoadLevel)
            }
            fn run_tick(&mut self, _: &TickFrame<'_>) -> DemoResult<()> {
                Ok(())
            }
        }
        let observer = Arc::new(CollectingObserver::new());
        let mut ticker = ticker();
        ticker.set_observer(Some(observer.clone()));
        ticker.set_action(GameAction::LoadLevel);
        let err = ticker.tick(&mut Loop, &InputState::idle()).unwrap_err();
        assert!(matches!(err, DemoError::InternalError { .. }));
        assert!(observer.has_violation(ViolationKind::Scheduler));
        assert!(ticker.pending_action().is_nothing());
    }

    // ===== Commands =====

    #[test]
    fn commands_follow_player_order() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(2);
        sim.remote = TickCommand {
            side: 5,
            ..TickCommand::EMPTY
        };
        ticker.set_action(GameAction::NewGame);
        ticker.tick(&mut sim, &forward()).unwrap();
        let commands = &sim.frames[0].3;
        assert!(commands[0].forward > 0);
        assert_eq!(commands[1].side, 5);
        assert_eq!(commands[2], TickCommand::EMPTY);
    }

    #[test]
    fn recording_writes_every_player() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(2);
        ticker
            .start_recording(recording(CompatibilityLevel::Mbf21, 2))
            .unwrap();
        for _ in 0..3 {
            ticker.tick(&mut sim, &forward()).unwrap();
        }
        let recording = ticker.session().recording().unwrap();
        assert_eq!(recording.stream().tics(), 6);
        assert_eq!(sim.performed, vec![GameAction::NewGame]);
    }

    #[test]
    fn playback_replays_the_recording() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(1);
        ticker
            .start_recording(recording(CompatibilityLevel::Boom202, 1))
            .unwrap();
        for _ in 0..4 {
            ticker.tick(&mut sim, &forward()).unwrap();
        }
        let recorded: Vec<TickCommand> = sim.frames.iter().map(|f| f.3[0]).collect();
        let data = match ticker.session_mut().end() {
            DemoSession::Recording(recording) => recording.finalize(),
            other => panic!("expected a recording, got {:?}", other),
        };

        let playback = SessionBuilder::new()
            .start_playback("replay", data, Strictness::Strict)
            .unwrap()
            .parsed()
            .unwrap();
        let mut replay = Recorder::with_players(1);
        ticker.start_playback(playback).unwrap();
        for _ in 0..4 {
            assert!(!ticker.tick(&mut replay, &InputState::idle()).unwrap().demo_finished);
        }
        let replayed: Vec<TickCommand> = replay.frames.iter().map(|f| f.3[0]).collect();
        assert_eq!(replayed, recorded);
        assert!(ticker.tick(&mut replay, &InputState::idle()).unwrap().demo_finished);
    }

    // ===== Pause =====

    #[test]
    fn build_mode_pause_only_moves_the_base_tic() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(1);
        ticker.set_action(GameAction::NewGame);
        ticker.tick(&mut sim, &InputState::idle()).unwrap();
        assert!(ticker.toggle_build_mode().unwrap());

        let outcome = ticker.tick(&mut sim, &forward()).unwrap();
        assert!(!outcome.commands);
        assert!(outcome.advanced);
        assert!(sim.frames[1].2);
        assert_eq!(ticker.basetic(), Tic::new(1));
    }

    #[test]
    fn advance_frame_masks_the_pause_once() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(1);
        ticker.set_action(GameAction::NewGame);
        ticker.tick(&mut sim, &InputState::idle()).unwrap();
        ticker.set_paused(PauseMode::BUILD_MODE, true);

        ticker.advance_frame();
        let outcome = ticker.tick(&mut sim, &InputState::idle()).unwrap();
        assert!(outcome.commands);
        assert!(!sim.frames[1].2);
        assert_eq!(ticker.pause(), PauseMode::BUILD_MODE);

        assert!(!ticker.tick(&mut sim, &InputState::idle()).unwrap().commands);
    }

    #[test]
    fn paused_outside_a_level_does_not_tick() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(1);
        ticker.set_action(GameAction::Completed);
        ticker.set_paused(PauseMode::BUILD_MODE, true);
        let outcome = ticker.tick(&mut sim, &InputState::idle()).unwrap();
        assert!(!outcome.advanced);
        assert_eq!(ticker.state(), GameState::Intermission);
    }

    #[test]
    fn playback_pause_halts() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(1);
        ticker.set_paused(PauseMode::PLAYBACK, true);
        let outcome = ticker.tick(&mut sim, &InputState::idle()).unwrap();
        assert_eq!(outcome, TickOutcome::default());
        assert_eq!(ticker.gametic(), Tic::ZERO);
    }

    #[test]
    fn pause_button_toggles_and_is_cleared() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(2);
        sim.remote = TickCommand {
            buttons: buttons::BT_SPECIAL | buttons::BT_PAUSE,
            ..TickCommand::EMPTY
        };
        ticker.set_action(GameAction::NewGame);
        ticker.tick(&mut sim, &InputState::idle()).unwrap();
        assert!(ticker.pause().contains(PauseMode::COMMAND));
        assert_eq!(sim.frames[0].3[1].buttons, 0);
        assert!(sim.frames[0].2);
    }

    #[test]
    fn save_button_schedules_a_save() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(2);
        sim.remote = TickCommand {
            buttons: buttons::BT_SPECIAL | buttons::BTS_SAVEGAME | (3 << buttons::BTS_SAVESHIFT),
            ..TickCommand::EMPTY
        };
        ticker.set_action(GameAction::NewGame);
        ticker.tick(&mut sim, &InputState::idle()).unwrap();
        assert_eq!(ticker.pending_action(), GameAction::SaveGame { slot: 3 });
    }

    // ===== Extended commands =====

    #[test]
    fn extended_requests_reach_the_simulation() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(2);
        let mut session = recording_with(CompatibilityLevel::Mbf21, 2, true);
        assert!(session.allows_extended());
        session.builder_mut().queue_extended(ExtendedCommand {
            actions: actions::XC_GOD | actions::XC_LOAD,
            save_slot: 0,
            load_slot: 4,
        });
        ticker.start_recording(session).unwrap();
        ticker.tick(&mut sim, &InputState::idle()).unwrap();
        assert_eq!(sim.requests, vec![(0, ExtendedRequest::God)]);
        assert_eq!(
            ticker.pending_action(),
            GameAction::LoadGame {
                slot: 4,
                forced: true
            }
        );
    }

    #[test]
    fn extended_requests_need_the_extended_format() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(1);
        let mut session = recording(CompatibilityLevel::Mbf21, 1);
        session.builder_mut().queue_extended(ExtendedCommand {
            actions: actions::XC_NOCLIP,
            ..ExtendedCommand::NONE
        });
        ticker.start_recording(session).unwrap();
        ticker.tick(&mut sim, &InputState::idle()).unwrap();
        assert!(sim.requests.is_empty());
    }

    // ===== Key frames =====

    #[test]
    fn key_frame_restore_rewinds_recording_and_state() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(1);
        ticker
            .start_recording(recording(CompatibilityLevel::Mbf21, 1))
            .unwrap();
        ticker.tick(&mut sim, &forward()).unwrap();
        ticker.capture_key_frame(&sim).unwrap();
        let tics = ticker.session().recording().unwrap().stream().tics();
        ticker.tick(&mut sim, &forward()).unwrap();
        ticker.tick(&mut sim, &forward()).unwrap();

        let tic = ticker.restore_key_frame(&mut sim, 0).unwrap();
        assert_eq!(tic, Tic::new(1));
        assert_eq!(ticker.gametic(), Tic::new(1));
        assert_eq!(sim.state, 1);
        assert_eq!(ticker.session().recording().unwrap().stream().tics(), tics);

        ticker.tick(&mut sim, &forward()).unwrap();
        let joined = sim.frames.last().unwrap().3[0];
        assert_ne!(joined.buttons & buttons::BT_JOIN, 0);
    }

    #[test]
    fn missing_key_frame_is_refused() {
        let mut ticker = ticker();
        let mut sim = Recorder::with_players(1);
        assert!(matches!(
            ticker.restore_key_frame(&mut sim, 0),
            Err(DemoError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn console_player_must_exist() {
        let mut ticker = ticker();
        assert!(ticker.set_console_player(3).is_ok());
        assert!(ticker.set_console_player(4).is_err());
    }
}
