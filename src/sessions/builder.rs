//! Assembling recording and playback sessions from engine config, demo
//! overrides and raw demo bytes.

use std::path::Path;
use std::sync::Arc;

use crate::builder::{BuilderSettings, TickCommandBuilder};
use crate::demo::header::{DemoHeader, HeaderContext, ParseOutcome, PlayerSlot, Strictness};
use crate::demo::options::GameOptions;
use crate::demo::playback::PlaybackStream;
use crate::error::{DemoError, DemoResult};
use crate::sessions::config::{DemoOverrides, EngineConfig};
use crate::sessions::{PlaybackSession, RecordingSession};
use crate::telemetry::ViolationObserver;

/// Default skill: "Hurt me plenty", 0-based.
const DEFAULT_SKILL: u8 = 2;
const DEFAULT_EPISODE: u8 = 1;
const DEFAULT_MAP: u8 = 1;
/// Default number of players in a new recording.
const DEFAULT_PLAYERS: usize = 1;
/// Default header strictness for playback.
///
/// A demo picked by the user should fail loudly; demo cycles and batch tools
/// ask for [`Strictness::Lenient`] explicitly.
const DEFAULT_STRICTNESS: Strictness = Strictness::Strict;
/// Skill levels the game knows (0-based, so the largest is one less).
const SKILL_COUNT: u8 = 5;

/// The [`SessionBuilder`] builds recording and playback sessions.
///
/// After setting all appropriate values, use `SessionBuilder::start_*(...)`
/// to consume the builder and create a session.
///
/// # Example
///
/// ```
/// use tick_demo::{CompatibilityLevel, DemoOverrides, SessionBuilder};
///
/// let session = SessionBuilder::new()
///     .with_overrides(DemoOverrides {
///         complevel: Some(CompatibilityLevel::Mbf21),
///         ..DemoOverrides::default()
///     })
///     .with_map(1, 7)?
///     .start_recording()?;
/// assert_eq!(session.header().map, 7);
/// # Ok::<(), tick_demo::DemoError>(())
/// ```
#[derive(Clone)]
#[must_use = "SessionBuilder must be consumed by calling a start_* method"]
pub struct SessionBuilder {
    config: EngineConfig,
    overrides: DemoOverrides,
    settings: BuilderSettings,
    skill: u8,
    episode: u8,
    map: u8,
    num_players: usize,
    player_class: u8,
    game_options: Option<GameOptions>,
    strictness: Strictness,
    /// Optional observer for violations found while parsing or building.
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure so a new field cannot be forgotten here.
        let Self {
            config,
            overrides,
            settings,
            skill,
            episode,
            map,
            num_players,
            player_class,
            game_options,
            strictness,
            violation_observer,
        } = self;

        f.debug_struct("SessionBuilder")
            .field("config", config)
            .field("overrides", overrides)
            .field("settings", settings)
            .field("skill", skill)
            .field("episode", episode)
            .field("map", map)
            .field("num_players", num_players)
            .field("player_class", player_class)
            .field("game_options", game_options)
            .field("strictness", strictness)
            .field("has_violation_observer", &violation_observer.is_some())
            .finish()
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Construct a new builder with all values set to their defaults.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            overrides: DemoOverrides::default(),
            settings: BuilderSettings::default(),
            skill: DEFAULT_SKILL,
            episode: DEFAULT_EPISODE,
            map: DEFAULT_MAP,
            num_players: DEFAULT_PLAYERS,
            player_class: 0,
            game_options: None,
            strictness: DEFAULT_STRICTNESS,
            violation_observer: None,
        }
    }

    /// Sets the running engine.
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the command-line style overrides.
    pub fn with_overrides(mut self, overrides: DemoOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Sets the console player's input settings.
    pub fn with_builder_settings(mut self, settings: BuilderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the skill (0-based). Default is 2.
    ///
    /// # Errors
    ///
    /// Returns [`DemoError::InvalidRequest`] if `skill` is not 0..=4.
    pub fn with_skill(mut self, skill: u8) -> DemoResult<Self> {
        if skill >= SKILL_COUNT {
            return Err(DemoError::InvalidRequest {
                info: format!("skill {} out of range 0..{}", skill, SKILL_COUNT),
            });
        }
        self.skill = skill;
        Ok(self)
    }

    /// Sets the starting episode and map. Default is episode 1 map 1.
    ///
    /// # Errors
    ///
    /// Returns [`DemoError::InvalidRequest`] if `map` is 0.
    pub fn with_map(mut self, episode: u8, map: u8) -> DemoResult<Self> {
        if map == 0 {
            return Err(DemoError::InvalidRequest {
                info: "maps are numbered from 1".to_owned(),
            });
        }
        self.episode = episode;
        self.map = map;
        Ok(self)
    }

    /// Sets the number of players recorded. Default is 1.
    ///
    /// # Errors
    ///
    /// Returns [`DemoError::InvalidRequest`] if `num_players` is 0.
    /// The upper bound depends on the game and is checked when the session starts.
    pub fn with_num_players(mut self, num_players: usize) -> DemoResult<Self> {
        if num_players == 0 {
            return Err(DemoError::InvalidRequest {
                info: "a demo needs at least one player".to_owned(),
            });
        }
        self.num_players = num_players;
        Ok(self)
    }

    /// Sets the Hexen player class of every recorded player.
    pub fn with_player_class(mut self, class: u8) -> Self {
        self.player_class = class;
        self
    }

    /// Replaces the default game options of a new recording.
    pub fn with_game_options(mut self, options: GameOptions) -> Self {
        self.game_options = Some(options);
        self
    }

    /// Sets how playback treats headers it does not recognize.
    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// Sets a custom observer for violations.
    ///
    /// Without one, violations are logged via `tracing`.
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    fn validate(&self) -> DemoResult<()> {
        self.config.validate()?;
        self.overrides.validate(&self.config)?;
        self.settings.validate()?;
        if self.num_players > self.config.max_players() {
            return Err(DemoError::InvalidRequest {
                info: format!(
                    "{} players requested, {:?} supports {}",
                    self.num_players,
                    self.config.game,
                    self.config.max_players()
                ),
            });
        }
        Ok(())
    }

    fn header_context(&self) -> HeaderContext {
        HeaderContext {
            config: self.config,
            overrides: self.overrides,
            observer: self.violation_observer.clone(),
        }
    }

    /// Consumes the builder to start a recording.
    ///
    /// # Errors
    ///
    /// - [`DemoError::MissingCompatibilityLevel`] without `overrides.complevel`.
    /// - [`DemoError::ExperimentalFormat`] for the experimental map format
    ///   without `bad_demo` and mbf21.
    /// - [`DemoError::UnsupportedRecordingLevel`] for levels no writer exists for.
    /// - [`DemoError::InvalidRequest`] for invalid settings.
    pub fn start_recording(self) -> DemoResult<RecordingSession> {
        let level = self
            .overrides
            .complevel
            .ok_or(DemoError::MissingCompatibilityLevel)?;
        self.validate()?;

        let mut header = DemoHeader::for_recording(level, self.config.game, &self.overrides);
        header.skill = self.skill;
        header.episode = self.episode;
        header.map = self.map;
        for (index, slot) in header.players.iter_mut().enumerate() {
            *slot = PlayerSlot {
                in_game: index < self.num_players,
                class: self.player_class,
            };
        }
        if let Some(mut options) = self.game_options {
            options.respawn |= self.overrides.respawn;
            options.fast |= self.overrides.fast;
            options.nomonsters |= self.overrides.nomonsters;
            header.options = options;
        }

        let mut builder =
            TickCommandBuilder::for_class(self.config, self.settings, self.player_class)?;
        builder.set_first_input(self.overrides.first_input);
        builder.set_observer(self.violation_observer);
        RecordingSession::start(self.config, self.overrides, header, builder)
    }

    /// Consumes the builder to play back `data`, opened under `name`.
    ///
    /// `strictness` overrides the builder's strictness for this demo.
    ///
    /// # Errors
    ///
    /// Header and tick-region errors; see
    /// [`parse_header`](crate::demo::header::parse_header). Lenient parsing
    /// reports unrecognized data as [`ParseOutcome::NotRecognized`].
    pub fn start_playback(
        self,
        name: impl Into<String>,
        data: Vec<u8>,
        strictness: Strictness,
    ) -> DemoResult<ParseOutcome<PlaybackSession>> {
        self.validate()?;
        let ctx = self.header_context();
        let outcome = PlaybackStream::open(data, &ctx, strictness)?;
        let name = name.into();
        Ok(outcome.map(|stream| PlaybackSession::new(self.config, self.overrides, name, stream)))
    }

    /// Consumes the builder to play back the file at `path` with the builder's strictness.
    ///
    /// # Errors
    ///
    /// [`DemoError::DemoNotFound`] if the file does not exist,
    /// [`DemoError::Io`] if it cannot be read; otherwise see
    /// [`start_playback`](Self::start_playback).
    pub fn start_playback_file(self, path: &Path) -> DemoResult<ParseOutcome<PlaybackSession>> {
        let name = path.display().to_string();
        let data = std::fs::read(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                DemoError::DemoNotFound { name: name.clone() }
            } else {
                DemoError::io(name.clone(), &err)
            }
        })?;
        let strictness = self.strictness;
        self.start_playback(name, data, strictness)
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
    use crate::sessions::config::{FirstInput, Game};
    use crate::telemetry::CollectingObserver;

    fn with_level(level: CompatibilityLevel) -> SessionBuilder {
        SessionBuilder::new().with_overrides(DemoOverrides {
            complevel: Some(level),
            ..DemoOverrides::default()
        })
    }

    // ===== Recording =====

    #[test]
    fn recording_needs_a_compatibility_level() {
        let err = SessionBuilder::new().start_recording().unwrap_err();
        assert_eq!(err, DemoError::MissingCompatibilityLevel);
        assert!(err.is_fatal());
    }

    #[test]
    fn recording_checks_the_map_format_gate() {
        let builder = SessionBuilder::new().with_overrides(DemoOverrides {
            complevel: Some(CompatibilityLevel::Mbf21),
            zdoom_map_format: true,
            ..DemoOverrides::default()
        });
        assert!(matches!(
            builder.start_recording(),
            Err(DemoError::ExperimentalFormat { .. })
        ));
    }

    #[test]
    fn recording_header_follows_the_builder() {
        let session = with_level(CompatibilityLevel::Mbf)
            .with_skill(3)
            .unwrap()
            .with_map(2, 4)
            .unwrap()
            .with_num_players(2)
            .unwrap()
            .start_recording()
            .unwrap();
        let header = session.header();
        assert_eq!(header.skill, 3);
        assert_eq!((header.episode, header.map), (2, 4));
        assert_eq!(header.player_count(), 2);
        assert_eq!(header.version, 203);
    }

    #[test]
    fn too_many_players_is_refused() {
        let result = with_level(CompatibilityLevel::Mbf21)
            .with_num_players(5)
            .unwrap()
            .start_recording();
        assert!(matches!(result, Err(DemoError::InvalidRequest { .. })));
        let hexen = with_level(CompatibilityLevel::Doom2_19)
            .with_engine_config(EngineConfig {
                game: Game::Hexen,
                ..EngineConfig::default()
            })
            .with_num_players(5)
            .unwrap()
            .start_recording();
        assert!(hexen.is_ok());
    }

    #[test]
    fn first_input_reaches_the_builder() {
        let mut session = SessionBuilder::new()
            .with_overrides(DemoOverrides {
                complevel: Some(CompatibilityLevel::Mbf21),
                first_input: Some(FirstInput {
                    forward: 25,
                    side: 0,
                    angle: 0,
                }),
                ..DemoOverrides::default()
            })
            .start_recording()
            .unwrap();
        let built = session
            .build_tick(
                &crate::builder::InputState::default(),
                &crate::builder::PlayerView::default(),
                crate::sessions::TickTiming::default(),
            )
            .unwrap();
        assert_eq!(built.cmd.forward, 25);
    }

    #[test]
    fn invalid_arguments() {
        assert!(SessionBuilder::new().with_skill(5).is_err());
        assert!(SessionBuilder::new().with_map(1, 0).is_err());
        assert!(SessionBuilder::new().with_num_players(0).is_err());
    }

    // ===== Playback =====

    #[test]
    fn lenient_playback_of_garbage_is_not_recognized() {
        let observer = Arc::new(CollectingObserver::new());
        let outcome = SessionBuilder::new()
            .with_violation_observer(observer)
            .start_playback(
                "garbage",
                vec![255, b'X', b'Y', b'Z', b'Z', b'Y', b'X', 0, 0],
                Strictness::Lenient,
            )
            .unwrap();
        assert!(!outcome.is_parsed());
    }

    #[test]
    fn missing_file_is_demo_not_found() {
        let result = SessionBuilder::new()
            .start_playback_file(Path::new("definitely/not/here.lmp"));
        assert!(matches!(result, Err(DemoError::DemoNotFound { .. })));
    }

    #[test]
    fn debug_hides_the_observer() {
        let builder = SessionBuilder::new().with_violation_observer(Arc::new(CollectingObserver::new()));
        let debug = format!("{:?}", builder);
        assert!(debug.contains("has_violation_observer: true"));
    }
}
