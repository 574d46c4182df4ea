//! Demo sessions: the live recording or playback and everything it owns.
//!
//! At most one session exists at a time. [`DemoSession`] holds it and refuses
//! to start a new one before the old one has been ended, so a recording buffer
//! is always torn down before the next is allocated.

pub mod builder;
pub mod config;

use std::path::Path;

use crate::builder::{
    BuildContext, BuilderSettings, BuiltCommand, InputState, PlayerView, TickCommandBuilder,
};
use crate::codec::{Era, TicFormat, TickCodec};
use crate::compat::CompatibilityLevel;
use crate::demo::header::{DemoHeader, ParsedHeader};
use crate::demo::playback::PlaybackStream;
use crate::demo::stream::DemoByteStream;
use crate::error::{DemoError, DemoResult};
use crate::ticcmd::TickCommand;
use config::{DemoOverrides, EngineConfig};

/// Level clock values the builder reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickTiming {
    /// Tics into the current level.
    pub level_time: i32,
    /// Tics spent in previous levels.
    pub total_level_times: i32,
    /// Skip mode is fast-forwarding.
    pub skip_mode: bool,
}

/// A demo being recorded.
#[derive(Debug)]
pub struct RecordingSession {
    config: EngineConfig,
    overrides: DemoOverrides,
    header: DemoHeader,
    stream: DemoByteStream,
    builder: TickCommandBuilder,
}

impl RecordingSession {
    /// The codec a recording with `header` writes its ticks with.
    #[must_use]
    pub fn codec_for(header: &DemoHeader, config: &EngineConfig) -> TickCodec {
        TickCodec::new(
            Era::for_level(header.level, config.game),
            TicFormat {
                longtics: header.longtics,
                raven: config.game.is_raven(),
                extended: header.extended.is_some(),
            },
        )
    }

    /// Allocates the buffer and writes `header`.
    pub(crate) fn start(
        config: EngineConfig,
        overrides: DemoOverrides,
        header: DemoHeader,
        builder: TickCommandBuilder,
    ) -> DemoResult<Self> {
        let mut stream = DemoByteStream::new(Self::codec_for(&header, &config))?;
        stream.write_header(&header, config.game)?;
        Ok(Self {
            config,
            overrides,
            header,
            stream,
            builder,
        })
    }

    /// The header the recording started with.
    #[must_use]
    pub const fn header(&self) -> &DemoHeader {
        &self.header
    }

    /// The compatibility level, fixed for the recording's lifetime.
    #[must_use]
    pub const fn level(&self) -> CompatibilityLevel {
        self.header.level
    }

    /// The running engine.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The overrides the recording started with.
    #[must_use]
    pub const fn overrides(&self) -> &DemoOverrides {
        &self.overrides
    }

    /// The recording buffer.
    #[must_use]
    pub const fn stream(&self) -> &DemoByteStream {
        &self.stream
    }

    /// The recording buffer, for rewinding.
    pub fn stream_mut(&mut self) -> &mut DemoByteStream {
        &mut self.stream
    }

    /// The console player's command builder.
    #[must_use]
    pub const fn builder(&self) -> &TickCommandBuilder {
        &self.builder
    }

    /// The console player's command builder.
    pub fn builder_mut(&mut self) -> &mut TickCommandBuilder {
        &mut self.builder
    }

    /// Extended commands are written with every tick.
    #[must_use]
    pub fn allows_extended(&self) -> bool {
        self.stream.codec().format().extended
    }

    /// Builds the console player's command for this tick.
    ///
    /// # Errors
    ///
    /// Propagates stream errors while build mode steps through recorded data.
    pub fn build_tick(
        &mut self,
        input: &InputState,
        view: &PlayerView,
        timing: TickTiming,
    ) -> DemoResult<BuiltCommand> {
        let ctx = BuildContext {
            demo_compatibility: self.header.level.demo_compatibility(),
            recording: true,
            playback: false,
            longtics: self.header.longtics,
            shorttics: self.overrides.shorttics,
            level_time: timing.level_time,
            total_level_times: timing.total_level_times,
            skip_mode: timing.skip_mode,
            allow_extended: self.stream.codec().format().extended,
            stream: Some(&self.stream),
        };
        self.builder.build(input, view, &ctx)
    }

    /// Appends one player's command for this tick and returns it as stored.
    ///
    /// # Errors
    ///
    /// [`DemoError::AllocationFailed`] if the buffer cannot grow.
    pub fn record(&mut self, cmd: &TickCommand) -> DemoResult<TickCommand> {
        self.stream.record(cmd)
    }

    /// The demo as it would be written now; recording can continue.
    #[must_use]
    pub fn export(&self) -> Vec<u8> {
        self.stream.export()
    }

    /// Writes the demo as it is now to `path`; recording can continue.
    ///
    /// # Errors
    ///
    /// [`DemoError::Io`] if the file cannot be written.
    pub fn export_to_file(&self, path: &Path) -> DemoResult<usize> {
        self.stream.export_to_file(path)
    }

    /// Ends the recording, returning the finished demo.
    #[must_use]
    pub fn finalize(self) -> Vec<u8> {
        self.stream.finalize()
    }

    /// Ends the recording and writes it to `path`.
    ///
    /// # Errors
    ///
    /// [`DemoError::Io`] if the file cannot be written. The buffer is gone
    /// either way.
    pub fn finish(self, path: &Path) -> DemoResult<usize> {
        let tics = self.stream.tics();
        let data = self.stream.finalize();
        std::fs::write(path, &data)
            .map_err(|err| DemoError::io(path.display().to_string(), &err))?;
        tracing::info!(path = %path.display(), tics, size = data.len(), "demo finished recording");
        Ok(data.len())
    }
}

/// A demo being played back.
#[derive(Debug)]
pub struct PlaybackSession {
    config: EngineConfig,
    overrides: DemoOverrides,
    name: String,
    stream: PlaybackStream,
}

impl PlaybackSession {
    pub(crate) fn new(
        config: EngineConfig,
        overrides: DemoOverrides,
        name: String,
        stream: PlaybackStream,
    ) -> Self {
        Self {
            config,
            overrides,
            name,
            stream,
        }
    }

    /// Name the demo was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parsed header.
    #[must_use]
    pub const fn parsed(&self) -> &ParsedHeader {
        self.stream.parsed()
    }

    /// The header fields.
    #[must_use]
    pub const fn header(&self) -> &DemoHeader {
        &self.stream.parsed().header
    }

    /// The player whose view is shown.
    #[must_use]
    pub const fn console_player(&self) -> usize {
        self.stream.parsed().console_player
    }

    /// The record reader.
    #[must_use]
    pub const fn stream(&self) -> &PlaybackStream {
        &self.stream
    }

    /// Reads the next record; `None` once the demo has ended.
    ///
    /// # Errors
    ///
    /// [`DemoError::TruncatedTick`] if a record is cut short.
    pub fn read_tick(&mut self) -> DemoResult<Option<TickCommand>> {
        self.stream.read_tick()
    }

    /// Returns `true` once every record has been read.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.stream.is_finished()
    }

    /// Takes over the demo: a recording continuing from the current tick.
    /// The next command built is marked with the join bit.
    ///
    /// # Errors
    ///
    /// Invalid `settings` or a failed buffer allocation.
    pub fn into_recording(self, settings: BuilderSettings) -> DemoResult<RecordingSession> {
        let header = self.stream.parsed().header.clone();
        let class = header
            .players
            .get(self.stream.parsed().console_player)
            .map_or(0, |slot| slot.class);
        let mut builder = TickCommandBuilder::for_class(self.config, settings, class)?;
        builder.arm_join();
        let stream = self.stream.into_recording()?;
        Ok(RecordingSession {
            config: self.config,
            overrides: self.overrides,
            header,
            stream,
            builder,
        })
    }
}

/// The single live demo session.
#[derive(Debug, Default)]
pub enum DemoSession {
    /// No demo.
    #[default]
    Idle,
    /// Recording.
    Recording(RecordingSession),
    /// Playing back.
    Playback(PlaybackSession),
}

impl DemoSession {
    /// Returns `true` while recording.
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        matches!(self, Self::Recording(_))
    }

    /// Returns `true` while playing back.
    #[must_use]
    pub const fn is_playback(&self) -> bool {
        matches!(self, Self::Playback(_))
    }

    /// Returns `true` without a session.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// The recording, if any.
    #[must_use]
    pub const fn recording(&self) -> Option<&RecordingSession> {
        match self {
            Self::Recording(recording) => Some(recording),
            _ => None,
        }
    }

    /// The recording, if any.
    pub fn recording_mut(&mut self) -> Option<&mut RecordingSession> {
        match self {
            Self::Recording(recording) => Some(recording),
            _ => None,
        }
    }

    /// The playback, if any.
    #[must_use]
    pub const fn playback(&self) -> Option<&PlaybackSession> {
        match self {
            Self::Playback(playback) => Some(playback),
            _ => None,
        }
    }

    /// The playback, if any.
    pub fn playback_mut(&mut self) -> Option<&mut PlaybackSession> {
        match self {
            Self::Playback(playback) => Some(playback),
            _ => None,
        }
    }

    /// Installs `next`.
    ///
    /// # Errors
    ///
    /// [`DemoError::InvalidRequest`] if a session is still live; call
    /// [`end`](Self::end) first.
    pub fn begin(&mut self, next: DemoSession) -> DemoResult<()> {
        if !self.is_idle() {
            return Err(DemoError::InvalidRequest {
                info: "a demo session is already live".to_owned(),
            });
        }
        *self = next;
        Ok(())
    }

    /// Ends the live session and hands it back.
    pub fn end(&mut self) -> DemoSession {
        std::mem::take(self)
    }

    /// Turns a playback into a recording continuing from the current tick.
    ///
    /// # Errors
    ///
    /// [`DemoError::InvalidRequest`] unless a playback is live; otherwise see
    /// [`PlaybackSession::into_recording`]. On error the session is idle.
    pub fn join(&mut self, settings: BuilderSettings) -> DemoResult<()> {
        match self.end() {
            Self::Playback(playback) => {
                *self = Self::Recording(playback.into_recording(settings)?);
                Ok(())
            }
            other => {
                *self = other;
                Err(DemoError::InvalidRequest {
                    info: "only a demo being played back can be joined".to_owned(),
                })
            }
        }
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
    use crate::demo::header::Strictness;
    use crate::ticcmd::buttons::BT_JOIN;
    use crate::SessionBuilder;

    fn recording() -> RecordingSession {
        SessionBuilder::new()
            .with_overrides(DemoOverrides {
                complevel: Some(CompatibilityLevel::PrBoom6),
                ..DemoOverrides::default()
            })
            .start_recording()
            .unwrap()
    }

    fn forward(n: i8) -> TickCommand {
        TickCommand {
            forward: n,
            ..TickCommand::EMPTY
        }
    }

    #[test]
    fn recording_writes_header_first() {
        let session = recording();
        assert!(session.stream().cursor() > 0);
        assert_eq!(session.stream().tics(), 0);
        assert_eq!(session.level(), CompatibilityLevel::PrBoom6);
        assert!(!session.allows_extended());
    }

    #[test]
    fn built_ticks_are_recorded() {
        let mut session = recording();
        let input = InputState {
            forward: true,
            ..InputState::default()
        };
        let built = session
            .build_tick(&input, &PlayerView::default(), TickTiming::default())
            .unwrap();
        session.record(&built.cmd).unwrap();
        assert_eq!(session.stream().tics(), 1);
        assert_eq!(session.stream().copy_pending().unwrap(), TickCommand::EMPTY);
    }

    #[test]
    fn only_one_session_at_a_time() {
        let mut live = DemoSession::default();
        live.begin(DemoSession::Recording(recording())).unwrap();
        assert!(live.is_recording());
        assert!(live.begin(DemoSession::Recording(recording())).is_err());
        let ended = live.end();
        assert!(ended.is_recording());
        assert!(live.is_idle());
    }

    #[test]
    fn joining_playback_arms_the_join_bit() {
        let mut session = recording();
        for n in 1..=3 {
            session.record(&forward(n)).unwrap();
        }
        let data = session.export();
        let playback = SessionBuilder::new()
            .start_playback("joined", data, Strictness::Strict)
            .unwrap()
            .into_result()
            .unwrap();
        let mut live = DemoSession::Playback(playback);
        assert_eq!(
            live.playback_mut().unwrap().read_tick().unwrap(),
            Some(forward(1))
        );
        live.join(BuilderSettings::default()).unwrap();

        let recording = live.recording_mut().unwrap();
        assert_eq!(recording.stream().tics(), 1);
        let built = recording
            .build_tick(
                &InputState::default(),
                &PlayerView::default(),
                TickTiming {
                    level_time: 1,
                    ..TickTiming::default()
                },
            )
            .unwrap();
        assert_eq!(built.cmd.buttons & BT_JOIN, BT_JOIN);
    }

    #[test]
    fn joining_without_playback_is_refused() {
        let mut live = DemoSession::Recording(recording());
        assert!(live.join(BuilderSettings::default()).is_err());
        assert!(live.is_recording());
    }
}
