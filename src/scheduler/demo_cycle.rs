//! What happens when a demo ends: finishing a recording, reporting a
//! timedemo, or moving the title-screen cycle on to its next entry.

use web_time::{Duration, Instant};

use super::{GameAction, GameState, GameTicker};
use crate::demo::header::{ParseOutcome, Strictness};
use crate::error::DemoResult;
use crate::sessions::builder::SessionBuilder;
use crate::sessions::{DemoSession, PlaybackSession};
use crate::Tic;

/// One entry of the title-screen cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEntry {
    /// A page shown for a while.
    Page(String),
    /// A demo played back.
    Demo(String),
}

/// What advancing the cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemoCycleStep {
    /// The demo is now being played.
    Playing {
        /// Its name.
        name: String,
    },
    /// A page is shown.
    Page {
        /// Its name.
        name: String,
    },
    /// The demo could not be used; the title screen is shown instead.
    Skipped {
        /// Its name.
        name: String,
        /// Why it was unusable.
        reason: String,
    },
    /// The cycle is empty; the title screen is shown.
    Title,
}

/// The title-screen cycle of pages and attract demos.
///
/// Demos are opened leniently with a copy of the template builder; anything
/// that goes wrong while loading turns into [`DemoCycleStep::Skipped`].
#[derive(Debug, Clone)]
pub struct DemoCycle {
    entries: Vec<CycleEntry>,
    next: usize,
    template: SessionBuilder,
}

impl DemoCycle {
    /// Creates a cycle over `entries`, opening demos with `template`.
    pub fn new(entries: Vec<CycleEntry>, template: SessionBuilder) -> Self {
        Self {
            entries,
            next: 0,
            template,
        }
    }

    /// The entry the next advance uses.
    #[must_use]
    pub fn peek(&self) -> Option<&CycleEntry> {
        self.entries.get(self.next)
    }

    /// Moves to the next entry, loading demo data through `load`.
    ///
    /// Returns the step and, for a playable demo, its session.
    pub fn advance(
        &mut self,
        mut load: impl FnMut(&str) -> DemoResult<Vec<u8>>,
    ) -> (DemoCycleStep, Option<PlaybackSession>) {
        let Some(entry) = self.entries.get(self.next).cloned() else {
            return (DemoCycleStep::Title, None);
        };
        self.next = (self.next + 1) % self.entries.len();

        let name = match entry {
            CycleEntry::Page(name) => return (DemoCycleStep::Page { name }, None),
            CycleEntry::Demo(name) => name,
        };
        let opened = load(&name).and_then(|data| {
            self.template
                .clone()
                .start_playback(name.clone(), data, Strictness::Lenient)
        });
        match opened {
            Ok(ParseOutcome::Parsed(session)) => (DemoCycleStep::Playing { name }, Some(session)),
            Ok(ParseOutcome::NotRecognized(reason)) => skipped(name, reason),
            Err(err) => skipped(name, err.to_string()),
        }
    }
}

fn skipped(name: String, reason: String) -> (DemoCycleStep, Option<PlaybackSession>) {
    tracing::info!(name = %name, reason = %reason, "demo cycle skipping unusable demo");
    (DemoCycleStep::Skipped { name, reason }, None)
}

/// Wall-clock timing of a demo played as fast as possible.
#[derive(Debug, Clone, Copy)]
pub struct TimeDemo {
    started: Instant,
    start_tic: Tic,
}

/// The result of a timedemo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeDemoReport {
    /// Game tics run.
    pub tics: i32,
    /// Wall-clock time taken.
    pub elapsed: Duration,
    /// Tics per second of wall-clock time.
    pub fps: f64,
}

impl TimeDemo {
    /// Starts timing at `tic`.
    #[must_use]
    pub fn start(tic: Tic) -> Self {
        Self {
            started: Instant::now(),
            start_tic: tic,
        }
    }

    /// The report if the demo ended at `tic`, `now`.
    #[must_use]
    pub fn report_at(&self, tic: Tic, now: Instant) -> TimeDemoReport {
        let tics = tic.as_i32().saturating_sub(self.start_tic.as_i32()).max(0);
        let elapsed = now.saturating_duration_since(self.started);
        let seconds = elapsed.as_secs_f64();
        let fps = if seconds > 0.0 {
            f64::from(tics) / seconds
        } else {
            0.0
        };
        TimeDemoReport { tics, elapsed, fps }
    }

    /// The report if the demo ended at `tic`, now.
    #[must_use]
    pub fn finish(&self, tic: Tic) -> TimeDemoReport {
        self.report_at(tic, Instant::now())
    }
}

/// What [`GameTicker::check_demo_status`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum DemoStatus {
    /// No demo was live.
    Idle,
    /// The recording ended; the finished demo is handed back for writing.
    RecordingFinished {
        /// Recorded commands.
        tics: u32,
        /// The demo file.
        data: Vec<u8>,
    },
    /// A timedemo ended.
    TimeDemo(TimeDemoReport),
    /// A playback ended and the cycle moved on.
    Cycle(DemoCycleStep),
    /// A playback ended with no cycle to continue.
    PlaybackEnded,
}

impl GameTicker {
    /// Ends the live demo.
    ///
    /// A recording is finished and returned. A timedemo reports its frame
    /// rate. Any other playback moves `cycle` on: the next demo is scheduled
    /// to play, or the title screen is shown for pages and unusable demos.
    ///
    /// # Errors
    ///
    /// Only a failure to install the next demo, which cannot happen after the
    /// old session has been ended.
    pub fn check_demo_status(
        &mut self,
        cycle: Option<&mut DemoCycle>,
        load: impl FnMut(&str) -> DemoResult<Vec<u8>>,
    ) -> DemoResult<DemoStatus> {
        match self.session.end() {
            DemoSession::Idle => Ok(DemoStatus::Idle),
            DemoSession::Recording(recording) => {
                let tics = recording.stream().tics();
                let data = recording.finalize();
                Ok(DemoStatus::RecordingFinished { tics, data })
            }
            DemoSession::Playback(playback) => {
                tracing::info!(name = playback.name(), tic = self.gametic.as_i32(), "demo playback ended");
                drop(playback);
                if let Some(timedemo) = self.timedemo.take() {
                    let report = timedemo.finish(self.gametic);
                    tracing::info!(
                        tics = report.tics,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        fps = report.fps,
                        "timedemo finished"
                    );
                    return Ok(DemoStatus::TimeDemo(report));
                }
                let Some(cycle) = cycle else {
                    return Ok(DemoStatus::PlaybackEnded);
                };
                let (step, session) = cycle.advance(load);
                match session {
                    Some(session) => self.start_playback(session)?,
                    None => {
                        self.state = GameState::DemoScreen;
                        self.action = GameAction::Nothing;
                    }
                }
                Ok(DemoStatus::Cycle(step))
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
    use crate::builder::BuilderSettings;
    use crate::compat::CompatibilityLevel;
    use crate::error::DemoError;
    use crate::sessions::config::{DemoOverrides, EngineConfig};
    use crate::ticcmd::TickCommand;

    fn recorded_demo() -> Vec<u8> {
        let mut session = SessionBuilder::new()
            .with_overrides(DemoOverrides {
                complevel: Some(CompatibilityLevel::Mbf),
                ..DemoOverrides::default()
            })
            .start_recording()
            .unwrap();
        session.record(&TickCommand::EMPTY).unwrap();
        session.finalize()
    }

    fn loader(name: &str) -> DemoResult<Vec<u8>> {
        match name {
            "demo1" => Ok(recorded_demo()),
            "garbage" => Ok(vec![0xff, 0x00, 0x01]),
            _ => Err(DemoError::DemoNotFound {
                name: name.to_owned(),
            }),
        }
    }

    fn ticker_playing() -> GameTicker {
        let mut ticker = GameTicker::new(EngineConfig::default(), BuilderSettings::default()).unwrap();
        let playback = SessionBuilder::new()
            .start_playback("demo1", recorded_demo(), Strictness::Strict)
            .unwrap()
            .parsed()
            .unwrap();
        ticker.start_playback(playback).unwrap();
        ticker
    }

    #[test]
    fn cycle_wraps_around() {
        let mut cycle = DemoCycle::new(
            vec![
                CycleEntry::Page("TITLEPIC".to_owned()),
                CycleEntry::Demo("demo1".to_owned()),
            ],
            SessionBuilder::new(),
        );
        let (step, session) = cycle.advance(loader);
        assert_eq!(step, DemoCycleStep::Page { name: "TITLEPIC".to_owned() });
        assert!(session.is_none());
        let (step, session) = cycle.advance(loader);
        assert_eq!(step, DemoCycleStep::Playing { name: "demo1".to_owned() });
        assert!(session.is_some());
        assert_eq!(cycle.peek(), Some(&CycleEntry::Page("TITLEPIC".to_owned())));
    }

    #[test]
    fn empty_cycle_shows_the_title() {
        let mut cycle = DemoCycle::new(Vec::new(), SessionBuilder::new());
        assert_eq!(cycle.advance(loader).0, DemoCycleStep::Title);
    }

    #[test]
    fn missing_and_unusable_demos_are_skipped() {
        let mut cycle = DemoCycle::new(
            vec![
                CycleEntry::Demo("demo9".to_owned()),
                CycleEntry::Demo("garbage".to_owned()),
            ],
            SessionBuilder::new(),
        );
        assert!(matches!(cycle.advance(loader).0, DemoCycleStep::Skipped { ref name, .. } if name == "demo9"));
        assert!(matches!(cycle.advance(loader).0, DemoCycleStep::Skipped { ref name, .. } if name == "garbage"));
    }

    #[test]
    fn ended_playback_advances_the_cycle() {
        let mut ticker = ticker_playing();
        let mut cycle = DemoCycle::new(
            vec![
                CycleEntry::Demo("demo9".to_owned()),
                CycleEntry::Demo("demo1".to_owned()),
            ],
            SessionBuilder::new(),
        );
        let status = ticker.check_demo_status(Some(&mut cycle), loader).unwrap();
        assert!(matches!(status, DemoStatus::Cycle(DemoCycleStep::Skipped { .. })));
        assert_eq!(ticker.state(), GameState::DemoScreen);
        assert!(ticker.session().is_idle());

        ticker.session_mut().begin(ticker_playing().session_mut().end()).unwrap();
        let status = ticker.check_demo_status(Some(&mut cycle), loader).unwrap();
        assert_eq!(
            status,
            DemoStatus::Cycle(DemoCycleStep::Playing { name: "demo1".to_owned() })
        );
        assert!(ticker.session().is_playback());
        assert_eq!(ticker.pending_action(), GameAction::PlayDemo);
    }

    #[test]
    fn playback_without_cycle_just_ends() {
        let mut ticker = ticker_playing();
        let status = ticker.check_demo_status(None, loader).unwrap();
        assert_eq!(status, DemoStatus::PlaybackEnded);
        assert_eq!(ticker.check_demo_status(None, loader).unwrap(), DemoStatus::Idle);
    }

    #[test]
    fn recording_is_handed_back() {
        let mut ticker = GameTicker::new(EngineConfig::default(), BuilderSettings::default()).unwrap();
        let mut session = SessionBuilder::new()
            .with_overrides(DemoOverrides {
                complevel: Some(CompatibilityLevel::Mbf),
                ..DemoOverrides::default()
            })
            .start_recording()
            .unwrap();
        session.record(&TickCommand::EMPTY).unwrap();
        ticker.start_recording(session).unwrap();
        match ticker.check_demo_status(None, loader).unwrap() {
            DemoStatus::RecordingFinished { tics, data } => {
                assert_eq!(tics, 1);
                assert_eq!(data.last(), Some(&crate::DEMOMARKER));
            }
            other => panic!("expected a finished recording, got {:?}", other),
        }
    }

    #[test]
    fn timedemo_reports_rate() {
        let timedemo = TimeDemo::start(Tic::new(10));
        let report = timedemo.report_at(Tic::new(80), timedemo.started + Duration::from_secs(2));
        assert_eq!(report.tics, 70);
        assert!((report.fps - 35.0).abs() < f64::EPSILON);

        let mut ticker = GameTicker::new(EngineConfig::default(), BuilderSettings::default()).unwrap();
        let playback = SessionBuilder::new()
            .start_playback("demo1", recorded_demo(), Strictness::Strict)
            .unwrap()
            .parsed()
            .unwrap();
        ticker.start_timedemo(playback).unwrap();
        assert!(matches!(
            ticker.check_demo_status(None, loader).unwrap(),
            DemoStatus::TimeDemo(_)
        ));
    }
}
