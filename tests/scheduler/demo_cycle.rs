//! The title-screen demo cycle and timedemo reporting.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::collections::BTreeMap;

use crate::common::{forward_demo, init_tracing, StubGame};
use tick_demo::scheduler::{CycleEntry, DemoCycle, DemoCycleStep, DemoStatus};
use tick_demo::{
    BuilderSettings, CompatibilityLevel, DemoError, DemoResult, EngineConfig, GameAction,
    GameState, GameTicker, InputState, SessionBuilder, Strictness,
};

struct Wad {
    lumps: BTreeMap<&'static str, Vec<u8>>,
}

impl Wad {
    fn new() -> Self {
        let mut lumps = BTreeMap::new();
        lumps.insert("demo1", forward_demo(CompatibilityLevel::Mbf21, 3));
        lumps.insert("demo2", forward_demo(CompatibilityLevel::Boom202, 2));
        lumps.insert("demo3", vec![255, b'Z', b'D', b'O', b'O', b'M', b'_', 0, 0]);
        Self { lumps }
    }

    fn load(&self, name: &str) -> DemoResult<Vec<u8>> {
        self.lumps
            .get(name)
            .cloned()
            .ok_or_else(|| DemoError::DemoNotFound {
                name: name.to_owned(),
            })
    }
}

fn cycle() -> DemoCycle {
    DemoCycle::new(
        vec![
            CycleEntry::Page("TITLEPIC".to_owned()),
            CycleEntry::Demo("demo1".to_owned()),
            CycleEntry::Demo("demo3".to_owned()),
            CycleEntry::Demo("demo4".to_owned()),
            CycleEntry::Demo("demo2".to_owned()),
        ],
        SessionBuilder::new(),
    )
}

fn ticker() -> GameTicker {
    GameTicker::new(EngineConfig::default(), BuilderSettings::default()).unwrap()
}

/// Ticks until the demo being played has no records left.
fn play_out(ticker: &mut GameTicker, game: &mut StubGame) -> usize {
    let mut ticks = 0;
    while !ticker
        .session()
        .playback()
        .is_some_and(|playback| playback.is_finished())
    {
        ticker.tick(game, &InputState::default()).unwrap();
        ticks += 1;
    }
    ticks
}

#[test]
fn attract_loop_plays_every_usable_demo_and_skips_the_rest() {
    init_tracing();
    let wad = Wad::new();
    let mut cycle = cycle();
    let mut ticker = ticker();
    let mut game = StubGame::new(0);

    // Title page first: nothing to play.
    let (step, session) = cycle.advance(|name| wad.load(name));
    assert_eq!(
        step,
        DemoCycleStep::Page {
            name: "TITLEPIC".to_owned()
        }
    );
    assert!(session.is_none());

    let (step, session) = cycle.advance(|name| wad.load(name));
    assert_eq!(
        step,
        DemoCycleStep::Playing {
            name: "demo1".to_owned()
        }
    );
    ticker.start_playback(session.unwrap()).unwrap();
    assert_eq!(play_out(&mut ticker, &mut game), 3);
    assert_eq!(ticker.state(), GameState::Level);

    // demo3 is foreign: skipped, the title is shown.
    let status = ticker.check_demo_status(Some(&mut cycle), |name| wad.load(name)).unwrap();
    assert!(matches!(
        status,
        DemoStatus::Cycle(DemoCycleStep::Skipped { ref name, .. }) if name == "demo3"
    ));
    assert_eq!(ticker.state(), GameState::DemoScreen);
    assert!(ticker.session().is_idle());

    // demo4 is missing: skipped the same way.
    let (step, session) = cycle.advance(|name| wad.load(name));
    assert!(matches!(step, DemoCycleStep::Skipped { ref name, .. } if name == "demo4"));
    assert!(session.is_none());

    let (step, session) = cycle.advance(|name| wad.load(name));
    assert_eq!(
        step,
        DemoCycleStep::Playing {
            name: "demo2".to_owned()
        }
    );
    ticker.start_playback(session.unwrap()).unwrap();
    assert_eq!(play_out(&mut ticker, &mut game), 2);

    // Back to the start.
    let status = ticker.check_demo_status(Some(&mut cycle), |name| wad.load(name)).unwrap();
    assert_eq!(
        status,
        DemoStatus::Cycle(DemoCycleStep::Page {
            name: "TITLEPIC".to_owned()
        })
    );
    assert_eq!(
        game.actions,
        vec![GameAction::PlayDemo, GameAction::PlayDemo]
    );
}

#[test]
fn ended_demo_hands_over_to_the_next_one() {
    let wad = Wad::new();
    let mut cycle = DemoCycle::new(
        vec![
            CycleEntry::Demo("demo1".to_owned()),
            CycleEntry::Demo("demo2".to_owned()),
        ],
        SessionBuilder::new(),
    );
    let mut ticker = ticker();
    let mut game = StubGame::new(0);

    let (_, session) = cycle.advance(|name| wad.load(name));
    ticker.start_playback(session.unwrap()).unwrap();
    play_out(&mut ticker, &mut game);

    let status = ticker.check_demo_status(Some(&mut cycle), |name| wad.load(name)).unwrap();
    assert_eq!(
        status,
        DemoStatus::Cycle(DemoCycleStep::Playing {
            name: "demo2".to_owned()
        })
    );
    assert!(ticker.session().is_playback());
    assert_eq!(ticker.pending_action(), GameAction::PlayDemo);
    assert_eq!(play_out(&mut ticker, &mut game), 2);
}

#[test]
fn timedemo_reports_its_rate_instead_of_cycling() {
    let playback = SessionBuilder::new()
        .start_playback(
            "timed",
            forward_demo(CompatibilityLevel::Mbf21, 70),
            Strictness::Strict,
        )
        .unwrap()
        .into_result()
        .unwrap();
    let mut ticker = ticker();
    let mut game = StubGame::new(0);
    ticker.start_timedemo(playback).unwrap();
    assert_eq!(play_out(&mut ticker, &mut game), 70);

    let mut cycle = cycle();
    let status = ticker
        .check_demo_status(Some(&mut cycle), |_| panic!("the cycle is not consulted"))
        .unwrap();
    let DemoStatus::TimeDemo(report) = status else {
        panic!("expected a timedemo report, got {:?}", status);
    };
    assert_eq!(report.tics, 70);
    assert!(report.fps >= 0.0);
    assert_eq!(cycle.peek(), Some(&CycleEntry::Page("TITLEPIC".to_owned())));
}

#[test]
fn lenient_template_still_validates_its_config() {
    let wad = Wad::new();
    let broken = SessionBuilder::new().with_engine_config(EngineConfig {
        game: tick_demo::Game::Hexen,
        mission: tick_demo::GameMission::Tnt,
        ..EngineConfig::default()
    });
    let mut cycle = DemoCycle::new(vec![CycleEntry::Demo("demo1".to_owned())], broken);
    let (step, session) = cycle.advance(|name| wad.load(name));
    assert!(matches!(step, DemoCycleStep::Skipped { .. }));
    assert!(session.is_none());
}
