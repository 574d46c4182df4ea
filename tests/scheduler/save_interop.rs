//! Save games written and loaded through game actions while recording.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use crate::common::{overrides_for, recording, StubGame, STUB_SIGNATURE};
use tick_demo::savegame::{LoadCheck, SaveGame};
use tick_demo::scheduler::{DemoStatus, ExtendedRequest};
use tick_demo::telemetry::{CollectingObserver, ViolationKind, ViolationObserver};
use tick_demo::ticcmd::actions::{XC_GOD, XC_LOAD, XC_SAVE};
use tick_demo::{
    BuilderSettings, CompatibilityLevel, DemoError, DemoOverrides, EngineConfig, ErrorClass,
    ExtendedCommand, GameAction, GameTicker, InputState, SessionBuilder, Strictness,
};

fn ticker() -> GameTicker {
    GameTicker::new(EngineConfig::default(), BuilderSettings::default()).unwrap()
}

fn walk() -> InputState {
    InputState {
        forward: true,
        ..InputState::default()
    }
}

fn save_button(slot: u8) -> InputState {
    InputState {
        save_slot: Some(slot),
        ..InputState::default()
    }
}

fn dsda_recording() -> tick_demo::RecordingSession {
    SessionBuilder::new()
        .with_overrides(DemoOverrides {
            dsda_demo: true,
            ..overrides_for(CompatibilityLevel::Mbf21)
        })
        .start_recording()
        .unwrap()
}

fn recorded_tics(ticker: &GameTicker) -> u32 {
    ticker.session().recording().unwrap().stream().tics()
}

// ===== Save button =====

#[test]
fn save_button_saves_on_the_next_tick() {
    let mut ticker = ticker();
    ticker.start_recording(recording(CompatibilityLevel::Mbf21)).unwrap();
    let mut game = StubGame::new(1);

    for _ in 0..10 {
        ticker.tick(&mut game, &walk()).unwrap();
    }
    ticker.tick(&mut game, &save_button(3)).unwrap();
    assert_eq!(ticker.pending_action(), GameAction::SaveGame { slot: 3 });
    assert!(game.saves.is_empty());

    ticker.tick(&mut game, &walk()).unwrap();
    assert!(game.actions.contains(&GameAction::SaveGame { slot: 3 }));

    let check = LoadCheck {
        signature: STUB_SIGNATURE,
        ..LoadCheck::default()
    };
    let save = SaveGame::from_bytes(&game.saves[&3], &check, &None).unwrap();
    assert_eq!(save.level, CompatibilityLevel::Mbf21);
    assert_eq!(save.level_time, 11);
    assert!(save.player_in_game(0));
    assert!(!save.player_in_game(1));
    let demo = save.demo.unwrap();
    assert!(!demo.complete);
}

// ===== Loading rewinds the recording =====

#[test]
fn loading_a_save_rewinds_the_recording_to_it() {
    let mut ticker = ticker();
    ticker.start_recording(recording(CompatibilityLevel::Mbf21)).unwrap();
    let mut game = StubGame::new(1);

    for _ in 0..10 {
        ticker.tick(&mut game, &walk()).unwrap();
    }
    ticker.tick(&mut game, &save_button(1)).unwrap();
    for _ in 0..9 {
        ticker.tick(&mut game, &walk()).unwrap();
    }
    assert_eq!(recorded_tics(&ticker), 20);

    ticker.set_action(GameAction::LoadGame {
        slot: 1,
        forced: false,
    });
    let strafe = InputState {
        strafe_left: true,
        ..InputState::default()
    };
    for _ in 0..5 {
        ticker.tick(&mut game, &strafe).unwrap();
    }
    assert_eq!(game.level_time, 16);
    assert_eq!(recorded_tics(&ticker), 16);

    let DemoStatus::RecordingFinished { data, .. } = ticker
        .check_demo_status(None, |_| Err(DemoError::DemoNotFound { name: String::new() }))
        .unwrap()
    else {
        panic!("recording should finish");
    };
    let mut playback = SessionBuilder::new()
        .start_playback("rewound", data, Strictness::Strict)
        .unwrap()
        .into_result()
        .unwrap();
    let mut commands = Vec::new();
    while let Some(cmd) = playback.read_tick().unwrap() {
        commands.push(cmd);
    }
    assert_eq!(commands.len(), 16);
    assert!(commands[..10].iter().all(|cmd| cmd.forward > 0 && cmd.side == 0));
    assert!(commands[11..].iter().all(|cmd| cmd.forward == 0 && cmd.side < 0));
}

// ===== Extended commands =====

#[test]
fn extended_commands_reach_the_simulation_and_replay() {
    let mut ticker = ticker();
    ticker.start_recording(dsda_recording()).unwrap();
    let mut game = StubGame::new(1);

    ticker.tick(&mut game, &walk()).unwrap();
    ticker.console_builder_mut().queue_extended(ExtendedCommand {
        actions: XC_GOD | XC_SAVE,
        save_slot: 4,
        ..ExtendedCommand::NONE
    });
    ticker.tick(&mut game, &walk()).unwrap();
    ticker.tick(&mut game, &walk()).unwrap();

    assert!(game.god);
    assert_eq!(
        game.requests,
        vec![(0, ExtendedRequest::SaveGame { slot: 4 }), (0, ExtendedRequest::God)]
    );

    let DemoStatus::RecordingFinished { data, .. } = ticker
        .check_demo_status(None, |_| Err(DemoError::DemoNotFound { name: String::new() }))
        .unwrap()
    else {
        panic!("recording should finish");
    };
    let playback = SessionBuilder::new()
        .start_playback("extended", data, Strictness::Strict)
        .unwrap()
        .into_result()
        .unwrap();
    let mut replayer = self::ticker();
    replayer.start_playback(playback).unwrap();
    let mut replayed = StubGame::new(0);
    for _ in 0..3 {
        replayer.tick(&mut replayed, &InputState::default()).unwrap();
    }
    assert!(replayed.god);
    assert_eq!(replayed.requests, game.requests);
}

#[test]
fn extended_load_forces_the_save_back_in() {
    let mut ticker = ticker();
    ticker.start_recording(dsda_recording()).unwrap();
    let mut game = StubGame::new(1);

    for _ in 0..4 {
        ticker.tick(&mut game, &walk()).unwrap();
    }
    ticker.tick(&mut game, &save_button(2)).unwrap();
    for _ in 0..5 {
        ticker.tick(&mut game, &walk()).unwrap();
    }
    assert!(game.saves.contains_key(&2));
    assert_eq!(recorded_tics(&ticker), 10);

    ticker.console_builder_mut().queue_extended(ExtendedCommand {
        actions: XC_LOAD,
        load_slot: 2,
        ..ExtendedCommand::NONE
    });
    ticker.tick(&mut game, &walk()).unwrap();
    assert_eq!(
        ticker.pending_action(),
        GameAction::LoadGame {
            slot: 2,
            forced: true
        }
    );

    ticker.tick(&mut game, &walk()).unwrap();
    assert_eq!(game.level_time, 6);
    assert_eq!(recorded_tics(&ticker), 6);
}

#[test]
fn plain_demos_ignore_extended_commands() {
    let mut ticker = ticker();
    ticker.start_recording(recording(CompatibilityLevel::Mbf21)).unwrap();
    let mut game = StubGame::new(1);
    ticker.console_builder_mut().queue_extended(ExtendedCommand {
        actions: XC_GOD,
        ..ExtendedCommand::NONE
    });
    ticker.tick(&mut game, &walk()).unwrap();
    ticker.tick(&mut game, &walk()).unwrap();
    assert!(!game.god);
    assert!(game.requests.is_empty());
}

// ===== Mismatched saves =====

fn saved_bytes() -> Vec<u8> {
    let mut ticker = ticker();
    ticker.start_recording(recording(CompatibilityLevel::Boom202)).unwrap();
    let mut game = StubGame::new(1);
    ticker.tick(&mut game, &save_button(0)).unwrap();
    ticker.tick(&mut game, &walk()).unwrap();
    game.saves.remove(&0).unwrap()
}

#[test]
fn foreign_version_needs_forcing() {
    let bytes = saved_bytes();
    let check = LoadCheck {
        version: "OTHER SAVE 9".to_owned(),
        signature: STUB_SIGNATURE,
        forced: false,
    };
    let err = SaveGame::from_bytes(&bytes, &check, &None).unwrap_err();
    assert!(matches!(err, DemoError::SaveGameMismatch { .. }));
    assert_eq!(err.class(), ErrorClass::UserFacing);

    let observer: Arc<dyn ViolationObserver> = Arc::new(CollectingObserver::new());
    let forced = LoadCheck {
        forced: true,
        ..check
    };
    let save = SaveGame::from_bytes(&bytes, &forced, &Some(observer)).unwrap();
    assert_eq!(save.level, CompatibilityLevel::Boom202);
}

#[test]
fn foreign_signature_is_reported_when_forced() {
    let bytes = saved_bytes();
    let strict = LoadCheck {
        signature: STUB_SIGNATURE ^ 1,
        ..LoadCheck::default()
    };
    let err = SaveGame::from_bytes(&bytes, &strict, &None).unwrap_err();
    assert_eq!(err.class(), ErrorClass::UserFacing);

    let observer = Arc::new(CollectingObserver::new());
    let shared: Arc<dyn ViolationObserver> = observer.clone();
    let forced = LoadCheck {
        forced: true,
        ..strict
    };
    assert!(SaveGame::from_bytes(&bytes, &forced, &Some(shared)).is_ok());
    assert!(observer.has_violation(ViolationKind::SaveGame));
}
