//! Recording live input through the ticker and replaying it.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{init_tracing, overrides_for, recording, StubGame};
use tick_demo::scheduler::DemoStatus;
use tick_demo::ticcmd::buttons::BT_JOIN;
use tick_demo::{
    BuilderSettings, CompatibilityLevel, DemoResult, EngineConfig, GameAction, GameState,
    GameTicker, InputState, KeyFrames, PauseMode, SessionBuilder, Strictness, TickCommand,
};

fn ticker() -> GameTicker {
    GameTicker::new(EngineConfig::default(), BuilderSettings::default()).unwrap()
}

fn no_demos(name: &str) -> DemoResult<Vec<u8>> {
    panic!("no demo cycle here, asked for {}", name)
}

/// Input for tick `n` of the scripted run: walking with the odd turn and shot.
fn scripted_input(n: usize) -> InputState {
    InputState {
        forward: n % 4 != 3,
        turn_left: n % 9 < 3,
        strafe_right: n % 11 == 5,
        fire: n % 7 == 0,
        speed: n % 13 > 8,
        ..InputState::default()
    }
}

fn finish_recording(ticker: &mut GameTicker) -> (u32, Vec<u8>) {
    match ticker.check_demo_status(None, no_demos).unwrap() {
        DemoStatus::RecordingFinished { tics, data } => (tics, data),
        other => panic!("expected a finished recording, got {:?}", other),
    }
}

fn replay(data: Vec<u8>) -> (GameTicker, StubGame) {
    let playback = SessionBuilder::new()
        .start_playback("replay", data, Strictness::Strict)
        .unwrap()
        .into_result()
        .unwrap();
    let mut ticker = ticker();
    ticker.start_playback(playback).unwrap();
    let mut game = StubGame::new(0);
    loop {
        let outcome = ticker.tick(&mut game, &InputState::default()).unwrap();
        assert!(!outcome.demo_finished);
        if ticker.session().playback().is_some_and(|p| p.is_finished()) {
            break;
        }
    }
    (ticker, game)
}

// ===== Record and replay =====

#[test]
fn live_recording_replays_to_the_same_world() {
    init_tracing();
    let mut ticker = ticker();
    ticker.start_recording(recording(CompatibilityLevel::Mbf21)).unwrap();
    let mut game = StubGame::new(1);

    for n in 0..60 {
        ticker.tick(&mut game, &scripted_input(n)).unwrap();
    }
    assert_eq!(game.actions, vec![GameAction::NewGame]);
    assert_eq!(ticker.state(), GameState::Level);
    assert_eq!(game.level_time, 60);

    let (tics, data) = finish_recording(&mut ticker);
    assert_eq!(tics, 60);
    assert!(ticker.session().is_idle());

    let (_, replayed) = replay(data);
    assert_eq!(replayed.players, 1);
    assert_eq!(replayed.commands_of(0), game.commands_of(0));
    assert_eq!(replayed.digest, game.digest);
    assert_eq!(replayed.actions, vec![GameAction::PlayDemo]);
}

#[test]
fn short_angles_replay_identically_at_boom() {
    let mut ticker = ticker();
    ticker.start_recording(recording(CompatibilityLevel::Boom202)).unwrap();
    let mut game = StubGame::new(1);
    for n in 0..40 {
        ticker.tick(&mut game, &scripted_input(n)).unwrap();
    }
    let (_, data) = finish_recording(&mut ticker);

    let (_, replayed) = replay(data);
    assert_eq!(replayed.commands_of(0), game.commands_of(0));
    assert_eq!(replayed.digest, game.digest);
}

#[test]
fn players_are_recorded_in_slot_order() {
    let session = SessionBuilder::new()
        .with_overrides(overrides_for(CompatibilityLevel::PrBoom6))
        .with_num_players(2)
        .unwrap()
        .start_recording()
        .unwrap();
    let mut ticker = ticker();
    ticker.start_recording(session).unwrap();
    let mut game = StubGame::new(2);
    game.remote = TickCommand {
        side: -40,
        ..TickCommand::EMPTY
    };

    for n in 0..10 {
        ticker.tick(&mut game, &scripted_input(n)).unwrap();
    }
    let (tics, data) = finish_recording(&mut ticker);
    assert_eq!(tics, 20);

    let (_, replayed) = replay(data);
    assert_eq!(replayed.players, 2);
    assert_eq!(replayed.commands_of(0), game.commands_of(0));
    assert!(replayed.commands_of(1).iter().all(|cmd| cmd.side == -40));
    assert_eq!(replayed.digest, game.digest);
}

#[test]
fn ticks_run_the_commands_the_demo_stores() {
    let mut session = SessionBuilder::new()
        .with_overrides(overrides_for(CompatibilityLevel::Boom202))
        .with_num_players(2)
        .unwrap()
        .start_recording()
        .unwrap();
    session.builder_mut().scripted_mut().extend([TickCommand {
        forward: 25,
        angle_turn: 0x0177,
        look_fly: 9,
        ..TickCommand::EMPTY
    }]);
    let mut ticker = ticker();
    ticker.start_recording(session).unwrap();
    let mut game = StubGame::new(2);
    game.remote = TickCommand {
        angle_turn: 0x0123,
        ..TickCommand::EMPTY
    };

    for _ in 0..3 {
        ticker.tick(&mut game, &InputState::default()).unwrap();
    }
    let first = &game.ticks[0].1;
    assert_eq!(first[0].angle_turn, 0x0100);
    assert_eq!(first[0].look_fly, 0);
    assert_eq!(first[1].angle_turn, 0x0100);

    let (_, data) = finish_recording(&mut ticker);
    let (_, replayed) = replay(data);
    assert_eq!(replayed.commands_of(0), game.commands_of(0));
    assert_eq!(replayed.commands_of(1), game.commands_of(1));
    assert_eq!(replayed.digest, game.digest);
}

// ===== Pausing =====

#[test]
fn pause_buttons_replay_the_same_pauses() {
    let mut ticker = ticker();
    ticker.start_recording(recording(CompatibilityLevel::Mbf21)).unwrap();
    let mut game = StubGame::new(1);
    let pause = InputState {
        pause: true,
        ..InputState::default()
    };

    let mut paused_at = Vec::new();
    for n in 0..20 {
        let input = if n == 5 || n == 12 { pause } else { scripted_input(n) };
        ticker.tick(&mut game, &input).unwrap();
        paused_at.push(ticker.pause().contains(PauseMode::COMMAND));
    }
    assert!(paused_at[5..12].iter().all(|&p| p));
    assert!(!paused_at[12]);
    assert_eq!(game.level_time, 13);

    let (_, data) = finish_recording(&mut ticker);
    let (replay_ticker, replayed) = replay(data);
    assert_eq!(replayed.level_time, 13);
    assert_eq!(replayed.digest, game.digest);
    assert!(!replay_ticker.pause().is_paused());
}

#[test]
fn build_mode_pause_records_nothing_until_stepped() {
    let mut ticker = ticker();
    ticker.start_recording(recording(CompatibilityLevel::Mbf21)).unwrap();
    let mut game = StubGame::new(1);
    for n in 0..5 {
        ticker.tick(&mut game, &scripted_input(n)).unwrap();
    }

    assert!(ticker.toggle_build_mode().unwrap());
    for n in 0..8 {
        let outcome = ticker.tick(&mut game, &scripted_input(n)).unwrap();
        assert!(!outcome.commands);
    }
    assert_eq!(ticker.basetic().as_i32(), 8);
    assert_eq!(ticker.session().recording().unwrap().stream().tics(), 5);

    ticker.advance_frame();
    let outcome = ticker.tick(&mut game, &InputState::default()).unwrap();
    assert!(outcome.commands);
    assert_eq!(ticker.session().recording().unwrap().stream().tics(), 6);
    assert!(ticker.pause().contains(PauseMode::BUILD_MODE));

    assert!(!ticker.toggle_build_mode().unwrap());
    ticker.tick(&mut game, &InputState::default()).unwrap();
    assert_eq!(ticker.session().recording().unwrap().stream().tics(), 7);
}

// ===== Key frames and joins =====

#[test]
fn key_frame_rewind_rerecords_from_the_frame() {
    let mut ticker = ticker();
    ticker.set_key_frames(KeyFrames::new(4, 10).unwrap());
    ticker.start_recording(recording(CompatibilityLevel::Mbf21)).unwrap();
    let mut game = StubGame::new(1);

    for n in 0..30 {
        ticker.tick(&mut game, &scripted_input(n)).unwrap();
    }
    assert_eq!(ticker.key_frames().len(), 2);
    let original = game.commands_of(0);

    let tic = ticker.restore_key_frame(&mut game, 0).unwrap();
    assert_eq!(tic.as_i32(), 20);
    assert_eq!(ticker.gametic().as_i32(), 20);
    assert_eq!(game.level_time, 20);
    assert_eq!(ticker.session().recording().unwrap().stream().tics(), 20);

    let turn_right = InputState {
        turn_right: true,
        ..InputState::default()
    };
    for _ in 0..10 {
        ticker.tick(&mut game, &turn_right).unwrap();
    }
    let (tics, data) = finish_recording(&mut ticker);
    assert_eq!(tics, 30);

    let (_, replayed) = replay(data);
    let commands = replayed.commands_of(0);
    assert_eq!(commands.len(), 30);
    assert_eq!(commands[..20], original[..20]);
    assert_eq!(commands[20].buttons & BT_JOIN, BT_JOIN);
    assert!(commands[21..].iter().all(|cmd| cmd.angle_turn < 0));
    assert_eq!(replayed.digest, game.digest);
}

#[test]
fn joined_playback_keeps_the_played_part() {
    let mut source = ticker();
    source.start_recording(recording(CompatibilityLevel::Mbf21)).unwrap();
    let mut game = StubGame::new(1);
    for n in 0..20 {
        source.tick(&mut game, &scripted_input(n)).unwrap();
    }
    let (_, data) = finish_recording(&mut source);
    let original = game.commands_of(0);

    let playback = SessionBuilder::new()
        .start_playback("takeover", data, Strictness::Strict)
        .unwrap()
        .into_result()
        .unwrap();
    let mut ticker = ticker();
    ticker.start_playback(playback).unwrap();
    let mut player = StubGame::new(0);
    for _ in 0..10 {
        ticker.tick(&mut player, &InputState::default()).unwrap();
    }

    ticker.join_playback(BuilderSettings::default()).unwrap();
    assert!(ticker.session().is_recording());
    let fire = InputState {
        fire: true,
        ..InputState::default()
    };
    for _ in 0..5 {
        ticker.tick(&mut player, &fire).unwrap();
    }
    let (tics, data) = finish_recording(&mut ticker);
    assert_eq!(tics, 15);

    let (_, replayed) = replay(data);
    let commands = replayed.commands_of(0);
    assert_eq!(commands.len(), 15);
    assert_eq!(commands[..10], original[..10]);
    assert_eq!(commands[10].buttons & BT_JOIN, BT_JOIN);
    assert_eq!(replayed.digest, player.digest);
}

// ===== Idle ticking =====

#[test]
fn idle_ticker_samples_the_console_player() {
    let mut ticker = ticker();
    let mut game = StubGame::new(1);
    ticker.set_action(GameAction::LoadLevel);
    let input = InputState {
        forward: true,
        ..InputState::default()
    };
    let outcome = ticker.tick(&mut game, &input).unwrap();
    assert!(outcome.advanced);
    assert_eq!(ticker.state(), GameState::Level);
    assert!(game.commands_of(0)[0].forward > 0);
    assert!(ticker.session().is_idle());
}
