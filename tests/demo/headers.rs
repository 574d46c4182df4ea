//! Header families written by a recording and read back by a playback.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{forward_command, overrides_for};
use tick_demo::demo::extended::ExtendedHeader;
use tick_demo::{
    CompatibilityLevel, DemoError, DemoOverrides, EngineConfig, Era, Game, GameOptions,
    PlaybackSession, SessionBuilder, Strictness, TickCommand,
};

fn engine(game: Game) -> EngineConfig {
    EngineConfig {
        game,
        ..EngineConfig::default()
    }
}

fn record_and_open(builder: SessionBuilder, game: Game, ticks: usize) -> PlaybackSession {
    let mut session = builder.start_recording().unwrap();
    let players = session.header().player_count();
    for n in 0..ticks {
        for _ in 0..players {
            session.record(&forward_command(n)).unwrap();
        }
    }
    let demo = session.finalize();
    SessionBuilder::new()
        .with_engine_config(engine(game))
        .start_playback("family", demo, Strictness::Strict)
        .unwrap()
        .into_result()
        .unwrap()
}

// ===== Every recordable level =====

#[test]
fn every_recordable_level_reads_back_as_itself() {
    use CompatibilityLevel as L;
    for level in [
        L::Doom2_19,
        L::Doom1666,
        L::Boom201,
        L::Boom202,
        L::LxDoom1,
        L::PrBoom2,
        L::PrBoom3,
        L::PrBoom4,
        L::PrBoom5,
        L::PrBoom6,
        L::Mbf21,
    ] {
        let builder = SessionBuilder::new()
            .with_overrides(overrides_for(level))
            .with_skill(3)
            .unwrap()
            .with_map(1, 7)
            .unwrap()
            .with_num_players(2)
            .unwrap();
        let playback = record_and_open(builder, Game::Doom, 4);
        let header = playback.header();
        assert_eq!(header.level, level, "{}", level.name());
        assert_eq!(header.skill, 3, "{}", level.name());
        assert_eq!(header.episode, 1, "{}", level.name());
        assert_eq!(header.map, 7, "{}", level.name());
        assert_eq!(header.player_count(), 2, "{}", level.name());
        assert_eq!(playback.stream().total_tics(), 4, "{}", level.name());
    }
}

#[test]
fn levels_without_a_writer_cannot_record() {
    let err = SessionBuilder::new()
        .with_overrides(overrides_for(CompatibilityLevel::PrBoom1))
        .start_recording()
        .unwrap_err();
    assert!(matches!(err, DemoError::UnsupportedRecordingLevel { .. }));
}

#[test]
fn recording_without_a_level_is_refused() {
    let err = SessionBuilder::new().start_recording().unwrap_err();
    assert!(matches!(err, DemoError::MissingCompatibilityLevel));
}

// ===== Options block =====

#[test]
fn game_options_survive_the_option_block() {
    let options = GameOptions {
        rng_seed: 0xdead_beef,
        fast: true,
        respawn: true,
        ..GameOptions::for_level(CompatibilityLevel::Mbf21)
    };
    let builder = SessionBuilder::new()
        .with_overrides(overrides_for(CompatibilityLevel::Mbf21))
        .with_game_options(options);
    let playback = record_and_open(builder, Game::Doom, 1);
    let read = playback.header().options;
    assert_eq!(read.rng_seed, 0xdead_beef);
    assert!(read.fast);
    assert!(read.respawn);
}

// ===== Long tics =====

#[test]
fn longtics_keep_the_full_angle() {
    let mut session = SessionBuilder::new()
        .with_overrides(DemoOverrides {
            longtics: true,
            ..overrides_for(CompatibilityLevel::Doom2_19)
        })
        .start_recording()
        .unwrap();
    let turn = TickCommand {
        angle_turn: 0x0123,
        ..TickCommand::EMPTY
    };
    session.record(&turn).unwrap();
    let demo = session.finalize();
    assert_eq!(demo[0], 111);

    let mut playback = SessionBuilder::new()
        .start_playback("longtics", demo, Strictness::Strict)
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(playback.parsed().bytes_per_tic(), 5);
    assert_eq!(playback.read_tick().unwrap().unwrap().angle_turn, 0x0123);
}

// ===== DSDA extended header =====

#[test]
fn dsda_header_enables_extended_commands_and_counts_tics() {
    let builder = SessionBuilder::new().with_overrides(DemoOverrides {
        dsda_demo: true,
        ..overrides_for(CompatibilityLevel::Mbf21)
    });
    let playback = record_and_open(builder, Game::Doom, 20);
    let parsed = playback.parsed();

    assert!(matches!(
        parsed.header.extended,
        Some(ExtendedHeader::Dsda { tics: 20, .. })
    ));
    assert!(parsed.format.extended);
    assert!(parsed.extended_data_offset.is_some());
    assert_eq!(parsed.header.level, CompatibilityLevel::Mbf21);
    assert_eq!(playback.stream().total_tics(), 20);
}

// ===== Raven games =====

#[test]
fn heretic_header_round_trips() {
    let builder = SessionBuilder::new()
        .with_engine_config(engine(Game::Heretic))
        .with_overrides(overrides_for(CompatibilityLevel::Doom2_19))
        .with_map(2, 3)
        .unwrap()
        .with_num_players(3)
        .unwrap();
    let playback = record_and_open(builder, Game::Heretic, 2);
    let parsed = playback.parsed();
    assert_eq!(parsed.era, Era::Raven);
    assert_eq!(parsed.bytes_per_tic(), 6);
    assert_eq!(parsed.header.episode, 2);
    assert_eq!(parsed.header.map, 3);
    assert_eq!(parsed.header.player_count(), 3);
}

#[test]
fn hexen_header_keeps_player_classes() {
    let builder = SessionBuilder::new()
        .with_engine_config(engine(Game::Hexen))
        .with_overrides(overrides_for(CompatibilityLevel::Doom2_19))
        .with_num_players(6)
        .unwrap()
        .with_player_class(2);
    let playback = record_and_open(builder, Game::Hexen, 1);
    let header = playback.header();
    assert_eq!(header.player_count(), 6);
    assert!(header.players[..6].iter().all(|slot| slot.in_game && slot.class == 2));
    assert!(!header.players[6].in_game);
}
