//! Property-based tests over recording, replay and header parsing.
//!
//! # Properties
//!
//! - Any command sequence recorded at a recordable level replays as the
//!   codec's canonical form of the same sequence
//! - Rewinding the cursor and recording again replays the kept prefix followed
//!   by the new commands
//! - The cursor never moves forward through `set_cursor`
//! - Lenient parsing of arbitrary bytes never panics, and a parsed header
//!   never points past the data it came from

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use proptest::prelude::*;

use crate::common::recording;
use tick_demo::test_config::miri_case_count;
use tick_demo::{
    parse_header, CompatibilityLevel, DemoError, HeaderContext, SessionBuilder, Strictness,
    TickCommand,
};

/// Levels a recording can be started at.
const RECORDABLE: [CompatibilityLevel; 11] = [
    CompatibilityLevel::Doom1666,
    CompatibilityLevel::Doom2_19,
    CompatibilityLevel::Boom201,
    CompatibilityLevel::Boom202,
    CompatibilityLevel::LxDoom1,
    CompatibilityLevel::PrBoom2,
    CompatibilityLevel::PrBoom3,
    CompatibilityLevel::PrBoom4,
    CompatibilityLevel::PrBoom5,
    CompatibilityLevel::PrBoom6,
    CompatibilityLevel::Mbf21,
];

// ============================================================================
// Strategies
// ============================================================================

fn level_strategy() -> impl Strategy<Value = CompatibilityLevel> {
    proptest::sample::select(RECORDABLE.to_vec())
}

/// Doom-era commands. Movement stays inside the range a player can produce so
/// the first byte of a record is never the end marker.
fn command_strategy() -> impl Strategy<Value = TickCommand> {
    (-50i8..=50, -50i8..=50, any::<i16>(), any::<u8>()).prop_map(
        |(forward, side, angle_turn, buttons)| TickCommand {
            forward,
            side,
            angle_turn,
            buttons,
            ..TickCommand::EMPTY
        },
    )
}

fn commands_strategy(max: usize) -> impl Strategy<Value = Vec<TickCommand>> {
    proptest::collection::vec(command_strategy(), 0..max)
}

fn replay(data: Vec<u8>) -> Vec<TickCommand> {
    let mut playback = SessionBuilder::new()
        .start_playback("property", data, Strictness::Strict)
        .unwrap()
        .into_result()
        .unwrap();
    let mut out = Vec::new();
    while let Some(cmd) = playback.read_tick().unwrap() {
        out.push(cmd);
    }
    out
}

// ============================================================================
// Record and replay
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(miri_case_count()))]

    #[test]
    fn recorded_commands_replay_canonically(
        level in level_strategy(),
        commands in commands_strategy(64),
    ) {
        let mut session = recording(level);
        let codec = session.stream().codec().clone();
        for cmd in &commands {
            session.record(cmd).unwrap();
        }
        let expected: Vec<_> = commands.iter().map(|cmd| codec.canonicalize(cmd)).collect();
        prop_assert_eq!(replay(session.finalize()), expected);
    }

    #[test]
    fn canonical_commands_are_fixed_points(
        level in level_strategy(),
        cmd in command_strategy(),
    ) {
        let codec = recording(level).stream().codec().clone();
        let once = codec.canonicalize(&cmd);
        prop_assert_eq!(codec.canonicalize(&once), once);
        prop_assert_eq!(once.forward, cmd.forward);
        prop_assert_eq!(once.side, cmd.side);
        prop_assert_eq!(once.buttons, cmd.buttons);
    }

    #[test]
    fn rewound_recording_keeps_prefix_then_new_commands(
        level in level_strategy(),
        first in commands_strategy(40),
        second in commands_strategy(20),
        keep_fraction in 0.0f64..=1.0,
    ) {
        let mut session = recording(level);
        let codec = session.stream().codec().clone();
        let header_end = session.stream().cursor();
        for cmd in &first {
            session.record(cmd).unwrap();
        }
        let keep = ((first.len() as f64) * keep_fraction) as usize;
        let bpt = session.stream().bytes_per_tic();
        session.stream_mut().set_cursor(header_end + keep * bpt).unwrap();
        for cmd in &second {
            session.record(cmd).unwrap();
        }

        let expected: Vec<_> = first[..keep]
            .iter()
            .chain(&second)
            .map(|cmd| codec.canonicalize(cmd))
            .collect();
        prop_assert_eq!(replay(session.finalize()), expected);
    }

    #[test]
    fn cursor_never_moves_forward(
        level in level_strategy(),
        commands in commands_strategy(30),
        targets in proptest::collection::vec(any::<usize>(), 1..10),
    ) {
        let mut session = recording(level);
        for cmd in &commands {
            session.record(cmd).unwrap();
        }
        let end = session.stream().cursor();
        for target in targets {
            let target = target % (end + 8);
            let before = session.stream().cursor();
            match session.stream_mut().set_cursor(target) {
                Ok(()) => {
                    prop_assert!(target <= before);
                    prop_assert_eq!(session.stream().cursor(), target);
                }
                Err(DemoError::CursorForward { requested, current }) => {
                    prop_assert!(target > before);
                    prop_assert_eq!(requested, target);
                    prop_assert_eq!(current, before);
                    prop_assert_eq!(session.stream().cursor(), before);
                }
                Err(other) => prop_assert!(false, "unexpected error {}", other),
            }
            prop_assert_eq!(session.stream().largest_real_offset(), end);
        }
    }
}

// ============================================================================
// Parsing arbitrary bytes
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(miri_case_count()))]

    #[test]
    fn lenient_parse_of_random_bytes_never_panics(
        data in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        match parse_header(&data, &HeaderContext::default(), Strictness::Lenient) {
            Ok(outcome) => {
                if let Some(parsed) = outcome.parsed() {
                    prop_assert!(parsed.data_offset <= data.len());
                }
            }
            Err(err) => prop_assert!(!err.to_string().is_empty()),
        }
    }

    #[test]
    fn lenient_playback_of_random_bytes_ends(
        data in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let opened = SessionBuilder::new().start_playback("noise", data.clone(), Strictness::Lenient);
        if let Ok(outcome) = opened {
            if let Some(mut playback) = outcome.into_result().ok() {
                let mut reads = 0;
                while let Ok(Some(_)) = playback.read_tick() {
                    reads += 1;
                    prop_assert!(reads <= data.len());
                }
            }
        }
    }

    #[test]
    fn valid_demo_with_random_tail_still_parses(
        level in level_strategy(),
        tail in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut session = recording(level);
        session.record(&TickCommand::EMPTY).unwrap();
        let mut data = session.finalize();
        let header = parse_header(&data, &HeaderContext::default(), Strictness::Strict)
            .unwrap()
            .into_result()
            .unwrap();
        data.extend_from_slice(&tail);
        let again = parse_header(&data, &HeaderContext::default(), Strictness::Strict)
            .unwrap()
            .into_result()
            .unwrap();
        prop_assert_eq!(again.data_offset, header.data_offset);
        prop_assert_eq!(again.header, header.header);
    }
}
