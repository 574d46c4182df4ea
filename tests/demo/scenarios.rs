//! Record, serialize and replay scenarios.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{forward_command, forward_demo, legacy_header, overrides_for, recording};
use tick_demo::__internal::ByteReader;
use tick_demo::{
    parse_header, CompatibilityLevel, DemoByteStream, DemoError, DemoOverrides, EngineConfig, Era,
    HeaderContext, ParseOutcome, SessionBuilder, Strictness, TicFormat, TickCodec, TickCommand,
};

fn replay(data: Vec<u8>) -> Vec<TickCommand> {
    let mut playback = SessionBuilder::new()
        .start_playback("replay", data, Strictness::Strict)
        .unwrap()
        .into_result()
        .unwrap();
    let mut commands = Vec::new();
    while let Some(cmd) = playback.read_tick().unwrap() {
        commands.push(cmd);
    }
    assert!(playback.is_finished());
    commands
}

// ===== Forward-only input survives a full round trip =====

#[test]
fn forward_input_replays_identically_at_mbf21() {
    let demo = forward_demo(CompatibilityLevel::Mbf21, 100);
    let replayed = replay(demo.clone());

    assert_eq!(replayed.len(), 100);
    for (n, cmd) in replayed.iter().enumerate() {
        assert_eq!(*cmd, forward_command(n), "tick {}", n);
    }

    // Re-recording the replayed commands reproduces the file byte for byte.
    let mut again = recording(CompatibilityLevel::Mbf21);
    for cmd in &replayed {
        again.record(cmd).unwrap();
    }
    assert_eq!(again.finalize(), demo);
}

#[test]
fn forward_input_replays_identically_at_every_boom_lineage_level() {
    for level in [
        CompatibilityLevel::Boom202,
        CompatibilityLevel::LxDoom1,
        CompatibilityLevel::Mbf,
        CompatibilityLevel::PrBoom6,
        CompatibilityLevel::Mbf21,
    ] {
        let demo = forward_demo(level, 35);
        let replayed = replay(demo);
        assert_eq!(replayed.len(), 35, "{}", level.name());
        assert!(replayed.iter().all(|cmd| cmd.forward >= 25), "{}", level.name());
    }
}

#[test]
fn every_tick_record_has_the_same_size() {
    let demo = forward_demo(CompatibilityLevel::Mbf21, 100);
    let playback = SessionBuilder::new()
        .start_playback("sized", demo.clone(), Strictness::Strict)
        .unwrap()
        .into_result()
        .unwrap();
    let parsed = playback.parsed();
    let region = demo.len() - parsed.data_offset;
    // 100 records plus the end marker; no footer without the extended header.
    assert_eq!(region, 100 * parsed.bytes_per_tic() + 1);
    assert_eq!(demo[demo.len() - 1], tick_demo::DEMOMARKER);
}

// ===== Legacy header =====

#[test]
fn version_106_header_is_doom_1666_and_thirteen_bytes_long() {
    let data = legacy_header(106, 2, 1, 1, 0);
    let ctx = HeaderContext::new(EngineConfig::default(), DemoOverrides::default());

    let parsed = parse_header(&data, &ctx, Strictness::Strict)
        .unwrap()
        .parsed()
        .unwrap();

    assert_eq!(parsed.header.level, CompatibilityLevel::Doom1666);
    assert_eq!(parsed.header.level.name(), "Doom v1.666");
    assert_eq!(parsed.header.skill, 2);
    assert_eq!(parsed.header.episode, 1);
    assert_eq!(parsed.header.map, 1);
    assert_eq!(parsed.header.deathmatch, 0);
    assert_eq!(parsed.data_offset, 13);
    assert_eq!(parsed.data_offset, data.len());
}

#[test]
fn version_106_demo_plays_its_records() {
    let mut data = legacy_header(106, 2, 1, 1, 0);
    data.extend_from_slice(&[25, 0, 0, 0, 50, 0, 0, 1]);
    data.push(tick_demo::DEMOMARKER);

    let replayed = replay(data);
    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0].forward, 25);
    assert_eq!(replayed[1].forward, 50);
    assert_eq!(replayed[1].buttons, 1);
}

// ===== Foreign extended header =====

#[test]
fn unknown_extended_signature_is_not_recognized_leniently() {
    let mut data = vec![255];
    data.extend_from_slice(b"ZDOOM_");
    data.extend_from_slice(&[0; 16]);
    let original = data.clone();
    let ctx = HeaderContext::new(EngineConfig::default(), DemoOverrides::default());

    let outcome = parse_header(&data, &ctx, Strictness::Lenient).unwrap();
    assert!(matches!(outcome, ParseOutcome::NotRecognized(_)));
    assert_eq!(data, original);

    // The same file through a session: no error, nothing opened.
    let outcome = SessionBuilder::new()
        .start_playback("foreign", data, Strictness::Lenient)
        .unwrap();
    assert!(outcome.parsed().is_none());
}

#[test]
fn unknown_extended_signature_is_fatal_strictly() {
    let mut data = vec![255];
    data.extend_from_slice(b"ZDOOM_");
    data.extend_from_slice(&[0; 16]);
    let ctx = HeaderContext::new(EngineConfig::default(), DemoOverrides::default());

    let err = parse_header(&data, &ctx, Strictness::Strict).unwrap_err();
    assert!(matches!(err, DemoError::NotRecognized { .. }));
}

// ===== Cursor never travels forward =====

#[test]
fn rewound_cursor_cannot_return_to_the_recorded_end() {
    let mut stream = DemoByteStream::new(TickCodec::new(Era::Mbf21, TicFormat::default())).unwrap();
    stream.write(&[0xaa; 80]).unwrap();
    assert_eq!(stream.cursor(), 80);

    stream.set_cursor(50).unwrap();
    stream.set_cursor(10).unwrap();
    assert_eq!(stream.cursor(), 10);
    assert_eq!(stream.largest_real_offset(), 80);

    let err = stream.set_cursor(50).unwrap_err();
    assert!(matches!(
        err,
        DemoError::CursorForward {
            requested: 50,
            current: 10
        }
    ));
    assert!(stream.set_cursor(80).is_err());
    assert_eq!(stream.cursor(), 10);
}

#[test]
fn recording_continues_from_a_rewound_cursor() {
    let mut session = recording(CompatibilityLevel::Mbf21);
    for n in 0..10 {
        session.record(&forward_command(n)).unwrap();
    }
    let bpt = session.stream().bytes_per_tic();
    let header_end = session.stream().cursor() - 10 * bpt;
    session
        .stream_mut()
        .set_cursor(header_end + 4 * bpt)
        .unwrap();
    session
        .record(&TickCommand {
            forward: -25,
            ..TickCommand::EMPTY
        })
        .unwrap();

    let demo = session.finalize();
    let replayed = replay(demo);
    assert_eq!(replayed.len(), 5);
    assert_eq!(replayed[4].forward, -25);
}

// ===== Playback respects the recorded level =====

#[test]
fn header_records_the_requested_level() {
    let demo = SessionBuilder::new()
        .with_overrides(overrides_for(CompatibilityLevel::PrBoom3))
        .start_recording()
        .unwrap()
        .finalize();
    let playback = SessionBuilder::new()
        .start_playback("level", demo.clone(), Strictness::Strict)
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(playback.header().level, CompatibilityLevel::PrBoom3);

    let mut r = ByteReader::new(&demo);
    assert!(r.read_u8().unwrap() >= 200);
}
