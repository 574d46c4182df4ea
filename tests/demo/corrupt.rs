//! Corrupt, truncated and foreign demos under both strictness modes.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use crate::common::{forward_demo, init_tracing, overrides_for};
use tick_demo::telemetry::{CollectingObserver, ViolationKind};
use tick_demo::{
    parse_header, CompatibilityLevel, DemoError, DemoOverrides, ErrorClass, HeaderContext,
    ParseOutcome, SessionBuilder, Strictness,
};

fn header_len(data: &[u8]) -> usize {
    parse_header(data, &HeaderContext::default(), Strictness::Strict)
        .unwrap()
        .parsed()
        .unwrap()
        .data_offset
}

fn dsda_demo(ticks: usize) -> Vec<u8> {
    let mut session = SessionBuilder::new()
        .with_overrides(DemoOverrides {
            dsda_demo: true,
            ..overrides_for(CompatibilityLevel::Mbf21)
        })
        .start_recording()
        .unwrap();
    for _ in 0..ticks {
        session.record(&tick_demo::TickCommand::EMPTY).unwrap();
    }
    session.finalize()
}

// ===== Truncated headers =====

#[test]
fn truncated_header_is_not_recognized_leniently() {
    init_tracing();
    for demo in [
        forward_demo(CompatibilityLevel::Mbf21, 3),
        forward_demo(CompatibilityLevel::Boom202, 3),
        forward_demo(CompatibilityLevel::Mbf, 3),
        dsda_demo(3),
    ] {
        let len = header_len(&demo);
        for cut in 1..len {
            let outcome =
                parse_header(&demo[..cut], &HeaderContext::default(), Strictness::Lenient)
                    .unwrap_or_else(|err| panic!("cut at {}: {}", cut, err));
            assert!(!outcome.is_parsed(), "cut at {} of {}", cut, len);
        }
    }
}

#[test]
fn truncated_header_is_fatal_strictly() {
    let demo = forward_demo(CompatibilityLevel::Mbf21, 3);
    let len = header_len(&demo);
    for cut in 1..len {
        let err = parse_header(&demo[..cut], &HeaderContext::default(), Strictness::Strict)
            .unwrap_err();
        assert!(
            matches!(err, DemoError::HeaderOverrun { size, .. } if size == cut),
            "cut at {}: {}",
            cut,
            err
        );
        assert_eq!(err.class(), ErrorClass::Fatal);
    }
}

#[test]
fn empty_data_is_an_overrun() {
    let outcome = parse_header(&[], &HeaderContext::default(), Strictness::Lenient).unwrap();
    assert!(matches!(outcome, ParseOutcome::NotRecognized(_)));
    assert!(parse_header(&[], &HeaderContext::default(), Strictness::Strict).is_err());
}

// ===== Broken tick data =====

#[test]
fn partial_tick_record_depends_on_strictness() {
    let mut demo = forward_demo(CompatibilityLevel::Mbf21, 3);
    demo.pop();
    demo.extend_from_slice(&[7, 7]);

    let lenient = SessionBuilder::new()
        .start_playback("partial", demo.clone(), Strictness::Lenient)
        .unwrap();
    assert!(lenient.parsed().is_none());

    let err = SessionBuilder::new()
        .start_playback("partial", demo, Strictness::Strict)
        .unwrap_err();
    assert!(matches!(err, DemoError::TruncatedTick { available: 2, .. }));
}

#[test]
fn misaligned_records_before_the_marker_are_rejected() {
    // drop one byte of the last record and keep the marker
    let mut demo = forward_demo(CompatibilityLevel::Mbf21, 3);
    let marker = demo.pop().unwrap();
    demo.pop();
    demo.push(marker);

    let lenient = SessionBuilder::new()
        .start_playback("misaligned", demo.clone(), Strictness::Lenient)
        .unwrap();
    assert!(lenient.parsed().is_none());

    let err = SessionBuilder::new()
        .start_playback("misaligned", demo, Strictness::Strict)
        .unwrap_err();
    assert!(matches!(
        err,
        DemoError::TruncatedTick {
            needed: 5,
            available: 4,
            ..
        }
    ));
    assert_eq!(err.class(), ErrorClass::Fatal);
}

#[test]
fn missing_marker_plays_to_the_end_of_the_file() {
    let mut demo = forward_demo(CompatibilityLevel::Boom202, 3);
    demo.pop();
    let mut playback = SessionBuilder::new()
        .start_playback("unterminated", demo, Strictness::Strict)
        .unwrap()
        .into_result()
        .unwrap();
    let mut count = 0;
    while playback.read_tick().unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 3);
}

// ===== Version bytes =====

#[test]
fn unknown_version_is_fatal_in_both_modes() {
    let mut demo = forward_demo(CompatibilityLevel::Mbf21, 1);
    demo[0] = 150;
    for strictness in [Strictness::Lenient, Strictness::Strict] {
        let err = parse_header(&demo, &HeaderContext::default(), strictness).unwrap_err();
        assert!(matches!(err, DemoError::UnknownDemoVersion { version: 150 }));
    }
}

#[test]
fn newer_dsda_header_is_malformed_even_leniently() {
    let mut demo = dsda_demo(2);
    assert_eq!(demo[0], 255);
    demo[7] = 9;
    let err = parse_header(&demo, &HeaderContext::default(), Strictness::Lenient).unwrap_err();
    assert!(matches!(err, DemoError::MalformedExtendedHeader { .. }));
    assert_eq!(err.class(), ErrorClass::Fatal);
}

#[test]
fn soft_failures_are_classed_soft() {
    let err = ParseOutcome::<()>::NotRecognized("foreign".to_owned())
        .into_result()
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Soft);
}

// ===== Observers =====

#[test]
fn out_of_range_console_player_is_reported() {
    let observer = Arc::new(CollectingObserver::new());
    let demo = forward_demo(CompatibilityLevel::Boom202, 2);
    let playback = SessionBuilder::new()
        .with_overrides(DemoOverrides {
            console_player: Some(3),
            ..DemoOverrides::default()
        })
        .with_violation_observer(observer.clone())
        .start_playback("viewer", demo, Strictness::Strict)
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(playback.console_player(), 0);
    assert!(observer.has_violation(ViolationKind::HeaderParse));
}
