//! Invariant checks held across sequences of stream and queue operations.
//!
//! The [`InvariantChecker`] implementations are also run by
//! `debug_check_invariants!` inside the crate; these tests drive the public
//! operations and check the result from the outside.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::forward_command;
use tick_demo::builder::queues::ScriptedQueue;
use tick_demo::demo::stream::INITIAL_DEMO_BUFFER_SIZE;
use tick_demo::telemetry::InvariantChecker;
use tick_demo::{DemoByteStream, DemoError, Era, TicFormat, TickCodec};

fn stream() -> DemoByteStream {
    DemoByteStream::new(TickCodec::new(Era::Mbf21, TicFormat::default())).unwrap()
}

// ===== DemoByteStream =====

#[test]
fn fresh_stream_is_consistent() {
    let stream = stream();
    stream.check_invariants().unwrap();
    assert_eq!(stream.cursor(), 0);
    assert_eq!(stream.allocated(), INITIAL_DEMO_BUFFER_SIZE);
}

#[test]
fn growth_past_the_initial_buffer_keeps_invariants() {
    let mut stream = stream();
    let chunk = vec![0x11u8; 4096];
    let mut written = 0;
    while written <= INITIAL_DEMO_BUFFER_SIZE * 2 {
        stream.write(&chunk).unwrap();
        written += chunk.len();
        stream.check_invariants().unwrap();
    }
    assert!(stream.allocated() > INITIAL_DEMO_BUFFER_SIZE);
    assert_eq!(stream.cursor(), written);
}

#[test]
fn rewinds_and_rerecords_keep_invariants() {
    let mut stream = stream();
    for n in 0..40 {
        stream.record(&forward_command(n)).unwrap();
    }
    let bpt = stream.bytes_per_tic();
    let end = stream.cursor();

    stream.set_cursor(10 * bpt).unwrap();
    stream.check_invariants().unwrap();
    for n in 0..5 {
        stream.record(&forward_command(n + 100)).unwrap();
        stream.check_invariants().unwrap();
    }
    assert_eq!(stream.cursor(), 15 * bpt);
    assert_eq!(stream.largest_real_offset(), end);

    let err = stream.set_cursor(end).unwrap_err();
    assert_eq!(
        err,
        DemoError::CursorForward {
            requested: end,
            current: 15 * bpt
        }
    );
    stream.check_invariants().unwrap();
}

#[test]
fn export_leaves_the_stream_untouched() {
    let mut stream = stream();
    for n in 0..3 {
        stream.record(&forward_command(n)).unwrap();
    }
    let before = stream.clone();
    let file = stream.export();
    assert_eq!(file.len(), stream.cursor() + 1);
    assert_eq!(stream.cursor(), before.cursor());
    assert_eq!(stream.recorded(), before.recorded());
    stream.check_invariants().unwrap();
}

// ===== ScriptedQueue =====

#[test]
fn scripted_queue_depth_tracks_its_commands() {
    let mut queue = ScriptedQueue::new();
    queue.check_invariants().unwrap();

    queue.extend((0..4).map(forward_command));
    queue.check_invariants().unwrap();
    assert_eq!(queue.depth(), 4);

    let mut exhausted = Vec::new();
    while let Some(popped) = queue.pop() {
        queue.check_invariants().unwrap();
        exhausted.push(popped.exhausted);
    }
    assert_eq!(exhausted, vec![false, false, false, true]);
    assert!(queue.is_empty());

    queue.extend([forward_command(9)]);
    queue.clear();
    queue.check_invariants().unwrap();
    assert_eq!(queue.depth(), 0);
}
