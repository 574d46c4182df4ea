//! Demo files on disk.
//!
//! These tests share a scratch directory under the system temp dir and run
//! serially.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::path::{Path, PathBuf};

use serial_test::serial;

use crate::common::{forward_command, forward_demo, init_tracing, recording};
use tick_demo::demo::naming::DemoNamer;
use tick_demo::{CompatibilityLevel, DemoError, ErrorClass, SessionBuilder};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join(format!("tick-demo-tests-{}", std::process::id()))
        .join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn base_in(dir: &Path, base: &str) -> String {
    dir.join(base).display().to_string()
}

#[test]
#[serial]
fn finished_recording_plays_back_from_its_file() {
    init_tracing();
    let dir = scratch("finish");
    let path = dir.join("run.lmp");

    let mut session = recording(CompatibilityLevel::Mbf21);
    for n in 0..12 {
        session.record(&forward_command(n)).unwrap();
    }
    let written = session.finish(&path).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, written);

    let mut playback = SessionBuilder::new()
        .start_playback_file(&path)
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(playback.name(), path.display().to_string());
    let mut n = 0;
    while let Some(cmd) = playback.read_tick().unwrap() {
        assert_eq!(cmd, forward_command(n));
        n += 1;
    }
    assert_eq!(n, 12);
}

#[test]
#[serial]
fn exported_clip_keeps_recording_alive() {
    let dir = scratch("export");
    let clip = dir.join("clip.lmp");

    let mut session = recording(CompatibilityLevel::Boom202);
    session.record(&forward_command(0)).unwrap();
    let cursor = session.stream().cursor();
    session.export_to_file(&clip).unwrap();
    assert_eq!(session.stream().cursor(), cursor);

    session.record(&forward_command(1)).unwrap();
    let full = session.finalize();
    let clipped = std::fs::read(&clip).unwrap();
    assert!(clipped.len() < full.len());
    assert_eq!(clipped[..cursor], full[..cursor]);
}

#[test]
#[serial]
fn missing_file_is_demo_not_found() {
    let dir = scratch("missing");
    let err = SessionBuilder::new()
        .start_playback_file(&dir.join("nothing.lmp"))
        .unwrap_err();
    assert!(matches!(err, DemoError::DemoNotFound { .. }));
    assert_eq!(err.class(), ErrorClass::Soft);
}

#[test]
#[serial]
fn free_names_skip_files_that_exist() {
    let dir = scratch("names");
    let mut namer = DemoNamer::new(&base_in(&dir, "run"));

    let first = namer.next_free_name(None);
    assert_eq!(first, dir.join("run.lmp"));
    std::fs::write(&first, forward_demo(CompatibilityLevel::Mbf21, 1)).unwrap();

    let second = namer.next_free_name(None);
    assert_eq!(second, dir.join("run-00002.lmp"));
    std::fs::write(&second, forward_demo(CompatibilityLevel::Mbf21, 1)).unwrap();

    let third = namer.next_free_name(None);
    assert_eq!(third, dir.join("run-00003.lmp"));
    assert!(!third.exists());
}

#[test]
#[serial]
fn namer_accepts_the_extension_in_its_base() {
    let dir = scratch("extension");
    let mut namer = DemoNamer::new(&base_in(&dir, "speedrun.lmp"));
    assert_eq!(namer.next_free_name(None), dir.join("speedrun.lmp"));
}
