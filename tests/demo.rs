//! Demo format integration tests.
//!
//! This module contains end-to-end tests of the demo file format:
//! - Record, serialize and replay scenarios
//! - Header families written by one session and read by another
//! - Corrupt and foreign demos under both strictness modes
//! - Demo files on disk: playback from a path and free-name generation

// Shared test infrastructure
#[path = "common/mod.rs"]
mod common;

// Demo test modules
mod demo {
    pub mod corrupt;
    pub mod files;
    pub mod headers;
    pub mod scenarios;
}
