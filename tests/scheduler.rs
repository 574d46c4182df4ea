//! Scheduler integration tests.
//!
//! This module drives [`GameTicker`](tick_demo::GameTicker) against a stub
//! simulation:
//! - Recording live input and replaying it tick for tick
//! - Save games written and loaded through game actions
//! - The title-screen demo cycle and timedemo reporting

// Shared test infrastructure
#[path = "common/mod.rs"]
mod common;

// Scheduler test modules
mod scheduler {
    pub mod demo_cycle;
    pub mod save_interop;
    pub mod ticking;
}
