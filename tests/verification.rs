//! Property and invariant tests.
//!
//! - Properties: random commands, rewinds and byte soup thrown at the codec,
//!   the byte stream and the header parser
//! - Invariants: [`InvariantChecker`](tick_demo::telemetry::InvariantChecker)
//!   implementations held across operation sequences

#[path = "common/mod.rs"]
mod common;

mod verification {
    pub mod invariants;
    pub mod properties;
}
