//! Demo files: the header negotiator, the recording buffer and playback.

pub mod extended;
pub mod header;
pub mod naming;
pub mod options;
pub mod playback;
pub mod scan;
pub mod stream;
