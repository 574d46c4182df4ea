//! Rewind key frames.
//!
//! A key frame pairs the recording position (what [`DemoByteStream::store`]
//! writes) with an opaque snapshot of the simulation. Frames live in a fixed
//! ring; capturing into a full ring drops the oldest. Restoring a frame rewinds
//! the recording through [`DemoByteStream::set_cursor`], so the recording can
//! never be moved ahead of what was actually recorded.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::codec::bytes::{ByteReader, ByteWriter};
use crate::codec::snapshot;
use crate::demo::stream::DemoByteStream;
use crate::error::{DemoError, DemoResult};
use crate::Tic;

/// Key frames kept by default.
pub const DEFAULT_KEY_FRAME_CAPACITY: usize = 10;

/// Default automatic key frame interval: one per minute of game time.
pub const DEFAULT_KEY_FRAME_INTERVAL: i32 = 60 * crate::TICRATE;

/// One rewind point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFrame {
    /// The game tic the frame was captured at.
    pub tic: Tic,
    /// Recording position, as written by [`DemoByteStream::store`]; empty
    /// when nothing was being recorded.
    pub demo: Vec<u8>,
    /// Simulation snapshot.
    pub state: Vec<u8>,
}

impl KeyFrame {
    /// Captures a frame. The recording position is stored offset-only.
    #[must_use]
    pub fn capture(tic: Tic, stream: Option<&DemoByteStream>, state: Vec<u8>) -> Self {
        let mut demo = ByteWriter::new();
        if let Some(stream) = stream {
            stream.store(&mut demo, false);
        }
        Self {
            tic,
            demo: demo.into_inner(),
            state,
        }
    }

    /// Serializes the frame for storage outside the process.
    ///
    /// # Errors
    ///
    /// [`DemoError::Serialization`] if encoding fails.
    pub fn to_bytes(&self) -> DemoResult<Vec<u8>> {
        Ok(snapshot::encode(self)?)
    }

    /// Reads a frame written by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// [`DemoError::Serialization`] for malformed or trailing data.
    pub fn from_bytes(bytes: &[u8]) -> DemoResult<Self> {
        Ok(snapshot::decode_exact(bytes)?)
    }

    /// Rewinds `stream` to this frame's recording position.
    ///
    /// # Errors
    ///
    /// - [`DemoError::InvalidRequest`] if the frame was captured without a
    ///   recording but one is live now.
    /// - [`DemoError::CursorForward`] if the frame lies ahead of the cursor.
    pub fn rewind(&self, stream: &mut DemoByteStream) -> DemoResult<()> {
        if self.demo.is_empty() {
            return Err(DemoError::InvalidRequest {
                info: format!("key frame at tic {} holds no recording position", self.tic),
            });
        }
        let mut reader = ByteReader::new(&self.demo);
        stream.restore(&mut reader, false)
    }
}

/// A ring of key frames with an automatic capture interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFrames {
    frames: VecDeque<KeyFrame>,
    capacity: usize,
    interval: i32,
}

impl Default for KeyFrames {
    fn default() -> Self {
        Self {
            frames: VecDeque::with_capacity(DEFAULT_KEY_FRAME_CAPACITY),
            capacity: DEFAULT_KEY_FRAME_CAPACITY,
            interval: DEFAULT_KEY_FRAME_INTERVAL,
        }
    }
}

impl KeyFrames {
    /// Creates a ring holding `capacity` frames, captured automatically every
    /// `interval` tics (0 disables automatic capture).
    ///
    /// # Errors
    ///
    /// [`DemoError::InvalidRequest`] if `capacity` is 0 or `interval` negative.
    pub fn new(capacity: usize, interval: i32) -> DemoResult<Self> {
        if capacity == 0 {
            return Err(DemoError::InvalidRequest {
                info: "key frame capacity must be at least 1".to_owned(),
            });
        }
        if interval < 0 {
            return Err(DemoError::InvalidRequest {
                info: format!("key frame interval {} is negative", interval),
            });
        }
        Ok(Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            interval,
        })
    }

    /// Frames held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` when no frame is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns `true` if an automatic frame is due at `tic`.
    #[must_use]
    pub fn is_due(&self, tic: Tic) -> bool {
        self.interval > 0 && tic.as_i32() > 0 && tic % self.interval == 0
    }

    /// Adds `frame`, dropping the oldest if the ring is full.
    pub fn push(&mut self, frame: KeyFrame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        tracing::debug!(tic = frame.tic.as_i32(), held = self.frames.len() + 1, "key frame stored");
        self.frames.push_back(frame);
    }

    /// The newest frame.
    #[must_use]
    pub fn latest(&self) -> Option<&KeyFrame> {
        self.frames.back()
    }

    /// The frame `back` steps before the newest (0 is the newest).
    #[must_use]
    pub fn nth_back(&self, back: usize) -> Option<&KeyFrame> {
        let index = self.frames.len().checked_sub(back + 1)?;
        self.frames.get(index)
    }

    /// Drops every frame newer than the one `back` steps before the newest
    /// and returns that frame. Restoring an older frame forgets the newer ones.
    pub fn rewind_to(&mut self, back: usize) -> Option<&KeyFrame> {
        let keep = self.frames.len().checked_sub(back)?;
        if keep == 0 {
            return None;
        }
        self.frames.truncate(keep);
        self.frames.back()
    }

    /// Forgets every frame.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::codec::{Era, TicFormat, TickCodec};
    use crate::ticcmd::TickCommand;

    fn frame(tic: i32) -> KeyFrame {
        KeyFrame::capture(Tic::new(tic), None, vec![tic as u8])
    }

    fn stream_with(ticks: i8) -> DemoByteStream {
        let mut stream = DemoByteStream::new(TickCodec::new(Era::Mbf, TicFormat::default())).unwrap();
        for n in 0..ticks {
            stream
                .record(&TickCommand {
                    forward: n,
                    ..TickCommand::EMPTY
                })
                .unwrap();
        }
        stream
    }

    #[test]
    fn ring_drops_the_oldest() {
        let mut frames = KeyFrames::new(2, 0).unwrap();
        frames.push(frame(1));
        frames.push(frame(2));
        frames.push(frame(3));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames.nth_back(1).unwrap().tic, Tic::new(2));
        assert_eq!(frames.latest().unwrap().tic, Tic::new(3));
        assert!(frames.nth_back(2).is_none());
    }

    #[test]
    fn rewinding_forgets_newer_frames() {
        let mut frames = KeyFrames::default();
        for tic in 1..=4 {
            frames.push(frame(tic));
        }
        assert_eq!(frames.rewind_to(2).unwrap().tic, Tic::new(2));
        assert_eq!(frames.len(), 2);
        assert!(frames.rewind_to(2).is_none());
    }

    #[test]
    fn automatic_interval() {
        let frames = KeyFrames::new(1, 35).unwrap();
        assert!(!frames.is_due(Tic::new(0)));
        assert!(!frames.is_due(Tic::new(34)));
        assert!(frames.is_due(Tic::new(70)));
        assert!(!KeyFrames::new(1, 0).unwrap().is_due(Tic::new(35)));
    }

    #[test]
    fn invalid_rings_are_refused() {
        assert!(KeyFrames::new(0, 35).is_err());
        assert!(KeyFrames::new(1, -1).is_err());
    }

    #[test]
    fn restore_rewinds_the_recording() {
        let mut stream = stream_with(3);
        let saved = KeyFrame::capture(Tic::new(3), Some(&stream), Vec::new());
        let cursor = stream.cursor();
        stream.record(&TickCommand::EMPTY).unwrap();
        saved.rewind(&mut stream).unwrap();
        assert_eq!(stream.cursor(), cursor);
        assert_eq!(stream.tics(), 3);
        assert_eq!(stream.largest_real_offset(), cursor + stream.bytes_per_tic());
    }

    #[test]
    fn frame_ahead_of_the_cursor_is_refused() {
        let mut stream = stream_with(3);
        let ahead = KeyFrame::capture(Tic::new(3), Some(&stream), Vec::new());
        stream.set_cursor(0).unwrap();
        assert!(matches!(
            ahead.rewind(&mut stream),
            Err(DemoError::CursorForward { .. })
        ));
    }

    #[test]
    fn frame_without_recording_cannot_rewind() {
        let mut stream = stream_with(1);
        assert!(frame(1).rewind(&mut stream).is_err());
    }

    #[test]
    fn frames_survive_serialization() {
        let stream = stream_with(2);
        let original = KeyFrame::capture(Tic::new(2), Some(&stream), vec![1, 2, 3]);
        let bytes = original.to_bytes().unwrap();
        assert_eq!(KeyFrame::from_bytes(&bytes).unwrap(), original);
        assert!(KeyFrame::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
