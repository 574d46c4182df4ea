//! Demo Byte-Stream Engine: the buffer a recording is written into.
//!
//! The buffer holds the header followed by one record per player per tick.
//! Its write cursor only moves forward by appending; [`DemoByteStream::set_cursor`]
//! rewinds it (for key frames and save games) and refuses to move it forward.
//! Bytes past a rewound cursor stay in the buffer up to the
//! [largest real offset](DemoByteStream::largest_real_offset) so that
//! [`DemoByteStream::copy_pending`] can replay what was recorded there before.

use std::path::Path;

use crate::codec::bytes::{patch_u32_be, ByteReader, ByteWriter};
use crate::codec::TickCodec;
use crate::demo::extended::DSDA_HEADER_DATA_SIZE;
use crate::demo::header::DemoHeader;
use crate::error::{DemoError, DemoResult};
use crate::sessions::config::Game;
use crate::telemetry::{InvariantChecker, InvariantViolation};
use crate::ticcmd::TickCommand;
use crate::{debug_check_invariants, DEMOMARKER};

/// Bytes allocated when a recording starts. Doubled whenever a write would not fit.
pub const INITIAL_DEMO_BUFFER_SIZE: usize = 0x20000;

/// Bytes [`DemoByteStream::store`] writes before the optional buffer copy.
pub const STORED_STATE_SIZE: usize = 8;

/// The live recording buffer.
#[derive(Debug, Clone)]
pub struct DemoByteStream {
    buffer: Vec<u8>,
    allocated: usize,
    offset: usize,
    largest_real_offset: usize,
    tics: u32,
    codec: TickCodec,
    extended_data_offset: Option<usize>,
    footer: Vec<u8>,
}

impl DemoByteStream {
    /// Allocates an empty stream for records in `codec`'s layout.
    ///
    /// # Errors
    ///
    /// [`DemoError::AllocationFailed`] if the initial buffer cannot be allocated.
    pub fn new(codec: TickCodec) -> DemoResult<Self> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(INITIAL_DEMO_BUFFER_SIZE)
            .map_err(|err| {
                tracing::error!(error = %err, "unable to initialize demo buffer");
                DemoError::AllocationFailed {
                    requested: INITIAL_DEMO_BUFFER_SIZE,
                }
            })?;
        Ok(Self {
            buffer,
            allocated: INITIAL_DEMO_BUFFER_SIZE,
            offset: 0,
            largest_real_offset: 0,
            tics: 0,
            codec,
            extended_data_offset: None,
            footer: Vec::new(),
        })
    }

    /// Writes `header` at the cursor and remembers where its DSDA trailer is.
    ///
    /// # Errors
    ///
    /// Propagates header writer and allocation errors.
    pub fn write_header(&mut self, header: &DemoHeader, game: Game) -> DemoResult<()> {
        let mut out = ByteWriter::new();
        let trailer = super::header::write_header(header, game, &mut out)?;
        let start = self.offset;
        self.write(out.as_slice())?;
        self.extended_data_offset = trailer.map(|t| start + t);
        tracing::info!(
            level = header.level.as_u8(),
            bytes_per_tic = self.codec.bytes_per_tic(),
            offset = self.offset,
            "demo recording started"
        );
        Ok(())
    }

    fn ensure_space(&mut self, length: usize) -> DemoResult<()> {
        let required = self
            .offset
            .checked_add(length)
            .ok_or(DemoError::AllocationFailed {
                requested: usize::MAX,
            })?;
        if required <= self.allocated {
            return Ok(());
        }
        let mut allocated = self.allocated.max(1);
        while allocated < required {
            allocated = allocated
                .checked_mul(2)
                .ok_or(DemoError::AllocationFailed {
                    requested: required,
                })?;
        }
        self.buffer
            .try_reserve_exact(allocated - self.buffer.len())
            .map_err(|err| {
                tracing::error!(error = %err, requested = allocated, "demo buffer out of memory");
                DemoError::AllocationFailed {
                    requested: allocated,
                }
            })?;
        self.allocated = allocated;
        tracing::info!(size = allocated, "expanding demo buffer");
        Ok(())
    }

    /// Appends `bytes` at the cursor, overwriting anything a rewind left behind.
    ///
    /// # Errors
    ///
    /// [`DemoError::AllocationFailed`] if the buffer cannot grow.
    pub fn write(&mut self, bytes: &[u8]) -> DemoResult<()> {
        self.ensure_space(bytes.len())?;
        let end = self.offset + bytes.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        if let Some(dest) = self.buffer.get_mut(self.offset..end) {
            dest.copy_from_slice(bytes);
        }
        self.offset = end;
        debug_check_invariants!(self, "after write");
        Ok(())
    }

    /// Appends one tick record and counts the tick.
    ///
    /// # Errors
    ///
    /// [`DemoError::AllocationFailed`] if the buffer cannot grow.
    pub fn write_tick(&mut self, bytes: &[u8]) -> DemoResult<()> {
        self.write(bytes)?;
        self.tics = self.tics.wrapping_add(1);
        Ok(())
    }

    /// Encodes `cmd` with the stream's codec and appends it as a tick record.
    /// Returns the command as the record stores it, which is what a replay
    /// will run.
    ///
    /// # Errors
    ///
    /// [`DemoError::AllocationFailed`] if the buffer cannot grow.
    pub fn record(&mut self, cmd: &TickCommand) -> DemoResult<TickCommand> {
        let bytes = self.codec.encode_to_vec(cmd);
        self.write_tick(&bytes)?;
        let stored = self.codec.decode(&mut ByteReader::new(&bytes));
        Ok(stored.unwrap_or(*cmd))
    }

    /// Moves the cursor back to `offset`.
    ///
    /// # Errors
    ///
    /// [`DemoError::CursorForward`] if `offset` lies past the cursor.
    pub fn set_cursor(&mut self, offset: usize) -> DemoResult<()> {
        if offset > self.offset {
            return Err(DemoError::CursorForward {
                requested: offset,
                current: self.offset,
            });
        }
        self.largest_real_offset = self.largest_real_offset.max(self.offset);
        self.offset = offset;
        debug_check_invariants!(self, "after set_cursor");
        Ok(())
    }

    /// The write cursor.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.offset
    }

    /// Highest cursor position the stream has been rewound from.
    #[inline]
    #[must_use]
    pub const fn largest_real_offset(&self) -> usize {
        self.largest_real_offset
    }

    /// Ticks written so far (or restored from a save).
    #[inline]
    #[must_use]
    pub const fn tics(&self) -> u32 {
        self.tics
    }

    /// Bytes currently allocated for the buffer.
    #[inline]
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }

    /// The codec tick records are written with.
    #[inline]
    #[must_use]
    pub const fn codec(&self) -> &TickCodec {
        &self.codec
    }

    /// Minimum size of one tick record.
    #[must_use]
    pub fn bytes_per_tic(&self) -> usize {
        self.codec.bytes_per_tic()
    }

    /// Everything written up to the cursor.
    #[must_use]
    pub fn recorded(&self) -> &[u8] {
        self.buffer.get(..self.offset).unwrap_or_default()
    }

    /// Sets the bytes appended after the demo marker on export.
    pub fn set_footer(&mut self, footer: Vec<u8>) {
        self.footer = footer;
    }

    pub(crate) fn set_extended_data_offset(&mut self, offset: Option<usize>) {
        self.extended_data_offset = offset;
    }

    pub(crate) fn set_tics(&mut self, tics: u32) {
        self.tics = tics;
    }

    /// The command that was recorded at the cursor before the stream was
    /// rewound there, or an empty command if nothing real lies ahead.
    ///
    /// # Errors
    ///
    /// [`DemoError::TruncatedTick`] if previously recorded data does not hold a
    /// whole record.
    pub fn copy_pending(&self) -> DemoResult<TickCommand> {
        if self.largest_real_offset.saturating_sub(self.offset) < self.bytes_per_tic() {
            return Ok(TickCommand::EMPTY);
        }
        let real = self
            .buffer
            .get(..self.largest_real_offset)
            .unwrap_or_default();
        self.codec.decode_at(real, self.offset).map(|(cmd, _)| cmd)
    }

    /// The last `count` commands before the cursor, oldest first, limited to
    /// the `logictic` ticks that have run.
    ///
    /// # Errors
    ///
    /// [`DemoError::TruncatedTick`] if the recorded data does not hold whole records.
    pub fn command_history(&self, count: usize, logictic: usize) -> DemoResult<Vec<TickCommand>> {
        let count = count.min(logictic);
        let span = self.bytes_per_tic() * count;
        let mut pos = self.offset.saturating_sub(span);
        let data = self.recorded();
        let mut history = Vec::with_capacity(count);
        while pos < self.offset {
            let (cmd, used) = self.codec.decode_at(data, pos)?;
            history.push(cmd);
            pos += used;
        }
        Ok(history)
    }

    /// The demo file as it would be written now: records up to the cursor, the
    /// marker, then the footer. The DSDA trailer (if any) is patched with the
    /// marker position and tick count.
    ///
    /// The stream itself is not modified; recording can continue afterwards.
    #[must_use]
    pub fn export(&self) -> Vec<u8> {
        let end_marker = self.offset;
        let mut file = Vec::with_capacity(end_marker + 1 + self.footer.len());
        file.extend_from_slice(self.recorded());
        file.push(DEMOMARKER);
        if let Some(at) = self.extended_data_offset {
            let patched = patch_u32_be(&mut file, at, end_marker as u32)
                .and_then(|()| patch_u32_be(&mut file, at + DSDA_HEADER_DATA_SIZE / 2, self.tics));
            if patched.is_none() {
                tracing::warn!(offset = at, "extended header trailer lies outside the demo");
            }
        }
        file.extend_from_slice(&self.footer);
        file
    }

    /// Writes [`export`](Self::export) to `path`. Returns the marker position.
    ///
    /// # Errors
    ///
    /// [`DemoError::Io`] if the file cannot be written.
    pub fn export_to_file(&self, path: &Path) -> DemoResult<usize> {
        std::fs::write(path, self.export())
            .map_err(|err| DemoError::io(path.display().to_string(), &err))?;
        tracing::info!(path = %path.display(), offset = self.offset, tics = self.tics, "demo exported");
        Ok(self.offset)
    }

    /// Ends the recording, returning the finished file and freeing the buffer.
    #[must_use]
    pub fn finalize(self) -> Vec<u8> {
        let file = self.export();
        tracing::info!(tics = self.tics, bytes = file.len(), "demo finished recording");
        file
    }

    /// Bytes [`store`](Self::store) writes.
    #[must_use]
    pub const fn data_size(&self, complete: bool) -> usize {
        STORED_STATE_SIZE + if complete { self.offset } else { 0 }
    }

    /// Writes the cursor and tick count (and with `complete`, the recorded
    /// bytes) for a save game.
    pub fn store(&self, out: &mut ByteWriter, complete: bool) {
        out.put_u32_le(self.offset as u32).put_u32_le(self.tics);
        if complete {
            out.put_bytes(self.recorded());
        }
    }

    /// Restores what [`store`](Self::store) wrote.
    ///
    /// A complete save replaces the recorded bytes; otherwise the cursor is
    /// rewound to the stored position.
    ///
    /// # Errors
    ///
    /// - [`DemoError::HeaderOverrun`] if the stored data is cut short.
    /// - [`DemoError::CursorForward`] if an offset-only save lies ahead of the cursor.
    pub fn restore(&mut self, r: &mut ByteReader<'_>, complete: bool) -> DemoResult<()> {
        let start = r.position();
        let size = r.len();
        let overrun = |needed: usize| DemoError::HeaderOverrun {
            position: start,
            needed,
            size,
        };
        let (Some(offset), Some(tics)) = (r.read_u32_le(), r.read_u32_le()) else {
            return Err(overrun(STORED_STATE_SIZE));
        };
        let offset = offset as usize;
        self.tics = tics;
        if complete && offset > 0 {
            let Some(bytes) = r.read_bytes(offset) else {
                return Err(overrun(STORED_STATE_SIZE + offset));
            };
            self.set_cursor(0)?;
            self.write(bytes)
        } else {
            self.set_cursor(offset)
        }
    }
}

impl InvariantChecker for DemoByteStream {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.offset > self.buffer.len() {
            return Err(
                InvariantViolation::new("DemoByteStream", "cursor past the written data")
                    .with_details(format!("cursor={}, len={}", self.offset, self.buffer.len())),
            );
        }
        if self.largest_real_offset > self.buffer.len() {
            return Err(InvariantViolation::new(
                "DemoByteStream",
                "largest real offset past the written data",
            )
            .with_details(format!(
                "largest_real_offset={}, len={}",
                self.largest_real_offset,
                self.buffer.len()
            )));
        }
        if self.buffer.len() > self.allocated {
            return Err(InvariantViolation::new(
                "DemoByteStream",
                "written data exceeds the allocation",
            )
            .with_details(format!(
                "len={}, allocated={}",
                self.buffer.len(),
                self.allocated
            )));
        }
        Ok(())
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
    use crate::codec::{Era, TicFormat};
    use crate::compat::CompatibilityLevel;
    use crate::demo::extended::DSDA_HEADER_START_SIZE;
    use crate::sessions::config::DemoOverrides;
    use crate::test_config::miri_case_count;
    use proptest::prelude::*;

    fn stream() -> DemoByteStream {
        DemoByteStream::new(TickCodec::new(Era::Boom, TicFormat::default())).unwrap()
    }

    fn forward(n: i8) -> TickCommand {
        TickCommand {
            forward: n,
            ..TickCommand::EMPTY
        }
    }

    // ===== Cursor =====

    #[test]
    fn record_returns_the_command_as_stored() {
        let mut s = stream();
        let stored = s
            .record(&TickCommand {
                angle_turn: 0x0177,
                look_fly: 9,
                ..forward(25)
            })
            .unwrap();
        // short tics keep only the rounded high angle byte and no look byte
        assert_eq!(stored.angle_turn, 0x0100);
        assert_eq!(stored.look_fly, 0);
        assert_eq!(stored.forward, 25);
        let (replayed, _) = s.codec().decode_at(s.recorded(), 0).unwrap();
        assert_eq!(replayed, stored);
    }

    #[test]
    fn writes_advance_the_cursor() {
        let mut s = stream();
        s.write(&[1, 2, 3]).unwrap();
        s.write_tick(&[4, 5, 6, 7]).unwrap();
        assert_eq!(s.cursor(), 7);
        assert_eq!(s.tics(), 1);
        assert_eq!(s.recorded(), &[1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn cursor_cannot_travel_forward() {
        let mut s = stream();
        s.write(&[0; 80]).unwrap();
        s.set_cursor(10).unwrap();
        let err = s.set_cursor(50).unwrap_err();
        assert_eq!(
            err,
            DemoError::CursorForward {
                requested: 50,
                current: 10
            }
        );
        assert!(err.is_fatal());
        assert_eq!(s.cursor(), 10);
        assert_eq!(s.largest_real_offset(), 80);
    }

    #[test]
    fn buffer_doubles_when_full() {
        let mut s = stream();
        s.write(&vec![7; INITIAL_DEMO_BUFFER_SIZE]).unwrap();
        assert_eq!(s.allocated(), INITIAL_DEMO_BUFFER_SIZE);
        s.write(&[1]).unwrap();
        assert_eq!(s.allocated(), INITIAL_DEMO_BUFFER_SIZE * 2);
        s.write(&vec![0; INITIAL_DEMO_BUFFER_SIZE * 3]).unwrap();
        assert_eq!(s.allocated(), INITIAL_DEMO_BUFFER_SIZE * 8);
        assert!(s.check_invariants().is_ok());
    }

    // ===== Pending commands =====

    #[test]
    fn copy_pending_replays_rewound_data() {
        let mut s = stream();
        for n in 1..=4 {
            s.record(&forward(n)).unwrap();
        }
        assert_eq!(s.copy_pending().unwrap(), TickCommand::EMPTY);
        s.set_cursor(4).unwrap();
        assert_eq!(s.copy_pending().unwrap(), forward(2));
        s.record(&forward(9)).unwrap();
        assert_eq!(s.copy_pending().unwrap(), forward(3));
        s.set_cursor(0).unwrap();
        assert_eq!(s.copy_pending().unwrap(), forward(1));
    }

    #[test]
    fn command_history_is_bounded_by_logictic() {
        let mut s = stream();
        for n in 1..=5 {
            s.record(&forward(n)).unwrap();
        }
        let history = s.command_history(3, 10).unwrap();
        assert_eq!(history, vec![forward(3), forward(4), forward(5)]);
        assert_eq!(s.command_history(3, 1).unwrap(), vec![forward(5)]);
        assert!(s.command_history(3, 0).unwrap().is_empty());
    }

    // ===== Export =====

    #[test]
    fn export_does_not_move_the_cursor() {
        let mut s = stream();
        s.record(&forward(1)).unwrap();
        s.set_footer(b"-iwad doom2.wad".to_vec());
        let file = s.export();
        assert_eq!(file[4], DEMOMARKER);
        assert_eq!(&file[5..], b"-iwad doom2.wad");
        assert_eq!(s.cursor(), 4);
        s.record(&forward(2)).unwrap();
        assert_eq!(s.export().len(), file.len() + 4);
    }

    #[test]
    fn export_patches_the_dsda_trailer() {
        let overrides = DemoOverrides {
            dsda_demo: true,
            ..DemoOverrides::default()
        };
        let header = DemoHeader::for_recording(CompatibilityLevel::Mbf21, Game::Doom, &overrides);
        let codec = TickCodec::new(
            Era::Mbf21,
            TicFormat {
                longtics: true,
                raven: false,
                extended: true,
            },
        );
        let mut s = DemoByteStream::new(codec).unwrap();
        s.write_header(&header, Game::Doom).unwrap();
        s.record(&forward(1)).unwrap();
        s.record(&forward(2)).unwrap();
        let file = s.finalize();
        let marker = file.len() - 1;
        let at = DSDA_HEADER_START_SIZE;
        assert_eq!(
            u32::from_be_bytes(file[at..at + 4].try_into().unwrap()) as usize,
            marker
        );
        assert_eq!(u32::from_be_bytes(file[at + 4..at + 8].try_into().unwrap()), 2);
    }

    #[test]
    fn export_to_file_writes_the_demo() {
        let dir = std::env::temp_dir().join(format!("tick-demo-stream-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("export.lmp");
        let mut s = stream();
        s.record(&forward(3)).unwrap();
        assert_eq!(s.export_to_file(&path).unwrap(), 4);
        assert_eq!(std::fs::read(&path).unwrap(), s.export());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    // ===== Save-state interop =====

    #[test]
    fn store_and_restore_complete() {
        let mut s = stream();
        s.write(&[9; 10]).unwrap();
        s.record(&forward(1)).unwrap();
        let mut out = ByteWriter::new();
        s.store(&mut out, true);
        assert_eq!(out.len(), s.data_size(true));

        let mut restored = stream();
        restored
            .restore(&mut ByteReader::new(out.as_slice()), true)
            .unwrap();
        assert_eq!(restored.recorded(), s.recorded());
        assert_eq!(restored.tics(), 1);
    }

    #[test]
    fn store_and_restore_offset_only() {
        let mut s = stream();
        s.write(&[0; 20]).unwrap();
        let mut out = ByteWriter::new();
        s.set_cursor(12).unwrap();
        s.store(&mut out, false);
        assert_eq!(out.len(), STORED_STATE_SIZE);
        s.write(&[1; 8]).unwrap();

        s.restore(&mut ByteReader::new(out.as_slice()), false).unwrap();
        assert_eq!(s.cursor(), 12);

        let mut fresh = stream();
        let err = fresh
            .restore(&mut ByteReader::new(out.as_slice()), false)
            .unwrap_err();
        assert!(matches!(err, DemoError::CursorForward { .. }));
    }

    #[test]
    fn restore_from_short_data() {
        let mut s = stream();
        let err = s.restore(&mut ByteReader::new(&[1, 0, 0]), false).unwrap_err();
        assert!(matches!(err, DemoError::HeaderOverrun { .. }));
    }

    // ===== Properties =====

    #[derive(Debug, Clone)]
    enum Op {
        Write(usize),
        Tick,
        Rewind(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..40).prop_map(Op::Write),
            Just(Op::Tick),
            (0usize..200).prop_map(Op::Rewind),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(miri_case_count()))]

        #[test]
        fn cursor_never_travels_forward(ops in proptest::collection::vec(op_strategy(), 1..60)) {
            let mut s = stream();
            for op in ops {
                let before = s.cursor();
                match op {
                    Op::Write(n) => {
                        s.write(&vec![0; n]).unwrap();
                        prop_assert_eq!(s.cursor(), before + n);
                    }
                    Op::Tick => {
                        s.record(&TickCommand::EMPTY).unwrap();
                        prop_assert!(s.cursor() > before);
                    }
                    Op::Rewind(to) => {
                        let result = s.set_cursor(to);
                        prop_assert_eq!(result.is_ok(), to <= before);
                        prop_assert!(s.cursor() <= before);
                    }
                }
                prop_assert!(s.check_invariants().is_ok());
            }
        }
    }
}
