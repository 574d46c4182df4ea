//! Reading tick records back out of a demo file.

use super::header::{parse_header, HeaderContext, ParseOutcome, ParsedHeader, Strictness};
use super::scan::{demo_tics_count, tick_region, TickRegion};
use super::stream::DemoByteStream;
use crate::codec::TickCodec;
use crate::error::DemoResult;
use crate::ticcmd::TickCommand;
use crate::DEMOMARKER;

/// A demo opened for playback.
#[derive(Debug, Clone)]
pub struct PlaybackStream {
    data: Vec<u8>,
    parsed: ParsedHeader,
    region: TickRegion,
    codec: TickCodec,
    pos: usize,
    records_read: usize,
}

impl PlaybackStream {
    /// Parses the header of `data` and checks that its tick data holds whole records.
    ///
    /// # Errors
    ///
    /// Header and tick-region errors; see [`parse_header`] and
    /// [`tick_region`](super::scan::tick_region).
    pub fn open(
        data: Vec<u8>,
        ctx: &HeaderContext,
        strictness: Strictness,
    ) -> DemoResult<ParseOutcome<Self>> {
        let parsed = match parse_header(&data, ctx, strictness)? {
            ParseOutcome::Parsed(parsed) => parsed,
            ParseOutcome::NotRecognized(reason) => return Ok(ParseOutcome::NotRecognized(reason)),
        };
        let region = match tick_region(&data, &parsed, strictness)? {
            ParseOutcome::Parsed(region) => region,
            ParseOutcome::NotRecognized(reason) => return Ok(ParseOutcome::NotRecognized(reason)),
        };
        tracing::info!(
            level = parsed.header.level.as_u8(),
            bytes_per_tic = parsed.bytes_per_tic(),
            tics = demo_tics_count(&data, &parsed),
            "demo playback attached"
        );
        Ok(ParseOutcome::Parsed(Self {
            codec: parsed.codec(),
            pos: region.start,
            records_read: 0,
            data,
            parsed,
            region,
        }))
    }

    /// The parsed header.
    #[must_use]
    pub const fn parsed(&self) -> &ParsedHeader {
        &self.parsed
    }

    /// The codec records are read with.
    #[must_use]
    pub const fn codec(&self) -> &TickCodec {
        &self.codec
    }

    /// Offset of the next record.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Records read so far (one per player per tick).
    #[must_use]
    pub const fn records_read(&self) -> usize {
        self.records_read
    }

    /// Game tics the demo holds.
    #[must_use]
    pub fn total_tics(&self) -> usize {
        demo_tics_count(&self.data, &self.parsed)
    }

    /// Returns `true` once the marker (or the end of the data) is reached.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.pos >= self.region.end || self.data.get(self.pos) == Some(&DEMOMARKER)
    }

    /// Reads the next record. `None` at the end of the demo.
    ///
    /// # Errors
    ///
    /// [`DemoError::TruncatedTick`](crate::DemoError::TruncatedTick) if the
    /// record is cut short.
    pub fn read_tick(&mut self) -> DemoResult<Option<TickCommand>> {
        if self.is_finished() {
            return Ok(None);
        }
        let region = self.data.get(..self.region.end).unwrap_or_default();
        let (cmd, used) = self.codec.decode_at(region, self.pos)?;
        self.pos += used;
        self.records_read += 1;
        Ok(Some(cmd))
    }

    /// Turns the playback into a recording that continues from the current
    /// position: the header and every record read so far are kept.
    ///
    /// # Errors
    ///
    /// [`DemoError::AllocationFailed`](crate::DemoError::AllocationFailed) if
    /// the recording buffer cannot be allocated.
    pub fn into_recording(self) -> DemoResult<DemoByteStream> {
        let mut stream = DemoByteStream::new(self.codec.clone())?;
        stream.write(self.data.get(..self.pos).unwrap_or_default())?;
        stream.set_extended_data_offset(self.parsed.extended_data_offset);
        let players = self.parsed.header.player_count().max(1);
        stream.set_tics((self.records_read / players) as u32);
        tracing::info!(offset = self.pos, tics = stream.tics(), "playback joined as recording");
        Ok(stream)
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
    use crate::codec::bytes::ByteWriter;
    use crate::compat::CompatibilityLevel;
    use crate::demo::header::{write_header, DemoHeader};
    use crate::error::DemoError;
    use crate::sessions::config::{DemoOverrides, Game};

    fn cmd(forward: i8, angle: i16) -> TickCommand {
        TickCommand {
            forward,
            angle_turn: angle,
            ..TickCommand::EMPTY
        }
    }

    fn demo(ticks: &[TickCommand], marker: bool) -> Vec<u8> {
        let header = DemoHeader::for_recording(
            CompatibilityLevel::PrBoom6,
            Game::Doom,
            &DemoOverrides::default(),
        );
        let mut out = ByteWriter::new();
        write_header(&header, Game::Doom, &mut out).unwrap();
        let parsed = parse_header(out.as_slice(), &HeaderContext::default(), Strictness::Strict)
            .unwrap()
            .parsed()
            .unwrap();
        let codec = parsed.codec();
        for tick in ticks {
            codec.encode(tick, &mut out);
        }
        if marker {
            out.put_u8(DEMOMARKER);
        }
        out.into_inner()
    }

    fn open(data: Vec<u8>) -> PlaybackStream {
        PlaybackStream::open(data, &HeaderContext::default(), Strictness::Strict)
            .unwrap()
            .parsed()
            .unwrap()
    }

    #[test]
    fn reads_until_the_marker() {
        let ticks = [cmd(25, 300), cmd(-25, -300), cmd(50, 0)];
        let mut playback = open(demo(&ticks, true));
        assert_eq!(playback.total_tics(), 3);
        for expected in ticks {
            assert_eq!(playback.read_tick().unwrap(), Some(expected));
        }
        assert_eq!(playback.read_tick().unwrap(), None);
        assert!(playback.is_finished());
    }

    #[test]
    fn reads_until_the_end_without_marker() {
        let mut playback = open(demo(&[cmd(1, 1)], false));
        assert!(playback.read_tick().unwrap().is_some());
        assert_eq!(playback.read_tick().unwrap(), None);
    }

    #[test]
    fn partial_record_is_refused_up_front() {
        let mut data = demo(&[cmd(1, 1)], false);
        data.push(7);
        let outcome =
            PlaybackStream::open(data.clone(), &HeaderContext::default(), Strictness::Lenient)
                .unwrap();
        assert!(!outcome.is_parsed());
        let err = PlaybackStream::open(data, &HeaderContext::default(), Strictness::Strict)
            .unwrap_err();
        assert!(matches!(err, DemoError::TruncatedTick { .. }));
    }

    #[test]
    fn joining_keeps_what_was_played() {
        let ticks = [cmd(1, 0), cmd(2, 0), cmd(3, 0)];
        let mut playback = open(demo(&ticks, true));
        playback.read_tick().unwrap();
        playback.read_tick().unwrap();
        let position = playback.position();
        let stream = playback.into_recording().unwrap();
        assert_eq!(stream.cursor(), position);
        assert_eq!(stream.tics(), 2);
    }
}
