//! Locating the tick data of a whole demo file.

use super::extended::ExtendedHeader;
use super::header::{ParseOutcome, ParsedHeader, Strictness};
use crate::error::{DemoError, DemoResult};
use crate::DEMOMARKER;

/// The tick records of a demo file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRegion {
    /// Offset of the first tick record.
    pub start: usize,
    /// Offset of the demo marker, or the end of the file if there is none.
    pub end: usize,
    /// A demo marker terminates the records.
    pub has_marker: bool,
}

impl TickRegion {
    /// Bytes of tick data.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` if the demo holds no tick records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

fn dsda_marker(data: &[u8], parsed: &ParsedHeader) -> Option<usize> {
    match parsed.header.extended {
        Some(ExtendedHeader::Dsda { end_marker, .. }) if end_marker != 0 => {
            let at = end_marker as usize;
            (data.get(at) == Some(&DEMOMARKER)).then_some(at)
        }
        _ => None,
    }
}

/// Steps through whole records from the first tick until a record starts with
/// the marker byte. Returns where the stepping stopped.
fn stride_to_marker(data: &[u8], start: usize, bytes_per_tic: usize) -> usize {
    let mut p = start;
    while p < data.len() && data.get(p) != Some(&DEMOMARKER) {
        p += bytes_per_tic.max(1);
    }
    p
}

/// Offset of the demo marker: from the extended header when it records one,
/// otherwise by stepping through whole tick records.
#[must_use]
pub fn demo_marker_position(data: &[u8], parsed: &ParsedHeader) -> Option<usize> {
    if parsed.header.extended.is_some_and(|e| e.enables_extended_commands()) {
        return dsda_marker(data, parsed);
    }
    let p = stride_to_marker(data, parsed.data_offset, parsed.bytes_per_tic());
    (data.get(p) == Some(&DEMOMARKER)).then_some(p)
}

/// Game tics recorded in `data`.
///
/// Extended demos store the count in their header, since their records vary
/// in size. Other demos are measured up to the marker and divided by the
/// number of players.
#[must_use]
pub fn demo_tics_count(data: &[u8], parsed: &ParsedHeader) -> usize {
    if let Some(ExtendedHeader::Dsda { tics, .. }) = parsed.header.extended {
        return tics as usize;
    }
    let end = stride_to_marker(data, parsed.data_offset, parsed.bytes_per_tic()).min(data.len());
    let records = end.saturating_sub(parsed.data_offset) / parsed.bytes_per_tic().max(1);
    records / parsed.header.player_count().max(1)
}

/// Checks that the tick data holds a whole number of records.
///
/// A file without a marker is accepted when its tick data divides evenly;
/// playback then ends at the end of the file. Extended demos are accepted as
/// long as a recorded marker position checks out.
///
/// # Errors
///
/// [`DemoError::TruncatedTick`] under strict parsing when the last record is cut short.
pub fn tick_region(
    data: &[u8],
    parsed: &ParsedHeader,
    strictness: Strictness,
) -> DemoResult<ParseOutcome<TickRegion>> {
    let start = parsed.data_offset;
    if parsed.format.extended {
        let marker = dsda_marker(data, parsed);
        return Ok(ParseOutcome::Parsed(TickRegion {
            start,
            end: marker.unwrap_or(data.len()),
            has_marker: marker.is_some(),
        }));
    }

    let bytes_per_tic = parsed.bytes_per_tic();
    let p = stride_to_marker(data, start, bytes_per_tic);
    if data.get(p) == Some(&DEMOMARKER) {
        return Ok(ParseOutcome::Parsed(TickRegion {
            start,
            end: p,
            has_marker: true,
        }));
    }

    // A file ending in the marker the stride stepped over has a record cut
    // short somewhere before it.
    if data.len() > start && data.last() == Some(&DEMOMARKER) {
        let ticks_len = data.len() - 1 - start;
        let tail = ticks_len % bytes_per_tic;
        return misaligned(strictness, start + ticks_len - tail, bytes_per_tic, tail);
    }

    let tail = data.len().saturating_sub(start) % bytes_per_tic;
    if tail == 0 {
        return Ok(ParseOutcome::Parsed(TickRegion {
            start,
            end: data.len(),
            has_marker: false,
        }));
    }
    misaligned(strictness, data.len() - tail, bytes_per_tic, tail)
}

fn misaligned(
    strictness: Strictness,
    offset: usize,
    bytes_per_tic: usize,
    tail: usize,
) -> DemoResult<ParseOutcome<TickRegion>> {
    match strictness {
        Strictness::Strict => Err(DemoError::TruncatedTick {
            offset,
            needed: bytes_per_tic,
            available: tail,
        }),
        Strictness::Lenient => Ok(ParseOutcome::NotRecognized(format!(
            "tick data ends with a partial {tail}-byte record of {bytes_per_tic}"
        ))),
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
    use crate::demo::header::{parse_header, write_header, DemoHeader, HeaderContext};
    use crate::sessions::config::{DemoOverrides, Game};

    fn demo(level: CompatibilityLevel, overrides: &DemoOverrides, ticks: &[u8]) -> Vec<u8> {
        let header = DemoHeader::for_recording(level, Game::Doom, overrides);
        let mut out = ByteWriter::new();
        write_header(&header, Game::Doom, &mut out).unwrap();
        out.put_bytes(ticks);
        out.into_inner()
    }

    fn parsed(data: &[u8]) -> ParsedHeader {
        parse_header(data, &HeaderContext::default(), Strictness::Strict)
            .unwrap()
            .parsed()
            .unwrap()
    }

    #[test]
    fn counts_records_up_to_the_marker() {
        let mut ticks = vec![0x19, 0, 0, 0].repeat(3);
        ticks.push(DEMOMARKER);
        ticks.extend_from_slice(b"footer");
        let data = demo(CompatibilityLevel::Boom202, &DemoOverrides::default(), &ticks);
        let header = parsed(&data);
        assert_eq!(demo_tics_count(&data, &header), 3);
        assert_eq!(
            demo_marker_position(&data, &header),
            Some(header.data_offset + 12)
        );
        let region = tick_region(&data, &header, Strictness::Strict)
            .unwrap()
            .parsed()
            .unwrap();
        assert_eq!(region.len(), 12);
        assert!(region.has_marker);
    }

    #[test]
    fn marker_byte_inside_a_record_is_not_the_end() {
        // forward 0x80 is a legal (negative) movement byte
        let ticks = [0x10, DEMOMARKER, 0, 0, DEMOMARKER];
        let data = demo(CompatibilityLevel::Boom202, &DemoOverrides::default(), &ticks);
        let header = parsed(&data);
        assert_eq!(demo_tics_count(&data, &header), 1);
    }

    #[test]
    fn partial_record_without_marker() {
        let ticks = [1, 2, 3, 4, 5, 6];
        let data = demo(CompatibilityLevel::Boom202, &DemoOverrides::default(), &ticks);
        let header = parsed(&data);
        assert!(!tick_region(&data, &header, Strictness::Lenient)
            .unwrap()
            .is_parsed());
        assert!(matches!(
            tick_region(&data, &header, Strictness::Strict),
            Err(DemoError::TruncatedTick {
                needed: 4,
                available: 2,
                ..
            })
        ));
    }

    #[test]
    fn marker_after_a_partial_record_is_rejected() {
        // 3 records of 4 bytes with the last one short a byte
        let mut ticks = vec![0x19, 0, 0, 0].repeat(3);
        ticks.pop();
        ticks.push(DEMOMARKER);
        let data = demo(CompatibilityLevel::Boom202, &DemoOverrides::default(), &ticks);
        let header = parsed(&data);
        assert!(!tick_region(&data, &header, Strictness::Lenient)
            .unwrap()
            .is_parsed());
        assert!(matches!(
            tick_region(&data, &header, Strictness::Strict),
            Err(DemoError::TruncatedTick {
                needed: 4,
                available: 3,
                ..
            })
        ));
    }

    #[test]
    fn whole_records_without_marker_are_accepted() {
        let data = demo(CompatibilityLevel::Boom202, &DemoOverrides::default(), &[1; 8]);
        let header = parsed(&data);
        let region = tick_region(&data, &header, Strictness::Strict)
            .unwrap()
            .parsed()
            .unwrap();
        assert!(!region.has_marker);
        assert_eq!(region.end, data.len());
        assert_eq!(demo_marker_position(&data, &header), None);
    }

    #[test]
    fn extended_demos_use_the_header_counts() {
        let overrides = DemoOverrides {
            dsda_demo: true,
            ..DemoOverrides::default()
        };
        let mut data = demo(CompatibilityLevel::Mbf21, &overrides, &[0; 12]);
        let marker = data.len();
        data.push(DEMOMARKER);
        crate::codec::bytes::patch_u32_be(&mut data, 8, marker as u32).unwrap();
        crate::codec::bytes::patch_u32_be(&mut data, 12, 2).unwrap();
        let header = parsed(&data);
        assert_eq!(demo_tics_count(&data, &header), 2);
        assert_eq!(demo_marker_position(&data, &header), Some(marker));
    }
}
