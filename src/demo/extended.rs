//! The 255 "extended header" escape that may precede a regular demo header.
//!
//! Two layouts are understood:
//!
//! - DSDA: `0x1d "DSDA" 0xe6`, a format version, then big-endian end-marker
//!   offset and tic count (patched when the demo is exported).
//! - "PR+UM": a defunct UMAPINFO block that is recognized and skipped.
//!
//! Anything else is foreign and yields [`ParseOutcome::NotRecognized`].

use super::header::{ParseOutcome, Strictness};
use crate::codec::bytes::{ByteReader, ByteWriter};
use crate::error::{DemoError, DemoResult};

/// Version byte announcing an extended header.
pub const EXTENDED_VERSION: u8 = 255;

/// Newest DSDA header version this crate reads and writes.
pub const DSDA_DEMO_VERSION: u8 = 1;

/// `0x1d "DSDA" 0xe6`
pub const DSDA_SIGNATURE: [u8; 6] = [0x1d, b'D', b'S', b'D', b'A', 0xe6];

/// Bytes from the start of the file to the DSDA trailer data:
/// version byte, signature and DSDA version.
pub const DSDA_HEADER_START_SIZE: usize = 8;

/// Size of the DSDA trailer data (end-marker offset and tic count).
pub const DSDA_HEADER_DATA_SIZE: usize = 8;

const UMAPINFO_SIGNATURE: &[u8; 5] = b"PR+UM";
const UMAPINFO_NAME: &[u8; 8] = b"UMAPINFO";

/// A successfully stripped extended header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedHeader {
    /// DSDA header.
    Dsda {
        /// Format version.
        version: u8,
        /// Offset of the demo marker byte, or 0 if never exported.
        end_marker: u32,
        /// Recorded tic count, or 0 if never exported.
        tics: u32,
    },
    /// Defunct UMAPINFO block.
    Umapinfo {
        /// The stored (unused) map lump name.
        map_lump: [u8; 8],
    },
}

impl ExtendedHeader {
    /// DSDA headers switch on the extended-command block.
    #[must_use]
    pub const fn enables_extended_commands(&self) -> bool {
        matches!(self, ExtendedHeader::Dsda { .. })
    }
}

fn malformed<T>(reason: &str) -> DemoResult<T> {
    Err(DemoError::MalformedExtendedHeader {
        reason: reason.to_owned(),
    })
}

/// Reads the extended header that starts right after the 255 version byte at
/// `start - 1`.
///
/// On success returns the header and the offset of the regular version byte
/// that follows it. A foreign signature yields `NotRecognized` (escalated to an
/// error under [`Strictness::Strict`]); a recognized signature with
/// incompatible contents is always fatal.
///
/// # Errors
///
/// - [`DemoError::MalformedExtendedHeader`] for a recognized but unusable block.
/// - [`DemoError::HeaderOverrun`] / [`DemoError::NotRecognized`] under strict parsing.
pub fn strip_version_255(
    data: &[u8],
    start: usize,
    strictness: Strictness,
) -> DemoResult<ParseOutcome<(ExtendedHeader, usize)>> {
    let rest = data.get(start..).unwrap_or_default();

    if rest.starts_with(&DSDA_SIGNATURE) {
        return read_dsda(data, start, strictness);
    }
    if rest.starts_with(UMAPINFO_SIGNATURE) {
        return read_umapinfo(data, start, strictness);
    }
    if DSDA_SIGNATURE.starts_with(rest) || UMAPINFO_SIGNATURE.starts_with(rest) {
        // Too short to tell the two signatures apart.
        return strictness.overrun(start, DSDA_SIGNATURE.len(), data.len());
    }
    strictness.not_recognized(format!(
        "foreign extended header signature {:02x?}",
        rest.get(..6).unwrap_or(rest)
    ))
}

fn read_dsda(
    data: &[u8],
    start: usize,
    strictness: Strictness,
) -> DemoResult<ParseOutcome<(ExtendedHeader, usize)>> {
    let mut r = ByteReader::at(data, start + DSDA_SIGNATURE.len());
    let Some(version) = r.read_u8() else {
        return strictness.overrun(start, DSDA_SIGNATURE.len() + 1, data.len());
    };
    if version > DSDA_DEMO_VERSION {
        return malformed(&format!(
            "DSDA header version {version} is newer than {DSDA_DEMO_VERSION}"
        ));
    }
    let (Some(end_marker), Some(tics)) = (r.read_u32_be(), r.read_u32_be()) else {
        return strictness.overrun(r.position(), DSDA_HEADER_DATA_SIZE, data.len());
    };
    Ok(ParseOutcome::Parsed((
        ExtendedHeader::Dsda {
            version,
            end_marker,
            tics,
        },
        r.position(),
    )))
}

fn read_umapinfo(
    data: &[u8],
    start: usize,
    strictness: Strictness,
) -> DemoResult<ParseOutcome<(ExtendedHeader, usize)>> {
    // signature (6) + version (1) + extension count (2)
    let mut r = ByteReader::at(data, start);
    if !r.has(9) {
        return strictness.overrun(start, 9, data.len());
    }
    let _signature = r.read_bytes(6);
    if r.read_u8() != Some(1) {
        return malformed("PR+UM block version is not 1");
    }
    if r.read_u8() != Some(1) || r.read_u8() != Some(0) {
        return malformed("PR+UM block must carry exactly one extension");
    }
    let Some(name_len) = r.read_u8() else {
        return strictness.overrun(r.position(), 1, data.len());
    };
    if name_len != 8 {
        return malformed("PR+UM extension name length is not 8");
    }
    let Some(name) = r.read_bytes(8) else {
        return strictness.overrun(r.position(), 8, data.len());
    };
    if name != UMAPINFO_NAME {
        return malformed("PR+UM extension is not UMAPINFO");
    }
    let Some(map_lump) = r.read_array::<8>() else {
        return strictness.overrun(r.position(), 8, data.len());
    };
    Ok(ParseOutcome::Parsed((
        ExtendedHeader::Umapinfo { map_lump },
        r.position(),
    )))
}

/// Writes a fresh DSDA header (255 byte included) with zeroed trailer data.
///
/// Returns the offset of the trailer data relative to where writing started,
/// which is where [`DemoByteStream::export`](super::stream::DemoByteStream::export)
/// patches the end marker and tic count.
pub fn write_dsda_header(out: &mut ByteWriter) -> usize {
    let start = out.len();
    out.put_u8(EXTENDED_VERSION)
        .put_bytes(&DSDA_SIGNATURE)
        .put_u8(DSDA_DEMO_VERSION);
    let data_offset = out.len() - start;
    out.put_zeroes(DSDA_HEADER_DATA_SIZE);
    data_offset
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

    fn dsda_bytes(version: u8, end_marker: u32, tics: u32) -> Vec<u8> {
        let mut out = ByteWriter::new();
        out.put_u8(255)
            .put_bytes(&DSDA_SIGNATURE)
            .put_u8(version)
            .put_u32_be(end_marker)
            .put_u32_be(tics)
            .put_u8(221);
        out.into_inner()
    }

    fn umapinfo_bytes() -> Vec<u8> {
        let mut out = ByteWriter::new();
        out.put_u8(255)
            .put_bytes(b"PR+UM\0")
            .put_u8(1)
            .put_u8(1)
            .put_u8(0)
            .put_u8(8)
            .put_bytes(b"UMAPINFO")
            .put_bytes(b"MAP01\0\0\0")
            .put_u8(202);
        out.into_inner()
    }

    #[test]
    fn dsda_header_strips_to_following_version() {
        let data = dsda_bytes(1, 500, 35);
        let outcome = strip_version_255(&data, 1, Strictness::Strict).unwrap();
        let (header, next) = outcome.parsed().unwrap();
        assert_eq!(
            header,
            ExtendedHeader::Dsda {
                version: 1,
                end_marker: 500,
                tics: 35
            }
        );
        assert!(header.enables_extended_commands());
        assert_eq!(next, DSDA_HEADER_START_SIZE + DSDA_HEADER_DATA_SIZE);
        assert_eq!(data[next], 221);
    }

    #[test]
    fn newer_dsda_version_is_fatal_even_when_lenient() {
        let data = dsda_bytes(2, 0, 0);
        let err = strip_version_255(&data, 1, Strictness::Lenient).unwrap_err();
        assert!(matches!(err, DemoError::MalformedExtendedHeader { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn umapinfo_block_is_skipped() {
        let data = umapinfo_bytes();
        let (header, next) = strip_version_255(&data, 1, Strictness::Strict)
            .unwrap()
            .parsed()
            .unwrap();
        assert_eq!(
            header,
            ExtendedHeader::Umapinfo {
                map_lump: *b"MAP01\0\0\0"
            }
        );
        assert!(!header.enables_extended_commands());
        assert_eq!(data[next], 202);
    }

    #[test]
    fn umapinfo_with_wrong_name_is_fatal() {
        let mut data = umapinfo_bytes();
        data[11] = b'X';
        let err = strip_version_255(&data, 1, Strictness::Lenient).unwrap_err();
        assert!(matches!(err, DemoError::MalformedExtendedHeader { .. }));
    }

    #[test]
    fn foreign_signature_is_soft() {
        let data = [255, 0x1d, b'E', b'T', b'R', b'N', 0xe6, 1, 2, 3, 4];
        let outcome = strip_version_255(&data, 1, Strictness::Lenient).unwrap();
        assert!(matches!(outcome, ParseOutcome::NotRecognized(_)));

        let err = strip_version_255(&data, 1, Strictness::Strict).unwrap_err();
        assert!(matches!(err, DemoError::NotRecognized { .. }));
    }

    #[test]
    fn truncated_dsda_trailer_is_an_overrun() {
        let data = &dsda_bytes(1, 0, 0)[..12];
        assert!(matches!(
            strip_version_255(data, 1, Strictness::Lenient).unwrap(),
            ParseOutcome::NotRecognized(_)
        ));
        assert!(matches!(
            strip_version_255(data, 1, Strictness::Strict).unwrap_err(),
            DemoError::HeaderOverrun { .. }
        ));
    }

    #[test]
    fn writer_reserves_trailer() {
        let mut out = ByteWriter::new();
        out.put_u8(0xaa);
        let offset = write_dsda_header(&mut out);
        assert_eq!(offset, DSDA_HEADER_START_SIZE);
        assert_eq!(out.len(), 1 + DSDA_HEADER_START_SIZE + DSDA_HEADER_DATA_SIZE);
        let (header, _) = strip_version_255(out.as_slice(), 2, Strictness::Strict)
            .unwrap()
            .parsed()
            .unwrap();
        assert_eq!(
            header,
            ExtendedHeader::Dsda {
                version: DSDA_DEMO_VERSION,
                end_marker: 0,
                tics: 0
            }
        );
    }
}
