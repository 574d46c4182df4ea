//! Pluggable encoding of the extended-command block.
//!
//! The block follows the button byte (and the Raven fields) when the extended
//! command feature is on. Its size varies with the actions it carries, so the
//! [`TickCodec`](super::TickCodec) only knows its minimum size.

use std::fmt::Debug;

use super::bytes::{ByteReader, ByteWriter};
use crate::ticcmd::actions::{XC_LOAD, XC_SAVE};
use crate::ticcmd::ExtendedCommand;

/// Encoder/decoder for the extended-command block of a tick record.
pub trait ExtendedCommandCodec: Debug + Send + Sync {
    /// Bytes the block always occupies; counted in bytes-per-tic.
    fn base_size(&self) -> usize;

    /// Appends the block for `ext`.
    fn encode(&self, ext: &ExtendedCommand, out: &mut ByteWriter);

    /// Reads a block. Returns `None` if the reader runs out of data.
    fn decode(&self, reader: &mut ByteReader<'_>) -> Option<ExtendedCommand>;
}

/// The DSDA block: one action byte, then the save slot if `XC_SAVE` is set,
/// then the load slot if `XC_LOAD` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DsdaExtendedCodec;

impl ExtendedCommandCodec for DsdaExtendedCodec {
    fn base_size(&self) -> usize {
        1
    }

    fn encode(&self, ext: &ExtendedCommand, out: &mut ByteWriter) {
        out.put_u8(ext.actions);
        if ext.has(XC_SAVE) {
            out.put_u8(ext.save_slot);
        }
        if ext.has(XC_LOAD) {
            out.put_u8(ext.load_slot);
        }
    }

    fn decode(&self, reader: &mut ByteReader<'_>) -> Option<ExtendedCommand> {
        let mut probe = reader.clone();
        let actions = probe.read_u8()?;
        let save_slot = if actions & XC_SAVE != 0 {
            probe.read_u8()?
        } else {
            0
        };
        let load_slot = if actions & XC_LOAD != 0 {
            probe.read_u8()?
        } else {
            0
        };
        *reader = probe;
        Some(ExtendedCommand {
            actions,
            save_slot,
            load_slot,
        })
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
    use crate::ticcmd::actions::{XC_GOD, XC_JUMP};

    fn encode(ext: ExtendedCommand) -> Vec<u8> {
        let mut out = ByteWriter::new();
        DsdaExtendedCodec.encode(&ext, &mut out);
        out.into_inner()
    }

    #[test]
    fn slots_only_follow_their_actions() {
        let plain = ExtendedCommand {
            actions: XC_GOD | XC_JUMP,
            save_slot: 5,
            load_slot: 6,
        };
        assert_eq!(encode(plain), vec![XC_GOD | XC_JUMP]);

        let both = ExtendedCommand {
            actions: XC_SAVE | XC_LOAD,
            save_slot: 3,
            load_slot: 7,
        };
        assert_eq!(encode(both), vec![XC_SAVE | XC_LOAD, 3, 7]);
    }

    #[test]
    fn decode_reads_variable_length() {
        let bytes = [XC_LOAD, 2, 0xaa];
        let mut reader = ByteReader::new(&bytes);
        let ext = DsdaExtendedCodec.decode(&mut reader).unwrap();
        assert_eq!(ext.load_slot, 2);
        assert_eq!(ext.save_slot, 0);
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn truncated_block_leaves_reader_untouched() {
        let bytes = [XC_SAVE];
        let mut reader = ByteReader::new(&bytes);
        assert!(DsdaExtendedCodec.decode(&mut reader).is_none());
        assert_eq!(reader.position(), 0);
    }
}
