//! Command Buffer Codec: the byte layout of one tick record.
//!
//! The layout is chosen once per session from the [`Era`] and the
//! [`TicFormat`] flags:
//!
//! | era | bytes |
//! |---|---|
//! | standard | `forward side angle_hi buttons` (`angle_lo angle_hi` with longtics) |
//! | Raven | standard + `look_fly artifact` |
//! | TASDoom | `buttons forward side angle_hi` |
//!
//! An extended-command block follows when [`TicFormat::extended`] is set.

pub mod bytes;
pub mod extended;
pub mod snapshot;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compat::CompatibilityLevel;
use crate::error::{DemoError, DemoResult};
use crate::sessions::config::Game;
use crate::ticcmd::TickCommand;
use bytes::{ByteReader, ByteWriter};
use extended::{DsdaExtendedCodec, ExtendedCommandCodec};

/// Historical demo families. Selected once when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Era {
    /// Doom v1.2 to v1.9 and Final Doom; no signature.
    Vanilla,
    /// TASDoom's reordered tick layout.
    TasDoom,
    /// Heretic and Hexen; versionless header and two extra tick bytes.
    Raven,
    /// Boom and LxDoom; "Boom" signature.
    Boom,
    /// MBF and PrBoom; "MBF" signature with the 64-byte option block.
    Mbf,
    /// MBF21; "MBF" signature with the counted option block.
    Mbf21,
}

impl Era {
    /// The family a demo recorded at `level` for `game` belongs to.
    #[must_use]
    pub fn for_level(level: CompatibilityLevel, game: Game) -> Self {
        if game.is_raven() {
            return Era::Raven;
        }
        match level {
            CompatibilityLevel::TasDoom => Era::TasDoom,
            CompatibilityLevel::Mbf21 => Era::Mbf21,
            l if l.demo_compatibility() => Era::Vanilla,
            l if l.mbf_features() => Era::Mbf,
            _ => Era::Boom,
        }
    }
}

/// Flags that change the width of a tick record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TicFormat {
    /// 16-bit angle instead of the high byte only.
    pub longtics: bool,
    /// Raven look/fly and artifact bytes.
    pub raven: bool,
    /// Extended-command block present.
    pub extended: bool,
}

impl TicFormat {
    /// Fixed bytes per tick record for this format, counting one byte for the
    /// extended block.
    #[must_use]
    pub const fn bytes_per_tic(&self) -> usize {
        let mut bytes = if self.longtics { 5 } else { 4 };
        if self.raven {
            bytes += 2;
        }
        if self.extended {
            bytes += 1;
        }
        bytes
    }
}

/// Rounds an angle delta the way an 8-bit angle record would store it.
#[inline]
#[must_use]
pub const fn short_angle(angle_turn: i16) -> i16 {
    (((angle_turn as i32 + 128) >> 8) << 8) as i16
}

/// Encoder and decoder for one session's tick records.
#[derive(Debug, Clone)]
pub struct TickCodec {
    era: Era,
    format: TicFormat,
    extended: Option<Arc<dyn ExtendedCommandCodec>>,
}

impl TickCodec {
    /// Creates a codec for `era`. The DSDA block is used when `format.extended` is set.
    ///
    /// TASDoom records never carry a 16-bit angle, and only Raven records carry
    /// the look/fly and artifact bytes; `format` is normalized accordingly.
    #[must_use]
    pub fn new(era: Era, format: TicFormat) -> Self {
        let extended: Option<Arc<dyn ExtendedCommandCodec>> = if format.extended {
            Some(Arc::new(DsdaExtendedCodec))
        } else {
            None
        };
        Self {
            era,
            format: TicFormat {
                longtics: format.longtics && era != Era::TasDoom,
                raven: era == Era::Raven,
                extended: format.extended,
            },
            extended,
        }
    }

    /// Replaces the extended-command codec, enabling the block.
    #[must_use]
    pub fn with_extended_codec(mut self, codec: Arc<dyn ExtendedCommandCodec>) -> Self {
        self.format.extended = true;
        self.extended = Some(codec);
        self
    }

    /// The era this codec was built for.
    #[inline]
    #[must_use]
    pub const fn era(&self) -> Era {
        self.era
    }

    /// The normalized record format.
    #[inline]
    #[must_use]
    pub const fn format(&self) -> TicFormat {
        self.format
    }

    /// Minimum size of one record.
    #[must_use]
    pub fn bytes_per_tic(&self) -> usize {
        let base = TicFormat {
            extended: false,
            ..self.format
        }
        .bytes_per_tic();
        base + self.extended.as_ref().map_or(0, |codec| codec.base_size())
    }

    /// Appends the record for `cmd`.
    pub fn encode(&self, cmd: &TickCommand, out: &mut ByteWriter) {
        let angle_hi = ((i32::from(cmd.angle_turn) + 128) >> 8) as u8;
        if self.era == Era::TasDoom {
            out.put_u8(cmd.buttons)
                .put_i8(cmd.forward)
                .put_i8(cmd.side)
                .put_u8(angle_hi);
        } else {
            out.put_i8(cmd.forward).put_i8(cmd.side);
            if self.format.longtics {
                out.put_bytes(&cmd.angle_turn.to_le_bytes());
            } else {
                out.put_u8(angle_hi);
            }
            out.put_u8(cmd.buttons);
            if self.format.raven {
                out.put_u8(cmd.look_fly).put_u8(cmd.artifact);
            }
        }
        if let Some(codec) = &self.extended {
            codec.encode(&cmd.ext, out);
        }
    }

    /// Encodes one record into a new buffer.
    #[must_use]
    pub fn encode_to_vec(&self, cmd: &TickCommand) -> Vec<u8> {
        let mut out = ByteWriter::with_capacity(self.bytes_per_tic() + 2);
        self.encode(cmd, &mut out);
        out.into_inner()
    }

    /// Reads one record. Returns `None`, leaving the reader where it was, if
    /// the record does not fit in the remaining bytes.
    pub fn decode(&self, reader: &mut ByteReader<'_>) -> Option<TickCommand> {
        let mut r = reader.clone();
        let mut cmd = TickCommand::EMPTY;
        if self.era == Era::TasDoom {
            // Stored as buttons, forward, side, angle.
            cmd.buttons = r.read_u8()?;
            cmd.forward = r.read_i8()?;
            cmd.side = r.read_i8()?;
            cmd.angle_turn = (u16::from(r.read_u8()?) << 8) as i16;
        } else {
            cmd.forward = r.read_i8()?;
            cmd.side = r.read_i8()?;
            cmd.angle_turn = if self.format.longtics {
                i16::from_le_bytes(r.read_array()?)
            } else {
                (u16::from(r.read_u8()?) << 8) as i16
            };
            cmd.buttons = r.read_u8()?;
            if self.format.raven {
                cmd.look_fly = r.read_u8()?;
                cmd.artifact = r.read_u8()?;
            }
        }
        if let Some(codec) = &self.extended {
            cmd.ext = codec.decode(&mut r)?;
        }
        *reader = r;
        Some(cmd)
    }

    /// Decodes the record at `offset` of a buffer that is trusted to hold whole
    /// records.
    ///
    /// # Errors
    ///
    /// [`DemoError::TruncatedTick`] if the record runs past the end of `data`.
    pub fn decode_at(&self, data: &[u8], offset: usize) -> DemoResult<(TickCommand, usize)> {
        let mut reader = ByteReader::at(data, offset);
        match self.decode(&mut reader) {
            Some(cmd) => Ok((cmd, reader.position() - offset)),
            None => Err(DemoError::TruncatedTick {
                offset,
                needed: self.bytes_per_tic(),
                available: data.len().saturating_sub(offset),
            }),
        }
    }

    /// Encodes `cmd` and decodes it again, yielding the command exactly as a
    /// replay will see it.
    #[must_use]
    pub fn canonicalize(&self, cmd: &TickCommand) -> TickCommand {
        let bytes = self.encode_to_vec(cmd);
        self.decode(&mut ByteReader::new(&bytes)).unwrap_or(*cmd)
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
    use crate::test_config::miri_case_count;
    use crate::ticcmd::actions::{XC_LOAD, XC_SAVE};
    use crate::ticcmd::ExtendedCommand;
    use proptest::prelude::*;

    fn cmd(forward: i8, side: i8, angle_turn: i16, buttons: u8) -> TickCommand {
        TickCommand {
            forward,
            side,
            angle_turn,
            buttons,
            ..TickCommand::EMPTY
        }
    }

    // ===== Layouts =====

    #[test]
    fn bytes_per_tic_table() {
        let f = |longtics, raven, extended| {
            TicFormat {
                longtics,
                raven,
                extended,
            }
            .bytes_per_tic()
        };
        assert_eq!(f(false, false, false), 4);
        assert_eq!(f(true, false, false), 5);
        assert_eq!(f(false, true, false), 6);
        assert_eq!(f(true, true, true), 8);
        assert_eq!(f(true, false, true), 6);
    }

    #[test]
    fn short_tics_store_rounded_high_byte() {
        let codec = TickCodec::new(Era::Vanilla, TicFormat::default());
        let bytes = codec.encode_to_vec(&cmd(25, -24, 640, 1));
        // 640 + 128 = 768 -> 3
        assert_eq!(bytes, vec![25, 0xe8, 3, 1]);
        let (decoded, used) = codec.decode_at(&bytes, 0).unwrap();
        assert_eq!(used, 4);
        assert_eq!(decoded.angle_turn, 768);
    }

    #[test]
    fn longtics_store_little_endian_angle() {
        let codec = TickCodec::new(
            Era::Mbf21,
            TicFormat {
                longtics: true,
                ..TicFormat::default()
            },
        );
        let bytes = codec.encode_to_vec(&cmd(50, 0, -2, 0));
        assert_eq!(bytes, vec![50, 0, 0xfe, 0xff, 0]);
    }

    #[test]
    fn tasdoom_swaps_field_order() {
        let codec = TickCodec::new(
            Era::TasDoom,
            TicFormat {
                longtics: true,
                ..TicFormat::default()
            },
        );
        // TASDoom never uses 16-bit angles.
        assert_eq!(codec.bytes_per_tic(), 4);

        let bytes = codec.encode_to_vec(&cmd(10, -5, 0x0300, 0x02));
        assert_eq!(bytes, vec![0x02, 10, 0xfb, 3]);

        let decoded = codec.decode_at(&bytes, 0).unwrap().0;
        assert_eq!(decoded, cmd(10, -5, 0x0300, 0x02));
    }

    #[test]
    fn raven_appends_look_and_artifact() {
        let codec = TickCodec::new(Era::Raven, TicFormat::default());
        let mut c = cmd(1, 2, 0, 0);
        c.look_fly = 0x12;
        c.artifact = 9;
        assert_eq!(codec.encode_to_vec(&c), vec![1, 2, 0, 0, 0x12, 9]);
    }

    #[test]
    fn raven_fields_dropped_outside_raven() {
        let codec = TickCodec::new(
            Era::Mbf,
            TicFormat {
                raven: true,
                ..TicFormat::default()
            },
        );
        assert_eq!(codec.bytes_per_tic(), 4);
    }

    #[test]
    fn extended_block_follows_buttons() {
        let codec = TickCodec::new(
            Era::Mbf21,
            TicFormat {
                longtics: true,
                raven: false,
                extended: true,
            },
        );
        assert_eq!(codec.bytes_per_tic(), 6);
        let mut c = cmd(0, 0, 0, 0);
        c.ext = ExtendedCommand {
            actions: XC_SAVE,
            save_slot: 2,
            load_slot: 0,
        };
        let bytes = codec.encode_to_vec(&c);
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, XC_SAVE, 2]);
        let (decoded, used) = codec.decode_at(&bytes, 0).unwrap();
        assert_eq!(used, 7);
        assert_eq!(decoded, c);
    }

    #[test]
    fn decode_past_end_is_truncated_tick() {
        let codec = TickCodec::new(Era::Boom, TicFormat::default());
        let err = codec.decode_at(&[1, 2, 3, 4, 5, 6], 4).unwrap_err();
        assert_eq!(
            err,
            DemoError::TruncatedTick {
                offset: 4,
                needed: 4,
                available: 2
            }
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn era_selection() {
        assert_eq!(Era::for_level(CompatibilityLevel::Doom12, Game::Doom), Era::Vanilla);
        assert_eq!(Era::for_level(CompatibilityLevel::TasDoom, Game::Doom), Era::TasDoom);
        assert_eq!(Era::for_level(CompatibilityLevel::BoomCompat, Game::Doom), Era::Boom);
        assert_eq!(Era::for_level(CompatibilityLevel::LxDoom1, Game::Doom), Era::Boom);
        assert_eq!(Era::for_level(CompatibilityLevel::PrBoom6, Game::Doom), Era::Mbf);
        assert_eq!(Era::for_level(CompatibilityLevel::Mbf21, Game::Doom), Era::Mbf21);
        assert_eq!(Era::for_level(CompatibilityLevel::Doom2_19, Game::Hexen), Era::Raven);
    }

    #[test]
    fn short_angle_rounds_to_nearest_step() {
        assert_eq!(short_angle(127), 0);
        assert_eq!(short_angle(128), 256);
        assert_eq!(short_angle(-129), -256);
        assert_eq!(short_angle(i16::MAX), i16::MIN);
    }

    // ===== Properties =====

    fn era_strategy() -> impl Strategy<Value = Era> {
        prop_oneof![
            Just(Era::Vanilla),
            Just(Era::TasDoom),
            Just(Era::Raven),
            Just(Era::Boom),
            Just(Era::Mbf),
            Just(Era::Mbf21),
        ]
    }

    fn command_strategy() -> impl Strategy<Value = TickCommand> {
        (
            -127i8..=127,
            -127i8..=127,
            any::<i16>(),
            any::<u8>(),
            any::<u8>(),
            any::<u8>(),
            0u8..0x20,
            any::<u8>(),
            any::<u8>(),
        )
            .prop_map(
                |(forward, side, angle_turn, buttons, look_fly, artifact, actions, save, load)| {
                    TickCommand {
                        forward,
                        side,
                        angle_turn,
                        buttons,
                        look_fly,
                        artifact,
                        ext: ExtendedCommand {
                            actions,
                            save_slot: if actions & XC_SAVE != 0 { save } else { 0 },
                            load_slot: if actions & XC_LOAD != 0 { load } else { 0 },
                        },
                    }
                },
            )
    }

    /// Drops what `codec` cannot represent.
    fn representable(codec: &TickCodec, mut cmd: TickCommand) -> TickCommand {
        let format = codec.format();
        if !format.longtics {
            cmd.angle_turn = (cmd.angle_turn as u16 & 0xff00) as i16;
        }
        if !format.raven {
            cmd.look_fly = 0;
            cmd.artifact = 0;
        }
        if !format.extended {
            cmd.ext = ExtendedCommand::NONE;
        }
        cmd
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(miri_case_count()))]

        #[test]
        fn decode_inverts_encode(
            era in era_strategy(),
            longtics in any::<bool>(),
            extended in any::<bool>(),
            raw in command_strategy(),
        ) {
            let codec = TickCodec::new(era, TicFormat { longtics, raven: false, extended });
            let cmd = representable(&codec, raw);
            let bytes = codec.encode_to_vec(&cmd);
            prop_assert!(bytes.len() >= codec.bytes_per_tic());
            let (decoded, used) = codec.decode_at(&bytes, 0).unwrap();
            prop_assert_eq!(used, bytes.len());
            prop_assert_eq!(decoded, cmd);
        }

        #[test]
        fn canonicalize_is_idempotent(era in era_strategy(), raw in command_strategy()) {
            let codec = TickCodec::new(era, TicFormat::default());
            let once = codec.canonicalize(&raw);
            prop_assert_eq!(codec.canonicalize(&once), once);
        }
    }
}
