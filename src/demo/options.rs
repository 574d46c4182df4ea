//! The game option block stored in Boom-lineage demo headers and save games.
//!
//! Boom, MBF and PrBoom levels use a fixed [`GAME_OPTION_SIZE`] block; fields
//! that a level does not know are written as zero and skipped on read. MBF21
//! uses a shorter block that ends with a counted list of toggles.

use serde::{Deserialize, Serialize};

use crate::codec::bytes::{ByteReader, ByteWriter};
use crate::compat::{
    CompToggle, CompatibilityLevel, ToggleVector, COMP_TOTAL, MBF21_COMP_ORDER, MBF21_COMP_TOTAL,
};
use crate::error::{DemoError, DemoResult};
use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};

/// Size of the option block before MBF21.
pub const GAME_OPTION_SIZE: usize = 64;

/// Size of an MBF21 option block carrying all of its toggles.
pub const MBF21_GAME_OPTION_SIZE: usize = 21 + MBF21_COMP_TOTAL;

/// Bytes a version 200 demo reserved for options.
pub const BOOM_200_OPTION_SIZE: usize = 256;

/// Size of the option block for `level`.
#[must_use]
pub const fn option_size(level: CompatibilityLevel) -> usize {
    if level.is_mbf21() {
        MBF21_GAME_OPTION_SIZE
    } else {
        GAME_OPTION_SIZE
    }
}

/// Gameplay options that must match between recording and playback.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameOptions {
    pub monsters_remember: bool,
    pub variable_friction: bool,
    pub weapon_recoil: bool,
    pub allow_pushers: bool,
    pub player_bobbing: bool,
    pub respawn: bool,
    pub fast: bool,
    pub nomonsters: bool,
    pub demo_insurance: u8,
    pub rng_seed: u32,
    pub monster_infighting: bool,
    pub dogs: u8,
    pub dist_friend: u16,
    pub monster_backing: bool,
    pub monster_avoid_hazards: bool,
    pub monster_friction: bool,
    pub help_friends: bool,
    pub dog_jumping: bool,
    pub monkeys: bool,
    pub comp: ToggleVector,
    pub force_old_bsp: bool,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            monsters_remember: true,
            variable_friction: true,
            weapon_recoil: false,
            allow_pushers: true,
            player_bobbing: true,
            respawn: false,
            fast: false,
            nomonsters: false,
            demo_insurance: 0,
            rng_seed: 1993,
            monster_infighting: true,
            dogs: 0,
            dist_friend: 128,
            monster_backing: false,
            monster_avoid_hazards: true,
            monster_friction: true,
            help_friends: false,
            dog_jumping: true,
            monkeys: false,
            comp: ToggleVector::EMPTY,
            force_old_bsp: false,
        }
    }
}

impl GameOptions {
    /// Default options for a new game at `level`, with the implied toggles applied.
    #[must_use]
    pub fn for_level(level: CompatibilityLevel) -> Self {
        let mut options = Self::default();
        options.comp = ToggleVector::resolve(level, &options.comp);
        if !level.mbf_features() {
            options.clear_mbf_ai();
        }
        options
    }

    /// Options forced for demos that predate the option block.
    #[must_use]
    pub fn vanilla(level: CompatibilityLevel) -> Self {
        let mut options = Self::for_level(level);
        options.variable_friction = false;
        options.weapon_recoil = false;
        options.allow_pushers = false;
        options.clear_mbf_ai();
        options
    }

    fn clear_mbf_ai(&mut self) {
        self.monster_infighting = true;
        self.monster_backing = false;
        self.monster_avoid_hazards = false;
        self.monster_friction = false;
        self.help_friends = false;
        self.dogs = 0;
        self.dog_jumping = false;
        self.monkeys = false;
    }

    /// Appends the option block for `level`.
    pub fn write(&self, level: CompatibilityLevel, out: &mut ByteWriter) {
        if level.is_mbf21() {
            self.write_mbf21(out);
            return;
        }
        let start = out.len();
        out.put_bool(self.monsters_remember)
            .put_bool(self.variable_friction)
            .put_bool(self.weapon_recoil)
            .put_bool(self.allow_pushers)
            .put_u8(0)
            .put_bool(self.player_bobbing)
            .put_bool(self.respawn)
            .put_bool(self.fast)
            .put_bool(self.nomonsters)
            .put_u8(self.demo_insurance)
            .put_u32_be(self.rng_seed)
            .put_bool(self.monster_infighting)
            .put_u8(self.dogs)
            .put_zeroes(2)
            .put_u16_be(self.dist_friend)
            .put_bool(self.monster_backing)
            .put_bool(self.monster_avoid_hazards)
            .put_bool(self.monster_friction)
            .put_bool(self.help_friends)
            .put_bool(self.dog_jumping)
            .put_bool(self.monkeys)
            .put_bytes(&self.comp.to_bytes())
            .put_bool(level >= CompatibilityLevel::PrBoom2 && self.force_old_bsp);
        let written = out.len() - start;
        out.put_zeroes(GAME_OPTION_SIZE.saturating_sub(written));
    }

    fn write_mbf21(&self, out: &mut ByteWriter) {
        out.put_bool(self.monsters_remember)
            .put_bool(self.weapon_recoil)
            .put_bool(self.player_bobbing)
            .put_bool(self.respawn)
            .put_bool(self.fast)
            .put_bool(self.nomonsters)
            .put_u32_be(self.rng_seed)
            .put_bool(self.monster_infighting)
            .put_u8(self.dogs)
            .put_u16_be(self.dist_friend)
            .put_bool(self.monster_backing)
            .put_bool(self.monster_avoid_hazards)
            .put_bool(self.monster_friction)
            .put_bool(self.help_friends)
            .put_bool(self.dog_jumping)
            .put_bool(self.monkeys)
            .put_u8(MBF21_COMP_TOTAL as u8);
        for toggle in MBF21_COMP_ORDER {
            out.put_bool(self.comp.get(toggle));
        }
    }

    /// Reads an option block for `level` and resolves its toggle vector.
    ///
    /// # Errors
    ///
    /// - [`DemoError::HeaderOverrun`] if the block is cut short.
    /// - [`DemoError::ToggleVectorSize`] if an MBF21 block claims more toggles
    ///   than exist.
    pub fn read(level: CompatibilityLevel, r: &mut ByteReader<'_>) -> DemoResult<Self> {
        let start = r.position();
        let size = r.len();
        let overrun = |needed: usize| DemoError::HeaderOverrun {
            position: start,
            needed,
            size,
        };
        if level.is_mbf21() {
            return Self::read_mbf21(r, overrun);
        }
        let block = r
            .read_bytes(GAME_OPTION_SIZE)
            .ok_or_else(|| overrun(GAME_OPTION_SIZE))?;
        Self::read_boom(level, &mut ByteReader::new(block)).ok_or_else(|| overrun(GAME_OPTION_SIZE))
    }

    fn read_boom(level: CompatibilityLevel, b: &mut ByteReader<'_>) -> Option<Self> {
        let mut o = Self::default();
        o.monsters_remember = b.read_u8()? != 0;
        o.variable_friction = b.read_u8()? != 0;
        o.weapon_recoil = b.read_u8()? != 0;
        o.allow_pushers = b.read_u8()? != 0;
        b.skip(1)?;
        o.player_bobbing = b.read_u8()? != 0;
        o.respawn = b.read_u8()? != 0;
        o.fast = b.read_u8()? != 0;
        o.nomonsters = b.read_u8()? != 0;
        o.demo_insurance = b.read_u8()?;
        o.rng_seed = b.read_u32_be()?;

        let mut explicit = ToggleVector::EMPTY;
        if level.mbf_features() {
            o.monster_infighting = b.read_u8()? != 0;
            o.dogs = b.read_u8()?;
            b.skip(2)?;
            o.dist_friend = b.read_u16_be()?;
            o.monster_backing = b.read_u8()? != 0;
            o.monster_avoid_hazards = b.read_u8()? != 0;
            o.monster_friction = b.read_u8()? != 0;
            o.help_friends = b.read_u8()? != 0;
            o.dog_jumping = b.read_u8()? != 0;
            o.monkeys = b.read_u8()? != 0;
            explicit = ToggleVector::from_bytes(b.read_bytes(COMP_TOTAL)?).ok()?;
            o.force_old_bsp = b.read_u8()? != 0;
        } else {
            o.clear_mbf_ai();
        }
        o.comp = ToggleVector::resolve(level, &explicit);
        Some(o)
    }

    fn read_mbf21(
        r: &mut ByteReader<'_>,
        overrun: impl Fn(usize) -> DemoError,
    ) -> DemoResult<Self> {
        let fixed: [u8; 21] = r
            .read_array()
            .ok_or_else(|| overrun(MBF21_GAME_OPTION_SIZE))?;
        let flag = |i: usize| fixed.get(i).is_some_and(|b| *b != 0);
        let rng_seed = u32::from_be_bytes([fixed[6], fixed[7], fixed[8], fixed[9]]);
        let dist_friend = u16::from_be_bytes([fixed[12], fixed[13]]);
        let count = usize::from(fixed[20]);

        if count > MBF21_COMP_TOTAL {
            return Err(DemoError::ToggleVectorSize {
                expected: MBF21_COMP_TOTAL,
                actual: count,
            });
        }
        if count < MBF21_COMP_TOTAL {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::Compatibility,
                "mbf21 option block stores {} of {} toggles; the rest default to off",
                count,
                MBF21_COMP_TOTAL
            );
        }
        let stored = r
            .read_bytes(count)
            .ok_or_else(|| overrun(fixed.len() + count))?;
        let mut explicit = ToggleVector::EMPTY;
        for (toggle, byte) in MBF21_COMP_ORDER.iter().zip(stored) {
            explicit.set(*toggle, *byte != 0);
        }

        Ok(Self {
            monsters_remember: flag(0),
            variable_friction: true,
            weapon_recoil: flag(1),
            allow_pushers: true,
            player_bobbing: flag(2),
            respawn: flag(3),
            fast: flag(4),
            nomonsters: flag(5),
            demo_insurance: 0,
            rng_seed,
            monster_infighting: flag(10),
            dogs: fixed[11],
            dist_friend,
            monster_backing: flag(14),
            monster_avoid_hazards: flag(15),
            monster_friction: flag(16),
            help_friends: flag(17),
            dog_jumping: flag(18),
            monkeys: flag(19),
            comp: ToggleVector::resolve(CompatibilityLevel::Mbf21, &explicit),
            force_old_bsp: false,
        })
    }

    /// Returns the state of one toggle.
    #[inline]
    #[must_use]
    pub fn comp(&self, toggle: CompToggle) -> bool {
        self.comp.get(toggle)
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

    fn round_trip(level: CompatibilityLevel, options: &GameOptions) -> GameOptions {
        let mut out = ByteWriter::new();
        options.write(level, &mut out);
        assert_eq!(out.len(), option_size(level));
        let mut r = ByteReader::new(out.as_slice());
        let read = GameOptions::read(level, &mut r).unwrap();
        assert_eq!(r.remaining(), 0);
        read
    }

    #[test]
    fn boom_block_layout() {
        let options = GameOptions {
            rng_seed: 0x0102_0304,
            respawn: true,
            ..GameOptions::for_level(CompatibilityLevel::Boom202)
        };
        let mut out = ByteWriter::new();
        options.write(CompatibilityLevel::Boom202, &mut out);
        let bytes = out.as_slice();
        assert_eq!(bytes.len(), GAME_OPTION_SIZE);
        assert_eq!(bytes[6], 1);
        assert_eq!(&bytes[10..14], &[1, 2, 3, 4]);
        // dist_friend 128, big-endian
        assert_eq!(&bytes[18..20], &[0, 128]);
    }

    #[test]
    fn boom_levels_ignore_mbf_fields_on_read() {
        let mut options = GameOptions::for_level(CompatibilityLevel::Mbf);
        options.monster_backing = true;
        options.dogs = 3;
        let read = round_trip(CompatibilityLevel::Boom201, &options);
        assert!(!read.monster_backing);
        assert_eq!(read.dogs, 0);
        assert!(read.monster_infighting);
        assert_eq!(read.comp, ToggleVector::for_level(CompatibilityLevel::Boom201));
    }

    #[test]
    fn mbf_levels_keep_explicit_toggles() {
        let mut options = GameOptions::for_level(CompatibilityLevel::PrBoom6);
        options.comp.set(CompToggle::Telefrag, true);
        options.comp.set(CompToggle::Reservedlineflag, true);
        options.dist_friend = 300;
        let read = round_trip(CompatibilityLevel::PrBoom6, &options);
        assert!(read.comp(CompToggle::Telefrag));
        // implied below mbf21: PrBoom6 < fix level, so on regardless
        assert!(read.comp(CompToggle::Reservedlineflag));
        assert_eq!(read.dist_friend, 300);
    }

    #[test]
    fn mbf21_block_round_trips() {
        let mut options = GameOptions::for_level(CompatibilityLevel::Mbf21);
        options.comp.set(CompToggle::Pursuit, true);
        options.comp.set(CompToggle::Voodooscroller, true);
        options.rng_seed = 77;
        options.nomonsters = true;
        let read = round_trip(CompatibilityLevel::Mbf21, &options);
        assert_eq!(read, options);
    }

    #[test]
    fn mbf21_with_too_many_toggles_is_fatal() {
        let mut out = ByteWriter::new();
        GameOptions::for_level(CompatibilityLevel::Mbf21).write(CompatibilityLevel::Mbf21, &mut out);
        let mut bytes = out.into_inner();
        bytes[20] = 26;
        bytes.push(0);
        let err = GameOptions::read(CompatibilityLevel::Mbf21, &mut ByteReader::new(&bytes))
            .unwrap_err();
        assert_eq!(
            err,
            DemoError::ToggleVectorSize {
                expected: 25,
                actual: 26
            }
        );
    }

    #[test]
    fn vanilla_defaults() {
        let options = GameOptions::vanilla(CompatibilityLevel::Doom2_19);
        assert!(!options.variable_friction);
        assert!(!options.allow_pushers);
        assert!(options.monster_infighting);
        assert!(!options.dog_jumping);
        assert!(options.comp(CompToggle::Telefrag));
    }

    #[test]
    fn short_block_is_an_overrun() {
        let err = GameOptions::read(CompatibilityLevel::Mbf, &mut ByteReader::new(&[0; 10]))
            .unwrap_err();
        assert!(matches!(err, DemoError::HeaderOverrun { needed: 64, .. }));
    }
}
