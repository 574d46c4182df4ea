//! Compatibility levels and the behaviour toggle vector they imply.
//!
//! A [`CompatibilityLevel`] names a historical engine release. Each of the
//! [`COMP_TOTAL`] behaviour toggles records the level at which the behaviour
//! changed (`fix`) and the level from which it became a stored option (`opt`).
//! Below `opt` the toggle is implied by the level; from `opt` on it comes from
//! the explicit vector serialized in the demo or save game.

use serde::{Deserialize, Serialize};

use crate::error::{DemoError, DemoResult};

/// Number of compatibility level slots, including the reserved ones.
pub const MAX_COMPATIBILITY_LEVEL: usize = 22;

/// Number of behaviour toggles in a [`ToggleVector`].
pub const COMP_TOTAL: usize = 32;

/// Number of toggles stored in an mbf21 option block.
pub const MBF21_COMP_TOTAL: usize = 25;

/// Historical engine releases, oldest first.
///
/// Slots 18 to 20 are reserved and have no level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompatibilityLevel {
    /// Doom v1.2
    Doom12 = 0,
    /// Doom v1.666
    Doom1666 = 1,
    /// Doom/Doom2 v1.9
    Doom2_19 = 2,
    /// Ultimate Doom / Doom95
    UltDoom = 3,
    /// Final Doom
    FinalDoom = 4,
    /// early DosDoom
    DosDoom = 5,
    /// TASDoom
    TasDoom = 6,
    /// Boom's own "compatibility" mode
    BoomCompat = 7,
    /// boom v2.01
    Boom201 = 8,
    /// boom v2.02
    Boom202 = 9,
    /// lxdoom v1.3.2+
    LxDoom1 = 10,
    /// MBF
    Mbf = 11,
    /// PrBoom 2.03beta
    PrBoom1 = 12,
    /// PrBoom v2.1.0-2.1.1
    PrBoom2 = 13,
    /// PrBoom v2.1.2-v2.2.6
    PrBoom3 = 14,
    /// PrBoom v2.3.x
    PrBoom4 = 15,
    /// PrBoom 2.4.0
    PrBoom5 = 16,
    /// Current PrBoom
    PrBoom6 = 17,
    /// MBF21
    Mbf21 = 21,
}

const LEVEL_NAMES: [&str; MAX_COMPATIBILITY_LEVEL] = [
    "Doom v1.2",
    "Doom v1.666",
    "Doom/Doom2 v1.9",
    "Ultimate Doom/Doom95",
    "Final Doom",
    "early DosDoom",
    "TASDoom",
    "\"boom compatibility\"",
    "boom v2.01",
    "boom v2.02",
    "lxdoom v1.3.2+",
    "MBF",
    "PrBoom 2.03beta",
    "PrBoom v2.1.0-2.1.1",
    "PrBoom v2.1.2-v2.2.6",
    "PrBoom v2.3.x",
    "PrBoom 2.4.0",
    "Current PrBoom",
    "",
    "",
    "",
    "MBF21",
];

impl CompatibilityLevel {
    /// Every defined level in ascending order.
    pub const ALL: [CompatibilityLevel; 19] = [
        Self::Doom12,
        Self::Doom1666,
        Self::Doom2_19,
        Self::UltDoom,
        Self::FinalDoom,
        Self::DosDoom,
        Self::TasDoom,
        Self::BoomCompat,
        Self::Boom201,
        Self::Boom202,
        Self::LxDoom1,
        Self::Mbf,
        Self::PrBoom1,
        Self::PrBoom2,
        Self::PrBoom3,
        Self::PrBoom4,
        Self::PrBoom5,
        Self::PrBoom6,
        Self::Mbf21,
    ];

    /// The newest level; used when no level was requested outside recording.
    pub const BEST: CompatibilityLevel = Self::Mbf21;

    /// Looks up a level by its numeric slot. Reserved and out-of-range slots yield `None`.
    #[must_use]
    pub const fn try_from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Doom12,
            1 => Self::Doom1666,
            2 => Self::Doom2_19,
            3 => Self::UltDoom,
            4 => Self::FinalDoom,
            5 => Self::DosDoom,
            6 => Self::TasDoom,
            7 => Self::BoomCompat,
            8 => Self::Boom201,
            9 => Self::Boom202,
            10 => Self::LxDoom1,
            11 => Self::Mbf,
            12 => Self::PrBoom1,
            13 => Self::PrBoom2,
            14 => Self::PrBoom3,
            15 => Self::PrBoom4,
            16 => Self::PrBoom5,
            17 => Self::PrBoom6,
            21 => Self::Mbf21,
            _ => return None,
        })
    }

    /// The numeric slot of this level.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name, as shown when a demo starts playing.
    #[must_use]
    pub fn name(self) -> &'static str {
        LEVEL_NAMES
            .get(usize::from(self.as_u8()))
            .copied()
            .unwrap_or_default()
    }

    /// Levels before Boom replay with vanilla semantics everywhere.
    #[inline]
    #[must_use]
    pub const fn demo_compatibility(self) -> bool {
        (self as u8) < (Self::BoomCompat as u8)
    }

    /// MBF and later carry the MBF option set and AI fields.
    #[inline]
    #[must_use]
    pub const fn mbf_features(self) -> bool {
        (self as u8) >= (Self::Mbf as u8)
    }

    /// MBF21 uses its own option block and forces several toggles off.
    #[inline]
    #[must_use]
    pub const fn is_mbf21(self) -> bool {
        matches!(self, Self::Mbf21)
    }
}

impl std::fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.as_u8(), self.name())
    }
}

impl TryFrom<u8> for CompatibilityLevel {
    type Error = DemoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or_else(|| DemoError::InvalidRequest {
            info: format!("{value} is not a compatibility level"),
        })
    }
}

/// Named behaviour toggles, in serialized order.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompToggle {
    Telefrag = 0,
    Dropoff,
    Vile,
    Pain,
    Skull,
    Blazing,
    Doorlight,
    Model,
    God,
    Falloff,
    Floors,
    Skymap,
    Pursuit,
    Doorstuck,
    Staylift,
    Zombie,
    Stairs,
    Infcheat,
    Zerotags,
    Moveblock,
    Respawn,
    Sound,
    Comp666,
    Soul,
    Maskedanim,
    Ouchface,
    Maxhealth,
    Translucency,
    Ledgeblock,
    Friendlyspawn,
    Voodooscroller,
    Reservedlineflag,
}

impl CompToggle {
    /// Position of this toggle in a [`ToggleVector`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Level at which a behaviour changed, and level from which it is optional.
#[derive(Debug, Clone, Copy)]
struct ToggleHistory {
    fix: CompatibilityLevel,
    opt: CompatibilityLevel,
}

const fn history(fix: CompatibilityLevel, opt: CompatibilityLevel) -> ToggleHistory {
    ToggleHistory { fix, opt }
}

use CompatibilityLevel as L;

const COMP_TABLE: [ToggleHistory; COMP_TOTAL] = [
    history(L::Mbf, L::Mbf),            // telefrag
    history(L::Mbf, L::Mbf),            // dropoff
    history(L::Boom201, L::Mbf),        // vile
    history(L::Boom201, L::Mbf),        // pain
    history(L::Boom201, L::Mbf),        // skull
    history(L::Boom201, L::Mbf),        // blazing
    history(L::Boom201, L::Mbf),        // doorlight
    history(L::Boom201, L::Mbf),        // model
    history(L::Boom201, L::Mbf),        // god
    history(L::Mbf, L::Mbf),            // falloff
    history(L::BoomCompat, L::Mbf),     // floors
    history(L::Mbf, L::Mbf),            // skymap
    history(L::Mbf, L::Mbf),            // pursuit
    history(L::Boom202, L::Mbf),        // doorstuck
    history(L::Mbf, L::Mbf),            // staylift
    history(L::LxDoom1, L::Mbf),        // zombie
    history(L::Boom202, L::Mbf),        // stairs
    history(L::Mbf, L::Mbf),            // infcheat
    history(L::Boom201, L::Mbf),        // zerotags
    history(L::LxDoom1, L::PrBoom2),    // moveblock
    history(L::PrBoom2, L::PrBoom2),    // respawn
    history(L::BoomCompat, L::PrBoom3), // sound
    history(L::UltDoom, L::PrBoom4),    // 666
    history(L::PrBoom4, L::PrBoom4),    // soul
    history(L::Doom1666, L::PrBoom4),   // maskedanim
    history(L::PrBoom1, L::PrBoom6),    // ouchface
    history(L::BoomCompat, L::PrBoom6), // maxhealth
    history(L::BoomCompat, L::PrBoom6), // translucency
    history(L::Boom201, L::Mbf21),      // ledgeblock
    history(L::PrBoom1, L::Mbf21),      // friendlyspawn
    history(L::Mbf21, L::Mbf21),        // voodooscroller
    history(L::Mbf21, L::Mbf21),        // reservedlineflag
];

/// Toggles that mbf21 turned into unconditional behaviour.
const MBF21_FORCED_OFF: [CompToggle; 7] = [
    CompToggle::Moveblock,
    CompToggle::Sound,
    CompToggle::Comp666,
    CompToggle::Maskedanim,
    CompToggle::Ouchface,
    CompToggle::Maxhealth,
    CompToggle::Translucency,
];

/// Serialized order of the toggles in an mbf21 option block.
pub const MBF21_COMP_ORDER: [CompToggle; MBF21_COMP_TOTAL] = [
    CompToggle::Telefrag,
    CompToggle::Dropoff,
    CompToggle::Vile,
    CompToggle::Pain,
    CompToggle::Skull,
    CompToggle::Blazing,
    CompToggle::Doorlight,
    CompToggle::Model,
    CompToggle::God,
    CompToggle::Falloff,
    CompToggle::Floors,
    CompToggle::Skymap,
    CompToggle::Pursuit,
    CompToggle::Doorstuck,
    CompToggle::Staylift,
    CompToggle::Zombie,
    CompToggle::Stairs,
    CompToggle::Infcheat,
    CompToggle::Zerotags,
    CompToggle::Respawn,
    CompToggle::Soul,
    CompToggle::Ledgeblock,
    CompToggle::Friendlyspawn,
    CompToggle::Voodooscroller,
    CompToggle::Reservedlineflag,
];

/// The full behaviour toggle vector (`comp[]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ToggleVector([bool; COMP_TOTAL]);

impl ToggleVector {
    /// All toggles off.
    pub const EMPTY: ToggleVector = ToggleVector([false; COMP_TOTAL]);

    /// The vector implied by `level` alone.
    ///
    /// Toggles that are optional at `level` come out `false`, as they would for
    /// a demo whose stored vector was all zeroes.
    #[must_use]
    pub fn for_level(level: CompatibilityLevel) -> Self {
        Self::resolve(level, &Self::EMPTY)
    }

    /// Combines the level-implied toggles with an explicitly stored vector.
    ///
    /// For each toggle, a level below its optional level takes `level < fix`;
    /// otherwise the explicit value is kept.
    #[must_use]
    pub fn resolve(level: CompatibilityLevel, explicit: &ToggleVector) -> Self {
        let mut out = *explicit;
        for (slot, entry) in out.0.iter_mut().zip(COMP_TABLE.iter()) {
            if level < entry.opt {
                *slot = level < entry.fix;
            }
        }
        if level.is_mbf21() {
            for toggle in MBF21_FORCED_OFF {
                out.set(toggle, false);
            }
        }
        out
    }

    /// Builds a vector from serialized toggle bytes (non-zero = on).
    ///
    /// # Errors
    ///
    /// [`DemoError::ToggleVectorSize`] if `bytes` does not hold exactly
    /// [`COMP_TOTAL`] toggles.
    pub fn from_bytes(bytes: &[u8]) -> DemoResult<Self> {
        if bytes.len() != COMP_TOTAL {
            return Err(DemoError::ToggleVectorSize {
                expected: COMP_TOTAL,
                actual: bytes.len(),
            });
        }
        let mut out = Self::EMPTY;
        for (slot, byte) in out.0.iter_mut().zip(bytes) {
            *slot = *byte != 0;
        }
        Ok(out)
    }

    /// Serializes the vector as one byte per toggle.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; COMP_TOTAL] {
        let mut out = [0u8; COMP_TOTAL];
        for (byte, on) in out.iter_mut().zip(self.0) {
            *byte = u8::from(on);
        }
        out
    }

    /// Returns the state of one toggle.
    #[inline]
    #[must_use]
    pub fn get(&self, toggle: CompToggle) -> bool {
        self.0.get(toggle.index()).copied().unwrap_or(false)
    }

    /// Sets one toggle.
    #[inline]
    pub fn set(&mut self, toggle: CompToggle, on: bool) {
        if let Some(slot) = self.0.get_mut(toggle.index()) {
            *slot = on;
        }
    }

    /// Number of toggles that are on.
    #[must_use]
    pub fn count_on(&self) -> usize {
        self.0.iter().filter(|on| **on).count()
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
    use proptest::prelude::*;

    // ===== Levels =====

    #[test]
    fn reserved_slots_have_no_level() {
        for slot in 18..=20 {
            assert_eq!(CompatibilityLevel::try_from_u8(slot), None);
        }
        assert_eq!(CompatibilityLevel::try_from_u8(22), None);
        assert!(CompatibilityLevel::try_from(19).is_err());
    }

    #[test]
    fn all_levels_round_trip_through_slot_number() {
        for level in CompatibilityLevel::ALL {
            assert_eq!(CompatibilityLevel::try_from_u8(level.as_u8()), Some(level));
            assert!(!level.name().is_empty());
        }
    }

    #[test]
    fn derived_predicates() {
        assert!(L::FinalDoom.demo_compatibility());
        assert!(L::TasDoom.demo_compatibility());
        assert!(!L::BoomCompat.demo_compatibility());
        assert!(!L::LxDoom1.mbf_features());
        assert!(L::Mbf.mbf_features());
        assert!(L::Mbf21.is_mbf21());
        assert!(!L::PrBoom6.is_mbf21());
        assert_eq!(L::Doom1666.name(), "Doom v1.666");
        assert_eq!(L::Mbf21.to_string(), "21 (MBF21)");
    }

    // ===== Toggle vector =====

    #[test]
    fn vanilla_levels_turn_on_every_later_fix() {
        let v = ToggleVector::for_level(L::Doom2_19);
        assert!(v.get(CompToggle::Telefrag));
        assert!(v.get(CompToggle::Vile));
        assert!(v.get(CompToggle::Comp666));
        // maskedanim was fixed at v1.666
        assert!(!v.get(CompToggle::Maskedanim));
    }

    #[test]
    fn explicit_vector_wins_at_or_above_optional_level() {
        let mut explicit = ToggleVector::EMPTY;
        explicit.set(CompToggle::Vile, true);
        explicit.set(CompToggle::Ouchface, true);

        let resolved = ToggleVector::resolve(L::PrBoom4, &explicit);
        assert!(resolved.get(CompToggle::Vile));
        // ouchface is implied below PrBoom6: PrBoom4 >= PrBoom1 fix, so off
        assert!(!resolved.get(CompToggle::Ouchface));
    }

    #[test]
    fn mbf21_forces_deoptionalized_toggles_off() {
        let mut explicit = ToggleVector::EMPTY;
        for toggle in MBF21_FORCED_OFF {
            explicit.set(toggle, true);
        }
        explicit.set(CompToggle::Voodooscroller, true);
        let resolved = ToggleVector::resolve(L::Mbf21, &explicit);
        for toggle in MBF21_FORCED_OFF {
            assert!(!resolved.get(toggle), "{toggle:?} should be off");
        }
        assert!(resolved.get(CompToggle::Voodooscroller));
    }

    #[test]
    fn from_bytes_requires_historical_size() {
        let err = ToggleVector::from_bytes(&[0; 31]).unwrap_err();
        assert_eq!(
            err,
            DemoError::ToggleVectorSize {
                expected: 32,
                actual: 31
            }
        );

        let mut bytes = [0u8; COMP_TOTAL];
        bytes[CompToggle::Soul.index()] = 7;
        let v = ToggleVector::from_bytes(&bytes).unwrap();
        assert!(v.get(CompToggle::Soul));
        assert_eq!(v.to_bytes()[CompToggle::Soul.index()], 1);
        assert_eq!(v.count_on(), 1);
    }

    #[test]
    fn mbf21_order_excludes_forced_toggles() {
        for toggle in MBF21_FORCED_OFF {
            assert!(!MBF21_COMP_ORDER.contains(&toggle));
        }
    }

    fn level_strategy() -> impl Strategy<Value = CompatibilityLevel> {
        proptest::sample::select(CompatibilityLevel::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(miri_case_count()))]

        #[test]
        fn toggle_vector_is_pure(level in level_strategy(), bytes in proptest::array::uniform32(0u8..2)) {
            let explicit = ToggleVector::from_bytes(&bytes).unwrap();
            prop_assert_eq!(ToggleVector::for_level(level), ToggleVector::for_level(level));
            prop_assert_eq!(
                ToggleVector::resolve(level, &explicit),
                ToggleVector::resolve(level, &explicit)
            );
        }

        #[test]
        fn implied_toggles_ignore_explicit_vector(level in level_strategy(), bytes in proptest::array::uniform32(0u8..2)) {
            let explicit = ToggleVector::from_bytes(&bytes).unwrap();
            let resolved = ToggleVector::resolve(level, &explicit);
            let implied = ToggleVector::for_level(level);
            for (i, entry) in COMP_TABLE.iter().enumerate() {
                if level < entry.opt {
                    prop_assert_eq!(resolved.0[i], implied.0[i]);
                }
            }
        }
    }
}
