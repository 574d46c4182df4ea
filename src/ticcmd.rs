//! The per-player, per-tick input command.

use serde::{Deserialize, Serialize};

/// Button bits of [`TickCommand::buttons`].
pub mod buttons {
    /// Press "fire".
    pub const BT_ATTACK: u8 = 1;
    /// Use button, to open doors, activate switches.
    pub const BT_USE: u8 = 2;
    /// A weapon change is pending; the weapon number is in [`BT_WEAPONMASK`].
    pub const BT_CHANGE: u8 = 4;
    /// Weapon number, shifted by [`BT_WEAPONSHIFT`].
    pub const BT_WEAPONMASK: u8 = 0x78;
    /// Shift of the weapon number inside the button byte.
    pub const BT_WEAPONSHIFT: u8 = 3;
    /// Marks a player joining a running demo. Shares bits with the weapon mask;
    /// only meaningful when [`BT_CHANGE`] is clear.
    pub const BT_JOIN: u8 = 0x40;

    /// The command is a special event; the remaining bits select which.
    pub const BT_SPECIAL: u8 = 0x80;
    /// Special event selector bits.
    pub const BT_SPECIALMASK: u8 = 3;
    /// Special event: toggle pause.
    pub const BT_PAUSE: u8 = 1;
    /// Special event: save the game.
    pub const BTS_SAVEGAME: u8 = 2;
    /// Save slot bits of a save special event.
    pub const BTS_SAVEMASK: u8 = 0x1c;
    /// Shift of the save slot inside a save special event.
    pub const BTS_SAVESHIFT: u8 = 2;
}

/// Action bits of [`ExtendedCommand::actions`].
pub mod actions {
    /// Save to [`ExtendedCommand::save_slot`](super::ExtendedCommand::save_slot).
    pub const XC_SAVE: u8 = 0x01;
    /// Load from [`ExtendedCommand::load_slot`](super::ExtendedCommand::load_slot).
    pub const XC_LOAD: u8 = 0x02;
    /// Toggle god mode.
    pub const XC_GOD: u8 = 0x04;
    /// Toggle no-clipping.
    pub const XC_NOCLIP: u8 = 0x08;
    /// Jump, where the game allows it.
    pub const XC_JUMP: u8 = 0x10;
}

/// Heretic/Hexen look and fly nibble values packed into [`TickCommand::look_fly`].
pub mod look {
    /// Center the view (low nibble) or stop flying (high nibble).
    pub const TOCENTER: i8 = -8;
    /// Look speed steps for a held look key.
    pub const LOOKSPEED: [i8; 2] = [1, 2];
    /// Flight speed steps for a held fly key.
    pub const FLYSPEED: [i8; 2] = [5, 10];
}

/// Requests embedded in a command when extended commands are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExtendedCommand {
    /// Bitmask of `XC_*` actions.
    pub actions: u8,
    /// Save slot, valid with [`actions::XC_SAVE`].
    pub save_slot: u8,
    /// Load slot, valid with [`actions::XC_LOAD`].
    pub load_slot: u8,
}

impl ExtendedCommand {
    /// No requests.
    pub const NONE: ExtendedCommand = ExtendedCommand {
        actions: 0,
        save_slot: 0,
        load_slot: 0,
    };

    /// Returns `true` if any action bit is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions == 0
    }

    /// Returns `true` if `action` is requested.
    #[inline]
    #[must_use]
    pub const fn has(&self, action: u8) -> bool {
        self.actions & action != 0
    }
}

/// One player's input for one simulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TickCommand {
    /// Forward movement; positive is forward.
    pub forward: i8,
    /// Side movement; positive is right.
    pub side: i8,
    /// Turn delta in angle units; positive turns left.
    pub angle_turn: i16,
    /// Button bits, see [`buttons`].
    pub buttons: u8,
    /// Raven look (low nibble) and fly (high nibble) request.
    pub look_fly: u8,
    /// Raven inventory artifact to use this tick.
    pub artifact: u8,
    /// Extended requests, only stored when the extended command feature is on.
    pub ext: ExtendedCommand,
}

impl TickCommand {
    /// A command with nothing pressed.
    pub const EMPTY: TickCommand = TickCommand {
        forward: 0,
        side: 0,
        angle_turn: 0,
        buttons: 0,
        look_fly: 0,
        artifact: 0,
        ext: ExtendedCommand::NONE,
    };

    /// Returns the weapon selected by a `BT_CHANGE` command.
    #[must_use]
    pub fn pending_weapon(&self) -> Option<Weapon> {
        if self.buttons & buttons::BT_SPECIAL != 0 || self.buttons & buttons::BT_CHANGE == 0 {
            return None;
        }
        Weapon::from_index((self.buttons & buttons::BT_WEAPONMASK) >> buttons::BT_WEAPONSHIFT)
    }

    /// Returns `true` for a special event command (pause, save).
    #[inline]
    #[must_use]
    pub const fn is_special(&self) -> bool {
        self.buttons & buttons::BT_SPECIAL != 0
    }
}

/// Doom weapons in selection-slot order.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Weapon {
    Fist = 0,
    Pistol,
    Shotgun,
    Chaingun,
    Missile,
    Plasma,
    Bfg,
    Chainsaw,
    SuperShotgun,
}

impl Weapon {
    /// Number of real weapons.
    pub const COUNT: usize = 9;

    /// Looks up a weapon by its `BT_WEAPONMASK` index.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0 => Self::Fist,
            1 => Self::Pistol,
            2 => Self::Shotgun,
            3 => Self::Chaingun,
            4 => Self::Missile,
            5 => Self::Plasma,
            6 => Self::Bfg,
            7 => Self::Chainsaw,
            8 => Self::SuperShotgun,
            _ => return None,
        })
    }

    /// The weapon's index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Button bits selecting this weapon.
    #[inline]
    #[must_use]
    pub const fn change_bits(self) -> u8 {
        buttons::BT_CHANGE | (self.index() << buttons::BT_WEAPONSHIFT)
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
    use super::buttons::*;
    use super::*;

    #[test]
    fn change_bits_round_trip_through_pending_weapon() {
        for index in 0..Weapon::COUNT as u8 {
            let weapon = Weapon::from_index(index).unwrap();
            let cmd = TickCommand {
                buttons: weapon.change_bits() | BT_ATTACK,
                ..TickCommand::EMPTY
            };
            assert_eq!(cmd.pending_weapon(), Some(weapon));
        }
        assert_eq!(Weapon::from_index(9), None);
    }

    #[test]
    fn join_bit_is_not_a_weapon_change() {
        let cmd = TickCommand {
            buttons: BT_JOIN,
            ..TickCommand::EMPTY
        };
        assert_eq!(cmd.pending_weapon(), None);
    }

    #[test]
    fn special_commands_carry_no_weapon() {
        let cmd = TickCommand {
            buttons: BT_SPECIAL | BTS_SAVEGAME | (3 << BTS_SAVESHIFT) | BT_CHANGE,
            ..TickCommand::EMPTY
        };
        assert!(cmd.is_special());
        assert_eq!(cmd.pending_weapon(), None);
        assert_eq!((cmd.buttons & BTS_SAVEMASK) >> BTS_SAVESHIFT, 3);
    }

    #[test]
    fn extended_action_bits() {
        let ext = ExtendedCommand {
            actions: actions::XC_SAVE | actions::XC_GOD,
            save_slot: 4,
            load_slot: 0,
        };
        assert!(ext.has(actions::XC_SAVE));
        assert!(ext.has(actions::XC_GOD));
        assert!(!ext.has(actions::XC_LOAD));
        assert!(!ext.is_empty());
        assert!(ExtendedCommand::NONE.is_empty());
    }
}
