//! What the builder samples each tick: device state and the console player.

use serde::{Deserialize, Serialize};

use crate::sessions::config::Game;
use crate::ticcmd::Weapon;

/// Device state for one tick, already mapped from bindings to actions.
///
/// "Held" fields are true for every tick the key is down; "pressed" fields
/// are true only on the tick the key went down.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputState {
    /// Move forward (held).
    pub forward: bool,
    /// Move backward (held).
    pub backward: bool,
    /// Turn left (held).
    pub turn_left: bool,
    /// Turn right (held).
    pub turn_right: bool,
    /// Strafe left (held).
    pub strafe_left: bool,
    /// Strafe right (held).
    pub strafe_right: bool,
    /// Strafe modifier: turning keys and mouse strafe instead (held).
    pub strafe: bool,
    /// Run key; inverts autorun (held).
    pub speed: bool,
    /// Turn 180 degrees (pressed).
    pub reverse: bool,
    /// Fire (held).
    pub fire: bool,
    /// Use (held or pressed).
    pub use_: bool,
    /// Weapon number key 1..=9 (held).
    pub weapon_key: Option<u8>,
    /// Cycle weapons: -1 previous, 1 next (pressed).
    pub next_weapon: i8,
    /// Toggle between the two favourite weapons (held).
    pub toggle_weapon: bool,
    /// Joystick x axis; only the sign is used.
    pub joy_x: i32,
    /// Joystick y axis; only the sign is used.
    pub joy_y: i32,
    /// Horizontal mouse motion since the last tick, sensitivity applied.
    pub mouse_x: f64,
    /// Vertical mouse motion since the last tick, sensitivity applied.
    pub mouse_y: f64,
    /// Mouse button bound to forward (held); feeds double-click use.
    pub mouse_forward_button: bool,
    /// Mouse or joystick button bound to strafe (held); feeds double-click use.
    pub mouse_strafe_button: bool,
    /// Raven: look up (held).
    pub look_up: bool,
    /// Raven: look down (held).
    pub look_down: bool,
    /// Raven: center view (held).
    pub look_center: bool,
    /// Raven: fly up (held).
    pub fly_up: bool,
    /// Raven: fly down (held).
    pub fly_down: bool,
    /// Raven: stop flying (held).
    pub fly_center: bool,
    /// Raven: artifact to use this tick.
    pub artifact: Option<u8>,
    /// Jump (held).
    pub jump: bool,
    /// Pause was requested (pressed).
    pub pause: bool,
    /// Save to this slot was requested (pressed).
    pub save_slot: Option<u8>,
}

impl InputState {
    /// Nothing held, nothing pressed.
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }
}

/// What the builder needs to know about the console player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    /// Weapon currently raised.
    pub ready_weapon: Weapon,
    /// Weapon being switched to, if any.
    pub pending_weapon: Option<Weapon>,
    /// Owned weapons, by [`Weapon::index`].
    pub owned: [bool; Weapon::COUNT],
    /// Weapons with enough ammo to fire, by [`Weapon::index`].
    pub has_ammo: [bool; Weapon::COUNT],
    /// The berserk power is active.
    pub has_strength: bool,
    /// The fire button was held on the previous tick.
    pub attack_down: bool,
    /// The player is alive.
    pub alive: bool,
    /// Raven speed artifact active.
    pub speed_power: bool,
    /// Raven morph (chicken/pig) active; weapons cannot change.
    pub morphed: bool,
}

impl Default for PlayerView {
    fn default() -> Self {
        let mut owned = [false; Weapon::COUNT];
        owned[Weapon::Fist as usize] = true;
        owned[Weapon::Pistol as usize] = true;
        let mut has_ammo = [false; Weapon::COUNT];
        has_ammo[Weapon::Fist as usize] = true;
        has_ammo[Weapon::Pistol as usize] = true;
        Self {
            ready_weapon: Weapon::Pistol,
            pending_weapon: None,
            owned,
            has_ammo,
            has_strength: false,
            attack_down: false,
            alive: true,
            speed_power: false,
            morphed: false,
        }
    }
}

impl PlayerView {
    /// Returns `true` if `weapon` is owned.
    #[must_use]
    pub fn owns(&self, weapon: Weapon) -> bool {
        self.owned.get(weapon as usize).copied().unwrap_or(false)
    }

    /// Returns `true` if `weapon` has ammo to fire.
    #[must_use]
    pub fn can_fire(&self, weapon: Weapon) -> bool {
        self.owns(weapon) && self.has_ammo.get(weapon as usize).copied().unwrap_or(false)
    }

    /// Whether the ready weapon can still fire.
    #[must_use]
    pub fn ready_weapon_has_ammo(&self) -> bool {
        self.can_fire(self.ready_weapon)
    }
}

/// Walk and run speeds, `[walk, run]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovementSpeeds {
    /// Forward move per tick.
    pub forward: [i32; 2],
    /// Side move per tick.
    pub side: [i32; 2],
}

impl MovementSpeeds {
    /// Doom and Heretic player speeds.
    pub const DOOM: MovementSpeeds = MovementSpeeds {
        forward: [0x19, 0x32],
        side: [0x18, 0x28],
    };

    /// Hexen fighter speeds.
    pub const HEXEN_FIGHTER: MovementSpeeds = MovementSpeeds {
        forward: [0x1d, 0x3c],
        side: [0x1b, 0x3b],
    };

    /// Hexen mage speeds.
    pub const HEXEN_MAGE: MovementSpeeds = MovementSpeeds {
        forward: [0x16, 0x2e],
        side: [0x15, 0x25],
    };

    /// Speeds for `game`; Hexen classes are 0 fighter, 1 cleric, 2 mage.
    #[must_use]
    pub const fn for_game(game: Game, class: u8) -> Self {
        match (game, class) {
            (Game::Hexen, 0) => Self::HEXEN_FIGHTER,
            (Game::Hexen, 2) => Self::HEXEN_MAGE,
            _ => Self::DOOM,
        }
    }

    /// Largest movement a command may carry.
    #[must_use]
    pub const fn max_move(&self) -> i32 {
        self.forward[1]
    }

    /// Applies a turbo scale in percent. Side speeds keep strafe-50 when
    /// `always_sr50` is on.
    #[must_use]
    pub const fn scaled(self, always_sr50: bool, turbo: Option<u16>) -> Self {
        let mut side = if always_sr50 { self.forward } else { self.side };
        let mut forward = self.forward;
        if let Some(scale) = turbo {
            let scale = scale as i32;
            forward = [forward[0] * scale / 100, forward[1] * scale / 100];
            side = [side[0] * scale / 100, side[1] * scale / 100];
        }
        Self { forward, side }
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

    #[test]
    fn default_player_starts_with_pistol() {
        let view = PlayerView::default();
        assert!(view.ready_weapon_has_ammo());
        assert!(view.owns(Weapon::Fist));
        assert!(!view.owns(Weapon::Shotgun));
        assert!(!view.can_fire(Weapon::Shotgun));
    }

    #[test]
    fn turbo_scales_both_axes() {
        let speeds = MovementSpeeds::DOOM.scaled(false, Some(200));
        assert_eq!(speeds.forward, [0x32, 0x64]);
        assert_eq!(speeds.side, [0x30, 0x50]);
    }

    #[test]
    fn always_sr50_uses_forward_speeds_sideways() {
        let speeds = MovementSpeeds::DOOM.scaled(true, None);
        assert_eq!(speeds.side, speeds.forward);
    }

    #[test]
    fn hexen_class_speeds() {
        assert_eq!(
            MovementSpeeds::for_game(Game::Hexen, 0),
            MovementSpeeds::HEXEN_FIGHTER
        );
        assert_eq!(MovementSpeeds::for_game(Game::Hexen, 1), MovementSpeeds::DOOM);
        assert_eq!(MovementSpeeds::for_game(Game::Doom, 2), MovementSpeeds::DOOM);
    }
}
