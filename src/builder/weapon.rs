//! Choosing the weapon a command asks for.
//!
//! Boom moved automatic switching out of the player code and into command
//! building. Demo-compatible levels keep the old behaviour: only the raw key
//! is sent and the game decides.

use serde::{Deserialize, Serialize};

use super::input::{InputState, PlayerView};
use crate::sessions::config::{EngineConfig, GameMission, GameMode};
use crate::ticcmd::Weapon;

/// Weapon cycling order for next/previous weapon: `(weapon, number sent)`.
const WEAPON_ORDER: [(Weapon, Weapon); 9] = [
    (Weapon::Fist, Weapon::Fist),
    (Weapon::Chainsaw, Weapon::Fist),
    (Weapon::Pistol, Weapon::Pistol),
    (Weapon::Shotgun, Weapon::Shotgun),
    (Weapon::SuperShotgun, Weapon::Shotgun),
    (Weapon::Chaingun, Weapon::Chaingun),
    (Weapon::Missile, Weapon::Missile),
    (Weapon::Plasma, Weapon::Plasma),
    (Weapon::Bfg, Weapon::Bfg),
];

/// Boom's default switch preferences, best first.
pub const DEFAULT_SWITCH_ORDER: [Weapon; 9] = [
    Weapon::Plasma,
    Weapon::SuperShotgun,
    Weapon::Chaingun,
    Weapon::Shotgun,
    Weapon::Pistol,
    Weapon::Chainsaw,
    Weapon::Missile,
    Weapon::Bfg,
    Weapon::Fist,
];

/// Weapon preference flags from the player's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WeaponPreferences {
    /// Switch automatically when the ready weapon runs dry.
    pub switch_when_ammo_runs_out: bool,
    /// Key 1 picks the chainsaw over the fist.
    pub prefer_chainsaw: bool,
    /// Key 3 picks the super shotgun over the shotgun.
    pub prefer_ssg: bool,
}

/// Weapon selection state carried between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WeaponSelector {
    done_autoswitch: bool,
}

fn selectable(config: &EngineConfig, view: &PlayerView, weapon: Weapon) -> bool {
    if config.mode == GameMode::Shareware && matches!(weapon, Weapon::Plasma | Weapon::Bfg) {
        return false;
    }
    if weapon == Weapon::SuperShotgun && config.mission == GameMission::Doom {
        return false;
    }
    view.owns(weapon)
}

/// The weapon `direction` steps away from the current one in cycling order,
/// skipping weapons that cannot be selected.
#[must_use]
pub fn next_weapon(config: &EngineConfig, view: &PlayerView, direction: i8) -> Weapon {
    let current = view.pending_weapon.unwrap_or(view.ready_weapon);
    let len = WEAPON_ORDER.len() as i32;
    let start = WEAPON_ORDER
        .iter()
        .position(|(weapon, _)| *weapon == current)
        .map_or(len, |i| i as i32);
    let mut i = start;
    for _ in 0..len {
        i = (i + i32::from(direction) + len) % len;
        match WEAPON_ORDER.get(i as usize) {
            Some(&(weapon, number)) if i == start || selectable(config, view, weapon) => {
                return number;
            }
            _ => {}
        }
    }
    current
}

/// The weapon automatic switching picks: the first preference that is owned,
/// has ammo and differs from the ready weapon. The fist only counts with berserk.
#[must_use]
pub fn switch_weapon(config: &EngineConfig, view: &PlayerView) -> Weapon {
    let current = view.ready_weapon;
    for weapon in DEFAULT_SWITCH_ORDER {
        let usable = match weapon {
            Weapon::Fist => view.has_strength,
            Weapon::Chainsaw => view.owns(weapon),
            Weapon::Plasma | Weapon::Bfg => {
                config.mode != GameMode::Shareware && view.can_fire(weapon)
            }
            Weapon::SuperShotgun => config.mode == GameMode::Commercial && view.can_fire(weapon),
            _ => view.can_fire(weapon),
        };
        if usable && weapon != current {
            return weapon;
        }
    }
    current
}

fn key_weapon(config: &EngineConfig, key: u8, demo_compatibility: bool) -> Option<Weapon> {
    let no_shareware = config.mode != GameMode::Shareware;
    match key {
        1 => Some(Weapon::Fist),
        2 => Some(Weapon::Pistol),
        3 => Some(Weapon::Shotgun),
        4 => Some(Weapon::Chaingun),
        5 => Some(Weapon::Missile),
        6 if no_shareware => Some(Weapon::Plasma),
        7 if no_shareware => Some(Weapon::Bfg),
        8 => Some(Weapon::Chainsaw),
        9 if !demo_compatibility && config.mode == GameMode::Commercial => {
            Some(Weapon::SuperShotgun)
        }
        _ => None,
    }
}

impl WeaponSelector {
    /// Returns the weapon to request this tick, if any.
    ///
    /// `firing` is whether the command already carries the attack button.
    pub fn select(
        &mut self,
        config: &EngineConfig,
        prefs: &WeaponPreferences,
        input: &InputState,
        view: &PlayerView,
        firing: bool,
        demo_compatibility: bool,
    ) -> Option<Weapon> {
        if !view.attack_down {
            self.done_autoswitch = false;
        }

        let out_of_ammo = !demo_compatibility
            && view.attack_down
            && !view.ready_weapon_has_ammo()
            && ((prefs.switch_when_ammo_runs_out && !self.done_autoswitch) || firing);
        if out_of_ammo || (!config.game.is_hexen() && input.toggle_weapon) {
            self.done_autoswitch = true;
            return Some(switch_weapon(config, view));
        }

        let mut choice = if input.next_weapon != 0 && !view.morphed {
            Some(next_weapon(config, view, input.next_weapon))
        } else if config.game.is_hexen() {
            input
                .weapon_key
                .filter(|key| (1..=4).contains(key))
                .and_then(|key| Weapon::from_index(key - 1))
        } else {
            input
                .weapon_key
                .and_then(|key| key_weapon(config, key, demo_compatibility))
        };

        if !demo_compatibility {
            choice = choice.map(|weapon| prefer_pairs(config, prefs, view, weapon));
        }
        choice
    }
}

fn prefer_pairs(
    config: &EngineConfig,
    prefs: &WeaponPreferences,
    view: &PlayerView,
    weapon: Weapon,
) -> Weapon {
    let ready = view.ready_weapon;
    if weapon == Weapon::Fist
        && view.owns(Weapon::Chainsaw)
        && ready != Weapon::Chainsaw
        && (ready == Weapon::Fist || !view.has_strength || prefs.prefer_chainsaw)
    {
        return Weapon::Chainsaw;
    }
    if weapon == Weapon::Shotgun
        && config.mode == GameMode::Commercial
        && view.owns(Weapon::SuperShotgun)
        && (!view.owns(Weapon::Shotgun)
            || ready == Weapon::Shotgun
            || (ready != Weapon::SuperShotgun && prefs.prefer_ssg))
    {
        return Weapon::SuperShotgun;
    }
    weapon
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
    use crate::sessions::config::Game;

    fn armed() -> PlayerView {
        let mut view = PlayerView::default();
        for weapon in [Weapon::Shotgun, Weapon::SuperShotgun, Weapon::Chainsaw, Weapon::Chaingun] {
            view.owned[weapon as usize] = true;
            view.has_ammo[weapon as usize] = true;
        }
        view
    }

    fn key(n: u8) -> InputState {
        InputState {
            weapon_key: Some(n),
            ..InputState::default()
        }
    }

    // ===== Keys =====

    #[test]
    fn plain_key_selects_weapon() {
        let config = EngineConfig::default();
        let mut selector = WeaponSelector::default();
        let view = PlayerView::default();
        let prefs = WeaponPreferences::default();
        let choice = selector.select(&config, &prefs, &key(2), &view, false, false);
        assert_eq!(choice, Some(Weapon::Pistol));
        assert_eq!(selector.select(&config, &prefs, &InputState::default(), &view, false, false), None);
    }

    #[test]
    fn shareware_has_no_plasma_key() {
        let config = EngineConfig {
            mode: GameMode::Shareware,
            mission: GameMission::Doom,
            ..EngineConfig::default()
        };
        let mut selector = WeaponSelector::default();
        let view = PlayerView::default();
        let prefs = WeaponPreferences::default();
        assert_eq!(selector.select(&config, &prefs, &key(6), &view, false, false), None);
    }

    #[test]
    fn ssg_key_is_not_demo_compatible() {
        let config = EngineConfig::default();
        let mut selector = WeaponSelector::default();
        let prefs = WeaponPreferences::default();
        assert_eq!(selector.select(&config, &prefs, &key(9), &armed(), false, true), None);
        assert_eq!(
            selector.select(&config, &prefs, &key(9), &armed(), false, false),
            Some(Weapon::SuperShotgun)
        );
    }

    // ===== Preference pairs =====

    #[test]
    fn key_one_picks_chainsaw_without_berserk() {
        let config = EngineConfig::default();
        let mut selector = WeaponSelector::default();
        let prefs = WeaponPreferences::default();
        let choice = selector.select(&config, &prefs, &key(1), &armed(), false, false);
        assert_eq!(choice, Some(Weapon::Chainsaw));
        // Old demos send the raw key.
        let choice = selector.select(&config, &prefs, &key(1), &armed(), false, true);
        assert_eq!(choice, Some(Weapon::Fist));
    }

    #[test]
    fn key_one_with_berserk_respects_preference() {
        let config = EngineConfig::default();
        let mut selector = WeaponSelector::default();
        let mut view = armed();
        view.has_strength = true;
        let mut prefs = WeaponPreferences::default();
        assert_eq!(
            selector.select(&config, &prefs, &key(1), &view, false, false),
            Some(Weapon::Fist)
        );
        prefs.prefer_chainsaw = true;
        assert_eq!(
            selector.select(&config, &prefs, &key(1), &view, false, false),
            Some(Weapon::Chainsaw)
        );
    }

    #[test]
    fn key_three_toggles_between_shotguns() {
        let config = EngineConfig::default();
        let mut selector = WeaponSelector::default();
        let prefs = WeaponPreferences::default();
        let mut view = armed();
        view.ready_weapon = Weapon::Shotgun;
        assert_eq!(
            selector.select(&config, &prefs, &key(3), &view, false, false),
            Some(Weapon::SuperShotgun)
        );
        view.ready_weapon = Weapon::SuperShotgun;
        assert_eq!(
            selector.select(&config, &prefs, &key(3), &view, false, false),
            Some(Weapon::Shotgun)
        );
    }

    // ===== Automatic switching =====

    #[test]
    fn empty_weapon_switches_once_while_firing() {
        let config = EngineConfig::default();
        let mut selector = WeaponSelector::default();
        let prefs = WeaponPreferences {
            switch_when_ammo_runs_out: true,
            ..WeaponPreferences::default()
        };
        let mut view = armed();
        view.ready_weapon = Weapon::Chaingun;
        view.has_ammo[Weapon::Chaingun as usize] = false;
        view.attack_down = true;
        let idle = InputState::default();
        assert_eq!(
            selector.select(&config, &prefs, &idle, &view, false, false),
            Some(Weapon::SuperShotgun)
        );
        assert_eq!(selector.select(&config, &prefs, &idle, &view, false, false), None);
        // Still firing re-triggers regardless of the setting.
        assert!(selector.select(&config, &prefs, &idle, &view, true, false).is_some());
    }

    #[test]
    fn no_autoswitch_at_demo_compatible_levels() {
        let config = EngineConfig::default();
        let mut selector = WeaponSelector::default();
        let prefs = WeaponPreferences {
            switch_when_ammo_runs_out: true,
            ..WeaponPreferences::default()
        };
        let mut view = armed();
        view.ready_weapon = Weapon::Chaingun;
        view.has_ammo[Weapon::Chaingun as usize] = false;
        view.attack_down = true;
        assert_eq!(
            selector.select(&config, &prefs, &InputState::default(), &view, true, true),
            None
        );
    }

    // ===== Cycling =====

    #[test]
    fn next_weapon_skips_unowned() {
        let config = EngineConfig::default();
        let view = PlayerView::default();
        assert_eq!(next_weapon(&config, &view, 1), Weapon::Fist);
        assert_eq!(next_weapon(&config, &view, -1), Weapon::Fist);
        let mut view = armed();
        view.ready_weapon = Weapon::Shotgun;
        // the super shotgun is sent as the shotgun number
        assert_eq!(next_weapon(&config, &view, 1), Weapon::Shotgun);
        view.ready_weapon = Weapon::SuperShotgun;
        assert_eq!(next_weapon(&config, &view, 1), Weapon::Chaingun);
    }

    #[test]
    fn hexen_keys_stop_at_four() {
        let config = EngineConfig {
            game: Game::Hexen,
            ..EngineConfig::default()
        };
        let mut selector = WeaponSelector::default();
        let prefs = WeaponPreferences::default();
        let view = PlayerView::default();
        assert_eq!(
            selector.select(&config, &prefs, &key(4), &view, false, true),
            Some(Weapon::Chaingun)
        );
        assert_eq!(selector.select(&config, &prefs, &key(5), &view, false, true), None);
    }
}
