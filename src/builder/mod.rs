//! Tick Command Builder: produces the authoritative command for one tick.
//!
//! Sources, highest priority first:
//!
//! 1. Build mode, while it replaces the recorded source.
//! 2. Scripted commands (skip mode).
//! 3. Brute-force search candidates.
//! 4. Build mode stepping through what was already recorded.
//! 5. Live input.
//!
//! Every source passes through the join step last, which marks commands that
//! take over a demo so a replay of the joined demo stays in sync.

pub mod build_mode;
pub mod carry;
pub mod input;
pub mod queues;
pub mod weapon;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use build_mode::BuildMode;
pub use input::{InputState, MovementSpeeds, PlayerView};
pub use queues::{BruteForceQueue, ScriptedCommand, ScriptedQueue};
pub use weapon::WeaponPreferences;

use crate::codec::short_angle;
use crate::demo::stream::DemoByteStream;
use crate::error::{DemoError, DemoResult};
use crate::report_violation_to;
use crate::sessions::config::{EngineConfig, FirstInput};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::ticcmd::actions::XC_JUMP;
use crate::ticcmd::buttons::{
    BTS_SAVEGAME, BTS_SAVEMASK, BTS_SAVESHIFT, BT_ATTACK, BT_CHANGE, BT_JOIN, BT_PAUSE,
    BT_SPECIAL, BT_USE,
};
use crate::ticcmd::look::{LOOKSPEED, TOCENTER};
use crate::ticcmd::{ExtendedCommand, TickCommand};
use carry::{carry_double, DoubleClick, MouseCarry};
use weapon::WeaponSelector;

/// Ticks a turn key must be held before turning at full speed.
pub const SLOWTURNTICS: u32 = 6;

/// Keyboard turn speeds: walk, run, and the slow start of a held turn.
pub const ANGLETURN: [i32; 3] = [640, 1280, 320];

/// Half a turn, added by the quick-reverse key.
const QUICKREVERSE: i32 = 0x8000;

/// Hexen artifact flag requesting a jump.
const AFLAG_JUMP: u8 = 0x80;

/// Fly speed for a held fly key; doubled by the game.
const FLY_STEP: i32 = 5;

const DEFAULT_MOUSE_STRAFE_DIVISOR: f64 = 4.0;
const MIN_TURBO: u16 = 10;
const MAX_TURBO: u16 = 400;

/// Sets the join bit on a command that takes over a demo.
///
/// The bit shares space with the weapon number, so it is only set when the
/// command carries no weapon change, or when old demos cannot carry direct
/// super shotgun selection anyway.
pub fn apply_join(cmd: &mut TickCommand, demo_compatibility: bool, allow_ssg_direct: bool) {
    if (demo_compatibility && !allow_ssg_direct) || cmd.buttons & BT_CHANGE == 0 {
        cmd.buttons |= BT_JOIN;
    }
}

/// Player settings that shape live input.
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Use the
/// `..BuilderSettings::default()` pattern when constructing instances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[must_use = "BuilderSettings has no effect unless passed to SessionBuilder::with_builder_settings()"]
pub struct BuilderSettings {
    /// Run by default; the run key walks.
    ///
    /// Default: `true`
    pub autorun: bool,
    /// Strafe at forward speed (strafe-50).
    ///
    /// Default: `false`
    pub always_sr50: bool,
    /// Keep strafe-50 while turning.
    ///
    /// Default: `false`
    pub strafe50_on_turns: bool,
    /// Vertical mouse motion does not move the player.
    ///
    /// Default: `false`
    pub novert: bool,
    /// A double click on the forward or strafe mouse button presses use.
    ///
    /// Default: `false`
    pub mouse_doubleclick_as_use: bool,
    /// Carry the remainder of rounded 8-bit angles into the next tick.
    ///
    /// Default: `false`
    pub mouse_carrytics: bool,
    /// Divides mouse motion when it strafes.
    ///
    /// Default: `4.0`
    pub mouse_strafe_divisor: f64,
    /// Switch weapons when the ready weapon runs out of ammo.
    ///
    /// Default: `true`
    pub switch_when_ammo_runs_out: bool,
    /// Key 1 prefers the chainsaw.
    ///
    /// Default: `false`
    pub prefer_chainsaw: bool,
    /// Key 3 prefers the super shotgun.
    ///
    /// Default: `false`
    pub prefer_ssg: bool,
    /// Movement scale in percent, 10 to 400.
    ///
    /// Default: `None`
    pub turbo: Option<u16>,
    /// The game allows jumping.
    ///
    /// Default: `false`
    pub allow_jumping: bool,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            autorun: true,
            always_sr50: false,
            strafe50_on_turns: false,
            novert: false,
            mouse_doubleclick_as_use: false,
            mouse_carrytics: false,
            mouse_strafe_divisor: DEFAULT_MOUSE_STRAFE_DIVISOR,
            switch_when_ammo_runs_out: true,
            prefer_chainsaw: false,
            prefer_ssg: false,
            turbo: None,
            allow_jumping: false,
        }
    }
}

impl BuilderSettings {
    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`DemoError::InvalidRequest`] if the turbo scale is outside
    /// 10..=400 or the strafe divisor is not a positive number.
    pub fn validate(&self) -> Result<(), DemoError> {
        if let Some(turbo) = self.turbo {
            if !(MIN_TURBO..=MAX_TURBO).contains(&turbo) {
                return Err(DemoError::InvalidRequest {
                    info: format!(
                        "turbo scale {}% outside {}..={}",
                        turbo, MIN_TURBO, MAX_TURBO
                    ),
                });
            }
        }
        if !(self.mouse_strafe_divisor.is_finite() && self.mouse_strafe_divisor > 0.0) {
            return Err(DemoError::InvalidRequest {
                info: format!(
                    "mouse strafe divisor must be positive, got {}",
                    self.mouse_strafe_divisor
                ),
            });
        }
        Ok(())
    }

    /// The weapon preference flags.
    #[must_use]
    pub const fn weapon_preferences(&self) -> WeaponPreferences {
        WeaponPreferences {
            switch_when_ammo_runs_out: self.switch_when_ammo_runs_out,
            prefer_chainsaw: self.prefer_chainsaw,
            prefer_ssg: self.prefer_ssg,
        }
    }
}

/// Session state the builder reads each tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildContext<'a> {
    /// The session's level is demo compatible.
    pub demo_compatibility: bool,
    /// A demo is being recorded.
    pub recording: bool,
    /// A demo is being played back.
    pub playback: bool,
    /// Recorded angles are 16 bits.
    pub longtics: bool,
    /// Round angles to 8 bits even when they are recorded with 16.
    pub shorttics: bool,
    /// Tics into the current level.
    pub level_time: i32,
    /// Tics spent in previous levels.
    pub total_level_times: i32,
    /// Skip mode is fast-forwarding.
    pub skip_mode: bool,
    /// Extended commands are recorded.
    pub allow_extended: bool,
    /// The recording stream, for stepping through recorded commands.
    pub stream: Option<&'a DemoByteStream>,
}

/// Where a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickSource {
    /// The build-mode command.
    BuildMode,
    /// A scripted queue entry.
    Scripted,
    /// A brute-force candidate.
    BruteForce,
    /// Data already recorded at the cursor.
    Recorded,
    /// Nothing; the demo is being played and recorded at once.
    Idle,
    /// Sampled devices.
    Live,
}

/// The command for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltCommand {
    /// The command.
    pub cmd: TickCommand,
    /// Its source.
    pub source: TickSource,
    /// The scripted queue ran dry with this command; skip mode should end.
    pub skip_exhausted: bool,
}

/// Builds one command per tick for the console player.
pub struct TickCommandBuilder {
    config: EngineConfig,
    settings: BuilderSettings,
    base_speeds: MovementSpeeds,
    speeds: MovementSpeeds,
    first_input: Option<FirstInput>,
    build_mode: BuildMode,
    scripted: ScriptedQueue,
    brute_force: BruteForceQueue,
    weapons: WeaponSelector,
    turn_held: u32,
    look_held: u32,
    carry: MouseCarry,
    click_forward: DoubleClick,
    click_strafe: DoubleClick,
    pending_ext: ExtendedCommand,
    join_armed: bool,
    observer: Option<Arc<dyn ViolationObserver>>,
}

impl fmt::Debug for TickCommandBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickCommandBuilder")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .field("build_mode", &self.build_mode)
            .field("scripted", &self.scripted.depth())
            .field("brute_force", &self.brute_force.is_active())
            .field("join_armed", &self.join_armed)
            .finish_non_exhaustive()
    }
}

impl TickCommandBuilder {
    /// Creates a builder.
    ///
    /// # Errors
    ///
    /// Returns [`DemoError::InvalidRequest`] if `settings` do not validate.
    pub fn new(config: EngineConfig, settings: BuilderSettings) -> DemoResult<Self> {
        Self::for_class(config, settings, 0)
    }

    /// Creates a builder moving at the speeds of Hexen player `class`.
    ///
    /// # Errors
    ///
    /// Returns [`DemoError::InvalidRequest`] if `settings` do not validate.
    pub fn for_class(config: EngineConfig, settings: BuilderSettings, class: u8) -> DemoResult<Self> {
        settings.validate()?;
        let speeds = MovementSpeeds::for_game(config.game, class);
        Ok(Self::with_speeds(config, settings, speeds))
    }

    /// Creates a builder for a player with non-Doom movement speeds.
    #[must_use]
    pub fn with_speeds(
        config: EngineConfig,
        settings: BuilderSettings,
        speeds: MovementSpeeds,
    ) -> Self {
        Self {
            config,
            base_speeds: speeds,
            speeds: speeds.scaled(settings.always_sr50, settings.turbo),
            settings,
            first_input: None,
            build_mode: BuildMode::new(speeds),
            scripted: ScriptedQueue::new(),
            brute_force: BruteForceQueue::new(),
            weapons: WeaponSelector::default(),
            turn_held: 0,
            look_held: 0,
            carry: MouseCarry::default(),
            click_forward: DoubleClick::default(),
            click_strafe: DoubleClick::default(),
            pending_ext: ExtendedCommand::NONE,
            join_armed: false,
            observer: None,
        }
    }

    /// Forces the first recorded command of the session.
    pub fn set_first_input(&mut self, first_input: Option<FirstInput>) {
        self.first_input = first_input;
    }

    /// Reports oddities to `observer` instead of the tracing fallback.
    pub fn set_observer(&mut self, observer: Option<Arc<dyn ViolationObserver>>) {
        self.observer = observer;
    }

    /// The live settings.
    #[must_use]
    pub const fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    /// The build-mode state.
    #[must_use]
    pub const fn build_mode(&self) -> &BuildMode {
        &self.build_mode
    }

    /// Edits the build-mode command.
    pub fn build_mode_mut(&mut self) -> &mut BuildMode {
        &mut self.build_mode
    }

    /// Turns build mode on or off. Returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`DemoError::InvalidRequest`] in strict mode.
    pub fn toggle_build_mode(&mut self) -> DemoResult<bool> {
        if self.config.strict_mode {
            return Err(DemoError::InvalidRequest {
                info: "build mode is not available in strict mode".to_owned(),
            });
        }
        Ok(self.build_mode.toggle())
    }

    /// The scripted queue.
    pub fn scripted_mut(&mut self) -> &mut ScriptedQueue {
        &mut self.scripted
    }

    /// The brute-force queue.
    ///
    /// # Errors
    ///
    /// Returns [`DemoError::InvalidRequest`] in strict mode.
    pub fn brute_force_mut(&mut self) -> DemoResult<&mut BruteForceQueue> {
        if self.config.strict_mode {
            return Err(DemoError::InvalidRequest {
                info: "brute force is not available in strict mode".to_owned(),
            });
        }
        Ok(&mut self.brute_force)
    }

    /// Returns `true` while a brute-force run is active.
    #[must_use]
    pub const fn brute_force_active(&self) -> bool {
        self.brute_force.is_active()
    }

    /// Queues extended requests for the next live command.
    pub fn queue_extended(&mut self, ext: ExtendedCommand) {
        self.pending_ext.actions |= ext.actions;
        if ext.has(crate::ticcmd::actions::XC_SAVE) {
            self.pending_ext.save_slot = ext.save_slot;
        }
        if ext.has(crate::ticcmd::actions::XC_LOAD) {
            self.pending_ext.load_slot = ext.load_slot;
        }
    }

    /// Marks the next command as a demo takeover (after a key frame restore).
    pub fn arm_join(&mut self) {
        self.join_armed = true;
    }

    /// Forgets held-key counters, click timers and mouse remainders.
    pub fn reset_level_state(&mut self) {
        self.turn_held = 0;
        self.look_held = 0;
        self.carry = MouseCarry::default();
        self.click_forward = DoubleClick::default();
        self.click_strafe = DoubleClick::default();
        self.weapons = WeaponSelector::default();
    }

    /// Produces this tick's command.
    ///
    /// # Errors
    ///
    /// Propagates stream errors while stepping through recorded data.
    pub fn build(
        &mut self,
        input: &InputState,
        view: &PlayerView,
        ctx: &BuildContext<'_>,
    ) -> DemoResult<BuiltCommand> {
        let mut skip_exhausted = false;
        let mut force_join = false;

        let (mut cmd, source) = if self.build_mode.is_enabled()
            && self.build_mode.replaces_source()
            && !ctx.skip_mode
        {
            force_join = true;
            (self.build_mode.read(), TickSource::BuildMode)
        } else if let Some(scripted) = self.scripted.pop() {
            self.discard_build_command();
            skip_exhausted = scripted.exhausted;
            (scripted.cmd, TickSource::Scripted)
        } else if let Some(candidate) = self.pop_brute_force() {
            self.discard_build_command();
            force_join = true;
            (candidate, TickSource::BruteForce)
        } else if self.build_mode.is_enabled() {
            // Stepping through recorded data.
            self.discard_build_command();
            force_join = true;
            let recorded = match ctx.stream {
                Some(stream) => stream.copy_pending()?,
                None => TickCommand::EMPTY,
            };
            (recorded, TickSource::Recorded)
        } else if ctx.playback && ctx.recording {
            self.carry.x = 0.0;
            self.carry.y = 0.0;
            (TickCommand::EMPTY, TickSource::Idle)
        } else {
            let (cmd, first) = self.build_live(input, view, ctx);
            force_join = first;
            (cmd, TickSource::Live)
        };

        if force_join || self.join_armed {
            apply_join(&mut cmd, ctx.demo_compatibility, self.config.allow_ssg_direct);
            self.join_armed = false;
        }
        Ok(BuiltCommand {
            cmd,
            source,
            skip_exhausted,
        })
    }

    /// Spends the build-mode command on a tick that runs something else, so
    /// its one-shot turn and use do not carry into the next tick.
    fn discard_build_command(&mut self) {
        if self.build_mode.is_enabled() {
            let _ = self.build_mode.read();
        }
    }

    fn pop_brute_force(&mut self) -> Option<TickCommand> {
        if !self.brute_force.is_active() {
            return None;
        }
        let candidate = self.brute_force.pop();
        if candidate.is_none() {
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::TickBuild,
                "brute-force queue empty while brute force is active"
            );
        }
        candidate
    }

    /// Samples live input. Returns the command and whether the forced first
    /// input was applied.
    fn build_live(
        &mut self,
        input: &InputState,
        view: &PlayerView,
        ctx: &BuildContext<'_>,
    ) -> (TickCommand, bool) {
        let mut cmd = TickCommand::EMPTY;
        let strafe = input.strafe;
        let speed = usize::from(input.speed != self.settings.autorun);
        let forward_speed = self.speeds.forward.get(speed).copied().unwrap_or(0);
        let side_speed = self.speeds.side.get(speed).copied().unwrap_or(0);
        let mut forward = 0;
        let mut side = 0;
        let mut angle: i32 = 0;

        if input.joy_x != 0 || input.turn_right || input.turn_left {
            self.turn_held = self.turn_held.saturating_add(1);
        } else {
            self.turn_held = 0;
        }
        let turn_speed = if self.turn_held < SLOWTURNTICS { 2 } else { speed };
        let turn = ANGLETURN.get(turn_speed).copied().unwrap_or(0);

        if input.reverse && !strafe {
            angle += QUICKREVERSE;
        }

        // Keys and the stick each add a step, so both together move twice as far.
        let rightward = presses(input.turn_right, input.turn_left, input.joy_x);
        if strafe {
            side += rightward * side_speed;
        } else {
            angle -= rightward * turn;
        }

        forward += presses(input.forward, input.backward, -input.joy_y.signum()) * forward_speed;
        if input.strafe_right {
            side += side_speed;
        }
        if input.strafe_left {
            side -= side_speed;
        }

        if self.config.game.is_raven() {
            self.raven_input(&mut cmd, input, view);
        }

        if self.settings.allow_jumping && input.jump && !self.config.game.is_hexen() {
            self.pending_ext.actions |= XC_JUMP;
        }

        if input.fire {
            cmd.buttons |= BT_ATTACK;
        }
        if input.use_ {
            cmd.buttons |= BT_USE;
            self.click_forward.clear_clicks();
            self.click_strafe.clear_clicks();
        }

        let prefs = self.settings.weapon_preferences();
        let firing = cmd.buttons & BT_ATTACK != 0;
        let weapon = self.weapons.select(
            &self.config,
            &prefs,
            input,
            view,
            firing,
            ctx.demo_compatibility,
        );
        if let Some(weapon) = weapon {
            if !view.morphed {
                cmd.buttons |= weapon.change_bits();
            }
        }

        let mouse_x = carry_double(&mut self.carry.x, input.mouse_x);
        let mouse_y = carry_double(&mut self.carry.y, input.mouse_y);

        if self.settings.mouse_doubleclick_as_use {
            if self.click_forward.update(input.mouse_forward_button) {
                cmd.buttons |= BT_USE;
            }
            if self.click_strafe.update(input.mouse_strafe_button) {
                cmd.buttons |= BT_USE;
            }
        }

        if !self.settings.novert {
            forward = forward.saturating_add(mouse_y);
        }
        if strafe {
            side = side.saturating_add(
                self.carry
                    .strafe_delta(mouse_x, self.settings.mouse_strafe_divisor),
            );
            side = (side / 2) * 2;
        } else {
            angle = angle.wrapping_sub(mouse_x);
        }

        let max_move = self.base_speeds.max_move();
        forward = forward.clamp(-max_move, max_move);
        side = side.clamp(-max_move, max_move);

        let angle_turn = angle as i16;
        if self.settings.always_sr50 {
            if speed == 0 {
                let limit = self.base_speeds.forward[0];
                side = side.clamp(-limit, limit);
            } else if !self.settings.strafe50_on_turns && !strafe && angle_turn != 0 {
                let limit = self.base_speeds.side[1];
                side = side.clamp(-limit, limit);
            }
        }

        if view.speed_power && !view.morphed {
            forward = (3 * forward) >> 1;
            side = (3 * side) >> 1;
        }

        cmd.forward = forward as i8;
        cmd.side = side as i8;
        cmd.angle_turn = angle_turn;

        if (ctx.recording && !ctx.longtics) || ctx.shorttics {
            if self.settings.mouse_carrytics {
                cmd.angle_turn = self.carry.round_angle(cmd.angle_turn);
            }
            cmd.angle_turn = short_angle(cmd.angle_turn);
        }

        if input.pause {
            cmd.buttons = BT_SPECIAL | BT_PAUSE;
        } else if let Some(slot) = input.save_slot {
            cmd.buttons = BT_SPECIAL | BTS_SAVEGAME | ((slot << BTS_SAVESHIFT) & BTS_SAVEMASK);
        }

        if ctx.allow_extended {
            cmd.ext = std::mem::replace(&mut self.pending_ext, ExtendedCommand::NONE);
        }

        let mut first = false;
        if !self.config.strict_mode && ctx.level_time == 0 && ctx.total_level_times == 0 {
            if let Some(first_input) = self.first_input {
                cmd.forward = first_input.forward;
                cmd.side = first_input.side;
                cmd.angle_turn = (i32::from(first_input.angle) << 8) as i16;
                first = true;
            }
        }
        (cmd, first)
    }

    fn raven_input(&mut self, cmd: &mut TickCommand, input: &InputState, view: &PlayerView) {
        if input.look_up || input.look_down {
            self.look_held = self.look_held.saturating_add(1);
        } else {
            self.look_held = 0;
        }
        let look_speed = i32::from(LOOKSPEED[usize::from(self.look_held >= SLOWTURNTICS)]);
        let mut look = 0;
        let mut fly = 0;
        if input.look_up {
            look = look_speed;
        }
        if input.look_down {
            look = -look_speed;
        }
        if input.look_center {
            look = i32::from(TOCENTER);
        }
        if input.fly_up {
            fly = FLY_STEP;
        }
        if input.fly_down {
            fly = -FLY_STEP;
        }
        if input.fly_center {
            fly = i32::from(TOCENTER);
            look = i32::from(TOCENTER);
        }

        if self.config.game.is_hexen() && input.jump {
            cmd.artifact |= AFLAG_JUMP;
        }
        if let Some(artifact) = input.artifact {
            if cmd.artifact & !AFLAG_JUMP == 0 {
                cmd.artifact |= artifact & !AFLAG_JUMP;
            }
        }

        if view.alive {
            if look < 0 {
                look += 16;
            }
            cmd.look_fly = look as u8;
        }
        if fly < 0 {
            fly += 16;
        }
        cmd.look_fly |= (fly << 4) as u8;
    }
}

/// Net steps along one axis: +1 for `positive`, -1 for `negative` and the
/// stick's direction on top.
fn presses(positive: bool, negative: bool, stick: i32) -> i32 {
    i32::from(positive) - i32::from(negative) + stick.signum()
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
    use crate::codec::{Era, TicFormat, TickCodec};
    use crate::sessions::config::Game;
    use crate::telemetry::CollectingObserver;
    use crate::ticcmd::Weapon;

    fn builder() -> TickCommandBuilder {
        TickCommandBuilder::new(EngineConfig::default(), BuilderSettings::default()).unwrap()
    }

    fn live(builder: &mut TickCommandBuilder, input: &InputState) -> TickCommand {
        let built = builder
            .build(input, &PlayerView::default(), &BuildContext::default())
            .unwrap();
        assert_eq!(built.source, TickSource::Live);
        built.cmd
    }

    // ===== Settings =====

    #[test]
    fn settings_validation() {
        assert!(BuilderSettings::default().validate().is_ok());
        let turbo = BuilderSettings {
            turbo: Some(500),
            ..BuilderSettings::default()
        };
        assert!(matches!(
            turbo.validate(),
            Err(DemoError::InvalidRequest { .. })
        ));
        let divisor = BuilderSettings {
            mouse_strafe_divisor: 0.0,
            ..BuilderSettings::default()
        };
        assert!(divisor.validate().is_err());
        assert!(TickCommandBuilder::new(EngineConfig::default(), divisor).is_err());
    }

    // ===== Live input =====

    #[test]
    fn forward_runs_with_autorun() {
        let mut b = builder();
        let input = InputState {
            forward: true,
            ..InputState::default()
        };
        assert_eq!(live(&mut b, &input).forward, 0x32);
        let walk = InputState {
            forward: true,
            speed: true,
            ..InputState::default()
        };
        assert_eq!(live(&mut b, &walk).forward, 0x19);
    }

    #[test]
    fn held_turn_accelerates() {
        let mut b = builder();
        let input = InputState {
            turn_left: true,
            ..InputState::default()
        };
        for _ in 1..SLOWTURNTICS {
            assert_eq!(live(&mut b, &input).angle_turn, 320);
        }
        assert_eq!(live(&mut b, &input).angle_turn, 1280);
        live(&mut b, &InputState::default());
        assert_eq!(live(&mut b, &input).angle_turn, 320);
    }

    #[test]
    fn turn_key_and_stick_add_up() {
        let mut b = builder();
        let both = InputState {
            turn_right: true,
            joy_x: 1,
            ..InputState::default()
        };
        assert_eq!(live(&mut b, &both).angle_turn, -640);

        let mut b = builder();
        let opposed = InputState {
            turn_right: true,
            joy_x: -1,
            ..InputState::default()
        };
        assert_eq!(live(&mut b, &opposed).angle_turn, 0);
    }

    #[test]
    fn movement_is_clamped() {
        let settings = BuilderSettings {
            turbo: Some(400),
            ..BuilderSettings::default()
        };
        let mut b = TickCommandBuilder::new(EngineConfig::default(), settings).unwrap();
        let input = InputState {
            forward: true,
            strafe_right: true,
            ..InputState::default()
        };
        let cmd = live(&mut b, &input);
        assert_eq!(cmd.forward, 0x32);
        assert_eq!(cmd.side, 0x32);
    }

    #[test]
    fn mouse_fractions_accumulate() {
        let mut b = builder();
        let input = InputState {
            mouse_x: 0.5,
            ..InputState::default()
        };
        assert_eq!(live(&mut b, &input).angle_turn, 0);
        assert_eq!(live(&mut b, &input).angle_turn, -1);
    }

    #[test]
    fn recording_short_tics_round_the_angle() {
        let mut b = builder();
        let input = InputState {
            mouse_x: -300.0,
            ..InputState::default()
        };
        let ctx = BuildContext {
            recording: true,
            ..BuildContext::default()
        };
        let cmd = b.build(&input, &PlayerView::default(), &ctx).unwrap().cmd;
        assert_eq!(cmd.angle_turn, 256);
    }

    #[test]
    fn pause_replaces_the_buttons() {
        let mut b = builder();
        let input = InputState {
            fire: true,
            pause: true,
            ..InputState::default()
        };
        assert_eq!(live(&mut b, &input).buttons, BT_SPECIAL | BT_PAUSE);
    }

    #[test]
    fn weapon_key_sets_change_bits() {
        let mut b = builder();
        let input = InputState {
            weapon_key: Some(2),
            ..InputState::default()
        };
        assert_eq!(live(&mut b, &input).buttons, Weapon::Pistol.change_bits());
    }

    #[test]
    fn extended_requests_ride_on_the_next_command() {
        let mut b = builder();
        b.queue_extended(ExtendedCommand {
            actions: crate::ticcmd::actions::XC_GOD,
            ..ExtendedCommand::NONE
        });
        let ctx = BuildContext {
            allow_extended: true,
            ..BuildContext::default()
        };
        let cmd = b
            .build(&InputState::default(), &PlayerView::default(), &ctx)
            .unwrap()
            .cmd;
        assert!(cmd.ext.has(crate::ticcmd::actions::XC_GOD));
        let cmd = b
            .build(&InputState::default(), &PlayerView::default(), &ctx)
            .unwrap()
            .cmd;
        assert!(cmd.ext.is_empty());
    }

    #[test]
    fn first_input_is_forced_and_joined() {
        let mut b = builder();
        b.set_first_input(Some(FirstInput {
            forward: 50,
            side: -40,
            angle: 2,
        }));
        let cmd = live(&mut b, &InputState::default());
        assert_eq!(cmd.forward, 50);
        assert_eq!(cmd.side, -40);
        assert_eq!(cmd.angle_turn, 512);
        assert_eq!(cmd.buttons & BT_JOIN, BT_JOIN);
        let later = BuildContext {
            level_time: 1,
            ..BuildContext::default()
        };
        let cmd = b
            .build(&InputState::default(), &PlayerView::default(), &later)
            .unwrap()
            .cmd;
        assert_eq!(cmd, TickCommand::EMPTY);
    }

    #[test]
    fn raven_look_and_fly_nibbles() {
        let config = EngineConfig {
            game: Game::Heretic,
            ..EngineConfig::default()
        };
        let mut b = TickCommandBuilder::new(config, BuilderSettings::default()).unwrap();
        let input = InputState {
            look_down: true,
            fly_up: true,
            artifact: Some(3),
            ..InputState::default()
        };
        let cmd = live(&mut b, &input);
        assert_eq!(cmd.look_fly, (16 - 1) | (5 << 4));
        assert_eq!(cmd.artifact, 3);
    }

    // ===== Priority =====

    #[test]
    fn build_mode_overrides_live_input() {
        let mut b = builder();
        b.toggle_build_mode().unwrap();
        b.build_mode_mut().forward();
        let input = InputState {
            backward: true,
            ..InputState::default()
        };
        let built = b
            .build(&input, &PlayerView::default(), &BuildContext::default())
            .unwrap();
        assert_eq!(built.source, TickSource::BuildMode);
        assert_eq!(built.cmd.forward, 0x32);
        assert_eq!(built.cmd.buttons & BT_JOIN, BT_JOIN);
    }

    #[test]
    fn strict_mode_refuses_tooling() {
        let config = EngineConfig {
            strict_mode: true,
            ..EngineConfig::default()
        };
        let mut b = TickCommandBuilder::new(config, BuilderSettings::default()).unwrap();
        assert!(b.toggle_build_mode().is_err());
        assert!(b.brute_force_mut().is_err());
    }

    #[test]
    fn scripted_beats_brute_force_and_reports_exhaustion() {
        let mut b = builder();
        let scripted = TickCommand {
            forward: 7,
            ..TickCommand::EMPTY
        };
        let candidate = TickCommand {
            forward: 9,
            ..TickCommand::EMPTY
        };
        b.scripted_mut().extend([scripted]);
        b.brute_force_mut().unwrap().start([candidate]);
        let ctx = BuildContext::default();
        let first = b.build(&InputState::default(), &PlayerView::default(), &ctx).unwrap();
        assert_eq!(first.source, TickSource::Scripted);
        assert!(first.skip_exhausted);
        let second = b.build(&InputState::default(), &PlayerView::default(), &ctx).unwrap();
        assert_eq!(second.source, TickSource::BruteForce);
        assert_eq!(second.cmd.forward, 9);
    }

    #[test]
    fn empty_brute_force_falls_through_with_warning() {
        let mut b = builder();
        let observer = Arc::new(CollectingObserver::new());
        b.set_observer(Some(observer.clone()));
        b.brute_force_mut().unwrap().start([]);
        let built = b
            .build(&InputState::default(), &PlayerView::default(), &BuildContext::default())
            .unwrap();
        assert_eq!(built.source, TickSource::Live);
        assert!(observer.has_violation(ViolationKind::TickBuild));
    }

    #[test]
    fn build_mode_can_step_through_recorded_data() {
        let codec = TickCodec::new(Era::Mbf, TicFormat::default());
        let mut stream = DemoByteStream::new(codec).unwrap();
        let recorded = TickCommand {
            forward: 20,
            ..TickCommand::EMPTY
        };
        stream.record(&recorded).unwrap();
        stream.set_cursor(0).unwrap();

        let mut b = builder();
        b.toggle_build_mode().unwrap();
        b.build_mode_mut().toggle_source();
        let ctx = BuildContext {
            stream: Some(&stream),
            ..BuildContext::default()
        };
        let built = b
            .build(&InputState::default(), &PlayerView::default(), &ctx)
            .unwrap();
        assert_eq!(built.source, TickSource::Recorded);
        assert_eq!(built.cmd.forward, 20);
        assert_eq!(built.cmd.buttons & BT_JOIN, BT_JOIN);
    }

    #[test]
    fn queued_commands_spend_the_one_shot_build_inputs() {
        let mut b = builder();
        b.toggle_build_mode().unwrap();
        b.build_mode_mut().toggle_source();
        b.build_mode_mut().turn_right();
        b.build_mode_mut().toggle_use();
        b.build_mode_mut().forward();
        b.scripted_mut().extend([TickCommand {
            forward: 7,
            ..TickCommand::EMPTY
        }]);
        let ctx = BuildContext::default();
        let built = b.build(&InputState::default(), &PlayerView::default(), &ctx).unwrap();
        assert_eq!(built.source, TickSource::Scripted);
        assert_eq!(b.build_mode().command().angle_turn, 0);
        assert_eq!(b.build_mode().command().buttons & BT_USE, 0);
        assert_eq!(b.build_mode().command().forward, 0x32);

        b.build_mode_mut().turn_left();
        b.build_mode_mut().toggle_use();
        b.brute_force_mut().unwrap().start([TickCommand::EMPTY]);
        let built = b.build(&InputState::default(), &PlayerView::default(), &ctx).unwrap();
        assert_eq!(built.source, TickSource::BruteForce);
        assert_eq!(b.build_mode().command().angle_turn, 0);
        assert_eq!(b.build_mode().command().buttons & BT_USE, 0);
    }

    #[test]
    fn joined_playback_builds_nothing() {
        let mut b = builder();
        let ctx = BuildContext {
            playback: true,
            recording: true,
            ..BuildContext::default()
        };
        let input = InputState {
            forward: true,
            ..InputState::default()
        };
        let built = b.build(&input, &PlayerView::default(), &ctx).unwrap();
        assert_eq!(built.source, TickSource::Idle);
        assert_eq!(built.cmd, TickCommand::EMPTY);
    }

    // ===== Join =====

    #[test]
    fn join_bit_only_without_weapon_change() {
        let mut cmd = TickCommand::EMPTY;
        apply_join(&mut cmd, false, false);
        assert_eq!(cmd.buttons, BT_JOIN);

        let mut cmd = TickCommand {
            buttons: Weapon::Shotgun.change_bits(),
            ..TickCommand::EMPTY
        };
        apply_join(&mut cmd, false, false);
        assert_eq!(cmd.buttons, Weapon::Shotgun.change_bits());
        apply_join(&mut cmd, true, false);
        assert_eq!(cmd.buttons & BT_JOIN, BT_JOIN);
    }

    #[test]
    fn armed_join_applies_once() {
        let mut b = builder();
        b.arm_join();
        assert_eq!(live(&mut b, &InputState::default()).buttons, BT_JOIN);
        assert_eq!(live(&mut b, &InputState::default()).buttons, 0);
    }
}
