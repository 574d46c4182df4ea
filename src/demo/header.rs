//! Demo Header Negotiator.
//!
//! [`parse_header`] auto-detects every historical header family from the
//! version byte and derives the tick layout; [`write_header`] produces the
//! header a recording at a given [`CompatibilityLevel`] starts with.
//!
//! | version | family |
//! |---|---|
//! | 0-4 | Doom 1.2 and Raven (the byte is the skill) |
//! | 104-111 | Doom 1.4 to 1.9, TASDoom, longtics |
//! | 200-202 | Boom |
//! | 203 | MBF or LxDoom (told apart by the signature) |
//! | 210-214 | PrBoom |
//! | 221 | MBF21 |
//! | 255 | extended header, followed by one of the above |

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::extended::{
    strip_version_255, write_dsda_header, ExtendedHeader, DSDA_HEADER_START_SIZE,
};
use super::options::{option_size, GameOptions, BOOM_200_OPTION_SIZE, GAME_OPTION_SIZE};
use crate::codec::bytes::{ByteReader, ByteWriter};
use crate::codec::{Era, TicFormat, TickCodec};
use crate::compat::CompatibilityLevel;
use crate::error::{DemoError, DemoResult};
use crate::report_violation_to;
use crate::sessions::config::{DemoOverrides, EngineConfig, Game};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{DEMOMARKER, FUTURE_MAXPLAYERS};

const BOOM_SIGNATURE: [u8; 6] = [0x1d, b'B', b'o', b'o', b'm', 0xe6];
const MBF_SIGNATURE: [u8; 6] = [0x1d, b'M', b'B', b'F', 0xe6, 0x00];

const RAVEN_RESPAWN: u8 = 0x20;
const RAVEN_LONGTICS: u8 = 0x10;
const RAVEN_NOMONSTERS: u8 = 0x02;

/// How a parser treats data it cannot make sense of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strictness {
    /// Every problem is an error.
    #[default]
    Strict,
    /// Unrecognized data and bounds overruns yield
    /// [`ParseOutcome::NotRecognized`]; recognized-but-broken data is still an error.
    Lenient,
}

impl Strictness {
    /// A read of `needed` bytes at `position` would overrun a buffer of `size` bytes.
    pub(crate) fn overrun<T>(
        self,
        position: usize,
        needed: usize,
        size: usize,
    ) -> DemoResult<ParseOutcome<T>> {
        match self {
            Strictness::Strict => Err(DemoError::HeaderOverrun {
                position,
                needed,
                size,
            }),
            Strictness::Lenient => Ok(ParseOutcome::NotRecognized(format!(
                "read of {needed} bytes at {position} overruns {size} bytes"
            ))),
        }
    }

    /// The data is not in a format this parser knows.
    pub(crate) fn not_recognized<T>(self, reason: String) -> DemoResult<ParseOutcome<T>> {
        match self {
            Strictness::Strict => Err(DemoError::NotRecognized { reason }),
            Strictness::Lenient => Ok(ParseOutcome::NotRecognized(reason)),
        }
    }
}

/// Result of a parse that may softly decline the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome<T> {
    /// The input was understood.
    Parsed(T),
    /// The input is not in a known format; nothing was consumed.
    NotRecognized(String),
}

impl<T> ParseOutcome<T> {
    /// The parsed value, if any.
    #[must_use]
    pub fn parsed(self) -> Option<T> {
        match self {
            ParseOutcome::Parsed(value) => Some(value),
            ParseOutcome::NotRecognized(_) => None,
        }
    }

    /// Returns `true` if the input was understood.
    #[must_use]
    pub const fn is_parsed(&self) -> bool {
        matches!(self, ParseOutcome::Parsed(_))
    }

    /// Escalates a soft outcome to [`DemoError::NotRecognized`].
    ///
    /// # Errors
    ///
    /// [`DemoError::NotRecognized`] if the input was not understood.
    pub fn into_result(self) -> DemoResult<T> {
        match self {
            ParseOutcome::Parsed(value) => Ok(value),
            ParseOutcome::NotRecognized(reason) => Err(DemoError::NotRecognized { reason }),
        }
    }

    /// Maps the parsed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParseOutcome<U> {
        match self {
            ParseOutcome::Parsed(value) => ParseOutcome::Parsed(f(value)),
            ParseOutcome::NotRecognized(reason) => ParseOutcome::NotRecognized(reason),
        }
    }
}

/// One player slot of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PlayerSlot {
    /// The player takes part in the game.
    pub in_game: bool,
    /// Hexen player class; zero elsewhere.
    pub class: u8,
}

impl PlayerSlot {
    /// An in-game player of the default class.
    pub const PRESENT: PlayerSlot = PlayerSlot {
        in_game: true,
        class: 0,
    };
}

/// Metadata preceding the tick data of a demo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoHeader {
    /// The version byte the header carries (after any extended header).
    pub version: u8,
    /// Compatibility level the demo was recorded at.
    pub level: CompatibilityLevel,
    /// Skill, 0-based.
    pub skill: u8,
    /// Episode (1 for Doom II).
    pub episode: u8,
    /// Map number.
    pub map: u8,
    /// Deathmatch mode; 0 for cooperative.
    pub deathmatch: u8,
    /// Player viewed during playback, as stored.
    pub console_player: u8,
    /// Player presence, one entry per slot of the game.
    pub players: Vec<PlayerSlot>,
    /// Game options, including respawn, fast and nomonsters.
    pub options: GameOptions,
    /// Angle deltas are stored with 16 bits.
    pub longtics: bool,
    /// Extended header that preceded the version byte.
    pub extended: Option<ExtendedHeader>,
}

impl DemoHeader {
    /// A single-player header for a new recording at `level`, episode 1 map 1.
    ///
    /// The version byte and longtics follow from `level`; `overrides.longtics`
    /// picks 16-bit angles for the formats that allow a choice. PrBoom6 and
    /// MBF21 always store 16-bit angles (shorttics only rounds the input).
    #[must_use]
    pub fn for_recording(level: CompatibilityLevel, game: Game, overrides: &DemoOverrides) -> Self {
        let longtics = match level {
            CompatibilityLevel::TasDoom => false,
            CompatibilityLevel::PrBoom6 | CompatibilityLevel::Mbf21 => true,
            _ => overrides.longtics,
        };
        let mut players = vec![PlayerSlot::default(); game.max_players()];
        if let Some(first) = players.first_mut() {
            *first = PlayerSlot::PRESENT;
        }
        let mut options = GameOptions::for_level(level);
        options.respawn = overrides.respawn;
        options.fast = overrides.fast;
        options.nomonsters = overrides.nomonsters;
        Self {
            version: recording_version(level, game, longtics).unwrap_or_default(),
            level,
            skill: 2,
            episode: 1,
            map: 1,
            deathmatch: 0,
            console_player: 0,
            players,
            options,
            longtics,
            extended: overrides
                .wants_extended_header()
                .then_some(ExtendedHeader::Dsda {
                    version: super::extended::DSDA_DEMO_VERSION,
                    end_marker: 0,
                    tics: 0,
                }),
        }
    }

    /// Number of players in the game.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.iter().filter(|p| p.in_game).count()
    }

    /// Returns `true` if `player` is in the game.
    #[must_use]
    pub fn is_in_game(&self, player: usize) -> bool {
        self.players.get(player).is_some_and(|p| p.in_game)
    }
}

/// What the parser needs to know about the running engine.
#[derive(Clone, Default)]
pub struct HeaderContext {
    /// The running engine.
    pub config: EngineConfig,
    /// Command-line style overrides.
    pub overrides: DemoOverrides,
    /// Receives recoverable oddities; tracing when `None`.
    pub observer: Option<Arc<dyn ViolationObserver>>,
}

impl fmt::Debug for HeaderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderContext")
            .field("config", &self.config)
            .field("overrides", &self.overrides)
            .field("observer", &self.observer.as_ref().map(|_| "<observer>"))
            .finish()
    }
}

impl HeaderContext {
    /// Creates a context without an observer.
    #[must_use]
    pub fn new(config: EngineConfig, overrides: DemoOverrides) -> Self {
        Self {
            config,
            overrides,
            observer: None,
        }
    }

    /// Routes violations to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// A parsed header plus everything playback needs to start reading ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    /// The header fields.
    pub header: DemoHeader,
    /// Offset of the first tick record.
    pub data_offset: usize,
    /// Demo family.
    pub era: Era,
    /// Tick record layout.
    pub format: TicFormat,
    /// Player viewed during playback, after applying the override.
    pub console_player: usize,
    /// Offset of the DSDA end-marker/tic-count trailer, if present.
    pub extended_data_offset: Option<usize>,
}

impl ParsedHeader {
    /// Fixed bytes per tick record.
    #[must_use]
    pub const fn bytes_per_tic(&self) -> usize {
        self.format.bytes_per_tic()
    }

    /// A codec for this demo's tick records.
    #[must_use]
    pub fn codec(&self) -> TickCodec {
        TickCodec::new(self.era, self.format)
    }
}

fn is_known_version(version: u8) -> bool {
    matches!(version, 0..=4 | 104..=111 | 200..=203 | 210..=214 | 221)
}

/// Parses the header at the start of `data`.
///
/// Under [`Strictness::Lenient`] an unrecognized extended header or a read past
/// the end of `data` yields [`ParseOutcome::NotRecognized`]. Unknown version
/// bytes, broken extended headers and pre-1.4 files failing the shape
/// heuristics are errors either way.
///
/// # Errors
///
/// - [`DemoError::UnknownDemoVersion`] for a version byte no engine wrote.
/// - [`DemoError::MalformedExtendedHeader`] for a recognized but unusable 255 header.
/// - [`DemoError::UnrecognisedLegacyFormat`] for a pre-1.4 file of the wrong shape.
/// - [`DemoError::HeaderOverrun`] / [`DemoError::NotRecognized`] under strict parsing.
pub fn parse_header(
    data: &[u8],
    ctx: &HeaderContext,
    strictness: Strictness,
) -> DemoResult<ParseOutcome<ParsedHeader>> {
    let Some(&first) = data.first() else {
        return strictness.overrun(0, 1, data.len());
    };

    let mut extended = None;
    let mut version_at = 0;
    let mut version = first;
    if version == super::extended::EXTENDED_VERSION {
        let (header, next) = match strip_version_255(data, 1, strictness)? {
            ParseOutcome::Parsed(stripped) => stripped,
            ParseOutcome::NotRecognized(reason) => return Ok(ParseOutcome::NotRecognized(reason)),
        };
        let Some(&inner) = data.get(next) else {
            return strictness.overrun(next, 1, data.len());
        };
        extended = Some(header);
        version_at = next;
        version = inner;
    }

    if !is_known_version(version) {
        return Err(DemoError::UnknownDemoVersion { version });
    }

    let mut r = ByteReader::at(data, version_at + 1);
    let body = if version < 200 {
        parse_legacy(data, &mut r, version, ctx, strictness)?
    } else {
        parse_modern(data, &mut r, version, strictness)?
    };
    let mut header = match body {
        ParseOutcome::Parsed(header) => header,
        ParseOutcome::NotRecognized(reason) => return Ok(ParseOutcome::NotRecognized(reason)),
    };

    let players = match read_players(&mut r, header.level, version, ctx.config.game, strictness)? {
        ParseOutcome::Parsed(players) => players,
        ParseOutcome::NotRecognized(reason) => return Ok(ParseOutcome::NotRecognized(reason)),
    };
    if ctx.config.game.is_raven() {
        apply_raven_special(&mut header, &players, &ctx.overrides);
    }
    header.players = players.slots;
    header.version = version;
    header.extended = extended;

    let console_player = resolve_console_player(&header, ctx);
    let format = TicFormat {
        longtics: header.longtics,
        raven: ctx.config.game.is_raven(),
        extended: extended.is_some_and(|e| e.enables_extended_commands()),
    };
    let era = Era::for_level(header.level, ctx.config.game);
    let extended_data_offset = matches!(extended, Some(ExtendedHeader::Dsda { .. }))
        .then_some(DSDA_HEADER_START_SIZE);

    tracing::debug!(
        version,
        level = header.level.as_u8(),
        bytes_per_tic = format.bytes_per_tic(),
        offset = r.position(),
        "demo header parsed"
    );

    Ok(ParseOutcome::Parsed(ParsedHeader {
        header,
        data_offset: r.position(),
        era,
        format,
        console_player,
        extended_data_offset,
    }))
}

fn blank_header(level: CompatibilityLevel, options: GameOptions) -> DemoHeader {
    DemoHeader {
        version: 0,
        level,
        skill: 0,
        episode: 0,
        map: 0,
        deathmatch: 0,
        console_player: 0,
        players: Vec::new(),
        options,
        longtics: false,
        extended: None,
    }
}

fn parse_legacy(
    data: &[u8],
    r: &mut ByteReader<'_>,
    version: u8,
    ctx: &HeaderContext,
    strictness: Strictness,
) -> DemoResult<ParseOutcome<DemoHeader>> {
    let overrides = &ctx.overrides;
    let game = ctx.config.game;

    if version >= 100 {
        let Some([skill, episode, map, deathmatch, respawn, fast, nomonsters, console]) =
            r.read_array::<8>()
        else {
            return strictness.overrun(r.position(), 8, data.len());
        };
        let level = overrides.complevel.unwrap_or(match version {
            110 => CompatibilityLevel::TasDoom,
            v if v < 107 => CompatibilityLevel::Doom1666,
            _ => ctx.config.vanilla_level(),
        });
        let mut options = GameOptions::vanilla(level);
        options.respawn = respawn != 0;
        options.fast = fast != 0;
        options.nomonsters = nomonsters != 0;
        return Ok(ParseOutcome::Parsed(DemoHeader {
            skill,
            episode,
            map,
            deathmatch,
            console_player: console,
            longtics: version >= 111,
            ..blank_header(level, options)
        }));
    }

    // Doom 1.2 and Raven: the version byte is the skill.
    let Some([episode, map]) = r.read_array::<2>() else {
        return strictness.overrun(r.position(), 2, data.len());
    };
    check_legacy_shape(data, map, game, r.position())?;

    let level = CompatibilityLevel::Doom12;
    let mut options = GameOptions::vanilla(level);
    options.respawn = overrides.respawn;
    options.fast = overrides.fast;
    options.nomonsters = overrides.nomonsters;
    Ok(ParseOutcome::Parsed(DemoHeader {
        skill: version,
        episode,
        map,
        ..blank_header(level, options)
    }))
}

/// Pre-1.4 files have no signature; reject shapes that cannot be one.
///
/// Only applied to files that end with the demo marker. `players_at` is the
/// offset of the first player byte.
fn check_legacy_shape(data: &[u8], map: u8, game: Game, players_at: usize) -> DemoResult<()> {
    if data.last() != Some(&DEMOMARKER) {
        return Ok(());
    }
    let size = data.len();
    let reject = |reason: &str| {
        Err(DemoError::UnrecognisedLegacyFormat {
            reason: reason.to_owned(),
        })
    };
    if size >= 8 && (size - 8) % 4 != 0 && !game.is_raven() {
        return reject("file size does not fit whole 4-byte tics");
    }
    if map > 9 && !game.is_hexen() {
        return reject("map number above 9");
    }
    let player_byte = |i: usize| data.get(players_at + i).copied();
    if size >= 6 && (player_byte(1) == Some(2) || player_byte(3) == Some(2)) && !game.is_hexen() {
        return reject("player presence byte is not a flag");
    }
    Ok(())
}

fn parse_modern(
    data: &[u8],
    r: &mut ByteReader<'_>,
    version: u8,
    strictness: Strictness,
) -> DemoResult<ParseOutcome<DemoHeader>> {
    let Some(signature) = r.read_bytes(6) else {
        return strictness.overrun(r.position(), 6, data.len());
    };

    let mut longtics = false;
    let level = match version {
        200..=202 => {
            let Some(compat) = r.read_u8() else {
                return strictness.overrun(r.position(), 1, data.len());
            };
            match (version, compat) {
                (_, c) if c != 0 => CompatibilityLevel::BoomCompat,
                (202, _) => CompatibilityLevel::Boom202,
                _ => CompatibilityLevel::Boom201,
            }
        }
        203 => match signature.get(1) {
            Some(b'B') => CompatibilityLevel::LxDoom1,
            Some(b'M') => {
                if r.skip(1).is_none() {
                    return strictness.overrun(r.position(), 1, data.len());
                }
                CompatibilityLevel::Mbf
            }
            _ => {
                return strictness.not_recognized(format!(
                        "version 203 signature {:02x?} is neither Boom nor MBF",
                        signature
                    ));
            }
        },
        210..=214 => {
            if r.skip(1).is_none() {
                return strictness.overrun(r.position(), 1, data.len());
            }
            longtics = version == 214;
            CompatibilityLevel::try_from_u8(CompatibilityLevel::PrBoom2.as_u8() + (version - 210))
                .ok_or(DemoError::UnknownDemoVersion { version })?
        }
        221 => {
            longtics = true;
            CompatibilityLevel::Mbf21
        }
        _ => return Err(DemoError::UnknownDemoVersion { version }),
    };

    let Some([skill, episode, map, deathmatch, console]) = r.read_array::<5>() else {
        return strictness.overrun(r.position(), 5, data.len());
    };

    let block = if version == 200 {
        BOOM_200_OPTION_SIZE
    } else {
        option_size(level)
    };
    if !r.has(block) {
        return strictness.overrun(r.position(), block, data.len());
    }
    let options = GameOptions::read(level, r)?;
    if version == 200 && r.skip(BOOM_200_OPTION_SIZE - GAME_OPTION_SIZE).is_none() {
        return strictness.overrun(r.position(), BOOM_200_OPTION_SIZE - GAME_OPTION_SIZE, data.len());
    }

    Ok(ParseOutcome::Parsed(DemoHeader {
        skill,
        episode,
        map,
        deathmatch,
        console_player: console,
        longtics,
        ..blank_header(level, options)
    }))
}

struct Players {
    slots: Vec<PlayerSlot>,
    /// The raw first presence byte; Raven headers pack flags into it.
    first_byte: u8,
}

fn read_players(
    r: &mut ByteReader<'_>,
    level: CompatibilityLevel,
    version: u8,
    game: Game,
    strictness: Strictness,
) -> DemoResult<ParseOutcome<Players>> {
    let max = game.max_players();
    let stored = if level.demo_compatibility() || version < 200 {
        if game.is_hexen() {
            max * 2
        } else {
            max
        }
    } else {
        FUTURE_MAXPLAYERS
    };
    let Some(bytes) = r.read_bytes(stored) else {
        return strictness.overrun(r.position(), stored, r.len());
    };

    let first_byte = bytes.first().copied().unwrap_or_default();
    let slots = if game.is_hexen() && stored == max * 2 {
        bytes
            .chunks_exact(2)
            .map(|pair| PlayerSlot {
                in_game: pair.first().is_some_and(|b| *b != 0),
                class: pair.get(1).copied().unwrap_or_default(),
            })
            .collect()
    } else {
        bytes
            .iter()
            .take(max)
            .map(|b| PlayerSlot {
                // player 0's byte also carries the Raven special flags
                in_game: *b != 0,
                class: 0,
            })
            .collect()
    };
    Ok(ParseOutcome::Parsed(Players { slots, first_byte }))
}

fn apply_raven_special(header: &mut DemoHeader, players: &Players, overrides: &DemoOverrides) {
    let special = players.first_byte;
    header.options.respawn |= special & RAVEN_RESPAWN != 0;
    header.options.nomonsters |= special & RAVEN_NOMONSTERS != 0;
    header.longtics = special & RAVEN_LONGTICS != 0 || overrides.longtics;
}

fn resolve_console_player(header: &DemoHeader, ctx: &HeaderContext) -> usize {
    let Some(requested) = ctx.overrides.console_player else {
        return usize::from(header.console_player);
    };
    let requested = usize::from(requested);
    if header.is_in_game(requested) {
        return requested;
    }
    report_violation_to!(
        &ctx.observer,
        ViolationSeverity::Warning,
        ViolationKind::HeaderParse,
        "console player {} is not in the game; viewing player 0",
        requested
    );
    0
}

/// The version byte a recording at `level` is written with.
///
/// # Errors
///
/// [`DemoError::UnsupportedRecordingLevel`] for levels no writer exists for.
pub fn recording_version(level: CompatibilityLevel, game: Game, longtics: bool) -> DemoResult<u8> {
    use CompatibilityLevel as L;
    if game.is_raven() {
        return Ok(0);
    }
    Ok(match level {
        L::TasDoom => 110,
        l if l.demo_compatibility() && longtics => 111,
        L::Doom1666 => 106,
        l if l.demo_compatibility() => 109,
        L::BoomCompat | L::Boom202 => 202,
        L::Boom201 => 201,
        L::LxDoom1 | L::Mbf => 203,
        L::PrBoom2 => 210,
        L::PrBoom3 => 211,
        L::PrBoom4 => 212,
        L::PrBoom5 => 213,
        L::PrBoom6 => 214,
        L::Mbf21 => 221,
        other => {
            return Err(DemoError::UnsupportedRecordingLevel {
                level: other.as_u8(),
            })
        }
    })
}

/// Writes `header` (with its DSDA prefix, if any) to `out`.
///
/// Returns the offset of the DSDA trailer data relative to where writing
/// started, or `None` without an extended header.
///
/// # Errors
///
/// [`DemoError::UnsupportedRecordingLevel`] if no writer exists for the level.
pub fn write_header(
    header: &DemoHeader,
    game: Game,
    out: &mut ByteWriter,
) -> DemoResult<Option<usize>> {
    let version = recording_version(header.level, game, header.longtics)?;
    let start = out.len();
    let trailer = match header.extended {
        Some(ExtendedHeader::Dsda { .. }) => Some(write_dsda_header(out)),
        Some(ExtendedHeader::Umapinfo { .. }) | None => None,
    };

    if game.is_raven() {
        write_raven(header, game, out);
    } else if header.level.demo_compatibility() {
        out.put_u8(version)
            .put_u8(header.skill)
            .put_u8(header.episode)
            .put_u8(header.map)
            .put_u8(header.deathmatch)
            .put_bool(header.options.respawn)
            .put_bool(header.options.fast)
            .put_bool(header.options.nomonsters)
            .put_u8(header.console_player);
        write_presence(header, game.max_players(), out);
    } else {
        out.put_u8(version);
        if header.level.mbf_features() {
            out.put_bytes(&MBF_SIGNATURE);
            if !header.level.is_mbf21() {
                out.put_u8(0);
            }
        } else {
            out.put_bytes(&BOOM_SIGNATURE);
            if version != 203 {
                out.put_bool(header.level == CompatibilityLevel::BoomCompat);
            }
        }
        out.put_u8(header.skill)
            .put_u8(header.episode)
            .put_u8(header.map)
            .put_u8(header.deathmatch)
            .put_u8(header.console_player);
        header.options.write(header.level, out);
        write_presence(header, FUTURE_MAXPLAYERS, out);
    }

    tracing::debug!(
        version,
        level = header.level.as_u8(),
        bytes = out.len() - start,
        "demo header written"
    );
    Ok(trailer)
}

fn write_presence(header: &DemoHeader, slots: usize, out: &mut ByteWriter) {
    for i in 0..slots {
        out.put_bool(header.is_in_game(i));
    }
}

fn write_raven(header: &DemoHeader, game: Game, out: &mut ByteWriter) {
    let mut special = u8::from(header.is_in_game(0));
    if header.options.respawn {
        special |= RAVEN_RESPAWN;
    }
    if header.longtics {
        special |= RAVEN_LONGTICS;
    }
    if header.options.nomonsters {
        special |= RAVEN_NOMONSTERS;
    }
    out.put_u8(header.skill)
        .put_u8(header.episode)
        .put_u8(header.map)
        .put_u8(special);
    let class = |i: usize| header.players.get(i).map_or(0, |p| p.class);
    if game.is_hexen() {
        out.put_u8(class(0));
        for i in 1..game.max_players() {
            out.put_bool(header.is_in_game(i)).put_u8(class(i));
        }
    } else {
        for i in 1..game.max_players() {
            out.put_bool(header.is_in_game(i));
        }
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
    use crate::telemetry::CollectingObserver;

    fn ctx(game: Game) -> HeaderContext {
        HeaderContext::new(
            EngineConfig {
                game,
                ..EngineConfig::default()
            },
            DemoOverrides::default(),
        )
    }

    fn parse(data: &[u8], ctx: &HeaderContext) -> ParsedHeader {
        parse_header(data, ctx, Strictness::Strict)
            .unwrap()
            .parsed()
            .unwrap()
    }

    fn written(header: &DemoHeader, game: Game) -> Vec<u8> {
        let mut out = ByteWriter::new();
        write_header(header, game, &mut out).unwrap();
        out.into_inner()
    }

    // ===== Legacy headers =====

    #[test]
    fn version_106_is_doom_1666() {
        let data = [106, 2, 1, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0];
        let parsed = parse(&data, &ctx(Game::Doom));
        assert_eq!(parsed.header.level, CompatibilityLevel::Doom1666);
        assert_eq!(parsed.header.skill, 2);
        assert_eq!(parsed.header.episode, 1);
        assert_eq!(parsed.header.map, 1);
        assert_eq!(parsed.header.deathmatch, 0);
        assert_eq!(parsed.data_offset, 13);
        assert_eq!(parsed.bytes_per_tic(), 4);
        assert_eq!(parsed.era, Era::Vanilla);
        assert_eq!(parsed.header.player_count(), 1);
    }

    #[test]
    fn version_111_is_longtics_and_110_is_tasdoom() {
        let mut data = [111, 2, 1, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0];
        let parsed = parse(&data, &ctx(Game::Doom));
        assert!(parsed.header.longtics);
        assert_eq!(parsed.bytes_per_tic(), 5);

        data[0] = 110;
        let parsed = parse(&data, &ctx(Game::Doom));
        assert_eq!(parsed.header.level, CompatibilityLevel::TasDoom);
        assert_eq!(parsed.era, Era::TasDoom);
    }

    #[test]
    fn complevel_override_wins_for_vanilla() {
        let mut context = ctx(Game::Doom);
        context.overrides.complevel = Some(CompatibilityLevel::FinalDoom);
        let data = [109, 2, 1, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0];
        assert_eq!(
            parse(&data, &context).header.level,
            CompatibilityLevel::FinalDoom
        );
    }

    #[test]
    fn doom_12_synthesizes_flags_from_overrides() {
        let mut context = ctx(Game::Doom);
        context.overrides.fast = true;
        let data = [3, 1, 5, 1, 0, 0, 0];
        let parsed = parse(&data, &context);
        assert_eq!(parsed.header.level, CompatibilityLevel::Doom12);
        assert_eq!(parsed.header.skill, 3);
        assert_eq!(parsed.header.map, 5);
        assert!(parsed.header.options.fast);
        assert!(!parsed.header.options.respawn);
        assert_eq!(parsed.data_offset, 7);
    }

    #[test]
    fn doom_12_shape_heuristics_reject_odd_files() {
        // 7 header bytes, 2 stray bytes, then the marker: (10 - 8) % 4 != 0
        let data = [3, 1, 5, 1, 0, 0, 0, 9, DEMOMARKER, DEMOMARKER];
        let err = parse_header(&data, &ctx(Game::Doom), Strictness::Lenient).unwrap_err();
        assert!(matches!(err, DemoError::UnrecognisedLegacyFormat { .. }));

        let map_too_high = [3, 1, 12, 1, 0, 0, 0, DEMOMARKER];
        assert!(parse_header(&map_too_high, &ctx(Game::Doom), Strictness::Lenient).is_err());
        // Hexen allows high map numbers
        assert!(parse_header(&map_too_high, &ctx(Game::Hexen), Strictness::Lenient).is_ok());
    }

    #[test]
    fn heretic_special_byte() {
        let data = [2, 1, 1, 1 | RAVEN_LONGTICS | RAVEN_RESPAWN, 1, 0, 0];
        let parsed = parse(&data, &ctx(Game::Heretic));
        assert!(parsed.header.longtics);
        assert!(parsed.header.options.respawn);
        assert!(!parsed.header.options.nomonsters);
        assert_eq!(parsed.header.player_count(), 2);
        assert_eq!(parsed.era, Era::Raven);
        assert_eq!(parsed.bytes_per_tic(), 7);
    }

    // ===== Modern headers =====

    #[test]
    fn boom_compatibility_byte() {
        let header = DemoHeader::for_recording(
            CompatibilityLevel::BoomCompat,
            Game::Doom,
            &DemoOverrides::default(),
        );
        let data = written(&header, Game::Doom);
        assert_eq!(data[0], 202);
        assert_eq!(&data[1..7], &BOOM_SIGNATURE);
        assert_eq!(data[7], 1);
        let parsed = parse(&data, &ctx(Game::Doom));
        assert_eq!(parsed.header.level, CompatibilityLevel::BoomCompat);
        assert_eq!(parsed.data_offset, data.len());
    }

    #[test]
    fn version_203_is_told_apart_by_signature() {
        for level in [CompatibilityLevel::LxDoom1, CompatibilityLevel::Mbf] {
            let header = DemoHeader::for_recording(level, Game::Doom, &DemoOverrides::default());
            let data = written(&header, Game::Doom);
            assert_eq!(data[0], 203);
            let parsed = parse(&data, &ctx(Game::Doom));
            assert_eq!(parsed.header.level, level);
            assert_eq!(parsed.data_offset, data.len());
        }
    }

    #[test]
    fn prboom_versions_map_to_levels() {
        let cases = [
            (CompatibilityLevel::PrBoom2, 210, false),
            (CompatibilityLevel::PrBoom5, 213, false),
            (CompatibilityLevel::PrBoom6, 214, true),
            (CompatibilityLevel::Mbf21, 221, true),
        ];
        for (level, version, longtics) in cases {
            let header = DemoHeader::for_recording(level, Game::Doom, &DemoOverrides::default());
            let data = written(&header, Game::Doom);
            assert_eq!(data[0], version);
            let parsed = parse(&data, &ctx(Game::Doom));
            assert_eq!(parsed.header.level, level);
            assert_eq!(parsed.header.longtics, longtics);
            assert_eq!(parsed.header.options, header.options);
        }
    }

    #[test]
    fn version_200_skips_the_long_option_block() {
        let mut out = ByteWriter::new();
        out.put_u8(200)
            .put_bytes(&BOOM_SIGNATURE)
            .put_u8(0)
            .put_bytes(&[2, 1, 1, 0, 0])
            .put_zeroes(BOOM_200_OPTION_SIZE)
            .put_u8(1)
            .put_zeroes(FUTURE_MAXPLAYERS - 1);
        let data = out.into_inner();
        let parsed = parse(&data, &ctx(Game::Doom));
        assert_eq!(parsed.header.level, CompatibilityLevel::Boom201);
        assert_eq!(parsed.data_offset, data.len());
    }

    #[test]
    fn unknown_versions_are_fatal() {
        for version in [5u8, 103, 112, 204, 209, 215, 220, 222] {
            let err =
                parse_header(&[version, 0, 0, 0], &ctx(Game::Doom), Strictness::Lenient)
                    .unwrap_err();
            assert_eq!(err, DemoError::UnknownDemoVersion { version });
        }
    }

    #[test]
    fn truncated_modern_header_depends_on_strictness() {
        let header =
            DemoHeader::for_recording(CompatibilityLevel::Mbf21, Game::Doom, &DemoOverrides::default());
        let data = written(&header, Game::Doom);
        let cut = &data[..20];
        assert!(!parse_header(cut, &ctx(Game::Doom), Strictness::Lenient)
            .unwrap()
            .is_parsed());
        assert!(matches!(
            parse_header(cut, &ctx(Game::Doom), Strictness::Strict),
            Err(DemoError::HeaderOverrun { .. })
        ));
    }

    // ===== Extended headers =====

    #[test]
    fn dsda_prefix_enables_extended_commands() {
        let overrides = DemoOverrides {
            dsda_demo: true,
            ..DemoOverrides::default()
        };
        let header = DemoHeader::for_recording(CompatibilityLevel::Mbf21, Game::Doom, &overrides);
        let mut out = ByteWriter::new();
        let trailer = write_header(&header, Game::Doom, &mut out).unwrap();
        assert_eq!(trailer, Some(DSDA_HEADER_START_SIZE));
        let data = out.into_inner();
        let parsed = parse(&data, &ctx(Game::Doom));
        assert!(parsed.format.extended);
        assert_eq!(parsed.bytes_per_tic(), 6);
        assert_eq!(parsed.extended_data_offset, Some(DSDA_HEADER_START_SIZE));
        assert_eq!(parsed.header.level, CompatibilityLevel::Mbf21);
        assert_eq!(parsed.header.options, header.options);
    }

    #[test]
    fn foreign_255_header_is_not_recognized() {
        let data = [255, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let outcome = parse_header(&data, &ctx(Game::Doom), Strictness::Lenient).unwrap();
        assert!(matches!(outcome, ParseOutcome::NotRecognized(_)));
    }

    // ===== Console player =====

    #[test]
    fn console_player_override_must_be_in_game() {
        let observer = Arc::new(CollectingObserver::new());
        let mut context = ctx(Game::Doom).with_observer(observer.clone());
        context.overrides.console_player = Some(2);
        let data = [109, 2, 1, 1, 0, 0, 0, 0, 0, 1, 1, 0, 0];
        assert_eq!(parse(&data, &context).console_player, 0);
        assert!(observer.has_violation(ViolationKind::HeaderParse));

        context.overrides.console_player = Some(1);
        assert_eq!(parse(&data, &context).console_player, 1);
    }

    // ===== Writers =====

    #[test]
    fn raven_round_trip_keeps_classes() {
        let mut header =
            DemoHeader::for_recording(CompatibilityLevel::Doom12, Game::Hexen, &DemoOverrides::default());
        header.players[0].class = 2;
        header.players[3] = PlayerSlot {
            in_game: true,
            class: 1,
        };
        header.options.nomonsters = true;
        let data = written(&header, Game::Hexen);
        assert_eq!(data.len(), 4 + 1 + 7 * 2);
        let parsed = parse(&data, &ctx(Game::Hexen));
        assert_eq!(parsed.header.players, header.players);
        assert!(parsed.header.options.nomonsters);
    }

    #[test]
    fn raven_special_flags_alone_mark_player_zero_present() {
        let header = DemoHeader::for_recording(
            CompatibilityLevel::Doom12,
            Game::Heretic,
            &DemoOverrides::default(),
        );
        let mut data = written(&header, Game::Heretic);
        data[3] = RAVEN_NOMONSTERS;
        let parsed = parse(&data, &ctx(Game::Heretic));
        assert!(parsed.header.is_in_game(0));
        assert!(parsed.header.options.nomonsters);
        assert!(!parsed.header.longtics);
    }

    #[test]
    fn unsupported_levels_have_no_writer() {
        let header = DemoHeader::for_recording(
            CompatibilityLevel::PrBoom1,
            Game::Doom,
            &DemoOverrides::default(),
        );
        let err = write_header(&header, Game::Doom, &mut ByteWriter::new()).unwrap_err();
        assert!(matches!(err, DemoError::UnsupportedRecordingLevel { .. }));
    }
}
