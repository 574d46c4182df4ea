//! Save-game framing.
//!
//! A save holds a fixed preamble (description, engine version, content
//! signature, wad list), the game setup needed to rebuild the level, an
//! opaque simulation archive, and optionally the recording in progress so
//! that loading a save while recording rewinds the demo along with the game.
//!
//! ```text
//! description   24 bytes, zero padded
//! version       16 bytes, zero padded
//! signature     u64 LE
//! wads          name '\n' ... 0
//! format tag    ff ff ff ff, then u32 LE package version
//! setup         complevel, skill, episode, map
//! players       32 presence bytes
//! music         byte, 255 for none
//! options       the demo option block for complevel
//! timers        leveltime i32 LE, total level times i32 LE, basetic byte
//! archive       u32 LE length, bytes
//! demo          kind byte (0 none, 1 offset only, 2 complete), stored stream
//! terminator    0xe6
//! ```

use crate::codec::bytes::{ByteReader, ByteWriter};
use crate::compat::CompatibilityLevel;
use crate::demo::options::GameOptions;
use crate::demo::stream::DemoByteStream;
use crate::error::{DemoError, DemoResult, SaveMismatchKind};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{report_violation_to, FUTURE_MAXPLAYERS};
use std::sync::Arc;

/// Version string written by this crate.
pub const SAVE_VERSION: &str = "TICKDEMO SAVE 1";

/// Bytes reserved for the description.
pub const SAVE_STRING_SIZE: usize = 24;

/// Bytes reserved for the version string.
pub const VERSION_SIZE: usize = 16;

/// Marks the post-2.4 layout that carries a package version.
pub const NEW_FORMAT_SIG: [u8; 4] = [0xff; 4];

/// Last byte of every save.
pub const SAVE_TERMINATOR: u8 = 0xe6;

const NO_MUSIC: u8 = 255;

/// The recording embedded in a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDemo {
    /// Whether the recorded bytes are included or only the position.
    pub complete: bool,
    /// What [`DemoByteStream::store`] wrote.
    pub data: Vec<u8>,
}

impl SavedDemo {
    /// Captures the recording position of `stream`.
    #[must_use]
    pub fn capture(stream: &DemoByteStream, complete: bool) -> Self {
        let mut out = ByteWriter::with_capacity(stream.data_size(complete));
        stream.store(&mut out, complete);
        Self {
            complete,
            data: out.into_inner(),
        }
    }

    /// Moves `stream` back to the saved position, or replaces its contents
    /// with the saved bytes for a complete save.
    ///
    /// # Errors
    ///
    /// Whatever [`DemoByteStream::restore`] reports.
    pub fn apply(&self, stream: &mut DemoByteStream) -> DemoResult<()> {
        let mut reader = ByteReader::new(&self.data);
        stream.restore(&mut reader, self.complete)
    }
}

/// Everything a save file holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveGame {
    /// Player-visible slot description.
    pub description: String,
    /// Engine version string.
    pub version: String,
    /// Signature of the loaded content.
    pub signature: u64,
    /// Wads loaded when the game was saved.
    pub wads: Vec<String>,
    /// Engine build number.
    pub package_version: u32,
    /// Compatibility level of the saved game.
    pub level: CompatibilityLevel,
    /// Skill, 0-based.
    pub skill: u8,
    /// Episode, 1-based.
    pub episode: u8,
    /// Map, 1-based.
    pub map: u8,
    /// Player presence, one entry per slot up to [`FUTURE_MAXPLAYERS`].
    pub players: Vec<bool>,
    /// Music lump playing, if any.
    pub music: Option<u8>,
    /// Gameplay options.
    pub options: GameOptions,
    /// Tics spent in the current level.
    pub level_time: i32,
    /// Tics spent in completed levels.
    pub total_level_times: i32,
    /// Low byte of the logic tic, used to realign the base tic on load.
    pub basetic_offset: u8,
    /// Opaque simulation state.
    pub archive: Vec<u8>,
    /// The recording in progress.
    pub demo: Option<SavedDemo>,
}

/// What the running engine expects of a save being loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCheck {
    /// Version string of the running engine.
    pub version: String,
    /// Signature of the content loaded now.
    pub signature: u64,
    /// Load even if the version or signature differs.
    pub forced: bool,
}

impl Default for LoadCheck {
    fn default() -> Self {
        Self {
            version: SAVE_VERSION.to_owned(),
            signature: 0,
            forced: false,
        }
    }
}

impl SaveGame {
    /// Returns `true` if player slot `player` was in the game.
    #[must_use]
    pub fn player_in_game(&self, player: usize) -> bool {
        self.players.get(player).copied().unwrap_or(false)
    }

    /// Serializes the save.
    ///
    /// # Errors
    ///
    /// [`DemoError::InvalidRequest`] if the description or version does not
    /// fit its field, a wad name contains a newline, more than
    /// [`FUTURE_MAXPLAYERS`] slots are given, or the archive exceeds 4 GiB.
    pub fn to_bytes(&self) -> DemoResult<Vec<u8>> {
        let mut out = ByteWriter::with_capacity(self.archive.len() + 256);
        put_padded(&mut out, "description", &self.description, SAVE_STRING_SIZE)?;
        put_padded(&mut out, "version", &self.version, VERSION_SIZE)?;
        out.put_u64_le(self.signature);
        for wad in &self.wads {
            if wad.contains('\n') || wad.contains('\0') {
                return Err(DemoError::InvalidRequest {
                    info: format!("wad name {:?} cannot be stored in a save", wad),
                });
            }
            out.put_bytes(wad.as_bytes()).put_u8(b'\n');
        }
        out.put_u8(0);
        out.put_bytes(&NEW_FORMAT_SIG)
            .put_u32_le(self.package_version);
        out.put_u8(self.level.as_u8())
            .put_u8(self.skill)
            .put_u8(self.episode)
            .put_u8(self.map);
        if self.players.len() > FUTURE_MAXPLAYERS {
            return Err(DemoError::InvalidRequest {
                info: format!("{} player slots do not fit a save", self.players.len()),
            });
        }
        for &present in &self.players {
            out.put_bool(present);
        }
        out.put_zeroes(FUTURE_MAXPLAYERS - self.players.len());
        out.put_u8(self.music.unwrap_or(NO_MUSIC));
        self.options.write(self.level, &mut out);
        out.put_i32_le(self.level_time)
            .put_i32_le(self.total_level_times)
            .put_u8(self.basetic_offset);
        let archive_len = u32::try_from(self.archive.len()).map_err(|_| DemoError::InvalidRequest {
            info: format!("archive of {} bytes does not fit a save", self.archive.len()),
        })?;
        out.put_u32_le(archive_len).put_bytes(&self.archive);
        match &self.demo {
            None => {
                out.put_u8(0);
            }
            Some(demo) => {
                out.put_u8(if demo.complete { 2 } else { 1 })
                    .put_bytes(&demo.data);
            }
        }
        out.put_u8(SAVE_TERMINATOR);
        Ok(out.into_inner())
    }

    /// Reads a save, checking it against the running engine.
    ///
    /// A version mismatch is refused unless forced. A signature mismatch is
    /// refused unless forced, and reported as a warning when it is.
    ///
    /// # Errors
    ///
    /// - [`DemoError::SaveGameMismatch`] for an unforced version or signature
    ///   mismatch, or a compatibility level this crate does not know.
    /// - [`DemoError::HeaderOverrun`] if the save is cut short.
    /// - [`DemoError::NotRecognized`] if the format tag or terminator is missing.
    pub fn from_bytes(
        bytes: &[u8],
        check: &LoadCheck,
        observer: &Option<Arc<dyn ViolationObserver>>,
    ) -> DemoResult<Self> {
        let mut r = ByteReader::new(bytes);
        let size = bytes.len();
        let overrun = |r: &ByteReader<'_>, needed: usize| DemoError::HeaderOverrun {
            position: r.position(),
            needed,
            size,
        };

        let description = read_padded(&mut r, SAVE_STRING_SIZE).ok_or_else(|| overrun(&r, SAVE_STRING_SIZE))?;
        let version = read_padded(&mut r, VERSION_SIZE).ok_or_else(|| overrun(&r, VERSION_SIZE))?;
        if version != check.version {
            if !check.forced {
                return Err(DemoError::SaveGameMismatch {
                    kind: SaveMismatchKind::Version,
                    found: version,
                    expected: check.version.clone(),
                });
            }
            report_violation_to!(
                observer,
                ViolationSeverity::Warning,
                ViolationKind::SaveGame,
                "loading save from version {:?} into {:?}",
                version,
                check.version
            );
        }

        let signature = r.read_u64_le().ok_or_else(|| overrun(&r, 8))?;
        if signature != check.signature {
            if !check.forced {
                return Err(DemoError::SaveGameMismatch {
                    kind: SaveMismatchKind::Signature,
                    found: format!("{:016x}", signature),
                    expected: format!("{:016x}", check.signature),
                });
            }
            tracing::warn!(
                found = signature,
                expected = check.signature,
                "save game signature mismatch ignored"
            );
            report_violation_to!(
                observer,
                ViolationSeverity::Warning,
                ViolationKind::SaveGame,
                "save game signature {:016x} differs from {:016x}",
                signature,
                check.signature
            );
        }

        let wads = read_wad_list(&mut r).ok_or_else(|| overrun(&r, 1))?;

        let tag = r.read_array::<4>().ok_or_else(|| overrun(&r, 4))?;
        if tag != NEW_FORMAT_SIG {
            return Err(DemoError::NotRecognized {
                reason: "save game predates the package version field".to_owned(),
            });
        }
        let package_version = r.read_u32_le().ok_or_else(|| overrun(&r, 4))?;

        let [level, skill, episode, map] = r.read_array::<4>().ok_or_else(|| overrun(&r, 4))?;
        let level = CompatibilityLevel::try_from_u8(level).ok_or_else(|| {
            DemoError::SaveGameMismatch {
                kind: SaveMismatchKind::CompatibilityLevel,
                found: level.to_string(),
                expected: "a known compatibility level".to_owned(),
            }
        })?;

        let players = r
            .read_bytes(FUTURE_MAXPLAYERS)
            .ok_or_else(|| overrun(&r, FUTURE_MAXPLAYERS))?
            .iter()
            .map(|&b| b != 0)
            .collect();
        let music = match r.read_u8().ok_or_else(|| overrun(&r, 1))? {
            NO_MUSIC => None,
            lump => Some(lump),
        };
        let options = GameOptions::read(level, &mut r)?;
        let level_time = r.read_i32_le().ok_or_else(|| overrun(&r, 4))?;
        let total_level_times = r.read_i32_le().ok_or_else(|| overrun(&r, 4))?;
        let basetic_offset = r.read_u8().ok_or_else(|| overrun(&r, 1))?;

        let archive_len = r.read_u32_le().ok_or_else(|| overrun(&r, 4))? as usize;
        let archive = r
            .read_bytes(archive_len)
            .ok_or_else(|| overrun(&r, archive_len))?
            .to_vec();

        let demo = match r.read_u8().ok_or_else(|| overrun(&r, 1))? {
            0 => None,
            kind @ (1 | 2) => Some(read_saved_demo(&mut r, kind == 2, size)?),
            other => {
                return Err(DemoError::NotRecognized {
                    reason: format!("unknown embedded demo kind {}", other),
                })
            }
        };

        if r.read_u8() != Some(SAVE_TERMINATOR) {
            report_violation_to!(
                observer,
                ViolationSeverity::Error,
                ViolationKind::SaveGame,
                "save game terminator missing at offset {}",
                r.position()
            );
            return Err(DemoError::NotRecognized {
                reason: "bad save game: consistency marker missing".to_owned(),
            });
        }

        tracing::debug!(
            description = %description,
            level = level.name(),
            episode,
            map,
            "save game read"
        );

        Ok(Self {
            description,
            version,
            signature,
            wads,
            package_version,
            level,
            skill,
            episode,
            map,
            players,
            music,
            options,
            level_time,
            total_level_times,
            basetic_offset,
            archive,
            demo,
        })
    }
}

fn put_padded(out: &mut ByteWriter, field: &str, value: &str, size: usize) -> DemoResult<()> {
    let bytes = value.as_bytes();
    if bytes.len() > size || bytes.contains(&0) {
        return Err(DemoError::InvalidRequest {
            info: format!("save {} {:?} does not fit {} bytes", field, value, size),
        });
    }
    out.put_bytes(bytes).put_zeroes(size - bytes.len());
    Ok(())
}

fn read_padded(r: &mut ByteReader<'_>, size: usize) -> Option<String> {
    let raw = r.read_bytes(size)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Some(String::from_utf8_lossy(raw.get(..end)?).into_owned())
}

fn read_wad_list(r: &mut ByteReader<'_>) -> Option<Vec<String>> {
    let mut wads = Vec::new();
    let mut current = Vec::new();
    loop {
        match r.read_u8()? {
            0 => break,
            b'\n' => wads.push(String::from_utf8_lossy(&std::mem::take(&mut current)).into_owned()),
            b => current.push(b),
        }
    }
    Some(wads)
}

fn read_saved_demo(r: &mut ByteReader<'_>, complete: bool, size: usize) -> DemoResult<SavedDemo> {
    let start = r.position();
    let overrun = |needed: usize| DemoError::HeaderOverrun {
        position: start,
        needed,
        size,
    };
    let head = r.read_bytes(8).ok_or_else(|| overrun(8))?;
    let mut data = head.to_vec();
    if complete {
        let offset = ByteReader::new(head).read_u32_le().ok_or_else(|| overrun(8))? as usize;
        let recorded = r.read_bytes(offset).ok_or_else(|| overrun(8 + offset))?;
        data.extend_from_slice(recorded);
    }
    Ok(SavedDemo { complete, data })
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
    use crate::telemetry::CollectingObserver;
    use crate::ticcmd::TickCommand;

    fn sample() -> SaveGame {
        let mut players = vec![false; 4];
        players[0] = true;
        SaveGame {
            description: "before the exit".to_owned(),
            version: SAVE_VERSION.to_owned(),
            signature: 0xdead_beef,
            wads: vec!["doom2.wad".to_owned(), "scythe.wad".to_owned()],
            package_version: 3,
            level: CompatibilityLevel::Mbf21,
            skill: 3,
            episode: 1,
            map: 7,
            players,
            music: None,
            options: GameOptions::for_level(CompatibilityLevel::Mbf21),
            level_time: 1234,
            total_level_times: 99_000,
            basetic_offset: 17,
            archive: vec![1, 2, 3, 4, 5],
            demo: None,
        }
    }

    fn check() -> LoadCheck {
        LoadCheck {
            signature: 0xdead_beef,
            ..LoadCheck::default()
        }
    }

    fn stream_with(ticks: i8) -> DemoByteStream {
        let mut stream = DemoByteStream::new(TickCodec::new(Era::Mbf, TicFormat::default())).unwrap();
        for n in 0..ticks {
            stream
                .record(&TickCommand {
                    side: n,
                    ..TickCommand::EMPTY
                })
                .unwrap();
        }
        stream
    }

    // ===== Framing =====

    #[test]
    fn save_reads_back() {
        let save = sample();
        let bytes = save.to_bytes().unwrap();
        assert_eq!(bytes.last(), Some(&SAVE_TERMINATOR));
        let loaded = SaveGame::from_bytes(&bytes, &check(), &None).unwrap();
        assert_eq!(loaded.players.len(), FUTURE_MAXPLAYERS);
        assert!(loaded.player_in_game(0));
        assert!(!loaded.player_in_game(1));
        assert_eq!(loaded.wads, save.wads);
        assert_eq!(loaded.options, save.options);
        assert_eq!(loaded.archive, save.archive);
        assert_eq!(loaded.music, None);
    }

    #[test]
    fn preamble_layout() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(&bytes[..15], b"before the exit");
        assert!(bytes[15..SAVE_STRING_SIZE].iter().all(|&b| b == 0));
        assert_eq!(&bytes[SAVE_STRING_SIZE..SAVE_STRING_SIZE + SAVE_VERSION.len()], SAVE_VERSION.as_bytes());
        let wads_at = SAVE_STRING_SIZE + VERSION_SIZE + 8;
        assert_eq!(&bytes[wads_at..wads_at + 10], b"doom2.wad\n");
    }

    #[test]
    fn overlong_description_is_refused() {
        let mut save = sample();
        save.description = "x".repeat(SAVE_STRING_SIZE + 1);
        assert!(matches!(save.to_bytes(), Err(DemoError::InvalidRequest { .. })));
    }

    #[test]
    fn missing_terminator_is_reported() {
        let observer = Arc::new(CollectingObserver::new());
        let dyn_observer: Option<Arc<dyn ViolationObserver>> = Some(observer.clone());
        let mut bytes = sample().to_bytes().unwrap();
        *bytes.last_mut().unwrap() = 0;
        let err = SaveGame::from_bytes(&bytes, &check(), &dyn_observer).unwrap_err();
        assert!(matches!(err, DemoError::NotRecognized { .. }));
        assert!(observer.has_violation(ViolationKind::SaveGame));
    }

    #[test]
    fn truncated_save_overruns() {
        let bytes = sample().to_bytes().unwrap();
        let err = SaveGame::from_bytes(&bytes[..bytes.len() - 4], &check(), &None).unwrap_err();
        assert!(matches!(err, DemoError::HeaderOverrun { .. }));
    }

    // ===== Mismatches =====

    #[test]
    fn version_mismatch_needs_force() {
        let mut save = sample();
        save.version = "OTHER 2".to_owned();
        let bytes = save.to_bytes().unwrap();
        let err = SaveGame::from_bytes(&bytes, &check(), &None).unwrap_err();
        assert!(matches!(
            err,
            DemoError::SaveGameMismatch {
                kind: SaveMismatchKind::Version,
                ..
            }
        ));
        assert!(!err.is_fatal());
        let forced = LoadCheck {
            forced: true,
            ..check()
        };
        assert!(SaveGame::from_bytes(&bytes, &forced, &None).is_ok());
    }

    #[test]
    fn forced_signature_mismatch_warns() {
        let bytes = sample().to_bytes().unwrap();
        let other = LoadCheck {
            signature: 1,
            ..LoadCheck::default()
        };
        assert!(matches!(
            SaveGame::from_bytes(&bytes, &other, &None),
            Err(DemoError::SaveGameMismatch {
                kind: SaveMismatchKind::Signature,
                ..
            })
        ));

        let observer = Arc::new(CollectingObserver::new());
        let dyn_observer: Option<Arc<dyn ViolationObserver>> = Some(observer.clone());
        let forced = LoadCheck { forced: true, ..other };
        assert!(SaveGame::from_bytes(&bytes, &forced, &dyn_observer).is_ok());
        assert!(observer.has_violation(ViolationKind::SaveGame));
    }

    #[test]
    fn unknown_level_is_refused() {
        let mut bytes = sample().to_bytes().unwrap();
        let level_at = SAVE_STRING_SIZE + VERSION_SIZE + 8 + "doom2.wad\nscythe.wad\n".len() + 1 + 8;
        bytes[level_at] = 250;
        assert!(matches!(
            SaveGame::from_bytes(&bytes, &check(), &None),
            Err(DemoError::SaveGameMismatch {
                kind: SaveMismatchKind::CompatibilityLevel,
                ..
            })
        ));
    }

    // ===== Embedded demo =====

    #[test]
    fn offset_only_demo_rewinds_the_recording() {
        let mut stream = stream_with(4);
        let mut save = sample();
        save.demo = Some(SavedDemo::capture(&stream, false));
        let cursor = stream.cursor();
        stream.record(&TickCommand::EMPTY).unwrap();

        let loaded = SaveGame::from_bytes(&save.to_bytes().unwrap(), &check(), &None).unwrap();
        loaded.demo.unwrap().apply(&mut stream).unwrap();
        assert_eq!(stream.cursor(), cursor);
        assert_eq!(stream.tics(), 4);
    }

    #[test]
    fn complete_demo_replaces_the_recording() {
        let original = stream_with(3);
        let mut save = sample();
        save.demo = Some(SavedDemo::capture(&original, true));
        let loaded = SaveGame::from_bytes(&save.to_bytes().unwrap(), &check(), &None).unwrap();

        let mut fresh = stream_with(0);
        loaded.demo.unwrap().apply(&mut fresh).unwrap();
        assert_eq!(fresh.recorded(), original.recorded());
        assert_eq!(fresh.tics(), 3);
    }
}
