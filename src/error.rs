use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::codec::snapshot::CodecError;
use crate::Tic;

/// How a [`DemoError`] is meant to be handled by the caller.
///
/// Strict callers treat everything except [`ErrorClass::UserFacing`] as fatal.
/// Lenient callers (demo-cycle advancement, batch probing) collapse every
/// class into a single "unusable" signal and move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Integrity failure. Continuing would desynchronize the simulation.
    Fatal,
    /// Recoverable; the caller decides whether to abort or fall back.
    Soft,
    /// Shown to the user, who may confirm to proceed anyway.
    UserFacing,
}

/// Why a save game did not match the running engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveMismatchKind {
    /// The version string differs.
    Version,
    /// The content signature (loaded wads) differs.
    Signature,
    /// The compatibility level stored in the save is not a known level.
    CompatibilityLevel,
}

impl Display for SaveMismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveMismatchKind::Version => write!(f, "version"),
            SaveMismatchKind::Signature => write!(f, "signature"),
            SaveMismatchKind::CompatibilityLevel => write!(f, "compatibility level"),
        }
    }
}

/// This enum contains all error messages this library can return. Most API functions will generally return a [`DemoResult<T>`].
#[derive(Debug, Clone, PartialEq)]
pub enum DemoError {
    /// The demo buffer could not grow to the requested size.
    AllocationFailed {
        /// Bytes that were requested in total.
        requested: usize,
    },
    /// The write cursor was asked to move past its current position.
    CursorForward {
        /// The requested cursor position.
        requested: usize,
        /// The cursor position at the time of the request.
        current: usize,
    },
    /// The demo version byte is not one of the known historical formats.
    UnknownDemoVersion {
        /// The offending version byte.
        version: u8,
    },
    /// An extended (255) header was recognized but its contents are incompatible.
    MalformedExtendedHeader {
        /// What did not match.
        reason: String,
    },
    /// A pre-1.4 demo failed the file-shape heuristics.
    UnrecognisedLegacyFormat {
        /// Which heuristic rejected the file.
        reason: String,
    },
    /// A header read would run past the end of the buffer.
    HeaderOverrun {
        /// Offset of the read relative to the start of the header.
        position: usize,
        /// Bytes the read needed.
        needed: usize,
        /// Total size of the buffer.
        size: usize,
    },
    /// A lenient "not recognized" outcome escalated by a strict caller.
    NotRecognized {
        /// Why the data was not recognized.
        reason: String,
    },
    /// Recording was requested without choosing a compatibility level.
    MissingCompatibilityLevel,
    /// A compatibility toggle vector did not have the historical size.
    ToggleVectorSize {
        /// The required number of toggles.
        expected: usize,
        /// The number of toggles supplied.
        actual: usize,
    },
    /// Decoding a tick ran past the end of a buffer that was trusted to hold whole ticks.
    TruncatedTick {
        /// Offset at which the tick starts.
        offset: usize,
        /// Bytes the tick needs.
        needed: usize,
        /// Bytes available from `offset`.
        available: usize,
    },
    /// No header writer exists for this compatibility level.
    UnsupportedRecordingLevel {
        /// Numeric compatibility level.
        level: u8,
    },
    /// An experimental format was requested without the explicit opt-in.
    ExperimentalFormat {
        /// Further specifies what is missing.
        info: String,
    },
    /// The demo could not be used; produced by lenient loaders.
    UnusableDemo {
        /// Name of the demo that was skipped.
        name: String,
        /// The underlying reason.
        reason: String,
    },
    /// A demo named in a demo cycle does not exist.
    DemoNotFound {
        /// Name of the missing demo.
        name: String,
    },
    /// A save game was produced by a different engine build or wad set.
    SaveGameMismatch {
        /// What differs.
        kind: SaveMismatchKind,
        /// Value found in the save.
        found: String,
        /// Value the running engine expects.
        expected: String,
    },
    /// You made an invalid request, usually by using wrong parameters for function calls.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// An operation addressed a tic outside the valid range.
    InvalidTic {
        /// The tic that was invalid.
        tic: Tic,
        /// A description of why the tic was invalid.
        reason: String,
    },
    /// Reading or writing a file failed.
    Io {
        /// Path or description of the file.
        context: String,
        /// The underlying I/O error message.
        message: String,
    },
    /// Serialization or deserialization of a snapshot failed.
    Serialization(CodecError),
    /// An internal error occurred that should not happen under normal operation.
    /// If you encounter this error, please report it as a bug.
    InternalError {
        /// A description of the internal error.
        context: String,
    },
}

impl DemoError {
    /// Maps this error onto the handling taxonomy.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            DemoError::NotRecognized { .. }
            | DemoError::UnusableDemo { .. }
            | DemoError::DemoNotFound { .. }
            | DemoError::InvalidRequest { .. } => ErrorClass::Soft,
            DemoError::SaveGameMismatch { .. } => ErrorClass::UserFacing,
            _ => ErrorClass::Fatal,
        }
    }

    /// Returns `true` if this error must terminate the current session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Fatal)
    }

    pub(crate) fn io(context: impl Into<String>, err: &std::io::Error) -> Self {
        DemoError::Io {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

impl Display for DemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemoError::AllocationFailed { requested } => {
                write!(f, "Unable to grow demo buffer to {} bytes", requested)
            }
            DemoError::CursorForward { requested, current } => {
                write!(
                    f,
                    "Impossible time traveling detected: cannot move demo cursor from {} forward to {}",
                    current, requested
                )
            }
            DemoError::UnknownDemoVersion { version } => {
                write!(f, "Unknown demo format {}", version)
            }
            DemoError::MalformedExtendedHeader { reason } => {
                write!(f, "Unknown demo format: {}", reason)
            }
            DemoError::UnrecognisedLegacyFormat { reason } => {
                write!(f, "Unrecognised demo format: {}", reason)
            }
            DemoError::HeaderOverrun {
                position,
                needed,
                size,
            } => {
                write!(
                    f,
                    "Wrong demo header: read of {} bytes at {} overruns {} bytes",
                    needed, position, size
                )
            }
            DemoError::NotRecognized { reason } => {
                write!(f, "Demo not recognized: {}", reason)
            }
            DemoError::MissingCompatibilityLevel => {
                write!(
                    f,
                    "You must specify a compatibility level when recording a demo"
                )
            }
            DemoError::ToggleVectorSize { expected, actual } => {
                write!(
                    f,
                    "Compatibility vector consistency error: expected {} toggles, got {}",
                    expected, actual
                )
            }
            DemoError::TruncatedTick {
                offset,
                needed,
                available,
            } => {
                write!(
                    f,
                    "Tick at offset {} needs {} bytes but only {} remain",
                    offset, needed, available
                )
            }
            DemoError::UnsupportedRecordingLevel { level } => {
                write!(f, "Compatibility level {} cannot be recorded", level)
            }
            DemoError::ExperimentalFormat { info } => {
                write!(f, "Experimental format: {}", info)
            }
            DemoError::UnusableDemo { name, reason } => {
                write!(f, "Demo {} is not usable: {}", name, reason)
            }
            DemoError::DemoNotFound { name } => {
                write!(f, "Demo {} not found", name)
            }
            DemoError::SaveGameMismatch {
                kind,
                found,
                expected,
            } => {
                write!(
                    f,
                    "Save game {} mismatch: found {}, expected {} (load anyway?)",
                    kind, found, expected
                )
            }
            DemoError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            }
            DemoError::InvalidTic { tic, reason } => {
                write!(f, "Invalid tic {}: {}", tic, reason)
            }
            DemoError::Io { context, message } => {
                write!(f, "I/O error on {}: {}", context, message)
            }
            DemoError::Serialization(err) => {
                write!(f, "Serialization error: {}", err)
            }
            DemoError::InternalError { context } => {
                write!(f, "Internal error (please report as bug): {}", context)
            }
        }
    }
}

impl Error for DemoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DemoError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CodecError> for DemoError {
    fn from(err: CodecError) -> Self {
        DemoError::Serialization(err)
    }
}

/// Result alias used throughout the crate.
pub type DemoResult<T> = Result<T, DemoError>;

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
    fn cursor_forward_is_fatal() {
        let err = DemoError::CursorForward {
            requested: 10,
            current: 5,
        };
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Impossible time traveling"));
    }

    #[test]
    fn lenient_signals_are_soft() {
        let not_recognized = DemoError::NotRecognized {
            reason: "foreign".to_owned(),
        };
        let missing = DemoError::DemoNotFound {
            name: "DEMO4".to_owned(),
        };
        assert_eq!(not_recognized.class(), ErrorClass::Soft);
        assert_eq!(missing.class(), ErrorClass::Soft);
        assert!(!missing.is_fatal());
    }

    #[test]
    fn save_mismatch_is_user_facing() {
        let err = DemoError::SaveGameMismatch {
            kind: SaveMismatchKind::Version,
            found: "PrBoom 2.5".to_owned(),
            expected: "DSDA-DOOM 2".to_owned(),
        };
        assert_eq!(err.class(), ErrorClass::UserFacing);
        let text = err.to_string();
        assert!(text.contains("version"));
        assert!(text.contains("load anyway"));
    }

    #[test]
    fn serialization_error_has_source() {
        let err = DemoError::from(CodecError::decode(
            "unexpected end",
            crate::codec::snapshot::CodecOperation::Decode,
        ));
        assert!(err.source().is_some());
        assert!(err.is_fatal());
    }
}
