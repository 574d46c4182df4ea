//! bincode framing for key frames and save-game snapshots.
//!
//! Demo tick data has a fixed historical layout and goes through
//! [`TickCodec`](super::TickCodec). Everything the engine serializes for its own
//! consumption (key frames, save-game bodies, the demo-stream snapshot attached to
//! a save) goes through this module instead, so a single bincode configuration is
//! used everywhere.
//!
//! # Examples
//!
//! ```
//! use tick_demo::codec::snapshot::{decode, encode};
//!
//! let bytes = encode(&(42u32, "E1M1")).expect("encoding should succeed");
//! let ((tic, map), _read): ((u32, String), _) = decode(&bytes).expect("decoding should succeed");
//! assert_eq!(tic, 42);
//! assert_eq!(map, "E1M1");
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

// Fixed-width integers keep snapshot sizes independent of the values stored,
// so two snapshots of the same state compare byte-for-byte.
fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// What the codec was doing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// Encoding a key frame.
    EncodeKeyFrame,
    /// Decoding a key frame.
    DecodeKeyFrame,
    /// Appending to a save-game buffer.
    AppendToBuffer,
    /// A generic encoding operation.
    Encode,
    /// A generic decoding operation.
    Decode,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeKeyFrame => write!(f, "encoding key frame"),
            Self::DecodeKeyFrame => write!(f, "decoding key frame"),
            Self::AppendToBuffer => write!(f, "appending to buffer"),
            Self::Encode => write!(f, "encoding"),
            Self::Decode => write!(f, "decoding"),
        }
    }
}

/// Errors that can occur during snapshot encoding or decoding.
///
/// bincode errors only expose a `Display` message, so the message is kept as a
/// `String` alongside the operation that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// Decoding succeeded but left unread bytes behind.
    TrailingBytes {
        /// Bytes consumed by the decoder.
        consumed: usize,
        /// Total bytes supplied.
        provided: usize,
    },
}

impl CodecError {
    /// Creates a new encode error with the given message and operation.
    pub fn encode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation,
        }
    }

    /// Creates a new decode error with the given message and operation.
    pub fn decode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed while {operation}: {message}")
            },
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed while {operation}: {message}")
            },
            Self::TrailingBytes { consumed, provided } => {
                write!(
                    f,
                    "decoding consumed {consumed} of {provided} bytes; snapshot has trailing data"
                )
            },
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a value into a new `Vec<u8>`.
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::Encode))
}

/// Encodes a value by appending to an existing `Vec<u8>`.
///
/// Returns the number of bytes appended.
///
/// # Examples
///
/// ```
/// use tick_demo::codec::snapshot::encode_append;
///
/// let mut buffer = b"header".to_vec();
/// let written = encode_append(&7u16, &mut buffer).expect("encoding should succeed");
/// assert_eq!(written, 2);
/// assert_eq!(buffer.len(), 8);
/// ```
pub fn encode_append<T: Serialize>(value: &T, buffer: &mut Vec<u8>) -> CodecResult<usize> {
    let start_len = buffer.len();
    bincode::serde::encode_into_std_write(value, buffer, config())
        .map(|_| buffer.len() - start_len)
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::AppendToBuffer))
}

/// Decodes a value from a byte slice.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<(T, usize)> {
    bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::Decode))
}

/// Decodes a value that must occupy the whole slice.
///
/// Key frames and save bodies are stored as exact blobs; leftover bytes mean the
/// blob was produced by a different engine build.
pub fn decode_exact<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    let (value, consumed) = decode(bytes)?;
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes {
            consumed,
            provided: bytes.len(),
        });
    }
    Ok(value)
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
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Position {
        cursor: usize,
        tics: i32,
        data: Vec<u8>,
    }

    #[test]
    fn fixed_int_encoding_is_value_independent() {
        let small = encode(&1u32).unwrap();
        let large = encode(&u32::MAX).unwrap();
        assert_eq!(small.len(), 4);
        assert_eq!(large.len(), 4);
    }

    #[test]
    fn struct_round_trips() {
        let pos = Position {
            cursor: 13,
            tics: 2,
            data: vec![1, 2, 3],
        };
        let bytes = encode(&pos).unwrap();
        let (decoded, read): (Position, _) = decode(&bytes).unwrap();
        assert_eq!(decoded, pos);
        assert_eq!(read, bytes.len());
    }

    #[test]
    fn decode_exact_rejects_trailing_bytes() {
        let mut bytes = encode(&5u32).unwrap();
        bytes.push(0xff);
        let err = decode_exact::<u32>(&bytes).unwrap_err();
        assert_eq!(
            err,
            CodecError::TrailingBytes {
                consumed: 4,
                provided: 5
            }
        );
    }

    #[test]
    fn truncated_input_is_a_decode_error() {
        let bytes = encode(&Position {
            cursor: 1,
            tics: 1,
            data: vec![9; 16],
        })
        .unwrap();
        let err = decode::<Position>(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::DecodeError {
                operation: CodecOperation::Decode,
                ..
            }
        ));
        assert!(err.to_string().starts_with("decoding failed while decoding"));
    }
}
