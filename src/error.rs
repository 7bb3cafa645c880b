use std::io::Error as IoError;
use std::num::TryFromIntError;
use std::string::{FromUtf16Error, FromUtf8Error};

use thiserror::Error as ThisError;

/// Crate-wide error type.
///
/// Recoverable conditions (invalid string offsets, unknown type ids,
/// unrecognized field tags) never surface here; they are downgraded to
/// [`Warning`] annotations on the parsed file.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("unrecognized file magic {magic:02x?}")]
    MalformedMagic { magic: [u8; 4] },

    #[error("truncated data at offset {offset:#x}: expected {expected} bytes, {actual} available")]
    Truncated {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("field {field:?} holds {found} but the registry declares {expected}")]
    TypeValueMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field {field:?} encoded at offset {offset:#x} breaks its declared {alignment}-byte alignment")]
    AlignmentViolation {
        field: String,
        offset: u64,
        alignment: u32,
    },

    #[error("registry {path:?}: {reason}")]
    InvalidRegistry { path: String, reason: String },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    #[error("{source}")]
    FromUtf16Error {
        #[from]
        source: FromUtf16Error,
    },

    #[error("{source}")]
    IoError {
        #[from]
        source: IoError,
    },

    #[error("{source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },

    #[error("{source}")]
    TryFromIntError {
        #[from]
        source: TryFromIntError,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Recoverable conditions collected while parsing. A file that produced
/// warnings still parsed successfully; the annotations tell the host
/// which parts were degraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A string offset pointed outside the buffer; an empty string was
    /// substituted.
    InvalidStringOffset { offset: u64 },
    /// An instance's type id has no registry entry; its fields were left
    /// undecoded but the instance is carried through rebuilds.
    UnknownType { type_id: u32, instance: u32 },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidStringOffset { offset } => {
                write!(f, "invalid string offset {:#x}", offset)
            }
            Self::UnknownType { type_id, instance } => {
                write!(
                    f,
                    "instance {} has unregistered type {:#010x}",
                    instance, type_id
                )
            }
        }
    }
}
