//! Error types for dataset storage and checkpoints.

use std::fmt;
use std::io;

use slabtrace_core::{CommError, DType, FieldError, StepError};

/// Errors that can occur while encoding, storing, or restoring datasets.
#[derive(Debug)]
pub enum StoreError {
    /// An I/O error occurred during read or write.
    Io(io::Error),
    /// The dataset does not start with the expected `b"SLBT"` magic bytes.
    InvalidMagic,
    /// The format version is not supported by this build.
    UnsupportedVersion {
        /// The version found in the dataset.
        found: u8,
    },
    /// The element type tag is not recognized.
    UnknownElement {
        /// The unrecognized tag.
        tag: u8,
    },
    /// The dataset holds reals of a different precision than requested.
    DTypeMismatch {
        /// Precision requested by the reader.
        expected: DType,
        /// Precision recorded in the dataset.
        found: DType,
    },
    /// A dataset could not be decoded (truncated, trailing, or
    /// inconsistent data).
    MalformedDataset {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// No dataset is stored under the name.
    NotFound {
        /// The requested name.
        name: String,
    },
    /// A dataset name is empty or has an unusable path segment.
    InvalidName {
        /// The rejected name.
        name: String,
    },
    /// A field snapshot does not fit the layout.
    Field(FieldError),
    /// Restored particles are inconsistent.
    Step(StepError),
    /// A collective gather failed.
    Comm(CommError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidMagic => write!(f, "invalid magic bytes (expected SLBT)"),
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported dataset format version {found}")
            }
            Self::UnknownElement { tag } => write!(f, "unknown element tag {tag:#04x}"),
            Self::DTypeMismatch { expected, found } => {
                write!(f, "dataset holds {found} values, expected {expected}")
            }
            Self::MalformedDataset { detail } => write!(f, "malformed dataset: {detail}"),
            Self::NotFound { name } => write!(f, "no dataset named {name:?}"),
            Self::InvalidName { name } => write!(f, "invalid dataset name {name:?}"),
            Self::Field(e) => write!(f, "field snapshot: {e}"),
            Self::Step(e) => write!(f, "particle checkpoint: {e}"),
            Self::Comm(e) => write!(f, "checkpoint gather: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Field(e) => Some(e),
            Self::Step(e) => Some(e),
            Self::Comm(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<FieldError> for StoreError {
    fn from(e: FieldError) -> Self {
        Self::Field(e)
    }
}

impl From<StepError> for StoreError {
    fn from(e: StepError) -> Self {
        Self::Step(e)
    }
}

impl From<CommError> for StoreError {
    fn from(e: CommError) -> Self {
        Self::Comm(e)
    }
}
