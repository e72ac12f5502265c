//! Error taxonomy for the storage engine.
//!
//! Every kind below corresponds 1:1 to a failure mode the format itself can
//! produce. There is no catch-all "internal error" variant: if a new failure
//! mode appears it gets a new variant, not a stringly-typed fallback.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Operation requires `open()` to have succeeded first.
    #[error("directory or column file is not open")]
    NotOpen,

    /// A day-directory name could not be parsed into a timestamp (+ suffix).
    #[error("invalid directory name: {0}")]
    InvalidDirName(String),

    /// `.blockmeta` is shorter than the fixed 72-byte header.
    #[error("sidecar input size too small: got {got} bytes, need at least {want}")]
    InputSizeTooSmall { got: usize, want: usize },

    /// A block or timestamp delta would overflow its 32-bit on-disk field.
    #[error("value {value} exceeds the 32-bit encoding limit for {field}")]
    ExceedsEncodingSize { field: &'static str, value: u64 },

    /// A block already exists for the requested timestamp.
    #[error("duplicate timestamp {0} in column")]
    DuplicateTimestamp(i64),

    /// Read requested on a writer, or vice versa.
    #[error("mode mismatch: {0}")]
    ModeMismatch(&'static str),

    /// Decompression produced a different length than `raw_len` declared.
    #[error("decode length mismatch: expected {expected} bytes, got {actual}")]
    DecodeLengthMismatch { expected: u32, actual: usize },

    /// Codec tag is not one of the frozen, recognized values.
    #[error("unsupported codec tag {0}")]
    CodecUnsupported(u8),

    /// Codec tag is recognized but explicitly retired.
    #[error("codec {0} is deprecated and can no longer be encoded or decoded")]
    CodecDeprecated(&'static str),

    /// Underlying filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Reader could not find `.blockmeta`, even after the recovery attempt.
    #[error("missing sidecar metadata for directory {0}")]
    MissingSidecar(String),

    /// The rendered directory-name suffix exceeds its documented bound.
    #[error("suffix length {len} exceeds the maximum of {max} bytes")]
    SuffixTooLong { len: usize, max: usize },

    /// One or more column files failed to close.
    #[error("column close failed: {0:?}")]
    ColumnCloseFailed(Vec<String>),
}

pub type Result<T> = std::result::Result<T, Error>;
