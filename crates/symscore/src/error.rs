//! Error types for the data model and the binary codec.

use std::path::PathBuf;

use thiserror::Error;

use crate::unit::UnitKind;

/// Errors raised by score construction and batch edits.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("invalid resolution: ticks per quarter must be in 1..=32767, got {0}")]
    InvalidResolution(u16),

    #[error(
        "incompatible scores: expected {expected_unit:?} at {expected_tpq} tpq, \
         found {found_unit:?} at {found_tpq} tpq"
    )]
    IncompatibleScore {
        expected_unit: UnitKind,
        expected_tpq: u16,
        found_unit: UnitKind,
        found_tpq: u16,
    },

    #[error("cannot merge an empty list of scores")]
    EmptyMerge,

    #[error("shifting {kind} at {time} by {offset} would produce a negative time")]
    NegativeTime {
        kind: &'static str,
        time: f64,
        offset: f64,
    },

    #[error("invalid {kind}: {reason}")]
    InvalidEvent { kind: &'static str, reason: String },
}

/// Errors raised while reading or writing Standard MIDI File bytes.
///
/// Everything here is structural: the decoder recovers locally from
/// unmatched notes and unknown events and reports them through
/// [`DecodeReport`](crate::codec::DecodeReport) instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("invalid header at byte {offset}: {reason}")]
    InvalidHeader { offset: usize, reason: String },

    #[error("SMPTE timecode division {0:#06x} is not supported")]
    UnsupportedTimingFormat(u16),

    #[error("malformed variable-length quantity at byte {offset}")]
    MalformedVarLen { offset: usize },

    #[error("data byte {byte:#04x} at byte {offset} with no running status in effect")]
    RunningStatusWithoutContext { offset: usize, byte: u8 },

    #[error("event at tick {tick} follows tick {previous} in track {track}")]
    NonMonotonicEvent { track: usize, previous: i64, tick: i64 },

    #[error("stream truncated at byte {offset}: needed {needed} more bytes")]
    TruncatedStream { offset: usize, needed: usize },

    #[error("{field} value {value} does not fit the wire format")]
    ValueOutOfRange { field: &'static str, value: i64 },

    #[error(transparent)]
    Score(#[from] ScoreError),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}
