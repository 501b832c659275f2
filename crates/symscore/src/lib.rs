//! Symbolic music scores.
//!
//! A [`Score`] holds tracks of notes, controllers, pitch bends, pedals and
//! lyrics plus score-wide tempo, signature and marker events. Every type
//! is generic over a time unit: [`Tick`] (integer pulses at the score's
//! resolution), [`Quarter`] (fractional quarter notes) or [`Second`]
//! (wall-clock time through the tempo map).
//!
//! ```
//! use symscore::{Note, Score, ShiftPolicy, Tempo, Tick, Track};
//!
//! let mut score = Score::<Tick>::new(480)?;
//! score.tempos.push(Tempo::from_qpm(0, 120.0)?);
//! let mut track = Track::new("Piano", 0, false)?;
//! track.notes.push(Note::new(480, 480, 60, 100)?);
//! score.tracks.push(track);
//!
//! let seconds = score.to_second();
//! assert_eq!(seconds.tracks[0].notes[0].time, 0.5);
//!
//! let later = score.shift(240, ShiftPolicy::Strict)?;
//! assert_eq!(later.end_time(), 1200);
//! # Ok::<(), symscore::ScoreError>(())
//! ```

pub mod codec;
pub mod config;
pub mod convert;
pub mod error;
pub mod event;
pub mod factory;
mod ops;
pub mod score;
pub mod tempo_map;
pub mod track;
pub mod unit;

pub use codec::{
    parse, parse_with, serialize, serialize_with, DecodeReport, Decoded, EncodeOptions,
    ParseOptions,
};
pub use config::{EditOptions, SymscoreConfig};
pub use convert::Converter;
pub use error::{CodecError, ConfigError, ScoreError};
pub use event::{
    ControlChange, Event, EventRef, KeyMode, KeySignature, Note, Pedal, PitchBend, RawEvent,
    Tempo, TextMeta, TimeSignature,
};
pub use factory::{quarter, second, tick};
pub use ops::ShiftPolicy;
pub use score::{Format, Score};
pub use tempo_map::TempoMap;
pub use track::Track;
pub use unit::{Quarter, Second, Tick, Time, TimeUnit, TimeValue, UnitKind};

pub type Result<T, E = ScoreError> = std::result::Result<T, E>;
