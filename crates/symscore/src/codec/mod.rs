//! Standard MIDI File codec.
//!
//! Decoding always yields a tick-based score at the file's resolution;
//! encoding takes one. Convert with [`Score::to_tick`] first when starting
//! from quarters or seconds.
//!
//! ```
//! use symscore::{codec, Note, Score, Tick, Track};
//!
//! let mut score = Score::<Tick>::new(480)?;
//! let mut track = Track::new("Piano", 0, false)?;
//! track.notes.push(Note::new(0, 480, 60, 100)?);
//! score.tracks.push(track);
//!
//! let bytes = codec::serialize(&score)?;
//! let back = codec::parse(&bytes)?;
//! assert_eq!(back.tracks[0].notes, score.tracks[0].notes);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod decode;
mod encode;
pub mod feedback;
pub mod vlq;

use serde::{Deserialize, Serialize};

use std::borrow::Borrow;
use std::collections::HashMap;

use crate::error::CodecError;
use crate::event::Note;
use crate::score::Score;
use crate::unit::Tick;

pub use feedback::{DecodeReport, Feedback, FeedbackLevel};

/// Decoder behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Fold sustain controller (CC64) messages into [`Pedal`](crate::Pedal)
    /// spans instead of keeping them as control changes.
    pub derive_pedals: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { derive_pedals: true }
    }
}

/// Encoder behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Omit status bytes that repeat the previous channel message's.
    pub running_status: bool,
    /// Write releases as note-on with velocity 0 rather than note-off.
    pub note_off_as_zero_velocity: bool,
    /// Write sustain controller (CC64) control changes as they are. When
    /// off they are rejected, since the default decoder folds CC64 into
    /// [`Pedal`](crate::Pedal) spans; turn it on together with
    /// [`ParseOptions::derive_pedals`] off.
    pub sustain_controls: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            running_status: true,
            note_off_as_zero_velocity: true,
            sustain_controls: false,
        }
    }
}

/// A decoded score together with what the decoder had to drop or keep opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub score: Score<Tick>,
    pub report: DecodeReport,
}

/// Decode with default options, discarding the report.
pub fn parse(bytes: &[u8]) -> Result<Score<Tick>, CodecError> {
    parse_with(bytes, &ParseOptions::default()).map(|decoded| decoded.score)
}

pub fn parse_with(bytes: &[u8], options: &ParseOptions) -> Result<Decoded, CodecError> {
    decode::decode(bytes, options)
}

/// Encode with default options.
pub fn serialize(score: &Score<Tick>) -> Result<Vec<u8>, CodecError> {
    serialize_with(score, &EncodeOptions::default())
}

pub fn serialize_with(score: &Score<Tick>, options: &EncodeOptions) -> Result<Vec<u8>, CodecError> {
    encode::encode(score, options)
}

/// Reorders notes sharing an onset, channel and pitch by duration, longest
/// first or shortest first. Every other note keeps its slot. `notes` must
/// already be sorted by onset.
///
/// Last-in-first-out pairing closes the most recent note-on first, so the
/// writer puts the longest of such a group on the wire first and the reader
/// hands the group back shortest first.
pub(crate) fn order_unisons<N>(notes: &mut [N], longest_first: bool)
where
    N: Borrow<Note<Tick>> + Clone,
{
    let mut start = 0;
    while start < notes.len() {
        let onset = notes[start].borrow().time;
        let len = notes[start..]
            .iter()
            .take_while(|n| <N as Borrow<Note<Tick>>>::borrow(n).time == onset)
            .count();
        let run = &mut notes[start..start + len];
        start += len;
        if run.len() < 2 {
            continue;
        }

        let mut slots: HashMap<(u8, u8), Vec<usize>> = HashMap::new();
        for (i, note) in run.iter().enumerate() {
            let note = note.borrow();
            slots.entry((note.channel, note.pitch)).or_default().push(i);
        }
        for positions in slots.values().filter(|p| p.len() > 1) {
            let mut group: Vec<N> = positions.iter().map(|&i| run[i].clone()).collect();
            if longest_first {
                group.sort_by(|a, b| b.borrow().duration.cmp(&a.borrow().duration));
            } else {
                group.sort_by_key(|n| n.borrow().duration);
            }
            for (&i, note) in positions.iter().zip(group) {
                run[i] = note;
            }
        }
    }
}

impl Score<Tick> {
    /// Shorthand for [`parse`].
    pub fn from_midi(bytes: &[u8]) -> Result<Self, CodecError> {
        parse(bytes)
    }

    /// Shorthand for [`serialize`].
    pub fn to_midi(&self) -> Result<Vec<u8>, CodecError> {
        serialize(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{
        ControlChange, KeyMode, KeySignature, Note, Pedal, PitchBend, RawEvent, Tempo, TextMeta,
        TimeSignature,
    };
    use crate::score::Format;
    use crate::track::Track;
    use pretty_assertions::assert_eq;

    fn rich_score() -> Score<Tick> {
        let mut score = Score::new(96).unwrap();
        score.tempos = vec![
            Tempo::new(0, 500_000).unwrap(),
            Tempo::new(384, 400_000).unwrap(),
        ];
        score.time_signatures = vec![TimeSignature::new(0, 6, 8).unwrap()];
        score.key_signatures = vec![KeySignature::new(0, -3, KeyMode::Minor).unwrap()];
        score.markers = vec![TextMeta::new(192, "B").unwrap()];

        let mut piano = Track::new("Piano", 4, false).unwrap();
        piano.notes = vec![
            Note::new(0, 96, 60, 90).unwrap(),
            Note::new(0, 192, 64, 80).unwrap(),
            Note::new(96, 96, 60, 70).unwrap(),
            Note::new(192, 0, 72, 50).unwrap(),
        ];
        piano.controls = vec![ControlChange::new(0, 7, 100).unwrap()];
        piano.pitch_bends = vec![
            PitchBend::new(10, -8192).unwrap(),
            PitchBend::new(20, 8191).unwrap(),
        ];
        piano.pedals = vec![Pedal::new(0, 300).unwrap()];
        piano.lyrics = vec![TextMeta::new(0, "la").unwrap()];
        piano.raw = vec![RawEvent::new(50, vec![0xA0, 60, 33]).unwrap()];

        let mut drums = Track::new("Kit", 0, true).unwrap();
        drums.notes = vec![Note::new(0, 10, 36, 127).unwrap().with_channel(9).unwrap()];

        score.tracks = vec![piano, drums];
        score
    }

    #[test]
    fn round_trip_preserves_model() {
        let score = rich_score();
        let bytes = serialize(&score).unwrap();
        let decoded = parse_with(&bytes, &ParseOptions::default()).unwrap();
        assert!(decoded.report.is_clean(), "{:?}", decoded.report);
        assert_eq!(decoded.report.opaque_events, 1);
        assert_eq!(decoded.score, score.sorted());
    }

    #[test]
    fn round_trip_without_running_status() {
        let score = rich_score();
        let options = EncodeOptions {
            running_status: false,
            note_off_as_zero_velocity: false,
            ..EncodeOptions::default()
        };
        let bytes = serialize_with(&score, &options).unwrap();
        assert_eq!(parse(&bytes).unwrap(), score.sorted());
        assert!(bytes.len() > serialize(&score).unwrap().len());
    }

    #[test]
    fn single_track_format_round_trips() {
        let mut score = rich_score();
        score.tracks.truncate(1);
        score.format = Format::SingleTrack;
        let back = Score::from_midi(&score.to_midi().unwrap()).unwrap();
        assert_eq!(back.format, Format::SingleTrack);
        assert_eq!(back, score.sorted());
    }

    #[test]
    fn unison_groups_reorder_in_place() {
        let mut notes = vec![
            Note::new(0, 240, 60, 1).unwrap(),
            Note::new(0, 100, 62, 2).unwrap(),
            Note::new(0, 480, 60, 3).unwrap(),
            Note::new(0, 480, 60, 4).unwrap(),
            Note::new(5, 1, 60, 5).unwrap(),
        ];
        order_unisons(&mut notes, true);
        let velocities: Vec<u8> = notes.iter().map(|n| n.velocity).collect();
        assert_eq!(velocities, vec![3, 2, 4, 1, 5]);

        order_unisons(&mut notes, false);
        let velocities: Vec<u8> = notes.iter().map(|n| n.velocity).collect();
        assert_eq!(velocities, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert!(matches!(
            parse(&[]),
            Err(CodecError::TruncatedStream { offset: 0, needed: 4 })
        ));
    }
}
