//! A single instrument part.

use serde::{Deserialize, Serialize};

use crate::convert::Converter;
use crate::error::ScoreError;
use crate::event::{ControlChange, Event, EventRef, Note, Pedal, PitchBend, RawEvent, TextMeta};
use crate::ops::{self, ShiftPolicy};
use crate::unit::{Time, TimeUnit, TimeValue};

/// Channel used for General MIDI percussion.
pub const DRUM_CHANNEL: u8 = 9;

/// An instrument part: one sequence per event kind, all in unit `U`.
///
/// Sequences are not required to be sorted. Decoded tracks are
/// time-ascending; `clip`, `filter` and `shift` preserve the existing
/// order and `sort` establishes it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Track<U: TimeUnit> {
    pub name: String,
    pub program: u8,
    pub is_drum: bool,
    pub notes: Vec<Note<U>>,
    pub controls: Vec<ControlChange<U>>,
    pub pitch_bends: Vec<PitchBend<U>>,
    pub pedals: Vec<Pedal<U>>,
    pub lyrics: Vec<TextMeta<U>>,
    pub raw: Vec<RawEvent<U>>,
}

impl<U: TimeUnit> Track<U> {
    pub fn new(name: impl Into<String>, program: u8, is_drum: bool) -> Result<Self, ScoreError> {
        if program > 127 {
            return Err(ScoreError::InvalidEvent {
                kind: "track",
                reason: format!("program must be in 0..=127, got {program}"),
            });
        }
        Ok(Self {
            name: name.into(),
            program,
            is_drum,
            ..Self::default()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
            && self.controls.is_empty()
            && self.pitch_bends.is_empty()
            && self.pedals.is_empty()
            && self.lyrics.is_empty()
            && self.raw.is_empty()
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Iterate every event, one kind after another.
    pub fn events(&self) -> impl Iterator<Item = EventRef<'_, U>> {
        self.notes
            .iter()
            .map(EventRef::Note)
            .chain(self.controls.iter().map(EventRef::ControlChange))
            .chain(self.pitch_bends.iter().map(EventRef::PitchBend))
            .chain(self.pedals.iter().map(EventRef::Pedal))
            .chain(self.lyrics.iter().map(EventRef::Lyric))
            .chain(self.raw.iter().map(EventRef::Raw))
    }

    /// Channel the track's channel messages default to on export.
    pub fn channel(&self) -> u8 {
        if self.is_drum {
            return DRUM_CHANNEL;
        }
        self.notes
            .iter()
            .map(|n| n.channel)
            .chain(self.controls.iter().map(|c| c.channel))
            .chain(self.pitch_bends.iter().map(|p| p.channel))
            .chain(self.pedals.iter().map(|p| p.channel))
            .find(|&ch| ch != DRUM_CHANNEL)
            .unwrap_or(0)
    }

    /// Stable sort of every sequence by time.
    pub fn sort(&mut self) {
        ops::sort_events(&mut self.notes);
        ops::sort_events(&mut self.controls);
        ops::sort_events(&mut self.pitch_bends);
        ops::sort_events(&mut self.pedals);
        ops::sort_events(&mut self.lyrics);
        ops::sort_events(&mut self.raw);
    }

    pub fn sorted(&self) -> Self {
        let mut track = self.clone();
        track.sort();
        track
    }

    pub fn is_sorted(&self) -> bool {
        ops::is_sorted(&self.notes)
            && ops::is_sorted(&self.controls)
            && ops::is_sorted(&self.pitch_bends)
            && ops::is_sorted(&self.pedals)
            && ops::is_sorted(&self.lyrics)
            && ops::is_sorted(&self.raw)
    }

    /// A copy holding only the events the predicate accepts.
    pub fn filter<P>(&self, mut predicate: P) -> Self
    where
        P: FnMut(EventRef<'_, U>) -> bool,
    {
        Self {
            name: self.name.clone(),
            program: self.program,
            is_drum: self.is_drum,
            notes: keep(&self.notes, |e| predicate(EventRef::Note(e))),
            controls: keep(&self.controls, |e| predicate(EventRef::ControlChange(e))),
            pitch_bends: keep(&self.pitch_bends, |e| predicate(EventRef::PitchBend(e))),
            pedals: keep(&self.pedals, |e| predicate(EventRef::Pedal(e))),
            lyrics: keep(&self.lyrics, |e| predicate(EventRef::Lyric(e))),
            raw: keep(&self.raw, |e| predicate(EventRef::Raw(e))),
        }
    }

    /// Events starting in `[start, end)`. With `clip_end`, notes and
    /// pedals running past `end` are shortened to end there.
    pub fn clip(&self, start: Time<U>, end: Time<U>, clip_end: bool) -> Self {
        Self {
            name: self.name.clone(),
            program: self.program,
            is_drum: self.is_drum,
            notes: ops::clip_events(&self.notes, start, end, clip_end),
            controls: ops::clip_events(&self.controls, start, end, clip_end),
            pitch_bends: ops::clip_events(&self.pitch_bends, start, end, clip_end),
            pedals: ops::clip_events(&self.pedals, start, end, clip_end),
            lyrics: ops::clip_events(&self.lyrics, start, end, clip_end),
            raw: ops::clip_events(&self.raw, start, end, clip_end),
        }
    }

    /// Move every event by `offset`.
    pub fn shift(&self, offset: Time<U>, policy: ShiftPolicy) -> Result<Self, ScoreError> {
        Ok(Self {
            name: self.name.clone(),
            program: self.program,
            is_drum: self.is_drum,
            notes: ops::shift_events(&self.notes, offset, policy)?,
            controls: ops::shift_events(&self.controls, offset, policy)?,
            pitch_bends: ops::shift_events(&self.pitch_bends, offset, policy)?,
            pedals: ops::shift_events(&self.pedals, offset, policy)?,
            lyrics: ops::shift_events(&self.lyrics, offset, policy)?,
            raw: ops::shift_events(&self.raw, offset, policy)?,
        })
    }

    /// Latest `time`, or `time + duration` for notes and pedals; zero when empty.
    pub fn end_time(&self) -> Time<U> {
        [
            ops::max_end(&self.notes),
            ops::max_end(&self.controls),
            ops::max_end(&self.pitch_bends),
            ops::max_end(&self.pedals),
            ops::max_end(&self.lyrics),
            ops::max_end(&self.raw),
        ]
        .into_iter()
        .flatten()
        .fold(TimeValue::zero(), TimeValue::max_of)
    }

    /// Earliest event time; zero when empty.
    pub fn start_time(&self) -> Time<U> {
        [
            ops::min_time(&self.notes),
            ops::min_time(&self.controls),
            ops::min_time(&self.pitch_bends),
            ops::min_time(&self.pedals),
            ops::min_time(&self.lyrics),
            ops::min_time(&self.raw),
        ]
        .into_iter()
        .flatten()
        .reduce(TimeValue::min_of)
        .unwrap_or_else(TimeValue::zero)
    }

    /// Re-express the track in another unit.
    pub fn convert<V: TimeUnit>(&self, conv: &Converter<U, V>) -> Track<V> {
        Track {
            name: self.name.clone(),
            program: self.program,
            is_drum: self.is_drum,
            notes: retime_all(&self.notes, conv),
            controls: retime_all(&self.controls, conv),
            pitch_bends: retime_all(&self.pitch_bends, conv),
            pedals: retime_all(&self.pedals, conv),
            lyrics: retime_all(&self.lyrics, conv),
            raw: retime_all(&self.raw, conv),
        }
    }
}

pub(crate) fn keep<E: Clone>(events: &[E], mut predicate: impl FnMut(&E) -> bool) -> Vec<E> {
    events.iter().filter(|e| predicate(e)).cloned().collect()
}

pub(crate) fn retime_all<E: Event, V: TimeUnit>(
    events: &[E],
    conv: &Converter<E::Unit, V>,
) -> Vec<E::Retimed<V>> {
    events.iter().map(|e| e.retime(conv)).collect()
}
