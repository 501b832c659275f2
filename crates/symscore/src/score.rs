//! The score aggregate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::convert::Converter;
use crate::error::ScoreError;
use crate::event::{EventRef, KeySignature, RawEvent, Tempo, TextMeta, TimeSignature};
use crate::ops::{self, ShiftPolicy};
use crate::track::{keep, retime_all, Track};
use crate::unit::{Quarter, Second, Tick, Time, TimeUnit, TimeValue};

/// Largest resolution the file header can express in metrical timing.
pub const MAX_TICKS_PER_QUARTER: u16 = 0x7FFF;

/// Standard MIDI File layout, kept so a parsed file writes back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// Format 0: everything in one track chunk.
    SingleTrack,
    /// Format 1: simultaneous tracks.
    #[default]
    Parallel,
    /// Format 2: independent sequential patterns.
    Sequential,
}

impl Format {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Format::SingleTrack),
            1 => Some(Format::Parallel),
            2 => Some(Format::Sequential),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Format::SingleTrack => 0,
            Format::Parallel => 1,
            Format::Sequential => 2,
        }
    }
}

/// A complete piece in time unit `U`.
///
/// Tempo, time signature, key signature and marker events apply to the
/// whole score, not to any one track. `title` is the conductor chunk's
/// name. `raw` holds opaque events that were found outside any track
/// (typically in a conductor chunk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Score<U: TimeUnit> {
    pub ticks_per_quarter: u16,
    pub format: Format,
    #[serde(default)]
    pub title: String,
    pub tracks: Vec<Track<U>>,
    pub tempos: Vec<Tempo<U>>,
    pub time_signatures: Vec<TimeSignature<U>>,
    pub key_signatures: Vec<KeySignature<U>>,
    pub markers: Vec<TextMeta<U>>,
    pub raw: Vec<RawEvent<U>>,
}

pub(crate) fn check_resolution(ticks_per_quarter: u16) -> Result<(), ScoreError> {
    if ticks_per_quarter == 0 || ticks_per_quarter > MAX_TICKS_PER_QUARTER {
        return Err(ScoreError::InvalidResolution(ticks_per_quarter));
    }
    Ok(())
}

impl<U: TimeUnit> Score<U> {
    /// An empty format-1 score.
    pub fn new(ticks_per_quarter: u16) -> Result<Self, ScoreError> {
        check_resolution(ticks_per_quarter)?;
        Ok(Self {
            ticks_per_quarter,
            format: Format::default(),
            title: String::new(),
            tracks: Vec::new(),
            tempos: Vec::new(),
            time_signatures: Vec::new(),
            key_signatures: Vec::new(),
            markers: Vec::new(),
            raw: Vec::new(),
        })
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(Track::note_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(Track::is_empty) && self.global_events().next().is_none()
    }

    /// Score-level events, one kind after another.
    pub fn global_events(&self) -> impl Iterator<Item = EventRef<'_, U>> {
        self.tempos
            .iter()
            .map(EventRef::Tempo)
            .chain(self.time_signatures.iter().map(EventRef::TimeSignature))
            .chain(self.key_signatures.iter().map(EventRef::KeySignature))
            .chain(self.markers.iter().map(EventRef::Marker))
            .chain(self.raw.iter().map(EventRef::Raw))
    }

    /// Combine scores sharing one unit and resolution.
    ///
    /// Tracks are concatenated in input order; score-level sequences are
    /// concatenated and then stably re-sorted by time. The first score's
    /// title and format win.
    pub fn merge(scores: &[Score<U>]) -> Result<Score<U>, ScoreError> {
        let (first, rest) = scores.split_first().ok_or(ScoreError::EmptyMerge)?;
        let mut merged = first.clone();
        for other in rest {
            if other.ticks_per_quarter != first.ticks_per_quarter {
                return Err(ScoreError::IncompatibleScore {
                    expected_unit: U::KIND,
                    expected_tpq: first.ticks_per_quarter,
                    found_unit: U::KIND,
                    found_tpq: other.ticks_per_quarter,
                });
            }
            merged.tracks.extend(other.tracks.iter().cloned());
            merged.tempos.extend(other.tempos.iter().cloned());
            merged.time_signatures.extend(other.time_signatures.iter().cloned());
            merged.key_signatures.extend(other.key_signatures.iter().cloned());
            merged.markers.extend(other.markers.iter().cloned());
            merged.raw.extend(other.raw.iter().cloned());
        }
        merged.sort_globals();
        debug!(
            inputs = scores.len(),
            tracks = merged.tracks.len(),
            "merged scores"
        );
        Ok(merged)
    }

    fn sort_globals(&mut self) {
        ops::sort_events(&mut self.tempos);
        ops::sort_events(&mut self.time_signatures);
        ops::sort_events(&mut self.key_signatures);
        ops::sort_events(&mut self.markers);
        ops::sort_events(&mut self.raw);
    }

    /// Stable sort of every track and every score-level sequence.
    pub fn sort(&mut self) {
        self.tracks.iter_mut().for_each(Track::sort);
        self.sort_globals();
    }

    pub fn sorted(&self) -> Self {
        let mut score = self.clone();
        score.sort();
        score
    }

    /// A copy holding only the events the predicate accepts. Tracks are
    /// kept even when all of their events are filtered out.
    pub fn filter<P>(&self, mut predicate: P) -> Self
    where
        P: FnMut(EventRef<'_, U>) -> bool,
    {
        Self {
            ticks_per_quarter: self.ticks_per_quarter,
            format: self.format,
            title: self.title.clone(),
            tracks: self
                .tracks
                .iter()
                .map(|t| t.filter(&mut predicate))
                .collect(),
            tempos: keep(&self.tempos, |e| predicate(EventRef::Tempo(e))),
            time_signatures: keep(&self.time_signatures, |e| {
                predicate(EventRef::TimeSignature(e))
            }),
            key_signatures: keep(&self.key_signatures, |e| predicate(EventRef::KeySignature(e))),
            markers: keep(&self.markers, |e| predicate(EventRef::Marker(e))),
            raw: keep(&self.raw, |e| predicate(EventRef::Raw(e))),
        }
    }

    /// Events starting in `[start, end)`, applied to tracks and globals alike.
    pub fn clip(&self, start: Time<U>, end: Time<U>, clip_end: bool) -> Self {
        Self {
            ticks_per_quarter: self.ticks_per_quarter,
            format: self.format,
            title: self.title.clone(),
            tracks: self
                .tracks
                .iter()
                .map(|t| t.clip(start, end, clip_end))
                .collect(),
            tempos: ops::clip_events(&self.tempos, start, end, clip_end),
            time_signatures: ops::clip_events(&self.time_signatures, start, end, clip_end),
            key_signatures: ops::clip_events(&self.key_signatures, start, end, clip_end),
            markers: ops::clip_events(&self.markers, start, end, clip_end),
            raw: ops::clip_events(&self.raw, start, end, clip_end),
        }
    }

    pub fn shift(&self, offset: Time<U>, policy: ShiftPolicy) -> Result<Self, ScoreError> {
        Ok(Self {
            ticks_per_quarter: self.ticks_per_quarter,
            format: self.format,
            title: self.title.clone(),
            tracks: self
                .tracks
                .iter()
                .map(|t| t.shift(offset, policy))
                .collect::<Result<_, _>>()?,
            tempos: ops::shift_events(&self.tempos, offset, policy)?,
            time_signatures: ops::shift_events(&self.time_signatures, offset, policy)?,
            key_signatures: ops::shift_events(&self.key_signatures, offset, policy)?,
            markers: ops::shift_events(&self.markers, offset, policy)?,
            raw: ops::shift_events(&self.raw, offset, policy)?,
        })
    }

    /// Latest event end across tracks and globals; zero when empty.
    pub fn end_time(&self) -> Time<U> {
        let globals = [
            ops::max_end(&self.tempos),
            ops::max_end(&self.time_signatures),
            ops::max_end(&self.key_signatures),
            ops::max_end(&self.markers),
            ops::max_end(&self.raw),
        ];
        self.tracks
            .iter()
            .map(Track::end_time)
            .chain(globals.into_iter().flatten())
            .fold(TimeValue::zero(), TimeValue::max_of)
    }

    /// Earliest event time across tracks and globals; zero when empty.
    pub fn start_time(&self) -> Time<U> {
        let globals = [
            ops::min_time(&self.tempos),
            ops::min_time(&self.time_signatures),
            ops::min_time(&self.key_signatures),
            ops::min_time(&self.markers),
            ops::min_time(&self.raw),
        ];
        self.tracks
            .iter()
            .filter(|t| !t.is_empty())
            .map(Track::start_time)
            .chain(globals.into_iter().flatten())
            .reduce(TimeValue::min_of)
            .unwrap_or_else(TimeValue::zero)
    }

    /// A converter from this score's unit to `V`, built from its tempo map.
    pub fn converter<V: TimeUnit>(&self) -> Converter<U, V> {
        Converter::new(self.ticks_per_quarter, &self.tempos)
    }

    /// A new score in unit `V`. The source score is left untouched;
    /// converting to the current unit returns equal values.
    pub fn convert<V: TimeUnit>(&self) -> Score<V> {
        let conv = self.converter::<V>();
        Score {
            ticks_per_quarter: self.ticks_per_quarter,
            format: self.format,
            title: self.title.clone(),
            tracks: self.tracks.iter().map(|t| t.convert(&conv)).collect(),
            tempos: retime_all(&self.tempos, &conv),
            time_signatures: retime_all(&self.time_signatures, &conv),
            key_signatures: retime_all(&self.key_signatures, &conv),
            markers: retime_all(&self.markers, &conv),
            raw: retime_all(&self.raw, &conv),
        }
    }

    pub fn to_tick(&self) -> Score<Tick> {
        self.convert()
    }

    pub fn to_quarter(&self) -> Score<Quarter> {
        self.convert()
    }

    pub fn to_second(&self) -> Score<Second> {
        self.convert()
    }
}
