//! Timed event records.
//!
//! Each record is generic over a [`TimeUnit`] tag and stores its `time`
//! (and `duration`, where it has one) in that unit's numeric type.
//! Constructors validate the value ranges of the wire format; fields stay
//! public so batch edits can work on them directly.

use serde::{Deserialize, Serialize};

use crate::convert::Converter;
use crate::error::ScoreError;
use crate::unit::{Time, TimeUnit, TimeValue};

/// Microseconds per quarter note at 120 qpm.
pub const DEFAULT_MSPQ: u32 = 500_000;

/// Largest tempo the three-byte tempo meta event can carry.
pub const MAX_MSPQ: u32 = 0x00FF_FFFF;

/// Behaviour shared by every timed record.
pub trait Event: Clone {
    type Unit: TimeUnit;

    /// The same record re-expressed in another unit.
    type Retimed<V: TimeUnit>: Event<Unit = V>;

    /// Human-readable kind, used in errors.
    const KIND: &'static str;

    fn time(&self) -> Time<Self::Unit>;

    fn set_time(&mut self, time: Time<Self::Unit>);

    fn duration(&self) -> Option<Time<Self::Unit>> {
        None
    }

    fn set_duration(&mut self, _duration: Time<Self::Unit>) {}

    /// `time + duration` for records with a span, `time` otherwise.
    fn end(&self) -> Time<Self::Unit> {
        match self.duration() {
            Some(duration) => self.time() + duration,
            None => self.time(),
        }
    }

    fn retime<V: TimeUnit>(&self, conv: &Converter<Self::Unit, V>) -> Self::Retimed<V>;
}

fn check_non_negative<T: TimeValue>(
    kind: &'static str,
    field: &str,
    value: T,
) -> Result<(), ScoreError> {
    if value.is_negative() {
        return Err(ScoreError::InvalidEvent {
            kind,
            reason: format!("{field} must be >= 0, got {value:?}"),
        });
    }
    Ok(())
}

fn check_7bit(kind: &'static str, field: &str, value: u8) -> Result<(), ScoreError> {
    if value > 127 {
        return Err(ScoreError::InvalidEvent {
            kind,
            reason: format!("{field} must be in 0..=127, got {value}"),
        });
    }
    Ok(())
}

fn check_channel(kind: &'static str, channel: u8) -> Result<(), ScoreError> {
    if channel > 15 {
        return Err(ScoreError::InvalidEvent {
            kind,
            reason: format!("channel must be in 0..=15, got {channel}"),
        });
    }
    Ok(())
}

/// A sounding note reconstructed from a note-on/note-off pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Note<U: TimeUnit> {
    pub time: Time<U>,
    pub duration: Time<U>,
    pub pitch: u8,
    pub velocity: u8,
    pub channel: u8,
}

impl<U: TimeUnit> Note<U> {
    /// A note on channel 0.
    pub fn new(
        time: Time<U>,
        duration: Time<U>,
        pitch: u8,
        velocity: u8,
    ) -> Result<Self, ScoreError> {
        let note = Self {
            time,
            duration,
            pitch,
            velocity,
            channel: 0,
        };
        note.validate()?;
        Ok(note)
    }

    pub fn with_channel(mut self, channel: u8) -> Result<Self, ScoreError> {
        check_channel(Self::KIND, channel)?;
        self.channel = channel;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        check_non_negative(Self::KIND, "time", self.time)?;
        check_non_negative(Self::KIND, "duration", self.duration)?;
        check_7bit(Self::KIND, "pitch", self.pitch)?;
        check_7bit(Self::KIND, "velocity", self.velocity)?;
        check_channel(Self::KIND, self.channel)
    }
}

impl<U: TimeUnit> Event for Note<U> {
    type Unit = U;
    type Retimed<V: TimeUnit> = Note<V>;
    const KIND: &'static str = "note";

    fn time(&self) -> Time<U> {
        self.time
    }

    fn set_time(&mut self, time: Time<U>) {
        self.time = time;
    }

    fn duration(&self) -> Option<Time<U>> {
        Some(self.duration)
    }

    fn set_duration(&mut self, duration: Time<U>) {
        self.duration = duration;
    }

    fn retime<V: TimeUnit>(&self, conv: &Converter<U, V>) -> Note<V> {
        Note {
            time: conv.time(self.time),
            duration: conv.duration(self.time, self.duration),
            pitch: self.pitch,
            velocity: self.velocity,
            channel: self.channel,
        }
    }
}

/// A sustain pedal press, folded from CC 64 on/off pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Pedal<U: TimeUnit> {
    pub time: Time<U>,
    pub duration: Time<U>,
    pub channel: u8,
}

impl<U: TimeUnit> Pedal<U> {
    pub fn new(time: Time<U>, duration: Time<U>) -> Result<Self, ScoreError> {
        let pedal = Self {
            time,
            duration,
            channel: 0,
        };
        pedal.validate()?;
        Ok(pedal)
    }

    pub fn with_channel(mut self, channel: u8) -> Result<Self, ScoreError> {
        check_channel(Self::KIND, channel)?;
        self.channel = channel;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        check_non_negative(Self::KIND, "time", self.time)?;
        check_non_negative(Self::KIND, "duration", self.duration)?;
        check_channel(Self::KIND, self.channel)
    }
}

impl<U: TimeUnit> Event for Pedal<U> {
    type Unit = U;
    type Retimed<V: TimeUnit> = Pedal<V>;
    const KIND: &'static str = "pedal";

    fn time(&self) -> Time<U> {
        self.time
    }

    fn set_time(&mut self, time: Time<U>) {
        self.time = time;
    }

    fn duration(&self) -> Option<Time<U>> {
        Some(self.duration)
    }

    fn set_duration(&mut self, duration: Time<U>) {
        self.duration = duration;
    }

    fn retime<V: TimeUnit>(&self, conv: &Converter<U, V>) -> Pedal<V> {
        Pedal {
            time: conv.time(self.time),
            duration: conv.duration(self.time, self.duration),
            channel: self.channel,
        }
    }
}

/// Implements [`Event`] for a record whose only time field is `time`.
macro_rules! instant_event {
    ($ty:ident, $kind:literal, $($field:ident),+) => {
        impl<U: TimeUnit> Event for $ty<U> {
            type Unit = U;
            type Retimed<V: TimeUnit> = $ty<V>;
            const KIND: &'static str = $kind;

            fn time(&self) -> Time<U> {
                self.time
            }

            fn set_time(&mut self, time: Time<U>) {
                self.time = time;
            }

            fn retime<V: TimeUnit>(&self, conv: &Converter<U, V>) -> $ty<V> {
                $ty {
                    time: conv.time(self.time),
                    $($field: self.$field.clone(),)+
                }
            }
        }
    };
}

/// A controller change (CC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ControlChange<U: TimeUnit> {
    pub time: Time<U>,
    pub number: u8,
    pub value: u8,
    pub channel: u8,
}

impl<U: TimeUnit> ControlChange<U> {
    pub fn new(time: Time<U>, number: u8, value: u8) -> Result<Self, ScoreError> {
        let cc = Self {
            time,
            number,
            value,
            channel: 0,
        };
        cc.validate()?;
        Ok(cc)
    }

    pub fn with_channel(mut self, channel: u8) -> Result<Self, ScoreError> {
        check_channel(Self::KIND, channel)?;
        self.channel = channel;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        check_non_negative(Self::KIND, "time", self.time)?;
        check_7bit(Self::KIND, "controller number", self.number)?;
        check_7bit(Self::KIND, "controller value", self.value)?;
        check_channel(Self::KIND, self.channel)
    }
}

instant_event!(ControlChange, "control change", number, value, channel);

/// A 14-bit pitch wheel position, centred on zero (-8192..=8191).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PitchBend<U: TimeUnit> {
    pub time: Time<U>,
    pub value: i16,
    pub channel: u8,
}

impl<U: TimeUnit> PitchBend<U> {
    pub const MIN: i16 = -8192;
    pub const MAX: i16 = 8191;

    pub fn new(time: Time<U>, value: i16) -> Result<Self, ScoreError> {
        let bend = Self {
            time,
            value,
            channel: 0,
        };
        bend.validate()?;
        Ok(bend)
    }

    pub fn with_channel(mut self, channel: u8) -> Result<Self, ScoreError> {
        check_channel(Self::KIND, channel)?;
        self.channel = channel;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        check_non_negative(Self::KIND, "time", self.time)?;
        if !(Self::MIN..=Self::MAX).contains(&self.value) {
            return Err(ScoreError::InvalidEvent {
                kind: Self::KIND,
                reason: format!("value must be in -8192..=8191, got {}", self.value),
            });
        }
        check_channel(Self::KIND, self.channel)
    }
}

instant_event!(PitchBend, "pitch bend", value, channel);

/// A tempo change, stored as microseconds per quarter note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Tempo<U: TimeUnit> {
    pub time: Time<U>,
    pub mspq: u32,
}

impl<U: TimeUnit> Tempo<U> {
    pub fn new(time: Time<U>, mspq: u32) -> Result<Self, ScoreError> {
        let tempo = Self { time, mspq };
        tempo.validate()?;
        Ok(tempo)
    }

    /// Build from quarter notes per minute, rounding to whole microseconds.
    pub fn from_qpm(time: Time<U>, qpm: f64) -> Result<Self, ScoreError> {
        if !(qpm.is_finite() && qpm > 0.0) {
            return Err(ScoreError::InvalidEvent {
                kind: Self::KIND,
                reason: format!("qpm must be positive, got {qpm}"),
            });
        }
        let mspq = (60_000_000.0 / qpm).round();
        if mspq < 1.0 || mspq > MAX_MSPQ as f64 {
            return Err(ScoreError::InvalidEvent {
                kind: Self::KIND,
                reason: format!("qpm {qpm} is outside the representable range"),
            });
        }
        Self::new(time, mspq as u32)
    }

    pub fn qpm(&self) -> f64 {
        60_000_000.0 / self.mspq as f64
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        check_non_negative(Self::KIND, "time", self.time)?;
        if self.mspq == 0 || self.mspq > MAX_MSPQ {
            return Err(ScoreError::InvalidEvent {
                kind: Self::KIND,
                reason: format!("mspq must be in 1..=16777215, got {}", self.mspq),
            });
        }
        Ok(())
    }
}

instant_event!(Tempo, "tempo", mspq);

/// A time signature. The denominator is a power of two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TimeSignature<U: TimeUnit> {
    pub time: Time<U>,
    pub numerator: u8,
    pub denominator: u8,
}

impl<U: TimeUnit> TimeSignature<U> {
    pub fn new(time: Time<U>, numerator: u8, denominator: u8) -> Result<Self, ScoreError> {
        let sig = Self {
            time,
            numerator,
            denominator,
        };
        sig.validate()?;
        Ok(sig)
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        check_non_negative(Self::KIND, "time", self.time)?;
        if self.numerator == 0 {
            return Err(ScoreError::InvalidEvent {
                kind: Self::KIND,
                reason: "numerator must be positive".to_string(),
            });
        }
        if !self.denominator.is_power_of_two() {
            return Err(ScoreError::InvalidEvent {
                kind: Self::KIND,
                reason: format!("denominator must be a power of two, got {}", self.denominator),
            });
        }
        Ok(())
    }
}

instant_event!(TimeSignature, "time signature", numerator, denominator);

/// Major or minor key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    #[default]
    Major,
    Minor,
}

/// A key signature: `key` counts sharps (positive) or flats (negative).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct KeySignature<U: TimeUnit> {
    pub time: Time<U>,
    pub key: i8,
    pub mode: KeyMode,
}

impl<U: TimeUnit> KeySignature<U> {
    pub fn new(time: Time<U>, key: i8, mode: KeyMode) -> Result<Self, ScoreError> {
        let sig = Self { time, key, mode };
        sig.validate()?;
        Ok(sig)
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        check_non_negative(Self::KIND, "time", self.time)?;
        if !(-7..=7).contains(&self.key) {
            return Err(ScoreError::InvalidEvent {
                kind: Self::KIND,
                reason: format!("key must be in -7..=7, got {}", self.key),
            });
        }
        Ok(())
    }
}

instant_event!(KeySignature, "key signature", key, mode);

/// Free text at a point in time (lyrics on tracks, markers on scores).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TextMeta<U: TimeUnit> {
    pub time: Time<U>,
    pub text: String,
}

impl<U: TimeUnit> TextMeta<U> {
    pub fn new(time: Time<U>, text: impl Into<String>) -> Result<Self, ScoreError> {
        let meta = Self {
            time,
            text: text.into(),
        };
        check_non_negative(Self::KIND, "time", meta.time)?;
        Ok(meta)
    }
}

instant_event!(TextMeta, "text", text);

/// An event the model does not interpret, kept as its verbatim wire bytes
/// (status byte included) so it can be written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct RawEvent<U: TimeUnit> {
    pub time: Time<U>,
    pub bytes: Vec<u8>,
}

impl<U: TimeUnit> RawEvent<U> {
    pub fn new(time: Time<U>, bytes: Vec<u8>) -> Result<Self, ScoreError> {
        check_non_negative(Self::KIND, "time", time)?;
        if bytes.first().map_or(true, |status| status & 0x80 == 0) {
            return Err(ScoreError::InvalidEvent {
                kind: Self::KIND,
                reason: "raw bytes must start with a status byte".to_string(),
            });
        }
        Ok(Self { time, bytes })
    }

    pub fn status(&self) -> u8 {
        self.bytes.first().copied().unwrap_or(0)
    }
}

instant_event!(RawEvent, "raw event", bytes);

/// A borrowed view of any event, used by predicates and the encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventRef<'a, U: TimeUnit> {
    Note(&'a Note<U>),
    ControlChange(&'a ControlChange<U>),
    PitchBend(&'a PitchBend<U>),
    Pedal(&'a Pedal<U>),
    Lyric(&'a TextMeta<U>),
    Tempo(&'a Tempo<U>),
    TimeSignature(&'a TimeSignature<U>),
    KeySignature(&'a KeySignature<U>),
    Marker(&'a TextMeta<U>),
    Raw(&'a RawEvent<U>),
}

impl<U: TimeUnit> EventRef<'_, U> {
    pub fn time(&self) -> Time<U> {
        match self {
            EventRef::Note(e) => e.time,
            EventRef::ControlChange(e) => e.time,
            EventRef::PitchBend(e) => e.time,
            EventRef::Pedal(e) => e.time,
            EventRef::Lyric(e) | EventRef::Marker(e) => e.time,
            EventRef::Tempo(e) => e.time,
            EventRef::TimeSignature(e) => e.time,
            EventRef::KeySignature(e) => e.time,
            EventRef::Raw(e) => e.time,
        }
    }

    pub fn end(&self) -> Time<U> {
        match self {
            EventRef::Note(e) => e.end(),
            EventRef::Pedal(e) => e.end(),
            other => other.time(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EventRef::Note(_) => Note::<U>::KIND,
            EventRef::ControlChange(_) => ControlChange::<U>::KIND,
            EventRef::PitchBend(_) => PitchBend::<U>::KIND,
            EventRef::Pedal(_) => Pedal::<U>::KIND,
            EventRef::Lyric(_) => "lyric",
            EventRef::Tempo(_) => Tempo::<U>::KIND,
            EventRef::TimeSignature(_) => TimeSignature::<U>::KIND,
            EventRef::KeySignature(_) => KeySignature::<U>::KIND,
            EventRef::Marker(_) => "marker",
            EventRef::Raw(_) => RawEvent::<U>::KIND,
        }
    }
}
