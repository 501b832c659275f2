//! Time unit tags.
//!
//! Every score, track and event is generic over one of three zero-sized
//! tags: [`Tick`], [`Quarter`] or [`Second`]. The tag fixes the numeric
//! type of every `time` and `duration` field, so a `Score<Second>` can
//! never be handed to code expecting ticks without an explicit
//! conversion through [`Score::convert`](crate::Score::convert).

use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::{Add, Sub};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Runtime name of a unit tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Tick,
    Quarter,
    Second,
}

/// Numeric representation of a time value in some unit.
pub trait TimeValue:
    Copy
    + Debug
    + Default
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn zero() -> Self {
        Self::default()
    }

    fn is_negative(self) -> bool;

    /// Total order, NaN-safe for floats.
    fn order(&self, other: &Self) -> Ordering;

    fn to_f64(self) -> f64;

    /// Integer representations round half to even.
    fn from_f64(value: f64) -> Self;

    fn max_of(self, other: Self) -> Self {
        if self.order(&other) == Ordering::Less {
            other
        } else {
            self
        }
    }

    fn min_of(self, other: Self) -> Self {
        if self.order(&other) == Ordering::Greater {
            other
        } else {
            self
        }
    }
}

impl TimeValue for i64 {
    fn is_negative(self) -> bool {
        self < 0
    }

    fn order(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round_ties_even() as i64
    }
}

impl TimeValue for f64 {
    fn is_negative(self) -> bool {
        self < 0.0
    }

    fn order(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

/// A time unit tag.
pub trait TimeUnit:
    Copy + Clone + Debug + Default + PartialEq + Eq + Hash + Send + Sync + 'static
{
    type Time: TimeValue;

    const KIND: UnitKind;
}

/// Shorthand for the time type of a unit.
pub type Time<U> = <U as TimeUnit>::Time;

/// Raw file ticks, resolution-dependent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tick;

/// Quarter notes, resolution-independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quarter;

/// Wall-clock seconds through the tempo map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Second;

impl TimeUnit for Tick {
    type Time = i64;
    const KIND: UnitKind = UnitKind::Tick;
}

impl TimeUnit for Quarter {
    type Time = f64;
    const KIND: UnitKind = UnitKind::Quarter;
}

impl TimeUnit for Second {
    type Time = f64;
    const KIND: UnitKind = UnitKind::Second;
}
