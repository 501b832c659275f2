//! Piecewise-linear mapping between ticks and seconds.
//!
//! Built once per conversion from a score's tempo events and then only
//! read, so one map can be shared across any number of per-event
//! conversions.

use crate::event::DEFAULT_MSPQ;

/// One constant-tempo stretch of the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    tick: f64,
    seconds: f64,
    mspq: f64,
}

/// Tick/second lookup table for one resolution and tempo sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    ticks_per_quarter: f64,
    segments: Vec<Segment>,
}

impl TempoMap {
    fn initial(ticks_per_quarter: u16) -> Self {
        Self {
            ticks_per_quarter: ticks_per_quarter as f64,
            segments: vec![Segment {
                tick: 0.0,
                seconds: 0.0,
                mspq: DEFAULT_MSPQ as f64,
            }],
        }
    }

    /// Build from `(tick, mspq)` tempo changes in any order.
    ///
    /// Before the first change at or after tick 0 the tempo is 120 qpm.
    /// When several changes share a tick, the last one listed wins.
    pub fn from_ticks(
        ticks_per_quarter: u16,
        changes: impl IntoIterator<Item = (f64, u32)>,
    ) -> Self {
        let mut changes: Vec<(f64, u32)> = changes.into_iter().collect();
        changes.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut map = Self::initial(ticks_per_quarter);
        for (tick, mspq) in changes {
            let tick = tick.max(0.0);
            let last = map.last();
            if tick <= last.tick {
                map.set_last_mspq(mspq);
                continue;
            }
            let seconds = last.seconds + map.span_seconds(tick - last.tick, last.mspq);
            map.segments.push(Segment {
                tick,
                seconds,
                mspq: mspq as f64,
            });
        }
        map
    }

    /// Build from `(seconds, mspq)` tempo changes in any order.
    pub fn from_seconds(
        ticks_per_quarter: u16,
        changes: impl IntoIterator<Item = (f64, u32)>,
    ) -> Self {
        let mut changes: Vec<(f64, u32)> = changes.into_iter().collect();
        changes.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut map = Self::initial(ticks_per_quarter);
        for (seconds, mspq) in changes {
            let seconds = seconds.max(0.0);
            let last = map.last();
            if seconds <= last.seconds {
                map.set_last_mspq(mspq);
                continue;
            }
            let tick = last.tick + map.span_ticks(seconds - last.seconds, last.mspq);
            map.segments.push(Segment {
                tick,
                seconds,
                mspq: mspq as f64,
            });
        }
        map
    }

    fn last(&self) -> Segment {
        // Never empty: `initial` seeds one segment.
        self.segments[self.segments.len() - 1]
    }

    fn set_last_mspq(&mut self, mspq: u32) {
        if let Some(last) = self.segments.last_mut() {
            last.mspq = mspq as f64;
        }
    }

    fn span_seconds(&self, ticks: f64, mspq: f64) -> f64 {
        ticks * mspq / (self.ticks_per_quarter * 1_000_000.0)
    }

    fn span_ticks(&self, seconds: f64, mspq: f64) -> f64 {
        seconds * self.ticks_per_quarter * 1_000_000.0 / mspq
    }

    /// Convert a (possibly fractional) tick position to seconds.
    pub fn tick_to_second(&self, tick: f64) -> f64 {
        let idx = self
            .segments
            .partition_point(|s| s.tick <= tick)
            .saturating_sub(1);
        let seg = self.segments[idx];
        seg.seconds + self.span_seconds(tick - seg.tick, seg.mspq)
    }

    /// Convert seconds to a fractional tick position.
    pub fn second_to_tick(&self, seconds: f64) -> f64 {
        let idx = self
            .segments
            .partition_point(|s| s.seconds <= seconds)
            .saturating_sub(1);
        let seg = self.segments[idx];
        seg.tick + self.span_ticks(seconds - seg.seconds, seg.mspq)
    }

    /// Microseconds per quarter in effect at `tick`.
    pub fn mspq_at(&self, tick: f64) -> u32 {
        let idx = self
            .segments
            .partition_point(|s| s.tick <= tick)
            .saturating_sub(1);
        self.segments[idx].mspq as u32
    }
}
