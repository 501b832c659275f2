//! Per-sequence batch edits shared by [`Track`](crate::Track) and
//! [`Score`](crate::Score).

use serde::{Deserialize, Serialize};

use crate::error::ScoreError;
use crate::event::Event;
use crate::unit::{Time, TimeValue};

/// What `shift` does when an event would move before time zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftPolicy {
    /// Fail with [`ScoreError::NegativeTime`].
    #[default]
    Strict,
    /// Pin the event to time zero, keeping its duration.
    ClampToZero,
}

/// Stable sort by ascending time; ties keep insertion order.
pub(crate) fn sort_events<E: Event>(events: &mut [E]) {
    events.sort_by(|a, b| a.time().order(&b.time()));
}

pub(crate) fn is_sorted<E: Event>(events: &[E]) -> bool {
    events
        .windows(2)
        .all(|w| w[0].time().order(&w[1].time()).is_le())
}

/// Keep events starting in `[start, end)`, optionally cutting spans at `end`.
pub(crate) fn clip_events<E: Event>(
    events: &[E],
    start: Time<E::Unit>,
    end: Time<E::Unit>,
    clip_end: bool,
) -> Vec<E> {
    events
        .iter()
        .filter(|e| {
            let t = e.time();
            t.order(&start).is_ge() && t.order(&end).is_lt()
        })
        .cloned()
        .map(|mut e| {
            if clip_end && e.end().order(&end).is_gt() {
                e.set_duration(end - e.time());
            }
            e
        })
        .collect()
}

pub(crate) fn shift_events<E: Event>(
    events: &[E],
    offset: Time<E::Unit>,
    policy: ShiftPolicy,
) -> Result<Vec<E>, ScoreError> {
    events
        .iter()
        .map(|e| {
            let mut shifted = e.clone();
            let time = e.time() + offset;
            if time.is_negative() {
                match policy {
                    ShiftPolicy::Strict => {
                        return Err(ScoreError::NegativeTime {
                            kind: E::KIND,
                            time: e.time().to_f64(),
                            offset: offset.to_f64(),
                        })
                    }
                    ShiftPolicy::ClampToZero => shifted.set_time(TimeValue::zero()),
                }
            } else {
                shifted.set_time(time);
            }
            Ok(shifted)
        })
        .collect()
}

pub(crate) fn max_end<E: Event>(events: &[E]) -> Option<Time<E::Unit>> {
    events.iter().map(Event::end).reduce(TimeValue::max_of)
}

pub(crate) fn min_time<E: Event>(events: &[E]) -> Option<Time<E::Unit>> {
    events.iter().map(Event::time).reduce(TimeValue::min_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Note;
    use crate::unit::Tick;

    fn note(time: i64, duration: i64, pitch: u8) -> Note<Tick> {
        Note::new(time, duration, pitch, 100).unwrap()
    }

    #[test]
    fn sort_is_stable_for_ties() {
        let mut notes = vec![note(10, 1, 60), note(0, 1, 61), note(10, 1, 62), note(0, 1, 63)];
        sort_events(&mut notes);
        let pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![61, 63, 60, 62]);
        assert!(is_sorted(&notes));
    }

    #[test]
    fn clip_keeps_half_open_range() {
        let notes = vec![note(0, 10, 60), note(5, 10, 61), note(10, 10, 62)];
        let kept = clip_events(&notes, 5, 10, false);
        assert_eq!(kept, vec![note(5, 10, 61)]);

        let cut = clip_events(&notes, 0, 10, true);
        assert_eq!(cut, vec![note(0, 10, 60), note(5, 5, 61)]);
    }

    #[test]
    fn shift_rejects_negative_times_unless_clamped() {
        let notes = vec![note(5, 10, 60), note(20, 10, 61)];
        let err = shift_events(&notes, -10, ShiftPolicy::Strict).unwrap_err();
        assert!(matches!(err, ScoreError::NegativeTime { kind: "note", .. }));

        let clamped = shift_events(&notes, -10, ShiftPolicy::ClampToZero).unwrap();
        assert_eq!(clamped, vec![note(0, 10, 60), note(10, 10, 61)]);
    }

    #[test]
    fn extremes_of_empty_sequences_are_none() {
        let empty: Vec<Note<Tick>> = Vec::new();
        assert_eq!(max_end(&empty), None);
        assert_eq!(min_time(&empty), None);
        assert_eq!(max_end(&[note(3, 4, 60), note(1, 1, 60)]), Some(7));
    }
}
