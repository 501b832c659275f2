//! Unit-specific aliases, so callers working in one unit can write
//! `tick::Note` instead of `Note<Tick>`.
//!
//! ```
//! use symscore::factory::quarter;
//!
//! let note = quarter::Note::new(0.5, 1.0, 60, 100)?;
//! let mut track = quarter::Track::new("Flute", 73, false)?;
//! track.notes.push(note);
//! assert_eq!(track.end_time(), 1.5);
//! # Ok::<(), symscore::ScoreError>(())
//! ```

macro_rules! unit_aliases {
    ($module:ident, $unit:ty, $doc:literal) => {
        #[doc = $doc]
        pub mod $module {
            pub type Score = crate::score::Score<$unit>;
            pub type Track = crate::track::Track<$unit>;
            pub type Note = crate::event::Note<$unit>;
            pub type ControlChange = crate::event::ControlChange<$unit>;
            pub type PitchBend = crate::event::PitchBend<$unit>;
            pub type Pedal = crate::event::Pedal<$unit>;
            pub type Tempo = crate::event::Tempo<$unit>;
            pub type TimeSignature = crate::event::TimeSignature<$unit>;
            pub type KeySignature = crate::event::KeySignature<$unit>;
            pub type TextMeta = crate::event::TextMeta<$unit>;
            pub type RawEvent = crate::event::RawEvent<$unit>;
        }
    };
}

unit_aliases!(tick, crate::unit::Tick, "Types timed in integer ticks.");
unit_aliases!(quarter, crate::unit::Quarter, "Types timed in quarter notes.");
unit_aliases!(second, crate::unit::Second, "Types timed in seconds.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_name_the_generic_types() {
        let score: tick::Score = crate::Score::new(480).unwrap();
        let seconds: second::Score = score.to_second();
        assert_eq!(seconds.ticks_per_quarter, 480);

        let tempo = second::Tempo::from_qpm(1.5, 90.0).unwrap();
        assert_eq!(tempo.mspq, 666_667);
    }
}
