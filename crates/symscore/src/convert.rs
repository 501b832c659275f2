//! Conversion between time units.
//!
//! Every conversion goes through fractional ticks: the source value is
//! mapped to ticks, then from ticks to the target unit. Integer tick
//! targets round half to even, so `Tick -> Quarter -> Tick` reproduces
//! the original ticks exactly. Converting to the source unit is the
//! identity.

use std::marker::PhantomData;

use crate::event::Tempo;
use crate::tempo_map::TempoMap;
use crate::unit::{Time, TimeUnit, TimeValue, UnitKind};

/// Converts time values from unit `F` to unit `T` for one score.
#[derive(Debug, Clone)]
pub struct Converter<F: TimeUnit, T: TimeUnit> {
    ticks_per_quarter: f64,
    tempo_map: TempoMap,
    _units: PhantomData<fn(F) -> T>,
}

impl<F: TimeUnit, T: TimeUnit> Converter<F, T> {
    /// `tempos` are the score's tempo events, expressed in the source unit.
    pub fn new(ticks_per_quarter: u16, tempos: &[Tempo<F>]) -> Self {
        let tpq = ticks_per_quarter as f64;
        let changes = tempos.iter().map(|t| (t.time.to_f64(), t.mspq));
        let tempo_map = match F::KIND {
            UnitKind::Tick => TempoMap::from_ticks(ticks_per_quarter, changes),
            UnitKind::Quarter => {
                TempoMap::from_ticks(ticks_per_quarter, changes.map(|(q, m)| (q * tpq, m)))
            }
            UnitKind::Second => TempoMap::from_seconds(ticks_per_quarter, changes),
        };
        Self {
            ticks_per_quarter: tpq,
            tempo_map,
            _units: PhantomData,
        }
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    fn is_identity(&self) -> bool {
        F::KIND == T::KIND
    }

    fn to_ticks(&self, value: f64) -> f64 {
        match F::KIND {
            UnitKind::Tick => value,
            UnitKind::Quarter => value * self.ticks_per_quarter,
            UnitKind::Second => self.tempo_map.second_to_tick(value),
        }
    }

    fn from_ticks(&self, ticks: f64) -> f64 {
        match T::KIND {
            UnitKind::Tick => ticks,
            UnitKind::Quarter => ticks / self.ticks_per_quarter,
            UnitKind::Second => self.tempo_map.tick_to_second(ticks),
        }
    }

    /// Convert a point in time.
    pub fn time(&self, value: Time<F>) -> Time<T> {
        if self.is_identity() {
            return <T::Time as TimeValue>::from_f64(value.to_f64());
        }
        <T::Time as TimeValue>::from_f64(self.from_ticks(self.to_ticks(value.to_f64())))
    }

    /// Convert a span starting at `start`.
    ///
    /// Computed as `time(start + duration) - time(start)` so that the
    /// converted end lands exactly where the converted end point would.
    pub fn duration(&self, start: Time<F>, duration: Time<F>) -> Time<T> {
        if self.is_identity() {
            return <T::Time as TimeValue>::from_f64(duration.to_f64());
        }
        self.time(start + duration) - self.time(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{Quarter, Second, Tick};

    fn tempos_120() -> Vec<Tempo<Tick>> {
        vec![Tempo::new(0, 500_000).unwrap()]
    }

    #[test]
    fn tick_to_quarter_divides_by_resolution() {
        let conv = Converter::<Tick, Quarter>::new(480, &tempos_120());
        assert_eq!(conv.time(720), 1.5);
        assert_eq!(conv.duration(480, 480), 1.0);
    }

    #[test]
    fn quarter_to_tick_rounds_half_to_even() {
        let conv = Converter::<Quarter, Tick>::new(2, &[]);
        assert_eq!(conv.time(0.25), 0);
        assert_eq!(conv.time(0.75), 2);
        assert_eq!(conv.time(1.25), 2);
    }

    #[test]
    fn tick_to_second_walks_tempo_map() {
        let conv = Converter::<Tick, Second>::new(480, &tempos_120());
        assert_eq!(conv.time(480), 1.0 / 2.0);
        assert_eq!(conv.duration(480, 480), 0.5);
    }

    #[test]
    fn second_to_quarter_routes_through_ticks() {
        let tempos = vec![Tempo::<Second>::new(0.0, 1_000_000).unwrap()];
        let conv = Converter::<Second, Quarter>::new(96, &tempos);
        assert!((conv.time(3.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn same_unit_is_identity() {
        let conv = Converter::<Quarter, Quarter>::new(480, &[]);
        assert_eq!(conv.time(0.123456789), 0.123456789);
        assert_eq!(conv.duration(1.0, 0.1), 0.1);
    }
}
