//! Latest per-phase current readings
//!
//! One reading per phase sensor, overwritten in place. Only the maximum
//! across phases feeds the decision ladder.

use std::collections::HashMap;

/// Most recent current reading per electrical phase
#[derive(Debug, Clone, Default)]
pub struct PhaseCurrents {
    readings: HashMap<String, f64>,
}

impl PhaseCurrents {
    /// Create an empty set of readings
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest reading for a phase, replacing any previous one
    pub fn record(&mut self, phase: &str, amps: f64) {
        self.readings.insert(phase.to_string(), amps);
    }

    /// Highest stored reading, or 0 when no phase has reported yet
    pub fn max_current(&self) -> f64 {
        self.readings.values().copied().fold(0.0, f64::max)
    }

    /// Number of phases that have reported at least once
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether no phase has reported yet
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_over_recorded_phases() {
        let mut currents = PhaseCurrents::new();
        currents.record("p1", 10.5);
        currents.record("p2", 15.2);
        currents.record("p3", 8.0);

        assert_eq!(currents.max_current(), 15.2);
        assert_eq!(currents.len(), 3);
    }

    #[test]
    fn max_is_insertion_order_independent() {
        let mut a = PhaseCurrents::new();
        a.record("p1", 3.0);
        a.record("p2", 9.0);
        a.record("p3", 7.0);

        let mut b = PhaseCurrents::new();
        b.record("p3", 7.0);
        b.record("p1", 3.0);
        b.record("p2", 9.0);

        assert_eq!(a.max_current(), b.max_current());
    }

    #[test]
    fn empty_reports_zero() {
        let currents = PhaseCurrents::new();
        assert!(currents.is_empty());
        assert_eq!(currents.max_current(), 0.0);
    }

    #[test]
    fn readings_overwrite_in_place() {
        let mut currents = PhaseCurrents::new();
        currents.record("p1", 14.0);
        currents.record("p1", 4.0);

        assert_eq!(currents.len(), 1);
        assert_eq!(currents.max_current(), 4.0);
    }
}
