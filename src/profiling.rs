//! Step Statistics
//!
//! Deterministic per-step counters. Nothing here reads a clock: every value
//! is a count of work items, so two runs of the same scene report the same
//! numbers and the counters can be compared in tests.
//!
//! # Tracked Stages
//!
//! - Broad phase (candidate pairs from the move buffer)
//! - Narrow phase (contacts updated, contacts touching)
//! - Solver (islands, constraints)
//! - Continuous collision (TOI events)

/// Counters of the most recent step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Bodies in the world after the step
    pub bodies: u32,
    /// Bodies awake after the step
    pub awake_bodies: u32,
    /// Live contacts
    pub contacts: u32,
    /// Contacts with a touching manifold
    pub touching_contacts: u32,
    /// Islands solved by the discrete solver
    pub islands: u32,
    /// Joints in the world
    pub joints: u32,
    /// TOI sub-steps performed
    pub toi_events: u32,
    /// Candidate pairs reported by the broad phase
    pub broad_phase_pairs: u32,
}

/// Running totals of one stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageCounter {
    /// Sum over all recorded steps
    pub total: u64,
    /// Value of the last recorded step
    pub last: u64,
    /// Largest single-step value
    pub peak: u64,
    /// Number of recorded steps
    pub samples: u64,
}

impl StageCounter {
    /// Record one step's value
    pub fn record(&mut self, value: u64) {
        self.total += value;
        self.samples += 1;
        self.last = value;
        self.peak = self.peak.max(value);
    }

    /// Mean per recorded step
    #[inline]
    pub fn average(&self) -> u64 {
        if self.samples == 0 {
            0
        } else {
            self.total / self.samples
        }
    }
}

/// Totals across every step since the world was created or reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepProfile {
    /// Broad-phase candidate pairs
    pub broad_phase: StageCounter,
    /// Touching contacts
    pub narrow_phase: StageCounter,
    /// Islands
    pub islands: StageCounter,
    /// TOI sub-steps
    pub toi: StageCounter,
    /// Steps taken
    pub steps: u64,
}

impl StepProfile {
    /// Fold one step into the totals
    pub fn record(&mut self, stats: &StepStats) {
        self.broad_phase.record(u64::from(stats.broad_phase_pairs));
        self.narrow_phase.record(u64::from(stats.touching_contacts));
        self.islands.record(u64::from(stats.islands));
        self.toi.record(u64::from(stats.toi_events));
        self.steps += 1;
    }

    /// Clear every counter
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_counter() {
        let mut counter = StageCounter::default();
        counter.record(100);
        counter.record(200);
        counter.record(150);

        assert_eq!(counter.samples, 3);
        assert_eq!(counter.total, 450);
        assert_eq!(counter.average(), 150);
        assert_eq!(counter.peak, 200);
        assert_eq!(counter.last, 150);
    }

    #[test]
    fn test_profile_record_and_reset() {
        let mut profile = StepProfile::default();
        let stats = StepStats {
            broad_phase_pairs: 4,
            touching_contacts: 3,
            islands: 2,
            toi_events: 1,
            ..StepStats::default()
        };
        profile.record(&stats);
        profile.record(&StepStats::default());

        assert_eq!(profile.steps, 2);
        assert_eq!(profile.broad_phase.peak, 4);
        assert_eq!(profile.islands.average(), 1);
        assert_eq!(profile.toi.last, 0);

        profile.reset();
        assert_eq!(profile, StepProfile::default());
    }
}
