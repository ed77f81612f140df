//! Append-only counters: mutation operator tallies, lifetime energy
//! aggregates, instability reasons. Reset only at world reset, never
//! mid-run, so a host can chart them over a session.

use crate::creature::mutation::MutationCounters;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InstabilityReasons {
    pub non_finite_position: u64,
    pub excessive_displacement: u64,
    pub over_stretched_spring: u64,
    pub oversized_bbox: u64,
    pub energy_depleted: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Telemetry {
    pub mutation_counters: MutationCounters,
    pub global_energy_gains: f32,
    pub global_energy_costs: f32,
    pub instability_reasons: InstabilityReasons,
    pub failed_placements: u64,
    pub brain_shape_mismatches: u64,
    pub blueprint_corruption_warnings: u64,
    pub total_reproductions: u64,
    pub total_creatures_spawned: u64,
    pub total_creatures_culled: u64,
}

impl Telemetry {
    pub fn reset(&mut self) {
        *self = Telemetry::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_every_counter() {
        let mut t = Telemetry::default();
        t.global_energy_gains = 10.0;
        t.failed_placements = 3;
        t.reset();
        assert_eq!(t.global_energy_gains, 0.0);
        assert_eq!(t.failed_placements, 0);
    }
}
