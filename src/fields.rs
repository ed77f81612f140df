//! Nutrient, light and viscosity scalar fields. Painted by a host brush or
//! driven by a cyclic modulation schedule; read by the energy budget and the
//! fluid solver's variable-viscosity path.

use crate::math::clamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarField {
    pub n: usize,
    pub values: Vec<f32>,
    pub min: f32,
    pub max: f32,
    pub base: f32,
}

impl ScalarField {
    pub fn new(n: usize, min: f32, max: f32, base: f32) -> Self {
        Self {
            n,
            values: vec![clamp(base, min, max); n * n],
            min,
            max,
            base,
        }
    }

    fn idx(&self, i: usize, j: usize) -> usize {
        let n = self.n;
        j.min(n - 1) * n + i.min(n - 1)
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.values[self.idx(i, j)]
    }

    pub fn paint(&mut self, i: usize, j: usize, delta: f32) {
        let idx = self.idx(i, j);
        self.values[idx] = clamp(self.values[idx] + delta, self.min, self.max);
    }

    /// Drive every cell toward `base + amplitude * sin(phase)`, the "global
    /// cyclic modulation schedule" the host may apply between ticks.
    pub fn apply_cyclic_modulation(&mut self, phase: f32, amplitude: f32) {
        let target = clamp(self.base + amplitude * phase.sin(), self.min, self.max);
        for v in self.values.iter_mut() {
            *v = target;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentFields {
    pub nutrient: ScalarField,
    pub light: ScalarField,
    pub viscosity: Option<ScalarField>,
}

impl EnvironmentFields {
    pub fn new(n: usize, cfg: &crate::config::SimulationConfig) -> Self {
        Self {
            nutrient: ScalarField::new(n, cfg.nutrient_min, cfg.nutrient_max, cfg.nutrient_max),
            light: ScalarField::new(n, cfg.light_min, cfg.light_max, cfg.light_max),
            viscosity: None,
        }
    }

    pub fn with_viscosity(mut self, n: usize, cfg: &crate::config::SimulationConfig) -> Self {
        self.viscosity = Some(ScalarField::new(n, cfg.viscosity_min, cfg.viscosity_max, 1.0));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;

    #[test]
    fn paint_clamps_to_bounds() {
        let mut field = ScalarField::new(4, 0.0, 1.0, 0.5);
        field.paint(0, 0, 10.0);
        assert_eq!(field.get(0, 0), 1.0);
        field.paint(0, 0, -10.0);
        assert_eq!(field.get(0, 0), 0.0);
    }

    #[test]
    fn cyclic_modulation_stays_in_bounds() {
        let mut field = ScalarField::new(4, 0.0, 1.0, 0.5);
        for k in 0..40 {
            field.apply_cyclic_modulation(k as f32 * 0.3, 2.0);
            assert!(field.get(0, 0) >= 0.0 && field.get(0, 0) <= 1.0);
        }
    }

    #[test]
    fn environment_fields_construct_from_config() {
        let cfg = SimulationConfig::default();
        let env = EnvironmentFields::new(cfg.grid_size, &cfg).with_viscosity(cfg.grid_size, &cfg);
        assert!(env.viscosity.is_some());
    }
}
