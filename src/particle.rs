//! Passive carriers advected by the fluid field. Consumable as food by an
//! EATER point.

use crate::config::SimulationConfig;
use crate::fluid::FluidField;
use crate::math::{clamp, Vec2};
use crate::random::RandomSource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Particle {
    pub pos: Vec2,
    pub vel: Vec2,
    pub life: f32,
    pub life_decay: f32,
    pub size: f32,
    pub is_eaten: bool,
}

impl Particle {
    pub fn spawn(pos: Vec2, life_decay: f32, size: f32) -> Self {
        Self {
            pos,
            vel: Vec2::ZERO,
            life: 1.0,
            life_decay,
            size,
            is_eaten: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.life > 0.0 && !self.is_eaten
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticleSystem {
    pub particles: Vec<Particle>,
    spawn_debt: f32,
}

impl ParticleSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// §4.3: top up to floor in one batch if under it, else emit at rate
    /// using a fractional accumulator that only consumes whole units.
    pub fn repopulate(
        &mut self,
        dt: f32,
        cfg: &SimulationConfig,
        rng: &mut dyn RandomSource,
    ) {
        if self.particles.len() < cfg.particle_floor {
            let missing = cfg.particle_floor - self.particles.len();
            for _ in 0..missing {
                let pos = Vec2::new(
                    rng.uniform_range(0.0, cfg.world_width),
                    rng.uniform_range(0.0, cfg.world_height),
                );
                self.particles.push(Particle::spawn(pos, 0.0, 2.0));
            }
            return;
        }
        self.spawn_debt += cfg.particles_per_second * dt;
        while self.spawn_debt >= 1.0 {
            self.spawn_debt -= 1.0;
            let pos = Vec2::new(
                rng.uniform_range(0.0, cfg.world_width),
                rng.uniform_range(0.0, cfg.world_height),
            );
            self.particles.push(Particle::spawn(pos, 0.0005, 2.0));
        }
    }

    pub fn update(&mut self, dt: f32, cfg: &SimulationConfig, fluid: &FluidField, rng: &mut dyn RandomSource) {
        let scale_x = fluid.n as f32 / cfg.world_width;
        let scale_y = fluid.n as f32 / cfg.world_height;
        for p in self.particles.iter_mut() {
            if p.is_eaten {
                p.life -= p.life_decay.max(0.02) * 4.0 * dt * 60.0;
                continue;
            }
            let cell_x = (p.pos.x * scale_x) as i64;
            let cell_y = (p.pos.y * scale_y) as i64;
            let (fvx, fvy) = fluid.velocity_at(cell_x.max(0) as usize, cell_y.max(0) as usize);
            p.vel.x += (fvx - p.vel.x) * cfg.particle_fluid_influence;
            p.vel.y += (fvy - p.vel.y) * cfg.particle_fluid_influence;
            p.vel.x += rng.uniform_range(-1.0, 1.0) * cfg.particle_jitter;
            p.vel.y += rng.uniform_range(-1.0, 1.0) * cfg.particle_jitter;

            let delta = p.vel.scale(dt * 100.0);
            p.pos = p.pos.add(delta);

            if cfg.world_wrapping {
                p.pos.x = p.pos.x.rem_euclid(cfg.world_width);
                p.pos.y = p.pos.y.rem_euclid(cfg.world_height);
            } else {
                // Open question in the source: the non-wrapping clamp used a
                // `radius` field that doesn't exist on Particle; clamp by size.
                p.pos.x = clamp(p.pos.x, p.size, cfg.world_width - p.size);
                p.pos.y = clamp(p.pos.y, p.size, cfg.world_height - p.size);
            }

            if p.life_decay > 0.0 {
                p.life -= p.life_decay;
            }
        }
        self.particles.retain(|p| p.life > 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::StdRandomSource;

    #[test]
    fn repopulate_tops_up_to_floor() {
        let cfg = SimulationConfig::default();
        let mut system = ParticleSystem::new();
        let mut rng = StdRandomSource::new(1);
        system.repopulate(1.0 / 60.0, &cfg, &mut rng);
        assert_eq!(system.particles.len(), cfg.particle_floor);
    }

    #[test]
    fn eaten_particles_are_removed_once_life_hits_zero() {
        let cfg = SimulationConfig::default();
        let fluid = FluidField::new(cfg.grid_size, false);
        let mut rng = StdRandomSource::new(1);
        let mut system = ParticleSystem::new();
        system.particles.push(Particle::spawn(Vec2::new(10.0, 10.0), 0.05, 2.0));
        system.particles[0].is_eaten = true;
        for _ in 0..200 {
            system.update(1.0 / 60.0, &cfg, &fluid, &mut rng);
        }
        assert!(system.particles.is_empty());
    }

    #[test]
    fn non_wrapping_particles_stay_within_world_bounds() {
        let cfg = SimulationConfig::default();
        let fluid = FluidField::new(cfg.grid_size, false);
        let mut rng = StdRandomSource::new(2);
        let mut system = ParticleSystem::new();
        system.particles.push(Particle::spawn(Vec2::new(0.0, 0.0), 0.0, 2.0));
        for _ in 0..50 {
            system.update(1.0 / 60.0, &cfg, &fluid, &mut rng);
        }
        let p = &system.particles[0];
        assert!(p.pos.x >= 0.0 && p.pos.x <= cfg.world_width);
        assert!(p.pos.y >= 0.0 && p.pos.y <= cfg.world_height);
    }
}
