//! Cross-module scenarios driven through `World::tick`, the way the
//! per-fish-and-environment integration tests in the wider pack exercise a
//! whole simulation step rather than one isolated method.

use primordia::{SimulationConfig, World};

#[test]
fn empty_world_with_zero_floors_stays_empty_and_finite() {
    let cfg = SimulationConfig { population_floor: 0, particle_floor: 0, ..SimulationConfig::default() };
    let mut world = World::with_seed(cfg, 42);
    assert!(world.creatures.is_empty());

    for _ in 0..100 {
        world.tick(1.0 / 60.0, &[]);
    }

    assert!(world.creatures.is_empty());
    assert!(world.particles.particles.is_empty());
    for v in &world.fluid.vx {
        assert_eq!(*v, 0.0);
    }
    for v in &world.fluid.vy {
        assert_eq!(*v, 0.0);
    }
}

#[test]
fn population_never_exceeds_configured_ceiling_over_many_ticks() {
    let cfg = SimulationConfig { population_floor: 4, population_ceiling: 10, ..SimulationConfig::default() };
    let mut world = World::with_seed(cfg, 7);

    for _ in 0..200 {
        world.tick(1.0 / 60.0, &[]);
        assert!(world.creatures.len() <= 10, "population {} exceeded ceiling 10", world.creatures.len());
    }
}

#[test]
fn surviving_creatures_keep_finite_energy_and_positions() {
    let cfg = SimulationConfig::default();
    let mut world = World::with_seed(cfg, 123);

    for _ in 0..120 {
        world.tick(1.0 / 60.0, &[]);
    }

    for creature in &world.creatures {
        assert!(creature.is_unstable || creature.points.iter().all(|p| p.pos.x.is_finite() && p.pos.y.is_finite()));
        assert!(creature.creature_energy >= 0.0 && creature.creature_energy <= creature.current_max_energy);
    }
}
