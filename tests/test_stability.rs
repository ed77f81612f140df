//! End-to-end stability scenario: a creature whose single spring starts
//! already stretched past the instability threshold must be flagged
//! unstable by the end of its first tick, mirroring the aquarium's own
//! "integration step can end a fish's life" outcome for a snapped body.

use primordia::creature::blueprint::{Blueprint, BlueprintPoint, BlueprintSpring};
use primordia::creature::{ActivationPattern, ActivationPatternType, Genome, MovementType, NodeType};
use primordia::fluid::FluidField;
use primordia::math::Vec2;
use primordia::random::StdRandomSource;
use primordia::SimulationConfig;

fn flat_activation() -> ActivationPattern {
    ActivationPattern { pattern_type: ActivationPatternType::Flat, level: 0.0, period: 60.0, phase_offset: 0.0 }
}

fn two_point_blueprint(rest_length: f32) -> Blueprint {
    let point = |rel_x: f32| BlueprintPoint {
        rel_x,
        rel_y: 0.0,
        radius: 5.0,
        mass: 1.0,
        node_type: NodeType::Photosynthetic,
        movement_type: MovementType::Neutral,
        dye_color: [128, 128, 128],
        can_be_grabber: false,
        eye_target_type: None,
        max_effective_jet_velocity: 40.0,
        neuron_data_blueprint: None,
        activation: flat_activation(),
    };
    Blueprint {
        points: vec![point(0.0), point(rest_length)],
        springs: vec![BlueprintSpring { p1_index: 0, p2_index: 1, rest_length, is_rigid: false, stiffness: 50.0, damping: 1.0 }],
    }
}

#[test]
fn over_stretched_spring_marks_creature_unstable_within_one_tick() {
    let cfg = SimulationConfig::default();
    let mut rng = StdRandomSource::new(1);
    let genome = Genome::random(&mut rng, &cfg);

    let rest_length = 10.0;
    let blueprint = two_point_blueprint(rest_length);
    let mut creature = blueprint.instantiate(1, None, 0, Vec2::new(400.0, 300.0), genome, &cfg);

    // Stretch point 1 so the spring's current length is rest_length *
    // (MAX_STRETCH_FACTOR + 0.01), past the instability threshold at t=0.
    let stretched_length = rest_length * (cfg.max_stretch_factor + 0.01);
    creature.points[1].pos.x = creature.points[0].pos.x + stretched_length;
    creature.points[1].prev_pos = creature.points[1].pos;

    let mut fluid = FluidField::new(cfg.grid_size, cfg.world_wrapping);
    let became_unstable = creature.integrate(1.0 / 60.0, &mut fluid, &cfg);

    assert!(became_unstable, "a spring stretched past max_stretch_factor at t=0 must report instability immediately");
}
