//! Mutation operators applied to a cloned parent blueprint/genome on
//! reproduction. Each operator fires independently, scaled by the global
//! mutation rate modifier; a monotonic counter per operator feeds telemetry.

use super::blueprint::{Blueprint, BlueprintPoint, BlueprintSpring};
use super::{coerce_swimmer_movement, ActivationPatternType, EyeTargetType, Genome, MovementType, NeuronDataBlueprint, NodeType, RewardStrategy};
use crate::config::SimulationConfig;
use crate::math::clamp;
use crate::random::RandomSource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MutationCounters {
    pub parametric_perturbations: u64,
    pub categorical_flips: u64,
    pub spring_perturbations: u64,
    pub points_added: u64,
    pub springs_deleted: u64,
    pub springs_added: u64,
    pub springs_subdivided: u64,
    pub body_rescales: u64,
}

/// Applies every operator with its own roll; the blueprint and genome are
/// mutated in place. Called on a clone of the parent's data, never the
/// original (deep clone happens before this function is invoked).
pub fn mutate(
    blueprint: &mut Blueprint,
    genome: &mut Genome,
    counters: &mut MutationCounters,
    cfg: &SimulationConfig,
    rng: &mut dyn RandomSource,
) {
    let modifier = cfg.global_mutation_rate_modifier;

    if rng.chance(cfg.mutation_rate_percent.min(1.0) * modifier) {
        perturb_genome(genome, cfg, rng);
        counters.parametric_perturbations += 1;
    }

    for point in blueprint.points.iter_mut() {
        if rng.chance(0.05 * modifier) {
            flip_categorical(point, rng);
            counters.categorical_flips += 1;
        }
    }

    if rng.chance(0.1 * modifier) {
        flip_reward_strategy(genome, rng);
        counters.categorical_flips += 1;
    }

    for spring in blueprint.springs.iter_mut() {
        if rng.chance(0.08 * modifier) {
            perturb_spring(spring, cfg, rng);
            counters.spring_perturbations += 1;
        }
    }

    if rng.chance(cfg.structural_mutation_chance * modifier) {
        add_point(blueprint, cfg, rng);
        counters.points_added += 1;
    }
    if rng.chance(cfg.structural_mutation_chance * 0.5 * modifier) && delete_redundant_spring(blueprint, rng) {
        counters.springs_deleted += 1;
    }
    if rng.chance(cfg.structural_mutation_chance * 0.5 * modifier) && add_spring(blueprint, cfg, rng) {
        counters.springs_added += 1;
    }
    if rng.chance(cfg.structural_mutation_chance * 0.3 * modifier) && subdivide_spring(blueprint, rng) {
        counters.springs_subdivided += 1;
    }
    if rng.chance(cfg.structural_mutation_chance * 0.2 * modifier) {
        rescale_body(blueprint, cfg, rng);
        counters.body_rescales += 1;
    }

    enforce_invariants(blueprint);
}

fn perturb_genome(genome: &mut Genome, cfg: &SimulationConfig, rng: &mut dyn RandomSource) {
    let factor = 1.0 + rng.uniform_range(-cfg.mutation_rate_percent, cfg.mutation_rate_percent);
    genome.reproduction_cooldown_gene = clamp(genome.reproduction_cooldown_gene * factor, 30.0, 1000.0);
    genome.jet_max_velocity_gene = clamp(genome.jet_max_velocity_gene * factor, 5.0, 120.0);
    genome.offspring_spawn_radius = clamp(genome.offspring_spawn_radius * factor, 10.0, 150.0);
    genome.point_add_chance = clamp(genome.point_add_chance * factor, 0.0, 0.5);
    genome.spring_connection_radius = clamp(genome.spring_connection_radius * factor, 10.0, 200.0);
    genome.reproduction_energy_threshold = clamp(genome.reproduction_energy_threshold * factor, 10.0, 500.0);
}

/// The sixth categorical flip (§4.7): gated by its own independent roll in
/// `mutate`, not nested inside the parametric genome perturbation.
fn flip_reward_strategy(genome: &mut Genome, rng: &mut dyn RandomSource) {
    const STRATS: [RewardStrategy; 4] = [
        RewardStrategy::EnergyChange,
        RewardStrategy::ReproductionEvent,
        RewardStrategy::ParticleProximity,
        RewardStrategy::EnergySecondDerivative,
    ];
    genome.reward_strategy = STRATS[rng.below(STRATS.len())];
}

fn flip_categorical(point: &mut BlueprintPoint, rng: &mut dyn RandomSource) {
    match rng.below(5) {
        0 => point.node_type = NodeType::random_non_neuron(rng),
        1 => {
            point.movement_type = match rng.below(3) {
                0 => MovementType::Fixed,
                1 => MovementType::Floating,
                _ => MovementType::Neutral,
            }
        }
        2 => point.dye_color = [rng.below(256) as u8, rng.below(256) as u8, rng.below(256) as u8],
        3 => point.can_be_grabber = !point.can_be_grabber,
        _ => {
            point.eye_target_type = Some(if rng.chance(0.5) {
                EyeTargetType::Particle
            } else {
                EyeTargetType::ForeignBodyPoint
            })
        }
    }
    point.movement_type = coerce_swimmer_movement(point.node_type, point.movement_type);
    if !matches!(point.node_type, NodeType::Neuron) {
        point.neuron_data_blueprint = None;
    }
}

fn perturb_spring(spring: &mut BlueprintSpring, cfg: &SimulationConfig, rng: &mut dyn RandomSource) {
    let factor = 1.0 + rng.uniform_range(-cfg.mutation_rate_percent, cfg.mutation_rate_percent);
    spring.rest_length = (spring.rest_length * factor).max(1.0);
    spring.stiffness = (spring.stiffness * factor).max(1.0);
    spring.damping = (spring.damping * factor).max(0.0);
    if rng.chance(0.1) {
        spring.is_rigid = !spring.is_rigid;
    }
}

fn add_point(blueprint: &mut Blueprint, cfg: &SimulationConfig, rng: &mut dyn RandomSource) {
    if blueprint.points.is_empty() {
        return;
    }
    let last = blueprint.points.last().unwrap().clone();
    let offset_x = rng.uniform_range(-15.0, 15.0);
    let offset_y = rng.uniform_range(-15.0, 15.0);
    let node_type = if rng.chance(cfg.neuron_chance) {
        NodeType::Neuron
    } else {
        NodeType::random_non_neuron(rng)
    };
    let new_point = BlueprintPoint {
        rel_x: last.rel_x + offset_x,
        rel_y: last.rel_y + offset_y,
        radius: rng.uniform_range(3.0, 7.0),
        mass: rng.uniform_range(0.4, 1.2),
        node_type,
        movement_type: coerce_swimmer_movement(node_type, MovementType::Neutral),
        dye_color: [rng.below(256) as u8, rng.below(256) as u8, rng.below(256) as u8],
        can_be_grabber: rng.chance(0.1),
        eye_target_type: if matches!(node_type, NodeType::Eye) { Some(EyeTargetType::Particle) } else { None },
        max_effective_jet_velocity: rng.uniform_range(20.0, 60.0),
        neuron_data_blueprint: if matches!(node_type, NodeType::Neuron) {
            Some(NeuronDataBlueprint { hidden_layer_size: cfg.hidden_layer_min })
        } else {
            None
        },
        activation: crate::creature::ActivationPattern {
            pattern_type: ActivationPatternType::Flat,
            level: rng.uniform_range(0.2, 1.0),
            period: rng.uniform_range(20.0, 180.0),
            phase_offset: 0.0,
        },
    };
    let new_index = blueprint.points.len();
    blueprint.points.push(new_point);

    let connections = cfg.min_springs_on_add + rng.below(cfg.max_springs_on_add - cfg.min_springs_on_add + 1);
    for _ in 0..connections {
        if new_index == 0 {
            break;
        }
        let target = rng.below(new_index);
        let (a, b) = (&blueprint.points[new_index], &blueprint.points[target]);
        let len = ((a.rel_x - b.rel_x).powi(2) + (a.rel_y - b.rel_y).powi(2)).sqrt().max(1.0);
        blueprint.springs.push(BlueprintSpring {
            p1_index: new_index,
            p2_index: target,
            rest_length: len,
            is_rigid: false,
            stiffness: rng.uniform_range(80.0, 300.0),
            damping: rng.uniform_range(2.0, 15.0),
        });
    }
}

/// Delete one spring if doing so still leaves every point reachable by at
/// least one spring (a coarse redundancy check, not full connectivity).
fn delete_redundant_spring(blueprint: &mut Blueprint, rng: &mut dyn RandomSource) -> bool {
    if blueprint.springs.len() <= blueprint.points.len().saturating_sub(1) {
        return false;
    }
    let idx = rng.below(blueprint.springs.len());
    blueprint.springs.remove(idx);
    true
}

fn add_spring(blueprint: &mut Blueprint, cfg: &SimulationConfig, rng: &mut dyn RandomSource) -> bool {
    if blueprint.points.len() < 2 {
        return false;
    }
    let a = rng.below(blueprint.points.len());
    let b = rng.below(blueprint.points.len());
    if a == b {
        return false;
    }
    let already_connected = blueprint
        .springs
        .iter()
        .any(|s| (s.p1_index == a && s.p2_index == b) || (s.p1_index == b && s.p2_index == a));
    if already_connected {
        return false;
    }
    let pa = &blueprint.points[a];
    let pb = &blueprint.points[b];
    let dist = ((pa.rel_x - pb.rel_x).powi(2) + (pa.rel_y - pb.rel_y).powi(2)).sqrt();
    if dist > cfg.default_spring_connection_radius {
        return false;
    }
    blueprint.springs.push(BlueprintSpring {
        p1_index: a,
        p2_index: b,
        rest_length: dist.max(1.0),
        is_rigid: false,
        stiffness: rng.uniform_range(80.0, 300.0),
        damping: rng.uniform_range(2.0, 15.0),
    });
    true
}

fn subdivide_spring(blueprint: &mut Blueprint, rng: &mut dyn RandomSource) -> bool {
    if blueprint.springs.is_empty() {
        return false;
    }
    let idx = rng.below(blueprint.springs.len());
    let spring = blueprint.springs[idx].clone_for_subdivide();
    let a = blueprint.points[spring.p1_index].clone();
    let b = blueprint.points[spring.p2_index].clone();
    let mid = BlueprintPoint {
        rel_x: (a.rel_x + b.rel_x) * 0.5,
        rel_y: (a.rel_y + b.rel_y) * 0.5,
        radius: (a.radius + b.radius) * 0.5,
        mass: (a.mass + b.mass) * 0.5,
        node_type: a.node_type,
        movement_type: coerce_swimmer_movement(a.node_type, a.movement_type),
        dye_color: a.dye_color,
        can_be_grabber: false,
        eye_target_type: None,
        max_effective_jet_velocity: a.max_effective_jet_velocity,
        neuron_data_blueprint: None,
        activation: a.activation,
    };
    let mid_index = blueprint.points.len();
    blueprint.points.push(mid);
    let half_len = spring.rest_length * 0.5;
    blueprint.springs[idx] = BlueprintSpring {
        p1_index: spring.p1_index,
        p2_index: mid_index,
        rest_length: half_len,
        is_rigid: spring.is_rigid,
        stiffness: spring.stiffness,
        damping: spring.damping,
    };
    blueprint.springs.push(BlueprintSpring {
        p1_index: mid_index,
        p2_index: spring.p2_index,
        rest_length: half_len,
        is_rigid: spring.is_rigid,
        stiffness: spring.stiffness,
        damping: spring.damping,
    });
    true
}

fn rescale_body(blueprint: &mut Blueprint, cfg: &SimulationConfig, rng: &mut dyn RandomSource) {
    let factor = 1.0 + rng.uniform_range(-cfg.body_scale_mutation_factor, cfg.body_scale_mutation_factor);
    for point in blueprint.points.iter_mut() {
        point.rel_x *= factor;
        point.rel_y *= factor;
        point.radius *= factor;
    }
    for spring in blueprint.springs.iter_mut() {
        spring.rest_length *= factor;
    }
}

/// Invariants that must hold after any combination of operators: SWIMMER
/// never FLOATING; non-NEURON points carry no neuron blueprint data.
fn enforce_invariants(blueprint: &mut Blueprint) {
    for point in blueprint.points.iter_mut() {
        point.movement_type = coerce_swimmer_movement(point.node_type, point.movement_type);
        if !matches!(point.node_type, NodeType::Neuron) {
            point.neuron_data_blueprint = None;
        }
    }
}

impl BlueprintSpring {
    fn clone_for_subdivide(&self) -> BlueprintSpring {
        BlueprintSpring {
            p1_index: self.p1_index,
            p2_index: self.p2_index,
            rest_length: self.rest_length,
            is_rigid: self.is_rigid,
            stiffness: self.stiffness,
            damping: self.damping,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creature::blueprint::PrimitiveShape;
    use crate::random::StdRandomSource;

    #[test]
    fn zero_modifier_leaves_blueprint_unchanged() {
        let cfg = {
            let mut c = SimulationConfig::default();
            c.global_mutation_rate_modifier = 0.0;
            c
        };
        let mut rng = StdRandomSource::new(11);
        let original = Blueprint::generate(PrimitiveShape::Grid3x3, &mut rng, &cfg);
        let mut blueprint = original.clone();
        let mut genome = Genome::random(&mut rng, &cfg);
        let original_genome = genome;
        let mut counters = MutationCounters::default();
        mutate(&mut blueprint, &mut genome, &mut counters, &cfg, &mut rng);
        assert_eq!(blueprint.points.len(), original.points.len());
        assert_eq!(blueprint.springs.len(), original.springs.len());
        assert_eq!(genome.reproduction_cooldown_gene, original_genome.reproduction_cooldown_gene);
    }

    #[test]
    fn invariants_hold_after_many_mutation_rounds() {
        let cfg = SimulationConfig::default();
        let mut rng = StdRandomSource::new(22);
        let mut blueprint = Blueprint::generate(PrimitiveShape::Star, &mut rng, &cfg);
        let mut genome = Genome::random(&mut rng, &cfg);
        let mut counters = MutationCounters::default();
        for _ in 0..50 {
            mutate(&mut blueprint, &mut genome, &mut counters, &cfg, &mut rng);
        }
        for point in &blueprint.points {
            assert!(!(matches!(point.node_type, NodeType::Swimmer) && matches!(point.movement_type, MovementType::Floating)));
            if !matches!(point.node_type, NodeType::Neuron) {
                assert!(point.neuron_data_blueprint.is_none());
            }
        }
    }
}
