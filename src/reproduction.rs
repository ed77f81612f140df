//! Reproduction & placement (component design 4.8). Disc-based
//! non-overlapping placement search around the parent's centre of mass,
//! energy debiting, and the failed-placement cooldown, mirroring the
//! snapshot-then-place pattern the aquarium's courting/egg system used to
//! avoid borrowing every other creature mutably at once.

use crate::config::SimulationConfig;
use crate::creature::blueprint::Blueprint;
use crate::creature::mutation::{mutate, MutationCounters};
use crate::creature::{Creature, Genome};
use crate::math::{clamp, Vec2};
use crate::random::RandomSource;
use crate::telemetry::Telemetry;

pub struct PlacedDisc {
    pub center: Vec2,
    pub radius: f32,
}

/// Attempt to reproduce one parent. Returns the offspring that were
/// successfully placed; mutates the parent's energy/cooldown/flags in
/// place per the §4.8 contract.
pub fn reproduce(
    parent: &mut Creature,
    next_id: &mut dyn FnMut() -> u64,
    existing_discs: &[PlacedDisc],
    already_placed_this_tick: &mut Vec<PlacedDisc>,
    cfg: &SimulationConfig,
    telemetry: &mut Telemetry,
    rng: &mut dyn RandomSource,
) -> Vec<Creature> {
    let mut offspring = Vec::new();

    if !(parent.creature_energy >= parent.genome.reproduction_energy_threshold
        && parent.can_reproduce
        && parent.failed_reproduction_cooldown == 0)
    {
        return offspring;
    }

    let energy_per_offspring = parent.current_max_energy * cfg.offspring_initial_share;
    let com = parent.center_of_mass();
    let mut placed_any = false;

    for _ in 0..parent.genome.num_offspring {
        if parent.creature_energy < energy_per_offspring {
            break;
        }

        let mut blueprint = parent.blueprint.clone();
        let mut genome = parent.genome;
        let mut counters = MutationCounters::default();
        mutate(&mut blueprint, &mut genome, &mut counters, cfg, rng);
        telemetry.mutation_counters.parametric_perturbations += counters.parametric_perturbations;
        telemetry.mutation_counters.categorical_flips += counters.categorical_flips;
        telemetry.mutation_counters.spring_perturbations += counters.spring_perturbations;
        telemetry.mutation_counters.points_added += counters.points_added;
        telemetry.mutation_counters.springs_deleted += counters.springs_deleted;
        telemetry.mutation_counters.springs_added += counters.springs_added;
        telemetry.mutation_counters.springs_subdivided += counters.springs_subdivided;
        telemetry.mutation_counters.body_rescales += counters.body_rescales;

        let candidate_radius = blueprint.blueprint_radius();

        if let Some(spawn) = find_placement(com, parent.genome.offspring_spawn_radius, candidate_radius, existing_discs, already_placed_this_tick, cfg, rng) {
            let id = next_id();
            let child = instantiate_offspring(&blueprint, genome, id, parent.id, parent.generation + 1, spawn, &parent.brain, cfg);
            already_placed_this_tick.push(PlacedDisc { center: spawn, radius: candidate_radius + cfg.clearance });
            parent.creature_energy -= energy_per_offspring;
            offspring.push(child);
            placed_any = true;
        } else {
            telemetry.failed_placements += 1;
            break;
        }
    }

    if placed_any {
        parent.creature_energy = clamp(parent.creature_energy * (1.0 - cfg.reproduction_additional_cost_factor), 0.0, parent.current_max_energy);
        parent.ticks_since_birth = 0;
        parent.can_reproduce = false;
        parent.just_reproduced = true;
        parent.failed_reproduction_cooldown = 0;
        telemetry.total_reproductions += 1;
    } else {
        parent.failed_reproduction_cooldown = cfg.failed_reproduction_cooldown_ticks;
    }

    offspring
}

fn find_placement(
    com: Vec2,
    spawn_radius: f32,
    candidate_radius: f32,
    existing_discs: &[PlacedDisc],
    already_placed_this_tick: &[PlacedDisc],
    cfg: &SimulationConfig,
    rng: &mut dyn RandomSource,
) -> Option<Vec2> {
    for _ in 0..cfg.offspring_placement_attempts {
        let angle = rng.uniform_range(0.0, crate::math::TAU);
        let radius = rng.uniform_range(0.5, 1.0) * spawn_radius;
        let candidate = com.add(Vec2::from_angle(angle, radius));
        let collides = existing_discs
            .iter()
            .chain(already_placed_this_tick.iter())
            .any(|d| candidate.sub(d.center).len() < d.radius + candidate_radius + cfg.clearance);
        if !collides {
            return Some(candidate);
        }
    }
    None
}

/// Brain weight inheritance (§9 open question, resolved in favour of
/// inheritance-when-compatible): a freshly instantiated brain is kept
/// if its required I/O shape exactly matches the parent's current brain;
/// otherwise the freshly initialized weights from `Blueprint::instantiate`
/// stand, since the offspring's topology changed under this mutation.
fn instantiate_offspring(
    blueprint: &Blueprint,
    genome: Genome,
    id: u64,
    parent_id: u64,
    generation: u32,
    spawn: Vec2,
    parent_brain: &Option<crate::creature::brain::Brain>,
    cfg: &SimulationConfig,
) -> Creature {
    let mut child = blueprint.instantiate(id, Some(parent_id), generation, spawn, genome, cfg);
    if let (Some(parent_brain), Some(child_brain)) = (parent_brain, &mut child.brain) {
        if parent_brain.input_vector_size == child_brain.input_vector_size
            && parent_brain.output_vector_size == child_brain.output_vector_size
            && parent_brain.hidden_layer_size == child_brain.hidden_layer_size
        {
            child_brain.weights_ih = parent_brain.weights_ih.clone();
            child_brain.biases_h = parent_brain.biases_h.clone();
            child_brain.weights_ho = parent_brain.weights_ho.clone();
            child_brain.biases_o = parent_brain.biases_o.clone();
        }
    }
    child.creature_energy = cfg.default_max_energy * cfg.offspring_initial_share;
    child
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creature::blueprint::PrimitiveShape;
    use crate::random::StdRandomSource;

    fn sample_parent(cfg: &SimulationConfig, rng: &mut dyn RandomSource) -> Creature {
        let blueprint = Blueprint::generate(PrimitiveShape::Grid3x3, rng, cfg);
        let genome = Genome::random(rng, cfg);
        let mut parent = blueprint.instantiate(1, None, 0, Vec2::new(400.0, 300.0), genome, cfg);
        parent.creature_energy = parent.current_max_energy;
        parent.can_reproduce = true;
        parent
    }

    #[test]
    fn successful_reproduction_debits_parent_and_splits_energy_evenly() {
        let cfg = SimulationConfig::default();
        let mut rng = StdRandomSource::new(5);
        let mut parent = sample_parent(&cfg, &mut rng);
        let energy_before = parent.creature_energy;
        let mut telemetry = Telemetry::default();
        let mut next_id = 2u64;
        let mut id_fn = move || {
            next_id += 1;
            next_id
        };
        let mut placed = Vec::new();
        let children = reproduce(&mut parent, &mut id_fn, &[], &mut placed, &cfg, &mut telemetry, &mut rng);
        assert!(!children.is_empty());
        let per_child = cfg.default_max_energy * cfg.offspring_initial_share;
        let total_child_energy: f32 = children.iter().map(|c| c.creature_energy).sum();
        assert!((total_child_energy - per_child * children.len() as f32).abs() < 1e-3);
        assert!(parent.creature_energy < energy_before);
        assert_eq!(parent.ticks_since_birth, 0);
        assert!(parent.just_reproduced);
    }

    #[test]
    fn offspring_inherits_parent_brain_weights_when_shape_is_unchanged() {
        use crate::creature::blueprint::{BlueprintPoint, BlueprintSpring};
        use crate::creature::{ActivationPattern, ActivationPatternType, MovementType, NeuronDataBlueprint, NodeType};

        let cfg = SimulationConfig { global_mutation_rate_modifier: 0.0, structural_mutation_chance: 0.0, ..SimulationConfig::default() };
        let mut rng = StdRandomSource::new(8);

        let neuron_point = BlueprintPoint {
            rel_x: 0.0,
            rel_y: 0.0,
            radius: 5.0,
            mass: 1.0,
            node_type: NodeType::Neuron,
            movement_type: MovementType::Neutral,
            dye_color: [128, 128, 128],
            can_be_grabber: false,
            eye_target_type: None,
            max_effective_jet_velocity: 40.0,
            neuron_data_blueprint: Some(NeuronDataBlueprint { hidden_layer_size: 4 }),
            activation: ActivationPattern { pattern_type: ActivationPatternType::Flat, level: 0.0, period: 60.0, phase_offset: 0.0 },
        };
        let blueprint = Blueprint { points: vec![neuron_point], springs: Vec::<BlueprintSpring>::new() };
        let genome = Genome::random(&mut rng, &cfg);
        let mut parent = blueprint.instantiate(1, None, 0, Vec2::new(400.0, 300.0), genome, &cfg);
        parent.creature_energy = parent.current_max_energy;
        parent.can_reproduce = true;
        let parent_weights_ho = parent.brain.as_ref().unwrap().weights_ho.clone();

        let mut telemetry = Telemetry::default();
        let mut next_id = 2u64;
        let mut id_fn = move || {
            next_id += 1;
            next_id
        };
        let mut placed = Vec::new();
        let children = reproduce(&mut parent, &mut id_fn, &[], &mut placed, &cfg, &mut telemetry, &mut rng);
        assert!(!children.is_empty());
        let child_brain = children[0].brain.as_ref().expect("child should have a brain, matching its neuron point");
        assert_eq!(child_brain.weights_ho, parent_weights_ho);
    }

    #[test]
    fn placement_failure_sets_cooldown() {
        let cfg = SimulationConfig::default();
        let mut rng = StdRandomSource::new(6);
        let mut parent = sample_parent(&cfg, &mut rng);
        let blocking: Vec<PlacedDisc> = (0..2000)
            .map(|_| PlacedDisc { center: parent.center_of_mass(), radius: 500.0 })
            .collect();
        let mut telemetry = Telemetry::default();
        let mut next_id = 100u64;
        let mut id_fn = move || {
            next_id += 1;
            next_id
        };
        let mut placed = Vec::new();
        let children = reproduce(&mut parent, &mut id_fn, &blocking, &mut placed, &cfg, &mut telemetry, &mut rng);
        assert!(children.is_empty());
        assert_eq!(parent.failed_reproduction_cooldown, cfg.failed_reproduction_cooldown_ticks);
        assert_eq!(telemetry.failed_placements, 1);
    }
}
