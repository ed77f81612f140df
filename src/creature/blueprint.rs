//! Heritable morphology: point/spring lists relative to a centroid, from
//! which a live phenotype is instantiated at a spawn position. Pure data,
//! cloned by value on reproduction (design notes: "the blueprint is pure
//! data; clone by value").

use super::{
    coerce_swimmer_movement, ActivationPattern, ActivationPatternType, Creature, EnergyAccumulators, EyeTargetType,
    Genome, JetData, MassPoint, MovementType, NeuronDataBlueprint, NodeType, Spring,
};
use crate::config::SimulationConfig;
use crate::math::Vec2;
use crate::random::RandomSource;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintPoint {
    pub rel_x: f32,
    pub rel_y: f32,
    pub radius: f32,
    pub mass: f32,
    pub node_type: NodeType,
    pub movement_type: MovementType,
    pub dye_color: [u8; 3],
    pub can_be_grabber: bool,
    pub eye_target_type: Option<EyeTargetType>,
    pub max_effective_jet_velocity: f32,
    pub neuron_data_blueprint: Option<NeuronDataBlueprint>,
    pub activation: ActivationPattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintSpring {
    pub p1_index: usize,
    pub p2_index: usize,
    pub rest_length: f32,
    pub is_rigid: bool,
    pub stiffness: f32,
    pub damping: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blueprint {
    pub points: Vec<BlueprintPoint>,
    pub springs: Vec<BlueprintSpring>,
}

#[derive(Debug, Clone, Copy)]
pub enum PrimitiveShape {
    Grid3x3,
    Line,
    Star,
}

impl Blueprint {
    /// blueprintRadius: coarse placement-collision proxy, max over points of
    /// the blueprint-space distance from centroid plus the point's radius.
    pub fn blueprint_radius(&self) -> f32 {
        self.points
            .iter()
            .map(|p| (p.rel_x * p.rel_x + p.rel_y * p.rel_y).sqrt() + p.radius)
            .fold(0.0, f32::max)
    }

    pub fn generate_random(rng: &mut dyn RandomSource, cfg: &SimulationConfig) -> Self {
        let shape = match rng.below(3) {
            0 => PrimitiveShape::Grid3x3,
            1 => PrimitiveShape::Line,
            _ => PrimitiveShape::Star,
        };
        Self::generate(shape, rng, cfg)
    }

    pub fn generate(shape: PrimitiveShape, rng: &mut dyn RandomSource, cfg: &SimulationConfig) -> Self {
        let spacing = 12.0;
        let mut raw_points: Vec<Vec2> = Vec::new();
        let mut raw_springs: Vec<(usize, usize, bool)> = Vec::new();

        match shape {
            PrimitiveShape::Grid3x3 => {
                for j in 0..3 {
                    for i in 0..3 {
                        raw_points.push(Vec2::new(i as f32 * spacing, j as f32 * spacing));
                    }
                }
                for j in 0..3usize {
                    for i in 0..3usize {
                        let idx = j * 3 + i;
                        if i + 1 < 3 {
                            raw_springs.push((idx, idx + 1, false));
                        }
                        if j + 1 < 3 {
                            raw_springs.push((idx, idx + 3, false));
                        }
                    }
                }
            }
            PrimitiveShape::Line => {
                let count = 3 + rng.below(3); // 3..=5
                for i in 0..count {
                    raw_points.push(Vec2::new(i as f32 * spacing, 0.0));
                }
                for i in 0..count - 1 {
                    raw_springs.push((i, i + 1, false));
                }
            }
            PrimitiveShape::Star => {
                raw_points.push(Vec2::ZERO);
                let outer = 4 + rng.below(3); // 4..=6
                for k in 0..outer {
                    let angle = crate::math::TAU * k as f32 / outer as f32;
                    raw_points.push(Vec2::from_angle(angle, spacing));
                    raw_springs.push((0, k + 1, true));
                }
            }
        }

        let centroid = raw_points.iter().fold(Vec2::ZERO, |acc, p| acc.add(*p)).scale(1.0 / raw_points.len() as f32);

        let points = raw_points
            .iter()
            .map(|p| {
                let rel = p.sub(centroid);
                let node_type = if rng.chance(cfg.neuron_chance) {
                    NodeType::Neuron
                } else {
                    NodeType::random_non_neuron(rng)
                };
                let movement_type = match rng.below(3) {
                    0 => MovementType::Fixed,
                    1 => MovementType::Floating,
                    _ => MovementType::Neutral,
                };
                let movement_type = coerce_swimmer_movement(node_type, movement_type);
                let neuron_data_blueprint = if matches!(node_type, NodeType::Neuron) {
                    Some(NeuronDataBlueprint {
                        hidden_layer_size: cfg.hidden_layer_min
                            + rng.below(cfg.hidden_layer_max - cfg.hidden_layer_min + 1),
                    })
                } else {
                    None
                };
                let eye_target_type = if matches!(node_type, NodeType::Eye) {
                    Some(if rng.chance(0.5) {
                        EyeTargetType::Particle
                    } else {
                        EyeTargetType::ForeignBodyPoint
                    })
                } else {
                    None
                };
                BlueprintPoint {
                    rel_x: rel.x,
                    rel_y: rel.y,
                    radius: rng.uniform_range(3.0, 7.0),
                    mass: rng.uniform_range(0.4, 1.2),
                    node_type,
                    movement_type,
                    dye_color: [rng.below(256) as u8, rng.below(256) as u8, rng.below(256) as u8],
                    can_be_grabber: rng.chance(0.1),
                    eye_target_type,
                    max_effective_jet_velocity: rng.uniform_range(20.0, 60.0),
                    neuron_data_blueprint,
                    activation: ActivationPattern {
                        pattern_type: match rng.below(3) {
                            0 => ActivationPatternType::Flat,
                            1 => ActivationPatternType::Sine,
                            _ => ActivationPatternType::Pulse,
                        },
                        level: rng.uniform_range(0.2, 1.0),
                        period: rng.uniform_range(20.0, 180.0),
                        phase_offset: rng.uniform_range(0.0, 60.0),
                    },
                }
            })
            .collect();

        let springs = raw_springs
            .iter()
            .map(|&(a, b, rigid)| {
                let len = raw_points[a].sub(raw_points[b]).len();
                BlueprintSpring {
                    p1_index: a,
                    p2_index: b,
                    rest_length: len,
                    is_rigid: rigid,
                    stiffness: rng.uniform_range(80.0, 300.0),
                    damping: rng.uniform_range(2.0, 15.0),
                }
            })
            .collect();

        Blueprint { points, springs }
    }

    /// Instantiate a live phenotype at `spawn`, wiring brain slot indices and
    /// resetting the per-tick/lifecycle state a fresh creature needs.
    pub fn instantiate(
        &self,
        id: u64,
        parent_id: Option<u64>,
        generation: u32,
        spawn: Vec2,
        genome: Genome,
        cfg: &SimulationConfig,
    ) -> Creature {
        let points: Vec<MassPoint> = self
            .points
            .iter()
            .map(|bp| {
                let mut mp = MassPoint::new(
                    Vec2::new(spawn.x + bp.rel_x, spawn.y + bp.rel_y),
                    bp.mass,
                    bp.radius,
                    bp.node_type,
                    bp.movement_type,
                );
                mp.dye_color = bp.dye_color;
                mp.can_be_grabber = bp.can_be_grabber;
                mp.eye_target_type = bp.eye_target_type;
                mp.max_effective_jet_velocity = bp.max_effective_jet_velocity;
                mp.neuron_data = bp.neuron_data_blueprint;
                mp.activation = bp.activation;
                mp
            })
            .collect();

        let springs: Vec<Spring> = self
            .springs
            .iter()
            .filter(|bs| bs.p1_index < points.len() && bs.p2_index < points.len())
            .map(|bs| Spring {
                p1: bs.p1_index,
                p2: bs.p2_index,
                rest_length: bs.rest_length,
                stiffness: bs.stiffness,
                damping: bs.damping,
                is_rigid: bs.is_rigid,
            })
            .collect();

        // First NEURON by point index becomes the designated brain (§9 tie-break).
        let brain_point_index = points.iter().position(|p| matches!(p.node_type, NodeType::Neuron));

        let mut points = points;
        if let Some(idx) = points.iter().position(|p| matches!(p.node_type, NodeType::Eye)) {
            points[idx].is_designated_eye = true;
        }

        let (input_size, output_size) = super::required_brain_shape(&points, cfg);

        let brain = brain_point_index.map(|idx| {
            let hidden = points[idx]
                .neuron_data
                .map(|nd| nd.hidden_layer_size)
                .unwrap_or(cfg.hidden_layer_min)
                .clamp(cfg.hidden_layer_min, cfg.hidden_layer_max);
            super::brain::Brain::new(hidden, input_size, output_size, cfg)
        });

        Creature {
            id,
            parent_id,
            generation,
            points,
            springs,
            genome,
            blueprint: self.clone(),
            brain,
            brain_point_index,
            creature_energy: cfg.default_max_energy * cfg.offspring_initial_share,
            current_max_energy: cfg.default_max_energy,
            ticks_since_birth: 0,
            can_reproduce: false,
            just_reproduced: false,
            failed_reproduction_cooldown: 0,
            prey_predated_this_tick: HashSet::new(),
            accumulators: EnergyAccumulators::default(),
            blueprint_radius: self.blueprint_radius(),
            is_unstable: false,
            previous_energy_for_reward: 0.0,
            previous_energy_change: 0.0,
        }
    }

    /// If the shape vectors (required input/output size) changed from what
    /// the previous brain was built for, reinitialize with fresh weights;
    /// otherwise keep inheriting (§9 open question, resolved in favour of
    /// inheritance-when-compatible).
    pub fn reshape_brain_if_needed(creature: &mut Creature, cfg: &SimulationConfig) {
        let Some(idx) = creature.brain_point_index else { return };
        let (input_size, output_size) = super::required_brain_shape(&creature.points, cfg);

        let needs_reshape = match &creature.brain {
            Some(b) => b.input_vector_size != input_size || b.output_vector_size != output_size,
            None => true,
        };
        if needs_reshape {
            let hidden = creature.points[idx]
                .neuron_data
                .map(|nd| nd.hidden_layer_size)
                .unwrap_or(cfg.hidden_layer_min)
                .clamp(cfg.hidden_layer_min, cfg.hidden_layer_max);
            creature.brain = Some(super::brain::Brain::new(hidden, input_size, output_size, cfg));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::StdRandomSource;

    #[test]
    fn grid_shape_has_nine_points() {
        let cfg = SimulationConfig::default();
        let mut rng = StdRandomSource::new(1);
        let bp = Blueprint::generate(PrimitiveShape::Grid3x3, &mut rng, &cfg);
        assert_eq!(bp.points.len(), 9);
    }

    #[test]
    fn points_are_relative_to_centroid() {
        let cfg = SimulationConfig::default();
        let mut rng = StdRandomSource::new(2);
        let bp = Blueprint::generate(PrimitiveShape::Grid3x3, &mut rng, &cfg);
        let cx: f32 = bp.points.iter().map(|p| p.rel_x).sum::<f32>() / bp.points.len() as f32;
        let cy: f32 = bp.points.iter().map(|p| p.rel_y).sum::<f32>() / bp.points.len() as f32;
        assert!(cx.abs() < 1e-3 && cy.abs() < 1e-3);
    }

    #[test]
    fn instantiate_places_centroid_at_spawn() {
        let cfg = SimulationConfig::default();
        let mut rng = StdRandomSource::new(3);
        let bp = Blueprint::generate(PrimitiveShape::Star, &mut rng, &cfg);
        let genome = Genome::random(&mut rng, &cfg);
        let creature = bp.instantiate(1, None, 0, Vec2::new(100.0, 100.0), genome, &cfg);
        let com = creature.center_of_mass();
        assert!((com.x - 100.0).abs() < 5.0);
        assert!((com.y - 100.0).abs() < 5.0);
    }
}
