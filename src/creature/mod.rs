//! Mass-point/spring phenotype and its per-tick update: sensory sampling,
//! brain inference, energy budget, Verlet integration and the stability
//! checks that can flag a creature unstable. The cross-body interaction
//! pass (predation, eating, repulsion) is driver-level code in `world`,
//! since it needs the whole population at once; everything here only
//! touches one creature plus the shared fields it reads.

pub mod blueprint;
pub mod brain;
pub mod mutation;

use crate::config::SimulationConfig;
use crate::fields::EnvironmentFields;
use crate::fluid::FluidField;
use crate::grid::{BroadPhaseGrid, GridItem};
use crate::math::{clamp, sigmoid, Vec2};
use crate::random::RandomSource;
use blueprint::Blueprint;
use brain::Brain;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Predator,
    Eater,
    Photosynthetic,
    Neuron,
    Emitter,
    Swimmer,
    Eye,
    Jet,
}

impl NodeType {
    pub const FUNCTIONAL: [NodeType; 8] = [
        NodeType::Predator,
        NodeType::Eater,
        NodeType::Photosynthetic,
        NodeType::Neuron,
        NodeType::Emitter,
        NodeType::Swimmer,
        NodeType::Eye,
        NodeType::Jet,
    ];

    pub fn random_non_neuron(rng: &mut dyn RandomSource) -> NodeType {
        const NON_NEURON: [NodeType; 7] = [
            NodeType::Predator,
            NodeType::Eater,
            NodeType::Photosynthetic,
            NodeType::Emitter,
            NodeType::Swimmer,
            NodeType::Eye,
            NodeType::Jet,
        ];
        NON_NEURON[rng.below(NON_NEURON.len())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementType {
    Fixed,
    Floating,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EyeTargetType {
    Particle,
    ForeignBodyPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationPatternType {
    Flat,
    Sine,
    Pulse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardStrategy {
    EnergyChange,
    ReproductionEvent,
    ParticleProximity,
    EnergySecondDerivative,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActivationPattern {
    pub pattern_type: ActivationPatternType,
    pub level: f32,
    pub period: f32,
    pub phase_offset: f32,
}

impl ActivationPattern {
    pub fn exertion_at(&self, t_norm: f32) -> f32 {
        match self.pattern_type {
            ActivationPatternType::Flat => self.level,
            ActivationPatternType::Sine => self.level * (0.5 * (crate::math::TAU * t_norm).sin() + 0.5),
            ActivationPatternType::Pulse => {
                if t_norm.rem_euclid(1.0) < 0.1 {
                    self.level
                } else {
                    0.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JetData {
    pub magnitude: f32,
    pub angle: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NeuronDataBlueprint {
    pub hidden_layer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassPoint {
    pub pos: Vec2,
    pub prev_pos: Vec2,
    pub mass: f32,
    pub inv_mass: f32,
    pub radius: f32,
    pub node_type: NodeType,
    pub movement_type: MovementType,
    pub dye_color: [u8; 3],
    pub current_exertion_level: f32,
    pub is_grabbing: bool,
    pub is_designated_eye: bool,
    pub can_be_grabber: bool,
    pub eye_target_type: Option<EyeTargetType>,
    pub max_effective_jet_velocity: f32,
    pub sensed_fluid_velocity: Vec2,
    pub jet_data: JetData,
    pub neuron_data: Option<NeuronDataBlueprint>,
    pub activation: ActivationPattern,
    // per-tick sensor scratch, populated in the sensory sub-phase
    pub sees_target: bool,
    pub eye_distance_norm: f32,
    pub eye_bearing: f32,
    // per-tick actuator scratch: non-spring forces (swimmer thrust, fallback
    // impulses) queued by the sensory/brain phases, consumed by integrate().
    #[serde(skip)]
    pub external_force: Vec2,
}

impl MassPoint {
    pub fn new(pos: Vec2, mass: f32, radius: f32, node_type: NodeType, movement_type: MovementType) -> Self {
        let movement_type = coerce_swimmer_movement(node_type, movement_type);
        Self {
            pos,
            prev_pos: pos,
            mass,
            inv_mass: if mass > 0.0 { 1.0 / mass } else { 0.0 },
            radius,
            node_type,
            movement_type,
            dye_color: [128, 128, 128],
            current_exertion_level: 0.0,
            is_grabbing: false,
            is_designated_eye: false,
            can_be_grabber: false,
            eye_target_type: None,
            max_effective_jet_velocity: 40.0,
            sensed_fluid_velocity: Vec2::ZERO,
            jet_data: JetData::default(),
            neuron_data: None,
            activation: ActivationPattern {
                pattern_type: ActivationPatternType::Flat,
                level: 0.5,
                period: 60.0,
                phase_offset: 0.0,
            },
            sees_target: false,
            eye_distance_norm: 1.0,
            eye_bearing: 0.0,
            external_force: Vec2::ZERO,
        }
    }

    /// Effective "fixed": movement type FIXED, or currently grabbing onto
    /// something (a grabber holds itself fixed while latched).
    pub fn is_effectively_fixed(&self) -> bool {
        matches!(self.movement_type, MovementType::Fixed) || self.is_grabbing
    }
}

/// SWIMMER points are never FLOATING; mutation/construction must coerce.
pub fn coerce_swimmer_movement(node_type: NodeType, movement_type: MovementType) -> MovementType {
    if matches!(node_type, NodeType::Swimmer) && matches!(movement_type, MovementType::Floating) {
        MovementType::Neutral
    } else {
        movement_type
    }
}

/// (inputVectorSize, outputVectorSize) required by the brain invariant in
/// §3: computed fresh from current point counts so instantiation and
/// reshape-on-mismatch agree on the same formula.
pub fn required_brain_shape(points: &[MassPoint], cfg: &SimulationConfig) -> (usize, usize) {
    let eye_count = points.iter().filter(|p| matches!(p.node_type, NodeType::Eye)).count();
    let swimmer_or_jet = points.iter().filter(|p| matches!(p.node_type, NodeType::Swimmer | NodeType::Jet)).count();
    let emitter_count = points.iter().filter(|p| matches!(p.node_type, NodeType::Emitter)).count();
    let swimmer_count = points.iter().filter(|p| matches!(p.node_type, NodeType::Swimmer)).count();
    let eater_count = points.iter().filter(|p| matches!(p.node_type, NodeType::Eater)).count();
    let predator_count = points.iter().filter(|p| matches!(p.node_type, NodeType::Predator)).count();
    let jet_count = points.iter().filter(|p| matches!(p.node_type, NodeType::Jet)).count();
    let grabber_count = points.iter().filter(|p| p.can_be_grabber).count();

    let input_size = cfg.neural_input_size + eye_count * cfg.eye_inputs + swimmer_or_jet * cfg.fluid_sensor_inputs;
    let output_size = emitter_count * brain::OUT_EMITTER
        + swimmer_count * brain::OUT_SWIMMER
        + eater_count * brain::OUT_EATER
        + predator_count * brain::OUT_PREDATOR
        + jet_count * brain::OUT_JET
        + grabber_count * brain::OUT_GRABBER;
    (input_size, output_size)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spring {
    pub p1: usize,
    pub p2: usize,
    pub rest_length: f32,
    pub stiffness: f32,
    pub damping: f32,
    pub is_rigid: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Genome {
    pub reproduction_cooldown_gene: f32,
    pub jet_max_velocity_gene: f32,
    pub emitter_direction: f32,
    pub num_offspring: u32,
    pub offspring_spawn_radius: f32,
    pub point_add_chance: f32,
    pub spring_connection_radius: f32,
    pub reproduction_energy_threshold: f32,
    pub reward_strategy: RewardStrategy,
}

impl Genome {
    pub fn random(rng: &mut dyn RandomSource, cfg: &SimulationConfig) -> Self {
        const STRATS: [RewardStrategy; 4] = [
            RewardStrategy::EnergyChange,
            RewardStrategy::ReproductionEvent,
            RewardStrategy::ParticleProximity,
            RewardStrategy::EnergySecondDerivative,
        ];
        Self {
            reproduction_cooldown_gene: rng.uniform_range(60.0, 400.0),
            jet_max_velocity_gene: rng.uniform_range(10.0, 60.0),
            emitter_direction: rng.uniform_range(0.0, crate::math::TAU),
            num_offspring: cfg.default_num_offspring,
            offspring_spawn_radius: cfg.default_offspring_spawn_radius,
            point_add_chance: cfg.point_add_chance_default,
            spring_connection_radius: cfg.default_spring_connection_radius,
            reproduction_energy_threshold: cfg.default_reproduction_energy_threshold,
            reward_strategy: STRATS[rng.below(STRATS.len())],
        }
    }

    /// `effectiveReproductionCooldown`: derived, never itself mutated (§9).
    pub fn effective_reproduction_cooldown(&self, point_count: usize) -> f32 {
        self.reproduction_cooldown_gene * (1.0 + 0.2 * point_count as f32)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EnergyAccumulators {
    pub lifetime_photosynthesis_gain: f32,
    pub lifetime_eating_gain: f32,
    pub lifetime_predation_gain: f32,
    pub lifetime_cost_by_type: [f32; 8],
    pub this_tick_photosynthesis_gain: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creature {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub generation: u32,
    pub points: Vec<MassPoint>,
    pub springs: Vec<Spring>,
    pub genome: Genome,
    pub blueprint: Blueprint,
    pub brain: Option<Brain>,
    pub brain_point_index: Option<usize>,
    pub creature_energy: f32,
    pub current_max_energy: f32,
    pub ticks_since_birth: u32,
    pub can_reproduce: bool,
    pub just_reproduced: bool,
    pub failed_reproduction_cooldown: u32,
    #[serde(skip)]
    pub prey_predated_this_tick: HashSet<u64>,
    pub accumulators: EnergyAccumulators,
    pub blueprint_radius: f32,
    pub is_unstable: bool,
    pub previous_energy_for_reward: f32,
    pub previous_energy_change: f32,
}

impl Creature {
    pub fn center_of_mass(&self) -> Vec2 {
        if self.points.is_empty() {
            return Vec2::ZERO;
        }
        let sum = self.points.iter().fold(Vec2::ZERO, |acc, p| acc.add(p.pos));
        sum.scale(1.0 / self.points.len() as f32)
    }

    pub fn bbox(&self) -> (f32, f32) {
        let mut min = Vec2::new(f32::MAX, f32::MAX);
        let mut max = Vec2::new(f32::MIN, f32::MIN);
        for p in &self.points {
            min.x = min.x.min(p.pos.x);
            min.y = min.y.min(p.pos.y);
            max.x = max.x.max(p.pos.x);
            max.y = max.y.max(p.pos.y);
        }
        (max.x - min.x, max.y - min.y)
    }

    /// Phase 1: sensory update. Applies default activation patterns, resets
    /// actuator-only node types, runs eye detection and fluid sensing.
    pub fn sensory_update(&mut self, grid: &BroadPhaseGrid, cfg: &SimulationConfig) {
        self.just_reproduced = false;
        let t = self.ticks_since_birth as f32;
        for point in self.points.iter_mut() {
            point.external_force = Vec2::ZERO;
            let t_norm = (t + point.activation.phase_offset) / point.activation.period.max(1.0);
            point.current_exertion_level = point.activation.exertion_at(t_norm);
            if matches!(point.node_type, NodeType::Eater | NodeType::Predator) {
                point.current_exertion_level = 0.0;
            }
        }
        for i in 0..self.points.len() {
            let (node_type, target_type, pos) = {
                let p = &self.points[i];
                (p.node_type, p.eye_target_type, p.pos)
            };
            if matches!(node_type, NodeType::Eye) {
                let target = target_type.unwrap_or(EyeTargetType::Particle);
                let (sees, dist_norm, bearing) = scan_eye(pos, target, self.id, grid, cfg.eye_detection_radius);
                let p = &mut self.points[i];
                p.sees_target = sees;
                p.eye_distance_norm = dist_norm;
                p.eye_bearing = bearing;
            }
        }
        // Swimmer/Jet fluid sensing needs the FluidField, wired separately
        // via sample_fluid_sensors since World owns that grid.
    }

    pub fn sample_fluid_sensors(&mut self, fluid: &FluidField, cfg: &SimulationConfig) {
        let scale_x = fluid.n as f32 / cfg.world_width;
        let scale_y = fluid.n as f32 / cfg.world_height;
        for point in self.points.iter_mut() {
            if matches!(point.node_type, NodeType::Swimmer | NodeType::Jet) {
                let cx = (point.pos.x * scale_x) as i64;
                let cy = (point.pos.y * scale_y) as i64;
                let (vx, vy) = fluid.velocity_at(cx.max(0) as usize, cy.max(0) as usize);
                point.sensed_fluid_velocity = Vec2::new(vx, vy);
            }
        }
    }

    /// Phase 2: brain inference. Composes the input vector, samples one
    /// action per actuator slot and applies them. A creature with no brain,
    /// or whose brain's shape has drifted from its current point layout
    /// (structural mutation changed the body without a reshape yet landing),
    /// falls back to small random impulses instead of silently truncating.
    pub fn brain_decision(&mut self, fluid: &FluidField, env: &EnvironmentFields, dt: f32, cfg: &SimulationConfig, rng: &mut dyn RandomSource) {
        let brain_idx = match self.brain_point_index {
            Some(i) if self.brain.is_some() => i,
            _ => {
                self.apply_fallback_impulses(cfg, rng);
                return;
            }
        };
        let (expected_in, expected_out) = required_brain_shape(&self.points, cfg);
        let brain = self.brain.as_ref().unwrap();
        if brain.input_vector_size != expected_in || brain.output_vector_size != expected_out {
            log::warn!(
                "creature {}: brain shape mismatch (has {}x{}, needs {expected_in}x{expected_out}), falling back to random impulses",
                self.id,
                brain.input_vector_size,
                brain.output_vector_size
            );
            self.apply_fallback_impulses(cfg, rng);
            return;
        }

        let (input, input_labels) = self.compose_input_vector(brain_idx, fluid, env, dt, cfg);
        let labels = self.action_labels();
        let label_refs: Vec<&str> = labels.iter().map(|s| s.as_str()).collect();

        let mut brain = self.brain.take().unwrap();
        brain.forward(&input);
        let actions = brain.sample_actions(&label_refs, cfg, rng);
        brain.current_frame_input_vector_with_labels = input_labels.into_iter().zip(input.into_iter()).collect();
        self.brain = Some(brain);

        self.apply_actions(&actions, dt, cfg);
    }

    /// Fixed sensors (dye/energy/position/velocity/nutrient/energy trend) plus
    /// a fluid-velocity pair per SWIMMER/JET point and a sight triple per EYE
    /// point, in the same point order `required_brain_shape` counted them.
    fn compose_input_vector(&self, brain_idx: usize, fluid: &FluidField, env: &EnvironmentFields, dt: f32, cfg: &SimulationConfig) -> (Vec<f32>, Vec<String>) {
        let scale_x = fluid.n as f32 / cfg.world_width;
        let scale_y = fluid.n as f32 / cfg.world_height;
        let brain_pos = self.points[brain_idx].pos;
        let cx = ((brain_pos.x * scale_x) as i64).max(0) as usize;
        let cy = ((brain_pos.y * scale_y) as i64).max(0) as usize;
        let cx = cx.min(env.nutrient.n - 1);
        let cy = cy.min(env.nutrient.n - 1);
        let idx = cy * env.nutrient.n + cx;

        let dye_r = fluid.density_r[idx] / 255.0;
        let dye_g = fluid.density_g[idx] / 255.0;
        let dye_b = fluid.density_b[idx] / 255.0;
        let energy_ratio = self.creature_energy / self.current_max_energy.max(1e-6);
        let com = self.center_of_mass();
        let rel_pos = brain_pos.sub(com).tanh_normalized(cfg.eye_detection_radius);
        let brain_vel = self.points[brain_idx].pos.sub(self.points[brain_idx].prev_pos).scale(1.0 / dt.max(1e-6));
        let rel_vel = brain_vel.tanh_normalized(cfg.max_displacement);
        let nutrient = env.nutrient.get(cx, cy);
        let energy_trend = ((self.previous_energy_change - self.previous_energy_for_reward) / cfg.energy_second_derivative_scale.max(1e-6)).tanh();

        let mut values = vec![dye_r, dye_g, dye_b, energy_ratio, rel_pos.x, rel_pos.y, rel_vel.x, rel_vel.y, nutrient, energy_trend];
        let mut labels: Vec<String> = ["dye_r", "dye_g", "dye_b", "energy_ratio", "com_dx", "com_dy", "vel_dx", "vel_dy", "nutrient", "energy_trend"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for (i, point) in self.points.iter().enumerate().filter(|(_, p)| matches!(p.node_type, NodeType::Swimmer | NodeType::Jet)) {
            let v = point.sensed_fluid_velocity;
            values.push(clamp(v.x / cfg.max_fluid_velocity_component, -1.0, 1.0));
            values.push(clamp(v.y / cfg.max_fluid_velocity_component, -1.0, 1.0));
            labels.push(format!("fluid_vx{i}"));
            labels.push(format!("fluid_vy{i}"));
        }
        for (i, point) in self.points.iter().enumerate().filter(|(_, p)| matches!(p.node_type, NodeType::Eye)) {
            values.push(if point.sees_target { 1.0 } else { 0.0 });
            values.push(point.eye_distance_norm);
            values.push(point.eye_bearing);
            labels.push(format!("eye_sees{i}"));
            labels.push(format!("eye_dist{i}"));
            labels.push(format!("eye_bearing{i}"));
        }
        (values, labels)
    }

    /// Canonical grouped-by-type label order: emitter, swimmer, eater,
    /// predator, jet, then grabber toggles. Must track `apply_actions`'s
    /// consumption order and `required_brain_shape`'s output size exactly.
    fn action_labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        for (i, _) in self.points.iter().enumerate().filter(|(_, p)| matches!(p.node_type, NodeType::Emitter)) {
            labels.push(format!("emitter{i}_r"));
            labels.push(format!("emitter{i}_g"));
            labels.push(format!("emitter{i}_b"));
            labels.push(format!("emitter{i}_exertion"));
        }
        for (i, _) in self.points.iter().enumerate().filter(|(_, p)| matches!(p.node_type, NodeType::Swimmer)) {
            labels.push(format!("swimmer{i}_mag"));
            labels.push(format!("swimmer{i}_dir"));
            labels.push(format!("swimmer{i}_exertion"));
        }
        for (i, _) in self.points.iter().enumerate().filter(|(_, p)| matches!(p.node_type, NodeType::Eater)) {
            labels.push(format!("eater{i}_exertion"));
        }
        for (i, _) in self.points.iter().enumerate().filter(|(_, p)| matches!(p.node_type, NodeType::Predator)) {
            labels.push(format!("predator{i}_exertion"));
        }
        for (i, _) in self.points.iter().enumerate().filter(|(_, p)| matches!(p.node_type, NodeType::Jet)) {
            labels.push(format!("jet{i}_mag"));
            labels.push(format!("jet{i}_angle"));
            labels.push(format!("jet{i}_exertion"));
        }
        for (i, _) in self.points.iter().enumerate().filter(|(_, p)| p.can_be_grabber) {
            labels.push(format!("grabber{i}_toggle"));
        }
        labels
    }

    /// Consumes sampled actions in the same grouped-by-type order as
    /// `action_labels`, writing exertion/dye/jet state and queuing
    /// non-spring forces into `external_force` for `integrate` to pick up.
    fn apply_actions(&mut self, actions: &[f32], dt: f32, cfg: &SimulationConfig) {
        let next = |idx: &mut usize| {
            let v = actions.get(*idx).copied().unwrap_or(0.0);
            *idx += 1;
            v
        };
        let mut idx = 0;

        for i in 0..self.points.len() {
            if !matches!(self.points[i].node_type, NodeType::Emitter) {
                continue;
            }
            let r = sigmoid(next(&mut idx));
            let g = sigmoid(next(&mut idx));
            let b = sigmoid(next(&mut idx));
            let exertion = sigmoid(next(&mut idx));
            self.points[i].dye_color = [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8];
            self.points[i].current_exertion_level = exertion;
        }
        for i in 0..self.points.len() {
            if !matches!(self.points[i].node_type, NodeType::Swimmer) {
                continue;
            }
            let magnitude = sigmoid(next(&mut idx)) * cfg.max_swimmer_mag;
            let direction = next(&mut idx).rem_euclid(crate::math::TAU);
            let exertion = sigmoid(next(&mut idx));
            self.points[i].current_exertion_level = exertion;
            // force = mag·exertion applied as force/dt (§4.4 step 2), since
            // integrate()'s Verlet update multiplies accumulated force by dt².
            let force_over_dt = magnitude * exertion / dt.max(1e-6);
            self.points[i].external_force = self.points[i].external_force.add(Vec2::from_angle(direction, force_over_dt));
        }
        for i in 0..self.points.len() {
            if !matches!(self.points[i].node_type, NodeType::Eater) {
                continue;
            }
            self.points[i].current_exertion_level = sigmoid(next(&mut idx));
        }
        for i in 0..self.points.len() {
            if !matches!(self.points[i].node_type, NodeType::Predator) {
                continue;
            }
            self.points[i].current_exertion_level = sigmoid(next(&mut idx));
        }
        for i in 0..self.points.len() {
            if !matches!(self.points[i].node_type, NodeType::Jet) {
                continue;
            }
            let magnitude = sigmoid(next(&mut idx)) * cfg.max_jet_mag;
            let angle = next(&mut idx).rem_euclid(crate::math::TAU);
            let exertion = sigmoid(next(&mut idx));
            self.points[i].current_exertion_level = exertion;
            self.points[i].jet_data = JetData { magnitude: magnitude * exertion, angle };
        }
        for i in 0..self.points.len() {
            if !self.points[i].can_be_grabber {
                continue;
            }
            self.points[i].is_grabbing = sigmoid(next(&mut idx)) > 0.5;
        }
    }

    /// No-brain / shape-mismatch fallback: each SWIMMER or JET point has a
    /// small chance per tick of a random-direction nudge, so a body isn't
    /// simply inert while its brain is waiting on a reshape.
    fn apply_fallback_impulses(&mut self, cfg: &SimulationConfig, rng: &mut dyn RandomSource) {
        for point in self.points.iter_mut() {
            if !matches!(point.node_type, NodeType::Swimmer | NodeType::Jet) {
                continue;
            }
            if rng.chance(cfg.random_impulse_chance) {
                let angle = rng.uniform_range(0.0, crate::math::TAU);
                point.external_force = point.external_force.add(Vec2::from_angle(angle, cfg.random_impulse_magnitude));
            }
        }
    }

    /// End-of-tick reward bookkeeping for the brain's policy gradient,
    /// called after reproduction so `ReproductionEvent` sees this tick's
    /// `just_reproduced` flag. Trains once the experience buffer is full and
    /// enough frames have passed since the last update.
    pub fn record_reward_and_maybe_train(&mut self, cfg: &SimulationConfig) {
        if self.brain.is_none() || self.brain_point_index.is_none() {
            return;
        }
        let reward = match self.genome.reward_strategy {
            RewardStrategy::EnergyChange => self.previous_energy_change - self.accumulators.this_tick_photosynthesis_gain,
            RewardStrategy::ReproductionEvent => {
                if self.just_reproduced {
                    cfg.repro_reward
                } else {
                    0.0
                }
            }
            RewardStrategy::ParticleProximity => {
                let min_dist = self
                    .points
                    .iter()
                    .filter(|p| matches!(p.node_type, NodeType::Eye) && p.sees_target)
                    .map(|p| p.eye_distance_norm)
                    .fold(f32::MAX, f32::min);
                if min_dist < f32::MAX {
                    (1.0 - min_dist) * cfg.particle_proximity_scale
                } else {
                    0.0
                }
            }
            RewardStrategy::EnergySecondDerivative => (self.previous_energy_change - self.previous_energy_for_reward) * cfg.energy_second_derivative_scale,
        };

        if let Some(brain) = self.brain.as_mut() {
            let state: Vec<f32> = brain.current_frame_input_vector_with_labels.iter().map(|(_, v)| *v).collect();
            brain.record_experience(state, reward);
            brain.frames_since_last_train += 1;
            if brain.frames_since_last_train >= cfg.training_interval_frames && brain.buffer_full() {
                brain.train(cfg);
            }
        }

        self.previous_energy_for_reward = self.previous_energy_change;
    }

    /// Phase 3: energy budget. Returns true if energy <= 0 afterward
    /// (creature must be marked unstable by the caller).
    pub fn energy_budget(&mut self, dt: f32, env: &EnvironmentFields, fluid: &FluidField, cfg: &SimulationConfig) -> bool {
        let mut gain = 0.0f32;
        let mut cost = 0.0f32;
        let mut poison = 0.0f32;
        self.accumulators.this_tick_photosynthesis_gain = 0.0;
        let fluid_scale = (fluid.n as f32 / cfg.world_width, fluid.n as f32 / cfg.world_height);

        let brain_point = self.brain_point_index;
        for (i, point) in self.points.iter().enumerate() {
            let cell_x = ((point.pos.x * fluid_scale.0) as i64).max(0) as usize;
            let cell_y = ((point.pos.y * fluid_scale.1) as i64).max(0) as usize;
            let cell_x = cell_x.min(env.nutrient.n - 1);
            let cell_y = cell_y.min(env.nutrient.n - 1);
            let nutrient = env.nutrient.get(cell_x, cell_y) * cfg.global_nutrient_multiplier;
            let light = env.light.get(cell_x, cell_y) * cfg.global_light_multiplier;
            let cost_multiplier = 1.0 / cfg.min_nutrient.max(nutrient);

            let mut point_cost = cfg.base_existence_cost;
            let exertion_sq = point.current_exertion_level * point.current_exertion_level;
            match point.node_type {
                NodeType::Emitter => point_cost += cfg.emitter_cost * exertion_sq,
                NodeType::Swimmer => point_cost += cfg.swimmer_cost * exertion_sq,
                NodeType::Eater => point_cost += cfg.eater_cost * exertion_sq,
                NodeType::Predator => point_cost += cfg.predator_cost * exertion_sq,
                NodeType::Jet => point_cost += cfg.jet_cost * exertion_sq,
                NodeType::Photosynthetic => point_cost += cfg.photosynthetic_cost,
                NodeType::Neuron => {
                    let is_brain = brain_point == Some(i);
                    let hidden = self.brain.as_ref().map(|b| b.hidden_layer_size).unwrap_or(0);
                    point_cost += if is_brain {
                        cfg.neuron_cost_base * 5.0 + cfg.neuron_cost_per_hidden * hidden as f32
                    } else {
                        cfg.neuron_cost_base
                    };
                }
                NodeType::Eye => {}
            }
            if point.is_grabbing {
                point_cost += cfg.grabbing_cost;
            }
            if point.is_designated_eye {
                point_cost += cfg.eye_cost;
            }
            point_cost *= cost_multiplier;
            cost += point_cost;

            if matches!(point.node_type, NodeType::Photosynthetic) {
                let g = light * cfg.photosynthesis_efficiency * (point.radius / 5.0) * dt;
                gain += g;
                self.accumulators.this_tick_photosynthesis_gain += g;
                self.accumulators.lifetime_photosynthesis_gain += g;
            }

            let red = fluid.density_r[cell_y * env.nutrient.n + cell_x] / 255.0;
            poison += red * cfg.poison_strength * (point.radius / 5.0) * dt;
        }

        let prev_energy = self.creature_energy;
        self.creature_energy += gain;
        self.creature_energy -= cost * dt + poison;
        self.creature_energy = clamp(self.creature_energy, 0.0, self.current_max_energy);
        self.previous_energy_change = self.creature_energy - prev_energy;
        self.creature_energy <= 0.0
    }

    /// Phase 4: Verlet integration of springs and points, boundary handling,
    /// FLOATING entrainment, EMITTER dye injection and JET fluid injection.
    /// Returns true if the creature should be marked unstable.
    pub fn integrate(&mut self, dt: f32, fluid: &mut FluidField, cfg: &SimulationConfig) -> bool {
        let mut forces: Vec<Vec2> = self.points.iter().map(|p| p.external_force).collect();
        for spring in &self.springs {
            let (stiffness, damping) = if spring.is_rigid {
                (cfg.rigid_stiffness, cfg.rigid_damping)
            } else {
                (spring.stiffness, spring.damping)
            };
            let a = self.points[spring.p1].pos;
            let b = self.points[spring.p2].pos;
            let delta = b.sub(a);
            let dist = delta.len().max(1e-6);
            let dir = delta.scale(1.0 / dist);
            let stretch = dist - spring.rest_length;
            let spring_force = dir.scale(stiffness * stretch);

            let va = self.points[spring.p1].pos.sub(self.points[spring.p1].prev_pos).scale(1.0 / dt.max(1e-6));
            let vb = self.points[spring.p2].pos.sub(self.points[spring.p2].prev_pos).scale(1.0 / dt.max(1e-6));
            let rel_vel = vb.sub(va).dot(dir);
            let damping_force = dir.scale(damping * rel_vel);

            forces[spring.p1] = forces[spring.p1].add(spring_force.add(damping_force));
            forces[spring.p2] = forces[spring.p2].sub(spring_force.add(damping_force));

            if dist > spring.rest_length * cfg.max_stretch_factor {
                return true;
            }
        }

        let scale_x = fluid.n as f32 / cfg.world_width;
        let scale_y = fluid.n as f32 / cfg.world_height;

        for i in 0..self.points.len() {
            let is_fixed = self.points[i].is_effectively_fixed();
            if is_fixed {
                self.points[i].prev_pos = self.points[i].pos;
                continue;
            }
            let accel = forces[i].scale(self.points[i].inv_mass);
            let current = self.points[i].pos;
            let prev = self.points[i].prev_pos;
            let mut next = current.add(current.sub(prev)).add(accel.scale(dt * dt));

            if matches!(self.points[i].movement_type, MovementType::Floating) {
                let cx = ((current.x * scale_x) as i64).max(0) as usize;
                let cy = ((current.y * scale_y) as i64).max(0) as usize;
                let (fvx, fvy) = fluid.velocity_at(cx.min(fluid.n - 1), cy.min(fluid.n - 1));
                let entrain = Vec2::new(fvx, fvy).scale(dt * cfg.fluid_current_strength);
                let blended_vel = next.sub(current).scale(1.0 - cfg.body_fluid_entrainment).add(entrain.scale(cfg.body_fluid_entrainment));
                self.points[i].prev_pos = next.sub(blended_vel);
            } else {
                self.points[i].prev_pos = current;
            }

            let displacement_sq = next.sub(current).len_sq();
            if !next.is_finite() || displacement_sq > cfg.max_displacement * cfg.max_displacement {
                return true;
            }

            if cfg.world_wrapping {
                next.x = next.x.rem_euclid(cfg.world_width);
                next.y = next.y.rem_euclid(cfg.world_height);
            } else {
                let r = self.points[i].radius;
                if next.x < r {
                    next.x = r;
                    let vel = next.sub(self.points[i].prev_pos);
                    self.points[i].prev_pos.x = next.x + vel.x * cfg.restitution;
                } else if next.x > cfg.world_width - r {
                    next.x = cfg.world_width - r;
                    let vel = next.sub(self.points[i].prev_pos);
                    self.points[i].prev_pos.x = next.x + vel.x * cfg.restitution;
                }
                if next.y < r {
                    next.y = r;
                    let vel = next.sub(self.points[i].prev_pos);
                    self.points[i].prev_pos.y = next.y + vel.y * cfg.restitution;
                } else if next.y > cfg.world_height - r {
                    next.y = cfg.world_height - r;
                    let vel = next.sub(self.points[i].prev_pos);
                    self.points[i].prev_pos.y = next.y + vel.y * cfg.restitution;
                }
            }

            self.points[i].pos = next;

            if matches!(self.points[i].node_type, NodeType::Emitter) {
                let strength = cfg.emitter_dye_strength_per_exertion * self.points[i].current_exertion_level;
                let [r, g, b] = self.points[i].dye_color;
                let cx = ((next.x * scale_x) as i64).max(0) as usize;
                let cy = ((next.y * scale_y) as i64).max(0) as usize;
                fluid.add_density(cx.min(fluid.n - 1), cy.min(fluid.n - 1), r as f32, g as f32, b as f32, strength, cfg);
            }

            if matches!(self.points[i].node_type, NodeType::Jet) && self.points[i].current_exertion_level > 0.01 {
                let cx = ((next.x * scale_x) as i64).max(0) as usize;
                let cy = ((next.y * scale_y) as i64).max(0) as usize;
                let (fvx, fvy) = fluid.velocity_at(cx.min(fluid.n - 1), cy.min(fluid.n - 1));
                if fvx * fvx + fvy * fvy < self.points[i].max_effective_jet_velocity * self.points[i].max_effective_jet_velocity {
                    let jd = self.points[i].jet_data;
                    let add = Vec2::from_angle(jd.angle, jd.magnitude);
                    fluid.add_velocity(cx.min(fluid.n - 1), cy.min(fluid.n - 1), add.x, add.y, cfg);
                }
            }
        }
        false
    }

    /// Phase 6: final stability + reproduction-eligibility bookkeeping.
    /// Returns true if the creature is unstable.
    pub fn finalize_tick(&mut self, cfg: &SimulationConfig) -> bool {
        for spring in &self.springs {
            let a = self.points[spring.p1].pos;
            let b = self.points[spring.p2].pos;
            if a.sub(b).len() > spring.rest_length * cfg.max_stretch_factor {
                return true;
            }
        }
        if self.points.len() > 2 {
            let (w, h) = self.bbox();
            let limit = self.points.len() as f32 * cfg.max_span_per_point;
            if w > limit || h > limit {
                return true;
            }
        }
        self.ticks_since_birth += 1;
        if self.ticks_since_birth as f32 > self.genome.effective_reproduction_cooldown(self.points.len()) {
            self.can_reproduce = true;
        }
        self.prey_predated_this_tick.clear();
        false
    }
}

fn scan_eye(
    pos: Vec2,
    target_type: EyeTargetType,
    own_body: u64,
    grid: &BroadPhaseGrid,
    radius: f32,
) -> (bool, f32, f32) {
    let mut best_dist = f32::MAX;
    let mut best_delta = Vec2::ZERO;
    for item in grid.neighbourhood(pos) {
        let candidate_pos = match (target_type, item) {
            (EyeTargetType::Particle, GridItem::Particle { pos: p, .. }) => p,
            (EyeTargetType::ForeignBodyPoint, GridItem::SoftBodyPoint { body, pos: p, .. }) if body != own_body => p,
            _ => continue,
        };
        let delta = candidate_pos.sub(pos);
        let dist = delta.len();
        if dist < best_dist && dist <= radius {
            best_dist = dist;
            best_delta = delta;
        }
    }
    if best_dist < f32::MAX {
        let bearing = best_delta.angle() / crate::math::TAU + 0.5;
        (true, (best_dist / radius).min(1.0), bearing)
    } else {
        (false, 1.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;

    #[test]
    fn swimmer_is_never_floating() {
        let mt = coerce_swimmer_movement(NodeType::Swimmer, MovementType::Floating);
        assert!(!matches!(mt, MovementType::Floating));
    }

    #[test]
    fn activation_flat_is_constant() {
        let pattern = ActivationPattern { pattern_type: ActivationPatternType::Flat, level: 0.7, period: 10.0, phase_offset: 0.0 };
        assert_eq!(pattern.exertion_at(0.0), 0.7);
        assert_eq!(pattern.exertion_at(123.0), 0.7);
    }

    #[test]
    fn activation_pulse_is_mostly_zero() {
        let pattern = ActivationPattern { pattern_type: ActivationPatternType::Pulse, level: 1.0, period: 1.0, phase_offset: 0.0 };
        assert_eq!(pattern.exertion_at(0.5), 0.0);
        assert_eq!(pattern.exertion_at(0.05), 1.0);
    }

    #[test]
    fn effective_reproduction_cooldown_scales_with_point_count() {
        let genome = Genome {
            reproduction_cooldown_gene: 100.0,
            jet_max_velocity_gene: 20.0,
            emitter_direction: 0.0,
            num_offspring: 2,
            offspring_spawn_radius: 30.0,
            point_add_chance: 0.05,
            spring_connection_radius: 40.0,
            reproduction_energy_threshold: 50.0,
            reward_strategy: RewardStrategy::EnergyChange,
        };
        assert!(genome.effective_reproduction_cooldown(5) > genome.effective_reproduction_cooldown(1));
    }

    #[test]
    fn energy_budget_clamps_and_flags_depletion() {
        let cfg = SimulationConfig::default();
        let env = EnvironmentFields::new(cfg.grid_size, &cfg);
        let mut point = MassPoint::new(Vec2::new(10.0, 10.0), 1.0, 5.0, NodeType::Photosynthetic, MovementType::Neutral);
        point.current_exertion_level = 0.0;
        let mut creature = Creature {
            id: 1,
            parent_id: None,
            generation: 0,
            points: vec![point],
            springs: vec![],
            genome: Genome::random(&mut crate::random::StdRandomSource::new(1), &cfg),
            blueprint: Blueprint::default(),
            brain: None,
            brain_point_index: None,
            creature_energy: 0.0001,
            current_max_energy: cfg.default_max_energy,
            ticks_since_birth: 0,
            can_reproduce: false,
            just_reproduced: false,
            failed_reproduction_cooldown: 0,
            prey_predated_this_tick: HashSet::new(),
            accumulators: EnergyAccumulators::default(),
            blueprint_radius: 10.0,
            is_unstable: false,
            previous_energy_for_reward: 0.0,
            previous_energy_change: 0.0,
        };
        let fluid = FluidField::new(cfg.grid_size, false);
        let depleted = creature.energy_budget(1.0 / 60.0, &env, &fluid, &cfg);
        assert!(creature.creature_energy >= 0.0 && creature.creature_energy <= creature.current_max_energy);
        assert!(!depleted || creature.creature_energy == 0.0);
    }
}
