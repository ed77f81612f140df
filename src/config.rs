//! Every tunable constant named in the component design, grouped by
//! subsystem the way the aquarium's own config was grouped.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    // --- World ---
    pub world_width: f32,
    pub world_height: f32,
    pub world_wrapping: bool,
    pub population_floor: usize,
    pub population_ceiling: usize,
    pub particle_floor: usize,
    pub reproduction_allowed: bool,

    // --- Fluid grid ---
    pub grid_size: usize,
    pub diffusion_velocity: f32,
    pub diffusion_dye: f32,
    pub fade_rate: f32,
    pub dye_pull_rate: f32,
    pub max_fluid_velocity_component: f32,
    pub solver_iterations_velocity: u32,
    pub solver_iterations_pressure: u32,
    pub solver_iterations_density: u32,

    // --- Scalar fields ---
    pub nutrient_min: f32,
    pub nutrient_max: f32,
    pub global_nutrient_multiplier: f32,
    pub light_min: f32,
    pub light_max: f32,
    pub global_light_multiplier: f32,
    pub viscosity_min: f32,
    pub viscosity_max: f32,
    pub min_nutrient: f32,

    // --- Broad phase ---
    pub cell_size: f32,

    // --- Particles ---
    pub particles_per_second: f32,
    pub particle_fluid_influence: f32,
    pub particle_jitter: f32,
    pub energy_per_particle: f32,

    // --- Physics / stability ---
    pub max_stretch_factor: f32,
    pub max_span_per_point: f32,
    pub max_displacement: f32,
    pub repulsion_radius_factor: f32,
    pub repulsion_strength: f32,
    pub restitution: f32,
    pub body_fluid_entrainment: f32,
    pub fluid_current_strength: f32,
    pub rigid_stiffness: f32,
    pub rigid_damping: f32,

    // --- Eyes / sensors ---
    pub eye_detection_radius: f32,
    pub fluid_sensor_inputs: usize,
    pub eye_inputs: usize,
    pub neural_input_size: usize,

    // --- Actuators ---
    pub max_swimmer_mag: f32,
    pub max_jet_mag: f32,
    pub emitter_dye_strength_per_exertion: f32,

    // --- Predation / eating ---
    pub predation_radius_base: f32,
    pub predation_radius_bonus: f32,
    pub energy_sapped_base: f32,
    pub energy_sapped_bonus: f32,
    pub eating_radius_base: f32,
    pub eating_radius_bonus: f32,

    // --- Energy budget ---
    pub base_existence_cost: f32,
    pub emitter_cost: f32,
    pub swimmer_cost: f32,
    pub eater_cost: f32,
    pub predator_cost: f32,
    pub jet_cost: f32,
    pub photosynthetic_cost: f32,
    pub neuron_cost_base: f32,
    pub neuron_cost_per_hidden: f32,
    pub grabbing_cost: f32,
    pub eye_cost: f32,
    pub photosynthesis_efficiency: f32,
    pub poison_strength: f32,
    pub default_max_energy: f32,

    // --- Brain / RL ---
    pub neuron_chance: f32,
    pub hidden_layer_min: usize,
    pub hidden_layer_max: usize,
    pub std_dev_epsilon: f32,
    pub training_interval_frames: u32,
    pub discount_factor_gamma: f32,
    pub learning_rate: f32,
    pub max_experience_buffer_size: usize,
    pub repro_reward: f32,
    pub particle_proximity_scale: f32,
    pub energy_second_derivative_scale: f32,
    pub random_impulse_chance: f32,
    pub random_impulse_magnitude: f32,

    // --- Mutation ---
    pub mutation_rate_percent: f32,
    pub global_mutation_rate_modifier: f32,
    pub structural_mutation_chance: f32,
    pub point_add_chance_default: f32,
    pub min_springs_on_add: usize,
    pub max_springs_on_add: usize,
    pub body_scale_mutation_factor: f32,

    // --- Reproduction ---
    pub offspring_initial_share: f32,
    pub offspring_placement_attempts: u32,
    pub clearance: f32,
    pub reproduction_additional_cost_factor: f32,
    pub failed_reproduction_cooldown_ticks: u32,
    pub reproduction_cooldown_point_factor: f32,
    pub default_reproduction_energy_threshold: f32,
    pub default_num_offspring: u32,
    pub default_offspring_spawn_radius: f32,
    pub default_spring_connection_radius: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            world_width: 800.0,
            world_height: 600.0,
            world_wrapping: false,
            population_floor: 8,
            population_ceiling: 120,
            particle_floor: 40,
            reproduction_allowed: true,

            grid_size: 64,
            diffusion_velocity: 0.0001,
            diffusion_dye: 0.00005,
            fade_rate: 0.002,
            dye_pull_rate: 0.12,
            max_fluid_velocity_component: 12.0,
            solver_iterations_velocity: 4,
            solver_iterations_pressure: 6,
            solver_iterations_density: 4,

            nutrient_min: 0.0,
            nutrient_max: 1.0,
            global_nutrient_multiplier: 1.0,
            light_min: 0.0,
            light_max: 1.0,
            global_light_multiplier: 1.0,
            viscosity_min: 0.5,
            viscosity_max: 2.0,
            min_nutrient: 0.05,

            cell_size: 25.0,

            particles_per_second: 6.0,
            particle_fluid_influence: 0.2,
            particle_jitter: 0.05,
            energy_per_particle: 4.0,

            max_stretch_factor: 1.5,
            max_span_per_point: 40.0,
            max_displacement: 60.0,
            repulsion_radius_factor: 1.1,
            repulsion_strength: 40.0,
            restitution: 0.4,
            body_fluid_entrainment: 0.15,
            fluid_current_strength: 1.0,
            rigid_stiffness: 400.0,
            rigid_damping: 20.0,

            eye_detection_radius: 120.0,
            fluid_sensor_inputs: 2,
            eye_inputs: 3,
            neural_input_size: 10,

            max_swimmer_mag: 60.0,
            max_jet_mag: 40.0,
            emitter_dye_strength_per_exertion: 50.0,

            predation_radius_base: 3.0,
            predation_radius_bonus: 4.0,
            energy_sapped_base: 2.0,
            energy_sapped_bonus: 6.0,
            eating_radius_base: 1.0,
            eating_radius_bonus: 3.0,

            base_existence_cost: 0.01,
            emitter_cost: 0.02,
            swimmer_cost: 0.05,
            eater_cost: 0.02,
            predator_cost: 0.03,
            jet_cost: 0.06,
            photosynthetic_cost: 0.005,
            neuron_cost_base: 0.002,
            neuron_cost_per_hidden: 0.0004,
            grabbing_cost: 0.01,
            eye_cost: 0.005,
            photosynthesis_efficiency: 0.5,
            poison_strength: 0.4,
            default_max_energy: 100.0,

            neuron_chance: 0.15,
            hidden_layer_min: 4,
            hidden_layer_max: 16,
            std_dev_epsilon: 1e-3,
            training_interval_frames: 120,
            discount_factor_gamma: 0.95,
            learning_rate: 0.01,
            max_experience_buffer_size: 120,
            repro_reward: 5.0,
            particle_proximity_scale: 1.0,
            energy_second_derivative_scale: 10.0,
            random_impulse_chance: 0.02,
            random_impulse_magnitude: 20.0,

            mutation_rate_percent: 0.2,
            global_mutation_rate_modifier: 1.0,
            structural_mutation_chance: 0.08,
            point_add_chance_default: 0.05,
            min_springs_on_add: 1,
            max_springs_on_add: 3,
            body_scale_mutation_factor: 0.1,

            offspring_initial_share: 0.3,
            offspring_placement_attempts: 12,
            clearance: 4.0,
            reproduction_additional_cost_factor: 0.25,
            failed_reproduction_cooldown_ticks: 180,
            reproduction_cooldown_point_factor: 0.2,
            default_reproduction_energy_threshold: 60.0,
            default_num_offspring: 2,
            default_offspring_spawn_radius: 30.0,
            default_spring_connection_radius: 50.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bounds() {
        let cfg = SimulationConfig::default();
        assert!(cfg.nutrient_min < cfg.nutrient_max);
        assert!(cfg.light_min < cfg.light_max);
        assert!(cfg.hidden_layer_min < cfg.hidden_layer_max);
        assert!(cfg.max_fluid_velocity_component > 0.0);
    }
}
