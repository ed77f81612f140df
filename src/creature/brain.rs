//! Single hidden-layer stochastic policy network. Inputs come from sensors,
//! each output slot is a (mean, rawStdDev) pair sampled as a Gaussian action;
//! the policy is trained online by REINFORCE over a bounded experience
//! buffer.

use crate::config::SimulationConfig;
use crate::math::{clamp, log_pdf_gaussian, sample_gaussian};
use crate::random::RandomSource;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// Each action slot is a (mean, rawStdDev) pair, so every raw-output count
// below is twice the number of actuator slots it names.
pub const OUT_EMITTER: usize = 8; // R, G, B, exertion: 4 slots
pub const OUT_SWIMMER: usize = 6; // magnitude, direction, exertion: 3 slots
pub const OUT_EATER: usize = 2; // exertion: 1 slot
pub const OUT_PREDATOR: usize = 2; // exertion: 1 slot
pub const OUT_JET: usize = 6; // magnitude, angle, exertion: 3 slots
pub const OUT_GRABBER: usize = 2; // toggle: 1 slot

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDetail {
    pub label: String,
    pub mean: f32,
    pub std_dev: f32,
    pub sampled_action: f32,
    pub log_prob: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub state: Vec<f32>,
    pub action_details: Vec<ActionDetail>,
    pub reward: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brain {
    pub hidden_layer_size: usize,
    pub input_vector_size: usize,
    pub output_vector_size: usize,
    pub weights_ih: Vec<f32>, // H x I, row-major
    pub biases_h: Vec<f32>,
    pub weights_ho: Vec<f32>, // O x H, row-major
    pub biases_o: Vec<f32>,
    pub raw_outputs: Vec<f32>,
    pub current_frame_action_details: Vec<ActionDetail>,
    pub current_frame_input_vector_with_labels: Vec<(String, f32)>,
    #[serde(skip)]
    pub experience_buffer: VecDeque<Experience>,
    pub frames_since_last_train: u32,
    pub previous_energy_for_reward: f32,
    pub previous_energy_change_for_nn: f32,
    pub max_experience_buffer_size: usize,
    pub last_avg_normalized_reward: f32,
}

impl Brain {
    pub fn new(hidden_layer_size: usize, input_vector_size: usize, output_vector_size: usize, cfg: &SimulationConfig) -> Self {
        let mut seed = StdSeed::new(hidden_layer_size as u64 * 7919 + input_vector_size as u64 * 104729 + output_vector_size as u64);
        let weights_ih = (0..hidden_layer_size * input_vector_size).map(|i| seed.small(i)).collect();
        let weights_ho = (0..output_vector_size * hidden_layer_size).map(|i| seed.small(i + 1000)).collect();
        Self {
            hidden_layer_size,
            input_vector_size,
            output_vector_size,
            weights_ih,
            biases_h: vec![0.0; hidden_layer_size],
            weights_ho,
            biases_o: vec![0.0; output_vector_size],
            raw_outputs: vec![0.0; output_vector_size],
            current_frame_action_details: Vec::new(),
            current_frame_input_vector_with_labels: Vec::new(),
            experience_buffer: VecDeque::with_capacity(cfg.max_experience_buffer_size),
            frames_since_last_train: 0,
            previous_energy_for_reward: 0.0,
            previous_energy_change_for_nn: 0.0,
            max_experience_buffer_size: cfg.max_experience_buffer_size,
            last_avg_normalized_reward: 0.0,
        }
    }

    fn hidden_preactivations(&self, input: &[f32]) -> Vec<f32> {
        let mut h = vec![0.0f32; self.hidden_layer_size];
        for r in 0..self.hidden_layer_size {
            let mut sum = self.biases_h[r];
            for c in 0..self.input_vector_size {
                sum += self.weights_ih[r * self.input_vector_size + c] * input.get(c).copied().unwrap_or(0.0);
            }
            h[r] = sum;
        }
        h
    }

    /// Feed-forward pass: h = tanh(W_IH*x + b_H); y = W_HO*h + b_O.
    pub fn forward(&mut self, input: &[f32]) -> Vec<f32> {
        let pre_h = self.hidden_preactivations(input);
        let h: Vec<f32> = pre_h.iter().map(|v| v.tanh()).collect();
        let mut y = vec![0.0f32; self.output_vector_size];
        for r in 0..self.output_vector_size {
            let mut sum = self.biases_o[r];
            for c in 0..self.hidden_layer_size {
                sum += self.weights_ho[r * self.hidden_layer_size + c] * h[c];
            }
            y[r] = sum;
        }
        self.raw_outputs = y.clone();
        y
    }

    /// Sample one Gaussian action per (mean, rawStdDev) output pair, record
    /// logProb, and return the sampled actions in slot order.
    pub fn sample_actions(&mut self, labels: &[&str], cfg: &SimulationConfig, rng: &mut dyn RandomSource) -> Vec<f32> {
        let mut actions = Vec::with_capacity(self.output_vector_size / 2);
        let mut details = Vec::with_capacity(self.output_vector_size / 2);
        let mut pair = 0;
        while pair * 2 + 1 < self.output_vector_size {
            let mean = self.raw_outputs[pair * 2];
            let raw_std = self.raw_outputs[pair * 2 + 1];
            let std_dev = raw_std.exp() + cfg.std_dev_epsilon;
            let sampled = sample_gaussian(&mut RngAdapter(rng), mean, std_dev);
            let log_prob = log_pdf_gaussian(sampled, mean, std_dev);
            let label = labels.get(pair).copied().unwrap_or("action").to_string();
            details.push(ActionDetail { label, mean, std_dev, sampled_action: sampled, log_prob });
            actions.push(sampled);
            pair += 1;
        }
        self.current_frame_action_details = details;
        actions
    }

    pub fn record_experience(&mut self, state: Vec<f32>, reward: f32) {
        if self.experience_buffer.len() >= self.max_experience_buffer_size {
            self.experience_buffer.pop_front();
        }
        self.experience_buffer.push_back(Experience {
            state,
            action_details: self.current_frame_action_details.clone(),
            reward,
        });
    }

    pub fn buffer_full(&self) -> bool {
        self.experience_buffer.len() >= self.max_experience_buffer_size
    }

    /// REINFORCE update: discounted, baseline-normalized returns; gradient of
    /// log pi(a|s) w.r.t mean and rawStdDev; backprop through tanh; apply.
    pub fn train(&mut self, cfg: &SimulationConfig) {
        if self.experience_buffer.is_empty() {
            return;
        }
        let n = self.experience_buffer.len();
        let mut returns = vec![0.0f32; n];
        let mut running = 0.0f32;
        for t in (0..n).rev() {
            running = self.experience_buffer[t].reward + cfg.discount_factor_gamma * running;
            returns[t] = running;
        }
        let mean_return = returns.iter().sum::<f32>() / n as f32;
        let variance = returns.iter().map(|r| (r - mean_return).powi(2)).sum::<f32>() / n as f32;
        let std_return = variance.sqrt().max(1e-6);
        let normalized: Vec<f32> = returns.iter().map(|r| (r - mean_return) / (std_return + 1e-6)).collect();
        self.last_avg_normalized_reward = normalized.iter().sum::<f32>() / n as f32;

        let mut grad_ih = vec![0.0f32; self.weights_ih.len()];
        let mut grad_bh = vec![0.0f32; self.biases_h.len()];
        let mut grad_ho = vec![0.0f32; self.weights_ho.len()];
        let mut grad_bo = vec![0.0f32; self.biases_o.len()];

        for (t, exp) in self.experience_buffer.iter().enumerate() {
            let advantage = normalized[t];
            let pre_h = self.hidden_preactivations(&exp.state);
            let h: Vec<f32> = pre_h.iter().map(|v| v.tanh()).collect();

            let pairs = exp.action_details.len().min(self.output_vector_size / 2);
            let mut d_y = vec![0.0f32; self.output_vector_size];
            for slot in 0..pairs {
                let detail = &exp.action_details[slot];
                let std_dev = detail.std_dev;
                let d_mean = (detail.sampled_action - detail.mean) / (std_dev * std_dev) * advantage;
                // d/dsigma log N(x;mean,sigma) = [(x-mean)^2 - sigma^2] / sigma^3.
                let d_raw_std = ((detail.sampled_action - detail.mean).powi(2) / (std_dev * std_dev) - 1.0)
                    * advantage
                    * (std_dev - cfg.std_dev_epsilon)
                    / std_dev;
                d_y[slot * 2] = d_mean;
                d_y[slot * 2 + 1] = d_raw_std;
            }

            for r in 0..self.output_vector_size {
                grad_bo[r] += d_y[r];
                for c in 0..self.hidden_layer_size {
                    grad_ho[r * self.hidden_layer_size + c] += d_y[r] * h[c];
                }
            }

            let mut d_h = vec![0.0f32; self.hidden_layer_size];
            for c in 0..self.hidden_layer_size {
                let mut sum = 0.0;
                for r in 0..self.output_vector_size {
                    sum += d_y[r] * self.weights_ho[r * self.hidden_layer_size + c];
                }
                d_h[c] = sum * (1.0 - h[c] * h[c]); // d(tanh)/dy
            }
            for r in 0..self.hidden_layer_size {
                grad_bh[r] += d_h[r];
                for c in 0..self.input_vector_size {
                    grad_ih[r * self.input_vector_size + c] += d_h[r] * exp.state.get(c).copied().unwrap_or(0.0);
                }
            }
        }

        let scale = cfg.learning_rate / n as f32;
        for (w, g) in self.weights_ih.iter_mut().zip(grad_ih.iter()) {
            *w += scale * g;
        }
        for (w, g) in self.biases_h.iter_mut().zip(grad_bh.iter()) {
            *w += scale * g;
        }
        for (w, g) in self.weights_ho.iter_mut().zip(grad_ho.iter()) {
            *w += scale * g;
        }
        for (w, g) in self.biases_o.iter_mut().zip(grad_bo.iter()) {
            *w += scale * g;
        }

        self.experience_buffer.clear();
        self.frames_since_last_train = 0;
    }

    pub fn weights_ho_norm(&self) -> f32 {
        self.weights_ho.iter().map(|w| w * w).sum::<f32>().sqrt()
    }
}

/// Deterministic small alternating-sign initializer, avoiding an all-zero
/// start (which would make every hidden unit identical under tanh).
struct StdSeed(u64);
impl StdSeed {
    fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(2654435761).wrapping_add(1))
    }
    fn small(&mut self, i: usize) -> f32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let sign = if (self.0 >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        let _ = i;
        sign * 0.1
    }
}

/// Adapts a `&mut dyn RandomSource` into the `rand::Rng`-shaped call that
/// `sample_gaussian` expects, without exposing a second RNG abstraction.
struct RngAdapter<'a>(&'a mut dyn RandomSource);
impl<'a> rand::RngCore for RngAdapter<'a> {
    fn next_u32(&mut self) -> u32 {
        (self.0.uniform() * u32::MAX as f32) as u32
    }
    fn next_u64(&mut self) -> u64 {
        ((self.next_u32() as u64) << 32) | self.next_u32() as u64
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let v = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&v[..chunk.len()]);
        }
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

pub fn clamp_output(v: f32) -> f32 {
    clamp(v, -10.0, 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::StdRandomSource;

    #[test]
    fn forward_pass_produces_expected_output_len() {
        let cfg = SimulationConfig::default();
        let mut brain = Brain::new(6, 8, 4, &cfg);
        let out = brain.forward(&vec![0.1; 8]);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn training_moves_weights_when_buffer_is_full() {
        let cfg = SimulationConfig::default();
        let mut brain = Brain::new(4, 5, 2, &cfg);
        let mut rng = StdRandomSource::new(9);
        for _ in 0..cfg.max_experience_buffer_size {
            brain.forward(&vec![0.2; 5]);
            brain.sample_actions(&["a"], &cfg, &mut rng);
            brain.record_experience(vec![0.2; 5], 1.0);
        }
        let before = brain.weights_ho_norm();
        brain.train(&cfg);
        let after = brain.weights_ho_norm();
        assert!((after - before).abs() > 0.0);
        assert!(brain.experience_buffer.is_empty());
    }

    #[test]
    fn tolerates_action_detail_length_skew() {
        let cfg = SimulationConfig::default();
        let mut brain = Brain::new(4, 5, 4, &cfg);
        brain.forward(&vec![0.1; 5]);
        // Simulate a topology change: fewer action_details than current output slots.
        brain.experience_buffer.push_back(Experience {
            state: vec![0.1; 5],
            action_details: vec![ActionDetail { label: "a".into(), mean: 0.0, std_dev: 1.0, sampled_action: 0.5, log_prob: -1.0 }],
            reward: 1.0,
        });
        brain.train(&cfg); // must not panic
    }
}
