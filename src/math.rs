//! Vec2 and the small set of numeric kernels shared by the fluid solver,
//! the physics integrator and the brain.

use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

pub const TAU: f32 = 2.0 * PI;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn from_angle(angle: f32, magnitude: f32) -> Self {
        Self::new(angle.cos() * magnitude, angle.sin() * magnitude)
    }

    pub fn len_sq(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn len(self) -> f32 {
        self.len_sq().sqrt()
    }

    pub fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(self, s: f32) -> Vec2 {
        Vec2::new(self.x * s, self.y * s)
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn angle(self) -> f32 {
        self.y.atan2(self.x)
    }

    /// Component-wise tanh normalization, used to squash CoM position/velocity
    /// offsets into a bounded brain input without a hard clamp discontinuity.
    pub fn tanh_normalized(self, scale: f32) -> Vec2 {
        Vec2::new((self.x / scale).tanh(), (self.y / scale).tanh())
    }
}

pub fn clamp(v: f32, lo: f32, hi: f32) -> f32 {
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Sample one value from N(mean, std) using `rng` as the entropy source.
pub fn sample_gaussian(rng: &mut impl rand::Rng, mean: f32, std: f32) -> f32 {
    let std = std.max(1e-6);
    let dist = Normal::new(mean as f64, std as f64).unwrap();
    dist.sample(rng) as f32
}

/// log N(x; mean, std), used by REINFORCE to accumulate log pi(a|s).
pub fn log_pdf_gaussian(x: f32, mean: f32, std: f32) -> f32 {
    let std = std.max(1e-6);
    let z = (x - mean) / std;
    -0.5 * z * z - std.ln() - 0.5 * (TAU).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_tanh_normalized_bounds() {
        let v = Vec2::new(1000.0, -1000.0);
        let n = v.tanh_normalized(50.0);
        assert!(n.x <= 1.0 && n.x >= -1.0);
        assert!(n.y <= 1.0 && n.y >= -1.0);
    }

    #[test]
    fn clamp_respects_bounds() {
        assert_eq!(clamp(5.0, 0.0, 1.0), 1.0);
        assert_eq!(clamp(-5.0, 0.0, 1.0), 0.0);
        assert_eq!(clamp(0.5, 0.0, 1.0), 0.5);
    }

    #[test]
    fn log_pdf_peaks_at_mean() {
        let at_mean = log_pdf_gaussian(1.0, 1.0, 0.5);
        let off_mean = log_pdf_gaussian(2.0, 1.0, 0.5);
        assert!(at_mean > off_mean);
    }
}
