//! Error types for the two fallible ambient concerns: loading/saving
//! snapshots and validating a supplied config. Everything on the hot tick
//! path is infallible by construction, so no `SimError` umbrella is needed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("config (de)serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot references unknown schema version {found}, expected {expected}")]
    SchemaVersion { found: i64, expected: i64 },

    #[error("no snapshot found for world id {0}")]
    NotFound(i64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be > 0, got {value}")]
    NonPositive { field: &'static str, value: f32 },

    #[error("{low} must be < {high}, got low={low_value} high={high_value}")]
    InvertedRange { low: &'static str, high: &'static str, low_value: f32, high_value: f32 },

    #[error("population_floor ({floor}) must be <= population_ceiling ({ceiling})")]
    PopulationBounds { floor: usize, ceiling: usize },
}

impl crate::config::SimulationConfig {
    /// Sanity-checks the bounds a hand-edited config could violate. Not
    /// called on the hot path; intended for a host loading config from disk.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nutrient_min >= self.nutrient_max {
            return Err(ConfigError::InvertedRange {
                low: "nutrient_min",
                high: "nutrient_max",
                low_value: self.nutrient_min,
                high_value: self.nutrient_max,
            });
        }
        if self.light_min >= self.light_max {
            return Err(ConfigError::InvertedRange { low: "light_min", high: "light_max", low_value: self.light_min, high_value: self.light_max });
        }
        if self.hidden_layer_min >= self.hidden_layer_max {
            return Err(ConfigError::InvertedRange {
                low: "hidden_layer_min",
                high: "hidden_layer_max",
                low_value: self.hidden_layer_min as f32,
                high_value: self.hidden_layer_max as f32,
            });
        }
        if self.population_floor > self.population_ceiling {
            return Err(ConfigError::PopulationBounds { floor: self.population_floor, ceiling: self.population_ceiling });
        }
        if self.grid_size == 0 {
            return Err(ConfigError::NonPositive { field: "grid_size", value: 0.0 });
        }
        if self.cell_size <= 0.0 {
            return Err(ConfigError::NonPositive { field: "cell_size", value: self.cell_size });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;

    #[test]
    fn default_config_validates() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_nutrient_range_is_rejected() {
        let mut cfg = SimulationConfig::default();
        cfg.nutrient_min = 1.0;
        cfg.nutrient_max = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn floor_above_ceiling_is_rejected() {
        let mut cfg = SimulationConfig::default();
        cfg.population_floor = 200;
        cfg.population_ceiling = 100;
        assert!(matches!(cfg.validate(), Err(ConfigError::PopulationBounds { .. })));
    }
}
