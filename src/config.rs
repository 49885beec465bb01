//! Filter configuration and validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Heading distribution used when initializing from a map.
///
/// `Uniform` is the sensible default for global localization; `Zero`
/// reproduces deployments where an external compass pins the heading
/// before the first sensor update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HeadingInit {
    /// Uniform over [-π, π).
    Uniform,
    /// All samples face along +x.
    Zero,
    /// All samples share the given heading (radians).
    Fixed(f32),
}

/// Configuration for the adaptive particle filter.
///
/// The KLD parameters control the adaptive population size: `pop_err` is
/// the maximum allowed error between the true and estimated distribution,
/// and `pop_z` the upper standard normal quantile for (1 - p), where p is
/// the probability the estimation error stays below `pop_err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Lower bound on the adaptive sample count.
    pub min_samples: usize,

    /// Upper bound on the sample count; also the capacity of both
    /// sample buffers.
    pub max_samples: usize,

    /// Capacity reserved for injected samples during the map- and
    /// hypothesis-guided resampling passes.
    pub overhead_samples: usize,

    /// KLD population error bound. Typical: 0.01-0.05.
    pub pop_err: f64,

    /// KLD upper standard normal quantile. Typical: 3 (p ≈ 0.999).
    pub pop_z: f64,

    /// Heading distribution for map-uniform initialization.
    pub init_heading: HeadingInit,

    /// Random seed for deterministic behavior (0 for entropy).
    pub seed: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_samples: 100,
            max_samples: 5000,
            overhead_samples: 500,
            pop_err: 0.01,
            pop_z: 3.0,
            init_heading: HeadingInit::Uniform,
            seed: 0,
        }
    }
}

impl FilterConfig {
    /// Configuration for pose tracking: small population, no injection
    /// reserve.
    pub fn tracking() -> Self {
        Self {
            min_samples: 50,
            max_samples: 1000,
            overhead_samples: 0,
            ..Default::default()
        }
    }

    /// Configuration for global localization over a building-scale map.
    pub fn global_localization() -> Self {
        Self {
            min_samples: 500,
            max_samples: 20000,
            overhead_samples: 2000,
            ..Default::default()
        }
    }

    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_samples == 0 {
            return Err(ConfigError::ZeroMinSamples);
        }
        if self.max_samples < self.min_samples {
            return Err(ConfigError::SampleBoundsInverted {
                min: self.min_samples,
                max: self.max_samples,
            });
        }
        if self.overhead_samples >= self.max_samples {
            return Err(ConfigError::OverheadTooLarge {
                overhead: self.overhead_samples,
                max: self.max_samples,
            });
        }
        if !(self.pop_err > 0.0) {
            return Err(ConfigError::NonPositivePopErr(self.pop_err));
        }
        if !(self.pop_z > 0.0) {
            return Err(ConfigError::NonPositivePopZ(self.pop_z));
        }
        Ok(())
    }
}

/// Filter configuration error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// min_samples of zero would make every KLD clamp degenerate
    #[error("min_samples must be at least 1")]
    ZeroMinSamples,

    /// Sample bounds out of order
    #[error("max_samples ({max}) must be >= min_samples ({min})")]
    SampleBoundsInverted { min: usize, max: usize },

    /// No room left for the importance-resampling pass
    #[error("overhead_samples ({overhead}) must be smaller than max_samples ({max})")]
    OverheadTooLarge { overhead: usize, max: usize },

    /// KLD error bound must be positive
    #[error("pop_err must be positive, got {0}")]
    NonPositivePopErr(f64),

    /// KLD quantile must be positive
    #[error("pop_z must be positive, got {0}")]
    NonPositivePopZ(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(FilterConfig::default().validate().is_ok());
        assert!(FilterConfig::tracking().validate().is_ok());
        assert!(FilterConfig::global_localization().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let config = FilterConfig {
            min_samples: 200,
            max_samples: 100,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::SampleBoundsInverted { min: 200, max: 100 })
        );
    }

    #[test]
    fn test_rejects_zero_min() {
        let config = FilterConfig {
            min_samples: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroMinSamples));
    }

    #[test]
    fn test_rejects_oversized_overhead() {
        let config = FilterConfig {
            max_samples: 1000,
            overhead_samples: 1000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OverheadTooLarge { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_kld_params() {
        let config = FilterConfig {
            pop_err: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositivePopErr(_))
        ));

        let config = FilterConfig {
            pop_z: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositivePopZ(_))
        ));
    }

    #[test]
    fn test_presets_ordering() {
        let tracking = FilterConfig::tracking();
        let global = FilterConfig::global_localization();
        assert!(tracking.max_samples < global.max_samples);
        assert!(global.overhead_samples > 0);
    }
}
