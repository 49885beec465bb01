//! DishaMCL - Adaptive Monte Carlo Localization for indoor robots
//!
//! A KLD-sampling particle filter: the population of weighted pose
//! hypotheses grows and shrinks with the uncertainty of the posterior,
//! and connected-component clustering over a pose histogram reports one
//! covariance-annotated estimate per surviving mode.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    filter/                          │  ← Orchestration
//! │   (double-buffered sample sets, KLD resampling,     │
//! │    cluster statistics, hypothesis injection)        │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │              histogram / sampling                   │  ← Data structures
//! │   (kd-tree pose histogram, categorical + Gaussian   │
//! │    + free-space samplers)                           │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                 core / map / config                 │  ← Foundation
//! │   (Pose2D, Covariance2D, OccupancyMap trait,        │
//! │    FilterConfig)                                    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The filter owns no map and no models. The occupancy map is consumed
//! through the narrow [`OccupancyMap`] trait, and the motion and sensor
//! models are closures the caller passes into [`ParticleFilter::update_action`]
//! and [`ParticleFilter::update_sensor`].
//!
//! # Example
//!
//! ```ignore
//! use disha_mcl::{Covariance2D, FilterConfig, ParticleFilter, Pose2D};
//!
//! let mut filter = ParticleFilter::new(FilterConfig::default())?;
//! filter.init_gaussian(start_pose, &Covariance2D::diagonal(0.5, 0.5, 0.2));
//!
//! loop {
//!     // Odometry arrived: the motion model perturbs every pose
//!     filter.update_action(|samples| motion_model.apply(delta, samples));
//!
//!     // Scan arrived: the sensor model rewrites the weights
//!     let sum_sq = filter.update_sensor(|samples| sensor_model.weigh(&scan, samples));
//!
//!     if 1.0 / sum_sq < 0.5 * filter.sample_count() as f64 {
//!         filter.resample_map(&map);
//!     }
//!
//!     let estimate = filter.best_cluster();
//! }
//! ```

// ============================================================================
// Layer 1: Foundation (no internal deps)
// ============================================================================
pub mod config;
pub mod core;
pub mod map;

// ============================================================================
// Layer 2: Data structures (depend on core)
// ============================================================================
pub mod histogram;
pub mod sampling;

// ============================================================================
// Layer 3: Filter orchestration (depends on everything below)
// ============================================================================
pub mod filter;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

pub use crate::core::types::{Covariance2D, Pose2D};

pub use config::{ConfigError, FilterConfig, HeadingInit};
pub use map::OccupancyMap;

pub use histogram::PoseHistogram;
pub use sampling::{Categorical, GaussianPoseSampler};

pub use filter::{Cluster, ParticleFilter, PoseHypothesis, Sample, SampleSet};
