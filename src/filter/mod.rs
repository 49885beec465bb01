//! Adaptive particle filter orchestration.
//!
//! # Components
//!
//! - [`Sample`] / [`SampleSet`]: weighted pose hypotheses with attached
//!   histogram and cluster table
//! - [`kld`]: the Fox resample-limit formulas driving the adaptive
//!   population size
//! - [`PoseHypothesis`]: externally supplied Gaussians for guided
//!   injection
//! - [`ParticleFilter`]: the double-buffered filter with its init,
//!   update, and resampling operations

mod hypothesis;
pub mod kld;
mod particle_filter;
mod sample_set;

pub use hypothesis::PoseHypothesis;
pub use particle_filter::ParticleFilter;
pub use sample_set::{Cluster, Sample, SampleSet, MAX_CLUSTERS};
