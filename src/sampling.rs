//! Sampling primitives for the particle filter.
//!
//! Everything here draws from a caller-supplied RNG; the filter owns one
//! `SmallRng` for its whole lifetime and threads it through these
//! helpers, so a fixed seed reproduces an entire run.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal, Uniform};

use crate::core::types::{Covariance2D, Pose2D};
use crate::map::OccupancyMap;

/// Discrete distribution over sample indices, built from a weight vector.
///
/// Sampling is an inverse-CDF binary search over the prefix sums, O(log n)
/// per draw. Weights must be nonnegative; a zero total makes every draw
/// undefined (the all-zero CDF clamps every draw to the last index).
#[derive(Debug, Clone)]
pub struct Categorical {
    cdf: Vec<f64>,
}

impl Categorical {
    /// Build the prefix-sum table. O(n).
    pub fn from_weights(weights: &[f64]) -> Self {
        let mut cdf = Vec::with_capacity(weights.len());
        let mut sum = 0.0;
        for &w in weights {
            debug_assert!(w >= 0.0, "categorical weight must be nonnegative: {}", w);
            sum += w;
            cdf.push(sum);
        }
        Self { cdf }
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.cdf.last().copied().unwrap_or(0.0)
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.cdf.len()
    }

    /// True if the distribution has no categories.
    pub fn is_empty(&self) -> bool {
        self.cdf.is_empty()
    }

    /// Draw an index with probability proportional to its weight.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        let u = rng.gen::<f64>() * self.total();
        // First bucket whose cumulative weight exceeds u; zero-weight
        // entries are flat spots in the CDF and are skipped over.
        self.cdf
            .partition_point(|&c| c <= u)
            .min(self.cdf.len().saturating_sub(1))
    }
}

/// Draws poses from a Gaussian over (x, y, theta).
///
/// The (x, y) components are drawn jointly through the Cholesky factor of
/// the 2x2 position block; theta is drawn independently from its own
/// variance. Off-diagonal terms coupling theta to position are ignored.
#[derive(Debug, Clone)]
pub struct GaussianPoseSampler {
    mean: Pose2D,
    l11: f64,
    l21: f64,
    l22: f64,
    sigma_theta: f64,
}

impl GaussianPoseSampler {
    /// Factor the position block of `cov`. Non-positive-definite inputs
    /// are clamped axis by axis rather than rejected.
    pub fn new(mean: Pose2D, cov: &Covariance2D) -> Self {
        let a = (cov.var_x() as f64).max(0.0);
        let b = cov.get(0, 1) as f64;
        let d = (cov.var_y() as f64).max(0.0);

        let l11 = a.sqrt();
        let l21 = if l11 > 0.0 { b / l11 } else { 0.0 };
        let l22 = (d - l21 * l21).max(0.0).sqrt();
        let sigma_theta = (cov.var_theta() as f64).max(0.0).sqrt();

        Self {
            mean,
            l11,
            l21,
            l22,
            sigma_theta,
        }
    }

    /// Draw one pose.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Pose2D {
        let z1: f64 = rng.sample(StandardNormal);
        let z2: f64 = rng.sample(StandardNormal);
        let z3: f64 = rng.sample(StandardNormal);
        Pose2D::new(
            self.mean.x + (self.l11 * z1) as f32,
            self.mean.y + (self.l21 * z1 + self.l22 * z2) as f32,
            self.mean.theta + (self.sigma_theta * z3) as f32,
        )
    }
}

/// Draw a zero-mean correlated (x, y) pair from standard deviations and a
/// correlation coefficient.
pub fn sample_correlated_xy<R: Rng>(
    rng: &mut R,
    sigma_x: f64,
    sigma_y: f64,
    rho: f64,
) -> (f64, f64) {
    let z1: f64 = rng.sample(StandardNormal);
    let z2: f64 = rng.sample(StandardNormal);
    let x = sigma_x * z1;
    let y = sigma_y * (rho * z1 + (1.0 - rho * rho).sqrt() * z2);
    (x, y)
}

/// Draw a position uniformly over the map extent, rejecting until it
/// lands on a known-free cell.
///
/// Loops forever on a map with no free cells; the caller guarantees at
/// least one exists.
pub fn sample_free_position<M: OccupancyMap + ?Sized, R: Rng>(map: &M, rng: &mut R) -> (f32, f32) {
    loop {
        let x = (rng.gen::<f32>() - 0.5) * map.world_width();
        let y = (rng.gen::<f32>() - 0.5) * map.world_height();
        if map.is_free(x, y) {
            return (x, y);
        }
    }
}

/// Draw a heading uniformly over [-π, π).
pub fn sample_uniform_heading<R: Rng>(rng: &mut R) -> f32 {
    Uniform::new(-std::f32::consts::PI, std::f32::consts::PI).sample(rng)
}
