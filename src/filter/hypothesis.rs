//! Externally supplied pose hypotheses for guided resampling.

use serde::{Deserialize, Serialize};

use crate::core::types::{Covariance2D, Pose2D};

/// A candidate pose region from an external source (a teammate robot's
/// observation, a beacon fix, a place-recognition hit).
///
/// Convention inherited from the upstream multi-robot pipeline and kept
/// for output parity: the diagonal of the 2x2 (x, y) block of `cov`
/// carries **standard deviations**, not variances, and the injection
/// sampler consumes `cov[0][1] / (cov[0][0] * cov[1][1])` as the
/// correlation coefficient. Producers must encode accordingly; the
/// filter uses the stored values as-is, including degenerate ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseHypothesis {
    /// Mean pose of the hypothesis.
    pub mean: Pose2D,
    /// Spread of the hypothesis; see the type-level convention note.
    pub cov: Covariance2D,
}

impl PoseHypothesis {
    /// Hypothesis with uncorrelated axis spreads.
    ///
    /// `sigma_x` and `sigma_y` are standard deviations in meters, stored
    /// per the type-level convention.
    pub fn isotropic(mean: Pose2D, sigma_x: f32, sigma_y: f32) -> Self {
        Self {
            mean,
            cov: Covariance2D::diagonal(sigma_x, sigma_y, 0.0),
        }
    }
}
