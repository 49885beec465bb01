//! Foundation types and math shared by every other module.

pub mod math;
pub mod types;

pub use types::{Covariance2D, Pose2D};
