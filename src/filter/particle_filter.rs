//! Double-buffered adaptive particle filter.
//!
//! The filter holds two sample sets and ping-pongs between them: every
//! resampling pass draws from the current set into the scratch set, then
//! flips the current index. The flip is the single point where the "old"
//! posterior becomes the "new" one; queries before the flip see the
//! pre-resample distribution.
//!
//! Motion and sensor models are caller-supplied closures over the live
//! sample slice, so the filter stays agnostic of odometry formats and
//! scan likelihoods. The sample count adapts per resampling pass via
//! KLD-sampling over the scratch set's pose histogram.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::{ConfigError, FilterConfig, HeadingInit};
use crate::core::types::{Covariance2D, Pose2D};
use crate::map::OccupancyMap;
use crate::sampling::{
    sample_correlated_xy, sample_free_position, sample_uniform_heading, Categorical,
    GaussianPoseSampler,
};

use super::kld::{resample_limit, resample_limit_relaxed};
use super::sample_set::{Sample, SampleSet};
use super::{Cluster, PoseHypothesis};

/// Adaptive Monte Carlo localization filter.
#[derive(Debug)]
pub struct ParticleFilter {
    config: FilterConfig,
    sets: [SampleSet; 2],
    current: usize,
    rng: SmallRng,
    sum_sq_weights: f64,
}

impl ParticleFilter {
    /// Create a filter with both sample buffers allocated at
    /// `max_samples` capacity and uniform weights.
    pub fn new(config: FilterConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let rng = if config.seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(config.seed)
        };

        let sets = [
            SampleSet::new(config.max_samples),
            SampleSet::new(config.max_samples),
        ];

        Ok(Self {
            config,
            sets,
            current: 0,
            rng,
            sum_sq_weights: 0.0,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// The current sample set.
    pub fn current_set(&self) -> &SampleSet {
        &self.sets[self.current]
    }

    /// The current sample set, mutable, for external clustering passes.
    ///
    /// Callers that rewrite samples must [`SampleSet::recluster`] before
    /// reading cluster statistics again.
    pub fn current_set_mut(&mut self) -> &mut SampleSet {
        &mut self.sets[self.current]
    }

    /// Live samples of the current set.
    pub fn samples(&self) -> &[Sample] {
        self.current_set().samples()
    }

    /// Number of live samples in the current set.
    pub fn sample_count(&self) -> usize {
        self.current_set().len()
    }

    /// Clusters of the current set.
    pub fn clusters(&self) -> &[Cluster] {
        self.current_set().clusters()
    }

    /// Number of clusters in the current set.
    pub fn cluster_count(&self) -> usize {
        self.current_set().cluster_count()
    }

    /// Weight, mean, and covariance of one cluster of the current set,
    /// or `None` if the label is out of range.
    pub fn cluster_stats(&self, label: usize) -> Option<(f64, Pose2D, Covariance2D)> {
        self.current_set()
            .cluster(label)
            .map(|c| (c.weight, c.mean, c.cov))
    }

    /// The highest-weight cluster of the current set.
    pub fn best_cluster(&self) -> Option<&Cluster> {
        self.current_set().best_cluster()
    }

    /// Whole-set weighted (x, y) mean and scalar spatial variance.
    pub fn cep_stats(&self) -> (Pose2D, f64) {
        self.current_set().cep_stats()
    }

    /// Sum of squared normalized weights from the last sensor update.
    pub fn sum_sq_weights(&self) -> f64 {
        self.sum_sq_weights
    }

    /// Effective sample size `1 / Σw²`; small values mean the weight has
    /// concentrated on few samples and a resample is due.
    pub fn effective_sample_size(&self) -> f64 {
        if self.sum_sq_weights > 0.0 {
            1.0 / self.sum_sq_weights
        } else {
            0.0
        }
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Initialize the current set from a Gaussian over pose space.
    pub fn init_gaussian(&mut self, mean: Pose2D, cov: &Covariance2D) {
        let sampler = GaussianPoseSampler::new(mean, cov);
        self.reinitialize(|rng| sampler.sample(rng));
    }

    /// Initialize the current set uniformly over the map's free space,
    /// with headings per `config.init_heading`.
    pub fn init_map<M: OccupancyMap>(&mut self, map: &M) {
        let heading = self.config.init_heading;
        self.reinitialize(|rng| {
            let (x, y) = sample_free_position(map, rng);
            let theta = match heading {
                HeadingInit::Uniform => sample_uniform_heading(rng),
                HeadingInit::Zero => 0.0,
                HeadingInit::Fixed(t) => t,
            };
            Pose2D::new(x, y, theta)
        });
    }

    /// Initialize the current set from a caller-supplied pose sampler.
    pub fn init_with<F: FnMut() -> Pose2D>(&mut self, mut sampler: F) {
        self.reinitialize(|_| sampler());
    }

    /// Initialize the current set uniformly over a square of side
    /// `spread` centered on (x, y), headings uniform, rejecting draws
    /// that fall outside the map bounds (occupied cells are accepted).
    pub fn init_to_point<M: OccupancyMap>(&mut self, map: &M, x: f32, y: f32, spread: f32) {
        self.reinitialize(|rng| loop {
            let px = x + (rng.gen::<f32>() - 0.5) * spread;
            let py = y + (rng.gen::<f32>() - 0.5) * spread;
            let theta = sample_uniform_heading(rng);
            if map.contains(px, py) {
                break Pose2D::new(px, py, theta);
            }
        });
    }

    /// Refill the current set to `max_samples` draws from `draw`,
    /// rebuild its histogram, and recompute cluster statistics.
    fn reinitialize<F>(&mut self, mut draw: F)
    where
        F: FnMut(&mut SmallRng) -> Pose2D,
    {
        let max = self.config.max_samples;
        let weight = 1.0 / max as f64;

        let set = &mut self.sets[self.current];
        set.histogram.clear();
        set.samples.clear();
        for _ in 0..max {
            let pose = draw(&mut self.rng);
            set.samples.push(Sample::with_weight(pose, weight));
            set.histogram.insert(pose, weight);
        }

        set.update_cluster_stats();
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Apply a motion model: the callback rewrites poses in place.
    /// Weights, the histogram, and cluster statistics are untouched; a
    /// resampling pass is expected to follow.
    pub fn update_action<F: FnOnce(&mut [Sample])>(&mut self, action: F) {
        action(self.sets[self.current].samples_mut());
    }

    /// Apply a motion model, then rebuild the histogram and recompute
    /// cluster statistics in place. For callers that read cluster
    /// estimates between the action and sensor updates.
    ///
    /// The callback's output is not validated: poses it leaves non-finite
    /// poison the statistics of the bucket they land in (or drop out of
    /// them entirely), but never abort the filter.
    pub fn update_action_clustered<F: FnOnce(&mut [Sample])>(&mut self, action: F) {
        let set = &mut self.sets[self.current];
        action(set.samples.as_mut_slice());
        set.rebuild_histogram();
        set.update_cluster_stats();
    }

    /// Apply a sensor model and normalize.
    ///
    /// The callback overwrites each weight with the observation
    /// likelihood of that sample's pose and returns the weight total. A
    /// positive total normalizes the set; a zero total resets it to
    /// uniform with a diagnostic. Returns the sum of squared normalized
    /// weights (`1/result` is the effective sample size).
    pub fn update_sensor<F: FnOnce(&mut [Sample]) -> f64>(&mut self, sensor: F) -> f64 {
        let set = &mut self.sets[self.current];
        let total = sensor(set.samples.as_mut_slice());

        let mut sum_sq = 0.0;
        if total > 0.0 {
            for sample in &mut set.samples {
                sample.weight /= total;
                sum_sq += sample.weight * sample.weight;
            }
        } else {
            log::warn!("sensor model returned zero total weight, resetting to uniform");
            let weight = 1.0 / set.samples.len() as f64;
            for sample in &mut set.samples {
                sample.weight = weight;
                sum_sq += weight * weight;
            }
        }

        self.sum_sq_weights = sum_sq;
        sum_sq
    }

    // ------------------------------------------------------------------
    // Resampling
    // ------------------------------------------------------------------

    /// Importance resampling with the adaptive KLD cutoff.
    ///
    /// Draws at most `max_particles` samples (clamped to the buffer
    /// capacity), stopping early once the scratch population exceeds the
    /// KLD limit for its bucket occupancy. Finishes with a normalization
    /// pass, a cluster-statistics pass, and the buffer flip.
    pub fn resample(&mut self, max_particles: usize) {
        let target = max_particles.min(self.config.max_samples);
        let (src, dst) = split_sets(&mut self.sets, self.current);
        let total = importance_resample(src, dst, &mut self.rng, target, &self.config);
        finish_resample(dst, total);
        self.current = (self.current + 1) % 2;
    }

    /// Importance resampling that tops up a collapsed population with
    /// map-uniform samples.
    ///
    /// The adaptive pass targets `max_samples - overhead_samples`; if it
    /// ends below `min_samples + 10`, up to 100 free-space samples with
    /// uniform headings are appended (never exceeding `max_samples`).
    pub fn resample_map<M: OccupancyMap>(&mut self, map: &M) {
        let target = self.config.max_samples - self.config.overhead_samples;
        let (src, dst) = split_sets(&mut self.sets, self.current);
        let mut total = importance_resample(src, dst, &mut self.rng, target, &self.config);

        if dst.samples.len() < self.config.min_samples + 10 {
            log::debug!(
                "population collapsed to {} samples, injecting map-uniform samples",
                dst.samples.len()
            );
            for _ in 0..100 {
                if dst.samples.len() >= self.config.max_samples {
                    break;
                }
                let (x, y) = sample_free_position(map, &mut self.rng);
                let pose = Pose2D::new(x, y, sample_uniform_heading(&mut self.rng));
                dst.samples.push(Sample::new(pose));
                total += 1.0;
                dst.histogram.insert(pose, 1.0);
            }
        }

        finish_resample(dst, total);
        self.current = (self.current + 1) % 2;
    }

    /// Importance resampling plus a fixed number of map-uniform samples.
    ///
    /// Reserves room for exactly `extra` injected samples by targeting
    /// `max_samples - extra` in the adaptive pass, then appends them with
    /// uniform headings.
    pub fn resample_with_injection<M: OccupancyMap>(&mut self, extra: usize, map: &M) {
        let extra = extra.min(self.config.max_samples);
        let target = self.config.max_samples - extra;
        let (src, dst) = split_sets(&mut self.sets, self.current);
        let mut total = importance_resample(src, dst, &mut self.rng, target, &self.config);

        for _ in 0..extra {
            let (x, y) = sample_free_position(map, &mut self.rng);
            let pose = Pose2D::new(x, y, sample_uniform_heading(&mut self.rng));
            dst.samples.push(Sample::new(pose));
            total += 1.0;
            dst.histogram.insert(pose, 1.0);
        }

        finish_resample(dst, total);
        self.current = (self.current + 1) % 2;
    }

    /// Importance resampling plus flat-quota injection from external
    /// hypotheses.
    ///
    /// After the adaptive pass (target `max_samples - overhead_samples`),
    /// the remaining capacity, further capped by `budget`, is split
    /// evenly across the hypotheses as an **attempt** budget: each
    /// attempt draws (x, y) from the hypothesis Gaussian (see
    /// [`PoseHypothesis`] for the spread convention) with a uniform
    /// heading and is kept only if it lands on free space.
    pub fn resample_hypotheses<M: OccupancyMap>(
        &mut self,
        map: &M,
        hyps: &[PoseHypothesis],
        budget: usize,
    ) {
        let target = self.config.max_samples - self.config.overhead_samples;
        let (src, dst) = split_sets(&mut self.sets, self.current);
        let mut total = importance_resample(src, dst, &mut self.rng, target, &self.config);

        if !hyps.is_empty() {
            let per_hyp = (self.config.max_samples - dst.samples.len()).min(budget) / hyps.len();

            for hyp in hyps {
                let (sigma_x, sigma_y, rho) = hypothesis_spread(hyp);
                for _ in 0..per_hyp {
                    let (x, y) = draw_hypothesis_position(&mut self.rng, hyp, sigma_x, sigma_y, rho);
                    let pose = Pose2D::new(x, y, sample_uniform_heading(&mut self.rng));
                    if map.is_free(x, y) {
                        dst.samples.push(Sample::new(pose));
                        total += 1.0;
                        dst.histogram.insert(pose, 1.0);
                    }
                }
            }
        }

        finish_resample(dst, total);
        self.current = (self.current + 1) % 2;
    }

    /// Importance resampling plus a KLD-sized injection cloud per
    /// hypothesis.
    ///
    /// Instead of a flat quota, each hypothesis is grown into its own
    /// cloud: at least min(10, budget) seed draws, then more until the
    /// per-hypothesis budget runs out or the relaxed KLD cutoff for the
    /// cloud's own bucket occupancy is met. Cloud draws fix theta = 0;
    /// headings are re-drawn uniform when the cloud transfers into the
    /// new set, since the hypothesis constrains only position.
    pub fn resample_hypotheses_kld<M: OccupancyMap>(&mut self, map: &M, hyps: &[PoseHypothesis]) {
        let max = self.config.max_samples;
        let (src, dst) = split_sets(&mut self.sets, self.current);

        // How much of the old posterior to carry: a nearly full set keeps
        // max - overhead, a depleted one keeps its own size.
        let n_src = src.samples.len();
        let request = if max - n_src < self.config.overhead_samples {
            max - self.config.overhead_samples
        } else {
            n_src
        };

        importance_resample(src, dst, &mut self.rng, request, &self.config);

        if !hyps.is_empty() {
            let per_hyp = (max - request) / hyps.len();
            let seed_count = per_hyp.min(10);

            for hyp in hyps {
                let (sigma_x, sigma_y, rho) = hypothesis_spread(hyp);

                // The outgoing current set doubles as per-hypothesis
                // scratch; the flip below retires it anyway.
                src.samples.clear();
                src.histogram.clear();

                for _ in 0..seed_count {
                    let (x, y) = draw_hypothesis_position(&mut self.rng, hyp, sigma_x, sigma_y, rho);
                    if map.is_free(x, y) {
                        let pose = Pose2D::new(x, y, 0.0);
                        src.samples.push(Sample::new(pose));
                        src.histogram.insert(pose, 1.0);
                    }
                }

                while src.samples.len() < per_hyp {
                    let k = src.histogram.leaf_count();
                    if k <= 1
                        || src.samples.len()
                            > resample_limit_relaxed(k, self.config.pop_err, self.config.pop_z)
                    {
                        break;
                    }
                    let (x, y) = draw_hypothesis_position(&mut self.rng, hyp, sigma_x, sigma_y, rho);
                    if map.is_free(x, y) {
                        let pose = Pose2D::new(x, y, 0.0);
                        src.samples.push(Sample::new(pose));
                        src.histogram.insert(pose, 1.0);
                    }
                }

                for i in 0..src.samples.len() {
                    let mut pose = src.samples[i].pose;
                    pose.theta = sample_uniform_heading(&mut self.rng);
                    dst.samples.push(Sample::new(pose));
                    dst.histogram.insert(pose, 1.0);
                }
            }
        }

        // Every weight is still 1.0, so normalizing by the count is the
        // same as normalizing by the sum.
        let count = dst.samples.len() as f64;
        for sample in &mut dst.samples {
            sample.weight /= count;
        }
        dst.update_cluster_stats();
        self.current = (self.current + 1) % 2;
    }
}

/// Split the double buffer into (current, scratch) views.
fn split_sets(sets: &mut [SampleSet; 2], current: usize) -> (&mut SampleSet, &mut SampleSet) {
    let (a, b) = sets.split_at_mut(1);
    if current == 0 {
        (&mut a[0], &mut b[0])
    } else {
        (&mut b[0], &mut a[0])
    }
}

/// Draw from `src` into `dst` until `target` samples are copied or the
/// scratch population exceeds the KLD limit for its bucket occupancy
/// (checked after each insert). Copies carry unit weight; the returned
/// total is their sum.
fn importance_resample(
    src: &SampleSet,
    dst: &mut SampleSet,
    rng: &mut SmallRng,
    target: usize,
    config: &FilterConfig,
) -> f64 {
    let weights: Vec<f64> = src.samples().iter().map(|s| s.weight).collect();
    let dist = Categorical::from_weights(&weights);

    dst.histogram.clear();
    dst.samples.clear();

    let mut total = 0.0;
    while dst.samples.len() < target {
        let picked = src.samples()[dist.sample(rng)];
        assert!(
            picked.weight > 0.0,
            "importance draw selected a zero-weight sample"
        );

        dst.samples.push(Sample::new(picked.pose));
        total += 1.0;
        dst.histogram.insert(picked.pose, 1.0);

        let limit = resample_limit(
            dst.histogram.leaf_count(),
            config.min_samples,
            config.max_samples,
            config.pop_err,
            config.pop_z,
        );
        if dst.samples.len() > limit {
            break;
        }
    }

    total
}

/// Normalize the scratch set by the accumulated weight total and refresh
/// its cluster statistics.
fn finish_resample(dst: &mut SampleSet, total: f64) {
    for sample in &mut dst.samples {
        sample.weight /= total;
    }
    dst.update_cluster_stats();
}

/// Spread parameters of a hypothesis per the [`PoseHypothesis`]
/// convention: diagonal entries are standard deviations, the off-diagonal
/// a raw correlation numerator. Degenerate values pass through untouched.
fn hypothesis_spread(hyp: &PoseHypothesis) -> (f64, f64, f64) {
    let sigma_x = hyp.cov.get(0, 0) as f64;
    let sigma_y = hyp.cov.get(1, 1) as f64;
    let rho = hyp.cov.get(0, 1) as f64 / (sigma_x * sigma_y);
    (sigma_x, sigma_y, rho)
}

fn draw_hypothesis_position(
    rng: &mut SmallRng,
    hyp: &PoseHypothesis,
    sigma_x: f64,
    sigma_y: f64,
    rho: f64,
) -> (f32, f32) {
    let (dx, dy) = sample_correlated_xy(rng, sigma_x, sigma_y, rho);
    (hyp.mean.x + dx as f32, hyp.mean.y + dy as f32)
}
