//! Weighted pose samples, the double-buffered sample set, and the
//! per-cluster statistics pass.

use crate::core::types::{Covariance2D, Pose2D};
use crate::histogram::PoseHistogram;

/// Upper bound on tracked clusters per set; samples landing in clusters
/// beyond this are dropped from the statistics.
pub const MAX_CLUSTERS: usize = 100;

/// A single pose hypothesis with its importance weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Hypothesized robot pose.
    pub pose: Pose2D,
    /// Importance weight; nonnegative, normalized to sum 1 across the set
    /// after every completed filter operation.
    pub weight: f64,
}

impl Sample {
    /// Create a sample with unit weight.
    pub fn new(pose: Pose2D) -> Self {
        Self { pose, weight: 1.0 }
    }

    /// Create a sample with the given weight.
    pub fn with_weight(pose: Pose2D, weight: f64) -> Self {
        Self { pose, weight }
    }
}

/// One mode of the posterior: a connected component of occupied histogram
/// buckets with its weighted statistics.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Number of member samples.
    pub count: usize,
    /// Summed member weight.
    pub weight: f64,
    /// Weighted mean pose; the heading is a circular mean.
    pub mean: Pose2D,
    /// Weighted covariance: 2x2 linear block plus circular dispersion in
    /// the theta slot.
    pub cov: Covariance2D,
    /// Weighted first moments: x, y, cos(theta), sin(theta).
    m: [f64; 4],
    /// Weighted outer products of (x, y).
    c: [[f64; 2]; 2],
}

impl Cluster {
    fn empty() -> Self {
        Self {
            count: 0,
            weight: 0.0,
            mean: Pose2D::identity(),
            cov: Covariance2D::zero(),
            m: [0.0; 4],
            c: [[0.0; 2]; 2],
        }
    }
}

/// Fixed-capacity buffer of weighted samples with an attached pose
/// histogram and cluster table.
///
/// The filter owns two of these and ping-pongs between them during
/// resampling; a set can also stand alone for external clustering passes
/// via [`SampleSet::recluster`].
#[derive(Debug)]
pub struct SampleSet {
    pub(crate) samples: Vec<Sample>,
    pub(crate) histogram: PoseHistogram,
    clusters: Vec<Cluster>,
}

impl SampleSet {
    /// Allocate a set holding `max_samples` zero poses at uniform weight,
    /// with a histogram pool sized for adaptive resampling.
    pub fn new(max_samples: usize) -> Self {
        let weight = 1.0 / max_samples as f64;
        Self {
            samples: vec![Sample::with_weight(Pose2D::identity(), weight); max_samples],
            histogram: PoseHistogram::new(3 * max_samples),
            clusters: Vec::with_capacity(MAX_CLUSTERS),
        }
    }

    /// Live samples.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Live samples, mutable. Poses and weights may be rewritten in
    /// place; the histogram and cluster table go stale until the next
    /// [`SampleSet::recluster`] or filter operation.
    pub fn samples_mut(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// Number of live samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the set holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The attached pose histogram.
    pub fn histogram(&self) -> &PoseHistogram {
        &self.histogram
    }

    /// Clusters found by the last statistics pass.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Number of clusters found by the last statistics pass.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Statistics for one cluster, or `None` if the label is out of
    /// range.
    pub fn cluster(&self, label: usize) -> Option<&Cluster> {
        self.clusters.get(label)
    }

    /// The highest-weight cluster, if any.
    pub fn best_cluster(&self) -> Option<&Cluster> {
        self.clusters
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
    }

    /// Rebuild the histogram from the current samples and recompute the
    /// cluster table. For sets whose samples were edited outside a filter
    /// operation.
    pub fn recluster(&mut self) {
        self.rebuild_histogram();
        self.update_cluster_stats();
    }

    /// Weighted (x, y) mean and scalar spatial variance of the whole set,
    /// ignoring clustering. The returned heading is zero.
    pub fn cep_stats(&self) -> (Pose2D, f64) {
        let mut mn = 0.0;
        let mut mx = 0.0;
        let mut my = 0.0;
        let mut mrr = 0.0;

        for sample in &self.samples {
            let w = sample.weight;
            let x = sample.pose.x as f64;
            let y = sample.pose.y as f64;
            mn += w;
            mx += w * x;
            my += w * y;
            mrr += w * (x * x + y * y);
        }

        if mn <= 0.0 {
            return (Pose2D::identity(), 0.0);
        }

        let mean_x = mx / mn;
        let mean_y = my / mn;
        let var = mrr / mn - (mean_x * mean_x + mean_y * mean_y);
        (Pose2D::new(mean_x as f32, mean_y as f32, 0.0), var)
    }

    pub(crate) fn rebuild_histogram(&mut self) {
        self.histogram.clear();
        for sample in &self.samples {
            self.histogram.insert(sample.pose, sample.weight);
        }
    }

    /// Label the histogram and accumulate per-cluster weighted moments.
    ///
    /// Samples whose bucket is absent from the histogram are dropped from
    /// the statistics. A finite pose can only go missing through an
    /// internal histogram/sample desync; non-finite poses handed back by
    /// a caller's motion model are not the filter's to abort on.
    pub(crate) fn update_cluster_stats(&mut self) {
        self.histogram.cluster();
        self.clusters.clear();

        for sample in &self.samples {
            let Some(label) = self.histogram.get_cluster(sample.pose) else {
                debug_assert!(
                    !(sample.pose.x.is_finite()
                        && sample.pose.y.is_finite()
                        && sample.pose.theta.is_finite()),
                    "finite sample pose missing from cluster histogram"
                );
                continue;
            };
            if label >= MAX_CLUSTERS {
                continue;
            }
            while self.clusters.len() <= label {
                self.clusters.push(Cluster::empty());
            }

            let cluster = &mut self.clusters[label];
            let w = sample.weight;
            let x = sample.pose.x as f64;
            let y = sample.pose.y as f64;
            let theta = sample.pose.theta as f64;

            cluster.count += 1;
            cluster.weight += w;
            cluster.m[0] += w * x;
            cluster.m[1] += w * y;
            cluster.m[2] += w * theta.cos();
            cluster.m[3] += w * theta.sin();

            let p = [x, y];
            for j in 0..2 {
                for k in 0..2 {
                    cluster.c[j][k] += w * p[j] * p[k];
                }
            }
        }

        for cluster in &mut self.clusters {
            if cluster.weight <= 0.0 {
                continue;
            }

            let mean = [cluster.m[0] / cluster.weight, cluster.m[1] / cluster.weight];
            let mean_theta = cluster.m[3].atan2(cluster.m[2]);
            cluster.mean = Pose2D::new(mean[0] as f32, mean[1] as f32, mean_theta as f32);

            let mut cov = Covariance2D::zero();
            for j in 0..2 {
                for k in 0..2 {
                    cov.set(
                        j,
                        k,
                        (cluster.c[j][k] / cluster.weight - mean[j] * mean[k]) as f32,
                    );
                }
            }
            // Circular dispersion from the resultant length
            let r = (cluster.m[2] * cluster.m[2] + cluster.m[3] * cluster.m[3]).sqrt();
            cov.set(2, 2, (-2.0 * r.ln()) as f32);
            cluster.cov = cov;
        }
    }
}
