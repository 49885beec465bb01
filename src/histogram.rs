//! Bucketed 3-D pose histogram backed by a kd-tree.
//!
//! Discretizes (x, y, theta) into fixed-size buckets and tracks which
//! buckets hold weight. The occupied-bucket count feeds the KLD sample
//! limit during adaptive resampling, and a 26-neighbor connected-component
//! pass over the occupied buckets yields the cluster labels used by the
//! per-mode statistics.
//!
//! Nodes live in one contiguous pool addressed by index, so `clear` is
//! O(1) and inserting never allocates once the pool is built. The pool is
//! sized at three times the sample capacity; an insert that would need
//! more nodes than that is dropped.

use crate::core::types::Pose2D;

/// Bucket edge length along x and y, in meters.
pub const CELL_SIZE_XY: f32 = 0.5;

/// Bucket edge length along theta, in radians (10 degrees).
pub const CELL_SIZE_THETA: f32 = std::f32::consts::PI / 18.0;

const UNLABELED: i32 = -1;

#[derive(Debug, Clone)]
struct Node {
    /// Bucket key: pose divided by cell size, floored.
    key: [i32; 3],
    /// Summed weight of everything inserted into this bucket.
    weight: f64,
    leaf: bool,
    /// Split axis; meaningful only for internal nodes.
    pivot_dim: usize,
    /// Midpoint between the two keys that forced the split.
    pivot_value: f64,
    /// Connected-component label, UNLABELED until `cluster` runs.
    cluster: i32,
    /// Child indices; meaningful only for internal nodes.
    children: [u32; 2],
}

/// Histogram over pose space with cluster labeling.
#[derive(Debug)]
pub struct PoseHistogram {
    cell_x: f32,
    cell_y: f32,
    cell_theta: f32,
    nodes: Vec<Node>,
    capacity: usize,
    root: Option<u32>,
    leaf_count: usize,
    cluster_count: usize,
}

impl PoseHistogram {
    /// Create a histogram with the default cell sizes and room for
    /// `capacity` tree nodes.
    pub fn new(capacity: usize) -> Self {
        Self::with_cell_sizes(capacity, CELL_SIZE_XY, CELL_SIZE_THETA)
    }

    /// Create a histogram with explicit cell sizes.
    pub fn with_cell_sizes(capacity: usize, cell_xy: f32, cell_theta: f32) -> Self {
        Self {
            cell_x: cell_xy,
            cell_y: cell_xy,
            cell_theta,
            nodes: Vec::with_capacity(capacity),
            capacity,
            root: None,
            leaf_count: 0,
            cluster_count: 0,
        }
    }

    /// Reset to empty. Keeps the backing node pool.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.leaf_count = 0;
        self.cluster_count = 0;
    }

    /// Number of occupied buckets.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Number of connected components found by the last `cluster` call.
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Add `weight` to the bucket containing `pose`, creating the bucket
    /// if needed. Dropped silently if the node pool is exhausted.
    pub fn insert(&mut self, pose: Pose2D, weight: f64) {
        let key = self.key_for(pose);
        self.root = self.insert_node(self.root, key, weight).or(self.root);
    }

    /// Label every occupied bucket with its connected component under
    /// 26-neighbor adjacency in the bucket grid. Returns the number of
    /// components; labels are dense in `0..count`, assigned in the order
    /// the flood fills are launched.
    pub fn cluster(&mut self) -> usize {
        let mut queue: Vec<u32> = Vec::with_capacity(self.leaf_count);
        for (idx, node) in self.nodes.iter_mut().enumerate() {
            if node.leaf {
                node.cluster = UNLABELED;
                queue.push(idx as u32);
            }
        }

        let mut count = 0i32;
        while let Some(id) = queue.pop() {
            if self.nodes[id as usize].cluster != UNLABELED {
                continue;
            }
            self.nodes[id as usize].cluster = count;
            count += 1;
            self.flood_fill(id);
        }

        self.cluster_count = count as usize;
        self.cluster_count
    }

    /// Cluster label of the bucket containing `pose`, or `None` if the
    /// bucket is unoccupied or labeling has not run since the last insert
    /// into a fresh bucket.
    pub fn get_cluster(&self, pose: Pose2D) -> Option<usize> {
        let key = self.key_for(pose);
        let id = self.find_node(key)?;
        let label = self.nodes[id as usize].cluster;
        (label != UNLABELED).then_some(label as usize)
    }

    /// Summed weight of the bucket containing `pose`, if occupied.
    pub fn bucket_weight(&self, pose: Pose2D) -> Option<f64> {
        let key = self.key_for(pose);
        let id = self.find_node(key)?;
        Some(self.nodes[id as usize].weight)
    }

    fn key_for(&self, pose: Pose2D) -> [i32; 3] {
        [
            (pose.x / self.cell_x).floor() as i32,
            (pose.y / self.cell_y).floor() as i32,
            (pose.theta / self.cell_theta).floor() as i32,
        ]
    }

    fn insert_node(&mut self, node: Option<u32>, key: [i32; 3], weight: f64) -> Option<u32> {
        let Some(id) = node else {
            return self.alloc_leaf(key, weight);
        };
        let idx = id as usize;
        if self.nodes[idx].leaf {
            if self.nodes[idx].key == key {
                self.nodes[idx].weight += weight;
            } else {
                self.split_leaf(idx, key, weight);
            }
        } else {
            let dim = self.nodes[idx].pivot_dim;
            let side = usize::from(key[dim] as f64 >= self.nodes[idx].pivot_value);
            let child = self.nodes[idx].children[side];
            self.insert_node(Some(child), key, weight);
        }
        Some(id)
    }

    /// Turn a leaf into an internal node, pushing both its old contents
    /// and the new bucket down as fresh leaves. The split axis is the one
    /// where the two keys are furthest apart.
    fn split_leaf(&mut self, idx: usize, key: [i32; 3], weight: f64) {
        // Both children must fit or the insert is dropped whole.
        if self.nodes.len() + 2 > self.capacity {
            return;
        }

        let old_key = self.nodes[idx].key;
        let old_weight = self.nodes[idx].weight;

        let mut pivot_dim = 0;
        let mut max_split = 0i64;
        for dim in 0..3 {
            let split = (key[dim] as i64 - old_key[dim] as i64).abs();
            if split > max_split {
                max_split = split;
                pivot_dim = dim;
            }
        }
        let pivot_value = (key[pivot_dim] as f64 + old_key[pivot_dim] as f64) / 2.0;

        let ((lo_key, lo_weight), (hi_key, hi_weight)) = if (key[pivot_dim] as f64) < pivot_value {
            ((key, weight), (old_key, old_weight))
        } else {
            ((old_key, old_weight), (key, weight))
        };

        let left = self.push_leaf(lo_key, lo_weight);
        let right = self.push_leaf(hi_key, hi_weight);

        let node = &mut self.nodes[idx];
        node.leaf = false;
        node.pivot_dim = pivot_dim;
        node.pivot_value = pivot_value;
        node.children = [left, right];
        self.leaf_count -= 1;
    }

    fn alloc_leaf(&mut self, key: [i32; 3], weight: f64) -> Option<u32> {
        if self.nodes.len() >= self.capacity {
            return None;
        }
        Some(self.push_leaf(key, weight))
    }

    /// Append a leaf; the caller has already checked capacity.
    fn push_leaf(&mut self, key: [i32; 3], weight: f64) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node {
            key,
            weight,
            leaf: true,
            pivot_dim: 0,
            pivot_value: 0.0,
            cluster: UNLABELED,
            children: [0, 0],
        });
        self.leaf_count += 1;
        id
    }

    fn find_node(&self, key: [i32; 3]) -> Option<u32> {
        let mut cur = self.root?;
        loop {
            let node = &self.nodes[cur as usize];
            if node.leaf {
                return (node.key == key).then_some(cur);
            }
            let side = usize::from(key[node.pivot_dim] as f64 >= node.pivot_value);
            cur = node.children[side];
        }
    }

    /// Spread the label of `start` to every transitively adjacent
    /// occupied bucket (any neighbor whose key differs by at most 1 on
    /// every axis).
    fn flood_fill(&mut self, start: u32) {
        let label = self.nodes[start as usize].cluster;
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let key = self.nodes[id as usize].key;
            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dt in -1..=1 {
                        // Saturating: keys at the i32 edge (non-finite
                        // poses saturate there) fold onto themselves
                        let nkey = [
                            key[0].saturating_add(dx),
                            key[1].saturating_add(dy),
                            key[2].saturating_add(dt),
                        ];
                        if let Some(nid) = self.find_node(nkey) {
                            if self.nodes[nid as usize].cluster == UNLABELED {
                                self.nodes[nid as usize].cluster = label;
                                stack.push(nid);
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(x: f32, y: f32, theta: f32) -> Pose2D {
        Pose2D::new(x, y, theta)
    }

    #[test]
    fn test_same_bucket_accumulates() {
        let mut hist = PoseHistogram::new(64);
        hist.insert(pose(0.1, 0.1, 0.0), 0.5);
        hist.insert(pose(0.4, 0.3, 0.05), 0.25);
        assert_eq!(hist.leaf_count(), 1);
        assert_eq!(hist.bucket_weight(pose(0.2, 0.2, 0.02)), Some(0.75));
    }

    #[test]
    fn test_distinct_buckets_counted() {
        let mut hist = PoseHistogram::new(64);
        hist.insert(pose(0.1, 0.1, 0.0), 1.0);
        hist.insert(pose(1.1, 0.1, 0.0), 1.0);
        hist.insert(pose(0.1, 1.1, 0.0), 1.0);
        hist.insert(pose(0.1, 0.1, 1.0), 1.0);
        assert_eq!(hist.leaf_count(), 4);
    }

    #[test]
    fn test_clear_resets() {
        let mut hist = PoseHistogram::new(64);
        hist.insert(pose(0.0, 0.0, 0.0), 1.0);
        hist.insert(pose(3.0, 3.0, 0.0), 1.0);
        hist.clear();
        assert_eq!(hist.leaf_count(), 0);
        assert_eq!(hist.bucket_weight(pose(0.0, 0.0, 0.0)), None);
        // Reusable after clear
        hist.insert(pose(0.0, 0.0, 0.0), 1.0);
        assert_eq!(hist.leaf_count(), 1);
    }

    #[test]
    fn test_adjacent_buckets_share_cluster() {
        let mut hist = PoseHistogram::new(64);
        // Neighbors along x (keys 0 and 1), plus a diagonal neighbor
        hist.insert(pose(0.2, 0.2, 0.0), 1.0);
        hist.insert(pose(0.7, 0.2, 0.0), 1.0);
        hist.insert(pose(0.7, 0.7, 0.0), 1.0);
        // Far-away bucket
        hist.insert(pose(5.0, 5.0, 0.0), 1.0);

        assert_eq!(hist.cluster(), 2);

        let a = hist.get_cluster(pose(0.2, 0.2, 0.0)).unwrap();
        let b = hist.get_cluster(pose(0.7, 0.2, 0.0)).unwrap();
        let c = hist.get_cluster(pose(0.7, 0.7, 0.0)).unwrap();
        let d = hist.get_cluster(pose(5.0, 5.0, 0.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_theta_adjacency() {
        let mut hist = PoseHistogram::new(64);
        // Same (x, y) bucket, adjacent theta buckets
        hist.insert(pose(0.1, 0.1, 0.05), 1.0);
        hist.insert(pose(0.1, 0.1, 0.25), 1.0);
        assert_eq!(hist.leaf_count(), 2);
        assert_eq!(hist.cluster(), 1);
    }

    #[test]
    fn test_get_cluster_before_labeling() {
        let mut hist = PoseHistogram::new(64);
        hist.insert(pose(0.0, 0.0, 0.0), 1.0);
        assert_eq!(hist.get_cluster(pose(0.0, 0.0, 0.0)), None);
        hist.cluster();
        assert_eq!(hist.get_cluster(pose(0.0, 0.0, 0.0)), Some(0));
        assert_eq!(hist.get_cluster(pose(9.0, 9.0, 0.0)), None);
    }

    #[test]
    fn test_insert_order_does_not_change_partition() {
        let poses = [
            pose(0.2, 0.2, 0.0),
            pose(0.7, 0.2, 0.0),
            pose(4.0, 4.0, 0.0),
            pose(4.6, 4.0, 0.0),
            pose(-2.0, 1.0, 1.0),
        ];

        let mut forward = PoseHistogram::new(64);
        for p in poses {
            forward.insert(p, 1.0);
        }
        let mut reverse = PoseHistogram::new(64);
        for p in poses.iter().rev() {
            reverse.insert(*p, 1.0);
        }

        assert_eq!(forward.leaf_count(), reverse.leaf_count());
        forward.cluster();
        reverse.cluster();
        assert_eq!(forward.cluster_count(), reverse.cluster_count());

        // Same equivalence classes even if label values permute
        for a in poses {
            for b in poses {
                let same_fwd = forward.get_cluster(a) == forward.get_cluster(b);
                let same_rev = reverse.get_cluster(a) == reverse.get_cluster(b);
                assert_eq!(same_fwd, same_rev, "partition differs for {:?} / {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_pool_exhaustion_drops_silently() {
        // Room for one root leaf plus a single split
        let mut hist = PoseHistogram::new(3);
        hist.insert(pose(0.0, 0.0, 0.0), 1.0);
        hist.insert(pose(2.0, 0.0, 0.0), 1.0);
        assert_eq!(hist.leaf_count(), 2);
        // Third bucket needs two more nodes than the pool holds
        hist.insert(pose(4.0, 0.0, 0.0), 1.0);
        assert_eq!(hist.leaf_count(), 2);
        assert_eq!(hist.bucket_weight(pose(4.0, 0.0, 0.0)), None);
        // Accumulating into an existing bucket still works
        hist.insert(pose(0.1, 0.1, 0.0), 1.0);
        assert_eq!(hist.bucket_weight(pose(0.0, 0.0, 0.0)), Some(2.0));
    }

    #[test]
    fn test_extreme_coordinates_saturate() {
        let mut hist = PoseHistogram::new(64);
        hist.insert(pose(0.1, 0.1, 0.0), 1.0);
        // Non-finite coordinates saturate to edge/zero bucket keys
        hist.insert(Pose2D::new(f32::INFINITY, 0.1, 0.0), 1.0);
        hist.insert(Pose2D::new(f32::NAN, 0.1, 0.0), 1.0);
        assert_eq!(hist.leaf_count(), 2);
        hist.cluster();
        assert!(hist.get_cluster(pose(0.1, 0.1, 0.0)).is_some());
        assert!(hist
            .get_cluster(Pose2D::new(f32::INFINITY, 0.1, 0.0))
            .is_some());
    }

    #[test]
    fn test_negative_coordinates() {
        let mut hist = PoseHistogram::new(64);
        hist.insert(pose(-0.1, -0.1, 0.0), 1.0);
        hist.insert(pose(-0.3, -0.2, 0.0), 1.0);
        assert_eq!(hist.leaf_count(), 1);
        // -0.1 and +0.1 straddle the bucket edge at zero
        hist.insert(pose(0.1, -0.1, 0.0), 1.0);
        assert_eq!(hist.leaf_count(), 2);
    }

    #[test]
    fn test_many_buckets_leaf_count_exact() {
        let mut hist = PoseHistogram::new(3 * 1000);
        let mut expected = 0;
        for i in 0..20 {
            for j in 0..20 {
                // One pose per bucket, buckets edge-adjacent in the grid
                hist.insert(pose(i as f32 * 0.5 + 0.1, j as f32 * 0.5 + 0.1, 0.0), 1.0);
                expected += 1;
            }
        }
        assert_eq!(hist.leaf_count(), expected);
        // One fully-connected block of buckets
        assert_eq!(hist.cluster(), 1);
    }
}
