//! Octree partitioning
//!
//! Top-down recursive build. Every node is either a leaf holding its points
//! verbatim or a branch holding only its non-empty children; children are
//! owned by value and built in parallel.

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stipple_core::{Bounds, Color, PointCloudDataset};

use crate::chunk::{ChunkId, ChunkSet, PointChunk};
use crate::voxel::voxel_downsample;

/// Octree build settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// A node with at most this many points is a leaf
    pub max_points_per_node: usize,
    /// Nodes at this level are always leaves
    pub max_depth: u32,
    /// A node whose largest extent is below this is a leaf
    pub min_node_size: f32,
    /// Target point count for the coarse representative of a branch
    pub representative_points: usize,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_points_per_node: 10_000,
            max_depth: 8,
            min_node_size: 0.01,
            representative_points: 4_096,
        }
    }
}

/// Contents of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeContent {
    Leaf { points: Vec<Vec3>, colors: Vec<Color> },
    Branch(Vec<OctreeNode>),
}

/// A node of the octree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OctreeNode {
    bounds: Bounds,
    level: u32,
    octant: u8,
    point_count: usize,
    content: NodeContent,
}

impl OctreeNode {
    fn build(
        points: Vec<Vec3>,
        colors: Vec<Color>,
        bounds: Bounds,
        level: u32,
        octant: u8,
        config: &OctreeConfig,
    ) -> Self {
        let point_count = points.len();
        let is_leaf = point_count <= config.max_points_per_node
            || level >= config.max_depth
            || bounds.max_dimension() < config.min_node_size;

        if is_leaf {
            return Self {
                bounds,
                level,
                octant,
                point_count,
                content: NodeContent::Leaf { points, colors },
            };
        }

        let with_colors = !colors.is_empty();
        let mut buckets: Vec<(Vec<Vec3>, Vec<Color>)> = (0..8).map(|_| (Vec::new(), Vec::new())).collect();
        for (i, point) in points.into_iter().enumerate() {
            let bucket = &mut buckets[bounds.octant_index(point) as usize];
            bucket.0.push(point);
            if with_colors {
                bucket.1.push(colors[i]);
            }
        }

        let children: Vec<OctreeNode> = buckets
            .into_par_iter()
            .enumerate()
            .filter(|(_, (points, _))| !points.is_empty())
            .map(|(octant, (points, colors))| {
                let octant = octant as u8;
                Self::build(points, colors, bounds.octant(octant), level + 1, octant, config)
            })
            .collect();

        Self {
            bounds,
            level,
            octant,
            point_count,
            content: NodeContent::Branch(children),
        }
    }

    /// Get the node bounds
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Get the depth of this node (root = 0)
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Octant index within the parent (0 for the root)
    pub fn octant(&self) -> u8 {
        self.octant
    }

    /// Number of points in this subtree
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Check if this node holds points directly
    pub fn is_leaf(&self) -> bool {
        matches!(self.content, NodeContent::Leaf { .. })
    }

    /// Get the node contents
    pub fn content(&self) -> &NodeContent {
        &self.content
    }

    /// Child nodes; empty for leaves
    pub fn children(&self) -> &[OctreeNode] {
        match &self.content {
            NodeContent::Branch(children) => children,
            NodeContent::Leaf { .. } => &[],
        }
    }

    /// Leaf points; empty for branches
    pub fn points(&self) -> &[Vec3] {
        match &self.content {
            NodeContent::Leaf { points, .. } => points,
            NodeContent::Branch(_) => &[],
        }
    }

    /// Leaf colours; empty for branches and uncoloured data
    pub fn colors(&self) -> &[Color] {
        match &self.content {
            NodeContent::Leaf { colors, .. } => colors,
            NodeContent::Branch(_) => &[],
        }
    }

    /// Append every point of the subtree
    pub fn collect_points(&self, points: &mut Vec<Vec3>, colors: &mut Vec<Color>) {
        match &self.content {
            NodeContent::Leaf { points: p, colors: c } => {
                points.extend_from_slice(p);
                colors.extend_from_slice(c);
            }
            NodeContent::Branch(children) => {
                for child in children {
                    child.collect_points(points, colors);
                }
            }
        }
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a OctreeNode)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }
}

/// Summary counts of a built tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OctreeStats {
    pub node_count: usize,
    pub leaf_count: usize,
    /// Deepest leaf level
    pub depth: u32,
    pub point_count: usize,
}

/// Octree over a point cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Octree {
    root: OctreeNode,
    config: OctreeConfig,
}

impl Octree {
    /// Build a tree; `colors` is empty or parallel to `points`
    pub fn build(points: Vec<Vec3>, colors: Vec<Color>, config: &OctreeConfig) -> Self {
        let bounds = Bounds::from_points(&points);
        let root = OctreeNode::build(points, colors, bounds, 0, 0, config);
        let octree = Self {
            root,
            config: config.clone(),
        };

        let stats = octree.stats();
        log::info!(
            "Built octree: {} nodes, {} leaves, depth {}, {} points",
            stats.node_count,
            stats.leaf_count,
            stats.depth,
            stats.point_count
        );
        octree
    }

    /// Build a tree over a dataset
    pub fn from_dataset(dataset: &PointCloudDataset, config: &OctreeConfig) -> Self {
        Self::build(dataset.points().to_vec(), dataset.colors().to_vec(), config)
    }

    /// Get the root node
    pub fn root(&self) -> &OctreeNode {
        &self.root
    }

    /// Get the build settings
    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Count nodes, leaves and depth
    pub fn stats(&self) -> OctreeStats {
        let mut stats = OctreeStats {
            point_count: self.root.point_count,
            ..OctreeStats::default()
        };
        self.root.visit(&mut |node| {
            stats.node_count += 1;
            if node.is_leaf() {
                stats.leaf_count += 1;
                stats.depth = stats.depth.max(node.level);
            }
        });
        stats
    }

    /// All leaves in depth-first order
    pub fn leaves(&self) -> Vec<&OctreeNode> {
        let mut leaves = Vec::new();
        self.root.visit(&mut |node| {
            if node.is_leaf() {
                leaves.push(node);
            }
        });
        leaves
    }

    /// All nodes at one level
    pub fn nodes_at_level(&self, level: u32) -> Vec<&OctreeNode> {
        let mut nodes = Vec::new();
        self.root.visit(&mut |node| {
            if node.level == level {
                nodes.push(node);
            }
        });
        nodes
    }

    /// Convert to LOD chunks.
    ///
    /// Leaves become LOD 0 chunks. Each branch at level `l` becomes a
    /// voxel-downsampled representative of its subtree at LOD `depth - l`.
    pub fn to_chunk_set(&self) -> ChunkSet {
        let depth = self.stats().depth;
        let target = self.config.representative_points.max(1) as f32;

        let mut nodes = Vec::new();
        self.root.visit(&mut |node| nodes.push(node));

        let mut payloads: Vec<(u32, Vec<Vec3>, Vec<Color>)> = nodes
            .par_iter()
            .filter(|node| node.point_count > 0)
            .map(|node| {
                if node.is_leaf() {
                    return (0, node.points().to_vec(), node.colors().to_vec());
                }
                let mut points = Vec::with_capacity(node.point_count);
                let mut colors = Vec::new();
                node.collect_points(&mut points, &mut colors);
                let voxel = node.bounds.max_dimension() / target.cbrt();
                let (points, colors) = voxel_downsample(&points, &colors, voxel);
                (depth.saturating_sub(node.level), points, colors)
            })
            .collect();

        payloads.sort_by_key(|(lod, _, _)| *lod);
        let chunks = payloads
            .into_iter()
            .enumerate()
            .map(|(i, (lod, points, colors))| PointChunk::new(ChunkId(i as u32), lod, points, colors))
            .collect();

        ChunkSet::new(chunks, self.root.bounds, self.root.point_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud(n: usize) -> Vec<Vec3> {
        // Deterministic scatter with some clustering
        let mut state = 0x9e37_79b9u32;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as f32 / u32::MAX as f32
        };
        (0..n)
            .map(|i| {
                let scale = if i % 3 == 0 { 1.0 } else { 10.0 };
                Vec3::new(next() * scale, next() * scale, next() * scale)
            })
            .collect()
    }

    fn config(max_points: usize, max_depth: u32, min_size: f32) -> OctreeConfig {
        OctreeConfig {
            max_points_per_node: max_points,
            max_depth,
            min_node_size: min_size,
            representative_points: 64,
        }
    }

    fn check_counts(node: &OctreeNode) {
        if node.is_leaf() {
            assert_eq!(node.point_count(), node.points().len());
        } else {
            assert!(!node.children().is_empty());
            let sum: usize = node.children().iter().map(|c| c.point_count()).sum();
            assert_eq!(sum, node.point_count());
            for child in node.children() {
                assert_eq!(child.level(), node.level() + 1);
                check_counts(child);
            }
        }
    }

    #[test]
    fn test_leaf_rule_holds() {
        let config = config(50, 6, 0.05);
        let tree = Octree::build(cloud(5_000), Vec::new(), &config);

        for leaf in tree.leaves() {
            assert!(
                leaf.point_count() <= config.max_points_per_node
                    || leaf.level() == config.max_depth
                    || leaf.bounds().max_dimension() < config.min_node_size
            );
        }
    }

    #[test]
    fn test_partition_is_complete() {
        let points = cloud(3_000);
        let tree = Octree::build(points.clone(), Vec::new(), &config(40, 8, 0.0));

        let mut collected = Vec::new();
        tree.root().collect_points(&mut collected, &mut Vec::new());
        assert_eq!(collected.len(), points.len());

        let key = |p: &Vec3| (p.x.to_bits(), p.y.to_bits(), p.z.to_bits());
        let mut expected: Vec<_> = points.iter().map(key).collect();
        let mut actual: Vec<_> = collected.iter().map(key).collect();
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(actual, expected);

        check_counts(tree.root());
    }

    #[test]
    fn test_points_lie_in_leaf_bounds() {
        let tree = Octree::build(cloud(2_000), Vec::new(), &config(16, 8, 0.0));
        for leaf in tree.leaves() {
            assert!(leaf.points().iter().all(|p| leaf.bounds().contains_point(*p)));
        }
    }

    #[test]
    fn test_colors_follow_points() {
        let points = cloud(1_000);
        let colors: Vec<Color> = points.iter().map(|p| Color::rgb(p.x / 10.0, 0.0, 0.0)).collect();
        let tree = Octree::build(points, colors, &config(30, 8, 0.0));

        for leaf in tree.leaves() {
            assert_eq!(leaf.colors().len(), leaf.points().len());
            for (p, c) in leaf.points().iter().zip(leaf.colors()) {
                assert_eq!(c.r, p.x / 10.0);
            }
        }
    }

    #[test]
    fn test_tiny_bounds_are_a_leaf() {
        let points = vec![Vec3::splat(1.0); 500];
        let tree = Octree::build(points, Vec::new(), &config(10, 3, 0.01));
        let stats = tree.stats();
        assert_eq!(stats.leaf_count, 1);
        assert_eq!(stats.depth, 0);
        assert_eq!(stats.point_count, 500);
    }

    #[test]
    fn test_coincident_points_hit_max_depth() {
        let mut points = vec![Vec3::ZERO; 100];
        points.push(Vec3::splat(8.0));
        let tree = Octree::build(points, Vec::new(), &config(10, 4, 0.0));
        assert_eq!(tree.stats().depth, 4);
        assert!(tree.leaves().iter().any(|l| l.level() == 4 && l.point_count() == 100));
    }

    #[test]
    fn test_small_input_is_single_leaf() {
        let tree = Octree::build(cloud(10), Vec::new(), &OctreeConfig::default());
        assert!(tree.root().is_leaf());
        assert_eq!(tree.nodes_at_level(0).len(), 1);
    }

    #[test]
    fn test_chunk_set_from_octree() {
        let tree = Octree::build(cloud(4_000), Vec::new(), &config(100, 5, 0.0));
        let stats = tree.stats();
        let set = tree.to_chunk_set();

        assert_eq!(set.tier_points(0), 4_000);
        assert_eq!(set.tier_indices(0).len(), stats.leaf_count);
        assert_eq!(set.tier_count() as u32, stats.depth + 1);
        assert_eq!(set.source_points(), 4_000);
        // Root representative is the coarsest tier
        let coarsest = set.tier_indices(stats.depth as usize);
        assert!(!coarsest.is_empty());
        for (i, chunk) in set.chunks().iter().enumerate() {
            assert_eq!(chunk.id(), ChunkId(i as u32));
        }
    }
}
