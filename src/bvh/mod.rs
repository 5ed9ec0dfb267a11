use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use bytemuck::Zeroable;

use crate::aabb::Aabb;
use crate::error::BvhError;
use crate::morton::MortonPrimitive;
use crate::timings::{BuildTimings, Stage};
use crate::vector::Vec3f32;

mod passes;

/// Compact node record consumed by stackless traversal.
///
/// `link` is the left-child node index for internal nodes; a negative value
/// marks a leaf and encodes the original leaf id as `-link - 1`. `escape` is
/// the next node a depth-first walk visits after skipping this subtree, or
/// -1 when the walk is done. The corner/index interleave keeps the record at
/// two 16-byte rows without explicit padding.
#[repr(C, align(16))]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Zeroable, bytemuck::Pod)]
pub struct BvhNode {
    pub lower: Vec3f32,
    pub link: i32,
    pub upper: Vec3f32,
    pub escape: i32,
}

static_assertions::assert_eq_size!(BvhNode, [u32; 8]);

impl BvhNode {
    pub fn is_leaf(&self) -> bool {
        self.link < 0
    }

    /// Original id of the input leaf this record stands for.
    /// Meaningless for internal nodes.
    pub fn leaf_id(&self) -> u32 {
        (-self.link - 1) as u32
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.lower, self.upper)
    }
}

/// Bounding Volume Hierarchy over a set of axis-aligned bounding boxes,
/// assembled by data-parallel passes into a linearized, stackless-traversal
/// layout.
///
/// Construction pipeline:
///     1. Scene-level bounds reduction
///     2. Morton code assignment from scene-normalized leaf centers
///     3. Radix sort of (code, leaf) pairs
///     4. Binary radix tree construction (one task per internal node)
///     5. Escape-index assignment for stackless traversal
///     6. Bottom-up bounding box refit with an atomic rendezvous per node
///     7. Compaction into contiguous traversal records
///
/// `refit` reruns only steps 6-7 and is the cheap path for moving geometry
/// with unchanged topology.
///
/// Node index space: internal nodes at `[0, N-1)` with the root at 0, the
/// leaves in Morton order at `[N-1, 2N-1)`.
#[derive(Debug)]
pub struct Bvh {
    num_leaves: usize,
    scene_bounds: Aabb,
    /// sorted (code, leaf) pairs, kept for rebuilds
    prims: Vec<MortonPrimitive>,
    /// Morton-ordered original leaf indices
    leaf_order: Vec<u32>,
    parent: Vec<i32>,
    left: Vec<i32>,
    right: Vec<i32>,
    /// per-node bounds; slot 0 doubles as the scene bounds after a build
    boxes: Vec<Aabb>,
    escape: Vec<i32>,
    /// rendezvous counters for the bottom-up refit
    flags: Vec<AtomicU32>,
    nodes: Vec<BvhNode>,
    /// per-stage durations of the most recent rebuild/refit
    pub timings: BuildTimings,
}

fn try_buffer<T>(len: usize, fill: impl FnMut() -> T) -> Result<Vec<T>, BvhError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| BvhError::OutOfMemory {
            requested_nodes: len,
        })?;
    buffer.resize_with(len, fill);
    Ok(buffer)
}

impl Bvh {
    /// Build a hierarchy over per-leaf bounds given as parallel corner
    /// arrays: `(lower[i], upper[i])` is one leaf.
    ///
    /// Every intermediate buffer is sized here from the leaf count and
    /// reused by later `rebuild`/`refit` calls. Empty input produces an
    /// empty hierarchy and no buffers.
    pub fn build(lower: &[Vec3f32], upper: &[Vec3f32]) -> Result<Self, BvhError> {
        if lower.len() != upper.len() {
            return Err(BvhError::InvalidArgument(format!(
                "lower and upper bounds must have the same length (got {} and {})",
                lower.len(),
                upper.len()
            )));
        }

        let num_leaves = lower.len();
        let num_internal_nodes = num_leaves.saturating_sub(1);
        let num_total_nodes = if num_leaves == 0 { 0 } else { 2 * num_leaves - 1 };

        let mut bvh = Self {
            num_leaves,
            scene_bounds: Aabb::empty(),
            prims: try_buffer(num_leaves, MortonPrimitive::default)?,
            leaf_order: try_buffer(num_leaves, || 0u32)?,
            parent: try_buffer(num_total_nodes, || 0i32)?,
            left: try_buffer(num_internal_nodes, || 0i32)?,
            right: try_buffer(num_internal_nodes, || 0i32)?,
            boxes: try_buffer(num_total_nodes, Aabb::empty)?,
            escape: try_buffer(num_total_nodes, || 0i32)?,
            flags: try_buffer(num_internal_nodes, || AtomicU32::new(0))?,
            nodes: try_buffer(num_total_nodes, BvhNode::zeroed)?,
            timings: BuildTimings::default(),
        };
        bvh.rebuild(lower, upper)?;
        Ok(bvh)
    }

    /// Rebuild the whole hierarchy from scratch over the same leaf count.
    ///
    /// Runs the full pipeline; prefer [`Bvh::refit`] when only the bounds
    /// moved and the spatial ordering is still good enough.
    pub fn rebuild(&mut self, lower: &[Vec3f32], upper: &[Vec3f32]) -> Result<(), BvhError> {
        self.check_input(lower, upper)?;
        if self.num_leaves == 0 {
            return Ok(());
        }

        let start = Instant::now();
        let mut stage = Instant::now();

        self.scene_bounds = passes::reduce_scene_bounds(lower, upper);
        self.timings[Stage::SceneBounds] = stage.elapsed();

        stage = Instant::now();
        passes::assign_morton_codes(&self.scene_bounds, lower, upper, &mut self.prims);
        self.timings[Stage::MortonCodes] = stage.elapsed();

        stage = Instant::now();
        passes::sort_morton_primitives(&mut self.prims);
        self.leaf_order.clear();
        self.leaf_order.extend(self.prims.iter().map(|p| p.index));
        self.timings[Stage::RadixSort] = stage.elapsed();

        stage = Instant::now();
        if self.num_leaves > 1 {
            passes::construct_radix_tree(
                &self.prims,
                &mut self.left,
                &mut self.right,
                &mut self.parent,
            );
        } else {
            // Single-leaf hierarchy: no internal nodes
            self.parent[0] = -1;
        }
        self.timings[Stage::Topology] = stage.elapsed();

        if cfg!(debug_assertions) {
            if let Err(error) = self.verify() {
                log::error!("{error}");
            }
        }

        stage = Instant::now();
        passes::assign_escape_indices(
            self.num_leaves,
            &self.left,
            &self.right,
            &mut self.escape,
        );
        self.timings[Stage::EscapeLinks] = stage.elapsed();

        self.refit(lower, upper)?;

        log::debug!(
            "rebuilt hierarchy over {} leaves ({} nodes) in {:.3} ms",
            self.num_leaves,
            self.node_count(),
            start.elapsed().as_micros() as f64 / 1000.0
        );
        Ok(())
    }

    /// Update all node bounds from possibly-moved leaf bounds without
    /// touching topology, then repack the traversal records.
    ///
    /// The leaf count must match the one the topology was built for;
    /// changing the count requires a new [`Bvh::build`].
    pub fn refit(&mut self, lower: &[Vec3f32], upper: &[Vec3f32]) -> Result<(), BvhError> {
        self.check_input(lower, upper)?;
        if self.num_leaves == 0 {
            return Ok(());
        }

        let mut stage = Instant::now();
        for flag in self.flags.iter() {
            flag.store(0, Ordering::Relaxed);
        }
        passes::refit_bounds(
            self.num_leaves,
            &self.left,
            &self.right,
            &self.parent,
            lower,
            upper,
            &self.leaf_order,
            &self.flags,
            &mut self.boxes,
        );
        self.timings[Stage::Refit] = stage.elapsed();

        stage = Instant::now();
        passes::compact_nodes(
            self.num_leaves,
            &self.boxes,
            &self.left,
            &self.leaf_order,
            &self.escape,
            &mut self.nodes,
        );
        self.timings[Stage::Compaction] = stage.elapsed();
        Ok(())
    }

    /// Check parent/child symmetry and index ranges over the whole tree.
    ///
    /// Diagnostic: violations are logged and counted, nothing is repaired.
    /// A failure signals a construction bug, not corrupted input.
    pub fn verify(&self) -> Result<(), BvhError> {
        if self.num_leaves == 0 {
            return Ok(());
        }
        let errors =
            passes::verify_radix_tree(self.num_leaves, &self.left, &self.right, &self.parent);
        if errors > 0 {
            return Err(BvhError::InternalInvariantViolated { errors });
        }
        Ok(())
    }

    fn check_input(&self, lower: &[Vec3f32], upper: &[Vec3f32]) -> Result<(), BvhError> {
        if lower.len() != upper.len() {
            return Err(BvhError::InvalidArgument(format!(
                "lower and upper bounds must have the same length (got {} and {})",
                lower.len(),
                upper.len()
            )));
        }
        if lower.len() != self.num_leaves {
            return Err(BvhError::PreconditionViolated(format!(
                "hierarchy was built over {} leaves but {} were given",
                self.num_leaves,
                lower.len()
            )));
        }
        Ok(())
    }

    pub fn leaf_count(&self) -> usize {
        self.num_leaves
    }

    pub fn internal_count(&self) -> usize {
        self.num_leaves.saturating_sub(1)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The compact traversal records, indexed by node.
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Per-node bounds; `boxes()[0]` is the scene bounding box after a build.
    pub fn boxes(&self) -> &[Aabb] {
        &self.boxes
    }

    /// Bounds the Morton normalization was derived from.
    pub fn scene_bounds(&self) -> Aabb {
        self.scene_bounds
    }

    /// Original leaf indices in Morton order: the leaf at node `N-1+k`
    /// is input leaf `leaf_order()[k]`.
    pub fn leaf_order(&self) -> &[u32] {
        &self.leaf_order
    }

    pub fn parents(&self) -> &[i32] {
        &self.parent
    }

    pub fn left_children(&self) -> &[i32] {
        &self.left
    }

    pub fn right_children(&self) -> &[i32] {
        &self.right
    }

    pub fn escape_indices(&self) -> &[i32] {
        &self.escape
    }
}
