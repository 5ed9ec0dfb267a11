use rayon::prelude::*;
use rdst::RadixSort;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::aabb::Aabb;
use crate::morton::{morton_encode, MortonPrimitive};
use crate::vector::Vec3f32;

use super::BvhNode;

/// Reduce all leaf bounds into the scene-level bounding box.
///
/// Every split accumulates a local box over its stride of leaves; the
/// accumulations collapse in a tree reduction. min/max is associative, so
/// the result is bit-exact regardless of how the input gets split.
pub(super) fn reduce_scene_bounds(lower: &[Vec3f32], upper: &[Vec3f32]) -> Aabb {
    lower
        .par_iter()
        .zip(upper.par_iter())
        .fold(Aabb::empty, |acc, (lo, up)| {
            Aabb::merge(acc, Aabb::new(*lo, *up))
        })
        .reduce(Aabb::empty, Aabb::merge)
}

/// Compute a Morton code for every leaf from its scene-normalized center.
pub(super) fn assign_morton_codes(
    scene: &Aabb,
    lower: &[Vec3f32],
    upper: &[Vec3f32],
    prims: &mut [MortonPrimitive],
) {
    prims.par_iter_mut().enumerate().for_each(|(i, prim)| {
        let center = Aabb::new(lower[i], upper[i]).center();
        // The offset is per-axis; a zero-extent scene axis produces a
        // non-finite coordinate that the encoder clamps into the bottom cell.
        prim.code = morton_encode(scene.offset(center));
        prim.index = i as u32;
    });
}

/// Sort the (code, leaf) pairs by code, then original leaf index.
pub(super) fn sort_morton_primitives(prims: &mut Vec<MortonPrimitive>) {
    if cfg!(debug_assertions) {
        // rdst leans on release-mode unsigned wrapping that panics under
        // debug overflow checks, so debug builds take the comparison sort.
        prims.sort_unstable();
    } else {
        prims.radix_sort_unstable();
    }
}

#[inline]
fn clz(x: u32) -> i32 {
    x.leading_zeros() as i32
}

/// Length of the common bit prefix between two Morton codes. Equal codes
/// fall back to the positions themselves, offset past any real prefix, which
/// embeds a total order and keeps the radix tree unique under key collision.
#[inline]
fn common_prefix(m0: u32, m1: u32, i: i32, j: i32) -> i32 {
    if m0 != m1 {
        clz(m0 ^ m1)
    } else {
        clz((i as u32) ^ (j as u32)) + 32
    }
}

/// Common prefix between sorted positions `i` and `j`; out-of-range `j`
/// yields -1 so range expansion stops at the array ends.
#[inline]
fn delta(m0: u32, sorted: &[MortonPrimitive], i: i32, j: i32) -> i32 {
    if j < 0 || j >= sorted.len() as i32 {
        return -1;
    }
    common_prefix(m0, sorted[j as usize].code, i, j)
}

/// Find the sorted-leaf interval that internal node `i` covers.
fn determine_range(sorted: &[MortonPrimitive], i: i32) -> (i32, i32) {
    let m0 = sorted[i as usize].code;

    // Direction of the range (+1 or -1)
    let d_l = delta(m0, sorted, i, i - 1);
    let d_r = delta(m0, sorted, i, i + 1);
    let d = if d_r > d_l { 1 } else { -1 };

    // Upper bound for the length of the range
    let d_min = i32::min(d_l, d_r);
    let mut lmax: i32 = 2;
    while delta(m0, sorted, i, i + lmax * d) > d_min {
        lmax *= 2;
    }

    // Find the other end using binary search
    let mut l: i32 = 0;
    let mut t = lmax / 2;
    while t >= 1 {
        if delta(m0, sorted, i, i + (l + t) * d) > d_min {
            l += t;
        }
        t /= 2;
    }
    let j = i + l * d;

    (i32::min(i, j), i32::max(i, j))
}

/// Binary-search the highest position in `[first, last)` sharing more prefix
/// bits with `first` than the whole range does.
fn find_split(sorted: &[MortonPrimitive], first: i32, last: i32) -> i32 {
    let first_code = sorted[first as usize].code;
    let last_code = sorted[last as usize].code;
    let d_node = common_prefix(first_code, last_code, first, last);

    let mut split = first;
    let mut step = last - first;
    while step > 1 {
        step = (step + 1) / 2;
        let new_split = split + step;
        if new_split < last
            && common_prefix(first_code, sorted[new_split as usize].code, first, new_split) > d_node
        {
            split = new_split;
        }
    }

    split
}

/// Build the binary radix tree over the sorted Morton codes.
///
/// One task per internal node, following Karras, "Maximizing Parallelism in
/// the Construction of BVHs, Octrees, and k-d Trees" (2012). Leaves occupy
/// node indices `[N-1, 2N-1)`; internal nodes `[0, N-1)` with the root at 0.
pub(super) fn construct_radix_tree(
    sorted: &[MortonPrimitive],
    left: &mut [i32],
    right: &mut [i32],
    parent: &mut [i32],
) {
    let num_leaves = sorted.len() as i32;
    let parent = &*parent;
    left.par_iter_mut()
        .zip(right.par_iter_mut())
        .enumerate()
        .for_each(|(i, (left_out, right_out))| {
            let i = i as i32;
            let (first, last) = determine_range(sorted, i);
            let split = find_split(sorted, first, last);

            // A child that coincides with its range end is a leaf
            let mut left_child = split;
            let mut right_child = split + 1;
            if first == left_child {
                left_child += num_leaves - 1;
            }
            if last == right_child {
                right_child += num_leaves - 1;
            }

            *left_out = left_child;
            *right_out = right_child;

            // Safety: every node has exactly one parent, so each parent slot
            // is written by exactly one task in this launch; slot 0 belongs
            // to the root and only task 0 touches it.
            unsafe {
                let parents = parent.as_ptr().cast_mut();
                *parents.add(left_child as usize) = i;
                *parents.add(right_child as usize) = i;
                if i == 0 {
                    *parents = -1;
                }
            }
        });
}

/// Check the radix-tree topology. Returns the number of violations found;
/// each one is logged. Does not touch the tree.
pub(super) fn verify_radix_tree(
    num_leaves: usize,
    left: &[i32],
    right: &[i32],
    parent: &[i32],
) -> usize {
    let num_internal_nodes = num_leaves as i32 - 1;
    let num_total_nodes = 2 * num_leaves as i32 - 1;

    (0..num_total_nodes)
        .into_par_iter()
        .map(|tid| {
            let mut errors = 0usize;
            if tid < num_internal_nodes {
                let left_child = left[tid as usize];
                let right_child = right[tid as usize];
                if !(0 < left_child && left_child < num_total_nodes) {
                    log::error!("node {tid} has invalid left child {left_child}");
                    errors += 1;
                } else if parent[left_child as usize] != tid {
                    log::error!(
                        "node {tid} has wrong parent {}",
                        parent[left_child as usize]
                    );
                    errors += 1;
                }
                if !(0 < right_child && right_child < num_total_nodes) {
                    log::error!("node {tid} has invalid right child {right_child}");
                    errors += 1;
                } else if parent[right_child as usize] != tid {
                    log::error!(
                        "node {tid} has wrong parent {}",
                        parent[right_child as usize]
                    );
                    errors += 1;
                }
            }

            let p = parent[tid as usize];
            if !(-1 <= p && p < num_internal_nodes) {
                log::error!("node {tid} has invalid parent {p}");
                errors += 1;
            } else if (tid == 0) != (p == -1) {
                log::error!("node {tid} has invalid parent {p}");
                errors += 1;
            } else if p != -1 && left[p as usize] != tid && right[p as usize] != tid {
                log::error!("node {tid} is not acknowledged by its parent {p}");
                errors += 1;
            }
            errors
        })
        .sum()
}

/// Assign the depth-first skip link for every node.
///
/// Internal node `i` is the only node whose left subtree exits into
/// `right[i]`, and the nodes that exit there are exactly the right spine of
/// `left[i]`. Each task seeds that spine; the one extra task walks the
/// root's right spine, which escapes to nothing.
pub(super) fn assign_escape_indices(
    num_leaves: usize,
    left: &[i32],
    right: &[i32],
    escape: &mut [i32],
) {
    let num_internal_nodes = num_leaves - 1;
    let escape = &*escape;
    (0..num_leaves).into_par_iter().for_each(|tid| {
        let (mut current, escape_index) = if tid < num_internal_nodes {
            (left[tid], right[tid])
        } else {
            (0, -1)
        };

        // Safety: the right-spine chains seeded here partition the node set,
        // so no two tasks write the same slot.
        unsafe {
            let escapes = escape.as_ptr().cast_mut();
            *escapes.add(current as usize) = escape_index;
            while (current as usize) < num_internal_nodes {
                current = right[current as usize];
                *escapes.add(current as usize) = escape_index;
            }
        }
    });
}

/// Bottom-up bounding box propagation.
///
/// One task per sorted leaf writes the leaf box, then climbs. At each parent
/// the rendezvous counter decides: the first arrival retires and the second,
/// which can see both children, merges and continues. `AcqRel` on the
/// counter publishes the early arriver's box write to the late one.
pub(super) fn refit_bounds(
    num_leaves: usize,
    left: &[i32],
    right: &[i32],
    parent: &[i32],
    lower: &[Vec3f32],
    upper: &[Vec3f32],
    leaf_order: &[u32],
    flags: &[AtomicU32],
    boxes: &mut [Aabb],
) {
    let boxes = &*boxes;
    (0..num_leaves).into_par_iter().for_each(|tid| {
        // Safety: the leaf slot belongs to this task alone, and every
        // internal slot is written only by the second arrival at it, after
        // the flag increment ordered it after the sibling's write.
        let boxes_out = boxes.as_ptr().cast_mut();

        let leaf_index = leaf_order[tid] as usize;
        let mut current = num_leaves - 1 + tid;
        let mut aabb = Aabb::new(lower[leaf_index], upper[leaf_index]);
        unsafe {
            *boxes_out.add(current) = aabb;
        }

        let mut parent_index = parent[current];
        while parent_index != -1 {
            if flags[parent_index as usize].fetch_add(1, Ordering::AcqRel) == 0 {
                // First arrival; the sibling task completes the merge
                return;
            }
            let left_child = left[parent_index as usize] as usize;
            let right_child = right[parent_index as usize] as usize;
            let sibling = if current == left_child {
                right_child
            } else {
                left_child
            };
            unsafe {
                aabb = Aabb::merge(aabb, *boxes.as_ptr().add(sibling));
            }

            current = parent_index as usize;
            parent_index = parent[current];
            unsafe {
                *boxes_out.add(current) = aabb;
            }
        }
    });
}

/// Pack per-node state into the contiguous traversal records.
///
/// A negative link marks a leaf; the original leaf id comes back as
/// `-link - 1`. Internal links point at the left child, whose escape index
/// recovers the right child during traversal.
pub(super) fn compact_nodes(
    num_leaves: usize,
    boxes: &[Aabb],
    left: &[i32],
    leaf_order: &[u32],
    escape: &[i32],
    nodes: &mut [BvhNode],
) {
    let num_internal_nodes = num_leaves - 1;
    nodes.par_iter_mut().enumerate().for_each(|(tid, node)| {
        let link = if tid < num_internal_nodes {
            left[tid]
        } else {
            -(leaf_order[tid - num_internal_nodes] as i32) - 1
        };
        *node = BvhNode {
            lower: boxes[tid].lower,
            link,
            upper: boxes[tid].upper,
            escape: escape[tid],
        };
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Leaves reachable from the root through left/right links.
    fn count_reachable_leaves(num_leaves: usize, left: &[i32], right: &[i32]) -> usize {
        fn walk(node: i32, num_internal: i32, left: &[i32], right: &[i32]) -> usize {
            if node >= num_internal {
                return 1;
            }
            walk(left[node as usize], num_internal, left, right)
                + walk(right[node as usize], num_internal, left, right)
        }
        if num_leaves <= 1 {
            return num_leaves;
        }
        walk(0, num_leaves as i32 - 1, left, right)
    }

    fn prims_from_codes(codes: &[u32]) -> Vec<MortonPrimitive> {
        codes
            .iter()
            .enumerate()
            .map(|(index, &code)| MortonPrimitive {
                code,
                index: index as u32,
            })
            .collect()
    }

    fn build_topology(codes: &[u32]) -> (Vec<i32>, Vec<i32>, Vec<i32>) {
        let sorted = prims_from_codes(codes);
        let n = codes.len();
        let mut left = vec![0; n - 1];
        let mut right = vec![0; n - 1];
        let mut parent = vec![0; 2 * n - 1];
        construct_radix_tree(&sorted, &mut left, &mut right, &mut parent);
        (left, right, parent)
    }

    #[test]
    fn scene_bounds_cover_all_leaves() {
        let lower = vec![
            Vec3f32::new(0.0, 0.0, 0.0),
            Vec3f32::new(-3.0, 1.0, 2.0),
            Vec3f32::new(1.0, -5.0, 0.0),
        ];
        let upper = vec![
            Vec3f32::new(1.0, 1.0, 1.0),
            Vec3f32::new(-2.0, 4.0, 3.0),
            Vec3f32::new(2.0, -4.0, 9.0),
        ];
        let scene = reduce_scene_bounds(&lower, &upper);
        assert_eq!(scene.lower, Vec3f32::new(-3.0, -5.0, 0.0));
        assert_eq!(scene.upper, Vec3f32::new(2.0, 4.0, 9.0));
    }

    #[test]
    fn sort_breaks_ties_by_leaf_index() {
        let mut prims = prims_from_codes(&[7, 3, 7, 3, 7]);
        sort_morton_primitives(&mut prims);
        let order: Vec<(u32, u32)> = prims.iter().map(|p| (p.code, p.index)).collect();
        assert_eq!(order, vec![(3, 1), (3, 3), (7, 0), (7, 2), (7, 4)]);
    }

    #[test]
    fn two_leaves_make_one_root() {
        let (left, right, parent) = build_topology(&[1, 2]);
        assert_eq!(left[0], 1); // leaf at position 0 -> node 1
        assert_eq!(right[0], 2);
        assert_eq!(parent, vec![-1, 0, 0]);
    }

    #[test]
    fn distinct_codes_build_karras_shape() {
        // 4 keys with a clean top-bit split: {0b00.., 0b01..} | {0b10.., 0b11..}
        let (left, right, parent) = build_topology(&[0b0001, 0b0111, 0b1000, 0b1110]);
        // root splits the range in the middle into two internal nodes
        assert_eq!((left[0], right[0]), (1, 2));
        assert_eq!(parent[0], -1);
        // each covers a two-leaf range
        assert_eq!((left[1], right[1]), (3, 4));
        assert_eq!((left[2], right[2]), (5, 6));
        assert_eq!(&parent[1..], &[0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn equal_codes_fall_back_to_position_split() {
        let n = 8;
        let (left, right, parent) = build_topology(&vec![42u32; n]);
        assert_eq!(verify_radix_tree(n, &left, &right, &parent), 0);
        assert_eq!(count_reachable_leaves(n, &left, &right), n);
        // position tie-break splits the root range down the middle
        assert_eq!((left[0], right[0]), (3, 4));
    }

    #[test]
    fn verification_flags_a_bad_parent() {
        let (left, right, mut parent) = build_topology(&[1, 2, 4, 8]);
        assert_eq!(verify_radix_tree(4, &left, &right, &parent), 0);
        parent[3] = 2; // break one leaf's parent link
        assert!(verify_radix_tree(4, &left, &right, &parent) > 0);
    }

    #[test]
    fn escape_chains_cover_every_node() {
        let sorted = prims_from_codes(&[0b0001, 0b0111, 0b1000, 0b1110]);
        let n = sorted.len();
        let mut left = vec![0; n - 1];
        let mut right = vec![0; n - 1];
        let mut parent = vec![0; 2 * n - 1];
        construct_radix_tree(&sorted, &mut left, &mut right, &mut parent);

        let mut escape = vec![i32::MIN; 2 * n - 1];
        assign_escape_indices(n, &left, &right, &mut escape);

        // node layout from `distinct_codes_build_karras_shape`:
        // 0 -> (1, 2), 1 -> (leaf 3, leaf 4), 2 -> (leaf 5, leaf 6)
        assert_eq!(escape[0], -1);
        assert_eq!(escape[1], 2); // skipping the left subtree lands on node 2
        assert_eq!(escape[3], 4);
        assert_eq!(escape[4], 2); // last node of the left subtree
        assert_eq!(escape[5], 6);
        assert_eq!(escape[2], -1); // right spine of the root
        assert_eq!(escape[6], -1);
        assert!(escape.iter().all(|&e| e != i32::MIN));
    }

    #[test]
    fn refit_merges_up_to_the_root() {
        let sorted = prims_from_codes(&[0b0001, 0b0111, 0b1000, 0b1110]);
        let n = sorted.len();
        let mut left = vec![0; n - 1];
        let mut right = vec![0; n - 1];
        let mut parent = vec![0; 2 * n - 1];
        construct_radix_tree(&sorted, &mut left, &mut right, &mut parent);

        let lower: Vec<_> = (0..n).map(|i| Vec3f32::new(i as f32, 0.0, 0.0)).collect();
        let upper: Vec<_> = (0..n)
            .map(|i| Vec3f32::new(i as f32 + 1.0, 1.0, 1.0))
            .collect();
        let leaf_order: Vec<u32> = (0..n as u32).collect();
        let flags: Vec<AtomicU32> = (0..n - 1).map(|_| AtomicU32::new(0)).collect();
        let mut boxes = vec![Aabb::empty(); 2 * n - 1];

        refit_bounds(
            n, &left, &right, &parent, &lower, &upper, &leaf_order, &flags, &mut boxes,
        );

        assert_eq!(
            boxes[0],
            Aabb::new(Vec3f32::new(0.0, 0.0, 0.0), Vec3f32::new(4.0, 1.0, 1.0))
        );
        for i in 0..n - 1 {
            let merged = Aabb::merge(boxes[left[i] as usize], boxes[right[i] as usize]);
            assert_eq!(boxes[i], merged, "internal node {i} is not the merge of its children");
        }
        // every flag saw both arrivals
        assert!(flags.iter().all(|f| f.load(Ordering::Relaxed) == 2));
    }
}
