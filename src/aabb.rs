///
/// Axis aligned bounding box
///
use crate::vector::Vec3f32;

///
/// ### Aabb
/// Axis aligned bounding box type, stored as a min/max corner pair.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Zeroable, bytemuck::Pod)]
pub struct Aabb {
    pub lower: Vec3f32,
    pub upper: Vec3f32,
}

impl Aabb {
    ///
    /// Create an empty bounding box including nothing.
    /// The inverted (+inf, -inf) corners are the identity of `merge`.
    pub fn empty() -> Aabb {
        Self {
            lower: Vec3f32::splat(f32::INFINITY),
            upper: Vec3f32::splat(f32::NEG_INFINITY),
        }
    }

    ///
    /// Create a bounding box from the given corners
    pub fn new(lower: Vec3f32, upper: Vec3f32) -> Aabb {
        Self { lower, upper }
    }

    /// Create a box of the given half extent around a center point
    pub fn around(center: Vec3f32, half_extent: Vec3f32) -> Aabb {
        Self {
            lower: Vec3f32::new(
                center.x - half_extent.x,
                center.y - half_extent.y,
                center.z - half_extent.z,
            ),
            upper: Vec3f32::new(
                center.x + half_extent.x,
                center.y + half_extent.y,
                center.z + half_extent.z,
            ),
        }
    }

    /// Get the center of the bounding box
    pub fn center(&self) -> Vec3f32 {
        Vec3f32::new(
            (self.lower.x + self.upper.x) * 0.5,
            (self.lower.y + self.upper.y) * 0.5,
            (self.lower.z + self.upper.z) * 0.5,
        )
    }

    /// Get the extents of the bounding box
    /// also called the diagonal
    pub fn extent(&self) -> Vec3f32 {
        Vec3f32::new(
            self.upper.x - self.lower.x,
            self.upper.y - self.lower.y,
            self.upper.z - self.lower.z,
        )
    }

    /// Get the surface area of the bounding box
    pub fn surface_area(&self) -> f32 {
        let d = self.extent();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Merge two bounding boxes into a new one covering both
    pub fn merge(a: Aabb, b: Aabb) -> Aabb {
        Self {
            lower: a.lower.min(b.lower),
            upper: a.upper.max(b.upper),
        }
    }

    /// Extend the bounding box to include the given point
    pub fn expand_point(&self, p: Vec3f32) -> Aabb {
        Self {
            lower: self.lower.min(p),
            upper: self.upper.max(p),
        }
    }

    /// Extend the bounding box to include the given bounding box
    pub fn include(&mut self, other: &Aabb) {
        self.lower = self.lower.min(other.lower);
        self.upper = self.upper.max(other.upper);
    }

    /// Relative position of a point inside the box: the lower corner maps
    /// to (0,0,0) and the upper corner to (1,1,1). An axis without extent
    /// divides by zero and comes out non-finite; the Morton encoder clamps
    /// such coordinates into its bottom cell.
    pub fn offset(&self, p: Vec3f32) -> Vec3f32 {
        let d = self.extent();
        Vec3f32::new(
            (p.x - self.lower.x) / d.x,
            (p.y - self.lower.y) / d.y,
            (p.z - self.lower.z) / d.z,
        )
    }

    /// Check if a point lies inside the bounding box (boundaries inclusive)
    pub fn contains_point(&self, p: Vec3f32) -> bool {
        p.x >= self.lower.x
            && p.y >= self.lower.y
            && p.z >= self.lower.z
            && p.x <= self.upper.x
            && p.y <= self.upper.y
            && p.z <= self.upper.z
    }

    /// Check if the bounding box overlaps with the other bounding box
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.lower.x <= other.upper.x
            && self.lower.y <= other.upper.y
            && self.lower.z <= other.upper.z
            && other.lower.x <= self.upper.x
            && other.lower.y <= self.upper.y
            && other.lower.z <= self.upper.z
    }

    /// Ray vs. bounding box intersection test (slab method).
    ///
    /// `inv_dir` is the component-wise reciprocal of the ray direction.
    /// Returns `(hit, tmin, tmax)`.
    pub fn intersect_ray(&self, origin: Vec3f32, inv_dir: Vec3f32) -> (bool, f32, f32) {
        let t1 = (self.lower.x - origin.x) * inv_dir.x;
        let t2 = (self.upper.x - origin.x) * inv_dir.x;

        let mut tmin = f32::min(t1, t2);
        let mut tmax = f32::max(t1, t2);

        let t1 = (self.lower.y - origin.y) * inv_dir.y;
        let t2 = (self.upper.y - origin.y) * inv_dir.y;

        tmin = f32::max(tmin, f32::min(t1, t2));
        tmax = f32::min(tmax, f32::max(t1, t2));

        let t1 = (self.lower.z - origin.z) * inv_dir.z;
        let t2 = (self.upper.z - origin.z) * inv_dir.z;

        tmin = f32::max(tmin, f32::min(t1, t2));
        tmax = f32::min(tmax, f32::max(t1, t2));

        let hit = tmax >= f32::max(tmin, 0.0);

        (hit, tmin, tmax)
    }

    /// Test intersection between a finite line segment and the bounding box
    pub fn intersect_segment(&self, p0: Vec3f32, p1: Vec3f32) -> bool {
        let inv_dir = Vec3f32::new(
            1.0 / (p1.x - p0.x),
            1.0 / (p1.y - p0.y),
            1.0 / (p1.z - p0.z),
        );
        let (hit, tmin, tmax) = self.intersect_ray(p0, inv_dir);
        hit && tmin <= 1.0 && tmax >= 0.0
    }
}

static_assertions::assert_eq_size!(Aabb, [f32; 6]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_merge_identity() {
        let b = Aabb::new(Vec3f32::new(-1.0, 0.0, 2.0), Vec3f32::new(3.0, 4.0, 5.0));
        assert_eq!(Aabb::merge(Aabb::empty(), b), b);
        assert_eq!(Aabb::merge(b, Aabb::empty()), b);
    }

    #[test]
    fn merge_covers_both() {
        let a = Aabb::new(Vec3f32::new(0.0, 0.0, 0.0), Vec3f32::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Vec3f32::new(2.0, -1.0, 0.5), Vec3f32::new(3.0, 0.5, 4.0));
        let m = Aabb::merge(a, b);
        assert_eq!(m.lower, Vec3f32::new(0.0, -1.0, 0.0));
        assert_eq!(m.upper, Vec3f32::new(3.0, 1.0, 4.0));
    }

    #[test]
    fn around_center_round_trips() {
        let b = Aabb::around(Vec3f32::new(1.0, 2.0, 3.0), Vec3f32::splat(0.5));
        assert_eq!(b.lower, Vec3f32::new(0.5, 1.5, 2.5));
        assert_eq!(b.upper, Vec3f32::new(1.5, 2.5, 3.5));
        assert_eq!(b.center(), Vec3f32::new(1.0, 2.0, 3.0));
        assert_eq!(b.extent(), Vec3f32::splat(1.0));
    }

    #[test]
    fn center_and_area() {
        let b = Aabb::new(Vec3f32::splat(0.0), Vec3f32::splat(2.0));
        assert_eq!(b.center(), Vec3f32::splat(1.0));
        assert_eq!(b.surface_area(), 24.0);
    }

    #[test]
    fn offset_maps_corners_to_unit_cube() {
        let b = Aabb::new(Vec3f32::new(-1.0, 0.0, 2.0), Vec3f32::new(1.0, 4.0, 3.0));
        assert_eq!(b.offset(b.lower), Vec3f32::splat(0.0));
        assert_eq!(b.offset(b.upper), Vec3f32::splat(1.0));
        assert_eq!(b.offset(b.center()), Vec3f32::splat(0.5));
    }

    #[test]
    fn overlap_and_containment() {
        let a = Aabb::new(Vec3f32::splat(0.0), Vec3f32::splat(1.0));
        let b = Aabb::new(Vec3f32::splat(0.5), Vec3f32::splat(2.0));
        let c = Aabb::new(Vec3f32::splat(1.5), Vec3f32::splat(2.0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(a.contains_point(Vec3f32::splat(0.5)));
        assert!(a.contains_point(Vec3f32::splat(1.0)));
        assert!(!a.contains_point(Vec3f32::new(1.1, 0.5, 0.5)));
    }

    #[test]
    fn ray_slab() {
        let b = Aabb::new(Vec3f32::splat(-1.0), Vec3f32::splat(1.0));
        // straight through the middle
        let (hit, tmin, tmax) = b.intersect_ray(
            Vec3f32::new(-5.0, 0.0, 0.0),
            Vec3f32::new(1.0, f32::INFINITY, f32::INFINITY),
        );
        assert!(hit);
        assert_eq!(tmin, 4.0);
        assert_eq!(tmax, 6.0);
        // pointing away
        let (hit, _, _) = b.intersect_ray(
            Vec3f32::new(-5.0, 0.0, 0.0),
            Vec3f32::new(-1.0, f32::INFINITY, f32::INFINITY),
        );
        assert!(!hit);
        // offset miss
        let (hit, _, _) = b.intersect_ray(
            Vec3f32::new(-5.0, 3.0, 0.0),
            Vec3f32::new(1.0, f32::INFINITY, f32::INFINITY),
        );
        assert!(!hit);
    }

    #[test]
    fn segment() {
        let b = Aabb::new(Vec3f32::splat(0.0), Vec3f32::splat(1.0));
        assert!(b.intersect_segment(Vec3f32::new(-1.0, 0.5, 0.5), Vec3f32::new(2.0, 0.5, 0.5)));
        // stops short of the box
        assert!(!b.intersect_segment(Vec3f32::new(-2.0, 0.5, 0.5), Vec3f32::new(-1.0, 0.5, 0.5)));
    }
}
