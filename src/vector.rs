/// Three-component f32 vector for AABB corners and points.
///
/// Deliberately minimal: the hierarchy passes work component-wise through
/// the AABB operations, so only the pieces they reach for live here.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Default, bytemuck::Zeroable, bytemuck::Pod)]
pub struct Vec3f32 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3f32 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// All three components set to the same value
    pub const fn splat(value: f32) -> Self {
        Self::new(value, value, value)
    }

    /// Component-wise minimum
    pub fn min(self, rhs: Self) -> Self {
        Self::new(
            f32::min(self.x, rhs.x),
            f32::min(self.y, rhs.y),
            f32::min(self.z, rhs.z),
        )
    }

    /// Component-wise maximum
    pub fn max(self, rhs: Self) -> Self {
        Self::new(
            f32::max(self.x, rhs.x),
            f32::max(self.y, rhs.y),
            f32::max(self.z, rhs.z),
        )
    }

    /// Component selected by axis number (0 = x, 1 = y, 2 = z)
    pub fn axis(self, axis: usize) -> f32 {
        [self.x, self.y, self.z][axis]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_min_max() {
        let a = Vec3f32::new(1.0, 5.0, -2.0);
        let b = Vec3f32::new(0.0, 7.0, -1.0);
        assert_eq!(a.min(b), Vec3f32::new(0.0, 5.0, -2.0));
        assert_eq!(a.max(b), Vec3f32::new(1.0, 7.0, -1.0));
    }

    #[test]
    fn splat_and_axis() {
        assert_eq!(Vec3f32::splat(3.5), Vec3f32::new(3.5, 3.5, 3.5));
        let v = Vec3f32::new(9.0, 8.0, 7.0);
        assert_eq!(v.axis(0), 9.0);
        assert_eq!(v.axis(1), 8.0);
        assert_eq!(v.axis(2), 7.0);
    }
}
