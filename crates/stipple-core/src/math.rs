//! Math utilities
//!
//! Re-exports from glam plus the bounds and frustum types used for
//! spatial partitioning and visibility culling.

pub use glam::{Mat4, Vec3, Vec4};

use serde::{Deserialize, Serialize};

/// Axis-aligned bounds of a set of points.
///
/// Only the corners are stored; the center is always derived as
/// `(min + max) / 2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Bounds {
    /// Bounds containing nothing
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create bounds from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Exact bounds of a point slice; `EMPTY` for no points
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::EMPTY;
        for &point in points {
            bounds.expand_to_include(point);
        }
        bounds
    }

    /// Get the center of the bounds
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the full size of the bounds
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Largest extent along any axis
    pub fn max_dimension(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        self.size().max_element()
    }

    /// Check if the bounds contain nothing
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Check if a point is inside the bounds (inclusive)
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if these bounds intersect another
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Expand the bounds to include a point
    pub fn expand_to_include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Merge with other bounds
    pub fn merge(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Octant index of a point relative to the center.
    ///
    /// `bit0 = x >= cx`, `bit1 = y >= cy`, `bit2 = z >= cz`.
    pub fn octant_index(&self, point: Vec3) -> u8 {
        let center = self.center();
        (point.x >= center.x) as u8
            | ((point.y >= center.y) as u8) << 1
            | ((point.z >= center.z) as u8) << 2
    }

    /// Bounds of one of the eight octants
    pub fn octant(&self, index: u8) -> Bounds {
        let center = self.center();
        let pick = |bit: u8, lo: f32, mid: f32, hi: f32| {
            if index & bit != 0 { (mid, hi) } else { (lo, mid) }
        };
        let (min_x, max_x) = pick(1, self.min.x, center.x, self.max.x);
        let (min_y, max_y) = pick(2, self.min.y, center.y, self.max.y);
        let (min_z, max_z) = pick(4, self.min.z, center.z, self.max.z);
        Bounds {
            min: Vec3::new(min_x, min_y, min_z),
            max: Vec3::new(max_x, max_y, max_z),
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A plane in 3D space (ax + by + cz + d = 0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector
    pub normal: Vec3,
    /// Distance from origin
    pub distance: f32,
}

impl Plane {
    /// Create a new plane
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Get the signed distance from a point to the plane
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// View frustum for culling
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    /// Frustum planes (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from a view-projection matrix
    pub fn from_matrix(matrix: Mat4) -> Self {
        let rows = [
            matrix.row(0),
            matrix.row(1),
            matrix.row(2),
            matrix.row(3),
        ];

        Self {
            planes: [
                Self::normalize_plane(rows[3] + rows[0]),
                Self::normalize_plane(rows[3] - rows[0]),
                Self::normalize_plane(rows[3] + rows[1]),
                Self::normalize_plane(rows[3] - rows[1]),
                // glam projections map depth to [0, 1]
                Self::normalize_plane(rows[2]),
                Self::normalize_plane(rows[3] - rows[2]),
            ],
        }
    }

    fn normalize_plane(plane: Vec4) -> Plane {
        let normal = plane.truncate();
        let length = normal.length();
        if length > 0.0 && length.is_finite() && plane.w.is_finite() {
            Plane {
                normal: normal / length,
                distance: plane.w / length,
            }
        } else {
            Plane::new(Vec3::ZERO, 0.0)
        }
    }

    /// A frustum with a collapsed or non-finite plane encloses no volume
    pub fn is_degenerate(&self) -> bool {
        self.planes.iter().any(|plane| plane.normal == Vec3::ZERO)
    }

    /// Check if bounds intersect the frustum
    pub fn intersects_bounds(&self, bounds: &Bounds) -> bool {
        if bounds.is_empty() {
            return false;
        }

        for plane in &self.planes {
            // Positive vertex: the corner furthest along the plane normal
            let p = Vec3::new(
                if plane.normal.x >= 0.0 { bounds.max.x } else { bounds.min.x },
                if plane.normal.y >= 0.0 { bounds.max.y } else { bounds.min.y },
                if plane.normal.z >= 0.0 { bounds.max.z } else { bounds.min.z },
            );

            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(eye: Vec3, target: Vec3) -> Mat4 {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        proj * view
    }

    #[test]
    fn test_bounds_center_is_derived() {
        let bounds = Bounds::new(Vec3::ZERO, Vec3::splat(2.0));
        assert_eq!(bounds.center(), Vec3::ONE);
        assert_eq!(bounds.size(), Vec3::splat(2.0));
        assert_eq!(bounds.max_dimension(), 2.0);
    }

    #[test]
    fn test_bounds_from_points() {
        let points = [
            Vec3::new(1.0, -2.0, 3.0),
            Vec3::new(-1.0, 5.0, 0.5),
            Vec3::new(0.0, 0.0, 9.0),
        ];
        let bounds = Bounds::from_points(&points);
        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, 0.5));
        assert_eq!(bounds.max, Vec3::new(1.0, 5.0, 9.0));

        assert!(Bounds::from_points(&[]).is_empty());
        assert_eq!(Bounds::EMPTY.max_dimension(), 0.0);
    }

    #[test]
    fn test_bounds_intersection() {
        let a = Bounds::new(Vec3::ZERO, Vec3::ONE);
        let b = Bounds::new(Vec3::splat(0.5), Vec3::splat(1.5));
        let c = Bounds::new(Vec3::splat(2.0), Vec3::splat(3.0));

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_octants_cover_parent() {
        let parent = Bounds::new(Vec3::ZERO, Vec3::splat(4.0));
        let mut merged = Bounds::EMPTY;
        for index in 0..8 {
            let octant = parent.octant(index);
            assert_eq!(octant.size(), Vec3::splat(2.0));
            merged = merged.merge(&octant);
        }
        assert_eq!(merged, parent);
    }

    #[test]
    fn test_octant_index_matches_octant_bounds() {
        let parent = Bounds::new(Vec3::ZERO, Vec3::splat(4.0));
        let samples = [
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(3.5, 0.5, 0.5),
            Vec3::new(0.5, 3.5, 0.5),
            Vec3::new(3.5, 3.5, 3.5),
            Vec3::new(2.0, 2.0, 2.0),
        ];
        for point in samples {
            let index = parent.octant_index(point);
            assert!(parent.octant(index).contains_point(point));
        }
        assert_eq!(parent.octant_index(Vec3::new(3.5, 0.5, 3.5)), 0b101);
    }

    #[test]
    fn test_frustum_culls_bounds_behind_camera() {
        let frustum = Frustum::from_matrix(camera(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO));
        assert!(!frustum.is_degenerate());

        let in_front = Bounds::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let behind = Bounds::new(Vec3::new(-1.0, -1.0, 20.0), Vec3::new(1.0, 1.0, 22.0));

        assert!(frustum.intersects_bounds(&in_front));
        assert!(!frustum.intersects_bounds(&behind));
        assert!(!frustum.intersects_bounds(&Bounds::EMPTY));
        assert!(frustum.intersects_bounds(&Bounds::new(Vec3::ZERO, Vec3::ZERO)));

        // Between the eye and the 0.1 near plane
        let too_close = Bounds::new(Vec3::new(-0.01, -0.01, 9.95), Vec3::new(0.01, 0.01, 9.96));
        assert!(!frustum.intersects_bounds(&too_close));
    }

    #[test]
    fn test_degenerate_frustum() {
        assert!(Frustum::from_matrix(Mat4::ZERO).is_degenerate());
    }

    #[test]
    fn test_plane_distance() {
        let plane = Plane::new(Vec3::Y, -1.0);
        assert_eq!(plane.distance_to_point(Vec3::new(5.0, 3.0, 0.0)), 2.0);
    }
}
