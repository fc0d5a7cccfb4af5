//! View frustum for culling

use crate::core::types::{DMat4, DVec3, DVec4};
use super::aabb::Aabb;

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix
    ///
    /// Expects OpenGL clip-space depth (-1..1). Passing `vp * model`
    /// yields the frustum in the model's local space.
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let m = vp.to_cols_array_2d();
        let row = |r: usize| DVec4::new(m[0][r], m[1][r], m[2][r], m[3][r]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let left = Self::normalize_plane(r3 + r0);
        let right = Self::normalize_plane(r3 - r0);
        let bottom = Self::normalize_plane(r3 + r1);
        let top = Self::normalize_plane(r3 - r1);
        let near = Self::normalize_plane(r3 + r2);
        let far = Self::normalize_plane(r3 - r2);

        Self {
            planes: [near, far, left, right, top, bottom],
        }
    }

    fn normalize_plane(plane: DVec4) -> Plane {
        let normal = DVec3::new(plane.x, plane.y, plane.z);
        let len = normal.length();
        if len == 0.0 {
            // Degenerate projection; accept everything rather than nothing.
            return Plane::new(DVec3::ZERO, 1.0);
        }
        Plane {
            normal: normal / len,
            distance: plane.w / len,
        }
    }

    /// Check if point is inside frustum
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Check if AABB intersects frustum (conservative test)
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return false;
        }
        for plane in &self.planes {
            // Find the corner most aligned with plane normal (p-vertex)
            let p = DVec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );

            // If p-vertex is outside, AABB is completely outside
            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }

    /// Check if a sphere intersects the frustum (conservative test)
    pub fn intersects_sphere(&self, center: DVec3, radius: f64) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(center) >= -radius)
    }

    /// Check if an oriented box intersects the frustum (conservative test)
    ///
    /// `half_axes` are the box's column half-axis vectors.
    pub fn intersects_obb(&self, center: DVec3, half_axes: [DVec3; 3]) -> bool {
        for plane in &self.planes {
            let radius = half_axes
                .iter()
                .map(|axis| plane.normal.dot(*axis).abs())
                .sum::<f64>();
            if plane.distance_to_point(center) < -radius {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looking_down_neg_z() -> Frustum {
        let proj = DMat4::perspective_rh_gl(60.0_f64.to_radians(), 1.0, 0.1, 1000.0);
        let view = DMat4::look_at_rh(DVec3::new(0.0, 0.0, 5.0), DVec3::ZERO, DVec3::Y);
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn test_plane_distance() {
        let plane = Plane::new(DVec3::Y, 0.0); // XZ plane
        assert_eq!(plane.distance_to_point(DVec3::new(0.0, 5.0, 0.0)), 5.0);
        assert_eq!(plane.distance_to_point(DVec3::new(0.0, -3.0, 0.0)), -3.0);
    }

    #[test]
    fn test_frustum_contains_point() {
        let proj = DMat4::orthographic_rh_gl(-1.0, 1.0, -1.0, 1.0, 0.1, 100.0);
        let view = DMat4::look_at_rh(DVec3::new(0.0, 0.0, 5.0), DVec3::ZERO, DVec3::Y);
        let frustum = Frustum::from_view_projection(&(proj * view));

        assert!(frustum.contains_point(DVec3::ZERO));
        assert!(!frustum.contains_point(DVec3::new(0.0, 0.0, 10.0)));
    }

    #[test]
    fn test_aabb_in_front_and_behind() {
        let frustum = looking_down_neg_z();
        let ahead = Aabb::new(DVec3::splat(-1.0), DVec3::splat(1.0));
        let behind = Aabb::new(DVec3::new(-1.0, -1.0, 20.0), DVec3::new(1.0, 1.0, 22.0));
        assert!(frustum.intersects_aabb(&ahead));
        assert!(!frustum.intersects_aabb(&behind));
        assert!(!frustum.intersects_aabb(&Aabb::EMPTY));
    }

    #[test]
    fn test_sphere_straddling_plane() {
        let frustum = looking_down_neg_z();
        // Center behind the camera, but radius reaches into view
        assert!(frustum.intersects_sphere(DVec3::new(0.0, 0.0, 6.0), 5.0));
        assert!(!frustum.intersects_sphere(DVec3::new(0.0, 0.0, 60.0), 5.0));
    }

    #[test]
    fn test_obb_matches_aabb_when_axis_aligned() {
        let frustum = looking_down_neg_z();
        let axes = [DVec3::X, DVec3::Y, DVec3::Z];
        assert!(frustum.intersects_obb(DVec3::ZERO, axes));
        assert!(!frustum.intersects_obb(DVec3::new(500.0, 0.0, 0.0), axes));
    }
}
