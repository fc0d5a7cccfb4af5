//! Tile bounding volumes
//!
//! Tileset documents describe bounds as oriented boxes, spheres or geographic
//! regions. Regions are converted to oriented boxes when parsed, so at
//! runtime every volume is either a box or a sphere.

use crate::core::types::{DMat3, DMat4, DVec3};
use super::aabb::Aabb;
use super::frustum::Frustum;
use super::ray::Ray;

/// Box with arbitrary orientation: a center plus three half-axis vectors
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedBox {
    pub center: DVec3,
    /// Columns are the half-axis vectors
    pub half_axes: DMat3,
}

impl OrientedBox {
    pub fn new(center: DVec3, half_axes: DMat3) -> Self {
        Self { center, half_axes }
    }

    /// Build from the `[cx, cy, cz, xx, xy, xz, yx, yy, yz, zx, zy, zz]` layout
    pub fn from_array(values: [f64; 12]) -> Self {
        Self {
            center: DVec3::new(values[0], values[1], values[2]),
            half_axes: DMat3::from_cols(
                DVec3::new(values[3], values[4], values[5]),
                DVec3::new(values[6], values[7], values[8]),
                DVec3::new(values[9], values[10], values[11]),
            ),
        }
    }

    pub fn from_aabb(aabb: &Aabb) -> Self {
        let half = aabb.half_extent();
        Self {
            center: aabb.center(),
            half_axes: DMat3::from_diagonal(half),
        }
    }

    pub fn axes(&self) -> [DVec3; 3] {
        [self.half_axes.x_axis, self.half_axes.y_axis, self.half_axes.z_axis]
    }

    /// Unit direction and half length of each axis
    ///
    /// A zero-length axis of an otherwise flat box takes the direction
    /// perpendicular to the other two so that distances along the box normal
    /// are still measured.
    fn frame(&self) -> [(DVec3, f64); 3] {
        let axes = self.axes();
        let mut frame = axes.map(|a| (a.normalize_or_zero(), a.length()));
        for i in 0..3 {
            if frame[i].1 == 0.0 {
                let other = frame[(i + 1) % 3].0.cross(frame[(i + 2) % 3].0);
                frame[i].0 = other.normalize_or_zero();
            }
        }
        frame
    }

    pub fn aabb(&self) -> Aabb {
        let extent = self.half_axes.x_axis.abs() + self.half_axes.y_axis.abs() + self.half_axes.z_axis.abs();
        Aabb::from_center_half_extent(self.center, extent)
    }

    pub fn corners(&self) -> [DVec3; 8] {
        let [a, b, c] = self.axes();
        std::array::from_fn(|i| {
            let sx = if i & 1 != 0 { 1.0 } else { -1.0 };
            let sy = if i & 2 != 0 { 1.0 } else { -1.0 };
            let sz = if i & 4 != 0 { 1.0 } else { -1.0 };
            self.center + a * sx + b * sy + c * sz
        })
    }

    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        let offset = point - self.center;
        let mut sq = 0.0;
        for (direction, half_length) in self.frame() {
            let excess = (offset.dot(direction).abs() - half_length).max(0.0);
            sq += excess * excess;
        }
        sq.sqrt()
    }

    pub fn transformed(&self, matrix: &DMat4) -> Self {
        Self {
            center: matrix.transform_point3(self.center),
            half_axes: DMat3::from_cols(
                matrix.transform_vector3(self.half_axes.x_axis),
                matrix.transform_vector3(self.half_axes.y_axis),
                matrix.transform_vector3(self.half_axes.z_axis),
            ),
        }
    }

    /// Entry distance of a ray, 0 when the origin is inside
    pub fn ray_intersection(&self, ray: &Ray) -> Option<f64> {
        if self.half_axes.determinant().abs() < f64::EPSILON {
            return ray.intersects_aabb(&self.aabb()).map(|(t, _)| t);
        }
        // Map the box onto [-1, 1]^3; keeping the direction unnormalized
        // preserves the ray parameter.
        let to_local = self.half_axes.inverse();
        let local = Ray::new(to_local * (ray.origin - self.center), to_local * ray.direction);
        let unit = Aabb::new(DVec3::NEG_ONE, DVec3::ONE);
        local.intersects_aabb(&unit).map(|(t, _)| t)
    }
}

/// Sphere bounding volume
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_center_half_extent(self.center, DVec3::splat(self.radius))
    }

    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        (point.distance(self.center) - self.radius).max(0.0)
    }

    /// Radius is scaled by the largest axis scale of the transform
    pub fn transformed(&self, matrix: &DMat4) -> Self {
        let scale = matrix
            .x_axis.truncate().length()
            .max(matrix.y_axis.truncate().length())
            .max(matrix.z_axis.truncate().length());
        Self {
            center: matrix.transform_point3(self.center),
            radius: self.radius * scale,
        }
    }
}

/// Tile bounding volume
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundingVolume {
    Box(OrientedBox),
    Sphere(BoundingSphere),
}

impl BoundingVolume {
    pub fn from_aabb(aabb: &Aabb) -> Self {
        BoundingVolume::Box(OrientedBox::from_aabb(aabb))
    }

    /// Axis-aligned box enclosing the volume
    pub fn aabb(&self) -> Aabb {
        match self {
            BoundingVolume::Box(obb) => obb.aabb(),
            BoundingVolume::Sphere(sphere) => sphere.aabb(),
        }
    }

    pub fn center(&self) -> DVec3 {
        match self {
            BoundingVolume::Box(obb) => obb.center,
            BoundingVolume::Sphere(sphere) => sphere.center,
        }
    }

    /// Zero-size or non-finite volumes cannot produce a meaningful
    /// screen-space error.
    ///
    /// A flat box (one zero axis) is not degenerate.
    pub fn is_degenerate(&self) -> bool {
        match self {
            BoundingVolume::Box(obb) => {
                !obb.center.is_finite()
                    || !obb.half_axes.is_finite()
                    || obb.axes().iter().all(|a| a.length_squared() == 0.0)
            }
            BoundingVolume::Sphere(sphere) => {
                !sphere.center.is_finite() || !sphere.radius.is_finite() || sphere.radius <= 0.0
            }
        }
    }

    /// Distance from a point to the volume surface, 0 inside
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        match self {
            BoundingVolume::Box(obb) => obb.distance_to_point(point),
            BoundingVolume::Sphere(sphere) => sphere.distance_to_point(point),
        }
    }

    pub fn intersects_frustum(&self, frustum: &Frustum) -> bool {
        match self {
            BoundingVolume::Box(obb) => frustum.intersects_obb(obb.center, obb.axes()),
            BoundingVolume::Sphere(sphere) => frustum.intersects_sphere(sphere.center, sphere.radius),
        }
    }

    pub fn ray_intersection(&self, ray: &Ray) -> Option<f64> {
        match self {
            BoundingVolume::Box(obb) => obb.ray_intersection(ray),
            BoundingVolume::Sphere(sphere) => ray.intersects_sphere(sphere.center, sphere.radius),
        }
    }

    pub fn transformed(&self, matrix: &DMat4) -> Self {
        match self {
            BoundingVolume::Box(obb) => BoundingVolume::Box(obb.transformed(matrix)),
            BoundingVolume::Sphere(sphere) => BoundingVolume::Sphere(sphere.transformed(matrix)),
        }
    }

    /// Corners of the box drawn when outlining the volume
    pub fn outline_corners(&self) -> [DVec3; 8] {
        match self {
            BoundingVolume::Box(obb) => obb.corners(),
            BoundingVolume::Sphere(sphere) => sphere.aabb().corners(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> OrientedBox {
        OrientedBox::from_array([0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }

    #[test]
    fn test_obb_distance() {
        let obb = unit_box();
        assert_eq!(obb.distance_to_point(DVec3::ZERO), 0.0);
        assert!((obb.distance_to_point(DVec3::new(3.0, 0.0, 0.0)) - 2.0).abs() < 1e-12);
        let corner = obb.distance_to_point(DVec3::new(2.0, 2.0, 1.0));
        assert!((corner - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_flat_box_distance_along_normal() {
        // Terrain-like box with zero thickness in Z
        let obb = OrientedBox::from_array([0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0]);
        assert!((obb.distance_to_point(DVec3::new(0.0, 0.0, 5.0)) - 5.0).abs() < 1e-12);
        assert!(!BoundingVolume::Box(obb).is_degenerate());
    }

    #[test]
    fn test_rotated_box_aabb() {
        let rotation = DMat4::from_rotation_z(std::f64::consts::FRAC_PI_4);
        let obb = unit_box().transformed(&rotation);
        let aabb = obb.aabb();
        let expected = 2.0_f64.sqrt();
        assert!((aabb.max.x - expected).abs() < 1e-9);
        assert!((aabb.max.z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_volumes() {
        let point_box = OrientedBox::new(DVec3::ONE, DMat3::ZERO);
        assert!(BoundingVolume::Box(point_box).is_degenerate());
        assert!(BoundingVolume::Sphere(BoundingSphere::new(DVec3::ZERO, 0.0)).is_degenerate());
        assert!(BoundingVolume::Sphere(BoundingSphere::new(DVec3::ZERO, f64::NAN)).is_degenerate());
        assert!(!BoundingVolume::Sphere(BoundingSphere::new(DVec3::ZERO, 1.0)).is_degenerate());
    }

    #[test]
    fn test_sphere_transform_scales_radius() {
        let sphere = BoundingSphere::new(DVec3::ZERO, 2.0);
        let matrix = DMat4::from_scale_rotation_translation(
            DVec3::new(1.0, 3.0, 1.0),
            glam::DQuat::IDENTITY,
            DVec3::new(5.0, 0.0, 0.0),
        );
        let moved = sphere.transformed(&matrix);
        assert_eq!(moved.center, DVec3::new(5.0, 0.0, 0.0));
        assert!((moved.radius - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_ray_hits_rotated_box() {
        let rotation = DMat4::from_rotation_y(0.3);
        let volume = BoundingVolume::Box(unit_box().transformed(&rotation));
        let ray = Ray::new(DVec3::new(0.0, 0.0, 10.0), DVec3::NEG_Z);
        let t = volume.ray_intersection(&ray).unwrap();
        assert!(t > 8.0 && t < 9.0);

        let miss = Ray::new(DVec3::new(0.0, 5.0, 10.0), DVec3::NEG_Z);
        assert!(volume.ray_intersection(&miss).is_none());
    }
}
