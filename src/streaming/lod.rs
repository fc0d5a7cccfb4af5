//! Screen-space error metric
//!
//! A tile's geometric error is the world-space deviation of its content from
//! the real surface. Projected to the screen it gives the error in pixels; a
//! tile is detailed enough when that falls under the configured threshold.

use crate::core::Camera;
use crate::core::types::DVec3;
use crate::math::BoundingVolume;

use super::config::StreamingConfig;

/// Parameters of the refinement decision
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodConfig {
    /// Maximum tolerated screen-space error in pixels
    pub error_threshold: f64,
    /// Lower clamp for the camera-to-volume distance
    pub min_camera_distance: f64,
    /// Recursion guard for the traversal
    pub max_depth: u32,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self::from_config(&StreamingConfig::default())
    }
}

impl LodConfig {
    pub fn from_config(config: &StreamingConfig) -> Self {
        Self {
            error_threshold: config.error_threshold,
            min_camera_distance: config.min_camera_distance,
            max_depth: config.max_depth,
        }
    }

    /// True if a tile with this error should be replaced by its children
    pub fn needs_refinement(&self, sse: f64) -> bool {
        sse > self.error_threshold
    }
}

/// Screen-space error of a tile in pixels
///
/// # Arguments
/// * `geometric_error` - Tile error in world units
/// * `bounds` - Tile bounding volume
/// * `camera_position` - Camera position in the same frame as `bounds`
/// * `camera` - Supplies projection and viewport height
/// * `min_distance` - Distances below this are clamped to it
///
/// # Returns
/// `+inf` for degenerate volumes, so they always refine (bounded by the
/// traversal depth guard).
///
/// # Examples
/// ```
/// use tilestream::core::{Camera, types::DVec3};
/// use tilestream::math::{BoundingSphere, BoundingVolume};
/// use tilestream::streaming::lod::screen_space_error;
///
/// let camera = Camera::new(DVec3::ZERO, 90.0, 1000.0, 1000.0);
/// let bounds = BoundingVolume::Sphere(BoundingSphere::new(DVec3::new(0.0, 0.0, -110.0), 10.0));
/// let sse = screen_space_error(4.0, &bounds, camera.position, &camera, 0.01);
/// assert!((sse - 20.0).abs() < 1e-9);
/// ```
pub fn screen_space_error(
    geometric_error: f64,
    bounds: &BoundingVolume,
    camera_position: DVec3,
    camera: &Camera,
    min_distance: f64,
) -> f64 {
    if bounds.is_degenerate() {
        return f64::INFINITY;
    }
    if geometric_error == 0.0 {
        return 0.0;
    }
    let distance = bounds.distance_to_point(camera_position).max(min_distance);
    geometric_error * camera.pixels_per_unit(distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Projection;
    use crate::core::types::DMat3;
    use crate::math::{BoundingSphere, OrientedBox};

    fn sphere_at(z: f64, radius: f64) -> BoundingVolume {
        BoundingVolume::Sphere(BoundingSphere::new(DVec3::new(0.0, 0.0, z), radius))
    }

    #[test]
    fn test_perspective_sse() {
        // fov 90: tan(45) = 1, so sse = error * height / (2 * distance)
        let camera = Camera::new(DVec3::ZERO, 90.0, 800.0, 600.0);
        let sse = screen_space_error(10.0, &sphere_at(-60.0, 10.0), DVec3::ZERO, &camera, 0.01);
        assert!((sse - 10.0 * 600.0 / 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_sse_decreases_with_distance() {
        let camera = Camera::default();
        let near = screen_space_error(1.0, &sphere_at(-10.0, 1.0), DVec3::ZERO, &camera, 0.01);
        let far = screen_space_error(1.0, &sphere_at(-1000.0, 1.0), DVec3::ZERO, &camera, 0.01);
        assert!(near > far);
    }

    #[test]
    fn test_orthographic_sse_ignores_distance() {
        let mut camera = Camera::new(DVec3::ZERO, 60.0, 800.0, 500.0);
        camera.projection = Projection::Orthographic { height: 100.0 };
        let a = screen_space_error(2.0, &sphere_at(-10.0, 1.0), DVec3::ZERO, &camera, 0.01);
        let b = screen_space_error(2.0, &sphere_at(-900.0, 1.0), DVec3::ZERO, &camera, 0.01);
        assert_eq!(a, 10.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_inside_volume_uses_min_distance() {
        let camera = Camera::new(DVec3::ZERO, 90.0, 100.0, 100.0);
        let sse = screen_space_error(1.0, &sphere_at(0.0, 5.0), DVec3::ZERO, &camera, 0.5);
        assert!((sse - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_volume_is_infinite() {
        let camera = Camera::default();
        let point = BoundingVolume::Box(OrientedBox::new(DVec3::ZERO, DMat3::ZERO));
        assert_eq!(screen_space_error(1.0, &point, DVec3::ONE, &camera, 0.01), f64::INFINITY);
        assert_eq!(screen_space_error(0.0, &sphere_at(-5.0, 1.0), DVec3::ZERO, &camera, 0.01), 0.0);
    }

    #[test]
    fn test_needs_refinement() {
        let lod = LodConfig::default();
        assert!(lod.needs_refinement(6.5));
        assert!(!lod.needs_refinement(6.0));
        assert_eq!(lod.max_depth, 64);
    }
}
