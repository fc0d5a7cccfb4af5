//! Camera description consumed by tile selection
//!
//! The camera is owned by the caller (windowing and controls live outside
//! this crate); every frame it is handed to the streamer, which derives the
//! view frustum and the pixel scale used for screen-space error.

use crate::core::types::{DMat3, DMat4, DQuat, DVec2, DVec3};
use crate::math::{Aabb, Frustum, Ray};

/// Projection parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    /// Perspective projection with vertical field of view in radians
    Perspective { fov_y: f64 },
    /// Orthographic projection with the visible height in world units
    Orthographic { height: f64 },
}

/// Camera with position, rotation, projection and viewport resolution
#[derive(Clone, Debug)]
pub struct Camera {
    /// World position
    pub position: DVec3,
    /// Rotation as quaternion
    pub rotation: DQuat,
    /// Projection model
    pub projection: Projection,
    /// Near clip plane
    pub near: f64,
    /// Far clip plane
    pub far: f64,
    /// Viewport size in pixels (width, height)
    pub viewport: DVec2,
}

impl Camera {
    /// Create a new perspective camera looking down -Z
    pub fn new(position: DVec3, fov_y_degrees: f64, viewport_width: f64, viewport_height: f64) -> Self {
        Self {
            position,
            rotation: DQuat::IDENTITY,
            projection: Projection::Perspective { fov_y: fov_y_degrees.to_radians() },
            near: 1.0,
            far: 4000.0,
            viewport: DVec2::new(viewport_width, viewport_height),
        }
    }

    /// Create camera looking at a target
    pub fn look_at(position: DVec3, target: DVec3, up: DVec3) -> Self {
        let mut camera = Self::default();
        camera.position = position;
        camera.face(target, up);
        camera
    }

    /// Rotate the camera so that it faces `target`
    pub fn face(&mut self, target: DVec3, up: DVec3) {
        let forward = (target - self.position).normalize_or_zero();
        if forward == DVec3::ZERO {
            return;
        }
        let mut right = forward.cross(up);
        if right.length_squared() < 1e-12 {
            // Looking straight along `up`; pick any perpendicular axis.
            right = forward.any_orthonormal_vector();
        }
        let right = right.normalize();
        let up = right.cross(forward);
        self.rotation = DQuat::from_mat3(&DMat3::from_cols(right, up, -forward));
    }

    /// Width / height of the viewport
    pub fn aspect(&self) -> f64 {
        if self.viewport.y > 0.0 {
            self.viewport.x / self.viewport.y
        } else {
            1.0
        }
    }

    /// Get view matrix (world to camera space)
    pub fn view_matrix(&self) -> DMat4 {
        let rotation_matrix = DMat4::from_quat(self.rotation.conjugate());
        let translation_matrix = DMat4::from_translation(-self.position);
        rotation_matrix * translation_matrix
    }

    /// Get projection matrix (camera to clip space)
    ///
    /// Uses OpenGL clip-space depth (-1..1) so that frustum planes extract
    /// directly from matrix rows.
    pub fn projection_matrix(&self) -> DMat4 {
        match self.projection {
            Projection::Perspective { fov_y } => {
                DMat4::perspective_rh_gl(fov_y, self.aspect(), self.near, self.far)
            }
            Projection::Orthographic { height } => {
                let half_h = height * 0.5;
                let half_w = half_h * self.aspect();
                DMat4::orthographic_rh_gl(-half_w, half_w, -half_h, half_h, self.near, self.far)
            }
        }
    }

    /// Get combined view-projection matrix
    pub fn view_projection(&self) -> DMat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// World-space view frustum
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    /// Get forward direction (negative Z in camera space)
    pub fn forward(&self) -> DVec3 {
        self.rotation * -DVec3::Z
    }

    /// Get right direction (positive X in camera space)
    pub fn right(&self) -> DVec3 {
        self.rotation * DVec3::X
    }

    /// Get up direction (positive Y in camera space)
    pub fn up(&self) -> DVec3 {
        self.rotation * DVec3::Y
    }

    /// Update viewport resolution (call on window resize)
    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.viewport = DVec2::new(width, height);
    }

    /// Pixels covered by one world unit at `distance` along the view axis.
    ///
    /// Screen-space error is `geometric_error * pixels_per_unit(distance)`.
    /// Orthographic projections ignore the distance.
    pub fn pixels_per_unit(&self, distance: f64) -> f64 {
        match self.projection {
            Projection::Perspective { fov_y } => {
                let sse_denominator = 2.0 * (fov_y * 0.5).tan();
                self.viewport.y / (distance * sse_denominator)
            }
            Projection::Orthographic { height } => self.viewport.y / height,
        }
    }

    /// Ray from the camera through a pixel (origin at the top-left corner)
    pub fn ray_through_pixel(&self, x: f64, y: f64) -> Ray {
        let ndc_x = (x / self.viewport.x) * 2.0 - 1.0;
        let ndc_y = 1.0 - (y / self.viewport.y) * 2.0;
        let inverse = self.view_projection().inverse();
        let near = inverse.project_point3(DVec3::new(ndc_x, ndc_y, -1.0));
        let far = inverse.project_point3(DVec3::new(ndc_x, ndc_y, 1.0));
        Ray::new(near, (far - near).normalize())
    }

    /// Move the camera back along its view direction until `bounds` fills
    /// the view, then tighten the clip planes around it.
    ///
    /// `fit_offset` scales the resulting distance; values below 1.0 move the
    /// camera in closer. Returns the chosen distance to the bounds center.
    pub fn fit_to_bounds(&mut self, bounds: &Aabb, fit_offset: f64) -> f64 {
        if bounds.is_empty() {
            return 0.0;
        }
        let size = bounds.size();
        let center = bounds.center();
        let max_size = size.x.max(size.y).max(size.z);
        let aspect = self.aspect();

        let distance = match &mut self.projection {
            Projection::Perspective { fov_y } => {
                let fit_height_distance = max_size / (2.0 * (*fov_y * 0.5).tan());
                let fit_width_distance = fit_height_distance / aspect;
                fit_offset * fit_height_distance.max(fit_width_distance)
            }
            Projection::Orthographic { height } => {
                *height = max_size.max(f64::EPSILON);
                max_size * fit_offset
            }
        };
        let distance = distance.max(f64::EPSILON);

        let direction = self.forward();
        self.position = center - direction * distance;
        self.near = distance / 100.0;
        self.far = distance * 100.0;
        distance
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(DVec3::new(0.0, 100.0, 100.0), 60.0, 1280.0, 720.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directions() {
        let camera = Camera::default();

        // Default camera looks down -Z
        let forward = camera.forward();
        assert!((forward.z - (-1.0)).abs() < 1e-9);

        let right = camera.right();
        assert!((right.x - 1.0).abs() < 1e-9);

        let up = camera.up();
        assert!((up.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_view_matrix_translation() {
        let mut camera = Camera::default();
        camera.position = DVec3::new(10.0, 0.0, 0.0);

        let view = camera.view_matrix();
        let origin_in_camera = view.transform_point3(DVec3::ZERO);
        assert!((origin_in_camera.x - (-10.0)).abs() < 1e-9);
    }

    #[test]
    fn test_look_at_faces_target() {
        let camera = Camera::look_at(DVec3::new(0.0, 0.0, 10.0), DVec3::ZERO, DVec3::Y);
        let forward = camera.forward();
        assert!((forward - DVec3::new(0.0, 0.0, -1.0)).length() < 1e-9);
    }

    #[test]
    fn test_look_at_straight_down() {
        let camera = Camera::look_at(DVec3::new(0.0, 50.0, 0.0), DVec3::ZERO, DVec3::Y);
        let forward = camera.forward();
        assert!((forward - DVec3::NEG_Y).length() < 1e-9);
    }

    #[test]
    fn test_pixels_per_unit_perspective() {
        // 90 degree fov: tan(45) = 1, so denominator is 2
        let camera = Camera::new(DVec3::ZERO, 90.0, 1000.0, 1000.0);
        let ppu = camera.pixels_per_unit(10.0);
        assert!((ppu - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_pixels_per_unit_orthographic() {
        let mut camera = Camera::new(DVec3::ZERO, 60.0, 800.0, 400.0);
        camera.projection = Projection::Orthographic { height: 200.0 };
        assert!((camera.pixels_per_unit(1.0) - 2.0).abs() < 1e-9);
        assert!((camera.pixels_per_unit(1000.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_to_bounds_contains_box() {
        let mut camera = Camera::look_at(DVec3::new(0.0, 0.0, 10.0), DVec3::ZERO, DVec3::Y);
        let bounds = Aabb::new(DVec3::splat(-50.0), DVec3::splat(50.0));

        let distance = camera.fit_to_bounds(&bounds, 1.5);
        assert!(distance > 0.0);
        assert!((camera.position - DVec3::new(0.0, 0.0, distance)).length() < 1e-6);
        assert!((camera.near - distance / 100.0).abs() < 1e-9);
        assert!((camera.far - distance * 100.0).abs() < 1e-9);

        let frustum = camera.frustum();
        assert!(frustum.contains_point(bounds.center()));
    }

    #[test]
    fn test_fit_to_empty_bounds_is_noop() {
        let mut camera = Camera::default();
        let before = camera.position;
        assert_eq!(camera.fit_to_bounds(&Aabb::EMPTY, 1.0), 0.0);
        assert_eq!(camera.position, before);
    }

    #[test]
    fn test_ray_through_center_pixel() {
        let camera = Camera::look_at(DVec3::new(0.0, 0.0, 10.0), DVec3::ZERO, DVec3::Y);
        let ray = camera.ray_through_pixel(camera.viewport.x * 0.5, camera.viewport.y * 0.5);
        assert!((ray.direction - DVec3::NEG_Z).length() < 1e-6);
    }
}
