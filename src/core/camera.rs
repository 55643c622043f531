//! Double-precision camera and the view capability consumed by LOD selection

use crate::core::types::{DMat3, DMat4, DQuat, DVec3};
use crate::math::Frustum;

/// What LOD selection needs to know about a viewer.
///
/// Selection only reads the eye position, the clip planes (which drive the
/// LOD range table) and the view frustum. Anything that can answer these can
/// drive a selection pass, not just [`Camera`].
pub trait CameraView {
    /// World position of the eye
    fn position(&self) -> DVec3;
    fn near_plane(&self) -> f64;
    fn far_plane(&self) -> f64;
    /// World-space view frustum for the current view and projection
    fn view_frustum(&self) -> Frustum;
}

/// Perspective camera with a double precision view
#[derive(Clone, Debug)]
pub struct Camera {
    /// World position
    pub position: DVec3,
    /// Rotation as quaternion
    pub rotation: DQuat,
    /// Vertical field of view in radians
    pub fov_y: f64,
    /// Aspect ratio (width / height)
    pub aspect: f64,
    near: f64,
    far: f64,
}

impl Camera {
    /// Create a new camera looking down -Z
    pub fn new(position: DVec3, fov_y_degrees: f64, aspect: f64) -> Self {
        Self {
            position,
            rotation: DQuat::IDENTITY,
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near: 1.0,
            far: 1000.0,
        }
    }

    /// Create camera looking at a target
    pub fn look_at(position: DVec3, target: DVec3, up: DVec3) -> Self {
        let mut camera = Self::new(position, 60.0, 16.0 / 9.0);
        camera.set_position_and_target(position, target, up);
        camera
    }

    /// Move the camera and aim it at `target`.
    ///
    /// When the view direction is parallel to `up` (looking straight down at
    /// a terrain, for instance) world Z is used as the up hint instead.
    pub fn set_position_and_target(&mut self, position: DVec3, target: DVec3, up: DVec3) {
        let forward = (target - position).normalize();
        let mut right = forward.cross(up);
        if right.length_squared() < 1e-12 {
            right = forward.cross(DVec3::Z);
        }
        let right = right.normalize();
        let up = right.cross(forward);

        self.position = position;
        self.rotation = DQuat::from_mat3(&DMat3::from_cols(right, up, -forward));
    }

    pub fn near(&self) -> f64 {
        self.near
    }

    pub fn far(&self) -> f64 {
        self.far
    }

    /// Change the near clip plane. Selection contexts pick this up on their next reset.
    pub fn set_near_plane(&mut self, near: f64) {
        self.near = near;
    }

    /// Change the far clip plane. Selection contexts pick this up on their next reset.
    pub fn set_far_plane(&mut self, far: f64) {
        self.far = far;
    }

    /// Get view matrix (world to camera space)
    pub fn view_matrix(&self) -> DMat4 {
        let rotation_matrix = DMat4::from_quat(self.rotation.conjugate());
        let translation_matrix = DMat4::from_translation(-self.position);
        rotation_matrix * translation_matrix
    }

    /// Get projection matrix (camera to clip space)
    pub fn projection_matrix(&self) -> DMat4 {
        DMat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Get combined view-projection matrix
    pub fn view_projection(&self) -> DMat4 {
        self.projection_matrix() * self.view_matrix()
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
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(DVec3::new(0.0, 0.0, 5.0), 60.0, 16.0 / 9.0)
    }
}

impl CameraView for Camera {
    fn position(&self) -> DVec3 {
        self.position
    }

    fn near_plane(&self) -> f64 {
        self.near
    }

    fn far_plane(&self) -> f64 {
        self.far
    }

    fn view_frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }
}
