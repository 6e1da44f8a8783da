//! 2D transforms for sprites and cameras.

use glam::{Mat4, Vec2, Vec3};

/// Position, rotation and scale in the XY plane.
///
/// Rotation is in degrees, counter-clockwise about +Z.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Translation in world units
    pub position: Vec2,
    /// Rotation in degrees
    pub rotation: f32,
    /// Per-axis scale
    pub scale: Vec2,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::ONE,
        }
    }
}

/// Translation, orientation and scale matrices of one transform.
struct Matrices {
    translation: Mat4,
    orientation: Mat4,
    scale: Mat4,
}

#[inline]
fn to_matrices(position: Vec2, rotation: f32, scale: Vec2) -> Matrices {
    Matrices {
        translation: Mat4::from_translation(position.extend(0.0)),
        orientation: Mat4::from_rotation_z(rotation.to_radians()),
        scale: Mat4::from_scale(Vec3::new(scale.x, scale.y, 1.0)),
    }
}

impl Transform {
    /// Create a transform at `position` with no rotation and unit scale.
    #[inline]
    pub fn from_position(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Object-to-world matrix: scale, then rotate, then translate.
    #[inline]
    pub fn model_matrix(&self) -> Mat4 {
        let m = to_matrices(self.position, self.rotation, self.scale);
        m.translation * m.orientation * m.scale
    }

    /// World-to-view matrix for a camera placed with this transform.
    ///
    /// Translation and rotation are inverted and applied in reverse order.
    /// Scale is not inverted and stays the first operation, so a larger
    /// scale zooms in.
    #[inline]
    pub fn view_matrix(&self) -> Mat4 {
        let m = to_matrices(-self.position, -self.rotation, self.scale);
        m.orientation * m.translation * m.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_transform_yields_identity_matrices() {
        let transform = Transform::default();
        assert_eq!(transform.model_matrix(), Mat4::IDENTITY);
        assert_eq!(transform.view_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn model_scales_then_rotates_then_translates() {
        let transform = Transform {
            position: Vec2::new(10.0, 0.0),
            rotation: 90.0,
            scale: Vec2::new(2.0, 2.0),
        };

        let p = transform.model_matrix().transform_point3(Vec3::X);
        assert_relative_eq!(p.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn view_moves_camera_position_to_origin() {
        let camera = Transform {
            position: Vec2::new(3.0, -4.0),
            rotation: 30.0,
            scale: Vec2::ONE,
        };

        let p = camera
            .view_matrix()
            .transform_point3(camera.position.extend(0.0));
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn view_counter_rotates_the_world() {
        let camera = Transform {
            rotation: 90.0,
            ..Transform::default()
        };

        let p = camera.view_matrix().transform_point3(Vec3::Y);
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn view_scale_is_not_inverted() {
        let camera = Transform {
            scale: Vec2::splat(2.0),
            ..Transform::default()
        };

        let p = camera.view_matrix().transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(p.x, 2.0);
        assert_relative_eq!(p.y, 2.0);
    }
}
