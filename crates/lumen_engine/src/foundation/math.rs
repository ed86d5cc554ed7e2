//! Math utilities and types
//!
//! Provides fundamental math types for 3D graphics. The engine treats these
//! as opaque value types; all heavy lifting is done by nalgebra.

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Decomposed position, rotation, and scale
///
/// Convenience form for building local transform matrices; the scene data
/// layer only ever sees the composed [`Mat4`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransformData {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for TransformData {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl TransformData {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_transform_matrix() {
        let t = TransformData::identity();
        assert_relative_eq!(t.to_matrix(), Mat4::identity());
    }

    #[test]
    fn test_translation_lands_in_last_column() {
        let t = TransformData::from_position(Vec3::new(1.0, 2.0, 3.0));
        let m = t.to_matrix();
        assert_relative_eq!(m.m14, 1.0);
        assert_relative_eq!(m.m24, 2.0);
        assert_relative_eq!(m.m34, 3.0);
    }
}
