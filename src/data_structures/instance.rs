//! Instance transformation data for GPU rendering.
//!
//! The gems of the ring are one mesh drawn many times. Every copy carries its
//! own position, rotation and scale, read from the asset's instancing
//! extension and packed into a per-instance vertex buffer.

use std::ops::Mul;

use cgmath::{One, SquareMatrix};

use crate::data_structures::model;

/// Per-instance transformation: position, rotation (as quaternion), and scale.
///
/// Also used to describe the placement of whole groups, composing with `*`
/// the way nested scene nodes compose.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Instance {
    /// Identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn from_scale(scale: f32) -> Self {
        Self {
            scale: cgmath::Vector3::new(scale, scale, scale),
            ..Default::default()
        }
    }

    /// Rotation from Euler angles applied in X, Y, Z order (intrinsic).
    pub fn euler_xyz(x: f32, y: f32, z: f32) -> cgmath::Quaternion<f32> {
        cgmath::Quaternion::from(cgmath::Euler::new(
            cgmath::Rad(x),
            cgmath::Rad(y),
            cgmath::Rad(z),
        ))
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    /// Pack the instance for the GPU, relative to `parent`.
    pub fn to_raw(&self, parent: &cgmath::Matrix4<f32>) -> InstanceRaw {
        let world = parent * self.to_matrix();
        let linear = cgmath::Matrix3::new(
            world.x.x, world.x.y, world.x.z, world.y.x, world.y.y, world.y.z, world.z.x,
            world.z.y, world.z.z,
        );
        // inverse transpose so non-uniform scale keeps normals perpendicular
        let normal = linear
            .invert()
            .map(|inv| {
                let mut t = inv;
                t.transpose_self();
                t
            })
            .unwrap_or(linear);
        InstanceRaw {
            model: world.into(),
            normal: normal.into(),
            handedness: linear.determinant().signum(),
        }
    }
}

impl<'a, 'b> Mul<&'b Instance> for &'a Instance {
    type Output = Instance;

    fn mul(self, rhs: &'b Instance) -> Self::Output {
        let new_rotation = self.rotation * rhs.rotation;

        let new_scale = cgmath::Vector3::new(
            self.scale.x * rhs.scale.x,
            self.scale.y * rhs.scale.y,
            self.scale.z * rhs.scale.z,
        );
        let scaled_rhs_pos = cgmath::Vector3::new(
            self.scale.x * rhs.position.x,
            self.scale.y * rhs.position.y,
            self.scale.z * rhs.position.z,
        );
        let new_position = self.position + (self.rotation * scaled_rhs_pos);

        Instance {
            position: new_position,
            rotation: new_rotation,
            scale: new_scale,
        }
    }
}

impl Mul<Instance> for Instance {
    type Output = Self;

    fn mul(self, rhs: Instance) -> Self::Output {
        &self * &rhs
    }
}

impl From<cgmath::Vector3<f32>> for Instance {
    fn from(position: cgmath::Vector3<f32>) -> Self {
        Instance {
            position,
            ..Default::default()
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

/**
 * The raw instance is the actual data stored on the GPU
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
    handedness: f32,
}

impl InstanceRaw {
    pub fn model(&self) -> [[f32; 4]; 4] {
        self.model
    }
}

/**
 * Stride layout: the world matrix as four vec4 slots, the normal matrix as
 * three vec3 slots and the handedness sign. Locations start after the
 * per-vertex attributes of `ModelVertex`.
 */
impl model::Vertex for InstanceRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        const ATTRIBUTES: [wgpu::VertexAttribute; 8] = wgpu::vertex_attr_array![
            5 => Float32x4,
            6 => Float32x4,
            7 => Float32x4,
            8 => Float32x4,
            9 => Float32x3,
            10 => Float32x3,
            11 => Float32x3,
            12 => Float32,
        ];
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            // advance once per instance instead of once per vertex
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Vector3};

    use super::*;

    #[test]
    fn composition_matches_matrix_product() {
        let parent = Instance {
            position: Vector3::new(0.0, -0.25, 0.0),
            rotation: Instance::euler_xyz(-0.1, 0.0, 0.085),
            scale: Vector3::new(1.0, 1.0, 1.0),
        };
        let child = Instance {
            position: Vector3::new(1.0, 2.0, 3.0),
            ..Instance::from_scale(0.1)
        };
        let composed = (&parent * &child).to_matrix();
        let expected = parent.to_matrix() * child.to_matrix();
        for c in 0..4 {
            for r in 0..4 {
                assert!((composed[c][r] - expected[c][r]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn euler_zero_is_identity() {
        let q = Instance::euler_xyz(0.0, 0.0, 0.0);
        assert!((q.s - 1.0).abs() < 1e-6);
        assert!(q.v.magnitude() < 1e-6);
    }

    #[test]
    fn raw_handedness_flips_with_mirroring() {
        let mirrored = Instance {
            scale: Vector3::new(-1.0, 1.0, 1.0),
            ..Default::default()
        };
        let raw = mirrored.to_raw(&cgmath::Matrix4::identity());
        assert_eq!(raw.handedness, -1.0);
        let raw = Instance::new().to_raw(&cgmath::Matrix4::identity());
        assert_eq!(raw.handedness, 1.0);
    }
}
