use cgmath::SquareMatrix;
use rand::{Rng, SeedableRng, rngs::SmallRng};

use crate::{camera::Projection, pipelines::post::PostPipelines};

use super::{mk_pass_bind_group, mk_uniform, run_fullscreen};

pub const KERNEL_SIZE: usize = 16;
const DEPTH_BIAS: f32 = 0.005;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AoSettings {
    pub radius: f32,
    pub intensity: f32,
    pub distance_falloff: f32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct AoUniform {
    proj: [[f32; 4]; 4],
    inv_proj: [[f32; 4]; 4],
    params: [f32; 4],
    size: [f32; 4],
    kernel: [[f32; 4]; KERNEL_SIZE],
}

/// Hemisphere samples around +z, denser towards the origin.
pub fn generate_kernel(seed: u64) -> [[f32; 4]; KERNEL_SIZE] {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut kernel = [[0.0f32; 4]; KERNEL_SIZE];

    for (i, kernel_sample) in kernel.iter_mut().enumerate() {
        let mut sample = [
            rng.random::<f32>() * 2.0 - 1.0,
            rng.random::<f32>() * 2.0 - 1.0,
            rng.random::<f32>(),
            0.0,
        ];
        let len = (sample[0] * sample[0] + sample[1] * sample[1] + sample[2] * sample[2]).sqrt();
        if len > 0.0 {
            sample[0] /= len;
            sample[1] /= len;
            sample[2] /= len;
        }

        let t = i as f32 / KERNEL_SIZE as f32;
        let scale = 0.1 + t * t * 0.9;
        sample[0] *= scale;
        sample[1] *= scale;
        sample[2] *= scale;

        *kernel_sample = sample;
    }

    kernel
}

/// Screen-space ambient occlusion over the scene depth.
#[derive(Debug)]
pub struct AoPass {
    settings: AoSettings,
    size: [u32; 2],
    kernel: [[f32; 4]; KERNEL_SIZE],
    uniform: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl AoPass {
    pub fn new(
        device: &wgpu::Device,
        pipelines: &PostPipelines,
        sampler: &wgpu::Sampler,
        input: &wgpu::TextureView,
        depth: &wgpu::TextureView,
        size: [u32; 2],
        settings: AoSettings,
    ) -> Self {
        let kernel = generate_kernel(0xa0);
        let identity: [[f32; 4]; 4] = cgmath::Matrix4::identity().into();
        let uniform = mk_uniform(
            device,
            &AoUniform {
                proj: identity,
                inv_proj: identity,
                params: Self::params(&settings),
                size: Self::size_params(size),
                kernel,
            },
            "AO Buffer",
        );
        let bind_group = mk_pass_bind_group(
            device,
            &pipelines.ao_layout,
            &uniform,
            input,
            sampler,
            Some(depth),
            "ao_bind_group",
        );
        Self {
            settings,
            size,
            kernel,
            uniform,
            bind_group,
        }
    }

    fn params(settings: &AoSettings) -> [f32; 4] {
        [
            settings.radius,
            settings.intensity,
            settings.distance_falloff,
            DEPTH_BIAS,
        ]
    }

    fn size_params(size: [u32; 2]) -> [f32; 4] {
        let w = size[0].max(1) as f32;
        let h = size[1].max(1) as f32;
        [w, h, 1.0 / w, 1.0 / h]
    }

    pub fn update(&self, queue: &wgpu::Queue, projection: &Projection) {
        let proj = projection.calc_matrix();
        let inv_proj = proj.invert().unwrap_or_else(cgmath::Matrix4::identity);
        let uniform = AoUniform {
            proj: proj.into(),
            inv_proj: inv_proj.into(),
            params: Self::params(&self.settings),
            size: Self::size_params(self.size),
            kernel: self.kernel,
        };
        queue.write_buffer(&self.uniform, 0, bytemuck::bytes_of(&uniform));
    }

    pub(super) fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &PostPipelines,
        output: &wgpu::TextureView,
    ) {
        run_fullscreen(
            encoder,
            "AO Pass",
            &pipelines.ao,
            &self.bind_group,
            output,
            wgpu::LoadOp::Clear(wgpu::Color::BLACK),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_stays_in_the_upper_hemisphere() {
        let kernel = generate_kernel(7);
        for (i, sample) in kernel.iter().enumerate() {
            assert!(sample[2] >= 0.0);
            let len = sample.iter().map(|c| c * c).sum::<f32>().sqrt();
            let t = i as f32 / KERNEL_SIZE as f32;
            assert!(len <= 0.1 + t * t * 0.9 + 1e-5);
        }
    }

    #[test]
    fn kernel_is_reproducible() {
        assert_eq!(generate_kernel(3), generate_kernel(3));
    }

    #[test]
    fn uniform_matches_shader_layout() {
        // two mat4, two vec4, sixteen vec4
        assert_eq!(std::mem::size_of::<AoUniform>(), 64 * 2 + 16 * 2 + 16 * KERNEL_SIZE);
    }
}
