use crate::data_structures::texture::Texture;

use super::{PostPipelines, mk_pass_bind_group, mk_uniform, run_fullscreen};

const LUMINANCE_SMOOTHING: f32 = 0.025;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloomSettings {
    pub threshold: f32,
    pub intensity: f32,
    pub levels: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BloomUniform {
    // texel width, texel height, threshold or intensity, smoothing
    params: [f32; 4],
}

/// Number of blur levels that fit into `size`, starting at half resolution.
pub fn level_count(size: [u32; 2], requested: u32) -> u32 {
    let smallest = size[0].min(size[1]).max(2);
    let fit = 31 - smallest.leading_zeros();
    requested.min(fit).max(1)
}

fn level_size(size: [u32; 2], level: u32) -> [u32; 2] {
    [(size[0] >> (level + 1)).max(1), (size[1] >> (level + 1)).max(1)]
}

#[derive(Debug)]
enum Step {
    Threshold,
    Downsample(usize),
    Upsample(usize),
}

#[derive(Debug)]
struct BloomStep {
    step: Step,
    #[allow(unused)]
    uniform: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Threshold, blur down a mip chain, blur back up and add onto the scene.
#[derive(Debug)]
pub struct BloomPass {
    mips: Vec<Texture>,
    steps: Vec<BloomStep>,
    #[allow(unused)]
    composite_uniform: wgpu::Buffer,
    composite: wgpu::BindGroup,
}

impl BloomPass {
    pub fn new(
        device: &wgpu::Device,
        pipelines: &PostPipelines,
        sampler: &wgpu::Sampler,
        input: &wgpu::TextureView,
        size: [u32; 2],
        settings: BloomSettings,
    ) -> Self {
        let levels = level_count(size, settings.levels);
        let mips: Vec<Texture> = (0..levels)
            .map(|level| {
                Texture::create_render_target(
                    device,
                    level_size(size, level),
                    Texture::HDR_FORMAT,
                    &format!("bloom mip {level}"),
                )
            })
            .collect();
        let texel = |s: [u32; 2]| [1.0 / s[0].max(1) as f32, 1.0 / s[1].max(1) as f32];

        let mut steps = Vec::with_capacity(levels as usize * 2);
        let mut push = |step: Step, source: &wgpu::TextureView, params: [f32; 4], label: &str| {
            let uniform = mk_uniform(device, &BloomUniform { params }, label);
            let bind_group = mk_pass_bind_group(
                device,
                &pipelines.single_layout,
                &uniform,
                source,
                sampler,
                None,
                label,
            );
            steps.push(BloomStep {
                step,
                uniform,
                bind_group,
            });
        };

        let [tx, ty] = texel(size);
        push(
            Step::Threshold,
            input,
            [tx, ty, settings.threshold, LUMINANCE_SMOOTHING],
            "bloom_threshold",
        );
        for level in 1..levels {
            let [tx, ty] = texel(level_size(size, level - 1));
            push(
                Step::Downsample(level as usize),
                &mips[level as usize - 1].view,
                [tx, ty, 0.0, 0.0],
                "bloom_downsample",
            );
        }
        for level in (1..levels).rev() {
            let [tx, ty] = texel(level_size(size, level));
            push(
                Step::Upsample(level as usize - 1),
                &mips[level as usize].view,
                [tx, ty, 0.0, 0.0],
                "bloom_upsample",
            );
        }

        let composite_uniform = mk_uniform(
            device,
            &BloomUniform {
                params: [tx, ty, settings.intensity, 0.0],
            },
            "bloom_composite",
        );
        let composite = mk_pass_bind_group(
            device,
            &pipelines.dual_layout,
            &composite_uniform,
            input,
            sampler,
            Some(&mips[0].view),
            "bloom_composite",
        );

        Self {
            mips,
            steps,
            composite_uniform,
            composite,
        }
    }

    pub(super) fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &PostPipelines,
        output: &wgpu::TextureView,
    ) {
        for step in &self.steps {
            match step.step {
                Step::Threshold => run_fullscreen(
                    encoder,
                    "Bloom Threshold",
                    &pipelines.bloom_threshold,
                    &step.bind_group,
                    &self.mips[0].view,
                    wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                ),
                Step::Downsample(target) => run_fullscreen(
                    encoder,
                    "Bloom Downsample",
                    &pipelines.bloom_downsample,
                    &step.bind_group,
                    &self.mips[target].view,
                    wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                ),
                Step::Upsample(target) => run_fullscreen(
                    encoder,
                    "Bloom Upsample",
                    &pipelines.bloom_upsample,
                    &step.bind_group,
                    &self.mips[target].view,
                    wgpu::LoadOp::Load,
                ),
            }
        }
        run_fullscreen(
            encoder,
            "Bloom Composite",
            &pipelines.bloom_composite,
            &self.composite,
            output,
            wgpu::LoadOp::Clear(wgpu::Color::BLACK),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_limited_by_the_smaller_side() {
        assert_eq!(level_count([1920, 1080], 9), 9);
        assert_eq!(level_count([1920, 64], 9), 6);
        assert_eq!(level_count([1, 1], 9), 1);
        assert_eq!(level_count([800, 600], 0), 1);
    }

    #[test]
    fn mip_sizes_halve() {
        assert_eq!(level_size([800, 600], 0), [400, 300]);
        assert_eq!(level_size([800, 600], 2), [100, 75]);
        assert_eq!(level_size([3, 3], 4), [1, 1]);
    }
}
