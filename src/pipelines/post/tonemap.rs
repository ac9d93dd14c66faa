use crate::config::ToneMappingMode;

use super::{PostPipelines, mk_pass_bind_group, mk_uniform, run_fullscreen};

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ToneMappingUniform {
    // operator id, exposure
    params: [f32; 4],
}

impl ToneMappingUniform {
    pub fn new(mode: ToneMappingMode, exposure: f32) -> Self {
        Self {
            params: [mode.shader_id() as f32, exposure, 0.0, 0.0],
        }
    }
}

/// Maps HDR radiance into the displayable range.
#[derive(Debug)]
pub struct ToneMappingPass {
    mode: ToneMappingMode,
    #[allow(unused)]
    uniform: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl ToneMappingPass {
    pub fn new(
        device: &wgpu::Device,
        pipelines: &PostPipelines,
        sampler: &wgpu::Sampler,
        input: &wgpu::TextureView,
        mode: ToneMappingMode,
    ) -> Self {
        let uniform = mk_uniform(
            device,
            &ToneMappingUniform::new(mode, 1.0),
            "Tone Mapping Buffer",
        );
        let bind_group = mk_pass_bind_group(
            device,
            &pipelines.single_layout,
            &uniform,
            input,
            sampler,
            None,
            "tone_mapping_bind_group",
        );
        Self {
            mode,
            uniform,
            bind_group,
        }
    }

    pub fn mode(&self) -> ToneMappingMode {
        self.mode
    }

    pub(super) fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &PostPipelines,
        output: &wgpu::TextureView,
    ) {
        run_fullscreen(
            encoder,
            "Tone Mapping Pass",
            &pipelines.tone_mapping,
            &self.bind_group,
            output,
            wgpu::LoadOp::Clear(wgpu::Color::BLACK),
        );
    }
}
