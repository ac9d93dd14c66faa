use crate::{
    binder::RefractionMaterial,
    data_structures::{
        instance::InstanceRaw,
        model::{self, Vertex},
        texture::Texture,
    },
    pipelines::{
        Layouts,
        basic::{PipelineOptions, mk_render_pipeline},
    },
};

/// Parameters of the gem material, bound as group 1 of the refraction
/// pipeline next to the refraction environment.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GemUniform {
    color: [f32; 4],
    params: [f32; 4],
}

impl GemUniform {
    pub fn new(material: &RefractionMaterial, env_mip_levels: u32) -> Self {
        let [r, g, b] = material.color.to_linear();
        Self {
            color: [r, g, b, 1.0],
            params: [
                material.ior,
                material.aberration_strength,
                0.0,
                env_mip_levels.saturating_sub(1) as f32,
            ],
        }
    }
}

pub fn mk_refraction_pipeline(device: &wgpu::Device, layouts: &Layouts) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Refraction Pipeline Layout"),
        bind_group_layouts: &[&layouts.camera, &layouts.gem],
        push_constant_ranges: &[],
    });
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Refraction Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("refraction.wgsl").into()),
    };
    mk_render_pipeline(
        device,
        &layout,
        Texture::HDR_FORMAT,
        Some(wgpu::BlendState::REPLACE),
        Some(Texture::DEPTH_FORMAT),
        &[model::ModelVertex::desc(), InstanceRaw::desc()],
        shader,
        PipelineOptions {
            label: "Refraction Pipeline",
            // gems are double sided
            cull_mode: None,
            ..Default::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{
        color::Color,
        environment::{Environment, EnvironmentHandle},
    };

    #[test]
    fn carries_diamond_parameters() {
        let env = EnvironmentHandle::new(Environment::uniform("test", [1.0; 3]));
        let uniform = GemUniform::new(&RefractionMaterial::gem(Color::WHITE, env), 1);
        assert_eq!(uniform.color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(uniform.params, [2.4, 0.02, 0.0, 0.0]);
    }
}
