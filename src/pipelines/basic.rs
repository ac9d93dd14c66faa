use cgmath::InnerSpace;

use crate::{
    binder::StandardMaterial,
    config::SpotLightConfig,
    data_structures::{
        asset::MaterialDescriptor,
        instance::InstanceRaw,
        model::{self, Vertex},
        texture::Texture,
    },
    pipelines::Layouts,
};

/// Spot light plus environment parameters, bound as group 1.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingUniform {
    // xyz position, w intensity
    spot_position: [f32; 4],
    // xyz unit direction towards the target, w cosine of the cone angle
    spot_direction: [f32; 4],
    // x cosine where the penumbra ends, y decay, z environment intensity,
    // w number of the smallest environment mip
    params: [f32; 4],
}

impl LightingUniform {
    pub fn new(light: &SpotLightConfig, environment_intensity: f32, env_mip_levels: u32) -> Self {
        let position = cgmath::Vector3::from(light.position);
        // spot lights aim at the origin
        let direction = if position.magnitude2() > 0.0 {
            -position.normalize()
        } else {
            -cgmath::Vector3::unit_y()
        };
        let outer = light.angle;
        let inner = outer * (1.0 - light.penumbra.clamp(0.0, 1.0));
        Self {
            spot_position: [position.x, position.y, position.z, light.intensity],
            spot_direction: [direction.x, direction.y, direction.z, outer.cos()],
            params: [
                inner.cos(),
                light.decay,
                environment_intensity,
                env_mip_levels.saturating_sub(1) as f32,
            ],
        }
    }

    /// Same light, different environment texture.
    pub fn with_env_levels(mut self, env_mip_levels: u32) -> Self {
        self.params[3] = env_mip_levels.saturating_sub(1) as f32;
        self
    }
}

/// Metallic-roughness parameters of one draw, bound as group 2.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    // linear rgba
    base_color: [f32; 4],
    emissive: [f32; 4],
    // roughness, metalness, environment intensity, 1.0 if a base color map is bound
    params: [f32; 4],
}

impl MaterialUniform {
    pub fn from_standard(material: &StandardMaterial) -> Self {
        let [r, g, b] = material.color.to_linear();
        Self {
            base_color: [r, g, b, 1.0],
            emissive: [0.0; 4],
            params: [
                material.roughness,
                material.metalness,
                material.env_map_intensity,
                0.0,
            ],
        }
    }

    pub fn from_descriptor(material: &MaterialDescriptor) -> Self {
        let [r, g, b] = material.emissive;
        Self {
            base_color: material.base_color,
            emissive: [r, g, b, 0.0],
            params: [
                material.roughness,
                material.metallic,
                1.0,
                if material.base_color_texture.is_some() { 1.0 } else { 0.0 },
            ],
        }
    }

    pub fn roughness(&self) -> f32 {
        self.params[0]
    }
}

pub fn mk_pbr_pipeline(device: &wgpu::Device, layouts: &Layouts) -> wgpu::RenderPipeline {
    let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("PBR Pipeline Layout"),
        bind_group_layouts: &[&layouts.camera, &layouts.lighting, &layouts.material],
        push_constant_ranges: &[],
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("PBR Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("pbr.wgsl").into()),
    };

    mk_render_pipeline(
        device,
        &render_pipeline_layout,
        Texture::HDR_FORMAT,
        Some(wgpu::BlendState::REPLACE),
        Some(Texture::DEPTH_FORMAT),
        &[model::ModelVertex::desc(), InstanceRaw::desc()],
        shader,
        PipelineOptions::default(),
    )
}

/// Rasterizer knobs that differ between the viewer's pipelines.
#[derive(Clone, Copy, Debug)]
pub struct PipelineOptions {
    pub label: &'static str,
    pub cull_mode: Option<wgpu::Face>,
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            label: "Render Pipeline",
            cull_mode: Some(wgpu::Face::Back),
            depth_write: true,
            depth_compare: wgpu::CompareFunction::Less,
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    depth_format: Option<wgpu::TextureFormat>,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    shader: wgpu::ShaderModuleDescriptor,
    options: PipelineOptions,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(shader);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(options.label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: options.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: options.depth_write,
            depth_compare: options.depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::color::Color;

    #[test]
    fn full_penumbra_fades_from_the_axis() {
        let uniform = LightingUniform::new(&SpotLightConfig::default(), 1.0, 11);
        // penumbra 1: the falloff starts right on the cone axis
        assert_eq!(uniform.params[0], 1.0);
        assert!((uniform.spot_direction[3] - 0.15f32.cos()).abs() < 1e-6);
        assert_eq!(uniform.params[3], 10.0);
        let d = uniform.spot_direction;
        assert!(((d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt() - 1.0).abs() < 1e-5);
        assert!(d[1] < 0.0);
    }

    #[test]
    fn standard_material_is_linearized() {
        let uniform = MaterialUniform::from_standard(&StandardMaterial::polished_metal(
            Color::rgb(255, 0, 0),
        ));
        assert_eq!(uniform.base_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(uniform.roughness(), 0.15);
        assert_eq!(uniform.params[2], 1.5);
    }
}
