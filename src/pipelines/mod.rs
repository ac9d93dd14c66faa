//! Render pipelines and the bind group layouts they share.
//!
//! Every mesh pipeline uses the same group numbering:
//!
//! - group 0: camera uniform
//! - group 1: scene lighting (spot light + environment)
//! - group 2: per-draw material
//!
//! Screen-space passes live in [`post`] and only ever bind one group.

pub mod background;
pub mod basic;
pub mod post;
pub mod refraction;
pub mod shadow;

/// Fragment-visible, filterable float 2D texture binding.
pub fn texture_2d(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Fragment-visible depth texture, read with `textureLoad` or a comparison
/// sampler.
pub fn depth_texture_2d(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub fn filtering_sampler(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

pub fn comparison_sampler(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
        count: None,
    }
}

pub fn uniform_buffer(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Uniform + texture + sampler, the shape of the lighting, material and gem
/// groups.
fn uniform_texture_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            uniform_buffer(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
            texture_2d(1),
            filtering_sampler(2),
        ],
    })
}

#[derive(Debug)]
pub struct Layouts {
    pub camera: wgpu::BindGroupLayout,
    pub lighting: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub gem: wgpu::BindGroupLayout,
    pub shadow_caster: wgpu::BindGroupLayout,
    pub shadow_accumulate: wgpu::BindGroupLayout,
    pub catcher: wgpu::BindGroupLayout,
}

impl Layouts {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            camera: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("camera_bind_group_layout"),
                entries: &[uniform_buffer(
                    0,
                    wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                )],
            }),
            lighting: uniform_texture_layout(device, "lighting_bind_group_layout"),
            material: uniform_texture_layout(device, "material_bind_group_layout"),
            gem: uniform_texture_layout(device, "gem_bind_group_layout"),
            shadow_caster: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("shadow_caster_bind_group_layout"),
                entries: &[uniform_buffer(0, wgpu::ShaderStages::VERTEX)],
            }),
            shadow_accumulate: device.create_bind_group_layout(
                &wgpu::BindGroupLayoutDescriptor {
                    label: Some("shadow_accumulate_bind_group_layout"),
                    entries: &[
                        uniform_buffer(0, wgpu::ShaderStages::FRAGMENT),
                        depth_texture_2d(1),
                        comparison_sampler(2),
                        texture_2d(3),
                        filtering_sampler(4),
                    ],
                },
            ),
            catcher: uniform_texture_layout(device, "catcher_bind_group_layout"),
        }
    }
}

/// Every pipeline the viewer draws with, created once per context.
#[derive(Debug)]
pub struct Pipelines {
    pub layouts: Layouts,
    pub pbr: wgpu::RenderPipeline,
    pub background: wgpu::RenderPipeline,
    pub refraction: wgpu::RenderPipeline,
    pub shadow_caster: wgpu::RenderPipeline,
    pub shadow_accumulate: wgpu::RenderPipeline,
    pub catcher: wgpu::RenderPipeline,
    pub post: post::PostPipelines,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let layouts = Layouts::new(device);
        Self {
            pbr: basic::mk_pbr_pipeline(device, &layouts),
            background: background::mk_background_pipeline(device, &layouts),
            refraction: refraction::mk_refraction_pipeline(device, &layouts),
            shadow_caster: shadow::mk_caster_pipeline(device, &layouts),
            shadow_accumulate: shadow::mk_accumulate_pipeline(device, &layouts),
            catcher: shadow::mk_catcher_pipeline(device, &layouts),
            post: post::PostPipelines::new(device, surface_format),
            layouts,
        }
    }
}
