//! Screen-space post-processing.
//!
//! The HDR scene goes through the configured [`EffectChain`] one pass at a
//! time, each pass reading the previous result and writing into one of two
//! ping-pong targets. A final present pass copies the result onto the
//! surface, rescaling from the internal render size and encoding sRGB when
//! the surface format does not do it already.

pub mod ao;
pub mod bloom;
pub mod tonemap;

use wgpu::util::DeviceExt;

use crate::{
    camera::Projection,
    config::{Effect, EffectChain},
    data_structures::texture::{self, Texture},
    pipelines::{depth_texture_2d, filtering_sampler, texture_2d, uniform_buffer},
};

#[derive(Debug)]
pub struct PostPipelines {
    /// Uniform, source texture, sampler.
    pub single_layout: wgpu::BindGroupLayout,
    /// Like `single_layout` plus a second texture at binding 3.
    pub dual_layout: wgpu::BindGroupLayout,
    /// Like `single_layout` plus the scene depth at binding 3.
    pub ao_layout: wgpu::BindGroupLayout,
    pub ao: wgpu::RenderPipeline,
    pub bloom_threshold: wgpu::RenderPipeline,
    pub bloom_downsample: wgpu::RenderPipeline,
    pub bloom_upsample: wgpu::RenderPipeline,
    pub bloom_composite: wgpu::RenderPipeline,
    pub tone_mapping: wgpu::RenderPipeline,
    pub present: wgpu::RenderPipeline,
    pub surface_format: wgpu::TextureFormat,
}

impl PostPipelines {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let single_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("post_single_bind_group_layout"),
            entries: &[
                uniform_buffer(0, wgpu::ShaderStages::FRAGMENT),
                texture_2d(1),
                filtering_sampler(2),
            ],
        });
        let dual_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("post_dual_bind_group_layout"),
            entries: &[
                uniform_buffer(0, wgpu::ShaderStages::FRAGMENT),
                texture_2d(1),
                filtering_sampler(2),
                texture_2d(3),
            ],
        });
        let ao_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("post_ao_bind_group_layout"),
            entries: &[
                uniform_buffer(0, wgpu::ShaderStages::FRAGMENT),
                texture_2d(1),
                filtering_sampler(2),
                depth_texture_2d(3),
            ],
        });

        let ao_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("AO Shader"),
            source: wgpu::ShaderSource::Wgsl(
                concat!(include_str!("fullscreen.wgsl"), include_str!("ao.wgsl")).into(),
            ),
        });
        let bloom_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bloom Shader"),
            source: wgpu::ShaderSource::Wgsl(
                concat!(include_str!("fullscreen.wgsl"), include_str!("bloom.wgsl")).into(),
            ),
        });
        let tone_mapping_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Tone Mapping Shader"),
            source: wgpu::ShaderSource::Wgsl(
                concat!(include_str!("fullscreen.wgsl"), include_str!("tonemap.wgsl")).into(),
            ),
        });
        let present_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Present Shader"),
            source: wgpu::ShaderSource::Wgsl(
                concat!(include_str!("fullscreen.wgsl"), include_str!("present.wgsl")).into(),
            ),
        });

        let additive = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent::REPLACE,
        };
        let hdr = Texture::HDR_FORMAT;

        Self {
            ao: mk_fullscreen_pipeline(device, &ao_layout, &ao_shader, "fs_main", hdr, None, "AO"),
            bloom_threshold: mk_fullscreen_pipeline(
                device,
                &single_layout,
                &bloom_shader,
                "fs_threshold",
                hdr,
                None,
                "Bloom Threshold",
            ),
            bloom_downsample: mk_fullscreen_pipeline(
                device,
                &single_layout,
                &bloom_shader,
                "fs_downsample",
                hdr,
                None,
                "Bloom Downsample",
            ),
            bloom_upsample: mk_fullscreen_pipeline(
                device,
                &single_layout,
                &bloom_shader,
                "fs_upsample",
                hdr,
                Some(additive),
                "Bloom Upsample",
            ),
            bloom_composite: mk_fullscreen_pipeline(
                device,
                &dual_layout,
                &bloom_shader,
                "fs_composite",
                hdr,
                None,
                "Bloom Composite",
            ),
            tone_mapping: mk_fullscreen_pipeline(
                device,
                &single_layout,
                &tone_mapping_shader,
                "fs_main",
                hdr,
                None,
                "Tone Mapping",
            ),
            present: mk_fullscreen_pipeline(
                device,
                &single_layout,
                &present_shader,
                "fs_main",
                surface_format,
                None,
                "Present",
            ),
            single_layout,
            dual_layout,
            ao_layout,
            surface_format,
        }
    }
}

fn mk_fullscreen_pipeline(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    module: &wgpu::ShaderModule,
    fragment_entry: &str,
    format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    label: &str,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} Pipeline Layout")),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(&format!("{label} Pipeline")),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

/// Uniform buffer plus a bind group over `(uniform, source, sampler[, extra])`.
pub(crate) fn mk_pass_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniform: &wgpu::Buffer,
    source: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    extra: Option<&wgpu::TextureView>,
    label: &str,
) -> wgpu::BindGroup {
    let mut entries = vec![
        wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 1,
            resource: wgpu::BindingResource::TextureView(source),
        },
        wgpu::BindGroupEntry {
            binding: 2,
            resource: wgpu::BindingResource::Sampler(sampler),
        },
    ];
    if let Some(extra) = extra {
        entries.push(wgpu::BindGroupEntry {
            binding: 3,
            resource: wgpu::BindingResource::TextureView(extra),
        });
    }
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &entries,
    })
}

pub(crate) fn mk_uniform<T: bytemuck::Pod>(
    device: &wgpu::Device,
    value: &T,
    label: &str,
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Draw a fullscreen triangle into `target`.
pub(crate) fn run_fullscreen(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
    target: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.draw(0..3, 0..1);
}

#[derive(Debug)]
pub enum PostPass {
    AmbientOcclusion(ao::AoPass),
    Bloom(bloom::BloomPass),
    ToneMapping(tonemap::ToneMappingPass),
}

impl PostPass {
    fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &PostPipelines,
        output: &wgpu::TextureView,
    ) {
        match self {
            PostPass::AmbientOcclusion(pass) => pass.encode(encoder, pipelines, output),
            PostPass::Bloom(pass) => pass.encode(encoder, pipelines, output),
            PostPass::ToneMapping(pass) => pass.encode(encoder, pipelines, output),
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PresentUniform {
    params: [f32; 4],
}

/// The effect chain built for one render size.
#[derive(Debug)]
pub struct PostChain {
    targets: [Texture; 2],
    passes: Vec<PostPass>,
    #[allow(unused)]
    present_uniform: wgpu::Buffer,
    present_bind_group: wgpu::BindGroup,
}

impl PostChain {
    pub fn new(
        device: &wgpu::Device,
        pipelines: &PostPipelines,
        effects: &EffectChain,
        scene: &Texture,
        depth: &Texture,
        size: [u32; 2],
    ) -> Self {
        let sampler = texture::create_clamp_sampler(device);
        let targets = [0, 1].map(|i| {
            let label = format!("post target {i}");
            Texture::create_render_target(device, size, Texture::HDR_FORMAT, &label)
        });

        let mut passes = Vec::with_capacity(effects.len());
        for (k, effect) in effects.iter().enumerate() {
            let input = if k == 0 {
                &scene.view
            } else {
                &targets[(k - 1) % 2].view
            };
            let pass = match effect {
                Effect::AmbientOcclusion {
                    radius,
                    intensity,
                    distance_falloff,
                } => PostPass::AmbientOcclusion(ao::AoPass::new(
                    device,
                    pipelines,
                    &sampler,
                    input,
                    &depth.view,
                    size,
                    ao::AoSettings {
                        radius: *radius,
                        intensity: *intensity,
                        distance_falloff: *distance_falloff,
                    },
                )),
                Effect::Bloom {
                    luminance_threshold,
                    intensity,
                    levels,
                    mipmap_blur,
                } => PostPass::Bloom(bloom::BloomPass::new(
                    device,
                    pipelines,
                    &sampler,
                    input,
                    size,
                    bloom::BloomSettings {
                        threshold: *luminance_threshold,
                        intensity: *intensity,
                        levels: if *mipmap_blur { *levels } else { 1 },
                    },
                )),
                Effect::ToneMapping { mode } => PostPass::ToneMapping(
                    tonemap::ToneMappingPass::new(device, pipelines, &sampler, input, *mode),
                ),
            };
            passes.push(pass);
        }

        let last = if passes.is_empty() {
            &scene.view
        } else {
            &targets[(passes.len() - 1) % 2].view
        };
        let encode_srgb = if pipelines.surface_format.is_srgb() { 0.0 } else { 1.0 };
        let present_uniform = mk_uniform(
            device,
            &PresentUniform {
                params: [encode_srgb, 0.0, 0.0, 0.0],
            },
            "Present Buffer",
        );
        let present_bind_group = mk_pass_bind_group(
            device,
            &pipelines.single_layout,
            &present_uniform,
            last,
            &sampler,
            None,
            "present_bind_group",
        );

        log::debug!("post chain with {} passes at {}x{}", passes.len(), size[0], size[1]);
        Self {
            targets,
            passes,
            present_uniform,
            present_bind_group,
        }
    }

    /// Per-frame uniforms, currently only the projection used by AO.
    pub fn update(&self, queue: &wgpu::Queue, projection: &Projection) {
        for pass in &self.passes {
            if let PostPass::AmbientOcclusion(ao) = pass {
                ao.update(queue, projection);
            }
        }
    }

    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &PostPipelines,
        surface: &wgpu::TextureView,
    ) {
        for (k, pass) in self.passes.iter().enumerate() {
            pass.encode(encoder, pipelines, &self.targets[k % 2].view);
        }
        run_fullscreen(
            encoder,
            "Present Pass",
            &pipelines.present,
            &self.present_bind_group,
            surface,
            wgpu::LoadOp::Clear(wgpu::Color::BLACK),
        );
    }
}
