//! Accumulated soft shadows on a ground plane.
//!
//! Every frame the ring is rendered into a depth map from a light placed at a
//! random point around the configured light position. The lit/unlit result
//! for the ground plane is blended into a running average that lives in the
//! plane's own texture space, so after a few dozen frames the hard shadow
//! maps converge into a soft contact shadow. The average stops once
//! `frames` samples have been taken and starts over when the ring changes.

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Vector3};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use wgpu::util::DeviceExt;

use crate::{
    camera::OPENGL_TO_WGPU_MATRIX,
    config::{RandomizedLightConfig, ShadowConfig},
    data_structures::{
        asset::Geometry,
        color::Color,
        instance::InstanceRaw,
        model::{self, DrawMesh, GpuMesh, Vertex},
        texture::{self, Texture},
    },
    pipelines::{
        Layouts, Pipelines,
        basic::{PipelineOptions, mk_render_pipeline},
    },
};

/// Resolution of the averaged shadow texture.
pub const ACCUMULATION_SIZE: u32 = 512;
/// Half extent of the shadow light's orthographic frustum.
const LIGHT_FRUSTUM: f32 = 5.0;
const LIGHT_NEAR: f32 = 0.5;
const LIGHT_FAR: f32 = 500.0;
const DEPTH_BIAS: f32 = 0.001;
/// Texels lit at least this much (summed over rgb) become fully transparent.
const ALPHA_TEST: f32 = 0.75;
const COLOR_BLEND: f32 = 2.0;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CasterUniform {
    light_view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct AccumulateUniform {
    plane_model: [[f32; 4]; 4],
    light_view_proj: [[f32; 4]; 4],
    params: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct CatcherUniform {
    model: [[f32; 4]; 4],
    color: [f32; 4],
    params: [f32; 4],
}

/// CPU side of the accumulation: sample weights and light jitter.
#[derive(Debug)]
pub struct ShadowAccumulator {
    frames: u32,
    temporal: bool,
    /// Jittered lights rendered per frame when accumulating over time.
    lights_per_frame: u32,
    samples: u32,
    rng: SmallRng,
}

impl ShadowAccumulator {
    pub fn new(config: &ShadowConfig) -> Self {
        Self {
            frames: config.frames.max(1),
            temporal: config.temporal,
            lights_per_frame: config.light.amount.max(1),
            samples: 0,
            rng: SmallRng::seed_from_u64(0x5eed),
        }
    }

    pub fn reset(&mut self) {
        self.samples = 0;
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn is_converged(&self) -> bool {
        self.samples >= self.frames
    }

    /// Number of samples to take this frame. Temporal accumulation takes one
    /// per jittered light and frame, otherwise everything happens at once.
    pub fn pending(&self) -> u32 {
        let left = self.frames.saturating_sub(self.samples);
        if self.temporal {
            left.min(self.lights_per_frame)
        } else {
            left
        }
    }

    /// Blend weight of the next sample, so that every sample ends up with the
    /// same share of the average.
    pub fn next_weight(&mut self) -> Option<f32> {
        if self.is_converged() {
            return None;
        }
        self.samples += 1;
        Some(1.0 / self.samples as f32)
    }

    /// A light position inside the configured radius around `light.position`,
    /// relative to `origin`.
    pub fn jittered_light(
        &mut self,
        light: &RandomizedLightConfig,
        origin: [f32; 3],
    ) -> Point3<f32> {
        let base = Vector3::from(light.position) + Vector3::from(origin);
        let offset = loop {
            let candidate = Vector3::new(
                self.rng.random::<f32>() * 2.0 - 1.0,
                self.rng.random::<f32>() * 2.0 - 1.0,
                self.rng.random::<f32>() * 2.0 - 1.0,
            );
            if candidate.magnitude2() <= 1.0 {
                break candidate;
            }
        };
        Point3::from_vec(base + offset * light.radius)
    }
}

/// Orthographic view-projection of a shadow light looking at `target`.
pub fn light_view_proj(light: Point3<f32>, target: Point3<f32>) -> Matrix4<f32> {
    let forward = (target - light).normalize();
    let up = if forward.y.abs() > 0.99 {
        Vector3::unit_z()
    } else {
        Vector3::unit_y()
    };
    let view = Matrix4::look_at_rh(light, target, up);
    let proj = cgmath::ortho(
        -LIGHT_FRUSTUM,
        LIGHT_FRUSTUM,
        -LIGHT_FRUSTUM,
        LIGHT_FRUSTUM,
        LIGHT_NEAR,
        LIGHT_FAR,
    );
    OPENGL_TO_WGPU_MATRIX * proj * view
}

/// Placement of the unit catcher plane.
pub fn plane_model(origin: [f32; 3], size: f32) -> Matrix4<f32> {
    Matrix4::from_translation(origin.into()) * Matrix4::from_nonuniform_scale(size, 1.0, size)
}

/// Unit quad on the XZ plane, facing up, with uv (0, 0) at -x/-z.
fn unit_plane() -> Geometry {
    Geometry {
        positions: vec![
            [-0.5, 0.0, -0.5],
            [-0.5, 0.0, 0.5],
            [0.5, 0.0, 0.5],
            [0.5, 0.0, -0.5],
        ],
        normals: vec![[0.0, 1.0, 0.0]; 4],
        tex_coords: vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]],
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

/// Something that throws a shadow: a mesh and the instances to draw.
pub struct ShadowCaster<'a> {
    pub mesh: &'a GpuMesh,
    pub instances: &'a wgpu::Buffer,
    pub count: u32,
}

#[derive(Debug)]
pub struct ShadowResources {
    pub accumulator: ShadowAccumulator,
    config: ShadowConfig,
    map: Texture,
    accumulation: [Texture; 2],
    current: usize,
    origin: [f32; 3],
    caster_buffer: wgpu::Buffer,
    caster_bind_group: wgpu::BindGroup,
    accumulate_buffer: wgpu::Buffer,
    // index i reads accumulation[i] and writes the other one
    accumulate_bind_groups: [wgpu::BindGroup; 2],
    catcher_uniform: CatcherUniform,
    catcher_buffer: wgpu::Buffer,
    catcher_bind_groups: [wgpu::BindGroup; 2],
    plane: GpuMesh,
}

impl ShadowResources {
    pub fn new(device: &wgpu::Device, layouts: &Layouts, config: &ShadowConfig) -> Self {
        let map_size = config.map_size.max(1);
        let map = Texture::create_depth_texture(device, [map_size, map_size], "shadow map");
        let accumulation = [0, 1].map(|i| {
            Texture::create_render_target(
                device,
                [ACCUMULATION_SIZE; 2],
                Texture::HDR_FORMAT,
                &format!("shadow accumulation {i}"),
            )
        });

        let caster_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Shadow Caster Buffer"),
            contents: bytemuck::cast_slice(&[CasterUniform {
                light_view_proj: Matrix4::from_scale(1.0).into(),
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let caster_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow_caster_bind_group"),
            layout: &layouts.shadow_caster,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: caster_buffer.as_entire_binding(),
            }],
        });

        let accumulate_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shadow Accumulate Buffer"),
            size: std::mem::size_of::<AccumulateUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let compare = map.sampler.clone().unwrap_or_else(|| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                compare: Some(wgpu::CompareFunction::LessEqual),
                ..Default::default()
            })
        });
        let previous_sampler = texture::create_clamp_sampler(device);
        let accumulate_bind_groups = [0, 1].map(|i| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("shadow_accumulate_bind_group"),
                layout: &layouts.shadow_accumulate,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: accumulate_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&map.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&compare),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(&accumulation[i].view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::Sampler(&previous_sampler),
                    },
                ],
            })
        });

        let catcher_uniform = CatcherUniform {
            model: plane_model([0.0; 3], config.plane_size).into(),
            color: [0.0, 0.0, 0.0, config.opacity],
            params: [ALPHA_TEST, COLOR_BLEND, 0.0, 0.0],
        };
        let catcher_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Shadow Catcher Buffer"),
            contents: bytemuck::cast_slice(&[catcher_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let catcher_sampler = texture::create_clamp_sampler(device);
        let catcher_bind_groups = [0, 1].map(|i| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("shadow_catcher_bind_group"),
                layout: &layouts.catcher,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: catcher_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&accumulation[i].view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&catcher_sampler),
                    },
                ],
            })
        });

        Self {
            accumulator: ShadowAccumulator::new(config),
            config: config.clone(),
            map,
            accumulation,
            current: 0,
            origin: [0.0; 3],
            caster_buffer,
            caster_bind_group,
            accumulate_buffer,
            accumulate_bind_groups,
            catcher_uniform,
            catcher_buffer,
            catcher_bind_groups,
            plane: GpuMesh::from_geometry(device, "shadow catcher", &unit_plane()),
        }
    }

    /// Start a fresh average, e.g. because the ring moved or changed.
    pub fn reset(&mut self) {
        log::debug!("restarting shadow accumulation");
        self.accumulator.reset();
    }

    /// Update the plane placement and the live shadow color.
    pub fn update_catcher(&mut self, queue: &wgpu::Queue, origin: [f32; 3], color: Color) {
        self.origin = origin;
        let [r, g, b] = color.to_linear();
        let uniform = CatcherUniform {
            model: plane_model(origin, self.config.plane_size).into(),
            color: [r, g, b, self.config.opacity],
            params: [ALPHA_TEST, COLOR_BLEND, 0.0, 0.0],
        };
        if uniform != self.catcher_uniform {
            self.catcher_uniform = uniform;
            queue.write_buffer(&self.catcher_buffer, 0, bytemuck::cast_slice(&[uniform]));
        }
    }

    /// Take this frame's share of shadow samples. Each sample is submitted on
    /// its own because the light uniforms change in between.
    pub fn accumulate(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipelines: &Pipelines,
        casters: &[ShadowCaster<'_>],
    ) {
        if casters.is_empty() {
            return;
        }
        for _ in 0..self.accumulator.pending() {
            let Some(weight) = self.accumulator.next_weight() else {
                break;
            };
            let light = self
                .accumulator
                .jittered_light(&self.config.light, self.origin);
            let view_proj = light_view_proj(light, Point3::from(self.origin));
            queue.write_buffer(
                &self.caster_buffer,
                0,
                bytemuck::cast_slice(&[CasterUniform {
                    light_view_proj: view_proj.into(),
                }]),
            );
            queue.write_buffer(
                &self.accumulate_buffer,
                0,
                bytemuck::cast_slice(&[AccumulateUniform {
                    plane_model: plane_model(self.origin, self.config.plane_size).into(),
                    light_view_proj: view_proj.into(),
                    params: [weight, DEPTH_BIAS, 0.0, 0.0],
                }]),
            );

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Shadow Encoder"),
            });
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Shadow Map Pass"),
                    color_attachments: &[],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &self.map.view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    occlusion_query_set: None,
                    timestamp_writes: None,
                });
                pass.set_pipeline(&pipelines.shadow_caster);
                pass.set_bind_group(0, &self.caster_bind_group, &[]);
                for caster in casters {
                    if caster.count == 0 {
                        continue;
                    }
                    pass.set_vertex_buffer(1, caster.instances.slice(..));
                    pass.draw_mesh_instanced(caster.mesh, 0..caster.count);
                }
            }
            let target = 1 - self.current;
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Shadow Accumulate Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &self.accumulation[target].view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                });
                pass.set_pipeline(&pipelines.shadow_accumulate);
                pass.set_bind_group(0, &self.accumulate_bind_groups[self.current], &[]);
                pass.draw(0..3, 0..1);
            }
            queue.submit(std::iter::once(encoder.finish()));
            self.current = target;
        }
    }

    /// Draw the catcher into an open HDR pass. Nothing is drawn before the
    /// first sample exists.
    pub fn draw_catcher<'a>(
        &'a self,
        pass: &mut wgpu::RenderPass<'a>,
        pipelines: &'a Pipelines,
        camera: &'a wgpu::BindGroup,
    ) {
        if self.accumulator.samples() == 0 {
            return;
        }
        pass.set_pipeline(&pipelines.catcher);
        pass.set_bind_group(0, camera, &[]);
        pass.set_bind_group(1, &self.catcher_bind_groups[self.current], &[]);
        pass.set_vertex_buffer(0, self.plane.vertex_buffer.slice(..));
        pass.set_index_buffer(self.plane.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.plane.num_elements, 0, 0..1);
    }
}

pub fn mk_caster_pipeline(device: &wgpu::Device, layouts: &Layouts) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Shadow Caster Pipeline Layout"),
        bind_group_layouts: &[&layouts.shadow_caster],
        push_constant_ranges: &[],
    });
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Shadow Caster Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shadow_caster.wgsl").into()),
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("Shadow Caster Pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[model::ModelVertex::desc(), InstanceRaw::desc()],
            compilation_options: Default::default(),
        },
        fragment: None,
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: Texture::DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: 2,
                slope_scale: 2.0,
                clamp: 0.0,
            },
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

pub fn mk_accumulate_pipeline(device: &wgpu::Device, layouts: &Layouts) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Shadow Accumulate Pipeline Layout"),
        bind_group_layouts: &[&layouts.shadow_accumulate],
        push_constant_ranges: &[],
    });
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Shadow Accumulate Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shadow_accumulate.wgsl").into()),
    };
    mk_render_pipeline(
        device,
        &layout,
        Texture::HDR_FORMAT,
        None,
        None,
        &[],
        shader,
        PipelineOptions {
            label: "Shadow Accumulate Pipeline",
            cull_mode: None,
            ..Default::default()
        },
    )
}

pub fn mk_catcher_pipeline(device: &wgpu::Device, layouts: &Layouts) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Shadow Catcher Pipeline Layout"),
        bind_group_layouts: &[&layouts.camera, &layouts.catcher],
        push_constant_ranges: &[],
    });
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Shadow Catcher Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shadow_catcher.wgsl").into()),
    };
    mk_render_pipeline(
        device,
        &layout,
        Texture::HDR_FORMAT,
        Some(wgpu::BlendState::ALPHA_BLENDING),
        Some(Texture::DEPTH_FORMAT),
        &[model::ModelVertex::desc()],
        shader,
        PipelineOptions {
            label: "Shadow Catcher Pipeline",
            cull_mode: None,
            depth_write: false,
            ..Default::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use cgmath::{Transform, Vector4};

    use super::*;

    #[test]
    fn temporal_weights_average_evenly() {
        let mut acc = ShadowAccumulator::new(&ShadowConfig {
            frames: 4,
            ..Default::default()
        });
        assert_eq!(acc.pending(), 1);
        let weights: Vec<_> = std::iter::from_fn(|| acc.next_weight()).collect();
        assert_eq!(weights, vec![1.0, 0.5, 1.0 / 3.0, 0.25]);
        assert!(acc.is_converged());
        assert_eq!(acc.pending(), 0);

        // running average of 1, 0, 0, 0 with those weights is 1/4
        let mut value = 0.0;
        for (w, s) in weights.iter().zip([1.0, 0.0, 0.0, 0.0]) {
            value = value * (1.0 - w) + s * w;
        }
        assert!((value - 0.25f32).abs() < 1e-6);

        acc.reset();
        assert_eq!(acc.samples(), 0);
        assert!(!acc.is_converged());
    }

    #[test]
    fn non_temporal_takes_every_sample_at_once() {
        let acc = ShadowAccumulator::new(&ShadowConfig {
            temporal: false,
            frames: 40,
            ..Default::default()
        });
        assert_eq!(acc.pending(), 40);
    }

    #[test]
    fn several_lights_per_frame() {
        let mut acc = ShadowAccumulator::new(&ShadowConfig {
            frames: 10,
            light: RandomizedLightConfig {
                amount: 4,
                ..Default::default()
            },
            ..Default::default()
        });
        let mut per_frame = Vec::new();
        while !acc.is_converged() {
            let pending = acc.pending();
            for _ in 0..pending {
                acc.next_weight();
            }
            per_frame.push(pending);
        }
        assert_eq!(per_frame, vec![4, 4, 2]);
        assert_eq!(acc.samples(), 10);
    }

    #[test]
    fn jitter_stays_inside_the_radius() {
        let config = RandomizedLightConfig::default();
        let mut acc = ShadowAccumulator::new(&ShadowConfig::default());
        let origin = [0.0, -0.25, 0.0];
        let center = Point3::new(10.0, 4.75, -5.0);
        let mut moved = false;
        for _ in 0..200 {
            let light = acc.jittered_light(&config, origin);
            assert!((light - center).magnitude() <= config.radius + 1e-4);
            moved |= (light - center).magnitude() > 0.1;
        }
        assert!(moved);
    }

    #[test]
    fn light_projection_keeps_the_target_in_view() {
        let m = light_view_proj(Point3::new(10.0, 5.0, -5.0), Point3::new(0.0, 0.0, 0.0));
        let clip = m * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn plane_uv_corners_map_to_world() {
        let m = plane_model([0.0, -0.25, 0.0], 10.0);
        let corner = m.transform_point(Point3::new(-0.5, 0.0, -0.5));
        assert_eq!(corner, Point3::new(-5.0, -0.25, -5.0));
        let plane = unit_plane();
        assert_eq!(plane.tex_coords[0], [0.0, 0.0]);
        assert_eq!(plane.positions[0], [-0.5, 0.0, -0.5]);
    }
}
