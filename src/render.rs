//! GPU side of the scene and pipeline batching.
//!
//! [`SceneGpu`] mirrors a [`SceneComposition`] on the GPU: it uploads meshes,
//! instance buffers, materials and environments when they change and keeps
//! the shadow accumulation running. Each frame it describes what to draw as a
//! [`Render`], which is sorted into one batch per pipeline before drawing.
//!
//! # Key types
//!
//! - [`Render<'a>`] describes the draws of one frame
//! - [`Instanced<'a>`] is one instanced mesh draw with its material group
//! - [`SceneGpu`] owns every scene resource that outlives a frame

use std::{collections::HashMap, sync::Arc};

use wgpu::util::DeviceExt;

use crate::{
    binder::{DrawEntry, MaterialBinding},
    config::ViewerConfig,
    data_structures::{
        asset::Geometry,
        environment::{Environment, EnvironmentHandle},
        instance::{Instance, InstanceRaw},
        model::{DrawMesh, GpuMesh},
        texture::Texture,
    },
    pipelines::{
        Pipelines,
        basic::{LightingUniform, MaterialUniform},
        refraction::GemUniform,
        shadow::{ShadowCaster, ShadowResources},
    },
    shell::SceneComposition,
};

/// Long edge of the largest environment level uploaded.
const MAX_ENVIRONMENT_SIZE: u32 = 4096;
const ENVIRONMENT_INTENSITY: f32 = 1.0;

/// Data for one instanced draw: mesh, instance buffer and material group.
pub struct Instanced<'a> {
    pub mesh: &'a GpuMesh,
    pub instances: &'a wgpu::Buffer,
    pub amount: u32,
    pub material: &'a wgpu::BindGroup,
}

/// Specifies how scene objects are drawn.
///
/// - `None` renders nothing
/// - `Opaque(Instanced)` renders one metallic-roughness object
/// - `Refractive(Instanced)` renders gems with the refraction pipeline
/// - `Composed(Vec<Render>)` recursively renders a composition
pub enum Render<'a> {
    None,
    Opaque(Instanced<'a>),
    Refractive(Instanced<'a>),
    Composed(Vec<Render<'a>>),
}

impl<'a> Render<'a> {
    pub(crate) fn set_pipelines(
        self,
        opaque: &mut Vec<Instanced<'a>>,
        refractive: &mut Vec<Instanced<'a>>,
    ) {
        match self {
            Render::Opaque(instanced) => opaque.push(instanced),
            Render::Refractive(instanced) => refractive.push(instanced),
            Render::Composed(renders) => renders
                .into_iter()
                .for_each(|render| render.set_pipelines(opaque, refractive)),
            Render::None => (),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MaterialKind {
    Opaque,
    Refractive,
}

#[derive(Debug)]
struct MaterialGpu {
    kind: MaterialKind,
    #[allow(unused)]
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug)]
struct PartGpu {
    geometry: Arc<Geometry>,
    instances: wgpu::Buffer,
    count: u32,
    material: MaterialGpu,
    cast_shadow: bool,
}

#[derive(Debug)]
struct LightingGpu {
    env_id: Option<usize>,
    #[allow(unused)]
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Cache key for data shared through an `Arc`.
fn key<T>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value) as usize
}

/// Flatten a draw entry into instance data relative to the ring's world
/// matrix. Instanced entries draw at most [`Instancing::drawn`] copies.
///
/// [`Instancing::drawn`]: crate::binder::Instancing::drawn
pub fn instance_data(entry: &DrawEntry, world: &cgmath::Matrix4<f32>) -> Vec<InstanceRaw> {
    match &entry.instancing {
        Some(instancing) => instancing
            .transforms
            .instances
            .iter()
            .take(instancing.drawn() as usize)
            .map(|instance| instance.to_raw(world))
            .collect(),
        None => vec![Instance::new().to_raw(world)],
    }
}

#[derive(Debug)]
pub struct SceneGpu {
    white: Texture,
    placeholder: EnvironmentHandle,
    // the handles are kept so their ids cannot be reused while cached
    environments: HashMap<usize, (EnvironmentHandle, Texture)>,
    images: HashMap<usize, (Arc<image::RgbaImage>, Texture)>,
    meshes: HashMap<usize, (Arc<Geometry>, GpuMesh)>,
    lighting: LightingGpu,
    light: LightingUniform,
    parts: Vec<PartGpu>,
    generation: u64,
    background: bool,
    shadows: ShadowResources,
    shadows_enabled: bool,
}

impl SceneGpu {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipelines: &Pipelines,
        config: &ViewerConfig,
    ) -> Self {
        let white = Texture::create_white(device, queue);
        let placeholder =
            EnvironmentHandle::new(Environment::uniform("placeholder environment", [0.0; 3]));
        let mut environments = HashMap::new();
        let env_texture = Self::upload_environment(device, queue, &mut environments, &placeholder);
        let light = LightingUniform::new(
            &config.light,
            ENVIRONMENT_INTENSITY,
            env_texture.mip_level_count(),
        );
        let lighting = Self::mk_lighting(device, pipelines, light, env_texture, None);

        Self {
            white,
            placeholder,
            environments,
            images: HashMap::new(),
            meshes: HashMap::new(),
            lighting,
            light,
            parts: Vec::new(),
            generation: 0,
            background: false,
            shadows: ShadowResources::new(device, &pipelines.layouts, &config.shadows),
            shadows_enabled: config.canvas.shadows,
        }
    }

    fn upload_environment<'m>(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        cache: &'m mut HashMap<usize, (EnvironmentHandle, Texture)>,
        env: &EnvironmentHandle,
    ) -> &'m Texture {
        let max_size = device.limits().max_texture_dimension_2d.min(MAX_ENVIRONMENT_SIZE);
        &cache
            .entry(env.id())
            .or_insert_with(|| {
                log::info!("uploading environment {}", env.source());
                (
                    env.clone(),
                    Texture::from_environment(device, queue, env, max_size),
                )
            })
            .1
    }

    fn mk_lighting(
        device: &wgpu::Device,
        pipelines: &Pipelines,
        light: LightingUniform,
        env: &Texture,
        env_id: Option<usize>,
    ) -> LightingGpu {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Lighting Buffer"),
            contents: bytemuck::cast_slice(&[light]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let sampler = Self::sampler(device, env);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lighting_bind_group"),
            layout: &pipelines.layouts.lighting,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&env.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });
        LightingGpu {
            env_id,
            buffer,
            bind_group,
        }
    }

    fn sampler(device: &wgpu::Device, texture: &Texture) -> wgpu::Sampler {
        texture
            .sampler
            .clone()
            .unwrap_or_else(|| crate::data_structures::texture::create_default_sampler(device))
    }

    /// Bring the GPU resources in line with `composition` and take this
    /// frame's shadow samples.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipelines: &Pipelines,
        composition: &SceneComposition<'_>,
    ) {
        self.update_lighting(device, queue, pipelines, composition.background);

        if composition.generation != self.generation {
            self.generation = composition.generation;
            self.rebuild_ring(device, queue, pipelines, composition);
            self.shadows.reset();
        }

        if !self.shadows_enabled {
            return;
        }
        self.shadows.update_catcher(
            queue,
            composition.shadows.origin,
            composition.shadows.color,
        );
        let meshes = &self.meshes;
        let casters: Vec<ShadowCaster<'_>> = self
            .parts
            .iter()
            .filter(|part| part.cast_shadow && part.count > 0)
            .filter_map(|part| {
                meshes.get(&key(&part.geometry)).map(|(_, mesh)| ShadowCaster {
                    mesh,
                    instances: &part.instances,
                    count: part.count,
                })
            })
            .collect();
        self.shadows.accumulate(device, queue, pipelines, &casters);
    }

    fn update_lighting(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipelines: &Pipelines,
        background: Option<&EnvironmentHandle>,
    ) {
        self.background = background.is_some();
        let Some(env) = background else {
            return;
        };
        if self.lighting.env_id == Some(env.id()) {
            return;
        }
        let texture = Self::upload_environment(device, queue, &mut self.environments, env);
        self.light = self.light.with_env_levels(texture.mip_level_count());
        self.lighting = Self::mk_lighting(device, pipelines, self.light, texture, Some(env.id()));
        // the placeholder is never needed again once a real backdrop exists
        let placeholder = self.placeholder.id();
        self.environments.remove(&placeholder);
    }

    fn rebuild_ring(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipelines: &Pipelines,
        composition: &SceneComposition<'_>,
    ) {
        let Some(ring) = composition.ring else {
            self.parts.clear();
            return;
        };
        let world = ring.world_matrix();

        let mut parts = Vec::with_capacity(3);
        for entry in ring.group.iter() {
            let geometry_key = key(&entry.geometry);
            self.meshes.entry(geometry_key).or_insert_with(|| {
                log::debug!("uploading mesh for {}", entry.node);
                (
                    entry.geometry.clone(),
                    GpuMesh::from_geometry(device, entry.node, &entry.geometry),
                )
            });

            let raw = instance_data(entry, &world);
            let instances = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Instance Buffer", entry.node)),
                contents: bytemuck::cast_slice(&raw),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let material = self.mk_material(device, queue, pipelines, &entry.material);
            parts.push(PartGpu {
                geometry: entry.geometry.clone(),
                instances,
                count: raw.len() as u32,
                material,
                cast_shadow: entry.cast_shadow,
            });
        }

        // drop meshes the new ring no longer uses
        self.meshes
            .retain(|k, _| parts.iter().any(|part| key(&part.geometry) == *k));
        self.parts = parts;
    }

    fn mk_material(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipelines: &Pipelines,
        binding: &MaterialBinding,
    ) -> MaterialGpu {
        match binding {
            MaterialBinding::Standard(material) => self.mk_opaque(
                device,
                pipelines,
                MaterialUniform::from_standard(material),
                None,
            ),
            MaterialBinding::Asset(descriptor) => {
                let image = descriptor.base_color_texture.as_ref().map(|image| {
                    let entry = self.images.entry(key(image)).or_insert_with(|| {
                        (
                            image.clone(),
                            Texture::from_rgba8(device, queue, image, &descriptor.name),
                        )
                    });
                    key(&entry.0)
                });
                self.mk_opaque(
                    device,
                    pipelines,
                    MaterialUniform::from_descriptor(descriptor),
                    image,
                )
            }
            MaterialBinding::Refraction(material) => {
                let texture = Self::upload_environment(
                    device,
                    queue,
                    &mut self.environments,
                    &material.env_map,
                );
                let uniform = GemUniform::new(material, texture.mip_level_count());
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Gem Buffer"),
                    contents: bytemuck::cast_slice(&[uniform]),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });
                let sampler = Self::sampler(device, texture);
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("gem_bind_group"),
                    layout: &pipelines.layouts.gem,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&texture.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::Sampler(&sampler),
                        },
                    ],
                });
                MaterialGpu {
                    kind: MaterialKind::Refractive,
                    buffer,
                    bind_group,
                }
            }
        }
    }

    fn mk_opaque(
        &self,
        device: &wgpu::Device,
        pipelines: &Pipelines,
        uniform: MaterialUniform,
        image: Option<usize>,
    ) -> MaterialGpu {
        let texture = image
            .and_then(|k| self.images.get(&k))
            .map(|(_, texture)| texture)
            .unwrap_or(&self.white);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Material Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let sampler = Self::sampler(device, texture);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material_bind_group"),
            layout: &pipelines.layouts.material,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });
        MaterialGpu {
            kind: MaterialKind::Opaque,
            buffer,
            bind_group,
        }
    }

    /// Describe the ring draws of this frame.
    pub fn render(&self) -> Render<'_> {
        let renders = self
            .parts
            .iter()
            .filter(|part| part.count > 0)
            .filter_map(|part| {
                let (_, mesh) = self.meshes.get(&key(&part.geometry))?;
                let instanced = Instanced {
                    mesh,
                    instances: &part.instances,
                    amount: part.count,
                    material: &part.material.bind_group,
                };
                Some(match part.material.kind {
                    MaterialKind::Opaque => Render::Opaque(instanced),
                    MaterialKind::Refractive => Render::Refractive(instanced),
                })
            })
            .collect::<Vec<_>>();
        if renders.is_empty() {
            Render::None
        } else {
            Render::Composed(renders)
        }
    }

    /// Draw backdrop, ring and shadow catcher into the HDR target.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &Pipelines,
        camera: &wgpu::BindGroup,
        target: &wgpu::TextureView,
        depth: &wgpu::TextureView,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        if self.background {
            render_pass.set_pipeline(&pipelines.background);
            render_pass.set_bind_group(0, camera, &[]);
            render_pass.set_bind_group(1, &self.lighting.bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }

        let mut opaque = Vec::new();
        let mut refractive = Vec::new();
        self.render().set_pipelines(&mut opaque, &mut refractive);

        if !opaque.is_empty() {
            render_pass.set_pipeline(&pipelines.pbr);
            render_pass.set_bind_group(0, camera, &[]);
            render_pass.set_bind_group(1, &self.lighting.bind_group, &[]);
            for instanced in opaque {
                render_pass.set_bind_group(2, instanced.material, &[]);
                render_pass.set_vertex_buffer(1, instanced.instances.slice(..));
                render_pass.draw_mesh_instanced(instanced.mesh, 0..instanced.amount);
            }
        }

        if !refractive.is_empty() {
            render_pass.set_pipeline(&pipelines.refraction);
            render_pass.set_bind_group(0, camera, &[]);
            for instanced in refractive {
                render_pass.set_bind_group(1, instanced.material, &[]);
                render_pass.set_vertex_buffer(1, instanced.instances.slice(..));
                render_pass.draw_mesh_instanced(instanced.mesh, 0..instanced.amount);
            }
        }

        if self.shadows_enabled {
            self.shadows.draw_catcher(&mut render_pass, pipelines, camera);
        }
    }
}
