use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use winit::window::Window;

use crate::{
    camera::{CameraResources, OrbitCamera, OrbitController, Projection},
    config::{CanvasConfig, EffectChain, ViewerConfig},
    data_structures::texture::Texture,
    pipelines::{Pipelines, post::PostChain},
    render::SceneGpu,
    shell::SceneComposition,
};

/// Everything tied to the GPU device and the window surface.
#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    /// Size of the internal HDR targets, the surface size scaled by the
    /// clamped pixel ratio.
    pub render_size: [u32; 2],
    pub camera: CameraResources,
    pub projection: Projection,
    pub pipelines: Pipelines,
    pub scene: SceneGpu,
    pub(crate) hdr_target: Texture,
    pub(crate) depth_texture: Texture,
    pub(crate) post: PostChain,
    canvas: CanvasConfig,
    effects: EffectChain,
}

impl Context {
    pub async fn new(window: Arc<Window>, viewer: &ViewerConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();

        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("creating the window surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable graphics adapter")?;
        log::info!("device and queue");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("requesting the graphics device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        // non sRGB surfaces are handled by the present pass
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no texture formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!("surface {:?} at {}x{}", surface_format, config.width, config.height);
        if viewer.canvas.antialias {
            log::debug!("antialiasing is not applied to the HDR targets");
        }

        let render_size = viewer
            .canvas
            .render_size([config.width, config.height], window.scale_factor());
        let projection = Projection::from_config(render_size[0], render_size[1], &viewer.camera);
        let pipelines = Pipelines::new(&device, surface_format);

        let mut controller = OrbitController::new(viewer.orbit.clone());
        controller.set_viewport_height(render_size[1]);
        let camera = CameraResources::new(
            &device,
            &pipelines.layouts.camera,
            OrbitCamera::from_config(&viewer.camera),
            controller,
            &projection,
        );

        let (hdr_target, depth_texture, post) =
            Self::mk_targets(&device, &pipelines, &viewer.effects, render_size);
        let scene = SceneGpu::new(&device, &queue, &pipelines, viewer);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            render_size,
            camera,
            projection,
            pipelines,
            scene,
            hdr_target,
            depth_texture,
            post,
            canvas: viewer.canvas.clone(),
            effects: viewer.effects.clone(),
        })
    }

    fn mk_targets(
        device: &wgpu::Device,
        pipelines: &Pipelines,
        effects: &EffectChain,
        size: [u32; 2],
    ) -> (Texture, Texture, PostChain) {
        let hdr = Texture::create_render_target(device, size, Texture::HDR_FORMAT, "hdr target");
        let depth = Texture::create_depth_texture(device, size, "depth_texture");
        let post = PostChain::new(device, &pipelines.post, effects, &hdr, &depth, size);
        (hdr, depth, post)
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Reconfigure the surface and rebuild every size dependent target.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        self.render_size = self
            .canvas
            .render_size([width, height], self.window.scale_factor());
        let [w, h] = self.render_size;
        self.projection.resize(w, h);
        self.camera.controller.set_viewport_height(h);
        let (hdr, depth, post) =
            Self::mk_targets(&self.device, &self.pipelines, &self.effects, self.render_size);
        self.hdr_target = hdr;
        self.depth_texture = depth;
        self.post = post;
        log::debug!("resized to {width}x{height}, rendering at {w}x{h}");
    }

    /// Reconfigure with the current size, after the surface was lost.
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// Advance the camera by `dt`, sync the scene and draw one frame.
    pub fn render(
        &mut self,
        composition: &SceneComposition<'_>,
        dt: Duration,
    ) -> Result<(), wgpu::SurfaceError> {
        self.camera
            .controller
            .advance(&mut self.camera.camera, dt);
        self.camera.write(&self.queue, &self.projection);
        self.scene
            .prepare(&self.device, &self.queue, &self.pipelines, composition);
        self.post.update(&self.queue, &self.projection);

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        self.scene.encode(
            &mut encoder,
            &self.pipelines,
            &self.camera.bind_group,
            &self.hdr_target.view,
            &self.depth_texture.view,
        );
        self.post.encode(&mut encoder, &self.pipelines.post, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        output.present();
        Ok(())
    }
}
