//! Application event loop.
//!
//! The loop owns the [`ViewerShell`], the [`ControlPanel`] and, once the GPU
//! is up, the [`Context`]. Everything slow (the ring model and both
//! panoramas) is loaded in the background and delivered back to the loop as
//! a [`ViewerEvent`], so the window appears immediately and fills in as the
//! data arrives.
//!
//! # Lifecycle
//!
//! The event loop follows this pattern:
//! 1. `resumed` creates the window, starts the loads and the GPU context
//! 2. `user_event` hands loaded data and color changes to the shell
//! 3. the shell re-binds the ring whenever its inputs changed
//! 4. every redraw advances the camera, syncs the GPU scene and presents
//!
//! A load that fails is logged and otherwise ignored: the scene simply
//! lacks that piece.

use std::{fmt::Debug, sync::Arc};

use instant::Instant;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use crate::{
    config::ViewerConfig,
    context::Context,
    controls::{ControlKey, ControlPanel, Controls},
    data_structures::{
        asset::LoadedAsset,
        environment::{Environment, EnvironmentHandle},
    },
    resources,
    shell::ViewerShell,
};

/// Messages delivered to the event loop from background work and the page.
pub enum ViewerEvent {
    /// The GPU context finished initializing (web only, where it is async).
    Initialized(Box<Context>),
    Asset(LoadedAsset),
    Background(Environment),
    Refraction(Environment),
    /// A color input changed, with the raw CSS value.
    Control(ControlKey, String),
}

impl Debug for ViewerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized(_) => f.write_str("Initialized"),
            Self::Asset(_) => f.write_str("Asset"),
            Self::Background(env) => f.debug_tuple("Background").field(&env.source).finish(),
            Self::Refraction(env) => f.debug_tuple("Refraction").field(&env.source).finish(),
            Self::Control(key, value) => f.debug_tuple("Control").field(key).field(value).finish(),
        }
    }
}

/// Map the keys F, G and H to the frame, diamond and shadow palettes.
pub fn control_for_key(code: KeyCode) -> Option<ControlKey> {
    match code {
        KeyCode::KeyF => Some(ControlKey::Frame),
        KeyCode::KeyG => Some(ControlKey::Diamonds),
        KeyCode::KeyH => Some(ControlKey::Shadow),
        _ => None,
    }
}

/// Load the three inputs concurrently, sending each one as soon as it is
/// there.
async fn load_scene(config: ViewerConfig, proxy: EventLoopProxy<ViewerEvent>) {
    let assets = &config.assets;
    let model = async {
        match resources::load_asset(&assets.model).await {
            Ok(asset) => send(&proxy, ViewerEvent::Asset(asset)),
            Err(e) => log::error!("could not load the ring {}: {e:#}", assets.model),
        }
    };
    let background = async {
        match resources::load_environment(&assets.background).await {
            Ok(env) => send(&proxy, ViewerEvent::Background(env)),
            Err(e) => log::error!("could not load the backdrop {}: {e:#}", assets.background),
        }
    };
    let refraction = async {
        match resources::load_environment(&assets.refraction).await {
            Ok(env) => send(&proxy, ViewerEvent::Refraction(env)),
            Err(e) => log::error!(
                "could not load the gem environment {}: {e:#}",
                assets.refraction
            ),
        }
    };
    futures::join!(model, background, refraction);
}

fn send(proxy: &EventLoopProxy<ViewerEvent>, event: ViewerEvent) {
    if let Err(e) = proxy.send_event(event) {
        log::warn!("event loop closed before the event arrived: {e}");
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<ViewerEvent>,
    config: ViewerConfig,
    ctx: Option<Context>,
    shell: ViewerShell,
    panel: ControlPanel,
    applied_revision: Option<u64>,
    loading: bool,
    window_created: bool,
    last_time: Instant,
}

impl App {
    fn new(event_loop: &EventLoop<ViewerEvent>, config: ViewerConfig) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            shell: ViewerShell::new(config.clone()),
            config,
            ctx: None,
            panel: ControlPanel::new(Controls::default()),
            applied_revision: None,
            loading: false,
            window_created: false,
            last_time: Instant::now(),
        })
    }

    fn start_loading(&mut self) {
        if self.loading {
            return;
        }
        self.loading = true;
        log::info!("loading {}", self.config.assets.model);
        let fut = load_scene(self.config.clone(), self.proxy.clone());

        #[cfg(not(target_arch = "wasm32"))]
        self.async_runtime.spawn(fut);

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(fut);
    }

    /// Re-run the binder if the colors changed since the last run, or
    /// unconditionally when `force` is set because an input arrived.
    fn refresh(&mut self, force: bool) {
        let revision = self.panel.revision();
        if !force && self.applied_revision == Some(revision) {
            return;
        }
        self.applied_revision = Some(revision);
        if self.shell.update(self.panel.controls()) {
            log::debug!("ring rebound");
        }
        if let Some(ctx) = &self.ctx {
            ctx.window.request_redraw();
        }
    }

    fn on_context(&mut self, mut ctx: Context) {
        let size = ctx.window.inner_size();
        ctx.resize(size.width, size.height);
        ctx.window.request_redraw();
        self.ctx = Some(ctx);
    }

    fn on_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        if let Some(key) = control_for_key(code) {
            let color = self.panel.cycle(key);
            log::info!("{} color is now {}", key.id(), color);
            self.refresh(false);
        }
    }
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        self.start_loading();
        if self.window_created {
            return;
        }
        self.window_created = true;

        #[allow(unused_mut)]
        let mut window_attributes =
            Window::default_attributes().with_title(self.config.canvas.title.clone());

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            let canvas = web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(&self.config.canvas.canvas_id));
            match canvas {
                Some(canvas) => {
                    window_attributes =
                        window_attributes.with_canvas(Some(canvas.unchecked_into()));
                }
                None => log::warn!("no #{} canvas in the page", self.config.canvas.canvas_id),
            }
            if let Err(e) = crate::controls::bind_dom(&self.proxy, self.panel.controls()) {
                log::warn!("color controls unavailable: {e:#}");
            }
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("could not create a window: {e}");
                event_loop.exit();
                return;
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self
                .async_runtime
                .block_on(Context::new(window, &self.config))
            {
                Ok(ctx) => self.on_context(ctx),
                Err(e) => {
                    log::error!("App initialization failed. Cannot create the main context: {e:#}");
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            let config = self.config.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match Context::new(window, &config).await {
                    Ok(ctx) => send(&proxy, ViewerEvent::Initialized(Box::new(ctx))),
                    Err(e) => log::error!(
                        "App initialization failed. Cannot create the main context: {e:#}"
                    ),
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: ViewerEvent) {
        log::trace!("{event:?}");
        match event {
            ViewerEvent::Initialized(ctx) => self.on_context(*ctx),
            ViewerEvent::Asset(asset) => {
                self.shell.set_asset(asset);
                self.refresh(true);
            }
            ViewerEvent::Background(env) => {
                self.shell.set_background(EnvironmentHandle::new(env));
                self.refresh(true);
            }
            ViewerEvent::Refraction(env) => {
                self.shell.set_refraction(EnvironmentHandle::new(env));
                self.refresh(true);
            }
            ViewerEvent::Control(key, value) => match self.panel.set(key, &value) {
                Ok(()) => self.refresh(false),
                Err(e) => log::warn!("ignoring {} value {value:?}: {e:#}", key.id()),
            },
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if let WindowEvent::KeyboardInput { event: key, .. } = &event {
            self.on_key(key);
        }

        let ctx = match &mut self.ctx {
            Some(ctx) => ctx,
            None => return,
        };

        if ctx.camera.controller.handle_window_events(&event) {
            ctx.window.request_redraw();
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => ctx.resize(size.width, size.height),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = ctx.window.inner_size();
                ctx.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();

                match ctx.render(&self.shell.composition(), dt) {
                    Ok(()) => {}
                    // Reconfigure the surface if it's lost or outdated
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = ctx.window.inner_size();
                        ctx.resize(size.width, size.height);
                        ctx.reconfigure();
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("out of GPU memory");
                        event_loop.exit();
                        return;
                    }
                    Err(e) => {
                        log::error!("Unable to render {}", e);
                    }
                }
                // damping and shadow accumulation keep running between inputs
                ctx.window.request_redraw();
            }
            _ => {}
        }
    }
}

fn init_logger() -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .try_init()
        {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));
        console_log::init_with_level(log::Level::Info)
            .map_err(|e| anyhow::anyhow!("could not initialize logger: {e}"))?;
    }
    Ok(())
}

/// Open the viewer and block until its window is closed.
pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    init_logger()?;

    let event_loop: EventLoop<ViewerEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config)?;

    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_keys() {
        assert_eq!(control_for_key(KeyCode::KeyF), Some(ControlKey::Frame));
        assert_eq!(control_for_key(KeyCode::KeyG), Some(ControlKey::Diamonds));
        assert_eq!(control_for_key(KeyCode::KeyH), Some(ControlKey::Shadow));
        assert_eq!(control_for_key(KeyCode::KeyA), None);
    }
}
