//! Orbit camera, projection and the camera uniform.
//!
//! The camera circles a target on a sphere (`theta` around +Y measured from
//! +Z, `phi` down from +Y). Input only feeds deltas into the
//! [`OrbitController`]; the deltas are applied with exponential damping once
//! per frame, so a drag keeps gliding for a moment after the mouse stops.

use std::{f32::consts::PI, time::Duration};

use cgmath::{InnerSpace, Matrix4, Point3, Rad, SquareMatrix, Vector3};
use wgpu::util::DeviceExt;
use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
};

use crate::config::{CameraConfig, OrbitConfig};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

// keeps the camera off the poles where the view matrix degenerates
const POLE_EPSILON: f32 = 1e-6;
/// Frame rate the damping factor is defined for.
const DAMPING_RATE: f32 = 60.0;
/// Longest frame the damping catches up with at once.
const MAX_FRAME_TIME: Duration = Duration::from_millis(250);

#[derive(Clone, Debug, PartialEq)]
pub struct OrbitCamera {
    pub target: Point3<f32>,
    pub radius: f32,
    pub theta: f32,
    pub phi: f32,
}

impl OrbitCamera {
    pub fn looking_at(position: Point3<f32>, target: Point3<f32>) -> Self {
        let offset = position - target;
        let radius = offset.magnitude().max(POLE_EPSILON);
        Self {
            target,
            radius,
            theta: offset.x.atan2(offset.z),
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::looking_at(config.position.into(), config.target.into())
    }

    pub fn position(&self) -> Point3<f32> {
        let (sin_phi, cos_phi) = self.phi.sin_cos();
        let (sin_theta, cos_theta) = self.theta.sin_cos();
        self.target
            + self.radius * Vector3::new(sin_phi * sin_theta, cos_phi, sin_phi * cos_theta)
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position(), self.target, Vector3::unit_y())
    }
}

#[derive(Clone, Debug)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width.max(1) as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn from_config(width: u32, height: u32, config: &CameraConfig) -> Self {
        Self::new(width, height, cgmath::Deg(config.fov), config.near, config.far)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Turns pointer input into damped spherical motion.
#[derive(Debug)]
pub struct OrbitController {
    config: OrbitConfig,
    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    /// Pending pan in pixels.
    pan_pixels: [f32; 2],
    rotating: bool,
    panning: bool,
    cursor: Option<PhysicalPosition<f64>>,
    viewport_height: f32,
}

impl OrbitController {
    pub fn new(config: OrbitConfig) -> Self {
        Self {
            config,
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            pan_pixels: [0.0; 2],
            rotating: false,
            panning: false,
            cursor: None,
            viewport_height: 1.0,
        }
    }

    pub fn set_viewport_height(&mut self, height: u32) {
        self.viewport_height = height.max(1) as f32;
    }

    /// Feed a window event. Returns `true` if the event moved the camera.
    pub fn handle_window_events(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.rotating = *state == ElementState::Pressed;
                false
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right | MouseButton::Middle,
                ..
            } => {
                if !self.config.enable_pan {
                    log::trace!("panning is disabled");
                }
                self.panning = self.config.enable_pan && *state == ElementState::Pressed;
                false
            }
            WindowEvent::CursorMoved { position, .. } => {
                let Some(previous) = self.cursor.replace(*position) else {
                    return false;
                };
                let dx = (position.x - previous.x) as f32;
                let dy = (position.y - previous.y) as f32;
                if self.rotating {
                    self.rotate(dx, dy);
                    true
                } else if self.panning {
                    self.drag_pan(dx, dy);
                    true
                } else {
                    false
                }
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                self.rotating = false;
                self.panning = false;
                false
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => (p.y / 100.0) as f32,
                };
                self.zoom(steps);
                steps != 0.0
            }
            _ => false,
        }
    }

    /// Drag by `dx`/`dy` pixels. Speed is scaled so that a drag feels the
    /// same on any viewport around 1000 pixels high.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        let per_pixel = self.config.rotate_speed * 1000.0 / self.viewport_height;
        self.delta_theta -= dx * per_pixel;
        self.delta_phi -= dy * per_pixel;
    }

    /// Positive steps move closer.
    pub fn zoom(&mut self, steps: f32) {
        self.scale *= self.config.zoom_speed.powf(steps);
    }

    /// Queue a pan by `dx`/`dy` pixels. Ignored while panning is disabled.
    pub fn drag_pan(&mut self, dx: f32, dy: f32) {
        if self.config.enable_pan {
            self.pan_pixels[0] += dx;
            self.pan_pixels[1] += dy;
        }
    }

    /// Returns whether the target moved, which is never while panning is
    /// disabled.
    pub fn pan(&mut self, camera: &mut OrbitCamera, offset: Vector3<f32>) -> bool {
        if !self.config.enable_pan {
            return false;
        }
        camera.target += offset;
        true
    }

    /// Apply one reference frame's share of the pending motion to `camera`.
    pub fn update_camera(&mut self, camera: &mut OrbitCamera) {
        let damping = self.config.damping_factor.clamp(0.0, 1.0);
        self.apply(camera, damping);
    }

    /// Like [`update_camera`](Self::update_camera), but for a frame that took
    /// `dt`. The motion left after one second is the same at any frame rate.
    pub fn advance(&mut self, camera: &mut OrbitCamera, dt: Duration) {
        let frames = dt.min(MAX_FRAME_TIME).as_secs_f32() * DAMPING_RATE;
        let keep = 1.0 - self.config.damping_factor.clamp(0.0, 1.0);
        self.apply(camera, 1.0 - keep.powf(frames));
    }

    fn apply(&mut self, camera: &mut OrbitCamera, damping: f32) {
        camera.theta += self.delta_theta * damping;
        camera.phi += self.delta_phi * damping;
        let min_phi = self.config.min_polar_angle.max(POLE_EPSILON);
        let max_phi = self.config.max_polar_angle.min(PI - POLE_EPSILON);
        camera.phi = camera.phi.clamp(min_phi, max_phi.max(min_phi));
        camera.radius = (camera.radius * self.scale)
            .clamp(self.config.min_distance, self.config.max_distance);

        self.delta_theta *= 1.0 - damping;
        self.delta_phi *= 1.0 - damping;
        self.scale = 1.0;

        // a drag over the full viewport height moves the target by its distance
        let [dx, dy] = std::mem::take(&mut self.pan_pixels);
        if dx != 0.0 || dy != 0.0 {
            let per_pixel = camera.radius / self.viewport_height;
            let forward = (camera.target - camera.position()).normalize();
            let right = forward.cross(Vector3::unit_y()).normalize();
            let up = right.cross(forward);
            self.pan(camera, (right * -dx + up * dy) * per_pixel);
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    inv_view_proj: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    proj: [[f32; 4]; 4],
    inv_proj: [[f32; 4]; 4],
    position: [f32; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        let identity: [[f32; 4]; 4] = Matrix4::identity().into();
        Self {
            view_proj: identity,
            inv_view_proj: identity,
            view: identity,
            proj: identity,
            inv_proj: identity,
            position: [0.0, 0.0, 0.0, 1.0],
        }
    }

    pub fn update_view_proj(&mut self, camera: &OrbitCamera, projection: &Projection) {
        let view = camera.calc_matrix();
        let proj = projection.calc_matrix();
        let view_proj = proj * view;
        self.view = view.into();
        self.proj = proj.into();
        self.view_proj = view_proj.into();
        self.inv_view_proj = view_proj.invert().unwrap_or(Matrix4::identity()).into();
        self.inv_proj = proj.invert().unwrap_or(Matrix4::identity()).into();
        self.position = camera.position().to_homogeneous().into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct CameraResources {
    pub camera: OrbitCamera,
    pub controller: OrbitController,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl CameraResources {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        camera: OrbitCamera,
        controller: OrbitController,
        projection: &Projection,
    ) -> Self {
        let mut uniform = CameraUniform::new();
        uniform.update_view_proj(&camera, projection);

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        Self {
            camera,
            controller,
            uniform,
            buffer,
            bind_group,
            bind_group_layout: layout.clone(),
        }
    }

    pub fn write(&mut self, queue: &wgpu::Queue, projection: &Projection) {
        self.uniform.update_view_proj(&self.camera, projection);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}
