use crate::{
    data_structures::texture::Texture,
    pipelines::{
        Layouts,
        basic::{PipelineOptions, mk_render_pipeline},
    },
};

/// Fullscreen triangle that paints the background environment. It is drawn
/// first, so it neither tests nor writes depth.
pub fn mk_background_pipeline(device: &wgpu::Device, layouts: &Layouts) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Background Pipeline Layout"),
        bind_group_layouts: &[&layouts.camera, &layouts.lighting],
        push_constant_ranges: &[],
    });
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Background Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("background.wgsl").into()),
    };
    mk_render_pipeline(
        device,
        &layout,
        Texture::HDR_FORMAT,
        None,
        Some(Texture::DEPTH_FORMAT),
        &[],
        shader,
        PipelineOptions {
            label: "Background Pipeline",
            cull_mode: None,
            depth_write: false,
            depth_compare: wgpu::CompareFunction::Always,
        },
    )
}
