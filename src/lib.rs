//! ring-configurator
//!
//! An interactive viewer for a three-stone ring. The ring model is loaded
//! from a glTF file, its frame and stones are re-colored live from three
//! color controls, and the result is drawn with image based lighting,
//! refractive gems, soft accumulated contact shadows and a small
//! post-processing chain. The same code runs natively and in the browser.
//!
//! High-level modules
//! - `binder`: validates the loaded model and binds materials onto its meshes
//! - `camera`: orbit camera, controller and uniforms for view/projection
//! - `config`: every scene constant, overridable from a TOML file
//! - `context`: central GPU and window context that owns device/queue/pipelines
//! - `controls`: the three user colors and their inputs
//! - `data_structures`: meshes, instances, textures, colors and environments
//! - `flow`: the event loop, background loading and input handling
//! - `pipelines`: render pipelines (PBR, refraction, shadows, post-processing)
//! - `render`: GPU side of the scene and pipeline batching
//! - `resources`: loading the model and the panoramas from disk or HTTP
//! - `shell`: composes the scene around the bound ring
//!

pub mod binder;
pub mod camera;
pub mod config;
pub mod context;
pub mod controls;
pub mod data_structures;
pub mod flow;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod shell;

pub use config::ViewerConfig;
pub use flow::run;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Browser entry point, started by the generated JS glue.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    run(ViewerConfig::default()).map_err(|e| JsValue::from_str(&format!("{e:#}")))
}
