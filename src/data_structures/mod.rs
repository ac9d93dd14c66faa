//! Viewer data structures: geometry, materials, instances and GPU wrappers.
//!
//! - `asset` holds the CPU side of a loaded ring model (nodes, geometry, materials)
//! - `color` is the sRGB color type used by the controls
//! - `environment` holds equirectangular HDR panoramas
//! - `instance` holds per-instance transformation data
//! - `model` contains the vertex layout and uploaded meshes
//! - `texture` contains the GPU texture wrapper and creation utilities

pub mod asset;
pub mod color;
pub mod environment;
pub mod instance;
pub mod model;
pub mod texture;
