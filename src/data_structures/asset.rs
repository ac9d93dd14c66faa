//! CPU-side view of a loaded glTF asset.
//!
//! The loader in [`crate::resources`] fills these tables; everything else only
//! borrows them. Every part of a [`LoadedAsset`] is optional because the
//! viewer asks for the asset long before the download has finished, and a
//! malformed file may never provide some parts at all.

use std::{collections::HashMap, sync::Arc};

use cgmath::{InnerSpace, Zero};

use crate::data_structures::instance::Instance;

pub type NodeTable = HashMap<String, AssetNode>;
pub type MaterialTable = HashMap<String, Arc<MaterialDescriptor>>;

/// The node/material/scene tables of a (possibly not yet loaded) asset.
#[derive(Clone, Debug, Default)]
pub struct LoadedAsset {
    pub nodes: Option<NodeTable>,
    pub materials: Option<MaterialTable>,
    pub scene: Option<SceneRoot>,
}

impl LoadedAsset {
    /// The value an asset slot holds while the model is still streaming in.
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn node(&self, name: &str) -> Option<&AssetNode> {
        self.nodes.as_ref()?.get(name)
    }

    pub fn material(&self, name: &str) -> Option<&Arc<MaterialDescriptor>> {
        self.materials.as_ref()?.get(name)
    }

    pub fn is_pending(&self) -> bool {
        self.nodes.is_none() && self.materials.is_none() && self.scene.is_none()
    }
}

/// A named entry of the asset's scene graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssetNode {
    pub name: String,
    pub geometry: Option<Arc<Geometry>>,
    pub instance_transforms: Option<Arc<InstanceTransforms>>,
}

/// Root of the asset's default scene.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneRoot {
    pub name: Option<String>,
    /// Names of the top-level nodes, in document order.
    pub children: Vec<String>,
}

/// Triangle mesh with per-vertex position, normal and uv.
///
/// All primitives of a glTF mesh end up merged in one geometry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Append another mesh, re-basing its indices.
    pub fn merge(&mut self, mut other: Geometry) {
        let base = self.positions.len() as u32;
        // Missing attributes are padded so all arrays stay the same length.
        other.normals.resize(other.positions.len(), [0.0, 1.0, 0.0]);
        other.tex_coords.resize(other.positions.len(), [0.0, 0.0]);
        self.positions.append(&mut other.positions);
        self.normals.append(&mut other.normals);
        self.tex_coords.append(&mut other.tex_coords);
        self.indices.extend(other.indices.into_iter().map(|i| i + base));
    }

    /// Fill in flat-ish normals from the triangles when the file has none.
    pub fn compute_normals(&mut self) {
        let mut normals = vec![cgmath::Vector3::zero(); self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (Some(pa), Some(pb), Some(pc)) = (
                self.positions.get(a),
                self.positions.get(b),
                self.positions.get(c),
            ) else {
                continue;
            };
            let pa: cgmath::Vector3<f32> = (*pa).into();
            let face = (cgmath::Vector3::from(*pb) - pa).cross(cgmath::Vector3::from(*pc) - pa);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        self.normals = normals
            .into_iter()
            .map(|n| {
                if n.magnitude2() > 0.0 {
                    n.normalize().into()
                } else {
                    [0.0, 1.0, 0.0]
                }
            })
            .collect();
    }

    /// Axis aligned bounds of the transformed vertices, `None` for an empty mesh.
    pub fn bounds(&self, transform: &cgmath::Matrix4<f32>) -> Option<Bounds> {
        self.positions
            .iter()
            .map(|p| {
                let p = transform * cgmath::Vector4::new(p[0], p[1], p[2], 1.0);
                [p.x, p.y, p.z]
            })
            .fold(None, |acc: Option<Bounds>, p| {
                Some(match acc {
                    None => Bounds { min: p, max: p },
                    Some(b) => b.including(p),
                })
            })
    }
}

/// Axis aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    pub fn including(self, p: [f32; 3]) -> Self {
        Self {
            min: [0, 1, 2].map(|i| self.min[i].min(p[i])),
            max: [0, 1, 2].map(|i| self.max[i].max(p[i])),
        }
    }

    pub fn union(self, other: Bounds) -> Self {
        self.including(other.min).including(other.max)
    }

    pub fn center(&self) -> [f32; 3] {
        [0, 1, 2].map(|i| (self.min[i] + self.max[i]) * 0.5)
    }

    pub fn size(&self) -> [f32; 3] {
        [0, 1, 2].map(|i| self.max[i] - self.min[i])
    }
}

/// Per-instance placement of an instanced node, one [`Instance`] per copy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceTransforms {
    pub instances: Vec<Instance>,
}

impl InstanceTransforms {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// A material as described by the asset file.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDescriptor {
    pub name: String,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: [f32; 3],
    pub double_sided: bool,
    pub base_color_texture: Option<Arc<image::RgbaImage>>,
}

impl Default for MaterialDescriptor {
    // glTF's defaults for an unspecified pbrMetallicRoughness block
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: [1.0; 4],
            metallic: 1.0,
            roughness: 1.0,
            emissive: [0.0; 3],
            double_sided: false,
            base_color_texture: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::SquareMatrix;

    use super::*;

    fn triangle() -> Geometry {
        Geometry {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![],
            tex_coords: vec![],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn merge_rebases_indices_and_pads_attributes() {
        let mut merged = Geometry::default();
        merged.merge(triangle());
        merged.merge(triangle());
        assert_eq!(merged.vertex_count(), 6);
        assert_eq!(merged.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(merged.normals.len(), 6);
        assert_eq!(merged.tex_coords.len(), 6);
    }

    #[test]
    fn computed_normals_face_the_winding() {
        let mut tri = triangle();
        tri.compute_normals();
        for n in tri.normals {
            assert_eq!(n, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn bounds_follow_the_transform() {
        let tri = triangle();
        let b = tri.bounds(&cgmath::Matrix4::identity()).unwrap();
        assert_eq!(b.min, [0.0, 0.0, 0.0]);
        assert_eq!(b.max, [1.0, 1.0, 0.0]);
        let scaled = tri.bounds(&cgmath::Matrix4::from_scale(0.1)).unwrap();
        assert!((scaled.size()[0] - 0.1).abs() < 1e-6);
        assert!(Geometry::default().bounds(&cgmath::Matrix4::identity()).is_none());
    }

    #[test]
    fn pending_asset_has_no_tables() {
        let asset = LoadedAsset::pending();
        assert!(asset.is_pending());
        assert!(asset.node("mesh_0").is_none());
        assert!(asset.material("WhiteMetal").is_none());
    }
}
