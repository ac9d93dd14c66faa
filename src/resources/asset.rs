//! glTF/GLB to [`LoadedAsset`].
//!
//! Only what the viewer consumes is extracted: per-node geometry (all
//! primitives of the node's mesh merged), the per-instance transforms of the
//! `EXT_mesh_gpu_instancing` extension, the material table and the default
//! scene. Node transforms are not applied.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use anyhow::{Context as _, bail};
use cgmath::Vector3;
use gltf::accessor::{DataType, Item, Iter};

use crate::data_structures::{
    asset::{
        AssetNode, Geometry, InstanceTransforms, LoadedAsset, MaterialDescriptor, MaterialTable,
        NodeTable, SceneRoot,
    },
    instance::Instance,
};

const INSTANCING_EXTENSION: &str = "EXT_mesh_gpu_instancing";

/// Buffers and images that live outside the document itself.
#[derive(Debug, Default)]
pub struct ExternalData {
    /// One entry per glTF buffer, in document order.
    pub buffers: Vec<Vec<u8>>,
    /// Encoded image files by image index, for images referenced by URI.
    pub images: HashMap<usize, Vec<u8>>,
}

/// Parse a self-contained GLB (or a glTF without external references).
pub fn parse_asset(bytes: &[u8]) -> anyhow::Result<LoadedAsset> {
    let (document, blob) = open(bytes)?;
    let mut buffers = Vec::new();
    for buffer in document.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = blob
                    .as_deref()
                    .context("binary buffer referenced but no blob present")?;
                buffers.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) => {
                bail!("external buffer {uri} needs the async loader")
            }
        }
    }
    let external = ExternalData {
        buffers,
        images: HashMap::new(),
    };
    parse_document(&document, &external)
}

/// Read and validate a glTF/GLB container.
///
/// The instancing extension is read by hand, so it is accepted even when the
/// file marks it as required.
pub fn open(bytes: &[u8]) -> anyhow::Result<(gltf::Document, Option<Vec<u8>>)> {
    let gltf::Gltf { document, blob } =
        gltf::Gltf::from_slice_without_validation(bytes).context("parsing glTF")?;
    let mut root = document.into_json();
    root.extensions_required.retain(|ext| ext != INSTANCING_EXTENSION);
    let document = gltf::Document::from_json(root).context("validating glTF")?;
    Ok((document, blob))
}

pub fn parse_document(
    document: &gltf::Document,
    external: &ExternalData,
) -> anyhow::Result<LoadedAsset> {
    let buffers = external.buffers.as_slice();

    let mut nodes = NodeTable::new();
    for node in document.nodes() {
        let name = node_name(&node);
        let geometry = match node.mesh() {
            Some(mesh) => read_geometry(&mesh, buffers),
            None => None,
        };
        let instance_transforms = read_instancing(document, &node, buffers)
            .with_context(|| format!("reading instances of node {name}"))?;
        let entry = AssetNode {
            name: name.clone(),
            geometry: geometry.map(Arc::new),
            instance_transforms: instance_transforms.map(Arc::new),
        };
        match nodes.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(slot) => {
                log::warn!("duplicate node name {}, keeping the first one", slot.key())
            }
        }
    }

    let mut materials = MaterialTable::new();
    for material in document.materials() {
        let Some(name) = material.name() else {
            continue;
        };
        let descriptor = read_material(&material, external)?;
        materials.entry(name.to_string()).or_insert(Arc::new(descriptor));
    }

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .map(|scene| SceneRoot {
            name: scene.name().map(str::to_string),
            children: scene.nodes().map(|n| node_name(&n)).collect(),
        });
    if scene.is_none() {
        log::warn!("asset has no scene");
    }

    log::info!(
        "parsed asset: {} nodes, {} materials",
        nodes.len(),
        materials.len()
    );
    Ok(LoadedAsset {
        nodes: Some(nodes),
        materials: Some(materials),
        scene,
    })
}

/// Node name, then mesh name, then a positional name.
fn node_name(node: &gltf::Node) -> String {
    node.name()
        .or_else(|| node.mesh().and_then(|m| m.name()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("node_{}", node.index()))
}

fn read_geometry(mesh: &gltf::Mesh, buffers: &[Vec<u8>]) -> Option<Geometry> {
    let mut geometry = Geometry::default();
    let mut missing_normals = false;
    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!(
                "skipping {:?} primitive of mesh {}",
                primitive.mode(),
                mesh.name().unwrap_or("?")
            );
            continue;
        }
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
        let Some(positions) = reader.read_positions() else {
            continue;
        };
        let positions: Vec<[f32; 3]> = positions.collect();
        let normals: Vec<[f32; 3]> = reader
            .read_normals()
            .map(Iterator::collect)
            .unwrap_or_default();
        missing_normals |= normals.len() != positions.len();
        let tex_coords = reader
            .read_tex_coords(0)
            .map(|t| t.into_f32().collect())
            .unwrap_or_default();
        let indices = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };
        geometry.merge(Geometry {
            positions,
            normals,
            tex_coords,
            indices,
        });
    }
    if geometry.is_empty() {
        return None;
    }
    if missing_normals {
        geometry.compute_normals();
    }
    Some(geometry)
}

fn read_instancing(
    document: &gltf::Document,
    node: &gltf::Node,
    buffers: &[Vec<u8>],
) -> anyhow::Result<Option<InstanceTransforms>> {
    let Some(extension) = node.extension_value(INSTANCING_EXTENSION) else {
        return Ok(None);
    };
    let attribute = |semantic: &str| {
        extension
            .get("attributes")
            .and_then(|a| a.get(semantic))
            .and_then(|index| index.as_u64())
            .map(|index| index as usize)
    };
    let accessor = |index: usize| {
        document
            .accessors()
            .nth(index)
            .with_context(|| format!("accessor {index} does not exist"))
    };

    let translations = match attribute("TRANSLATION") {
        Some(index) => Some(read_floats::<3>(accessor(index)?, buffers)?),
        None => None,
    };
    let rotations = match attribute("ROTATION") {
        Some(index) => Some(read_floats::<4>(accessor(index)?, buffers)?),
        None => None,
    };
    let scales = match attribute("SCALE") {
        Some(index) => Some(read_floats::<3>(accessor(index)?, buffers)?),
        None => None,
    };

    let count = [
        translations.as_ref().map(Vec::len),
        rotations.as_ref().map(Vec::len),
        scales.as_ref().map(Vec::len),
    ]
    .into_iter()
    .flatten()
    .min();
    let Some(count) = count else {
        log::warn!("{INSTANCING_EXTENSION} on {:?} has no attributes", node.name());
        return Ok(None);
    };

    let instances = (0..count)
        .map(|i| {
            let mut instance = Instance::new();
            if let Some(t) = &translations {
                instance.position = Vector3::from(t[i]);
            }
            if let Some(r) = &rotations {
                let [x, y, z, w] = r[i];
                instance.rotation = cgmath::Quaternion::new(w, x, y, z);
            }
            if let Some(s) = &scales {
                instance.scale = Vector3::from(s[i]);
            }
            instance
        })
        .collect();
    Ok(Some(InstanceTransforms { instances }))
}

/// Read an accessor of `N` components as floats. Integer components are
/// mapped to `[-1, 1]` or `[0, 1]` when the accessor is normalized, and
/// converted as is otherwise.
fn read_floats<const N: usize>(
    accessor: gltf::Accessor,
    buffers: &[Vec<u8>],
) -> anyhow::Result<Vec<[f32; N]>>
where
    [f32; N]: Item,
    [i8; N]: Item,
    [u8; N]: Item,
    [i16; N]: Item,
    [u16; N]: Item,
{
    if accessor.dimensions().multiplicity() != N {
        bail!(
            "accessor {} is {:?}, expected {N} components",
            accessor.index(),
            accessor.dimensions()
        );
    }
    let normalized = accessor.normalized();
    match accessor.data_type() {
        DataType::F32 => collect_floats(accessor, buffers, |c: f32| c),
        DataType::I8 => collect_floats(accessor, buffers, |c: i8| {
            if normalized {
                (c as f32 / 127.0).max(-1.0)
            } else {
                c as f32
            }
        }),
        DataType::U8 => collect_floats(accessor, buffers, |c: u8| {
            if normalized {
                c as f32 / 255.0
            } else {
                c as f32
            }
        }),
        DataType::I16 => collect_floats(accessor, buffers, |c: i16| {
            if normalized {
                (c as f32 / 32767.0).max(-1.0)
            } else {
                c as f32
            }
        }),
        DataType::U16 => collect_floats(accessor, buffers, |c: u16| {
            if normalized {
                c as f32 / 65535.0
            } else {
                c as f32
            }
        }),
        other => bail!(
            "accessor {} has unsupported component type {other:?}",
            accessor.index()
        ),
    }
}

fn collect_floats<'a, T, const N: usize>(
    accessor: gltf::Accessor<'a>,
    buffers: &'a [Vec<u8>],
    to_f32: impl Fn(T) -> f32,
) -> anyhow::Result<Vec<[f32; N]>>
where
    T: Copy,
    [T; N]: Item,
{
    let index = accessor.index();
    let iter = Iter::<[T; N]>::new(accessor, |buffer: gltf::Buffer<'a>| {
        buffers.get(buffer.index()).map(Vec::as_slice)
    })
    .with_context(|| format!("accessor {index} has no readable data"))?;
    Ok(iter.map(|value| value.map(&to_f32)).collect())
}

fn read_material(
    material: &gltf::Material,
    external: &ExternalData,
) -> anyhow::Result<MaterialDescriptor> {
    let pbr = material.pbr_metallic_roughness();
    let base_color_texture = match pbr.base_color_texture() {
        Some(info) => read_image(&info.texture().source(), external)?,
        None => None,
    };
    Ok(MaterialDescriptor {
        name: material.name().unwrap_or_default().to_string(),
        base_color: pbr.base_color_factor(),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        emissive: material.emissive_factor(),
        double_sided: material.double_sided(),
        base_color_texture: base_color_texture.map(Arc::new),
    })
}

fn read_image(
    image: &gltf::Image,
    external: &ExternalData,
) -> anyhow::Result<Option<image::RgbaImage>> {
    let bytes = match image.source() {
        gltf::image::Source::View { view, .. } => {
            let buffer = external
                .buffers
                .get(view.buffer().index())
                .with_context(|| format!("image {} points past the buffers", image.index()))?;
            let start = view.offset();
            let end = start + view.length();
            buffer
                .get(start..end)
                .with_context(|| format!("image {} view out of range", image.index()))?
        }
        gltf::image::Source::Uri { uri, .. } => match external.images.get(&image.index()) {
            Some(bytes) => bytes.as_slice(),
            None => {
                log::warn!("image {uri} was not fetched, material stays untextured");
                return Ok(None);
            }
        },
    };
    let decoded = image::load_from_memory(bytes)
        .with_context(|| format!("decoding image {}", image.index()))?;
    Ok(Some(decoded.to_rgba8()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage() {
        assert!(parse_asset(b"definitely not a model").is_err());
    }

    #[test]
    fn empty_document_has_tables_but_no_scene() {
        let json = br#"{"asset":{"version":"2.0"}}"#;
        let asset = parse_asset(json).unwrap();
        assert!(asset.nodes.unwrap().is_empty());
        assert!(asset.materials.unwrap().is_empty());
        assert!(asset.scene.is_none());
    }

    #[test]
    fn unnamed_nodes_fall_back_to_mesh_then_index() {
        let json = br#"{
            "asset": {"version": "2.0"},
            "meshes": [{"name": "gem", "primitives": []}],
            "nodes": [{"mesh": 0}, {}],
            "scenes": [{"nodes": [0, 1]}],
            "scene": 0
        }"#;
        let asset = parse_asset(json).unwrap();
        let scene = asset.scene.as_ref().unwrap();
        assert_eq!(scene.children, vec!["gem".to_string(), "node_1".to_string()]);
        // a mesh without triangles has no geometry
        assert!(asset.node("gem").unwrap().geometry.is_none());
    }
}
