//! Hand-built GLB files shaped like the ring model.

use std::collections::HashMap;

use ring_configurator::{
    binder::{FRAME_NODE, GEMS_NODE, METAL_MATERIAL, METAL_NODE},
    controls::Controls,
    data_structures::{
        asset::{
            AssetNode, Geometry, InstanceTransforms, LoadedAsset, MaterialDescriptor, SceneRoot,
        },
        color::Color,
        environment::{Environment, EnvironmentHandle},
        instance::Instance,
    },
};
use std::sync::Arc;

/// What the generated ring file contains.
#[derive(Clone, Debug)]
pub struct RingFixture {
    pub gem_count: usize,
    pub with_metal_material: bool,
    pub with_instancing: bool,
    pub skip_node: Option<&'static str>,
    /// Adds a normalized `SHORT` rotation and a float scale per gem.
    pub quantized_rotations: bool,
}

impl Default for RingFixture {
    fn default() -> Self {
        Self {
            gem_count: 65,
            with_metal_material: true,
            with_instancing: true,
            skip_node: None,
            quantized_rotations: false,
        }
    }
}

fn push_f32s(bin: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        bin.extend_from_slice(&v.to_le_bytes());
    }
}

/// A GLB with one triangle per ring part. The gem node carries
/// `EXT_mesh_gpu_instancing` with translations `(i, 0, 0)`.
pub fn ring_glb(fixture: &RingFixture) -> Vec<u8> {
    let mut bin = Vec::new();
    // accessor 0: positions
    push_f32s(&mut bin, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    // accessor 1: normals
    push_f32s(&mut bin, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
    // accessor 2: indices
    for i in 0u32..3 {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    // accessor 3: gem translations
    let mut views = Vec::new();
    let mut accessors = Vec::new();
    let mut attributes = Vec::new();
    if fixture.gem_count > 0 {
        let offset = bin.len();
        for i in 0..fixture.gem_count {
            push_f32s(&mut bin, &[i as f32, 0.0, 0.0]);
        }
        views.push((offset, bin.len() - offset));
        accessors.push(format!(
            r#"{{"bufferView": 3, "componentType": 5126, "count": {}, "type": "VEC3"}}"#,
            fixture.gem_count
        ));
        attributes.push(r#""TRANSLATION": 3"#.to_string());
    }
    if fixture.gem_count > 0 && fixture.quantized_rotations {
        // accessor 4: quarter turn around y, i16 normalized
        let offset = bin.len();
        for _ in 0..fixture.gem_count {
            for c in [0i16, 23170, 0, 23170] {
                bin.extend_from_slice(&c.to_le_bytes());
            }
        }
        views.push((offset, bin.len() - offset));
        accessors.push(format!(
            r#"{{"bufferView": 4, "componentType": 5122, "normalized": true, "count": {}, "type": "VEC4"}}"#,
            fixture.gem_count
        ));
        attributes.push(r#""ROTATION": 4"#.to_string());

        // accessor 5: uniform scale 2
        let offset = bin.len();
        for _ in 0..fixture.gem_count {
            push_f32s(&mut bin, &[2.0, 2.0, 2.0]);
        }
        views.push((offset, bin.len() - offset));
        accessors.push(format!(
            r#"{{"bufferView": 5, "componentType": 5126, "count": {}, "type": "VEC3"}}"#,
            fixture.gem_count
        ));
        attributes.push(r#""SCALE": 5"#.to_string());
    }

    let mut materials = vec![r#"{"name": "Gem"}"#.to_string()];
    if fixture.with_metal_material {
        materials.push(format!(
            r#"{{"name": "{METAL_MATERIAL}", "pbrMetallicRoughness": {{"baseColorFactor": [0.9, 0.8, 0.7, 1.0], "metallicFactor": 1.0, "roughnessFactor": 0.2}}}}"#
        ));
    }

    let instancing = if fixture.with_instancing && !attributes.is_empty() {
        format!(
            r#", "extensions": {{"EXT_mesh_gpu_instancing": {{"attributes": {{{}}}}}}}"#,
            attributes.join(", ")
        )
    } else {
        String::new()
    };
    let parts = [
        (FRAME_NODE, 0, String::new()),
        (METAL_NODE, 1, String::new()),
        (GEMS_NODE, 2, instancing),
    ];
    let nodes: Vec<String> = parts
        .iter()
        .filter(|(name, _, _)| Some(*name) != fixture.skip_node)
        .map(|(name, mesh, ext)| format!(r#"{{"name": "{name}", "mesh": {mesh}{ext}}}"#))
        .collect();
    let scene_nodes: Vec<String> = (0..nodes.len()).map(|i| i.to_string()).collect();

    let primitive = r#"{"attributes": {"POSITION": 0, "NORMAL": 1}, "indices": 2, "material": 0}"#;
    let extra_views: String = views
        .iter()
        .map(|(offset, len)| {
            format!(r#", {{"buffer": 0, "byteOffset": {offset}, "byteLength": {len}}}"#)
        })
        .collect();
    let extra_accessors: String = accessors.iter().map(|a| format!(", {a}")).collect();

    let json = format!(
        r#"{{
  "asset": {{"version": "2.0"}},
  "extensionsUsed": ["EXT_mesh_gpu_instancing"],
  "extensionsRequired": ["EXT_mesh_gpu_instancing"],
  "scene": 0,
  "scenes": [{{"name": "ring", "nodes": [{scene_nodes}]}}],
  "nodes": [{nodes}],
  "meshes": [
    {{"name": "frame", "primitives": [{primitive}]}},
    {{"name": "metal", "primitives": [{primitive}]}},
    {{"name": "gem", "primitives": [{primitive}]}}
  ],
  "materials": [{materials}],
  "buffers": [{{"byteLength": {buffer_len}}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 72, "byteLength": 12}}{extra_views}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}},
    {{"bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3"}},
    {{"bufferView": 2, "componentType": 5125, "count": 3, "type": "SCALAR"}}{extra_accessors}
  ]
}}"#,
        scene_nodes = scene_nodes.join(", "),
        nodes = nodes.join(", "),
        materials = materials.join(", "),
        buffer_len = bin.len(),
    );

    glb(json.into_bytes(), bin)
}

/// Pack a JSON chunk and a binary chunk into a GLB container.
pub fn glb(mut json: Vec<u8>, mut bin: Vec<u8>) -> Vec<u8> {
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    while bin.len() % 4 != 0 {
        bin.push(0);
    }
    let total = 12 + 8 + json.len() + 8 + bin.len();

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(b"BIN\0");
    out.extend_from_slice(&bin);
    out
}

/// An in-memory asset that passes validation, without going through glTF.
pub fn complete_asset() -> LoadedAsset {
    let geometry = || {
        Some(Arc::new(Geometry {
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            tex_coords: vec![[0.0; 2]; 3],
            indices: vec![0, 1, 2],
        }))
    };
    let node = |name: &str, instanced: bool| {
        (
            name.to_string(),
            AssetNode {
                name: name.to_string(),
                geometry: geometry(),
                instance_transforms: instanced.then(|| {
                    Arc::new(InstanceTransforms {
                        instances: vec![Instance::new(); 65],
                    })
                }),
            },
        )
    };
    LoadedAsset {
        nodes: Some(HashMap::from([
            node(FRAME_NODE, false),
            node(METAL_NODE, false),
            node(GEMS_NODE, true),
        ])),
        materials: Some(HashMap::from([(
            METAL_MATERIAL.to_string(),
            Arc::new(MaterialDescriptor {
                name: METAL_MATERIAL.to_string(),
                ..Default::default()
            }),
        )])),
        scene: Some(SceneRoot::default()),
    }
}

pub fn environment() -> EnvironmentHandle {
    EnvironmentHandle::new(Environment::uniform("test environment", [0.5; 3]))
}

pub fn controls(frame: &str, diamonds: &str) -> Controls {
    Controls {
        frame: Color::parse(frame).unwrap(),
        diamonds: Color::parse(diamonds).unwrap(),
        ..Controls::default()
    }
}
