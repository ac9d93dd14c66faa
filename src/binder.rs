//! Turns a loaded ring asset into something the renderer can draw.
//!
//! The asset is usually requested long before it has arrived, so [`bind`] is
//! called over and over with whatever the loader has produced so far. It
//! never fails and never panics: an incomplete asset simply yields
//! [`Binding::NotReady`], and only an asset that passed every check produces a
//! [`RenderableGroup`].

use std::{fmt, sync::Arc};

use crate::{
    controls::Controls,
    data_structures::{
        asset::{AssetNode, Geometry, InstanceTransforms, LoadedAsset, MaterialDescriptor},
        color::Color,
        environment::EnvironmentHandle,
    },
};

pub const FRAME_NODE: &str = "mesh_0";
pub const METAL_NODE: &str = "mesh_9";
pub const GEMS_NODE: &str = "mesh_4";
pub const METAL_MATERIAL: &str = "WhiteMetal";

/// Nodes that must exist, in the order they are checked.
pub const REQUIRED_NODES: [&str; 3] = [FRAME_NODE, METAL_NODE, GEMS_NODE];

pub const GEM_INSTANCE_COUNT: u32 = 65;

/// Why an asset cannot be drawn yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotReady {
    MissingNodeTable,
    MissingMaterialTable,
    MissingSceneRoot,
    MissingNode(&'static str),
    MissingGeometry(&'static str),
    MissingInstanceTransforms(&'static str),
    MissingMaterial(&'static str),
}

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReady::MissingNodeTable => f.write_str("node table not loaded"),
            NotReady::MissingMaterialTable => f.write_str("material table not loaded"),
            NotReady::MissingSceneRoot => f.write_str("scene root not loaded"),
            NotReady::MissingNode(name) => write!(f, "node {name} missing"),
            NotReady::MissingGeometry(name) => write!(f, "node {name} has no geometry"),
            NotReady::MissingInstanceTransforms(name) => {
                write!(f, "node {name} has no instance transforms")
            }
            NotReady::MissingMaterial(name) => write!(f, "material {name} missing"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Binding {
    Ready(RenderableGroup),
    NotReady(NotReady),
}

impl Binding {
    pub fn ready(self) -> Option<RenderableGroup> {
        match self {
            Binding::Ready(group) => Some(group),
            Binding::NotReady(_) => None,
        }
    }
}

/// The three draws making up the ring: frame, metal detail, gems.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderableGroup {
    entries: [DrawEntry; 3],
}

impl RenderableGroup {
    pub fn entries(&self) -> &[DrawEntry; 3] {
        &self.entries
    }

    pub fn frame(&self) -> &DrawEntry {
        &self.entries[0]
    }

    pub fn metal(&self) -> &DrawEntry {
        &self.entries[1]
    }

    pub fn gems(&self) -> &DrawEntry {
        &self.entries[2]
    }

    pub fn iter(&self) -> impl Iterator<Item = &DrawEntry> {
        self.entries.iter()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawEntry {
    pub node: &'static str,
    pub geometry: Arc<Geometry>,
    pub material: MaterialBinding,
    pub instancing: Option<Instancing>,
    pub cast_shadow: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instancing {
    pub transforms: Arc<InstanceTransforms>,
    /// Number of copies the draw asks for. The GPU draws at most as many as
    /// there are transforms.
    pub count: u32,
}

impl Instancing {
    pub fn drawn(&self) -> u32 {
        self.count.min(self.transforms.len() as u32)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MaterialBinding {
    Standard(StandardMaterial),
    /// A material taken from the asset as is.
    Asset(Arc<MaterialDescriptor>),
    Refraction(RefractionMaterial),
}

impl MaterialBinding {
    /// The user-facing color of the material, `None` for asset materials.
    pub fn color(&self) -> Option<Color> {
        match self {
            MaterialBinding::Standard(m) => Some(m.color),
            MaterialBinding::Refraction(m) => Some(m.color),
            MaterialBinding::Asset(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StandardMaterial {
    pub color: Color,
    pub roughness: f32,
    pub metalness: f32,
    pub env_map_intensity: f32,
}

impl StandardMaterial {
    pub fn polished_metal(color: Color) -> Self {
        Self {
            color,
            roughness: 0.15,
            metalness: 1.0,
            env_map_intensity: 1.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RefractionMaterial {
    pub color: Color,
    pub env_map: EnvironmentHandle,
    pub aberration_strength: f32,
    pub double_sided: bool,
    pub tone_mapped: bool,
    pub ior: f32,
}

impl RefractionMaterial {
    pub fn gem(color: Color, env_map: EnvironmentHandle) -> Self {
        Self {
            color,
            env_map,
            aberration_strength: 0.02,
            double_sided: true,
            tone_mapped: false,
            // diamond
            ior: 2.4,
        }
    }
}

/// Validate `asset` and bind the current colors onto its meshes.
pub fn bind(asset: &LoadedAsset, controls: &Controls, env: &EnvironmentHandle) -> Binding {
    match validate(asset) {
        Ok(parts) => Binding::Ready(assemble(parts, controls, env)),
        Err(reason) => {
            log::debug!("ring not ready: {reason}");
            Binding::NotReady(reason)
        }
    }
}

struct Parts {
    frame: Arc<Geometry>,
    metal: Arc<Geometry>,
    gems: Arc<Geometry>,
    gem_transforms: Arc<InstanceTransforms>,
    metal_material: Arc<MaterialDescriptor>,
}

fn validate(asset: &LoadedAsset) -> Result<Parts, NotReady> {
    let nodes = asset.nodes.as_ref().ok_or(NotReady::MissingNodeTable)?;
    let materials = asset
        .materials
        .as_ref()
        .ok_or(NotReady::MissingMaterialTable)?;
    asset.scene.as_ref().ok_or(NotReady::MissingSceneRoot)?;

    let [frame, metal, gems] = REQUIRED_NODES;
    let lookup = |name: &'static str| nodes.get(name).ok_or(NotReady::MissingNode(name));
    let (frame_node, metal_node, gems_node) = (lookup(frame)?, lookup(metal)?, lookup(gems)?);

    let geometry = |node: &AssetNode, name: &'static str| {
        node.geometry
            .clone()
            .ok_or(NotReady::MissingGeometry(name))
    };
    let frame_geometry = geometry(frame_node, frame)?;
    let metal_geometry = geometry(metal_node, metal)?;
    let gems_geometry = geometry(gems_node, gems)?;

    let gem_transforms = gems_node
        .instance_transforms
        .clone()
        .ok_or(NotReady::MissingInstanceTransforms(gems))?;

    let metal_material = materials
        .get(METAL_MATERIAL)
        .cloned()
        .ok_or(NotReady::MissingMaterial(METAL_MATERIAL))?;

    Ok(Parts {
        frame: frame_geometry,
        metal: metal_geometry,
        gems: gems_geometry,
        gem_transforms,
        metal_material,
    })
}

fn assemble(parts: Parts, controls: &Controls, env: &EnvironmentHandle) -> RenderableGroup {
    RenderableGroup {
        entries: [
            DrawEntry {
                node: FRAME_NODE,
                geometry: parts.frame,
                material: MaterialBinding::Standard(StandardMaterial::polished_metal(
                    controls.frame,
                )),
                instancing: None,
                cast_shadow: true,
            },
            DrawEntry {
                node: METAL_NODE,
                geometry: parts.metal,
                material: MaterialBinding::Asset(parts.metal_material),
                instancing: None,
                cast_shadow: true,
            },
            DrawEntry {
                node: GEMS_NODE,
                geometry: parts.gems,
                material: MaterialBinding::Refraction(RefractionMaterial::gem(
                    controls.diamonds,
                    env.clone(),
                )),
                instancing: Some(Instancing {
                    transforms: parts.gem_transforms,
                    count: GEM_INSTANCE_COUNT,
                }),
                cast_shadow: true,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::data_structures::{
        asset::{AssetNode, SceneRoot},
        environment::Environment,
        instance::Instance,
    };

    fn geometry() -> Arc<Geometry> {
        Arc::new(Geometry {
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            tex_coords: vec![[0.0; 2]; 3],
            indices: vec![0, 1, 2],
        })
    }

    fn node(name: &str, instanced: bool) -> (String, AssetNode) {
        let transforms = instanced.then(|| {
            Arc::new(InstanceTransforms {
                instances: vec![Instance::new(); 65],
            })
        });
        (
            name.to_string(),
            AssetNode {
                name: name.to_string(),
                geometry: Some(geometry()),
                instance_transforms: transforms,
            },
        )
    }

    fn complete() -> LoadedAsset {
        let metal = MaterialDescriptor {
            name: METAL_MATERIAL.to_string(),
            base_color: [0.9, 0.9, 0.9, 1.0],
            ..Default::default()
        };
        LoadedAsset {
            nodes: Some(HashMap::from([
                node(FRAME_NODE, false),
                node(METAL_NODE, false),
                node(GEMS_NODE, true),
            ])),
            materials: Some(HashMap::from([(METAL_MATERIAL.to_string(), Arc::new(metal))])),
            scene: Some(SceneRoot::default()),
        }
    }

    fn env() -> EnvironmentHandle {
        EnvironmentHandle::new(Environment::uniform("test", [1.0; 3]))
    }

    #[test]
    fn checks_tables_in_order() {
        let controls = Controls::default();
        let env = env();
        let mut asset = complete();
        asset.scene = None;
        assert_eq!(bind(&asset, &controls, &env), Binding::NotReady(NotReady::MissingSceneRoot));
        asset.materials = None;
        assert_eq!(
            bind(&asset, &controls, &env),
            Binding::NotReady(NotReady::MissingMaterialTable)
        );
        asset.nodes = None;
        assert_eq!(bind(&asset, &controls, &env), Binding::NotReady(NotReady::MissingNodeTable));
    }

    #[test]
    fn every_required_node_is_checked() {
        for name in REQUIRED_NODES {
            let mut asset = complete();
            asset.nodes.as_mut().unwrap().remove(name);
            assert_eq!(
                bind(&asset, &Controls::default(), &env()),
                Binding::NotReady(NotReady::MissingNode(name))
            );

            let mut asset = complete();
            asset.nodes.as_mut().unwrap().get_mut(name).unwrap().geometry = None;
            assert_eq!(
                bind(&asset, &Controls::default(), &env()),
                Binding::NotReady(NotReady::MissingGeometry(name))
            );
        }
    }

    #[test]
    fn missing_node_wins_over_missing_geometry() {
        let mut asset = complete();
        let nodes = asset.nodes.as_mut().unwrap();
        nodes.get_mut(FRAME_NODE).unwrap().geometry = None;
        nodes.remove(GEMS_NODE);
        assert_eq!(
            bind(&asset, &Controls::default(), &env()),
            Binding::NotReady(NotReady::MissingNode(GEMS_NODE))
        );
    }

    #[test]
    fn gems_need_instance_transforms() {
        let mut asset = complete();
        asset.nodes.as_mut().unwrap().get_mut(GEMS_NODE).unwrap().instance_transforms = None;
        assert_eq!(
            bind(&asset, &Controls::default(), &env()),
            Binding::NotReady(NotReady::MissingInstanceTransforms(GEMS_NODE))
        );
    }

    #[test]
    fn metal_material_is_required() {
        let mut asset = complete();
        asset.materials.as_mut().unwrap().clear();
        assert_eq!(
            bind(&asset, &Controls::default(), &env()),
            Binding::NotReady(NotReady::MissingMaterial(METAL_MATERIAL))
        );
    }

    #[test]
    fn binds_fixed_material_parameters() {
        let env = env();
        let group = bind(&complete(), &Controls::default(), &env).ready().unwrap();
        assert_eq!(group.entries().len(), 3);

        let MaterialBinding::Standard(frame) = &group.frame().material else {
            panic!("frame should use the standard material");
        };
        assert_eq!(frame.roughness, 0.15);
        assert_eq!(frame.metalness, 1.0);
        assert_eq!(frame.env_map_intensity, 1.5);

        let MaterialBinding::Refraction(gems) = &group.gems().material else {
            panic!("gems should refract");
        };
        assert_eq!(gems.aberration_strength, 0.02);
        assert!(gems.double_sided);
        assert!(!gems.tone_mapped);
        assert_eq!(gems.env_map, env);

        let instancing = group.gems().instancing.as_ref().unwrap();
        assert_eq!(instancing.count, GEM_INSTANCE_COUNT);
        assert_eq!(instancing.drawn(), 65);
        assert!(group.iter().all(|e| e.cast_shadow));
    }

    #[test]
    fn drawn_instances_never_exceed_transforms() {
        let instancing = Instancing {
            transforms: Arc::new(InstanceTransforms {
                instances: vec![Instance::new(); 10],
            }),
            count: GEM_INSTANCE_COUNT,
        };
        assert_eq!(instancing.drawn(), 10);
    }

    #[test]
    fn metal_is_untouched_by_controls() {
        let asset = complete();
        let mut controls = Controls::default();
        controls.frame = Color::rgb(1, 2, 3);
        let group = bind(&asset, &controls, &env()).ready().unwrap();
        let MaterialBinding::Asset(metal) = &group.metal().material else {
            panic!("metal should use the asset material");
        };
        assert!(Arc::ptr_eq(metal, asset.material(METAL_MATERIAL).unwrap()));
        assert_eq!(group.metal().material.color(), None);
    }

    #[test]
    fn binding_is_idempotent() {
        let asset = complete();
        let env = env();
        let controls = Controls::default();
        assert_eq!(bind(&asset, &controls, &env), bind(&asset, &controls, &env));
    }
}
