//! Scene composition around the ring.
//!
//! [`ViewerShell`] collects whatever the loaders have delivered so far, runs
//! the binder on every update and describes the frame to draw as a
//! [`SceneComposition`]. Apart from the ring itself, everything in the
//! composition is fixed configuration plus the live shadow color.

use std::sync::Arc;

use cgmath::Vector3;

use crate::{
    binder::{self, Binding, DrawEntry, MaterialBinding, RenderableGroup},
    config::{
        CameraConfig, CanvasConfig, EffectChain, OrbitConfig, RingPlacement, ShadowConfig,
        SpotLightConfig, ViewerConfig,
    },
    controls::Controls,
    data_structures::{
        asset::{Bounds, LoadedAsset},
        color::Color,
        environment::EnvironmentHandle,
        instance::Instance,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShellState {
    /// Nothing to draw yet apart from the backdrop.
    Loading,
    /// The ring passed validation once. There is no way back.
    Mounted,
}

/// A bound ring together with its place in the world.
#[derive(Clone, Debug)]
pub struct MountedRing {
    pub group: RenderableGroup,
    pub placement: Instance,
    /// Bounds of the ring in the centering wrapper's space, before centering.
    pub bounds: Bounds,
}

impl MountedRing {
    pub fn world_matrix(&self) -> cgmath::Matrix4<f32> {
        self.placement.to_matrix()
    }
}

#[derive(Clone, Debug)]
pub struct ShadowComposition<'a> {
    pub config: &'a ShadowConfig,
    pub color: Color,
    /// Where the catcher plane sits, the origin of the outer group.
    pub origin: [f32; 3],
}

/// Everything the renderer needs to draw one frame.
#[derive(Clone, Debug)]
pub struct SceneComposition<'a> {
    pub background: Option<&'a EnvironmentHandle>,
    pub light: &'a SpotLightConfig,
    pub shadows: ShadowComposition<'a>,
    pub orbit: &'a OrbitConfig,
    pub effects: &'a EffectChain,
    pub camera: &'a CameraConfig,
    pub canvas: &'a CanvasConfig,
    pub controls: Controls,
    pub ring: Option<&'a MountedRing>,
    /// Bumped whenever the mounted ring is replaced.
    pub generation: u64,
}

#[derive(Debug)]
pub struct ViewerShell {
    config: ViewerConfig,
    state: ShellState,
    asset: LoadedAsset,
    background: Option<EnvironmentHandle>,
    refraction: Option<EnvironmentHandle>,
    controls: Controls,
    ring: Option<MountedRing>,
    generation: u64,
}

impl ViewerShell {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            state: ShellState::Loading,
            asset: LoadedAsset::pending(),
            background: None,
            refraction: None,
            controls: Controls::default(),
            ring: None,
            generation: 0,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    pub fn ring(&self) -> Option<&MountedRing> {
        self.ring.as_ref()
    }

    pub fn set_asset(&mut self, asset: LoadedAsset) {
        self.asset = asset;
    }

    pub fn set_background(&mut self, env: EnvironmentHandle) {
        self.background = Some(env);
    }

    pub fn set_refraction(&mut self, env: EnvironmentHandle) {
        self.refraction = Some(env);
    }

    /// Re-run the binder with the current colors. Returns `true` when the
    /// mounted ring was replaced.
    pub fn update(&mut self, controls: &Controls) -> bool {
        self.controls = *controls;

        // the gems cannot be bound before their reflection source exists
        let Some(env) = self.refraction.as_ref() else {
            log::trace!("waiting for the refraction environment");
            return false;
        };

        let group = match binder::bind(&self.asset, controls, env) {
            Binding::Ready(group) => group,
            // a mounted ring stays on screen
            Binding::NotReady(_) => return false,
        };

        if self
            .ring
            .as_ref()
            .is_some_and(|mounted| same_bindings(&mounted.group, &group))
        {
            return false;
        }

        let Some(bounds) = ring_bounds(&group, self.config.ring.scale) else {
            log::warn!("ring geometry is empty, keeping the previous state");
            return false;
        };
        let placement = place_ring(&self.config.ring, &bounds);
        if self.state == ShellState::Loading {
            log::info!("ring mounted");
        }
        self.ring = Some(MountedRing {
            group,
            placement,
            bounds,
        });
        self.state = ShellState::Mounted;
        self.generation += 1;
        true
    }

    pub fn composition(&self) -> SceneComposition<'_> {
        SceneComposition {
            background: self.background.as_ref(),
            light: &self.config.light,
            shadows: ShadowComposition {
                config: &self.config.shadows,
                color: self.controls.shadow,
                origin: self.config.ring.group_position,
            },
            orbit: &self.config.orbit,
            effects: &self.config.effects,
            camera: &self.config.camera,
            canvas: &self.config.canvas,
            controls: self.controls,
            ring: self.ring.as_ref(),
            generation: self.generation,
        }
    }
}

/// Cheap structural comparison: shared data by identity, parameters by value.
fn same_bindings(a: &RenderableGroup, b: &RenderableGroup) -> bool {
    a.iter().zip(b.iter()).all(|(a, b)| same_entry(a, b))
}

fn same_entry(a: &DrawEntry, b: &DrawEntry) -> bool {
    let same_material = match (&a.material, &b.material) {
        (MaterialBinding::Asset(x), MaterialBinding::Asset(y)) => Arc::ptr_eq(x, y),
        (x, y) => x == y,
    };
    let same_instancing = match (&a.instancing, &b.instancing) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(&x.transforms, &y.transforms) && x.count == y.count,
        _ => false,
    };
    a.node == b.node && Arc::ptr_eq(&a.geometry, &b.geometry) && same_material && same_instancing
}

/// Bounds of the scaled ring, gem copies included.
pub fn ring_bounds(group: &RenderableGroup, scale: f32) -> Option<Bounds> {
    let scale = cgmath::Matrix4::from_scale(scale);
    group
        .iter()
        .flat_map(|entry| -> Vec<Option<Bounds>> {
            match &entry.instancing {
                Some(instancing) => instancing
                    .transforms
                    .instances
                    .iter()
                    .take(instancing.drawn() as usize)
                    .map(|instance| entry.geometry.bounds(&(scale * instance.to_matrix())))
                    .collect(),
                None => vec![entry.geometry.bounds(&scale)],
            }
        })
        .flatten()
        .reduce(Bounds::union)
}

/// World placement of the ring: outer group, centering wrapper, the offset
/// that centers the bounds on x/z with their bottom on the wrapper origin,
/// then the ring's own scale.
pub fn place_ring(placement: &RingPlacement, bounds: &Bounds) -> Instance {
    let outer = Instance::from(Vector3::from(placement.group_position));
    let [rx, ry, rz] = placement.center_rotation;
    let wrapper = Instance {
        position: Vector3::from(placement.center_position),
        rotation: Instance::euler_xyz(rx, ry, rz),
        ..Default::default()
    };
    let [cx, cy, cz] = bounds.center();
    let height = bounds.size()[1];
    let offset = Instance::from(Vector3::new(-cx, -cy + height / 2.0, -cz));
    let ring = Instance::from_scale(placement.scale);
    &(&(&outer * &wrapper) * &offset) * &ring
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use cgmath::Transform;

    use super::*;
    use crate::{
        binder::{FRAME_NODE, GEMS_NODE, METAL_MATERIAL, METAL_NODE},
        data_structures::{
            asset::{AssetNode, Geometry, InstanceTransforms, MaterialDescriptor, SceneRoot},
            environment::Environment,
        },
    };

    fn cube(min: [f32; 3], max: [f32; 3]) -> Arc<Geometry> {
        Arc::new(Geometry {
            positions: vec![min, max],
            normals: vec![[0.0, 1.0, 0.0]; 2],
            tex_coords: vec![[0.0; 2]; 2],
            indices: vec![],
        })
    }

    fn ring_asset() -> LoadedAsset {
        let node = |name: &str, geometry: Arc<Geometry>, instanced: bool| {
            (
                name.to_string(),
                AssetNode {
                    name: name.to_string(),
                    geometry: Some(geometry),
                    instance_transforms: instanced.then(|| {
                        Arc::new(InstanceTransforms {
                            instances: vec![Instance::from(Vector3::new(0.0, 10.0, 0.0))],
                        })
                    }),
                },
            )
        };
        LoadedAsset {
            nodes: Some(HashMap::from([
                node(FRAME_NODE, cube([-10.0, -10.0, -2.0], [10.0, 10.0, 2.0]), false),
                node(METAL_NODE, cube([-1.0, 8.0, -1.0], [1.0, 10.0, 1.0]), false),
                node(GEMS_NODE, cube([-1.0, 0.0, -1.0], [1.0, 2.0, 1.0]), true),
            ])),
            materials: Some(HashMap::from([(
                METAL_MATERIAL.to_string(),
                Arc::new(MaterialDescriptor::default()),
            )])),
            scene: Some(SceneRoot::default()),
        }
    }

    fn env() -> EnvironmentHandle {
        EnvironmentHandle::new(Environment::uniform("env", [1.0; 3]))
    }

    #[test]
    fn mounts_only_when_asset_and_refraction_are_there() {
        let mut shell = ViewerShell::new(ViewerConfig::default());
        let controls = Controls::default();
        assert!(!shell.update(&controls));
        assert_eq!(shell.state(), ShellState::Loading);

        shell.set_asset(ring_asset());
        assert!(!shell.update(&controls));
        assert_eq!(shell.state(), ShellState::Loading);
        assert!(shell.composition().ring.is_none());

        shell.set_refraction(env());
        assert!(shell.update(&controls));
        assert_eq!(shell.state(), ShellState::Mounted);
        assert_eq!(shell.composition().generation, 1);
    }

    #[test]
    fn never_returns_to_loading() {
        let mut shell = ViewerShell::new(ViewerConfig::default());
        shell.set_refraction(env());
        shell.set_asset(ring_asset());
        shell.update(&Controls::default());
        shell.set_asset(LoadedAsset::pending());
        assert!(!shell.update(&Controls::default()));
        assert_eq!(shell.state(), ShellState::Mounted);
        assert!(shell.ring().is_some());
    }

    #[test]
    fn color_changes_replace_the_group() {
        let mut shell = ViewerShell::new(ViewerConfig::default());
        shell.set_refraction(env());
        shell.set_asset(ring_asset());
        let mut controls = Controls::default();
        assert!(shell.update(&controls));
        assert!(!shell.update(&controls));

        controls.diamonds = Color::rgb(0xaa, 0xbb, 0xcc);
        assert!(shell.update(&controls));
        let ring = shell.ring().unwrap();
        assert_eq!(ring.group.gems().material.color(), Some(controls.diamonds));
        assert_eq!(shell.composition().generation, 2);

        // shadow color is not part of the ring
        controls.shadow = Color::WHITE;
        assert!(!shell.update(&controls));
        assert_eq!(shell.composition().shadows.color, Color::WHITE);
    }

    #[test]
    fn composition_carries_configured_values() {
        let shell = ViewerShell::new(ViewerConfig::default());
        let scene = shell.composition();
        assert_eq!(scene.light.position, [10.0, 10.0, 10.0]);
        assert_eq!(scene.light.intensity, std::f32::consts::PI);
        assert_eq!(scene.shadows.config.frames, 100);
        assert_eq!(scene.shadows.config.opacity, 1.05);
        assert_eq!(scene.shadows.config.light.radius, 5.0);
        assert_eq!(scene.shadows.origin, [0.0, -0.25, 0.0]);
        assert!(!scene.orbit.enable_pan);
        assert_eq!(scene.camera.position, [-5.0, 5.0, 14.0]);
        assert_eq!(scene.camera.fov, 20.0);
        assert!(!scene.canvas.antialias);
        assert!(scene.canvas.shadows);
        assert_eq!(scene.effects.len(), 3);
    }

    #[test]
    fn bounds_include_gem_copies() {
        let mut shell = ViewerShell::new(ViewerConfig::default());
        shell.set_refraction(env());
        shell.set_asset(ring_asset());
        shell.update(&Controls::default());
        let bounds = shell.ring().unwrap().bounds;
        // gem copy sits at y = 10..12, scaled by 0.1
        assert!((bounds.max[1] - 1.2).abs() < 1e-5);
        assert!((bounds.min[1] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn centering_puts_the_bottom_on_the_wrapper() {
        let placement = RingPlacement {
            center_rotation: [0.0; 3],
            ..Default::default()
        };
        let bounds = Bounds {
            min: [-1.0, -1.0, -0.2],
            max: [1.0, 1.2, 0.2],
        };
        let world = place_ring(&placement, &bounds).to_matrix();
        // lowest ring point (in unscaled model space) lands at wrapper + group height
        let bottom = world.transform_point(cgmath::Point3::new(0.0, -10.0, 0.0));
        assert!((bottom.y - (-0.25 - 0.12)).abs() < 1e-5);
        let center = world.transform_point(cgmath::Point3::new(0.0, 1.0, 0.0));
        assert!(center.x.abs() < 1e-5);
        assert!(center.z.abs() < 1e-5);
    }
}
