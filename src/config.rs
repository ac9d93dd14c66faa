//! Viewer configuration with TOML override support.
//!
//! Every constant of the scene (asset locations, light, shadows, orbit
//! limits, the effect chain, camera and canvas settings, ring placement)
//! lives here. All sections use `#[serde(default)]`, so a file that only
//! overrides `[light]` leaves everything else at the built-in values.

use std::{f32::consts::PI, path::Path};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ViewerConfig {
    pub assets: AssetConfig,
    pub light: SpotLightConfig,
    pub shadows: ShadowConfig,
    pub orbit: OrbitConfig,
    pub effects: EffectChain,
    pub camera: CameraConfig,
    pub canvas: CanvasConfig,
    pub ring: RingPlacement,
}

impl ViewerConfig {
    /// Load a config file. Missing fields use defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetConfig {
    /// The ring model, relative to the asset root.
    pub model: String,
    /// Visible backdrop, also the ambient light source.
    pub background: String,
    /// Reflection source for the gems only; never shown.
    pub refraction: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            model: "models/3-stone-transformed.glb".into(),
            background: "scenes/scene6.hdr".into(),
            refraction:
                "https://dl.polyhaven.org/file/ph-assets/HDRIs/hdr/1k/peppermint_powerplant_2_1k.hdr"
                    .into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpotLightConfig {
    pub position: [f32; 3],
    /// Half angle of the cone in radians.
    pub angle: f32,
    /// Fraction of the cone that fades out, 0 = hard edge.
    pub penumbra: f32,
    /// Distance attenuation exponent, 0 = none.
    pub decay: f32,
    pub intensity: f32,
}

impl Default for SpotLightConfig {
    fn default() -> Self {
        Self {
            position: [10.0, 10.0, 10.0],
            angle: 0.15,
            penumbra: 1.0,
            decay: 0.0,
            intensity: PI,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShadowConfig {
    /// Keep averaging frames over time instead of rendering them all at once.
    pub temporal: bool,
    pub frames: u32,
    pub opacity: f32,
    pub light: RandomizedLightConfig,
    /// Edge length of the square catcher plane in world units.
    pub plane_size: f32,
    pub map_size: u32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            temporal: true,
            frames: 100,
            opacity: 1.05,
            light: RandomizedLightConfig::default(),
            plane_size: 10.0,
            map_size: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RandomizedLightConfig {
    pub position: [f32; 3],
    /// The light is jittered inside this radius every frame.
    pub radius: f32,
    /// Jittered lights rendered per frame.
    pub amount: u32,
}

impl Default for RandomizedLightConfig {
    fn default() -> Self {
        Self {
            position: [10.0, 5.0, -5.0],
            radius: 5.0,
            amount: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrbitConfig {
    pub enable_pan: bool,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub damping_factor: f32,
    /// Radians per pixel of drag.
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            enable_pan: false,
            min_polar_angle: 0.0,
            max_polar_angle: PI / 2.25,
            damping_factor: 0.05,
            rotate_speed: 0.005,
            zoom_speed: 0.95,
            min_distance: 1.0,
            max_distance: 100.0,
        }
    }
}

/// Post-processing passes, applied in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EffectChain(pub Vec<Effect>);

impl Default for EffectChain {
    fn default() -> Self {
        Self(vec![
            Effect::AmbientOcclusion {
                radius: 0.15,
                intensity: 4.0,
                distance_falloff: 2.0,
            },
            Effect::Bloom {
                luminance_threshold: 3.5,
                intensity: 0.85,
                levels: 9,
                mipmap_blur: true,
            },
            Effect::ToneMapping {
                mode: ToneMappingMode::AcesFilmic,
            },
        ])
    }
}

impl EffectChain {
    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    AmbientOcclusion {
        radius: f32,
        intensity: f32,
        distance_falloff: f32,
    },
    Bloom {
        luminance_threshold: f32,
        intensity: f32,
        levels: u32,
        mipmap_blur: bool,
    },
    ToneMapping {
        mode: ToneMappingMode,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToneMappingMode {
    Linear,
    Reinhard,
    #[default]
    AcesFilmic,
}

impl ToneMappingMode {
    /// Operator id understood by the tone mapping shader.
    pub fn shader_id(self) -> u32 {
        match self {
            ToneMappingMode::Linear => 0,
            ToneMappingMode::Reinhard => 1,
            ToneMappingMode::AcesFilmic => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [-5.0, 5.0, 14.0],
            target: [0.0, 0.0, 0.0],
            fov: 20.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CanvasConfig {
    pub title: String,
    /// Device pixel ratio is clamped to `[min_pixel_ratio, max_pixel_ratio]`.
    pub min_pixel_ratio: f32,
    pub max_pixel_ratio: f32,
    pub antialias: bool,
    pub shadows: bool,
    /// Id of the canvas element on the web.
    pub canvas_id: String,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            title: "Ring configurator".into(),
            min_pixel_ratio: 1.0,
            max_pixel_ratio: 1.5,
            antialias: false,
            shadows: true,
            canvas_id: "canvas".into(),
        }
    }
}

impl CanvasConfig {
    pub fn pixel_ratio(&self, device_ratio: f64) -> f32 {
        (device_ratio as f32).clamp(self.min_pixel_ratio, self.max_pixel_ratio)
    }

    /// Size of the internal render targets for a window of `physical`
    /// pixels at `device_ratio`.
    pub fn render_size(&self, physical: [u32; 2], device_ratio: f64) -> [u32; 2] {
        let device_ratio = if device_ratio > 0.0 { device_ratio as f32 } else { 1.0 };
        let factor = self.pixel_ratio(device_ratio as f64) / device_ratio;
        physical.map(|px| ((px as f32 * factor).round() as u32).max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RingPlacement {
    /// Group holding both the ring and the shadow catcher.
    pub group_position: [f32; 3],
    /// Wrapper that centers the ring and sits its bottom on the origin.
    pub center_position: [f32; 3],
    /// Euler angles (XYZ order, radians) of the centering wrapper.
    pub center_rotation: [f32; 3],
    pub scale: f32,
}

impl Default for RingPlacement {
    fn default() -> Self {
        Self {
            group_position: [0.0, -0.25, 0.0],
            center_position: [0.0, -0.12, 0.0],
            center_rotation: [-0.1, 0.0, 0.085],
            scale: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let config = ViewerConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = ViewerConfig::from_toml(&text).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let text = r#"
[light]
intensity = 2.0

[[effects]]
kind = "tone_mapping"
mode = "reinhard"
"#;
        let config = ViewerConfig::from_toml(text).unwrap();
        assert_eq!(config.light.intensity, 2.0);
        assert_eq!(config.light.angle, 0.15);
        assert_eq!(config.shadows.frames, 100);
        assert_eq!(
            config.effects.0,
            vec![Effect::ToneMapping {
                mode: ToneMappingMode::Reinhard
            }]
        );
        assert_eq!(config.camera.fov, 20.0);
    }

    #[test]
    fn default_chain_order() {
        let chain = EffectChain::default();
        assert!(matches!(chain.0[0], Effect::AmbientOcclusion { .. }));
        assert!(matches!(chain.0[1], Effect::Bloom { levels: 9, mipmap_blur: true, .. }));
        assert!(matches!(chain.0[2], Effect::ToneMapping { .. }));
    }

    #[test]
    fn pixel_ratio_is_clamped() {
        let canvas = CanvasConfig::default();
        assert_eq!(canvas.pixel_ratio(0.5), 1.0);
        assert_eq!(canvas.pixel_ratio(1.25), 1.25);
        assert_eq!(canvas.pixel_ratio(3.0), 1.5);
        // a 3x display renders at half its physical resolution
        assert_eq!(canvas.render_size([1200, 600], 3.0), [600, 300]);
        assert_eq!(canvas.render_size([800, 600], 1.0), [800, 600]);
    }

    #[test]
    fn unknown_effect_is_rejected() {
        let text = r#"
[[effects]]
kind = "vignette"
"#;
        assert!(ViewerConfig::from_toml(text).is_err());
    }
}
