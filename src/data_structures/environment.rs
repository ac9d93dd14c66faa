//! Equirectangular environment images.
//!
//! Both the visible backdrop and the gem reflections come from an HDR
//! panorama. The decoded pixels live behind an [`EnvironmentHandle`]; the
//! renderer uploads each distinct handle once and recognizes it again by
//! identity, so cloning a handle never copies pixels.

use std::{f32::consts::PI, fmt, sync::Arc};

/// Decoded panorama in linear RGBA.
#[derive(Clone, PartialEq)]
pub struct Environment {
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("source", &self.source)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// A flat panorama of one color. Used as a stand-in by tests and as the
    /// neutral fallback before anything has been downloaded.
    pub fn uniform(source: impl Into<String>, color: [f32; 3]) -> Self {
        Self {
            source: source.into(),
            width: 2,
            height: 1,
            pixels: vec![[color[0], color[1], color[2], 1.0]; 2],
        }
    }

    pub fn from_rgba32f(source: impl Into<String>, image: image::Rgba32FImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = image.pixels().map(|p| p.0).collect();
        Self {
            source: source.into(),
            width,
            height,
            pixels,
        }
    }

    /// Texture coordinate of a world direction, matching the lookup the
    /// shaders do (`u` wraps around +Y, `v` runs from the zenith down).
    pub fn direction_to_uv(dir: [f32; 3]) -> [f32; 2] {
        let len = (dir[0] * dir[0] + dir[1] * dir[1] + dir[2] * dir[2]).sqrt();
        if len == 0.0 {
            return [0.5, 0.5];
        }
        let [x, y, z] = dir.map(|c| c / len);
        [z.atan2(x) / (2.0 * PI) + 0.5, y.clamp(-1.0, 1.0).acos() / PI]
    }

    /// Nearest-texel sample of a direction.
    pub fn sample(&self, dir: [f32; 3]) -> [f32; 4] {
        let [u, v] = Self::direction_to_uv(dir);
        let x = ((u * self.width as f32) as u32).min(self.width.saturating_sub(1));
        let y = ((v * self.height as f32) as u32).min(self.height.saturating_sub(1));
        self.pixels
            .get((y * self.width + x) as usize)
            .copied()
            .unwrap_or([0.0, 0.0, 0.0, 1.0])
    }

    /// Mean radiance, used as the flat ambient term when no mip chain is
    /// available.
    pub fn average(&self) -> [f32; 3] {
        if self.pixels.is_empty() {
            return [0.0; 3];
        }
        let sum = self.pixels.iter().fold([0.0f64; 3], |acc, p| {
            [acc[0] + p[0] as f64, acc[1] + p[1] as f64, acc[2] + p[2] as f64]
        });
        let n = self.pixels.len() as f64;
        sum.map(|c| (c / n) as f32)
    }
}

/// Shared, identity-compared reference to an [`Environment`].
#[derive(Clone, Debug)]
pub struct EnvironmentHandle(Arc<Environment>);

impl EnvironmentHandle {
    pub fn new(environment: Environment) -> Self {
        Self(Arc::new(environment))
    }

    pub fn source(&self) -> &str {
        &self.0.source
    }

    /// Stable key for GPU-side caches.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl std::ops::Deref for EnvironmentHandle {
    type Target = Environment;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for EnvironmentHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for EnvironmentHandle {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_compare_by_identity() {
        let a = EnvironmentHandle::new(Environment::uniform("a", [1.0; 3]));
        let b = EnvironmentHandle::new(Environment::uniform("a", [1.0; 3]));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn uv_of_the_axes() {
        let up = Environment::direction_to_uv([0.0, 1.0, 0.0]);
        assert!(up[1].abs() < 1e-6);
        let down = Environment::direction_to_uv([0.0, -1.0, 0.0]);
        assert!((down[1] - 1.0).abs() < 1e-6);
        let px = Environment::direction_to_uv([1.0, 0.0, 0.0]);
        assert!((px[0] - 0.5).abs() < 1e-6);
        assert!((px[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn average_of_uniform_panorama() {
        let env = Environment::uniform("grey", [0.25, 0.5, 1.0]);
        assert_eq!(env.average(), [0.25, 0.5, 1.0]);
        assert_eq!(env.sample([0.3, 0.2, -0.9]), [0.25, 0.5, 1.0, 1.0]);
    }
}
