use anyhow::Context as _;
use image::ImageFormat;

use crate::data_structures::environment::Environment;

/// Decode an equirectangular panorama. Radiance `.hdr` is the expected
/// format; anything else the `image` crate recognizes works too, but loses
/// the high dynamic range.
pub fn decode_environment(source: &str, bytes: &[u8]) -> anyhow::Result<Environment> {
    let format = image::guess_format(bytes)
        .or_else(|_| ImageFormat::from_path(source))
        .with_context(|| format!("unknown image format for {source}"))?;
    let image = image::load_from_memory_with_format(bytes, format)
        .with_context(|| format!("decoding environment {source}"))?;
    if format != ImageFormat::Hdr {
        log::warn!("{source} is {format:?}, not HDR");
    }
    let environment = Environment::from_rgba32f(source, image.to_rgba32f());
    log::info!(
        "decoded environment {source} ({}x{})",
        environment.width,
        environment.height
    );
    Ok(environment)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2x1 Radiance file, flat RGBE scanline: (1, 0.5, 0.25) and (2, 2, 2)
    fn tiny_hdr() -> Vec<u8> {
        let mut bytes = b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 1 +X 2\n".to_vec();
        bytes.extend_from_slice(&[128, 64, 32, 129, 128, 128, 128, 130]);
        bytes
    }

    #[test]
    fn decodes_radiance_files() {
        let env = decode_environment("tiny.hdr", &tiny_hdr()).unwrap();
        assert_eq!((env.width, env.height), (2, 1));
        let first = env.pixels[0];
        assert!((first[0] - 1.0).abs() < 1e-3);
        assert!((first[1] - 0.5).abs() < 1e-3);
        assert!((first[2] - 0.25).abs() < 1e-3);
        assert!((env.pixels[1][0] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn rejects_unknown_bytes() {
        assert!(decode_environment("noise.bin", &[1, 2, 3, 4]).is_err());
    }
}
