/**
 * This module contains all logic for loading the model and the environment
 * images from files or over HTTP.
 */
pub mod asset;
pub mod environment;

use std::collections::HashMap;

use anyhow::Context as _;

use crate::data_structures::{asset::LoadedAsset, environment::Environment};

pub use asset::parse_asset;
pub use environment::decode_environment;

fn is_remote(file_name: &str) -> bool {
    file_name.starts_with("http://") || file_name.starts_with("https://")
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    if is_remote(file_name) {
        return Ok(reqwest::Url::parse(file_name)?);
    }
    let window = web_sys::window().context("no window")?;
    let origin = window
        .location()
        .origin()
        .map_err(|e| anyhow::anyhow!("no page origin: {e:?}"))?;
    let base = reqwest::Url::parse(&format!("{origin}/assets/"))?;
    Ok(base.join(file_name)?)
}

async fn fetch(url: &str) -> anyhow::Result<Vec<u8>> {
    let response = reqwest::get(url).await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

/// Read a file below `./assets` (natively) or fetch it from the page's
/// `assets/` folder (web). Absolute `http(s)` URLs are fetched on both.
pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        fetch(url.as_str()).await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = if is_remote(file_name) {
        fetch(file_name).await?
    } else {
        let path = std::path::Path::new("./").join("assets").join(file_name);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?
    };

    log::debug!("loaded {file_name} ({} bytes)", data.len());
    Ok(data)
}

/// Resolve a URI from inside a glTF file against the file's own location.
fn sibling(file_name: &str, uri: &str) -> String {
    if is_remote(uri) {
        return uri.to_string();
    }
    match file_name.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{uri}"),
        None => uri.to_string(),
    }
}

/// Load and parse the ring model, fetching external buffers and images.
pub async fn load_asset(file_name: &str) -> anyhow::Result<LoadedAsset> {
    let bytes = load_binary(file_name).await?;
    let (document, blob) = asset::open(&bytes).with_context(|| format!("opening {file_name}"))?;

    let mut buffers = Vec::new();
    for buffer in document.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = blob
                    .as_deref()
                    .with_context(|| format!("{file_name} references a missing GLB blob"))?;
                buffers.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) => {
                buffers.push(load_binary(&sibling(file_name, uri)).await?);
            }
        }
    }

    let mut images = HashMap::new();
    for image in document.images() {
        if let gltf::image::Source::Uri { uri, .. } = image.source() {
            match load_binary(&sibling(file_name, uri)).await {
                Ok(bytes) => {
                    images.insert(image.index(), bytes);
                }
                Err(e) => log::warn!("image {uri} of {file_name} not loaded: {e:#}"),
            }
        }
    }

    asset::parse_document(&document, &asset::ExternalData { buffers, images })
        .with_context(|| format!("parsing {file_name}"))
}

/// Load and decode an equirectangular environment image.
pub async fn load_environment(file_name: &str) -> anyhow::Result<Environment> {
    let bytes = load_binary(file_name).await?;
    decode_environment(file_name, &bytes)
}
