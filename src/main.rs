use std::path::Path;

use ring_configurator::{ViewerConfig, run};

/// Usage: `ring-configurator [config.toml]`
fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ViewerConfig::load(Path::new(&path))?,
        None => ViewerConfig::default(),
    };
    run(config)
}
