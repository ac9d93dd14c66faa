mod common;

use common::test_utils::{complete_asset, controls, environment};
use ring_configurator::{
    binder::{self, Binding, GEMS_NODE, METAL_MATERIAL, MaterialBinding, NotReady},
    config::ViewerConfig,
    controls::{ControlKey, ControlPanel, Controls},
    data_structures::{asset::LoadedAsset, color::Color},
    shell::{ShellState, ViewerShell},
};

#[test]
fn asset_still_loading_is_not_ready() {
    let binding = binder::bind(&LoadedAsset::pending(), &Controls::default(), &environment());
    assert_eq!(binding, Binding::NotReady(NotReady::MissingNodeTable));
}

#[test]
fn missing_gem_node_is_not_ready() {
    let mut asset = complete_asset();
    asset.nodes.as_mut().unwrap().remove(GEMS_NODE);
    let binding = binder::bind(&asset, &Controls::default(), &environment());
    assert_eq!(binding, Binding::NotReady(NotReady::MissingNode(GEMS_NODE)));
}

#[test]
fn colors_reach_frame_and_gems() {
    let controls = controls("#112233", "#aabbcc");
    let group = binder::bind(&complete_asset(), &controls, &environment())
        .ready()
        .expect("complete asset binds");

    assert_eq!(group.entries().len(), 3);
    assert_eq!(group.frame().material.color(), Some(Color::rgb(0x11, 0x22, 0x33)));
    assert_eq!(group.gems().material.color(), Some(Color::rgb(0xaa, 0xbb, 0xcc)));
    match &group.metal().material {
        MaterialBinding::Asset(material) => assert_eq!(material.name, METAL_MATERIAL),
        other => panic!("metal should keep its own material, got {other:?}"),
    }
}

#[test]
fn first_render_uses_panel_defaults() {
    let panel = ControlPanel::default();
    assert_eq!(panel.get(ControlKey::Shadow).to_hex(), "#000000");
    assert_eq!(panel.get(ControlKey::Frame).to_hex(), "#fff0f0");
    assert_eq!(panel.get(ControlKey::Diamonds).to_hex(), "#ffffff");

    let mut shell = ViewerShell::new(ViewerConfig::default());
    shell.set_asset(complete_asset());
    shell.set_refraction(environment());
    assert!(shell.update(panel.controls()));

    let composition = shell.composition();
    assert_eq!(composition.shadows.color.to_hex(), "#000000");
    let ring = composition.ring.expect("mounted");
    assert_eq!(ring.group.frame().material.color(), Some(Color::rgb(0xff, 0xf0, 0xf0)));
    assert_eq!(ring.group.gems().material.color(), Some(Color::WHITE));
}

#[test]
fn binding_twice_gives_equal_groups() {
    let asset = complete_asset();
    let env = environment();
    let controls = Controls::default();
    assert_eq!(
        binder::bind(&asset, &controls, &env),
        binder::bind(&asset, &controls, &env)
    );
}

#[test]
fn shell_keeps_the_ring_while_colors_change() {
    let mut shell = ViewerShell::new(ViewerConfig::default());
    let mut panel = ControlPanel::default();
    assert!(!shell.update(panel.controls()));
    assert_eq!(shell.state(), ShellState::Loading);

    shell.set_asset(complete_asset());
    // no refraction environment yet
    assert!(!shell.update(panel.controls()));
    assert_eq!(shell.state(), ShellState::Loading);

    shell.set_refraction(environment());
    assert!(shell.update(panel.controls()));
    let generation = shell.composition().generation;

    // same inputs, nothing to rebuild
    assert!(!shell.update(panel.controls()));
    assert_eq!(shell.composition().generation, generation);

    panel.set(ControlKey::Frame, "#112233").unwrap();
    assert!(shell.update(panel.controls()));
    assert_eq!(shell.composition().generation, generation + 1);

    // a broken asset later does not unmount the ring
    shell.set_asset(LoadedAsset::pending());
    assert!(!shell.update(panel.controls()));
    assert_eq!(shell.state(), ShellState::Mounted);
    assert!(shell.ring().is_some());
}
