mod common;

use common::test_utils::{RingFixture, environment, ring_glb};
use ring_configurator::{
    binder::{self, Binding, FRAME_NODE, GEMS_NODE, METAL_MATERIAL, METAL_NODE, NotReady},
    controls::Controls,
    resources::parse_asset,
};

#[test]
fn ring_file_binds() {
    let asset = parse_asset(&ring_glb(&RingFixture::default())).expect("valid GLB");

    let scene = asset.scene.as_ref().expect("default scene");
    assert_eq!(scene.children, vec![FRAME_NODE, METAL_NODE, GEMS_NODE]);

    let gems = asset.node(GEMS_NODE).unwrap();
    let transforms = gems.instance_transforms.as_ref().expect("instancing read");
    assert_eq!(transforms.len(), 65);
    assert_eq!(transforms.instances[7].position.x, 7.0);

    let metal = asset.material(METAL_MATERIAL).unwrap();
    assert_eq!(metal.base_color, [0.9, 0.8, 0.7, 1.0]);
    assert_eq!(metal.roughness, 0.2);

    let group = binder::bind(&asset, &Controls::default(), &environment())
        .ready()
        .expect("ring binds");
    let instancing = group.gems().instancing.as_ref().unwrap();
    assert_eq!(instancing.drawn(), 65);
    assert_eq!(group.frame().geometry.indices, vec![0, 1, 2]);
}

#[test]
fn fewer_gems_than_requested_are_drawn_as_is() {
    let fixture = RingFixture {
        gem_count: 12,
        ..Default::default()
    };
    let asset = parse_asset(&ring_glb(&fixture)).unwrap();
    let group = binder::bind(&asset, &Controls::default(), &environment())
        .ready()
        .unwrap();
    let instancing = group.gems().instancing.as_ref().unwrap();
    assert_eq!(instancing.count, 65);
    assert_eq!(instancing.drawn(), 12);
}

#[test]
fn file_without_metal_material_is_not_ready() {
    let fixture = RingFixture {
        with_metal_material: false,
        ..Default::default()
    };
    let asset = parse_asset(&ring_glb(&fixture)).unwrap();
    assert_eq!(
        binder::bind(&asset, &Controls::default(), &environment()),
        Binding::NotReady(NotReady::MissingMaterial(METAL_MATERIAL))
    );
}

#[test]
fn gems_without_instancing_are_not_ready() {
    let fixture = RingFixture {
        with_instancing: false,
        ..Default::default()
    };
    let asset = parse_asset(&ring_glb(&fixture)).unwrap();
    assert_eq!(
        binder::bind(&asset, &Controls::default(), &environment()),
        Binding::NotReady(NotReady::MissingInstanceTransforms(GEMS_NODE))
    );
}

#[test]
fn missing_frame_node_is_not_ready() {
    let fixture = RingFixture {
        skip_node: Some(FRAME_NODE),
        ..Default::default()
    };
    let asset = parse_asset(&ring_glb(&fixture)).unwrap();
    assert_eq!(
        binder::bind(&asset, &Controls::default(), &environment()),
        Binding::NotReady(NotReady::MissingNode(FRAME_NODE))
    );
}

#[test]
fn quantized_gem_rotations_are_normalized() {
    let fixture = RingFixture {
        gem_count: 4,
        quantized_rotations: true,
        ..Default::default()
    };
    let asset = parse_asset(&ring_glb(&fixture)).expect("quantized instancing parses");

    let transforms = asset
        .node(GEMS_NODE)
        .and_then(|node| node.instance_transforms.as_ref())
        .expect("instancing read");
    assert_eq!(transforms.len(), 4);
    let gem = &transforms.instances[3];
    let cos_45 = std::f32::consts::FRAC_1_SQRT_2;
    assert!((gem.rotation.s - cos_45).abs() < 1e-4);
    assert!((gem.rotation.v.y - cos_45).abs() < 1e-4);
    assert_eq!(gem.rotation.v.x, 0.0);
    assert_eq!(gem.scale.x, 2.0);
    assert_eq!(gem.position.x, 3.0);

    assert!(binder::bind(&asset, &Controls::default(), &environment()).ready().is_some());
}
