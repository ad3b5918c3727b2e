//! GPU integration tests.
//!
//! Every test requests a real adapter through the engine and skips
//! (passing vacuously) when the machine has none, so the suite stays
//! green on headless CI runners without a GPU.

use glam::Vec3;
use relief::engine::HeightmapEngine;
use relief::gpu::texture::upload_height_texture;
use relief::heightmap::{log_decode, HeightMap, BACKGROUND};
use relief::projection::ProjectionParams;
use relief::recovery::RecoveryOutcome;
use relief::scene::{
    ColorSpace, Image, Mesh, Modifier, ModifierKind, Scene, SceneObject,
    TargetRef,
};
use relief::settings::{ScaleMode, TerrainSettings, Tiling};

fn engine() -> Option<HeightmapEngine> {
    let _ = env_logger::builder().is_test(true).try_init();
    match HeightmapEngine::new() {
        Ok(engine) => Some(engine),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

/// Axis-aligned box centered on the origin.
fn box_mesh(extent: Vec3) -> Mesh {
    let h = extent * 0.5;
    let positions = vec![
        [-h.x, -h.y, -h.z],
        [h.x, -h.y, -h.z],
        [h.x, h.y, -h.z],
        [-h.x, h.y, -h.z],
        [-h.x, -h.y, h.z],
        [h.x, -h.y, h.z],
        [h.x, h.y, h.z],
        [-h.x, h.y, h.z],
    ];
    let indices = vec![
        0, 1, 2, 0, 2, 3, // bottom
        4, 6, 5, 4, 7, 6, // top
        0, 4, 5, 0, 5, 1, // -y
        2, 6, 7, 2, 7, 3, // +y
        0, 3, 7, 0, 7, 4, // -x
        1, 5, 6, 1, 6, 2, // +x
    ];
    Mesh { positions, indices }
}

/// Single triangle whose bounding box it does not fill.
fn triangle_mesh() -> Mesh {
    Mesh {
        positions: vec![
            [-1.0, -1.0, 0.0],
            [1.0, -1.0, 0.5],
            [-1.0, 1.0, 1.0],
        ],
        indices: vec![0, 1, 2],
    }
}

/// Latitude/longitude sphere of the given radius.
fn uv_sphere(radius: f32, stacks: u32, slices: u32) -> Mesh {
    use std::f32::consts::PI;

    let mut positions = Vec::new();
    for stack in 0..=stacks {
        let lat = PI * (stack as f32 / stacks as f32) - PI * 0.5;
        for slice in 0..=slices {
            let lon = 2.0 * PI * (slice as f32) / (slices as f32);
            positions.push([
                radius * lat.cos() * lon.cos(),
                radius * lat.cos() * lon.sin(),
                radius * lat.sin(),
            ]);
        }
    }

    let mut indices = Vec::new();
    let row = slices + 1;
    for stack in 0..stacks {
        for slice in 0..slices {
            let a = stack * row + slice;
            let b = a + row;
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }
    Mesh { positions, indices }
}

fn checker(size: [u32; 2], lo: f32, hi: f32) -> Vec<f32> {
    (0..size[0] * size[1])
        .map(|i| {
            let (x, y) = (i % size[0], i / size[0]);
            if (x + y) % 2 == 0 {
                lo
            } else {
                hi
            }
        })
        .collect()
}

fn upload(
    engine: &HeightmapEngine,
    name: &str,
    size: [u32; 2],
    pixels: &[f32],
) -> HeightMap {
    let texture =
        upload_height_texture(engine.context(), name, size, pixels);
    HeightMap::new(texture, name, false)
}

fn rgba_image(name: &str, size: [u32; 2], value: f32) -> Image {
    Image {
        name: name.to_owned(),
        size,
        pixels: [value, value, value, 1.0].repeat((size[0] * size[1]) as usize),
        is_float: true,
        colorspace: ColorSpace::Linear,
        engine_owned: false,
        settings: TerrainSettings::default(),
        slots: relief::registry::MapSlots::default(),
    }
}

// ----------------------------------------------------------- Projection

#[test]
fn flat_projection_matches_requested_size() {
    let Some(engine) = engine() else { return };
    let mut scene = Scene::new();
    scene.add_object(SceneObject::new(
        "box",
        box_mesh(Vec3::new(2.0, 2.0, 1.0)),
        Vec3::ONE,
    ));

    let params = ProjectionParams {
        size: Some([64, 64]),
        scale_mode: ScaleMode::Normalized,
        ..Default::default()
    };
    let map = engine
        .generate_from_object(&mut scene, "box", &params)
        .unwrap();

    assert_eq!(map.size(), [64, 64]);
    // Side effect: resolved size written back into the settings.
    let settings = &scene.object("box").unwrap().settings;
    assert_eq!(settings.img_size, Some([64, 64]));
    assert!((settings.height_scale - 1.0).abs() < 1e-6);
    map.destroy();
}

#[test]
fn flat_box_normalized_tops_out_at_one() {
    let Some(engine) = engine() else { return };
    let mut scene = Scene::new();
    scene.add_object(SceneObject::new(
        "box",
        box_mesh(Vec3::new(2.0, 2.0, 1.0)),
        Vec3::ONE,
    ));

    let params = ProjectionParams {
        size: Some([64, 64]),
        scale_mode: ScaleMode::Normalized,
        ..Default::default()
    };
    let map = engine
        .generate_from_object(&mut scene, "box", &params)
        .unwrap();
    let pixels = map.read(engine.context()).unwrap();
    map.destroy();

    // The box fills its footprint; the depth test keeps the top face.
    for &h in &pixels {
        assert!((h - 1.0).abs() < 1e-3, "expected 1.0, got {h}");
    }
}

#[test]
fn pixels_outside_the_footprint_carry_the_sentinel() {
    let Some(engine) = engine() else { return };
    let mut scene = Scene::new();
    scene.add_object(SceneObject::new(
        "wedge",
        triangle_mesh(),
        Vec3::ONE,
    ));

    let params = ProjectionParams {
        size: Some([64, 64]),
        scale_mode: ScaleMode::Normalized,
        ..Default::default()
    };
    let map = engine
        .generate_from_object(&mut scene, "wedge", &params)
        .unwrap();
    let pixels = map.read(engine.context()).unwrap();
    map.destroy();

    // Top-right corner is outside the triangle.
    assert_eq!(pixels[63], BACKGROUND);
    // A pixel well inside the triangle is real terrain.
    let inside = pixels[60 * 64 + 4];
    assert_ne!(inside, BACKGROUND);
    assert!(inside >= 0.0 && inside <= 1.0 + 1e-3);
}

#[test]
fn degenerate_bounds_fall_back_to_the_minimal_size() {
    let Some(engine) = engine() else { return };
    let mut scene = Scene::new();
    scene.add_object(SceneObject::new(
        "point",
        Mesh {
            positions: vec![[0.0, 0.0, 0.0]; 3],
            indices: vec![0, 1, 2],
        },
        Vec3::ONE,
    ));

    let map = engine
        .generate_from_object(
            &mut scene,
            "point",
            &ProjectionParams::default(),
        )
        .unwrap();
    assert_eq!(map.size(), [32, 32]);
    map.destroy();
}

#[test]
fn derived_size_preserves_the_xy_aspect_ratio() {
    let Some(engine) = engine() else { return };
    let mut scene = Scene::new();
    scene.add_object(SceneObject::new(
        "slab",
        box_mesh(Vec3::new(4.0, 2.0, 1.0)),
        Vec3::ONE,
    ));

    let map = engine
        .generate_from_object(
            &mut scene,
            "slab",
            &ProjectionParams::default(),
        )
        .unwrap();
    assert_eq!(map.size(), [1024, 512]);
    assert_eq!(
        scene.object("slab").unwrap().settings.img_size,
        Some([1024, 512])
    );
    map.destroy();
}

#[test]
fn world_scale_includes_the_object_z_scale() {
    let Some(engine) = engine() else { return };
    let mut scene = Scene::new();
    scene.add_object(SceneObject::new(
        "box",
        box_mesh(Vec3::new(2.0, 2.0, 1.0)),
        Vec3::new(1.0, 1.0, 3.0),
    ));

    let params = ProjectionParams {
        size: Some([16, 16]),
        scale_mode: ScaleMode::World,
        ..Default::default()
    };
    let map = engine
        .generate_from_object(&mut scene, "box", &params)
        .unwrap();
    let pixels = map.read(engine.context()).unwrap();
    map.destroy();

    // org_scale is the local Z extent (1.0); world mode multiplies by
    // the object's Z scale, so the top face reads 3.0.
    let center = 8 * 16 + 8;
    assert!((pixels[center] - 3.0).abs() < 1e-3);
}

#[test]
fn established_img_size_is_reused() {
    let Some(engine) = engine() else { return };
    let mut scene = Scene::new();
    let mut object =
        SceneObject::new("box", box_mesh(Vec3::ONE), Vec3::ONE);
    object.settings.img_size = Some([48, 48]);
    scene.add_object(object);

    let map = engine
        .generate_from_object(
            &mut scene,
            "box",
            &ProjectionParams::default(),
        )
        .unwrap();
    assert_eq!(map.size(), [48, 48]);
    map.destroy();
}

// ---------------------------------------------------------- Compositing

#[test]
fn add_then_subtract_round_trips() {
    let Some(engine) = engine() else { return };
    let size = [32, 32];
    let a = upload(&engine, "a", size, &checker(size, 0.1, 0.9));
    let b = upload(&engine, "b", size, &checker(size, 0.4, 0.2));

    let sum = engine.add(&a, &b, 0.7, 1.0, false);
    let back = engine.subtract(&sum, &b, 0.7, 1.0);

    let expect = a.read(engine.context()).unwrap();
    let got = back.read(engine.context()).unwrap();
    for (e, g) in expect.iter().zip(&got) {
        assert!((e - g).abs() < 1e-5, "expected {e}, got {g}");
    }

    a.destroy();
    b.destroy();
    sum.destroy();
    back.destroy();
}

#[test]
fn scale_inverts_through_the_round_trip() {
    let Some(engine) = engine() else { return };
    let size = [16, 16];
    let a = upload(&engine, "a", size, &checker(size, 0.25, 0.75));
    let b = upload(&engine, "b", size, &vec![0.0; 256]);

    let doubled = engine.add(&a, &b, 0.0, 2.0, false);
    let back = engine.subtract(&doubled, &b, 0.0, 0.5);

    let expect = a.read(engine.context()).unwrap();
    let got = back.read(engine.context()).unwrap();
    for (e, g) in expect.iter().zip(&got) {
        assert!((e - g).abs() < 1e-5);
    }

    a.destroy();
    b.destroy();
    doubled.destroy();
    back.destroy();
}

#[test]
fn exponential_add_mixes_log_base_with_linear_delta() {
    let Some(engine) = engine() else { return };
    let size = [8, 8];
    let base_linear = 1.5_f32;
    let delta = 0.25_f32;

    let log_pixels = vec![base_linear.ln(); 64];
    let base = HeightMap::new(
        upload_height_texture(engine.context(), "log base", size, &log_pixels),
        "log base",
        true,
    );
    let lin = upload(&engine, "delta", size, &vec![delta; 64]);

    let combined = engine.add(&base, &lin, 1.0, 1.0, true);
    assert!(combined.logarithmic());

    let got = combined.read(engine.context()).unwrap();
    for &h in &got {
        // exp path: ln(exp(base) + delta * exp(delta_raw)) - the delta
        // operand is decoded too, per the kernel contract.
        let expect = (base_linear + 1.0 * delta.exp()).ln();
        assert!((h - expect).abs() < 1e-4, "expected {expect}, got {h}");
    }

    base.destroy();
    lin.destroy();
    combined.destroy();
}

#[test]
fn resize_to_the_same_size_is_identity() {
    let Some(engine) = engine() else { return };
    let size = [32, 32];
    let map = upload(&engine, "m", size, &checker(size, 0.0, 1.0));

    let same = engine.resize_map(&map, size);
    assert_eq!(same.size(), size);

    let expect = map.read(engine.context()).unwrap();
    let got = same.read(engine.context()).unwrap();
    for (e, g) in expect.iter().zip(&got) {
        assert!((e - g).abs() < 1e-3, "expected {e}, got {g}");
    }

    map.destroy();
    same.destroy();
}

#[test]
fn add_subres_matches_the_delta_law() {
    let Some(engine) = engine() else { return };
    let sim = [16, 16];
    let full = [32, 32];

    // Smooth gradients keep the bilinear reference simple.
    let h_data: Vec<f32> = (0..256)
        .map(|i| (i % 16) as f32 / 16.0 + (i / 16) as f32 / 32.0)
        .collect();
    let prior_data: Vec<f32> =
        (0..256).map(|i| (i % 16) as f32 / 16.0).collect();
    let full_data: Vec<f32> =
        (0..1024).map(|i| (i / 32) as f32 / 64.0).collect();

    let height = upload(&engine, "h", sim, &h_data);
    let prior = upload(&engine, "hp", sim, &prior_data);
    let fullres = upload(&engine, "hpf", full, &full_data);

    // Reference: fullres + resize(h - h_prior), with the resize done by
    // the same GPU path the law is stated against.
    let diff = engine.subtract(&height, &prior, 1.0, 1.0);
    let diff_full = engine.resize_map(&diff, full);
    let expect_map = engine.add(&diff_full, &fullres, 1.0, 1.0, false);
    let expect = expect_map.read(engine.context()).unwrap();
    diff.destroy();
    diff_full.destroy();
    expect_map.destroy();

    let result = engine.add_subres(height, prior, &fullres);
    let got = result.read(engine.context()).unwrap();
    assert_eq!(result.size(), full);

    for (e, g) in expect.iter().zip(&got) {
        assert!((e - g).abs() < 1e-4, "expected {e}, got {g}");
    }

    fullres.destroy();
    result.destroy();
}

// -------------------------------------------------------------- Planet

#[test]
fn equirect_log_projection_recovers_the_sphere_radius() {
    let Some(engine) = engine() else { return };
    let mut scene = Scene::new();
    scene.add_object(SceneObject::new(
        "planet",
        uv_sphere(1.0, 96, 192),
        Vec3::ONE,
    ));

    let params = ProjectionParams {
        size: Some([256, 128]),
        equirect: true,
        internal: true,
        ..Default::default()
    };
    let map = engine
        .generate_from_object(&mut scene, "planet", &params)
        .unwrap();
    assert!(map.logarithmic());
    assert_eq!(map.size(), [256, 128]);

    let pixels = map.read(engine.context()).unwrap();
    map.destroy();

    // The normalized sphere has unit radius everywhere. Skip the rows
    // right at the poles, where fidelity is inherently poor.
    let mut checked = 0usize;
    for row in 4..124 {
        for col in 0..256 {
            let h = pixels[row * 256 + col];
            assert_ne!(h, BACKGROUND, "hole at {row},{col}");
            let r = log_decode(h);
            assert!(
                (r - 1.0).abs() < 0.02,
                "radius {r} out of tolerance at {row},{col}"
            );
            checked += 1;
        }
    }
    assert!(checked > 0);
}

// ------------------------------------------------------------- Registry

#[test]
fn released_maps_disappear_from_the_registry() {
    let Some(mut engine) = engine() else { return };
    let map = upload(&engine, "Base", [8, 8], &vec![0.5; 64]);
    let id = engine.create_map(map);

    assert!(engine.has_map(Some(id)));
    assert_eq!(engine.get_map(id).unwrap().size(), [8, 8]);

    engine.try_release_map(Some(id));
    assert!(!engine.has_map(Some(id)));
    assert!(engine.get_map(id).is_none());

    // Idempotent on stale and empty ids.
    engine.try_release_map(Some(id));
    engine.try_release_map(None);
}

#[test]
fn free_all_empties_the_registry() {
    let Some(mut engine) = engine() else { return };
    for i in 0..3 {
        let map =
            upload(&engine, &format!("m{i}"), [4, 4], &vec![0.0; 16]);
        let _ = engine.create_map(map);
    }
    assert_eq!(engine.maps().len(), 3);
    engine.free_all();
    assert!(engine.maps().is_empty());
}

// --------------------------------------------------------------- Engine

#[test]
fn prepare_bootstraps_base_and_source() {
    let Some(mut engine) = engine() else { return };
    let mut scene = Scene::new();
    let mut object = SceneObject::new(
        "box",
        box_mesh(Vec3::new(2.0, 2.0, 1.0)),
        Vec3::ONE,
    );
    object.settings.img_size = Some([32, 32]);
    scene.add_object(object);

    engine
        .prepare(&mut scene, TargetRef::Object("box"))
        .unwrap();

    let slots = scene.object("box").unwrap().slots;
    assert!(engine.has_map(slots.base));
    assert!(engine.has_map(slots.source));
    assert_ne!(slots.base, slots.source);
    assert_eq!(engine.maps().len(), 2);

    // Preparing again with a valid base keeps the source.
    let old_source = slots.source;
    engine
        .prepare(&mut scene, TargetRef::Object("box"))
        .unwrap();
    let slots = scene.object("box").unwrap().slots;
    assert_eq!(slots.source, old_source);
    assert_eq!(engine.maps().len(), 2);
}

#[test]
fn prepare_from_image_locks_the_image_size() {
    let Some(mut engine) = engine() else { return };
    let mut scene = Scene::new();
    scene.add_image(rgba_image("height src", [16, 8], 0.5));

    engine
        .prepare(&mut scene, TargetRef::Image("height src"))
        .unwrap();

    let image = scene.image("height src").unwrap();
    assert_eq!(image.settings.img_size, Some([16, 8]));
    assert!(engine.has_map(image.slots.base));
    let base = engine.get_map(image.slots.base.unwrap()).unwrap();
    assert_eq!(base.size(), [16, 8]);
}

#[test]
fn srgb_images_are_linearized_on_ingest() {
    let Some(engine) = engine() else { return };
    let mut scene = Scene::new();
    let mut image = rgba_image("srgb src", [4, 4], 0.5);
    image.colorspace = ColorSpace::Srgb;
    scene.add_image(image);

    let map = engine.generate_from_image(&scene, "srgb src").unwrap();
    let pixels = map.read(engine.context()).unwrap();
    map.destroy();

    let expect = ((0.5_f32 + 0.055) / 1.055).powf(2.4);
    for &p in &pixels {
        assert!((p - expect).abs() < 1e-4, "expected {expect}, got {p}");
    }
}

#[test]
fn extract_and_promote_walk_the_slot_lifecycle() {
    let Some(mut engine) = engine() else { return };
    let mut scene = Scene::new();
    let mut object = SceneObject::new(
        "box",
        box_mesh(Vec3::new(2.0, 2.0, 1.0)),
        Vec3::ONE,
    );
    object.settings.img_size = Some([16, 16]);
    scene.add_object(object);
    engine
        .prepare(&mut scene, TargetRef::Object("box"))
        .unwrap();

    // Simulate a solver: result = source + 0.2.
    let slots = scene.object("box").unwrap().slots;
    let delta = upload(&engine, "delta", [16, 16], &vec![0.2; 256]);
    let source = engine.get_map(slots.source.unwrap()).unwrap();
    let result = engine.add(source, &delta, 1.0, 1.0, false);
    delta.destroy();
    let result_id = engine.create_map(result);
    scene.object_mut("box").unwrap().slots.result = Some(result_id);

    // Extraction: (result - base) * org_scale / height_scale.
    let name = engine
        .extract_displacement(
            &mut scene,
            TargetRef::Object("box"),
            "RLF_box_disp",
        )
        .unwrap();
    let image = scene.image(&name).unwrap();
    assert!(image.is_engine_owned());
    assert!((image.pixels[0] - 0.2).abs() < 1e-3);

    // Promotion moves result into source and clears the result slot.
    let old_source = scene.object("box").unwrap().slots.source;
    engine
        .promote_result(&mut scene, TargetRef::Object("box"), false)
        .unwrap();
    let slots = scene.object("box").unwrap().slots;
    assert_eq!(slots.source, Some(result_id));
    assert_eq!(slots.result, None);
    assert!(!engine.has_map(old_source));
}

// ------------------------------------------------------------- Recovery

fn displaced_box_scene(artifact_pixels: Option<Vec<f32>>) -> Scene {
    let mut scene = Scene::new();
    let pixels = artifact_pixels
        .unwrap_or_else(|| [0.5, 0.5, 0.5, 1.0].repeat(64));
    scene.add_image(Image {
        name: "RLF_box_disp".to_owned(),
        size: [8, 8],
        pixels,
        is_float: true,
        colorspace: ColorSpace::Linear,
        engine_owned: true,
        settings: TerrainSettings::default(),
        slots: relief::registry::MapSlots::default(),
    });

    let mut object = SceneObject::new(
        "box",
        box_mesh(Vec3::new(2.0, 2.0, 1.0)),
        Vec3::ONE,
    );
    object.settings.img_size = Some([16, 16]);
    object.modifiers.push(Modifier {
        name: "RLF_box".to_owned(),
        kind: ModifierKind::Displace {
            image: Some("RLF_box_disp".to_owned()),
            strength: 1.0,
        },
        show_viewport: true,
        engine_owned: true,
    });
    scene.add_object(object);
    scene
}

#[test]
fn recovery_rebuilds_all_three_slots() {
    let Some(mut engine) = engine() else { return };
    let mut scene = displaced_box_scene(None);

    let outcome = engine.recover(&mut scene, "box").unwrap();
    assert_eq!(outcome, RecoveryOutcome::Recovered);

    let object = scene.object("box").unwrap();
    assert!(engine.has_map(object.slots.base));
    assert!(engine.has_map(object.slots.source));
    assert!(engine.has_map(object.slots.result));
    assert_eq!(engine.maps().len(), 3);
    // The isolation step put the modifier back.
    assert!(object.modifiers[0].show_viewport);

    // source = base + displacement / org_width (org_width = 2).
    let base = engine
        .get_map(object.slots.base.unwrap())
        .unwrap()
        .read(engine.context())
        .unwrap();
    let source = engine
        .get_map(object.slots.source.unwrap())
        .unwrap()
        .read(engine.context())
        .unwrap();
    let center = 8 * 16 + 8;
    assert!((base[center] - 1.0).abs() < 1e-3);
    assert!((source[center] - base[center] - 0.25).abs() < 1e-3);

    let messages = engine.drain_messages();
    assert!(!messages.is_empty());

    // Recovery on a valid registry is a guarded no-op.
    let again = engine.recover(&mut scene, "box").unwrap();
    assert_eq!(again, RecoveryOutcome::AlreadyValid);
    assert_eq!(engine.maps().len(), 3);
}

#[test]
fn recovery_without_artifacts_is_an_informational_no_op() {
    let Some(mut engine) = engine() else { return };
    let mut scene = Scene::new();
    scene.add_object(SceneObject::new(
        "box",
        box_mesh(Vec3::ONE),
        Vec3::ONE,
    ));

    let outcome = engine.recover(&mut scene, "box").unwrap();
    assert_eq!(outcome, RecoveryOutcome::NothingFound);
    assert!(engine.maps().is_empty());

    let messages = engine.drain_messages();
    assert_eq!(messages.len(), 1);
    assert!(engine.drain_messages().is_empty());
}

#[test]
fn unreadable_artifacts_fail_without_registry_mutation() {
    let Some(mut engine) = engine() else { return };
    // Truncated pixel data: present but unreadable.
    let mut scene = displaced_box_scene(Some(vec![0.5; 7]));

    let outcome = engine.recover(&mut scene, "box").unwrap();
    assert_eq!(outcome, RecoveryOutcome::Failed);
    assert!(engine.maps().is_empty());

    let object = scene.object("box").unwrap();
    assert!(object.slots.base.is_none());
    // Visibility was restored on the failure path too.
    assert!(object.modifiers[0].show_viewport);

    let messages = engine.drain_messages();
    assert!(messages
        .iter()
        .any(|m| m.severity == relief::messages::Severity::Error));
}

#[test]
fn planet_settings_force_the_equirect_pipeline() {
    let Some(engine) = engine() else { return };
    let mut scene = Scene::new();
    let mut object =
        SceneObject::new("planet", uv_sphere(1.0, 24, 48), Vec3::ONE);
    object.settings.tiling = Tiling::Planet;
    scene.add_object(object);

    let params = ProjectionParams {
        size: Some([64, 32]),
        ..Default::default()
    };
    let map = engine
        .generate_from_object(&mut scene, "planet", &params)
        .unwrap();
    // Equirect output at the requested 2:1 size, linear domain since
    // `internal` was not requested.
    assert_eq!(map.size(), [64, 32]);
    assert!(!map.logarithmic());
    map.destroy();
}
