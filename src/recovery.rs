//! Recovery of lost registry state from persisted displacement artifacts.
//!
//! A reopened session has empty registry slots, but the displacement the
//! engine applied earlier usually still exists in the host scene. Recovery
//! finds it, re-projects the pre-displacement base, and reconstructs the
//! source and result maps from base plus the persisted displacement.

use crate::compositing;
use crate::engine::HeightmapEngine;
use crate::error::ReliefError;
use crate::gpu::texture::upload_height_texture;
use crate::heightmap::HeightMap;
use crate::projection::ProjectionParams;
use crate::scene::{
    ColorSpace, ModifierKind, Scene, SceneObject, TargetRef,
    PREVIEW_DISPLACEMENT_NAME, RESERVED_PREFIX,
};

/// Guard threshold for the displacement rescale division.
const WIDTH_EPS: f32 = 1.0e-6;

/// Terminal outcome of a recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Base, source and result maps were reconstructed.
    Recovered,
    /// The registry was already valid; nothing was touched.
    AlreadyValid,
    /// No displacement artifact exists; nothing was touched.
    NothingFound,
    /// An artifact exists but could not be read; no registry mutation was
    /// committed and the freshly generated base was released.
    Failed,
}

/// Run the recovery state machine for one object.
///
/// # Errors
///
/// Returns [`ReliefError`] for unknown objects and GPU infrastructure
/// failures. An unreadable artifact is not an `Err`: it reports
/// [`RecoveryOutcome::Failed`] plus an error message in the engine log.
pub fn recover(
    engine: &mut HeightmapEngine,
    scene: &mut Scene,
    object_name: &str,
) -> Result<RecoveryOutcome, ReliefError> {
    // Re-running recovery on a valid registry is a guarded no-op; it
    // never duplicates entries.
    let (_, slots) = scene.target_state(TargetRef::Object(object_name))?;
    if engine.registry.has_map(slots.base)
        && engine.registry.has_map(slots.source)
    {
        engine
            .messages
            .info("Heightmaps are already valid; nothing to recover.");
        return Ok(RecoveryOutcome::AlreadyValid);
    }

    // Detect: preview artifact, else reserved-prefix artifact, else a
    // displacement image referenced from a known node-group slot.
    let Some(artifact) = detect_artifact(scene, scene.object(object_name)?)
    else {
        engine
            .messages
            .info("No saved displacement found; nothing to recover.");
        return Ok(RecoveryOutcome::NothingFound);
    };
    log::debug!(
        "Recovering '{object_name}' from displacement '{artifact}'."
    );

    // Isolate: hide the engine's own effects so the re-projected
    // geometry reflects the pre-displacement base, then restore the
    // original visibility on every exit path.
    let saved = isolate(scene.object_mut(object_name)?);
    let outcome = reconstruct(engine, scene, object_name, &artifact);
    restore(scene.object_mut(object_name)?, &saved);
    outcome
}

/// Artifact discovery order: the engine's preview image first, then an
/// engine-owned displace modifier image or reserved-prefix image, then a
/// node-group displacement slot.
fn detect_artifact(scene: &Scene, object: &SceneObject) -> Option<String> {
    if scene.images.contains_key(PREVIEW_DISPLACEMENT_NAME) {
        return Some(PREVIEW_DISPLACEMENT_NAME.to_owned());
    }

    for modifier in &object.modifiers {
        if !modifier.is_engine_owned() {
            continue;
        }
        if let ModifierKind::Displace {
            image: Some(image), ..
        } = &modifier.kind
        {
            if scene.images.contains_key(image) {
                return Some(image.clone());
            }
        }
    }

    let reserved = format!("{RESERVED_PREFIX}{}", object.name);
    if scene.images.contains_key(&reserved) {
        return Some(reserved);
    }

    for modifier in &object.modifiers {
        if let ModifierKind::Nodes { group: Some(group) } = &modifier.kind {
            if let Some(group) = scene.node_groups.get(group) {
                if let Some(image) = &group.displacement_image {
                    if scene.images.contains_key(image) {
                        return Some(image.clone());
                    }
                }
            }
        }
    }
    None
}

/// Hide engine-owned modifiers, remembering their visibility.
fn isolate(object: &mut SceneObject) -> Vec<(usize, bool)> {
    let mut saved = Vec::new();
    for (index, modifier) in object.modifiers.iter_mut().enumerate() {
        if modifier.is_engine_owned() {
            saved.push((index, modifier.show_viewport));
            modifier.show_viewport = false;
        }
    }
    saved
}

/// Restore the visibility states recorded by [`isolate`].
fn restore(object: &mut SceneObject, saved: &[(usize, bool)]) {
    for &(index, visible) in saved {
        if let Some(modifier) = object.modifiers.get_mut(index) {
            modifier.show_viewport = visible;
        }
    }
}

/// Re-project the base and rebuild source/result from the artifact.
fn reconstruct(
    engine: &mut HeightmapEngine,
    scene: &mut Scene,
    object_name: &str,
    artifact: &str,
) -> Result<RecoveryOutcome, ReliefError> {
    // Planet targets simulate in logarithmic domain; regenerate the base
    // the way prepare would.
    let internal =
        scene.object(object_name)?.settings.tiling.is_planet();
    let base_map = engine.generate_from_object(
        scene,
        object_name,
        &ProjectionParams {
            internal,
            ..Default::default()
        },
    )?;

    let Ok(image) = scene.image(artifact) else {
        base_map.destroy();
        engine.messages.error(format!(
            "Saved displacement '{artifact}' disappeared during recovery."
        ));
        return Ok(RecoveryOutcome::Failed);
    };
    let channel = match image.red_channel() {
        Ok(channel) => channel,
        Err(e) => {
            base_map.destroy();
            engine.messages.error(format!(
                "Saved displacement '{artifact}' is unreadable: {e}"
            ));
            return Ok(RecoveryOutcome::Failed);
        }
    };

    let texture =
        upload_height_texture(&engine.context, artifact, image.size, &channel);
    if image.colorspace == ColorSpace::Srgb {
        compositing::linearize_in_place(
            &engine.context,
            &engine.programs,
            &texture,
        );
    }
    let mut displacement = HeightMap::new(texture, artifact, false);
    if displacement.size() != base_map.size() {
        let resized = compositing::resize(
            &engine.context,
            &engine.programs,
            &displacement,
            base_map.size(),
        );
        displacement.destroy();
        displacement = resized;
    }

    // Displacements are exported scaled down by the original object
    // width; apply the inverse. A logarithmic base takes the
    // exponential-domain path to absorb the linear delta.
    let org_width = scene.object(object_name)?.settings.org_width;
    let factor = if org_width.abs() > WIDTH_EPS {
        1.0 / org_width
    } else {
        1.0
    };
    let source_map = compositing::add(
        &engine.context,
        &engine.programs,
        &base_map,
        &displacement,
        factor,
        1.0,
        base_map.logarithmic(),
    );
    displacement.destroy();
    let result_map = source_map.clone_map(&engine.context, object_name);

    // Commit: release stale slot references, then register all three.
    let (_, slots) = scene.target_state_mut(TargetRef::Object(object_name))?;
    let stale_base = slots.base.take();
    let stale_source = slots.source.take();
    let stale_result = slots.result.take();
    engine.registry.try_release_map(stale_base);
    engine.registry.try_release_map(stale_source);
    engine.registry.try_release_map(stale_result);

    let base_id = engine.registry.create_map(base_map);
    let source_id = engine.registry.create_map(source_map);
    let result_id = engine.registry.create_map(result_map);
    let (_, slots) = scene.target_state_mut(TargetRef::Object(object_name))?;
    slots.base = Some(base_id);
    slots.source = Some(source_id);
    slots.result = Some(result_id);

    engine
        .messages
        .info("Recovered heightmaps from saved displacement.");
    Ok(RecoveryOutcome::Recovered)
}
