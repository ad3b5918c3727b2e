//! The engine façade: one GPU context, one program set, one registry.
//!
//! Every operation is synchronous - it submits GPU work and blocks until
//! device completion before returning. The engine holds no reference to
//! the host scene; callers pass a [`Scene`] into each operation.

use crate::compositing;
use crate::error::ReliefError;
use crate::gpu::context::GpuContext;
use crate::gpu::programs::ProgramSet;
use crate::gpu::texture::upload_height_texture;
use crate::heightmap::HeightMap;
use crate::messages::{Message, MessageLog};
use crate::projection::{self, ProjectionParams};
use crate::recovery::{self, RecoveryOutcome};
use crate::registry::{MapId, MapRegistry};
use crate::scene::{ColorSpace, Scene, TargetRef};

/// Heightmap projection and compositing engine.
///
/// Owns the GPU device, the compiled program set, and the map registry.
/// Concurrent invocation from multiple threads is undefined; callers must
/// serialize access.
pub struct HeightmapEngine {
    pub(crate) context: GpuContext,
    pub(crate) programs: ProgramSet,
    pub(crate) registry: MapRegistry,
    pub(crate) messages: MessageLog,
}

impl HeightmapEngine {
    /// Create an engine on a freshly requested GPU device.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError`] when no adapter is available, the device
    /// request fails, or shader compilation fails.
    pub fn new() -> Result<Self, ReliefError> {
        Self::with_context(GpuContext::new_blocking()?)
    }

    /// Create an engine on an externally constructed GPU context.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::ShaderCompose`] when shader compilation
    /// fails.
    pub fn with_context(context: GpuContext) -> Result<Self, ReliefError> {
        let programs = ProgramSet::new(&context)?;
        Ok(Self {
            context,
            programs,
            registry: MapRegistry::new(),
            messages: MessageLog::new(),
        })
    }

    /// The GPU context (for interop with host rendering).
    #[must_use]
    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// The map registry.
    #[must_use]
    pub fn maps(&self) -> &MapRegistry {
        &self.registry
    }

    /// Hand all pending user-facing messages to the caller.
    pub fn drain_messages(&mut self) -> Vec<Message> {
        self.messages.drain()
    }

    // ------------------------------------------------------- Generation

    /// Project a scene object's evaluated geometry into a heightmap.
    ///
    /// Planet-tiled targets project equirectangularly regardless of
    /// `params.equirect`. The resolved size and recalculated scales are
    /// written back into the object's settings.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError`] for unknown objects or GPU failures.
    pub fn generate_from_object(
        &self,
        scene: &mut Scene,
        name: &str,
        params: &ProjectionParams,
    ) -> Result<HeightMap, ReliefError> {
        let positions = scene.evaluated_positions(name)?;
        let object = scene.object_mut(name)?;
        let params = ProjectionParams {
            equirect: params.equirect || object.settings.tiling.is_planet(),
            ..*params
        };
        projection::project(
            &self.context,
            &self.programs,
            name,
            &positions,
            &object.mesh.indices,
            object.scale,
            &mut object.settings,
            &params,
        )
    }

    /// Build a heightmap from an image's red channel, linearizing sRGB
    /// data in place.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError`] for unknown images or inconsistent pixel
    /// data.
    pub fn generate_from_image(
        &self,
        scene: &Scene,
        name: &str,
    ) -> Result<HeightMap, ReliefError> {
        let image = scene.image(name)?;
        let channel = image.red_channel()?;
        let texture = upload_height_texture(
            &self.context,
            name,
            image.size,
            &channel,
        );
        if image.colorspace == ColorSpace::Srgb {
            compositing::linearize_in_place(
                &self.context,
                &self.programs,
                &texture,
            );
        }
        Ok(HeightMap::new(texture, name, false))
    }

    /// Create or replace the `base` map of a target; also creates the
    /// `source` map when missing. An invalid base invalidates the source
    /// too (full reload).
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError`] for unknown targets or GPU failures.
    pub fn prepare(
        &mut self,
        scene: &mut Scene,
        target: TargetRef<'_>,
    ) -> Result<(), ReliefError> {
        let (_, slots) = scene.target_state_mut(target)?;
        // No base or invalid reference: reload completely.
        let reload = !self.registry.has_map(slots.base);
        let old_base = slots.base.take();
        self.registry.try_release_map(old_base);

        let map = match target {
            TargetRef::Image(name) => {
                let size = scene.image(name)?.size;
                let image = scene.image_mut(name)?;
                image.settings.img_size = Some(size);
                self.generate_from_image(scene, name)?
            }
            TargetRef::Object(name) => {
                // Planet targets simulate in logarithmic domain.
                let internal =
                    scene.object(name)?.settings.tiling.is_planet();
                self.generate_from_object(
                    scene,
                    name,
                    &ProjectionParams {
                        internal,
                        ..Default::default()
                    },
                )?
            }
        };

        let base_id = self.registry.create_map(map);
        let (_, slots) = scene.target_state_mut(target)?;
        slots.base = Some(base_id);

        if reload {
            // Source belonged to the stale base.
            self.registry.try_release_map(slots.source.take());
        }
        if !self.registry.has_map(slots.source) {
            if let Some(base) = self.registry.get_map(base_id) {
                let clone = base.clone_map(&self.context, base.name());
                let source_id = self.registry.create_map(clone);
                let (_, slots) = scene.target_state_mut(target)?;
                slots.source = Some(source_id);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------ Compositing

    /// `scale * (A + factor * B)` into a new map. See
    /// [`compositing::add`].
    #[must_use]
    pub fn add(
        &self,
        a: &HeightMap,
        b: &HeightMap,
        factor: f32,
        scale: f32,
        exp: bool,
    ) -> HeightMap {
        compositing::add(
            &self.context,
            &self.programs,
            a,
            b,
            factor,
            scale,
            exp,
        )
    }

    /// `scale * (A - factor * B)` into a new map.
    #[must_use]
    pub fn subtract(
        &self,
        a: &HeightMap,
        b: &HeightMap,
        factor: f32,
        scale: f32,
    ) -> HeightMap {
        compositing::subtract(
            &self.context,
            &self.programs,
            a,
            b,
            factor,
            scale,
        )
    }

    /// Bilinear clamped resample to a new resolution.
    #[must_use]
    pub fn resize_map(
        &self,
        map: &HeightMap,
        new_size: [u32; 2],
    ) -> HeightMap {
        compositing::resize(&self.context, &self.programs, map, new_size)
    }

    /// Subresolution delta recompositing; consumes the first two maps.
    /// See [`compositing::add_subres`].
    #[must_use]
    pub fn add_subres(
        &self,
        height: HeightMap,
        height_prior: HeightMap,
        height_prior_fullres: &HeightMap,
    ) -> HeightMap {
        compositing::add_subres(
            &self.context,
            &self.programs,
            height,
            height_prior,
            height_prior_fullres,
        )
    }

    // ------------------------------------------------------- Extraction

    /// Write the displacement of a target (result minus base, scaled by
    /// `org_scale / height_scale`) into an engine-owned scene image and
    /// return the image name.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::TargetNotFound`] when the target or its
    /// result/base maps are missing, or a GPU error on readback.
    pub fn extract_displacement(
        &mut self,
        scene: &mut Scene,
        target: TargetRef<'_>,
        image_name: &str,
    ) -> Result<String, ReliefError> {
        let (settings, slots) = scene.target_state(target)?;
        let scale = if settings.height_scale == 0.0 {
            1.0
        } else {
            settings.org_scale / settings.height_scale
        };

        let (Some(result_id), Some(base_id)) = (slots.result, slots.base)
        else {
            return Err(ReliefError::TargetNotFound(format!(
                "'{}' has no result/base heightmaps",
                target.name()
            )));
        };
        let (Some(result), Some(base)) = (
            self.registry.get_map(result_id),
            self.registry.get_map(base_id),
        ) else {
            return Err(ReliefError::TargetNotFound(format!(
                "'{}' references released heightmaps",
                target.name()
            )));
        };

        let diff = compositing::subtract(
            &self.context,
            &self.programs,
            result,
            base,
            1.0,
            scale,
        );
        let pixels = match diff.read(&self.context) {
            Ok(pixels) => pixels,
            Err(e) => {
                diff.destroy();
                return Err(e);
            }
        };
        let size = diff.size();
        diff.destroy();

        scene.write_image(image_name, size, &pixels)?;
        Ok(image_name.to_owned())
    }

    /// Promote the `result` map to `source`; with `as_base`, clone it
    /// into `base` as well. Promoting a result that already is the source
    /// just clears the result slot.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::TargetNotFound`] for unknown targets.
    pub fn promote_result(
        &mut self,
        scene: &mut Scene,
        target: TargetRef<'_>,
        as_base: bool,
    ) -> Result<(), ReliefError> {
        let (_, slots) = scene.target_state_mut(target)?;
        if slots.result.is_some() && slots.result == slots.source {
            slots.result = None;
            return Ok(());
        }

        self.registry.try_release_map(slots.source.take());
        slots.source = slots.result.take();

        if as_base {
            self.registry.try_release_map(slots.base.take());
            if let Some(source_id) = slots.source {
                if let Some(source) = self.registry.get_map(source_id) {
                    let clone =
                        source.clone_map(&self.context, source.name());
                    let base_id = self.registry.create_map(clone);
                    let (_, slots) = scene.target_state_mut(target)?;
                    slots.base = Some(base_id);
                }
            }
        }
        Ok(())
    }

    // --------------------------------------------------------- Recovery

    /// Reconstruct a target's registry state from a persisted
    /// displacement artifact. See [`crate::recovery`].
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError`] for unknown objects or GPU failures;
    /// unreadable artifacts are reported through the message log and the
    /// [`RecoveryOutcome`] instead.
    pub fn recover(
        &mut self,
        scene: &mut Scene,
        object_name: &str,
    ) -> Result<RecoveryOutcome, ReliefError> {
        recovery::recover(self, scene, object_name)
    }

    // --------------------------------------------------------- Registry

    /// Register a heightmap, taking ownership.
    pub fn create_map(&mut self, map: HeightMap) -> MapId {
        self.registry.create_map(map)
    }

    /// Whether an id refers to a live registry entry.
    #[must_use]
    pub fn has_map(&self, id: Option<MapId>) -> bool {
        self.registry.has_map(id)
    }

    /// Borrow a registered heightmap.
    #[must_use]
    pub fn get_map(&self, id: MapId) -> Option<&HeightMap> {
        self.registry.get_map(id)
    }

    /// Release a registry entry; idempotent on empty and stale ids.
    pub fn try_release_map(&mut self, id: Option<MapId>) {
        self.registry.try_release_map(id);
    }

    /// Release every cached heightmap (teardown). Per-target `img_size`
    /// locks are the caller's to reset afterwards.
    pub fn free_all(&mut self) {
        self.registry.free_all();
    }
}
