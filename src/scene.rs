//! Scene-graph collaborator model.
//!
//! The engine does not own a scene graph; the host does. This module is
//! the data contract with it: mesh objects with modifier stacks, RGBA
//! float images, and node groups, each read and written as plain fields.
//! Persistence is whatever the host already stores - there is no bespoke
//! wire format. Engine-owned artifacts carry an explicit tag; a reserved
//! name prefix is still honored as a legacy fallback so state saved by
//! older sessions remains recoverable.

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::error::ReliefError;
use crate::projection::matrix::Aabb;
use crate::registry::MapSlots;
use crate::settings::TerrainSettings;

/// Reserved name prefix marking engine-owned artifacts (legacy protocol).
pub const RESERVED_PREFIX: &str = "RLF_";
/// Name of the preview displacement image the engine maintains.
pub const PREVIEW_DISPLACEMENT_NAME: &str = "RLFP_Preview_Displacement";
/// Name of the preview modifier the engine maintains.
pub const PREVIEW_MODIFIER_NAME: &str = "RLFP_Preview_Modifier";

/// Color space an image's pixel data is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Scene-referred linear data.
    Linear,
    /// Display-referred sRGB data; linearized on ingest.
    Srgb,
}

/// An RGBA float image record.
#[derive(Debug, Clone)]
pub struct Image {
    /// Unique image name.
    pub name: String,
    /// Size in pixels.
    pub size: [u32; 2],
    /// Interleaved RGBA pixel data, `size[0] * size[1] * 4` floats.
    pub pixels: Vec<f32>,
    /// Whether the source was float data (byte images are linearized).
    pub is_float: bool,
    /// Color space of the pixel data.
    pub colorspace: ColorSpace,
    /// Explicit engine-ownership tag.
    pub engine_owned: bool,
    /// Heightmap settings for generating from this image.
    pub settings: TerrainSettings,
    /// Heightmap slot references for this image.
    pub slots: MapSlots,
}

impl Image {
    /// Extract the red channel as a single-channel buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::ImageData`] when the pixel buffer is missing
    /// or inconsistent with the recorded size.
    pub fn red_channel(&self) -> Result<Vec<f32>, ReliefError> {
        let expected = (self.size[0] * self.size[1] * 4) as usize;
        if self.pixels.len() != expected {
            return Err(ReliefError::ImageData(format!(
                "image '{}': {} pixel floats, expected {expected}",
                self.name,
                self.pixels.len()
            )));
        }
        Ok(self.pixels.iter().step_by(4).copied().collect())
    }

    /// Whether this image belongs to the engine (tag, else legacy prefix).
    #[must_use]
    pub fn is_engine_owned(&self) -> bool {
        self.engine_owned || self.name.starts_with(RESERVED_PREFIX)
    }
}

/// What a modifier does to its object.
#[derive(Debug, Clone)]
pub enum ModifierKind {
    /// Planar Z displacement driven by an image.
    Displace {
        /// Name of the driving image, if assigned.
        image: Option<String>,
        /// Displacement strength multiplier.
        strength: f32,
    },
    /// A node-group modifier; displacement hides behind the group.
    Nodes {
        /// Name of the assigned node group, if any.
        group: Option<String>,
    },
}

/// One entry of an object's modifier stack.
#[derive(Debug, Clone)]
pub struct Modifier {
    /// Modifier name.
    pub name: String,
    /// Behavior of the modifier.
    pub kind: ModifierKind,
    /// Viewport visibility; hidden modifiers do not affect evaluation.
    pub show_viewport: bool,
    /// Explicit engine-ownership tag.
    pub engine_owned: bool,
}

impl Modifier {
    /// Whether this modifier belongs to the engine (tag, else legacy
    /// prefix).
    #[must_use]
    pub fn is_engine_owned(&self) -> bool {
        self.engine_owned || self.name.starts_with(RESERVED_PREFIX)
    }
}

/// A node group with a known displacement-image slot.
#[derive(Debug, Clone)]
pub struct NodeGroup {
    /// Group name.
    pub name: String,
    /// Image feeding the group's displacement input, if any.
    pub displacement_image: Option<String>,
}

/// Triangle mesh proxy: evaluated vertex positions plus triangle indices.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Vertex positions.
    pub positions: Vec<[f32; 3]>,
    /// Triangle vertex indices, three per face.
    pub indices: Vec<u32>,
}

/// A mesh object in the host scene.
#[derive(Debug, Clone)]
pub struct SceneObject {
    /// Unique object name.
    pub name: String,
    /// Base mesh data (before modifier evaluation).
    pub mesh: Mesh,
    /// Object scale component of the world transform.
    pub scale: Vec3,
    /// Modifier stack, evaluated in order.
    pub modifiers: Vec<Modifier>,
    /// Heightmap settings for this object.
    pub settings: TerrainSettings,
    /// Heightmap slot references for this object.
    pub slots: MapSlots,
}

impl SceneObject {
    /// Create an object with default settings and an empty modifier stack.
    #[must_use]
    pub fn new(name: impl Into<String>, mesh: Mesh, scale: Vec3) -> Self {
        Self {
            name: name.into(),
            mesh,
            scale,
            modifiers: Vec::new(),
            settings: TerrainSettings::default(),
            slots: MapSlots::default(),
        }
    }
}

/// Reference to a target entity by kind and name.
#[derive(Debug, Clone, Copy)]
pub enum TargetRef<'a> {
    /// A mesh object.
    Object(&'a str),
    /// A 2-D image.
    Image(&'a str),
}

impl TargetRef<'_> {
    /// The referenced name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Object(name) | Self::Image(name) => name,
        }
    }
}

/// The host scene store: objects, images and node groups by name.
#[derive(Debug, Default)]
pub struct Scene {
    /// Mesh objects by name.
    pub objects: FxHashMap<String, SceneObject>,
    /// Images by name.
    pub images: FxHashMap<String, Image>,
    /// Node groups by name.
    pub node_groups: FxHashMap<String, NodeGroup>,
}

impl Scene {
    /// Create an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object.
    pub fn add_object(&mut self, object: SceneObject) {
        let _ = self.objects.insert(object.name.clone(), object);
    }

    /// Insert or replace an image.
    pub fn add_image(&mut self, image: Image) {
        let _ = self.images.insert(image.name.clone(), image);
    }

    /// Insert or replace a node group.
    pub fn add_node_group(&mut self, group: NodeGroup) {
        let _ = self.node_groups.insert(group.name.clone(), group);
    }

    /// Look up an object.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::TargetNotFound`] for unknown names.
    pub fn object(&self, name: &str) -> Result<&SceneObject, ReliefError> {
        self.objects
            .get(name)
            .ok_or_else(|| ReliefError::TargetNotFound(name.to_owned()))
    }

    /// Look up an object mutably.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::TargetNotFound`] for unknown names.
    pub fn object_mut(
        &mut self,
        name: &str,
    ) -> Result<&mut SceneObject, ReliefError> {
        self.objects
            .get_mut(name)
            .ok_or_else(|| ReliefError::TargetNotFound(name.to_owned()))
    }

    /// Look up an image.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::TargetNotFound`] for unknown names.
    pub fn image(&self, name: &str) -> Result<&Image, ReliefError> {
        self.images
            .get(name)
            .ok_or_else(|| ReliefError::TargetNotFound(name.to_owned()))
    }

    /// Look up an image mutably.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::TargetNotFound`] for unknown names.
    pub fn image_mut(
        &mut self,
        name: &str,
    ) -> Result<&mut Image, ReliefError> {
        self.images
            .get_mut(name)
            .ok_or_else(|| ReliefError::TargetNotFound(name.to_owned()))
    }

    /// Settings and slots of a target entity.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::TargetNotFound`] for unknown names.
    pub fn target_state(
        &self,
        target: TargetRef<'_>,
    ) -> Result<(&TerrainSettings, &MapSlots), ReliefError> {
        match target {
            TargetRef::Object(name) => {
                let obj = self.object(name)?;
                Ok((&obj.settings, &obj.slots))
            }
            TargetRef::Image(name) => {
                let img = self.image(name)?;
                Ok((&img.settings, &img.slots))
            }
        }
    }

    /// Settings and slots of a target entity, mutably.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::TargetNotFound`] for unknown names.
    pub fn target_state_mut(
        &mut self,
        target: TargetRef<'_>,
    ) -> Result<(&mut TerrainSettings, &mut MapSlots), ReliefError> {
        match target {
            TargetRef::Object(name) => {
                let obj = self.object_mut(name)?;
                Ok((&mut obj.settings, &mut obj.slots))
            }
            TargetRef::Image(name) => {
                let img = self.image_mut(name)?;
                Ok((&mut img.settings, &mut img.slots))
            }
        }
    }

    /// Evaluate an object's mesh: base positions with every visible
    /// displace modifier applied (planar XY mapping over the base bounds,
    /// nearest-texel sampling of the driving image's red channel).
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::TargetNotFound`] for unknown object names.
    pub fn evaluated_positions(
        &self,
        name: &str,
    ) -> Result<Vec<[f32; 3]>, ReliefError> {
        let object = self.object(name)?;
        let mut positions = object.mesh.positions.clone();
        let Some(bounds) = Aabb::from_positions(&positions) else {
            return Ok(positions);
        };

        for modifier in &object.modifiers {
            if !modifier.show_viewport {
                continue;
            }
            let ModifierKind::Displace {
                image: Some(image_name),
                strength,
            } = &modifier.kind
            else {
                continue;
            };
            let Some(image) = self.images.get(image_name) else {
                continue;
            };
            let Ok(channel) = image.red_channel() else {
                continue;
            };
            apply_displacement(
                &mut positions,
                bounds,
                image.size,
                &channel,
                *strength,
            );
        }

        Ok(positions)
    }

    /// Create or update an engine-owned linear float image from
    /// single-channel height data (alpha forced to 1).
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::ImageData`] when `heights` does not match
    /// `size`.
    pub fn write_image(
        &mut self,
        name: &str,
        size: [u32; 2],
        heights: &[f32],
    ) -> Result<(), ReliefError> {
        let expected = (size[0] * size[1]) as usize;
        if heights.len() != expected {
            return Err(ReliefError::ImageData(format!(
                "image '{name}': {} height texels, expected {expected}",
                heights.len()
            )));
        }

        let mut pixels = Vec::with_capacity(expected * 4);
        for &h in heights {
            pixels.extend_from_slice(&[h, h, h, 1.0]);
        }

        if let Some(existing) = self.images.get_mut(name) {
            existing.size = size;
            existing.pixels = pixels;
            existing.is_float = true;
            existing.colorspace = ColorSpace::Linear;
            existing.engine_owned = true;
        } else {
            self.add_image(Image {
                name: name.to_owned(),
                size,
                pixels,
                is_float: true,
                colorspace: ColorSpace::Linear,
                engine_owned: true,
                settings: TerrainSettings::default(),
                slots: MapSlots::default(),
            });
        }
        Ok(())
    }
}

/// Offset each position's Z by the image value at its planar XY location.
fn apply_displacement(
    positions: &mut [[f32; 3]],
    bounds: Aabb,
    size: [u32; 2],
    channel: &[f32],
    strength: f32,
) {
    if size[0] == 0 || size[1] == 0 {
        return;
    }
    let extent = bounds.extent();
    let inv_x = if extent.x > f32::EPSILON {
        1.0 / extent.x
    } else {
        0.0
    };
    let inv_y = if extent.y > f32::EPSILON {
        1.0 / extent.y
    } else {
        0.0
    };

    for p in positions {
        let u = ((p[0] - bounds.min.x) * inv_x).clamp(0.0, 1.0);
        let v = ((p[1] - bounds.min.y) * inv_y).clamp(0.0, 1.0);
        let col = ((u * (size[0] - 1) as f32).round() as u32).min(size[0] - 1);
        // Row 0 is the top of the image (maximum Y).
        let row = (((1.0 - v) * (size[1] - 1) as f32).round() as u32)
            .min(size[1] - 1);
        p[2] += channel[(row * size[0] + col) as usize] * strength;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> Mesh {
        Mesh {
            positions: vec![
                [-1.0, -1.0, 0.0],
                [1.0, -1.0, 0.0],
                [1.0, 1.0, 0.0],
                [-1.0, 1.0, 0.0],
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    fn flat_image(name: &str, value: f32) -> Image {
        Image {
            name: name.to_owned(),
            size: [2, 2],
            pixels: [value, value, value, 1.0].repeat(4),
            is_float: true,
            colorspace: ColorSpace::Linear,
            engine_owned: false,
            settings: TerrainSettings::default(),
            slots: MapSlots::default(),
        }
    }

    #[test]
    fn hidden_displace_modifier_does_not_move_vertices() {
        let mut scene = Scene::new();
        scene.add_image(flat_image("disp", 0.5));
        let mut object =
            SceneObject::new("terrain", quad_mesh(), Vec3::ONE);
        object.modifiers.push(Modifier {
            name: "RLF_terrain".to_owned(),
            kind: ModifierKind::Displace {
                image: Some("disp".to_owned()),
                strength: 1.0,
            },
            show_viewport: false,
            engine_owned: true,
        });
        scene.add_object(object);

        let positions = scene.evaluated_positions("terrain").unwrap();
        assert!(positions.iter().all(|p| p[2] == 0.0));
    }

    #[test]
    fn visible_displace_modifier_lifts_vertices() {
        let mut scene = Scene::new();
        scene.add_image(flat_image("disp", 0.5));
        let mut object =
            SceneObject::new("terrain", quad_mesh(), Vec3::ONE);
        object.modifiers.push(Modifier {
            name: "RLF_terrain".to_owned(),
            kind: ModifierKind::Displace {
                image: Some("disp".to_owned()),
                strength: 2.0,
            },
            show_viewport: true,
            engine_owned: true,
        });
        scene.add_object(object);

        let positions = scene.evaluated_positions("terrain").unwrap();
        assert!(positions.iter().all(|p| (p[2] - 1.0).abs() < 1e-6));
    }

    #[test]
    fn engine_ownership_tag_and_legacy_prefix() {
        let tagged = Modifier {
            name: "Custom".to_owned(),
            kind: ModifierKind::Nodes { group: None },
            show_viewport: true,
            engine_owned: true,
        };
        let legacy = Modifier {
            name: "RLF_terrain".to_owned(),
            kind: ModifierKind::Nodes { group: None },
            show_viewport: true,
            engine_owned: false,
        };
        let foreign = Modifier {
            name: "Subsurf".to_owned(),
            kind: ModifierKind::Nodes { group: None },
            show_viewport: true,
            engine_owned: false,
        };
        assert!(tagged.is_engine_owned());
        assert!(legacy.is_engine_owned());
        assert!(!foreign.is_engine_owned());
    }

    #[test]
    fn red_channel_validates_length() {
        let mut image = flat_image("broken", 1.0);
        image.pixels.truncate(3);
        assert!(image.red_channel().is_err());
    }

    #[test]
    fn write_image_expands_to_rgba_and_tags() {
        let mut scene = Scene::new();
        scene
            .write_image("RLF_out", [2, 1], &[0.25, 0.75])
            .unwrap();
        let image = scene.image("RLF_out").unwrap();
        assert_eq!(image.pixels.len(), 8);
        assert_eq!(image.pixels[0], 0.25);
        assert_eq!(image.pixels[3], 1.0);
        assert!(image.is_engine_owned());
    }
}
