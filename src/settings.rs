//! Per-target configuration.
//!
//! An explicit structure with field-level contracts (not an open property
//! bag): the projection writes the scale fields back on every generation,
//! while `img_size`, once established, stays fixed until cached maps are
//! cleared. Settings serialize to/from TOML for presets; partial files
//! fill in defaults.

use serde::{Deserialize, Serialize};

use crate::error::ReliefError;

/// Tiling mode of a target's heightmap.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tiling {
    /// No tiling.
    #[default]
    None,
    /// Tiles along the X direction (image width).
    X,
    /// Tiles along the Y direction (image height).
    Y,
    /// Tiles in both directions.
    Xy,
    /// Spherical body mapped equirectangularly.
    Planet,
}

impl Tiling {
    /// Whether this target is a spherical body (equirectangular maps).
    #[must_use]
    pub fn is_planet(self) -> bool {
        self == Self::Planet
    }
}

/// Scale mode of a projection.
///
/// A single enum replaces three mutually exclusive flags; call sites can
/// no longer combine them inconsistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleMode {
    /// Preserve vertical angles via the per-target `height_scale`.
    #[default]
    Proportional,
    /// Rescale heights to the range [0, 1].
    Normalized,
    /// Preserve object height without object scale applied.
    Local,
    /// Preserve world-space height.
    World,
}

/// Individual settings for objects and images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Heightmap resolution. Established by the first generation and then
    /// immutable until cached heightmaps are cleared.
    pub img_size: Option<[u32; 2]>,
    /// Tiling mode for the texture.
    pub tiling: Tiling,
    /// Height scaling factor after normalization. A value of 1 means the
    /// same scale as the heightmap width.
    pub height_scale: f32,
    /// Ratio of Y to X extents for non-square footprints.
    pub scale_ratio: f32,
    /// Original height scaling to use with modifiers, which affect it.
    pub org_scale: f32,
    /// Original object width for correct angle calculations.
    pub org_width: f32,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            img_size: None,
            tiling: Tiling::None,
            height_scale: 1.0,
            scale_ratio: 1.0,
            org_scale: 1.0,
            org_width: 1.0,
        }
    }
}

impl TerrainSettings {
    /// Parse settings from a TOML string. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::SettingsParse`] on malformed TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, ReliefError> {
        toml::from_str(content)
            .map_err(|e| ReliefError::SettingsParse(e.to_string()))
    }

    /// Serialize settings to a pretty-printed TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::SettingsParse`] on serialization failure.
    pub fn to_toml_string(&self) -> Result<String, ReliefError> {
        toml::to_string_pretty(self)
            .map_err(|e| ReliefError::SettingsParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let settings = TerrainSettings::default();
        let toml_str = settings.to_toml_string().unwrap();
        let parsed = TerrainSettings::from_toml_str(&toml_str).unwrap();
        assert_eq!(settings, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let settings = TerrainSettings::from_toml_str(
            r#"
tiling = "planet"
height_scale = 0.5
"#,
        )
        .unwrap();
        assert!(settings.tiling.is_planet());
        assert_eq!(settings.height_scale, 0.5);
        // Everything else should be default
        assert_eq!(settings.org_width, 1.0);
        assert_eq!(settings.img_size, None);
    }

    #[test]
    fn scale_mode_default_is_proportional() {
        assert_eq!(ScaleMode::default(), ScaleMode::Proportional);
    }
}
