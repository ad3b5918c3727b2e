//! Bounding boxes, resize matrices, and scale recalculation.
//!
//! A resize matrix scales the target object into normalized device
//! coordinates so that `1 - z` is the normalized surface height (flat
//! mode) or so the object sits centered at roughly unit radius
//! (spherical mode).

use glam::{Mat4, Vec3, Vec4};

use crate::settings::TerrainSettings;

/// Extents below this are treated as degenerate.
pub const MIN_EXTENT: f32 = 1.0e-6;

/// Guard threshold for scale-ratio divisions.
const SCALE_EPS: f32 = 1.0e-3;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Compute the bounding box of a position set. `None` when empty.
    #[must_use]
    pub fn from_positions(positions: &[[f32; 3]]) -> Option<Self> {
        let first = Vec3::from_array(*positions.first()?);
        let mut bounds = Self {
            min: first,
            max: first,
        };
        for p in &positions[1..] {
            let v = Vec3::from_array(*p);
            bounds.min = bounds.min.min(v);
            bounds.max = bounds.max.max(v);
        }
        Some(bounds)
    }

    /// Box center.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Box extents per axis.
    #[must_use]
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Whether the XY footprint has (near) zero extent.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        let e = self.extent();
        e.x <= MIN_EXTENT || e.y <= MIN_EXTENT
    }
}

/// Flat-mode resize matrix: maps the box to `x,y in [-1,1]` and `z` to
/// depth in `[0,1]` with the top surface nearest (depth 0).
#[must_use]
pub fn flat_resize_matrix(bounds: &Aabb) -> Mat4 {
    let c = bounds.center();
    let e = bounds.extent().max(Vec3::splat(MIN_EXTENT));
    let dx = 2.0 / e.x;
    let dy = 2.0 / e.y;
    let dz = 1.0 / e.z;

    Mat4::from_cols(
        Vec4::new(dx, 0.0, 0.0, 0.0),
        Vec4::new(0.0, dy, 0.0, 0.0),
        Vec4::new(0.0, 0.0, -dz, 0.0),
        Vec4::new(-c.x * dx, -c.y * dy, 0.5 + c.z * dz, 1.0),
    )
}

/// Spherical-mode resize matrix: centers the box on the origin with each
/// axis scaled to `[-1,1]`, so a sphere filling its bounds becomes a unit
/// sphere.
#[must_use]
pub fn spherical_resize_matrix(bounds: &Aabb) -> Mat4 {
    let c = bounds.center();
    let e = bounds.extent().max(Vec3::splat(MIN_EXTENT));
    let s = Vec3::new(2.0 / e.x, 2.0 / e.y, 2.0 / e.z);

    Mat4::from_cols(
        Vec4::new(s.x, 0.0, 0.0, 0.0),
        Vec4::new(0.0, s.y, 0.0, 0.0),
        Vec4::new(0.0, 0.0, s.z, 0.0),
        Vec4::new(-c.x * s.x, -c.y * s.y, -c.z * s.z, 1.0),
    )
}

/// Reflect a spherical matrix by 180 degrees about Z: the back hemisphere
/// faces the projection.
#[must_use]
pub fn reflected(matrix: Mat4) -> Mat4 {
    Mat4::from_scale(Vec3::new(-1.0, -1.0, 1.0)) * matrix
}

/// Rotate a spherical matrix by 180 degrees about X: the south pole faces
/// the projection.
#[must_use]
pub fn south_polar(matrix: Mat4) -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, -1.0)) * matrix
}

/// Recalculate the derived scale fields of a target's settings from its
/// current bounds and object scale. Runs before every projection.
pub fn recalculate_scales(
    settings: &mut TerrainSettings,
    bounds: &Aabb,
    object_scale: Vec3,
) {
    let e = bounds.extent();
    let dx = e.x * 0.5;
    let dy = e.y * 0.5;
    let dz = e.z;

    settings.scale_ratio = if dx > SCALE_EPS { dy / dx } else { 1.0 };
    settings.height_scale = if dx > SCALE_EPS { dz / dx } else { 1.0 };
    // Local-space dimensions; independent of object scale unless the
    // scale itself is collapsed.
    settings.org_scale = if object_scale.z.abs() > SCALE_EPS {
        e.z
    } else {
        1.0
    };
    settings.org_width = if object_scale.x.abs() > SCALE_EPS {
        e.x
    } else {
        1.0
    };
}
