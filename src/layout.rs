//! Patch grid layout and placement within the terrain's frame.

use bevy::prelude::*;

use crate::height_field::HeightField;

/// Smallest accepted patch size, in quads per side.
pub const MIN_PATCH_SIZE: u32 = 4;
/// Largest accepted patch size, in quads per side.
pub const MAX_PATCH_SIZE: u32 = 128;
pub const DEFAULT_PATCH_SIZE: u32 = 16;
/// Cap on the number of LOD levels a patch size can produce.
pub const MAX_LOD_LEVELS: u32 = 4;
/// Default vertex (X, Z) and height (Y) spacing.
pub const DEFAULT_SPACING: Vec3 = Vec3::new(1.0, 0.25, 1.0);

/// Clamps a requested patch size into range, returning `None` if the clamped
/// value is not a power of two.
pub fn validate_patch_size(size: u32) -> Option<u32> {
    let size = size.clamp(MIN_PATCH_SIZE, MAX_PATCH_SIZE);
    size.is_power_of_two().then_some(size)
}

/// Number of LOD levels available to a patch of `patch_size` quads.
///
/// Counts halvings of the size while it stays above [`MIN_PATCH_SIZE`], up to
/// [`MAX_LOD_LEVELS`].
pub fn lod_level_count(patch_size: u32) -> u32 {
    let mut lod_size = patch_size;
    let mut levels = 1;
    while lod_size > MIN_PATCH_SIZE && levels < MAX_LOD_LEVELS {
        lod_size >>= 1;
        levels += 1;
    }
    levels
}

/// How a [`HeightField`] is cut into patches and where they sit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchLayout {
    patch_size: u32,
    patches: UVec2,
    patch_world_size: Vec2,
    origin: Vec2,
}

impl PatchLayout {
    /// Cuts `field` into whole patches starting at the field's origin.
    ///
    /// Samples past the last whole patch are not covered. An empty field or a
    /// zero `patch_size` yields no patches.
    pub fn new(field: &HeightField, patch_size: u32) -> Self {
        let spacing = field.spacing();
        let patches = if patch_size == 0 {
            UVec2::ZERO
        } else {
            field.size().saturating_sub(UVec2::ONE) / patch_size
        };
        let patch_world_size = Vec2::new(spacing.x, spacing.z) * patch_size as f32;
        Self {
            patch_size,
            patches,
            patch_world_size,
            origin: field.origin(),
        }
    }

    /// Quads per patch side.
    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    /// Patch counts along X and Z.
    pub fn patches(&self) -> UVec2 {
        self.patches
    }

    pub fn patch_count(&self) -> usize {
        (self.patches.x * self.patches.y) as usize
    }

    /// XZ extent of one patch in the terrain's local frame.
    pub fn patch_world_size(&self) -> Vec2 {
        self.patch_world_size
    }

    /// Local XZ corner of patch `(0, 0)`.
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Row-major patch index, or `None` outside the grid.
    pub fn index_of(&self, coord: UVec2) -> Option<usize> {
        (coord.x < self.patches.x && coord.y < self.patches.y)
            .then(|| (coord.y * self.patches.x + coord.x) as usize)
    }

    /// Patch coordinates in row-major order.
    pub fn coords(&self) -> impl Iterator<Item = UVec2> + use<> {
        let patches = self.patches;
        (0..patches.y).flat_map(move |z| (0..patches.x).map(move |x| UVec2::new(x, z)))
    }

    /// Offset of a patch's corner from the terrain's local origin.
    pub fn patch_offset(&self, coord: UVec2) -> Vec3 {
        let corner = self.origin + coord.as_vec2() * self.patch_world_size;
        Vec3::new(corner.x, 0.0, corner.y)
    }

    /// World placement of a patch, given the terrain's current frame.
    pub fn patch_transform(&self, terrain: &GlobalTransform, coord: UVec2) -> Transform {
        terrain
            .mul_transform(Transform::from_translation(self.patch_offset(coord)))
            .compute_transform()
    }
}
