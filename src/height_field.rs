//! Height samples decoded from a heightmap image.
//!
//! A [`HeightField`] is a row-major grid of `width × depth` samples, where both
//! dimensions are `1 + patches * patch_size`. Sample `(x, z)` sits at local
//! position `origin + (x * spacing.x, z * spacing.z)` on the terrain's XZ plane,
//! so the field is centered on the terrain entity.
//!
//! Image row 0 is the terrain's back edge: field row `z` reads image row
//! `depth - 1 - z`.

use bevy::math::Affine3A;
use bevy::prelude::*;
use bevy::render::render_resource::TextureFormat;

use crate::error::TerrainError;

/// Grid of terrain heights with spacing and origin metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeightField {
    size: UVec2,
    spacing: Vec3,
    origin: Vec2,
    heights: Vec<f32>,
}

impl HeightField {
    /// Decodes `image` into a height field cut to whole patches of `patch_size`
    /// quads.
    ///
    /// The patch count per axis is `(image_dim - 1) / patch_size`; texels past
    /// the last whole patch are dropped. The first channel of each texel is the
    /// sample, multiplied by `spacing.y`.
    pub fn from_image(image: &Image, patch_size: u32, spacing: Vec3) -> Result<Self, TerrainError> {
        let format = image.texture_descriptor.format;
        if format.is_compressed() {
            return Err(TerrainError::CompressedImage(format));
        }
        let components = texel_bytes(format).ok_or(TerrainError::UnsupportedFormat(format))?;
        let data = image.data.as_deref().ok_or(TerrainError::MissingImageData)?;

        let img_width = image.width();
        let img_height = image.height();
        if patch_size == 0 || img_width < patch_size + 1 || img_height < patch_size + 1 {
            return Err(TerrainError::ImageTooSmall {
                width: img_width,
                height: img_height,
                patch_size,
            });
        }

        let img_row = img_width as usize * components;
        let expected = img_row * img_height as usize;
        if data.len() < expected {
            return Err(TerrainError::TruncatedImageData {
                expected,
                actual: data.len(),
            });
        }

        let patches_x = (img_width - 1) / patch_size;
        let patches_z = (img_height - 1) / patch_size;
        let size = UVec2::new(patches_x * patch_size + 1, patches_z * patch_size + 1);

        let mut heights = Vec::with_capacity((size.x * size.y) as usize);
        for z in 0..size.y as usize {
            let src_row = img_row * (size.y as usize - 1 - z);
            for x in 0..size.x as usize {
                heights.push(data[src_row + components * x] as f32 * spacing.y);
            }
        }

        Ok(Self::new_unchecked(size, spacing, heights))
    }

    /// Builds a field from samples that are already in world height units.
    pub fn from_samples(size: UVec2, spacing: Vec3, heights: Vec<f32>) -> Result<Self, TerrainError> {
        let expected = (size.x * size.y) as usize;
        if size.x == 0 || size.y == 0 || heights.len() != expected {
            return Err(TerrainError::SampleCountMismatch {
                width: size.x,
                depth: size.y,
                expected,
                actual: heights.len(),
            });
        }
        Ok(Self::new_unchecked(size, spacing, heights))
    }

    fn new_unchecked(size: UVec2, spacing: Vec3, heights: Vec<f32>) -> Self {
        let origin = Vec2::new(
            -0.5 * (size.x - 1) as f32 * spacing.x,
            -0.5 * (size.y - 1) as f32 * spacing.z,
        );
        Self {
            size,
            spacing,
            origin,
            heights,
        }
    }

    /// Grid dimensions as `(width, depth)` in samples.
    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.x
    }

    pub fn depth(&self) -> u32 {
        self.size.y
    }

    /// Vertex (X, Z) and height (Y) spacing.
    pub fn spacing(&self) -> Vec3 {
        self.spacing
    }

    /// Local XZ position of sample `(0, 0)`.
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Row-major samples, `width * depth` long.
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    /// Returns `true` when no field has been built.
    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    /// Uninterpolated sample, clamping `(x, z)` to the field edges.
    pub fn raw_height(&self, x: i32, z: i32) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let x = x.clamp(0, self.size.x as i32 - 1) as usize;
        let z = z.clamp(0, self.size.y as i32 - 1) as usize;
        self.heights[z * self.size.x as usize + x]
    }

    /// Height at fractional grid coordinates, blended over the same triangle
    /// the mesh renders for that quad.
    ///
    /// Coordinates outside the field saturate to its edges.
    pub fn interpolated_height(&self, x_pos: f32, z_pos: f32) -> f32 {
        let x_pos = x_pos.clamp(-1.0, self.size.x as f32);
        let z_pos = z_pos.clamp(-1.0, self.size.y as f32);
        let x = x_pos.floor() as i32;
        let z = z_pos.floor() as i32;
        let mut x_frac = x_pos - x_pos.floor();
        let mut z_frac = z_pos - z_pos.floor();

        let (h1, h2, h3) = if x_frac + z_frac >= 1.0 {
            x_frac = 1.0 - x_frac;
            z_frac = 1.0 - z_frac;
            (
                self.raw_height(x + 1, z + 1),
                self.raw_height(x, z + 1),
                self.raw_height(x + 1, z),
            )
        } else {
            (
                self.raw_height(x, z),
                self.raw_height(x + 1, z),
                self.raw_height(x, z + 1),
            )
        };

        h1 * (1.0 - x_frac - z_frac) + h2 * x_frac + h3 * z_frac
    }

    /// Converts a point in the terrain's local frame to fractional grid
    /// coordinates.
    pub fn local_to_grid(&self, local: Vec3) -> Vec2 {
        Vec2::new(
            (local.x - self.origin.x) / self.spacing.x,
            (local.z - self.origin.y) / self.spacing.z,
        )
    }

    /// World-space terrain height below (or above) `world_position`.
    ///
    /// Only the terrain frame's vertical scale and translation are applied to
    /// the result, so this assumes the terrain is upright.
    pub fn height(&self, world_transform: &Affine3A, world_position: Vec3) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let local = world_transform.inverse().transform_point3(world_position);
        let grid = self.local_to_grid(local);
        let h = self.interpolated_height(grid.x, grid.y);

        let (scale, _, translation) = world_transform.to_scale_rotation_translation();
        scale.y * h + translation.y
    }

    /// Unit normal at sample `(x, z)` from the slopes to all eight neighbors.
    pub fn normal(&self, x: i32, z: i32) -> Vec3 {
        // Past one sample outside the field every neighbor clamps to the edge.
        let x = x.clamp(-1, self.size.x as i32);
        let z = z.clamp(-1, self.size.y as i32);
        let base = self.raw_height(x, z);
        let n = self.raw_height(x, z - 1) - base;
        let ne = self.raw_height(x + 1, z - 1) - base;
        let e = self.raw_height(x + 1, z) - base;
        let se = self.raw_height(x + 1, z + 1) - base;
        let s = self.raw_height(x, z + 1) - base;
        let sw = self.raw_height(x - 1, z + 1) - base;
        let w = self.raw_height(x - 1, z) - base;
        let nw = self.raw_height(x - 1, z - 1) - base;

        (Vec3::new(0.0, 1.0, n)
            + Vec3::new(-ne, 1.0, ne)
            + Vec3::new(-e, 1.0, 0.0)
            + Vec3::new(-se, 1.0, -se)
            + Vec3::new(0.0, 1.0, -s)
            + Vec3::new(sw, 1.0, -sw)
            + Vec3::new(w, 1.0, 0.0)
            + Vec3::new(nw, 1.0, nw))
        .normalize()
    }

    /// Normal of the nearest sample to `world_position`, in world space.
    pub fn normal_at(&self, world_transform: &Affine3A, world_position: Vec3) -> Vec3 {
        let local = world_transform.inverse().transform_point3(world_position);
        let last = (self.size.as_ivec2() - IVec2::ONE).max(IVec2::ZERO);
        let grid = self.local_to_grid(local).round().as_ivec2().clamp(IVec2::ZERO, last);
        let normal = self.normal(grid.x, grid.y);
        let normal_matrix = world_transform.matrix3.inverse().transpose();
        normal_matrix.mul_vec3(normal).normalize_or(Vec3::Y)
    }
}

/// Bytes per texel for the 8-bit formats a heightmap may use.
fn texel_bytes(format: TextureFormat) -> Option<usize> {
    match format {
        TextureFormat::R8Unorm | TextureFormat::R8Uint => Some(1),
        TextureFormat::Rg8Unorm | TextureFormat::Rg8Uint => Some(2),
        TextureFormat::Rgba8Unorm
        | TextureFormat::Rgba8UnormSrgb
        | TextureFormat::Rgba8Uint
        | TextureFormat::Bgra8Unorm
        | TextureFormat::Bgra8UnormSrgb => Some(4),
        _ => None,
    }
}
