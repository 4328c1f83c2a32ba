//! Error type shared by heightfield decoding and patch meshing.

use bevy::render::render_resource::TextureFormat;

/// Errors produced while building terrain data.
///
/// Nothing here is fatal to the app: the terrain systems log the error and
/// keep whatever state the terrain already had.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TerrainError {
    #[error("heightmap image has no pixel data")]
    MissingImageData,

    #[error("can not use a compressed image ({0:?}) as a terrain heightmap")]
    CompressedImage(TextureFormat),

    #[error("unsupported heightmap pixel format {0:?}, expected 8 bits per channel")]
    UnsupportedFormat(TextureFormat),

    #[error("heightmap data holds {actual} bytes, {expected} required")]
    TruncatedImageData { expected: usize, actual: usize },

    #[error("heightmap {width}×{height} is too small for patch size {patch_size}")]
    ImageTooSmall {
        width: u32,
        height: u32,
        patch_size: u32,
    },

    #[error("heightfield of {width}×{depth} needs {expected} samples, got {actual}")]
    SampleCountMismatch {
        width: u32,
        depth: u32,
        expected: usize,
        actual: usize,
    },

    #[error("patch mesh asset is not available for writing")]
    MeshUnavailable,
}

impl TerrainError {
    /// Returns `true` for conditions that may resolve without the inputs
    /// changing, such as an asset that is not yet writable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MeshUnavailable)
    }
}
