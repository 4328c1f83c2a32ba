//! Patch mesh generation from [`HeightField`] data.
//!
//! Every patch of a terrain is meshed separately:
//! - `TriangleList` topology, shared by all patches through [`PatchIndices`]
//! - Per-vertex normals from the field's eight-neighbor slopes
//! - UVs spanning the whole terrain, V flipped to match the heightmap image
//! - Tangents along +X, orthogonalized against the normal

use std::sync::Arc;

use bevy::asset::RenderAssetUsages;
use bevy::math::bounding::Aabb3d;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;

use crate::error::TerrainError;
use crate::height_field::HeightField;
use crate::terrain::TerrainPatch;

/// Triangle indices shared by every patch of one terrain.
///
/// All patches have `(patch_size + 1)²` vertices laid out row-major, so one
/// triangulation serves them all.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchIndices(Arc<[u16]>);

impl PatchIndices {
    /// Builds the triangulation for `patch_size × patch_size` quads.
    ///
    /// Each quad `(x, z)` emits two triangles:
    /// ```text
    ///   (x,z+1)──(x+1,z+1)
    ///      │ ╲       │      Triangle 1: (x,z+1), (x+1,z),   (x,z)
    ///      │   ╲     │      Triangle 2: (x,z+1), (x+1,z+1), (x+1,z)
    ///    (x,z)────(x+1,z)
    /// ```
    pub fn new(patch_size: u32) -> Self {
        let row = patch_size + 1;
        let mut indices: Vec<u16> = Vec::with_capacity((patch_size * patch_size * 6) as usize);

        for z in 0..patch_size {
            for x in 0..patch_size {
                let near = x + z * row;
                let far = x + (z + 1) * row;

                indices.push(far as u16);
                indices.push((near + 1) as u16);
                indices.push(near as u16);

                indices.push(far as u16);
                indices.push((far + 1) as u16);
                indices.push((near + 1) as u16);
            }
        }

        Self(indices.into())
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// CPU-side vertex data for one patch, in patch-local space.
#[derive(Debug, Clone)]
pub struct PatchGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub tangents: Vec<[f32; 4]>,
    pub bounds: Aabb3d,
}

impl PatchGeometry {
    /// Converts the vertex data into a Bevy [`Mesh`] using the shared indices.
    pub fn into_mesh(self, indices: &PatchIndices) -> Mesh {
        let mut mesh = Mesh::new(
            PrimitiveTopology::TriangleList,
            RenderAssetUsages::default(),
        );
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, self.positions);
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, self.normals);
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, self.uvs);
        mesh.insert_attribute(Mesh::ATTRIBUTE_TANGENT, self.tangents);
        mesh.insert_indices(Indices::U16(indices.as_slice().to_vec()));
        mesh
    }
}

/// Generates patch vertex data from a [`HeightField`].
///
/// # Example
///
/// ```ignore
/// use bevy_patch_terrain::{HeightField, PatchIndices, PatchMesher};
///
/// let field = HeightField::from_image(&image, 16, Vec3::new(1.0, 0.25, 1.0))?;
/// let indices = PatchIndices::new(16);
/// let mesh = PatchMesher::new(&field, 16)
///     .build(UVec2::new(0, 0))
///     .into_mesh(&indices);
/// ```
pub struct PatchMesher<'a> {
    field: &'a HeightField,
    patch_size: u32,
}

impl<'a> PatchMesher<'a> {
    pub fn new(field: &'a HeightField, patch_size: u32) -> Self {
        Self { field, patch_size }
    }

    /// Builds the vertex data of the patch at grid coordinate `coord`.
    pub fn build(&self, coord: UVec2) -> PatchGeometry {
        let row = (self.patch_size + 1) as usize;
        let vertex_count = row * row;
        let spacing = self.field.spacing();
        let size = self.field.size().as_vec2();

        let mut positions: Vec<[f32; 3]> = Vec::with_capacity(vertex_count);
        let mut normals: Vec<[f32; 3]> = Vec::with_capacity(vertex_count);
        let mut uvs: Vec<[f32; 2]> = Vec::with_capacity(vertex_count);
        let mut tangents: Vec<[f32; 4]> = Vec::with_capacity(vertex_count);
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);

        for z1 in 0..=self.patch_size {
            for x1 in 0..=self.patch_size {
                let x_pos = (coord.x * self.patch_size + x1) as i32;
                let z_pos = (coord.y * self.patch_size + z1) as i32;

                let position = Vec3::new(
                    x1 as f32 * spacing.x,
                    self.field.raw_height(x_pos, z_pos),
                    z1 as f32 * spacing.z,
                );
                positions.push(position.into());
                min = min.min(position);
                max = max.max(position);

                let normal = self.field.normal(x_pos, z_pos);
                normals.push(normal.into());

                uvs.push([x_pos as f32 / size.x, 1.0 - z_pos as f32 / size.y]);

                let tangent = (Vec3::X - normal * normal.dot(Vec3::X)).normalize();
                tangents.push([tangent.x, tangent.y, tangent.z, 1.0]);
            }
        }

        PatchGeometry {
            positions,
            normals,
            uvs,
            tangents,
            bounds: Aabb3d {
                min: min.into(),
                max: max.into(),
            },
        }
    }
}

/// Regenerates `patch`'s geometry into its existing mesh asset.
///
/// When the mesh asset can not be borrowed for writing, nothing is written:
/// the previous mesh data and the patch bounds are left as they were.
pub fn update_patch_geometry(
    patch: &mut TerrainPatch,
    mesher: &PatchMesher,
    indices: &PatchIndices,
    mesh: &Handle<Mesh>,
    meshes: &mut Assets<Mesh>,
) -> Result<(), TerrainError> {
    if meshes.get(mesh).is_none() {
        return Err(TerrainError::MeshUnavailable);
    }

    let geometry = mesher.build(patch.coord());
    let bounds = geometry.bounds;
    let Some(target) = meshes.get_mut(mesh) else {
        return Err(TerrainError::MeshUnavailable);
    };
    *target = geometry.into_mesh(indices);
    patch.set_bounds(bounds);
    Ok(())
}
