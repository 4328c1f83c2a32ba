//! Avian3D physics collider generation from [`HeightField`] data.
//!
//! Provides [`build_heightfield_collider`] which converts a [`HeightField`] into
//! an Avian3D `Collider::heightfield`. This is the cheapest collision shape for
//! static terrain when ray-casting and resolving contacts.

use avian3d::prelude::Collider;
use bevy::prelude::*;

use crate::height_field::HeightField;

/// Builds an Avian3D `Collider::heightfield` from a [`HeightField`].
///
/// Avian centers heightfields on their local origin, and so does the terrain
/// layout, so the collider lines up with the patches when attached to the
/// terrain entity itself. Heights are already scaled by the field's Y spacing.
///
/// Returns `None` for an empty field.
///
/// # Example
///
/// ```ignore
/// use bevy_patch_terrain::{TerrainSurface, build_heightfield_collider};
///
/// fn add_collider(mut commands: Commands, terrains: Query<(Entity, &TerrainSurface), Added<TerrainSurface>>) {
///     for (entity, surface) in &terrains {
///         if let Some(collider) = build_heightfield_collider(surface.field()) {
///             commands.entity(entity).insert((RigidBody::Static, collider));
///         }
///     }
/// }
/// ```
pub fn build_heightfield_collider(field: &HeightField) -> Option<Collider> {
    if field.is_empty() {
        return None;
    }
    let w = field.width() as i32;
    let d = field.depth() as i32;

    // Avian's 3D heightfield expects `heights[row][col]` where:
    //   rows  → subdivisions along X axis (width)
    //   cols  → subdivisions along Z axis (depth)
    // HeightField stores samples[z * width + x], so we transpose accordingly.
    let heights: Vec<Vec<f32>> = (0..w)
        .map(|x| (0..d).map(|z| field.raw_height(x, z)).collect())
        .collect();

    let spacing = field.spacing();
    let scale = Vec3::new(
        (w - 1) as f32 * spacing.x,
        1.0,
        (d - 1) as f32 * spacing.z,
    );

    Some(Collider::heightfield(heights, scale))
}
