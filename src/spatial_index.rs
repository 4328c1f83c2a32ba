//! Scene-level registry of terrain patch bounds.

use bevy::math::Vec3A;
use bevy::math::bounding::{Aabb3d, IntersectsVolume};
use bevy::platform::collections::HashMap;
use bevy::prelude::*;

/// World-space bounds of every registered terrain patch.
///
/// Terrains only build while this resource exists; [`TerrainPlugin`] inserts
/// an empty one.
///
/// [`TerrainPlugin`]: crate::TerrainPlugin
#[derive(Resource, Debug, Default)]
pub struct TerrainSpatialIndex {
    entries: HashMap<Entity, Aabb3d>,
}

impl TerrainSpatialIndex {
    /// Adds or replaces the bounds of `entity`.
    pub fn register(&mut self, entity: Entity, bounds: Aabb3d) {
        self.entries.insert(entity, bounds);
    }

    /// Removes `entity`, returning whether it was registered.
    pub fn unregister(&mut self, entity: Entity) -> bool {
        self.entries.remove(&entity).is_some()
    }

    pub fn bounds(&self, entity: Entity) -> Option<Aabb3d> {
        self.entries.get(&entity).copied()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entries.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entities whose bounds overlap `region`.
    pub fn intersecting<'a>(&'a self, region: &'a Aabb3d) -> impl Iterator<Item = Entity> + 'a {
        self.entries
            .iter()
            .filter(move |(_, bounds)| bounds.intersects(region))
            .map(|(entity, _)| *entity)
    }
}

/// Transforms local bounds into a world-space box enclosing all eight corners.
pub fn world_bounds(local: &Aabb3d, transform: &GlobalTransform) -> Aabb3d {
    let affine = transform.affine();
    let mut min = Vec3A::splat(f32::INFINITY);
    let mut max = Vec3A::splat(f32::NEG_INFINITY);

    for i in 0..8 {
        let corner = Vec3A::new(
            if i & 1 == 0 { local.min.x } else { local.max.x },
            if i & 2 == 0 { local.min.y } else { local.max.y },
            if i & 4 == 0 { local.min.z } else { local.max.z },
        );
        let world = affine.transform_point3a(corner);
        min = min.min(world);
        max = max.max(world);
    }

    Aabb3d { min, max }
}
