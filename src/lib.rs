//! Heightmap terrain for Bevy, split into independently placed mesh patches.
//!
//! A heightmap [`Image`] is decoded into a [`HeightField`], cut into square
//! patches of `patch_size` quads, and each patch becomes its own entity with a
//! [`Mesh`] carrying positions, normals, UVs and tangents. Height queries
//! against the built surface use the same triangles the mesh renders.
//!
//! # Features
//!
//! - **Patch meshing**: [`PatchMesher`] turns one patch of a [`HeightField`]
//!   into vertex data; all patches share one [`PatchIndices`] triangulation.
//! - **Terrain entities**: add a [`Terrain`] component and the
//!   [`TerrainPlugin`] systems build, re-place and rebuild its patches.
//! - **Height queries**: [`TerrainSurface::height`] returns the world-space
//!   height at any point above or below the terrain.
//! - **Physics colliders** (optional, `physics` feature): Generate an Avian3D
//!   `Collider::heightfield` from a `HeightField` via [`collider`].
//!
//! # Feature Flags
//!
//! - `physics`: Enables [`collider`] and [`collider::build_heightfield_collider`]
//!   for Avian3D integration.
//!
//! # Example
//!
//! ```ignore
//! use bevy::prelude::*;
//! use bevy_patch_terrain::{Terrain, TerrainPlugin, TerrainSurface};
//!
//! fn setup(
//!     mut commands: Commands,
//!     asset_server: Res<AssetServer>,
//!     mut materials: ResMut<Assets<StandardMaterial>>,
//! ) {
//!     commands.spawn((
//!         Terrain::new(asset_server.load("heightmap.png"))
//!             .with_patch_size(32)
//!             .with_material(materials.add(StandardMaterial::default())),
//!         Transform::default(),
//!     ));
//! }
//!
//! fn follow_ground(
//!     terrain: Single<(&GlobalTransform, &TerrainSurface)>,
//!     mut players: Query<&mut Transform, With<Player>>,
//! ) {
//!     let (frame, surface) = *terrain;
//!     for mut transform in &mut players {
//!         transform.translation.y = surface.height(frame, transform.translation);
//!     }
//! }
//!
//! App::new()
//!     .add_plugins((DefaultPlugins, TerrainPlugin))
//!     .add_systems(Startup, setup)
//!     .add_systems(Update, follow_ground)
//!     .run();
//! ```

use bevy::asset::AssetEventSystems;
use bevy::prelude::*;
use bevy::transform::TransformSystems;

pub mod error;
pub mod height_field;
pub mod layout;
pub mod mesher;
pub mod spatial_index;
pub mod terrain;

#[cfg(feature = "physics")]
pub mod collider;

pub use error::TerrainError;
pub use height_field::HeightField;
pub use layout::{
    DEFAULT_PATCH_SIZE, DEFAULT_SPACING, MAX_LOD_LEVELS, MAX_PATCH_SIZE, MIN_PATCH_SIZE,
    PatchLayout, lod_level_count, validate_patch_size,
};
pub use mesher::{PatchGeometry, PatchIndices, PatchMesher, update_patch_geometry};
pub use spatial_index::TerrainSpatialIndex;
pub use terrain::{
    PatchDrawSettings, Terrain, TerrainCreated, TerrainPatch, TerrainSurface,
    despawn_orphaned_patches, fan_out_draw_settings, rebuild_terrains, sync_patch_transforms,
};

#[cfg(feature = "physics")]
pub use collider::build_heightfield_collider;

/// Builds and maintains [`Terrain`] entities.
///
/// Expects `Assets<Image>` and `Assets<Mesh>` to exist, which `DefaultPlugins`
/// provides. All terrain systems run in `PostUpdate` after transform
/// propagation and after asset events are flushed, so patches follow their
/// terrain in the same frame and a freshly loaded heightmap builds once.
pub struct TerrainPlugin;

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<Terrain>()
            .register_type::<PatchDrawSettings>()
            .init_resource::<TerrainSpatialIndex>()
            .add_message::<TerrainCreated>()
            .add_systems(
                PostUpdate,
                (
                    rebuild_terrains,
                    sync_patch_transforms,
                    fan_out_draw_settings,
                    despawn_orphaned_patches,
                )
                    .chain()
                    .after(TransformSystems::Propagate)
                    .after(AssetEventSystems),
            );
    }
}
