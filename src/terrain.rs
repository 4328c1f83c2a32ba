//! Terrain entities, their patches, and the systems that keep them built.
//!
//! A [`Terrain`] component describes the inputs. Once its heightmap is loaded
//! the terrain is built: a [`TerrainSurface`] is inserted on the terrain entity
//! and one unparented patch entity per grid cell is spawned, each with its own
//! [`Mesh3d`] and a [`TerrainPatch`] pointing back at the terrain.
//!
//! Any change to the heightmap, patch size or spacing (or a reload of the
//! heightmap asset) throws the surface and all patches away and builds them
//! again. [`PatchDrawSettings`] and the material are pushed to the existing
//! patches without a rebuild.

use bevy::asset::RenderAssetUsages;
use bevy::light::NotShadowCaster;
use bevy::math::Vec3A;
use bevy::math::bounding::Aabb3d;
use bevy::mesh::PrimitiveTopology;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::height_field::HeightField;
use crate::layout::{
    DEFAULT_PATCH_SIZE, DEFAULT_SPACING, PatchLayout, lod_level_count, validate_patch_size,
};
use crate::mesher::{PatchIndices, PatchMesher, update_patch_geometry};
use crate::spatial_index::{TerrainSpatialIndex, world_bounds};

/// Heightmap terrain configuration.
///
/// Only the patch size and spacing are persisted; the heightmap and material
/// handles must be assigned after loading.
///
/// # Example
///
/// ```ignore
/// commands.spawn((
///     Terrain::new(asset_server.load("heightmap.png"))
///         .with_patch_size(32)
///         .with_spacing(Vec3::new(2.0, 0.5, 2.0))
///         .with_material(materials.add(StandardMaterial::default())),
///     Transform::default(),
/// ));
/// ```
#[derive(Component, Reflect, Debug, Clone, Serialize, Deserialize)]
#[reflect(Component, Default)]
#[require(PatchDrawSettings)]
#[serde(default)]
pub struct Terrain {
    #[serde(skip)]
    heightmap: Option<Handle<Image>>,
    #[serde(skip)]
    material: Option<Handle<StandardMaterial>>,
    patch_size: u32,
    spacing: Vec3,
    #[serde(skip)]
    #[reflect(ignore)]
    dirty: bool,
}

impl Default for Terrain {
    fn default() -> Self {
        Self {
            heightmap: None,
            material: None,
            patch_size: DEFAULT_PATCH_SIZE,
            spacing: DEFAULT_SPACING,
            dirty: false,
        }
    }
}

impl Terrain {
    pub fn new(heightmap: Handle<Image>) -> Self {
        Self {
            heightmap: Some(heightmap),
            ..default()
        }
    }

    pub fn with_patch_size(mut self, size: u32) -> Self {
        self.set_patch_size(size);
        self
    }

    pub fn with_spacing(mut self, spacing: Vec3) -> Self {
        self.set_spacing(spacing);
        self
    }

    pub fn with_material(mut self, material: Handle<StandardMaterial>) -> Self {
        self.material = Some(material);
        self
    }

    /// Assigns the heightmap image and schedules a rebuild.
    pub fn set_heightmap(&mut self, image: Handle<Image>) {
        self.heightmap = Some(image);
        self.dirty = true;
    }

    /// Sets quads per patch side.
    ///
    /// The size is clamped into `[MIN_PATCH_SIZE, MAX_PATCH_SIZE]` first. The
    /// request is ignored, returning `false`, unless the clamped size is a
    /// power of two and differs from the current one.
    pub fn set_patch_size(&mut self, size: u32) -> bool {
        let Some(valid) = validate_patch_size(size) else {
            warn!("ignoring terrain patch size {size}: not a power of two");
            return false;
        };
        if valid == self.patch_size {
            return false;
        }
        self.patch_size = valid;
        self.dirty = true;
        true
    }

    /// Sets vertex (XZ) and height (Y) spacing, rebuilding if it changed.
    pub fn set_spacing(&mut self, spacing: Vec3) {
        if spacing != self.spacing {
            self.spacing = spacing;
            self.dirty = true;
        }
    }

    /// Sets the material used by every patch.
    pub fn set_material(&mut self, material: Option<Handle<StandardMaterial>>) {
        self.material = material;
    }

    /// Forces a full rebuild on the next update.
    pub fn rebuild(&mut self) {
        self.dirty = true;
    }

    pub fn heightmap(&self) -> Option<&Handle<Image>> {
        self.heightmap.as_ref()
    }

    pub fn material(&self) -> Option<&Handle<StandardMaterial>> {
        self.material.as_ref()
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    pub fn spacing(&self) -> Vec3 {
        self.spacing
    }

    /// LOD levels available at the current patch size. Nothing selects
    /// between them yet.
    pub fn lod_levels(&self) -> u32 {
        lod_level_count(self.patch_size)
    }
}

/// Render settings copied to every patch of a terrain.
///
/// Lives on the terrain entity; edits are fanned out to the patches without
/// rebuilding them. `visible` drives each patch's [`Visibility`] and
/// `cast_shadows` its [`NotShadowCaster`] marker. The masks, distances, LOD
/// bias and light limit are stored and copied to the patches for other
/// systems to read; nothing in this crate applies them.
#[derive(Component, Reflect, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[reflect(Component, Default)]
#[serde(default)]
pub struct PatchDrawSettings {
    pub visible: bool,
    pub cast_shadows: bool,
    pub occluder: bool,
    pub occludee: bool,
    /// And'ed with a camera's view mask.
    pub view_mask: u32,
    /// And'ed with light and zone light masks.
    pub light_mask: u32,
    /// And'ed with light and zone shadow masks.
    pub shadow_mask: u32,
    pub zone_mask: u32,
    /// Zero draws at any distance.
    pub draw_distance: f32,
    pub shadow_distance: f32,
    pub lod_bias: f32,
    /// Per-pixel light limit; zero is unlimited.
    pub max_lights: u32,
}

impl Default for PatchDrawSettings {
    fn default() -> Self {
        Self {
            visible: true,
            cast_shadows: false,
            occluder: false,
            occludee: true,
            view_mask: u32::MAX,
            light_mask: u32::MAX,
            shadow_mask: u32::MAX,
            zone_mask: u32::MAX,
            draw_distance: 0.0,
            shadow_distance: 0.0,
            lod_bias: 1.0,
            max_lights: 0,
        }
    }
}

impl PatchDrawSettings {
    pub fn visibility(&self) -> Visibility {
        if self.visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        }
    }
}

/// One tile of a built terrain.
#[derive(Component, Debug, Clone)]
pub struct TerrainPatch {
    terrain: Entity,
    coord: UVec2,
    bounds: Aabb3d,
    lod: u32,
}

impl TerrainPatch {
    pub fn new(terrain: Entity, coord: UVec2) -> Self {
        Self {
            terrain,
            coord,
            bounds: Aabb3d {
                min: Vec3A::ZERO,
                max: Vec3A::ZERO,
            },
            lod: 0,
        }
    }

    /// The terrain entity this patch belongs to.
    pub fn terrain(&self) -> Entity {
        self.terrain
    }

    /// Grid coordinate `(x, z)` of the patch.
    pub fn coord(&self) -> UVec2 {
        self.coord
    }

    /// Patch-local bounds of the vertex positions.
    pub fn bounds(&self) -> Aabb3d {
        self.bounds
    }

    pub fn lod(&self) -> u32 {
        self.lod
    }

    pub(crate) fn set_bounds(&mut self, bounds: Aabb3d) {
        self.bounds = bounds;
    }
}

/// Built state of a terrain: its height field, layout and patch entities.
///
/// Present only while the terrain is built. Do not query it from systems that
/// may run between [`rebuild_terrains`] and the following command flush.
#[derive(Component, Debug)]
pub struct TerrainSurface {
    field: HeightField,
    layout: PatchLayout,
    indices: PatchIndices,
    lod_levels: u32,
    patches: Vec<Entity>,
}

impl TerrainSurface {
    pub fn field(&self) -> &HeightField {
        &self.field
    }

    pub fn layout(&self) -> &PatchLayout {
        &self.layout
    }

    /// Triangulation shared by all patch meshes.
    pub fn indices(&self) -> &PatchIndices {
        &self.indices
    }

    pub fn lod_levels(&self) -> u32 {
        self.lod_levels
    }

    /// Patch entities in row-major grid order.
    pub fn patches(&self) -> &[Entity] {
        &self.patches
    }

    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }

    pub fn patch(&self, index: usize) -> Option<Entity> {
        self.patches.get(index).copied()
    }

    pub fn patch_at(&self, coord: UVec2) -> Option<Entity> {
        self.layout.index_of(coord).and_then(|index| self.patch(index))
    }

    /// World-space terrain height at `world_position`, given the terrain
    /// entity's current frame.
    pub fn height(&self, frame: &GlobalTransform, world_position: Vec3) -> f32 {
        self.field.height(&frame.affine(), world_position)
    }

    /// World-space terrain normal nearest to `world_position`.
    pub fn normal(&self, frame: &GlobalTransform, world_position: Vec3) -> Vec3 {
        self.field.normal_at(&frame.affine(), world_position)
    }
}

/// Written after a terrain has been (re)built.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainCreated {
    pub terrain: Entity,
}

/// Rebuilds terrains whose inputs changed or whose heightmap was reloaded.
///
/// A terrain without a `GlobalTransform`, a missing [`TerrainSpatialIndex`] or
/// a heightmap that is not loaded yet stays pending and is retried. A
/// heightmap that fails to decode is logged and the terrain keeps its
/// previous surface until an input changes.
pub fn rebuild_terrains(
    mut commands: Commands,
    mut image_events: MessageReader<AssetEvent<Image>>,
    images: Res<Assets<Image>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut spatial_index: Option<ResMut<TerrainSpatialIndex>>,
    mut created: MessageWriter<TerrainCreated>,
    mut terrains: Query<(
        Entity,
        &mut Terrain,
        &PatchDrawSettings,
        Option<&GlobalTransform>,
        Option<&TerrainSurface>,
    )>,
) {
    let reloaded: Vec<AssetId<Image>> = image_events
        .read()
        .filter_map(|event| match event {
            AssetEvent::Modified { id } | AssetEvent::LoadedWithDependencies { id } => Some(*id),
            _ => None,
        })
        .collect();

    for (entity, mut terrain, settings, frame, surface) in &mut terrains {
        let Some(heightmap) = terrain.heightmap.as_ref().map(Handle::id) else {
            continue;
        };
        if !(terrain.is_added() || terrain.dirty || reloaded.contains(&heightmap)) {
            continue;
        }

        let Some(frame) = frame else {
            debug!("terrain {entity} has no spatial frame, deferring build");
            terrain.bypass_change_detection().dirty = true;
            continue;
        };
        let Some(index) = spatial_index.as_deref_mut() else {
            debug!("no terrain spatial index, deferring build of {entity}");
            terrain.bypass_change_detection().dirty = true;
            continue;
        };
        let Some(image) = images.get(heightmap) else {
            terrain.bypass_change_detection().dirty = true;
            continue;
        };

        terrain.bypass_change_detection().dirty = false;
        let field = match HeightField::from_image(image, terrain.patch_size, terrain.spacing) {
            Ok(field) => field,
            Err(err) => {
                error!("terrain {entity}: {err}");
                continue;
            }
        };

        if let Some(previous) = surface {
            for &patch in previous.patches() {
                index.unregister(patch);
                commands.entity(patch).despawn();
            }
        }

        let surface = spawn_patches(
            &mut commands,
            &mut meshes,
            index,
            entity,
            &terrain,
            settings,
            frame,
            field,
        );
        info!(
            "terrain {entity} built: {}×{} patches of {} quads",
            surface.layout.patches().x,
            surface.layout.patches().y,
            surface.layout.patch_size(),
        );
        commands.entity(entity).insert(surface);
        created.write(TerrainCreated { terrain: entity });
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_patches(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    index: &mut TerrainSpatialIndex,
    terrain_entity: Entity,
    terrain: &Terrain,
    settings: &PatchDrawSettings,
    frame: &GlobalTransform,
    field: HeightField,
) -> TerrainSurface {
    let patch_size = terrain.patch_size;
    let layout = PatchLayout::new(&field, patch_size);
    let indices = PatchIndices::new(patch_size);
    let mut patches = Vec::with_capacity(layout.patch_count());

    {
        let mesher = PatchMesher::new(&field, patch_size);
        for coord in layout.coords() {
            let transform = layout.patch_transform(frame, coord);
            let global = GlobalTransform::from(transform);

            let mesh = meshes.add(Mesh::new(
                PrimitiveTopology::TriangleList,
                RenderAssetUsages::default(),
            ));
            let mut patch = TerrainPatch::new(terrain_entity, coord);
            if let Err(err) = update_patch_geometry(&mut patch, &mesher, &indices, &mesh, meshes) {
                warn!("terrain {terrain_entity}: skipped geometry of patch {coord}: {err}");
            }
            let bounds = world_bounds(&patch.bounds(), &global);

            let mut patch_commands = commands.spawn((
                patch,
                Mesh3d(mesh),
                transform,
                global,
                settings.clone(),
                settings.visibility(),
            ));
            if let Some(material) = &terrain.material {
                patch_commands.insert(MeshMaterial3d(material.clone()));
            }
            if !settings.cast_shadows {
                patch_commands.insert(NotShadowCaster);
            }
            let patch_entity = patch_commands.id();

            index.register(patch_entity, bounds);
            patches.push(patch_entity);
        }
    }

    TerrainSurface {
        field,
        layout,
        indices,
        lod_levels: lod_level_count(patch_size),
        patches,
    }
}

/// Re-places every patch of terrains whose frame moved.
pub fn sync_patch_transforms(
    terrains: Query<(&GlobalTransform, &TerrainSurface), Changed<GlobalTransform>>,
    mut patches: Query<
        (&TerrainPatch, &mut Transform, &mut GlobalTransform),
        Without<TerrainSurface>,
    >,
    mut spatial_index: Option<ResMut<TerrainSpatialIndex>>,
) {
    for (frame, surface) in &terrains {
        for &entity in surface.patches() {
            let Ok((patch, mut transform, mut global)) = patches.get_mut(entity) else {
                continue;
            };
            *transform = surface.layout().patch_transform(frame, patch.coord());
            *global = GlobalTransform::from(*transform);

            if let Some(index) = spatial_index.as_deref_mut() {
                index.register(entity, world_bounds(&patch.bounds(), &global));
            }
        }
    }
}

/// Copies changed draw settings and materials from terrains to their patches.
pub fn fan_out_draw_settings(
    mut commands: Commands,
    terrains: Query<(Ref<Terrain>, Ref<PatchDrawSettings>, &TerrainSurface), Without<TerrainPatch>>,
    mut patches: Query<
        (
            &mut PatchDrawSettings,
            &mut Visibility,
            Option<&MeshMaterial3d<StandardMaterial>>,
            Has<NotShadowCaster>,
        ),
        With<TerrainPatch>,
    >,
) {
    for (terrain, settings, surface) in &terrains {
        let settings_changed = settings.is_changed();
        let terrain_changed = terrain.is_changed();
        if !settings_changed && !terrain_changed {
            continue;
        }

        let material = terrain.material.as_ref();
        for &entity in surface.patches() {
            let Ok((mut patch_settings, mut visibility, current, shadowless)) =
                patches.get_mut(entity)
            else {
                continue;
            };

            if settings_changed {
                patch_settings.set_if_neq((*settings).clone());
                visibility.set_if_neq(settings.visibility());
                match (settings.cast_shadows, shadowless) {
                    (true, true) => {
                        commands.entity(entity).remove::<NotShadowCaster>();
                    }
                    (false, false) => {
                        commands.entity(entity).insert(NotShadowCaster);
                    }
                    _ => {}
                }
            }

            if terrain_changed && current.map(|m| m.0.id()) != material.map(Handle::id) {
                if let Some(material) = material {
                    commands
                        .entity(entity)
                        .insert(MeshMaterial3d(material.clone()));
                } else {
                    commands
                        .entity(entity)
                        .remove::<MeshMaterial3d<StandardMaterial>>();
                }
            }
        }
    }
}

/// Despawns the patches of terrains that lost their surface or were despawned.
pub fn despawn_orphaned_patches(
    mut commands: Commands,
    mut removed: RemovedComponents<TerrainSurface>,
    surfaces: Query<(), With<TerrainSurface>>,
    patches: Query<(Entity, &TerrainPatch)>,
    mut spatial_index: Option<ResMut<TerrainSpatialIndex>>,
) {
    for terrain in removed.read() {
        if surfaces.contains(terrain) {
            continue;
        }
        for (entity, patch) in &patches {
            if patch.terrain() != terrain {
                continue;
            }
            if let Some(index) = spatial_index.as_deref_mut() {
                index.unregister(entity);
            }
            commands.entity(entity).despawn();
        }
    }
}
