use bevy::mesh::VertexAttributeValues;
use bevy::prelude::*;
use bevy_patch_terrain::{
    HeightField, PatchIndices, PatchMesher, TerrainError, TerrainPatch, update_patch_geometry,
};

fn flat_field(patches: u32, patch_size: u32, spacing: Vec3) -> HeightField {
    let side = patches * patch_size + 1;
    HeightField::from_samples(
        UVec2::splat(side),
        spacing,
        vec![0.0; (side * side) as usize],
    )
    .unwrap()
}

fn ramp_field(patches: u32, patch_size: u32) -> HeightField {
    let side = patches * patch_size + 1;
    let heights = (0..side * side).map(|i| (i % side) as f32 * 0.5).collect();
    HeightField::from_samples(UVec2::splat(side), Vec3::ONE, heights).unwrap()
}

#[test]
fn vertex_count_matches_patch_size() {
    let field = flat_field(2, 8, Vec3::ONE);
    let geometry = PatchMesher::new(&field, 8).build(UVec2::new(1, 1));
    assert_eq!(geometry.positions.len(), 9 * 9);
    assert_eq!(geometry.normals.len(), 9 * 9);
    assert_eq!(geometry.uvs.len(), 9 * 9);
    assert_eq!(geometry.tangents.len(), 9 * 9);
}

#[test]
fn index_count_matches_quads() {
    for patch_size in [4, 8, 16, 32, 64, 128] {
        let indices = PatchIndices::new(patch_size);
        assert_eq!(indices.len(), (patch_size * patch_size * 6) as usize);
        let max = (patch_size + 1) * (patch_size + 1) - 1;
        assert!(indices.as_slice().iter().all(|&i| u32::from(i) <= max));
    }
}

#[test]
fn first_quad_winding() {
    let indices = PatchIndices::new(2);
    assert_eq!(&indices.as_slice()[..6], &[3, 1, 0, 3, 4, 1]);
}

#[test]
fn second_row_quad_winding() {
    // Quad (1, 1) of a 2×2 patch, row length 3
    let indices = PatchIndices::new(2);
    assert_eq!(&indices.as_slice()[18..24], &[7, 5, 4, 7, 8, 5]);
}

#[test]
fn flat_triangles_face_up() {
    let field = flat_field(1, 4, Vec3::ONE);
    let geometry = PatchMesher::new(&field, 4).build(UVec2::ZERO);
    let indices = PatchIndices::new(4);

    for tri in indices.as_slice().chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(geometry.positions[i as usize]));
        let normal = (b - a).cross(c - a);
        assert!(normal.y > 0.0, "triangle {tri:?} faces {normal:?}");
    }
}

#[test]
fn has_all_required_attributes() {
    let field = flat_field(1, 4, Vec3::ONE);
    let mesh = PatchMesher::new(&field, 4)
        .build(UVec2::ZERO)
        .into_mesh(&PatchIndices::new(4));
    assert!(mesh.attribute(Mesh::ATTRIBUTE_POSITION).is_some(), "missing POSITION");
    assert!(mesh.attribute(Mesh::ATTRIBUTE_NORMAL).is_some(), "missing NORMAL");
    assert!(mesh.attribute(Mesh::ATTRIBUTE_UV_0).is_some(), "missing UV_0");
    assert!(mesh.attribute(Mesh::ATTRIBUTE_TANGENT).is_some(), "missing TANGENT");
    assert_eq!(mesh.count_vertices(), 25);
    assert_eq!(mesh.indices().expect("mesh must have indices").len(), 4 * 4 * 6);
}

#[test]
fn positions_are_patch_local() {
    let field = ramp_field(2, 4);
    let spacing = Vec3::ONE;
    let geometry = PatchMesher::new(&field, 4).build(UVec2::new(1, 0));

    // Vertex (x1=2, z1=3) of patch (1, 0) is field sample (6, 3)
    let vertex = geometry.positions[3 * 5 + 2];
    assert_eq!(vertex[0], 2.0 * spacing.x);
    assert_eq!(vertex[1], field.raw_height(6, 3));
    assert_eq!(vertex[2], 3.0 * spacing.z);
    assert_eq!(geometry.positions[0], [0.0, field.raw_height(4, 0), 0.0]);
}

#[test]
fn positions_scale_with_spacing() {
    let field = flat_field(1, 4, Vec3::new(2.0, 1.0, 3.0));
    let geometry = PatchMesher::new(&field, 4).build(UVec2::ZERO);
    let last = *geometry.positions.last().unwrap();
    assert_eq!(last[0], 8.0, "far corner x");
    assert_eq!(last[2], 12.0, "far corner z");
}

#[test]
fn uvs_span_whole_field_with_v_flipped() {
    let field = flat_field(2, 4, Vec3::ONE);
    let mesher = PatchMesher::new(&field, 4);

    let first = mesher.build(UVec2::ZERO);
    assert_eq!(first.uvs[0], [0.0, 1.0]);

    // Vertex (4, 4) of patch (1, 1) is field sample (8, 8) of a 9×9 field
    let last = mesher.build(UVec2::ONE);
    let uv = last.uvs[4 * 5 + 4];
    assert!((uv[0] - 8.0 / 9.0).abs() < 1e-6);
    assert!((uv[1] - (1.0 - 8.0 / 9.0)).abs() < 1e-6);
}

#[test]
fn normals_come_from_height_field() {
    let field = ramp_field(2, 4);
    let geometry = PatchMesher::new(&field, 4).build(UVec2::new(0, 1));
    for z1 in 0..=4 {
        for x1 in 0..=4 {
            let expected = field.normal(x1, 4 + z1);
            assert_eq!(geometry.normals[(z1 * 5 + x1) as usize], expected.to_array());
        }
    }
}

#[test]
fn tangents_are_orthogonal_to_normals() {
    let field = ramp_field(1, 8);
    let geometry = PatchMesher::new(&field, 8).build(UVec2::ZERO);
    for (normal, tangent) in geometry.normals.iter().zip(&geometry.tangents) {
        let n = Vec3::from(*normal);
        let t = Vec3::new(tangent[0], tangent[1], tangent[2]);
        assert!(n.dot(t).abs() < 1e-5, "tangent {t:?} not orthogonal to {n:?}");
        assert!((t.length() - 1.0).abs() < 1e-5);
        assert!(t.x > 0.0);
        assert_eq!(tangent[3], 1.0);
    }
}

#[test]
fn mesh_tangents_are_float4() {
    let field = flat_field(1, 4, Vec3::ONE);
    let mesh = PatchMesher::new(&field, 4)
        .build(UVec2::ZERO)
        .into_mesh(&PatchIndices::new(4));
    match mesh.attribute(Mesh::ATTRIBUTE_TANGENT) {
        Some(VertexAttributeValues::Float32x4(tangents)) => {
            assert!(tangents.iter().all(|t| *t == [1.0, 0.0, 0.0, 1.0]));
        }
        other => panic!("unexpected tangent attribute {other:?}"),
    }
}

#[test]
fn bounds_enclose_positions() {
    let field = ramp_field(2, 4);
    let geometry = PatchMesher::new(&field, 4).build(UVec2::new(1, 0));
    let min = Vec3::from(geometry.bounds.min);
    let max = Vec3::from(geometry.bounds.max);

    assert_eq!(min, Vec3::new(0.0, field.raw_height(4, 0), 0.0));
    assert_eq!(max, Vec3::new(4.0, field.raw_height(8, 0), 4.0));
}

#[test]
fn update_writes_existing_mesh() {
    let field = ramp_field(2, 4);
    let mesher = PatchMesher::new(&field, 4);
    let indices = PatchIndices::new(4);
    let mut meshes = Assets::<Mesh>::default();
    let handle = meshes.add(Mesh::new(
        bevy::mesh::PrimitiveTopology::TriangleList,
        default(),
    ));
    let mut patch = TerrainPatch::new(Entity::PLACEHOLDER, UVec2::new(1, 1));

    update_patch_geometry(&mut patch, &mesher, &indices, &handle, &mut meshes).unwrap();

    let mesh = meshes.get(&handle).unwrap();
    assert_eq!(mesh.count_vertices(), 25);
    assert_eq!(mesh.indices().unwrap().len(), indices.len());
    assert_eq!(Vec3::from(patch.bounds().max).x, 4.0);
}

#[test]
fn update_skips_missing_mesh() {
    let field = ramp_field(2, 4);
    let mesher = PatchMesher::new(&field, 4);
    let indices = PatchIndices::new(4);
    let mut meshes = Assets::<Mesh>::default();
    let handle = meshes.add(Mesh::new(
        bevy::mesh::PrimitiveTopology::TriangleList,
        default(),
    ));
    meshes.remove(&handle);
    let mut patch = TerrainPatch::new(Entity::PLACEHOLDER, UVec2::new(1, 1));
    let before = patch.bounds();

    let result = update_patch_geometry(&mut patch, &mesher, &indices, &handle, &mut meshes);

    assert_eq!(result, Err(TerrainError::MeshUnavailable));
    assert!(result.unwrap_err().is_recoverable());
    assert_eq!(patch.bounds(), before);
    assert!(meshes.get(&handle).is_none());
}
