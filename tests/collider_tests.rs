#![cfg(feature = "physics")]

use bevy::prelude::*;
use bevy_patch_terrain::{HeightField, build_heightfield_collider};

#[test]
fn empty_field_has_no_collider() {
    assert!(build_heightfield_collider(&HeightField::default()).is_none());
}

#[test]
fn built_field_produces_collider() {
    let heights = (0..25).map(|i| (i % 5) as f32).collect();
    let field = HeightField::from_samples(UVec2::new(5, 5), Vec3::ONE, heights).unwrap();
    assert!(build_heightfield_collider(&field).is_some());
}
