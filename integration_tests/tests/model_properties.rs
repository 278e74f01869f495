mod common;

use std::collections::HashSet;

use bevy::math::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tudey_schema::ConfigReference;
use tudey_sim::geometry::{Coord, Transform2D};
use tudey_sim::model::{
    config_index, elevation, encode_cell, low_bits, AreaEntry, GlobalEntry, Paint, PaintKind,
    PathEntry, PlaceableEntry, TileEntry, MAX_ELEVATION, MIN_ELEVATION,
};
use tudey_sim::{CollisionFlags, Entry, EntryKey, TudeySceneModel};

fn populated_model() -> TudeySceneModel {
    let mut model = common::model("courtyard");
    for x in -2..=2 {
        model.add_entry(Entry::Tile(TileEntry::new(
            Coord::new(x, -2),
            ConfigReference::new("tile/wall"),
        )));
    }
    model.add_entry(Entry::Tile(
        TileEntry::new(Coord::new(4, 4), ConfigReference::new("tile/block"))
            .with_rotation(1)
            .with_elevation(-3),
    ));
    model.add_entry(Entry::Tile(TileEntry::new(
        Coord::new(0, 3),
        ConfigReference::new("tile/water"),
    )));
    model.add_entry(Entry::Placeable(PlaceableEntry {
        id: 0,
        placeable: ConfigReference::new("placeable/crate"),
        transform: Transform2D::new(Vec2::new(-1.5, 1.5), 0.5),
    }));
    model.add_entry(Entry::Path(PathEntry {
        id: 0,
        path: ConfigReference::new("path/loop"),
        vertices: vec![Vec2::new(0.0, 0.0), Vec2::new(3.0, 0.0), Vec2::new(3.0, 2.0)],
    }));
    model.add_entry(Entry::Area(AreaEntry {
        id: 0,
        area: ConfigReference::new("area/pond"),
        vertices: vec![
            Vec2::new(-6.0, -1.0),
            Vec2::new(-4.0, -1.0),
            Vec2::new(-4.0, 1.0),
            Vec2::new(-6.0, 1.0),
        ],
    }));
    model.add_entry(Entry::Global(GlobalEntry {
        id: 0,
        global: ConfigReference::new("global/clock"),
    }));
    model.set_paint(
        1,
        1,
        Some(Paint {
            paint: ConfigReference::new("paint/moss"),
            kind: PaintKind::Edge,
            elevation: 2,
        }),
    );
    model
}

#[test]
fn scene_data_round_trip_preserves_derived_state() {
    let mut original = populated_model();
    let bytes = original.data().expect("encodes").to_vec();

    let mut restored = TudeySceneModel::from_data(&bytes).expect("decodes");
    restored.init(common::configs());

    assert_eq!(restored.name, original.name);
    assert_eq!(restored.entries(), original.entries());
    assert_eq!(restored.collision_shadow(), original.collision_shadow());
    assert_eq!(restored.tile_shadow(), original.tile_shadow());
    assert_eq!(restored.tag_index(), original.tag_index());
    assert_eq!(restored.get_paint(1, 1), original.get_paint(1, 1));
    assert_eq!(restored.data().expect("re-encodes"), bytes.as_slice());
}

#[test]
fn reinitializing_rebuilds_identical_shadows() {
    let mut model = populated_model();
    let collision = model.collision_shadow().clone();
    let tiles = model.tile_shadow().clone();
    let tags = model.tag_index().clone();

    model.init(common::configs());

    assert_eq!(model.collision_shadow(), &collision);
    assert_eq!(model.tile_shadow(), &tiles);
    assert_eq!(model.tag_index(), &tags);
}

#[test]
fn rotated_tile_shadows_its_swapped_footprint() {
    let model = populated_model();
    let origin = Coord::new(4, 4);
    let covered: Vec<Coord> = (4..=6)
        .flat_map(|x| (4..=5).map(move |y| Coord::new(x, y)))
        .collect();
    for cell in &covered {
        assert_eq!(model.tile_shadow().get(cell), Some(&origin), "{cell}");
        assert!(model
            .get_collision_flags(cell.x, cell.y)
            .contains(CollisionFlags::from_bits_retain(1)));
    }
    assert!(model.get_tile_entry(4, 6).is_none());
    assert!(model.get_tile_entry(7, 4).is_none());
    let block = model.get_tile_entry(6, 5).expect("block covers (6, 5)");
    assert_eq!(block.rotation, 1);
    assert_eq!(block.elevation, -3);
}

#[test]
fn arbitrary_rotations_leave_no_shadow_behind() {
    let mut model = common::model("spin");
    let mut rng = ChaCha8Rng::seed_from_u64(23);
    let rotations = [-7, -3, -2, -1, 4, 5, i32::MIN, i32::MAX]
        .into_iter()
        .chain((0..24).map(|_| rng.gen::<i32>()));
    for rotation in rotations {
        let key = model
            .add_entry(Entry::Tile(
                TileEntry::new(Coord::new(2, 2), ConfigReference::new("tile/block"))
                    .with_rotation(rotation),
            ))
            .expect("block added");
        let (width, height) = if rotation & 1 == 1 { (3, 2) } else { (2, 3) };
        assert_eq!(model.tile_shadow().len(), width * height, "rotation {rotation}");
        assert!(model.get_tile_entry(1 + width as i32, 1 + height as i32).is_some());
        assert_eq!(
            model.get_tile_entry(2, 2).map(|tile| tile.rotation),
            Some(rotation & 3)
        );

        assert!(model.remove_entry(key).is_some());
        assert!(model.tile_shadow().is_empty(), "rotation {rotation}");
        assert!(model.collision_shadow().is_empty(), "rotation {rotation}");
    }
}

#[test]
fn collision_flags_track_tile_changes() {
    let mut model = common::model("flags");
    assert!(model.get_collision_flags(0, 0).is_empty());

    let key = model
        .add_entry(Entry::Tile(TileEntry::new(
            Coord::new(0, 0),
            ConfigReference::new("tile/wall"),
        )))
        .expect("wall added");
    assert_eq!(key, EntryKey::Coord(Coord::new(0, 0)));
    assert_eq!(model.get_collision_flags(0, 0).bits(), 1);

    // A second tile over an occupied cell is rejected.
    assert!(model
        .add_entry(Entry::Tile(TileEntry::new(
            Coord::new(0, 0),
            ConfigReference::new("tile/water"),
        )))
        .is_none());
    assert_eq!(model.get_collision_flags(0, 0).bits(), 1);

    model.remove_entry(key).expect("wall removed");
    assert!(model.get_collision_flags(0, 0).is_empty());
    assert!(model.collision_shadow().is_empty());
    assert!(model.tile_shadow().is_empty());
}

#[test]
fn entry_ids_stay_unique_across_churn() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut model = common::model("churn");
    let mut live: Vec<EntryKey> = Vec::new();
    let mut issued = HashSet::new();

    for _ in 0..200 {
        if live.is_empty() || rng.gen_bool(0.6) {
            let key = model
                .add_entry(Entry::Global(GlobalEntry {
                    id: 0,
                    global: ConfigReference::new("global/clock"),
                }))
                .expect("global added");
            assert!(issued.insert(key), "id {key} issued twice");
            live.push(key);
        } else {
            let index = rng.gen_range(0..live.len());
            let key = live.swap_remove(index);
            assert!(model.remove_entry(key).is_some());
        }
    }
    let ids: Vec<i32> = model.entries().iter().filter_map(Entry::id).collect();
    let unique: HashSet<i32> = ids.iter().copied().collect();
    assert_eq!(ids.len(), live.len());
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn packed_cells_decode_what_was_encoded() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..500 {
        let index = rng.gen_range(0..=i32::from(u16::MAX));
        let height = rng.gen_range(MIN_ELEVATION..=MAX_ELEVATION);
        let bits = rng.gen_range(0..4);
        let value = encode_cell(index, height, bits);
        assert_eq!(config_index(value), index);
        assert_eq!(elevation(value), height);
        assert_eq!(low_bits(value), bits);
    }
}

#[test]
fn scene_data_header_counts_and_integrity() -> anyhow::Result<()> {
    let mut model = populated_model();
    let mut bytes = model.data()?.to_vec();

    let export = tudey_proto::decode_export(&bytes)?;
    assert_eq!(export.header.name, "courtyard");
    assert_eq!(export.header.entry_count, 4);
    assert_eq!(export.header.tile_count, 7);
    assert_eq!(export.header.paint_count, 1);

    let last = bytes.len() - 1;
    bytes[last] ^= 0x5a;
    assert!(TudeySceneModel::from_data(&bytes).is_err());
    Ok(())
}
