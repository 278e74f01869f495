//! Scene entries: tiles keyed by location, everything else by a scene id.

use std::fmt;

use bevy::math::Vec2;
use tudey_schema::{ConfigReference, HandlerConfig};

use crate::config::ConfigManager;
use crate::geometry::{Coord, Rect, Transform2D};
use crate::shape::Shape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKey {
    Coord(Coord),
    Id(i32),
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKey::Coord(coord) => write!(f, "tile{coord}"),
            EntryKey::Id(id) => write!(f, "entry#{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileEntry {
    pub location: Coord,
    pub tile: ConfigReference,
    /// Quarter turns counter-clockwise.
    pub rotation: i32,
    pub elevation: i32,
}

impl TileEntry {
    pub fn new(location: Coord, tile: ConfigReference) -> Self {
        Self {
            location,
            tile,
            rotation: 0,
            elevation: 0,
        }
    }

    pub fn with_rotation(mut self, rotation: i32) -> Self {
        self.rotation = rotation & 0x3;
        self
    }

    pub fn with_elevation(mut self, elevation: i32) -> Self {
        self.elevation = elevation;
        self
    }

    /// Covered cells as an inclusive range; odd rotations swap the footprint.
    pub fn footprint(&self, configs: &ConfigManager) -> (Coord, Coord) {
        let config = configs.tile(&self.tile);
        let (width, height) = if self.rotation & 1 == 1 {
            (config.height, config.width)
        } else {
            (config.width, config.height)
        };
        (
            self.location,
            Coord::new(
                self.location.x + width.max(1) - 1,
                self.location.y + height.max(1) - 1,
            ),
        )
    }

    pub fn footprint_rect(&self, configs: &ConfigManager) -> Rect {
        let (lo, hi) = self.footprint(configs);
        Rect::new(lo.cell_rect().min, hi.cell_rect().max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceableEntry {
    pub id: i32,
    pub placeable: ConfigReference,
    pub transform: Transform2D,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathEntry {
    pub id: i32,
    pub path: ConfigReference,
    pub vertices: Vec<Vec2>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AreaEntry {
    pub id: i32,
    pub area: ConfigReference,
    pub vertices: Vec<Vec2>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalEntry {
    pub id: i32,
    pub global: ConfigReference,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Tile(TileEntry),
    Placeable(PlaceableEntry),
    Path(PathEntry),
    Area(AreaEntry),
    Global(GlobalEntry),
}

impl Entry {
    pub fn key(&self) -> EntryKey {
        match self {
            Entry::Tile(tile) => EntryKey::Coord(tile.location),
            Entry::Placeable(entry) => EntryKey::Id(entry.id),
            Entry::Path(entry) => EntryKey::Id(entry.id),
            Entry::Area(entry) => EntryKey::Id(entry.id),
            Entry::Global(entry) => EntryKey::Id(entry.id),
        }
    }

    /// Scene id of an id-keyed entry.
    pub fn id(&self) -> Option<i32> {
        match self.key() {
            EntryKey::Id(id) => Some(id),
            EntryKey::Coord(_) => None,
        }
    }

    pub(crate) fn set_id(&mut self, id: i32) {
        match self {
            Entry::Tile(_) => {}
            Entry::Placeable(entry) => entry.id = id,
            Entry::Path(entry) => entry.id = id,
            Entry::Area(entry) => entry.id = id,
            Entry::Global(entry) => entry.id = id,
        }
    }

    pub fn reference(&self) -> &ConfigReference {
        match self {
            Entry::Tile(tile) => &tile.tile,
            Entry::Placeable(entry) => &entry.placeable,
            Entry::Path(entry) => &entry.path,
            Entry::Area(entry) => &entry.area,
            Entry::Global(entry) => &entry.global,
        }
    }

    /// Folds a tile's rotation into quarter turns `0..4`, matching what the
    /// packed cell stores.
    pub(crate) fn normalize_rotation(&mut self) {
        if let Entry::Tile(tile) = self {
            tile.rotation &= 0x3;
        }
    }

    pub(crate) fn reference_mut(&mut self) -> &mut ConfigReference {
        match self {
            Entry::Tile(tile) => &mut tile.tile,
            Entry::Placeable(entry) => &mut entry.placeable,
            Entry::Path(entry) => &mut entry.path,
            Entry::Area(entry) => &mut entry.area,
            Entry::Global(entry) => &mut entry.global,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Entry::Tile(_) => "tile",
            Entry::Placeable(_) => "placeable",
            Entry::Path(_) => "path",
            Entry::Area(_) => "area",
            Entry::Global(_) => "global",
        }
    }

    pub fn tags(&self, configs: &ConfigManager) -> Vec<String> {
        match self {
            Entry::Tile(tile) => configs.tile(&tile.tile).tags.clone(),
            Entry::Placeable(entry) => configs.placeable(&entry.placeable).tags.clone(),
            Entry::Path(entry) => configs.path(&entry.path).tags.clone(),
            Entry::Area(entry) => configs.area(&entry.area).tags.clone(),
            Entry::Global(entry) => configs.global(&entry.global).tags.clone(),
        }
    }

    pub fn handlers(&self, configs: &ConfigManager) -> Vec<HandlerConfig> {
        match self {
            Entry::Tile(_) => Vec::new(),
            Entry::Placeable(entry) => configs.placeable(&entry.placeable).handlers.clone(),
            Entry::Path(entry) => configs.path(&entry.path).handlers.clone(),
            Entry::Area(entry) => configs.area(&entry.area).handlers.clone(),
            Entry::Global(entry) => configs.global(&entry.global).handlers.clone(),
        }
    }

    pub fn collision_flags(&self, configs: &ConfigManager) -> u32 {
        match self {
            Entry::Tile(tile) => configs.tile(&tile.tile).collision_flags,
            Entry::Placeable(entry) => configs.placeable(&entry.placeable).collision_flags,
            Entry::Area(entry) => configs.area(&entry.area).collision_flags,
            Entry::Path(_) | Entry::Global(_) => 0,
        }
    }

    /// World-space shape; globals and shapeless placeables have none.
    pub fn shape(&self, configs: &ConfigManager) -> Option<Shape> {
        match self {
            Entry::Tile(tile) => Some(Shape::quad(&tile.footprint_rect(configs))),
            Entry::Placeable(entry) => configs
                .placeable(&entry.placeable)
                .shape
                .as_ref()
                .map(|shape| Shape::from_config(shape).transformed(&entry.transform)),
            Entry::Path(entry) => match entry.vertices.as_slice() {
                [] => None,
                [single] => Some(Shape::point(*single)),
                [start, end] => Some(Shape::segment(*start, *end)),
                vertices => Some(Shape::compound(
                    vertices
                        .windows(2)
                        .map(|pair| Shape::segment(pair[0], pair[1]))
                        .collect(),
                )),
            },
            Entry::Area(entry) => match entry.vertices.len() {
                0 => None,
                1 => Some(Shape::point(entry.vertices[0])),
                2 => Some(Shape::segment(entry.vertices[0], entry.vertices[1])),
                _ => Some(Shape::polygon(entry.vertices.clone())),
            },
            Entry::Global(_) => None,
        }
    }

    pub fn translation(&self, configs: &ConfigManager) -> Vec2 {
        match self {
            Entry::Tile(tile) => tile.footprint_rect(configs).center(),
            Entry::Placeable(entry) => entry.transform.translation,
            Entry::Path(entry) => entry.vertices.first().copied().unwrap_or(Vec2::ZERO),
            Entry::Area(entry) => centroid(&entry.vertices),
            Entry::Global(_) => Vec2::ZERO,
        }
    }

    pub fn rotation(&self) -> f32 {
        match self {
            Entry::Tile(tile) => tile.rotation as f32 * std::f32::consts::FRAC_PI_2,
            Entry::Placeable(entry) => entry.transform.rotation,
            _ => 0.0,
        }
    }
}

fn centroid(vertices: &[Vec2]) -> Vec2 {
    if vertices.is_empty() {
        return Vec2::ZERO;
    }
    vertices.iter().copied().sum::<Vec2>() / vertices.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> ConfigManager {
        ConfigManager::builtin()
    }

    #[test]
    fn footprint_covers_config_extent() {
        let configs = configs();
        let tile = TileEntry::new(Coord::new(2, 3), ConfigReference::new("tile/pillar"));
        assert_eq!(tile.footprint(&configs), (Coord::new(2, 3), Coord::new(3, 4)));
        let turned = tile.clone().with_rotation(5);
        assert_eq!(turned.rotation, 1);
        let single = TileEntry::new(Coord::new(0, 0), ConfigReference::new("tile/wall"));
        let rect = single.footprint_rect(&configs);
        assert_eq!(rect, Rect::new(Vec2::ZERO, Vec2::ONE));
    }

    #[test]
    fn keys_order_tiles_before_ids() {
        let tile = EntryKey::Coord(Coord::new(100, 100));
        assert!(tile < EntryKey::Id(0));
        assert_eq!(EntryKey::Id(4).to_string(), "entry#4");
    }

    #[test]
    fn path_shape_chains_segments() {
        let configs = configs();
        let path = Entry::Path(PathEntry {
            id: 1,
            path: ConfigReference::new("path/route"),
            vertices: vec![Vec2::ZERO, Vec2::new(4.0, 0.0), Vec2::new(4.0, 4.0)],
        });
        let shape = path.shape(&configs).expect("path has a shape");
        assert_eq!(*shape.bounds(), Rect::new(Vec2::ZERO, Vec2::splat(4.0)));
        assert!(shape.intersects(&Shape::circle(Vec2::new(4.0, 2.0), 0.1)));
        assert_eq!(path.tags(&configs), vec!["route".to_string()]);
    }
}
