//! Authoritative scene state: tiles, paint and entries.
//!
//! Tiles and paint live in sparse maps of packed cell values whose config
//! indices point into reference-counted interning tables. Everything else is
//! an id-keyed [`Entry`]. Derived state (the tile-coordinate and
//! collision-flag shadows, the entry space and the tag index) is updated on
//! every mutation and rebuilt wholesale by [`TudeySceneModel::init`].

mod encoding;
mod entry;
mod export;
mod interner;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use bevy::math::Vec2;
use bitflags::bitflags;
use thiserror::Error;
use tudey_proto::ProtoError;
use tudey_schema::ConfigReference;

use crate::config::ConfigManager;
use crate::geometry::{cell_range, Coord, Rect};
use crate::shape::Shape;
use crate::space::{ElementId, HashSpace, Space, SpaceElement};

pub use encoding::{
    config_index, elevation, encode_cell, low_bits, InterningTable, MAX_ELEVATION, MIN_ELEVATION,
};
pub use entry::{AreaEntry, Entry, EntryKey, GlobalEntry, PathEntry, PlaceableEntry, TileEntry};
pub use interner::ReferenceInterner;

bitflags! {
    /// Per-cell and per-entry collision categories, matched against masks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CollisionFlags: u32 {
        const SOLID = 1 << 0;
        const WATER = 1 << 1;
        const PIT = 1 << 2;
    }
}

/// Anything carrying a collision mask.
pub trait Collider {
    fn collision_mask(&self) -> u32;
}

impl Collider for u32 {
    fn collision_mask(&self) -> u32 {
        *self
    }
}

impl Collider for CollisionFlags {
    fn collision_mask(&self) -> u32 {
        self.bits()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaintKind {
    Floor = 0,
    Edge = 1,
    Wall = 2,
}

impl PaintKind {
    pub fn from_bits(bits: i32) -> Option<Self> {
        match bits {
            0 => Some(PaintKind::Floor),
            1 => Some(PaintKind::Edge),
            2 => Some(PaintKind::Wall),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paint {
    pub paint: ConfigReference,
    pub kind: PaintKind,
    pub elevation: i32,
}

/// Opaque named blob carried through export/import untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxModel {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum SceneDataError {
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error("packed cell {location} references empty config slot {index}")]
    MissingConfig { location: Coord, index: i32 },
    #[error("duplicate entry id {0} in scene data")]
    DuplicateEntry(i32),
}

/// Receives entry changes in registration order.
pub trait SceneObserver: Send + Sync {
    fn entry_added(&mut self, _entry: &Entry) {}
    fn entry_updated(&mut self, _old: &Entry, _new: &Entry) {}
    fn entry_removed(&mut self, _entry: &Entry) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u32);

/// Payload of the model's space elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryElement {
    pub key: EntryKey,
    pub flags: CollisionFlags,
}

const MODEL_SPACE_GRANULARITY: f32 = 64.0;
const MODEL_SPACE_LEVELS: u32 = 6;

enum Rejection {
    DuplicateKey,
    Overlap(Coord),
}

pub struct TudeySceneModel {
    pub scene_id: i32,
    pub name: String,
    pub version: i32,
    aux_models: Vec<AuxModel>,
    tiles: BTreeMap<Coord, i32>,
    tile_configs: InterningTable,
    paint: BTreeMap<Coord, i32>,
    paint_configs: InterningTable,
    entries: BTreeMap<i32, Entry>,
    next_entry_id: i32,
    configs: Arc<ConfigManager>,
    interner: ReferenceInterner,
    tile_coords: HashMap<Coord, Coord>,
    collision_flags: HashMap<Coord, CollisionFlags>,
    space: HashSpace<EntryElement>,
    elements: HashMap<i32, ElementId>,
    tagged: BTreeMap<String, BTreeSet<EntryKey>>,
    data: Option<Vec<u8>>,
    observers: Vec<(ObserverId, Box<dyn SceneObserver>)>,
    next_observer: u32,
}

impl std::fmt::Debug for TudeySceneModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TudeySceneModel")
            .field("scene_id", &self.scene_id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("tiles", &self.tiles.len())
            .field("paint", &self.paint.len())
            .field("entries", &self.entries.len())
            .field("next_entry_id", &self.next_entry_id)
            .finish()
    }
}

impl Default for TudeySceneModel {
    fn default() -> Self {
        Self::new("")
    }
}

impl Clone for TudeySceneModel {
    /// Copies persistent state, then re-canonicalizes references and rebuilds
    /// the derived structures. Observers are not copied.
    fn clone(&self) -> Self {
        let mut copy = Self {
            scene_id: self.scene_id,
            name: self.name.clone(),
            version: self.version,
            aux_models: self.aux_models.clone(),
            tiles: self.tiles.clone(),
            tile_configs: self.tile_configs.clone(),
            paint: self.paint.clone(),
            paint_configs: self.paint_configs.clone(),
            entries: self.entries.clone(),
            next_entry_id: self.next_entry_id,
            ..Self::new("")
        };
        copy.init(Arc::clone(&self.configs));
        copy.data = self.data.clone();
        copy
    }
}

impl TudeySceneModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scene_id: 0,
            name: name.into(),
            version: 0,
            aux_models: Vec::new(),
            tiles: BTreeMap::new(),
            tile_configs: InterningTable::default(),
            paint: BTreeMap::new(),
            paint_configs: InterningTable::default(),
            entries: BTreeMap::new(),
            next_entry_id: 1,
            configs: Arc::new(ConfigManager::default()),
            interner: ReferenceInterner::default(),
            tile_coords: HashMap::new(),
            collision_flags: HashMap::new(),
            space: HashSpace::new(MODEL_SPACE_GRANULARITY, MODEL_SPACE_LEVELS),
            elements: HashMap::new(),
            tagged: BTreeMap::new(),
            data: None,
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    /// Binds the config manager and rebuilds every derived structure from
    /// the persisted tiles and entries.
    pub fn init(&mut self, configs: Arc<ConfigManager>) {
        self.configs = configs;
        self.interner = ReferenceInterner::default();
        let interner = &mut self.interner;
        self.tile_configs
            .map_references(|reference| interner.canonicalize(reference));
        self.paint_configs
            .map_references(|reference| interner.canonicalize(reference));
        for entry in self.entries.values_mut() {
            let canonical = interner.canonicalize(entry.reference());
            *entry.reference_mut() = canonical;
        }

        self.tile_coords.clear();
        self.collision_flags.clear();
        self.tagged.clear();
        self.elements.clear();
        self.space = HashSpace::new(MODEL_SPACE_GRANULARITY, MODEL_SPACE_LEVELS);

        let tiles: Vec<(Coord, i32)> = self.tiles.iter().map(|(c, v)| (*c, *v)).collect();
        for (location, value) in tiles {
            let Some(tile) = self.decode_tile(location, value) else {
                continue;
            };
            if let Some(occupied) = self.first_occupied(&tile) {
                tracing::warn!(
                    target: "tudey::model",
                    location = %location,
                    occupied = %occupied,
                    "tile.shadow_conflict"
                );
            }
            self.add_tile_shadow(&tile);
            self.add_tags(&Entry::Tile(tile));
        }
        let entries: Vec<Entry> = self.entries.values().cloned().collect();
        for entry in &entries {
            self.add_entry_element(entry);
            self.add_tags(entry);
        }
        tracing::debug!(
            target: "tudey::model",
            scene = %self.name,
            tiles = self.tiles.len(),
            entries = self.entries.len(),
            "model.initialized"
        );
    }

    pub fn configs(&self) -> &Arc<ConfigManager> {
        &self.configs
    }

    pub fn aux_models(&self) -> &[AuxModel] {
        &self.aux_models
    }

    pub fn add_aux_model(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.aux_models.push(AuxModel {
            name: name.into(),
            data,
        });
        self.invalidate();
    }

    pub fn next_entry_id(&self) -> i32 {
        self.next_entry_id
    }

    /// Adds an entry, assigning a fresh id to id-keyed entries.
    pub fn add_entry(&mut self, entry: Entry) -> Option<EntryKey> {
        self.add_entry_with(entry, true)
    }

    /// Adds an entry. With `assign_id` false the entry keeps its id, and the
    /// id counter moves past it. Returns `None` (leaving the model unchanged)
    /// when the key or a tile footprint is already taken.
    pub fn add_entry_with(&mut self, mut entry: Entry, assign_id: bool) -> Option<EntryKey> {
        if assign_id && entry.id().is_some() {
            entry.set_id(self.next_entry_id);
        }
        entry.normalize_rotation();
        *entry.reference_mut() = self.interner.canonicalize(entry.reference());
        match self.insert_entry(&entry) {
            Ok(key) => {
                if let EntryKey::Id(id) = key {
                    self.next_entry_id = self.next_entry_id.max(id.saturating_add(1));
                }
                self.invalidate();
                for (_, observer) in self.observers.iter_mut() {
                    observer.entry_added(&entry);
                }
                Some(key)
            }
            Err(rejection) => {
                self.log_rejection(&entry, rejection);
                None
            }
        }
    }

    /// Replaces the entry with the same key, returning the previous one.
    pub fn update_entry(&mut self, mut entry: Entry) -> Option<Entry> {
        let key = entry.key();
        let Some(old) = self.take_entry(key) else {
            tracing::warn!(target: "tudey::model", key = %key, "entry.update_failed=missing");
            return None;
        };
        entry.normalize_rotation();
        *entry.reference_mut() = self.interner.canonicalize(entry.reference());
        if let Err(rejection) = self.insert_entry(&entry) {
            self.log_rejection(&entry, rejection);
            if self.insert_entry(&old).is_err() {
                tracing::warn!(target: "tudey::model", key = %key, "entry.restore_failed");
            }
            return None;
        }
        self.invalidate();
        for (_, observer) in self.observers.iter_mut() {
            observer.entry_updated(&old, &entry);
        }
        Some(old)
    }

    pub fn remove_entry(&mut self, key: EntryKey) -> Option<Entry> {
        let Some(old) = self.take_entry(key) else {
            tracing::warn!(target: "tudey::model", key = %key, "entry.remove_failed=missing");
            return None;
        };
        self.invalidate();
        for (_, observer) in self.observers.iter_mut() {
            observer.entry_removed(&old);
        }
        Some(old)
    }

    fn log_rejection(&self, entry: &Entry, rejection: Rejection) {
        match rejection {
            Rejection::DuplicateKey => tracing::warn!(
                target: "tudey::model",
                key = %entry.key(),
                kind = entry.kind_name(),
                "entry.add_rejected=duplicate"
            ),
            Rejection::Overlap(occupied) => tracing::warn!(
                target: "tudey::model",
                key = %entry.key(),
                occupied = %occupied,
                "entry.add_rejected=overlap"
            ),
        }
    }

    fn insert_entry(&mut self, entry: &Entry) -> Result<EntryKey, Rejection> {
        match entry {
            Entry::Tile(tile) => {
                if self.tiles.contains_key(&tile.location) {
                    return Err(Rejection::DuplicateKey);
                }
                if let Some(occupied) = self.first_occupied(tile) {
                    return Err(Rejection::Overlap(occupied));
                }
                let index = self.tile_configs.acquire(&tile.tile);
                self.tiles.insert(
                    tile.location,
                    encode_cell(index, tile.elevation, tile.rotation),
                );
                self.add_tile_shadow(tile);
            }
            other => {
                let id = other.id().unwrap_or_default();
                if self.entries.contains_key(&id) {
                    return Err(Rejection::DuplicateKey);
                }
                self.entries.insert(id, other.clone());
                self.add_entry_element(other);
            }
        }
        self.add_tags(entry);
        Ok(entry.key())
    }

    fn take_entry(&mut self, key: EntryKey) -> Option<Entry> {
        let entry = match key {
            EntryKey::Coord(location) => {
                let value = self.tiles.remove(&location)?;
                let index = config_index(value);
                let Some(tile) = self.decode_tile(location, value) else {
                    let orphaned: Vec<Coord> = self
                        .tile_coords
                        .iter()
                        .filter(|(_, origin)| **origin == location)
                        .map(|(cell, _)| *cell)
                        .collect();
                    for cell in orphaned {
                        self.tile_coords.remove(&cell);
                        self.collision_flags.remove(&cell);
                    }
                    self.invalidate();
                    tracing::warn!(
                        target: "tudey::model",
                        location = %location,
                        index,
                        "tile.repaired=dropped_undecodable"
                    );
                    return None;
                };
                self.tile_configs.release(index);
                self.remove_tile_shadow(&tile);
                Entry::Tile(tile)
            }
            EntryKey::Id(id) => {
                let entry = self.entries.remove(&id)?;
                if let Some(element) = self.elements.remove(&id) {
                    self.space.remove(element);
                }
                entry
            }
        };
        self.remove_tags(&entry);
        Some(entry)
    }

    fn decode_tile(&self, location: Coord, value: i32) -> Option<TileEntry> {
        let index = config_index(value);
        let Some(reference) = self.tile_configs.get(index) else {
            tracing::warn!(
                target: "tudey::model",
                location = %location,
                index,
                "tile.decode_failed=missing_config"
            );
            return None;
        };
        Some(TileEntry {
            location,
            tile: reference.clone(),
            rotation: low_bits(value),
            elevation: elevation(value),
        })
    }

    fn first_occupied(&self, tile: &TileEntry) -> Option<Coord> {
        let (lo, hi) = tile.footprint(&self.configs);
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                let cell = Coord::new(x, y);
                if self.tile_coords.contains_key(&cell) {
                    return Some(cell);
                }
            }
        }
        None
    }

    fn add_tile_shadow(&mut self, tile: &TileEntry) {
        let (lo, hi) = tile.footprint(&self.configs);
        let flags = CollisionFlags::from_bits_retain(self.configs.tile(&tile.tile).collision_flags);
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                let cell = Coord::new(x, y);
                self.tile_coords.insert(cell, tile.location);
                if !flags.is_empty() {
                    self.collision_flags.insert(cell, flags);
                }
            }
        }
    }

    fn remove_tile_shadow(&mut self, tile: &TileEntry) {
        let (lo, hi) = tile.footprint(&self.configs);
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                let cell = Coord::new(x, y);
                if self.tile_coords.get(&cell) == Some(&tile.location) {
                    self.tile_coords.remove(&cell);
                    self.collision_flags.remove(&cell);
                }
            }
        }
    }

    fn add_entry_element(&mut self, entry: &Entry) {
        let Some(id) = entry.id() else {
            return;
        };
        let Some(shape) = entry.shape(&self.configs) else {
            return;
        };
        let element = EntryElement {
            key: entry.key(),
            flags: CollisionFlags::from_bits_retain(entry.collision_flags(&self.configs)),
        };
        let element_id = self.space.add(SpaceElement::new(shape, element));
        self.elements.insert(id, element_id);
    }

    fn add_tags(&mut self, entry: &Entry) {
        for tag in entry.tags(&self.configs) {
            self.tagged.entry(tag).or_default().insert(entry.key());
        }
    }

    fn remove_tags(&mut self, entry: &Entry) {
        let key = entry.key();
        for tag in entry.tags(&self.configs) {
            if let Some(keys) = self.tagged.get_mut(&tag) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.tagged.remove(&tag);
                }
            }
        }
    }

    /// Clears the cached export bytes.
    pub fn invalidate(&mut self) {
        self.data = None;
    }

    pub fn has_cached_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn get_entry(&self, key: EntryKey) -> Option<Entry> {
        match key {
            EntryKey::Coord(location) => {
                let value = self.tiles.get(&location)?;
                self.decode_tile(location, *value).map(Entry::Tile)
            }
            EntryKey::Id(id) => self.entries.get(&id).cloned(),
        }
    }

    /// All entries in key order: tiles first, then id-keyed entries.
    pub fn entries(&self) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self
            .tiles
            .iter()
            .filter_map(|(location, value)| self.decode_tile(*location, *value))
            .map(Entry::Tile)
            .collect();
        entries.extend(self.entries.values().cloned());
        entries
    }

    /// Id-keyed entries in id order.
    pub fn id_entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn entry_count(&self) -> usize {
        self.tiles.len() + self.entries.len()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn get_tagged(&self, tag: &str) -> Vec<EntryKey> {
        self.tagged
            .get(tag)
            .map(|keys| keys.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn tag_index(&self) -> &BTreeMap<String, BTreeSet<EntryKey>> {
        &self.tagged
    }

    pub fn tile_shadow(&self) -> &HashMap<Coord, Coord> {
        &self.tile_coords
    }

    pub fn collision_shadow(&self) -> &HashMap<Coord, CollisionFlags> {
        &self.collision_flags
    }

    pub fn space(&self) -> &HashSpace<EntryElement> {
        &self.space
    }

    /// Tile covering cell `(x, y)`, found through the coordinate shadow.
    pub fn get_tile_entry(&self, x: i32, y: i32) -> Option<TileEntry> {
        let origin = self.tile_coords.get(&Coord::new(x, y))?;
        let Some(value) = self.tiles.get(origin) else {
            tracing::warn!(
                target: "tudey::model",
                cell = %Coord::new(x, y),
                origin = %origin,
                "tile.shadow_corrupt=missing_value"
            );
            return None;
        };
        self.decode_tile(*origin, *value)
    }

    pub fn get_tile_config_index(&self, x: i32, y: i32) -> Option<i32> {
        let origin = self.tile_coords.get(&Coord::new(x, y))?;
        self.tiles.get(origin).map(|value| config_index(*value))
    }

    pub fn get_tile_elevation(&self, x: i32, y: i32) -> Option<i32> {
        let origin = self.tile_coords.get(&Coord::new(x, y))?;
        self.tiles.get(origin).map(|value| elevation(*value))
    }

    pub fn get_collision_flags(&self, x: i32, y: i32) -> CollisionFlags {
        self.collision_flags
            .get(&Coord::new(x, y))
            .copied()
            .unwrap_or_default()
    }

    pub fn tile_configs(&self) -> &InterningTable {
        &self.tile_configs
    }

    pub fn paint_configs(&self) -> &InterningTable {
        &self.paint_configs
    }

    /// Sets or clears the paint at `location`, returning the previous paint.
    pub fn set_paint(&mut self, x: i32, y: i32, paint: Option<Paint>) -> Option<Paint> {
        let location = Coord::new(x, y);
        let previous = self.get_paint(x, y);
        if let Some(value) = self.paint.remove(&location) {
            self.paint_configs.release(config_index(value));
        }
        if let Some(paint) = paint {
            let reference = self.interner.canonicalize(&paint.paint);
            let index = self.paint_configs.acquire(&reference);
            self.paint.insert(
                location,
                encode_cell(index, paint.elevation, paint.kind as i32),
            );
        }
        self.invalidate();
        previous
    }

    pub fn get_paint(&self, x: i32, y: i32) -> Option<Paint> {
        let location = Coord::new(x, y);
        let value = *self.paint.get(&location)?;
        let Some(reference) = self.paint_configs.get(config_index(value)) else {
            tracing::warn!(
                target: "tudey::model",
                location = %location,
                "paint.decode_failed=missing_config"
            );
            return None;
        };
        let kind = PaintKind::from_bits(low_bits(value)).unwrap_or_else(|| {
            tracing::warn!(target: "tudey::model", location = %location, "paint.decode_failed=kind");
            PaintKind::Floor
        });
        Some(Paint {
            paint: reference.clone(),
            kind,
            elevation: elevation(value),
        })
    }

    /// Cells overlapping `rect` that carry tile shadow data, in ascending order.
    fn shadow_cells(&self, rect: &Rect) -> Vec<Coord> {
        if rect.is_empty() {
            return Vec::new();
        }
        let (lo, hi) = cell_range(rect);
        let span = (hi.x as i64 - lo.x as i64 + 1) * (hi.y as i64 - lo.y as i64 + 1);
        let in_range =
            |cell: &Coord| cell.x >= lo.x && cell.x <= hi.x && cell.y >= lo.y && cell.y <= hi.y;
        if span > self.tile_coords.len() as i64 {
            let mut cells: Vec<Coord> = self
                .tile_coords
                .keys()
                .filter(|cell| in_range(*cell))
                .copied()
                .collect();
            cells.sort_unstable();
            return cells;
        }
        let mut cells = Vec::new();
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                let cell = Coord::new(x, y);
                if self.tile_coords.contains_key(&cell) {
                    cells.push(cell);
                }
            }
        }
        cells
    }

    /// Entries whose shapes intersect `shape`: tiles by their cells, the rest
    /// through the entry space.
    pub fn get_entries(&self, shape: &Shape, results: &mut Vec<EntryKey>) {
        let mut seen = HashSet::new();
        let mut quad = Shape::quad(&Rect::new(Vec2::ZERO, Vec2::ONE));
        for cell in self.shadow_cells(shape.bounds()) {
            let Some(origin) = self.tile_coords.get(&cell) else {
                continue;
            };
            if seen.contains(origin) {
                continue;
            }
            quad.set_quad(&cell.cell_rect());
            if shape.intersects(&quad) {
                seen.insert(*origin);
                results.push(EntryKey::Coord(*origin));
            }
        }
        let mut elements = Vec::new();
        self.space.get_intersecting(shape, &mut elements);
        results.extend(
            elements
                .into_iter()
                .filter_map(|id| self.space.element(id).map(|e| e.object().key)),
        );
    }

    /// True when `shape` overlaps a tile cell or entry whose flags meet `mask`.
    pub fn collides(&self, mask: u32, shape: &Shape) -> bool {
        if mask == 0 {
            return false;
        }
        let mut quad = Shape::quad(&Rect::new(Vec2::ZERO, Vec2::ONE));
        for cell in self.shadow_cells(shape.bounds()) {
            let flags = self.get_collision_flags(cell.x, cell.y);
            if flags.bits() & mask == 0 {
                continue;
            }
            quad.set_quad(&cell.cell_rect());
            if shape.intersects(&quad) {
                return true;
            }
        }
        let mut elements = Vec::new();
        self.space.get_intersecting(shape, &mut elements);
        elements.into_iter().any(|id| {
            self.space
                .element(id)
                .is_some_and(|e| e.object().flags.bits() & mask != 0)
        })
    }

    pub fn collides_with(&self, collider: &impl Collider, shape: &Shape) -> bool {
        self.collides(collider.collision_mask(), shape)
    }

    /// Longest penetration of `shape` into colliding tiles or entries.
    /// Translating `shape` by the negated vector resolves the deepest contact.
    pub fn penetration(&self, mask: u32, shape: &Shape) -> Option<Vec2> {
        if mask == 0 {
            return None;
        }
        let mut deepest: Option<Vec2> = None;
        let mut consider = |vector: Vec2| {
            if deepest.map_or(true, |d| vector.length_squared() > d.length_squared()) {
                deepest = Some(vector);
            }
        };
        let mut quad = Shape::quad(&Rect::new(Vec2::ZERO, Vec2::ONE));
        for cell in self.shadow_cells(shape.bounds()) {
            if self.get_collision_flags(cell.x, cell.y).bits() & mask == 0 {
                continue;
            }
            quad.set_quad(&cell.cell_rect());
            if let Some(vector) = quad.penetration(shape) {
                consider(vector);
            }
        }
        let mut elements = Vec::new();
        self.space.get_intersecting(shape, &mut elements);
        for id in elements {
            let Some(element) = self.space.element(id) else {
                continue;
            };
            if element.object().flags.bits() & mask == 0 {
                continue;
            }
            if let Some(vector) = element.world_shape().penetration(shape) {
                consider(vector);
            }
        }
        deepest
    }

    pub fn penetration_with(&self, collider: &impl Collider, shape: &Shape) -> Option<Vec2> {
        self.penetration(collider.collision_mask(), shape)
    }

    pub fn add_observer(&mut self, observer: Box<dyn SceneObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, observer));
        id
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Transform2D;
    use std::sync::Mutex;

    fn model() -> TudeySceneModel {
        let mut model = TudeySceneModel::new("test");
        model.init(Arc::new(ConfigManager::builtin()));
        model
    }

    fn tile(x: i32, y: i32, name: &str) -> Entry {
        Entry::Tile(TileEntry::new(Coord::new(x, y), ConfigReference::new(name)))
    }

    fn crate_at(x: f32, y: f32) -> Entry {
        Entry::Placeable(PlaceableEntry {
            id: 0,
            placeable: ConfigReference::new("placeable/crate"),
            transform: Transform2D::from_translation(Vec2::new(x, y)),
        })
    }

    #[test]
    fn ids_are_never_reused() {
        let mut model = model();
        let a = model.add_entry(crate_at(0.5, 0.5)).expect("added");
        let b = model.add_entry(crate_at(3.5, 0.5)).expect("added");
        assert_eq!((a, b), (EntryKey::Id(1), EntryKey::Id(2)));
        assert!(model.remove_entry(b).is_some());
        let c = model.add_entry(crate_at(5.5, 0.5)).expect("added");
        assert_eq!(c, EntryKey::Id(3));
    }

    #[test]
    fn duplicate_and_overlapping_tiles_are_rejected() {
        let mut model = model();
        assert!(model.add_entry(tile(0, 0, "tile/pillar")).is_some());
        assert!(model.add_entry(tile(0, 0, "tile/floor")).is_none());
        assert!(model.add_entry(tile(1, 1, "tile/floor")).is_none());
        assert!(model.add_entry(tile(2, 0, "tile/floor")).is_some());
        assert_eq!(model.get_tile_entry(1, 1).map(|t| t.location), Some(Coord::new(0, 0)));
        assert_eq!(model.tile_count(), 2);
    }

    #[test]
    fn tile_shadow_tracks_add_and_remove() {
        let mut model = model();
        model.add_entry(tile(4, 4, "tile/wall"));
        assert_eq!(model.get_collision_flags(4, 4), CollisionFlags::SOLID);
        let cover = Shape::circle(Vec2::new(4.5, 4.5), 0.3);
        assert!(model.collides(CollisionFlags::SOLID.bits(), &cover));
        assert!(!model.collides(CollisionFlags::WATER.bits(), &cover));
        model.remove_entry(EntryKey::Coord(Coord::new(4, 4)));
        assert!(!model.collides(CollisionFlags::SOLID.bits(), &cover));
        assert!(model.tile_shadow().is_empty());
        assert!(model.tile_configs().is_empty());
    }

    #[test]
    fn any_rotation_removes_the_cells_it_added() {
        let mut model = model();
        for rotation in [-5, -3, -2, -1, 0, 1, 2, 3, 4, 5, 7, i32::MIN, i32::MAX] {
            let mut bench = TileEntry::new(Coord::new(0, 0), ConfigReference::new("tile/bench"));
            bench.rotation = rotation;
            let key = model.add_entry(Entry::Tile(bench)).expect("bench added");
            let expected = if rotation & 1 == 1 { (0, 2) } else { (2, 0) };
            assert!(model.get_tile_entry(expected.0, expected.1).is_some(), "rotation {rotation}");
            assert_eq!(model.tile_shadow().len(), 3, "rotation {rotation}");
            let stored = model.get_entry(key).expect("stored");
            assert_eq!(stored, {
                let mut folded = TileEntry::new(Coord::new(0, 0), ConfigReference::new("tile/bench"));
                folded.rotation = rotation & 0x3;
                Entry::Tile(folded)
            });
            assert!(model.remove_entry(key).is_some());
            assert!(model.tile_shadow().is_empty(), "rotation {rotation}");
            assert!(model.collision_shadow().is_empty(), "rotation {rotation}");
        }
    }

    #[test]
    fn undecodable_tile_is_dropped_from_cached_data() {
        let mut model = model();
        let key = model.add_entry(tile(0, 0, "tile/wall")).expect("added");
        let value = model.tiles[&Coord::new(0, 0)];
        model.tile_configs.release(config_index(value));
        model.data().expect("encodes");
        assert!(model.has_cached_data());

        assert!(model.remove_entry(key).is_none());
        assert!(!model.has_cached_data());
        assert!(model.tile_shadow().is_empty());
        assert!(model.collision_shadow().is_empty());

        let bytes = model.data().expect("re-encodes").to_vec();
        let restored = TudeySceneModel::from_data(&bytes).expect("decodes");
        assert_eq!(restored.tile_count(), 0);
    }

    #[test]
    fn largest_id_does_not_overflow_counter() {
        let mut model = model();
        let mut entry = crate_at(0.5, 0.5);
        entry.set_id(i32::MAX);
        assert_eq!(model.add_entry_with(entry, false), Some(EntryKey::Id(i32::MAX)));
        assert_eq!(model.next_entry_id(), i32::MAX);
    }

    #[test]
    fn entries_collide_through_space() {
        let mut model = model();
        model.add_entry(crate_at(10.0, 10.0));
        let probe = Shape::circle(Vec2::new(10.6, 10.0), 0.2);
        assert!(model.collides(1, &probe));
        let penetration = model.penetration(1, &probe).expect("overlap");
        assert!((penetration - Vec2::new(-0.1, 0.0)).length() < 1e-4);
        let mut keys = Vec::new();
        model.get_entries(&probe, &mut keys);
        assert_eq!(keys, vec![EntryKey::Id(1)]);
    }

    #[test]
    fn get_entries_dedupes_multi_cell_tiles() {
        let mut model = model();
        model.add_entry(tile(0, 0, "tile/pillar"));
        let mut keys = Vec::new();
        model.get_entries(&Shape::quad(&Rect::new(Vec2::splat(0.2), Vec2::splat(1.8))), &mut keys);
        assert_eq!(keys, vec![EntryKey::Coord(Coord::new(0, 0))]);
    }

    #[test]
    fn tag_index_follows_entries() {
        let mut model = model();
        let key = model.add_entry(crate_at(1.0, 1.0)).expect("added");
        assert_eq!(model.get_tagged("crate"), vec![key]);
        model.remove_entry(key);
        assert!(model.get_tagged("crate").is_empty());
        assert!(model.tag_index().is_empty());
    }

    #[test]
    fn missing_keys_are_no_ops() {
        let mut model = model();
        assert!(model.remove_entry(EntryKey::Id(99)).is_none());
        assert!(model.update_entry(crate_at(0.0, 0.0)).is_none());
        assert_eq!(model.entry_count(), 0);
    }

    #[test]
    fn update_moves_space_element() {
        let mut model = model();
        let key = model.add_entry(crate_at(0.0, 0.0)).expect("added");
        let Some(Entry::Placeable(mut placeable)) = model.get_entry(key) else {
            panic!("placeable expected");
        };
        placeable.transform.translation = Vec2::new(20.0, 0.0);
        assert!(model.update_entry(Entry::Placeable(placeable)).is_some());
        assert!(!model.collides(1, &Shape::point(Vec2::new(0.1, 0.1))));
        assert!(model.collides(1, &Shape::point(Vec2::new(20.1, 0.1))));
    }

    #[test]
    fn references_are_canonicalized() {
        let mut model = model();
        let a = model.add_entry(crate_at(0.0, 0.0)).expect("added");
        let b = model.add_entry(crate_at(5.0, 0.0)).expect("added");
        let (Some(a), Some(b)) = (model.get_entry(a), model.get_entry(b)) else {
            panic!("entries present");
        };
        assert!(a.reference().is_same(b.reference()));
    }

    #[test]
    fn paint_shares_low_bits_with_kind() {
        let mut model = model();
        let paint = Paint {
            paint: ConfigReference::new("paint/cliff"),
            kind: PaintKind::Wall,
            elevation: -5,
        };
        assert!(model.set_paint(-2, 7, Some(paint.clone())).is_none());
        assert_eq!(model.get_paint(-2, 7), Some(paint.clone()));
        assert_eq!(model.set_paint(-2, 7, None), Some(paint));
        assert!(model.paint_configs().is_empty());
    }

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl SceneObserver for Recorder {
        fn entry_added(&mut self, entry: &Entry) {
            self.0.lock().expect("lock").push(format!("added {}", entry.key()));
        }

        fn entry_removed(&mut self, entry: &Entry) {
            self.0.lock().expect("lock").push(format!("removed {}", entry.key()));
        }
    }

    #[test]
    fn observers_see_changes_in_order() {
        let mut model = model();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = model.add_observer(Box::new(Recorder(Arc::clone(&log))));
        let key = model.add_entry(crate_at(0.0, 0.0)).expect("added");
        model.remove_entry(key);
        assert!(model.remove_observer(id));
        model.add_entry(crate_at(0.0, 0.0));
        assert_eq!(
            *log.lock().expect("lock"),
            vec!["added entry#1".to_string(), "removed entry#1".to_string()]
        );
    }

    #[test]
    fn clone_rebuilds_derived_state() {
        let mut model = model();
        model.add_entry(tile(0, 0, "tile/wall"));
        model.add_entry(crate_at(5.0, 5.0));
        let copy = model.clone();
        assert_eq!(copy.collision_shadow(), model.collision_shadow());
        assert_eq!(copy.tile_shadow(), model.tile_shadow());
        assert_eq!(copy.tag_index(), model.tag_index());
        assert!(copy.collides(1, &Shape::point(Vec2::new(5.2, 5.2))));
    }
}
