//! Conversion between [`TudeySceneModel`] and its [`SceneExport`] form.

use std::collections::BTreeMap;

use bevy::math::Vec2;
use tudey_proto::{
    decode_export, encode_export, AuxModelState, EntryState, PackedCell, SceneExport, SceneHeader,
};

use super::encoding::{config_index, reference_from_state, reference_state, InterningTable};
use super::entry::{AreaEntry, Entry, GlobalEntry, PathEntry, PlaceableEntry};
use super::{AuxModel, SceneDataError, TudeySceneModel};
use crate::geometry::{Coord, Transform2D};

fn entry_state(entry: &Entry) -> Option<EntryState> {
    let state = match entry {
        Entry::Tile(_) => return None,
        Entry::Placeable(entry) => EntryState::Placeable {
            id: entry.id,
            config: reference_state(&entry.placeable),
            translation: entry.transform.translation.to_array(),
            rotation: entry.transform.rotation,
            scale: entry.transform.scale,
        },
        Entry::Path(entry) => EntryState::Path {
            id: entry.id,
            config: reference_state(&entry.path),
            vertices: entry.vertices.iter().map(|v| v.to_array()).collect(),
        },
        Entry::Area(entry) => EntryState::Area {
            id: entry.id,
            config: reference_state(&entry.area),
            vertices: entry.vertices.iter().map(|v| v.to_array()).collect(),
        },
        Entry::Global(entry) => EntryState::Global {
            id: entry.id,
            config: reference_state(&entry.global),
        },
    };
    Some(state)
}

fn entry_from_state(state: &EntryState) -> Entry {
    match state {
        EntryState::Placeable {
            id,
            config,
            translation,
            rotation,
            scale,
        } => Entry::Placeable(PlaceableEntry {
            id: *id,
            placeable: reference_from_state(config),
            transform: Transform2D::new(Vec2::from(*translation), *rotation).with_scale(*scale),
        }),
        EntryState::Path {
            id,
            config,
            vertices,
        } => Entry::Path(PathEntry {
            id: *id,
            path: reference_from_state(config),
            vertices: vertices.iter().copied().map(Vec2::from).collect(),
        }),
        EntryState::Area {
            id,
            config,
            vertices,
        } => Entry::Area(AreaEntry {
            id: *id,
            area: reference_from_state(config),
            vertices: vertices.iter().copied().map(Vec2::from).collect(),
        }),
        EntryState::Global { id, config } => Entry::Global(GlobalEntry {
            id: *id,
            global: reference_from_state(config),
        }),
    }
}

fn packed_cells(map: &BTreeMap<Coord, i32>) -> Vec<PackedCell> {
    map.iter()
        .map(|(coord, value)| PackedCell {
            x: coord.x,
            y: coord.y,
            value: *value,
        })
        .collect()
}

/// Rebuilds a sparse map and its table, counting one use per stored cell.
fn restore_cells(
    cells: &[PackedCell],
    states: &[Option<tudey_proto::ReferenceState>],
) -> Result<(BTreeMap<Coord, i32>, InterningTable), SceneDataError> {
    let mut table = InterningTable::from_references(
        states
            .iter()
            .map(|state| state.as_ref().map(reference_from_state))
            .collect(),
    );
    let mut map = BTreeMap::new();
    for cell in cells {
        let location = Coord::new(cell.x, cell.y);
        let index = config_index(cell.value);
        if !table.retain(index) {
            return Err(SceneDataError::MissingConfig { location, index });
        }
        map.insert(location, cell.value);
    }
    table.prune_unused();
    Ok((map, table))
}

impl TudeySceneModel {
    /// Snapshot of the persistent state.
    pub fn export(&self) -> SceneExport {
        let entries: Vec<EntryState> = self.entries.values().filter_map(entry_state).collect();
        SceneExport {
            header: SceneHeader::new(
                self.scene_id,
                self.name.clone(),
                self.version,
                entries.len(),
                self.tiles.len(),
                self.paint.len(),
            ),
            aux_models: self
                .aux_models
                .iter()
                .map(|aux| AuxModelState {
                    name: aux.name.clone(),
                    data: aux.data.clone(),
                })
                .collect(),
            entries,
            next_entry_id: self.next_entry_id,
            tiles: packed_cells(&self.tiles),
            tile_configs: self.tile_configs.to_states(),
            paint: packed_cells(&self.paint),
            paint_configs: self.paint_configs.to_states(),
        }
        .finalize()
    }

    /// Builds an uninitialized model; call [`TudeySceneModel::init`] before
    /// querying it.
    pub fn from_export(export: &SceneExport) -> Result<Self, SceneDataError> {
        let (tiles, tile_configs) = restore_cells(&export.tiles, &export.tile_configs)?;
        let (paint, paint_configs) = restore_cells(&export.paint, &export.paint_configs)?;
        let mut entries = BTreeMap::new();
        let mut next_entry_id = export.next_entry_id.max(1);
        for state in &export.entries {
            let id = state.id();
            if entries.insert(id, entry_from_state(state)).is_some() {
                return Err(SceneDataError::DuplicateEntry(id));
            }
            next_entry_id = next_entry_id.max(id.saturating_add(1));
        }
        let mut model = Self::new(export.header.name.clone());
        model.scene_id = export.header.scene_id;
        model.version = export.header.version;
        model.aux_models = export
            .aux_models
            .iter()
            .map(|aux| AuxModel {
                name: aux.name.clone(),
                data: aux.data.clone(),
            })
            .collect();
        model.tiles = tiles;
        model.tile_configs = tile_configs;
        model.paint = paint;
        model.paint_configs = paint_configs;
        model.entries = entries;
        model.next_entry_id = next_entry_id;
        Ok(model)
    }

    /// Decodes bytes produced by [`TudeySceneModel::data`].
    pub fn from_data(data: &[u8]) -> Result<Self, SceneDataError> {
        let export = decode_export(data)?;
        let mut model = Self::from_export(&export)?;
        model.data = Some(data.to_vec());
        Ok(model)
    }

    /// Encoded export, regenerated after any mutation.
    pub fn data(&mut self) -> Result<&[u8], SceneDataError> {
        let data = match self.data.take() {
            Some(data) => data,
            None => {
                let data = encode_export(&self.export())?;
                tracing::debug!(
                    target: "tudey::model",
                    scene = %self.name,
                    bytes = data.len(),
                    "model.encoded"
                );
                data
            }
        };
        Ok(self.data.insert(data).as_slice())
    }
}
