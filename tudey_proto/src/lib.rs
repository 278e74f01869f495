//! Export format of a Tudey scene model.
//!
//! A [`SceneExport`] is the authoritative wire/disk form of a scene: the
//! header, auxiliary models, every non-tile entry, and the packed tile and
//! paint maps together with their config interning tables. Encoding is
//! bincode; the header carries a content hash so corrupted payloads are
//! rejected on decode.

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::hash::{BuildHasher, Hasher};
use thiserror::Error;

/// Current export layout version.
pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SceneHeader {
    pub format: u32,
    pub scene_id: i32,
    pub name: String,
    pub version: i32,
    pub entry_count: u32,
    pub tile_count: u32,
    pub paint_count: u32,
    pub hash: u64,
}

impl SceneHeader {
    pub fn new(
        scene_id: i32,
        name: impl Into<String>,
        version: i32,
        entry_count: usize,
        tile_count: usize,
        paint_count: usize,
    ) -> Self {
        Self {
            format: EXPORT_VERSION,
            scene_id,
            name: name.into(),
            version,
            entry_count: entry_count as u32,
            tile_count: tile_count as u32,
            paint_count: paint_count as u32,
            hash: 0,
        }
    }
}

impl Default for SceneHeader {
    fn default() -> Self {
        Self::new(0, "", 0, 0, 0, 0)
    }
}

/// Wire form of a config reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ReferenceState {
    pub name: String,
    pub arguments: Vec<(String, String)>,
}

/// One occupied cell of a packed sparse map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackedCell {
    pub x: i32,
    pub y: i32,
    pub value: i32,
}

/// Opaque auxiliary model carried alongside the scene.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuxModelState {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EntryState {
    Placeable {
        id: i32,
        config: ReferenceState,
        translation: [f32; 2],
        rotation: f32,
        scale: f32,
    },
    Path {
        id: i32,
        config: ReferenceState,
        vertices: Vec<[f32; 2]>,
    },
    Area {
        id: i32,
        config: ReferenceState,
        vertices: Vec<[f32; 2]>,
    },
    Global {
        id: i32,
        config: ReferenceState,
    },
}

impl EntryState {
    pub fn id(&self) -> i32 {
        match self {
            EntryState::Placeable { id, .. }
            | EntryState::Path { id, .. }
            | EntryState::Area { id, .. }
            | EntryState::Global { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneExport {
    pub header: SceneHeader,
    pub aux_models: Vec<AuxModelState>,
    pub entries: Vec<EntryState>,
    pub next_entry_id: i32,
    pub tiles: Vec<PackedCell>,
    pub tile_configs: Vec<Option<ReferenceState>>,
    pub paint: Vec<PackedCell>,
    pub paint_configs: Vec<Option<ReferenceState>>,
}

impl SceneExport {
    /// Stamps the content hash into the header.
    pub fn finalize(mut self) -> Self {
        let hash = hash_export(&self);
        self.header.hash = hash;
        self
    }
}

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("failed to encode scene export: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode scene export: {0}")]
    Decode(#[source] bincode::Error),
    #[error("unsupported export format {0}")]
    UnsupportedFormat(u32),
    #[error("scene export hash mismatch (header {expected:#x}, content {actual:#x})")]
    HashMismatch { expected: u64, actual: u64 },
}

pub fn hash_export(export: &SceneExport) -> u64 {
    let mut clone = export.clone();
    clone.header.hash = 0;
    let encoded = bincode::serialize(&clone).expect("scene export serialization for hashing");
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write(&encoded);
    hasher.finish()
}

pub fn encode_export(export: &SceneExport) -> Result<Vec<u8>, ProtoError> {
    bincode::serialize(export).map_err(ProtoError::Encode)
}

/// Decodes and validates an export produced by [`encode_export`].
pub fn decode_export(data: &[u8]) -> Result<SceneExport, ProtoError> {
    let export: SceneExport = bincode::deserialize(data).map_err(ProtoError::Decode)?;
    if export.header.format != EXPORT_VERSION {
        return Err(ProtoError::UnsupportedFormat(export.header.format));
    }
    let actual = hash_export(&export);
    if actual != export.header.hash {
        return Err(ProtoError::HashMismatch {
            expected: export.header.hash,
            actual,
        });
    }
    Ok(export)
}

pub fn encode_export_json(export: &SceneExport) -> serde_json::Result<String> {
    serde_json::to_string(export)
}

pub fn decode_export_json(data: &str) -> serde_json::Result<SceneExport> {
    serde_json::from_str(data)
}
