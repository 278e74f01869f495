use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::scene::{
    ActorConfig, AreaConfig, EffectConfig, PaintConfig, PathConfig, PlaceableConfig,
    SceneGlobalConfig, TileConfig,
};

/// Named content configs, keyed by the name a [`crate::ConfigReference`] carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLibrary {
    pub tiles: BTreeMap<String, TileConfig>,
    pub paint: BTreeMap<String, PaintConfig>,
    pub placeables: BTreeMap<String, PlaceableConfig>,
    pub paths: BTreeMap<String, PathConfig>,
    pub areas: BTreeMap<String, AreaConfig>,
    pub globals: BTreeMap<String, SceneGlobalConfig>,
    pub actors: BTreeMap<String, ActorConfig>,
    pub effects: BTreeMap<String, EffectConfig>,
}

impl ConfigLibrary {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
            + self.paint.len()
            + self.placeables.len()
            + self.paths.len()
            + self.areas.len()
            + self.globals.len()
            + self.actors.len()
            + self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds every config from `other`, replacing same-named entries.
    pub fn merge(&mut self, other: ConfigLibrary) {
        self.tiles.extend(other.tiles);
        self.paint.extend(other.paint);
        self.placeables.extend(other.placeables);
        self.paths.extend(other.paths);
        self.areas.extend(other.areas);
        self.globals.extend(other.globals);
        self.actors.extend(other.actors);
        self.effects.extend(other.effects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_library_parses() {
        let library = ConfigLibrary::from_json_str(
            r#"{"tiles": {"tile/wall": {"collision_flags": 1}}, "effects": {"effect/spark": {}}}"#,
        )
        .expect("library parses");
        assert_eq!(library.len(), 2);
        assert!(library.actors.is_empty());
    }

    #[test]
    fn merge_replaces_same_names() {
        let mut base = ConfigLibrary::default();
        base.tiles.insert("tile/a".into(), TileConfig::default());
        let mut overlay = ConfigLibrary::default();
        overlay.tiles.insert(
            "tile/a".into(),
            TileConfig {
                collision_flags: 4,
                ..TileConfig::default()
            },
        );
        base.merge(overlay);
        assert_eq!(base.tiles["tile/a"].collision_flags, 4);
    }
}
