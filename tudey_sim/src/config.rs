//! Scene manager settings and content config resolution.
//!
//! [`SceneConfig`] is loaded from `scene_config.json` (env override
//! `TUDEY_SCENE_CONFIG_PATH`); the [`ConfigManager`] resolves config
//! references against a [`ConfigLibrary`] loaded from `config_library.json`
//! (env override `TUDEY_CONFIG_PATH`).

use std::{
    collections::BTreeMap,
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tudey_schema::{
    ActorConfig, AreaConfig, ConfigLibrary, ConfigReference, EffectConfig, PaintConfig,
    PathConfig, PlaceableConfig, SceneGlobalConfig, TileConfig,
};

pub const BUILTIN_SCENE_CONFIG: &str = include_str!("data/scene_config.json");
pub const BUILTIN_CONFIG_LIBRARY: &str = include_str!("data/config_library.json");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Scene manager settings.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub ticks_per_second: u32,
    /// Milliseconds an unobserved mobile actor keeps ticking before it sleeps.
    pub sleep_interval: i32,
    pub space_granularity: f32,
    pub space_levels: u32,
    pub sensor_granularity: f32,
    /// Ring radius, in cells, of the spawn point search.
    pub max_adjustment_distance: i32,
    /// Upper bound on expanded cells per path search.
    pub max_path_length: usize,
    /// Zero derives the seed from the scene name.
    pub rng_seed: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: 10,
            sleep_interval: 5_000,
            space_granularity: 64.0,
            space_levels: 6,
            sensor_granularity: 64.0,
            max_adjustment_distance: 10,
            max_path_length: 4_096,
            rng_seed: 0,
        }
    }
}

impl SceneConfig {
    pub fn builtin() -> Self {
        serde_json::from_str(BUILTIN_SCENE_CONFIG).expect("builtin scene config should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = read_config_file(path)?;
        Ok(Self::from_json_str(&contents)?)
    }

    /// Milliseconds per tick, never less than one. Rates above 1000 ticks
    /// per second run at one tick per millisecond.
    pub fn tick_interval(&self) -> i32 {
        1_000 / self.ticks_per_second.clamp(1, 1_000) as i32
    }
}

/// Loads the scene config from `TUDEY_SCENE_CONFIG_PATH`, falling back to the
/// builtin copy. Returns the file path when one was used.
pub fn load_scene_config_from_env() -> (SceneConfig, Option<PathBuf>) {
    if let Some(path) = env::var("TUDEY_SCENE_CONFIG_PATH").ok().map(PathBuf::from) {
        match SceneConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "tudey::config",
                    path = %path.display(),
                    "scene_config.loaded=file"
                );
                return (config, Some(path));
            }
            Err(err) => {
                tracing::warn!(
                    target: "tudey::config",
                    path = %path.display(),
                    error = %err,
                    "scene_config.load_failed"
                );
            }
        }
    }
    tracing::info!(target: "tudey::config", "scene_config.loaded=builtin");
    (SceneConfig::builtin(), None)
}

/// Named configs of one kind plus the sentinel handed out on a miss.
#[derive(Debug)]
struct ConfigGroup<T> {
    kind: &'static str,
    named: BTreeMap<String, Arc<T>>,
    null: Arc<T>,
}

impl<T: Default> ConfigGroup<T> {
    fn new(kind: &'static str, configs: BTreeMap<String, T>) -> Self {
        Self {
            kind,
            named: configs
                .into_iter()
                .map(|(name, config)| (name, Arc::new(config)))
                .collect(),
            null: Arc::new(T::default()),
        }
    }

    /// Looks up by name. Arguments distinguish references for interning and
    /// equality only; every argument set of a name shares one config.
    fn resolve(&self, reference: &ConfigReference) -> Arc<T> {
        match self.named.get(reference.name()) {
            Some(config) => Arc::clone(config),
            None => {
                tracing::warn!(
                    target: "tudey::config",
                    kind = self.kind,
                    name = %reference.name(),
                    "config.resolve_failed=missing"
                );
                Arc::clone(&self.null)
            }
        }
    }

    fn get(&self, name: &str) -> Option<Arc<T>> {
        self.named.get(name).cloned()
    }

    fn is_null(&self, config: &Arc<T>) -> bool {
        Arc::ptr_eq(config, &self.null)
    }
}

/// Resolves config references to shared, typed configs.
///
/// Lookups never fail: an unknown name logs a warning and yields the kind's
/// null config, so call sites can use the result unconditionally.
/// Reference arguments do not select or parameterize configs.
#[derive(Debug)]
pub struct ConfigManager {
    tiles: ConfigGroup<TileConfig>,
    paint: ConfigGroup<PaintConfig>,
    placeables: ConfigGroup<PlaceableConfig>,
    paths: ConfigGroup<PathConfig>,
    areas: ConfigGroup<AreaConfig>,
    globals: ConfigGroup<SceneGlobalConfig>,
    actors: ConfigGroup<ActorConfig>,
    effects: ConfigGroup<EffectConfig>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::from_library(ConfigLibrary::default())
    }
}

impl ConfigManager {
    pub fn from_library(library: ConfigLibrary) -> Self {
        Self {
            tiles: ConfigGroup::new("tile", library.tiles),
            paint: ConfigGroup::new("paint", library.paint),
            placeables: ConfigGroup::new("placeable", library.placeables),
            paths: ConfigGroup::new("path", library.paths),
            areas: ConfigGroup::new("area", library.areas),
            globals: ConfigGroup::new("global", library.globals),
            actors: ConfigGroup::new("actor", library.actors),
            effects: ConfigGroup::new("effect", library.effects),
        }
    }

    pub fn builtin() -> Self {
        Self::from_library(
            ConfigLibrary::from_json_str(BUILTIN_CONFIG_LIBRARY)
                .expect("builtin config library should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_library(ConfigLibrary::from_json_str(json)?))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = read_config_file(path)?;
        Ok(Self::from_json_str(&contents)?)
    }

    pub fn tile(&self, reference: &ConfigReference) -> Arc<TileConfig> {
        self.tiles.resolve(reference)
    }

    pub fn paint(&self, reference: &ConfigReference) -> Arc<PaintConfig> {
        self.paint.resolve(reference)
    }

    pub fn placeable(&self, reference: &ConfigReference) -> Arc<PlaceableConfig> {
        self.placeables.resolve(reference)
    }

    pub fn path(&self, reference: &ConfigReference) -> Arc<PathConfig> {
        self.paths.resolve(reference)
    }

    pub fn area(&self, reference: &ConfigReference) -> Arc<AreaConfig> {
        self.areas.resolve(reference)
    }

    pub fn global(&self, reference: &ConfigReference) -> Arc<SceneGlobalConfig> {
        self.globals.resolve(reference)
    }

    pub fn actor(&self, reference: &ConfigReference) -> Arc<ActorConfig> {
        self.actors.resolve(reference)
    }

    pub fn effect(&self, reference: &ConfigReference) -> Arc<EffectConfig> {
        self.effects.resolve(reference)
    }

    /// Actor lookup without the miss warning.
    pub fn find_actor(&self, name: &str) -> Option<Arc<ActorConfig>> {
        self.actors.get(name)
    }

    pub fn is_null_actor(&self, config: &Arc<ActorConfig>) -> bool {
        self.actors.is_null(config)
    }

    pub fn is_null_effect(&self, config: &Arc<EffectConfig>) -> bool {
        self.effects.is_null(config)
    }
}

/// Loads the config library from `TUDEY_CONFIG_PATH`, falling back to the
/// builtin library.
pub fn load_config_manager_from_env() -> Arc<ConfigManager> {
    if let Some(path) = env::var("TUDEY_CONFIG_PATH").ok().map(PathBuf::from) {
        match ConfigManager::from_file(&path) {
            Ok(manager) => {
                tracing::info!(
                    target: "tudey::config",
                    path = %path.display(),
                    "config_library.loaded=file"
                );
                return Arc::new(manager);
            }
            Err(err) => {
                tracing::warn!(
                    target: "tudey::config",
                    path = %path.display(),
                    error = %err,
                    "config_library.load_failed"
                );
            }
        }
    }
    tracing::info!(target: "tudey::config", "config_library.loaded=builtin");
    Arc::new(ConfigManager::builtin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_scene_config_parses() {
        let config = SceneConfig::builtin();
        assert_eq!(config.ticks_per_second, 10);
        assert_eq!(config.tick_interval(), 100);
    }

    #[test]
    fn partial_scene_config_uses_defaults() {
        let config = SceneConfig::from_json_str(r#"{"ticks_per_second": 20}"#).expect("parses");
        assert_eq!(config.tick_interval(), 50);
        assert_eq!(config.sleep_interval, SceneConfig::default().sleep_interval);
    }

    #[test]
    fn fast_tick_rates_keep_the_clock_moving() {
        for ticks_per_second in [0, 1_000, 1_001, 5_000, u32::MAX] {
            let config = SceneConfig {
                ticks_per_second,
                ..SceneConfig::default()
            };
            assert!(config.tick_interval() >= 1, "{ticks_per_second}");
        }
        let config = SceneConfig {
            ticks_per_second: 0,
            ..SceneConfig::default()
        };
        assert_eq!(config.tick_interval(), 1_000);
    }

    #[test]
    fn reference_arguments_share_the_named_config() {
        let manager = ConfigManager::builtin();
        let plain = manager.tile(&ConfigReference::new("tile/wall"));
        let argued = manager.tile(&ConfigReference::with_arguments(
            "tile/wall",
            [("variant".to_string(), "mossy".to_string())],
        ));
        assert!(Arc::ptr_eq(&plain, &argued));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SceneConfig::from_file(Path::new("/nonexistent/scene_config.json"))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn missing_reference_resolves_to_shared_null() {
        let manager = ConfigManager::builtin();
        let a = manager.actor(&ConfigReference::new("actor/does-not-exist"));
        let b = manager.actor(&ConfigReference::new("actor/also-missing"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(manager.is_null_actor(&a));
        assert_eq!(*a, ActorConfig::default());
    }

    #[test]
    fn builtin_library_resolves_wall() {
        let manager = ConfigManager::builtin();
        let wall = manager.tile(&ConfigReference::new("tile/wall"));
        assert_ne!(wall.collision_flags, 0);
    }
}
