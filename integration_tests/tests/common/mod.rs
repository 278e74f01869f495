#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

use tudey_sim::{ConfigManager, SceneConfig, SceneManager, TudeySceneModel};

static INIT: Once = Once::new();

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_configs.json")
}

/// Points the env-driven config loader at the fixture library.
pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_path();

        debug_assert!(
            config_path.exists(),
            "missing test config library at {}",
            config_path.display()
        );

        std::env::set_var("TUDEY_CONFIG_PATH", &config_path);
    });
}

pub fn configs() -> Arc<ConfigManager> {
    Arc::new(ConfigManager::from_file(&fixture_path()).expect("fixture library parses"))
}

/// Settings with a fixed seed and no sleeping during the run.
pub fn scene_config() -> SceneConfig {
    SceneConfig {
        rng_seed: 42,
        sleep_interval: i32::MAX / 2,
        ..SceneConfig::default()
    }
}

pub fn model(name: &str) -> TudeySceneModel {
    let mut model = TudeySceneModel::new(name);
    model.init(configs());
    model
}

pub fn manager(model: TudeySceneModel) -> SceneManager {
    SceneManager::new(scene_config(), configs(), model)
}
