mod common;

use std::sync::Arc;

use tudey_sim::{build_scene_app, load_config_manager_from_env, run_tick, SceneMetrics};

#[test]
fn app_runs_with_env_library() {
    common::ensure_test_config();
    let configs = load_config_manager_from_env();
    assert!(configs.find_actor("actor/bell").is_some());

    let manager = tudey_sim::SceneManager::new(
        common::scene_config(),
        Arc::clone(&configs),
        common::model("smoke"),
    );
    let mut app = build_scene_app(manager);
    for _ in 0..3 {
        run_tick(&mut app);
    }
    let metrics = app.world.resource::<SceneMetrics>();
    assert_eq!(metrics.tick, 3);
    assert_eq!(metrics.timestamp, 300);
}
