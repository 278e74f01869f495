//! Server-side simulation core for Tudey scenes.
//!
//! The [`TudeySceneModel`] holds the authoritative tile, paint and entry data;
//! the [`SceneManager`] runs actor and entry logic against it one tick at a
//! time. [`build_scene_app`] wraps a manager in a headless Bevy [`App`] that
//! advances the scene once per [`run_tick`].

pub mod config;
pub mod geometry;
mod hashing;
pub mod logic;
mod manager;
pub mod metrics;
pub mod model;
pub mod pathfinder;
pub mod shape;
pub mod space;

use bevy::prelude::*;

pub use config::{
    load_config_manager_from_env, load_scene_config_from_env, ConfigError, ConfigManager,
    SceneConfig,
};
pub use geometry::{Coord, Ray2D, Rect, Transform2D};
pub use hashing::stable_seed;
pub use manager::{
    ActorElement, BodyTransfer, EffectFired, ManagerCounters, SceneManager, SensorElement,
    ShapeObserver, ShapeObserverId,
};
pub use metrics::SceneMetrics;
pub use model::{
    CollisionFlags, Entry, EntryKey, SceneDataError, SceneObserver, TudeySceneModel,
};
pub use pathfinder::{Pathfinder, TilePathfinder};
pub use shape::Shape;
pub use space::{ElementId, HashSpace, SimpleSpace, Space, SpaceElement};

/// Advances the scene by one tick.
pub fn advance_scene(mut manager: ResMut<SceneManager>) {
    manager.tick();
}

/// Construct a Bevy [`App`] that ticks `manager` and then refreshes
/// [`SceneMetrics`] on every update.
pub fn build_scene_app(manager: SceneManager) -> App {
    let mut app = App::new();

    let config = manager.config().clone();

    app.insert_resource(config)
        .insert_resource(manager)
        .insert_resource(SceneMetrics::default())
        .add_plugins(MinimalPlugins)
        .add_systems(Update, (advance_scene, metrics::collect_metrics).chain());

    app
}

/// Execute a single scene tick.
pub fn run_tick(app: &mut App) {
    app.update();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tudey_schema::ConfigReference;

    #[test]
    fn app_ticks_and_collects_metrics() {
        let configs = Arc::new(ConfigManager::builtin());
        let mut manager =
            SceneManager::new(SceneConfig::default(), configs, TudeySceneModel::new("app"));
        manager
            .spawn_actor(&ConfigReference::new("actor/rock"), Vec2::ZERO, 0.0)
            .expect("rock");
        let mut app = build_scene_app(manager);
        run_tick(&mut app);
        run_tick(&mut app);
        let metrics = app.world.resource::<SceneMetrics>();
        assert_eq!(metrics.tick, 2);
        assert_eq!(metrics.timestamp, 200);
        assert_eq!(metrics.live_actors, 1);
        assert_eq!(metrics.tick_participants, 0);
    }
}
