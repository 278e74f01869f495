use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bevy::math::Vec2;
use clap::Parser;
use tracing::{error, info, warn};

use tudey_schema::ConfigReference;
use tudey_sim::{
    build_scene_app, load_config_manager_from_env, load_scene_config_from_env, run_tick,
    ConfigManager, SceneManager, SceneMetrics, TudeySceneModel,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless Tudey scene host", long_about = None)]
struct Args {
    /// Config library JSON (defaults to TUDEY_CONFIG_PATH or the builtin library)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Encoded scene data to load (defaults to an empty scene)
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Number of ticks to run
    #[arg(long, default_value_t = 100)]
    ticks: u32,

    /// Actor configs to spawn at the origin before the first tick
    #[arg(long = "spawn")]
    spawns: Vec<String>,

    /// Sleep between ticks to hold the configured tick rate
    #[arg(long)]
    realtime: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let configs = match &args.config {
        Some(path) => match ConfigManager::from_file(path) {
            Ok(configs) => Arc::new(configs),
            Err(err) => {
                error!(
                    target: "tudey::server",
                    path = %path.display(),
                    error = %err,
                    "config_library.load_failed"
                );
                return ExitCode::FAILURE;
            }
        },
        None => load_config_manager_from_env(),
    };
    let (scene_config, _) = load_scene_config_from_env();

    let model = match &args.scene {
        Some(path) => {
            let loaded = fs::read(path)
                .map_err(|err| err.to_string())
                .and_then(|bytes| TudeySceneModel::from_data(&bytes).map_err(|err| err.to_string()));
            match loaded {
                Ok(model) => model,
                Err(err) => {
                    error!(
                        target: "tudey::server",
                        path = %path.display(),
                        error = %err,
                        "scene.load_failed"
                    );
                    return ExitCode::FAILURE;
                }
            }
        }
        None => TudeySceneModel::new("scratch"),
    };

    let mut manager = SceneManager::new(scene_config, configs, model);
    for name in &args.spawns {
        if manager
            .spawn_actor(&ConfigReference::new(name.as_str()), Vec2::ZERO, 0.0)
            .is_none()
        {
            warn!(target: "tudey::server", actor = %name, "spawn.skipped");
        }
    }
    let interval = Duration::from_millis(manager.tick_interval().max(1) as u64);

    let mut app = build_scene_app(manager);
    info!(
        target: "tudey::server",
        ticks = args.ticks,
        interval_ms = interval.as_millis() as u64,
        realtime = args.realtime,
        "Tudey scene server ready"
    );

    for _ in 0..args.ticks {
        let started = Instant::now();
        run_tick(&mut app);
        {
            let mut manager = app.world.resource_mut::<SceneManager>();
            for effect in manager.take_effects() {
                info!(
                    target: "tudey::server",
                    effect = effect.effect.name(),
                    x = effect.translation.x,
                    y = effect.translation.y,
                    timestamp = effect.timestamp,
                    "effect.fired"
                );
            }
            for transfer in manager.take_body_transfers() {
                info!(
                    target: "tudey::server",
                    actor = transfer.actor,
                    scene = %transfer.scene,
                    portal = %transfer.portal,
                    "body.transferred"
                );
            }
        }
        if args.realtime {
            if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }
    }

    let metrics = app.world.resource::<SceneMetrics>();
    info!(
        target: "tudey::server",
        tick = metrics.tick,
        timestamp = metrics.timestamp,
        live_actors = metrics.live_actors,
        sleeping_actors = metrics.sleeping_actors,
        participants = metrics.tick_participants,
        entries = metrics.entries,
        effects = metrics.effects_fired,
        "scene.finished"
    );
    ExitCode::SUCCESS
}
