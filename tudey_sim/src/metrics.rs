use bevy::prelude::*;

use crate::manager::SceneManager;

#[derive(Resource, Default, Debug, Clone, PartialEq)]
pub struct SceneMetrics {
    pub tick: u64,
    pub timestamp: i32,
    pub live_actors: usize,
    pub sleeping_actors: usize,
    pub tick_participants: usize,
    pub entries: usize,
    pub entry_logics: usize,
    pub effects_fired: u64,
}

pub fn collect_metrics(manager: Res<SceneManager>, mut metrics: ResMut<SceneMetrics>) {
    let counters = manager.counters();
    metrics.tick = counters.ticks;
    metrics.timestamp = manager.timestamp();
    metrics.live_actors = manager.live_actor_count();
    metrics.sleeping_actors = manager.sleeping_actor_count();
    metrics.tick_participants = manager.participant_count();
    metrics.entries = manager.model().entry_count();
    metrics.entry_logics = manager.entry_logics().count();
    metrics.effects_fired = counters.effects_fired;
}
