use std::f32::consts::{FRAC_PI_4, PI};

use bevy::math::Vec2;
use rand::Rng;
use tudey_schema::{BehaviorConfig, VariableRange};

use super::script::ScriptLogic;
use super::target::TargetLogic;
use super::{sample_millis, weighted_index, LogicContext, LogicRef};
use crate::geometry::{from_angle, rotation_of};
use crate::manager::SceneManager;
use crate::model::{Entry, EntryKey};

/// Periodic re-evaluation schedule shared by the evaluating behaviors.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    interval: VariableRange,
    next: i32,
}

impl Evaluation {
    /// Due immediately.
    pub fn new(interval: VariableRange) -> Self {
        Self {
            interval,
            next: i32::MIN,
        }
    }

    pub fn next(&self) -> i32 {
        self.next
    }

    pub fn is_due(&self, timestamp: i32) -> bool {
        timestamp >= self.next
    }

    pub fn schedule(&mut self, timestamp: i32, rng: &mut impl Rng) {
        self.next = timestamp.saturating_add(sample_millis(&self.interval, rng).max(1));
    }

    /// Holds evaluation until [`Evaluation::schedule`] or
    /// [`Evaluation::advance`] is called.
    pub fn postpone(&mut self) {
        self.next = i32::MAX;
    }

    /// Makes the next tick evaluate.
    pub fn advance(&mut self) {
        self.next = i32::MIN;
    }
}

/// Walks an agent along a list of waypoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pathing {
    path: Vec<Vec2>,
    index: usize,
}

/// Bound on waypoints consumed in one tick.
const MAX_NODES_PER_TICK: usize = 64;

impl Pathing {
    pub fn set(&mut self, path: Vec<Vec2>) {
        self.path = path;
        self.index = 0;
    }

    pub fn clear(&mut self) {
        self.path.clear();
        self.index = 0;
    }

    pub fn is_active(&self) -> bool {
        self.index < self.path.len()
    }

    pub fn current(&self) -> Option<Vec2> {
        self.path.get(self.index).copied()
    }

    pub fn remaining(&self) -> &[Vec2] {
        self.path.get(self.index..).unwrap_or(&[])
    }

    /// Steers toward the current waypoint. Returns true on the tick the final
    /// waypoint is reached; the agent is then stopped.
    pub fn tick(&mut self, manager: &mut SceneManager, agent: i32) -> bool {
        let Some(translation) = manager.translation(LogicRef::Actor(agent)) else {
            self.clear();
            return false;
        };
        let reach = (manager.actor_speed(agent) / manager.ticks_per_second() as f32).max(1e-3);
        for _ in 0..MAX_NODES_PER_TICK {
            let Some(target) = self.current() else {
                return false;
            };
            if translation.distance(target) <= reach {
                self.index += 1;
                if !self.is_active() {
                    self.clear();
                    manager.stop_moving(agent);
                    return true;
                }
                continue;
            }
            manager.set_target_rotation(agent, rotation_of(target - translation));
            manager.start_moving(agent);
            return false;
        }
        false
    }
}

/// Progress of a wander direction change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WanderPhase {
    Idle,
    /// Paused before turning toward `rotation`.
    PreRotation { start: i32, rotation: f32 },
    Rotating,
    /// Paused after turning.
    PostRotation { start: i32 },
    Moving,
}

#[derive(Debug)]
pub struct Wander {
    evaluation: Evaluation,
    radius: f32,
    pre_rotation_pause: VariableRange,
    post_rotation_pause: VariableRange,
    origin: Option<Vec2>,
    phase: WanderPhase,
    direction_changes: u32,
}

impl Wander {
    pub fn phase(&self) -> WanderPhase {
        self.phase
    }

    pub fn origin(&self) -> Option<Vec2> {
        self.origin
    }

    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    pub fn direction_changes(&self) -> u32 {
        self.direction_changes
    }

    fn tick(&mut self, manager: &mut SceneManager, agent: i32) {
        let now = manager.timestamp();
        let Some(translation) = manager.translation(LogicRef::Actor(agent)) else {
            return;
        };
        let origin = *self.origin.get_or_insert(translation);
        if self.evaluation.is_due(now) {
            let rotation = manager.rng().gen_range(-PI..PI);
            self.change_direction(manager, agent, rotation);
            return;
        }
        if self.phase == WanderPhase::Moving && manager.is_moving(agent) {
            let offset = translation - origin;
            let heading = from_angle(manager.actor_direction(agent));
            if offset.length() > self.radius && offset.dot(heading) > 0.0 {
                let spread = manager.rng().gen_range(-FRAC_PI_4..=FRAC_PI_4);
                tracing::debug!(
                    target: "tudey::logic",
                    agent,
                    distance = offset.length(),
                    radius = self.radius,
                    "wander.turned=radius"
                );
                self.change_direction(manager, agent, rotation_of(-offset) + spread);
                return;
            }
        }
        self.progress(manager, agent);
    }

    fn penetrated(&mut self, manager: &mut SceneManager, agent: i32, penetration: Vec2) {
        if self.phase != WanderPhase::Moving {
            return;
        }
        let normal = (-penetration).normalize_or_zero();
        if normal == Vec2::ZERO {
            return;
        }
        let heading = from_angle(manager.actor_direction(agent));
        let reflected = heading - 2.0 * heading.dot(normal) * normal;
        self.change_direction(manager, agent, rotation_of(reflected));
    }

    fn change_direction(&mut self, manager: &mut SceneManager, agent: i32, rotation: f32) {
        manager.stop_moving(agent);
        let pause = sample_millis(&self.pre_rotation_pause, manager.rng());
        self.phase = WanderPhase::PreRotation {
            start: manager.timestamp() + pause,
            rotation,
        };
        self.direction_changes += 1;
        self.evaluation.postpone();
        self.progress(manager, agent);
    }

    /// Advances through as many phases as are ready this tick.
    fn progress(&mut self, manager: &mut SceneManager, agent: i32) {
        let now = manager.timestamp();
        loop {
            match self.phase {
                WanderPhase::PreRotation { start, rotation } if now >= start => {
                    manager.set_target_rotation(agent, rotation);
                    self.phase = WanderPhase::Rotating;
                }
                WanderPhase::Rotating if manager.is_facing_target(agent) => {
                    let pause = sample_millis(&self.post_rotation_pause, manager.rng());
                    self.phase = WanderPhase::PostRotation { start: now + pause };
                }
                WanderPhase::PostRotation { start } if now >= start => {
                    manager.start_moving(agent);
                    self.phase = WanderPhase::Moving;
                    self.evaluation.schedule(now, manager.rng());
                }
                _ => return,
            }
        }
    }
}

#[derive(Debug)]
pub struct Patrol {
    evaluation: Evaluation,
    target: TargetLogic,
    pathing: Pathing,
}

impl Patrol {
    pub fn pathing(&self) -> &Pathing {
        &self.pathing
    }

    fn evaluate(&mut self, manager: &mut SceneManager, agent: i32) {
        let context = LogicContext::new(LogicRef::Actor(agent));
        let mut targets = Vec::new();
        self.target.resolve(manager, &context, &mut targets);
        let routes: Vec<Vec<Vec2>> = targets
            .into_iter()
            .filter_map(|logic| match logic {
                LogicRef::Entry(key @ EntryKey::Id(_)) => match manager.model().get_entry(key) {
                    Some(Entry::Path(path)) if !path.vertices.is_empty() => Some(path.vertices),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        if routes.is_empty() {
            self.pathing.clear();
            manager.stop_moving(agent);
            self.evaluation.schedule(manager.timestamp(), manager.rng());
            return;
        }
        let choice = manager.rng().gen_range(0..routes.len());
        let route = &routes[choice];
        let mut path = manager
            .get_path(agent, route[0])
            .unwrap_or_else(|| vec![route[0]]);
        path.extend_from_slice(&route[1..]);
        self.pathing.set(path);
        self.evaluation.postpone();
    }

    fn tick(&mut self, manager: &mut SceneManager, agent: i32) {
        if self.evaluation.is_due(manager.timestamp()) {
            self.evaluate(manager, agent);
        }
        for _ in 0..MAX_NODES_PER_TICK {
            if !self.pathing.tick(manager, agent) {
                return;
            }
            // Reached the end of the route: pick the next one immediately.
            self.evaluate(manager, agent);
            if !self.pathing.is_active() {
                return;
            }
        }
    }
}

#[derive(Debug)]
pub struct Follow {
    evaluation: Evaluation,
    target: TargetLogic,
    minimum_distance: f32,
    maximum_distance: f32,
    pathing: Pathing,
}

impl Follow {
    pub fn pathing(&self) -> &Pathing {
        &self.pathing
    }

    fn evaluate(&mut self, manager: &mut SceneManager, agent: i32) {
        let now = manager.timestamp();
        self.evaluation.schedule(now, manager.rng());
        let context = LogicContext::new(LogicRef::Actor(agent));
        let leader = self
            .target
            .resolve_first(manager, &context)
            .filter(|logic| *logic != LogicRef::Actor(agent))
            .and_then(|logic| manager.translation(logic));
        let (Some(leader), Some(translation)) =
            (leader, manager.translation(LogicRef::Actor(agent)))
        else {
            self.pathing.clear();
            manager.stop_moving(agent);
            return;
        };
        let distance = translation.distance(leader);
        if distance <= self.minimum_distance {
            self.pathing.clear();
            manager.stop_moving(agent);
        } else if distance > self.maximum_distance {
            let path = manager
                .get_path(agent, leader)
                .unwrap_or_else(|| vec![leader]);
            self.pathing.set(path);
        }
    }

    fn tick(&mut self, manager: &mut SceneManager, agent: i32) {
        if self.evaluation.is_due(manager.timestamp()) {
            self.evaluate(manager, agent);
        }
        self.pathing.tick(manager, agent);
    }
}

#[derive(Debug)]
pub struct RandomBehavior {
    evaluation: Evaluation,
    weights: Vec<f32>,
    options: Vec<BehaviorConfig>,
    active: Option<(usize, Box<BehaviorLogic>)>,
}

impl RandomBehavior {
    /// Index of the currently running option.
    pub fn active_index(&self) -> Option<usize> {
        self.active.as_ref().map(|(index, _)| *index)
    }

    fn evaluate(&mut self, manager: &mut SceneManager, agent: i32) {
        let now = manager.timestamp();
        self.evaluation.schedule(now, manager.rng());
        let Some(index) = weighted_index(&self.weights, manager.rng()) else {
            return;
        };
        if let Some((_, mut previous)) = self.active.take() {
            previous.shutdown(manager, agent);
        }
        let mut behavior = BehaviorLogic::new(&self.options[index]);
        behavior.startup(manager, agent);
        self.active = Some((index, Box::new(behavior)));
    }
}

/// Autonomous agent behavior, advanced once per tick.
#[derive(Debug)]
pub enum BehaviorLogic {
    Idle,
    Wander(Wander),
    Patrol(Patrol),
    Follow(Follow),
    Random(RandomBehavior),
    Scripted(ScriptLogic),
}

impl BehaviorLogic {
    pub fn new(config: &BehaviorConfig) -> Self {
        match config {
            BehaviorConfig::Idle => BehaviorLogic::Idle,
            BehaviorConfig::Wander {
                evaluation_interval,
                radius,
                pre_rotation_pause,
                post_rotation_pause,
            } => BehaviorLogic::Wander(Wander {
                evaluation: Evaluation::new(*evaluation_interval),
                radius: *radius,
                pre_rotation_pause: *pre_rotation_pause,
                post_rotation_pause: *post_rotation_pause,
                origin: None,
                phase: WanderPhase::Idle,
                direction_changes: 0,
            }),
            BehaviorConfig::Patrol {
                evaluation_interval,
                target,
            } => BehaviorLogic::Patrol(Patrol {
                evaluation: Evaluation::new(*evaluation_interval),
                target: TargetLogic::new(target),
                pathing: Pathing::default(),
            }),
            BehaviorConfig::Follow {
                evaluation_interval,
                target,
                minimum_distance,
                maximum_distance,
            } => BehaviorLogic::Follow(Follow {
                evaluation: Evaluation::new(*evaluation_interval),
                target: TargetLogic::new(target),
                minimum_distance: *minimum_distance,
                maximum_distance: *maximum_distance,
                pathing: Pathing::default(),
            }),
            BehaviorConfig::Random {
                evaluation_interval,
                behaviors,
            } => BehaviorLogic::Random(RandomBehavior {
                evaluation: Evaluation::new(*evaluation_interval),
                weights: behaviors.iter().map(|weighted| weighted.weight).collect(),
                options: behaviors
                    .iter()
                    .map(|weighted| weighted.behavior.clone())
                    .collect(),
                active: None,
            }),
            BehaviorConfig::Scripted { steps, looping } => {
                BehaviorLogic::Scripted(ScriptLogic::new(steps, *looping))
            }
        }
    }

    pub fn startup(&mut self, manager: &mut SceneManager, agent: i32) {
        if let BehaviorLogic::Wander(wander) = self {
            wander.origin = manager.translation(LogicRef::Actor(agent));
        }
    }

    /// Leaves the agent standing still.
    pub fn shutdown(&mut self, manager: &mut SceneManager, agent: i32) {
        match self {
            BehaviorLogic::Random(random) => {
                if let Some((_, mut active)) = random.active.take() {
                    active.shutdown(manager, agent);
                }
            }
            BehaviorLogic::Patrol(patrol) => patrol.pathing.clear(),
            BehaviorLogic::Follow(follow) => follow.pathing.clear(),
            _ => {}
        }
        manager.stop_moving(agent);
    }

    pub fn tick(&mut self, manager: &mut SceneManager, agent: i32) {
        match self {
            BehaviorLogic::Idle => {}
            BehaviorLogic::Wander(wander) => wander.tick(manager, agent),
            BehaviorLogic::Patrol(patrol) => patrol.tick(manager, agent),
            BehaviorLogic::Follow(follow) => follow.tick(manager, agent),
            BehaviorLogic::Random(random) => {
                if random.evaluation.is_due(manager.timestamp()) {
                    random.evaluate(manager, agent);
                }
                if let Some((_, active)) = random.active.as_mut() {
                    active.tick(manager, agent);
                }
            }
            BehaviorLogic::Scripted(script) => script.tick(manager, agent),
        }
    }

    /// Reports the averaged penetration resolved while advancing.
    pub fn penetrated(&mut self, manager: &mut SceneManager, agent: i32, penetration: Vec2) {
        match self {
            BehaviorLogic::Wander(wander) => wander.penetrated(manager, agent, penetration),
            BehaviorLogic::Random(random) => {
                if let Some((_, active)) = random.active.as_mut() {
                    active.penetrated(manager, agent, penetration);
                }
            }
            _ => {}
        }
    }

    pub fn as_wander(&self) -> Option<&Wander> {
        match self {
            BehaviorLogic::Wander(wander) => Some(wander),
            _ => None,
        }
    }

    pub fn as_script(&self) -> Option<&ScriptLogic> {
        match self {
            BehaviorLogic::Scripted(script) => Some(script),
            _ => None,
        }
    }

    pub fn as_random(&self) -> Option<&RandomBehavior> {
        match self {
            BehaviorLogic::Random(random) => Some(random),
            _ => None,
        }
    }

    pub fn pathing(&self) -> Option<&Pathing> {
        match self {
            BehaviorLogic::Patrol(patrol) => Some(&patrol.pathing),
            BehaviorLogic::Follow(follow) => Some(&follow.pathing),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn evaluation_schedule_controls() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut evaluation = Evaluation::new(VariableRange::constant(2.0));
        assert!(evaluation.is_due(0));
        evaluation.schedule(100, &mut rng);
        assert_eq!(evaluation.next(), 2_100);
        assert!(!evaluation.is_due(2_000));
        evaluation.postpone();
        assert!(!evaluation.is_due(i32::MAX - 1));
        evaluation.advance();
        assert!(evaluation.is_due(0));
    }

    #[test]
    fn pathing_tracks_remaining_nodes() {
        let mut pathing = Pathing::default();
        assert!(!pathing.is_active());
        pathing.set(vec![Vec2::ZERO, Vec2::X]);
        assert_eq!(pathing.current(), Some(Vec2::ZERO));
        assert_eq!(pathing.remaining().len(), 2);
        pathing.clear();
        assert!(pathing.remaining().is_empty());
    }
}
