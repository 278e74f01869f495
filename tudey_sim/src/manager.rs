//! Tick driver for a single scene.
//!
//! The [`SceneManager`] owns the scene model, the live actor and entry
//! logics, the actor and sensor spaces, and the clock. Logic nodes receive
//! `&mut SceneManager` while they run; the handlers or behavior being run are
//! taken out of their owner for the duration and put back afterwards.

use std::collections::{BTreeMap, HashMap};
use std::mem;
use std::sync::Arc;

use bevy::math::Vec2;
use bevy::prelude::Resource;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tudey_schema::{ActionConfig, ConfigReference};

use crate::config::{ConfigManager, SceneConfig};
use crate::geometry::{normalize_angle, Transform2D};
use crate::hashing::stable_seed;
use crate::logic::{
    ActionLogic, Actor, ActorFlags, ActorLogic, BehaviorLogic, EntryLogic, Environment,
    HandlerLogic, InputFrame, LogicClass, LogicContext, LogicRef,
};
use crate::model::{Entry, EntryKey, TudeySceneModel};
use crate::pathfinder::{Pathfinder, TilePathfinder};
use crate::shape::Shape;
use crate::space::{ElementId, HashSpace, Space, SpaceElement};

/// Payload of actor space elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorElement {
    pub id: i32,
    pub flags: u32,
}

/// Payload of sensor space elements: the handler owning the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SensorElement {
    pub owner: LogicRef,
    pub handler: usize,
}

/// A stateless effect fired at a location, for the network layer to relay.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectFired {
    pub effect: ConfigReference,
    pub translation: Vec2,
    pub rotation: f32,
    pub timestamp: i32,
    pub expires: i32,
}

/// An actor leaving for another scene.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyTransfer {
    pub actor: i32,
    pub scene: String,
    pub portal: String,
    pub timestamp: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Participant {
    Actor(i32),
    Handler(LogicRef, usize),
}

#[derive(Debug)]
enum Pending {
    RemoveActor(i32),
    ClearWarp(i32),
    Action {
        config: ActionConfig,
        context: LogicContext,
    },
}

#[derive(Debug)]
struct Scheduled {
    due: i32,
    sequence: u64,
    pending: Pending,
}

/// Running totals exposed to the metrics system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerCounters {
    pub ticks: u64,
    pub actors_spawned: u64,
    pub actors_removed: u64,
    pub effects_fired: u64,
    pub signals_handled: u64,
}

/// Collision environment of one advancing actor: the scene model plus every
/// other actor whose flags match the mask.
struct SceneEnvironment<'a> {
    model: &'a TudeySceneModel,
    actors: &'a HashSpace<ActorElement>,
    actor: i32,
    mask: u32,
}

impl Environment for SceneEnvironment<'_> {
    fn penetration(&self, shape: &Shape) -> Option<Vec2> {
        let mut deepest = self.model.penetration(self.mask, shape);
        if self.mask == 0 {
            return deepest;
        }
        let mut found = Vec::new();
        self.actors.get_intersecting(shape, &mut found);
        for id in found {
            let Some(element) = self.actors.element(id) else {
                continue;
            };
            let other = element.object();
            if other.id == self.actor || other.flags & self.mask == 0 {
                continue;
            }
            if let Some(vector) = element.world_shape().penetration(shape) {
                if deepest.map_or(true, |d| vector.length_squared() > d.length_squared()) {
                    deepest = Some(vector);
                }
            }
        }
        deepest
    }
}

/// Receives actor shape moves in registration order.
pub trait ShapeObserver: Send + Sync {
    fn shape_moved(&mut self, actor: i32, shape: &Shape);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeObserverId(u32);

/// Offsets of one ring of the spawn search: bottom edge, right edge, top edge,
/// left edge.
pub(crate) fn spiral_ring(radius: i32) -> Vec<(i32, i32)> {
    if radius <= 0 {
        return vec![(0, 0)];
    }
    let r = radius;
    let mut ring = Vec::with_capacity(8 * r as usize);
    ring.extend((-r..=r).map(|x| (x, -r)));
    ring.extend((-r + 1..=r).map(|y| (r, y)));
    ring.extend((-r..r).rev().map(|x| (x, r)));
    ring.extend((-r + 1..r).rev().map(|y| (-r, y)));
    ring
}

#[derive(Resource)]
pub struct SceneManager {
    config: SceneConfig,
    configs: Arc<ConfigManager>,
    model: TudeySceneModel,
    pathfinder: Box<dyn Pathfinder>,
    timestamp: i32,
    rng: ChaCha8Rng,
    actors: BTreeMap<i32, ActorLogic>,
    next_actor_id: i32,
    entry_logics: BTreeMap<EntryKey, EntryLogic>,
    actor_space: HashSpace<ActorElement>,
    sensor_space: HashSpace<SensorElement>,
    participants: BTreeMap<u64, Participant>,
    registrations: HashMap<Participant, u64>,
    next_registration: u64,
    tagged: BTreeMap<String, Vec<LogicRef>>,
    globals: BTreeMap<String, f64>,
    pending: Vec<Scheduled>,
    next_sequence: u64,
    effects: Vec<EffectFired>,
    transfers: Vec<BodyTransfer>,
    counters: ManagerCounters,
    shape_observers: Vec<(ShapeObserverId, Box<dyn ShapeObserver>)>,
    next_shape_observer: u32,
}

impl SceneManager {
    /// Takes ownership of `model`, initializing it against `configs`, and
    /// starts up the logic of its entries.
    pub fn new(config: SceneConfig, configs: Arc<ConfigManager>, mut model: TudeySceneModel) -> Self {
        model.init(configs.clone());
        let seed = if config.rng_seed == 0 {
            stable_seed(&model.name)
        } else {
            config.rng_seed
        };
        let mut manager = Self {
            actor_space: HashSpace::new(config.space_granularity, config.space_levels),
            sensor_space: HashSpace::new(config.sensor_granularity, config.space_levels),
            config,
            configs,
            model,
            pathfinder: Box::new(TilePathfinder),
            timestamp: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            actors: BTreeMap::new(),
            next_actor_id: 1,
            entry_logics: BTreeMap::new(),
            participants: BTreeMap::new(),
            registrations: HashMap::new(),
            next_registration: 0,
            tagged: BTreeMap::new(),
            globals: BTreeMap::new(),
            pending: Vec::new(),
            next_sequence: 0,
            effects: Vec::new(),
            transfers: Vec::new(),
            counters: ManagerCounters::default(),
            shape_observers: Vec::new(),
            next_shape_observer: 0,
        };
        let entries = manager.model.entries();
        for entry in &entries {
            manager.add_entry_logic(entry);
        }
        tracing::info!(
            target: "tudey::manager",
            scene = %manager.model.name,
            entries = entries.len(),
            logics = manager.entry_logics.len(),
            seed,
            "scene.started"
        );
        manager
    }

    pub fn with_pathfinder(mut self, pathfinder: Box<dyn Pathfinder>) -> Self {
        self.pathfinder = pathfinder;
        self
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn configs(&self) -> &Arc<ConfigManager> {
        &self.configs
    }

    pub fn model(&self) -> &TudeySceneModel {
        &self.model
    }

    /// Milliseconds since the scene started.
    pub fn timestamp(&self) -> i32 {
        self.timestamp
    }

    pub fn tick_interval(&self) -> i32 {
        self.config.tick_interval()
    }

    pub fn ticks_per_second(&self) -> u32 {
        self.config.ticks_per_second.max(1)
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub fn counters(&self) -> ManagerCounters {
        self.counters
    }

    pub fn actor(&self, id: i32) -> Option<&ActorLogic> {
        self.actors.get(&id)
    }

    /// Actors in id order, including ones destroyed this tick.
    pub fn actors(&self) -> impl Iterator<Item = &ActorLogic> {
        self.actors.values()
    }

    pub fn live_actor_count(&self) -> usize {
        self.actors.values().filter(|logic| logic.is_active()).count()
    }

    pub fn sleeping_actor_count(&self) -> usize {
        self.actors.values().filter(|logic| logic.is_sleeping()).count()
    }

    pub fn entry_logic(&self, key: EntryKey) -> Option<&EntryLogic> {
        self.entry_logics.get(&key)
    }

    pub fn entry_logics(&self) -> impl Iterator<Item = &EntryLogic> {
        self.entry_logics.values()
    }

    pub fn actor_space(&self) -> &HashSpace<ActorElement> {
        &self.actor_space
    }

    pub fn sensor_space(&self) -> &HashSpace<SensorElement> {
        &self.sensor_space
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Advances the scene by one tick.
    pub fn tick(&mut self) {
        self.timestamp += self.tick_interval();
        self.counters.ticks += 1;
        self.drain_pending();
        let participants: Vec<Participant> = self.participants.values().copied().collect();
        for participant in participants {
            if !self.registrations.contains_key(&participant) {
                continue;
            }
            match participant {
                Participant::Actor(id) => self.tick_actor(id),
                Participant::Handler(owner, index) => self.tick_handler(owner, index),
            }
        }
    }

    fn register(&mut self, participant: Participant) {
        if self.registrations.contains_key(&participant) {
            return;
        }
        let order = self.next_registration;
        self.next_registration += 1;
        self.registrations.insert(participant, order);
        self.participants.insert(order, participant);
    }

    fn deregister(&mut self, participant: Participant) {
        if let Some(order) = self.registrations.remove(&participant) {
            self.participants.remove(&order);
        }
    }

    fn schedule(&mut self, due: i32, pending: Pending) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.push(Scheduled {
            due,
            sequence,
            pending,
        });
    }

    fn drain_pending(&mut self) {
        let now = self.timestamp;
        let (mut due, waiting): (Vec<Scheduled>, Vec<Scheduled>) = mem::take(&mut self.pending)
            .into_iter()
            .partition(|scheduled| scheduled.due <= now);
        self.pending = waiting;
        due.sort_by_key(|scheduled| (scheduled.due, scheduled.sequence));
        for scheduled in due {
            match scheduled.pending {
                Pending::RemoveActor(id) => self.reap_actor(id),
                Pending::ClearWarp(id) => {
                    if let Some(logic) = self.actors.get_mut(&id) {
                        logic.actor_mut().flags.remove(ActorFlags::WARP);
                    }
                }
                Pending::Action { config, context } => {
                    ActionLogic::new(&config).execute(self, &context);
                }
            }
        }
    }

    /// Queues `config` to run `delay` milliseconds from now.
    pub fn schedule_action(&mut self, delay: i32, config: ActionConfig, context: LogicContext) {
        let due = self.timestamp.saturating_add(delay.max(0));
        self.schedule(due, Pending::Action { config, context });
    }

    // Logic lookup.

    /// True when `logic` is registered, even if destroyed this tick.
    pub fn contains_logic(&self, logic: LogicRef) -> bool {
        match logic {
            LogicRef::Actor(id) => self.actors.contains_key(&id),
            LogicRef::Entry(key) => self.entry_logics.contains_key(&key),
        }
    }

    /// True when `logic` is registered and not pending removal.
    pub fn is_live(&self, logic: LogicRef) -> bool {
        match logic {
            LogicRef::Actor(id) => self.actors.get(&id).is_some_and(ActorLogic::is_active),
            LogicRef::Entry(key) => self.entry_logics.contains_key(&key),
        }
    }

    /// Logics carrying `tag`, in tagging order.
    pub fn get_tagged(&self, tag: &str) -> Vec<LogicRef> {
        self.tagged.get(tag).cloned().unwrap_or_default()
    }

    pub fn has_tag(&self, logic: LogicRef, tag: &str) -> bool {
        match logic {
            LogicRef::Actor(id) => self
                .actors
                .get(&id)
                .is_some_and(|actor| actor.config().tags.iter().any(|t| t == tag)),
            LogicRef::Entry(key) => self
                .entry_logics
                .get(&key)
                .is_some_and(|entry| entry.tags().iter().any(|t| t == tag)),
        }
    }

    pub fn logic_class(&self, logic: LogicRef) -> Option<LogicClass> {
        match logic {
            LogicRef::Actor(id) => self.actors.get(&id).map(ActorLogic::class),
            LogicRef::Entry(key) => self.entry_logics.contains_key(&key).then_some(LogicClass::Entry),
        }
    }

    fn add_tags(&mut self, logic: LogicRef, tags: &[String]) {
        for tag in tags {
            let members = self.tagged.entry(tag.clone()).or_default();
            if !members.contains(&logic) {
                members.push(logic);
            }
        }
    }

    fn remove_tags(&mut self, logic: LogicRef) {
        self.tagged.retain(|_, members| {
            members.retain(|member| *member != logic);
            !members.is_empty()
        });
    }

    // Positional queries.

    pub fn translation(&self, logic: LogicRef) -> Option<Vec2> {
        match logic {
            LogicRef::Actor(id) => self.actors.get(&id).map(ActorLogic::translation),
            LogicRef::Entry(key) => self.entry_logics.get(&key).map(EntryLogic::translation),
        }
    }

    pub fn transform(&self, logic: LogicRef) -> Option<Transform2D> {
        match logic {
            LogicRef::Actor(id) => self.actors.get(&id).map(|actor| actor.actor().transform()),
            LogicRef::Entry(key) => self.entry_logics.get(&key).map(EntryLogic::transform),
        }
    }

    pub fn world_shape(&self, logic: LogicRef) -> Option<Shape> {
        match logic {
            LogicRef::Actor(id) => self.actors.get(&id).and_then(ActorLogic::world_shape),
            LogicRef::Entry(key) => self
                .entry_logics
                .get(&key)
                .and_then(|entry| entry.shape().cloned()),
        }
    }

    /// Appends live actors whose shapes intersect `shape`, in id order.
    pub fn actors_intersecting(&self, shape: &Shape, results: &mut Vec<LogicRef>) {
        let mut found = Vec::new();
        self.actor_space.get_intersecting(shape, &mut found);
        let mut ids: Vec<i32> = found
            .into_iter()
            .filter_map(|element| self.actor_space.element(element))
            .map(|element| element.object().id)
            .filter(|id| self.is_live(LogicRef::Actor(*id)))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        for id in ids {
            let logic = LogicRef::Actor(id);
            if !results.contains(&logic) {
                results.push(logic);
            }
        }
    }

    // Variables.

    pub fn variable(&self, logic: LogicRef, name: &str) -> Option<f64> {
        match logic {
            LogicRef::Actor(id) => self.actors.get(&id).and_then(|actor| actor.variable(name)),
            LogicRef::Entry(key) => self
                .entry_logics
                .get(&key)
                .and_then(|entry| entry.variable(name)),
        }
    }

    pub fn set_variable(&mut self, logic: LogicRef, name: &str, value: f64) -> bool {
        let variables = match logic {
            LogicRef::Actor(id) => self.actors.get_mut(&id).map(|actor| &mut actor.variables),
            LogicRef::Entry(key) => self
                .entry_logics
                .get_mut(&key)
                .map(|entry| &mut entry.variables),
        };
        match variables {
            Some(variables) => {
                variables.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn global_variable(&self, name: &str) -> Option<f64> {
        self.globals.get(name).copied()
    }

    pub fn set_global_variable(&mut self, name: impl Into<String>, value: f64) {
        self.globals.insert(name.into(), value);
    }

    // Entries.

    /// Adds an entry to the model and starts its logic.
    pub fn add_entry(&mut self, entry: Entry) -> Option<EntryKey> {
        let key = self.model.add_entry(entry)?;
        if let Some(entry) = self.model.get_entry(key) {
            self.add_entry_logic(&entry);
        }
        Some(key)
    }

    /// Shuts down the entry's logic and removes it from the model.
    pub fn remove_entry(&mut self, key: EntryKey) -> Option<Entry> {
        if self.entry_logics.contains_key(&key) {
            let owner = LogicRef::Entry(key);
            self.run_shutdown(owner);
            self.release_logic(owner);
            self.entry_logics.remove(&key);
        }
        self.model.remove_entry(key)
    }

    fn add_entry_logic(&mut self, entry: &Entry) {
        if matches!(entry, Entry::Tile(_)) {
            return;
        }
        let Some(logic) = EntryLogic::new(entry, &self.configs, self.timestamp) else {
            return;
        };
        let key = logic.key();
        let owner = LogicRef::Entry(key);
        let tags = logic.tags().to_vec();
        let transform = logic.transform();
        self.entry_logics.insert(key, logic);
        self.add_tags(owner, &tags);
        self.attach_handlers(owner, transform);
        self.run_startup(owner);
    }

    // Handlers.

    fn take_handlers(&mut self, owner: LogicRef) -> Option<Vec<HandlerLogic>> {
        match owner {
            LogicRef::Actor(id) => self
                .actors
                .get_mut(&id)
                .map(|actor| mem::take(&mut actor.handlers)),
            LogicRef::Entry(key) => self
                .entry_logics
                .get_mut(&key)
                .map(|entry| mem::take(&mut entry.handlers)),
        }
    }

    fn restore_handlers(&mut self, owner: LogicRef, handlers: Vec<HandlerLogic>) {
        let slot = match owner {
            LogicRef::Actor(id) => self.actors.get_mut(&id).map(|actor| &mut actor.handlers),
            LogicRef::Entry(key) => self
                .entry_logics
                .get_mut(&key)
                .map(|entry| &mut entry.handlers),
        };
        match slot {
            Some(slot) => *slot = handlers,
            None => {
                for sensor in handlers.iter().filter_map(|handler| handler.sensor) {
                    self.sensor_space.remove(sensor);
                }
            }
        }
    }

    /// Runs `run` over the owner's handlers with the handlers taken out.
    fn with_handlers<R>(
        &mut self,
        owner: LogicRef,
        run: impl FnOnce(&mut Self, &mut Vec<HandlerLogic>) -> R,
    ) -> Option<R> {
        let mut handlers = self.take_handlers(owner)?;
        let result = run(self, &mut handlers);
        self.restore_handlers(owner, handlers);
        Some(result)
    }

    /// Registers tick participants and sensors for the owner's handlers.
    fn attach_handlers(&mut self, owner: LogicRef, transform: Transform2D) {
        let Some(mut handlers) = self.take_handlers(owner) else {
            return;
        };
        for (index, handler) in handlers.iter_mut().enumerate() {
            if handler.needs_tick() {
                self.register(Participant::Handler(owner, index));
            }
            if let Some(shape) = handler.sensor_shape() {
                let element = SpaceElement::with_transform(
                    shape.clone(),
                    transform,
                    SensorElement {
                        owner,
                        handler: index,
                    },
                );
                handler.sensor = Some(self.sensor_space.add(element));
            }
        }
        self.restore_handlers(owner, handlers);
    }

    /// Deregisters the owner's handlers and tags and drops its sensors.
    fn release_logic(&mut self, owner: LogicRef) {
        if let Some(handlers) = self.take_handlers(owner) {
            for (index, handler) in handlers.iter().enumerate() {
                self.deregister(Participant::Handler(owner, index));
                if let Some(sensor) = handler.sensor {
                    self.sensor_space.remove(sensor);
                }
            }
        }
        self.remove_tags(owner);
    }

    fn run_startup(&mut self, owner: LogicRef) {
        let context = LogicContext::new(owner);
        self.with_handlers(owner, |manager, handlers| {
            for handler in handlers.iter_mut() {
                handler.startup(manager, &context);
            }
        });
    }

    fn run_shutdown(&mut self, owner: LogicRef) {
        let context = LogicContext::new(owner);
        self.with_handlers(owner, |manager, handlers| {
            for handler in handlers.iter_mut() {
                handler.shutdown(manager, &context);
            }
        });
    }

    fn tick_handler(&mut self, owner: LogicRef, index: usize) {
        if !self.is_live(owner) {
            return;
        }
        let context = LogicContext::new(owner);
        self.with_handlers(owner, |manager, handlers| {
            if let Some(handler) = handlers.get_mut(index) {
                handler.tick(manager, &context);
            }
        });
    }

    /// Delivers a named signal to `target`. Returns true when one of its
    /// handlers listens for `name`.
    pub fn signal(&mut self, target: LogicRef, activator: Option<LogicRef>, name: &str) -> bool {
        if !self.is_live(target) {
            return false;
        }
        let context = LogicContext::activated_by(target, activator);
        let handled = self
            .with_handlers(target, |manager, handlers| {
                let mut handled = false;
                for handler in handlers.iter_mut() {
                    handled |= handler.signal(manager, &context, name);
                }
                handled
            })
            .unwrap_or(false);
        if handled {
            self.counters.signals_handled += 1;
        }
        handled
    }

    /// Client request from `pawn` addressed to `target`'s request handlers.
    pub fn handle_request(&mut self, pawn: i32, target: LogicRef, name: &str) -> bool {
        let is_pawn = self
            .actors
            .get(&pawn)
            .is_some_and(|logic| logic.is_active() && logic.pawn().is_some());
        if !is_pawn {
            tracing::warn!(target: "tudey::manager", pawn, %target, name, "request.rejected=not_a_pawn");
            return false;
        }
        if !self.is_live(target) {
            tracing::debug!(target: "tudey::manager", pawn, %target, name, "request.rejected=missing_target");
            return false;
        }
        let context = LogicContext::activated_by(target, Some(LogicRef::Actor(pawn)));
        self.with_handlers(target, |manager, handlers| {
            let mut served = false;
            for handler in handlers.iter_mut() {
                served |= handler.request(manager, &context, name);
            }
            served
        })
        .unwrap_or(false)
    }

    /// Pulses every sensor the actor's shape overlaps, except its own.
    fn trigger_intersection_sensors(&mut self, id: i32) {
        let Some(logic) = self.actors.get(&id) else {
            return;
        };
        let shape = logic
            .world_shape()
            .unwrap_or_else(|| Shape::point(logic.translation()));
        let mut found = Vec::new();
        self.sensor_space.get_intersecting(&shape, &mut found);
        let mut sensors: Vec<SensorElement> = found
            .into_iter()
            .filter_map(|element| self.sensor_space.element(element))
            .map(|element| *element.object())
            .filter(|sensor| sensor.owner != LogicRef::Actor(id))
            .collect();
        sensors.sort_unstable();
        let activator = Some(LogicRef::Actor(id));
        for sensor in sensors {
            if !self.is_live(sensor.owner) {
                continue;
            }
            let context = LogicContext::activated_by(sensor.owner, activator);
            self.with_handlers(sensor.owner, |manager, handlers| {
                if let Some(handler) = handlers.get_mut(sensor.handler) {
                    handler.intersection(manager, &context);
                }
            });
        }
    }

    // Actors.

    /// Spawns an actor, returning its id, or `None` when the config does not
    /// resolve.
    pub fn spawn_actor(
        &mut self,
        reference: &ConfigReference,
        translation: Vec2,
        rotation: f32,
    ) -> Option<i32> {
        let config = self.configs.actor(reference);
        if self.configs.is_null_actor(&config) {
            tracing::warn!(
                target: "tudey::manager",
                config = reference.name(),
                "actor.spawn_failed=null_config"
            );
            return None;
        }
        let id = self.next_actor_id;
        self.next_actor_id += 1;
        let now = self.timestamp;

        let mut actor = Actor::new(id, reference.clone(), now);
        actor.rotation = normalize_angle(rotation);
        actor.direction = actor.rotation;
        actor.translation = if config.adjust_spawn_point {
            self.adjust_spawn_point(id, &config, translation, actor.rotation)
        } else {
            translation
        };

        let mut logic = ActorLogic::new(actor, config.clone(), now);
        logic.handlers = config
            .handlers
            .iter()
            .map(|handler| HandlerLogic::new(handler, now))
            .collect();
        if let (Some(agent), Some(behavior)) = (logic.agent.as_mut(), config.behavior.as_ref()) {
            agent.behavior = Some(BehaviorLogic::new(behavior));
        }
        if let Some(shape) = logic.local_shape() {
            let element = SpaceElement::with_transform(
                shape.clone(),
                logic.actor().transform(),
                ActorElement {
                    id,
                    flags: config.collision_flags,
                },
            );
            logic.element = Some(self.actor_space.add(element));
        }
        let mobile = logic.mobility.is_some();
        let transform = logic.actor().transform();
        self.actors.insert(id, logic);

        let owner = LogicRef::Actor(id);
        self.add_tags(owner, &config.tags);
        if mobile {
            self.register(Participant::Actor(id));
        }
        self.attach_handlers(owner, transform);
        self.counters.actors_spawned += 1;
        tracing::debug!(
            target: "tudey::manager",
            id,
            config = reference.name(),
            x = transform.translation.x,
            y = transform.translation.y,
            "actor.spawned"
        );

        self.with_behavior(id, |manager, behavior| behavior.startup(manager, id));
        self.run_startup(owner);
        Some(id)
    }

    /// First non-colliding, reachable point of the outward spiral around
    /// `translation`, or `translation` itself when none is found.
    fn adjust_spawn_point(
        &self,
        id: i32,
        config: &tudey_schema::ActorConfig,
        translation: Vec2,
        rotation: f32,
    ) -> Vec2 {
        let Some(shape) = config.shape.as_ref().map(Shape::from_config) else {
            return translation;
        };
        let mask = config.collision_mask;
        let mut world = shape.clone();
        let environment = SceneEnvironment {
            model: &self.model,
            actors: &self.actor_space,
            actor: id,
            mask,
        };
        let mut fits = |point: Vec2| {
            shape.transform_into(&Transform2D::new(point, rotation), &mut world);
            environment.penetration(&world).is_none()
        };
        if fits(translation) {
            return translation;
        }
        for radius in 1..=self.config.max_adjustment_distance {
            for (dx, dy) in spiral_ring(radius) {
                let candidate = translation + Vec2::new(dx as f32, dy as f32);
                if !fits(candidate) {
                    continue;
                }
                let reachable = self
                    .pathfinder
                    .get_path(
                        &self.model,
                        mask,
                        translation,
                        candidate,
                        self.config.max_path_length,
                    )
                    .is_some();
                if reachable {
                    return candidate;
                }
            }
        }
        tracing::debug!(
            target: "tudey::manager",
            id,
            x = translation.x,
            y = translation.y,
            "actor.spawn_adjust_failed"
        );
        translation
    }

    /// Marks an actor destroyed; it is removed at the start of the next tick.
    pub fn destroy_actor(&mut self, id: i32) -> bool {
        let now = self.timestamp;
        let Some(logic) = self.actors.get_mut(&id) else {
            return false;
        };
        if logic.actor().is_destroyed() {
            return false;
        }
        logic.actor_mut().destroyed = Some(now);
        logic.set_moving(false);
        logic.invalidate_snapshot();
        self.run_shutdown(LogicRef::Actor(id));
        self.with_behavior(id, |manager, behavior| behavior.shutdown(manager, id));
        self.schedule(now + 1, Pending::RemoveActor(id));
        tracing::debug!(target: "tudey::manager", id, "actor.destroyed");
        true
    }

    fn reap_actor(&mut self, id: i32) {
        let owner = LogicRef::Actor(id);
        self.deregister(Participant::Actor(id));
        self.release_logic(owner);
        if let Some(logic) = self.actors.remove(&id) {
            if let Some(element) = logic.element {
                self.actor_space.remove(element);
            }
            self.counters.actors_removed += 1;
            tracing::debug!(target: "tudey::manager", id, "actor.removed");
        }
    }

    pub fn add_shape_observer(&mut self, observer: Box<dyn ShapeObserver>) -> ShapeObserverId {
        let id = ShapeObserverId(self.next_shape_observer);
        self.next_shape_observer += 1;
        self.shape_observers.push((id, observer));
        id
    }

    pub fn remove_shape_observer(&mut self, id: ShapeObserverId) -> bool {
        let before = self.shape_observers.len();
        self.shape_observers.retain(|(existing, _)| *existing != id);
        self.shape_observers.len() != before
    }

    /// Teleports an actor; the warp flag is visible until the next tick.
    pub fn warp_actor(&mut self, id: i32, translation: Vec2, rotation: f32) -> bool {
        let now = self.timestamp;
        let Some(logic) = self.actors.get_mut(&id) else {
            return false;
        };
        if logic.actor().is_destroyed() {
            return false;
        }
        let actor = logic.actor_mut();
        actor.translation = translation;
        actor.rotation = normalize_angle(rotation);
        actor.direction = actor.rotation;
        actor.flags.insert(ActorFlags::WARP);
        logic.set_target_rotation(rotation);
        logic.invalidate_snapshot();
        self.update_shape(id);
        self.schedule(now + 1, Pending::ClearWarp(id));
        true
    }

    pub fn fire_effect(&mut self, reference: &ConfigReference, translation: Vec2, rotation: f32) -> bool {
        let config = self.configs.effect(reference);
        if self.configs.is_null_effect(&config) {
            tracing::warn!(
                target: "tudey::manager",
                config = reference.name(),
                "effect.fire_failed=null_config"
            );
            return false;
        }
        let lifespan = (config.lifespan.max(0.0) * 1_000.0).round() as i32;
        self.effects.push(EffectFired {
            effect: reference.clone(),
            translation,
            rotation,
            timestamp: self.timestamp,
            expires: self.timestamp.saturating_add(lifespan),
        });
        self.counters.effects_fired += 1;
        true
    }

    /// Hands an actor over to another scene and destroys it here.
    pub fn move_body(&mut self, id: i32, scene: &str, portal: &str) -> bool {
        if !self.is_live(LogicRef::Actor(id)) {
            return false;
        }
        self.transfers.push(BodyTransfer {
            actor: id,
            scene: scene.to_string(),
            portal: portal.to_string(),
            timestamp: self.timestamp,
        });
        tracing::info!(target: "tudey::manager", id, scene, portal, "actor.body_moved");
        self.destroy_actor(id)
    }

    pub fn take_effects(&mut self) -> Vec<EffectFired> {
        mem::take(&mut self.effects)
    }

    pub fn take_body_transfers(&mut self) -> Vec<BodyTransfer> {
        mem::take(&mut self.transfers)
    }

    /// Queues a client input frame for a pawn.
    pub fn enqueue_input(&mut self, pawn: i32, frame: InputFrame) -> bool {
        match self.actors.get_mut(&pawn).and_then(|logic| logic.pawn.as_mut()) {
            Some(state) => {
                state.enqueue(frame);
                true
            }
            None => false,
        }
    }

    /// Copy of the actor state for the current tick. Marks the actor as seen,
    /// waking it if it was asleep.
    pub fn get_snapshot(&mut self, id: i32) -> Option<Actor> {
        let now = self.timestamp;
        let logic = self.actors.get_mut(&id)?;
        let snapshot = logic.snapshot(now);
        let mut woke = false;
        if let Some(mobility) = logic.mobility.as_mut() {
            mobility.last_seen = now;
            if mobility.sleeping {
                mobility.sleeping = false;
                mobility.advancer.jump(now);
                woke = true;
            }
        }
        if woke {
            self.register(Participant::Actor(id));
            tracing::debug!(target: "tudey::manager", id, "actor.woke");
        }
        Some(snapshot)
    }

    // Agent control, used by behaviors and scripts.

    pub fn actor_speed(&self, id: i32) -> f32 {
        self.actors.get(&id).map_or(0.0, |logic| logic.config().speed)
    }

    pub fn actor_direction(&self, id: i32) -> f32 {
        self.actors.get(&id).map_or(0.0, |logic| logic.actor().direction)
    }

    pub fn is_moving(&self, id: i32) -> bool {
        self.actors.get(&id).is_some_and(ActorLogic::is_moving)
    }

    pub fn start_moving(&mut self, id: i32) {
        if let Some(logic) = self.actors.get_mut(&id) {
            if logic.is_active() {
                logic.set_moving(true);
            }
        }
    }

    pub fn stop_moving(&mut self, id: i32) {
        if let Some(logic) = self.actors.get_mut(&id) {
            logic.set_moving(false);
        }
    }

    pub fn set_target_rotation(&mut self, id: i32, rotation: f32) {
        if let Some(logic) = self.actors.get_mut(&id) {
            logic.set_target_rotation(rotation);
        }
    }

    pub fn is_facing_target(&self, id: i32) -> bool {
        self.actors.get(&id).map_or(true, ActorLogic::is_facing_target)
    }

    /// Route for an actor from its position to `destination`, honoring its
    /// collision mask.
    pub fn get_path(&self, id: i32, destination: Vec2) -> Option<Vec<Vec2>> {
        let logic = self.actors.get(&id)?;
        self.pathfinder.get_path(
            &self.model,
            logic.config().collision_mask,
            logic.translation(),
            destination,
            self.config.max_path_length,
        )
    }

    /// Route for an actor to a scene entry.
    pub fn get_entry_path(&self, id: i32, entry: EntryKey) -> Option<Vec<Vec2>> {
        let logic = self.actors.get(&id)?;
        self.pathfinder.get_entry_path(
            &self.model,
            logic.config().collision_mask,
            logic.translation(),
            entry,
            self.config.max_path_length,
        )
    }

    fn with_behavior(&mut self, id: i32, run: impl FnOnce(&mut Self, &mut BehaviorLogic)) {
        let Some(mut behavior) = self
            .actors
            .get_mut(&id)
            .and_then(|logic| logic.agent.as_mut())
            .and_then(|agent| agent.behavior.take())
        else {
            return;
        };
        run(self, &mut behavior);
        if let Some(agent) = self.actors.get_mut(&id).and_then(|logic| logic.agent.as_mut()) {
            agent.behavior = Some(behavior);
        }
    }

    /// Moves the actor's space element and sensors to its current transform.
    fn update_shape(&mut self, id: i32) {
        let Some(logic) = self.actors.get(&id) else {
            return;
        };
        let transform = logic.actor().transform();
        if let Some(element) = logic.element {
            self.actor_space.set_transform(element, transform);
            if let Some(moved) = self.actor_space.element(element) {
                let shape = moved.world_shape();
                for (_, observer) in &mut self.shape_observers {
                    observer.shape_moved(id, shape);
                }
            }
        }
        let sensors: Vec<ElementId> = logic
            .handlers()
            .iter()
            .filter_map(|handler| handler.sensor)
            .collect();
        for sensor in sensors {
            self.sensor_space.set_transform(sensor, transform);
        }
    }

    fn tick_actor(&mut self, id: i32) {
        let now = self.timestamp;
        let sleep_interval = self.config.sleep_interval;
        let Some(logic) = self.actors.get_mut(&id) else {
            self.deregister(Participant::Actor(id));
            return;
        };
        if logic.actor().is_destroyed() {
            return;
        }
        let may_sleep = logic.pawn.is_none();
        if let Some(mobility) = logic.mobility.as_mut() {
            if may_sleep && now - mobility.last_seen > sleep_interval {
                mobility.sleeping = true;
                self.deregister(Participant::Actor(id));
                tracing::debug!(target: "tudey::manager", id, "actor.sleeping");
                return;
            }
        }
        logic.apply_inputs(now);

        self.with_behavior(id, |manager, behavior| behavior.tick(manager, id));

        let seconds = self.tick_interval() as f32 / 1_000.0;
        let Self {
            actors,
            model,
            actor_space,
            ..
        } = self;
        let Some(logic) = actors.get_mut(&id) else {
            return;
        };
        logic.turn(seconds);
        let environment = SceneEnvironment {
            model,
            actors: actor_space,
            actor: id,
            mask: logic.config().collision_mask,
        };
        let penetration = logic.advance(now, &environment);
        let trigger_sensors = logic.config().trigger_sensors;

        if let Some(penetration) = penetration {
            self.with_behavior(id, |manager, behavior| {
                behavior.penetrated(manager, id, penetration)
            });
        }
        self.update_shape(id);
        if trigger_sensors {
            self.trigger_intersection_sensors(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::geometry::Coord;
    use crate::model::{PlaceableEntry, TileEntry};

    fn manager_with(model: TudeySceneModel) -> SceneManager {
        let config = SceneConfig {
            rng_seed: 7,
            ..SceneConfig::default()
        };
        SceneManager::new(config, Arc::new(ConfigManager::builtin()), model)
    }

    #[test]
    fn spiral_rings_walk_bottom_right_top_left() {
        assert_eq!(
            spiral_ring(1),
            vec![
                (-1, -1),
                (0, -1),
                (1, -1),
                (1, 0),
                (1, 1),
                (0, 1),
                (-1, 1),
                (-1, 0)
            ]
        );
        assert_eq!(spiral_ring(3).len(), 24);
    }

    #[test]
    fn spawn_point_moves_out_of_walls() {
        let mut model = TudeySceneModel::new("spawn");
        model.init(Arc::new(ConfigManager::builtin()));
        model.add_entry(Entry::Tile(TileEntry::new(
            Coord::new(0, 0),
            ConfigReference::new("tile/wall"),
        )));
        let mut manager = manager_with(model);
        let id = manager
            .spawn_actor(&ConfigReference::new("actor/wanderer"), Vec2::new(0.5, 0.5), 0.0)
            .expect("spawned");
        let translation = manager.translation(LogicRef::Actor(id)).expect("live");
        assert_eq!(translation, Vec2::new(-0.5, -0.5));
    }

    #[test]
    fn null_actor_configs_do_not_spawn() {
        let mut manager = manager_with(TudeySceneModel::new("empty"));
        assert!(manager
            .spawn_actor(&ConfigReference::new("actor/missing"), Vec2::ZERO, 0.0)
            .is_none());
        assert_eq!(manager.actors().count(), 0);
    }

    #[test]
    fn destruction_is_reaped_on_the_next_tick() {
        let mut manager = manager_with(TudeySceneModel::new("reap"));
        let rock = manager
            .spawn_actor(&ConfigReference::new("actor/rock"), Vec2::new(3.0, 3.0), 0.0)
            .expect("rock");
        assert!(manager.destroy_actor(rock));
        assert!(!manager.destroy_actor(rock));
        assert!(manager.contains_logic(LogicRef::Actor(rock)));
        assert!(!manager.is_live(LogicRef::Actor(rock)));
        manager.tick();
        assert!(!manager.contains_logic(LogicRef::Actor(rock)));
        assert!(manager.actor_space().is_empty());
        assert_eq!(manager.counters().actors_removed, 1);
    }

    struct MoveLog(&'static str, Arc<Mutex<Vec<String>>>);

    impl ShapeObserver for MoveLog {
        fn shape_moved(&mut self, actor: i32, shape: &Shape) {
            let center = shape.center();
            self.1
                .lock()
                .expect("lock")
                .push(format!("{} {actor} {:.1}", self.0, center.x));
        }
    }

    #[test]
    fn shape_observers_see_moves_in_registration_order() {
        let mut manager = manager_with(TudeySceneModel::new("observed"));
        let rock = manager
            .spawn_actor(&ConfigReference::new("actor/rock"), Vec2::ZERO, 0.0)
            .expect("rock");
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = manager.add_shape_observer(Box::new(MoveLog("first", Arc::clone(&log))));
        manager.add_shape_observer(Box::new(MoveLog("second", Arc::clone(&log))));
        assert!(manager.warp_actor(rock, Vec2::new(4.0, 0.0), 0.0));
        assert!(manager.remove_shape_observer(first));
        assert!(!manager.remove_shape_observer(first));
        assert!(manager.warp_actor(rock, Vec2::new(6.0, 0.0), 0.0));
        assert_eq!(
            *log.lock().expect("lock"),
            vec![
                format!("first {rock} 4.0"),
                format!("second {rock} 4.0"),
                format!("second {rock} 6.0"),
            ]
        );
    }

    #[test]
    fn warp_flag_clears_after_one_tick() {
        let mut manager = manager_with(TudeySceneModel::new("warp"));
        let rock = manager
            .spawn_actor(&ConfigReference::new("actor/rock"), Vec2::ZERO, 0.0)
            .expect("rock");
        assert!(manager.warp_actor(rock, Vec2::new(10.0, 0.0), 0.0));
        assert!(manager.actor(rock).is_some_and(|logic| logic.actor().is_warped()));
        let mut hits = Vec::new();
        manager.actors_intersecting(&Shape::circle(Vec2::new(10.0, 0.0), 0.1), &mut hits);
        assert_eq!(hits, vec![LogicRef::Actor(rock)]);
        manager.tick();
        assert!(manager.actor(rock).is_some_and(|logic| !logic.actor().is_warped()));
    }

    #[test]
    fn lever_request_opens_tagged_doors() {
        let mut model = TudeySceneModel::new("doors");
        model.add_entry(Entry::Placeable(PlaceableEntry {
            id: 0,
            placeable: ConfigReference::new("placeable/lever"),
            transform: Transform2D::from_translation(Vec2::new(2.0, 0.0)),
        }));
        let mut manager = manager_with(model);
        let lever = manager.get_tagged("lever");
        assert_eq!(lever.len(), 1);
        let door = manager
            .spawn_actor(&ConfigReference::new("actor/door"), Vec2::new(4.0, 0.0), 0.0)
            .expect("door");
        let player = manager
            .spawn_actor(&ConfigReference::new("actor/player"), Vec2::ZERO, 0.0)
            .expect("player");
        assert!(!manager.handle_request(door, lever[0], "pull"));
        assert!(manager.handle_request(player, lever[0], "pull"));
        assert!(!manager.is_live(LogicRef::Actor(door)));
        manager.tick();
        assert!(manager.actor(door).is_none());
        assert!(manager.get_tagged("door").is_empty());
    }

    #[test]
    fn unseen_mobile_actors_sleep_and_wake() {
        let mut manager = manager_with(TudeySceneModel::new("sleep"));
        let id = manager
            .spawn_actor(&ConfigReference::new("actor/wanderer"), Vec2::new(20.0, 20.0), 0.0)
            .expect("wanderer");
        let ticks = manager.config().sleep_interval / manager.tick_interval() + 2;
        for _ in 0..ticks {
            manager.tick();
        }
        assert!(manager.actor(id).is_some_and(ActorLogic::is_sleeping));
        assert_eq!(manager.participant_count(), 0);
        let position = manager.translation(LogicRef::Actor(id));
        manager.tick();
        assert_eq!(manager.translation(LogicRef::Actor(id)), position);

        manager.get_snapshot(id).expect("snapshot");
        assert!(manager.actor(id).is_some_and(|logic| !logic.is_sleeping()));
        assert_eq!(manager.participant_count(), 1);
    }

    #[test]
    fn delayed_actions_run_when_due() {
        let mut manager = manager_with(TudeySceneModel::new("delay"));
        let rock = manager
            .spawn_actor(&ConfigReference::new("actor/rock"), Vec2::ZERO, 0.0)
            .expect("rock");
        manager.schedule_action(
            250,
            ActionConfig::DestroyActor {
                target: tudey_schema::TargetConfig::Source,
            },
            LogicContext::new(LogicRef::Actor(rock)),
        );
        manager.tick();
        manager.tick();
        assert!(manager.is_live(LogicRef::Actor(rock)));
        manager.tick();
        assert!(!manager.is_live(LogicRef::Actor(rock)));
        assert_eq!(manager.pending_count(), 1);
    }

    #[test]
    fn same_seed_same_scene() {
        let run = || {
            let mut manager = manager_with(TudeySceneModel::new("seeded"));
            let id = manager
                .spawn_actor(&ConfigReference::new("actor/wanderer"), Vec2::ZERO, 0.0)
                .expect("wanderer");
            for _ in 0..40 {
                manager.get_snapshot(id);
                manager.tick();
            }
            manager.translation(LogicRef::Actor(id))
        };
        assert_eq!(run(), run());
    }
}
