use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use bevy::math::Vec2;
use bitflags::bitflags;
use tudey_schema::{ActorConfig, ActorKind, ConfigReference};

use super::advancer::{ActorAdvancer, Environment};
use super::behavior::BehaviorLogic;
use super::handler::HandlerLogic;
use super::LogicClass;
use crate::geometry::{angle_difference, normalize_angle, Transform2D};
use crate::shape::Shape;
use crate::space::ElementId;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ActorFlags: u32 {
        const MOVING = 1 << 0;
        /// Set for the tick in which the actor was teleported.
        const WARP = 1 << 1;
    }
}

/// Network-visible actor state.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub id: i32,
    pub config: ConfigReference,
    pub created: i32,
    pub translation: Vec2,
    pub rotation: f32,
    /// Heading of movement; agents keep it equal to their rotation.
    pub direction: f32,
    pub flags: ActorFlags,
    pub destroyed: Option<i32>,
}

impl Actor {
    pub fn new(id: i32, config: ConfigReference, created: i32) -> Self {
        Self {
            id,
            config,
            created,
            translation: Vec2::ZERO,
            rotation: 0.0,
            direction: 0.0,
            flags: ActorFlags::empty(),
            destroyed: None,
        }
    }

    pub fn transform(&self) -> Transform2D {
        Transform2D::new(self.translation, self.rotation)
    }

    pub fn is_moving(&self) -> bool {
        self.flags.contains(ActorFlags::MOVING)
    }

    pub fn is_warped(&self) -> bool {
        self.flags.contains(ActorFlags::WARP)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.is_some()
    }
}

/// Physics and sleep state of a mobile actor.
#[derive(Debug, Clone)]
pub struct Mobility {
    pub advancer: ActorAdvancer,
    /// Timestamp of the last snapshot taken of the actor.
    pub last_seen: i32,
    pub sleeping: bool,
}

#[derive(Debug)]
pub struct AgentState {
    pub target_rotation: f32,
    pub turn_rate: f32,
    /// Taken out while it runs.
    pub behavior: Option<BehaviorLogic>,
}

/// One client input sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputFrame {
    pub timestamp: i32,
    pub rotation: f32,
    pub direction: f32,
    pub moving: bool,
}

#[derive(Debug, Default)]
pub struct PawnState {
    inputs: VecDeque<InputFrame>,
}

impl PawnState {
    /// Queues a frame, keeping the queue in timestamp order.
    pub fn enqueue(&mut self, frame: InputFrame) {
        let index = self
            .inputs
            .iter()
            .rposition(|queued| queued.timestamp <= frame.timestamp)
            .map_or(0, |index| index + 1);
        self.inputs.insert(index, frame);
    }

    pub fn pending(&self) -> usize {
        self.inputs.len()
    }

    /// Applies every frame due at `timestamp`, oldest first.
    pub fn apply(&mut self, actor: &mut Actor, timestamp: i32) -> usize {
        let mut applied = 0;
        while self
            .inputs
            .front()
            .is_some_and(|frame| frame.timestamp <= timestamp)
        {
            let Some(frame) = self.inputs.pop_front() else {
                break;
            };
            actor.rotation = normalize_angle(frame.rotation);
            actor.direction = normalize_angle(frame.direction);
            actor.flags.set(ActorFlags::MOVING, frame.moving);
            applied += 1;
        }
        applied
    }
}

/// Server-side wrapper around an [`Actor`].
///
/// Capabilities are layered by the config's [`ActorKind`]: mobile actors get
/// an advancer, agents add turn-rate-limited rotation and a behavior, pawns add
/// an input queue.
#[derive(Debug)]
pub struct ActorLogic {
    actor: Actor,
    config: Arc<ActorConfig>,
    shape: Option<Shape>,
    pub(crate) element: Option<ElementId>,
    pub(crate) handlers: Vec<HandlerLogic>,
    pub(crate) variables: BTreeMap<String, f64>,
    pub(crate) mobility: Option<Mobility>,
    pub(crate) agent: Option<AgentState>,
    pub(crate) pawn: Option<PawnState>,
    snapshot: Option<(i32, Actor)>,
}

impl ActorLogic {
    pub fn new(actor: Actor, config: Arc<ActorConfig>, timestamp: i32) -> Self {
        let shape = config.shape.as_ref().map(Shape::from_config);
        let mobile = matches!(
            config.kind,
            ActorKind::Mobile | ActorKind::Agent | ActorKind::Pawn
        );
        let mobility = mobile.then(|| Mobility {
            advancer: ActorAdvancer::new(timestamp),
            last_seen: timestamp,
            sleeping: false,
        });
        let agent = (config.kind == ActorKind::Agent).then(|| AgentState {
            target_rotation: actor.rotation,
            turn_rate: config.turn_rate,
            behavior: None,
        });
        let pawn = (config.kind == ActorKind::Pawn).then(PawnState::default);
        Self {
            actor,
            config,
            shape,
            element: None,
            handlers: Vec::new(),
            variables: BTreeMap::new(),
            mobility,
            agent,
            pawn,
            snapshot: None,
        }
    }

    pub fn id(&self) -> i32 {
        self.actor.id
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub(crate) fn actor_mut(&mut self) -> &mut Actor {
        &mut self.actor
    }

    pub fn config(&self) -> &Arc<ActorConfig> {
        &self.config
    }

    pub fn class(&self) -> LogicClass {
        if self.pawn.is_some() {
            LogicClass::Pawn
        } else if self.agent.is_some() {
            LogicClass::Agent
        } else if self.mobility.is_some() {
            LogicClass::Mobile
        } else {
            LogicClass::Actor
        }
    }

    pub fn translation(&self) -> Vec2 {
        self.actor.translation
    }

    pub fn rotation(&self) -> f32 {
        self.actor.rotation
    }

    pub fn is_active(&self) -> bool {
        !self.actor.is_destroyed()
    }

    pub fn is_moving(&self) -> bool {
        self.actor.is_moving()
    }

    pub fn is_sleeping(&self) -> bool {
        self.mobility.as_ref().is_some_and(|mobility| mobility.sleeping)
    }

    /// Shape in actor-local coordinates.
    pub fn local_shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    pub fn world_shape(&self) -> Option<Shape> {
        self.shape
            .as_ref()
            .map(|shape| shape.transformed(&self.actor.transform()))
    }

    pub fn handlers(&self) -> &[HandlerLogic] {
        &self.handlers
    }

    pub fn variable(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }

    pub fn agent(&self) -> Option<&AgentState> {
        self.agent.as_ref()
    }

    pub fn behavior(&self) -> Option<&BehaviorLogic> {
        self.agent.as_ref().and_then(|agent| agent.behavior.as_ref())
    }

    pub fn pawn(&self) -> Option<&PawnState> {
        self.pawn.as_ref()
    }

    pub fn target_rotation(&self) -> Option<f32> {
        self.agent.as_ref().map(|agent| agent.target_rotation)
    }

    /// True when an agent has finished turning toward its target rotation.
    pub fn is_facing_target(&self) -> bool {
        self.agent.as_ref().map_or(true, |agent| {
            angle_difference(agent.target_rotation, self.actor.rotation).abs() < 1e-4
        })
    }

    pub(crate) fn set_moving(&mut self, moving: bool) {
        self.actor.flags.set(ActorFlags::MOVING, moving);
        if moving && self.agent.is_some() {
            self.actor.direction = self.actor.rotation;
        }
    }

    pub(crate) fn set_target_rotation(&mut self, rotation: f32) {
        if let Some(agent) = self.agent.as_mut() {
            agent.target_rotation = normalize_angle(rotation);
        }
    }

    /// Turns an agent toward its target rotation by at most `turn_rate * seconds`.
    pub(crate) fn turn(&mut self, seconds: f32) {
        let Some(agent) = self.agent.as_ref() else {
            return;
        };
        let difference = angle_difference(agent.target_rotation, self.actor.rotation);
        let step = agent.turn_rate.max(0.0) * seconds;
        self.actor.rotation = if difference.abs() <= step {
            agent.target_rotation
        } else {
            normalize_angle(self.actor.rotation + step.copysign(difference))
        };
        self.actor.direction = self.actor.rotation;
    }

    /// Applies the pawn input frames due at `timestamp`.
    pub(crate) fn apply_inputs(&mut self, timestamp: i32) -> usize {
        match self.pawn.as_mut() {
            Some(pawn) => pawn.apply(&mut self.actor, timestamp),
            None => 0,
        }
    }

    /// Integrates movement up to `timestamp`, returning the averaged
    /// penetration resolved against `environment`.
    pub(crate) fn advance(&mut self, timestamp: i32, environment: &dyn Environment) -> Option<Vec2> {
        let mobility = self.mobility.as_mut()?;
        mobility.advancer.advance(
            &mut self.actor,
            self.config.speed,
            self.shape.as_ref(),
            timestamp,
            environment,
        )
    }

    /// Copy of the actor state, cached for the tick at `timestamp`.
    pub(crate) fn snapshot(&mut self, timestamp: i32) -> Actor {
        match &self.snapshot {
            Some((taken, actor)) if *taken == timestamp => actor.clone(),
            _ => {
                let actor = self.actor.clone();
                self.snapshot = Some((timestamp, actor.clone()));
                actor
            }
        }
    }

    pub(crate) fn invalidate_snapshot(&mut self) {
        self.snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn agent_logic() -> ActorLogic {
        let config = ActorConfig {
            kind: ActorKind::Agent,
            turn_rate: PI,
            ..ActorConfig::default()
        };
        ActorLogic::new(
            Actor::new(3, ConfigReference::new("actor/agent"), 0),
            Arc::new(config),
            0,
        )
    }

    #[test]
    fn kind_selects_capabilities() {
        let agent = agent_logic();
        assert_eq!(agent.class(), LogicClass::Agent);
        assert!(agent.mobility.is_some());
        let rock = ActorLogic::new(
            Actor::new(1, ConfigReference::new("actor/rock"), 0),
            Arc::new(ActorConfig::default()),
            0,
        );
        assert_eq!(rock.class(), LogicClass::Actor);
        assert!(rock.mobility.is_none());
    }

    #[test]
    fn turning_is_rate_limited() {
        let mut agent = agent_logic();
        agent.set_target_rotation(FRAC_PI_2 + 0.5);
        agent.turn(0.25);
        assert!((agent.rotation() - PI / 4.0).abs() < 1e-5);
        assert!(!agent.is_facing_target());
        agent.turn(1.0);
        assert!(agent.is_facing_target());
        assert_eq!(agent.actor().direction, agent.rotation());
    }

    #[test]
    fn turning_takes_the_short_way_round() {
        let mut agent = agent_logic();
        agent.set_target_rotation(-0.3);
        agent.turn(0.05);
        assert!(agent.rotation() < 0.0);
    }

    #[test]
    fn inputs_apply_in_timestamp_order() {
        let mut pawn = PawnState::default();
        let mut actor = Actor::new(1, ConfigReference::new("actor/player"), 0);
        for (timestamp, moving) in [(200, false), (100, true), (300, true)] {
            pawn.enqueue(InputFrame {
                timestamp,
                rotation: timestamp as f32 / 1_000.0,
                direction: 0.0,
                moving,
            });
        }
        assert_eq!(pawn.apply(&mut actor, 250), 2);
        assert!(!actor.is_moving());
        assert!((actor.rotation - 0.2).abs() < 1e-6);
        assert_eq!(pawn.pending(), 1);
    }

    #[test]
    fn snapshot_is_cached_per_tick() {
        let mut agent = agent_logic();
        let first = agent.snapshot(100);
        agent.actor_mut().translation = Vec2::new(5.0, 0.0);
        assert_eq!(agent.snapshot(100), first);
        assert_eq!(agent.snapshot(200).translation, Vec2::new(5.0, 0.0));
    }
}
