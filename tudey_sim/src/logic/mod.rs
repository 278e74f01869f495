//! Server-side scripting engine.
//!
//! Logic nodes are built once from the declarative config trees in
//! `tudey_schema` and then driven by the [`crate::SceneManager`]. Nodes never
//! hold references to each other or to the manager: they name other logics
//! through [`LogicRef`] and receive `&mut SceneManager` when they run.

mod action;
mod actor;
mod advancer;
mod behavior;
mod condition;
mod entry;
mod expression;
mod handler;
mod region;
mod script;
mod target;

pub use action::ActionLogic;
pub use actor::{Actor, ActorFlags, ActorLogic, AgentState, InputFrame, Mobility, PawnState};
pub use advancer::{ActorAdvancer, Environment};
pub use behavior::{
    BehaviorLogic, Evaluation, Follow, Pathing, Patrol, RandomBehavior, Wander, WanderPhase,
};
pub use condition::ConditionLogic;
pub use entry::EntryLogic;
pub use expression::ExpressionLogic;
pub use handler::{HandlerLogic, Trigger};
pub use region::RegionLogic;
pub use script::ScriptLogic;
pub use target::TargetLogic;

use std::fmt;

use rand::Rng;
use tudey_schema::VariableRange;

use crate::model::EntryKey;

/// Stable handle to a live logic: an actor by id or a scene entry by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicRef {
    Actor(i32),
    Entry(EntryKey),
}

impl fmt::Display for LogicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicRef::Actor(id) => write!(f, "actor#{id}"),
            LogicRef::Entry(key) => write!(f, "{key}"),
        }
    }
}

/// Who is running a node and who caused it to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicContext {
    pub source: LogicRef,
    pub activator: Option<LogicRef>,
}

impl LogicContext {
    pub fn new(source: LogicRef) -> Self {
        Self {
            source,
            activator: None,
        }
    }

    pub fn activated_by(source: LogicRef, activator: Option<LogicRef>) -> Self {
        Self { source, activator }
    }
}

/// Logic kinds addressable by `InstanceOf` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicClass {
    Logic,
    Entry,
    Actor,
    Mobile,
    /// Shared class of actors that steer their own rotation. No actor is an
    /// `Active` directly; agents and pawns match it through the hierarchy.
    Active,
    Agent,
    Pawn,
}

impl LogicClass {
    /// Accepts bare (`AgentLogic`, `Agent`) or qualified
    /// (`tudey.logic.AgentLogic`) class names.
    pub fn from_name(name: &str) -> Option<Self> {
        let simple = name.rsplit(['.', '$', ':']).next().unwrap_or(name);
        let simple = simple.strip_suffix("Logic").unwrap_or(simple);
        match simple {
            "" => Some(LogicClass::Logic),
            "Entry" => Some(LogicClass::Entry),
            "Actor" => Some(LogicClass::Actor),
            "Mobile" => Some(LogicClass::Mobile),
            "Active" => Some(LogicClass::Active),
            "Agent" => Some(LogicClass::Agent),
            "Pawn" => Some(LogicClass::Pawn),
            _ => None,
        }
    }

    fn parent(self) -> Option<Self> {
        match self {
            LogicClass::Logic => None,
            LogicClass::Entry | LogicClass::Actor => Some(LogicClass::Logic),
            LogicClass::Mobile => Some(LogicClass::Actor),
            LogicClass::Active => Some(LogicClass::Mobile),
            LogicClass::Agent | LogicClass::Pawn => Some(LogicClass::Active),
        }
    }

    pub fn is_a(self, other: LogicClass) -> bool {
        let mut class = Some(self);
        while let Some(current) = class {
            if current == other {
                return true;
            }
            class = current.parent();
        }
        false
    }
}

/// Seconds to milliseconds, rounding to the nearest millisecond.
pub(crate) fn millis(seconds: f32) -> i32 {
    (seconds * 1_000.0).round() as i32
}

/// Random duration in milliseconds drawn from an inclusive range of seconds.
pub(crate) fn sample_millis(range: &VariableRange, rng: &mut impl Rng) -> i32 {
    let (low, high) = if range.minimum <= range.maximum {
        (range.minimum, range.maximum)
    } else {
        (range.maximum, range.minimum)
    };
    if high <= low {
        return millis(low);
    }
    millis(rng.gen_range(low..=high))
}

/// Index chosen with probability proportional to its weight; `None` when no
/// weight is positive.
pub(crate) fn weighted_index(weights: &[f32], rng: &mut impl Rng) -> Option<usize> {
    let total: f32 = weights.iter().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return None;
    }
    let mut pick = rng.gen_range(0.0..total);
    for (index, weight) in weights.iter().enumerate() {
        if *weight <= 0.0 {
            continue;
        }
        if pick < *weight {
            return Some(index);
        }
        pick -= weight;
    }
    weights.iter().rposition(|w| *w > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn class_names_resolve_with_or_without_packages() {
        assert_eq!(LogicClass::from_name("AgentLogic"), Some(LogicClass::Agent));
        assert_eq!(
            LogicClass::from_name("tudey.server.logic.PawnLogic"),
            Some(LogicClass::Pawn)
        );
        assert_eq!(LogicClass::from_name("Logic"), Some(LogicClass::Logic));
        assert_eq!(LogicClass::from_name("FishLogic"), None);
    }

    #[test]
    fn class_hierarchy_is_transitive() {
        assert!(LogicClass::Agent.is_a(LogicClass::Mobile));
        assert!(LogicClass::Pawn.is_a(LogicClass::Logic));
        assert!(!LogicClass::Entry.is_a(LogicClass::Actor));
        assert!(!LogicClass::Actor.is_a(LogicClass::Agent));
    }

    #[test]
    fn active_matches_steering_actors_only() {
        assert_eq!(LogicClass::from_name("ActiveLogic"), Some(LogicClass::Active));
        assert!(LogicClass::Agent.is_a(LogicClass::Active));
        assert!(LogicClass::Pawn.is_a(LogicClass::Active));
        assert!(!LogicClass::Mobile.is_a(LogicClass::Active));
        assert!(!LogicClass::Actor.is_a(LogicClass::Active));
        assert!(LogicClass::Active.is_a(LogicClass::Mobile));
    }

    #[test]
    fn weighted_choice_skips_zero_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..64 {
            assert_eq!(weighted_index(&[0.0, 2.0, 0.0], &mut rng), Some(1));
        }
        assert_eq!(weighted_index(&[0.0, -1.0], &mut rng), None);
    }

    #[test]
    fn sampled_durations_stay_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let range = VariableRange {
            minimum: 0.5,
            maximum: 1.5,
        };
        for _ in 0..64 {
            let value = sample_millis(&range, &mut rng);
            assert!((500..=1_500).contains(&value));
        }
        assert_eq!(sample_millis(&VariableRange::constant(0.25), &mut rng), 250);
    }
}
