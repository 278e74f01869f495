//! Declarative trees for the scripting layer: targets, regions, conditions,
//! expressions, actions and handlers.

use serde::{Deserialize, Serialize};

use crate::reference::ConfigReference;
use crate::shape::{ShapeConfig, TransformConfig};

/// Inclusive random range in seconds (or world units, depending on use).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariableRange {
    pub minimum: f32,
    pub maximum: f32,
}

impl VariableRange {
    pub fn constant(value: f32) -> Self {
        Self {
            minimum: value,
            maximum: value,
        }
    }
}

impl Default for VariableRange {
    fn default() -> Self {
        Self::constant(1.0)
    }
}

/// Resolves "who" an action or condition applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TargetConfig {
    Source,
    Activator,
    Tagged {
        tag: String,
        /// Random subset size when more logics carry the tag; zero keeps all.
        #[serde(default)]
        limit: usize,
    },
    Compound {
        targets: Vec<TargetConfig>,
    },
    Intersecting {
        region: Box<RegionConfig>,
    },
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig::Source
    }
}

/// Resolves "where": one or more world-space shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegionConfig {
    /// The source's own shape.
    Default,
    Located {
        location: TargetConfig,
        shape: ShapeConfig,
    },
    /// Shape placed relative to the source's transform.
    Transformed {
        #[serde(default)]
        transform: TransformConfig,
        shape: ShapeConfig,
    },
    /// Shape placed in world coordinates.
    Fixed {
        #[serde(default)]
        transform: TransformConfig,
        shape: ShapeConfig,
    },
}

impl Default for RegionConfig {
    fn default() -> Self {
        RegionConfig::Default
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    Less,
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
}

impl Comparator {
    pub fn compare(self, first: f64, second: f64) -> bool {
        match self {
            Comparator::Less => first < second,
            Comparator::LessEqual => first <= second,
            Comparator::Equal => first == second,
            Comparator::NotEqual => first != second,
            Comparator::GreaterEqual => first >= second,
            Comparator::Greater => first > second,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConditionConfig {
    Constant {
        value: bool,
    },
    Tagged {
        tag: String,
        #[serde(default)]
        target: TargetConfig,
    },
    InstanceOf {
        logic_class: String,
        #[serde(default)]
        target: TargetConfig,
    },
    DistanceWithin {
        first: TargetConfig,
        second: TargetConfig,
        #[serde(default)]
        minimum: f32,
        maximum: f32,
    },
    All {
        conditions: Vec<ConditionConfig>,
    },
    Any {
        conditions: Vec<ConditionConfig>,
    },
    Not {
        condition: Box<ConditionConfig>,
    },
    Comparison {
        comparator: Comparator,
        first: ExpressionConfig,
        second: ExpressionConfig,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VariableScope {
    #[default]
    Source,
    Activator,
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExpressionConfig {
    Constant {
        value: f64,
    },
    Variable {
        #[serde(default)]
        scope: VariableScope,
        name: String,
        #[serde(default)]
        default: f64,
    },
    /// Current scene timestamp in seconds.
    Timestamp,
    Random {
        minimum: f64,
        maximum: f64,
    },
    Add {
        first: Box<ExpressionConfig>,
        second: Box<ExpressionConfig>,
    },
    Subtract {
        first: Box<ExpressionConfig>,
        second: Box<ExpressionConfig>,
    },
    Multiply {
        first: Box<ExpressionConfig>,
        second: Box<ExpressionConfig>,
    },
    Divide {
        first: Box<ExpressionConfig>,
        second: Box<ExpressionConfig>,
    },
    Negate {
        operand: Box<ExpressionConfig>,
    },
    Distance {
        first: TargetConfig,
        second: TargetConfig,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedAction {
    #[serde(default = "default_weight")]
    pub weight: f32,
    pub action: ActionConfig,
}

pub(crate) fn default_weight() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionConfig {
    SpawnActor {
        actor: ConfigReference,
        #[serde(default)]
        location: TargetConfig,
        /// Rotation offset added to the location's rotation.
        #[serde(default)]
        rotation: f32,
    },
    DestroyActor {
        #[serde(default)]
        target: TargetConfig,
    },
    WarpActor {
        #[serde(default)]
        target: TargetConfig,
        location: TargetConfig,
    },
    FireEffect {
        effect: ConfigReference,
        #[serde(default)]
        location: TargetConfig,
    },
    Signal {
        name: String,
        #[serde(default)]
        target: TargetConfig,
    },
    MoveBody {
        #[serde(default)]
        target: TargetConfig,
        scene: String,
        #[serde(default)]
        portal: String,
    },
    Conditional {
        condition: ConditionConfig,
        action: Box<ActionConfig>,
        #[serde(default)]
        else_action: Option<Box<ActionConfig>>,
    },
    Compound {
        actions: Vec<ActionConfig>,
    },
    Random {
        actions: Vec<WeightedAction>,
    },
    SetVariable {
        #[serde(default)]
        target: TargetConfig,
        name: String,
        value: ExpressionConfig,
    },
    /// Runs the wrapped action after `delay` seconds.
    Delayed {
        delay: f32,
        action: Box<ActionConfig>,
    },
}

/// What causes a handler's action to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TriggerConfig {
    Startup,
    Shutdown,
    Tick,
    Timer {
        /// Seconds between firings.
        interval: f32,
        /// Maximum number of firings; zero means unlimited.
        #[serde(default)]
        limit: u32,
    },
    Signal {
        name: String,
        #[serde(default)]
        refractory_period: f32,
    },
    SignalStart {
        name: String,
        #[serde(default)]
        refractory_period: f32,
    },
    SignalStop {
        name: String,
        #[serde(default)]
        refractory_period: f32,
    },
    Intersection {
        shape: ShapeConfig,
        #[serde(default)]
        refractory_period: f32,
    },
    IntersectionStart {
        shape: ShapeConfig,
        #[serde(default)]
        refractory_period: f32,
    },
    IntersectionStop {
        shape: ShapeConfig,
        #[serde(default)]
        refractory_period: f32,
    },
    Request {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub action: Option<ActionConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_parses_nested_action_tree() {
        let json = r#"{
            "trigger": {"type": "Signal", "name": "open", "refractory_period": 0.5},
            "action": {
                "type": "Conditional",
                "condition": {"type": "Tagged", "tag": "door"},
                "action": {"type": "FireEffect", "effect": {"name": "effect/creak"}}
            }
        }"#;
        let handler: HandlerConfig = serde_json::from_str(json).expect("handler parses");
        match handler.trigger {
            TriggerConfig::Signal {
                ref name,
                refractory_period,
            } => {
                assert_eq!(name, "open");
                assert_eq!(refractory_period, 0.5);
            }
            ref other => panic!("unexpected trigger {other:?}"),
        }
        match handler.action {
            Some(ActionConfig::Conditional { else_action, .. }) => assert!(else_action.is_none()),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn comparator_semantics() {
        assert!(Comparator::Less.compare(1.0, 2.0));
        assert!(!Comparator::Greater.compare(1.0, 2.0));
        assert!(Comparator::NotEqual.compare(1.0, 2.0));
        assert!(Comparator::GreaterEqual.compare(2.0, 2.0));
    }
}
