use tudey_schema::{Comparator, ConditionConfig};

use super::expression::ExpressionLogic;
use super::target::TargetLogic;
use super::{LogicClass, LogicContext};
use crate::manager::SceneManager;

/// Boolean predicates over resolved targets.
#[derive(Debug)]
pub enum ConditionLogic {
    Constant(bool),
    Tagged {
        tag: String,
        target: TargetLogic,
    },
    /// `None` when the class name did not resolve; never satisfied.
    InstanceOf {
        class: Option<LogicClass>,
        target: TargetLogic,
    },
    DistanceWithin {
        first: TargetLogic,
        second: TargetLogic,
        minimum: f32,
        maximum: f32,
    },
    All(Vec<ConditionLogic>),
    Any(Vec<ConditionLogic>),
    Not(Box<ConditionLogic>),
    Comparison {
        comparator: Comparator,
        first: ExpressionLogic,
        second: ExpressionLogic,
    },
}

impl ConditionLogic {
    pub fn new(config: &ConditionConfig) -> Self {
        match config {
            ConditionConfig::Constant { value } => ConditionLogic::Constant(*value),
            ConditionConfig::Tagged { tag, target } => ConditionLogic::Tagged {
                tag: tag.clone(),
                target: TargetLogic::new(target),
            },
            ConditionConfig::InstanceOf {
                logic_class,
                target,
            } => {
                let class = LogicClass::from_name(logic_class);
                if class.is_none() {
                    tracing::warn!(
                        target: "tudey::logic",
                        class = %logic_class,
                        "condition.instance_of_failed=unknown_class"
                    );
                }
                ConditionLogic::InstanceOf {
                    class,
                    target: TargetLogic::new(target),
                }
            }
            ConditionConfig::DistanceWithin {
                first,
                second,
                minimum,
                maximum,
            } => ConditionLogic::DistanceWithin {
                first: TargetLogic::new(first),
                second: TargetLogic::new(second),
                minimum: *minimum,
                maximum: *maximum,
            },
            ConditionConfig::All { conditions } => {
                ConditionLogic::All(conditions.iter().map(ConditionLogic::new).collect())
            }
            ConditionConfig::Any { conditions } => {
                ConditionLogic::Any(conditions.iter().map(ConditionLogic::new).collect())
            }
            ConditionConfig::Not { condition } => {
                ConditionLogic::Not(Box::new(ConditionLogic::new(condition)))
            }
            ConditionConfig::Comparison {
                comparator,
                first,
                second,
            } => ConditionLogic::Comparison {
                comparator: *comparator,
                first: ExpressionLogic::new(first),
                second: ExpressionLogic::new(second),
            },
        }
    }

    pub fn is_satisfied(&self, manager: &mut SceneManager, context: &LogicContext) -> bool {
        match self {
            ConditionLogic::Constant(value) => *value,
            ConditionLogic::Tagged { tag, target } => {
                let mut targets = Vec::new();
                target.resolve(manager, context, &mut targets);
                targets.into_iter().any(|logic| manager.has_tag(logic, tag))
            }
            ConditionLogic::InstanceOf { class, target } => {
                let Some(class) = class else {
                    return false;
                };
                let mut targets = Vec::new();
                target.resolve(manager, context, &mut targets);
                targets.into_iter().any(|logic| {
                    manager
                        .logic_class(logic)
                        .is_some_and(|actual| actual.is_a(*class))
                })
            }
            ConditionLogic::DistanceWithin {
                first,
                second,
                minimum,
                maximum,
            } => {
                let mut firsts = Vec::new();
                first.resolve(manager, context, &mut firsts);
                let mut seconds = Vec::new();
                second.resolve(manager, context, &mut seconds);
                let (minimum, maximum) = (minimum * minimum, maximum * maximum);
                firsts
                    .iter()
                    .filter_map(|logic| manager.translation(*logic))
                    .any(|a| {
                        seconds
                            .iter()
                            .filter_map(|logic| manager.translation(*logic))
                            .any(|b| {
                                let distance = a.distance_squared(b);
                                distance >= minimum && distance <= maximum
                            })
                    })
            }
            ConditionLogic::All(conditions) => conditions
                .iter()
                .all(|condition| condition.is_satisfied(manager, context)),
            ConditionLogic::Any(conditions) => conditions
                .iter()
                .any(|condition| condition.is_satisfied(manager, context)),
            ConditionLogic::Not(condition) => !condition.is_satisfied(manager, context),
            ConditionLogic::Comparison {
                comparator,
                first,
                second,
            } => {
                let first = first.evaluate(manager, context);
                let second = second.evaluate(manager, context);
                comparator.compare(first, second)
            }
        }
    }
}
