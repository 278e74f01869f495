use rand::Rng;
use tudey_schema::{ExpressionConfig, VariableScope};

use super::target::TargetLogic;
use super::LogicContext;
use crate::manager::SceneManager;

#[derive(Debug)]
pub enum ExpressionLogic {
    Constant(f64),
    Variable {
        scope: VariableScope,
        name: String,
        default: f64,
    },
    Timestamp,
    Random { minimum: f64, maximum: f64 },
    Add(Box<ExpressionLogic>, Box<ExpressionLogic>),
    Subtract(Box<ExpressionLogic>, Box<ExpressionLogic>),
    Multiply(Box<ExpressionLogic>, Box<ExpressionLogic>),
    Divide(Box<ExpressionLogic>, Box<ExpressionLogic>),
    Negate(Box<ExpressionLogic>),
    Distance(TargetLogic, TargetLogic),
}

fn boxed(config: &ExpressionConfig) -> Box<ExpressionLogic> {
    Box::new(ExpressionLogic::new(config))
}

impl ExpressionLogic {
    pub fn new(config: &ExpressionConfig) -> Self {
        match config {
            ExpressionConfig::Constant { value } => ExpressionLogic::Constant(*value),
            ExpressionConfig::Variable {
                scope,
                name,
                default,
            } => ExpressionLogic::Variable {
                scope: *scope,
                name: name.clone(),
                default: *default,
            },
            ExpressionConfig::Timestamp => ExpressionLogic::Timestamp,
            ExpressionConfig::Random { minimum, maximum } => ExpressionLogic::Random {
                minimum: *minimum,
                maximum: *maximum,
            },
            ExpressionConfig::Add { first, second } => {
                ExpressionLogic::Add(boxed(first), boxed(second))
            }
            ExpressionConfig::Subtract { first, second } => {
                ExpressionLogic::Subtract(boxed(first), boxed(second))
            }
            ExpressionConfig::Multiply { first, second } => {
                ExpressionLogic::Multiply(boxed(first), boxed(second))
            }
            ExpressionConfig::Divide { first, second } => {
                ExpressionLogic::Divide(boxed(first), boxed(second))
            }
            ExpressionConfig::Negate { operand } => ExpressionLogic::Negate(boxed(operand)),
            ExpressionConfig::Distance { first, second } => {
                ExpressionLogic::Distance(TargetLogic::new(first), TargetLogic::new(second))
            }
        }
    }

    pub fn evaluate(&self, manager: &mut SceneManager, context: &LogicContext) -> f64 {
        match self {
            ExpressionLogic::Constant(value) => *value,
            ExpressionLogic::Variable {
                scope,
                name,
                default,
            } => {
                let value = match scope {
                    VariableScope::Source => manager.variable(context.source, name),
                    VariableScope::Activator => context
                        .activator
                        .and_then(|activator| manager.variable(activator, name)),
                    VariableScope::Global => manager.global_variable(name),
                };
                value.unwrap_or(*default)
            }
            ExpressionLogic::Timestamp => manager.timestamp() as f64 / 1_000.0,
            ExpressionLogic::Random { minimum, maximum } => {
                if maximum > minimum {
                    manager.rng().gen_range(*minimum..*maximum)
                } else {
                    *minimum
                }
            }
            ExpressionLogic::Add(first, second) => {
                first.evaluate(manager, context) + second.evaluate(manager, context)
            }
            ExpressionLogic::Subtract(first, second) => {
                first.evaluate(manager, context) - second.evaluate(manager, context)
            }
            ExpressionLogic::Multiply(first, second) => {
                first.evaluate(manager, context) * second.evaluate(manager, context)
            }
            ExpressionLogic::Divide(first, second) => {
                let numerator = first.evaluate(manager, context);
                let denominator = second.evaluate(manager, context);
                if denominator == 0.0 {
                    tracing::warn!(
                        target: "tudey::logic",
                        source = %context.source,
                        "expression.divide_by_zero"
                    );
                    return 0.0;
                }
                numerator / denominator
            }
            ExpressionLogic::Negate(operand) => -operand.evaluate(manager, context),
            ExpressionLogic::Distance(first, second) => {
                let first = first
                    .resolve_first(manager, context)
                    .and_then(|logic| manager.translation(logic));
                let second = second
                    .resolve_first(manager, context)
                    .and_then(|logic| manager.translation(logic));
                match (first, second) {
                    (Some(a), Some(b)) => a.distance(b) as f64,
                    _ => 0.0,
                }
            }
        }
    }
}
