use tudey_schema::{ActionConfig, ConfigReference};

use super::condition::ConditionLogic;
use super::expression::ExpressionLogic;
use super::target::TargetLogic;
use super::{millis, weighted_index, LogicContext, LogicRef};
use crate::manager::SceneManager;

/// Effects run by handlers and scripts. `execute` reports whether anything
/// happened.
#[derive(Debug)]
pub enum ActionLogic {
    SpawnActor {
        actor: ConfigReference,
        location: TargetLogic,
        rotation: f32,
    },
    DestroyActor {
        target: TargetLogic,
    },
    WarpActor {
        target: TargetLogic,
        location: TargetLogic,
    },
    FireEffect {
        effect: ConfigReference,
        location: TargetLogic,
    },
    Signal {
        name: String,
        target: TargetLogic,
    },
    MoveBody {
        target: TargetLogic,
        scene: String,
        portal: String,
    },
    Conditional {
        condition: ConditionLogic,
        action: Box<ActionLogic>,
        else_action: Option<Box<ActionLogic>>,
    },
    Compound(Vec<ActionLogic>),
    Random {
        weights: Vec<f32>,
        actions: Vec<ActionLogic>,
    },
    SetVariable {
        target: TargetLogic,
        name: String,
        value: ExpressionLogic,
    },
    /// Built lazily when the delay elapses.
    Delayed {
        delay: i32,
        action: ActionConfig,
    },
}

impl ActionLogic {
    pub fn new(config: &ActionConfig) -> Self {
        match config {
            ActionConfig::SpawnActor {
                actor,
                location,
                rotation,
            } => ActionLogic::SpawnActor {
                actor: actor.clone(),
                location: TargetLogic::new(location),
                rotation: *rotation,
            },
            ActionConfig::DestroyActor { target } => ActionLogic::DestroyActor {
                target: TargetLogic::new(target),
            },
            ActionConfig::WarpActor { target, location } => ActionLogic::WarpActor {
                target: TargetLogic::new(target),
                location: TargetLogic::new(location),
            },
            ActionConfig::FireEffect { effect, location } => ActionLogic::FireEffect {
                effect: effect.clone(),
                location: TargetLogic::new(location),
            },
            ActionConfig::Signal { name, target } => ActionLogic::Signal {
                name: name.clone(),
                target: TargetLogic::new(target),
            },
            ActionConfig::MoveBody {
                target,
                scene,
                portal,
            } => ActionLogic::MoveBody {
                target: TargetLogic::new(target),
                scene: scene.clone(),
                portal: portal.clone(),
            },
            ActionConfig::Conditional {
                condition,
                action,
                else_action,
            } => ActionLogic::Conditional {
                condition: ConditionLogic::new(condition),
                action: Box::new(ActionLogic::new(action)),
                else_action: else_action
                    .as_ref()
                    .map(|action| Box::new(ActionLogic::new(action))),
            },
            ActionConfig::Compound { actions } => {
                ActionLogic::Compound(actions.iter().map(ActionLogic::new).collect())
            }
            ActionConfig::Random { actions } => ActionLogic::Random {
                weights: actions.iter().map(|weighted| weighted.weight).collect(),
                actions: actions
                    .iter()
                    .map(|weighted| ActionLogic::new(&weighted.action))
                    .collect(),
            },
            ActionConfig::SetVariable {
                target,
                name,
                value,
            } => ActionLogic::SetVariable {
                target: TargetLogic::new(target),
                name: name.clone(),
                value: ExpressionLogic::new(value),
            },
            ActionConfig::Delayed { delay, action } => ActionLogic::Delayed {
                delay: millis(*delay).max(0),
                action: (**action).clone(),
            },
        }
    }

    pub fn execute(&self, manager: &mut SceneManager, context: &LogicContext) -> bool {
        match self {
            ActionLogic::SpawnActor {
                actor,
                location,
                rotation,
            } => {
                let mut locations = Vec::new();
                location.resolve(manager, context, &mut locations);
                let mut spawned = false;
                for logic in locations {
                    let Some(transform) = manager.transform(logic) else {
                        continue;
                    };
                    spawned |= manager
                        .spawn_actor(actor, transform.translation, transform.rotation + rotation)
                        .is_some();
                }
                spawned
            }
            ActionLogic::DestroyActor { target } => {
                let mut destroyed = false;
                for id in resolve_actors(target, manager, context) {
                    destroyed |= manager.destroy_actor(id);
                }
                destroyed
            }
            ActionLogic::WarpActor { target, location } => {
                let Some(destination) = location
                    .resolve_first(manager, context)
                    .and_then(|logic| manager.transform(logic))
                else {
                    return false;
                };
                let mut warped = false;
                for id in resolve_actors(target, manager, context) {
                    warped |= manager.warp_actor(id, destination.translation, destination.rotation);
                }
                warped
            }
            ActionLogic::FireEffect { effect, location } => {
                let mut locations = Vec::new();
                location.resolve(manager, context, &mut locations);
                let mut fired = false;
                for logic in locations {
                    if let Some(transform) = manager.transform(logic) {
                        fired |= manager.fire_effect(effect, transform.translation, transform.rotation);
                    }
                }
                fired
            }
            ActionLogic::Signal { name, target } => {
                let mut targets = Vec::new();
                target.resolve(manager, context, &mut targets);
                let mut handled = false;
                for logic in targets {
                    handled |= manager.signal(logic, Some(context.source), name);
                }
                handled
            }
            ActionLogic::MoveBody {
                target,
                scene,
                portal,
            } => {
                let mut moved = false;
                for id in resolve_actors(target, manager, context) {
                    moved |= manager.move_body(id, scene, portal);
                }
                moved
            }
            ActionLogic::Conditional {
                condition,
                action,
                else_action,
            } => {
                if condition.is_satisfied(manager, context) {
                    action.execute(manager, context)
                } else if let Some(else_action) = else_action {
                    else_action.execute(manager, context)
                } else {
                    false
                }
            }
            ActionLogic::Compound(actions) => {
                let mut any = false;
                for action in actions {
                    any |= action.execute(manager, context);
                }
                any
            }
            ActionLogic::Random { weights, actions } => {
                match weighted_index(weights, manager.rng()) {
                    Some(index) => actions[index].execute(manager, context),
                    None => false,
                }
            }
            ActionLogic::SetVariable {
                target,
                name,
                value,
            } => {
                let mut targets = Vec::new();
                target.resolve(manager, context, &mut targets);
                let value = value.evaluate(manager, context);
                let mut set = false;
                for logic in targets {
                    set |= manager.set_variable(logic, name, value);
                }
                set
            }
            ActionLogic::Delayed { delay, action } => {
                manager.schedule_action(*delay, action.clone(), *context);
                true
            }
        }
    }
}

fn resolve_actors(
    target: &TargetLogic,
    manager: &mut SceneManager,
    context: &LogicContext,
) -> Vec<i32> {
    let mut targets = Vec::new();
    target.resolve(manager, context, &mut targets);
    targets
        .into_iter()
        .filter_map(|logic| match logic {
            LogicRef::Actor(id) => Some(id),
            LogicRef::Entry(_) => None,
        })
        .collect()
}
