use tudey_schema::ScriptStepConfig;

use super::action::ActionLogic;
use super::behavior::Pathing;
use super::condition::ConditionLogic;
use super::target::TargetLogic;
use super::{millis, LogicContext, LogicRef};
use crate::manager::SceneManager;

#[derive(Debug)]
enum Step {
    Wait(i32),
    Rotate(f32),
    Move(TargetLogic),
    Action(ActionLogic),
    Condition { condition: ConditionLogic, step: usize },
    Goto(usize),
}

#[derive(Debug, Default)]
enum StepState {
    #[default]
    Fresh,
    Waiting { until: i32 },
    Rotating,
    Moving(Pathing),
}

/// Runs a fixed sequence of steps for an agent.
#[derive(Debug)]
pub struct ScriptLogic {
    steps: Vec<Step>,
    looping: bool,
    index: usize,
    state: StepState,
    finished: bool,
}

impl ScriptLogic {
    pub fn new(steps: &[ScriptStepConfig], looping: bool) -> Self {
        let steps = steps
            .iter()
            .map(|step| match step {
                ScriptStepConfig::Wait { duration } => Step::Wait(millis(*duration).max(0)),
                ScriptStepConfig::Rotate { rotation } => Step::Rotate(*rotation),
                ScriptStepConfig::Move { location } => Step::Move(TargetLogic::new(location)),
                ScriptStepConfig::Action { action } => Step::Action(ActionLogic::new(action)),
                ScriptStepConfig::Condition { condition, step } => Step::Condition {
                    condition: ConditionLogic::new(condition),
                    step: *step,
                },
                ScriptStepConfig::Goto { step } => Step::Goto(*step),
            })
            .collect();
        Self {
            steps,
            looping,
            index: 0,
            state: StepState::Fresh,
            finished: false,
        }
    }

    /// Index of the step currently running.
    pub fn step(&self) -> usize {
        self.index
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn jump(&mut self, step: usize) {
        self.index = step;
        self.state = StepState::Fresh;
    }

    pub fn tick(&mut self, manager: &mut SceneManager, agent: i32) {
        if self.finished {
            return;
        }
        let now = manager.timestamp();
        let context = LogicContext::new(LogicRef::Actor(agent));
        // Instant steps chain within a tick, bounded so goto cycles yield.
        for _ in 0..=self.steps.len() {
            if self.index >= self.steps.len() {
                if self.looping && !self.steps.is_empty() {
                    self.jump(0);
                } else {
                    self.finished = true;
                    manager.stop_moving(agent);
                    return;
                }
            }
            let next = self.index + 1;
            match &self.steps[self.index] {
                Step::Wait(duration) => {
                    let until = match self.state {
                        StepState::Waiting { until } => until,
                        _ => {
                            let until = now + duration;
                            self.state = StepState::Waiting { until };
                            until
                        }
                    };
                    if now < until {
                        return;
                    }
                    self.jump(next);
                }
                Step::Rotate(rotation) => {
                    if !matches!(self.state, StepState::Rotating) {
                        manager.stop_moving(agent);
                        manager.set_target_rotation(agent, *rotation);
                        self.state = StepState::Rotating;
                    }
                    if !manager.is_facing_target(agent) {
                        return;
                    }
                    self.jump(next);
                }
                Step::Move(location) => {
                    if !matches!(self.state, StepState::Moving(_)) {
                        let destination = location
                            .resolve_first(manager, &context)
                            .and_then(|logic| manager.translation(logic));
                        let Some(destination) = destination else {
                            tracing::debug!(
                                target: "tudey::logic",
                                agent,
                                step = self.index,
                                "script.move_skipped=no_location"
                            );
                            self.jump(next);
                            continue;
                        };
                        let mut pathing = Pathing::default();
                        pathing.set(
                            manager
                                .get_path(agent, destination)
                                .unwrap_or_else(|| vec![destination]),
                        );
                        self.state = StepState::Moving(pathing);
                    }
                    let StepState::Moving(pathing) = &mut self.state else {
                        return;
                    };
                    if !pathing.tick(manager, agent) {
                        return;
                    }
                    self.jump(next);
                }
                Step::Action(action) => {
                    action.execute(manager, &context);
                    self.jump(next);
                }
                Step::Condition { condition, step } => {
                    let target = if condition.is_satisfied(manager, &context) {
                        next
                    } else {
                        *step
                    };
                    self.jump(target);
                }
                Step::Goto(step) => {
                    let step = *step;
                    self.jump(step);
                }
            }
        }
    }
}
