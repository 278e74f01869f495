use std::collections::BTreeMap;

use tudey_schema::{HandlerConfig, TriggerConfig};

use super::action::ActionLogic;
use super::{millis, LogicContext, LogicRef};
use crate::manager::SceneManager;
use crate::shape::Shape;
use crate::space::ElementId;

/// Activators currently "held" by a start/stop trigger, with the timestamp
/// of their latest pulse.
type Activations = BTreeMap<Option<LogicRef>, i32>;

#[derive(Debug)]
pub enum Trigger {
    Startup,
    Shutdown,
    Tick,
    Timer {
        interval: i32,
        limit: u32,
        fired: u32,
        next: i32,
    },
    Signal {
        name: String,
    },
    SignalStart {
        name: String,
        active: Activations,
    },
    SignalStop {
        name: String,
        active: Activations,
    },
    Intersection {
        shape: Shape,
    },
    IntersectionStart {
        shape: Shape,
        active: Activations,
    },
    IntersectionStop {
        shape: Shape,
        active: Activations,
    },
    Request {
        name: String,
    },
}

/// Binds a trigger to an optional action.
#[derive(Debug)]
pub struct HandlerLogic {
    trigger: Trigger,
    action: Option<ActionLogic>,
    /// Milliseconds after an execution during which pulses are ignored.
    refractory: i32,
    last_executed: Option<i32>,
    pub(crate) sensor: Option<ElementId>,
}

impl HandlerLogic {
    pub fn new(config: &HandlerConfig, timestamp: i32) -> Self {
        let mut refractory = 0;
        let trigger = match &config.trigger {
            TriggerConfig::Startup => Trigger::Startup,
            TriggerConfig::Shutdown => Trigger::Shutdown,
            TriggerConfig::Tick => Trigger::Tick,
            TriggerConfig::Timer { interval, limit } => {
                let interval = millis(*interval).max(1);
                Trigger::Timer {
                    interval,
                    limit: *limit,
                    fired: 0,
                    next: timestamp + interval,
                }
            }
            TriggerConfig::Signal {
                name,
                refractory_period,
            } => {
                refractory = millis(*refractory_period);
                Trigger::Signal { name: name.clone() }
            }
            TriggerConfig::SignalStart {
                name,
                refractory_period,
            } => {
                refractory = millis(*refractory_period);
                Trigger::SignalStart {
                    name: name.clone(),
                    active: Activations::new(),
                }
            }
            TriggerConfig::SignalStop {
                name,
                refractory_period,
            } => {
                refractory = millis(*refractory_period);
                Trigger::SignalStop {
                    name: name.clone(),
                    active: Activations::new(),
                }
            }
            TriggerConfig::Intersection {
                shape,
                refractory_period,
            } => {
                refractory = millis(*refractory_period);
                Trigger::Intersection {
                    shape: Shape::from_config(shape),
                }
            }
            TriggerConfig::IntersectionStart {
                shape,
                refractory_period,
            } => {
                refractory = millis(*refractory_period);
                Trigger::IntersectionStart {
                    shape: Shape::from_config(shape),
                    active: Activations::new(),
                }
            }
            TriggerConfig::IntersectionStop {
                shape,
                refractory_period,
            } => {
                refractory = millis(*refractory_period);
                Trigger::IntersectionStop {
                    shape: Shape::from_config(shape),
                    active: Activations::new(),
                }
            }
            TriggerConfig::Request { name } => Trigger::Request { name: name.clone() },
        };
        Self {
            trigger,
            action: config.action.as_ref().map(ActionLogic::new),
            refractory: refractory.max(0),
            last_executed: None,
            sensor: None,
        }
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn last_executed(&self) -> Option<i32> {
        self.last_executed
    }

    /// Whether the handler must be advanced every tick.
    pub fn needs_tick(&self) -> bool {
        matches!(
            self.trigger,
            Trigger::Tick
                | Trigger::Timer { .. }
                | Trigger::SignalStart { .. }
                | Trigger::SignalStop { .. }
                | Trigger::IntersectionStart { .. }
                | Trigger::IntersectionStop { .. }
        )
    }

    /// Source-local sensor shape of intersection triggers.
    pub fn sensor_shape(&self) -> Option<&Shape> {
        match &self.trigger {
            Trigger::Intersection { shape }
            | Trigger::IntersectionStart { shape, .. }
            | Trigger::IntersectionStop { shape, .. } => Some(shape),
            _ => None,
        }
    }

    fn execute(&mut self, manager: &mut SceneManager, context: &LogicContext) -> bool {
        let now = manager.timestamp();
        if let Some(last) = self.last_executed {
            if now < last + self.refractory {
                tracing::debug!(
                    target: "tudey::logic",
                    source = %context.source,
                    last,
                    now,
                    "handler.skipped=refractory"
                );
                return false;
            }
        }
        self.last_executed = Some(now);
        match &self.action {
            Some(action) => action.execute(manager, context),
            None => true,
        }
    }

    pub fn startup(&mut self, manager: &mut SceneManager, context: &LogicContext) {
        if matches!(self.trigger, Trigger::Startup) {
            self.execute(manager, context);
        }
    }

    pub fn shutdown(&mut self, manager: &mut SceneManager, context: &LogicContext) {
        if matches!(self.trigger, Trigger::Shutdown) {
            self.execute(manager, context);
        }
    }

    /// Per-tick work: tick actions, timers, and expiry of held activations.
    pub fn tick(&mut self, manager: &mut SceneManager, context: &LogicContext) {
        let now = manager.timestamp();
        let stale_before = now - manager.tick_interval();
        match &mut self.trigger {
            Trigger::Tick => {
                self.execute(manager, context);
            }
            Trigger::Timer {
                interval,
                limit,
                fired,
                next,
            } => {
                if now < *next || (*limit > 0 && *fired >= *limit) {
                    return;
                }
                *fired += 1;
                *next = now + *interval;
                self.execute(manager, context);
            }
            Trigger::SignalStart { active, .. } | Trigger::IntersectionStart { active, .. } => {
                active.retain(|_, last| *last >= stale_before);
            }
            Trigger::SignalStop { active, .. } | Trigger::IntersectionStop { active, .. } => {
                let expired: Vec<Option<LogicRef>> = active
                    .iter()
                    .filter(|(_, last)| **last < stale_before)
                    .map(|(activator, _)| *activator)
                    .collect();
                for activator in &expired {
                    active.remove(activator);
                }
                for activator in expired {
                    let context = LogicContext::activated_by(context.source, activator);
                    self.execute(manager, &context);
                }
            }
            _ => {}
        }
    }

    /// Timer firings so far, for timer triggers.
    pub fn timer_count(&self) -> Option<u32> {
        match &self.trigger {
            Trigger::Timer { fired, .. } => Some(*fired),
            _ => None,
        }
    }

    /// Handles a named signal. Returns true when the handler listens for it.
    pub fn signal(&mut self, manager: &mut SceneManager, context: &LogicContext, name: &str) -> bool {
        let now = manager.timestamp();
        match &mut self.trigger {
            Trigger::Signal { name: listening } if listening == name => {
                self.execute(manager, context);
                true
            }
            Trigger::SignalStart {
                name: listening,
                active,
            } if listening == name => {
                if active.insert(context.activator, now).is_none() {
                    self.execute(manager, context);
                }
                true
            }
            Trigger::SignalStop {
                name: listening,
                active,
            } if listening == name => {
                active.insert(context.activator, now);
                true
            }
            _ => false,
        }
    }

    /// Called by the sensor sweep when an actor overlaps this handler's sensor.
    pub fn intersection(&mut self, manager: &mut SceneManager, context: &LogicContext) {
        let now = manager.timestamp();
        match &mut self.trigger {
            Trigger::Intersection { .. } => {
                self.execute(manager, context);
            }
            Trigger::IntersectionStart { active, .. } => {
                if active.insert(context.activator, now).is_none() {
                    self.execute(manager, context);
                }
            }
            Trigger::IntersectionStop { active, .. } => {
                active.insert(context.activator, now);
            }
            _ => {}
        }
    }

    /// Handles a client request. Returns true when the handler serves `name`.
    pub fn request(&mut self, manager: &mut SceneManager, context: &LogicContext, name: &str) -> bool {
        match &self.trigger {
            Trigger::Request { name: serving } if serving == name => {
                self.execute(manager, context);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tudey_schema::ShapeConfig;

    fn handler(trigger: TriggerConfig) -> HandlerLogic {
        HandlerLogic::new(
            &HandlerConfig {
                trigger,
                action: None,
            },
            0,
        )
    }

    #[test]
    fn tick_participation_follows_trigger_kind() {
        assert!(handler(TriggerConfig::Tick).needs_tick());
        assert!(handler(TriggerConfig::Timer {
            interval: 1.0,
            limit: 0
        })
        .needs_tick());
        assert!(!handler(TriggerConfig::Signal {
            name: "open".into(),
            refractory_period: 0.0
        })
        .needs_tick());
        assert!(!handler(TriggerConfig::Startup).needs_tick());
    }

    #[test]
    fn intersection_triggers_expose_sensor_shapes() {
        let trigger = handler(TriggerConfig::IntersectionStart {
            shape: ShapeConfig::Circle {
                center: [0.0, 0.0],
                radius: 2.0,
            },
            refractory_period: 0.25,
        });
        assert_eq!(trigger.refractory, 250);
        assert!(trigger.sensor_shape().is_some());
        assert!(handler(TriggerConfig::Request { name: "use".into() })
            .sensor_shape()
            .is_none());
    }
}
