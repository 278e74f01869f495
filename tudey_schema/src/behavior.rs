use serde::{Deserialize, Serialize};

use crate::logic::{default_weight, ActionConfig, ConditionConfig, TargetConfig, VariableRange};

/// Autonomous agent behaviors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BehaviorConfig {
    Idle,
    Wander {
        #[serde(default)]
        evaluation_interval: VariableRange,
        /// Distance from the spawn origin beyond which the agent turns back.
        #[serde(default = "default_wander_radius")]
        radius: f32,
        #[serde(default = "zero_range")]
        pre_rotation_pause: VariableRange,
        #[serde(default = "zero_range")]
        post_rotation_pause: VariableRange,
    },
    Patrol {
        #[serde(default)]
        evaluation_interval: VariableRange,
        /// Path entries whose vertices form the patrol routes.
        target: TargetConfig,
    },
    Follow {
        #[serde(default)]
        evaluation_interval: VariableRange,
        target: TargetConfig,
        #[serde(default)]
        minimum_distance: f32,
        maximum_distance: f32,
    },
    Random {
        #[serde(default)]
        evaluation_interval: VariableRange,
        behaviors: Vec<WeightedBehavior>,
    },
    Scripted {
        steps: Vec<ScriptStepConfig>,
        #[serde(default)]
        looping: bool,
    },
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        BehaviorConfig::Idle
    }
}

fn default_wander_radius() -> f32 {
    f32::MAX
}

fn zero_range() -> VariableRange {
    VariableRange::constant(0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedBehavior {
    #[serde(default = "default_weight")]
    pub weight: f32,
    pub behavior: BehaviorConfig,
}

/// One step of a scripted behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScriptStepConfig {
    /// Pause for `duration` seconds.
    Wait { duration: f32 },
    /// Turn to face an absolute rotation in radians.
    Rotate { rotation: f32 },
    /// Walk to the (first) resolved location.
    Move { location: TargetConfig },
    Action { action: ActionConfig },
    /// Continue when the condition holds, otherwise jump to `step`.
    Condition { condition: ConditionConfig, step: usize },
    Goto { step: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wander_defaults_apply() {
        let behavior: BehaviorConfig =
            serde_json::from_str(r#"{"type": "Wander", "radius": 4.0}"#).expect("wander parses");
        match behavior {
            BehaviorConfig::Wander {
                radius,
                pre_rotation_pause,
                evaluation_interval,
                ..
            } => {
                assert_eq!(radius, 4.0);
                assert_eq!(pre_rotation_pause, VariableRange::constant(0.0));
                assert_eq!(evaluation_interval, VariableRange::constant(1.0));
            }
            other => panic!("unexpected behavior {other:?}"),
        }
    }

    #[test]
    fn scripted_steps_parse() {
        let json = r#"{"type": "Scripted", "looping": true, "steps": [
            {"type": "Wait", "duration": 0.5},
            {"type": "Rotate", "rotation": 1.57},
            {"type": "Goto", "step": 0}
        ]}"#;
        let behavior: BehaviorConfig = serde_json::from_str(json).expect("script parses");
        match behavior {
            BehaviorConfig::Scripted { steps, looping } => {
                assert!(looping);
                assert_eq!(steps.len(), 3);
                assert_eq!(steps[2], ScriptStepConfig::Goto { step: 0 });
            }
            other => panic!("unexpected behavior {other:?}"),
        }
    }
}
