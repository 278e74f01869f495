//! Content configs for scene entries, actors and effects.

use serde::{Deserialize, Serialize};

use crate::behavior::BehaviorConfig;
use crate::logic::HandlerConfig;
use crate::shape::ShapeConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    /// Footprint in cells before rotation.
    pub width: i32,
    pub height: i32,
    /// Collision bits stamped on every covered cell.
    pub collision_flags: u32,
    pub tags: Vec<String>,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            collision_flags: 0,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PaintConfig {
    pub priority: i32,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlaceableConfig {
    pub shape: Option<ShapeConfig>,
    pub collision_flags: u32,
    pub tags: Vec<String>,
    pub handlers: Vec<HandlerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PathConfig {
    pub tags: Vec<String>,
    pub handlers: Vec<HandlerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AreaConfig {
    pub collision_flags: u32,
    pub tags: Vec<String>,
    pub handlers: Vec<HandlerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SceneGlobalConfig {
    pub tags: Vec<String>,
    pub handlers: Vec<HandlerConfig>,
}

/// Which simulation capabilities an actor carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ActorKind {
    /// Positioned, shaped, but never advanced.
    #[default]
    Static,
    /// Advanced each tick by the physics integrator.
    Mobile,
    /// Mobile plus turn-rate-limited rotation and a behavior tree.
    Agent,
    /// Mobile driven by queued client input.
    Pawn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    pub kind: ActorKind,
    pub shape: Option<ShapeConfig>,
    pub collision_flags: u32,
    pub collision_mask: u32,
    pub tags: Vec<String>,
    pub handlers: Vec<HandlerConfig>,
    /// World units per second.
    pub speed: f32,
    /// Radians per second.
    pub turn_rate: f32,
    pub behavior: Option<BehaviorConfig>,
    /// Search outward for a free cell when the spawn point collides.
    pub adjust_spawn_point: bool,
    /// Whether this actor trips intersection sensors.
    pub trigger_sensors: bool,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            kind: ActorKind::Static,
            shape: None,
            collision_flags: 0,
            collision_mask: 0,
            tags: Vec::new(),
            handlers: Vec::new(),
            speed: 0.0,
            turn_rate: std::f32::consts::PI,
            behavior: None,
            adjust_spawn_point: false,
            trigger_sensors: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EffectConfig {
    /// Seconds the effect stays visible to clients.
    pub lifespan: f32,
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_config_defaults() {
        let config: ActorConfig =
            serde_json::from_str(r#"{"kind": "Agent", "speed": 2.0}"#).expect("actor parses");
        assert_eq!(config.kind, ActorKind::Agent);
        assert_eq!(config.speed, 2.0);
        assert!(config.trigger_sensors);
        assert!(config.behavior.is_none());
    }

    #[test]
    fn tile_config_defaults_to_single_cell() {
        let config: TileConfig = serde_json::from_str(r#"{"collision_flags": 1}"#).expect("tile");
        assert_eq!((config.width, config.height), (1, 1));
        assert_eq!(config.collision_flags, 1);
    }
}
