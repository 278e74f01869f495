//! Data contracts for Tudey scene content.
//!
//! Everything here is plain serde data: config references, shape
//! descriptions, entry/actor configs and the declarative logic trees the
//! simulation core instantiates. Nothing in this crate simulates.

mod behavior;
mod library;
mod logic;
mod reference;
mod scene;
mod shape;

pub use behavior::{BehaviorConfig, ScriptStepConfig, WeightedBehavior};
pub use library::ConfigLibrary;
pub use logic::{
    ActionConfig, Comparator, ConditionConfig, ExpressionConfig, HandlerConfig, RegionConfig,
    TargetConfig, TriggerConfig, VariableRange, VariableScope, WeightedAction,
};
pub use reference::{ConfigReference, ReferenceData};
pub use scene::{
    ActorConfig, ActorKind, AreaConfig, EffectConfig, PaintConfig, PathConfig, PlaceableConfig,
    SceneGlobalConfig, TileConfig,
};
pub use shape::{ShapeConfig, TransformConfig, TransformedShapeConfig};
