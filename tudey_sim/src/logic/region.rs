use tudey_schema::RegionConfig;

use super::target::TargetLogic;
use super::LogicContext;
use crate::geometry::Transform2D;
use crate::manager::SceneManager;
use crate::shape::Shape;

/// Resolves "where": world-space shapes.
#[derive(Debug)]
pub enum RegionLogic {
    /// The source's own shape, or its location when it has none.
    Default,
    Located { location: TargetLogic, shape: Shape },
    Transformed { transform: Transform2D, shape: Shape },
    Fixed(Shape),
}

impl RegionLogic {
    pub fn new(config: &RegionConfig) -> Self {
        match config {
            RegionConfig::Default => RegionLogic::Default,
            RegionConfig::Located { location, shape } => RegionLogic::Located {
                location: TargetLogic::new(location),
                shape: Shape::from_config(shape),
            },
            RegionConfig::Transformed { transform, shape } => RegionLogic::Transformed {
                transform: Transform2D::from_config(transform),
                shape: Shape::from_config(shape),
            },
            RegionConfig::Fixed { transform, shape } => RegionLogic::Fixed(
                Shape::from_config(shape).transformed(&Transform2D::from_config(transform)),
            ),
        }
    }

    pub fn resolve(
        &self,
        manager: &mut SceneManager,
        context: &LogicContext,
        results: &mut Vec<Shape>,
    ) {
        match self {
            RegionLogic::Default => {
                if let Some(shape) = manager.world_shape(context.source) {
                    results.push(shape);
                } else if let Some(translation) = manager.translation(context.source) {
                    results.push(Shape::point(translation));
                }
            }
            RegionLogic::Located { location, shape } => {
                let mut targets = Vec::new();
                location.resolve(manager, context, &mut targets);
                for target in targets {
                    if let Some(transform) = manager.transform(target) {
                        results.push(shape.transformed(&transform));
                    }
                }
            }
            RegionLogic::Transformed { transform, shape } => {
                if let Some(source) = manager.transform(context.source) {
                    results.push(shape.transformed(&source.compose(transform)));
                }
            }
            RegionLogic::Fixed(shape) => results.push(shape.clone()),
        }
    }
}
