use serde::{Deserialize, Serialize};

/// Declarative 2D transform: translation, rotation in radians, uniform scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub translation: [f32; 2],
    pub rotation: f32,
    pub scale: f32,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            translation: [0.0, 0.0],
            rotation: 0.0,
            scale: 1.0,
        }
    }
}

impl TransformConfig {
    pub fn translated(x: f32, y: f32) -> Self {
        Self {
            translation: [x, y],
            ..Self::default()
        }
    }
}

/// Shape description used by actors, placeables, sensors and regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShapeConfig {
    Point {
        #[serde(default)]
        location: [f32; 2],
    },
    Segment {
        start: [f32; 2],
        end: [f32; 2],
    },
    /// Axis-aligned rectangle centered on the origin.
    Rectangle {
        width: f32,
        height: f32,
    },
    /// Convex polygon, vertices in counter-clockwise order.
    Polygon {
        vertices: Vec<[f32; 2]>,
    },
    Circle {
        #[serde(default)]
        center: [f32; 2],
        radius: f32,
    },
    Capsule {
        start: [f32; 2],
        end: [f32; 2],
        radius: f32,
    },
    Compound {
        shapes: Vec<TransformedShapeConfig>,
    },
}

impl Default for ShapeConfig {
    fn default() -> Self {
        ShapeConfig::Point {
            location: [0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedShapeConfig {
    pub shape: ShapeConfig,
    #[serde(default)]
    pub transform: TransformConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_configs_are_internally_tagged() {
        let shape: ShapeConfig =
            serde_json::from_str(r#"{"type": "Circle", "radius": 0.5}"#).expect("circle parses");
        assert_eq!(
            shape,
            ShapeConfig::Circle {
                center: [0.0, 0.0],
                radius: 0.5
            }
        );
    }

    #[test]
    fn transform_defaults_to_identity() {
        let transform: TransformConfig = serde_json::from_str("{}").expect("empty transform");
        assert_eq!(transform, TransformConfig::default());
        assert_eq!(transform.scale, 1.0);
    }
}
