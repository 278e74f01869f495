//! Closed set of 2D collision/query shapes.
//!
//! Every shape caches its axis-aligned bounds. Pairwise tests dispatch on the
//! concrete pair of kinds (see [`intersect`]); compound shapes recurse into
//! their children.

mod intersect;
mod raycast;

use bevy::math::Vec2;
use tudey_schema::ShapeConfig;

use crate::geometry::{Ray2D, Rect, Transform2D};

pub use intersect::{point_segment_distance_squared, polygon_contains};

/// Relation of a shape to a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectionType {
    None,
    Intersects,
    /// The shape covers the whole rectangle.
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Point(Vec2),
    Segment { start: Vec2, end: Vec2 },
    /// Convex, counter-clockwise.
    Polygon(Vec<Vec2>),
    Circle { center: Vec2, radius: f32 },
    Capsule { start: Vec2, end: Vec2, radius: f32 },
    Compound(Vec<Shape>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    kind: ShapeKind,
    bounds: Rect,
}

impl Shape {
    pub fn new(kind: ShapeKind) -> Self {
        let mut shape = Self {
            kind,
            bounds: Rect::EMPTY,
        };
        shape.normalize_winding();
        shape.update_bounds();
        shape
    }

    pub fn point(location: Vec2) -> Self {
        Self::new(ShapeKind::Point(location))
    }

    pub fn segment(start: Vec2, end: Vec2) -> Self {
        Self::new(ShapeKind::Segment { start, end })
    }

    pub fn polygon(vertices: Vec<Vec2>) -> Self {
        Self::new(ShapeKind::Polygon(vertices))
    }

    pub fn circle(center: Vec2, radius: f32) -> Self {
        Self::new(ShapeKind::Circle { center, radius })
    }

    pub fn capsule(start: Vec2, end: Vec2, radius: f32) -> Self {
        Self::new(ShapeKind::Capsule { start, end, radius })
    }

    pub fn compound(shapes: Vec<Shape>) -> Self {
        Self::new(ShapeKind::Compound(shapes))
    }

    /// Four-vertex polygon covering `rect`.
    pub fn quad(rect: &Rect) -> Self {
        Self::polygon(rect.corners().to_vec())
    }

    /// Turns this shape into a quad over `rect`, reusing polygon storage.
    pub fn set_quad(&mut self, rect: &Rect) {
        match &mut self.kind {
            ShapeKind::Polygon(vertices) => {
                vertices.clear();
                vertices.extend_from_slice(&rect.corners());
            }
            kind => *kind = ShapeKind::Polygon(rect.corners().to_vec()),
        }
        self.update_bounds();
    }

    pub fn from_config(config: &ShapeConfig) -> Self {
        match config {
            ShapeConfig::Point { location } => Self::point(Vec2::from(*location)),
            ShapeConfig::Segment { start, end } => {
                Self::segment(Vec2::from(*start), Vec2::from(*end))
            }
            ShapeConfig::Rectangle { width, height } => Self::quad(&Rect::from_center(
                Vec2::ZERO,
                Vec2::new(width * 0.5, height * 0.5),
            )),
            ShapeConfig::Polygon { vertices } => {
                Self::polygon(vertices.iter().copied().map(Vec2::from).collect())
            }
            ShapeConfig::Circle { center, radius } => Self::circle(Vec2::from(*center), *radius),
            ShapeConfig::Capsule { start, end, radius } => {
                Self::capsule(Vec2::from(*start), Vec2::from(*end), *radius)
            }
            ShapeConfig::Compound { shapes } => Self::compound(
                shapes
                    .iter()
                    .map(|child| {
                        Self::from_config(&child.shape)
                            .transformed(&Transform2D::from_config(&child.transform))
                    })
                    .collect(),
            ),
        }
    }

    pub fn kind(&self) -> &ShapeKind {
        &self.kind
    }

    /// Mutable access to the geometry. Call [`Shape::update_bounds`] afterwards.
    pub fn kind_mut(&mut self) -> &mut ShapeKind {
        &mut self.kind
    }

    pub fn bounds(&self) -> &Rect {
        &self.bounds
    }

    pub fn update_bounds(&mut self) {
        self.bounds = match &self.kind {
            ShapeKind::Point(location) => Rect::new(*location, *location),
            ShapeKind::Segment { start, end } => Rect::from_points([*start, *end]),
            ShapeKind::Polygon(vertices) => Rect::from_points(vertices.iter().copied()),
            ShapeKind::Circle { center, radius } => {
                Rect::from_center(*center, Vec2::splat(*radius))
            }
            ShapeKind::Capsule { start, end, radius } => {
                Rect::from_points([*start, *end]).expanded(*radius)
            }
            ShapeKind::Compound(shapes) => {
                let mut bounds = Rect::EMPTY;
                for shape in shapes {
                    bounds.add(shape.bounds());
                }
                bounds
            }
        };
    }

    fn normalize_winding(&mut self) {
        if let ShapeKind::Polygon(vertices) = &mut self.kind {
            if signed_area(vertices) < 0.0 {
                vertices.reverse();
            }
        }
    }

    pub fn center(&self) -> Vec2 {
        match &self.kind {
            ShapeKind::Point(location) => *location,
            ShapeKind::Circle { center, .. } => *center,
            _ => self.bounds.center(),
        }
    }

    /// Returns a transformed copy of this shape.
    pub fn transformed(&self, transform: &Transform2D) -> Shape {
        Shape::new(self.transformed_kind(transform))
    }

    /// Writes the transformed shape into `result`, reusing its storage when
    /// `result` already has the same kind. Never mutates `self`.
    pub fn transform_into(&self, transform: &Transform2D, result: &mut Shape) {
        let reused = match (&self.kind, &mut result.kind) {
            (ShapeKind::Polygon(source), ShapeKind::Polygon(target)) => {
                target.clear();
                target.extend(source.iter().map(|v| transform.transform_point(*v)));
                true
            }
            (ShapeKind::Compound(source), ShapeKind::Compound(target))
                if source.len() == target.len() =>
            {
                for (child, slot) in source.iter().zip(target.iter_mut()) {
                    child.transform_into(transform, slot);
                }
                true
            }
            _ => false,
        };
        if !reused {
            result.kind = self.transformed_kind(transform);
        }
        result.normalize_winding();
        result.update_bounds();
    }

    fn transformed_kind(&self, transform: &Transform2D) -> ShapeKind {
        let scale = transform.scale.abs();
        match &self.kind {
            ShapeKind::Point(location) => ShapeKind::Point(transform.transform_point(*location)),
            ShapeKind::Segment { start, end } => ShapeKind::Segment {
                start: transform.transform_point(*start),
                end: transform.transform_point(*end),
            },
            ShapeKind::Polygon(vertices) => ShapeKind::Polygon(
                vertices
                    .iter()
                    .map(|v| transform.transform_point(*v))
                    .collect(),
            ),
            ShapeKind::Circle { center, radius } => ShapeKind::Circle {
                center: transform.transform_point(*center),
                radius: radius * scale,
            },
            ShapeKind::Capsule { start, end, radius } => ShapeKind::Capsule {
                start: transform.transform_point(*start),
                end: transform.transform_point(*end),
                radius: radius * scale,
            },
            ShapeKind::Compound(shapes) => ShapeKind::Compound(
                shapes
                    .iter()
                    .map(|shape| shape.transformed(transform))
                    .collect(),
            ),
        }
    }

    /// Three-valued relation to `rect`, letting callers skip exact tests for
    /// rectangles fully inside or outside.
    pub fn intersection_type(&self, rect: &Rect) -> IntersectionType {
        if !self.bounds.intersects(rect) {
            return IntersectionType::None;
        }
        intersect::intersection_type(self, rect)
    }

    /// Exact overlap test against another shape.
    pub fn intersects(&self, other: &Shape) -> bool {
        intersect::shapes_intersect(self, other)
    }

    /// Penetration of `other` into this shape: translating `other` by the
    /// negated vector separates the two. `None` when they do not overlap.
    pub fn penetration(&self, other: &Shape) -> Option<Vec2> {
        intersect::shape_penetration(self, other)
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        self.bounds.contains_point(point) && intersect::contains_point(self, point)
    }

    /// Distance along `ray` to the nearest hit.
    pub fn ray_distance(&self, ray: &Ray2D) -> Option<f32> {
        ray.rect_interval(&self.bounds)?;
        raycast::ray_distance(self, ray)
    }

    /// Nearest point where `ray` meets this shape.
    pub fn get_intersection(&self, ray: &Ray2D) -> Option<Vec2> {
        self.ray_distance(ray).map(|distance| ray.point_at(distance))
    }
}

fn signed_area(vertices: &[Vec2]) -> f32 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for (index, vertex) in vertices.iter().enumerate() {
        let next = vertices[(index + 1) % vertices.len()];
        area += vertex.perp_dot(next);
    }
    area * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn unit_square() -> Shape {
        Shape::quad(&Rect::new(Vec2::ZERO, Vec2::ONE))
    }

    #[test]
    fn bounds_follow_kind() {
        let circle = Shape::circle(Vec2::new(2.0, 3.0), 0.5);
        assert_eq!(
            *circle.bounds(),
            Rect::new(Vec2::new(1.5, 2.5), Vec2::new(2.5, 3.5))
        );
        let capsule = Shape::capsule(Vec2::ZERO, Vec2::new(2.0, 0.0), 1.0);
        assert_eq!(
            *capsule.bounds(),
            Rect::new(Vec2::new(-1.0, -1.0), Vec2::new(3.0, 1.0))
        );
    }

    #[test]
    fn clockwise_polygons_are_rewound() {
        let shape = Shape::polygon(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
        ]);
        match shape.kind() {
            ShapeKind::Polygon(vertices) => assert!(signed_area(vertices) > 0.0),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn transform_keeps_kind_and_source() {
        let square = unit_square();
        let transform = Transform2D::new(Vec2::new(10.0, 0.0), FRAC_PI_2);
        let moved = square.transformed(&transform);
        assert!(matches!(moved.kind(), ShapeKind::Polygon(v) if v.len() == 4));
        assert_eq!(*square.bounds(), Rect::new(Vec2::ZERO, Vec2::ONE));
        assert!((moved.bounds().min - Vec2::new(9.0, 0.0)).length() < 1e-5);
        assert!((moved.bounds().max - Vec2::new(10.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn transform_into_reuses_or_replaces() {
        let square = unit_square();
        let mut slot = Shape::point(Vec2::ZERO);
        square.transform_into(&Transform2D::from_translation(Vec2::ONE), &mut slot);
        assert!(matches!(slot.kind(), ShapeKind::Polygon(_)));
        assert_eq!(slot.bounds().min, Vec2::ONE);
        square.transform_into(&Transform2D::from_translation(Vec2::splat(2.0)), &mut slot);
        assert_eq!(slot.bounds().min, Vec2::splat(2.0));
    }

    #[test]
    fn intersection_type_of_polygon() {
        let big = Shape::quad(&Rect::new(Vec2::splat(-10.0), Vec2::splat(10.0)));
        let inside = Rect::new(Vec2::ZERO, Vec2::ONE);
        let straddling = Rect::new(Vec2::splat(9.0), Vec2::splat(11.0));
        let outside = Rect::new(Vec2::splat(20.0), Vec2::splat(21.0));
        assert_eq!(big.intersection_type(&inside), IntersectionType::Contains);
        assert_eq!(big.intersection_type(&straddling), IntersectionType::Intersects);
        assert_eq!(big.intersection_type(&outside), IntersectionType::None);
    }

    #[test]
    fn intersection_type_of_circle() {
        let circle = Shape::circle(Vec2::ZERO, 2.0);
        let small = Rect::new(Vec2::splat(-0.5), Vec2::splat(0.5));
        let corner = Rect::new(Vec2::splat(1.6), Vec2::splat(3.0));
        assert_eq!(circle.intersection_type(&small), IntersectionType::Contains);
        assert_eq!(circle.intersection_type(&corner), IntersectionType::None);
    }

    #[test]
    fn compound_from_config_applies_child_transforms() {
        let config: ShapeConfig = serde_json::from_str(
            r#"{"type": "Compound", "shapes": [
                {"shape": {"type": "Circle", "radius": 0.5}},
                {"shape": {"type": "Circle", "radius": 0.5}, "transform": {"translation": [4.0, 0.0]}}
            ]}"#,
        )
        .expect("compound parses");
        let shape = Shape::from_config(&config);
        assert_eq!(
            *shape.bounds(),
            Rect::new(Vec2::new(-0.5, -0.5), Vec2::new(4.5, 0.5))
        );
        assert!(shape.contains_point(Vec2::new(4.2, 0.0)));
        assert!(!shape.contains_point(Vec2::new(2.0, 0.0)));
    }
}
