use bevy::math::Vec2;

use super::intersect::{point_segment_distance_squared, polygon_contains};
use super::{Shape, ShapeKind};
use crate::geometry::Ray2D;

const PARALLEL_EPSILON: f32 = 1.0e-6;

/// Distance along the ray to segment `start..end`. Parallel rays miss.
fn ray_segment(ray: &Ray2D, start: Vec2, end: Vec2) -> Option<f32> {
    let edge = end - start;
    let denom = ray.direction.perp_dot(edge);
    if denom.abs() < PARALLEL_EPSILON {
        return None;
    }
    let offset = start - ray.origin;
    let t = offset.perp_dot(edge) / denom;
    let u = offset.perp_dot(ray.direction) / denom;
    (t >= 0.0 && (0.0..=1.0).contains(&u)).then_some(t)
}

fn ray_circle(ray: &Ray2D, center: Vec2, radius: f32) -> Option<f32> {
    let m = ray.origin - center;
    let c = m.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some(0.0);
    }
    let b = m.dot(ray.direction);
    if b > 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    Some((-b - discriminant.sqrt()).max(0.0))
}

fn nearest(candidates: impl IntoIterator<Item = Option<f32>>) -> Option<f32> {
    candidates
        .into_iter()
        .flatten()
        .fold(None, |best: Option<f32>, t| Some(best.map_or(t, |b| b.min(t))))
}

pub(super) fn ray_distance(shape: &Shape, ray: &Ray2D) -> Option<f32> {
    if ray.is_degenerate() {
        return None;
    }
    match shape.kind() {
        ShapeKind::Point(_) => None,
        ShapeKind::Segment { start, end } => ray_segment(ray, *start, *end),
        ShapeKind::Polygon(vertices) => {
            if polygon_contains(vertices, ray.origin) {
                return Some(0.0);
            }
            nearest((0..vertices.len()).map(|index| {
                ray_segment(ray, vertices[index], vertices[(index + 1) % vertices.len()])
            }))
        }
        ShapeKind::Circle { center, radius } => ray_circle(ray, *center, *radius),
        ShapeKind::Capsule { start, end, radius } => {
            if point_segment_distance_squared(ray.origin, *start, *end) <= radius * radius {
                return Some(0.0);
            }
            let normal = (*end - *start).perp().normalize_or_zero() * *radius;
            let mut candidates = vec![
                ray_circle(ray, *start, *radius),
                ray_circle(ray, *end, *radius),
            ];
            if normal != Vec2::ZERO {
                candidates.push(ray_segment(ray, *start + normal, *end + normal));
                candidates.push(ray_segment(ray, *start - normal, *end - normal));
            }
            nearest(candidates)
        }
        ShapeKind::Compound(shapes) => nearest(shapes.iter().map(|child| child.ray_distance(ray))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    #[test]
    fn ray_hits_near_face_of_polygon() {
        let square = Shape::quad(&Rect::new(Vec2::new(2.0, -1.0), Vec2::new(4.0, 1.0)));
        let ray = Ray2D::new(Vec2::ZERO, Vec2::X);
        let hit = square.get_intersection(&ray).expect("hit");
        assert!((hit - Vec2::new(2.0, 0.0)).length() < 1e-5);
        let behind = Ray2D::new(Vec2::ZERO, -Vec2::X);
        assert!(square.get_intersection(&behind).is_none());
    }

    #[test]
    fn parallel_segment_is_missed() {
        let segment = Shape::segment(Vec2::new(1.0, 0.0), Vec2::new(3.0, 0.0));
        let ray = Ray2D::new(Vec2::ZERO, Vec2::X);
        assert!(segment.get_intersection(&ray).is_none());
    }

    #[test]
    fn ray_from_inside_circle_hits_at_origin() {
        let circle = Shape::circle(Vec2::ZERO, 1.0);
        let ray = Ray2D::new(Vec2::new(0.2, 0.0), Vec2::Y);
        assert_eq!(circle.ray_distance(&ray), Some(0.0));
        let outside = Ray2D::new(Vec2::new(-3.0, 0.0), Vec2::X);
        assert!((circle.ray_distance(&outside).expect("hit") - 2.0).abs() < 1e-5);
    }

    #[test]
    fn capsule_side_is_hit() {
        let capsule = Shape::capsule(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 0.0), 0.5);
        let ray = Ray2D::new(Vec2::new(0.0, 3.0), -Vec2::Y);
        assert!((capsule.ray_distance(&ray).expect("hit") - 2.5).abs() < 1e-5);
    }
}
