//! Pairwise shape tests.
//!
//! Non-compound kinds all reduce to a convex core (points) plus a radius, so
//! the general case is a single solver; a few pairs take cheaper fast paths.

use bevy::math::Vec2;

use super::{IntersectionType, Shape, ShapeKind};
use crate::geometry::Rect;

const EPSILON: f32 = 1.0e-5;

/// Convex core of a rounded shape.
#[derive(Clone, Copy)]
struct Convex<'a> {
    inline: [Vec2; 2],
    count: usize,
    slice: Option<&'a [Vec2]>,
    radius: f32,
}

impl<'a> Convex<'a> {
    fn of(kind: &'a ShapeKind) -> Option<Self> {
        let convex = match kind {
            ShapeKind::Point(location) => Self::inline(&[*location], 0.0),
            ShapeKind::Segment { start, end } => Self::inline(&[*start, *end], 0.0),
            ShapeKind::Polygon(vertices) => Self {
                inline: [Vec2::ZERO; 2],
                count: vertices.len(),
                slice: Some(vertices.as_slice()),
                radius: 0.0,
            },
            ShapeKind::Circle { center, radius } => Self::inline(&[*center], *radius),
            ShapeKind::Capsule { start, end, radius } => Self::inline(&[*start, *end], *radius),
            ShapeKind::Compound(_) => return None,
        };
        Some(convex)
    }

    fn inline(points: &[Vec2], radius: f32) -> Self {
        let mut inline = [Vec2::ZERO; 2];
        inline[..points.len()].copy_from_slice(points);
        Self {
            inline,
            count: points.len(),
            slice: None,
            radius,
        }
    }

    fn points(&self) -> &[Vec2] {
        match self.slice {
            Some(slice) => slice,
            None => &self.inline[..self.count],
        }
    }

    fn edge_count(&self) -> usize {
        match self.points().len() {
            0 => 0,
            1 | 2 => 1,
            n => n,
        }
    }

    fn edge(&self, index: usize) -> (Vec2, Vec2) {
        let points = self.points();
        match points.len() {
            1 => (points[0], points[0]),
            2 => (points[0], points[1]),
            n => (points[index], points[(index + 1) % n]),
        }
    }
}

struct CoreContact {
    distance: f32,
    on_a: Vec2,
    on_b: Vec2,
}

/// Inclusive point-in-convex-polygon test for counter-clockwise vertices.
pub fn polygon_contains(vertices: &[Vec2], point: Vec2) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    for (index, vertex) in vertices.iter().enumerate() {
        let next = vertices[(index + 1) % vertices.len()];
        if (next - *vertex).perp_dot(point - *vertex) < -EPSILON {
            return false;
        }
    }
    true
}

fn closest_on_segment(point: Vec2, start: Vec2, end: Vec2) -> Vec2 {
    let direction = end - start;
    let length_squared = direction.length_squared();
    if length_squared <= EPSILON * EPSILON {
        return start;
    }
    let t = ((point - start).dot(direction) / length_squared).clamp(0.0, 1.0);
    start + direction * t
}

pub fn point_segment_distance_squared(point: Vec2, start: Vec2, end: Vec2) -> f32 {
    point.distance_squared(closest_on_segment(point, start, end))
}

/// Closest points between two segments; either may be degenerate.
fn segment_segment_closest(p1: Vec2, q1: Vec2, p2: Vec2, q2: Vec2) -> (f32, Vec2, Vec2) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);
    let (s, t);
    if a <= EPSILON * EPSILON && e <= EPSILON * EPSILON {
        s = 0.0;
        t = 0.0;
    } else if a <= EPSILON * EPSILON {
        s = 0.0;
        t = (f / e).clamp(0.0, 1.0);
    } else {
        let c = d1.dot(r);
        if e <= EPSILON * EPSILON {
            t = 0.0;
            s = (-c / a).clamp(0.0, 1.0);
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s0 = if denom.abs() > f32::EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t0 = (b * s0 + f) / e;
            if t0 < 0.0 {
                t0 = 0.0;
                s0 = (-c / a).clamp(0.0, 1.0);
            } else if t0 > 1.0 {
                t0 = 1.0;
                s0 = ((b - c) / a).clamp(0.0, 1.0);
            }
            s = s0;
            t = t0;
        }
    }
    let c1 = p1 + d1 * s;
    let c2 = p2 + d2 * t;
    (c1.distance_squared(c2), c1, c2)
}

fn core_distance(a: &Convex<'_>, b: &Convex<'_>) -> CoreContact {
    if a.points().len() >= 3 {
        if let Some(point) = b.points().iter().find(|p| polygon_contains(a.points(), **p)) {
            return CoreContact {
                distance: 0.0,
                on_a: *point,
                on_b: *point,
            };
        }
    }
    if b.points().len() >= 3 {
        if let Some(point) = a.points().iter().find(|p| polygon_contains(b.points(), **p)) {
            return CoreContact {
                distance: 0.0,
                on_a: *point,
                on_b: *point,
            };
        }
    }
    let mut best = (f32::INFINITY, Vec2::ZERO, Vec2::ZERO);
    for i in 0..a.edge_count() {
        let (a0, a1) = a.edge(i);
        for j in 0..b.edge_count() {
            let (b0, b1) = b.edge(j);
            let candidate = segment_segment_closest(a0, a1, b0, b1);
            if candidate.0 < best.0 {
                best = candidate;
            }
        }
    }
    CoreContact {
        distance: best.0.sqrt(),
        on_a: best.1,
        on_b: best.2,
    }
}

fn push_axes(points: &[Vec2], axes: &mut Vec<Vec2>) {
    match points.len() {
        0 | 1 => {}
        2 => {
            let direction = (points[1] - points[0]).normalize_or_zero();
            if direction != Vec2::ZERO {
                axes.push(direction);
                axes.push(direction.perp());
            }
        }
        n => {
            for index in 0..n {
                let edge = points[(index + 1) % n] - points[index];
                let normal = edge.perp().normalize_or_zero();
                if normal != Vec2::ZERO {
                    axes.push(normal);
                }
            }
        }
    }
}

fn project(points: &[Vec2], axis: Vec2) -> (f32, f32) {
    points
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), point| {
            let value = point.dot(axis);
            (lo.min(value), hi.max(value))
        })
}

/// Minimum translation moving `b`'s core out of `a`'s core, as
/// `(direction for b, depth)`.
fn core_separation(a: &[Vec2], b: &[Vec2]) -> (Vec2, f32) {
    let mut axes = Vec::with_capacity(a.len() + b.len());
    push_axes(a, &mut axes);
    push_axes(b, &mut axes);
    if axes.is_empty() {
        return (Vec2::X, 0.0);
    }
    let mut best = (Vec2::X, f32::INFINITY);
    for axis in axes {
        let (a_lo, a_hi) = project(a, axis);
        let (b_lo, b_hi) = project(b, axis);
        let forward = a_hi - b_lo;
        let backward = b_hi - a_lo;
        let (direction, depth) = if forward <= backward {
            (axis, forward)
        } else {
            (-axis, backward)
        };
        if depth < best.1 {
            best = (direction, depth);
        }
    }
    (best.0, best.1.max(0.0))
}

fn convex_intersects(a: &Convex<'_>, b: &Convex<'_>) -> bool {
    let contact = core_distance(a, b);
    let radii = a.radius + b.radius;
    if contact.distance > EPSILON {
        return contact.distance + EPSILON < radii;
    }
    if radii > EPSILON {
        return true;
    }
    if a.points().len() == 1 && b.points().len() == 1 {
        return true;
    }
    core_separation(a.points(), b.points()).1 > EPSILON
}

fn convex_penetration(a: &Convex<'_>, b: &Convex<'_>) -> Option<Vec2> {
    let contact = core_distance(a, b);
    let radii = a.radius + b.radius;
    if contact.distance > EPSILON {
        let depth = radii - contact.distance;
        if depth <= EPSILON {
            return None;
        }
        let normal = (contact.on_b - contact.on_a) / contact.distance;
        return Some(-normal * depth);
    }
    let (direction, depth) = core_separation(a.points(), b.points());
    let depth = depth + radii;
    if depth <= EPSILON {
        return None;
    }
    Some(-direction * depth)
}

pub(super) fn shapes_intersect(a: &Shape, b: &Shape) -> bool {
    if !a.bounds().intersects(b.bounds()) {
        return false;
    }
    match (a.kind(), b.kind()) {
        (ShapeKind::Compound(children), _) => {
            children.iter().any(|child| shapes_intersect(child, b))
        }
        (_, ShapeKind::Compound(children)) => {
            children.iter().any(|child| shapes_intersect(a, child))
        }
        (ShapeKind::Point(p), ShapeKind::Point(q)) => p.distance_squared(*q) <= EPSILON * EPSILON,
        (ShapeKind::Point(point), ShapeKind::Circle { center, radius })
        | (ShapeKind::Circle { center, radius }, ShapeKind::Point(point)) => {
            point.distance_squared(*center) < radius * radius
        }
        (
            ShapeKind::Circle {
                center: c1,
                radius: r1,
            },
            ShapeKind::Circle {
                center: c2,
                radius: r2,
            },
        ) => c1.distance_squared(*c2) < (r1 + r2) * (r1 + r2),
        (ShapeKind::Point(point), ShapeKind::Polygon(vertices))
        | (ShapeKind::Polygon(vertices), ShapeKind::Point(point)) => {
            strictly_inside(vertices, *point)
        }
        (ka, kb) => match (Convex::of(ka), Convex::of(kb)) {
            (Some(ca), Some(cb)) => convex_intersects(&ca, &cb),
            _ => false,
        },
    }
}

fn strictly_inside(vertices: &[Vec2], point: Vec2) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    vertices.iter().enumerate().all(|(index, vertex)| {
        let next = vertices[(index + 1) % vertices.len()];
        (next - *vertex).perp_dot(point - *vertex) > EPSILON
    })
}

fn longest(vectors: impl Iterator<Item = Vec2>) -> Option<Vec2> {
    vectors.fold(None, |best: Option<Vec2>, vector| match best {
        Some(current) if current.length_squared() >= vector.length_squared() => Some(current),
        _ => Some(vector),
    })
}

pub(super) fn shape_penetration(a: &Shape, b: &Shape) -> Option<Vec2> {
    if !a.bounds().intersects(b.bounds()) {
        return None;
    }
    match (a.kind(), b.kind()) {
        (ShapeKind::Compound(children), _) => longest(
            children
                .iter()
                .filter_map(|child| shape_penetration(child, b)),
        ),
        (_, ShapeKind::Compound(children)) => longest(
            children
                .iter()
                .filter_map(|child| shape_penetration(a, child)),
        ),
        (
            ShapeKind::Circle {
                center: c1,
                radius: r1,
            },
            ShapeKind::Circle {
                center: c2,
                radius: r2,
            },
        ) => {
            let offset = *c2 - *c1;
            let distance = offset.length();
            let depth = r1 + r2 - distance;
            if depth <= EPSILON {
                None
            } else if distance <= EPSILON {
                Some(-Vec2::X * depth)
            } else {
                Some(-offset / distance * depth)
            }
        }
        (ka, kb) => match (Convex::of(ka), Convex::of(kb)) {
            (Some(ca), Some(cb)) => convex_penetration(&ca, &cb),
            _ => None,
        },
    }
}

pub(super) fn contains_point(shape: &Shape, point: Vec2) -> bool {
    match shape.kind() {
        ShapeKind::Point(location) => location.distance_squared(point) <= EPSILON * EPSILON,
        ShapeKind::Segment { start, end } => {
            point_segment_distance_squared(point, *start, *end) <= EPSILON * EPSILON
        }
        ShapeKind::Polygon(vertices) => polygon_contains(vertices, point),
        ShapeKind::Circle { center, radius } => center.distance_squared(point) <= radius * radius,
        ShapeKind::Capsule { start, end, radius } => {
            point_segment_distance_squared(point, *start, *end) <= radius * radius
        }
        ShapeKind::Compound(shapes) => shapes.iter().any(|child| child.contains_point(point)),
    }
}

fn rect_convex(corners: &[Vec2; 4]) -> Convex<'_> {
    Convex {
        inline: [Vec2::ZERO; 2],
        count: 4,
        slice: Some(corners.as_slice()),
        radius: 0.0,
    }
}

pub(super) fn intersection_type(shape: &Shape, rect: &Rect) -> IntersectionType {
    let corners = rect.corners();
    match shape.kind() {
        ShapeKind::Point(location) => {
            if rect.contains_point(*location) {
                IntersectionType::Intersects
            } else {
                IntersectionType::None
            }
        }
        ShapeKind::Circle { center, radius } => {
            let radius_squared = radius * radius;
            if corners
                .iter()
                .all(|corner| corner.distance_squared(*center) <= radius_squared)
            {
                IntersectionType::Contains
            } else if rect.clamp_point(*center).distance_squared(*center) <= radius_squared {
                IntersectionType::Intersects
            } else {
                IntersectionType::None
            }
        }
        ShapeKind::Compound(shapes) => {
            let mut result = IntersectionType::None;
            for child in shapes {
                match child.intersection_type(rect) {
                    IntersectionType::Contains => return IntersectionType::Contains,
                    IntersectionType::Intersects => result = IntersectionType::Intersects,
                    IntersectionType::None => {}
                }
            }
            result
        }
        kind => {
            let Some(convex) = Convex::of(kind) else {
                return IntersectionType::None;
            };
            if convex.points().len() >= 3
                && corners
                    .iter()
                    .all(|corner| polygon_contains(convex.points(), *corner))
            {
                return IntersectionType::Contains;
            }
            if convex.radius > 0.0 && convex.points().len() == 2 {
                let radius_squared = convex.radius * convex.radius;
                let (start, end) = (convex.points()[0], convex.points()[1]);
                if corners.iter().all(|corner| {
                    point_segment_distance_squared(*corner, start, end) <= radius_squared
                }) {
                    return IntersectionType::Contains;
                }
            }
            let contact = core_distance(&convex, &rect_convex(&corners));
            if contact.distance <= convex.radius + EPSILON {
                IntersectionType::Intersects
            } else {
                IntersectionType::None
            }
        }
    }
}
