//! Numeric primitives shared by shapes, spaces and the scene model.

use std::f32::consts::{PI, TAU};
use std::fmt;

use bevy::math::Vec2;
use tudey_schema::TransformConfig;

/// Axis-aligned rectangle. An empty rectangle has `min > max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Default for Rect {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Rect {
    pub const EMPTY: Rect = Rect {
        min: Vec2::new(f32::INFINITY, f32::INFINITY),
        max: Vec2::new(f32::NEG_INFINITY, f32::NEG_INFINITY),
    };

    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_center(center: Vec2, half_extent: Vec2) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    pub fn from_points<I: IntoIterator<Item = Vec2>>(points: I) -> Self {
        let mut rect = Self::EMPTY;
        for point in points {
            rect.add_point(point);
        }
        rect
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn longest_edge(&self) -> f32 {
        self.width().max(self.height())
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }

    /// Closed-interval overlap test; touching edges intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// True when `other` lies entirely inside this rectangle.
    pub fn contains(&self, other: &Rect) -> bool {
        other.min.x >= self.min.x
            && other.max.x <= self.max.x
            && other.min.y >= self.min.y
            && other.max.y <= self.max.y
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    pub fn add_point(&mut self, point: Vec2) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn add(&mut self, other: &Rect) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let mut result = *self;
        result.add(other);
        result
    }

    pub fn expanded(&self, amount: f32) -> Rect {
        Rect {
            min: self.min - Vec2::splat(amount),
            max: self.max + Vec2::splat(amount),
        }
    }

    /// Closest point of the rectangle to `point`.
    pub fn clamp_point(&self, point: Vec2) -> Vec2 {
        point.clamp(self.min, self.max)
    }
}

/// Rotates `vector` counter-clockwise by `angle` radians.
pub fn rotate(vector: Vec2, angle: f32) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    Vec2::new(vector.x * cos - vector.y * sin, vector.x * sin + vector.y * cos)
}

/// Wraps an angle into `(-PI, PI]`.
pub fn normalize_angle(angle: f32) -> f32 {
    let mut wrapped = angle % TAU;
    if wrapped <= -PI {
        wrapped += TAU;
    } else if wrapped > PI {
        wrapped -= TAU;
    }
    wrapped
}

/// Signed shortest rotation from `from` to `to`.
pub fn angle_difference(to: f32, from: f32) -> f32 {
    normalize_angle(to - from)
}

/// Heading of a vector; the zero vector has heading zero.
pub fn rotation_of(vector: Vec2) -> f32 {
    if vector == Vec2::ZERO {
        0.0
    } else {
        vector.y.atan2(vector.x)
    }
}

pub fn from_angle(angle: f32) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    Vec2::new(cos, sin)
}

/// Translation, rotation and uniform scale, applied scale-rotate-translate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D {
    pub translation: Vec2,
    pub rotation: f32,
    pub scale: f32,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform2D {
    pub const IDENTITY: Transform2D = Transform2D {
        translation: Vec2::ZERO,
        rotation: 0.0,
        scale: 1.0,
    };

    pub fn new(translation: Vec2, rotation: f32) -> Self {
        Self {
            translation,
            rotation,
            scale: 1.0,
        }
    }

    pub fn from_translation(translation: Vec2) -> Self {
        Self::new(translation, 0.0)
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn from_config(config: &TransformConfig) -> Self {
        Self {
            translation: Vec2::from(config.translation),
            rotation: config.rotation,
            scale: config.scale,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn transform_point(&self, point: Vec2) -> Vec2 {
        self.translation + rotate(point * self.scale, self.rotation)
    }

    pub fn transform_vector(&self, vector: Vec2) -> Vec2 {
        rotate(vector * self.scale, self.rotation)
    }

    /// Returns `self * other`: `other` is applied first.
    pub fn compose(&self, other: &Transform2D) -> Transform2D {
        Transform2D {
            translation: self.transform_point(other.translation),
            rotation: normalize_angle(self.rotation + other.rotation),
            scale: self.scale * other.scale,
        }
    }

    pub fn invert(&self) -> Transform2D {
        let scale = if self.scale == 0.0 { 0.0 } else { 1.0 / self.scale };
        Transform2D {
            translation: rotate(-self.translation, -self.rotation) * scale,
            rotation: -self.rotation,
            scale,
        }
    }
}

/// Ray with a normalized direction. A zero direction never intersects anything.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray2D {
    pub origin: Vec2,
    pub direction: Vec2,
}

impl Ray2D {
    pub fn new(origin: Vec2, direction: Vec2) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.direction == Vec2::ZERO
    }

    pub fn point_at(&self, distance: f32) -> Vec2 {
        self.origin + self.direction * distance
    }

    /// Signed distance of `point` along the ray.
    pub fn distance_to(&self, point: Vec2) -> f32 {
        (point - self.origin).dot(self.direction)
    }

    /// Entry/exit distances of the ray through a rectangle, if it crosses it.
    pub fn rect_interval(&self, rect: &Rect) -> Option<(f32, f32)> {
        if self.is_degenerate() || rect.is_empty() {
            return None;
        }
        let mut near = 0.0f32;
        let mut far = f32::INFINITY;
        for axis in 0..2 {
            let origin = self.origin[axis];
            let direction = self.direction[axis];
            let (lo, hi) = (rect.min[axis], rect.max[axis]);
            if direction == 0.0 {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let mut t0 = (lo - origin) / direction;
            let mut t1 = (hi - origin) / direction;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            near = near.max(t0);
            far = far.min(t1);
            if near > far {
                return None;
            }
        }
        Some((near, far))
    }
}

/// Integer cell coordinate, packable into a 32-bit key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Packs the low 16 bits of each component: `x` high, `y` low.
    pub fn pack(self) -> i32 {
        (self.x << 16) | (self.y & 0xFFFF)
    }

    pub fn unpack(packed: i32) -> Self {
        Self {
            x: packed >> 16,
            y: (packed << 16) >> 16,
        }
    }

    /// Cell containing a world-space point.
    pub fn containing(point: Vec2) -> Self {
        Self {
            x: point.x.floor() as i32,
            y: point.y.floor() as i32,
        }
    }

    pub fn center(self) -> Vec2 {
        Vec2::new(self.x as f32 + 0.5, self.y as f32 + 0.5)
    }

    /// Unit square covered by this cell.
    pub fn cell_rect(self) -> Rect {
        Rect::new(
            Vec2::new(self.x as f32, self.y as f32),
            Vec2::new(self.x as f32 + 1.0, self.y as f32 + 1.0),
        )
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Integer cell range `[min, max]` covering a world-space rectangle.
pub fn cell_range(rect: &Rect) -> (Coord, Coord) {
    (
        Coord::new(rect.min.x.floor() as i32, rect.min.y.floor() as i32),
        Coord::new(rect.max.x.floor() as i32, rect.max.y.floor() as i32),
    )
}
