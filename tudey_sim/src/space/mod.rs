//! Mutable spatial indices over shaped elements.
//!
//! A [`Space`] owns its [`SpaceElement`]s and hands out [`ElementId`]s. Any
//! change to an indexed element's shape or transform goes through
//! [`Space::bounds_will_change`] / [`Space::bounds_did_change`] (or the
//! provided [`Space::set_transform`] wrapper) so hashed cell membership stays
//! correct.

mod hash;
mod simple;

use std::sync::atomic::{AtomicU32, Ordering};

use bevy::math::Vec2;

use crate::geometry::{Ray2D, Rect, Transform2D};
use crate::shape::{IntersectionType, Shape};

pub use hash::HashSpace;
pub use simple::SimpleSpace;

static NEXT_SPACE_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a space instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(u32);

impl SpaceId {
    fn next() -> Self {
        SpaceId(NEXT_SPACE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to an element stored in a space. Slots are recycled after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u32);

impl ElementId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A shape with a transform and an owner payload.
#[derive(Debug)]
pub struct SpaceElement<T> {
    shape: Shape,
    transform: Transform2D,
    world: Shape,
    object: T,
    space: Option<SpaceId>,
    /// Bounds the element was indexed with; removal must use these.
    indexed: Rect,
    last_visit: AtomicU32,
}

impl<T: Clone> Clone for SpaceElement<T> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            transform: self.transform,
            world: self.world.clone(),
            object: self.object.clone(),
            space: None,
            indexed: Rect::EMPTY,
            last_visit: AtomicU32::new(0),
        }
    }
}

impl<T> SpaceElement<T> {
    pub fn new(shape: Shape, object: T) -> Self {
        Self::with_transform(shape, Transform2D::IDENTITY, object)
    }

    pub fn with_transform(shape: Shape, transform: Transform2D, object: T) -> Self {
        let world = shape.transformed(&transform);
        Self {
            shape,
            transform,
            world,
            object,
            space: None,
            indexed: Rect::EMPTY,
            last_visit: AtomicU32::new(0),
        }
    }

    /// Untransformed shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn world_shape(&self) -> &Shape {
        &self.world
    }

    pub fn transform(&self) -> &Transform2D {
        &self.transform
    }

    pub fn bounds(&self) -> &Rect {
        self.world.bounds()
    }

    pub fn object(&self) -> &T {
        &self.object
    }

    pub fn object_mut(&mut self) -> &mut T {
        &mut self.object
    }

    pub fn into_object(self) -> T {
        self.object
    }

    /// Owning space, if the element is currently indexed.
    pub fn space(&self) -> Option<SpaceId> {
        self.space
    }

    /// Replaces the transform. Inside a space, bracket with the bounds hooks.
    pub fn set_transform(&mut self, transform: Transform2D) {
        self.transform = transform;
        self.shape.transform_into(&self.transform, &mut self.world);
    }

    pub fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
        self.shape.transform_into(&self.transform, &mut self.world);
    }

    /// Bounds-first overlap test against a query shape.
    pub fn intersects(&self, shape: &Shape) -> bool {
        match shape.intersection_type(self.bounds()) {
            IntersectionType::None => false,
            IntersectionType::Contains => true,
            IntersectionType::Intersects => shape.intersects(&self.world),
        }
    }

    pub fn ray_distance(&self, ray: &Ray2D) -> Option<f32> {
        self.world.ray_distance(ray)
    }

    /// Stamps the element for query `visit`; false if it was already stamped.
    fn mark_visited(&self, visit: u32) -> bool {
        self.last_visit.swap(visit, Ordering::Relaxed) != visit
    }
}

/// Element filter for ray queries.
pub type ElementFilter<'a, T> = &'a dyn Fn(ElementId, &SpaceElement<T>) -> bool;

pub trait Space<T> {
    fn id(&self) -> SpaceId;

    /// Indexes `element` and takes ownership of it.
    fn add(&mut self, element: SpaceElement<T>) -> ElementId;

    /// Removes an element, returning it unowned.
    fn remove(&mut self, id: ElementId) -> Option<SpaceElement<T>>;

    fn element(&self, id: ElementId) -> Option<&SpaceElement<T>>;

    /// Direct access; shape or transform edits must be bracketed by the hooks.
    fn element_mut(&mut self, id: ElementId) -> Option<&mut SpaceElement<T>>;

    fn bounds_will_change(&mut self, id: ElementId);

    fn bounds_did_change(&mut self, id: ElementId);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Union of all element bounds.
    fn bounds(&self) -> Rect;

    /// Element ids in slot order.
    fn ids(&self) -> Vec<ElementId>;

    /// Closest element hit by `ray` that passes `filter`, with the hit point.
    fn get_intersection(
        &self,
        ray: &Ray2D,
        filter: ElementFilter<'_, T>,
    ) -> Option<(ElementId, Vec2)>;

    /// Elements whose bounds overlap `rect`.
    fn get_elements(&self, rect: &Rect, results: &mut Vec<ElementId>);

    /// Elements whose shapes intersect `shape`.
    fn get_intersecting(&self, shape: &Shape, results: &mut Vec<ElementId>);

    fn set_transform(&mut self, id: ElementId, transform: Transform2D) {
        self.bounds_will_change(id);
        if let Some(element) = self.element_mut(id) {
            element.set_transform(transform);
        }
        self.bounds_did_change(id);
    }

    fn set_shape(&mut self, id: ElementId, shape: Shape) {
        self.bounds_will_change(id);
        if let Some(element) = self.element_mut(id) {
            element.set_shape(shape);
        }
        self.bounds_did_change(id);
    }
}

/// Slot storage shared by the space implementations.
#[derive(Debug)]
struct Slab<T> {
    slots: Vec<Option<SpaceElement<T>>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> Slab<T> {
    fn insert(&mut self, element: SpaceElement<T>) -> ElementId {
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(element);
                ElementId(index)
            }
            None => {
                self.slots.push(Some(element));
                ElementId((self.slots.len() - 1) as u32)
            }
        }
    }

    fn remove(&mut self, id: ElementId) -> Option<SpaceElement<T>> {
        let element = self.slots.get_mut(id.index())?.take()?;
        self.free.push(id.0);
        self.len -= 1;
        Some(element)
    }

    fn get(&self, id: ElementId) -> Option<&SpaceElement<T>> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: ElementId) -> Option<&mut SpaceElement<T>> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn iter(&self) -> impl Iterator<Item = (ElementId, &SpaceElement<T>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|e| (ElementId(index as u32), e)))
    }
}

/// Monotonic per-space query stamp.
#[derive(Debug, Default)]
struct VisitCounter(AtomicU32);

impl VisitCounter {
    fn next(&self) -> u32 {
        let visit = self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if visit == 0 {
            self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
        } else {
            visit
        }
    }
}
