use bevy::math::Vec2;

use super::{ElementFilter, ElementId, Slab, Space, SpaceElement, SpaceId};
use crate::geometry::{Ray2D, Rect};
use crate::shape::Shape;

/// Flat list of elements scanned linearly on every query.
#[derive(Debug)]
pub struct SimpleSpace<T> {
    id: SpaceId,
    slab: Slab<T>,
}

impl<T> Default for SimpleSpace<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SimpleSpace<T> {
    pub fn new() -> Self {
        Self {
            id: SpaceId::next(),
            slab: Slab::default(),
        }
    }
}

impl<T> Space<T> for SimpleSpace<T> {
    fn id(&self) -> SpaceId {
        self.id
    }

    fn add(&mut self, mut element: SpaceElement<T>) -> ElementId {
        debug_assert!(element.space.is_none(), "element already owned by a space");
        element.space = Some(self.id);
        element.indexed = *element.bounds();
        self.slab.insert(element)
    }

    fn remove(&mut self, id: ElementId) -> Option<SpaceElement<T>> {
        let mut element = self.slab.remove(id)?;
        element.space = None;
        Some(element)
    }

    fn element(&self, id: ElementId) -> Option<&SpaceElement<T>> {
        self.slab.get(id)
    }

    fn element_mut(&mut self, id: ElementId) -> Option<&mut SpaceElement<T>> {
        self.slab.get_mut(id)
    }

    fn bounds_will_change(&mut self, _id: ElementId) {}

    fn bounds_did_change(&mut self, id: ElementId) {
        if let Some(element) = self.slab.get_mut(id) {
            element.indexed = *element.bounds();
        }
    }

    fn len(&self) -> usize {
        self.slab.len
    }

    fn bounds(&self) -> Rect {
        let mut bounds = Rect::EMPTY;
        for (_, element) in self.slab.iter() {
            bounds.add(element.bounds());
        }
        bounds
    }

    fn ids(&self) -> Vec<ElementId> {
        self.slab.iter().map(|(id, _)| id).collect()
    }

    fn get_intersection(
        &self,
        ray: &Ray2D,
        filter: ElementFilter<'_, T>,
    ) -> Option<(ElementId, Vec2)> {
        let mut best: Option<(ElementId, f32)> = None;
        for (id, element) in self.slab.iter() {
            if !filter(id, element) {
                continue;
            }
            if let Some(distance) = element.ray_distance(ray) {
                if best.map_or(true, |(_, current)| distance < current) {
                    best = Some((id, distance));
                }
            }
        }
        best.map(|(id, distance)| (id, ray.point_at(distance)))
    }

    fn get_elements(&self, rect: &Rect, results: &mut Vec<ElementId>) {
        results.extend(
            self.slab
                .iter()
                .filter(|(_, element)| element.bounds().intersects(rect))
                .map(|(id, _)| id),
        );
    }

    fn get_intersecting(&self, shape: &Shape, results: &mut Vec<ElementId>) {
        results.extend(
            self.slab
                .iter()
                .filter(|(_, element)| element.intersects(shape))
                .map(|(id, _)| id),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Transform2D;

    #[test]
    fn remove_releases_ownership() {
        let mut space = SimpleSpace::new();
        let id = space.add(SpaceElement::new(Shape::circle(Vec2::ZERO, 1.0), "rock"));
        let everything = Rect::new(Vec2::splat(-100.0), Vec2::splat(100.0));
        let mut results = Vec::new();
        space.get_elements(&everything, &mut results);
        assert_eq!(results, vec![id]);

        let removed = space.remove(id).expect("element present");
        assert_eq!(removed.space(), None);
        results.clear();
        space.get_elements(&everything, &mut results);
        assert!(results.is_empty());
    }

    #[test]
    fn ray_returns_closest_passing_filter() {
        let mut space = SimpleSpace::new();
        let near = space.add(SpaceElement::with_transform(
            Shape::circle(Vec2::ZERO, 0.5),
            Transform2D::from_translation(Vec2::new(3.0, 0.0)),
            1,
        ));
        let far = space.add(SpaceElement::with_transform(
            Shape::circle(Vec2::ZERO, 0.5),
            Transform2D::from_translation(Vec2::new(6.0, 0.0)),
            2,
        ));
        let ray = Ray2D::new(Vec2::ZERO, Vec2::X);
        let (hit, point) = space.get_intersection(&ray, &|_, _| true).expect("hit");
        assert_eq!(hit, near);
        assert!((point.x - 2.5).abs() < 1e-5);
        let (hit, _) = space
            .get_intersection(&ray, &|_, element| *element.object() != 1)
            .expect("hit");
        assert_eq!(hit, far);
    }
}
