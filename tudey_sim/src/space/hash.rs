//! Hashed grid of shallow quadtrees.
//!
//! The plane is cut into `granularity`-sized cells; each occupied cell holds a
//! quadtree root. An element lives at the tree level matching its size, in
//! every node at that level its bounds overlap. Elements longer than twice
//! the granularity skip the grid and sit in a linear oversized list.

use std::collections::HashMap;

use bevy::math::Vec2;

use super::{ElementFilter, ElementId, Slab, Space, SpaceElement, SpaceId, VisitCounter};
use crate::geometry::{Ray2D, Rect};
use crate::shape::{IntersectionType, Shape};

type CellKey = (i32, i32);

#[derive(Debug)]
struct Node {
    rect: Rect,
    elements: Vec<ElementId>,
    children: [Option<Box<Node>>; 4],
}

impl Node {
    fn new(rect: Rect) -> Self {
        Self {
            rect,
            elements: Vec::new(),
            children: Default::default(),
        }
    }

    fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.children.iter().all(Option::is_none)
    }

    fn quadrant(&self, index: usize) -> Rect {
        let center = self.rect.center();
        let (min, max) = (self.rect.min, self.rect.max);
        match index {
            0 => Rect::new(min, center),
            1 => Rect::new(Vec2::new(center.x, min.y), Vec2::new(max.x, center.y)),
            2 => Rect::new(Vec2::new(min.x, center.y), Vec2::new(center.x, max.y)),
            _ => Rect::new(center, max),
        }
    }

    fn insert(&mut self, id: ElementId, bounds: &Rect, depth: u32) {
        if depth == 0 {
            self.elements.push(id);
            return;
        }
        for index in 0..4 {
            let rect = self.quadrant(index);
            if rect.intersects(bounds) {
                self.children[index]
                    .get_or_insert_with(|| Box::new(Node::new(rect)))
                    .insert(id, bounds, depth - 1);
            }
        }
    }

    fn remove(&mut self, id: ElementId, bounds: &Rect, depth: u32) {
        if depth == 0 {
            if let Some(position) = self.elements.iter().position(|e| *e == id) {
                self.elements.swap_remove(position);
            }
            return;
        }
        for slot in self.children.iter_mut() {
            let Some(child) = slot else {
                continue;
            };
            if child.rect.intersects(bounds) {
                child.remove(id, bounds, depth - 1);
                if child.is_empty() {
                    *slot = None;
                }
            }
        }
    }

    fn add_all<T>(&self, slab: &Slab<T>, visit: u32, results: &mut Vec<ElementId>) {
        for id in &self.elements {
            if slab.get(*id).is_some_and(|e| e.mark_visited(visit)) {
                results.push(*id);
            }
        }
        for child in self.children.iter().flatten() {
            child.add_all(slab, visit, results);
        }
    }

    fn get_elements<T>(&self, rect: &Rect, slab: &Slab<T>, visit: u32, results: &mut Vec<ElementId>) {
        if !self.rect.intersects(rect) {
            return;
        }
        if rect.contains(&self.rect) {
            self.add_all(slab, visit, results);
            return;
        }
        for id in &self.elements {
            if let Some(element) = slab.get(*id) {
                if element.bounds().intersects(rect) && element.mark_visited(visit) {
                    results.push(*id);
                }
            }
        }
        for child in self.children.iter().flatten() {
            child.get_elements(rect, slab, visit, results);
        }
    }

    fn get_intersecting<T>(
        &self,
        shape: &Shape,
        slab: &Slab<T>,
        visit: u32,
        results: &mut Vec<ElementId>,
    ) {
        if shape.intersection_type(&self.rect) == IntersectionType::None {
            return;
        }
        for id in &self.elements {
            if let Some(element) = slab.get(*id) {
                if element.mark_visited(visit) && element.intersects(shape) {
                    results.push(*id);
                }
            }
        }
        for child in self.children.iter().flatten() {
            child.get_intersecting(shape, slab, visit, results);
        }
    }

    fn intersect_ray<T>(
        &self,
        ray: &Ray2D,
        slab: &Slab<T>,
        visit: u32,
        filter: ElementFilter<'_, T>,
        best: &mut Option<(ElementId, f32)>,
    ) {
        let Some((near, _)) = ray.rect_interval(&self.rect) else {
            return;
        };
        if best.is_some_and(|(_, distance)| near > distance) {
            return;
        }
        for id in &self.elements {
            let Some(element) = slab.get(*id) else {
                continue;
            };
            if !element.mark_visited(visit) || !filter(*id, element) {
                continue;
            }
            if let Some(distance) = element.ray_distance(ray) {
                if best.map_or(true, |(_, current)| distance < current) {
                    *best = Some((*id, distance));
                }
            }
        }
        for child in self.children.iter().flatten() {
            child.intersect_ray(ray, slab, visit, filter, best);
        }
    }
}

/// Where an element was indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Grid { depth: u32 },
    Oversized,
}

#[derive(Debug)]
pub struct HashSpace<T> {
    id: SpaceId,
    granularity: f32,
    levels: u32,
    slab: Slab<T>,
    placements: Vec<Option<Placement>>,
    roots: HashMap<CellKey, Node>,
    oversized: Vec<ElementId>,
    bounds: Rect,
    visit: VisitCounter,
}

impl<T> HashSpace<T> {
    /// Creates a space with cells of `granularity` world units, each
    /// subdividing at most `levels` times.
    pub fn new(granularity: f32, levels: u32) -> Self {
        Self {
            id: SpaceId::next(),
            granularity: granularity.max(f32::EPSILON),
            levels,
            slab: Slab::default(),
            placements: Vec::new(),
            roots: HashMap::new(),
            oversized: Vec::new(),
            bounds: Rect::EMPTY,
            visit: VisitCounter::default(),
        }
    }

    pub fn granularity(&self) -> f32 {
        self.granularity
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Number of occupied grid cells.
    pub fn cell_count(&self) -> usize {
        self.roots.len()
    }

    pub fn oversized_count(&self) -> usize {
        self.oversized.len()
    }

    /// Tree depth for an element of the given bounds.
    fn level_for(&self, bounds: &Rect) -> u32 {
        let size = bounds.longest_edge();
        let level = (self.granularity / size).log2().floor();
        if level.is_nan() || level < 0.0 {
            0
        } else {
            (level as u32).min(self.levels)
        }
    }

    fn cell_key(&self, point: Vec2) -> CellKey {
        (
            (point.x / self.granularity).floor() as i32,
            (point.y / self.granularity).floor() as i32,
        )
    }

    fn cell_rect(&self, key: CellKey) -> Rect {
        let min = Vec2::new(key.0 as f32, key.1 as f32) * self.granularity;
        Rect::new(min, min + Vec2::splat(self.granularity))
    }

    /// Occupied root keys overlapping `rect`, in ascending order.
    fn keys_in(&self, rect: &Rect) -> Vec<CellKey> {
        if rect.is_empty() {
            return Vec::new();
        }
        let lo = self.cell_key(rect.min);
        let hi = self.cell_key(rect.max);
        let span = (hi.0 as i64 - lo.0 as i64 + 1) * (hi.1 as i64 - lo.1 as i64 + 1);
        if span > self.roots.len() as i64 {
            let mut keys: Vec<CellKey> = self
                .roots
                .keys()
                .filter(|(x, y)| *x >= lo.0 && *x <= hi.0 && *y >= lo.1 && *y <= hi.1)
                .copied()
                .collect();
            keys.sort_unstable();
            return keys;
        }
        let mut keys = Vec::new();
        for x in lo.0..=hi.0 {
            for y in lo.1..=hi.1 {
                if self.roots.contains_key(&(x, y)) {
                    keys.push((x, y));
                }
            }
        }
        keys
    }

    fn index(&mut self, id: ElementId, bounds: Rect) {
        let placement = if bounds.longest_edge() > self.granularity * 2.0 {
            self.oversized.push(id);
            Placement::Oversized
        } else if bounds.is_empty() || !bounds.longest_edge().is_finite() {
            // Unindexable geometry is scanned with the oversized list.
            self.oversized.push(id);
            Placement::Oversized
        } else {
            let depth = self.level_for(&bounds);
            let lo = self.cell_key(bounds.min);
            let hi = self.cell_key(bounds.max);
            for x in lo.0..=hi.0 {
                for y in lo.1..=hi.1 {
                    let rect = self.cell_rect((x, y));
                    self.roots
                        .entry((x, y))
                        .or_insert_with(|| Node::new(rect))
                        .insert(id, &bounds, depth);
                }
            }
            Placement::Grid { depth }
        };
        if self.placements.len() <= id.index() {
            self.placements.resize(id.index() + 1, None);
        }
        self.placements[id.index()] = Some(placement);
        self.bounds.add(&bounds);
    }

    fn unindex(&mut self, id: ElementId, bounds: Rect) {
        let Some(placement) = self.placements.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        match placement {
            Placement::Oversized => {
                if let Some(position) = self.oversized.iter().position(|e| *e == id) {
                    self.oversized.remove(position);
                }
            }
            Placement::Grid { depth } => {
                let lo = self.cell_key(bounds.min);
                let hi = self.cell_key(bounds.max);
                for x in lo.0..=hi.0 {
                    for y in lo.1..=hi.1 {
                        let Some(root) = self.roots.get_mut(&(x, y)) else {
                            continue;
                        };
                        root.remove(id, &bounds, depth);
                        if root.is_empty() {
                            self.roots.remove(&(x, y));
                        }
                    }
                }
            }
        }
        // Only an element on the edge of the overall bounds can shrink them.
        let inside = bounds.min.x > self.bounds.min.x
            && bounds.min.y > self.bounds.min.y
            && bounds.max.x < self.bounds.max.x
            && bounds.max.y < self.bounds.max.y;
        if !inside {
            self.recompute_bounds();
        }
    }

    fn recompute_bounds(&mut self) {
        let mut bounds = Rect::EMPTY;
        for (id, element) in self.slab.iter() {
            if self.placements.get(id.index()).copied().flatten().is_some() {
                bounds.add(&element.indexed);
            }
        }
        self.bounds = bounds;
    }
}

impl<T> Space<T> for HashSpace<T> {
    fn id(&self) -> SpaceId {
        self.id
    }

    fn add(&mut self, mut element: SpaceElement<T>) -> ElementId {
        debug_assert!(element.space.is_none(), "element already owned by a space");
        element.space = Some(self.id);
        let bounds = *element.bounds();
        element.indexed = bounds;
        let id = self.slab.insert(element);
        self.index(id, bounds);
        id
    }

    fn remove(&mut self, id: ElementId) -> Option<SpaceElement<T>> {
        let indexed = self.slab.get(id)?.indexed;
        let mut element = self.slab.remove(id)?;
        self.unindex(id, indexed);
        element.space = None;
        element.indexed = Rect::EMPTY;
        Some(element)
    }

    fn element(&self, id: ElementId) -> Option<&SpaceElement<T>> {
        self.slab.get(id)
    }

    fn element_mut(&mut self, id: ElementId) -> Option<&mut SpaceElement<T>> {
        self.slab.get_mut(id)
    }

    fn bounds_will_change(&mut self, id: ElementId) {
        let Some(indexed) = self.slab.get(id).map(|e| e.indexed) else {
            debug_assert!(false, "bounds_will_change on unknown element {id:?}");
            return;
        };
        self.unindex(id, indexed);
    }

    fn bounds_did_change(&mut self, id: ElementId) {
        let Some(element) = self.slab.get_mut(id) else {
            debug_assert!(false, "bounds_did_change on unknown element {id:?}");
            return;
        };
        let bounds = *element.bounds();
        element.indexed = bounds;
        self.index(id, bounds);
    }

    fn len(&self) -> usize {
        self.slab.len
    }

    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn ids(&self) -> Vec<ElementId> {
        self.slab.iter().map(|(id, _)| id).collect()
    }

    fn get_intersection(
        &self,
        ray: &Ray2D,
        filter: ElementFilter<'_, T>,
    ) -> Option<(ElementId, Vec2)> {
        let visit = self.visit.next();
        let mut best: Option<(ElementId, f32)> = None;
        for id in &self.oversized {
            let Some(element) = self.slab.get(*id) else {
                continue;
            };
            if !element.mark_visited(visit) || !filter(*id, element) {
                continue;
            }
            if let Some(distance) = element.ray_distance(ray) {
                if best.map_or(true, |(_, current)| distance < current) {
                    best = Some((*id, distance));
                }
            }
        }

        let Some((near, far)) = ray.rect_interval(&self.bounds) else {
            return best.map(|(id, distance)| (id, ray.point_at(distance)));
        };
        if !near.is_finite() || !far.is_finite() {
            return best.map(|(id, distance)| (id, ray.point_at(distance)));
        }

        // Grid traversal from the entry point, one cell at a time.
        let start = ray.point_at(near);
        let (mut x, mut y) = self.cell_key(start);
        let direction = ray.direction;
        let step = (direction.x.signum() as i32, direction.y.signum() as i32);
        let boundary = |cell: i32, positive: bool| {
            (if positive { cell + 1 } else { cell }) as f32 * self.granularity
        };
        let axis_timing = |origin: f32, dir: f32, cell: i32| -> (f32, f32) {
            if dir == 0.0 {
                (f32::INFINITY, f32::INFINITY)
            } else {
                let next = (boundary(cell, dir > 0.0) - origin) / dir;
                (near + next.max(0.0), self.granularity / dir.abs())
            }
        };
        let (mut t_max_x, t_delta_x) = axis_timing(start.x, direction.x, x);
        let (mut t_max_y, t_delta_y) = axis_timing(start.y, direction.y, y);
        let max_steps = (((far - near) / self.granularity).ceil() as usize + 2) * 2;

        for _ in 0..=max_steps {
            if let Some(root) = self.roots.get(&(x, y)) {
                root.intersect_ray(ray, &self.slab, visit, filter, &mut best);
            }
            let exit = t_max_x.min(t_max_y);
            if best.is_some_and(|(_, distance)| distance <= exit) || exit > far {
                break;
            }
            if t_max_x < t_max_y {
                x += step.0;
                t_max_x += t_delta_x;
            } else {
                y += step.1;
                t_max_y += t_delta_y;
            }
        }
        best.map(|(id, distance)| (id, ray.point_at(distance)))
    }

    fn get_elements(&self, rect: &Rect, results: &mut Vec<ElementId>) {
        let visit = self.visit.next();
        for id in &self.oversized {
            if let Some(element) = self.slab.get(*id) {
                if element.bounds().intersects(rect) && element.mark_visited(visit) {
                    results.push(*id);
                }
            }
        }
        for key in self.keys_in(rect) {
            if let Some(root) = self.roots.get(&key) {
                root.get_elements(rect, &self.slab, visit, results);
            }
        }
    }

    fn get_intersecting(&self, shape: &Shape, results: &mut Vec<ElementId>) {
        let visit = self.visit.next();
        for id in &self.oversized {
            if let Some(element) = self.slab.get(*id) {
                if element.mark_visited(visit) && element.intersects(shape) {
                    results.push(*id);
                }
            }
        }
        for key in self.keys_in(shape.bounds()) {
            if let Some(root) = self.roots.get(&key) {
                root.get_intersecting(shape, &self.slab, visit, results);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Transform2D;
    use crate::space::SimpleSpace;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_element(rng: &mut ChaCha8Rng, tag: usize) -> SpaceElement<usize> {
        let center = Vec2::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0));
        let size = if rng.gen_bool(0.1) {
            rng.gen_range(5.0..30.0)
        } else {
            rng.gen_range(0.0..2.0)
        };
        let shape = Shape::quad(&Rect::from_center(Vec2::ZERO, Vec2::splat(size * 0.5)));
        SpaceElement::with_transform(shape, Transform2D::from_translation(center), tag)
    }

    fn sorted_objects<S: Space<usize>>(space: &S, ids: &[ElementId]) -> Vec<usize> {
        let mut objects: Vec<usize> = ids
            .iter()
            .filter_map(|id| space.element(*id).map(|e| *e.object()))
            .collect();
        objects.sort_unstable();
        objects
    }

    #[test]
    fn region_queries_match_linear_scan() {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let mut hashed = HashSpace::new(2.0, 3);
        let mut simple = SimpleSpace::new();
        for tag in 0..400 {
            let element = random_element(&mut rng, tag);
            simple.add(element.clone());
            hashed.add(element);
        }
        assert!(hashed.oversized_count() > 0);
        for _ in 0..100 {
            let center = Vec2::new(rng.gen_range(-60.0..60.0), rng.gen_range(-60.0..60.0));
            let extent = Vec2::new(rng.gen_range(0.0..15.0), rng.gen_range(0.0..15.0));
            let rect = Rect::from_center(center, extent);
            let (mut a, mut b) = (Vec::new(), Vec::new());
            hashed.get_elements(&rect, &mut a);
            simple.get_elements(&rect, &mut b);
            assert_eq!(sorted_objects(&hashed, &a), sorted_objects(&simple, &b));
        }
    }

    #[test]
    fn removal_prunes_cells() {
        let mut space = HashSpace::new(1.0, 2);
        let id = space.add(SpaceElement::new(Shape::circle(Vec2::splat(0.5), 0.2), ()));
        assert_eq!(space.cell_count(), 1);
        let removed = space.remove(id).expect("present");
        assert_eq!(removed.space(), None);
        assert_eq!(space.cell_count(), 0);
        assert!(space.bounds().is_empty());
        let mut results = Vec::new();
        space.get_elements(&Rect::new(Vec2::splat(-5.0), Vec2::splat(5.0)), &mut results);
        assert!(results.is_empty());
    }

    #[test]
    fn moved_element_is_reindexed() {
        let mut space = HashSpace::new(1.0, 2);
        let id = space.add(SpaceElement::new(Shape::circle(Vec2::ZERO, 0.25), 'a'));
        space.set_transform(id, Transform2D::from_translation(Vec2::new(20.0, 20.0)));
        let mut results = Vec::new();
        space.get_elements(&Rect::new(Vec2::splat(-1.0), Vec2::splat(1.0)), &mut results);
        assert!(results.is_empty());
        space.get_elements(&Rect::new(Vec2::splat(19.0), Vec2::splat(21.0)), &mut results);
        assert_eq!(results, vec![id]);
    }

    #[test]
    fn ray_walks_cells_to_nearest_hit() {
        let mut space = HashSpace::new(1.0, 1);
        let mut ids = Vec::new();
        for x in [8.0, 3.0, 12.0] {
            ids.push(space.add(SpaceElement::with_transform(
                Shape::circle(Vec2::ZERO, 0.4),
                Transform2D::from_translation(Vec2::new(x, 0.5)),
                x as i32,
            )));
        }
        let wall = space.add(SpaceElement::new(
            Shape::segment(Vec2::new(-3.0, -10.0), Vec2::new(-3.0, 10.0)),
            -3,
        ));
        let ray = Ray2D::new(Vec2::new(0.0, 0.5), Vec2::X);
        let (hit, point) = space.get_intersection(&ray, &|_, _| true).expect("hit");
        assert_eq!(hit, ids[1]);
        assert!((point.x - 2.6).abs() < 1e-4);

        let back = Ray2D::new(Vec2::new(0.0, 0.5), -Vec2::X);
        let (hit, _) = space.get_intersection(&back, &|_, _| true).expect("hit");
        assert_eq!(hit, wall);

        let skip_near = |_: ElementId, e: &SpaceElement<i32>| *e.object() != 3;
        let (hit, _) = space.get_intersection(&ray, &skip_near).expect("hit");
        assert_eq!(hit, ids[0]);
    }

    #[test]
    fn intersecting_query_uses_exact_shapes() {
        let mut space = HashSpace::new(4.0, 2);
        let id = space.add(SpaceElement::new(Shape::circle(Vec2::ZERO, 1.0), 0));
        let mut results = Vec::new();
        // Inside the circle's bounds but outside the circle.
        space.get_intersecting(&Shape::point(Vec2::new(0.9, 0.9)), &mut results);
        assert!(results.is_empty());
        space.get_intersecting(&Shape::point(Vec2::new(0.5, 0.5)), &mut results);
        assert_eq!(results, vec![id]);
    }
}
