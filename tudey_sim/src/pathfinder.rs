//! Grid path search over the scene's tile cells.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use bevy::math::Vec2;

use crate::geometry::{Coord, Rect};
use crate::model::{EntryKey, TudeySceneModel};
use crate::shape::Shape;

const STRAIGHT_COST: i32 = 10;
const DIAGONAL_COST: i32 = 14;

/// Finds walkable routes through a scene for actors with a collision mask.
pub trait Pathfinder: Send + Sync {
    /// Waypoints from `start` to `end`, ending exactly at `end`, or `None` when
    /// no route exists within `max_length` expanded cells.
    fn get_path(
        &self,
        model: &TudeySceneModel,
        mask: u32,
        start: Vec2,
        end: Vec2,
        max_length: usize,
    ) -> Option<Vec<Vec2>>;

    /// Route to the location of a scene entry.
    fn get_entry_path(
        &self,
        model: &TudeySceneModel,
        mask: u32,
        start: Vec2,
        entry: EntryKey,
        max_length: usize,
    ) -> Option<Vec<Vec2>> {
        let entry = model.get_entry(entry)?;
        let end = entry.translation(model.configs());
        self.get_path(model, mask, start, end, max_length)
    }
}

/// 8-connected A* over unit cells. Diagonal steps may not cut blocked corners.
#[derive(Debug, Clone, Copy, Default)]
pub struct TilePathfinder;

impl TilePathfinder {
    fn walkable(model: &TudeySceneModel, mask: u32, cell: Coord, quad: &mut Shape) -> bool {
        quad.set_quad(&cell.cell_rect());
        !model.collides(mask, quad)
    }
}

fn octile_distance(from: Coord, to: Coord) -> i32 {
    let dx = (from.x - to.x).abs();
    let dy = (from.y - to.y).abs();
    let (low, high) = if dx < dy { (dx, dy) } else { (dy, dx) };
    DIAGONAL_COST * low + STRAIGHT_COST * (high - low)
}

impl Pathfinder for TilePathfinder {
    fn get_path(
        &self,
        model: &TudeySceneModel,
        mask: u32,
        start: Vec2,
        end: Vec2,
        max_length: usize,
    ) -> Option<Vec<Vec2>> {
        if !start.is_finite() || !end.is_finite() {
            return None;
        }
        let origin = Coord::containing(start);
        let goal = Coord::containing(end);
        if origin == goal {
            return Some(vec![end]);
        }
        let mut quad = Shape::quad(&Rect::new(Vec2::ZERO, Vec2::ONE));
        if !Self::walkable(model, mask, goal, &mut quad) {
            return None;
        }

        let mut open = BinaryHeap::<(Reverse<i32>, Reverse<i32>, Coord)>::new();
        let mut costs = HashMap::<Coord, i32>::new();
        let mut came_from = HashMap::<Coord, Coord>::new();
        let mut walkable = HashMap::<Coord, bool>::new();
        // The origin may sit inside an obstacle; actors must be able to leave it.
        walkable.insert(origin, true);
        costs.insert(origin, 0);
        open.push((Reverse(octile_distance(origin, goal)), Reverse(0), origin));

        let mut expanded = 0usize;
        while let Some((_, Reverse(cost), cell)) = open.pop() {
            if costs.get(&cell).is_some_and(|best| cost > *best) {
                continue;
            }
            if cell == goal {
                let mut cells = vec![goal];
                let mut current = goal;
                while let Some(previous) = came_from.get(&current) {
                    if *previous == origin {
                        break;
                    }
                    cells.push(*previous);
                    current = *previous;
                }
                cells.reverse();
                let mut path: Vec<Vec2> = cells.iter().map(|cell| cell.center()).collect();
                if let Some(last) = path.last_mut() {
                    *last = end;
                }
                return Some(path);
            }
            expanded += 1;
            if expanded > max_length {
                tracing::debug!(
                    target: "tudey::manager",
                    from = %origin,
                    to = %goal,
                    expanded,
                    "path.search_exhausted"
                );
                return None;
            }
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let next = Coord::new(cell.x + dx, cell.y + dy);
                    let mut passable = |coord: Coord| {
                        *walkable
                            .entry(coord)
                            .or_insert_with(|| Self::walkable(model, mask, coord, &mut quad))
                    };
                    if !passable(next) {
                        continue;
                    }
                    let step = if dx != 0 && dy != 0 {
                        if !passable(Coord::new(cell.x + dx, cell.y))
                            || !passable(Coord::new(cell.x, cell.y + dy))
                        {
                            continue;
                        }
                        DIAGONAL_COST
                    } else {
                        STRAIGHT_COST
                    };
                    let candidate = cost + step;
                    if costs.get(&next).is_some_and(|best| *best <= candidate) {
                        continue;
                    }
                    costs.insert(next, candidate);
                    came_from.insert(next, cell);
                    open.push((
                        Reverse(candidate + octile_distance(next, goal)),
                        Reverse(candidate),
                        next,
                    ));
                }
            }
        }
        None
    }
}
