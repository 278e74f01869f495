use bevy::math::Vec2;

use super::actor::Actor;
use crate::geometry::from_angle;
use crate::shape::Shape;

/// Collision environment an advancing actor moves through.
pub trait Environment {
    /// Penetration of `shape` into the environment; translating the shape by
    /// the negated vector separates the deepest contact.
    fn penetration(&self, shape: &Shape) -> Option<Vec2>;
}

/// Passes through everything.
impl Environment for () {
    fn penetration(&self, _shape: &Shape) -> Option<Vec2> {
        None
    }
}

const MAX_CORRECTIONS: usize = 4;

/// Integrates an actor's position from one timestamp to the next.
#[derive(Debug, Clone, Default)]
pub struct ActorAdvancer {
    timestamp: i32,
}

impl ActorAdvancer {
    pub fn new(timestamp: i32) -> Self {
        Self { timestamp }
    }

    pub fn timestamp(&self) -> i32 {
        self.timestamp
    }

    /// Moves the clock without integrating the skipped interval.
    pub fn jump(&mut self, timestamp: i32) {
        self.timestamp = timestamp;
    }

    /// Advances `actor` to `timestamp`. Returns the average penetration
    /// corrected along the way, if any contact was resolved.
    pub fn advance(
        &mut self,
        actor: &mut Actor,
        speed: f32,
        shape: Option<&Shape>,
        timestamp: i32,
        environment: &dyn Environment,
    ) -> Option<Vec2> {
        let elapsed = timestamp - self.timestamp;
        self.timestamp = timestamp;
        if elapsed <= 0 {
            return None;
        }
        if actor.is_moving() {
            let seconds = elapsed as f32 / 1_000.0;
            actor.translation += from_angle(actor.direction) * speed * seconds;
        }
        let shape = shape?;
        let mut total = Vec2::ZERO;
        let mut count = 0;
        let mut world = shape.transformed(&actor.transform());
        for _ in 0..MAX_CORRECTIONS {
            let Some(penetration) = environment.penetration(&world) else {
                break;
            };
            if !penetration.is_finite() || penetration == Vec2::ZERO {
                break;
            }
            actor.translation -= penetration;
            total += penetration;
            count += 1;
            shape.transform_into(&actor.transform(), &mut world);
        }
        (count > 0).then(|| total / count as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::ActorFlags;
    use tudey_schema::ConfigReference;

    struct Wall;

    impl Environment for Wall {
        fn penetration(&self, shape: &Shape) -> Option<Vec2> {
            let wall = Shape::quad(&crate::geometry::Rect::new(
                Vec2::new(2.0, -5.0),
                Vec2::new(3.0, 5.0),
            ));
            wall.penetration(shape)
        }
    }

    fn walker() -> Actor {
        let mut actor = Actor::new(1, ConfigReference::new("actor/walker"), 0);
        actor.flags.insert(ActorFlags::MOVING);
        actor
    }

    #[test]
    fn moving_actor_integrates_speed() {
        let mut actor = walker();
        let mut advancer = ActorAdvancer::new(0);
        assert!(advancer.advance(&mut actor, 2.0, None, 500, &()).is_none());
        assert!((actor.translation - Vec2::new(1.0, 0.0)).length() < 1e-5);
        assert_eq!(advancer.timestamp(), 500);
    }

    #[test]
    fn penetration_is_corrected_and_reported() {
        let mut actor = walker();
        actor.translation = Vec2::new(1.5, 0.0);
        let circle = Shape::circle(Vec2::ZERO, 0.25);
        let mut advancer = ActorAdvancer::new(0);
        let reported = advancer
            .advance(&mut actor, 1.0, Some(&circle), 500, &Wall)
            .expect("hit the wall");
        assert!(reported.x > 0.0);
        assert!((actor.translation.x - 1.75).abs() < 1e-4);
    }

    #[test]
    fn jump_skips_elapsed_time() {
        let mut actor = walker();
        let mut advancer = ActorAdvancer::new(0);
        advancer.jump(10_000);
        advancer.advance(&mut actor, 1.0, None, 10_100, &());
        assert!((actor.translation.x - 0.1).abs() < 1e-5);
    }
}
