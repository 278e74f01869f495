mod common;

use bevy::math::Vec2;
use tudey_schema::ConfigReference;
use tudey_sim::geometry::Transform2D;
use tudey_sim::logic::{InputFrame, LogicRef};
use tudey_sim::model::{GlobalEntry, PathEntry, PlaceableEntry};
use tudey_sim::{Entry, SceneManager};

fn direction_changes(manager: &SceneManager, id: i32) -> u32 {
    manager
        .actor(id)
        .and_then(|logic| logic.behavior())
        .and_then(|behavior| behavior.as_wander())
        .map_or(0, |wander| wander.direction_changes())
}

fn distance_from_origin(manager: &SceneManager, id: i32) -> f32 {
    manager
        .translation(LogicRef::Actor(id))
        .expect("roamer is live")
        .length()
}

#[test]
fn wander_turns_back_at_its_radius() {
    let mut manager = common::manager(common::model("wander"));
    let roamer = manager
        .spawn_actor(&ConfigReference::new("actor/roamer"), Vec2::ZERO, 0.0)
        .expect("roamer spawns");

    let mut bounce = None;
    for _ in 0..100 {
        manager.tick();
        let distance = distance_from_origin(&manager, roamer);
        assert!(distance < 3.5, "wandered {distance} from origin");
        if direction_changes(&manager, roamer) >= 2 {
            bounce = Some(distance);
            break;
        }
    }
    let bounced_at = bounce.expect("radius bounce within 100 ticks");
    assert!(bounced_at > 3.0);

    for _ in 0..10 {
        manager.tick();
    }
    let after = distance_from_origin(&manager, roamer);
    assert!(
        after < bounced_at - 0.5,
        "still {after} from origin after bouncing at {bounced_at}"
    );
    assert_eq!(direction_changes(&manager, roamer), 2);
}

#[test]
fn refractory_period_suppresses_rapid_signals() {
    let mut manager = common::manager(common::model("bells"));
    let bell = manager
        .spawn_actor(&ConfigReference::new("actor/bell"), Vec2::new(1.0, 1.0), 0.0)
        .expect("bell spawns");
    let target = LogicRef::Actor(bell);

    manager.tick();
    assert!(manager.signal(target, None, "ring"));
    manager.tick();
    assert!(manager.signal(target, None, "ring"));
    assert_eq!(manager.take_effects().len(), 1);

    for _ in 0..5 {
        manager.tick();
    }
    assert_eq!(manager.timestamp(), 700);
    manager.signal(target, None, "ring");
    let effects = manager.take_effects();
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0].translation, Vec2::new(1.0, 1.0));
    assert_eq!(effects[0].expires, 1_700);
    assert!(!manager.signal(target, None, "knock"));
}

#[test]
fn pressure_plate_fires_once_per_visit() {
    let mut model = common::model("plates");
    model.add_entry(Entry::Placeable(PlaceableEntry {
        id: 0,
        placeable: ConfigReference::new("placeable/plate"),
        transform: Transform2D::from_translation(Vec2::new(5.0, 0.0)),
    }));
    let mut manager = common::manager(model);
    let runner = manager
        .spawn_actor(&ConfigReference::new("actor/runner"), Vec2::new(3.0, 0.0), 0.0)
        .expect("runner spawns");
    manager.enqueue_input(
        runner,
        InputFrame {
            timestamp: 0,
            rotation: 0.0,
            direction: 0.0,
            moving: true,
        },
    );
    for _ in 0..20 {
        manager.tick();
    }
    let effects = manager.take_effects();
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0].translation, Vec2::new(5.0, 0.0));

    let turn_at = manager.timestamp();
    manager.enqueue_input(
        runner,
        InputFrame {
            timestamp: turn_at,
            rotation: std::f32::consts::PI,
            direction: std::f32::consts::PI,
            moving: true,
        },
    );
    for _ in 0..20 {
        manager.tick();
    }
    assert_eq!(manager.take_effects().len(), 1);
}

#[test]
fn timer_handlers_respect_their_limit() {
    let mut model = common::model("clock");
    let key = model
        .add_entry(Entry::Global(GlobalEntry {
            id: 0,
            global: ConfigReference::new("global/clock"),
        }))
        .expect("global added");
    let mut manager = common::manager(model);
    for _ in 0..30 {
        manager.tick();
    }
    assert_eq!(manager.variable(LogicRef::Entry(key), "chimes"), Some(3.0));
}

#[test]
fn patrol_walks_its_route() {
    let mut model = common::model("patrol");
    let corner = Vec2::new(5.0, 3.5);
    model.add_entry(Entry::Path(PathEntry {
        id: 0,
        path: ConfigReference::new("path/loop"),
        vertices: vec![Vec2::new(2.0, 0.5), Vec2::new(2.0, 3.5), corner],
    }));
    let mut manager = common::manager(model);
    let walker = manager
        .spawn_actor(&ConfigReference::new("actor/walker"), Vec2::new(0.5, 0.5), 0.0)
        .expect("walker spawns");

    let mut closest = f32::MAX;
    for _ in 0..200 {
        manager.tick();
        let position = manager
            .translation(LogicRef::Actor(walker))
            .expect("walker is live");
        closest = closest.min(position.distance(corner));
    }
    assert!(closest < 0.5, "closest approach {closest}");
}

#[test]
fn destroyed_actors_leave_tag_lists_next_tick() {
    let mut manager = common::manager(common::model("tags"));
    let first = manager
        .spawn_actor(&ConfigReference::new("actor/bell"), Vec2::ZERO, 0.0)
        .expect("bell");
    let second = manager
        .spawn_actor(&ConfigReference::new("actor/bell"), Vec2::new(3.0, 0.0), 0.0)
        .expect("bell");
    assert_eq!(
        manager.get_tagged("bell"),
        vec![LogicRef::Actor(first), LogicRef::Actor(second)]
    );
    assert!(manager.destroy_actor(first));
    manager.tick();
    assert_eq!(manager.get_tagged("bell"), vec![LogicRef::Actor(second)]);
}
