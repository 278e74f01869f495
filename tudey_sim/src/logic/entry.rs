use std::collections::BTreeMap;

use bevy::math::Vec2;

use super::handler::HandlerLogic;
use crate::config::ConfigManager;
use crate::geometry::Transform2D;
use crate::model::{Entry, EntryKey};
use crate::shape::Shape;

/// Scripting presence of a scene entry: its tags, handlers and variables.
#[derive(Debug)]
pub struct EntryLogic {
    key: EntryKey,
    tags: Vec<String>,
    translation: Vec2,
    rotation: f32,
    shape: Option<Shape>,
    pub(crate) handlers: Vec<HandlerLogic>,
    pub(crate) variables: BTreeMap<String, f64>,
}

impl EntryLogic {
    /// Logic for `entry`, or `None` when it has neither tags nor handlers.
    pub fn new(entry: &Entry, configs: &ConfigManager, timestamp: i32) -> Option<Self> {
        let tags = entry.tags(configs);
        let handlers: Vec<HandlerLogic> = entry
            .handlers(configs)
            .iter()
            .map(|config| HandlerLogic::new(config, timestamp))
            .collect();
        if tags.is_empty() && handlers.is_empty() {
            return None;
        }
        Some(Self {
            key: entry.key(),
            tags,
            translation: entry.translation(configs),
            rotation: entry.rotation(),
            shape: entry.shape(configs),
            handlers,
            variables: BTreeMap::new(),
        })
    }

    pub fn key(&self) -> EntryKey {
        self.key
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn translation(&self) -> Vec2 {
        self.translation
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn transform(&self) -> Transform2D {
        Transform2D::new(self.translation, self.rotation)
    }

    /// World-space shape of the entry.
    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    pub fn handlers(&self) -> &[HandlerLogic] {
        &self.handlers
    }

    pub fn variable(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Coord;
    use crate::model::{GlobalEntry, PlaceableEntry, TileEntry};
    use tudey_schema::ConfigReference;

    #[test]
    fn only_tagged_or_scripted_entries_get_logic() {
        let configs = ConfigManager::builtin();
        let floor = Entry::Tile(TileEntry::new(Coord::new(0, 0), ConfigReference::new("tile/floor")));
        assert!(EntryLogic::new(&floor, &configs, 0).is_none());
        let weather = Entry::Global(GlobalEntry {
            id: 4,
            global: ConfigReference::new("global/weather"),
        });
        let logic = EntryLogic::new(&weather, &configs, 0).expect("tagged global");
        assert!(logic.handlers().is_empty());
        assert!(logic.shape().is_none());
    }

    #[test]
    fn lever_gets_handlers_and_tags() {
        let configs = ConfigManager::builtin();
        let lever = Entry::Placeable(PlaceableEntry {
            id: 2,
            placeable: ConfigReference::new("placeable/lever"),
            transform: Transform2D::from_translation(Vec2::new(3.0, 4.0)),
        });
        let logic = EntryLogic::new(&lever, &configs, 0).expect("lever has logic");
        assert_eq!(logic.key(), EntryKey::Id(2));
        assert_eq!(logic.tags(), ["lever".to_string()]);
        assert_eq!(logic.handlers().len(), 1);
        assert_eq!(logic.translation(), Vec2::new(3.0, 4.0));
    }
}
