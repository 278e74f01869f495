//! Packed 32-bit tile/paint cell values and the config interning tables
//! their high bits index into.
//!
//! Layout: `config_index:16 | elevation:14 | rotation_or_kind:2`. Elevation is
//! signed and recovered by sign-extending shifts.

use std::collections::HashMap;

use tudey_proto::ReferenceState;
use tudey_schema::ConfigReference;

pub const MIN_ELEVATION: i32 = -(1 << 13);
pub const MAX_ELEVATION: i32 = (1 << 13) - 1;

pub fn encode_cell(config_index: i32, elevation: i32, low_bits: i32) -> i32 {
    (config_index << 16) | ((elevation & 0x3FFF) << 2) | (low_bits & 0x3)
}

pub fn config_index(value: i32) -> i32 {
    ((value as u32) >> 16) as i32
}

pub fn elevation(value: i32) -> i32 {
    (value << 16) >> 18
}

/// Tile rotation in quarter turns, or the paint kind ordinal.
pub fn low_bits(value: i32) -> i32 {
    value & 0x3
}

#[derive(Debug, Clone, PartialEq)]
struct Interned {
    reference: ConfigReference,
    count: u32,
}

/// Reference-counted mapping between config references and small indices.
///
/// Released slots are reused lowest-first so indices stay dense.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterningTable {
    slots: Vec<Option<Interned>>,
    ids: HashMap<ConfigReference, i32>,
}

impl InterningTable {
    /// Index for `reference`, allocating a slot on first use.
    pub fn acquire(&mut self, reference: &ConfigReference) -> i32 {
        if let Some(index) = self.ids.get(reference) {
            if let Some(Some(slot)) = self.slots.get_mut(*index as usize) {
                slot.count += 1;
            }
            return *index;
        }
        let interned = Interned {
            reference: reference.clone(),
            count: 1,
        };
        let index = match self.slots.iter().position(Option::is_none) {
            Some(free) => {
                self.slots[free] = Some(interned);
                free
            }
            None => {
                self.slots.push(Some(interned));
                self.slots.len() - 1
            }
        };
        self.ids.insert(reference.clone(), index as i32);
        index as i32
    }

    /// Drops one use of `index`, freeing the slot on the last.
    pub fn release(&mut self, index: i32) {
        let Some(entry) = self.slots.get_mut(index as usize) else {
            return;
        };
        let Some(slot) = entry else {
            return;
        };
        slot.count = slot.count.saturating_sub(1);
        if slot.count == 0 {
            self.ids.remove(&slot.reference);
            *entry = None;
        }
    }

    pub fn get(&self, index: i32) -> Option<&ConfigReference> {
        if index < 0 {
            return None;
        }
        self.slots
            .get(index as usize)
            .and_then(Option::as_ref)
            .map(|slot| &slot.reference)
    }

    pub fn index_of(&self, reference: &ConfigReference) -> Option<i32> {
        self.ids.get(reference).copied()
    }

    pub fn use_count(&self, index: i32) -> u32 {
        self.slots
            .get(index as usize)
            .and_then(Option::as_ref)
            .map_or(0, |slot| slot.count)
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn to_states(&self) -> Vec<Option<ReferenceState>> {
        self.slots
            .iter()
            .map(|slot| slot.as_ref().map(|s| reference_state(&s.reference)))
            .collect()
    }

    /// Restores slot layout with zero counts; callers then [`Self::retain`]
    /// once per stored cell.
    pub fn from_references(references: Vec<Option<ConfigReference>>) -> Self {
        let mut table = Self::default();
        for (index, reference) in references.into_iter().enumerate() {
            if let Some(reference) = &reference {
                table.ids.insert(reference.clone(), index as i32);
            }
            table.slots.push(reference.map(|reference| Interned {
                reference,
                count: 0,
            }));
        }
        table
    }

    /// Adds a use to an existing slot; false if the slot is empty.
    pub fn retain(&mut self, index: i32) -> bool {
        match self.slots.get_mut(index as usize) {
            Some(Some(slot)) if index >= 0 => {
                slot.count += 1;
                true
            }
            _ => false,
        }
    }

    /// Replaces every stored reference (e.g. with its canonical instance).
    pub fn map_references(&mut self, mut f: impl FnMut(&ConfigReference) -> ConfigReference) {
        self.ids.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(slot) = slot {
                slot.reference = f(&slot.reference);
                self.ids.insert(slot.reference.clone(), index as i32);
            }
        }
    }

    /// Frees slots that no stored cell uses.
    pub fn prune_unused(&mut self) {
        for entry in self.slots.iter_mut() {
            if entry.as_ref().is_some_and(|slot| slot.count == 0) {
                if let Some(slot) = entry.take() {
                    self.ids.remove(&slot.reference);
                }
            }
        }
    }
}

pub fn reference_state(reference: &ConfigReference) -> ReferenceState {
    ReferenceState {
        name: reference.name().to_string(),
        arguments: reference
            .arguments()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    }
}

pub fn reference_from_state(state: &ReferenceState) -> ConfigReference {
    ConfigReference::with_arguments(state.name.clone(), state.arguments.iter().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_values_round_trip() {
        for (index, rotation, elevation) in [
            (0, 0, 0),
            (1, 3, -1),
            (65_535, 2, MAX_ELEVATION),
            (42, 1, MIN_ELEVATION),
            (7, 0, -300),
        ] {
            let value = encode_cell(index, elevation, rotation);
            assert_eq!(config_index(value), index);
            assert_eq!(low_bits(value), rotation);
            assert_eq!(super::elevation(value), elevation);
        }
    }

    #[test]
    fn packed_layout_is_bit_exact() {
        insta::assert_snapshot!(
            format!("{:#010x}", encode_cell(3, -2, 1)),
            @"0x0003fff9"
        );
    }

    #[test]
    fn released_slots_are_reused_lowest_first() {
        let mut table = InterningTable::default();
        let a = table.acquire(&ConfigReference::new("tile/a"));
        let b = table.acquire(&ConfigReference::new("tile/b"));
        let c = table.acquire(&ConfigReference::new("tile/c"));
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(table.acquire(&ConfigReference::new("tile/b")), 1);
        table.release(b);
        assert_eq!(table.get(b).map(ConfigReference::name), Some("tile/b"));
        table.release(b);
        table.release(a);
        assert!(table.get(a).is_none());
        assert!(table.get(b).is_none());
        assert_eq!(table.acquire(&ConfigReference::new("tile/d")), 0);
        assert_eq!(table.acquire(&ConfigReference::new("tile/e")), 1);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn restored_table_counts_from_cells() {
        let mut table = InterningTable::from_references(vec![
            Some(ConfigReference::new("tile/a")),
            None,
            Some(ConfigReference::new("tile/c")),
        ]);
        assert!(table.retain(2));
        assert!(!table.retain(1));
        table.prune_unused();
        assert!(table.get(0).is_none());
        assert_eq!(table.use_count(2), 1);
        assert_eq!(table.index_of(&ConfigReference::new("tile/c")), Some(2));
    }
}
