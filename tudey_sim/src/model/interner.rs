use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tudey_schema::{ConfigReference, ReferenceData};

/// Weak canonicalizing set: structurally equal references come back sharing
/// one allocation, so downstream equality hits the pointer fast path.
#[derive(Debug, Default)]
pub struct ReferenceInterner {
    canonical: HashMap<ReferenceData, Weak<ReferenceData>>,
    purge_at: usize,
}

impl ReferenceInterner {
    pub fn canonicalize(&mut self, reference: &ConfigReference) -> ConfigReference {
        if let Some(shared) = self
            .canonical
            .get(reference.data())
            .and_then(Weak::upgrade)
        {
            return ConfigReference::from_shared(shared);
        }
        if self.canonical.len() >= self.purge_at {
            self.purge();
        }
        self.canonical
            .insert(reference.data().clone(), Arc::downgrade(reference.shared()));
        reference.clone()
    }

    /// Drops entries whose references are no longer alive.
    pub fn purge(&mut self) {
        self.canonical.retain(|_, weak| weak.strong_count() > 0);
        self.purge_at = (self.canonical.len() * 2).max(64);
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_references_share_identity() {
        let mut interner = ReferenceInterner::default();
        let first = interner.canonicalize(&ConfigReference::new("placeable/crate"));
        let second = interner.canonicalize(&ConfigReference::new("placeable/crate"));
        assert!(first.is_same(&second));
    }

    #[test]
    fn dead_references_are_replaced() {
        let mut interner = ReferenceInterner::default();
        drop(interner.canonicalize(&ConfigReference::new("tile/wall")));
        let fresh = ConfigReference::new("tile/wall");
        let canonical = interner.canonicalize(&fresh);
        assert!(canonical.is_same(&fresh));
        interner.purge();
        assert_eq!(interner.len(), 1);
    }
}
