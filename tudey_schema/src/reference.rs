use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Structural content of a config reference: a config name plus named arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceData {
    pub name: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
}

/// Shared handle to a named config.
///
/// Equality is structural, with a pointer fast path: references that went
/// through the same interner share one allocation and compare in O(1).
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "ReferenceData", into = "ReferenceData")]
pub struct ConfigReference(Arc<ReferenceData>);

impl ConfigReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::new(ReferenceData {
            name: name.into(),
            arguments: BTreeMap::new(),
        }))
    }

    pub fn with_arguments(
        name: impl Into<String>,
        arguments: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self(Arc::new(ReferenceData {
            name: name.into(),
            arguments: arguments.into_iter().collect(),
        }))
    }

    pub fn from_shared(data: Arc<ReferenceData>) -> Self {
        Self(data)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn argument(&self, key: &str) -> Option<&str> {
        self.0.arguments.get(key).map(String::as_str)
    }

    pub fn arguments(&self) -> &BTreeMap<String, String> {
        &self.0.arguments
    }

    pub fn data(&self) -> &ReferenceData {
        &self.0
    }

    pub fn shared(&self) -> &Arc<ReferenceData> {
        &self.0
    }

    /// True when both handles point at the same allocation.
    pub fn is_same(&self, other: &ConfigReference) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ConfigReference {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other) || self.0 == other.0
    }
}

impl Eq for ConfigReference {}

impl Hash for ConfigReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for ConfigReference {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConfigReference {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl From<ReferenceData> for ConfigReference {
    fn from(value: ReferenceData) -> Self {
        Self(Arc::new(value))
    }
}

impl From<ConfigReference> for ReferenceData {
    fn from(value: ConfigReference) -> Self {
        (*value.0).clone()
    }
}

impl fmt::Debug for ConfigReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.arguments.is_empty() {
            write!(f, "ConfigReference({})", self.0.name)
        } else {
            write!(f, "ConfigReference({} {:?})", self.0.name, self.0.arguments)
        }
    }
}

impl fmt::Display for ConfigReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality_without_shared_allocation() {
        let a = ConfigReference::new("tile/wall");
        let b = ConfigReference::new("tile/wall");
        assert_eq!(a, b);
        assert!(!a.is_same(&b));
        assert!(a.is_same(&a.clone()));
    }

    #[test]
    fn arguments_participate_in_equality() {
        let plain = ConfigReference::new("actor/door");
        let argued = ConfigReference::with_arguments(
            "actor/door",
            [("color".to_string(), "red".to_string())],
        );
        assert_ne!(plain, argued);
        assert_eq!(argued.argument("color"), Some("red"));
    }

    #[test]
    fn json_form_is_name_and_arguments() {
        let parsed: ConfigReference =
            serde_json::from_str(r#"{"name": "effect/spark"}"#).expect("reference parses");
        assert_eq!(parsed.name(), "effect/spark");
        assert!(parsed.arguments().is_empty());
    }
}
