//! Natural keys: the property values that identify an entity of a given
//! type before the remote store has assigned it an identifier.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Ordered (property, value) pairs identifying one entity of its type.
///
/// Most mappings use a single pair; the ordered form keeps composite
/// keys expressible. Serializes as a JSON map in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NaturalKey(Vec<(String, String)>);

impl NaturalKey {
    /// Builds a single-property key.
    #[must_use]
    pub fn single(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self(vec![(property.into(), value.into())])
    }

    /// Builds a key from ordered (property, value) pairs.
    #[must_use]
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    /// Iterates the (property, value) pairs in declaration order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(p, v)| (p.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (property, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ";")?;
            }
            write!(f, "{property}={value}")?;
        }
        Ok(())
    }
}

impl Serialize for NaturalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (property, value) in &self.0 {
            map.serialize_entry(property, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NaturalKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = NaturalKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of key properties to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(1));
                while let Some((property, value)) = access.next_entry::<String, String>()? {
                    pairs.push((property, value));
                }
                Ok(NaturalKey(pairs))
            }
        }

        deserializer.deserialize_map(KeyVisitor)
    }
}

/// Pre-remote identity of an entity: its type plus natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: String,
    pub natural_key: NaturalKey,
}

impl EntityKey {
    #[must_use]
    pub fn new(entity_type: impl Into<String>, natural_key: NaturalKey) -> Self {
        Self {
            entity_type: entity_type.into(),
            natural_key,
        }
    }

    /// Single-property convenience used by most mappings.
    #[must_use]
    pub fn single(
        entity_type: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(entity_type, NaturalKey::single(property, value))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.natural_key)
    }
}

/// Which property carries the natural key for each entity type.
///
/// Types without an explicit override use [`KeySpec::DEFAULT_PROPERTY`].
#[derive(Debug, Clone)]
pub struct KeySpec {
    overrides: HashMap<String, String>,
}

impl KeySpec {
    pub const DEFAULT_PROPERTY: &'static str = "name";

    #[must_use]
    pub fn new(overrides: HashMap<String, String>) -> Self {
        Self { overrides }
    }

    /// The property naming entities of `entity_type`.
    #[must_use]
    pub fn key_property(&self, entity_type: &str) -> &str {
        self.overrides
            .get(entity_type)
            .map_or(Self::DEFAULT_PROPERTY, String::as_str)
    }
}

impl Default for KeySpec {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}
