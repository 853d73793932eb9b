//! Entity and relation drafts: in-memory candidates derived from input
//! rows, not yet known to the remote store.

use crate::EntityKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A candidate entity derived from one input row.
///
/// Identity within a run is `identity` (type plus natural key); `row`
/// is the 0-based index of the originating input row, kept so result
/// records can be ordered reproducibly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDraft {
    pub row: usize,
    pub identity: EntityKey,
    pub properties: BTreeMap<String, String>,
}

impl EntityDraft {
    #[must_use]
    pub fn new(row: usize, identity: EntityKey) -> Self {
        Self {
            row,
            identity,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.identity.entity_type
    }

    /// Key pairs and extra properties merged into one bag for the wire.
    /// Key pairs win on a name collision.
    #[must_use]
    pub fn property_bag(&self) -> BTreeMap<String, String> {
        let mut bag = self.properties.clone();
        for (property, value) in self.identity.natural_key.pairs() {
            bag.insert(property.to_string(), value.to_string());
        }
        bag
    }
}

/// A candidate relationship between two entities, referenced by their
/// pre-remote identities. Endpoints must resolve to remote identifiers
/// before this draft can be dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDraft {
    pub row: usize,
    pub relation_type: String,
    pub source: EntityKey,
    pub target: EntityKey,
    pub properties: BTreeMap<String, String>,
}

impl RelationDraft {
    #[must_use]
    pub fn new(
        row: usize,
        relation_type: impl Into<String>,
        source: EntityKey,
        target: EntityKey,
    ) -> Self {
        Self {
            row,
            relation_type: relation_type.into(),
            source,
            target,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }
}

/// All drafts mapped from one input table, in row order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftBatch {
    pub entities: Vec<EntityDraft>,
    pub relations: Vec<RelationDraft>,
}

impl DraftBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends another batch, preserving draft order.
    pub fn extend(&mut self, other: DraftBatch) {
        self.entities.extend(other.entities);
        self.relations.extend(other.relations);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}
