//! The record mapper: one validated rules object, many rows in, drafts
//! out.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::MappingResult;
use crate::normalize::{clean_scalar, normalize, starts_with_prefix};
use crate::rules::{MappingRules, PropertyRule, RelationTemplate};
use graft_types::{DraftBatch, EntityDraft, EntityKey, KeySpec, RelationDraft, Row};

/// How an endpoint column's values acquire their entity type.
#[derive(Debug, Clone)]
enum Typing {
    Fixed(String),
    ByPrefix,
}

/// Maps rows into entity and relation drafts.
///
/// Construction validates the rules; afterwards mapping cannot fail per
/// row. Empty cells and values no prefix can type yield fewer drafts,
/// never errors.
pub struct RecordMapper {
    rules: MappingRules,
    key_spec: KeySpec,
    protected: Vec<String>,
    prefix_types: Vec<(String, String)>,
    endpoint_spawns: Vec<(String, Typing)>,
}

impl RecordMapper {
    /// Validates `rules` and prepares a mapper.
    pub fn new(rules: MappingRules) -> MappingResult<Self> {
        rules.validate()?;

        let key_spec = rules.key_spec();
        let mut prefix_types: Vec<(String, String)> = rules
            .prefixes
            .iter()
            .map(|(prefix, entity_type)| (prefix.to_lowercase(), entity_type.clone()))
            .collect();
        // Longest prefix first, so m_vol_ wins over m_.
        prefix_types.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        let protected: Vec<String> = prefix_types.iter().map(|(p, _)| p.clone()).collect();

        // Relation endpoint columns outside `columns` spawn their own
        // entity drafts so the referenced entities exist before linking.
        let mut endpoint_spawns: Vec<(String, Typing)> = Vec::new();
        for template in rules.relations.values() {
            for (column, declared) in [
                (&template.source_column, &template.source_type),
                (&template.target_column, &template.target_type),
            ] {
                if rules.columns.contains_key(column)
                    || endpoint_spawns.iter().any(|(c, _)| c == column)
                {
                    continue;
                }
                let typing = match declared {
                    Some(entity_type) => Typing::Fixed(entity_type.clone()),
                    None => Typing::ByPrefix,
                };
                endpoint_spawns.push((column.clone(), typing));
            }
        }

        Ok(Self {
            rules,
            key_spec,
            protected,
            prefix_types,
            endpoint_spawns,
        })
    }

    /// Checks the rules against the actual input header.
    pub fn check_columns(&self, headers: &[String]) -> MappingResult<()> {
        self.rules.check_columns(headers)
    }

    /// The per-type key-property map, used to extract natural keys from
    /// remote property bags.
    #[must_use]
    pub fn key_spec(&self) -> &KeySpec {
        &self.key_spec
    }

    /// Maps every row, preserving row order within each draft list.
    #[must_use]
    pub fn map_all(&self, rows: &[Row]) -> DraftBatch {
        let mut batch = DraftBatch::new();
        for row in rows {
            batch.extend(self.map_row(row));
        }
        debug!(
            rows = rows.len(),
            entities = batch.entities.len(),
            relations = batch.relations.len(),
            "mapped input rows into drafts"
        );
        batch
    }

    /// Maps one row into drafts.
    #[must_use]
    pub fn map_row(&self, row: &Row) -> DraftBatch {
        let mut batch = DraftBatch::new();

        for (column, entity_type) in &self.rules.columns {
            for value in self.column_values(row, column) {
                let identity = self.identity(entity_type, value);
                let properties = self.extra_properties(entity_type, row);
                batch
                    .entities
                    .push(EntityDraft::new(row.index, identity).with_properties(properties));
            }
        }

        for (column, typing) in &self.endpoint_spawns {
            for value in self.column_values(row, column) {
                match self.resolve_type(typing, &value) {
                    Some(entity_type) => {
                        // Endpoint columns only reference an entity by
                        // identifier; property rules for the type read
                        // other columns of the row, which describe the
                        // row's own entity, not the referenced one.
                        let identity = self.identity(&entity_type, value);
                        batch.entities.push(EntityDraft::new(row.index, identity));
                    }
                    None => {
                        warn!(column = %column, value = %value, "no prefix matches value, skipping");
                    }
                }
            }
        }

        for (name, template) in &self.rules.relations {
            self.map_relation(row, name, template, &mut batch);
        }

        batch
    }

    /// One relation template applied to one row: the cross product of
    /// both endpoint columns, or nothing when either side is empty.
    fn map_relation(
        &self,
        row: &Row,
        name: &str,
        template: &RelationTemplate,
        batch: &mut DraftBatch,
    ) {
        let Some(relation_type) = self.relation_type_for(template, row) else {
            debug!(relation = name, row = row.index, "no relation type for row, skipping");
            return;
        };
        let sources = self.endpoint_keys(row, &template.source_column, &template.source_type);
        if sources.is_empty() {
            return;
        }
        let targets = self.endpoint_keys(row, &template.target_column, &template.target_type);
        if targets.is_empty() {
            return;
        }
        for source in &sources {
            for target in &targets {
                batch.relations.push(RelationDraft::new(
                    row.index,
                    relation_type.clone(),
                    source.clone(),
                    target.clone(),
                ));
            }
        }
    }

    fn relation_type_for(&self, template: &RelationTemplate, row: &Row) -> Option<String> {
        if let Some(column) = &template.type_column
            && let Some(value) = row.get(column).and_then(clean_scalar)
        {
            return Some(value.to_lowercase());
        }
        template.relation_type.clone()
    }

    fn endpoint_keys(&self, row: &Row, column: &str, declared: &Option<String>) -> Vec<EntityKey> {
        let typing = match declared {
            Some(entity_type) => Typing::Fixed(entity_type.clone()),
            None => match self.rules.columns.get(column) {
                Some(entity_type) => Typing::Fixed(entity_type.clone()),
                None => Typing::ByPrefix,
            },
        };
        self.column_values(row, column)
            .into_iter()
            .filter_map(|value| match self.resolve_type(&typing, &value) {
                Some(entity_type) => Some(self.identity(&entity_type, value)),
                None => {
                    warn!(column = %column, value = %value, "cannot type relation endpoint, skipping");
                    None
                }
            })
            .collect()
    }

    fn column_values(&self, row: &Row, column: &str) -> Vec<String> {
        normalize(
            row.get(column),
            self.rules.delimiters.for_column(column),
            &self.protected,
        )
    }

    fn identity(&self, entity_type: &str, value: String) -> EntityKey {
        EntityKey::single(entity_type, self.key_spec.key_property(entity_type), value)
    }

    fn resolve_type(&self, typing: &Typing, value: &str) -> Option<String> {
        match typing {
            Typing::Fixed(entity_type) => Some(entity_type.clone()),
            Typing::ByPrefix => self
                .prefix_types
                .iter()
                .find(|(prefix, _)| starts_with_prefix(value, prefix))
                .map(|(_, entity_type)| entity_type.clone()),
        }
    }

    fn extra_properties(&self, entity_type: &str, row: &Row) -> BTreeMap<String, String> {
        let Some(rules) = self.rules.properties.get(entity_type) else {
            return BTreeMap::new();
        };
        let mut properties = BTreeMap::new();
        for (name, rule) in rules {
            let value = match rule {
                PropertyRule::FromColumn { column } => row.get(column).and_then(clean_scalar),
                PropertyRule::Literal { value } => Some(value.clone()),
            };
            if let Some(value) = value {
                properties.insert(name.clone(), value);
            }
        }
        properties
    }
}
