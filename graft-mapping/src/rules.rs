use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Deserialize;

use crate::error::{MappingError, MappingResult};
use graft_types::KeySpec;

// ---------------------------------------------------------------------------
// Rules object
// ---------------------------------------------------------------------------

/// Declarative mapping rules, usually the `[mapping]` section of a
/// recipe file.
///
/// `columns` maps input columns to the entity type their values
/// produce; `prefixes` maps value prefixes to entity types for columns
/// whose type varies per value; `relations` declares the relation
/// templates. Validation is split in two: [`MappingRules::validate`]
/// checks internal consistency, [`MappingRules::check_columns`] checks
/// the rules against the actual input header.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingRules {
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
    #[serde(default)]
    pub key_properties: HashMap<String, String>,
    #[serde(default)]
    pub prefixes: BTreeMap<String, String>,
    #[serde(default)]
    pub delimiters: DelimiterRules,
    #[serde(default)]
    pub properties: BTreeMap<String, BTreeMap<String, PropertyRule>>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationTemplate>,
}

/// Default delimiter plus per-column overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct DelimiterRules {
    #[serde(default = "default_delimiter")]
    pub default: String,
    #[serde(flatten)]
    pub columns: BTreeMap<String, String>,
}

fn default_delimiter() -> String {
    ";".to_string()
}

impl Default for DelimiterRules {
    fn default() -> Self {
        Self {
            default: default_delimiter(),
            columns: BTreeMap::new(),
        }
    }
}

impl DelimiterRules {
    /// The delimiter to split `column` on.
    #[must_use]
    pub fn for_column(&self, column: &str) -> &str {
        self.columns
            .get(column)
            .map_or(self.default.as_str(), String::as_str)
    }
}

/// One extra property attached to every draft of a type: either copied
/// from a column of the same row or a fixed literal.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PropertyRule {
    FromColumn { column: String },
    Literal { value: String },
}

/// One relation-producing rule.
///
/// The relation type comes from `type`, or per row from `type_column`
/// (falling back to `type` when the cell is empty). Endpoint types come
/// from `source_type`/`target_type`, from the endpoint column's entry
/// in `columns`, or per value from `prefixes` when neither is given.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationTemplate {
    #[serde(default, rename = "type")]
    pub relation_type: Option<String>,
    #[serde(default)]
    pub type_column: Option<String>,
    pub source_column: String,
    #[serde(default)]
    pub source_type: Option<String>,
    pub target_column: String,
    #[serde(default)]
    pub target_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl MappingRules {
    /// Entity types declared by column or prefix rules.
    #[must_use]
    pub fn declared_types(&self) -> BTreeSet<&str> {
        self.columns
            .values()
            .chain(self.prefixes.values())
            .map(String::as_str)
            .collect()
    }

    /// The per-type natural-key property map.
    #[must_use]
    pub fn key_spec(&self) -> KeySpec {
        KeySpec::new(self.key_properties.clone())
    }

    /// Value prefixes lower-cased and ordered longest first, so that
    /// `m_vol_` matches before `m_`.
    #[must_use]
    pub fn protected_prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.prefixes.keys().map(|p| p.to_lowercase()).collect();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        prefixes
    }

    /// Checks internal consistency of the rules.
    pub fn validate(&self) -> MappingResult<()> {
        if self.columns.is_empty() && self.relations.is_empty() {
            return Err(MappingError::EmptyMapping);
        }

        if self.delimiters.default.is_empty() {
            return Err(MappingError::EmptyDelimiter {
                scope: "default".to_string(),
            });
        }
        for (column, delimiter) in &self.delimiters.columns {
            if delimiter.is_empty() {
                return Err(MappingError::EmptyDelimiter {
                    scope: format!("column '{column}'"),
                });
            }
        }

        let declared = self.declared_types();
        for entity_type in self.key_properties.keys() {
            if !declared.contains(entity_type.as_str()) {
                return Err(MappingError::UndeclaredType {
                    entity_type: entity_type.clone(),
                    referent: "key_properties".to_string(),
                });
            }
        }
        for entity_type in self.properties.keys() {
            if !declared.contains(entity_type.as_str()) {
                return Err(MappingError::UndeclaredType {
                    entity_type: entity_type.clone(),
                    referent: "properties".to_string(),
                });
            }
        }

        let mut endpoint_types: HashMap<&str, Option<&str>> = HashMap::new();
        for (name, template) in &self.relations {
            if template.relation_type.is_none() && template.type_column.is_none() {
                return Err(MappingError::MissingRelationType { name: name.clone() });
            }
            for (column, declared_type) in [
                (&template.source_column, &template.source_type),
                (&template.target_column, &template.target_type),
            ] {
                self.validate_endpoint(name, column, declared_type, &declared)?;
                let resolved = declared_type
                    .as_deref()
                    .or_else(|| self.columns.get(column).map(String::as_str));
                match endpoint_types.get(column.as_str()) {
                    Some(previous) if *previous != resolved => {
                        return Err(MappingError::ConflictingEndpointType {
                            column: column.clone(),
                        });
                    }
                    _ => {
                        endpoint_types.insert(column, resolved);
                    }
                }
            }
        }

        Ok(())
    }

    fn validate_endpoint(
        &self,
        name: &str,
        column: &str,
        declared_type: &Option<String>,
        declared: &BTreeSet<&str>,
    ) -> MappingResult<()> {
        if let Some(entity_type) = declared_type {
            if !declared.contains(entity_type.as_str()) {
                return Err(MappingError::UndeclaredType {
                    entity_type: entity_type.clone(),
                    referent: format!("relation '{name}'"),
                });
            }
            if let Some(mapped) = self.columns.get(column)
                && mapped != entity_type
            {
                return Err(MappingError::EndpointTypeMismatch {
                    name: name.to_string(),
                    column: column.to_string(),
                    mapped: mapped.clone(),
                    declared: entity_type.clone(),
                });
            }
        } else if !self.columns.contains_key(column) && self.prefixes.is_empty() {
            return Err(MappingError::UntypedEndpoint {
                name: name.to_string(),
                column: column.to_string(),
            });
        }
        Ok(())
    }

    /// Checks every referenced column against the input header.
    pub fn check_columns(&self, headers: &[String]) -> MappingResult<()> {
        let present: HashSet<&str> = headers.iter().map(String::as_str).collect();
        let missing = |column: &str, referent: String| MappingError::MissingColumn {
            column: column.to_string(),
            referent,
        };

        for column in self.columns.keys() {
            if !present.contains(column.as_str()) {
                return Err(missing(column, "columns".to_string()));
            }
        }
        for column in self.delimiters.columns.keys() {
            if !present.contains(column.as_str()) {
                return Err(missing(column, "delimiters".to_string()));
            }
        }
        for (entity_type, rules) in &self.properties {
            for (property, rule) in rules {
                if let PropertyRule::FromColumn { column } = rule
                    && !present.contains(column.as_str())
                {
                    return Err(missing(
                        column,
                        format!("property '{property}' of type '{entity_type}'"),
                    ));
                }
            }
        }
        for (name, template) in &self.relations {
            for column in [&template.source_column, &template.target_column]
                .into_iter()
                .chain(template.type_column.as_ref())
            {
                if !present.contains(column.as_str()) {
                    return Err(missing(column, format!("relation '{name}'")));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
