//! Mapping configuration errors. All of these are fatal and surface
//! before any remote call is made.

use thiserror::Error;

/// Result type alias for mapping operations.
pub type MappingResult<T> = std::result::Result<T, MappingError>;

/// A bad or missing configuration reference.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("column '{column}' is not present in the input (referenced by {referent})")]
    MissingColumn { column: String, referent: String },

    #[error("entity type '{entity_type}' is not declared by any column or prefix rule (referenced by {referent})")]
    UndeclaredType {
        entity_type: String,
        referent: String,
    },

    #[error("relation '{name}' declares neither 'type' nor 'type_column'")]
    MissingRelationType { name: String },

    #[error("relation '{name}': column '{column}' has no declared type and no prefixes are configured")]
    UntypedEndpoint { name: String, column: String },

    #[error("relation '{name}': column '{column}' is mapped to type '{mapped}' but the relation declares '{declared}'")]
    EndpointTypeMismatch {
        name: String,
        column: String,
        mapped: String,
        declared: String,
    },

    #[error("column '{column}' is referenced with conflicting endpoint types")]
    ConflictingEndpointType { column: String },

    #[error("delimiter for {scope} is empty")]
    EmptyDelimiter { scope: String },

    #[error("mapping defines no columns and no relations")]
    EmptyMapping,
}
