//! Declarative mapping from tabular rows to entity and relation drafts.
//!
//! A [`MappingRules`] value (usually deserialized from the `[mapping]`
//! section of a recipe file) declares which columns produce entities of
//! which types, which extra properties attach to them, and which column
//! pairs produce relations. [`RecordMapper`] validates the rules once
//! and then turns rows into drafts without further failure modes: after
//! validation, missing values skip, they never error.
//!
//! Cell cleanup and delimiter splitting live in [`normalize`] as pure
//! functions.

mod error;
mod mapper;
pub mod normalize;
mod rules;

pub use error::{MappingError, MappingResult};
pub use mapper::RecordMapper;
pub use rules::{DelimiterRules, MappingRules, PropertyRule, RelationTemplate};
