//! Core type definitions for graft.
//!
//! This crate defines the fundamental types shared by the mapping,
//! client, and engine crates:
//! - Remote and run identifiers
//! - Natural keys and pre-remote entity identities
//! - Entity and relation drafts
//! - Input rows and cell values
//! - Reconciliation outcomes and the run report
//!
//! Behavior (normalization, create-vs-update classification, network
//! calls) lives in the crates that own it, not here.

mod draft;
mod ids;
mod key;
mod report;
mod row;

pub use draft::{DraftBatch, EntityDraft, RelationDraft};
pub use ids::{RemoteId, RunId};
pub use key::{EntityKey, KeySpec, NaturalKey};
pub use report::{
    EntityRecord, FailureDetail, FailureKind, Outcome, RelationRecord, RunReport, RunSummary,
};
pub use row::{CellValue, Row};
