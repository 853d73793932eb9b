//! Reconciliation engine for graft.
//!
//! Takes a [`graft_types::DraftBatch`], classifies every draft as
//! create-or-update against a baseline snapshot of the remote store,
//! and executes the calls over a bounded worker pool:
//!
//! - [`RemoteIndex`] is the baseline plus the in-run overlay of
//!   identifiers assigned during the run.
//! - Single-assignment slot cells serialize drafts that
//!   collide on a natural key, a relation type, or a relation
//!   instance, without a global lock.
//! - [`Reconciler`] orchestrates the two phases (entities, then
//!   relations, with a barrier between) and assembles the run report.

mod engine;
mod error;
mod index;
mod slot;

pub use engine::{EngineConfig, Reconciler};
pub use error::{EngineError, EngineResult};
pub use index::{RelationKey, RemoteIndex};
