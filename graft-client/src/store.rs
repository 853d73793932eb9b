//! The graph store abstraction.
//!
//! The reconciliation engine talks to the remote store only through
//! [`GraphStore`]; the HTTP implementation lives in [`crate::http`] and
//! tests substitute an in-memory mock.

use crate::error::ClientResult;
use async_trait::async_trait;
use graft_types::RemoteId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An entity as known to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntity {
    pub id: RemoteId,
    pub entity_type: String,
    pub properties: BTreeMap<String, String>,
    /// Optimistic-concurrency token, when the store provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A relation type as known to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRelationType {
    pub id: RemoteId,
    pub name: String,
    pub source_type: String,
    pub target_type: String,
}

/// A relation instance as known to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRelation {
    pub id: RemoteId,
    pub relation_type: RemoteId,
    pub source: RemoteId,
    pub target: RemoteId,
}

/// Abstract interface to the remote graph store.
///
/// The engine guarantees at-most-one create attempt per natural key
/// through its own overlay; implementations are not expected to
/// deduplicate. List operations return full collections (the HTTP
/// implementation follows pagination cursors internally).
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Acquires a session token. Called once before any other
    /// operation; later calls refresh the token when needed.
    async fn authenticate(&self) -> ClientResult<()>;

    /// All active entities.
    async fn list_entities(&self) -> ClientResult<Vec<RemoteEntity>>;

    /// All declared relation types.
    async fn list_relation_types(&self) -> ClientResult<Vec<RemoteRelationType>>;

    /// All relation instances.
    async fn list_relations(&self) -> ClientResult<Vec<RemoteRelation>>;

    /// Creates an entity, returning its assigned identifier.
    async fn create_entity(
        &self,
        entity_type: &str,
        properties: &BTreeMap<String, String>,
    ) -> ClientResult<RemoteId>;

    /// Replaces an entity's properties (last write wins).
    async fn update_entity(
        &self,
        id: &RemoteId,
        properties: &BTreeMap<String, String>,
        version: Option<&str>,
    ) -> ClientResult<RemoteId>;

    /// Registers a relation type unseen in the baseline.
    async fn create_relation_type(
        &self,
        name: &str,
        source_type: &str,
        target_type: &str,
    ) -> ClientResult<RemoteId>;

    /// Creates a relation instance between two resolved entities.
    async fn create_relation(
        &self,
        relation_type: &RemoteId,
        source: &RemoteId,
        target: &RemoteId,
        properties: &BTreeMap<String, String>,
    ) -> ClientResult<RemoteId>;

    /// Replaces a relation instance's properties.
    async fn update_relation(
        &self,
        id: &RemoteId,
        properties: &BTreeMap<String, String>,
    ) -> ClientResult<RemoteId>;
}
