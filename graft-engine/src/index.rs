//! Remote state cache: baseline snapshot plus in-run overlay.
//!
//! The baseline is fetched once per run and never refreshed; entities
//! created during the run are visible only through the overlay. The
//! snapshot can therefore miss entities other API clients create
//! mid-run; that staleness is an accepted limitation.

use std::collections::HashMap;
use std::sync::Mutex;

use graft_client::{ClientResult, GraphStore, RemoteRelationType};
use graft_types::{EntityKey, KeySpec, RemoteId};
use tracing::{debug, info};

/// Identity of one relation instance: resolved type, source, and
/// target identifiers.
pub type RelationKey = (RemoteId, RemoteId, RemoteId);

#[derive(Debug, Clone)]
struct BaselineEntity {
    id: RemoteId,
    version: Option<String>,
}

/// Read-mostly snapshot of the remote store for one run.
///
/// Lookups consult the overlay first, then the baseline. Overlay
/// writes happen from worker tasks; the mutexes are held only for the
/// map operation itself.
pub struct RemoteIndex {
    entities: HashMap<EntityKey, BaselineEntity>,
    relation_types: HashMap<String, RemoteRelationType>,
    relations: HashMap<RelationKey, RemoteId>,
    entity_overlay: Mutex<HashMap<EntityKey, RemoteId>>,
    type_overlay: Mutex<HashMap<String, RemoteRelationType>>,
    relation_overlay: Mutex<HashMap<RelationKey, RemoteId>>,
}

impl RemoteIndex {
    /// Bulk-fetches the baseline: active entities, relation types, and
    /// relation instances, concurrently. Any failure aborts the build;
    /// the engine cannot classify drafts without a baseline.
    pub async fn build(store: &dyn GraphStore, key_spec: &KeySpec) -> ClientResult<Self> {
        let (remote_entities, remote_types, remote_relations) = tokio::try_join!(
            store.list_entities(),
            store.list_relation_types(),
            store.list_relations(),
        )?;

        let mut entities = HashMap::with_capacity(remote_entities.len());
        for entity in remote_entities {
            let property = key_spec.key_property(&entity.entity_type);
            let Some(value) = entity.properties.get(property) else {
                debug!(
                    id = %entity.id,
                    entity_type = %entity.entity_type,
                    property,
                    "remote entity lacks its key property, ignoring"
                );
                continue;
            };
            let key = EntityKey::single(&entity.entity_type, property, value.to_lowercase());
            entities.insert(
                key,
                BaselineEntity {
                    id: entity.id,
                    version: entity.version,
                },
            );
        }

        let relation_types: HashMap<String, RemoteRelationType> = remote_types
            .into_iter()
            .map(|rt| (rt.name.to_lowercase(), rt))
            .collect();
        let relations: HashMap<RelationKey, RemoteId> = remote_relations
            .into_iter()
            .map(|r| ((r.relation_type, r.source, r.target), r.id))
            .collect();

        info!(
            entities = entities.len(),
            relation_types = relation_types.len(),
            relations = relations.len(),
            "built baseline snapshot"
        );
        Ok(Self {
            entities,
            relation_types,
            relations,
            entity_overlay: Mutex::new(HashMap::new()),
            type_overlay: Mutex::new(HashMap::new()),
            relation_overlay: Mutex::new(HashMap::new()),
        })
    }

    /// Resolves an entity key to its remote identifier and, for
    /// baseline entities, the version token to send with updates.
    #[must_use]
    pub fn lookup(&self, key: &EntityKey) -> Option<(RemoteId, Option<String>)> {
        let overlay = self.entity_overlay.lock().expect("overlay mutex poisoned");
        if let Some(id) = overlay.get(key) {
            return Some((id.clone(), None));
        }
        drop(overlay);
        self.entities
            .get(key)
            .map(|e| (e.id.clone(), e.version.clone()))
    }

    /// Records a freshly created entity so later drafts sharing its
    /// natural key resolve without another create.
    pub fn record_entity(&self, key: EntityKey, id: RemoteId) {
        self.entity_overlay
            .lock()
            .expect("overlay mutex poisoned")
            .insert(key, id);
    }

    /// Resolves a relation type by name, case-insensitively.
    #[must_use]
    pub fn lookup_relation_type(&self, name: &str) -> Option<RemoteRelationType> {
        let name = name.to_lowercase();
        let overlay = self.type_overlay.lock().expect("overlay mutex poisoned");
        if let Some(rt) = overlay.get(&name) {
            return Some(rt.clone());
        }
        drop(overlay);
        self.relation_types.get(&name).cloned()
    }

    /// Records a relation type provisioned during this run.
    pub fn record_relation_type(&self, relation_type: RemoteRelationType) {
        self.type_overlay
            .lock()
            .expect("overlay mutex poisoned")
            .insert(relation_type.name.to_lowercase(), relation_type);
    }

    /// Resolves an equivalent relation instance, if one exists.
    #[must_use]
    pub fn lookup_relation(&self, key: &RelationKey) -> Option<RemoteId> {
        let overlay = self.relation_overlay.lock().expect("overlay mutex poisoned");
        if let Some(id) = overlay.get(key) {
            return Some(id.clone());
        }
        drop(overlay);
        self.relations.get(key).cloned()
    }

    /// Records a relation instance created during this run.
    pub fn record_relation(&self, key: RelationKey, id: RemoteId) {
        self.relation_overlay
            .lock()
            .expect("overlay mutex poisoned")
            .insert(key, id);
    }
}
