use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use graft_client::{
    ClientError, ClientResult, GraphStore, RemoteEntity, RemoteRelation, RemoteRelationType,
};
use graft_engine::{EngineConfig, EngineError, Reconciler};
use graft_types::{
    DraftBatch, EntityDraft, EntityKey, FailureKind, KeySpec, Outcome, RelationDraft, RemoteId,
};
use pretty_assertions::assert_eq;

// ── In-memory graph store ───────────────────────────────────────

#[derive(Default)]
struct MockState {
    entities: Vec<RemoteEntity>,
    relation_types: Vec<RemoteRelationType>,
    relations: Vec<RemoteRelation>,
    next_id: u32,
    create_entity_calls: Vec<String>,
    update_entity_calls: Vec<(String, Option<String>)>,
    create_type_calls: Vec<String>,
    create_relation_calls: u32,
    update_relation_calls: u32,
    fail_create_names: HashSet<String>,
}

/// Graph store backed by vectors, with per-name failure injection and
/// call counters.
#[derive(Default)]
struct MockStore {
    state: Mutex<MockState>,
    fail_auth: AtomicBool,
    fail_listing: AtomicBool,
    /// When set, list_entities pretends the store is empty while
    /// mutations still land, imitating a stale baseline snapshot.
    hide_baseline: AtomicBool,
}

impl MockStore {
    fn fail_create_of(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_create_names
            .insert(name.to_string());
    }

    fn seed_entity(&self, entity_type: &str, name: &str, version: Option<&str>) -> RemoteId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = RemoteId::new(format!("e{}", state.next_id));
        let mut properties = BTreeMap::new();
        properties.insert("name".to_string(), name.to_string());
        state.entities.push(RemoteEntity {
            id: id.clone(),
            entity_type: entity_type.to_string(),
            properties,
            version: version.map(str::to_string),
        });
        id
    }

    fn seed_relation_type(&self, name: &str, source: &str, target: &str) -> RemoteId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = RemoteId::new(format!("rt{}", state.next_id));
        state.relation_types.push(RemoteRelationType {
            id: id.clone(),
            name: name.to_string(),
            source_type: source.to_string(),
            target_type: target.to_string(),
        });
        id
    }

    fn seed_relation(&self, relation_type: &RemoteId, source: &RemoteId, target: &RemoteId) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = RemoteId::new(format!("r{}", state.next_id));
        state.relations.push(RemoteRelation {
            id,
            relation_type: relation_type.clone(),
            source: source.clone(),
            target: target.clone(),
        });
    }

    fn with_state<R>(&self, f: impl FnOnce(&MockState) -> R) -> R {
        f(&self.state.lock().unwrap())
    }
}

#[async_trait]
impl GraphStore for MockStore {
    async fn authenticate(&self) -> ClientResult<()> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(ClientError::Auth("bad credentials".to_string()));
        }
        Ok(())
    }

    async fn list_entities(&self) -> ClientResult<Vec<RemoteEntity>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ClientError::Network("listing unavailable".to_string()));
        }
        if self.hide_baseline.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(self.with_state(|s| s.entities.clone()))
    }

    async fn list_relation_types(&self) -> ClientResult<Vec<RemoteRelationType>> {
        Ok(self.with_state(|s| s.relation_types.clone()))
    }

    async fn list_relations(&self) -> ClientResult<Vec<RemoteRelation>> {
        Ok(self.with_state(|s| s.relations.clone()))
    }

    async fn create_entity(
        &self,
        entity_type: &str,
        properties: &BTreeMap<String, String>,
    ) -> ClientResult<RemoteId> {
        let mut state = self.state.lock().unwrap();
        let name = properties.get("name").cloned().unwrap_or_default();
        state.create_entity_calls.push(name.clone());
        if state.fail_create_names.contains(&name) {
            return Err(ClientError::Network(format!("injected failure for {name}")));
        }
        state.next_id += 1;
        let id = RemoteId::new(format!("e{}", state.next_id));
        state.entities.push(RemoteEntity {
            id: id.clone(),
            entity_type: entity_type.to_string(),
            properties: properties.clone(),
            version: None,
        });
        Ok(id)
    }

    async fn update_entity(
        &self,
        id: &RemoteId,
        _properties: &BTreeMap<String, String>,
        version: Option<&str>,
    ) -> ClientResult<RemoteId> {
        let mut state = self.state.lock().unwrap();
        state
            .update_entity_calls
            .push((id.to_string(), version.map(str::to_string)));
        Ok(id.clone())
    }

    async fn create_relation_type(
        &self,
        name: &str,
        source_type: &str,
        target_type: &str,
    ) -> ClientResult<RemoteId> {
        let mut state = self.state.lock().unwrap();
        state.create_type_calls.push(name.to_string());
        state.next_id += 1;
        let id = RemoteId::new(format!("rt{}", state.next_id));
        state.relation_types.push(RemoteRelationType {
            id: id.clone(),
            name: name.to_string(),
            source_type: source_type.to_string(),
            target_type: target_type.to_string(),
        });
        Ok(id)
    }

    async fn create_relation(
        &self,
        relation_type: &RemoteId,
        source: &RemoteId,
        target: &RemoteId,
        _properties: &BTreeMap<String, String>,
    ) -> ClientResult<RemoteId> {
        let mut state = self.state.lock().unwrap();
        state.create_relation_calls += 1;
        state.next_id += 1;
        let id = RemoteId::new(format!("r{}", state.next_id));
        state.relations.push(RemoteRelation {
            id: id.clone(),
            relation_type: relation_type.clone(),
            source: source.clone(),
            target: target.clone(),
        });
        Ok(id)
    }

    async fn update_relation(
        &self,
        id: &RemoteId,
        _properties: &BTreeMap<String, String>,
    ) -> ClientResult<RemoteId> {
        let mut state = self.state.lock().unwrap();
        state.update_relation_calls += 1;
        Ok(id.clone())
    }
}

// ── Helpers ─────────────────────────────────────────────────────

fn entity(row: usize, entity_type: &str, name: &str) -> EntityDraft {
    EntityDraft::new(row, EntityKey::single(entity_type, "name", name))
}

fn relation(row: usize, relation_type: &str, source: &EntityDraft, target: &EntityDraft) -> RelationDraft {
    RelationDraft::new(
        row,
        relation_type,
        source.identity.clone(),
        target.identity.clone(),
    )
}

fn reconciler(store: &Arc<MockStore>, workers: usize) -> Reconciler {
    Reconciler::new(
        store.clone(),
        KeySpec::default(),
        EngineConfig { workers },
    )
}

// ── Happy path ──────────────────────────────────────────────────

#[tokio::test]
async fn creates_entities_and_relations_against_empty_store() {
    let store = Arc::new(MockStore::default());
    let alice = entity(0, "person", "alice");
    let acme = entity(0, "org", "acme");
    let batch = DraftBatch {
        relations: vec![relation(0, "works_for", &alice, &acme)],
        entities: vec![alice, acme],
    };

    let report = reconciler(&store, 4).run(batch).await.unwrap();

    assert_eq!(report.summary.entities_created, 2);
    assert_eq!(report.summary.relations_created, 1);
    assert_eq!(report.summary.failed(), 0);
    assert!(report.entities.iter().all(|r| r.remote_id.is_some()));
    // The unseen relation type was provisioned exactly once.
    store.with_state(|s| {
        assert_eq!(s.create_type_calls, vec!["works_for".to_string()]);
        assert_eq!(s.create_relation_calls, 1);
    });
}

#[tokio::test]
async fn records_are_ordered_by_draft_order_despite_concurrency() {
    let store = Arc::new(MockStore::default());
    let entities: Vec<EntityDraft> = (0..32)
        .map(|row| entity(row, "person", &format!("p{row:02}")))
        .collect();
    let batch = DraftBatch {
        entities,
        relations: Vec::new(),
    };

    let report = reconciler(&store, 8).run(batch).await.unwrap();

    let rows: Vec<usize> = report.entities.iter().map(|r| r.row).collect();
    assert_eq!(rows, (0..32).collect::<Vec<_>>());
}

// ── Natural-key dedup ───────────────────────────────────────────

#[tokio::test]
async fn duplicate_natural_keys_issue_one_create() {
    let store = Arc::new(MockStore::default());
    let batch = DraftBatch {
        entities: (0..5).map(|row| entity(row, "person", "alice")).collect(),
        relations: Vec::new(),
    };

    let report = reconciler(&store, 4).run(batch).await.unwrap();

    store.with_state(|s| assert_eq!(s.create_entity_calls.len(), 1));
    let ids: HashSet<_> = report
        .entities
        .iter()
        .map(|r| r.remote_id.clone().unwrap())
        .collect();
    assert_eq!(ids.len(), 1, "all drafts resolve to the same identifier");
    assert_eq!(report.summary.entities_created, 5);
}

#[tokio::test]
async fn followers_mirror_a_failed_leader() {
    let store = Arc::new(MockStore::default());
    store.fail_create_of("alice");
    let batch = DraftBatch {
        entities: vec![entity(0, "person", "alice"), entity(1, "person", "alice")],
        relations: Vec::new(),
    };

    let report = reconciler(&store, 4).run(batch).await.unwrap();

    store.with_state(|s| assert_eq!(s.create_entity_calls.len(), 1));
    assert_eq!(report.summary.entities_failed, 2);
    for record in &report.entities {
        assert_eq!(record.outcome, Outcome::Failed);
        assert_eq!(record.error.as_ref().unwrap().kind, FailureKind::RemoteCall);
    }
}

// ── Idempotence ─────────────────────────────────────────────────

#[tokio::test]
async fn second_run_updates_instead_of_creating() {
    let store = Arc::new(MockStore::default());
    let batch = DraftBatch {
        entities: vec![entity(0, "person", "alice"), entity(1, "org", "acme")],
        relations: Vec::new(),
    };

    let first = reconciler(&store, 4).run(batch.clone()).await.unwrap();
    assert_eq!(first.summary.entities_created, 2);

    let second = reconciler(&store, 4).run(batch).await.unwrap();
    assert_eq!(second.summary.entities_created, 0);
    assert_eq!(second.summary.entities_updated, 2);
    store.with_state(|s| {
        assert_eq!(s.create_entity_calls.len(), 2, "no duplicate creates");
        assert_eq!(s.update_entity_calls.len(), 2);
    });
}

#[tokio::test]
async fn update_carries_the_baseline_version_token() {
    let store = Arc::new(MockStore::default());
    let id = store.seed_entity("person", "alice", Some("7"));
    let batch = DraftBatch {
        entities: vec![entity(0, "person", "alice")],
        relations: Vec::new(),
    };

    let report = reconciler(&store, 1).run(batch).await.unwrap();

    assert_eq!(report.entities[0].outcome, Outcome::Updated);
    assert_eq!(report.entities[0].remote_id, Some(id.clone()));
    store.with_state(|s| {
        assert_eq!(
            s.update_entity_calls,
            vec![(id.to_string(), Some("7".to_string()))]
        );
    });
}

// ── Relation phase ──────────────────────────────────────────────

#[tokio::test]
async fn failed_endpoint_fails_relations_without_any_call() {
    let store = Arc::new(MockStore::default());
    store.fail_create_of("acme");
    let alice = entity(0, "person", "alice");
    let bob = entity(1, "person", "bob");
    let acme = entity(0, "org", "acme");
    let batch = DraftBatch {
        relations: vec![
            relation(0, "works_for", &alice, &acme),
            relation(1, "works_for", &bob, &acme),
        ],
        entities: vec![alice, bob, acme],
    };

    let report = reconciler(&store, 4).run(batch).await.unwrap();

    assert_eq!(report.summary.relations_failed, 2);
    for record in &report.relations {
        assert_eq!(
            record.error.as_ref().unwrap().kind,
            FailureKind::EndpointUnresolved
        );
    }
    store.with_state(|s| {
        assert_eq!(s.create_relation_calls, 0, "failed endpoints never reach the API");
        assert!(s.create_type_calls.is_empty());
    });
}

#[tokio::test]
async fn duplicate_relation_drafts_collapse_to_one_call() {
    let store = Arc::new(MockStore::default());
    store.seed_relation_type("works_for", "person", "org");
    let alice = entity(0, "person", "alice");
    let acme = entity(0, "org", "acme");
    let batch = DraftBatch {
        relations: vec![
            relation(0, "works_for", &alice, &acme),
            relation(1, "works_for", &alice, &acme),
            relation(2, "works_for", &alice, &acme),
        ],
        entities: vec![alice, acme],
    };

    let report = reconciler(&store, 4).run(batch).await.unwrap();

    store.with_state(|s| assert_eq!(s.create_relation_calls, 1));
    let ids: HashSet<_> = report
        .relations
        .iter()
        .map(|r| r.remote_id.clone().unwrap())
        .collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(report.summary.relations_created, 3);
}

#[tokio::test]
async fn relation_type_is_provisioned_once_under_contention() {
    let store = Arc::new(MockStore::default());
    let people: Vec<EntityDraft> = (0..16)
        .map(|row| entity(row, "person", &format!("p{row}")))
        .collect();
    let acme = entity(0, "org", "acme");
    let relations: Vec<RelationDraft> = people
        .iter()
        .map(|p| relation(p.row, "works_for", p, &acme))
        .collect();
    let mut entities = people;
    entities.push(acme);
    let batch = DraftBatch { entities, relations };

    let report = reconciler(&store, 8).run(batch).await.unwrap();

    assert_eq!(report.summary.relations_created, 16);
    store.with_state(|s| {
        assert_eq!(s.create_type_calls.len(), 1);
        assert_eq!(s.create_relation_calls, 16);
    });
}

#[tokio::test]
async fn relation_type_names_provision_lowercased() {
    let store = Arc::new(MockStore::default());
    let alice = entity(0, "person", "alice");
    let bob = entity(1, "person", "bob");
    let acme = entity(0, "org", "acme");
    let batch = DraftBatch {
        relations: vec![
            relation(0, "Works_For", &alice, &acme),
            relation(1, "works_for", &bob, &acme),
        ],
        entities: vec![alice, bob, acme],
    };

    let report = reconciler(&store, 4).run(batch).await.unwrap();

    assert_eq!(report.summary.relations_created, 2);
    store.with_state(|s| {
        assert_eq!(s.create_type_calls, vec!["works_for".to_string()]);
        assert_eq!(s.relation_types.len(), 1);
        assert_eq!(s.relation_types[0].name, "works_for");
    });
}

#[tokio::test]
async fn cached_relation_instance_is_updated_not_recreated() {
    let store = Arc::new(MockStore::default());
    let alice_id = store.seed_entity("person", "alice", None);
    let acme_id = store.seed_entity("org", "acme", None);
    let type_id = store.seed_relation_type("works_for", "person", "org");
    store.seed_relation(&type_id, &alice_id, &acme_id);

    let alice = entity(0, "person", "alice");
    let acme = entity(0, "org", "acme");
    let batch = DraftBatch {
        relations: vec![relation(0, "works_for", &alice, &acme)],
        entities: vec![alice, acme],
    };

    let report = reconciler(&store, 2).run(batch).await.unwrap();

    assert_eq!(report.summary.relations_updated, 1);
    store.with_state(|s| {
        assert_eq!(s.create_relation_calls, 0);
        assert_eq!(s.update_relation_calls, 1);
    });
}

#[tokio::test]
async fn baseline_only_endpoints_resolve_through_the_index() {
    let store = Arc::new(MockStore::default());
    let alice_id = store.seed_entity("person", "alice", None);
    store.seed_relation_type("works_for", "person", "org");

    // Only the org is drafted this run; the person endpoint exists
    // solely in the baseline.
    let acme = entity(0, "org", "acme");
    let alice_key = EntityKey::single("person", "name", "alice");
    let batch = DraftBatch {
        relations: vec![RelationDraft::new(0, "works_for", alice_key, acme.identity.clone())],
        entities: vec![acme],
    };

    let report = reconciler(&store, 2).run(batch).await.unwrap();

    assert_eq!(report.summary.relations_created, 1);
    store.with_state(|s| {
        let created = s.relations.last().unwrap();
        assert_eq!(created.source, alice_id);
    });
}

// ── Fatal errors ────────────────────────────────────────────────

#[tokio::test]
async fn auth_failure_aborts_before_any_mutation() {
    let store = Arc::new(MockStore::default());
    store.fail_auth.store(true, Ordering::SeqCst);
    let batch = DraftBatch {
        entities: vec![entity(0, "person", "alice")],
        relations: Vec::new(),
    };

    let err = reconciler(&store, 2).run(batch).await.unwrap_err();

    assert!(matches!(err, EngineError::Auth(_)));
    store.with_state(|s| assert!(s.create_entity_calls.is_empty()));
}

#[tokio::test]
async fn baseline_failure_aborts_before_any_mutation() {
    let store = Arc::new(MockStore::default());
    store.fail_listing.store(true, Ordering::SeqCst);
    let batch = DraftBatch {
        entities: vec![entity(0, "person", "alice")],
        relations: Vec::new(),
    };

    let err = reconciler(&store, 2).run(batch).await.unwrap_err();

    assert!(matches!(err, EngineError::Baseline(_)));
    store.with_state(|s| assert!(s.create_entity_calls.is_empty()));
}

// ── Accepted boundary ───────────────────────────────────────────

#[tokio::test]
async fn stale_baseline_can_duplicate_concurrent_external_creates() {
    // The baseline is fetched once and trusted for the whole run. If
    // another client creates "acme" after our snapshot, we create a
    // second one. Accepted limitation of the cache+overlay model, not
    // a bug this engine tries to detect.
    let store = Arc::new(MockStore::default());
    store.seed_entity("org", "acme", None);
    store.hide_baseline.store(true, Ordering::SeqCst);
    let batch = DraftBatch {
        entities: vec![entity(0, "org", "acme")],
        relations: Vec::new(),
    };

    let report = reconciler(&store, 1).run(batch).await.unwrap();

    assert_eq!(report.summary.entities_created, 1);
    store.with_state(|s| {
        let acmes = s
            .entities
            .iter()
            .filter(|e| e.properties.get("name").is_some_and(|n| n == "acme"))
            .count();
        assert_eq!(acmes, 2);
    });
}
