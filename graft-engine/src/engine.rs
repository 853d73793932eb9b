//! The reconciliation engine.
//!
//! Two phases over a bounded worker pool: entities first, then
//! relations, with a hard barrier in between so every relation draft
//! resolves its endpoints against terminal entity results. Within the
//! entity phase, natural keys are serialized through single-assignment
//! slots: the first draft of a key (in row order) performs the remote
//! call, later drafts mirror its result.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use graft_client::{ClientError, GraphStore, RemoteRelationType};
use graft_types::{
    DraftBatch, EntityDraft, EntityKey, EntityRecord, FailureDetail, Outcome, RelationDraft,
    RelationRecord, RemoteId, RunId, RunReport,
};
use graft_types::KeySpec;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::index::{RelationKey, RemoteIndex};
use crate::slot::{Claim, SlotMap};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Width of the worker pool, shared by both phases.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { workers: 8 }
    }
}

/// Terminal result of the remote work for one key, mirrored onto every
/// draft that shares the key.
#[derive(Debug, Clone)]
struct KeyOutcome {
    outcome: Outcome,
    remote_id: Option<RemoteId>,
    error: Option<FailureDetail>,
}

impl KeyOutcome {
    fn success(outcome: Outcome, id: RemoteId) -> Self {
        Self {
            outcome,
            remote_id: Some(id),
            error: None,
        }
    }

    fn failed(detail: FailureDetail) -> Self {
        Self {
            outcome: Outcome::Failed,
            remote_id: None,
            error: Some(detail),
        }
    }

    /// Leader task dropped without completing its slot. Only reachable
    /// if a worker panicked.
    fn abandoned() -> Self {
        Self::failed(FailureDetail::remote_call(
            "draft owning this key never completed",
        ))
    }
}

fn failure_detail(error: &ClientError) -> FailureDetail {
    if error.is_auth() {
        FailureDetail::auth(error.to_string())
    } else {
        FailureDetail::remote_call(error.to_string())
    }
}

/// Reconciles draft batches against the remote store.
pub struct Reconciler {
    store: Arc<dyn GraphStore>,
    key_spec: KeySpec,
    config: EngineConfig,
}

impl Reconciler {
    #[must_use]
    pub fn new(store: Arc<dyn GraphStore>, key_spec: KeySpec, config: EngineConfig) -> Self {
        Self {
            store,
            key_spec,
            config,
        }
    }

    /// Runs one reconciliation: authenticate, build the baseline,
    /// dispatch both phases, and assemble the report.
    ///
    /// Authentication and baseline failures abort before anything is
    /// mutated remotely. Per-draft failures never abort; the run
    /// completes and reports whatever succeeded.
    pub async fn run(&self, batch: DraftBatch) -> EngineResult<RunReport> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        info!(
            %run_id,
            entities = batch.entities.len(),
            relations = batch.relations.len(),
            workers = self.config.workers,
            "starting reconciliation run"
        );

        self.store.authenticate().await.map_err(EngineError::Auth)?;
        let index = RemoteIndex::build(self.store.as_ref(), &self.key_spec)
            .await
            .map_err(EngineError::Baseline)?;

        let run = Run {
            store: self.store.as_ref(),
            index,
            entity_slots: SlotMap::new(),
            type_slots: SlotMap::new(),
            relation_slots: SlotMap::new(),
        };
        let width = self.config.workers.max(1);

        let entities = run.entity_phase(&batch.entities, width).await;
        // Barrier: every entity draft holds a terminal result before
        // the first relation draft is dispatched.
        let relations = run.relation_phase(&batch.relations, width).await;

        let report = RunReport::new(run_id, started_at, Utc::now(), entities, relations);
        info!(
            %run_id,
            created = report.summary.entities_created + report.summary.relations_created,
            updated = report.summary.entities_updated + report.summary.relations_updated,
            failed = report.summary.failed(),
            "reconciliation run finished"
        );
        Ok(report)
    }
}

/// Per-run state: the baseline index plus the three slot maps that
/// serialize colliding work.
struct Run<'a> {
    store: &'a dyn GraphStore,
    index: RemoteIndex,
    entity_slots: SlotMap<EntityKey, KeyOutcome>,
    type_slots: SlotMap<(String, String, String), Result<RemoteId, FailureDetail>>,
    relation_slots: SlotMap<RelationKey, KeyOutcome>,
}

impl Run<'_> {
    /// Dispatches entity drafts to the pool. Leadership per natural
    /// key is assigned here, in row order, before anything runs: the
    /// first-row-wins dedup is policy, not a scheduling accident.
    async fn entity_phase(&self, drafts: &[EntityDraft], width: usize) -> Vec<EntityRecord> {
        let jobs: Vec<(usize, &EntityDraft, Claim<KeyOutcome>)> = drafts
            .iter()
            .enumerate()
            .map(|(seq, draft)| (seq, draft, self.entity_slots.claim(draft.identity.clone())))
            .collect();

        let mut records: Vec<(usize, EntityRecord)> = stream::iter(jobs)
            .map(|(seq, draft, claim)| async move {
                let result = match claim {
                    Claim::Leader => self.reconcile_entity(draft).await,
                    Claim::Wait(rx) => rx.await.unwrap_or_else(|_| KeyOutcome::abandoned()),
                    Claim::Ready(result) => result,
                };
                let record = EntityRecord {
                    row: draft.row,
                    entity_type: draft.entity_type().to_string(),
                    key: draft.identity.natural_key.clone(),
                    outcome: result.outcome,
                    remote_id: result.remote_id,
                    error: result.error,
                };
                (seq, record)
            })
            .buffer_unordered(width)
            .collect()
            .await;

        // Completion order is nondeterministic; report in draft order.
        records.sort_by_key(|(seq, _)| *seq);
        records.into_iter().map(|(_, record)| record).collect()
    }

    /// Classifies and executes one entity draft (the leader of its
    /// natural key), then publishes the result for followers.
    async fn reconcile_entity(&self, draft: &EntityDraft) -> KeyOutcome {
        let bag = draft.property_bag();
        let result = match self.index.lookup(&draft.identity) {
            Some((id, version)) => {
                match self
                    .store
                    .update_entity(&id, &bag, version.as_deref())
                    .await
                {
                    Ok(id) => KeyOutcome::success(Outcome::Updated, id),
                    Err(e) => KeyOutcome::failed(failure_detail(&e)),
                }
            }
            None => match self.store.create_entity(draft.entity_type(), &bag).await {
                Ok(id) => {
                    self.index.record_entity(draft.identity.clone(), id.clone());
                    KeyOutcome::success(Outcome::Created, id)
                }
                Err(e) => KeyOutcome::failed(failure_detail(&e)),
            },
        };
        match &result.error {
            Some(error) => warn!(key = %draft.identity, error = %error.message, "entity draft failed"),
            None => debug!(key = %draft.identity, outcome = %result.outcome, "entity draft reconciled"),
        }
        self.entity_slots.complete(&draft.identity, result.clone());
        result
    }

    async fn relation_phase(&self, drafts: &[RelationDraft], width: usize) -> Vec<RelationRecord> {
        let mut records: Vec<(usize, RelationRecord)> = stream::iter(drafts.iter().enumerate())
            .map(|(seq, draft)| async move {
                let result = self.reconcile_relation(draft).await;
                let record = RelationRecord {
                    row: draft.row,
                    relation_type: draft.relation_type.clone(),
                    source: draft.source.clone(),
                    target: draft.target.clone(),
                    outcome: result.outcome,
                    remote_id: result.remote_id,
                    error: result.error,
                };
                (seq, record)
            })
            .buffer_unordered(width)
            .collect()
            .await;

        records.sort_by_key(|(seq, _)| *seq);
        records.into_iter().map(|(_, record)| record).collect()
    }

    /// One relation draft: resolve both endpoints and the relation
    /// type, then create or update the instance. Drafts resolving to
    /// the same (type, source, target) collapse to one remote call.
    async fn reconcile_relation(&self, draft: &RelationDraft) -> KeyOutcome {
        let source = match self.resolve_endpoint(&draft.source) {
            Ok(id) => id,
            Err(detail) => {
                warn!(relation = %draft.relation_type, endpoint = %draft.source, "relation endpoint unresolved");
                return KeyOutcome::failed(detail);
            }
        };
        let target = match self.resolve_endpoint(&draft.target) {
            Ok(id) => id,
            Err(detail) => {
                warn!(relation = %draft.relation_type, endpoint = %draft.target, "relation endpoint unresolved");
                return KeyOutcome::failed(detail);
            }
        };
        let type_id = match self.relation_type_id(draft).await {
            Ok(id) => id,
            Err(detail) => return KeyOutcome::failed(detail),
        };

        let key = (type_id, source, target);
        match self.relation_slots.claim(key.clone()) {
            Claim::Leader => {
                let result = self.dispatch_relation(&key, draft).await;
                self.relation_slots.complete(&key, result.clone());
                result
            }
            Claim::Wait(rx) => rx.await.unwrap_or_else(|_| KeyOutcome::abandoned()),
            Claim::Ready(result) => result,
        }
    }

    async fn dispatch_relation(&self, key: &RelationKey, draft: &RelationDraft) -> KeyOutcome {
        let (type_id, source, target) = key;
        let result = match self.index.lookup_relation(key) {
            Some(id) => match self.store.update_relation(&id, &draft.properties).await {
                Ok(id) => KeyOutcome::success(Outcome::Updated, id),
                Err(e) => KeyOutcome::failed(failure_detail(&e)),
            },
            None => {
                match self
                    .store
                    .create_relation(type_id, source, target, &draft.properties)
                    .await
                {
                    Ok(id) => {
                        self.index.record_relation(key.clone(), id.clone());
                        KeyOutcome::success(Outcome::Created, id)
                    }
                    Err(e) => KeyOutcome::failed(failure_detail(&e)),
                }
            }
        };
        match &result.error {
            Some(error) => warn!(relation = %draft.relation_type, error = %error.message, "relation draft failed"),
            None => debug!(relation = %draft.relation_type, outcome = %result.outcome, "relation draft reconciled"),
        }
        result
    }

    /// Resolves a relation endpoint to its remote identifier.
    ///
    /// The slot map is consulted first: if the endpoint was drafted
    /// this run, its terminal result decides. Endpoints that only
    /// exist in the baseline fall back to the index.
    fn resolve_endpoint(&self, key: &EntityKey) -> Result<RemoteId, FailureDetail> {
        if let Some(result) = self.entity_slots.get(key) {
            return result.remote_id.ok_or_else(|| {
                FailureDetail::endpoint_unresolved(format!(
                    "endpoint {key} has no remote identifier"
                ))
            });
        }
        if let Some((id, _)) = self.index.lookup(key) {
            return Ok(id);
        }
        Err(FailureDetail::endpoint_unresolved(format!(
            "endpoint {key} was never reconciled"
        )))
    }

    /// Resolves a relation type name to its remote identifier,
    /// provisioning it once per distinct (name, source type, target
    /// type) when the baseline does not know it.
    async fn relation_type_id(&self, draft: &RelationDraft) -> Result<RemoteId, FailureDetail> {
        if let Some(rt) = self.index.lookup_relation_type(&draft.relation_type) {
            return Ok(rt.id);
        }
        // The index matches names case-insensitively; provision under
        // the lowercased name so differently-cased drafts share one
        // slot and the stored name matches what lookups expect.
        let key = (
            draft.relation_type.to_lowercase(),
            draft.source.entity_type.clone(),
            draft.target.entity_type.clone(),
        );
        match self.type_slots.claim(key.clone()) {
            Claim::Leader => {
                let result = match self
                    .store
                    .create_relation_type(&key.0, &key.1, &key.2)
                    .await
                {
                    Ok(id) => {
                        info!(name = %key.0, %id, "provisioned relation type");
                        self.index.record_relation_type(RemoteRelationType {
                            id: id.clone(),
                            name: key.0.clone(),
                            source_type: key.1.clone(),
                            target_type: key.2.clone(),
                        });
                        Ok(id)
                    }
                    Err(e) => {
                        warn!(name = %key.0, error = %e, "relation type provisioning failed");
                        Err(failure_detail(&e))
                    }
                };
                self.type_slots.complete(&key, result.clone());
                result
            }
            Claim::Wait(rx) => rx.await.unwrap_or_else(|_| {
                Err(FailureDetail::remote_call(
                    "relation type provisioning never completed",
                ))
            }),
            Claim::Ready(result) => result,
        }
    }
}
