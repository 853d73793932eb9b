//! Per-draft reconciliation outcomes and the durable run report.

use crate::{EntityKey, NaturalKey, RemoteId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal outcome of one draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated,
    Failed,
}

impl Outcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies what went wrong for a `Failed` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Remote call failed after retries.
    RemoteCall,
    /// A relation endpoint never resolved to a remote identifier.
    EndpointUnresolved,
    /// Authentication or token refresh failed.
    Auth,
}

/// Failure classification plus human-readable detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureDetail {
    #[must_use]
    pub fn remote_call(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::RemoteCall,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn endpoint_unresolved(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::EndpointUnresolved,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Auth,
            message: message.into(),
        }
    }
}

/// Result record for one entity draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub row: usize,
    pub entity_type: String,
    pub key: NaturalKey,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
}

/// Result record for one relation draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub row: usize,
    pub relation_type: String,
    pub source: EntityKey,
    pub target: EntityKey,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
}

/// Per-outcome counts across both phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub entities_created: usize,
    pub entities_updated: usize,
    pub entities_failed: usize,
    pub relations_created: usize,
    pub relations_updated: usize,
    pub relations_failed: usize,
}

impl RunSummary {
    /// Tallies outcomes from finished record sets.
    #[must_use]
    pub fn from_records(entities: &[EntityRecord], relations: &[RelationRecord]) -> Self {
        let mut summary = Self::default();
        for record in entities {
            match record.outcome {
                Outcome::Created => summary.entities_created += 1,
                Outcome::Updated => summary.entities_updated += 1,
                Outcome::Failed => summary.entities_failed += 1,
            }
        }
        for record in relations {
            match record.outcome {
                Outcome::Created => summary.relations_created += 1,
                Outcome::Updated => summary.relations_updated += 1,
                Outcome::Failed => summary.relations_failed += 1,
            }
        }
        summary
    }

    /// Total failed drafts across both phases.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.entities_failed + self.relations_failed
    }
}

/// Durable result of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub entities: Vec<EntityRecord>,
    pub relations: Vec<RelationRecord>,
}

impl RunReport {
    /// Assembles a report, tallying the summary from the records.
    #[must_use]
    pub fn new(
        run_id: RunId,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        entities: Vec<EntityRecord>,
        relations: Vec<RelationRecord>,
    ) -> Self {
        let summary = RunSummary::from_records(&entities, &relations);
        Self {
            run_id,
            started_at,
            finished_at,
            summary,
            entities,
            relations,
        }
    }

    /// True when any draft failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.summary.failed() > 0
    }
}
