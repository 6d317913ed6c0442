//! Sync plan types.
//!
//! This module defines the values that flow between the matcher, planner,
//! hierarchy builder and orchestrator, plus the per-run statistics.

use serde::Serialize;

use crate::error::{ConnectorError, ConnectorErrorKind};
use crate::model::{Role, SourceEntity};
use crate::sync::fetch::FetchError;
use crate::sync::report::SyncReport;

/// A scored target candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub target_id: String,
    pub title: String,
    pub score: f64,
}

/// Outcome of matching one source entity against the target snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum MatchResult {
    /// A target stores this entity's external id.
    ExactMatch { target_id: String },
    /// A single title match cleared both the acceptance and separation thresholds.
    FuzzyMatch { target_id: String, score: f64 },
    NoMatch,
    /// Several title matches are too close to call. Ranked, best first.
    Ambiguous { candidates: Vec<Candidate> },
}

impl MatchResult {
    /// Target id of an exact or fuzzy match.
    #[must_use]
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Self::ExactMatch { target_id } | Self::FuzzyMatch { target_id, .. } => Some(target_id),
            Self::NoMatch | Self::Ambiguous { .. } => None,
        }
    }

}

/// What the orchestrator will do with one plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Skip,
    /// Ambiguous match, left for manual review.
    SkipAmbiguous,
    /// Ancestor outside a subset filter: matched so descendants can find
    /// their parent, never written.
    LookupOnly,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Skip => "skip",
            Self::SkipAmbiguous => "skip_ambiguous",
            Self::LookupOnly => "lookup_only",
        };
        f.write_str(s)
    }
}

/// Identity of a target record, real or planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum TargetRef {
    /// A record that exists in the target system.
    Existing(String),
    /// Placeholder for a record a dry-run would create.
    Planned(String),
}

impl TargetRef {
    /// Dry-run placeholder for a source entity.
    #[must_use]
    pub fn planned_for(external_id: &str) -> Self {
        Self::Planned(format!("would-create:{external_id}"))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Existing(id) | Self::Planned(id) => id,
        }
    }

    #[must_use]
    pub const fn is_planned(&self) -> bool {
        matches!(self, Self::Planned(_))
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Result of executing (or simulating) one plan entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Not executed yet.
    Pending,
    Created,
    Updated,
    Skipped,
    /// Skipped, but the existing record was moved under its resolved parent.
    Relinked,
    Ambiguous,
    Failed {
        kind: ConnectorErrorKind,
        cause: String,
    },
    /// Skipped, and the move under the resolved parent failed. The record
    /// itself exists, so children still attach to it.
    RelinkFailed {
        kind: ConnectorErrorKind,
        cause: String,
    },
    SkippedDueToParentFailure {
        parent: String,
        cause: String,
    },
    /// The run was cancelled before this entry was reached.
    Cancelled,
    /// Lookup-only ancestor found in the target.
    Resolved,
    /// Lookup-only ancestor missing from the target.
    Unresolved,
}

impl Outcome {
    /// Whether this entry leaves its descendants without a container.
    #[must_use]
    pub const fn blocks_descendants(&self) -> bool {
        matches!(
            self,
            Self::Failed { .. }
                | Self::SkippedDueToParentFailure { .. }
                | Self::Ambiguous
                | Self::Unresolved
                | Self::Cancelled
        )
    }

    /// Human readable reason a descendant cannot be attached.
    #[must_use]
    pub fn blocking_cause(&self) -> String {
        match self {
            Self::Failed { cause, .. } => format!("parent write failed: {cause}"),
            Self::SkippedDueToParentFailure { cause, .. } => cause.clone(),
            Self::Ambiguous => "parent match is ambiguous".to_string(),
            Self::Unresolved => "parent outside selection not found in target".to_string(),
            Self::Cancelled => "run cancelled".to_string(),
            _ => "parent unavailable".to_string(),
        }
    }
}

/// One entry of the sync plan, in topological order.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlanEntry {
    pub source: SourceEntity,

    pub role: Role,

    /// Distance from the nearest root (plus any layout base depth).
    pub depth: usize,

    /// Effective parent after cycle demotion and scope trimming.
    pub parent_external_id: Option<String>,

    pub cycle_detected: bool,

    pub match_result: MatchResult,

    /// Closest titles for unmatched entities, for manual review.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub near_misses: Vec<Candidate>,

    pub action: Action,

    /// Target written to, matched, or planned.
    pub target: Option<TargetRef>,

    /// Container the entry was (or would be) attached to.
    pub parent_target: Option<TargetRef>,

    pub outcome: Outcome,
}

impl SyncPlanEntry {
    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.source.external_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.source.title
    }
}

/// Counts of plan actions, before execution.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
    pub create: usize,
    pub update: usize,
    pub skip: usize,
    pub skip_ambiguous: usize,
    pub lookup_only: usize,
}

impl ActionCounts {
    #[must_use]
    pub fn from_entries(entries: &[SyncPlanEntry]) -> Self {
        let mut counts = Self::default();
        for entry in entries {
            match entry.action {
                Action::Create => counts.create += 1,
                Action::Update => counts.update += 1,
                Action::Skip => counts.skip += 1,
                Action::SkipAmbiguous => counts.skip_ambiguous += 1,
                Action::LookupOnly => counts.lookup_only += 1,
            }
        }
        counts
    }
}

/// Statistics for an executed (or simulated) run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub relinked: usize,
    pub ambiguous: usize,
    pub failed: usize,
    pub skipped_due_to_parent_failure: usize,
    pub cancelled: usize,
}

impl SyncStats {
    /// Tally outcomes. Lookup-only entries are not counted.
    #[must_use]
    pub fn from_entries(entries: &[SyncPlanEntry]) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            stats.record(&entry.outcome);
        }
        stats
    }

    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Relinked => self.relinked += 1,
            Outcome::Ambiguous => self.ambiguous += 1,
            Outcome::Failed { .. } | Outcome::RelinkFailed { .. } => self.failed += 1,
            Outcome::SkippedDueToParentFailure { .. } => self.skipped_due_to_parent_failure += 1,
            Outcome::Cancelled => self.cancelled += 1,
            Outcome::Pending | Outcome::Resolved | Outcome::Unresolved => {}
        }
    }

    /// Total number of entities processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created
            + self.updated
            + self.skipped
            + self.relinked
            + self.ambiguous
            + self.failed
            + self.skipped_due_to_parent_failure
            + self.cancelled
    }

    /// Number of writes (performed or simulated).
    #[must_use]
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.relinked
    }

    /// Whether any entity needs operator attention.
    #[must_use]
    pub fn has_problems(&self) -> bool {
        self.ambiguous + self.failed + self.skipped_due_to_parent_failure > 0
    }
}

/// Which side of the migration a fetch targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Target,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// Scope-level sync errors. Entity-level failures are outcomes, not errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A snapshot could not be fetched completely. Nothing was written.
    #[error("Failed to fetch {side} entities: {error}")]
    Fetch { side: Side, error: FetchError },

    /// A scope-fatal write failure stopped the run. The partial report is kept.
    #[error("Sync aborted after {} write(s): {cause}", report.stats.writes())]
    Aborted {
        cause: ConnectorError,
        report: Box<SyncReport>,
    },

    /// Options that cannot describe a valid run.
    #[error("Invalid sync configuration: {0}")]
    Config(String),
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planned_ref_label() {
        let r = TargetRef::planned_for("E1");
        assert_eq!(r.id(), "would-create:E1");
        assert!(r.is_planned());
        assert!(!TargetRef::Existing("7".into()).is_planned());
    }

    #[test]
    fn test_sync_stats() {
        let mut stats = SyncStats::default();
        stats.record(&Outcome::Created);
        stats.record(&Outcome::Created);
        stats.record(&Outcome::Skipped);
        stats.record(&Outcome::Resolved);
        stats.record(&Outcome::Failed {
            kind: ConnectorErrorKind::Transient,
            cause: "timeout".into(),
        });
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.writes(), 2);
        assert!(stats.has_problems());
    }

    #[test]
    fn test_blocking_outcomes() {
        assert!(Outcome::Ambiguous.blocks_descendants());
        assert!(Outcome::Unresolved.blocks_descendants());
        assert!(!Outcome::Skipped.blocks_descendants());
        assert!(!Outcome::Created.blocks_descendants());
        let relink = Outcome::RelinkFailed {
            kind: ConnectorErrorKind::NotFound,
            cause: "gone".into(),
        };
        assert!(!relink.blocks_descendants());
        let mut stats = SyncStats::default();
        stats.record(&relink);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_match_result_target() {
        let m = MatchResult::FuzzyMatch {
            target_id: "9".into(),
            score: 0.9,
        };
        assert_eq!(m.target_id(), Some("9"));
        assert!(MatchResult::NoMatch.target_id().is_none());
    }
}
