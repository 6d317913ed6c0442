//! Sync orchestrator.
//!
//! One run covers one scope:
//!
//! 1. fetch the source set and the target snapshot (nothing is written if
//!    either fetch fails)
//! 2. de-duplicate sources and apply the optional subset filter, keeping
//!    out-of-subset ancestors as lookup-only entries
//! 3. build the hierarchy, then match and plan each node in topological order
//! 4. execute the plan in that order, resolving each entry's container from
//!    its parent's result; dry-run simulates writes with placeholder ids
//! 5. hand the finished plan to the reporter
//!
//! Steps 2 and 3 are the pure [`plan`] function, so a dry run and a real run
//! over the same snapshots produce the same plan.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{Instrument, debug, info, info_span, warn};

use crate::connector::{SourceConnector, TargetConnector};
use crate::error::ConnectorError;
use crate::model::{Domain, EntityPayload, SourceEntity, TargetEntity};
use crate::sync::hierarchy::{self, HierarchyOptions};
use crate::sync::matcher::{Matcher, MatcherConfig, TargetIndex};
use crate::sync::planner::plan_action;
use crate::sync::report::{Diagnostic, SyncReport};
use crate::sync::similarity::SimilarityKind;
use crate::sync::types::{Action, MatchResult, Outcome, Side, SyncError, SyncPlanEntry, SyncResult, TargetRef};

/// Options for one run. Values arrive validated from the configuration layer.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub domain: Domain,
    /// Overwrite matched records instead of skipping them.
    pub update_existing: bool,
    /// Plan and simulate without writing.
    pub dry_run: bool,
    /// Restrict the run to these source ids (plus their ancestors, lookup-only).
    pub subset: Option<Vec<String>>,
    /// Move skipped records whose container differs from the planned one.
    pub relink_parents: bool,
    /// Whether the target has an external reference field to write.
    pub store_external_ref: bool,
    pub hierarchy: HierarchyOptions,
    /// Fixed container for source roots (a configured book).
    pub root_parent: Option<String>,
    pub matcher: MatcherConfig,
    pub similarity: SimilarityKind,
}

impl SyncOptions {
    #[must_use]
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            update_existing: false,
            dry_run: false,
            subset: None,
            relink_parents: false,
            store_external_ref: true,
            hierarchy: HierarchyOptions::default(),
            root_parent: None,
            matcher: MatcherConfig::default(),
            similarity: SimilarityKind::default(),
        }
    }

    fn validate(&self) -> SyncResult<()> {
        if self.subset.as_ref().is_some_and(Vec::is_empty) {
            return Err(SyncError::Config("subset filter is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.matcher.acceptance) {
            return Err(SyncError::Config(format!(
                "acceptance threshold {} is outside [0, 1]",
                self.matcher.acceptance
            )));
        }
        if self.matcher.margin < 0.0 {
            return Err(SyncError::Config("separation margin must not be negative".to_string()));
        }
        if self.root_parent.is_some() && self.hierarchy.base_depth == 0 {
            return Err(SyncError::Config(
                "a fixed root container requires source roots to start below depth 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cooperative cancellation, checked before each entity.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A plan before execution.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Entries in topological order, outcomes `Pending`.
    pub entries: Vec<SyncPlanEntry>,
    /// Structural findings: duplicate ids, cycles, duplicate references.
    pub diagnostics: Vec<Diagnostic>,
}

/// Build the plan from fixed snapshots. Pure and deterministic.
#[must_use]
pub fn plan(sources: Vec<SourceEntity>, targets: &[TargetEntity], options: &SyncOptions) -> Plan {
    let matcher = Matcher::with_kind(options.matcher, options.similarity);
    let mut diagnostics = Vec::new();

    let sources = dedupe(sources, &mut diagnostics);

    // Roles come from the full set so a subset cannot turn a container into
    // a leaf just because its children were not selected.
    let tree = hierarchy::build(&sources, options.hierarchy);
    diagnostics.extend(tree.cycles().iter().map(Diagnostic::from));

    let index = TargetIndex::new(targets);
    diagnostics.extend(index.duplicate_refs().into_iter().map(Diagnostic::from));

    let selection = options
        .subset
        .as_ref()
        .map(|ids| select_with_ancestors(ids, &tree));

    let mut entries = Vec::with_capacity(tree.len());
    for node in tree.nodes() {
        let lookup_only = match &selection {
            Some(sel) if sel.selected.contains(&node.external_id) => false,
            Some(sel) if sel.ancestors.contains(&node.external_id) => true,
            Some(_) => continue,
            None => false,
        };

        let source = sources[node.index].clone();
        let match_result = matcher.match_indexed(&source, Some(node.role), &index);
        let near_misses = if !lookup_only && match_result == MatchResult::NoMatch {
            matcher.closest(&source, Some(node.role), &index)
        } else {
            Vec::new()
        };
        let action = if lookup_only {
            Action::LookupOnly
        } else {
            plan_action(&match_result, options.update_existing)
        };
        let target = match_result.target_id().map(|id| TargetRef::Existing(id.to_string()));

        entries.push(SyncPlanEntry {
            source,
            role: node.role,
            depth: node.depth,
            parent_external_id: node.parent.clone(),
            cycle_detected: node.cycle_detected,
            match_result,
            near_misses,
            action,
            target,
            parent_target: None,
            outcome: Outcome::Pending,
        });
    }

    Plan { entries, diagnostics }
}

/// Keep the first occurrence of each external id.
fn dedupe(sources: Vec<SourceEntity>, diagnostics: &mut Vec<Diagnostic>) -> Vec<SourceEntity> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order = Vec::new();
    let mut kept = Vec::with_capacity(sources.len());
    for entity in sources {
        let count = counts.entry(entity.external_id.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            order.push(entity.external_id.clone());
            kept.push(entity);
        }
    }
    for external_id in order {
        let occurrences = counts[&external_id];
        if occurrences > 1 {
            warn!(external_id = %external_id, occurrences, "Source returned duplicate id; keeping first");
            diagnostics.push(Diagnostic::DuplicateSource {
                external_id,
                occurrences,
            });
        }
    }
    kept
}

struct Selection {
    selected: HashSet<String>,
    ancestors: HashSet<String>,
}

fn select_with_ancestors(ids: &[String], tree: &hierarchy::Hierarchy) -> Selection {
    let mut selected = HashSet::new();
    for id in ids {
        let id = id.trim();
        if tree.get(id).is_some() {
            selected.insert(id.to_string());
        } else {
            warn!(external_id = id, "Selected id not found in source scope");
        }
    }

    let mut ancestors = HashSet::new();
    for id in &selected {
        let mut current = tree.get(id).and_then(|n| n.parent.clone());
        // Parent links in the tree are acyclic, so this walk ends.
        while let Some(parent) = current {
            if selected.contains(&parent) || !ancestors.insert(parent.clone()) {
                break;
            }
            current = tree.get(&parent).and_then(|n| n.parent.clone());
        }
    }

    Selection { selected, ancestors }
}

/// Execute a plan in order against the target.
///
/// Entity-level failures become outcomes. A scope-fatal failure (rejected
/// credentials) stops the walk: the failing entry is marked `Failed`, later
/// entries stay `Pending`, and the error is returned.
///
/// Whether an entry's descendants can attach to it is decided by its
/// outcome alone ([`Outcome::blocks_descendants`]).
///
/// # Errors
///
/// Returns the scope-fatal [`ConnectorError`] that stopped execution.
pub async fn execute<T: TargetConnector>(
    target: &T,
    entries: &mut [SyncPlanEntry],
    targets: &[TargetEntity],
    options: &SyncOptions,
    cancel: &CancelFlag,
) -> Result<(), ConnectorError> {
    // target id → container, including records created during this run
    let mut containers: HashMap<String, String> = targets
        .iter()
        .filter_map(|t| t.container_id.clone().map(|c| (t.target_id.clone(), c)))
        .collect();
    let mut resolved: HashMap<String, Result<TargetRef, String>> = HashMap::with_capacity(entries.len());

    for position in 0..entries.len() {
        if cancel.is_cancelled() {
            let remaining = entries.len() - position;
            warn!(remaining, "Run cancelled; remaining entries not processed");
            for entry in &mut entries[position..] {
                entry.outcome = Outcome::Cancelled;
            }
            return Ok(());
        }

        let entry = &mut entries[position];

        // Container for this entry: the parent's result, or the fixed root.
        let parent_target = match entry.parent_external_id.as_ref().and_then(|p| resolved.get(p)) {
            Some(Ok(parent)) => Some(parent.clone()),
            Some(Err(cause)) => {
                let parent = entry.parent_external_id.clone().unwrap_or_default();
                debug!(external_id = entry.external_id(), parent = %parent, "Parent unavailable; skipping");
                entry.outcome = Outcome::SkippedDueToParentFailure {
                    parent,
                    cause: cause.clone(),
                };
                resolved.insert(entry.source.external_id.clone(), Err(entry.outcome.blocking_cause()));
                continue;
            }
            None => options.root_parent.clone().map(TargetRef::Existing),
        };
        entry.parent_target.clone_from(&parent_target);

        if let Err(err) = execute_entry(target, entry, parent_target.as_ref(), &containers, options).await {
            warn!(
                external_id = entry.external_id(),
                action = %entry.action,
                error = %err,
                "Write failed"
            );
            entry.outcome = Outcome::Failed {
                kind: err.kind,
                cause: err.to_string(),
            };
            if err.is_scope_fatal() {
                return Err(err);
            }
        }

        if let (Outcome::Created, Some(created), Some(parent)) = (&entry.outcome, &entry.target, &parent_target) {
            let placed = target.effective_container(entry.role, parent.id(), &|id| containers.get(id).cloned());
            containers.insert(created.id().to_string(), placed);
        }
        resolved.insert(entry.source.external_id.clone(), attachment(entry));
    }

    Ok(())
}

/// What descendants of `entry` attach to, or why they cannot.
fn attachment(entry: &SyncPlanEntry) -> Result<TargetRef, String> {
    if entry.outcome.blocks_descendants() {
        return Err(entry.outcome.blocking_cause());
    }
    entry
        .target
        .clone()
        .ok_or_else(|| "parent has no target record".to_string())
}

/// Run one entry, recording its outcome on the entry.
async fn execute_entry<T: TargetConnector>(
    target: &T,
    entry: &mut SyncPlanEntry,
    parent_target: Option<&TargetRef>,
    containers: &HashMap<String, String>,
    options: &SyncOptions,
) -> Result<(), ConnectorError> {
    let payload = || EntityPayload::from_source(&entry.source, options.store_external_ref);

    match entry.action {
        Action::LookupOnly => {
            entry.outcome = if entry.target.is_some() {
                Outcome::Resolved
            } else {
                Outcome::Unresolved
            };
        }

        Action::SkipAmbiguous => entry.outcome = Outcome::Ambiguous,

        Action::Skip => {
            entry.outcome = Outcome::Skipped;
            let (Some(existing), Some(parent), true) = (entry.target.clone(), parent_target, options.relink_parents)
            else {
                return Ok(());
            };
            // Compare with where the target would really put it, so a
            // flattened placement is not moved again on every run.
            let wanted = target.effective_container(entry.role, parent.id(), &|id| containers.get(id).cloned());
            if containers.get(existing.id()) == Some(&wanted) {
                return Ok(());
            }
            let moved = if options.dry_run {
                Ok(())
            } else {
                target.set_parent(existing.id(), parent.id()).await
            };
            match moved {
                Ok(()) => {
                    info!(external_id = entry.external_id(), target_id = %existing, parent = %parent, "Relinked");
                    entry.outcome = Outcome::Relinked;
                }
                Err(err) if err.is_scope_fatal() => return Err(err),
                Err(err) => {
                    warn!(external_id = entry.external_id(), target_id = %existing, error = %err, "Relink failed");
                    entry.outcome = Outcome::RelinkFailed {
                        kind: err.kind,
                        cause: err.to_string(),
                    };
                }
            }
        }

        Action::Update => {
            let Some(existing) = entry.target.clone() else {
                return Err(ConnectorError::unknown("update planned without a matched record"));
            };
            if !options.dry_run {
                target.update_entity(existing.id(), &payload()).await?;
            }
            info!(external_id = entry.external_id(), target_id = %existing, "Updated");
            entry.outcome = Outcome::Updated;
        }

        Action::Create => {
            let created = if options.dry_run {
                TargetRef::planned_for(entry.external_id())
            } else {
                let id = target
                    .create_entity(entry.role, parent_target.map(TargetRef::id), &payload())
                    .await?;
                TargetRef::Existing(id)
            };
            info!(
                external_id = entry.external_id(),
                role = %entry.role,
                target_id = %created,
                parent = parent_target.map(TargetRef::id),
                "Created"
            );
            entry.target = Some(created);
            entry.outcome = Outcome::Created;
        }
    }
    Ok(())
}

/// Run one scope end to end.
///
/// # Errors
///
/// - [`SyncError::Config`] for invalid options
/// - [`SyncError::Fetch`] if either snapshot cannot be fetched completely;
///   nothing has been written
/// - [`SyncError::Aborted`] if a scope-fatal write failure stopped the run;
///   the partial report is attached
pub async fn run<S, T>(source: &S, target: &T, options: &SyncOptions, cancel: &CancelFlag) -> SyncResult<SyncReport>
where
    S: SourceConnector,
    T: TargetConnector,
{
    options.validate()?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let source_label = source.scope_label();
    let target_label = target.scope_label();
    let span = info_span!(
        "sync",
        run_id = %run_id,
        source = %source_label,
        target = %target_label,
        dry_run = options.dry_run
    );

    async move {
        let sources = source.list_entities().await.map_err(|error| SyncError::Fetch {
            side: Side::Source,
            error,
        })?;
        let targets = target.list_entities().await.map_err(|error| SyncError::Fetch {
            side: Side::Target,
            error,
        })?;
        info!(sources = sources.len(), targets = targets.len(), "Fetched snapshots");

        let Plan {
            mut entries,
            diagnostics,
        } = plan(sources, &targets, options);
        info!(entries = entries.len(), "Planned");

        let outcome = execute(target, &mut entries, &targets, options, cancel).await;

        let report = SyncReport::new(
            run_id,
            source_label,
            target_label,
            options.domain,
            options.dry_run,
            entries,
            diagnostics,
        );
        info!(
            created = report.stats.created,
            updated = report.stats.updated,
            skipped = report.stats.skipped,
            failed = report.stats.failed,
            "Run finished"
        );

        match outcome {
            Ok(()) => Ok(report),
            Err(cause) => Err(SyncError::Aborted {
                cause,
                report: Box::new(report),
            }),
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::memory::{MemorySource, MemoryTarget, WriteCall};
    use crate::error::ConnectorErrorKind;
    use crate::model::Role;
    use crate::sync::hierarchy::HierarchyShape;

    fn issues_options() -> SyncOptions {
        let mut options = SyncOptions::new(Domain::WorkPackages);
        options.hierarchy.shape = HierarchyShape::TwoLevel;
        options
    }

    fn epic_and_task() -> Vec<SourceEntity> {
        vec![
            SourceEntity::new("E1", "Epic One", "Epic"),
            SourceEntity::new("T1", "Task One", "Task").with_parent("E1"),
        ]
    }

    fn outcome_of<'a>(report: &'a SyncReport, id: &str) -> &'a Outcome {
        &report
            .entries
            .iter()
            .find(|e| e.external_id() == id)
            .unwrap()
            .outcome
    }

    #[tokio::test]
    async fn test_scenario_create_epic_then_task() {
        let source = MemorySource::new("ROE", epic_and_task());
        let target = MemoryTarget::new("3");
        let report = run(&source, &target, &issues_options(), &CancelFlag::new()).await.unwrap();

        let e1 = &report.entries[0];
        let t1 = &report.entries[1];
        assert_eq!((e1.external_id(), e1.action, e1.role), ("E1", Action::Create, Role::RootContainer));
        assert_eq!((t1.external_id(), t1.action, t1.role), ("T1", Action::Create, Role::LeafItem));
        assert_eq!(t1.parent_target, e1.target);
        assert_eq!(
            target.calls()[1],
            WriteCall::Create {
                role: Role::LeafItem,
                parent: e1.target.as_ref().map(|t| t.id().to_string()),
                title: "Task One".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_scenario_existing_ref_skips() {
        let source = MemorySource::new("ROE", epic_and_task());
        let target = MemoryTarget::with_entities("3", vec![TargetEntity::new("41", "Epic One").with_external_ref("E1")]);
        let report = run(&source, &target, &issues_options(), &CancelFlag::new()).await.unwrap();

        assert_eq!(report.entries[0].action, Action::Skip);
        assert_eq!(report.entries[1].action, Action::Create);
        assert_eq!(report.entries[1].parent_target, Some(TargetRef::Existing("41".into())));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing_and_uses_placeholders() {
        let source = MemorySource::new("ROE", epic_and_task());
        let target = MemoryTarget::new("3");
        let mut options = issues_options();
        options.dry_run = true;
        let report = run(&source, &target, &options, &CancelFlag::new()).await.unwrap();

        assert!(target.calls().is_empty());
        assert_eq!(report.entries[0].target, Some(TargetRef::planned_for("E1")));
        assert_eq!(report.entries[1].parent_target, Some(TargetRef::planned_for("E1")));
        assert_eq!(report.stats.created, 2);
    }

    #[tokio::test]
    async fn test_container_failure_skips_descendants_only() {
        let sources = vec![
            SourceEntity::new("E1", "Broken Epic", "Epic"),
            SourceEntity::new("T1", "Task One", "Task").with_parent("E1"),
            SourceEntity::new("E2", "Healthy Epic", "Epic"),
            SourceEntity::new("T2", "Task Two", "Task").with_parent("E2"),
        ];
        let source = MemorySource::new("ROE", sources);
        let target = MemoryTarget::new("3");
        target.fail_writes_for("Broken Epic", ConnectorErrorKind::Transient);

        let report = run(&source, &target, &issues_options(), &CancelFlag::new()).await.unwrap();
        assert!(matches!(outcome_of(&report, "E1"), Outcome::Failed { .. }));
        assert!(matches!(
            outcome_of(&report, "T1"),
            Outcome::SkippedDueToParentFailure { parent, .. } if parent == "E1"
        ));
        assert_eq!(outcome_of(&report, "E2"), &Outcome::Created);
        assert_eq!(outcome_of(&report, "T2"), &Outcome::Created);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.skipped_due_to_parent_failure, 1);
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_with_partial_report() {
        let sources = vec![
            SourceEntity::new("A", "First", "Task"),
            SourceEntity::new("B", "Locked", "Task"),
            SourceEntity::new("C", "Third", "Task"),
        ];
        let source = MemorySource::new("ROE", sources);
        let target = MemoryTarget::new("3");
        target.fail_writes_for("Locked", ConnectorErrorKind::Auth);

        let err = run(&source, &target, &issues_options(), &CancelFlag::new()).await.unwrap_err();
        let SyncError::Aborted { cause, report } = err else {
            panic!("expected abort");
        };
        assert_eq!(cause.kind, ConnectorErrorKind::Auth);
        assert_eq!(outcome_of(&report, "A"), &Outcome::Created);
        assert!(matches!(outcome_of(&report, "B"), Outcome::Failed { .. }));
        assert_eq!(outcome_of(&report, "C"), &Outcome::Pending);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let sources: Vec<SourceEntity> = (0..30)
            .map(|i| SourceEntity::new(format!("K-{i}"), format!("Issue {i}"), "Task"))
            .collect();
        let source = MemorySource::new("ROE", sources)
            .with_page_size(10)
            .failing_from_page(1, ConnectorErrorKind::Transient);
        let target = MemoryTarget::new("3");
        let err = run(&source, &target, &issues_options(), &CancelFlag::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch { side: Side::Source, ref error } if error.fetched == 10));
        assert!(target.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_marks_remaining() {
        let source = MemorySource::new("ROE", epic_and_task());
        let target = MemoryTarget::new("3");
        let cancel = CancelFlag::new();
        cancel.cancel();
        let report = run(&source, &target, &issues_options(), &cancel).await.unwrap();
        assert_eq!(report.stats.cancelled, 2);
        assert!(target.calls().is_empty());
    }

    #[test]
    fn test_subset_includes_ancestors_lookup_only() {
        let sources = vec![
            SourceEntity::new("E1", "Epic One", "Epic"),
            SourceEntity::new("T1", "Task One", "Task").with_parent("E1"),
            SourceEntity::new("T2", "Task Two", "Task").with_parent("E1"),
        ];
        let mut options = issues_options();
        options.subset = Some(vec!["T2".into()]);
        let plan = plan(sources, &[], &options);
        let ids: Vec<(&str, Action)> = plan.entries.iter().map(|e| (e.external_id(), e.action)).collect();
        assert_eq!(ids, vec![("E1", Action::LookupOnly), ("T2", Action::Create)]);
    }

    #[tokio::test]
    async fn test_unresolved_lookup_ancestor_blocks_children() {
        let mut options = issues_options();
        options.subset = Some(vec!["T1".into()]);
        let source = MemorySource::new("ROE", epic_and_task());
        let target = MemoryTarget::new("3");
        let report = run(&source, &target, &options, &CancelFlag::new()).await.unwrap();
        assert_eq!(outcome_of(&report, "E1"), &Outcome::Unresolved);
        assert!(matches!(outcome_of(&report, "T1"), Outcome::SkippedDueToParentFailure { .. }));
        assert!(target.calls().is_empty());
        assert_eq!(report.stats.total(), 1);
    }

    #[test]
    fn test_duplicate_sources_keep_first() {
        let sources = vec![
            SourceEntity::new("A", "First", "Task"),
            SourceEntity::new("A", "Again", "Task"),
        ];
        let plan = plan(sources, &[], &issues_options());
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].title(), "First");
        assert!(matches!(
            &plan.diagnostics[0],
            Diagnostic::DuplicateSource { occurrences: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_relink_moves_misplaced_child() {
        let target = MemoryTarget::with_entities(
            "3",
            vec![
                TargetEntity::new("10", "Epic One").with_external_ref("E1"),
                TargetEntity::new("11", "Task One").with_external_ref("T1"),
            ],
        );
        let source = MemorySource::new("ROE", epic_and_task());
        let mut options = issues_options();
        options.relink_parents = true;
        let report = run(&source, &target, &options, &CancelFlag::new()).await.unwrap();
        assert_eq!(outcome_of(&report, "T1"), &Outcome::Relinked);
        assert_eq!(
            target.calls(),
            vec![WriteCall::SetParent {
                target_id: "11".into(),
                parent: "10".into()
            }]
        );

        // Second pass: already in place.
        let report = run(&source, &target, &options, &CancelFlag::new()).await.unwrap();
        assert_eq!(outcome_of(&report, "T1"), &Outcome::Skipped);
    }

    #[tokio::test]
    async fn test_relink_failure_keeps_children_attached() {
        let target = MemoryTarget::with_entities(
            "3",
            vec![
                TargetEntity::new("10", "Epic One").with_external_ref("E1"),
                TargetEntity::new("11", "Task One").with_external_ref("T1"),
            ],
        );
        target.fail_writes_for("Task One", ConnectorErrorKind::NotFound);
        let mut sources = epic_and_task();
        sources.push(SourceEntity::new("C1", "Checklist", "Task").with_parent("T1"));
        let source = MemorySource::new("ROE", sources);
        let mut options = issues_options();
        options.relink_parents = true;

        let report = run(&source, &target, &options, &CancelFlag::new()).await.unwrap();
        assert!(matches!(
            outcome_of(&report, "T1"),
            Outcome::RelinkFailed {
                kind: ConnectorErrorKind::NotFound,
                ..
            }
        ));
        assert_eq!(outcome_of(&report, "C1"), &Outcome::Created);
        let child = report.entries.iter().find(|e| e.external_id() == "C1").unwrap();
        assert_eq!(child.parent_target, Some(TargetRef::Existing("11".into())));
        assert_eq!(report.stats.failed, 1);
        assert!(report.stats.has_problems());
    }

    #[test]
    fn test_invalid_options() {
        let mut options = issues_options();
        options.subset = Some(Vec::new());
        assert!(matches!(options.validate(), Err(SyncError::Config(_))));

        let mut options = SyncOptions::new(Domain::Documentation);
        options.root_parent = Some("book:1".into());
        assert!(options.validate().is_err());
        options.hierarchy.base_depth = 1;
        assert!(options.validate().is_ok());
    }
}
