//! Diagnostics reporter.
//!
//! Reads a finished (or simulated) plan and produces counts plus a list of
//! diagnostics an operator can act on: unmatched entities with their near
//! misses, ambiguous matches with ranked candidates, failures with their
//! cause, and structural problems found while planning. Building a report
//! never changes the plan.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::error::ConnectorErrorKind;
use crate::model::{Domain, Role};
use crate::sync::hierarchy::Cycle;
use crate::sync::matcher::DuplicateRef;
use crate::sync::types::{Action, ActionCounts, Candidate, MatchResult, Outcome, SyncPlanEntry, SyncStats};

/// One finding for human review.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// No target matched; the entity is (or would be) created.
    Unmatched {
        external_id: String,
        title: String,
        role: Role,
        near_misses: Vec<Candidate>,
    },
    /// Several targets matched too closely to choose.
    Ambiguous {
        external_id: String,
        title: String,
        candidates: Vec<Candidate>,
    },
    Failed {
        external_id: String,
        title: String,
        error_kind: ConnectorErrorKind,
        cause: String,
    },
    SkippedDueToParentFailure {
        external_id: String,
        title: String,
        parent: String,
        cause: String,
    },
    /// Ancestor outside the selected subset with no target counterpart.
    UnresolvedAncestor { external_id: String, title: String },
    /// Parent links formed a cycle; `demoted` was treated as a root.
    CycleDetected { demoted: String, members: Vec<String> },
    /// The source returned the same id more than once; the first was kept.
    DuplicateSource { external_id: String, occurrences: usize },
    /// Several targets store the same external reference; the first matches.
    DuplicateExternalRef {
        external_ref: String,
        target_ids: Vec<String>,
    },
}

impl Diagnostic {
    /// Diagnostics that need a decision, as opposed to informational ones.
    #[must_use]
    pub const fn needs_attention(&self) -> bool {
        !matches!(self, Self::Unmatched { .. })
    }
}

impl From<&Cycle> for Diagnostic {
    fn from(cycle: &Cycle) -> Self {
        Self::CycleDetected {
            demoted: cycle.demoted.clone(),
            members: cycle.members.clone(),
        }
    }
}

impl From<DuplicateRef> for Diagnostic {
    fn from(dup: DuplicateRef) -> Self {
        Self::DuplicateExternalRef {
            external_ref: dup.external_ref,
            target_ids: dup.target_ids,
        }
    }
}

/// Derive per-entity diagnostics from a plan, in plan order.
#[must_use]
pub fn entry_diagnostics(entries: &[SyncPlanEntry]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for entry in entries {
        let external_id = entry.external_id().to_string();
        let title = entry.title().to_string();

        match (&entry.match_result, entry.action) {
            (MatchResult::NoMatch, Action::LookupOnly) => {}
            (MatchResult::NoMatch, _) => diagnostics.push(Diagnostic::Unmatched {
                external_id: external_id.clone(),
                title: title.clone(),
                role: entry.role,
                near_misses: entry.near_misses.clone(),
            }),
            (MatchResult::Ambiguous { candidates }, _) => diagnostics.push(Diagnostic::Ambiguous {
                external_id: external_id.clone(),
                title: title.clone(),
                candidates: candidates.clone(),
            }),
            _ => {}
        }

        match &entry.outcome {
            Outcome::Failed { kind, cause } | Outcome::RelinkFailed { kind, cause } => diagnostics.push(Diagnostic::Failed {
                external_id,
                title,
                error_kind: *kind,
                cause: cause.clone(),
            }),
            Outcome::SkippedDueToParentFailure { parent, cause } => {
                diagnostics.push(Diagnostic::SkippedDueToParentFailure {
                    external_id,
                    title,
                    parent: parent.clone(),
                    cause: cause.clone(),
                });
            }
            Outcome::Unresolved => diagnostics.push(Diagnostic::UnresolvedAncestor { external_id, title }),
            _ => {}
        }
    }
    diagnostics
}

/// Full result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: String,
    /// Source scope label, e.g. `jira:ROE`.
    pub source: String,
    /// Target scope label, e.g. `openproject:3`.
    pub target: String,
    pub domain: Domain,
    pub dry_run: bool,
    pub generated_at: DateTime<Utc>,
    /// Planned actions.
    pub actions: ActionCounts,
    /// Executed (or simulated) outcomes.
    pub stats: SyncStats,
    /// Plan entries in execution order.
    pub entries: Vec<SyncPlanEntry>,
    /// Structural diagnostics first, then per-entity ones in plan order.
    pub diagnostics: Vec<Diagnostic>,
}

impl SyncReport {
    /// Assemble a report from a plan and the structural diagnostics found
    /// while planning.
    #[must_use]
    pub fn new(
        run_id: String,
        source: String,
        target: String,
        domain: Domain,
        dry_run: bool,
        entries: Vec<SyncPlanEntry>,
        structural: Vec<Diagnostic>,
    ) -> Self {
        let actions = ActionCounts::from_entries(&entries);
        let stats = SyncStats::from_entries(&entries);
        let mut diagnostics = structural;
        diagnostics.extend(entry_diagnostics(&entries));
        Self {
            run_id,
            source,
            target,
            domain,
            dry_run,
            generated_at: Utc::now(),
            actions,
            stats,
            entries,
            diagnostics,
        }
    }

    /// Diagnostics that need an operator decision.
    pub fn attention(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.needs_attention())
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::Unmatched { .. }))
    }
}

// ============================================================================
// Console rendering
// ============================================================================

/// Print a report for humans.
///
/// `verbose` also lists every plan entry and every unmatched entity.
pub fn print_report(report: &SyncReport, verbose: bool) {
    let title = if report.dry_run {
        format!("Sync Plan (dry run): {} → {}", report.source, report.target)
    } else {
        format!("Sync Report: {} → {}", report.source, report.target)
    };
    println!("{}", title.bold().underline());
    println!();

    let a = &report.actions;
    println!("{}", "Planned Actions:".blue().bold());
    println!("  Create:          {}", a.create);
    println!("  Update:          {}", a.update);
    println!("  Skip:            {}", a.skip);
    if a.skip_ambiguous > 0 {
        println!("  Ambiguous:       {}", a.skip_ambiguous.to_string().yellow());
    }
    if a.lookup_only > 0 {
        println!("  Lookup only:     {}", a.lookup_only);
    }
    println!();

    let s = &report.stats;
    let heading = if report.dry_run { "Simulated Outcome:" } else { "Outcome:" };
    println!("{}", heading.blue().bold());
    println!("  Created:         {}", s.created);
    println!("  Updated:         {}", s.updated);
    println!("  Skipped:         {}", s.skipped);
    if s.relinked > 0 {
        println!("  Relinked:        {}", s.relinked);
    }
    if s.failed > 0 {
        println!("  Failed:          {}", s.failed.to_string().red());
    }
    if s.skipped_due_to_parent_failure > 0 {
        println!(
            "  Parent failed:   {}",
            s.skipped_due_to_parent_failure.to_string().red()
        );
    }
    if s.cancelled > 0 {
        println!("  Cancelled:       {}", s.cancelled.to_string().yellow());
    }
    println!("  {}: {}", "Total".bold(), s.total());
    if s.has_problems() {
        println!(
            "  {}",
            "Some records were not migrated; rerun after resolving the review items.".yellow()
        );
    }
    println!();

    if verbose {
        print_entries(report);
    }

    print_diagnostics(report, verbose);
}

fn print_entries(report: &SyncReport) {
    println!("{}", "Plan:".blue().bold());
    for entry in &report.entries {
        let indent = "  ".repeat(entry.depth + 1);
        let label = report.domain.label(entry.role);
        let target = entry
            .target
            .as_ref()
            .map_or_else(String::new, |t| format!(" → {t}"));
        println!(
            "{indent}{} [{}] {} {}{}",
            entry.action.to_string().cyan(),
            label,
            entry.external_id().dimmed(),
            entry.title(),
            target.dimmed()
        );
    }
    println!();
}

/// Print the review section: ambiguous, failed, structural, and (verbose) unmatched.
pub fn print_diagnostics(report: &SyncReport, verbose: bool) {
    let attention: Vec<&Diagnostic> = report.attention().collect();
    if attention.is_empty() && !verbose {
        println!("{}", "Nothing needs review.".green());
        return;
    }

    if !attention.is_empty() {
        println!("{}", "Needs Review:".yellow().bold());
        for diagnostic in attention {
            print_diagnostic(diagnostic);
        }
        println!();
    }

    if verbose {
        let unmatched: Vec<&Diagnostic> = report.unmatched().collect();
        if !unmatched.is_empty() {
            println!("{}", "Unmatched:".blue().bold());
            for diagnostic in unmatched {
                print_diagnostic(diagnostic);
            }
            println!();
        }
    }
}

fn print_diagnostic(diagnostic: &Diagnostic) {
    match diagnostic {
        Diagnostic::Unmatched {
            external_id,
            title,
            near_misses,
            ..
        } => {
            println!("  {} {external_id} {title}", "new".green());
            print_candidates(near_misses);
        }
        Diagnostic::Ambiguous {
            external_id,
            title,
            candidates,
        } => {
            println!("  {} {external_id} {title}", "ambiguous".yellow());
            print_candidates(candidates);
        }
        Diagnostic::Failed {
            external_id,
            title,
            error_kind,
            cause,
        } => {
            println!("  {} {external_id} {title}: {error_kind}: {cause}", "failed".red());
        }
        Diagnostic::SkippedDueToParentFailure {
            external_id,
            title,
            parent,
            cause,
        } => {
            println!(
                "  {} {external_id} {title} (parent {parent}: {cause})",
                "skipped".red()
            );
        }
        Diagnostic::UnresolvedAncestor { external_id, title } => {
            println!(
                "  {} {external_id} {title}: not found in target",
                "unresolved".yellow()
            );
        }
        Diagnostic::CycleDetected { demoted, members } => {
            println!(
                "  {} {} (treated {demoted} as root)",
                "cycle".yellow(),
                members.join(" → ")
            );
        }
        Diagnostic::DuplicateSource {
            external_id,
            occurrences,
        } => {
            println!(
                "  {} {external_id} returned {occurrences} times by source",
                "duplicate".yellow()
            );
        }
        Diagnostic::DuplicateExternalRef {
            external_ref,
            target_ids,
        } => {
            println!(
                "  {} {external_ref} stored on {} (using {})",
                "duplicate ref".yellow(),
                target_ids.join(", "),
                target_ids.first().map_or("none", String::as_str)
            );
        }
    }
}

fn print_candidates(candidates: &[Candidate]) {
    for c in candidates {
        println!(
            "      {:.3}  {} {}",
            c.score,
            c.target_id.dimmed(),
            c.title
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceEntity;
    use crate::sync::types::TargetRef;

    fn entry(id: &str, match_result: MatchResult, action: Action, outcome: Outcome) -> SyncPlanEntry {
        SyncPlanEntry {
            source: SourceEntity::new(id, format!("Title {id}"), "Task"),
            role: Role::LeafItem,
            depth: 0,
            parent_external_id: None,
            cycle_detected: false,
            match_result,
            near_misses: Vec::new(),
            action,
            target: None,
            parent_target: None,
            outcome,
        }
    }

    #[test]
    fn test_entry_diagnostics() {
        let candidates = vec![Candidate {
            target_id: "1".into(),
            title: "x".into(),
            score: 0.9,
        }];
        let entries = vec![
            entry("A", MatchResult::NoMatch, Action::Create, Outcome::Created),
            entry(
                "B",
                MatchResult::Ambiguous {
                    candidates: candidates.clone(),
                },
                Action::SkipAmbiguous,
                Outcome::Ambiguous,
            ),
            entry(
                "C",
                MatchResult::NoMatch,
                Action::Create,
                Outcome::Failed {
                    kind: ConnectorErrorKind::Transient,
                    cause: "timeout".into(),
                },
            ),
            entry(
                "D",
                MatchResult::ExactMatch { target_id: "4".into() },
                Action::Skip,
                Outcome::Skipped,
            ),
            entry("E", MatchResult::NoMatch, Action::LookupOnly, Outcome::Unresolved),
            entry(
                "F",
                MatchResult::ExactMatch { target_id: "5".into() },
                Action::Skip,
                Outcome::RelinkFailed {
                    kind: ConnectorErrorKind::NotFound,
                    cause: "cannot move".into(),
                },
            ),
        ];

        let diagnostics = entry_diagnostics(&entries);
        assert_eq!(diagnostics.len(), 6);
        assert!(matches!(&diagnostics[0], Diagnostic::Unmatched { external_id, .. } if external_id == "A"));
        assert!(matches!(&diagnostics[1], Diagnostic::Ambiguous { candidates: c, .. } if *c == candidates));
        assert!(matches!(&diagnostics[2], Diagnostic::Unmatched { external_id, .. } if external_id == "C"));
        assert!(matches!(&diagnostics[3], Diagnostic::Failed { cause, .. } if cause == "timeout"));
        assert!(matches!(&diagnostics[4], Diagnostic::UnresolvedAncestor { .. }));
        assert!(matches!(&diagnostics[5], Diagnostic::Failed { external_id, .. } if external_id == "F"));
    }

    #[test]
    fn test_report_counts_and_attention() {
        let mut created = entry("A", MatchResult::NoMatch, Action::Create, Outcome::Created);
        created.target = Some(TargetRef::Existing("10".into()));
        let entries = vec![
            created,
            entry(
                "B",
                MatchResult::ExactMatch { target_id: "2".into() },
                Action::Skip,
                Outcome::Skipped,
            ),
        ];
        let structural = vec![Diagnostic::DuplicateSource {
            external_id: "A".into(),
            occurrences: 2,
        }];
        let report = SyncReport::new(
            "run".into(),
            "jira:ROE".into(),
            "openproject:3".into(),
            Domain::WorkPackages,
            false,
            entries,
            structural,
        );
        assert_eq!(report.actions.create, 1);
        assert_eq!(report.actions.skip, 1);
        assert_eq!(report.stats.created, 1);
        assert_eq!(report.stats.skipped, 1);
        assert!(!report.stats.has_problems());
        assert_eq!(report.diagnostics.len(), 2);
        assert_eq!(report.attention().count(), 1);
        assert_eq!(report.unmatched().count(), 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["diagnostics"][0]["kind"], "duplicate_source");
        assert_eq!(json["entries"][0]["outcome"]["status"], "created");
    }
}
