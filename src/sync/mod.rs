//! Reconciliation and hierarchy engine.
//!
//! This module decides, for every source record, whether a target record
//! already exists, what to do about it, and where in the target hierarchy
//! it belongs:
//!
//! - **Fetch**: complete, page-by-page snapshots of both sides
//! - **Match**: external reference first, title similarity second
//! - **Plan**: create / update / skip / leave for review
//! - **Hierarchy**: depth-derived roles and parent-before-child order
//! - **Orchestrate**: execute (or simulate) in order, isolating failures
//! - **Report**: counts and diagnostics for human review
//!
//! # Example
//!
//! ```ignore
//! use sb::connector::memory::{MemorySource, MemoryTarget};
//! use sb::model::Domain;
//! use sb::sync::{run, CancelFlag, SyncOptions};
//!
//! let options = SyncOptions::new(Domain::WorkPackages);
//! let report = run(&source, &target, &options, &CancelFlag::new()).await?;
//! println!("{} created", report.stats.created);
//! ```

pub mod fetch;
pub mod hierarchy;
pub mod matcher;
pub mod orchestrator;
pub mod planner;
pub mod prune;
pub mod report;
pub mod similarity;
mod types;

// Re-export main types and functions
pub use fetch::{FetchCause, FetchError, NextPage, Page, PageRequest, PageSource, Paginator};
pub use hierarchy::{Hierarchy, HierarchyNode, HierarchyOptions, HierarchyShape};
pub use matcher::{Matcher, MatcherConfig, TargetIndex};
pub use orchestrator::{CancelFlag, Plan, SyncOptions, execute, plan, run};
pub use planner::plan_action;
pub use report::{Diagnostic, SyncReport, print_report};
pub use similarity::{Similarity, SimilarityKind};
pub use types::{
    Action, ActionCounts, Candidate, MatchResult, Outcome, Side, SyncError, SyncPlanEntry, SyncResult, SyncStats,
    TargetRef,
};
