//! Issue migration commands (Jira → OpenProject).

use colored::Colorize;
use serde::Serialize;

use super::{Globals, apply_matching, cancel_on_ctrl_c, finish_diagnose, finish_run, runtime};
use crate::cli::{IssuesCommands, IssuesDiagnoseArgs, IssuesSyncArgs, JiraArgs, MatchArgs, OpenProjectArgs};
use crate::config::{JiraInput, OpenProjectInput, validate_jira, validate_openproject};
use crate::connector::jira::JiraSource;
use crate::connector::openproject::OpenProjectTarget;
use crate::error::Result;
use crate::model::Domain;
use crate::sync::{CancelFlag, HierarchyOptions, HierarchyShape, SyncOptions, run};

/// Execute issue commands.
///
/// # Errors
///
/// Returns configuration errors, fetch failures, or an aborted run.
pub fn execute(command: &IssuesCommands, globals: &Globals) -> Result<()> {
    match command {
        IssuesCommands::Sync(args) => sync(args, globals),
        IssuesCommands::Diagnose(args) => diagnose(args, globals),
        IssuesCommands::ListEpics { jira, openproject } => list_epics(jira, openproject, globals),
    }
}

fn connectors(
    jira: &JiraArgs,
    openproject: &OpenProjectArgs,
    no_external_ref: bool,
    globals: &Globals,
) -> Result<(JiraSource, OpenProjectTarget)> {
    let jira = validate_jira(JiraInput::from(jira).or(globals.config.jira.clone()))?;
    let mut openproject = validate_openproject(OpenProjectInput::from(openproject).or(globals.config.openproject.clone()))?;
    if no_external_ref {
        openproject.external_ref_field = None;
    }
    Ok((JiraSource::new(&jira)?, OpenProjectTarget::new(&openproject)?))
}

fn options(target: &OpenProjectTarget, matching: &MatchArgs, dry_run: bool) -> SyncOptions {
    let mut options = SyncOptions::new(Domain::WorkPackages);
    options.dry_run = dry_run;
    options.store_external_ref = target.stores_external_ref();
    options.hierarchy = HierarchyOptions {
        shape: HierarchyShape::TwoLevel,
        base_depth: 0,
    };
    apply_matching(&mut options, matching);
    options
}

fn sync(args: &IssuesSyncArgs, globals: &Globals) -> Result<()> {
    let (source, target) = connectors(&args.jira, &args.openproject, args.no_external_ref, globals)?;
    let mut options = options(&target, &args.matching, globals.dry_run);
    options.update_existing = args.update_existing;
    options.relink_parents = args.relink_parents;
    options.subset = (!args.issues.is_empty()).then(|| args.issues.clone());

    let result = runtime()?.block_on(async {
        let cancel = CancelFlag::new();
        let watcher = cancel_on_ctrl_c(&cancel);
        let result = run(&source, &target, &options, &cancel).await;
        watcher.abort();
        result
    });
    finish_run(result, globals)
}

fn diagnose(args: &IssuesDiagnoseArgs, globals: &Globals) -> Result<()> {
    let (source, target) = connectors(&args.jira, &args.openproject, args.no_external_ref, globals)?;
    let options = options(&target, &args.matching, true);
    let result = runtime()?.block_on(run(&source, &target, &options, &CancelFlag::new()));
    finish_diagnose(result, globals)
}

#[derive(Serialize)]
struct EpicRow {
    id: String,
    title: String,
    external_ref: Option<String>,
}

#[derive(Serialize)]
struct EpicsOutput {
    jira: Vec<EpicRow>,
    openproject: Vec<EpicRow>,
    /// Jira epic keys with no OpenProject epic referencing them.
    missing: Vec<String>,
}

fn list_epics(jira: &JiraArgs, openproject: &OpenProjectArgs, globals: &Globals) -> Result<()> {
    let (source, target) = connectors(jira, openproject, false, globals)?;
    let (jira_epics, op_epics) = runtime()?.block_on(async {
        let jira_epics = source.list_epics().await?;
        let op_epics = target.list_epics().await?;
        Ok::<_, crate::error::Error>((jira_epics, op_epics))
    })?;

    let referenced: std::collections::HashSet<&str> = op_epics.iter().filter_map(|e| e.external_ref()).collect();
    let output = EpicsOutput {
        missing: jira_epics
            .iter()
            .filter(|e| !referenced.contains(e.external_id.as_str()))
            .map(|e| e.external_id.clone())
            .collect(),
        jira: jira_epics
            .iter()
            .map(|e| EpicRow {
                id: e.external_id.clone(),
                title: e.title.clone(),
                external_ref: None,
            })
            .collect(),
        openproject: op_epics
            .iter()
            .map(|e| EpicRow {
                id: e.target_id.clone(),
                title: e.title.clone(),
                external_ref: e.external_ref().map(str::to_string),
            })
            .collect(),
    };

    if globals.json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{}", format!("Jira epics ({})", output.jira.len()).blue().bold());
    for epic in &output.jira {
        let marker = if output.missing.contains(&epic.id) {
            "missing".yellow()
        } else {
            "ok".green()
        };
        println!("  {:<12} {} [{marker}]", epic.id, epic.title);
    }
    println!();
    println!("{}", format!("OpenProject epics ({})", output.openproject.len()).blue().bold());
    for epic in &output.openproject {
        let reference = epic.external_ref.as_deref().unwrap_or("-");
        println!("  #{:<11} {} {}", epic.id, epic.title, format!("({reference})").dimmed());
    }
    Ok(())
}
