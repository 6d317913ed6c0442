//! Page migration commands (Confluence → BookStack).

use super::{Globals, apply_matching, cancel_on_ctrl_c, finish_diagnose, finish_run, runtime};
use crate::cli::{BookStackArgs, ConfluenceArgs, MatchArgs, PagesCommands, PagesDiagnoseArgs, PagesSyncArgs};
use crate::config::{BookStackInput, ConfluenceInput, validate_bookstack, validate_confluence};
use crate::connector::bookstack::BookStackTarget;
use crate::connector::confluence::ConfluenceSource;
use crate::error::Result;
use crate::model::Domain;
use crate::sync::{CancelFlag, HierarchyOptions, HierarchyShape, SyncOptions, run};

/// Execute page commands.
///
/// # Errors
///
/// Returns configuration errors, fetch failures, or an aborted run.
pub fn execute(command: &PagesCommands, globals: &Globals) -> Result<()> {
    match command {
        PagesCommands::Sync(args) => sync(args, globals),
        PagesCommands::Diagnose(args) => diagnose(args, globals),
    }
}

fn connectors(
    confluence: &ConfluenceArgs,
    bookstack: &BookStackArgs,
    no_external_ref: bool,
    globals: &Globals,
) -> Result<(ConfluenceSource, BookStackTarget)> {
    let confluence = validate_confluence(ConfluenceInput::from(confluence).or(globals.config.confluence.clone()))?;
    let bookstack = validate_bookstack(BookStackInput::from(bookstack).or(globals.config.bookstack.clone()))?;
    let mut target = BookStackTarget::new(&bookstack)?;
    if no_external_ref {
        target = target.without_external_ref();
    }
    Ok((ConfluenceSource::new(&confluence)?, target))
}

fn options(target: &BookStackTarget, matching: &MatchArgs, no_external_ref: bool, dry_run: bool) -> SyncOptions {
    let layout = target.layout();
    let mut options = SyncOptions::new(Domain::Documentation);
    options.dry_run = dry_run;
    options.store_external_ref = !no_external_ref;
    options.hierarchy = HierarchyOptions {
        shape: HierarchyShape::Nested,
        base_depth: layout.base_depth(),
    };
    options.root_parent = layout.root_parent();
    apply_matching(&mut options, matching);
    options
}

fn sync(args: &PagesSyncArgs, globals: &Globals) -> Result<()> {
    let (source, target) = connectors(&args.confluence, &args.bookstack, args.no_external_ref, globals)?;
    let mut options = options(&target, &args.matching, args.no_external_ref, globals.dry_run);
    options.update_existing = args.update_existing;
    options.relink_parents = args.relink_parents;
    options.subset = (!args.pages.is_empty()).then(|| args.pages.clone());

    let result = runtime()?.block_on(async {
        let cancel = CancelFlag::new();
        let watcher = cancel_on_ctrl_c(&cancel);
        let result = run(&source, &target, &options, &cancel).await;
        watcher.abort();
        result
    });
    finish_run(result, globals)
}

fn diagnose(args: &PagesDiagnoseArgs, globals: &Globals) -> Result<()> {
    let (source, target) = connectors(&args.confluence, &args.bookstack, args.no_external_ref, globals)?;
    let options = options(&target, &args.matching, args.no_external_ref, true);
    let result = runtime()?.block_on(run(&source, &target, &options, &CancelFlag::new()));
    finish_diagnose(result, globals)
}
