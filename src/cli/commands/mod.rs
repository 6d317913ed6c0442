//! Command implementations.

pub mod completions;
pub mod issues;
pub mod pages;
pub mod prune;
pub mod version;

use tracing::warn;

use crate::cli::MatchArgs;
use crate::config::FileConfig;
use crate::error::{Error, Result};
use crate::sync::matcher::DEFAULT_NEAR_MISSES;
use crate::sync::report::print_diagnostics;
use crate::sync::{CancelFlag, MatcherConfig, SyncError, SyncOptions, SyncReport, print_report};

/// Settings every command receives from the top-level flags.
#[derive(Debug)]
pub struct Globals {
    pub json: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub config: FileConfig,
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| Error::Other(format!("Failed to start async runtime: {e}")))
}

/// Cancel `flag` on Ctrl-C. Abort the handle once the run is over.
pub(crate) fn cancel_on_ctrl_c(flag: &CancelFlag) -> tokio::task::JoinHandle<()> {
    let flag = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; remaining records will be cancelled");
            flag.cancel();
        }
    })
}

pub(crate) fn apply_matching(options: &mut SyncOptions, args: &MatchArgs) {
    options.matcher = MatcherConfig {
        acceptance: args.acceptance,
        margin: args.margin,
        near_misses: DEFAULT_NEAR_MISSES,
    };
    options.similarity = args.similarity;
}

/// Print a finished run, or the partial report of an aborted one before
/// handing the error back.
pub(crate) fn finish_run(result: std::result::Result<SyncReport, SyncError>, globals: &Globals) -> Result<()> {
    match result {
        Ok(report) => {
            if globals.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                print_report(&report, globals.verbose);
            }
            Ok(())
        }
        Err(err) => {
            // JSON mode gets the partial report inside the structured error.
            if let SyncError::Aborted { report, .. } = &err {
                if !globals.json {
                    print_report(report, globals.verbose);
                }
            }
            Err(err.into())
        }
    }
}

/// Print the review section of a dry run.
pub(crate) fn finish_diagnose(result: std::result::Result<SyncReport, SyncError>, globals: &Globals) -> Result<()> {
    let report = result?;
    if globals.json {
        let output = serde_json::json!({
            "run_id": report.run_id,
            "source": report.source,
            "target": report.target,
            "actions": report.actions,
            "diagnostics": report.diagnostics,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        print_diagnostics(&report, true);
    }
    Ok(())
}
