//! BookStack cleanup commands.
//!
//! Both commands list candidates first and only delete when `--dry-run` is
//! not set. A failed deletion is reported and the scan continues.

use colored::Colorize;
use tracing::{info, warn};

use super::{Globals, runtime};
use crate::cli::{BookStackArgs, PruneCommands, PrunePagesArgs};
use crate::config::{BookStackInput, validate_bookstack};
use crate::connector::bookstack::BookStackTarget;
use crate::error::Result;
use crate::sync::prune::{PageInfo, PruneReport, find_empty_chapters, is_page_effectively_empty};

/// Execute prune commands.
///
/// # Errors
///
/// Returns configuration errors or a failed listing.
pub fn execute(command: &PruneCommands, globals: &Globals) -> Result<()> {
    match command {
        PruneCommands::Chapters { bookstack, book_id } => chapters(bookstack, *book_id, globals),
        PruneCommands::Pages(args) => pages(args, globals),
    }
}

fn connect(args: &BookStackArgs, globals: &Globals) -> Result<BookStackTarget> {
    let settings = validate_bookstack(BookStackInput::from(args).or(globals.config.bookstack.clone()))?;
    Ok(BookStackTarget::new(&settings)?)
}

fn chapters(args: &BookStackArgs, book_id: Option<u64>, globals: &Globals) -> Result<()> {
    let target = connect(args, globals)?;
    let report = runtime()?.block_on(async {
        let chapters = target.list_chapters(book_id).await?;
        let pages = target.list_pages(book_id).await?;
        let empty = find_empty_chapters(&chapters, &pages);
        info!(chapters = chapters.len(), empty = empty.len(), "Scanned chapters");

        let mut report = PruneReport {
            dry_run: globals.dry_run,
            scanned: chapters.len(),
            ..PruneReport::default()
        };
        for chapter in empty {
            report.candidates.push((chapter.id, chapter.name.clone()));
            if globals.dry_run {
                continue;
            }
            match target.delete_chapter(chapter.id).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    warn!(chapter = chapter.id, error = %e, "Failed to delete chapter");
                    report.errors.push((chapter.id, e.to_string()));
                }
            }
        }
        Ok::<_, crate::error::Error>(report)
    })?;
    print_prune(&report, "chapter", globals)
}

fn pages(args: &PrunePagesArgs, globals: &Globals) -> Result<()> {
    let target = connect(&args.bookstack, globals)?;
    let report = runtime()?.block_on(async {
        let listed = match args.page_id {
            Some(id) => vec![target.page_detail(id).await?],
            None => target.list_pages(args.book_id).await?,
        };

        let mut report = PruneReport {
            dry_run: globals.dry_run,
            scanned: listed.len(),
            ..PruneReport::default()
        };
        for page in listed {
            if args.title.as_deref().is_some_and(|t| t != page.name) {
                continue;
            }
            // Listings carry no content; fetch it when missing.
            let page = if page.has_content_fields() {
                page
            } else {
                match target.page_detail(page.id).await {
                    Ok(detail) => detail,
                    Err(e) => {
                        warn!(page = page.id, error = %e, "Could not fetch page content; leaving it alone");
                        report.errors.push((page.id, e.to_string()));
                        continue;
                    }
                }
            };
            if !is_empty(&page, args.min_text_length) {
                continue;
            }

            report.candidates.push((page.id, page.name.clone()));
            if globals.dry_run {
                continue;
            }
            match target.delete_page(page.id).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    warn!(page = page.id, error = %e, "Failed to delete page");
                    report.errors.push((page.id, e.to_string()));
                }
            }
        }
        Ok::<_, crate::error::Error>(report)
    })?;
    print_prune(&report, "page", globals)
}

fn is_empty(page: &PageInfo, min_text_length: usize) -> bool {
    is_page_effectively_empty(page.html.as_deref(), page.markdown.as_deref(), min_text_length)
}

fn print_prune(report: &PruneReport, noun: &str, globals: &Globals) -> Result<()> {
    if globals.json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    let title = if report.dry_run {
        format!("Prune {noun}s (dry run)")
    } else {
        format!("Prune {noun}s")
    };
    println!("{}", title.bold().underline());
    println!("  Scanned:         {}", report.scanned);
    println!("  Empty:           {}", report.candidates.len());
    if !report.dry_run {
        println!("  Deleted:         {}", report.deleted.to_string().green());
    }
    if !report.errors.is_empty() {
        println!("  Errors:          {}", report.errors.len().to_string().red());
    }

    if !report.candidates.is_empty() {
        println!();
        let verb = if report.dry_run { "would delete" } else { "deleted" };
        for (id, name) in &report.candidates {
            let failed = report.errors.iter().any(|(e, _)| e == id);
            let status = if failed { "failed".red() } else { verb.yellow() };
            println!("  {status} {noun} {id} {name}");
        }
    }
    if globals.verbose {
        for (id, error) in &report.errors {
            println!("  {} {id}: {error}", "error".red());
        }
    }
    Ok(())
}
