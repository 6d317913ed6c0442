//! Version command implementation.

use crate::error::Result;
use serde::Serialize;

/// Source → target pairs this build can migrate.
const MIGRATIONS: [(&str, &str, &str); 2] = [("issues", "jira", "openproject"), ("pages", "confluence", "bookstack")];

#[derive(Serialize)]
struct Migration {
    command: &'static str,
    source: &'static str,
    target: &'static str,
}

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    build: &'static str,
    migrations: Vec<Migration>,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let output = VersionOutput {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        build: if cfg!(debug_assertions) { "dev" } else { "release" },
        migrations: MIGRATIONS
            .iter()
            .map(|&(command, source, target)| Migration { command, source, target })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("sb {} ({})", output.version, output.build);
    for m in &output.migrations {
        println!("  sb {:<7} {} → {}", m.command, m.source, m.target);
    }
    Ok(())
}
