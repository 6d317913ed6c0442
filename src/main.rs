//! Stackbridge CLI entry point.

use clap::Parser;
use sb::cli::commands::{self, Globals};
use sb::cli::{Cli, Commands};
use sb::config::FileConfig;
use sb::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command and handle errors
    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    match &cli.command {
        Commands::Version => return commands::version::execute(json),
        Commands::Completions { shell } => return commands::completions::execute(shell),
        Commands::Issues { .. } | Commands::Pages { .. } | Commands::Prune { .. } => {}
    }

    let globals = Globals {
        json,
        dry_run: cli.dry_run,
        verbose: cli.verbose > 0,
        config: FileConfig::load(cli.config.as_deref())?,
    };

    match &cli.command {
        Commands::Issues { command } => commands::issues::execute(command, &globals),
        Commands::Pages { command } => commands::pages::execute(command, &globals),
        Commands::Prune { command } => commands::prune::execute(command, &globals),
        Commands::Version | Commands::Completions { .. } => Ok(()),
    }
}
