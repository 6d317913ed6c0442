//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{BookStackInput, ConfluenceInput, JiraInput, OpenProjectInput};
use crate::sync::SimilarityKind;
use crate::sync::matcher::{DEFAULT_ACCEPTANCE, DEFAULT_MARGIN};
use crate::sync::prune::DEFAULT_MIN_TEXT_LENGTH;

pub mod commands;

/// Stackbridge - Migrate Jira and Confluence hierarchies into OpenProject and BookStack
#[derive(Parser, Debug)]
#[command(name = "sb", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.stackbridge/config.json)
    #[arg(long, global = true, env = "STACKBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Plan and report without writing to the target
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Jira issues → OpenProject work packages
    Issues {
        #[command(subcommand)]
        command: IssuesCommands,
    },

    /// Confluence pages → BookStack books, chapters and pages
    Pages {
        #[command(subcommand)]
        command: PagesCommands,
    },

    /// Remove empty BookStack records left behind by migrations
    Prune {
        #[command(subcommand)]
        command: PruneCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Connection Arguments
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct JiraArgs {
    /// Jira Cloud host (e.g. yourcompany.atlassian.net)
    #[arg(long, env = "JIRA_HOST")]
    pub jira_host: Option<String>,

    /// Jira account email
    #[arg(long, env = "JIRA_EMAIL")]
    pub jira_email: Option<String>,

    /// Jira API token
    #[arg(long, env = "JIRA_API_TOKEN", hide_env_values = true)]
    pub jira_api_token: Option<String>,

    /// Jira project key
    #[arg(long, env = "JIRA_PROJECT_KEY")]
    pub jira_project_key: Option<String>,
}

impl From<&JiraArgs> for JiraInput {
    fn from(args: &JiraArgs) -> Self {
        Self {
            host: args.jira_host.clone(),
            email: args.jira_email.clone(),
            api_token: args.jira_api_token.clone(),
            project_key: args.jira_project_key.clone(),
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct OpenProjectArgs {
    /// OpenProject base URL
    #[arg(long, env = "OPENPROJECT_HOST")]
    pub openproject_host: Option<String>,

    /// OpenProject API key
    #[arg(long, env = "OPENPROJECT_API_KEY", hide_env_values = true)]
    pub openproject_api_key: Option<String>,

    /// OpenProject project id
    #[arg(long, env = "OPENPROJECT_PROJECT_ID")]
    pub openproject_project_id: Option<u64>,

    /// Number N of the work package customFieldN holding the Jira key
    #[arg(long, env = "JIRA_ID_CUSTOM_FIELD")]
    pub jira_id_custom_field: Option<u32>,
}

impl From<&OpenProjectArgs> for OpenProjectInput {
    fn from(args: &OpenProjectArgs) -> Self {
        Self {
            host: args.openproject_host.clone(),
            api_key: args.openproject_api_key.clone(),
            project_id: args.openproject_project_id,
            jira_id_custom_field: args.jira_id_custom_field,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfluenceArgs {
    /// Confluence Cloud host
    #[arg(long, env = "CONFLUENCE_HOST")]
    pub confluence_host: Option<String>,

    /// Confluence account email
    #[arg(long, env = "CONFLUENCE_EMAIL")]
    pub confluence_email: Option<String>,

    /// Confluence API token
    #[arg(long, env = "CONFLUENCE_API_TOKEN", hide_env_values = true)]
    pub confluence_api_token: Option<String>,

    /// Confluence space key
    #[arg(long, env = "CONFLUENCE_SPACE_KEY")]
    pub confluence_space_key: Option<String>,
}

impl From<&ConfluenceArgs> for ConfluenceInput {
    fn from(args: &ConfluenceArgs) -> Self {
        Self {
            host: args.confluence_host.clone(),
            email: args.confluence_email.clone(),
            api_token: args.confluence_api_token.clone(),
            space_key: args.confluence_space_key.clone(),
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct BookStackArgs {
    /// BookStack base URL
    #[arg(long, env = "BOOKSTACK_HOST")]
    pub bookstack_host: Option<String>,

    /// BookStack API token id
    #[arg(long, env = "BOOKSTACK_TOKEN_ID")]
    pub bookstack_token_id: Option<String>,

    /// BookStack API token secret
    #[arg(long, env = "BOOKSTACK_TOKEN_SECRET", hide_env_values = true)]
    pub bookstack_token_secret: Option<String>,

    /// Put each top-level page's book on this shelf
    #[arg(long, env = "BOOKSTACK_SHELF_ID")]
    pub bookstack_shelf_id: Option<u64>,

    /// Migrate everything into this existing book
    #[arg(long, env = "BOOKSTACK_BOOK_ID")]
    pub bookstack_book_id: Option<u64>,

    /// Tag name storing the Confluence page id
    #[arg(long, env = "BOOKSTACK_EXTERNAL_TAG")]
    pub bookstack_external_tag: Option<String>,
}

impl From<&BookStackArgs> for BookStackInput {
    fn from(args: &BookStackArgs) -> Self {
        Self {
            host: args.bookstack_host.clone(),
            token_id: args.bookstack_token_id.clone(),
            token_secret: args.bookstack_token_secret.clone(),
            shelf_id: args.bookstack_shelf_id,
            book_id: args.bookstack_book_id,
            external_tag: args.bookstack_external_tag.clone(),
        }
    }
}

/// Fuzzy matching knobs shared by sync and diagnose.
#[derive(Args, Debug, Clone)]
pub struct MatchArgs {
    /// Minimum title similarity for a fuzzy match (0-1)
    #[arg(long, default_value_t = DEFAULT_ACCEPTANCE)]
    pub acceptance: f64,

    /// Required lead of the best candidate over the runner-up
    #[arg(long, default_value_t = DEFAULT_MARGIN)]
    pub margin: f64,

    /// Title similarity measure
    #[arg(long, value_enum, default_value_t)]
    pub similarity: SimilarityKind,
}

// ============================================================================
// Issues Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum IssuesCommands {
    /// Create or update work packages for every issue in the project
    Sync(IssuesSyncArgs),

    /// Show unmatched and ambiguous issues with their closest candidates
    Diagnose(IssuesDiagnoseArgs),

    /// List epics on both sides with their external references
    ListEpics {
        #[command(flatten)]
        jira: JiraArgs,
        #[command(flatten)]
        openproject: OpenProjectArgs,
    },
}

#[derive(Args, Debug)]
pub struct IssuesSyncArgs {
    #[command(flatten)]
    pub jira: JiraArgs,
    #[command(flatten)]
    pub openproject: OpenProjectArgs,
    #[command(flatten)]
    pub matching: MatchArgs,

    /// Overwrite matched work packages instead of skipping them
    #[arg(long)]
    pub update_existing: bool,

    /// Only these issue keys (comma-separated); ancestors are looked up, not written
    #[arg(long, value_delimiter = ',')]
    pub issues: Vec<String>,

    /// Move matched work packages under their epic when the parent differs
    #[arg(long)]
    pub relink_parents: bool,

    /// Don't read or write the Jira key custom field
    #[arg(long)]
    pub no_external_ref: bool,
}

#[derive(Args, Debug)]
pub struct IssuesDiagnoseArgs {
    #[command(flatten)]
    pub jira: JiraArgs,
    #[command(flatten)]
    pub openproject: OpenProjectArgs,
    #[command(flatten)]
    pub matching: MatchArgs,

    /// Don't read the Jira key custom field
    #[arg(long)]
    pub no_external_ref: bool,
}

// ============================================================================
// Pages Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum PagesCommands {
    /// Create or update BookStack records for every page in the space
    Sync(PagesSyncArgs),

    /// Show unmatched and ambiguous pages with their closest candidates
    Diagnose(PagesDiagnoseArgs),
}

#[derive(Args, Debug)]
pub struct PagesSyncArgs {
    #[command(flatten)]
    pub confluence: ConfluenceArgs,
    #[command(flatten)]
    pub bookstack: BookStackArgs,
    #[command(flatten)]
    pub matching: MatchArgs,

    /// Overwrite matched records instead of skipping them
    #[arg(long)]
    pub update_existing: bool,

    /// Only these page ids (comma-separated); ancestors are looked up, not written
    #[arg(long, value_delimiter = ',')]
    pub pages: Vec<String>,

    /// Move matched records under their planned container when it differs
    #[arg(long)]
    pub relink_parents: bool,

    /// Don't read or write the external id tag
    #[arg(long)]
    pub no_external_ref: bool,
}

#[derive(Args, Debug)]
pub struct PagesDiagnoseArgs {
    #[command(flatten)]
    pub confluence: ConfluenceArgs,
    #[command(flatten)]
    pub bookstack: BookStackArgs,
    #[command(flatten)]
    pub matching: MatchArgs,

    /// Don't read the external id tag
    #[arg(long)]
    pub no_external_ref: bool,
}

// ============================================================================
// Prune Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum PruneCommands {
    /// Delete chapters that contain no pages
    Chapters {
        #[command(flatten)]
        bookstack: BookStackArgs,

        /// Only scan this book
        #[arg(long)]
        book_id: Option<u64>,
    },

    /// Delete pages with no meaningful content
    Pages(PrunePagesArgs),
}

#[derive(Args, Debug)]
pub struct PrunePagesArgs {
    #[command(flatten)]
    pub bookstack: BookStackArgs,

    /// Only scan this book
    #[arg(long)]
    pub book_id: Option<u64>,

    /// Only check this page
    #[arg(long, conflicts_with = "book_id")]
    pub page_id: Option<u64>,

    /// Only consider pages with exactly this title
    #[arg(long)]
    pub title: Option<String>,

    /// Visible text up to this length counts as empty
    #[arg(long, default_value_t = DEFAULT_MIN_TEXT_LENGTH)]
    pub min_text_length: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_issue_subset() {
        let cli = Cli::try_parse_from([
            "sb",
            "--dry-run",
            "issues",
            "sync",
            "--jira-host",
            "acme.atlassian.net",
            "--issues",
            "ROE-1,ROE-2",
            "--similarity",
            "jaro-winkler",
        ])
        .unwrap();
        assert!(cli.dry_run);
        let Commands::Issues {
            command: IssuesCommands::Sync(args),
        } = cli.command
        else {
            panic!("expected issues sync");
        };
        assert_eq!(args.issues, ["ROE-1", "ROE-2"]);
        assert_eq!(args.matching.similarity, SimilarityKind::JaroWinkler);
        assert!((args.matching.acceptance - DEFAULT_ACCEPTANCE).abs() < f64::EPSILON);
        assert_eq!(JiraInput::from(&args.jira).host.as_deref(), Some("acme.atlassian.net"));
    }

    #[test]
    fn test_prune_page_id_conflicts_with_book() {
        let result = Cli::try_parse_from(["sb", "prune", "pages", "--book-id", "1", "--page-id", "2"]);
        assert!(result.is_err());
    }
}
