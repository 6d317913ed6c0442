//! Configuration management.
//!
//! Connection settings come from three layers, highest priority first:
//!
//! 1. CLI flags, which fall back to environment variables (`JIRA_HOST`, ...)
//! 2. The JSON config file at `~/.stackbridge/config.json`
//!    (override with `--config` or `STACKBRIDGE_CONFIG`)
//! 3. Built-in defaults
//!
//! Anything still missing after that is a configuration error. The
//! `validate_*` functions turn the merged raw values into settings structs
//! the connectors are built from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "STACKBRIDGE_CONFIG";

pub const DEFAULT_JIRA_PROJECT_KEY: &str = "ROE";
pub const DEFAULT_OPENPROJECT_PROJECT_ID: u64 = 3;
pub const DEFAULT_BOOKSTACK_EXTERNAL_TAG: &str = "confluence_id";

// ============================================================================
// Locations
// ============================================================================

/// The global Stackbridge directory (`~/.stackbridge/`).
#[must_use]
pub fn global_stackbridge_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".stackbridge"))
}

/// Resolve the config file path.
///
/// Priority:
/// 1. Explicit `--config` path
/// 2. `STACKBRIDGE_CONFIG` environment variable
/// 3. `~/.stackbridge/config.json`
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    global_stackbridge_dir().map(|dir| dir.join("config.json"))
}

// ============================================================================
// Raw values
// ============================================================================

fn pick(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary.filter(|v| !v.trim().is_empty()).or(fallback)
}

/// Unvalidated Jira values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JiraInput {
    pub host: Option<String>,
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub project_key: Option<String>,
}

impl JiraInput {
    /// Fill unset values from `fallback`.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            host: pick(self.host, fallback.host),
            email: pick(self.email, fallback.email),
            api_token: pick(self.api_token, fallback.api_token),
            project_key: pick(self.project_key, fallback.project_key),
        }
    }
}

/// Unvalidated OpenProject values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenProjectInput {
    pub host: Option<String>,
    pub api_key: Option<String>,
    pub project_id: Option<u64>,
    /// Number `N` of the `customFieldN` holding the Jira key.
    pub jira_id_custom_field: Option<u32>,
}

impl OpenProjectInput {
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            host: pick(self.host, fallback.host),
            api_key: pick(self.api_key, fallback.api_key),
            project_id: self.project_id.or(fallback.project_id),
            jira_id_custom_field: self.jira_id_custom_field.or(fallback.jira_id_custom_field),
        }
    }
}

/// Unvalidated Confluence values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluenceInput {
    pub host: Option<String>,
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub space_key: Option<String>,
}

impl ConfluenceInput {
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            host: pick(self.host, fallback.host),
            email: pick(self.email, fallback.email),
            api_token: pick(self.api_token, fallback.api_token),
            space_key: pick(self.space_key, fallback.space_key),
        }
    }
}

/// Unvalidated BookStack values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookStackInput {
    pub host: Option<String>,
    pub token_id: Option<String>,
    pub token_secret: Option<String>,
    pub shelf_id: Option<u64>,
    pub book_id: Option<u64>,
    pub external_tag: Option<String>,
}

impl BookStackInput {
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            host: pick(self.host, fallback.host),
            token_id: pick(self.token_id, fallback.token_id),
            token_secret: pick(self.token_secret, fallback.token_secret),
            shelf_id: self.shelf_id.or(fallback.shelf_id),
            book_id: self.book_id.or(fallback.book_id),
            external_tag: pick(self.external_tag, fallback.external_tag),
        }
    }
}

/// Contents of `config.json`. Every section and field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub jira: JiraInput,
    pub openproject: OpenProjectInput,
    pub confluence: ConfluenceInput,
    pub bookstack: BookStackInput,
}

impl FileConfig {
    /// Load the config file.
    ///
    /// A missing file at the default location yields an empty config; a
    /// missing file that was asked for explicitly is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let Some(path) = resolve_config_path(explicit) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            if explicit.is_some() {
                return Err(Error::Config(format!("config file not found: {}", path.display())));
            }
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid config file {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }
}

// ============================================================================
// Validated settings
// ============================================================================

#[derive(Clone, PartialEq, Eq)]
pub struct JiraSettings {
    pub host: String,
    pub email: String,
    pub api_token: String,
    pub project_key: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct OpenProjectSettings {
    pub host: String,
    pub api_key: String,
    pub project_id: u64,
    /// `customFieldN` storing the source key; `None` disables exact matching.
    pub external_ref_field: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ConfluenceSettings {
    pub host: String,
    pub email: String,
    pub api_token: String,
    pub space_key: String,
}

/// Where migrated books go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "layout", content = "id", rename_all = "snake_case")]
pub enum BookStackLayout {
    /// Books are created without a shelf.
    Unshelved,
    /// Each top-level source page becomes a book on this shelf.
    Shelf(u64),
    /// Everything goes into one existing book; top-level pages become
    /// chapters or pages.
    Book(u64),
}

impl BookStackLayout {
    /// Depth offset for the hierarchy builder.
    #[must_use]
    pub const fn base_depth(&self) -> usize {
        match self {
            Self::Book(_) => 1,
            Self::Unshelved | Self::Shelf(_) => 0,
        }
    }

    /// Fixed target parent for source roots.
    #[must_use]
    pub fn root_parent(&self) -> Option<String> {
        match self {
            Self::Book(id) => Some(format!("book:{id}")),
            Self::Unshelved | Self::Shelf(_) => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BookStackSettings {
    pub host: String,
    pub token_id: String,
    pub token_secret: String,
    pub layout: BookStackLayout,
    /// Tag name storing the source page id.
    pub external_tag: String,
}

// Credentials stay out of debug output.
macro_rules! redacted_debug {
    ($ty:ident { $($field:ident),* }) => {
        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    $(.field(stringify!($field), &self.$field))*
                    .finish_non_exhaustive()
            }
        }
    };
}

redacted_debug!(JiraSettings { host, email, project_key });
redacted_debug!(OpenProjectSettings { host, project_id, external_ref_field });
redacted_debug!(ConfluenceSettings { host, email, space_key });
redacted_debug!(BookStackSettings { host, token_id, layout, external_tag });

fn require(value: Option<String>, name: &'static str, flag: &'static str, env: &'static str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(Error::MissingSetting { name, flag, env })
}

/// Validate Jira connection values.
///
/// # Errors
///
/// Returns `MissingSetting` for the first absent required value.
pub fn validate_jira(input: JiraInput) -> Result<JiraSettings> {
    Ok(JiraSettings {
        host: require(input.host, "Jira host", "jira-host", "JIRA_HOST")?,
        email: require(input.email, "Jira email", "jira-email", "JIRA_EMAIL")?,
        api_token: require(input.api_token, "Jira API token", "jira-api-token", "JIRA_API_TOKEN")?,
        project_key: input
            .project_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| DEFAULT_JIRA_PROJECT_KEY.to_string()),
    })
}

/// Validate OpenProject connection values.
///
/// # Errors
///
/// Returns `MissingSetting` for absent credentials and `Config` for a zero
/// custom field number.
pub fn validate_openproject(input: OpenProjectInput) -> Result<OpenProjectSettings> {
    let external_ref_field = match input.jira_id_custom_field {
        Some(0) => return Err(Error::Config("JIRA_ID_CUSTOM_FIELD must be a positive number".into())),
        Some(n) => Some(format!("customField{n}")),
        None => None,
    };
    Ok(OpenProjectSettings {
        host: require(input.host, "OpenProject host", "openproject-host", "OPENPROJECT_HOST")?,
        api_key: require(input.api_key, "OpenProject API key", "openproject-api-key", "OPENPROJECT_API_KEY")?,
        project_id: input.project_id.unwrap_or(DEFAULT_OPENPROJECT_PROJECT_ID),
        external_ref_field,
    })
}

/// Validate Confluence connection values.
///
/// # Errors
///
/// Returns `MissingSetting` for the first absent required value.
pub fn validate_confluence(input: ConfluenceInput) -> Result<ConfluenceSettings> {
    Ok(ConfluenceSettings {
        host: require(input.host, "Confluence host", "confluence-host", "CONFLUENCE_HOST")?,
        email: require(input.email, "Confluence email", "confluence-email", "CONFLUENCE_EMAIL")?,
        api_token: require(
            input.api_token,
            "Confluence API token",
            "confluence-api-token",
            "CONFLUENCE_API_TOKEN",
        )?,
        space_key: require(input.space_key, "Confluence space key", "confluence-space-key", "CONFLUENCE_SPACE_KEY")?,
    })
}

/// Validate BookStack connection values.
///
/// # Errors
///
/// Returns `ConflictingLayout` when both a shelf and a book are configured,
/// and `MissingSetting` for absent credentials.
pub fn validate_bookstack(input: BookStackInput) -> Result<BookStackSettings> {
    let layout = match (input.shelf_id, input.book_id) {
        (Some(shelf_id), Some(book_id)) => return Err(Error::ConflictingLayout { shelf_id, book_id }),
        (Some(id), None) => BookStackLayout::Shelf(id),
        (None, Some(id)) => BookStackLayout::Book(id),
        (None, None) => BookStackLayout::Unshelved,
    };
    Ok(BookStackSettings {
        host: require(input.host, "BookStack host", "bookstack-host", "BOOKSTACK_HOST")?,
        token_id: require(input.token_id, "BookStack token id", "bookstack-token-id", "BOOKSTACK_TOKEN_ID")?,
        token_secret: require(
            input.token_secret,
            "BookStack token secret",
            "bookstack-token-secret",
            "BOOKSTACK_TOKEN_SECRET",
        )?,
        layout,
        external_tag: input
            .external_tag
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_BOOKSTACK_EXTERNAL_TAG.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn jira_input() -> JiraInput {
        JiraInput {
            host: Some("acme.atlassian.net".into()),
            email: Some("ops@acme.test".into()),
            api_token: Some("secret".into()),
            project_key: None,
        }
    }

    #[test]
    fn test_resolve_config_path_with_explicit() {
        let explicit = PathBuf::from("/custom/stackbridge.json");
        assert_eq!(resolve_config_path(Some(&explicit)), Some(explicit));
    }

    #[test]
    fn test_global_dir_returns_some() {
        let dir = global_stackbridge_dir().unwrap();
        assert!(dir.ends_with(".stackbridge"));
    }

    #[test]
    fn test_validate_jira_defaults_project_key() {
        let settings = validate_jira(jira_input()).unwrap();
        assert_eq!(settings.project_key, DEFAULT_JIRA_PROJECT_KEY);
    }

    #[test]
    fn test_validate_jira_missing_token() {
        let input = JiraInput {
            api_token: Some("   ".into()),
            ..jira_input()
        };
        let err = validate_jira(input).unwrap_err();
        assert!(matches!(err, Error::MissingSetting { env: "JIRA_API_TOKEN", .. }));
    }

    #[test]
    fn test_flag_wins_over_file() {
        let flags = JiraInput {
            project_key: Some("ABC".into()),
            ..JiraInput::default()
        };
        let file = JiraInput {
            project_key: Some("XYZ".into()),
            ..jira_input()
        };
        let merged = flags.or(file);
        assert_eq!(merged.project_key.as_deref(), Some("ABC"));
        assert_eq!(merged.email.as_deref(), Some("ops@acme.test"));
    }

    #[test]
    fn test_openproject_custom_field() {
        let input = OpenProjectInput {
            host: Some("op.test".into()),
            api_key: Some("k".into()),
            project_id: None,
            jira_id_custom_field: Some(4),
        };
        let settings = validate_openproject(input.clone()).unwrap();
        assert_eq!(settings.external_ref_field.as_deref(), Some("customField4"));
        assert_eq!(settings.project_id, DEFAULT_OPENPROJECT_PROJECT_ID);

        let unset = validate_openproject(OpenProjectInput {
            jira_id_custom_field: None,
            ..input.clone()
        })
        .unwrap();
        assert_eq!(unset.external_ref_field, None);

        assert!(validate_openproject(OpenProjectInput {
            jira_id_custom_field: Some(0),
            ..input
        })
        .is_err());
    }

    #[test]
    fn test_bookstack_layouts() {
        let base = BookStackInput {
            host: Some("wiki.test".into()),
            token_id: Some("id".into()),
            token_secret: Some("secret".into()),
            ..BookStackInput::default()
        };
        let settings = validate_bookstack(base.clone()).unwrap();
        assert_eq!(settings.layout, BookStackLayout::Unshelved);
        assert_eq!(settings.external_tag, DEFAULT_BOOKSTACK_EXTERNAL_TAG);

        let book = validate_bookstack(BookStackInput {
            book_id: Some(9),
            ..base.clone()
        })
        .unwrap();
        assert_eq!(book.layout.base_depth(), 1);
        assert_eq!(book.layout.root_parent().as_deref(), Some("book:9"));

        let err = validate_bookstack(BookStackInput {
            shelf_id: Some(1),
            book_id: Some(2),
            ..base
        })
        .unwrap_err();
        assert!(matches!(err, Error::ConflictingLayout { shelf_id: 1, book_id: 2 }));
    }

    #[test]
    fn test_load_file_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"jira": {{"host": "acme.atlassian.net"}}, "bookstack": {{"shelf_id": 4}}}}"#
        )
        .unwrap();
        let config = FileConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.jira.host.as_deref(), Some("acme.atlassian.net"));
        assert_eq!(config.bookstack.shelf_id, Some(4));
        assert_eq!(config.confluence, ConfluenceInput::default());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(FileConfig::load(Some(&missing)), Err(Error::Config(_))));
    }

    #[test]
    fn test_settings_debug_hides_secrets() {
        let settings = validate_jira(jira_input()).unwrap();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("acme.atlassian.net"));
    }
}
