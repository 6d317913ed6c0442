//! Jira Cloud source connector.
//!
//! Issues are listed through the enhanced JQL search endpoint
//! (`POST /rest/api/3/search/jql`), which pages with an opaque
//! `nextPageToken`. Descriptions prefer Jira's rendered HTML and fall back
//! to the plain text of the Atlassian Document Format tree.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};

use super::SourceConnector;
use super::http::{Auth, HttpClient};
use crate::config::JiraSettings;
use crate::error::ConnectorError;
use crate::mapping::EPIC_TYPE;
use crate::model::SourceEntity;
use crate::sync::fetch::{DEFAULT_PAGE_SIZE, FetchError, Page, PageRequest, PageSource, fetch_all};

const SEARCH_PATH: &str = "/rest/api/3/search/jql";

/// Legacy "Epic Link" field on company-managed projects.
pub const EPIC_LINK_FIELD: &str = "customfield_10014";

const FIELDS: [&str; 10] = [
    "key",
    "summary",
    "description",
    "status",
    "priority",
    "issuetype",
    "creator",
    "created",
    EPIC_LINK_FIELD,
    "parent",
];

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<Issue>,
    next_page_token: Option<String>,
    is_last: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Issue {
    key: String,
    fields: IssueFields,
    #[serde(default)]
    rendered_fields: Option<RenderedFields>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IssueFields {
    summary: Option<String>,
    description: Option<Value>,
    issuetype: Option<Named>,
    status: Option<Named>,
    priority: Option<Named>,
    creator: Option<User>,
    created: Option<String>,
    customfield_10014: Option<Value>,
    parent: Option<ParentRef>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    display_name: Option<String>,
    account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParentRef {
    key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RenderedFields {
    description: Option<String>,
}

impl Issue {
    fn into_entity(self) -> SourceEntity {
        let fields = self.fields;
        let rendered = self
            .rendered_fields
            .and_then(|r| r.description)
            .filter(|d| !d.trim().is_empty());
        let body = rendered
            .or_else(|| fields.description.as_ref().map(adf_to_text))
            .unwrap_or_default();

        let parent = fields.parent.map(|p| p.key).or_else(|| match fields.customfield_10014 {
            Some(Value::String(key)) if !key.trim().is_empty() => Some(key),
            _ => None,
        });

        SourceEntity {
            external_id: self.key,
            title: fields.summary.unwrap_or_default(),
            body,
            kind: fields.issuetype.map_or_else(|| "Task".to_string(), |t| t.name),
            parent_external_id: parent,
            created_by: fields.creator.and_then(|u| u.display_name.or(u.account_id)),
            status: fields.status.map(|s| s.name),
            priority: fields.priority.map(|p| p.name),
            created_at: fields.created.as_deref().and_then(parse_jira_time),
        }
    }
}

/// Parse Jira timestamps (`2024-01-15T10:30:00.000+0000`) and RFC 3339.
fn parse_jira_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Plain text of an Atlassian Document Format value.
///
/// Top-level blocks are joined with newlines; plain strings (API v2 style)
/// pass through.
#[must_use]
pub fn adf_to_text(value: &Value) -> String {
    fn collect(node: &Value, out: &mut String) {
        if let Some(text) = node.get("text").and_then(Value::as_str) {
            out.push_str(text);
        }
        if node.get("type").and_then(Value::as_str) == Some("hardBreak") {
            out.push('\n');
        }
        if let Some(children) = node.get("content").and_then(Value::as_array) {
            for child in children {
                collect(child, out);
            }
        }
    }

    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) => value
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .map(|block| {
                        let mut text = String::new();
                        collect(block, &mut text);
                        text
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default(),
        _ => String::new(),
    }
}

// ============================================================================
// Paging
// ============================================================================

struct SearchPages<'a> {
    http: &'a HttpClient,
    jql: String,
}

impl PageSource for SearchPages<'_> {
    type Item = SourceEntity;

    fn label(&self) -> &str {
        "jira issues"
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page<SourceEntity>, ConnectorError> {
        let mut body = json!({
            "jql": self.jql,
            "fields": FIELDS,
            "expand": "renderedFields",
            "maxResults": request.size,
        });
        if let Some(token) = &request.cursor {
            body["nextPageToken"] = Value::String(token.clone());
        }

        let response: SearchResponse = self.http.send_json(Method::POST, SEARCH_PATH, &body).await?;
        let items = response.issues.into_iter().map(Issue::into_entity).collect();
        let cursor = if response.is_last == Some(true) {
            None
        } else {
            response.next_page_token
        };
        Ok(Page::with_cursor(items, cursor))
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Issues of one Jira project.
#[derive(Debug)]
pub struct JiraSource {
    http: HttpClient,
    project_key: String,
    page_size: usize,
}

impl JiraSource {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &JiraSettings) -> Result<Self, ConnectorError> {
        let http = HttpClient::new(
            &settings.host,
            Auth::Basic {
                user: settings.email.clone(),
                password: settings.api_token.clone(),
            },
        )?;
        Ok(Self::with_client(http, &settings.project_key))
    }

    /// Build over an existing client (tests point this at a mock server).
    #[must_use]
    pub fn with_client(http: HttpClient, project_key: &str) -> Self {
        Self {
            http,
            project_key: project_key.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    fn jql(&self, epics_only: bool) -> String {
        let project = quote_jql(&self.project_key);
        if epics_only {
            format!("project = {project} AND issuetype = {EPIC_TYPE} ORDER BY created ASC")
        } else {
            format!("project = {project} ORDER BY created ASC")
        }
    }

    /// Epic-type issues of the project.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if any page fails.
    pub async fn list_epics(&self) -> Result<Vec<SourceEntity>, FetchError> {
        let pages = SearchPages {
            http: &self.http,
            jql: self.jql(true),
        };
        fetch_all(&pages, self.page_size).await
    }
}

/// Quote a JQL value unless it is a bare project key.
fn quote_jql(value: &str) -> String {
    if value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

impl SourceConnector for JiraSource {
    fn scope_label(&self) -> String {
        format!("jira:{}", self.project_key)
    }

    async fn list_entities(&self) -> Result<Vec<SourceEntity>, FetchError> {
        let pages = SearchPages {
            http: &self.http,
            jql: self.jql(false),
        };
        let issues = fetch_all(&pages, self.page_size).await?;
        tracing::info!(project = %self.project_key, count = issues.len(), "Fetched Jira issues");
        Ok(issues)
    }
}
