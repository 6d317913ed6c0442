//! Confluence Cloud source connector (REST API v2).
//!
//! The space key is resolved to its numeric id once, then pages are listed
//! with storage-format bodies. Paging follows the cursor embedded in the
//! response's `_links.next` URL.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::OnceCell;

use super::SourceConnector;
use super::http::{Auth, HttpClient};
use crate::config::ConfluenceSettings;
use crate::error::ConnectorError;
use crate::model::SourceEntity;
use crate::sync::fetch::{DEFAULT_PAGE_SIZE, FetchError, Page, PageRequest, PageSource, fetch_all};

const API: &str = "/wiki/api/v2";

/// Page kind reported on every Confluence source entity.
pub const PAGE_KIND: &str = "page";

#[derive(Debug, Deserialize)]
struct Results<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(rename = "_links", default)]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Links {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Space {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfluencePage {
    id: String,
    #[serde(default)]
    title: String,
    parent_id: Option<String>,
    parent_type: Option<String>,
    author_id: Option<String>,
    status: Option<String>,
    created_at: Option<DateTime<Utc>>,
    body: Option<Body>,
}

#[derive(Debug, Deserialize)]
struct Body {
    storage: Option<Storage>,
}

#[derive(Debug, Deserialize)]
struct Storage {
    value: Option<String>,
}

impl ConfluencePage {
    fn into_entity(self) -> SourceEntity {
        // Folders and whiteboards are not migrated; a page under one is a root.
        let parent = match self.parent_type.as_deref() {
            None | Some("page") => self.parent_id,
            Some(_) => None,
        };
        SourceEntity {
            external_id: self.id,
            title: self.title,
            body: self
                .body
                .and_then(|b| b.storage)
                .and_then(|s| s.value)
                .unwrap_or_default(),
            kind: PAGE_KIND.to_string(),
            parent_external_id: parent,
            created_by: self.author_id,
            status: self.status,
            priority: None,
            created_at: self.created_at,
        }
    }
}

/// `cursor` query parameter of a `_links.next` URL.
fn cursor_from_next(next: &str) -> Option<String> {
    let query = next.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "cursor" && !value.is_empty()).then(|| percent_decode(value))
    })
}

/// Minimal `%XX` decoding for cursor tokens.
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

struct SpacePages<'a> {
    http: &'a HttpClient,
    space_id: &'a str,
}

impl PageSource for SpacePages<'_> {
    type Item = SourceEntity;

    fn label(&self) -> &str {
        "confluence pages"
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page<SourceEntity>, ConnectorError> {
        let mut query = vec![
            ("body-format", "storage".to_string()),
            ("limit", request.size.to_string()),
        ];
        if let Some(cursor) = &request.cursor {
            query.push(("cursor", cursor.clone()));
        }
        let page: Results<ConfluencePage> = self
            .http
            .get_json(&format!("{API}/spaces/{}/pages", self.space_id), &query)
            .await?;
        let cursor = page.links.next.as_deref().and_then(cursor_from_next);
        Ok(Page::with_cursor(
            page.results.into_iter().map(ConfluencePage::into_entity).collect(),
            cursor,
        ))
    }
}

/// Pages of one Confluence space.
#[derive(Debug)]
pub struct ConfluenceSource {
    http: HttpClient,
    space_key: String,
    page_size: usize,
    space_id: OnceCell<String>,
}

impl ConfluenceSource {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &ConfluenceSettings) -> Result<Self, ConnectorError> {
        let http = HttpClient::new(
            &settings.host,
            Auth::Basic {
                user: settings.email.clone(),
                password: settings.api_token.clone(),
            },
        )?;
        Ok(Self::with_client(http, &settings.space_key))
    }

    #[must_use]
    pub fn with_client(http: HttpClient, space_key: &str) -> Self {
        Self {
            http,
            space_key: space_key.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            space_id: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    async fn space_id(&self) -> Result<&str, ConnectorError> {
        let id = self
            .space_id
            .get_or_try_init(|| async {
                let spaces: Results<Space> = self
                    .http
                    .get_json(&format!("{API}/spaces"), &[("keys", self.space_key.clone())])
                    .await?;
                spaces
                    .results
                    .into_iter()
                    .next()
                    .map(|s| s.id)
                    .ok_or_else(|| ConnectorError::not_found(format!("Confluence space '{}' not found", self.space_key)))
            })
            .await?;
        Ok(id.as_str())
    }
}

impl SourceConnector for ConfluenceSource {
    fn scope_label(&self) -> String {
        format!("confluence:{}", self.space_key)
    }

    async fn list_entities(&self) -> Result<Vec<SourceEntity>, FetchError> {
        let space_id = self
            .space_id()
            .await
            .map_err(|e| FetchError::before_listing("confluence space", e))?;
        let pages = SpacePages {
            http: &self.http,
            space_id,
        };
        let entities = fetch_all(&pages, self.page_size).await?;
        tracing::info!(space = %self.space_key, count = entities.len(), "Fetched Confluence pages");
        Ok(entities)
    }
}
