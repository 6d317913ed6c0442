//! BookStack target connector.
//!
//! BookStack ids are only unique per collection, so target ids carry their
//! kind: `book:12`, `chapter:40`, `page:311`. Books are root containers,
//! chapters sub-containers and pages leaf items.
//!
//! BookStack has no custom fields; the source page id is stored as a tag
//! (`confluence_id` by default). Listing endpoints don't return tags, so refs
//! are read back through tag search.
//!
//! Chapters cannot nest. A sub-container whose parent is a chapter is
//! created in that chapter's book instead.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::TargetConnector;
use super::http::{Auth, HttpClient};
use crate::config::{BookStackLayout, BookStackSettings};
use crate::error::ConnectorError;
use crate::model::{EntityPayload, Role, TargetEntity};
use crate::sync::fetch::{DEFAULT_PAGE_SIZE, FetchError, Page, PageRequest, PageSource, fetch_all};
use crate::sync::prune::{ChapterInfo, PageInfo};

/// BookStack caps listing and search pages at 500; stay well below.
const MAX_COUNT: usize = 100;

/// Body sent for pages without content (BookStack rejects empty pages).
const EMPTY_PAGE_HTML: &str = "<p></p>";

// ============================================================================
// Typed ids
// ============================================================================

/// A BookStack record id qualified by its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookStackId {
    Book(u64),
    Chapter(u64),
    Page(u64),
}

impl BookStackId {
    const fn collection(self) -> &'static str {
        match self {
            Self::Book(_) => "books",
            Self::Chapter(_) => "chapters",
            Self::Page(_) => "pages",
        }
    }

    const fn id(self) -> u64 {
        match self {
            Self::Book(id) | Self::Chapter(id) | Self::Page(id) => id,
        }
    }

    fn path(self) -> String {
        format!("/api/{}/{}", self.collection(), self.id())
    }
}

impl std::fmt::Display for BookStackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Book(id) => write!(f, "book:{id}"),
            Self::Chapter(id) => write!(f, "chapter:{id}"),
            Self::Page(id) => write!(f, "page:{id}"),
        }
    }
}

impl FromStr for BookStackId {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConnectorError::unknown(format!("not a BookStack id: '{s}'"));
        let (kind, id) = s.split_once(':').ok_or_else(invalid)?;
        let id: u64 = id.parse().map_err(|_| invalid())?;
        match kind {
            "book" => Ok(Self::Book(id)),
            "chapter" => Ok(Self::Chapter(id)),
            "page" => Ok(Self::Page(id)),
            _ => Err(invalid()),
        }
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct Listing<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    total: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct BookRow {
    id: u64,
    name: String,
    #[serde(default)]
    description: String,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ChapterRow {
    id: u64,
    book_id: u64,
    name: String,
    #[serde(default)]
    description: String,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PageRow {
    id: u64,
    book_id: u64,
    /// Zero when the page sits directly in its book.
    #[serde(default)]
    chapter_id: u64,
    name: String,
    #[serde(default)]
    draft: bool,
    created_at: Option<DateTime<Utc>>,
    html: Option<String>,
    markdown: Option<String>,
}

impl PageRow {
    fn chapter(&self) -> Option<u64> {
        (self.chapter_id != 0).then_some(self.chapter_id)
    }

    fn into_info(self) -> PageInfo {
        PageInfo {
            id: self.id,
            chapter_id: self.chapter(),
            book_id: self.book_id,
            name: self.name,
            html: self.html,
            markdown: self.markdown,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: u64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Shelf {
    #[serde(default)]
    books: Vec<ShelfBook>,
}

#[derive(Debug, Deserialize)]
struct ShelfBook {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: u64,
}

// ============================================================================
// Paging
// ============================================================================

/// `count`/`offset` listing of one collection.
struct Rows<'a, T> {
    http: &'a HttpClient,
    path: &'static str,
    label: &'static str,
    filters: Vec<(&'static str, String)>,
    row: PhantomData<fn() -> T>,
}

impl<'a, T> Rows<'a, T> {
    fn new(http: &'a HttpClient, path: &'static str, label: &'static str, book: Option<u64>) -> Self {
        Self {
            http,
            path,
            label,
            filters: book.map(|id| ("filter[book_id]", id.to_string())).into_iter().collect(),
            row: PhantomData,
        }
    }
}

impl<T: DeserializeOwned + Send> PageSource for Rows<'_, T> {
    type Item = T;

    fn label(&self) -> &str {
        self.label
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page<T>, ConnectorError> {
        let mut query = self.filters.clone();
        query.push(("count", request.size.to_string()));
        query.push(("offset", request.offset.to_string()));
        let listing: Listing<T> = self.http.get_json(self.path, &query).await?;
        Ok(Page::inferred(listing.data, listing.total))
    }
}

/// Tag search; pages are one-based.
struct TagSearch<'a> {
    http: &'a HttpClient,
    tag: &'a str,
}

impl PageSource for TagSearch<'_> {
    type Item = SearchHit;

    fn label(&self) -> &str {
        "bookstack tag search"
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page<SearchHit>, ConnectorError> {
        let query = [
            ("query", format!("[{}]", self.tag)),
            ("page", request.page_number().to_string()),
            ("count", request.size.to_string()),
        ];
        let listing: Listing<SearchHit> = self.http.get_json("/api/search", &query).await?;
        Ok(Page::inferred(listing.data, listing.total))
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Books, chapters and pages in the configured layout.
#[derive(Debug)]
pub struct BookStackTarget {
    http: HttpClient,
    layout: BookStackLayout,
    /// Tag holding the source id; `None` disables storing refs.
    external_tag: Option<String>,
    page_size: usize,
}

impl BookStackTarget {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &BookStackSettings) -> Result<Self, ConnectorError> {
        let http = HttpClient::new(
            &settings.host,
            Auth::Header(format!("Token {}:{}", settings.token_id, settings.token_secret)),
        )?;
        Ok(Self::with_client(http, settings.layout, Some(settings.external_tag.clone())))
    }

    #[must_use]
    pub fn with_client(http: HttpClient, layout: BookStackLayout, external_tag: Option<String>) -> Self {
        Self {
            http,
            layout,
            external_tag,
            page_size: DEFAULT_PAGE_SIZE.min(MAX_COUNT),
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.min(MAX_COUNT);
        self
    }

    /// Stop reading and writing the external-ref tag.
    #[must_use]
    pub fn without_external_ref(mut self) -> Self {
        self.external_tag = None;
        self
    }

    #[must_use]
    pub const fn layout(&self) -> BookStackLayout {
        self.layout
    }

    async fn books(&self) -> Result<Vec<BookRow>, FetchError> {
        fetch_all(&Rows::new(&self.http, "/api/books", "bookstack books", None), self.page_size).await
    }

    async fn chapter_rows(&self, book: Option<u64>) -> Result<Vec<ChapterRow>, FetchError> {
        fetch_all(&Rows::new(&self.http, "/api/chapters", "bookstack chapters", book), self.page_size).await
    }

    async fn page_rows(&self, book: Option<u64>) -> Result<Vec<PageRow>, FetchError> {
        let rows: Vec<PageRow> =
            fetch_all(&Rows::new(&self.http, "/api/pages", "bookstack pages", book), self.page_size).await?;
        // Listings can repeat records when pages shift under the offset.
        let mut seen = HashSet::new();
        Ok(rows.into_iter().filter(|p| !p.draft && seen.insert(p.id)).collect())
    }

    /// Books in scope, and whether the scope books themselves are targets.
    async fn scope_books(&self) -> Result<(Vec<BookRow>, bool), FetchError> {
        match self.layout {
            BookStackLayout::Unshelved => Ok((self.books().await?, true)),
            BookStackLayout::Shelf(shelf_id) => {
                let shelf: Shelf = self
                    .http
                    .get_json(&format!("/api/shelves/{shelf_id}"), &[])
                    .await
                    .map_err(|e| FetchError::before_listing("bookstack shelf", e))?;
                let on_shelf: HashSet<u64> = shelf.books.iter().map(|b| b.id).collect();
                let books = self.books().await?;
                Ok((books.into_iter().filter(|b| on_shelf.contains(&b.id)).collect(), true))
            }
            BookStackLayout::Book(book_id) => {
                let book: BookRow = self
                    .http
                    .get_json(&format!("/api/books/{book_id}"), &[])
                    .await
                    .map_err(|e| FetchError::before_listing("bookstack book", e))?;
                Ok((vec![book], false))
            }
        }
    }

    /// `(kind, id) → tag value` for every record carrying the ref tag.
    async fn external_refs(&self) -> Result<HashMap<BookStackId, String>, FetchError> {
        let Some(tag) = self.external_tag.as_deref() else {
            return Ok(HashMap::new());
        };
        let hits = fetch_all(&TagSearch { http: &self.http, tag }, self.page_size).await?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let value = hit.tags.into_iter().find(|t| t.name.eq_ignore_ascii_case(tag))?.value;
                let id = match hit.kind.as_str() {
                    "book" => BookStackId::Book(hit.id),
                    "chapter" => BookStackId::Chapter(hit.id),
                    "page" => BookStackId::Page(hit.id),
                    _ => return None,
                };
                Some((id, value))
            })
            .collect())
    }

    /// Book a sub-container goes into, flattening chapter parents.
    async fn book_for(&self, parent: Option<&str>) -> Result<u64, ConnectorError> {
        let parent = parent.ok_or_else(|| ConnectorError::unknown("a chapter needs a parent book"))?;
        match parent.parse::<BookStackId>()? {
            BookStackId::Book(id) => Ok(id),
            BookStackId::Chapter(id) => {
                let chapter: ChapterRow = self.http.get_json(&format!("/api/chapters/{id}"), &[]).await?;
                warn!(
                    chapter = id,
                    book = chapter.book_id,
                    "Chapters cannot nest; placing sub-chapter in the parent chapter's book"
                );
                Ok(chapter.book_id)
            }
            BookStackId::Page(_) => Err(ConnectorError::unknown(format!("{parent} cannot contain a chapter"))),
        }
    }

    /// JSON field placing a page under `parent`.
    fn page_location(parent: Option<&str>) -> Result<(&'static str, u64), ConnectorError> {
        let parent = parent.ok_or_else(|| ConnectorError::unknown("a page needs a parent book or chapter"))?;
        match parent.parse::<BookStackId>()? {
            BookStackId::Book(id) => Ok(("book_id", id)),
            BookStackId::Chapter(id) => Ok(("chapter_id", id)),
            BookStackId::Page(_) => Err(ConnectorError::unknown(format!("{parent} cannot contain a page"))),
        }
    }

    fn tags(&self, payload: &EntityPayload) -> Option<Value> {
        let tag = self.external_tag.as_deref()?;
        let value = payload.external_ref.as_deref()?;
        Some(json!([{ "name": tag, "value": value }]))
    }

    async fn add_to_shelf(&self, shelf_id: u64, book_id: u64) -> Result<(), ConnectorError> {
        let path = format!("/api/shelves/{shelf_id}");
        let shelf: Shelf = self.http.get_json(&path, &[]).await?;
        let mut books: Vec<u64> = shelf.books.iter().map(|b| b.id).collect();
        if !books.contains(&book_id) {
            books.push(book_id);
        }
        let _: Value = self.http.send_json(Method::PUT, &path, &json!({ "books": books })).await?;
        debug!(shelf = shelf_id, book = book_id, "Placed book on shelf");
        Ok(())
    }

    // ---- Prune support -----------------------------------------------------

    /// Chapters, optionally restricted to one book.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if any page fails.
    pub async fn list_chapters(&self, book: Option<u64>) -> Result<Vec<ChapterInfo>, FetchError> {
        Ok(self
            .chapter_rows(book)
            .await?
            .into_iter()
            .map(|c| ChapterInfo {
                id: c.id,
                name: c.name,
                book_id: c.book_id,
            })
            .collect())
    }

    /// Non-draft pages, optionally restricted to one book, de-duplicated by id.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if any page fails.
    pub async fn list_pages(&self, book: Option<u64>) -> Result<Vec<PageInfo>, FetchError> {
        Ok(self.page_rows(book).await?.into_iter().map(PageRow::into_info).collect())
    }

    /// A page with its HTML and markdown content.
    ///
    /// # Errors
    ///
    /// Returns a classified [`ConnectorError`] if the request fails.
    pub async fn page_detail(&self, id: u64) -> Result<PageInfo, ConnectorError> {
        let row: PageRow = self.http.get_json(&BookStackId::Page(id).path(), &[]).await?;
        Ok(row.into_info())
    }

    /// # Errors
    ///
    /// Returns a classified [`ConnectorError`] if the request fails.
    pub async fn delete_chapter(&self, id: u64) -> Result<(), ConnectorError> {
        self.http.delete(&BookStackId::Chapter(id).path()).await
    }

    /// # Errors
    ///
    /// Returns a classified [`ConnectorError`] if the request fails.
    pub async fn delete_page(&self, id: u64) -> Result<(), ConnectorError> {
        self.http.delete(&BookStackId::Page(id).path()).await
    }
}

impl TargetConnector for BookStackTarget {
    fn scope_label(&self) -> String {
        match self.layout {
            BookStackLayout::Unshelved => "bookstack:books".to_string(),
            BookStackLayout::Shelf(id) => format!("bookstack:shelf/{id}"),
            BookStackLayout::Book(id) => format!("bookstack:book/{id}"),
        }
    }

    async fn list_entities(&self) -> Result<Vec<TargetEntity>, FetchError> {
        let (books, books_are_targets) = self.scope_books().await?;
        let in_scope: HashSet<u64> = books.iter().map(|b| b.id).collect();
        let single = match books.as_slice() {
            [only] => Some(only.id),
            _ => None,
        };
        let chapters = self.chapter_rows(single).await?;
        let pages = self.page_rows(single).await?;
        let refs = self.external_refs().await?;
        let stored = |id: BookStackId| refs.get(&id).cloned();

        let mut entities = Vec::with_capacity(books.len() + chapters.len() + pages.len());
        if books_are_targets {
            for book in books {
                let id = BookStackId::Book(book.id);
                entities.push(TargetEntity {
                    target_id: id.to_string(),
                    title: book.name,
                    body: book.description,
                    stored_external_ref: stored(id),
                    container_id: None,
                    role: Some(Role::RootContainer),
                    created_at: book.created_at,
                });
            }
        }
        for chapter in chapters.into_iter().filter(|c| in_scope.contains(&c.book_id)) {
            let id = BookStackId::Chapter(chapter.id);
            entities.push(TargetEntity {
                target_id: id.to_string(),
                title: chapter.name,
                body: chapter.description,
                stored_external_ref: stored(id),
                container_id: Some(BookStackId::Book(chapter.book_id).to_string()),
                role: Some(Role::SubContainer),
                created_at: chapter.created_at,
            });
        }
        for page in pages.into_iter().filter(|p| in_scope.contains(&p.book_id)) {
            let id = BookStackId::Page(page.id);
            let container = page
                .chapter()
                .map_or(BookStackId::Book(page.book_id), BookStackId::Chapter);
            entities.push(TargetEntity {
                target_id: id.to_string(),
                title: page.name,
                body: String::new(),
                stored_external_ref: stored(id),
                container_id: Some(container.to_string()),
                role: Some(Role::LeafItem),
                created_at: page.created_at,
            });
        }

        tracing::info!(scope = %self.scope_label(), count = entities.len(), "Fetched BookStack records");
        Ok(entities)
    }

    async fn create_entity(&self, role: Role, parent: Option<&str>, payload: &EntityPayload) -> Result<String, ConnectorError> {
        let mut body = json!({ "name": payload.title });
        if let Some(tags) = self.tags(payload) {
            body["tags"] = tags;
        }

        let id = match role {
            Role::RootContainer => {
                body["description_html"] = Value::String(payload.body.clone());
                let created: Created = self.http.send_json(Method::POST, "/api/books", &body).await?;
                if let BookStackLayout::Shelf(shelf_id) = self.layout {
                    self.add_to_shelf(shelf_id, created.id).await?;
                }
                BookStackId::Book(created.id)
            }
            Role::SubContainer => {
                body["book_id"] = json!(self.book_for(parent).await?);
                body["description_html"] = Value::String(payload.body.clone());
                let created: Created = self.http.send_json(Method::POST, "/api/chapters", &body).await?;
                BookStackId::Chapter(created.id)
            }
            Role::LeafItem => {
                let (field, container) = Self::page_location(parent)?;
                body[field] = json!(container);
                body["html"] = Value::String(page_html(&payload.body));
                let created: Created = self.http.send_json(Method::POST, "/api/pages", &body).await?;
                BookStackId::Page(created.id)
            }
        };
        debug!(id = %id, parent = ?parent, "Created BookStack record");
        Ok(id.to_string())
    }

    async fn update_entity(&self, target_id: &str, payload: &EntityPayload) -> Result<(), ConnectorError> {
        let id: BookStackId = target_id.parse()?;
        let mut body = json!({ "name": payload.title });
        match id {
            BookStackId::Page(_) => body["html"] = Value::String(page_html(&payload.body)),
            BookStackId::Book(_) | BookStackId::Chapter(_) => {
                body["description_html"] = Value::String(payload.body.clone());
            }
        }
        if let Some(tags) = self.tags(payload) {
            body["tags"] = tags;
        }
        let _: Value = self.http.send_json(Method::PUT, &id.path(), &body).await?;
        Ok(())
    }

    async fn set_parent(&self, target_id: &str, parent: &str) -> Result<(), ConnectorError> {
        let id: BookStackId = target_id.parse()?;
        let body = match id {
            BookStackId::Page(_) => {
                let (field, container) = Self::page_location(Some(parent))?;
                let mut body = json!({});
                body[field] = json!(container);
                body
            }
            BookStackId::Chapter(_) => json!({ "book_id": self.book_for(Some(parent)).await? }),
            BookStackId::Book(_) => {
                return Err(ConnectorError::unknown(format!("{target_id} is a book and has no parent")));
            }
        };
        let _: Value = self.http.send_json(Method::PUT, &id.path(), &body).await?;
        Ok(())
    }

    fn effective_container(&self, role: Role, parent: &str, container_of: &dyn Fn(&str) -> Option<String>) -> String {
        match (role, parent.parse::<BookStackId>()) {
            (Role::SubContainer, Ok(BookStackId::Chapter(_))) => container_of(parent).unwrap_or_else(|| parent.to_string()),
            _ => parent.to_string(),
        }
    }
}

fn page_html(body: &str) -> String {
    if body.trim().is_empty() {
        EMPTY_PAGE_HTML.to_string()
    } else {
        body.to_string()
    }
}
