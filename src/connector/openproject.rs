//! OpenProject target connector (API v3, HAL+JSON).
//!
//! Work packages are listed with offset paging filtered to one project.
//! Type, status and priority names are translated through [`crate::mapping`]
//! and resolved to ids from catalogs fetched once per connector.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;
use tracing::debug;

use super::TargetConnector;
use super::http::{Auth, HttpClient};
use crate::config::OpenProjectSettings;
use crate::error::ConnectorError;
use crate::mapping::{self, EPIC_TYPE};
use crate::model::{EntityPayload, Role, TargetEntity};
use crate::sync::fetch::{DEFAULT_PAGE_SIZE, FetchError, Page, PageRequest, PageSource, fetch_all};

const API: &str = "/api/v3";

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct Collection<T> {
    total: Option<usize>,
    #[serde(rename = "_embedded")]
    embedded: Embedded<T>,
}

#[derive(Debug, Deserialize)]
struct Embedded<T> {
    #[serde(default = "Vec::new")]
    elements: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkPackage {
    id: u64,
    #[serde(default)]
    subject: String,
    description: Option<Formattable>,
    created_at: Option<DateTime<Utc>>,
    #[serde(rename = "_links", default)]
    links: WorkPackageLinks,
    /// Custom fields and everything else we don't model.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Formattable {
    raw: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkPackageLinks {
    #[serde(rename = "type")]
    kind: Option<Link>,
    parent: Option<Link>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Link {
    href: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockVersion {
    lock_version: u64,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: u64,
    name: String,
}

/// Last path segment of a HAL href (`/api/v3/work_packages/12` → `12`).
fn href_id(href: &str) -> Option<&str> {
    href.rsplit('/').next().filter(|s| !s.is_empty())
}

impl WorkPackage {
    fn type_name(&self) -> Option<&str> {
        self.links.kind.as_ref().and_then(|l| l.title.as_deref())
    }

    fn into_entity(self, ref_field: Option<&str>) -> TargetEntity {
        let stored_external_ref = ref_field
            .and_then(|field| self.extra.get(field))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        let container_id = self
            .links
            .parent
            .as_ref()
            .and_then(|l| l.href.as_deref())
            .and_then(href_id)
            .map(str::to_string);

        TargetEntity {
            target_id: self.id.to_string(),
            title: self.subject,
            body: self.description.and_then(|d| d.raw).unwrap_or_default(),
            stored_external_ref,
            container_id,
            role: None,
            created_at: self.created_at,
        }
    }
}

// ============================================================================
// Paging
// ============================================================================

struct WorkPackagePages<'a> {
    http: &'a HttpClient,
    filters: String,
}

impl PageSource for WorkPackagePages<'_> {
    type Item = WorkPackage;

    fn label(&self) -> &str {
        "openproject work packages"
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page<WorkPackage>, ConnectorError> {
        // OpenProject's `offset` is a one-based page number.
        let query = [
            ("offset", request.page_number().to_string()),
            ("pageSize", request.size.to_string()),
            ("filters", self.filters.clone()),
            ("sortBy", r#"[["id","asc"]]"#.to_string()),
        ];
        let page: Collection<WorkPackage> = self.http.get_json(&format!("{API}/work_packages"), &query).await?;
        Ok(Page::inferred(page.embedded.elements, page.total))
    }
}

// ============================================================================
// Connector
// ============================================================================

#[derive(Debug, Default)]
struct Catalogs {
    types: HashMap<String, u64>,
    statuses: HashMap<String, u64>,
    priorities: HashMap<String, u64>,
}

/// Work packages of one OpenProject project.
#[derive(Debug)]
pub struct OpenProjectTarget {
    http: HttpClient,
    project_id: u64,
    ref_field: Option<String>,
    page_size: usize,
    catalogs: OnceCell<Catalogs>,
}

impl OpenProjectTarget {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &OpenProjectSettings) -> Result<Self, ConnectorError> {
        let http = HttpClient::new(
            &settings.host,
            Auth::Basic {
                user: "apikey".to_string(),
                password: settings.api_key.clone(),
            },
        )?;
        Ok(Self::with_client(http, settings.project_id, settings.external_ref_field.clone()))
    }

    #[must_use]
    pub fn with_client(http: HttpClient, project_id: u64, ref_field: Option<String>) -> Self {
        Self {
            http,
            project_id,
            ref_field,
            page_size: DEFAULT_PAGE_SIZE,
            catalogs: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Whether records carry the source key in a custom field.
    #[must_use]
    pub const fn stores_external_ref(&self) -> bool {
        self.ref_field.is_some()
    }

    async fn work_packages(&self) -> Result<Vec<WorkPackage>, FetchError> {
        let filters = json!([{"project": {"operator": "=", "values": [self.project_id.to_string()]}}]).to_string();
        let pages = WorkPackagePages {
            http: &self.http,
            filters,
        };
        fetch_all(&pages, self.page_size).await
    }

    /// Work packages whose type is Epic.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if any page fails.
    pub async fn list_epics(&self) -> Result<Vec<TargetEntity>, FetchError> {
        let ref_field = self.ref_field.as_deref();
        Ok(self
            .work_packages()
            .await?
            .into_iter()
            .filter(|wp| wp.type_name().is_some_and(|t| t.eq_ignore_ascii_case(EPIC_TYPE)))
            .map(|wp| wp.into_entity(ref_field))
            .collect())
    }

    async fn catalog(&self, name: &str) -> Result<HashMap<String, u64>, ConnectorError> {
        let collection: Collection<CatalogEntry> = self.http.get_json(&format!("{API}/{name}"), &[]).await?;
        Ok(collection.embedded.elements.into_iter().map(|e| (e.name, e.id)).collect())
    }

    async fn catalogs(&self) -> Result<&Catalogs, ConnectorError> {
        self.catalogs
            .get_or_try_init(|| async {
                let catalogs = Catalogs {
                    types: self.catalog("types").await?,
                    statuses: self.catalog("statuses").await?,
                    priorities: self.catalog("priorities").await?,
                };
                debug!(
                    types = catalogs.types.len(),
                    statuses = catalogs.statuses.len(),
                    priorities = catalogs.priorities.len(),
                    "Loaded OpenProject catalogs"
                );
                Ok::<_, ConnectorError>(catalogs)
            })
            .await
    }

    async fn lock_version(&self, id: &str) -> Result<u64, ConnectorError> {
        let wp: LockVersion = self.http.get_json(&format!("{API}/work_packages/{id}"), &[]).await?;
        Ok(wp.lock_version)
    }

    fn content_fields(&self, payload: &EntityPayload, body: &mut Map<String, Value>) {
        body.insert("subject".into(), Value::String(payload.title.clone()));
        body.insert("description".into(), json!({"format": "markdown", "raw": payload.body}));
        if let (Some(field), Some(external_ref)) = (&self.ref_field, &payload.external_ref) {
            body.insert(field.clone(), Value::String(external_ref.clone()));
        }
    }
}

fn href(kind: &str, id: u64) -> Value {
    json!({ "href": format!("{API}/{kind}/{id}") })
}

impl TargetConnector for OpenProjectTarget {
    fn scope_label(&self) -> String {
        format!("openproject:project/{}", self.project_id)
    }

    async fn list_entities(&self) -> Result<Vec<TargetEntity>, FetchError> {
        let ref_field = self.ref_field.as_deref();
        let entities: Vec<TargetEntity> = self
            .work_packages()
            .await?
            .into_iter()
            .map(|wp| wp.into_entity(ref_field))
            .collect();
        tracing::info!(project = self.project_id, count = entities.len(), "Fetched work packages");
        Ok(entities)
    }

    async fn create_entity(&self, role: Role, parent: Option<&str>, payload: &EntityPayload) -> Result<String, ConnectorError> {
        let catalogs = self.catalogs().await?;
        let type_name = mapping::map_type(&payload.kind);
        let status_name = mapping::map_status(payload.status.as_deref());
        let priority_name = mapping::map_priority(payload.priority.as_deref());

        let mut links = Map::new();
        links.insert("project".into(), href("projects", self.project_id));
        if let Some(id) = mapping::resolve_id(&catalogs.types, type_name) {
            links.insert("type".into(), href("types", id));
        }
        if let Some(id) = mapping::resolve_id(&catalogs.statuses, status_name) {
            links.insert("status".into(), href("statuses", id));
        }
        if let Some(id) = mapping::resolve_id(&catalogs.priorities, priority_name) {
            links.insert("priority".into(), href("priorities", id));
        }
        if let Some(parent) = parent {
            links.insert("parent".into(), json!({ "href": format!("{API}/work_packages/{parent}") }));
        }

        let mut body = Map::new();
        body.insert("_type".into(), Value::String("WorkPackage".into()));
        self.content_fields(payload, &mut body);
        body.insert("_links".into(), Value::Object(links));

        let created: Created = self
            .http
            .send_json(Method::POST, &format!("{API}/work_packages"), &body)
            .await?;
        debug!(id = created.id, %role, kind = type_name, "Created work package");
        Ok(created.id.to_string())
    }

    async fn update_entity(&self, target_id: &str, payload: &EntityPayload) -> Result<(), ConnectorError> {
        let lock_version = self.lock_version(target_id).await?;
        let mut body = Map::new();
        body.insert("lockVersion".into(), json!(lock_version));
        self.content_fields(payload, &mut body);
        let _: Value = self
            .http
            .send_json(Method::PATCH, &format!("{API}/work_packages/{target_id}"), &body)
            .await?;
        Ok(())
    }

    async fn set_parent(&self, target_id: &str, parent: &str) -> Result<(), ConnectorError> {
        let lock_version = self.lock_version(target_id).await?;
        let body = json!({
            "lockVersion": lock_version,
            "_links": {"parent": {"href": format!("{API}/work_packages/{parent}")}}
        });
        let _: Value = self
            .http
            .send_json(Method::PATCH, &format!("{API}/work_packages/{target_id}"), &body)
            .await?;
        Ok(())
    }
}
