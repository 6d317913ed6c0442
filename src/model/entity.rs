//! Source and target record snapshots.
//!
//! Both types are read-only snapshots taken at fetch time and dropped at the
//! end of a run. They are plain data: connectors build them, the sync engine
//! only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::role::Role;

/// One record to migrate, as fetched from the source system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntity {
    /// Stable identifier in the source system (Jira key, Confluence page id).
    pub external_id: String,

    /// Summary or page title.
    pub title: String,

    /// Content body. Opaque to the engine.
    pub body: String,

    /// Issue type or page type name in the source system.
    pub kind: String,

    /// Parent record in the source system, absent for roots.
    pub parent_external_id: Option<String>,

    /// Author reference (display name or account id).
    pub created_by: Option<String>,

    /// Source status name, mapped by the target connector.
    pub status: Option<String>,

    /// Source priority name, mapped by the target connector.
    pub priority: Option<String>,

    pub created_at: Option<DateTime<Utc>>,
}

impl SourceEntity {
    /// Create a root entity with an empty body.
    pub fn new(external_id: impl Into<String>, title: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            body: String::new(),
            kind: kind.into(),
            parent_external_id: None,
            created_by: None,
            status: None,
            priority: None,
            created_at: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_external_id = Some(parent.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.created_by = Some(author.into());
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Parent id, treating empty strings as absent.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent_external_id.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// One record already present in the target system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntity {
    /// Target system identifier. Connectors may prefix it with a type
    /// (`book:12`) when ids are only unique per collection.
    pub target_id: String,

    pub title: String,

    pub body: String,

    /// Source external id stored on the record, if the target has a field
    /// (custom field, tag) configured for it.
    pub stored_external_ref: Option<String>,

    /// Enclosing container (book, chapter, parent work package).
    pub container_id: Option<String>,

    /// Hierarchy role when the target's record type implies one.
    pub role: Option<Role>,

    pub created_at: Option<DateTime<Utc>>,
}

impl TargetEntity {
    pub fn new(target_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            title: title.into(),
            body: String::new(),
            stored_external_ref: None,
            container_id: None,
            role: None,
            created_at: None,
        }
    }

    #[must_use]
    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.stored_external_ref = Some(external_ref.into());
        self
    }

    #[must_use]
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container_id = Some(container.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Stored external reference, treating blank values as absent.
    #[must_use]
    pub fn external_ref(&self) -> Option<&str> {
        self.stored_external_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

/// Write payload handed to a target connector on create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityPayload {
    pub title: String,
    pub body: String,
    pub kind: String,
    pub status: Option<String>,
    pub priority: Option<String>,
    /// Source id to store on the target record; `None` when the target has
    /// no external reference field configured.
    pub external_ref: Option<String>,
}

impl EntityPayload {
    /// Build the payload for a source entity.
    #[must_use]
    pub fn from_source(source: &SourceEntity, store_external_ref: bool) -> Self {
        Self {
            title: source.title.clone(),
            body: source.body.clone(),
            kind: source.kind.clone(),
            status: source.status.clone(),
            priority: source.priority.clone(),
            external_ref: store_external_ref.then(|| source.external_id.clone()),
        }
    }
}
