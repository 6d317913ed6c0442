//! In-memory connectors.
//!
//! Both sides page through the same [`Paginator`](crate::sync::Paginator)
//! as the HTTP connectors, so tests exercise the real fetch path. The target
//! records every write call and can be told to fail specific writes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::connector::{SourceConnector, TargetConnector};
use crate::error::{ConnectorError, ConnectorErrorKind};
use crate::model::{EntityPayload, Role, SourceEntity, TargetEntity};
use crate::sync::fetch::{DEFAULT_PAGE_SIZE, FetchError, Page, PageRequest, PageSource, fetch_all};

/// Offset-paginated view over a slice, reporting a total like most REST APIs.
struct SlicePages<'a, T> {
    label: &'a str,
    items: &'a [T],
    /// Fail every page request from this index on.
    fail_from_page: Option<(usize, ConnectorErrorKind)>,
}

impl<T: Clone + Send + Sync> PageSource for SlicePages<'_, T> {
    type Item = T;

    fn label(&self) -> &str {
        self.label
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page<T>, ConnectorError> {
        if let Some((page, kind)) = self.fail_from_page {
            if request.index >= page {
                return Err(ConnectorError::new(kind, format!("injected failure on page {}", request.index)));
            }
        }
        let start = request.offset.min(self.items.len());
        let end = (start + request.size).min(self.items.len());
        Ok(Page::inferred(self.items[start..end].to_vec(), Some(self.items.len())))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Source
// ============================================================================

/// Source connector over a fixed entity list.
#[derive(Debug, Clone)]
pub struct MemorySource {
    scope: String,
    entities: Vec<SourceEntity>,
    page_size: usize,
    fail_from_page: Option<(usize, ConnectorErrorKind)>,
}

impl MemorySource {
    pub fn new(scope: impl Into<String>, entities: Vec<SourceEntity>) -> Self {
        Self {
            scope: scope.into(),
            entities,
            page_size: DEFAULT_PAGE_SIZE,
            fail_from_page: None,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Fail every page request from `page` (zero-based) on.
    #[must_use]
    pub fn failing_from_page(mut self, page: usize, kind: ConnectorErrorKind) -> Self {
        self.fail_from_page = Some((page, kind));
        self
    }
}

impl SourceConnector for MemorySource {
    fn scope_label(&self) -> String {
        format!("memory:{}", self.scope)
    }

    async fn list_entities(&self) -> Result<Vec<SourceEntity>, FetchError> {
        let pages = SlicePages {
            label: "memory source",
            items: &self.entities,
            fail_from_page: self.fail_from_page,
        };
        fetch_all(&pages, self.page_size).await
    }
}

// ============================================================================
// Target
// ============================================================================

/// A write call received by [`MemoryTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    Create {
        role: Role,
        parent: Option<String>,
        title: String,
    },
    Update {
        target_id: String,
    },
    SetParent {
        target_id: String,
        parent: String,
    },
}

#[derive(Debug, Default)]
struct TargetState {
    entities: Vec<TargetEntity>,
    next_id: usize,
    calls: Vec<WriteCall>,
    /// Writes for these titles fail with the given kind.
    failures: HashMap<String, ConnectorErrorKind>,
}

/// Target connector holding its records in memory.
#[derive(Debug)]
pub struct MemoryTarget {
    scope: String,
    page_size: usize,
    state: Mutex<TargetState>,
}

impl MemoryTarget {
    pub fn new(scope: impl Into<String>) -> Self {
        Self::with_entities(scope, Vec::new())
    }

    pub fn with_entities(scope: impl Into<String>, entities: Vec<TargetEntity>) -> Self {
        let next_id = entities.len() + 1;
        Self {
            scope: scope.into(),
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(TargetState {
                entities,
                next_id,
                ..TargetState::default()
            }),
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Make every write for a record titled `title` fail with `kind`.
    pub fn fail_writes_for(&self, title: impl Into<String>, kind: ConnectorErrorKind) {
        lock(&self.state).failures.insert(title.into(), kind);
    }

    /// Current records.
    #[must_use]
    pub fn entities(&self) -> Vec<TargetEntity> {
        lock(&self.state).entities.clone()
    }

    /// Write calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<WriteCall> {
        lock(&self.state).calls.clone()
    }

    fn check_failure(state: &TargetState, title: &str) -> Result<(), ConnectorError> {
        match state.failures.get(title) {
            Some(kind) => Err(ConnectorError::new(*kind, format!("injected failure for '{title}'"))),
            None => Ok(()),
        }
    }
}

impl TargetConnector for MemoryTarget {
    fn scope_label(&self) -> String {
        format!("memory:{}", self.scope)
    }

    async fn list_entities(&self) -> Result<Vec<TargetEntity>, FetchError> {
        let snapshot = self.entities();
        let pages = SlicePages {
            label: "memory target",
            items: &snapshot,
            fail_from_page: None,
        };
        fetch_all(&pages, self.page_size).await
    }

    async fn create_entity(&self, role: Role, parent: Option<&str>, payload: &EntityPayload) -> Result<String, ConnectorError> {
        let mut state = lock(&self.state);
        state.calls.push(WriteCall::Create {
            role,
            parent: parent.map(str::to_string),
            title: payload.title.clone(),
        });
        Self::check_failure(&state, &payload.title)?;

        if let Some(parent) = parent {
            if !state.entities.iter().any(|e| e.target_id == parent) {
                return Err(ConnectorError::not_found(format!("parent {parent} does not exist")));
            }
        }

        let target_id = format!("mem-{}", state.next_id);
        state.next_id += 1;
        let mut entity = TargetEntity::new(&target_id, &payload.title).with_role(role);
        entity.body.clone_from(&payload.body);
        entity.stored_external_ref.clone_from(&payload.external_ref);
        entity.container_id = parent.map(str::to_string);
        entity.created_at = Some(chrono::Utc::now());
        state.entities.push(entity);
        Ok(target_id)
    }

    async fn update_entity(&self, target_id: &str, payload: &EntityPayload) -> Result<(), ConnectorError> {
        let mut state = lock(&self.state);
        state.calls.push(WriteCall::Update {
            target_id: target_id.to_string(),
        });
        Self::check_failure(&state, &payload.title)?;

        let entity = state
            .entities
            .iter_mut()
            .find(|e| e.target_id == target_id)
            .ok_or_else(|| ConnectorError::not_found(format!("record {target_id} does not exist")))?;
        entity.title.clone_from(&payload.title);
        entity.body.clone_from(&payload.body);
        if payload.external_ref.is_some() {
            entity.stored_external_ref.clone_from(&payload.external_ref);
        }
        Ok(())
    }

    async fn set_parent(&self, target_id: &str, parent: &str) -> Result<(), ConnectorError> {
        let mut state = lock(&self.state);
        state.calls.push(WriteCall::SetParent {
            target_id: target_id.to_string(),
            parent: parent.to_string(),
        });
        let idx = state
            .entities
            .iter()
            .position(|e| e.target_id == target_id)
            .ok_or_else(|| ConnectorError::not_found(format!("record {target_id} does not exist")))?;
        Self::check_failure(&state, &state.entities[idx].title)?;
        state.entities[idx].container_id = Some(parent.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_source_pages_through_everything() {
        let entities: Vec<SourceEntity> = (0..25)
            .map(|i| SourceEntity::new(format!("K-{i}"), format!("Issue {i}"), "Task"))
            .collect();
        let source = MemorySource::new("K", entities).with_page_size(10);
        let listed = source.list_entities().await.unwrap();
        assert_eq!(listed.len(), 25);
        assert_eq!(listed[24].external_id, "K-24");
    }

    #[tokio::test]
    async fn test_source_failure_reports_partial_count() {
        let entities: Vec<SourceEntity> = (0..25)
            .map(|i| SourceEntity::new(format!("K-{i}"), "t", "Task"))
            .collect();
        let source = MemorySource::new("K", entities)
            .with_page_size(10)
            .failing_from_page(2, ConnectorErrorKind::Transient);
        let err = source.list_entities().await.unwrap_err();
        assert_eq!(err.fetched, 20);
        assert_eq!(err.pages, 2);
    }

    #[tokio::test]
    async fn test_target_create_stores_ref_and_parent() {
        let target = MemoryTarget::new("P");
        let payload = EntityPayload {
            title: "Epic".into(),
            body: String::new(),
            kind: "Epic".into(),
            status: None,
            priority: None,
            external_ref: Some("E1".into()),
        };
        let epic = target.create_entity(Role::RootContainer, None, &payload).await.unwrap();
        let child = EntityPayload {
            title: "Task".into(),
            external_ref: Some("T1".into()),
            ..payload
        };
        target.create_entity(Role::LeafItem, Some(&epic), &child).await.unwrap();

        let listed = target.list_entities().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].external_ref(), Some("E1"));
        assert_eq!(listed[1].container_id.as_deref(), Some(epic.as_str()));
        assert_eq!(target.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_target_injected_failure() {
        let target = MemoryTarget::new("P");
        target.fail_writes_for("Broken", ConnectorErrorKind::Transient);
        let payload = EntityPayload {
            title: "Broken".into(),
            body: String::new(),
            kind: "Task".into(),
            status: None,
            priority: None,
            external_ref: None,
        };
        let err = target.create_entity(Role::LeafItem, None, &payload).await.unwrap_err();
        assert_eq!(err.kind, ConnectorErrorKind::Transient);
        assert!(target.entities().is_empty());
    }
}
