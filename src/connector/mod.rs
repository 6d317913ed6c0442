//! Platform connectors.
//!
//! A connector owns everything platform-specific: authentication, wire
//! format, pagination parameters and rate-limit backoff. The sync engine
//! only sees the two capability traits below and the closed
//! [`ConnectorErrorKind`](crate::error::ConnectorErrorKind) failure set.
//!
//! Each connector instance is bound to one migration scope (a Jira project,
//! an OpenProject project, a Confluence space, a BookStack shelf or book).
//!
//! - [`jira`] / [`confluence`]: sources
//! - [`openproject`] / [`bookstack`]: targets
//! - [`memory`]: in-process source and target for tests and dry experiments

pub mod bookstack;
pub mod confluence;
pub mod http;
pub mod jira;
pub mod memory;
pub mod openproject;

use std::future::Future;

use crate::error::ConnectorError;
use crate::model::{EntityPayload, Role, SourceEntity, TargetEntity};
use crate::sync::FetchError;

/// Read side of a migration: the system records come from.
///
/// Implemented by Jira, Confluence and the in-memory source.
pub trait SourceConnector: Send + Sync {
    /// Label of the bound scope, e.g. `jira:ROE`.
    fn scope_label(&self) -> String;

    /// Every entity in the scope, with parent references already resolved
    /// within the scope. Pagination is handled internally.
    fn list_entities(&self) -> impl Future<Output = Result<Vec<SourceEntity>, FetchError>> + Send;
}

/// Write side of a migration.
///
/// Implemented by OpenProject, BookStack and the in-memory target. Each call
/// is atomic from the engine's point of view: it either succeeds or fails
/// with one [`ConnectorError`].
pub trait TargetConnector: Send + Sync {
    /// Label of the bound scope, e.g. `bookstack:shelf/4`.
    fn scope_label(&self) -> String;

    /// Snapshot of every entity currently in the scope.
    fn list_entities(&self) -> impl Future<Output = Result<Vec<TargetEntity>, FetchError>> + Send;

    /// Create a record with the given role under `parent` (a target id) and
    /// return its new target id.
    fn create_entity(
        &self,
        role: Role,
        parent: Option<&str>,
        payload: &EntityPayload,
    ) -> impl Future<Output = Result<String, ConnectorError>> + Send;

    /// Overwrite an existing record's content.
    fn update_entity(
        &self,
        target_id: &str,
        payload: &EntityPayload,
    ) -> impl Future<Output = Result<(), ConnectorError>> + Send;

    /// Move an existing record under another container.
    fn set_parent(&self, target_id: &str, parent: &str) -> impl Future<Output = Result<(), ConnectorError>> + Send;

    /// Container a record with `role` actually ends up in when placed under
    /// `parent`. Platforms that flatten some nestings report the flattened
    /// container here. `container_of` looks up the container of a known
    /// record.
    fn effective_container(&self, _role: Role, parent: &str, _container_of: &dyn Fn(&str) -> Option<String>) -> String {
        parent.to_string()
    }
}
