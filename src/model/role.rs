//! Hierarchy roles.
//!
//! Roles are depth-derived positions in the target hierarchy. The generic
//! set is fixed; each target domain gives them concrete names.

use serde::{Deserialize, Serialize};

/// Derived position of a node in the target hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Top-level container (Book, Epic).
    RootContainer,
    /// Nested container (Chapter).
    SubContainer,
    /// Content record (Page, child work package).
    LeafItem,
}

impl Role {
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::RootContainer | Self::SubContainer)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RootContainer => "root_container",
            Self::SubContainer => "sub_container",
            Self::LeafItem => "leaf_item",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target domain, used to name roles for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Issue tracker → work packages (Epic / child).
    WorkPackages,
    /// Wiki space → documentation (Shelf / Book / Chapter / Page).
    Documentation,
}

impl Domain {
    /// Concrete label of a role in this domain.
    #[must_use]
    pub const fn label(&self, role: Role) -> &'static str {
        match (self, role) {
            (Self::WorkPackages, Role::RootContainer) => "Epic",
            (Self::WorkPackages, Role::SubContainer) => "Parent",
            (Self::WorkPackages, Role::LeafItem) => "Child",
            (Self::Documentation, Role::RootContainer) => "Book",
            (Self::Documentation, Role::SubContainer) => "Chapter",
            (Self::Documentation, Role::LeafItem) => "Page",
        }
    }

    /// Label of the scope-level container, if the domain has one.
    #[must_use]
    pub const fn scope_label(&self) -> Option<&'static str> {
        match self {
            Self::WorkPackages => None,
            Self::Documentation => Some("Shelf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_roles() {
        assert!(Role::RootContainer.is_container());
        assert!(Role::SubContainer.is_container());
        assert!(!Role::LeafItem.is_container());
    }

    #[test]
    fn test_domain_labels() {
        assert_eq!(Domain::Documentation.label(Role::SubContainer), "Chapter");
        assert_eq!(Domain::WorkPackages.label(Role::RootContainer), "Epic");
        assert_eq!(Domain::Documentation.scope_label(), Some("Shelf"));
    }
}
