//! Static value mapping from issue-tracker names to work-package names.
//!
//! Two-tier resolution: exact name → case-insensitive name → fallback.
//! Unknown source values never fail a write; they fall back to the
//! target's default (`Task`, `New`, `Normal`).

use std::collections::HashMap;
use std::sync::LazyLock;

// ── Name maps (Jira → OpenProject) ───────────────────────────

pub static TYPE_MAPPING: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("Task", "Task"),
        ("Story", "User story"),
        ("Bug", "Bug"),
        ("Epic", "Epic"),
        ("Feature", "Feature"),
        ("Milestone", "Milestone"),
        ("Sub-task", "Task"),
        ("Subtask", "Task"),
    ]
    .into_iter()
    .collect()
});

pub static STATUS_MAPPING: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("To Do", "New"),
        ("Backlog", "New"),
        ("In Progress", "In progress"),
        ("Done", "Closed"),
        ("Closed", "Closed"),
        ("Resolved", "Closed"),
    ]
    .into_iter()
    .collect()
});

pub static PRIORITY_MAPPING: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("Highest", "Immediate"),
        ("High", "High"),
        ("Medium", "Normal"),
        ("Low", "Low"),
        ("Lowest", "Low"),
    ]
    .into_iter()
    .collect()
});

pub const DEFAULT_TYPE: &str = "Task";
pub const DEFAULT_STATUS: &str = "New";
pub const DEFAULT_PRIORITY: &str = "Normal";

/// Name of the work-package type used for root containers.
pub const EPIC_TYPE: &str = "Epic";

fn lookup(map: &HashMap<&str, &'static str>, input: &str) -> Option<&'static str> {
    let input = input.trim();
    map.get(input).copied().or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(input))
            .map(|(_, v)| *v)
    })
}

/// Target type name for a source issue type.
#[must_use]
pub fn map_type(source_type: &str) -> &'static str {
    lookup(&TYPE_MAPPING, source_type).unwrap_or(DEFAULT_TYPE)
}

/// Target status name for a source status.
#[must_use]
pub fn map_status(source_status: Option<&str>) -> &'static str {
    source_status
        .and_then(|s| lookup(&STATUS_MAPPING, s))
        .unwrap_or(DEFAULT_STATUS)
}

/// Target priority name for a source priority.
#[must_use]
pub fn map_priority(source_priority: Option<&str>) -> &'static str {
    source_priority
        .and_then(|p| lookup(&PRIORITY_MAPPING, p))
        .unwrap_or(DEFAULT_PRIORITY)
}

/// Resolve a target name to its id in a fetched catalog (`name → id`).
///
/// Falls back to the lowest id when the name is unknown so that a write is
/// never rejected over metadata; returns `None` only for an empty catalog.
#[must_use]
pub fn resolve_id(catalog: &HashMap<String, u64>, name: &str) -> Option<u64> {
    catalog
        .get(name)
        .copied()
        .or_else(|| {
            catalog
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| *v)
        })
        .or_else(|| {
            let fallback = catalog.values().min().copied();
            if fallback.is_some() {
                tracing::warn!(name, "Not found in target catalog; using default");
            }
            fallback
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping() {
        assert_eq!(map_type("Story"), "User story");
        assert_eq!(map_type("sub-task"), "Task");
        assert_eq!(map_type("Spike"), DEFAULT_TYPE);
    }

    #[test]
    fn test_status_and_priority_defaults() {
        assert_eq!(map_status(Some("In Progress")), "In progress");
        assert_eq!(map_status(Some("Weird")), DEFAULT_STATUS);
        assert_eq!(map_status(None), DEFAULT_STATUS);
        assert_eq!(map_priority(Some("Highest")), "Immediate");
        assert_eq!(map_priority(None), DEFAULT_PRIORITY);
    }

    #[test]
    fn test_resolve_id() {
        let catalog: HashMap<String, u64> = [("Task".to_string(), 1), ("Epic".to_string(), 5), ("Bug".to_string(), 7)]
            .into_iter()
            .collect();
        assert_eq!(resolve_id(&catalog, "Epic"), Some(5));
        assert_eq!(resolve_id(&catalog, "epic"), Some(5));
        assert_eq!(resolve_id(&catalog, "User story"), Some(1));
        assert_eq!(resolve_id(&HashMap::new(), "Task"), None);
    }
}
