//! Two-tier matcher.
//!
//! Tier 1 looks for a target storing the source's external id and always
//! wins. Tier 2 falls back to title similarity over unclaimed targets and
//! refuses to guess: when the best two candidates are closer than the
//! separation margin the result is `Ambiguous`.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::trace;

use crate::model::{Role, SourceEntity, TargetEntity};
use crate::sync::similarity::{Similarity, SimilarityKind, TokenSortRatio};
use crate::sync::types::{Candidate, MatchResult};

/// Minimum score for a fuzzy candidate.
pub const DEFAULT_ACCEPTANCE: f64 = 0.85;

/// Minimum lead of the best candidate over the runner-up.
pub const DEFAULT_MARGIN: f64 = 0.05;

/// Near misses reported per unmatched entity.
pub const DEFAULT_NEAR_MISSES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatcherConfig {
    pub acceptance: f64,
    pub margin: f64,
    pub near_misses: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            acceptance: DEFAULT_ACCEPTANCE,
            margin: DEFAULT_MARGIN,
            near_misses: DEFAULT_NEAR_MISSES,
        }
    }
}

/// Targets sharing one stored external reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRef {
    pub external_ref: String,
    /// Earliest created first; the first id is the one that matches.
    pub target_ids: Vec<String>,
}

/// A target snapshot indexed for matching. Built once per run.
#[derive(Debug)]
pub struct TargetIndex<'a> {
    targets: &'a [TargetEntity],
    by_ref: HashMap<&'a str, Vec<usize>>,
}

impl<'a> TargetIndex<'a> {
    #[must_use]
    pub fn new(targets: &'a [TargetEntity]) -> Self {
        let mut by_ref: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (idx, target) in targets.iter().enumerate() {
            if let Some(external_ref) = target.external_ref() {
                by_ref.entry(external_ref).or_default().push(idx);
            }
        }
        for indices in by_ref.values_mut() {
            indices.sort_by(|&a, &b| creation_order(targets, a, b));
        }
        Self { targets, by_ref }
    }

    #[must_use]
    pub const fn targets(&self) -> &'a [TargetEntity] {
        self.targets
    }

    /// Target storing this external reference, earliest created first.
    #[must_use]
    pub fn by_external_ref(&self, external_ref: &str) -> Option<&'a TargetEntity> {
        let idx = *self.by_ref.get(external_ref)?.first()?;
        Some(&self.targets[idx])
    }

    /// Look up a target by id.
    #[must_use]
    pub fn get(&self, target_id: &str) -> Option<&'a TargetEntity> {
        self.targets.iter().find(|t| t.target_id == target_id)
    }

    /// External references stored on more than one target, sorted by reference.
    #[must_use]
    pub fn duplicate_refs(&self) -> Vec<DuplicateRef> {
        let mut dups: Vec<DuplicateRef> = self
            .by_ref
            .iter()
            .filter(|(_, indices)| indices.len() > 1)
            .map(|(external_ref, indices)| DuplicateRef {
                external_ref: (*external_ref).to_string(),
                target_ids: indices.iter().map(|&i| self.targets[i].target_id.clone()).collect(),
            })
            .collect();
        dups.sort_by(|a, b| a.external_ref.cmp(&b.external_ref));
        dups
    }

    /// Targets eligible for title matching against a node with `role`.
    fn unclaimed(&self, role: Option<Role>) -> impl Iterator<Item = (usize, &'a TargetEntity)> + '_ {
        self.targets.iter().enumerate().filter(move |(_, t)| {
            t.external_ref().is_none() && (t.role.is_none() || role.is_none() || t.role == role)
        })
    }
}

/// Earliest created first, unknown creation times last, then snapshot order.
fn creation_order(targets: &[TargetEntity], a: usize, b: usize) -> Ordering {
    match (targets[a].created_at, targets[b].created_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(a.cmp(&b))
}

/// Matches source entities against a fixed target snapshot.
pub struct Matcher {
    config: MatcherConfig,
    similarity: Box<dyn Similarity>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default(), Box::new(TokenSortRatio))
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("config", &self.config)
            .field("similarity", &self.similarity.name())
            .finish()
    }
}

impl Matcher {
    #[must_use]
    pub fn new(config: MatcherConfig, similarity: Box<dyn Similarity>) -> Self {
        Self { config, similarity }
    }

    #[must_use]
    pub fn with_kind(config: MatcherConfig, kind: SimilarityKind) -> Self {
        Self::new(config, kind.build())
    }

    #[must_use]
    pub const fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match one source entity against a raw target list.
    ///
    /// Convenience for one-off lookups; a run should build a
    /// [`TargetIndex`] once and call [`Matcher::match_indexed`].
    #[must_use]
    pub fn match_entity(&self, source: &SourceEntity, targets: &[TargetEntity]) -> MatchResult {
        self.match_indexed(source, None, &TargetIndex::new(targets))
    }

    /// Match one source entity. `role` restricts the fuzzy tier to targets
    /// of a compatible role; the exact tier ignores it.
    #[must_use]
    pub fn match_indexed(&self, source: &SourceEntity, role: Option<Role>, index: &TargetIndex<'_>) -> MatchResult {
        if let Some(target) = index.by_external_ref(source.external_id.trim()) {
            trace!(external_id = %source.external_id, target_id = %target.target_id, "Exact match");
            return MatchResult::ExactMatch {
                target_id: target.target_id.clone(),
            };
        }

        let mut accepted: Vec<(usize, Candidate)> = index
            .unclaimed(role)
            .filter_map(|(idx, target)| {
                let score = self.similarity.similarity(&source.title, &target.title);
                (score >= self.config.acceptance).then(|| (idx, candidate(target, score)))
            })
            .collect();
        self.rank(index.targets(), &mut accepted);

        let too_close = match accepted.as_slice() {
            [(_, best), (_, runner_up), ..] => best.score - runner_up.score < self.config.margin,
            _ => false,
        };

        let result = if too_close {
            MatchResult::Ambiguous {
                candidates: accepted.into_iter().map(|(_, c)| c).collect(),
            }
        } else if let Some((_, best)) = accepted.into_iter().next() {
            MatchResult::FuzzyMatch {
                target_id: best.target_id,
                score: best.score,
            }
        } else {
            MatchResult::NoMatch
        };
        trace!(external_id = %source.external_id, ?result, "Fuzzy tier");
        result
    }

    /// Best-scoring unclaimed targets regardless of acceptance, for
    /// reporting near misses on unmatched entities.
    #[must_use]
    pub fn closest(&self, source: &SourceEntity, role: Option<Role>, index: &TargetIndex<'_>) -> Vec<Candidate> {
        let mut scored: Vec<(usize, Candidate)> = index
            .unclaimed(role)
            .map(|(idx, target)| (idx, candidate(target, self.similarity.similarity(&source.title, &target.title))))
            .filter(|(_, c)| c.score > 0.0)
            .collect();
        self.rank(index.targets(), &mut scored);
        scored
            .into_iter()
            .take(self.config.near_misses)
            .map(|(_, c)| c)
            .collect()
    }

    /// Score descending, then earliest created, then snapshot order.
    #[allow(clippy::unused_self)]
    fn rank(&self, targets: &[TargetEntity], candidates: &mut [(usize, Candidate)]) {
        candidates.sort_by(|(ia, a), (ib, b)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| creation_order(targets, *ia, *ib))
        });
    }
}

fn candidate(target: &TargetEntity, score: f64) -> Candidate {
    Candidate {
        target_id: target.target_id.clone(),
        title: target.title.clone(),
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn source(id: &str, title: &str) -> SourceEntity {
        SourceEntity::new(id, title, "Task")
    }

    #[test]
    fn test_exact_match_short_circuits() {
        let targets = vec![
            TargetEntity::new("1", "Completely different").with_external_ref("E1"),
            TargetEntity::new("2", "Epic One"),
        ];
        let result = Matcher::default().match_entity(&source("E1", "Epic One"), &targets);
        assert_eq!(result, MatchResult::ExactMatch { target_id: "1".into() });
    }

    #[test]
    fn test_exact_tier_ignores_role() {
        let targets = vec![TargetEntity::new("page:4", "x")
            .with_external_ref("E1")
            .with_role(Role::LeafItem)];
        let index = TargetIndex::new(&targets);
        let result = Matcher::default().match_indexed(&source("E1", "y"), Some(Role::RootContainer), &index);
        assert!(matches!(result, MatchResult::ExactMatch { .. }));
    }

    #[test]
    fn test_duplicate_refs_earliest_created_wins() {
        let early = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let targets = vec![
            TargetEntity::new("9", "a").with_external_ref("E1").with_created_at(late),
            TargetEntity::new("3", "a").with_external_ref("E1").with_created_at(early),
        ];
        let index = TargetIndex::new(&targets);
        assert_eq!(index.by_external_ref("E1").unwrap().target_id, "3");
        let dups = index.duplicate_refs();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].target_ids, vec!["3".to_string(), "9".to_string()]);
    }

    #[test]
    fn test_fuzzy_unique_match() {
        let targets = vec![TargetEntity::new("1", "epic  ONE"), TargetEntity::new("2", "Billing")];
        let result = Matcher::default().match_entity(&source("E1", "Epic One"), &targets);
        assert_eq!(
            result,
            MatchResult::FuzzyMatch {
                target_id: "1".into(),
                score: 1.0
            }
        );
    }

    #[test]
    fn test_fuzzy_ambiguous_within_margin() {
        let targets = vec![TargetEntity::new("a", "Setup Guide"), TargetEntity::new("b", "Setup Guid")];
        let result = Matcher::default().match_entity(&source("P1", "Setup Guide"), &targets);
        let MatchResult::Ambiguous { candidates } = result else {
            panic!("expected ambiguous, got {result:?}");
        };
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].target_id, "a");
        assert!(candidates[0].score >= candidates[1].score);
    }

    #[test]
    fn test_fuzzy_clear_winner_outside_margin() {
        let targets = vec![
            TargetEntity::new("a", "Release notes for version two"),
            TargetEntity::new("b", "Release notes"),
        ];
        let result = Matcher::default().match_entity(&source("P1", "Release notes"), &targets);
        assert_eq!(result.target_id(), Some("b"));
    }

    #[test]
    fn test_identical_titles_are_ambiguous_ranked_by_creation() {
        let early = Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();
        let targets = vec![
            TargetEntity::new("late", "Overview"),
            TargetEntity::new("early", "Overview").with_created_at(early),
        ];
        let result = Matcher::default().match_entity(&source("P1", "Overview"), &targets);
        let MatchResult::Ambiguous { candidates } = result else {
            panic!("expected ambiguous");
        };
        assert_eq!(candidates[0].target_id, "early");
        assert_eq!(candidates[1].target_id, "late");
    }

    #[test]
    fn test_claimed_targets_excluded_from_fuzzy() {
        let targets = vec![TargetEntity::new("1", "Task One").with_external_ref("OTHER-1")];
        let result = Matcher::default().match_entity(&source("T1", "Task One"), &targets);
        assert_eq!(result, MatchResult::NoMatch);
    }

    #[test]
    fn test_role_filter_on_fuzzy_tier() {
        let targets = vec![
            TargetEntity::new("book:1", "Guides").with_role(Role::RootContainer),
            TargetEntity::new("page:2", "Guides").with_role(Role::LeafItem),
        ];
        let index = TargetIndex::new(&targets);
        let result = Matcher::default().match_indexed(&source("P1", "Guides"), Some(Role::LeafItem), &index);
        assert_eq!(result.target_id(), Some("page:2"));
    }

    #[test]
    fn test_no_match_below_acceptance() {
        let targets = vec![TargetEntity::new("1", "Task Two")];
        let result = Matcher::default().match_entity(&source("T1", "Task One"), &targets);
        assert_eq!(result, MatchResult::NoMatch);
    }

    #[test]
    fn test_closest_reports_near_misses() {
        let targets = vec![
            TargetEntity::new("1", "Task Ones"),
            TargetEntity::new("2", "Task Three"),
            TargetEntity::new("3", "Unrelated"),
            TargetEntity::new("4", "Tasks"),
        ];
        let index = TargetIndex::new(&targets);
        let near = Matcher::default().closest(&source("T1", "Task One"), None, &index);
        assert!(near.len() <= DEFAULT_NEAR_MISSES);
        assert_eq!(near[0].target_id, "1");
        assert!(near.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_matching_is_deterministic() {
        let targets = vec![
            TargetEntity::new("a", "Setup Guide"),
            TargetEntity::new("b", "Setup Guid"),
            TargetEntity::new("c", "Setup Guides"),
        ];
        let m = Matcher::default();
        let first = m.match_entity(&source("P1", "Setup Guide"), &targets);
        for _ in 0..5 {
            assert_eq!(m.match_entity(&source("P1", "Setup Guide"), &targets), first);
        }
    }
}
