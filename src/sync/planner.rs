//! Action planner.

use crate::sync::types::{Action, MatchResult};

/// Decide what to do with a matched (or unmatched) source entity.
///
/// Ambiguous matches are never resolved automatically, whatever
/// `update_existing` says.
#[must_use]
pub const fn plan_action(match_result: &MatchResult, update_existing: bool) -> Action {
    match match_result {
        MatchResult::NoMatch => Action::Create,
        MatchResult::ExactMatch { .. } | MatchResult::FuzzyMatch { .. } => {
            if update_existing {
                Action::Update
            } else {
                Action::Skip
            }
        }
        MatchResult::Ambiguous { .. } => Action::SkipAmbiguous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::Candidate;

    #[test]
    fn test_plan_matrix() {
        let exact = MatchResult::ExactMatch { target_id: "1".into() };
        let fuzzy = MatchResult::FuzzyMatch {
            target_id: "1".into(),
            score: 0.9,
        };
        let ambiguous = MatchResult::Ambiguous {
            candidates: vec![Candidate {
                target_id: "1".into(),
                title: "t".into(),
                score: 0.9,
            }],
        };

        assert_eq!(plan_action(&MatchResult::NoMatch, false), Action::Create);
        assert_eq!(plan_action(&MatchResult::NoMatch, true), Action::Create);
        assert_eq!(plan_action(&exact, false), Action::Skip);
        assert_eq!(plan_action(&exact, true), Action::Update);
        assert_eq!(plan_action(&fuzzy, false), Action::Skip);
        assert_eq!(plan_action(&fuzzy, true), Action::Update);
        assert_eq!(plan_action(&ambiguous, false), Action::SkipAmbiguous);
        assert_eq!(plan_action(&ambiguous, true), Action::SkipAmbiguous);
    }
}
