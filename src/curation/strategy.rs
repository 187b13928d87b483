//! Size-driven choice of curation strategy.

use crate::types::CurationStrategy;

/// Clusters at or above this size are curated heavily.
pub const HEAVY_MIN: usize = 30;
/// Clusters at or above this size (and below [`HEAVY_MIN`]) are curated moderately.
pub const MODERATE_MIN: usize = 10;
/// Clusters at or above this size (and below [`MODERATE_MIN`]) are curated lightly.
pub const LIGHT_MIN: usize = 3;

/// What to do with a cluster of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyPlan {
    /// Chosen strategy.
    pub strategy: CurationStrategy,
    /// Articles to keep verbatim.
    pub keep_count: usize,
    /// Whether the remaining articles are synthesized.
    pub synthesize: bool,
    /// Human-readable description passed to the prompt.
    pub description: &'static str,
}

/// Pure mapping from article count to a [`StrategyPlan`].
pub fn select_strategy(article_count: usize) -> StrategyPlan {
    if article_count >= HEAVY_MIN {
        StrategyPlan {
            strategy: CurationStrategy::Heavy,
            keep_count: 2,
            synthesize: true,
            description:
                "large topic: keep the two strongest articles and synthesize everything else",
        }
    } else if article_count >= MODERATE_MIN {
        StrategyPlan {
            strategy: CurationStrategy::Moderate,
            keep_count: 4,
            synthesize: true,
            description: "busy topic: keep the four strongest articles and synthesize the rest",
        }
    } else if article_count >= LIGHT_MIN {
        StrategyPlan {
            strategy: CurationStrategy::Light,
            keep_count: article_count - 1,
            synthesize: false,
            description: "small topic: keep all but the weakest article, no synthesis",
        }
    } else {
        StrategyPlan {
            strategy: CurationStrategy::Passthrough,
            keep_count: article_count,
            synthesize: false,
            description: "tiny topic: show every article as-is",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(count: usize) -> (CurationStrategy, usize, bool) {
        let plan = select_strategy(count);
        (plan.strategy, plan.keep_count, plan.synthesize)
    }

    #[test]
    fn boundaries_map_to_expected_strategies() {
        assert_eq!(plan(0), (CurationStrategy::Passthrough, 0, false));
        assert_eq!(plan(2), (CurationStrategy::Passthrough, 2, false));
        assert_eq!(plan(3), (CurationStrategy::Light, 2, false));
        assert_eq!(plan(5), (CurationStrategy::Light, 4, false));
        assert_eq!(plan(9), (CurationStrategy::Light, 8, false));
        assert_eq!(plan(10), (CurationStrategy::Moderate, 4, true));
        assert_eq!(plan(15), (CurationStrategy::Moderate, 4, true));
        assert_eq!(plan(29), (CurationStrategy::Moderate, 4, true));
        assert_eq!(plan(30), (CurationStrategy::Heavy, 2, true));
        assert_eq!(plan(40), (CurationStrategy::Heavy, 2, true));
    }
}
