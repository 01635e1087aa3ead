//! Confidence scoring.
//!
//! Blends four components into a score in `[0, 100]`:
//!
//! | Component | Without proximity | With proximity |
//! |-----------|-------------------|----------------|
//! | strategy  | 0.40 | 0.35 |
//! | similarity | 0.25 | 0.20 |
//! | interactability | 0.35 | 0.30 |
//! | proximity | - | 0.15 |
//!
//! Proximity only applies when the context carries a previously matched
//! element with a bounding box.

use serde::{Deserialize, Serialize};

use crate::config::{HealingConfig, StrategyKind, StrategyWeights};
use crate::context::{Candidate, HealingContext};
use crate::similarity::token_similarity;

/// Full score within this distance (px)
const PROXIMITY_NEAR: f64 = 100.0;
/// Zero score beyond this distance (px)
const PROXIMITY_FAR: f64 = 500.0;

/// Per-component breakdown, each in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Confidence x reliability x weight factor
    pub strategy: f64,
    /// Token overlap between original and candidate locators
    pub similarity: f64,
    /// Visible and enabled
    pub interactability: f64,
    /// Distance to the previous element
    pub proximity: Option<f64>,
}

impl ScoreBreakdown {
    /// Weighted blend scaled to `[0, 100]`, or `None` if not finite
    #[must_use]
    pub fn total(&self) -> Option<f64> {
        let blended = match self.proximity {
            Some(p) => {
                0.35 * self.strategy + 0.20 * self.similarity + 0.30 * self.interactability + 0.15 * p
            }
            None => 0.40 * self.strategy + 0.25 * self.similarity + 0.35 * self.interactability,
        };
        let score = blended * 100.0;
        score.is_finite().then(|| score.clamp(0.0, 100.0))
    }
}

/// Reliability of each strategy's confidence
#[must_use]
pub const fn reliability(kind: StrategyKind) -> f64 {
    match kind {
        StrategyKind::Semantic => 0.90,
        StrategyKind::Text => 0.85,
        StrategyKind::Structural => 0.70,
        StrategyKind::Attribute => 0.95,
        StrategyKind::Visual => 0.65,
    }
}

/// Scores candidates against one configuration
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: StrategyWeights,
    max_weight: f64,
}

impl Scorer {
    /// Create a scorer with weights renormalized over the enabled strategies
    #[must_use]
    pub fn new(config: &HealingConfig) -> Self {
        let weights = config.effective_weights();
        let max_weight = weights.max_of(&config.strategies);
        Self {
            weights,
            max_weight,
        }
    }

    fn weight_factor(&self, kind: StrategyKind) -> f64 {
        if self.max_weight > 0.0 {
            0.9 + 0.1 * self.weights.get(kind) / self.max_weight
        } else {
            0.9
        }
    }

    /// Component breakdown for one candidate
    #[must_use]
    pub fn breakdown(&self, candidate: &Candidate, ctx: &HealingContext) -> ScoreBreakdown {
        let strategy = candidate.confidence
            * reliability(candidate.strategy)
            * self.weight_factor(candidate.strategy);
        let similarity =
            token_similarity(ctx.original.as_str(), candidate.locator.as_str());
        let element = &candidate.element;
        let interactability = 0.7 * f64::from(u8::from(element.is_visible()))
            + 0.3 * f64::from(u8::from(element.enabled));
        let proximity = ctx
            .previous_element
            .as_ref()
            .and_then(|prev| prev.center())
            .map(|prev| {
                element.center().map_or(0.0, |center| {
                    let d = f64::from(center.distance_to(&prev));
                    if d <= PROXIMITY_NEAR {
                        1.0
                    } else if d >= PROXIMITY_FAR {
                        0.0
                    } else {
                        1.0 - (d - PROXIMITY_NEAR) / (PROXIMITY_FAR - PROXIMITY_NEAR)
                    }
                })
            });
        ScoreBreakdown {
            strategy,
            similarity,
            interactability,
            proximity,
        }
    }

    /// Score in `[0, 100]`, `None` when the candidate cannot be scored
    #[must_use]
    pub fn score(&self, candidate: &Candidate, ctx: &HealingContext) -> Option<f64> {
        self.breakdown(candidate, ctx).total()
    }
}
