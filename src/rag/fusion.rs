//! Multi-strategy result fusion
//!
//! Raw scores are min-max normalized inside each strategy list, weighted by
//! strategy, and merged by passage id. A passage returned by several
//! strategies keeps the **maximum** weighted score, so a single strong
//! strategy is never diluted by weaker ones.
//!
//! ```text
//! norm(p, s)     = (raw - min_s) / (max_s - min_s)     (1.0 when max_s == min_s)
//! weighted(p)    = max_s weight(s) x norm(p, s)
//! fused_score(p) = weighted(p) / max_weight            ∈ [0, 1]
//! ```
//!
//! Order: descending fused score, then lower original rank, then passage id.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::types::{Passage, RankedPassage, Strategy};

/// Spread below which a list is treated as all-equal
const DEGENERATE_SPREAD: f64 = 1e-12;

/// Per-strategy fusion weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub lexical: f64,
    pub vector: f64,
    /// Hybrid results already carry both signals and are trusted more
    pub hybrid: f64,
    pub semantic: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            lexical: 1.0,
            vector: 1.0,
            hybrid: 1.2,
            semantic: 1.2,
        }
    }
}

impl FusionWeights {
    pub fn weight(&self, strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Lexical => self.lexical,
            Strategy::Vector => self.vector,
            Strategy::Hybrid => self.hybrid,
            Strategy::Semantic => self.semantic,
        }
    }

    /// Largest configured weight, used to scale fused scores into [0, 1]
    pub fn max_weight(&self) -> f64 {
        Strategy::ALL
            .iter()
            .map(|s| self.weight(*s))
            .fold(0.0, f64::max)
    }

    pub fn validate(&self) -> Result<(), String> {
        for strategy in Strategy::ALL {
            let w = self.weight(strategy);
            if !w.is_finite() || w < 0.0 {
                return Err(format!(
                    "fusion weight for {} must be a non-negative number",
                    strategy
                ));
            }
        }
        if self.max_weight() <= 0.0 {
            return Err("at least one fusion weight must be positive".to_string());
        }
        Ok(())
    }
}

/// Passages returned by one strategy call, in backend order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyResults {
    pub strategy: Strategy,
    pub passages: Vec<Passage>,
}

impl StrategyResults {
    pub fn new(strategy: Strategy, passages: Vec<Passage>) -> Self {
        Self { strategy, passages }
    }
}

/// Accumulator for one passage id during fusion
struct Candidate {
    passage: Passage,
    weighted_score: f64,
    best_rank: usize,
    provenance: BTreeSet<Strategy>,
}

/// Merges strategy lists into one deduplicated ranking
#[derive(Debug, Clone, Default)]
pub struct ResultFuser {
    weights: FusionWeights,
}

impl ResultFuser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: FusionWeights) -> Self {
        Self { weights }
    }

    /// Fuse any number of strategy lists. Empty input gives empty output.
    pub fn fuse(&self, lists: &[StrategyResults]) -> Vec<RankedPassage> {
        let mut order: Vec<String> = Vec::new();
        let mut candidates: HashMap<String, Candidate> = HashMap::new();

        for list in lists {
            let weight = self.weights.weight(list.strategy);
            let normalized = normalize_scores(&list.passages);

            for (position, (passage, norm)) in list.passages.iter().zip(normalized).enumerate() {
                let weighted = weight * norm;
                let weighted = if weighted.is_finite() { weighted } else { 0.0 };

                match candidates.get_mut(&passage.id) {
                    Some(candidate) => {
                        candidate.provenance.insert(list.strategy);
                        candidate.best_rank = candidate.best_rank.min(position);
                        if weighted > candidate.weighted_score {
                            candidate.weighted_score = weighted;
                            candidate.passage = passage.clone();
                        }
                    }
                    None => {
                        order.push(passage.id.clone());
                        candidates.insert(
                            passage.id.clone(),
                            Candidate {
                                passage: passage.clone(),
                                weighted_score: weighted,
                                best_rank: position,
                                provenance: BTreeSet::from([list.strategy]),
                            },
                        );
                    }
                }
            }
        }

        // Encounter order first, so the stable sort below keeps it for full ties
        let mut merged: Vec<Candidate> = order
            .iter()
            .filter_map(|id| candidates.remove(id))
            .collect();

        merged.sort_by(|a, b| {
            b.weighted_score
                .total_cmp(&a.weighted_score)
                .then_with(|| a.best_rank.cmp(&b.best_rank))
                .then_with(|| a.passage.id.cmp(&b.passage.id))
        });

        let max_weight = self.weights.max_weight();

        merged
            .into_iter()
            .enumerate()
            .map(|(idx, c)| RankedPassage {
                fused_score: if max_weight > 0.0 {
                    (c.weighted_score / max_weight).clamp(0.0, 1.0)
                } else {
                    0.0
                },
                weighted_score: c.weighted_score,
                rank: idx + 1,
                provenance: c.provenance,
                passage: c.passage,
            })
            .collect()
    }
}

/// Min-max normalize raw scores within one list.
///
/// Equal scores (zero spread) all normalize to 1.0. Non-finite scores
/// normalize to 0.0.
pub fn normalize_scores(passages: &[Passage]) -> Vec<f64> {
    let finite = passages.iter().map(|p| p.score).filter(|s| s.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s), hi.max(s))
    });

    let spread = max - min;

    passages
        .iter()
        .map(|p| {
            if !p.score.is_finite() {
                0.0
            } else if spread.abs() <= DEGENERATE_SPREAD {
                1.0
            } else {
                ((p.score - min) / spread).clamp(0.0, 1.0)
            }
        })
        .collect()
}

/// Rank caller-supplied passages in the order given.
///
/// No strategy scored them, so every passage gets a fused score of 1.0.
/// Repeated ids keep their first occurrence.
pub fn rank_in_order(passages: Vec<Passage>) -> Vec<RankedPassage> {
    let mut seen = HashSet::new();
    passages
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .enumerate()
        .map(|(idx, passage)| RankedPassage {
            rank: idx + 1,
            fused_score: 1.0,
            weighted_score: 1.0,
            provenance: BTreeSet::from([passage.strategy]),
            passage,
        })
        .collect()
}
