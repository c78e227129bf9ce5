//! Severity/category weighted scorer

use crate::config::{CategoryMultipliers, ScoringConfig, SeverityWeights};
use crate::models::{Category, Diagnostic, Score};
use std::collections::BTreeMap;
use tracing::debug;

/// Points removed per unit of penalty per file
const PENALTY_SCALE: f64 = 10.0;

/// Weights used to turn diagnostics into a penalty
#[derive(Debug, Clone, Default)]
pub struct ScoringPolicy {
    pub severity_weights: SeverityWeights,
    pub category_multipliers: CategoryMultipliers,
}

/// Where a score's penalty came from
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub score: Score,
    pub penalty: f64,
    pub file_count: usize,
    pub by_category: BTreeMap<Category, f64>,
}

impl ScoringPolicy {
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            severity_weights: config.severity_weights.clone(),
            category_multipliers: config.category_multipliers.clone(),
        }
    }

    /// Penalty contributed by one diagnostic
    pub fn cost(&self, diagnostic: &Diagnostic) -> f64 {
        self.severity_weights.weight(diagnostic.severity)
            * self.category_multipliers.multiplier(diagnostic.category)
    }

    pub fn score(&self, diagnostics: &[Diagnostic], file_count: usize) -> Score {
        self.breakdown(diagnostics, file_count).score
    }

    pub fn breakdown(&self, diagnostics: &[Diagnostic], file_count: usize) -> ScoreBreakdown {
        let mut by_category: BTreeMap<Category, f64> =
            Category::ALL.iter().map(|c| (*c, 0.0)).collect();
        for d in diagnostics {
            *by_category.entry(d.category).or_insert(0.0) += self.cost(d);
        }
        let penalty: f64 = by_category.values().sum();

        let score = if file_count == 0 {
            Score::new(100)
        } else {
            let raw = 100.0 - penalty / file_count as f64 * PENALTY_SCALE;
            Score::new(raw.round().clamp(0.0, 100.0) as u8)
        };

        debug!(
            "Score {} ({}): penalty {:.2} over {} files",
            score.value, score.label, penalty, file_count
        );

        ScoreBreakdown {
            score,
            penalty,
            file_count,
            by_category,
        }
    }
}

/// Score with the default weights
pub fn score(diagnostics: &[Diagnostic], file_count: usize) -> Score {
    ScoringPolicy::default().score(diagnostics, file_count)
}
