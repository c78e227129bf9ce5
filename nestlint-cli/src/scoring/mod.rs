//! Health scoring
//!
//! Reduces a diagnostic list to a 0..=100 score. Every diagnostic costs
//! its severity weight times its category multiplier, and the total is
//! normalized by the number of scanned files.
//!
//! # Scoring Formula
//!
//! ```text
//! penalty = Σ severity_weight × category_multiplier
//! value   = clamp(round(100 − penalty / file_count × 10), 0, 100)
//! ```
//!
//! # Defaults
//!
//! - Error: 3.0, Warning: 1.5, Info: 0.5
//! - Security ×1.5, Correctness ×1.3, Architecture ×1.0, Performance ×0.8
//!
//! # Example
//!
//! 10 files with one correctness error: penalty = 3.0 × 1.3 = 3.9,
//! value = round(100 − 3.9) = 96 (Excellent).

mod policy;

pub use policy::{score, ScoreBreakdown, ScoringPolicy};
