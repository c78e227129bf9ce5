//! Configuration module for nestlint
//!
//! This module handles:
//! - Project-level configuration (nestlint.toml / .nestlintrc.json)
//! - Rule and category toggles
//! - Threshold overrides consumed by built-in rules
//! - Scoring weight overrides

mod project_config;

pub use project_config::{
    compile_globs, load_config_file, load_project_config, CategoryMultipliers, IgnoreConfig,
    NestlintConfig, RuleToggles, ScoringConfig, SeverityWeights, Thresholds,
    DEFAULT_EXCLUDE_PATTERNS,
};
