//! Project-level configuration support
//!
//! Loads per-project configuration from `nestlint.toml` or `.nestlintrc.json`
//! in the workspace root. Loading is a thin serde layer; the interesting
//! part is [`NestlintConfig::validate`], which turns malformed values into
//! configuration errors before any scan starts.
//!
//! # Configuration Format
//!
//! ```toml
//! # nestlint.toml
//! include = ["src/**/*.ts"]
//! exclude = ["**/*.spec.ts"]
//! rules_dir = ".nestlint/rules"
//!
//! [ignore]
//! rules = ["performance/sync-io-in-handler"]
//! files = ["**/generated/**"]
//!
//! [rules]
//! "correctness/guard-missing-can-activate" = false
//!
//! [categories]
//! performance = false
//!
//! [thresholds]
//! max_module_providers = 12
//!
//! [scoring.category_multipliers]
//! security = 2.0
//! ```

use crate::error::{NestlintError, NestlintResult};
use crate::models::{Category, Severity};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Built-in exclusion patterns, applied unless `skip_default_excludes = true`
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "**/node_modules/**",
    "**/dist/**",
    "**/coverage/**",
    "**/.git/**",
    "**/*.d.ts",
];

/// Config file names, in lookup order
const CONFIG_FILES: &[&str] = &["nestlint.toml", ".nestlintrc.json"];

/// Project configuration consumed by the analysis core
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NestlintConfig {
    /// Globs a file must match to be scanned (empty = every supported file)
    #[serde(default)]
    pub include: Vec<String>,

    /// Globs that remove files from the scan
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Disable [`DEFAULT_EXCLUDE_PATTERNS`]
    #[serde(default)]
    pub skip_default_excludes: bool,

    /// Diagnostics to drop after the scan
    #[serde(default)]
    pub ignore: IgnoreConfig,

    /// Per-rule toggles keyed by rule id
    #[serde(default)]
    pub rules: HashMap<String, bool>,

    /// Per-category toggles keyed by category name
    #[serde(default)]
    pub categories: HashMap<String, bool>,

    /// Values that replace built-in constants inside checks
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Score weighting overrides
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Directory holding external rule definitions, relative to the root
    #[serde(default)]
    pub rules_dir: Option<PathBuf>,
}

/// Ignore rules applied by the diagnostic filter
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IgnoreConfig {
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Thresholds used by built-in rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Maximum providers declared directly in one `@Module`
    #[serde(default = "default_max_module_providers")]
    pub max_module_providers: usize,

    /// Maximum constructor-injected dependencies for one class
    #[serde(default = "default_max_constructor_dependencies")]
    pub max_constructor_dependencies: usize,

    /// Maximum route handlers in one controller
    #[serde(default = "default_max_controller_routes")]
    pub max_controller_routes: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_module_providers: default_max_module_providers(),
            max_constructor_dependencies: default_max_constructor_dependencies(),
            max_controller_routes: default_max_controller_routes(),
        }
    }
}

fn default_max_module_providers() -> usize {
    10
}
fn default_max_constructor_dependencies() -> usize {
    8
}
fn default_max_controller_routes() -> usize {
    15
}

/// Overrides for the scoring policy
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScoringConfig {
    #[serde(default)]
    pub severity_weights: SeverityWeights,
    #[serde(default)]
    pub category_multipliers: CategoryMultipliers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityWeights {
    #[serde(default = "default_error_weight")]
    pub error: f64,
    #[serde(default = "default_warning_weight")]
    pub warning: f64,
    #[serde(default = "default_info_weight")]
    pub info: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            error: default_error_weight(),
            warning: default_warning_weight(),
            info: default_info_weight(),
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Error => self.error,
            Severity::Warning => self.warning,
            Severity::Info => self.info,
        }
    }
}

fn default_error_weight() -> f64 {
    3.0
}
fn default_warning_weight() -> f64 {
    1.5
}
fn default_info_weight() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryMultipliers {
    #[serde(default = "default_security_multiplier")]
    pub security: f64,
    #[serde(default = "default_correctness_multiplier")]
    pub correctness: f64,
    #[serde(default = "default_architecture_multiplier")]
    pub architecture: f64,
    #[serde(default = "default_performance_multiplier")]
    pub performance: f64,
}

impl Default for CategoryMultipliers {
    fn default() -> Self {
        Self {
            security: default_security_multiplier(),
            correctness: default_correctness_multiplier(),
            architecture: default_architecture_multiplier(),
            performance: default_performance_multiplier(),
        }
    }
}

impl CategoryMultipliers {
    pub fn multiplier(&self, category: Category) -> f64 {
        match category {
            Category::Security => self.security,
            Category::Correctness => self.correctness,
            Category::Architecture => self.architecture,
            Category::Performance => self.performance,
        }
    }
}

fn default_security_multiplier() -> f64 {
    1.5
}
fn default_correctness_multiplier() -> f64 {
    1.3
}
fn default_architecture_multiplier() -> f64 {
    1.0
}
fn default_performance_multiplier() -> f64 {
    0.8
}

/// Load configuration from the workspace root.
///
/// Searches `nestlint.toml`, then `.nestlintrc.json`. Returns the default
/// configuration when neither exists. A file that exists but does not parse
/// or validate is a configuration error.
pub fn load_project_config(root: &Path) -> NestlintResult<NestlintConfig> {
    for name in CONFIG_FILES {
        let path = root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            debug!("Loaded project config from {}", path.display());
            return Ok(config);
        }
    }

    debug!("No project config found, using defaults");
    Ok(NestlintConfig::default())
}

/// Load and validate one configuration file (TOML or JSON by extension)
pub fn load_config_file(path: &Path) -> NestlintResult<NestlintConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        NestlintError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })?;

    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let config: NestlintConfig = if is_json {
        serde_json::from_str(&content)
            .map_err(|e| NestlintError::Configuration(format!("{}: {}", path.display(), e)))?
    } else {
        toml::from_str(&content)
            .map_err(|e| NestlintError::Configuration(format!("{}: {}", path.display(), e)))?
    };

    config.validate()?;
    Ok(config)
}

/// Resolved `rules` / `categories` switches; empty means everything runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleToggles {
    rules: HashMap<String, bool>,
    categories: HashMap<Category, bool>,
}

impl RuleToggles {
    pub fn is_enabled(&self, id: &str, category: Category) -> bool {
        if let Some(enabled) = self.rules.get(id) {
            return *enabled;
        }
        self.categories.get(&category).copied().unwrap_or(true)
    }
}

impl NestlintConfig {
    /// Reject malformed values before any scan starts
    pub fn validate(&self) -> NestlintResult<()> {
        let mut names: Vec<&String> = self.categories.keys().collect();
        names.sort();
        let mut seen: HashMap<Category, &String> = HashMap::new();
        for name in names {
            let Some(category) = parse_category(name) else {
                return Err(NestlintError::Configuration(format!(
                    "unknown category '{}' (expected one of: security, performance, correctness, architecture)",
                    name
                )));
            };
            // Keys are case-insensitive; one category may appear once
            if let Some(first) = seen.insert(category, name) {
                return Err(NestlintError::Configuration(format!(
                    "categories '{}' and '{}' both configure {}",
                    first, name, category
                )));
            }
        }

        let t = &self.thresholds;
        for (key, value) in [
            ("max_module_providers", t.max_module_providers),
            ("max_constructor_dependencies", t.max_constructor_dependencies),
            ("max_controller_routes", t.max_controller_routes),
        ] {
            if value == 0 {
                return Err(NestlintError::Configuration(format!(
                    "threshold '{}' must be at least 1",
                    key
                )));
            }
        }

        let w = &self.scoring.severity_weights;
        let m = &self.scoring.category_multipliers;
        for (key, value) in [
            ("severity_weights.error", w.error),
            ("severity_weights.warning", w.warning),
            ("severity_weights.info", w.info),
            ("category_multipliers.security", m.security),
            ("category_multipliers.correctness", m.correctness),
            ("category_multipliers.architecture", m.architecture),
            ("category_multipliers.performance", m.performance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(NestlintError::Configuration(format!(
                    "scoring.{} must be a non-negative number, got {}",
                    key, value
                )));
            }
        }

        compile_globs(&self.include)?;
        compile_globs(&self.effective_excludes())?;
        compile_globs(&self.ignore.files)?;

        for id in self.rules.keys() {
            if !id.contains('/') {
                warn!("Rule toggle '{}' does not look like a rule id (category/name)", id);
            }
        }

        Ok(())
    }

    /// Whether a rule runs. An explicit rule toggle beats its category toggle.
    pub fn is_rule_enabled(&self, id: &str, category: Category) -> bool {
        self.toggles().is_enabled(id, category)
    }

    /// Rule and category toggles with category keys resolved
    pub fn toggles(&self) -> RuleToggles {
        let mut names: Vec<&String> = self.categories.keys().collect();
        names.sort();
        let mut categories = HashMap::new();
        for name in names {
            if let Some(category) = parse_category(name) {
                categories.entry(category).or_insert(self.categories[name]);
            }
        }
        RuleToggles {
            rules: self.rules.clone(),
            categories,
        }
    }

    /// Default excludes plus user excludes, deduplicated
    pub fn effective_excludes(&self) -> Vec<String> {
        let mut patterns = Vec::new();
        if !self.skip_default_excludes {
            patterns.extend(DEFAULT_EXCLUDE_PATTERNS.iter().map(|s| s.to_string()));
        }
        for p in &self.exclude {
            if !patterns.contains(p) {
                patterns.push(p.clone());
            }
        }
        patterns
    }

    /// Absolute rules directory, if configured
    pub fn rules_dir_in(&self, root: &Path) -> Option<PathBuf> {
        self.rules_dir.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                root.join(dir)
            }
        })
    }
}

fn parse_category(name: &str) -> Option<Category> {
    Category::ALL
        .into_iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(name))
}

/// Compile glob patterns once into a set.
///
/// `*` and `?` do not cross `/`; `**` spans directories.
pub fn compile_globs(patterns: &[String]) -> NestlintResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                NestlintError::Configuration(format!("invalid glob '{}': {}", pattern, e))
            })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| NestlintError::Configuration(format!("invalid glob set: {}", e)))
}
