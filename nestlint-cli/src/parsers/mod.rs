//! Source ingestion using tree-sitter
//!
//! Turns a list of file paths into a [`SourceSet`]: one [`SourceUnit`] per
//! file holding the source text, its syntax tree and the classified
//! [`FileFacts`] that rules consume.
//!
//! Units are keyed by their root-relative, forward-slash path and kept in a
//! `BTreeMap`, so every consumer sees files in the same order.

pub mod facts;
mod typescript;

pub use facts::{
    CallFact, ClassFact, DeclKind, DecoratorFact, FileFacts, ImportFact, LiteralAssignment,
    MethodFact, ModuleMetadata, ParamFact,
};
pub use typescript::{column_at, parse_source};

use crate::config::{compile_globs, NestlintConfig};
use crate::error::{NestlintError, NestlintResult};
use globset::GlobSet;
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tree_sitter::Tree;

/// File extensions the ingestor understands
pub const SUPPORTED_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// One ingested file
#[derive(Debug)]
pub struct SourceUnit {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Root-relative path with forward slashes; the stable key
    pub relative_path: String,
    pub source: String,
    pub tree: Tree,
    pub facts: FileFacts,
}

impl SourceUnit {
    /// Read and parse one file
    pub fn load(root: &Path, path: &Path) -> NestlintResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| NestlintError::scan(path, e))?;
        Self::from_source(root, path, source)
    }

    /// Parse already-loaded source text
    pub fn from_source(root: &Path, path: &Path, source: String) -> NestlintResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("ts");
        let (tree, facts) = parse_source(&source, ext).map_err(|e| NestlintError::scan(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            relative_path: relative_path(root, path),
            source,
            tree,
            facts,
        })
    }
}

/// All ingested files of one workspace
#[derive(Debug)]
pub struct SourceSet {
    root: PathBuf,
    units: BTreeMap<String, SourceUnit>,
}

impl SourceSet {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            units: BTreeMap::new(),
        }
    }

    /// Read and parse every path in parallel.
    ///
    /// Any unreadable file aborts the whole ingestion.
    pub fn ingest(root: &Path, paths: &[PathBuf]) -> NestlintResult<Self> {
        let units: Vec<SourceUnit> = paths
            .par_iter()
            .map(|p| SourceUnit::load(root, p))
            .collect::<NestlintResult<_>>()?;

        let mut set = Self::new(root);
        for unit in units {
            set.units.insert(unit.relative_path.clone(), unit);
        }
        info!("Ingested {} source files", set.units.len());
        Ok(set)
    }

    /// Re-ingest exactly one file, inserting it if new
    pub fn upsert(&mut self, path: &Path) -> NestlintResult<&SourceUnit> {
        let unit = SourceUnit::load(&self.root, path)?;
        let key = unit.relative_path.clone();
        debug!("Re-ingested {}", key);
        self.units.insert(key.clone(), unit);
        self.units
            .get(&key)
            .ok_or_else(|| NestlintError::scan(path, "unit vanished after insert"))
    }

    /// Drop one file from the set
    pub fn remove(&mut self, path: &Path) -> Option<SourceUnit> {
        let key = relative_path(&self.root, path);
        self.units.remove(&key)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.units.contains_key(&relative_path(&self.root, path))
    }

    pub fn get(&self, relative_path: &str) -> Option<&SourceUnit> {
        self.units.get(relative_path)
    }

    /// Units in relative-path order
    pub fn units(&self) -> impl Iterator<Item = &SourceUnit> {
        self.units.values()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn relative_path(&self, path: &Path) -> String {
        relative_path(&self.root, path)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Root-relative path with forward slashes
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

/// Include/exclude globs compiled once for file collection
pub struct FileSelector {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl FileSelector {
    pub fn from_config(config: &NestlintConfig) -> NestlintResult<Self> {
        let include = if config.include.is_empty() {
            None
        } else {
            Some(compile_globs(&config.include)?)
        };
        let exclude = compile_globs(&config.effective_excludes())?;
        Ok(Self { include, exclude })
    }

    /// Whether a file belongs in the scan
    pub fn accepts(&self, root: &Path, path: &Path) -> bool {
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
            .unwrap_or(false);
        if !supported {
            return false;
        }

        let rel = relative_path(root, path);
        if self.exclude.is_match(&rel) {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(&rel),
            None => true,
        }
    }
}

/// Collect all source files under `root`, respecting .gitignore and config globs
pub fn collect_source_files(root: &Path, config: &NestlintConfig) -> NestlintResult<Vec<PathBuf>> {
    let selector = FileSelector::from_config(config)?;
    let mut files = Vec::new();

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .add_custom_ignore_filename(".nestlintignore");

    for entry in builder.build().flatten() {
        let path = entry.path();
        if path.is_file() && selector.accepts(root, path) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    debug!("Collected {} source files under {}", files.len(), root.display());
    Ok(files)
}
