//! Project heuristics
//!
//! Best-effort description of the scanned project, read from `package.json`.
//! Nothing here affects diagnostics or the score.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// HTTP adapter underneath the DI framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HttpAdapter {
    Express,
    Fastify,
    #[default]
    Unknown,
}

/// Persistence library, if one is recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orm {
    Typeorm,
    Prisma,
    Mongoose,
    Sequelize,
    MikroOrm,
    Drizzle,
}

/// Dependency name → ORM, first match wins
const ORM_MARKERS: &[(&str, Orm)] = &[
    ("@nestjs/typeorm", Orm::Typeorm),
    ("typeorm", Orm::Typeorm),
    ("@prisma/client", Orm::Prisma),
    ("prisma", Orm::Prisma),
    ("@nestjs/mongoose", Orm::Mongoose),
    ("mongoose", Orm::Mongoose),
    ("@nestjs/sequelize", Orm::Sequelize),
    ("sequelize", Orm::Sequelize),
    ("@mikro-orm/core", Orm::MikroOrm),
    ("drizzle-orm", Orm::Drizzle),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Declared `@nestjs/core` version range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_version: Option<String>,
    pub http_adapter: HttpAdapter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orm: Option<Orm>,
    pub typescript: bool,
    pub file_count: usize,
    pub module_count: usize,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, String>,
}

impl PackageJson {
    fn has(&self, dep: &str) -> bool {
        self.dependencies.contains_key(dep) || self.dev_dependencies.contains_key(dep)
    }
}

fn read_package_json(root: &Path) -> Option<PackageJson> {
    let path = root.join("package.json");
    let content = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(pkg) => Some(pkg),
        Err(e) => {
            debug!("Ignoring unparsable {}: {}", path.display(), e);
            None
        }
    }
}

/// Describe the project at `root`; counts come from the scan itself
pub fn detect_project(root: &Path, file_count: usize, module_count: usize) -> ProjectInfo {
    let pkg = read_package_json(root).unwrap_or_default();

    let http_adapter = if pkg.has("@nestjs/platform-fastify") || pkg.has("fastify") {
        HttpAdapter::Fastify
    } else if pkg.has("@nestjs/platform-express") || pkg.has("express") {
        HttpAdapter::Express
    } else {
        HttpAdapter::Unknown
    };

    let orm = ORM_MARKERS
        .iter()
        .find(|(dep, _)| pkg.has(dep))
        .map(|(_, orm)| *orm);

    let typescript = pkg.has("typescript") || root.join("tsconfig.json").exists();

    ProjectInfo {
        name: pkg.name.clone(),
        framework_version: pkg.dependencies.get("@nestjs/core").cloned(),
        http_adapter,
        orm,
        typescript,
        file_count,
        module_count,
    }
}
