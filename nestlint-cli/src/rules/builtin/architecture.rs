//! Architecture rules
//!
//! Size limits come from `[thresholds]` in the project config.

use crate::models::{Category, RuleScope, Severity};
use crate::parsers::{ClassFact, DeclKind, ParamFact};
use crate::rules::{FileContext, ProjectContext, Rule, RuleMeta};
use anyhow::Result;

/// Flags modules that declare too many providers directly
pub struct TooManyProviders {
    meta: RuleMeta,
}

impl TooManyProviders {
    pub fn new() -> Self {
        Self {
            meta: RuleMeta::new(
                "architecture/too-many-providers",
                Category::Architecture,
                Severity::Warning,
                RuleScope::File,
                "module declares too many providers",
                "Split the module by feature and import the pieces",
            ),
        }
    }
}

impl Default for TooManyProviders {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for TooManyProviders {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn check_file(&self, ctx: &FileContext<'_>) -> Result<()> {
        let max = ctx.settings().thresholds.max_module_providers;
        for class in ctx.facts().classes_of(DeclKind::Module) {
            let count = class.module.as_ref().map(|m| m.providers.len()).unwrap_or(0);
            if count > max {
                ctx.report(
                    class.line,
                    class.column,
                    format!("{} declares {} providers (max {})", class.name, count, max),
                );
            }
        }
        Ok(())
    }
}

/// Flags DI classes with too many constructor-injected dependencies
pub struct TooManyConstructorDependencies {
    meta: RuleMeta,
}

impl TooManyConstructorDependencies {
    pub fn new() -> Self {
        Self {
            meta: RuleMeta::new(
                "architecture/too-many-constructor-dependencies",
                Category::Architecture,
                Severity::Warning,
                RuleScope::File,
                "class injects too many dependencies",
                "The class probably has more than one responsibility; split it",
            ),
        }
    }
}

impl Default for TooManyConstructorDependencies {
    fn default() -> Self {
        Self::new()
    }
}

fn is_injected_class(class: &ClassFact) -> bool {
    !class.kinds.is_empty() && !class.is(DeclKind::Entity) && !class.is(DeclKind::Module)
}

impl Rule for TooManyConstructorDependencies {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn check_file(&self, ctx: &FileContext<'_>) -> Result<()> {
        let max = ctx.settings().thresholds.max_constructor_dependencies;
        for class in ctx.facts().classes.iter().filter(|c| is_injected_class(c)) {
            let count = class.constructor_params.len();
            if count > max {
                ctx.report(
                    class.line,
                    class.column,
                    format!("{} injects {} dependencies (max {})", class.name, count, max),
                );
            }
        }
        Ok(())
    }
}

/// Decorators that inject a data-access object
const DATA_ACCESS_DECORATORS: &[&str] = &["InjectRepository", "InjectModel", "InjectEntityManager"];

/// Types that are data-access objects
const DATA_ACCESS_TYPES: &[&str] = &["Repository", "Model", "EntityManager", "DataSource", "PrismaClient"];

fn is_data_access(param: &ParamFact) -> bool {
    if param
        .decorators
        .iter()
        .any(|d| DATA_ACCESS_DECORATORS.contains(&d.as_str()))
    {
        return true;
    }
    param
        .type_name
        .as_deref()
        .map(|t| {
            let base = t.split('<').next().unwrap_or(t).trim();
            DATA_ACCESS_TYPES.contains(&base)
        })
        .unwrap_or(false)
}

/// Flags controllers that talk to the persistence layer directly
pub struct RepositoryInController {
    meta: RuleMeta,
}

impl RepositoryInController {
    pub fn new() -> Self {
        Self {
            meta: RuleMeta::new(
                "architecture/repository-in-controller",
                Category::Architecture,
                Severity::Warning,
                RuleScope::File,
                "controller injects a data-access object",
                "Move data access into a service and inject the service instead",
            ),
        }
    }
}

impl Default for RepositoryInController {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for RepositoryInController {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn check_file(&self, ctx: &FileContext<'_>) -> Result<()> {
        for class in ctx.facts().classes_of(DeclKind::Controller) {
            for param in class.constructor_params.iter().filter(|p| is_data_access(p)) {
                ctx.report(
                    class.line,
                    class.column,
                    format!("{} injects data access directly ({})", class.name, param.name),
                );
            }
        }
        Ok(())
    }
}

/// Flags controllers with too many route handlers
pub struct TooManyRoutes {
    meta: RuleMeta,
}

impl TooManyRoutes {
    pub fn new() -> Self {
        Self {
            meta: RuleMeta::new(
                "architecture/too-many-routes",
                Category::Architecture,
                Severity::Info,
                RuleScope::File,
                "controller has too many routes",
                "Split the controller by resource",
            ),
        }
    }
}

impl Default for TooManyRoutes {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for TooManyRoutes {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn check_file(&self, ctx: &FileContext<'_>) -> Result<()> {
        let max = ctx.settings().thresholds.max_controller_routes;
        for class in ctx.facts().classes_of(DeclKind::Controller) {
            let count = class.route_handlers().count();
            if count > max {
                ctx.report(
                    class.line,
                    class.column,
                    format!("{} has {} routes (max {})", class.name, count, max),
                );
            }
        }
        Ok(())
    }
}

/// Reports each module import cycle at its first module's declaration
pub struct CircularModuleDeps {
    meta: RuleMeta,
}

impl CircularModuleDeps {
    pub fn new() -> Self {
        Self {
            meta: RuleMeta::new(
                "architecture/circular-module-deps",
                Category::Architecture,
                Severity::Error,
                RuleScope::Project,
                "modules import each other in a cycle",
                "Extract the shared providers into their own module, or break the cycle with forwardRef()",
            ),
        }
    }
}

impl Default for CircularModuleDeps {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for CircularModuleDeps {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn check_project(&self, ctx: &ProjectContext<'_>) -> Result<()> {
        for cycle in ctx.cycles() {
            let Some(anchor) = ctx.graph().node(cycle.anchor()) else {
                continue;
            };
            ctx.report(
                &anchor.file_path,
                anchor.line,
                anchor.column,
                format!("Circular module import: {}", cycle),
            );
        }
        Ok(())
    }
}

/// Reports every module declaration that reuses an existing module name
pub struct DuplicateModuleName {
    meta: RuleMeta,
}

impl DuplicateModuleName {
    pub fn new() -> Self {
        Self {
            meta: RuleMeta::new(
                "architecture/duplicate-module-name",
                Category::Architecture,
                Severity::Error,
                RuleScope::Project,
                "two modules share a class name",
                "Rename one of the modules; the graph keys modules by class name",
            ),
        }
    }
}

impl Default for DuplicateModuleName {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for DuplicateModuleName {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn check_project(&self, ctx: &ProjectContext<'_>) -> Result<()> {
        for collision in ctx.graph().collisions() {
            ctx.report(
                &collision.file_path,
                collision.line,
                collision.column,
                format!(
                    "Module '{}' is already declared in {}:{}",
                    collision.name, collision.first_file_path, collision.first_line
                ),
            );
        }
        Ok(())
    }
}
