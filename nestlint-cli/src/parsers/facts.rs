//! Classified structural facts for one source file
//!
//! The classifier runs once per file right after parsing. Rules read these
//! facts instead of walking syntax trees for decorator names themselves.

use serde::{Deserialize, Serialize};

/// What a class declaration is, from the DI container's point of view.
///
/// A class may carry several kinds (an `@Injectable()` that implements
/// `CanActivate` is both `Injectable` and `Guard`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclKind {
    Module,
    Controller,
    Injectable,
    Guard,
    Pipe,
    Interceptor,
    Filter,
    Middleware,
    Resolver,
    Gateway,
    Entity,
}

impl DeclKind {
    /// Kind implied by a class decorator
    pub fn from_decorator(name: &str) -> Option<Self> {
        match name {
            "Module" | "Global" => Some(DeclKind::Module),
            "Controller" => Some(DeclKind::Controller),
            "Injectable" => Some(DeclKind::Injectable),
            "Catch" => Some(DeclKind::Filter),
            "Resolver" => Some(DeclKind::Resolver),
            "WebSocketGateway" => Some(DeclKind::Gateway),
            "Entity" | "Schema" => Some(DeclKind::Entity),
            _ => None,
        }
    }

    /// Kind implied by an implemented interface
    pub fn from_interface(name: &str) -> Option<Self> {
        match name {
            "CanActivate" => Some(DeclKind::Guard),
            "PipeTransform" => Some(DeclKind::Pipe),
            "NestInterceptor" => Some(DeclKind::Interceptor),
            "ExceptionFilter" => Some(DeclKind::Filter),
            "NestMiddleware" => Some(DeclKind::Middleware),
            _ => None,
        }
    }

    /// Kind implied by a naming convention
    pub fn from_name_suffix(name: &str) -> Option<Self> {
        const SUFFIXES: &[(&str, DeclKind)] = &[
            ("Guard", DeclKind::Guard),
            ("Pipe", DeclKind::Pipe),
            ("Interceptor", DeclKind::Interceptor),
            ("Filter", DeclKind::Filter),
            ("Middleware", DeclKind::Middleware),
        ];
        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.len() > suffix.len() && name.ends_with(suffix))
            .map(|(_, kind)| *kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::Module => "module",
            DeclKind::Controller => "controller",
            DeclKind::Injectable => "injectable",
            DeclKind::Guard => "guard",
            DeclKind::Pipe => "pipe",
            DeclKind::Interceptor => "interceptor",
            DeclKind::Filter => "filter",
            DeclKind::Middleware => "middleware",
            DeclKind::Resolver => "resolver",
            DeclKind::Gateway => "gateway",
            DeclKind::Entity => "entity",
        }
    }
}

/// HTTP verb decorators that turn a controller method into a route handler
pub const ROUTE_DECORATORS: &[&str] = &[
    "Get", "Post", "Put", "Patch", "Delete", "Options", "Head", "All",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratorFact {
    /// Callee text without `@` or arguments (`Controller`, `nest.Module`)
    pub name: String,
    pub line: u32,
    pub column: u32,
    /// `@Foo()` as opposed to `@Foo`
    pub is_call: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamFact {
    pub name: String,
    /// Type annotation text without the leading `:`
    pub type_name: Option<String>,
    pub decorators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodFact {
    pub name: String,
    pub line: u32,
    pub column: u32,
    pub decorators: Vec<DecoratorFact>,
    pub is_async: bool,
    pub is_static: bool,
    pub param_count: usize,
}

impl MethodFact {
    pub fn has_decorator(&self, name: &str) -> bool {
        self.decorators.iter().any(|d| d.name == name)
    }

    pub fn is_route_handler(&self) -> bool {
        self.decorators
            .iter()
            .any(|d| ROUTE_DECORATORS.contains(&d.name.as_str()))
    }
}

/// Identifier lists read from a `@Module({...})` argument
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    pub imports: Vec<String>,
    pub providers: Vec<String>,
    pub controllers: Vec<String>,
    pub exports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFact {
    pub name: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub exported: bool,
    pub kinds: Vec<DeclKind>,
    pub decorators: Vec<DecoratorFact>,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    pub methods: Vec<MethodFact>,
    pub constructor_params: Vec<ParamFact>,
    /// Present when the class carries `@Module`
    pub module: Option<ModuleMetadata>,
}

impl ClassFact {
    pub fn is(&self, kind: DeclKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn has_decorator(&self, name: &str) -> bool {
        self.decorators.iter().any(|d| d.name == name)
    }

    pub fn decorator(&self, name: &str) -> Option<&DecoratorFact> {
        self.decorators.iter().find(|d| d.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodFact> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn route_handlers(&self) -> impl Iterator<Item = &MethodFact> {
        self.methods.iter().filter(|m| m.is_route_handler())
    }
}

/// A call expression and where it sits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFact {
    /// Source text of the callee (`eval`, `fs.readFileSync`)
    pub callee: String,
    pub line: u32,
    pub column: u32,
    pub class: Option<String>,
    pub method: Option<String>,
}

/// `name = "literal"` in a declarator, field, property or assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteralAssignment {
    pub name: String,
    pub value: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFact {
    pub source: String,
    pub names: Vec<String>,
    pub line: u32,
}

/// Everything the classifier learned about one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFacts {
    pub classes: Vec<ClassFact>,
    pub calls: Vec<CallFact>,
    pub literal_assignments: Vec<LiteralAssignment>,
    pub imports: Vec<ImportFact>,
    pub has_syntax_errors: bool,
}

impl FileFacts {
    pub fn classes_of(&self, kind: DeclKind) -> impl Iterator<Item = &ClassFact> {
        self.classes.iter().filter(move |c| c.is(kind))
    }

    pub fn class(&self, name: &str) -> Option<&ClassFact> {
        self.classes.iter().find(|c| c.name == name)
    }
}
